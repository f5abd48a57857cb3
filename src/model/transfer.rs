//! Transfer adjustment from metered-spot to free-spot occupancy.
//!
//! Free spots run higher occupancy than metered ones (no payment friction).
//! The zone multiplier shifts P(occupied) up in logit space so values near
//! the extremes don't saturate.

/// Output clamp for the adjusted probability.
const P_MIN: f64 = 0.01;
const P_MAX: f64 = 0.99;

/// Apply the transfer adjustment: `logit' = logit(p) + ln(multiplier)`,
/// clamped to [0.01, 0.99].
pub fn adjust(p_occupied: f64, multiplier: f64) -> f64 {
    let p = p_occupied.clamp(P_MIN, P_MAX);
    let logit = (p / (1.0 - p)).ln();
    let adjusted_logit = logit + multiplier.ln();
    let adjusted = 1.0 / (1.0 + (-adjusted_logit).exp());
    adjusted.clamp(P_MIN, P_MAX)
}
