//! Shared rounding helpers.
//!
//! Probabilities and distances cross the wire at fixed precision:
//!
//! - `round3`: 3 decimal places (probabilities, confidence components)
//! - `round2`: 2 decimal places (turnover rates)
//! - `round1`: 1 decimal place (distances in metres, durations in minutes)

/// Round to 3 decimal places.
pub(crate) fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Round to 2 decimal places.
pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Round to 1 decimal place.
pub(crate) fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Round to 5 decimal places (fuzzed coordinates).
pub(crate) fn round5(v: f64) -> f64 {
    (v * 100_000.0).round() / 100_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round3() {
        assert_eq!(round3(0.12345), 0.123);
        assert_eq!(round3(0.1235), 0.124);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(2.005), 2.01);
        assert_eq!(round2(1.994), 1.99);
    }

    #[test]
    fn test_round1() {
        assert_eq!(round1(152.34), 152.3);
        assert_eq!(round1(152.35), 152.4);
    }

    #[test]
    fn test_round5() {
        assert_eq!(round5(37.123456), 37.12346);
    }
}
