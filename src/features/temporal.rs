//! Temporal features: cyclic encodings, US federal holidays, and
//! time-of-day window flags.

use std::f64::consts::PI;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::features::FeatureMap;

/// Fixed-date federal holidays as (month, day).
const FEDERAL_HOLIDAYS_FIXED: [(u32, u32); 5] = [
    (1, 1),   // New Year's Day
    (6, 19),  // Juneteenth
    (7, 4),   // Independence Day
    (11, 11), // Veterans Day
    (12, 25), // Christmas
];

/// Floating federal holidays as (month, weekday Mon=0, nth). nth = -1 means
/// the last occurrence in the month.
const FEDERAL_HOLIDAYS_FLOATING: [(u32, u32, i32); 6] = [
    (1, 0, 3),   // MLK Day: 3rd Monday of January
    (2, 0, 3),   // Presidents Day: 3rd Monday of February
    (5, 0, -1),  // Memorial Day: last Monday of May
    (9, 0, 1),   // Labor Day: 1st Monday of September
    (10, 0, 2),  // Columbus Day: 2nd Monday of October
    (11, 3, 4),  // Thanksgiving: 4th Thursday of November
];

fn days_in_month(year: i32, month: u32) -> u32 {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next.and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(31)
}

/// Whether a date is a US federal holiday.
pub fn is_federal_holiday(date: NaiveDate) -> bool {
    if FEDERAL_HOLIDAYS_FIXED.contains(&(date.month(), date.day())) {
        return true;
    }

    let weekday = date.weekday().num_days_from_monday();
    for (month, holiday_weekday, nth) in FEDERAL_HOLIDAYS_FLOATING {
        if date.month() != month || weekday != holiday_weekday {
            continue;
        }
        if nth == -1 {
            if date.day() + 7 > days_in_month(date.year(), month) {
                return true;
            }
        } else if ((date.day() - 1) / 7 + 1) as i32 == nth {
            return true;
        }
    }
    false
}

/// Compute the 16 temporal features for a timestamp.
pub fn compute(ts: NaiveDateTime) -> FeatureMap {
    // Fractional hour so the window flags see 8:30 as 8.5
    let hour = ts.hour() as f64 + ts.minute() as f64 / 60.0;
    let dow = ts.weekday().num_days_from_monday() as f64; // Mon=0..Sun=6
    let month = ts.month() as f64;
    let minutes = (ts.hour() * 60 + ts.minute()) as f64;

    let is_weekend = dow >= 5.0;
    let is_weekday = !is_weekend;
    let is_saturday = dow == 5.0;

    let mut f = FeatureMap::new();
    f.insert("hour_sin", (2.0 * PI * hour / 24.0).sin());
    f.insert("hour_cos", (2.0 * PI * hour / 24.0).cos());
    f.insert("dow_sin", (2.0 * PI * dow / 7.0).sin());
    f.insert("dow_cos", (2.0 * PI * dow / 7.0).cos());
    f.insert("month_sin", (2.0 * PI * month / 12.0).sin());
    f.insert("month_cos", (2.0 * PI * month / 12.0).cos());

    f.insert("is_weekend", is_weekend as u8 as f64);
    f.insert(
        "is_rush_hour",
        (is_weekday && ((7.0..9.0).contains(&hour) || (16.0..19.0).contains(&hour))) as u8 as f64,
    );
    f.insert("is_lunch", (11.5..13.5).contains(&hour) as u8 as f64);
    f.insert("is_holiday", is_federal_holiday(ts.date()) as u8 as f64);
    f.insert("minutes_since_midnight", minutes);
    f.insert("is_evening", (18.0..23.0).contains(&hour) as u8 as f64);
    f.insert("is_overnight", (hour >= 23.0 || hour < 6.0) as u8 as f64);
    f.insert(
        "is_metered_hours",
        ((is_weekday && (9.0..18.0).contains(&hour))
            || (is_saturday && (9.0..18.0).contains(&hour))) as u8 as f64,
    );
    // Overridden downstream once sweeping schedules feed the matrix
    f.insert("is_sweeping_day", 0.0);
    f.insert("hour_of_week", dow * 24.0 + ts.hour() as f64);
    f
}
