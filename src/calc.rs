/// Fallback weekly reading rate (words per week) applied when an owner has
/// never recorded one. Callers pass this into the resolver explicitly so the
/// default stays out of the query logic.
pub const DEFAULT_WEEKLY_READING_RATE: i64 = 35000;

/// Plan entries are keyed by full weekday name; the weekly view's completion
/// matrix uses the short form. Both run Monday-first.
pub const WEEKDAYS_FULL: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];
pub const WEEKDAYS_SHORT: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Half-up integer rounding: `floor(x + 0.5)`. Used for all presentation
/// rounding; stored values keep full precision.
pub fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

/// Percent of the book a week's rate covers: `100 * rate / word_count`.
/// Defined only when both inputs are known and the count is positive.
pub fn expected_weekly_reading_percent(rate: Option<f64>, word_count: Option<f64>) -> Option<f64> {
    match (rate, word_count) {
        (Some(r), Some(wc)) if wc > 0.0 => Some(100.0 * r / wc),
        _ => None,
    }
}

/// A week's worth of rate spread over 7 days, as a percent of the book.
/// Values above 100 are valid (fast readers); no clamping.
pub fn expected_daily_reading_percent(rate: Option<f64>, word_count: Option<f64>) -> Option<f64> {
    expected_weekly_reading_percent(rate, word_count).map(|p| p / 7.0)
}

/// Fixed, non-configurable ratio: one math point is two minutes.
pub fn expected_math_time(points: i64) -> i64 {
    points * 2
}

/// The one daily-delta rule, used by both the weekly scan and the write path:
/// - a new book title resets the delta to the day's accumulated value;
/// - otherwise the delta is the day-over-day difference, clamped at 0 so a
///   manual downward correction never produces negative progress;
/// - with no prior accumulated value the day's value stands alone.
pub fn daily_reading_delta(
    accumulated: Option<f64>,
    prev_accumulated: Option<f64>,
    title: Option<&str>,
    prev_title: Option<&str>,
) -> f64 {
    let Some(acc) = accumulated else {
        return 0.0;
    };
    if title.is_some() && title != prev_title {
        return acc;
    }
    match prev_accumulated {
        Some(prev) => (acc - prev).max(0.0),
        None => acc,
    }
}
