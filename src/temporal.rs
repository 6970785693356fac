// ⏰ Temporal helpers
// Transaction dates are stored ISO-first ("2024-07-01" or "2024-07-01T00:02:00");
// "dd/mm/yyyy" input is accepted and rewritten on the way in. Everything time-based (duplicate windows, month filters, goal closing day)
// goes through this module so the parsing rules live in one place.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Accepted date-time layouts, tried in order
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
];

/// Accepted date-only layouts (midnight is assumed)
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];

// ============================================================================
// PARSING
// ============================================================================

/// Parse a stored transaction date into a point in time.
///
/// Date-only values default to midnight. RFC 3339 values with an offset are
/// converted to UTC and compared as naive times.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }

    parse_date(value).map(|d| d.and_time(NaiveTime::MIN))
}

/// Parse the calendar-day part of a stored date
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date);
        }
    }

    // "2024-07-01T10:00:00" and friends
    if value.len() > 10 {
        if let Some(prefix) = value.get(..10) {
            if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
                return Some(date);
            }
        }
    }

    None
}

/// Rewrite an accepted date into the stored ISO form.
///
/// Values that already start with their "YYYY-MM-DD" day keep their time
/// part untouched; "15/07/2024" becomes "2024-07-15". Unparseable values are
/// returned trimmed so validation can report them.
pub fn normalize_date(value: &str) -> String {
    let value = value.trim();
    match parse_date(value) {
        Some(date) => {
            let day = day_key(date);
            if value.starts_with(&day) {
                value.to_string()
            } else {
                day
            }
        }
        None => value.to_string(),
    }
}

// ============================================================================
// DISTANCES
// ============================================================================

/// Absolute distance between two stored dates, in milliseconds.
///
/// Returns None when either side does not parse; callers treat that as
/// "not close in time".
pub fn distance_millis(a: &str, b: &str) -> Option<i64> {
    let a = parse_timestamp(a)?;
    let b = parse_timestamp(b)?;
    Some((a - b).num_milliseconds().abs())
}

/// Strict ordering helper: is `a` chronologically before `b`?
pub fn is_before(a: &str, b: &str) -> bool {
    match (parse_timestamp(a), parse_timestamp(b)) {
        (Some(a), Some(b)) => a < b,
        _ => false,
    }
}

// ============================================================================
// MONTHS & CLOSING DAY
// ============================================================================

/// "YYYY-MM" key for the month containing `date`
pub fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// "YYYY-MM-DD" key for a single day
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Prefix match of a stored date against a "YYYY-MM" (or "YYYY-MM-DD") key.
///
/// This is a lexical comparison, not a calendar one. It relies on stored
/// dates being normalized (see `normalize_date`).
pub fn in_period(stored_date: &str, key: &str) -> bool {
    stored_date.starts_with(key)
}

/// Days until the next statement closing day.
///
/// If today is on or before `due_day` the answer is within this month;
/// otherwise the due day of next month is used. A due day past the end of
/// next month rolls over into the following month.
pub fn days_to_close(today: NaiveDate, due_day: u32) -> i64 {
    let current_day = today.day();
    if current_day <= due_day {
        return i64::from(due_day - current_day);
    }

    let (year, month) = if today.month() == 12 {
        (today.year() + 1, 1)
    } else {
        (today.year(), today.month() + 1)
    };

    match NaiveDate::from_ymd_opt(year, month, 1) {
        Some(first) => {
            let target = first + Duration::days(i64::from(due_day.saturating_sub(1)));
            (target - today).num_days()
        }
        None => 0,
    }
}

/// The same day one day earlier, used for "ontem" queries
pub fn yesterday(today: NaiveDate) -> NaiveDate {
    today.pred_opt().unwrap_or(today)
}

// ============================================================================
// TESTS
// ============================================================================
