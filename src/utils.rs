use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};
use serde_json::Value;

/// Bucket label for dates that cannot be read. Sorts after every `YYYY-MM-DD` label.
pub const UNKNOWN_DATE_LABEL: &str = "unknown-date";

/// Day zero for serials from 61 (1900-03-01) on. The 1900 date system counts a
/// non-existent 1900-02-29 as serial 60, so this epoch sits one day early.
const SPREADSHEET_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// Serial of the phantom 1900-02-29. Earlier serials count from 1899-12-31.
const PHANTOM_LEAP_DAY_SERIAL: f64 = 60.0;

/// Largest serial a spreadsheet can hold (9999-12-31).
const MAX_SPREADSHEET_SERIAL: f64 = 2_958_465.0;

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// Renders a scalar cell as non-blank text. Null, blank strings and nested
/// values yield `None`.
pub fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Reads a finite number from a numeric cell or from text such as `"1,250.50"`.
pub fn value_as_amount(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse::<f64>().ok()?
        }
        _ => return None,
    };

    if amount.is_finite() {
        Some(amount)
    } else {
        None
    }
}

/// Calendar date (`YYYY-MM-DD`) a cell falls on, truncating any time of day as
/// written. Unreadable input maps to [`UNKNOWN_DATE_LABEL`].
pub fn calendar_date_label(value: &Value) -> String {
    parse_calendar_date(value)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| UNKNOWN_DATE_LABEL.to_string())
}

pub fn parse_calendar_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => parse_date_text(s.trim()),
        Value::Number(n) => n.as_f64().and_then(spreadsheet_serial_to_date),
        _ => None,
    }
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    if text.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }

    // Offset-bearing timestamps keep the date as written, not converted to UTC.
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local().date());
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.date());
        }
    }

    None
}

/// Converts a 1900-system spreadsheet serial (days, fraction = time of day) to a date.
/// Serial 60, which names 1900-02-29, reads as 1900-02-28.
pub fn spreadsheet_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > MAX_SPREADSHEET_SERIAL {
        return None;
    }

    let (year, month, day) = SPREADSHEET_EPOCH;
    let mut days = serial.floor() as u64;
    if serial < PHANTOM_LEAP_DAY_SERIAL {
        days += 1;
    }
    NaiveDate::from_ymd_opt(year, month, day)?.checked_add_days(Days::new(days))
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
