//! Free-text time and date parsing for webcam requests.
//!
//! Accepts what people actually type in a chat ("3pm", "15", "9:30 am",
//! "noon", "11-20") and normalizes it. Nothing here touches the clock
//! except [`parse_date`], which reads the current year.

use std::sync::LazyLock;

use chrono::Datelike;
use regex::Regex;

static HOUR_MINUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2}):(\d{2})\s*(am|pm)?$").unwrap());
static HOUR_PERIOD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})\s*(am|pm)$").unwrap());
static HOUR_ONLY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{1,2})$").unwrap());

static MONTH_DAY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{2}-\d{2}$").unwrap());
static FULL_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

/// A time of day in the resort timezone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTime {
    /// 0-23
    pub hour: u32,
    /// 0-59
    pub minute: u32,
    /// Human readable rendering used verbatim in replies.
    pub label: String,
}

impl ParsedTime {
    pub fn noon() -> Self {
        Self {
            hour: 12,
            minute: 0,
            label: "noon".to_string(),
        }
    }

    pub fn midnight() -> Self {
        Self {
            hour: 0,
            minute: 0,
            label: "midnight".to_string(),
        }
    }

    fn new(hour: u32, minute: u32) -> Self {
        Self {
            hour,
            minute,
            label: format_label(hour, minute),
        }
    }
}

/// Parses a time of day.
///
/// Supported forms:
/// * `noon`, `midnight`, `12pm`, `12 am`
/// * `15:00`, `8:30`, `3:30pm`, `3:30 pm`
/// * `3am`, `9 PM`
/// * `15`, `8` (24-hour)
///
/// Out of range values are rejected, never clamped.
pub fn parse_time(text: &str) -> Option<ParsedTime> {
    let text = text.trim().to_lowercase();

    match text.as_str() {
        "noon" | "12pm" | "12 pm" => return Some(ParsedTime::noon()),
        "midnight" | "12am" | "12 am" => return Some(ParsedTime::midnight()),
        _ => {}
    }

    if let Some(caps) = HOUR_MINUTE.captures(&text) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        if minute > 59 {
            return None;
        }

        let hour = match caps.get(3) {
            Some(period) => to_24_hour(hour, period.as_str())?,
            None if hour <= 23 => hour,
            None => return None,
        };
        return Some(ParsedTime::new(hour, minute));
    }

    if let Some(caps) = HOUR_PERIOD.captures(&text) {
        let hour: u32 = caps[1].parse().ok()?;
        let hour = to_24_hour(hour, &caps[2])?;
        return Some(ParsedTime::new(hour, 0));
    }

    if let Some(caps) = HOUR_ONLY.captures(&text) {
        let hour: u32 = caps[1].parse().ok()?;
        if hour <= 23 {
            return Some(ParsedTime::new(hour, 0));
        }
    }

    None
}

/// Converts a 12-hour clock value to 24-hour form. Only 1-12 is accepted.
fn to_24_hour(hour: u32, period: &str) -> Option<u32> {
    if !(1..=12).contains(&hour) {
        return None;
    }
    let hour = match (period, hour) {
        ("am", 12) => 0,
        ("am", h) => h,
        ("pm", 12) => 12,
        ("pm", h) => h + 12,
        _ => return None,
    };
    Some(hour)
}

/// Renders `hour:minute` the way replies show it: `midnight`, `noon`,
/// `3 PM`, `9:30 AM`.
pub fn format_label(hour: u32, minute: u32) -> String {
    match (hour, minute) {
        (0, 0) => return "midnight".to_string(),
        (12, 0) => return "noon".to_string(),
        _ => {}
    }

    let h12 = match hour % 12 {
        0 => 12,
        h => h,
    };
    let period = if hour < 12 { "AM" } else { "PM" };
    if minute == 0 {
        format!("{h12} {period}")
    } else {
        format!("{h12}:{minute:02} {period}")
    }
}

/// Parses `MM-DD` (current year) or `YYYY-MM-DD` into `YYYY-MM-DD`.
///
/// Month and day are not validated: `99-99` is returned as `<year>-99-99`
/// and left to fail when the date is resolved.
pub fn parse_date(text: &str) -> Option<String> {
    parse_date_in_year(text, chrono::Local::now().year())
}

/// [`parse_date`] with an explicit year for the `MM-DD` form.
pub fn parse_date_in_year(text: &str, year: i32) -> Option<String> {
    let text = text.trim();
    if MONTH_DAY.is_match(text) {
        return Some(format!("{year:04}-{text}"));
    }
    if FULL_DATE.is_match(text) {
        return Some(text.to_string());
    }
    None
}
