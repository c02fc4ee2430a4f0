//! Relative and absolute time windows for data queries.

use chrono::{DateTime, Duration, NaiveTime, SecondsFormat, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use thiserror::Error;

pub const DEFAULT_TIME_RANGE: &str = "-30m";

lazy_static! {
    static ref RELATIVE_RE: Regex = Regex::new(r"^-(\d+)\s*([smhdw])$").unwrap();
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeRangeError {
    #[error("unrecognized time range {0:?}; use e.g. -30m, -1h, -2d, today or an RFC3339 timestamp")]
    Unrecognized(String),
    #[error("time range {0:?} is too large")]
    OutOfRange(String),
}

/// A query window. `end == None` means "until now".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    label: String,
}

/// Maps empty input and "latest"-like words to the default range.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" | "latest" | "recent" | "current" | "now" => DEFAULT_TIME_RANGE.to_string(),
        _ => trimmed.to_string(),
    }
}

fn relative_duration(amount: i64, unit: &str) -> Option<Duration> {
    match unit {
        "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        "w" => Duration::try_weeks(amount),
        _ => None,
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

impl TimeWindow {
    /// Parses a time range relative to the current instant.
    pub fn parse(raw: &str) -> Result<Self, TimeRangeError> {
        Self::parse_at(raw, Utc::now())
    }

    /// Parses a time range relative to `now`.
    pub fn parse_at(raw: &str, now: DateTime<Utc>) -> Result<Self, TimeRangeError> {
        let label = normalize(raw);
        let lower = label.to_ascii_lowercase();

        if let Some(caps) = RELATIVE_RE.captures(&lower) {
            let amount: i64 = caps[1]
                .parse()
                .map_err(|_| TimeRangeError::OutOfRange(label.clone()))?;
            let duration = relative_duration(amount, &caps[2])
                .ok_or_else(|| TimeRangeError::OutOfRange(label.clone()))?;
            let start = now
                .checked_sub_signed(duration)
                .ok_or_else(|| TimeRangeError::OutOfRange(label.clone()))?;
            return Ok(Self {
                start,
                end: None,
                label,
            });
        }

        match lower.as_str() {
            "today" => {
                return Ok(Self {
                    start: start_of_day(now),
                    end: None,
                    label,
                })
            }
            "yesterday" => {
                let end = start_of_day(now);
                return Ok(Self {
                    start: end - Duration::days(1),
                    end: Some(end),
                    label,
                });
            }
            _ => {}
        }

        // An absolute timestamp selects the hour starting at that instant.
        let start = DateTime::parse_from_rfc3339(&label)
            .map_err(|_| TimeRangeError::Unrecognized(label.clone()))?
            .with_timezone(&Utc);
        Ok(Self {
            start,
            end: Some(start + Duration::hours(1)),
            label,
        })
    }

    pub fn start_param(&self) -> String {
        format_wire(&self.start)
    }

    pub fn end_param(&self) -> Option<String> {
        self.end.as_ref().map(format_wire)
    }

    /// The range as the caller wrote it (after normalization).
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self {
            start: Utc::now() - Duration::minutes(30),
            end: None,
            label: DEFAULT_TIME_RANGE.to_string(),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

pub fn format_wire(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Timestamp format used in tool output.
pub fn format_display(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}
