//! Request field validation.
//!
//! Dates and times are accepted only in zero-padded ISO-8601 form so the
//! stored text sorts the same way the values do.

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use std::sync::LazyLock;

use crate::error::{NotesError, NotesResult};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

static DATE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static TIME_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}:\d{2}:\d{2}$").unwrap());

/// Parse `YYYY-MM-DD`
pub fn parse_event_date(value: &str) -> NotesResult<NaiveDate> {
    let value = value.trim();
    if !DATE_SHAPE.is_match(value) {
        return Err(date_error());
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| date_error())
}

/// Parse `HH:MM:SS`
pub fn parse_event_time(value: &str) -> NotesResult<NaiveTime> {
    let value = value.trim();
    if !TIME_SHAPE.is_match(value) {
        return Err(time_error());
    }
    NaiveTime::parse_from_str(value, TIME_FORMAT).map_err(|_| time_error())
}

/// Blank input means "no date"
pub fn parse_optional_date(value: Option<&str>) -> NotesResult<Option<NaiveDate>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => parse_event_date(v).map(Some),
        None => Ok(None),
    }
}

/// Blank input means "no time"
pub fn parse_optional_time(value: Option<&str>) -> NotesResult<Option<NaiveTime>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => parse_event_time(v).map(Some),
        None => Ok(None),
    }
}

/// Title and content must be present and not blank
pub fn require_text(field: &str, value: Option<String>) -> NotesResult<String> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        Some(_) => Err(NotesError::validation(format!("{} must not be empty", field))),
        None => Err(NotesError::validation("Title and content are required")),
    }
}

fn date_error() -> NotesError {
    NotesError::validation("event_date must be in YYYY-MM-DD format")
}

fn time_error() -> NotesError {
    NotesError::validation("event_time must be in HH:MM:SS format")
}
