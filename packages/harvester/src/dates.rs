//! Date normalization for registry values and configuration input.
//!
//! The registry and its operators mix three spellings of a calendar date.
//! Everything is normalized to [`NaiveDate`]; filter parameters go back out
//! as ISO dates, exported rows use day/month/year.

use chrono::NaiveDate;

use crate::error::{HarvesterError, Result};

/// Accepted input formats, tried in this order.
const INPUT_FORMATS: [&str; 3] = ["%Y%m%d", "%Y-%m-%d", "%d.%m.%Y"];

/// Format of the `minDate`/`maxDate` filter parameters.
pub const FILTER_DATE_FORMAT: &str = "%Y-%m-%d";

/// Format of dates in exported rows.
pub const OUTPUT_DATE_FORMAT: &str = "%d/%m/%Y";

/// Parse a date in any of the supported formats.
///
/// An ISO date-time (`2024-01-01T00:00:00.000Z`) is parsed by its date part.
///
/// # Examples
/// ```
/// use fsa_harvester::dates::parse_date;
///
/// let a = parse_date("20240101").unwrap();
/// let b = parse_date("2024-01-01").unwrap();
/// let c = parse_date("01.01.2024").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(b, c);
/// assert!(parse_date("not-a-date").is_err());
/// ```
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    let trimmed = value.trim();
    let candidate = match trimmed.split_once('T') {
        Some((date, _)) if date.len() == 10 => date,
        _ => trimmed,
    };

    INPUT_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(candidate, format).ok())
        .ok_or_else(|| HarvesterError::DateParse {
            value: value.to_string(),
            context: None,
        })
}

/// Format a date for registry filter parameters.
#[must_use]
pub fn format_filter(date: NaiveDate) -> String {
    date.format(FILTER_DATE_FORMAT).to_string()
}

/// Format a date for exported rows.
#[must_use]
pub fn format_display(date: NaiveDate) -> String {
    date.format(OUTPUT_DATE_FORMAT).to_string()
}
