//! Calendar date <-> integer day-offset conversion for the model's date feature.
//!
//! Offsets are whole days since 2018-01-01. The mapping is strictly
//! increasing in the date, so a model trained on encoded dates sees the same
//! ordering at prediction time.

use thiserror::Error;
use time::{Date, Duration, Month, format_description::FormatItem, macros::format_description};

/// Reference date that encodes to offset `0`.
pub const EPOCH: Date = time::macros::date!(2018 - 01 - 01);

const MAX_OFFSET_DAYS: u64 = 5_000_000;

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Returned when a string or offset does not name a representable calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidDate {
    #[error("Expected YYYY-MM-DD, got {0:?}")]
    Shape(String),
    #[error("Date component {0:?} is not a number")]
    NotNumeric(String),
    #[error("{year:04}-{month:02}-{day:02} is not a calendar date")]
    NotRepresentable { year: i32, month: u8, day: u8 },
    #[error("Day offset {0} is out of range")]
    OffsetOutOfRange(i64),
}

/// Encode a `YYYY-MM-DD` string into days since [`EPOCH`].
pub fn encode(date: &str) -> Result<i64, InvalidDate> {
    let parts: Vec<&str> = date.trim().split('-').collect();
    if parts.len() != 3 {
        return Err(InvalidDate::Shape(date.to_string()));
    }
    let year = parse_component::<i32>(parts[0])?;
    let month = parse_component::<u8>(parts[1])?;
    let day = parse_component::<u8>(parts[2])?;
    let calendar = Month::try_from(month)
        .ok()
        .and_then(|month| Date::from_calendar_date(year, month, day).ok())
        .ok_or(InvalidDate::NotRepresentable { year, month, day })?;
    Ok(offset_of(calendar))
}

/// Days between [`EPOCH`] and `date`; negative before the epoch.
pub fn offset_of(date: Date) -> i64 {
    (date - EPOCH).whole_days()
}

/// Decode a day offset back into a calendar date.
pub fn decode(offset: i64) -> Result<Date, InvalidDate> {
    // Beyond the representable year range; also keeps Duration::days from overflowing.
    if offset.unsigned_abs() > MAX_OFFSET_DAYS {
        return Err(InvalidDate::OffsetOutOfRange(offset));
    }
    EPOCH
        .checked_add(Duration::days(offset))
        .ok_or(InvalidDate::OffsetOutOfRange(offset))
}

/// Render a date as `YYYY-MM-DD`.
pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT)
        .unwrap_or_else(|_| format!("{}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day()))
}

fn parse_component<T: std::str::FromStr>(raw: &str) -> Result<T, InvalidDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(InvalidDate::NotNumeric(raw.to_string()));
    }
    trimmed
        .parse::<T>()
        .map_err(|_| InvalidDate::NotNumeric(raw.to_string()))
}
