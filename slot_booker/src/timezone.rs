//! Projection of UTC instants into IANA timezones and back.
//!
//! All conversions go through `chrono-tz`, so daylight-saving transitions
//! follow the real zone rules instead of a fixed offset.

use crate::error::{BookingError, Result};
use chrono::{
    format::{Item, StrftimeItems},
    DateTime, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;
use std::{env, fs, path::Path};
use tracing::{debug, warn};

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| BookingError::InvalidTimezone(name.to_string()))
}

/// Like [`parse_timezone`], but unknown identifiers fall back to UTC.
pub fn timezone_or_utc(name: &str) -> Tz {
    parse_timezone(name).unwrap_or_else(|err| {
        warn!(%err, "Falling back to UTC");
        chrono_tz::UTC
    })
}

pub fn to_civil_date(instant: DateTime<Utc>, timezone: Tz) -> NaiveDate {
    instant.with_timezone(&timezone).date_naive()
}

pub fn to_civil_datetime(instant: DateTime<Utc>, timezone: Tz) -> NaiveDateTime {
    instant.with_timezone(&timezone).naive_local()
}

/// Formats `instant` in `timezone` with a strftime `pattern`.
pub fn format_in_zone(instant: DateTime<Utc>, timezone: Tz, pattern: &str) -> Result<String> {
    let items: Vec<Item> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(BookingError::InvalidFormat(pattern.to_string()));
    }
    Ok(instant
        .with_timezone(&timezone)
        .format_with_items(items.into_iter())
        .to_string())
}

/// Offset of `timezone` from UTC at `instant`, in seconds.
pub fn utc_offset_seconds(instant: DateTime<Utc>, timezone: Tz) -> i32 {
    instant
        .with_timezone(&timezone)
        .offset()
        .fix()
        .local_minus_utc()
}

/// Inverse of [`to_civil_datetime`].
///
/// A wall-clock time repeated by a fall-back transition resolves to the
/// earlier instant. A wall-clock time skipped by a spring-forward transition
/// does not exist and is rejected.
pub fn from_civil_datetime(civil: NaiveDateTime, timezone: Tz) -> Result<DateTime<Utc>> {
    match timezone.from_local_datetime(&civil) {
        LocalResult::Single(datetime) => Ok(datetime.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(BookingError::InvalidDatetime(format!(
            "{civil} does not exist in {}",
            timezone.name()
        ))),
    }
}

/// Reads the zone the host is configured with: `TZ` first, then the
/// `/etc/localtime` link.
pub fn detect_system_timezone() -> Option<String> {
    if let Ok(value) = env::var("TZ") {
        let value = value.trim().trim_start_matches(':');
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }
    let target = fs::read_link("/etc/localtime").ok()?;
    zone_from_zoneinfo_path(&target)
}

fn zone_from_zoneinfo_path(path: &Path) -> Option<String> {
    let path = path.to_str()?;
    let (_, zone) = path.split_once("zoneinfo/")?;
    let zone = zone
        .trim_start_matches("posix/")
        .trim_start_matches("right/");
    match zone.is_empty() {
        true => None,
        false => Some(zone.to_string()),
    }
}

/// The zone a fresh session starts in: the detected one if it is valid, else UTC.
pub fn initial_timezone(detected: Option<&str>) -> Tz {
    match detected {
        Some(name) => timezone_or_utc(name),
        None => {
            debug!("No system timezone detected, using UTC");
            chrono_tz::UTC
        }
    }
}
