//! Wall-clock helpers pinned to a fixed reference offset.
//!
//! Every calendar-day or time-of-day question the engine asks (ledger day
//! keys, quiet hours, weekday filters, greeting times) is answered in one
//! explicit UTC offset taken from config, never the host locale.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Offset, Timelike, Utc};

use crate::error::{NudgeError, Result};

/// `+09:00`, the offset the ledger has always been keyed in.
pub const DEFAULT_REFERENCE_OFFSET: &str = "+09:00";

/// Parse an `"HH:MM"` string into a [`NaiveTime`].
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").map_err(|_| NudgeError::InvalidTimeOfDay(s.to_string()))
}

/// Parse `"+HH:MM"`, `"-HH:MM"` or `"Z"` into a [`FixedOffset`].
pub fn parse_utc_offset(s: &str) -> Result<FixedOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return Ok(Utc.fix());
    }
    s.parse::<FixedOffset>()
        .map_err(|_| NudgeError::InvalidOffset(s.to_string()))
}

/// The instant expressed in the reference offset.
pub fn local(instant: DateTime<Utc>, offset: FixedOffset) -> DateTime<FixedOffset> {
    instant.with_timezone(&offset)
}

/// Calendar date of `instant` in the reference offset.
pub fn local_date(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    local(instant, offset).date_naive()
}

/// `YYYY-MM-DD` day key of `instant` in the reference offset.
pub fn day_key(instant: DateTime<Utc>, offset: FixedOffset) -> String {
    local_date(instant, offset).format("%Y-%m-%d").to_string()
}

/// Weekday of `instant` in the reference offset, 0 = Sunday … 6 = Saturday.
pub fn weekday_index(instant: DateTime<Utc>, offset: FixedOffset) -> u8 {
    local(instant, offset).weekday().num_days_from_sunday() as u8
}

/// Minute-precision time of day of `instant` in the reference offset.
pub fn time_of_day(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveTime {
    let l = local(instant, offset);
    NaiveTime::from_hms_opt(l.hour(), l.minute(), 0).unwrap_or(NaiveTime::MIN)
}
