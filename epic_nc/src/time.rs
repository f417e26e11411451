//! PMEL-EPIC two-word time.
//!
//! EPIC files store time as two integers: `time` is the "true Julian day" and
//! `time2` is milliseconds since 00:00 GMT. The PMEL conventions document
//! misprints the reference day as 2400000; the correct anchor is
//! Julian day 2440000 == 1968-05-23.

use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};

use crate::error::{EpicError, Result};

pub const EPIC_EPOCH_JULIAN_DAY: i32 = 2_440_000;
pub const MILLIS_PER_DAY: i32 = 86_400_000;

/// 1968-05-23T00:00:00, the calendar day of [`EPIC_EPOCH_JULIAN_DAY`].
pub fn epic_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1968, 5, 23)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("EPIC epoch is a valid calendar date")
}

/// One EPIC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EpicTime {
    pub julian_day: i32,
    pub millis: i32,
}

impl EpicTime {
    /// Both words are checked: `millis` within one day, `julian_day` within
    /// the calendar range, so [`EpicTime::to_datetime`] cannot overflow.
    pub fn new(julian_day: i32, millis: i32) -> Result<Self> {
        if !(0..MILLIS_PER_DAY).contains(&millis) {
            return Err(EpicError::TimeRange(i64::from(millis)));
        }
        if try_to_calendar(julian_day, millis).is_none() {
            return Err(EpicError::JulianDay(julian_day));
        }
        Ok(Self { julian_day, millis })
    }

    pub fn to_datetime(self) -> NaiveDateTime {
        to_calendar(self.julian_day, self.millis)
    }

    pub fn from_datetime(dt: &NaiveDateTime) -> Self {
        let (julian_day, millis) = to_epic(dt);
        Self { julian_day, millis }
    }
}

impl fmt::Display for EpicTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.julian_day, self.millis)
    }
}

/// EPIC words → calendar time. A `millis` past midnight rolls into the next day.
///
/// Panics when the words land outside the calendar range (the i32 fill value
/// does); words read from a file go through [`try_to_calendar`].
pub fn to_calendar(julian_day: i32, millis: i32) -> NaiveDateTime {
    let day_offset = i64::from(julian_day) - i64::from(EPIC_EPOCH_JULIAN_DAY);
    epic_epoch() + Duration::days(day_offset) + Duration::milliseconds(i64::from(millis))
}

/// [`to_calendar`], with `None` instead of an overflow.
pub fn try_to_calendar(julian_day: i32, millis: i32) -> Option<NaiveDateTime> {
    let day_offset = i64::from(julian_day) - i64::from(EPIC_EPOCH_JULIAN_DAY);
    epic_epoch()
        .checked_add_signed(Duration::days(day_offset))?
        .checked_add_signed(Duration::milliseconds(i64::from(millis)))
}

/// Calendar time → EPIC words. Anything below a millisecond is truncated.
pub fn to_epic(dt: &NaiveDateTime) -> (i32, i32) {
    let days = (dt.date() - epic_epoch().date()).num_days();
    let julian_day = (i64::from(EPIC_EPOCH_JULIAN_DAY) + days) as i32;

    // leap-second nanos run past 1e9
    let sub_millis = (dt.nanosecond() / 1_000_000).min(999);
    let millis = dt.hour() * 3_600_000 + dt.minute() * 60_000 + dt.second() * 1_000 + sub_millis;
    (julian_day, millis as i32)
}

/// Parallel-array form of [`to_calendar`].
pub fn epic_to_datetime(julian_days: &[i32], millis: &[i32]) -> Result<Vec<NaiveDateTime>> {
    if julian_days.len() != millis.len() {
        return Err(EpicError::TimeLength(julian_days.len(), millis.len()));
    }
    julian_days
        .iter()
        .zip(millis)
        .map(|(&jd, &ms)| try_to_calendar(jd, ms).ok_or(EpicError::JulianDay(jd)))
        .collect()
}

/// Parallel-array form of [`to_epic`].
pub fn datetime_to_epic(times: &[NaiveDateTime]) -> (Vec<i32>, Vec<i32>) {
    times.iter().map(to_epic).unzip()
}

// ─────────────────────────────────────────────────────────────────────
// UDUNITS "<unit> since <reference>"
// ─────────────────────────────────────────────────────────────────────
pub const DEFAULT_UDUNITS: &str = "days since 1900-1-1";
pub const CF_TIME_UNITS: &str = "hours since 1900-01-01T00:00:00Z";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn millis(self) -> f64 {
        match self {
            TimeUnit::Seconds => 1_000.0,
            TimeUnit::Minutes => 60_000.0,
            TimeUnit::Hours => 3_600_000.0,
            TimeUnit::Days => 86_400_000.0,
        }
    }
}

/// Parsed form of a UDUNITS time string such as `hours since 1900-01-01T00:00:00Z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeUnits {
    pub unit: TimeUnit,
    pub reference: NaiveDateTime,
}

const REFERENCE_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

impl TimeUnits {
    pub fn parse(units: &str) -> Result<Self> {
        let bad = || EpicError::TimeUnits(units.to_string());
        let (unit, reference) = units.trim().split_once(" since ").ok_or_else(bad)?;

        let unit = match unit.trim().to_ascii_lowercase().as_str() {
            "seconds" | "second" | "secs" | "s" => TimeUnit::Seconds,
            "minutes" | "minute" | "mins" => TimeUnit::Minutes,
            "hours" | "hour" | "hrs" | "h" => TimeUnit::Hours,
            "days" | "day" | "d" => TimeUnit::Days,
            _ => return Err(bad()),
        };

        let reference = reference.trim();
        let parsed = REFERENCE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(reference, fmt).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(reference, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
            .ok_or_else(bad)?;

        Ok(Self { unit, reference: parsed })
    }

    pub fn encode(&self, dt: &NaiveDateTime) -> f64 {
        (*dt - self.reference).num_milliseconds() as f64 / self.unit.millis()
    }

    /// `None` for NaN, infinities and values past the calendar range.
    pub fn decode(&self, value: f64) -> Option<NaiveDateTime> {
        let millis = (value * self.unit.millis()).round();
        if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
            return None;
        }
        self.reference
            .checked_add_signed(Duration::milliseconds(millis as i64))
    }
}

/// `get_UDUNITS`: number of `units` since the reference date, one per input time.
pub fn udunits(times: &[NaiveDateTime], units: &str) -> Result<Vec<f64>> {
    let units = TimeUnits::parse(units)?;
    Ok(times.iter().map(|t| units.encode(t)).collect())
}
