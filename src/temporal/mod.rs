//! Null-capable calendar values.
//!
//! Each wrapper owns an optional chrono value; the `None` state is
//! the "empty" date/time a blank dbf field decodes to. Orderings are
//! total, with empty below every real value and equal only to another
//! empty, so index keys built over temporal fields sort blanks first.

use std::fmt;
use std::ops::{Add, Sub};

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::{DbfError, Result};

#[cfg(test)]
mod tests;

fn no_attribute(kind: &str, name: &str) -> DbfError {
    DbfError::Invalid(format!("null {} object has no attribute {}", kind, name))
}

/// A calendar date or the distinguished empty state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date(Option<NaiveDate>);

impl Date {
    pub fn new(year: i32, month: u32, day: u32) -> Result<Date> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(|d| Date(Some(d)))
            .ok_or_else(|| {
                DbfError::Invalid(format!("invalid date {:04}-{:02}-{:02}", year, month, day))
            })
    }

    pub const fn empty() -> Date {
        Date(None)
    }

    pub fn today() -> Date {
        Date(Some(Local::now().date_naive()))
    }

    /// Parse `YYYYMMDD`; blank and `"no date"` yield the empty state.
    pub fn from_ymd(text: &str) -> Result<Date> {
        if text.trim().is_empty() || text == "no date" {
            return Ok(Date::empty());
        }
        let parse = |range: std::ops::Range<usize>| -> Result<u32> {
            text.get(range.clone())
                .and_then(|part| part.parse().ok())
                .ok_or_else(|| DbfError::Invalid(format!("invalid yyyymmdd date: {:?}", text)))
        };
        Date::new(parse(0..4)? as i32, parse(4..6)?, parse(6..8)?)
    }

    /// Format as `YYYYMMDD`, or eight spaces when empty.
    pub fn ymd(&self) -> String {
        match self.0 {
            Some(d) => format!("{:04}{:02}{:02}", d.year(), d.month(), d.day()),
            None => "        ".to_string(),
        }
    }

    /// Build from a proleptic-Gregorian day number (day 1 is
    /// 0001-01-01); zero and negative day numbers yield empty.
    pub fn from_ordinal(days: i32) -> Date {
        if days < 1 {
            return Date::empty();
        }
        Date(NaiveDate::from_num_days_from_ce_opt(days))
    }

    pub fn ordinal(&self) -> Result<i32> {
        Ok(self.date().ok_or_else(|| no_attribute("Date", "ordinal"))?.num_days_from_ce())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.0
    }

    pub fn year(&self) -> Result<i32> {
        self.0.map(|d| d.year()).ok_or_else(|| no_attribute("Date", "year"))
    }

    pub fn month(&self) -> Result<u32> {
        self.0.map(|d| d.month()).ok_or_else(|| no_attribute("Date", "month"))
    }

    pub fn day(&self) -> Result<u32> {
        self.0.map(|d| d.day()).ok_or_else(|| no_attribute("Date", "day"))
    }
}

impl From<NaiveDate> for Date {
    fn from(d: NaiveDate) -> Date {
        Date(Some(d))
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(d) => write!(f, "{}", d),
            None => write!(f, "no date"),
        }
    }
}

impl Add<Duration> for Date {
    type Output = Date;

    /// Empty propagates through arithmetic.
    fn add(self, rhs: Duration) -> Date {
        Date(self.0.map(|d| d + rhs))
    }
}

impl Sub<Duration> for Date {
    type Output = Date;

    fn sub(self, rhs: Duration) -> Date {
        Date(self.0.map(|d| d - rhs))
    }
}

impl Sub for Date {
    type Output = Option<Duration>;

    /// `None` unless both operands are non-empty.
    fn sub(self, rhs: Date) -> Option<Duration> {
        match (self.0, rhs.0) {
            (Some(a), Some(b)) => Some(a - b),
            _ => None,
        }
    }
}

/// A wall-clock time or the distinguished empty state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(Option<NaiveTime>);

impl Time {
    pub fn new(hour: u32, minute: u32, second: u32, microsecond: u32) -> Result<Time> {
        NaiveTime::from_hms_micro_opt(hour, minute, second, microsecond)
            .map(|t| Time(Some(t)))
            .ok_or_else(|| {
                DbfError::Invalid(format!(
                    "invalid time {:02}:{:02}:{:02}.{:06}",
                    hour, minute, second, microsecond
                ))
            })
    }

    pub const fn empty() -> Time {
        Time(None)
    }

    pub fn now() -> Time {
        Time(Some(Local::now().time()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn time(&self) -> Option<NaiveTime> {
        self.0
    }

    pub fn hour(&self) -> Result<u32> {
        self.0.map(|t| t.hour()).ok_or_else(|| no_attribute("Time", "hour"))
    }

    pub fn minute(&self) -> Result<u32> {
        self.0.map(|t| t.minute()).ok_or_else(|| no_attribute("Time", "minute"))
    }

    pub fn second(&self) -> Result<u32> {
        self.0.map(|t| t.second()).ok_or_else(|| no_attribute("Time", "second"))
    }

    pub fn microsecond(&self) -> Result<u32> {
        self.0
            .map(|t| t.nanosecond() / 1_000)
            .ok_or_else(|| no_attribute("Time", "microsecond"))
    }
}

impl From<NaiveTime> for Time {
    fn from(t: NaiveTime) -> Time {
        Time(Some(t))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(t) => write!(f, "{}", t),
            None => write!(f, "no time"),
        }
    }
}

impl Add<Duration> for Time {
    type Output = Time;

    fn add(self, rhs: Duration) -> Time {
        Time(self.0.map(|t| t + rhs))
    }
}

impl Sub<Duration> for Time {
    type Output = Time;

    fn sub(self, rhs: Duration) -> Time {
        Time(self.0.map(|t| t - rhs))
    }
}

impl Sub for Time {
    type Output = Option<Duration>;

    fn sub(self, rhs: Time) -> Option<Duration> {
        match (self.0, rhs.0) {
            (Some(a), Some(b)) => Some(a - b),
            _ => None,
        }
    }
}

/// A combined date and time or the distinguished empty state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateTime(Option<NaiveDateTime>);

impl DateTime {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
        microsecond: u32,
    ) -> Result<DateTime> {
        let date = Date::new(year, month, day)?;
        let time = Time::new(hour, minute, second, microsecond)?;
        Ok(DateTime::combine(date, time))
    }

    pub const fn empty() -> DateTime {
        DateTime(None)
    }

    pub fn now() -> DateTime {
        DateTime(Some(Local::now().naive_local()))
    }

    /// Empty when either part is empty.
    pub fn combine(date: Date, time: Time) -> DateTime {
        match (date.date(), time.time()) {
            (Some(d), Some(t)) => DateTime(Some(NaiveDateTime::new(d, t))),
            _ => DateTime(None),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn datetime(&self) -> Option<NaiveDateTime> {
        self.0
    }

    pub fn date(&self) -> Date {
        Date(self.0.map(|dt| dt.date()))
    }

    pub fn time(&self) -> Time {
        Time(self.0.map(|dt| dt.time()))
    }

    pub fn year(&self) -> Result<i32> {
        self.0.map(|dt| dt.year()).ok_or_else(|| no_attribute("DateTime", "year"))
    }

    pub fn month(&self) -> Result<u32> {
        self.0.map(|dt| dt.month()).ok_or_else(|| no_attribute("DateTime", "month"))
    }

    pub fn day(&self) -> Result<u32> {
        self.0.map(|dt| dt.day()).ok_or_else(|| no_attribute("DateTime", "day"))
    }

    pub fn hour(&self) -> Result<u32> {
        self.0.map(|dt| dt.hour()).ok_or_else(|| no_attribute("DateTime", "hour"))
    }

    pub fn minute(&self) -> Result<u32> {
        self.0.map(|dt| dt.minute()).ok_or_else(|| no_attribute("DateTime", "minute"))
    }

    pub fn second(&self) -> Result<u32> {
        self.0.map(|dt| dt.second()).ok_or_else(|| no_attribute("DateTime", "second"))
    }

    pub fn microsecond(&self) -> Result<u32> {
        self.0
            .map(|dt| dt.nanosecond() / 1_000)
            .ok_or_else(|| no_attribute("DateTime", "microsecond"))
    }
}

impl From<NaiveDateTime> for DateTime {
    fn from(dt: NaiveDateTime) -> DateTime {
        DateTime(Some(dt))
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(dt) => write!(f, "{}", dt),
            None => write!(f, "no datetime"),
        }
    }
}

impl Add<Duration> for DateTime {
    type Output = DateTime;

    fn add(self, rhs: Duration) -> DateTime {
        DateTime(self.0.map(|dt| dt + rhs))
    }
}

impl Sub<Duration> for DateTime {
    type Output = DateTime;

    fn sub(self, rhs: Duration) -> DateTime {
        DateTime(self.0.map(|dt| dt - rhs))
    }
}

impl Sub for DateTime {
    type Output = Option<Duration>;

    fn sub(self, rhs: DateTime) -> Option<Duration> {
        match (self.0, rhs.0) {
            (Some(a), Some(b)) => Some(a - b),
            _ => None,
        }
    }
}
