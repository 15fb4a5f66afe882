use crate::error::{Result, ShiftpayError};
use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Minutes since midnight for a minute-resolution time of day.
pub fn minute_of_day(time: NaiveTime) -> u32 {
    time.num_seconds_from_midnight() / 60
}

/// Inverse of [`minute_of_day`]. Values past 23:59 are rejected.
pub fn time_from_minute(minute: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(minute / 60, minute % 60, 0)
}

fn ensure_whole_minute(time: NaiveTime, what: &str) -> Result<()> {
    if time.second() != 0 || time.nanosecond() != 0 {
        return Err(ShiftpayError::Validation(format!(
            "{what} {time} is not on a whole minute"
        )));
    }
    Ok(())
}

/// A half-open break interval `[start, end)` inside the working window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakInterval {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl BreakInterval {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self> {
        if start >= end {
            return Err(ShiftpayError::Validation(format!(
                "break start {start} must be before its end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time < self.end
    }

    fn contains_minute(&self, minute: u32) -> bool {
        minute_of_day(self.start) <= minute && minute < minute_of_day(self.end)
    }

    fn overlaps(&self, other: &BreakInterval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for BreakInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

impl FromStr for BreakInterval {
    type Err = ShiftpayError;

    /// Parses `HH:MM-HH:MM`.
    fn from_str(s: &str) -> Result<Self> {
        let (start, end) = s.trim().split_once('-').ok_or_else(|| {
            ShiftpayError::Validation(format!("break '{s}' is not in HH:MM-HH:MM form"))
        })?;
        Self::new(parse_time(start)?, parse_time(end)?)
    }
}

pub fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|e| ShiftpayError::Validation(format!("invalid time '{s}': {e}")))
}

pub fn parse_weekday(s: &str) -> Result<Weekday> {
    s.trim()
        .parse::<Weekday>()
        .map_err(|_| ShiftpayError::Validation(format!("invalid weekday '{s}'")))
}

/// A worker's declared working pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkSchedule {
    /// Working weekdays, ordered Monday first.
    pub weekdays: Vec<Weekday>,
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// Disjoint breaks, sorted by start.
    pub breaks: Vec<BreakInterval>,
}

impl WorkSchedule {
    /// Builds a validated schedule. Weekdays and breaks are normalized into order.
    pub fn new(
        weekdays: impl IntoIterator<Item = Weekday>,
        start: NaiveTime,
        end: NaiveTime,
        breaks: Vec<BreakInterval>,
    ) -> Result<Self> {
        let mut weekdays: Vec<Weekday> = weekdays.into_iter().collect();
        weekdays.sort_by_key(|d| d.num_days_from_monday());
        weekdays.dedup();

        let mut breaks = breaks;
        breaks.sort_by_key(|b| b.start);

        let schedule = Self {
            weekdays,
            start,
            end,
            breaks,
        };
        schedule.validate()?;
        Ok(schedule)
    }

    pub fn validate(&self) -> Result<()> {
        validate_window(self.start, self.end, &self.breaks)
    }

    pub fn works_on(&self, weekday: Weekday) -> bool {
        self.weekdays.contains(&weekday)
    }

    pub fn in_break(&self, time: NaiveTime) -> bool {
        self.breaks.iter().any(|b| b.contains(time))
    }

    /// Minutes inside the working window that are not covered by a break.
    pub fn eligible_minutes(&self) -> Vec<u32> {
        eligible_minutes(self.start, self.end, &self.breaks)
    }
}

/// Checks a working window and its breaks.
///
/// The window must be non-empty, every break must lie inside `[start, end)`
/// and breaks must not overlap one another.
pub fn validate_window(start: NaiveTime, end: NaiveTime, breaks: &[BreakInterval]) -> Result<()> {
    ensure_whole_minute(start, "work start")?;
    ensure_whole_minute(end, "work end")?;
    if end <= start {
        return Err(ShiftpayError::Validation(format!(
            "work end {end} must be after work start {start}"
        )));
    }

    for (i, b) in breaks.iter().enumerate() {
        ensure_whole_minute(b.start, "break start")?;
        ensure_whole_minute(b.end, "break end")?;
        if b.start >= b.end {
            return Err(ShiftpayError::Validation(format!(
                "break {b} must start before it ends"
            )));
        }
        if b.start < start || b.end > end {
            return Err(ShiftpayError::Validation(format!(
                "break {b} lies outside the working window"
            )));
        }
        if breaks[i + 1..].iter().any(|other| b.overlaps(other)) {
            return Err(ShiftpayError::Validation(format!(
                "break {b} overlaps another break"
            )));
        }
    }
    Ok(())
}

pub(crate) fn eligible_minutes(start: NaiveTime, end: NaiveTime, breaks: &[BreakInterval]) -> Vec<u32> {
    (minute_of_day(start)..minute_of_day(end))
        .filter(|m| !breaks.iter().any(|b| b.contains_minute(*m)))
        .collect()
}
