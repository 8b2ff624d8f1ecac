//! Analysis cycle timestamps and their enumeration.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{OsseError, Result};
use crate::leadtime::LeadTime;

/// Timestamp layout used for directory names and config values.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// One analysis time. Identified by its formatted timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cycle(DateTime<Utc>);

impl Cycle {
    /// The timestamp `lead` after this one, or an error when it falls
    /// outside the representable calendar.
    pub fn checked_offset(&self, lead: LeadTime) -> Result<Cycle> {
        lead.as_chrono()
            .and_then(|delta| self.0.checked_add_signed(delta))
            .map(Cycle)
            .ok_or_else(|| OsseError::TimeOutOfRange {
                cycle: self.to_string(),
                lead: lead.to_string(),
            })
    }

    /// The timestamp `lead` after this one, clamped to the representable
    /// calendar. Loaded experiment configs never reach the clamp.
    pub fn offset(&self, lead: LeadTime) -> Cycle {
        self.checked_offset(lead).unwrap_or(if lead.seconds() < 0 {
            Cycle(DateTime::<Utc>::MIN_UTC)
        } else {
            Cycle(DateTime::<Utc>::MAX_UTC)
        })
    }

    /// Signed whole seconds from `earlier` to `self`.
    pub fn since(&self, earlier: &Cycle) -> LeadTime {
        LeadTime::from_seconds((self.0 - earlier.0).num_seconds())
    }

    pub fn parse(text: &str) -> Result<Self> {
        NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
            .map(|naive| Cycle(naive.and_utc()))
            .map_err(|_| OsseError::InvalidTimestamp {
                value: text.to_string(),
            })
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

impl FromStr for Cycle {
    type Err = OsseError;

    fn from_str(s: &str) -> Result<Self> {
        Cycle::parse(s)
    }
}

impl Serialize for Cycle {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cycle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Cycle::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Every cycle from `start` to `end` inclusive, `frequency` apart.
///
/// Empty when `end < start`. A non-positive frequency would never
/// terminate and is rejected. Stops early at the end of the calendar.
pub fn enumerate(start: Cycle, end: Cycle, frequency: LeadTime) -> Result<Vec<Cycle>> {
    if !frequency.is_positive() {
        return Err(OsseError::NonPositiveFrequency(frequency.to_string()));
    }
    let mut cycles = Vec::new();
    let mut t = start;
    while t <= end {
        cycles.push(t);
        match t.checked_offset(frequency) {
            Ok(next) => t = next,
            Err(_) => break,
        }
    }
    Ok(cycles)
}

/// The cycle one `frequency` before `cycle`. Callers must not ask for the
/// predecessor of the first cycle.
pub fn previous(cycle: Cycle, frequency: LeadTime) -> Cycle {
    cycle.offset(-frequency)
}

/// The fixed cycle sequence of one experiment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub start: Cycle,
    pub end: Cycle,
    pub frequency: LeadTime,
}

impl Schedule {
    pub fn new(start: Cycle, end: Cycle, frequency: LeadTime) -> Self {
        Self {
            start,
            end,
            frequency,
        }
    }

    pub fn cycles(&self) -> Result<Vec<Cycle>> {
        enumerate(self.start, self.end, self.frequency)
    }

    /// Cycles from `start + spinup` to `end`.
    pub fn cycles_after(&self, spinup: LeadTime) -> Result<Vec<Cycle>> {
        enumerate(self.start.checked_offset(spinup)?, self.end, self.frequency)
    }

    pub fn is_first(&self, cycle: &Cycle) -> bool {
        *cycle == self.start
    }

    /// Predecessor of `cycle`, or `None` for the first cycle.
    pub fn previous(&self, cycle: &Cycle) -> Option<Cycle> {
        if self.is_first(cycle) {
            None
        } else {
            Some(previous(*cycle, self.frequency))
        }
    }
}
