//! Compact signed lead-time strings.
//!
//! The wire form is `[M|P]{[nD][T][nH][nM][nS]}` where `M` marks a
//! negative duration. [`decode`] is lenient: each unit is matched on its
//! own, missing units count as zero and structure is not validated.
//! [`encode`] always produces a string that [`decode`] maps back to the
//! same second count. [`LeadTime::parse_strict`] checks the grammar.

use std::fmt;
use std::ops::{Add, Div, Neg, Sub};
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{OsseError, Result};

const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 3600;
const SECONDS_PER_DAY: i64 = 86_400;

struct UnitPatterns {
    seconds: Regex,
    minutes: Regex,
    hours: Regex,
    days: Regex,
    strict: Regex,
}

fn patterns() -> &'static UnitPatterns {
    static PATTERNS: OnceLock<UnitPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        // A unit token is a magnitude preceded by at least one non-digit.
        // A '-' right before the magnitude negates that token only.
        let unit = |letter: char| {
            Regex::new(&format!(r"[^\d-](-?)(\d+){letter}")).expect("static unit pattern")
        };
        UnitPatterns {
            seconds: unit('S'),
            minutes: unit('M'),
            hours: unit('H'),
            days: unit('D'),
            strict: Regex::new(r"^[MP]?(?:-?\d+D)?(?:T(?:-?\d+H)?(?:-?\d+M)?(?:-?\d+S)?)?$")
                .expect("static grammar pattern"),
        }
    })
}

fn unit_value(pattern: &Regex, text: &str) -> i128 {
    let Some(caps) = pattern.captures(text) else {
        return 0;
    };
    // Magnitudes wider than u64 clamp; the sum is out of range either way.
    let magnitude = i128::from(caps[2].parse::<u64>().unwrap_or(u64::MAX));
    if &caps[1] == "-" {
        -magnitude
    } else {
        magnitude
    }
}

/// Total in seconds, computed wide enough that no unit combination overflows.
fn decode_wide(text: &str) -> i128 {
    let p = patterns();
    let total = unit_value(&p.seconds, text)
        + unit_value(&p.minutes, text) * i128::from(SECONDS_PER_MINUTE)
        + unit_value(&p.hours, text) * i128::from(SECONDS_PER_HOUR)
        + unit_value(&p.days, text) * i128::from(SECONDS_PER_DAY);
    if text.starts_with('M') {
        -total
    } else {
        total
    }
}

/// Convert a lead-time string to a signed second count.
///
/// Never fails: absent units contribute zero and the first match per unit
/// wins. A leading `M` negates the total. Totals beyond `i64` saturate at
/// `±i64::MAX`.
pub fn decode(text: &str) -> i64 {
    let bound = i128::from(i64::MAX);
    decode_wide(text).clamp(-bound, bound) as i64
}

/// Convert a signed second count to its lead-time string.
///
/// Days truncate toward zero, so `-1` encodes as `MT1S` rather than a
/// negative day plus a positive remainder.
pub fn encode(seconds: i64) -> String {
    let mut out = String::from(if seconds < 0 { "M" } else { "P" });
    let magnitude = seconds.unsigned_abs();
    let per_day = SECONDS_PER_DAY as u64;

    let days = magnitude / per_day;
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    let remainder = magnitude % per_day;
    if remainder != 0 || magnitude == 0 {
        out.push('T');
    }

    let hours = remainder / SECONDS_PER_HOUR as u64;
    if hours > 0 {
        out.push_str(&format!("{hours}H"));
    }
    let minutes = (remainder % SECONDS_PER_HOUR as u64) / SECONDS_PER_MINUTE as u64;
    if minutes > 0 {
        out.push_str(&format!("{minutes}M"));
    }
    let secs = remainder % SECONDS_PER_MINUTE as u64;
    if (days == 0 && hours == 0 && minutes == 0) || secs > 0 {
        out.push_str(&format!("{secs}S"));
    }
    out
}

/// A signed lead time in whole seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LeadTime(i64);

impl LeadTime {
    pub const ZERO: LeadTime = LeadTime(0);

    pub const fn from_seconds(seconds: i64) -> Self {
        Self(seconds)
    }

    pub const fn from_hours(hours: i64) -> Self {
        Self(hours * SECONDS_PER_HOUR)
    }

    pub const fn seconds(self) -> i64 {
        self.0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Parse `text` only if it follows the lead-time grammar exactly and
    /// its total fits in an `i64`.
    pub fn parse_strict(text: &str) -> Result<Self> {
        let malformed = || OsseError::MalformedLeadTime(text.to_string());
        let has_magnitude = text.bytes().any(|b| b.is_ascii_digit());
        let dangling_t = text.ends_with('T');
        if !has_magnitude || dangling_t || !patterns().strict.is_match(text) {
            return Err(malformed());
        }
        i64::try_from(decode_wide(text))
            .map(Self)
            .map_err(|_| malformed())
    }

    /// `None` when the duration is outside what chrono can represent.
    pub fn as_chrono(self) -> Option<chrono::TimeDelta> {
        chrono::TimeDelta::try_seconds(self.0)
    }
}

impl fmt::Display for LeadTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(self.0))
    }
}

impl FromStr for LeadTime {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(decode(s)))
    }
}

impl Add for LeadTime {
    type Output = LeadTime;

    fn add(self, rhs: LeadTime) -> LeadTime {
        LeadTime(self.0.saturating_add(rhs.0))
    }
}

impl Sub for LeadTime {
    type Output = LeadTime;

    fn sub(self, rhs: LeadTime) -> LeadTime {
        LeadTime(self.0.saturating_sub(rhs.0))
    }
}

impl Neg for LeadTime {
    type Output = LeadTime;

    fn neg(self) -> LeadTime {
        LeadTime(self.0.saturating_neg())
    }
}

/// Integer division truncating toward zero.
///
/// Like the other operators here, saturates instead of overflowing.
impl Div<i64> for LeadTime {
    type Output = LeadTime;

    fn div(self, rhs: i64) -> LeadTime {
        LeadTime(self.0.saturating_div(rhs))
    }
}

impl Serialize for LeadTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LeadTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let lead = LeadTime(decode(&text));
        if LeadTime::parse_strict(&text).is_err() {
            tracing::warn!(value = %text, decoded = %lead, "lead time does not follow the strict grammar");
        }
        Ok(lead)
    }
}
