//! Calendar access for date-sensitive ledger logic
//!
//! Balances are computed "up to today", so the notion of today has to be
//! injectable. `Timezone` decides which calendar day a UTC instant falls on.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

use crate::error::CoreError;

/// Timezone wrapper with string (IANA name) serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timezone(pub Tz);

impl Serialize for Timezone {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.name())
    }
}

impl<'de> Deserialize<'de> for Timezone {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Timezone::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl Timezone {
    pub fn new(tz: Tz) -> Self {
        Self(tz)
    }

    /// Parses an IANA zone name such as `Europe/Berlin`
    pub fn parse(name: &str) -> Result<Self, CoreError> {
        Tz::from_str(name)
            .map(Timezone)
            .map_err(|_| CoreError::configuration(format!("Invalid timezone: {}", name)))
    }

    /// Calendar date of a UTC instant in this zone
    pub fn local_date(&self, utc: DateTime<Utc>) -> NaiveDate {
        utc.with_timezone(&self.0).date_naive()
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self(chrono_tz::UTC)
    }
}

/// Provides the current calendar date
pub trait Clock: std::fmt::Debug {
    fn today(&self) -> NaiveDate;
}

/// Wall clock, evaluated in a configured zone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    timezone: Timezone,
}

impl SystemClock {
    pub fn new(timezone: Timezone) -> Self {
        Self { timezone }
    }
}

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        self.timezone.local_date(Utc::now())
    }
}

/// Clock pinned to one date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_local_date_crosses_midnight() {
        let tz = Timezone::parse("Pacific/Auckland").unwrap();
        let utc = Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap();
        assert_eq!(tz.local_date(utc), NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
    }

    #[test]
    fn test_invalid_timezone() {
        assert!(matches!(
            Timezone::parse("Mars/Olympus"),
            Err(CoreError::Configuration(_))
        ));
    }
}
