// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Hour slots and the dataset date.
//!
//! A dataset covers exactly one calendar day split into 24 hourly slots.
//! [`HourIndex`] can only hold values in `0..=23`, so an out-of-range hour
//! is rejected at construction instead of deep inside the engine.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of hourly slots in a dataset day.
pub const HOURS_PER_DAY: u8 = 24;

/// Error returned when an hour outside `0..=23` is converted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("hour {0} is outside the range 0..=23")]
pub struct HourOutOfRange(pub u32);

/// Error returned when an hour string cannot be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HourParseError {
    #[error("invalid hour '{0}', expected a number between 0 and 23")]
    NotANumber(String),
    #[error(transparent)]
    OutOfRange(#[from] HourOutOfRange),
}

/// One of the 24 fixed time slots of the dataset day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct HourIndex(u8);

impl HourIndex {
    /// First slot of the day (00:00).
    pub const MIN: Self = Self(0);
    /// Last slot of the day (23:00).
    pub const MAX: Self = Self(HOURS_PER_DAY - 1);

    /// Create an hour index, returning `None` when `hour` is 24 or more.
    #[must_use]
    pub fn new(hour: u8) -> Option<Self> {
        (hour < HOURS_PER_DAY).then_some(Self(hour))
    }

    /// Create an hour index from any integer, clamping into `0..=23`.
    #[must_use]
    pub fn clamped(hour: i64) -> Self {
        Self(hour.clamp(0, i64::from(HOURS_PER_DAY - 1)) as u8)
    }

    /// Raw hour value.
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    /// Iterate all 24 slots in order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..HOURS_PER_DAY).map(Self)
    }

    /// Three-digit zero-padded suffix used in layer ids and asset paths (`"005"`).
    #[must_use]
    pub fn suffix(self) -> String {
        format!("{:03}", self.0)
    }

    /// Clock label for the slot (`"05:00"`).
    #[must_use]
    pub fn label(self) -> String {
        format!("{:02}:00", self.0)
    }
}

impl fmt::Display for HourIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:00", self.0)
    }
}

impl TryFrom<u8> for HourIndex {
    type Error = HourOutOfRange;

    fn try_from(hour: u8) -> Result<Self, Self::Error> {
        Self::new(hour).ok_or(HourOutOfRange(u32::from(hour)))
    }
}

impl TryFrom<u32> for HourIndex {
    type Error = HourOutOfRange;

    fn try_from(hour: u32) -> Result<Self, Self::Error> {
        u8::try_from(hour)
            .ok()
            .and_then(Self::new)
            .ok_or(HourOutOfRange(hour))
    }
}

impl FromStr for HourIndex {
    type Err = HourParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let hour = s
            .parse::<u32>()
            .ok()
            .ok_or_else(|| HourParseError::NotANumber(s.to_string()))?;
        Ok(Self::try_from(hour)?)
    }
}

/// Error returned when a dataset date string cannot be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid dataset date '{0}', expected YYYY-MM-DD or YYYYMMDD")]
pub struct DateParseError(pub String);

/// The single calendar day a dataset covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetDate(NaiveDate);

impl DatasetDate {
    #[must_use]
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Compact form used in asset names (`"20251101"`).
    #[must_use]
    pub fn compact(&self) -> String {
        self.0.format("%Y%m%d").to_string()
    }

    /// Label shown above the time slider (`"2025/11/01 09:00"`).
    #[must_use]
    pub fn selector_label(&self, hour: HourIndex) -> String {
        format!("{} {}", self.0.format("%Y/%m/%d"), hour.label())
    }
}

impl Default for DatasetDate {
    fn default() -> Self {
        Self(NaiveDate::from_ymd_opt(2025, 11, 1).expect("2025-11-01 is a valid date"))
    }
}

impl fmt::Display for DatasetDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for DatasetDate {
    type Err = DateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(s, "%Y%m%d"))
            .ok()
            .map(Self)
            .ok_or_else(|| DateParseError(s.to_string()))
    }
}
