//! Time-of-day values and the daily sunrise/sunset window.
//!
//! A [`DaylightWindow`] is immutable once built. The daemon publishes the
//! current one through a [`WindowCell`], which swaps whole `Arc`s so a reader
//! never observes a half-updated window.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Timelike};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("invalid time of day {0:?} (expected HH:MM)")]
    InvalidTime(String),
    #[error("sunrise {sunrise} must precede sunset {sunset} within the day")]
    Ordering { sunrise: TimeOfDay, sunset: TimeOfDay },
}

/// Wall-clock time of day with minute resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    /// Fractional hours in [0, 24)
    pub fn hours(self) -> f64 {
        self.hour as f64 + self.minute as f64 / 60.0
    }

    /// Nearest minute to a fractional hour value. Values outside the day wrap.
    pub fn from_hours(hours: f64) -> Self {
        let total = (hours * 60.0).round().rem_euclid(24.0 * 60.0) as u32;
        Self {
            hour: (total / 60) as u8,
            minute: (total % 60) as u8,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = Error;

    /// Accepts `H:MM`, `HH:MM` and `HH:MM:SS` (seconds are dropped).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidTime(s.to_string());
        let mut parts = s.trim().split(':');

        let hour: u8 = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
        let minute: u8 = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
        if let Some(sec) = parts.next() {
            sec.parse::<u8>().map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }

        Self::new(hour, minute).ok_or_else(invalid)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Fractional hours of a clock time, including seconds
pub fn fractional_hours(time: NaiveTime) -> f64 {
    time.hour() as f64 + time.minute() as f64 / 60.0 + time.second() as f64 / 3600.0
}

/// Where a window came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowSource {
    Service,
    Solar,
    Cache,
}

impl fmt::Display for WindowSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowSource::Service => write!(f, "service"),
            WindowSource::Solar => write!(f, "solar"),
            WindowSource::Cache => write!(f, "cache"),
        }
    }
}

/// Sunrise and sunset for one calendar day
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DaylightWindow {
    date: NaiveDate,
    sunrise: TimeOfDay,
    sunset: TimeOfDay,
    source: WindowSource,
}

impl DaylightWindow {
    pub fn new(
        date: NaiveDate,
        sunrise: TimeOfDay,
        sunset: TimeOfDay,
        source: WindowSource,
    ) -> Result<Self, Error> {
        // 00:00 is excluded so that 0 < sunrise < sunset < 24 holds strictly
        if sunrise.hours() <= 0.0 || sunrise >= sunset {
            return Err(Error::Ordering { sunrise, sunset });
        }
        Ok(Self {
            date,
            sunrise,
            sunset,
            source,
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn sunrise(&self) -> TimeOfDay {
        self.sunrise
    }

    pub fn sunset(&self) -> TimeOfDay {
        self.sunset
    }

    pub fn source(&self) -> WindowSource {
        self.source
    }

    /// Same times, relabelled (used when a window is reloaded from disk)
    pub fn with_source(self, source: WindowSource) -> Self {
        Self { source, ..self }
    }
}

/// Single-writer, many-reader snapshot of the active window
#[derive(Default)]
pub struct WindowCell {
    inner: RwLock<Option<Arc<DaylightWindow>>>,
}

impl WindowCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(window: DaylightWindow) -> Self {
        Self {
            inner: RwLock::new(Some(Arc::new(window))),
        }
    }

    /// Current snapshot. Holding it does not block a concurrent publish.
    pub fn load(&self) -> Option<Arc<DaylightWindow>> {
        self.inner.read().clone()
    }

    /// Replace the window wholesale
    pub fn publish(&self, window: DaylightWindow) {
        *self.inner.write() = Some(Arc::new(window));
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_none()
    }
}
