//! circadia - circadian color temperature for addressable LED strips.
//!
//! Pure core: [`schedule`] maps time-of-day to a color temperature and
//! [`kelvin`] maps a temperature to RGB. Everything else is plumbing around
//! those two: the daylight window providers, the strip backends, the
//! configuration files and the daemon loop.

pub mod config;
pub mod daemon;
pub mod daylight;
pub mod kelvin;
pub mod schedule;
pub mod solar;
pub mod strip;
pub mod window;

pub use kelvin::{convert, DomainError, Rgb};
pub use schedule::{schedule, ConfigurationError, ScheduleParams};
pub use window::{DaylightWindow, TimeOfDay, WindowCell, WindowSource};

/// Default temperature bounds for the schedule (Kelvin)
pub const DEFAULT_MIN_TEMP: f64 = 650.0;
pub const DEFAULT_MAX_TEMP: f64 = 4000.0;

/// Default ramp width around sunrise and sunset (hours)
pub const DEFAULT_RAMP_HOURS: f64 = 2.0;

/// Range accepted for manual overrides (Kelvin)
pub const OVERRIDE_TEMP_MIN: i32 = 1000;
pub const OVERRIDE_TEMP_MAX: i32 = 40000;

/// Timing
pub const POLL_INTERVAL_SEC: u64 = 60;
pub const FETCH_TIMEOUT_SEC: u64 = 5;

/// Manual override default ramp (minutes)
pub const OVERRIDE_DEFAULT_MINUTES: i32 = 3;
