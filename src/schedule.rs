//! Time-of-day to color temperature.
//!
//! Night holds `min`, day holds `max`. Around sunrise and sunset a half sine
//! period of width `hours` joins the two, centered on the event, so value
//! and slope are continuous at every region boundary.
//! Manual overrides ease along the same curve family over [0, duration].

use std::f64::consts::PI;

use chrono::NaiveDateTime;

use crate::window::{fractional_hours, DaylightWindow};

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("non-finite schedule input")]
    NotFinite,
    #[error("ramp width must be positive (got {0} h)")]
    RampWidth(f64),
    #[error("temperature bounds must satisfy 0 < min < max (got min {min}, max {max})")]
    Bounds { min: f64, max: f64 },
    #[error("sunrise {sunrise} h must precede sunset {sunset} h")]
    Ordering { sunrise: f64, sunset: f64 },
    #[error("{hours} h ramps overlap: only {span} h between sunrise and sunset")]
    OverlappingRamps { hours: f64, span: f64 },
}

fn check(
    sunrise: f64,
    sunset: f64,
    max: f64,
    min: f64,
    hours: f64,
) -> Result<(), ConfigurationError> {
    if ![sunrise, sunset, max, min, hours].iter().all(|v| v.is_finite()) {
        return Err(ConfigurationError::NotFinite);
    }
    if hours <= 0.0 {
        return Err(ConfigurationError::RampWidth(hours));
    }
    if min <= 0.0 || min >= max {
        return Err(ConfigurationError::Bounds { min, max });
    }
    if sunrise >= sunset {
        return Err(ConfigurationError::Ordering { sunrise, sunset });
    }
    let span = sunset - sunrise;
    if span < hours {
        return Err(ConfigurationError::OverlappingRamps { hours, span });
    }
    Ok(())
}

/// Target color temperature at `time` (fractional hours).
///
/// Result lies in `[min, max]`. Configurations whose ramps would overlap
/// (`sunset - sunrise < hours`) are rejected rather than given a precedence.
pub fn schedule(
    time: f64,
    sunrise: f64,
    sunset: f64,
    max: f64,
    min: f64,
    hours: f64,
) -> Result<f64, ConfigurationError> {
    check(sunrise, sunset, max, min, hours)?;
    if !time.is_finite() {
        return Err(ConfigurationError::NotFinite);
    }

    let n = PI / hours;
    let half = hours / 2.0;
    let amplitude = (max - min) / 2.0;
    let midpoint = (max + min) / 2.0;

    let temp = if time < sunrise - half {
        min
    } else if time < sunrise + half {
        amplitude * (n * (time - sunrise)).sin() + midpoint
    } else if time < sunset - half {
        max
    } else if time < sunset + half {
        -amplitude * (n * (time - sunset)).sin() + midpoint
    } else {
        min
    };

    // sin() can land an ulp outside [-1, 1] scaled back up
    Ok(temp.clamp(min, max))
}

/// Validated temperature bounds and ramp width
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleParams {
    min_temp: f64,
    max_temp: f64,
    ramp_hours: f64,
}

impl ScheduleParams {
    pub fn new(min_temp: f64, max_temp: f64, ramp_hours: f64) -> Result<Self, ConfigurationError> {
        if ![min_temp, max_temp, ramp_hours].iter().all(|v| v.is_finite()) {
            return Err(ConfigurationError::NotFinite);
        }
        if ramp_hours <= 0.0 {
            return Err(ConfigurationError::RampWidth(ramp_hours));
        }
        if min_temp <= 0.0 || min_temp >= max_temp {
            return Err(ConfigurationError::Bounds {
                min: min_temp,
                max: max_temp,
            });
        }
        Ok(Self {
            min_temp,
            max_temp,
            ramp_hours,
        })
    }

    pub fn min_temp(&self) -> f64 {
        self.min_temp
    }

    pub fn max_temp(&self) -> f64 {
        self.max_temp
    }

    pub fn ramp_hours(&self) -> f64 {
        self.ramp_hours
    }

    /// Scheduled temperature for `time` against a day's window
    pub fn temperature_at(
        &self,
        time: f64,
        window: &DaylightWindow,
    ) -> Result<f64, ConfigurationError> {
        schedule(
            time,
            window.sunrise().hours(),
            window.sunset().hours(),
            self.max_temp,
            self.min_temp,
            self.ramp_hours,
        )
    }
}

impl Default for ScheduleParams {
    fn default() -> Self {
        Self {
            min_temp: crate::DEFAULT_MIN_TEMP,
            max_temp: crate::DEFAULT_MAX_TEMP,
            ramp_hours: crate::DEFAULT_RAMP_HOURS,
        }
    }
}

/// Manual override temperature `elapsed_min` minutes into a ramp.
pub fn manual_temp(start: f64, target: f64, elapsed_min: f64, duration_min: i32) -> f64 {
    if duration_min <= 0 || elapsed_min >= duration_min as f64 {
        return target;
    }
    if elapsed_min <= 0.0 {
        return start;
    }

    let frac = elapsed_min / duration_min as f64;
    let factor = (1.0 - (PI * frac).cos()) / 2.0;
    start + (target - start) * factor
}

/// Whether a finished override should hand control back to the schedule.
///
/// Resume happens at the start of the first ramp window after the override
/// was issued, or at the first tick of a later calendar day.
pub fn resume_due(
    issued: NaiveDateTime,
    now: NaiveDateTime,
    window: &DaylightWindow,
    hours: f64,
) -> bool {
    if now.date() != issued.date() {
        return now > issued;
    }

    let issued_h = fractional_hours(issued.time());
    let now_h = fractional_hours(now.time());
    let half = hours / 2.0;

    [window.sunrise().hours() - half, window.sunset().hours() - half]
        .into_iter()
        .find(|&start| start > issued_h)
        .map(|start| now_h >= start)
        .unwrap_or(false)
}
