//! Daylight window providers.
//!
//! Astronomy service (ipgeolocation style):
//!   GET {url}?apiKey=KEY&location=NAME   or   ?apiKey=KEY&lat=..&long=..
//!   -> { "date": "YYYY-MM-DD", "sunrise": "HH:MM", "sunset": "HH:MM", ... }
//! Payloads that nest the times under "results" are accepted as well.
//!
//! The NOAA solar calculation stands in when no API key is configured, or
//! when the service is down and no window has been obtained yet.
//! When compiled without the "http" feature the service provider always fails.

use chrono::NaiveDate;

use crate::config::Location;
use crate::solar;
use crate::window::{DaylightWindow, TimeOfDay, WindowSource};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("network error: {0}")]
    Network(String),
    #[error("service returned HTTP {0}")]
    Status(u16),
    #[error("malformed payload: {0}")]
    Payload(String),
    #[error("sun does not rise and set on {0}")]
    NoWindow(NaiveDate),
    #[error("provider needs coordinates, got a place name")]
    NeedsCoordinates,
    #[error("HTTP support not compiled in")]
    Disabled,
}

/// Source of today's sunrise and sunset
pub trait DaylightProvider: Send + Sync {
    fn name(&self) -> &str;

    fn fetch_today(&self, today: NaiveDate) -> Result<DaylightWindow, Error>;
}

fn clock_field(fields: &serde_json::Value, key: &str) -> Result<TimeOfDay, Error> {
    let raw = fields[key]
        .as_str()
        .ok_or_else(|| Error::Payload(format!("missing {key}")))?;
    raw.parse()
        .map_err(|e: crate::window::Error| Error::Payload(format!("{key}: {e}")))
}

/// Parse an astronomy response body into a window.
///
/// Each event is read from its own field. `date` falls back to `today`.
pub fn parse_payload(body: &str, today: NaiveDate) -> Result<DaylightWindow, Error> {
    let resp: serde_json::Value =
        serde_json::from_str(body).map_err(|e| Error::Payload(e.to_string()))?;

    let fields = if resp["results"].is_object() {
        &resp["results"]
    } else {
        &resp
    };

    let sunrise = clock_field(fields, "sunrise")?;
    let sunset = clock_field(fields, "sunset")?;

    let date = match fields["date"].as_str().or_else(|| resp["date"].as_str()) {
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map_err(|e| Error::Payload(format!("date {d:?}: {e}")))?,
        None => today,
    };

    DaylightWindow::new(date, sunrise, sunset, WindowSource::Service)
        .map_err(|e| Error::Payload(e.to_string()))
}

// --- astronomy service ---

#[cfg(feature = "http")]
pub struct HttpProvider {
    agent: ureq::Agent,
    url: String,
    api_key: String,
    location: Location,
}

#[cfg(feature = "http")]
impl HttpProvider {
    pub fn new(url: &str, api_key: &str, location: Location, timeout: std::time::Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("circadia/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            url: url.to_string(),
            api_key: api_key.to_string(),
            location,
        }
    }

    fn get(&self) -> Result<String, Error> {
        let mut req = self.agent.get(&self.url).query("apiKey", &self.api_key);
        req = match &self.location {
            Location::Coordinates { lat, lon } => req
                .query("lat", &format!("{lat:.4}"))
                .query("long", &format!("{lon:.4}")),
            Location::Named(name) => req.query("location", name),
        };

        match req.call() {
            Ok(resp) => resp.into_string().map_err(|e| Error::Network(e.to_string())),
            Err(ureq::Error::Status(code, _)) => Err(Error::Status(code)),
            Err(ureq::Error::Transport(t)) => Err(Error::Network(t.to_string())),
        }
    }
}

#[cfg(feature = "http")]
impl DaylightProvider for HttpProvider {
    fn name(&self) -> &str {
        "service"
    }

    fn fetch_today(&self, today: NaiveDate) -> Result<DaylightWindow, Error> {
        let body = self.get()?;
        let window = parse_payload(&body, today)?;
        tracing::debug!(
            sunrise = %window.sunrise(),
            sunset = %window.sunset(),
            date = %window.date(),
            "astronomy service answered"
        );
        Ok(window)
    }
}

#[cfg(not(feature = "http"))]
pub struct HttpProvider;

#[cfg(not(feature = "http"))]
impl HttpProvider {
    pub fn new(
        _url: &str,
        _api_key: &str,
        _location: Location,
        _timeout: std::time::Duration,
    ) -> Self {
        Self
    }
}

#[cfg(not(feature = "http"))]
impl DaylightProvider for HttpProvider {
    fn name(&self) -> &str {
        "service"
    }

    fn fetch_today(&self, _today: NaiveDate) -> Result<DaylightWindow, Error> {
        Err(Error::Disabled)
    }
}

// --- NOAA calculation ---

pub struct SolarProvider {
    lat: f64,
    lon: f64,
    utc_offset_hours: Option<f64>,
}

impl SolarProvider {
    /// Calculation in the system time zone
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            utc_offset_hours: None,
        }
    }

    /// Calculation at a fixed offset east of UTC
    pub fn with_offset(lat: f64, lon: f64, utc_offset_hours: f64) -> Self {
        Self {
            lat,
            lon,
            utc_offset_hours: Some(utc_offset_hours),
        }
    }

    pub fn for_location(location: &Location) -> Result<Self, Error> {
        match location {
            Location::Coordinates { lat, lon } => Ok(Self::new(*lat, *lon)),
            Location::Named(_) => Err(Error::NeedsCoordinates),
        }
    }
}

impl DaylightProvider for SolarProvider {
    fn name(&self) -> &str {
        "solar"
    }

    fn fetch_today(&self, today: NaiveDate) -> Result<DaylightWindow, Error> {
        let offset = self
            .utc_offset_hours
            .unwrap_or_else(|| solar::local_offset_hours(today));

        let (rise, set) =
            solar::sunrise_sunset(today, offset, self.lat, self.lon).ok_or(Error::NoWindow(today))?;

        // events pushed across midnight by the offset don't form a usable day
        if !(0.0..24.0).contains(&rise) || !(0.0..24.0).contains(&set) {
            return Err(Error::NoWindow(today));
        }

        DaylightWindow::new(
            today,
            TimeOfDay::from_hours(rise),
            TimeOfDay::from_hours(set),
            WindowSource::Solar,
        )
        .map_err(|_| Error::NoWindow(today))
    }
}
