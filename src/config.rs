//! Configuration, cached daylight window, override state, and path resolution.
//!
//! Sectioned INI parser for config.ini. JSON cache and override files via serde.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::schedule::{ConfigurationError, ScheduleParams};
use crate::window::{DaylightWindow, TimeOfDay, WindowSource};
use crate::{
    DEFAULT_MAX_TEMP, DEFAULT_MIN_TEMP, DEFAULT_RAMP_HOURS, FETCH_TIMEOUT_SEC, POLL_INTERVAL_SEC,
};

pub const DEFAULT_SERVICE_URL: &str = "https://api.ipgeolocation.io/astronomy";
pub const API_KEY_ENV: &str = "CIRCADIA_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("config line {line}: {msg}")]
    Parse { line: usize, msg: String },
    #[error(transparent)]
    Schedule(#[from] ConfigurationError),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Resolved filesystem paths
#[derive(Debug, Clone)]
pub struct Paths {
    pub config_file: PathBuf,
    pub cache_file: PathBuf,
    pub override_file: PathBuf,
    pub pid_file: PathBuf,
}

impl Paths {
    pub fn init() -> Result<Self, io::Error> {
        let home = std::env::var("HOME")
            .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
        Self::in_dir(PathBuf::from(home).join(".config").join("circadia"))
    }

    pub fn in_dir(config_dir: PathBuf) -> Result<Self, io::Error> {
        fs::create_dir_all(&config_dir)?;
        Ok(Self {
            config_file: config_dir.join("config.ini"),
            cache_file: config_dir.join("daylight_cache.json"),
            override_file: config_dir.join("override.json"),
            pid_file: config_dir.join("daemon.pid"),
        })
    }
}

/// Where the strip is
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    Coordinates { lat: f64, lon: f64 },
    Named(String),
}

impl Location {
    /// `LAT,LON` becomes coordinates, anything else a place name
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        if let Some((lat, lon)) = s.split_once(',') {
            if let (Ok(lat), Ok(lon)) = (lat.trim().parse::<f64>(), lon.trim().parse::<f64>()) {
                if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) {
                    return Some(Location::Coordinates { lat, lon });
                }
                return None;
            }
        }
        Some(Location::Named(s.to_string()))
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Coordinates { lat, lon } => write!(f, "{lat:.4}, {lon:.4}"),
            Location::Named(name) => write!(f, "{name}"),
        }
    }
}

/// Astronomy service settings
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub api_key: Option<String>,
    pub url: String,
    pub timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            url: DEFAULT_SERVICE_URL.to_string(),
            timeout: Duration::from_secs(FETCH_TIMEOUT_SEC),
        }
    }
}

/// Which strip driver to open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendChoice {
    Auto,
    Ws281x,
    Console,
}

/// Static strip hardware parameters
#[derive(Debug, Clone, PartialEq)]
pub struct StripConfig {
    pub backend: BackendChoice,
    pub count: usize,
    pub pin: i32,
    pub freq_hz: u32,
    pub dma: i32,
    pub invert: bool,
    pub brightness: u8,
    pub channel: usize,
}

impl Default for StripConfig {
    fn default() -> Self {
        Self {
            backend: BackendChoice::Auto,
            count: 119,
            pin: 18,
            freq_hz: 800_000,
            dma: 10,
            invert: false,
            brightness: 255,
            channel: 0,
        }
    }
}

/// Everything read from config.ini
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub location: Option<Location>,
    pub service: ServiceConfig,
    pub strip: StripConfig,
    pub schedule: ScheduleParams,
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            location: None,
            service: ServiceConfig::default(),
            strip: StripConfig::default(),
            schedule: ScheduleParams::default(),
            poll_interval: Duration::from_secs(POLL_INTERVAL_SEC),
        }
    }
}

fn parse_value<T: std::str::FromStr>(line: usize, key: &str, value: &str) -> Result<T, Error> {
    value.parse().map_err(|_| Error::Parse {
        line,
        msg: format!("invalid value {value:?} for {key}"),
    })
}

fn parse_bool(line: usize, key: &str, value: &str) -> Result<bool, Error> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Parse {
            line,
            msg: format!("invalid boolean {value:?} for {key}"),
        }),
    }
}

/// Parse config.ini contents. Unknown sections and keys are ignored.
pub fn parse_config(content: &str) -> Result<Config, Error> {
    let mut config = Config::default();

    let mut lat: Option<f64> = None;
    let mut lon: Option<f64> = None;
    let mut name: Option<String> = None;
    let mut min_temp = DEFAULT_MIN_TEMP;
    let mut max_temp = DEFAULT_MAX_TEMP;
    let mut ramp_hours = DEFAULT_RAMP_HOURS;
    let mut section = String::new();

    for (idx, line) in content.lines().enumerate() {
        let n = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        if trimmed.starts_with('[') {
            section = trimmed.trim_matches(|c| c == '[' || c == ']').trim().to_string();
            continue;
        }

        let Some((key, value)) = trimmed.split_once('=') else {
            return Err(Error::Parse {
                line: n,
                msg: format!("expected key = value, got {trimmed:?}"),
            });
        };
        let key = key.trim();
        let value = value.trim();

        match (section.as_str(), key) {
            ("location", "latitude") => lat = Some(parse_value(n, key, value)?),
            ("location", "longitude") => lon = Some(parse_value(n, key, value)?),
            ("location", "name") if !value.is_empty() => name = Some(value.to_string()),

            ("service", "api_key") if !value.is_empty() => {
                config.service.api_key = Some(value.to_string())
            }
            ("service", "url") => config.service.url = value.to_string(),
            ("service", "timeout_secs") => {
                let secs: u64 = parse_value(n, key, value)?;
                if secs == 0 {
                    return Err(Error::Parse {
                        line: n,
                        msg: "timeout_secs must be positive".to_string(),
                    });
                }
                config.service.timeout = Duration::from_secs(secs);
            }

            ("strip", "backend") => {
                config.strip.backend = match value {
                    "auto" => BackendChoice::Auto,
                    "ws281x" => BackendChoice::Ws281x,
                    "console" => BackendChoice::Console,
                    _ => {
                        return Err(Error::Parse {
                            line: n,
                            msg: format!("unknown backend {value:?}"),
                        })
                    }
                }
            }
            ("strip", "count") => config.strip.count = parse_value(n, key, value)?,
            ("strip", "pin") => config.strip.pin = parse_value(n, key, value)?,
            ("strip", "freq_hz") => config.strip.freq_hz = parse_value(n, key, value)?,
            ("strip", "dma") => config.strip.dma = parse_value(n, key, value)?,
            ("strip", "invert") => config.strip.invert = parse_bool(n, key, value)?,
            ("strip", "brightness") => config.strip.brightness = parse_value(n, key, value)?,
            ("strip", "channel") => config.strip.channel = parse_value(n, key, value)?,

            ("schedule", "min_temp") => min_temp = parse_value(n, key, value)?,
            ("schedule", "max_temp") => max_temp = parse_value(n, key, value)?,
            ("schedule", "ramp_hours") => ramp_hours = parse_value(n, key, value)?,
            ("schedule", "poll_secs") => {
                let secs: u64 = parse_value(n, key, value)?;
                if secs == 0 {
                    return Err(Error::Parse {
                        line: n,
                        msg: "poll_secs must be positive".to_string(),
                    });
                }
                config.poll_interval = Duration::from_secs(secs);
            }
            _ => {}
        }
    }

    config.location = match (lat, lon, name) {
        (Some(lat), Some(lon), _) => Some(Location::Coordinates { lat, lon }),
        (_, _, Some(name)) => Some(Location::Named(name)),
        _ => None,
    };
    config.schedule = ScheduleParams::new(min_temp, max_temp, ramp_hours)?;

    Ok(config)
}

/// Load config.ini, falling back to defaults when it does not exist yet.
/// The API key environment variable wins over the file.
pub fn load_config(paths: &Paths) -> Result<Config, Error> {
    let mut config = match fs::read_to_string(&paths.config_file) {
        Ok(content) => parse_config(&content)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Config::default(),
        Err(e) => return Err(e.into()),
    };

    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            config.service.api_key = Some(key.trim().to_string());
        }
    }
    Ok(config)
}

/// Set `key = value` inside `[section]`, keeping every other line intact.
pub fn set_ini_value(content: &str, section: &str, key: &str, value: &str) -> String {
    let header = format!("[{section}]");
    let mut out: Vec<String> = Vec::new();
    let mut in_section = false;
    let mut seen_section = false;
    let mut written = false;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            if in_section && !written {
                out.push(format!("{key} = {value}"));
                written = true;
            }
            in_section = trimmed == header;
            seen_section |= in_section;
        } else if in_section {
            if let Some((k, _)) = trimmed.split_once('=') {
                if k.trim() == key {
                    if !written {
                        out.push(format!("{key} = {value}"));
                        written = true;
                    }
                    continue;
                }
            }
        }
        out.push(line.to_string());
    }

    if !written {
        if !seen_section {
            if out.last().is_some_and(|l| !l.trim().is_empty()) {
                out.push(String::new());
            }
            out.push(header);
        }
        out.push(format!("{key} = {value}"));
    }

    let mut result = out.join("\n");
    result.push('\n');
    result
}

/// Drop `key` from `[section]`
pub fn remove_ini_value(content: &str, section: &str, key: &str) -> String {
    let header = format!("[{section}]");
    let mut in_section = false;
    let mut out: Vec<&str> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            in_section = trimmed == header;
        } else if in_section {
            if let Some((k, _)) = trimmed.split_once('=') {
                if k.trim() == key {
                    continue;
                }
            }
        }
        out.push(line);
    }

    let mut result = out.join("\n");
    result.push('\n');
    result
}

fn edit_config(paths: &Paths, edit: impl FnOnce(String) -> String) -> Result<(), Error> {
    let content = match fs::read_to_string(&paths.config_file) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    let updated = edit(content);
    // refuse to write something the daemon could not read back
    parse_config(&updated)?;
    fs::write(&paths.config_file, updated)?;
    Ok(())
}

/// Save location into config.ini
pub fn save_location(paths: &Paths, location: &Location) -> Result<(), Error> {
    edit_config(paths, |content| match location {
        Location::Coordinates { lat, lon } => {
            let c = remove_ini_value(&content, "location", "name");
            let c = set_ini_value(&c, "location", "latitude", &format!("{lat:.6}"));
            set_ini_value(&c, "location", "longitude", &format!("{lon:.6}"))
        }
        Location::Named(name) => {
            let c = remove_ini_value(&content, "location", "latitude");
            let c = remove_ini_value(&c, "location", "longitude");
            set_ini_value(&c, "location", "name", name)
        }
    })
}

/// Save the astronomy service API key into config.ini
pub fn save_api_key(paths: &Paths, key: &str) -> Result<(), Error> {
    edit_config(paths, |content| set_ini_value(&content, "service", "api_key", key))
}

// --- daylight cache ---

#[derive(Serialize, Deserialize)]
struct DaylightCacheJson {
    date: NaiveDate,
    sunrise: TimeOfDay,
    sunset: TimeOfDay,
    #[serde(default = "default_source")]
    source: WindowSource,
}

fn default_source() -> WindowSource {
    WindowSource::Service
}

/// Load the last stored window, labelled as coming from the cache.
pub fn load_daylight_cache(paths: &Paths) -> Option<DaylightWindow> {
    let content = fs::read_to_string(&paths.cache_file).ok()?;
    if content.len() > 4096 {
        return None;
    }
    let cached: DaylightCacheJson = serde_json::from_str(&content).ok()?;
    DaylightWindow::new(cached.date, cached.sunrise, cached.sunset, cached.source)
        .ok()
        .map(|w| w.with_source(WindowSource::Cache))
}

/// Store a window
pub fn save_daylight_cache(paths: &Paths, window: &DaylightWindow) -> Result<(), Error> {
    let cached = DaylightCacheJson {
        date: window.date(),
        sunrise: window.sunrise(),
        sunset: window.sunset(),
        source: window.source(),
    };
    let json = serde_json::to_string_pretty(&cached)?;
    fs::write(&paths.cache_file, json)?;
    Ok(())
}

// --- manual override ---

/// Manual override state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverrideState {
    pub active: bool,
    pub target_temp: i32,
    pub duration_minutes: i32,
    pub issued_at: NaiveDateTime,
    /// Filled in by the daemon when it picks the override up
    #[serde(default)]
    pub start_temp: Option<f64>,
}

/// Load override state from JSON
pub fn load_override(paths: &Paths) -> Option<OverrideState> {
    let content = fs::read_to_string(&paths.override_file).ok()?;
    if content.len() > 4096 {
        return None;
    }
    serde_json::from_str(&content).ok()
}

/// Save override state to JSON
pub fn save_override(paths: &Paths, ovr: &OverrideState) -> Result<(), Error> {
    let json = serde_json::to_string_pretty(ovr)?;
    fs::write(&paths.override_file, json)?;
    Ok(())
}

/// Clear override file
pub fn clear_override(paths: &Paths) {
    let _ = fs::remove_file(&paths.override_file);
}

// --- PID file ---

fn read_pid(path: &Path) -> Option<i32> {
    let pid: i32 = fs::read_to_string(path).ok()?.trim().parse().ok()?;
    (pid > 0).then_some(pid)
}

/// Check if daemon process is alive via PID file
pub fn check_daemon_alive(paths: &Paths) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match read_pid(&paths.pid_file) {
        Some(pid) => kill(Pid::from_raw(pid), None).is_ok(),
        None => false,
    }
}

/// Write daemon PID to PID file
pub fn write_pid(paths: &Paths) -> Result<(), io::Error> {
    fs::write(&paths.pid_file, format!("{}\n", nix::unistd::getpid()))
}

/// Remove daemon PID file
pub fn remove_pid(paths: &Paths) {
    let _ = fs::remove_file(&paths.pid_file);
}
