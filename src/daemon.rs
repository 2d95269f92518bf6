//! Daemon poll loop.
//!
//! One tick per poll interval: refresh the daylight window if the day
//! rolled over, pick up manual override changes, schedule -> convert ->
//! push to the strip. SIGTERM/SIGINT are blocked and read from a signalfd
//! between ticks for clean shutdown. The network refresh runs on its own
//! thread and publishes through the shared `WindowCell`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate, NaiveDateTime};
use nix::sys::signal::{SigSet, Signal};
use nix::sys::signalfd::{SfdFlags, SignalFd};

use crate::config::{self, Config, Paths};
use crate::daylight::{self, DaylightProvider, HttpProvider, SolarProvider};
use crate::kelvin::{self, Rgb};
use crate::schedule::{self, ConfigurationError};
use crate::strip::{self, Strip};
use crate::window::{fractional_hours, DaylightWindow, WindowCell};

const STRIP_INIT_MAX_RETRIES: u32 = 10;
const STRIP_INIT_RETRY_MS: u64 = 500;
const SHUTDOWN_CHECK: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no location configured (use --set-location)")]
    NoLocation,
    #[error("place name {0:?} needs an API key for the astronomy service (use --set-key)")]
    NoProvider(String),
    #[error(transparent)]
    Strip(#[from] strip::Error),
    #[error("signal setup failed: {0}")]
    Signal(#[from] nix::Error),
}

/// Immutable per-run context handed to every tick
pub struct Context {
    pub config: Config,
    pub paths: Paths,
}

/// Providers in preference order for a configuration.
///
/// The astronomy service comes first when an API key is set; the NOAA
/// calculation follows whenever coordinates are known.
pub fn build_providers(config: &Config) -> Result<Vec<Arc<dyn DaylightProvider>>, Error> {
    let location = config.location.clone().ok_or(Error::NoLocation)?;
    let mut providers: Vec<Arc<dyn DaylightProvider>> = Vec::new();

    if let Some(ref key) = config.service.api_key {
        providers.push(Arc::new(HttpProvider::new(
            &config.service.url,
            key,
            location.clone(),
            config.service.timeout,
        )));
    }
    if let Ok(solar) = SolarProvider::for_location(&location) {
        providers.push(Arc::new(solar));
    }

    if providers.is_empty() {
        return Err(Error::NoProvider(location.to_string()));
    }
    Ok(providers)
}

/// Try providers in order and publish the first window obtained.
///
/// Fallback providers only run while no window exists at all; otherwise a
/// failure of the first provider leaves the previous window in place.
pub fn refresh_window(
    providers: &[Arc<dyn DaylightProvider>],
    windows: &WindowCell,
    paths: Option<&Paths>,
    today: NaiveDate,
) -> Result<DaylightWindow, daylight::Error> {
    let mut last_err = daylight::Error::NoWindow(today);

    for (idx, provider) in providers.iter().enumerate() {
        if idx > 0 && !windows.is_empty() {
            break;
        }
        match provider.fetch_today(today) {
            Ok(window) => {
                windows.publish(window);
                if let Some(paths) = paths {
                    if let Err(e) = config::save_daylight_cache(paths, &window) {
                        tracing::warn!(error = %e, "failed to write daylight cache");
                    }
                }
                tracing::info!(
                    provider = provider.name(),
                    date = %window.date(),
                    sunrise = %window.sunrise(),
                    sunset = %window.sunset(),
                    "daylight window updated"
                );
                return Ok(window);
            }
            Err(e) => {
                tracing::warn!(provider = provider.name(), error = %e, "daylight fetch failed");
                last_err = e;
            }
        }
    }

    if let Some(stale) = windows.load() {
        tracing::warn!(
            date = %stale.date(),
            sunrise = %stale.sunrise(),
            sunset = %stale.sunset(),
            "keeping previous daylight window"
        );
    }
    Err(last_err)
}

/// Scheduled refresh. Provider failures are already logged; the next
/// attempt is governed by `Refresher::due`.
fn refresh_attempt(
    providers: &[Arc<dyn DaylightProvider>],
    windows: &WindowCell,
    paths: Option<&Paths>,
    today: NaiveDate,
) {
    if refresh_window(providers, windows, paths, today).is_err() {
        tracing::debug!(%today, has_window = !windows.is_empty(), "refresh unsuccessful");
    }
}

/// Whether a refresh runs on a worker thread or inside the tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    Background,
    Inline,
}

/// Once-per-day window refresh bookkeeping
pub struct Refresher {
    providers: Arc<Vec<Arc<dyn DaylightProvider>>>,
    windows: Arc<WindowCell>,
    paths: Option<Paths>,
    mode: RefreshMode,
    in_flight: Arc<AtomicBool>,
    last_attempt: Option<NaiveDate>,
}

impl Refresher {
    pub fn new(
        providers: Vec<Arc<dyn DaylightProvider>>,
        windows: Arc<WindowCell>,
        paths: Option<Paths>,
        mode: RefreshMode,
    ) -> Self {
        Self {
            providers: Arc::new(providers),
            windows,
            paths,
            mode,
            in_flight: Arc::new(AtomicBool::new(false)),
            last_attempt: None,
        }
    }

    /// No window yet: every tick. Otherwise once per calendar day until
    /// the window describes today.
    pub fn due(&self, today: NaiveDate) -> bool {
        match self.windows.load() {
            None => true,
            Some(w) => w.date() != today && self.last_attempt != Some(today),
        }
    }

    pub fn poll(&mut self, today: NaiveDate) {
        if !self.due(today) || self.in_flight.swap(true, Ordering::AcqRel) {
            return;
        }
        self.last_attempt = Some(today);

        match self.mode {
            RefreshMode::Inline => {
                refresh_attempt(&self.providers, &self.windows, self.paths.as_ref(), today);
                self.in_flight.store(false, Ordering::Release);
            }
            RefreshMode::Background => {
                let providers = Arc::clone(&self.providers);
                let windows = Arc::clone(&self.windows);
                let paths = self.paths.clone();
                let in_flight = Arc::clone(&self.in_flight);

                let spawned = std::thread::Builder::new()
                    .name("daylight-refresh".into())
                    .spawn(move || {
                        refresh_attempt(&providers, &windows, paths.as_ref(), today);
                        in_flight.store(false, Ordering::Release);
                    });
                if let Err(e) = spawned {
                    tracing::warn!(error = %e, "could not start daylight refresh");
                    self.in_flight.store(false, Ordering::Release);
                }
            }
        }
    }
}

#[derive(Clone, Copy)]
struct Manual {
    issued_at: NaiveDateTime,
    start_temp: f64,
    target_temp: f64,
    duration_min: i32,
}

/// What a tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Strip updated to a new color
    Applied { temp: f64, color: Rgb },
    /// Color unchanged since the last tick
    Held { temp: f64, color: Rgb },
    /// Nothing to schedule against yet
    NoWindow,
    /// Window and ramp width are incompatible; strip left as is
    Rejected(ConfigurationError),
}

/// Daemon runtime state
pub struct Daemon<S: Strip> {
    strip: S,
    windows: Arc<WindowCell>,
    refresher: Refresher,
    manual: Option<Manual>,
    last_temp: Option<f64>,
    last_color: Option<Rgb>,
}

impl<S: Strip> Daemon<S> {
    pub fn new(strip: S, windows: Arc<WindowCell>, refresher: Refresher) -> Self {
        Self {
            strip,
            windows,
            refresher,
            manual: None,
            last_temp: None,
            last_color: None,
        }
    }

    pub fn strip(&self) -> &S {
        &self.strip
    }

    pub fn strip_mut(&mut self) -> &mut S {
        &mut self.strip
    }

    pub fn in_manual_mode(&self) -> bool {
        self.manual.is_some()
    }

    /// Pick up override file changes
    fn sync_override(&mut self, paths: &Paths) {
        let ovr = config::load_override(paths).filter(|o| o.active);

        match ovr {
            Some(o) => {
                let known = self.manual.as_ref().map(|m| m.issued_at) == Some(o.issued_at);
                if known {
                    return;
                }
                let target = o.target_temp as f64;
                let start = o.start_temp.or(self.last_temp).unwrap_or(target);

                if o.start_temp.is_none() {
                    let updated = config::OverrideState {
                        start_temp: Some(start),
                        ..o
                    };
                    if let Err(e) = config::save_override(paths, &updated) {
                        tracing::warn!(error = %e, "failed to record override start");
                    }
                }

                if o.duration_minutes > 0 {
                    tracing::info!(
                        from = start.round(),
                        to = target,
                        minutes = o.duration_minutes,
                        "manual override"
                    );
                } else {
                    tracing::info!(to = target, "manual override (instant)");
                }

                self.manual = Some(Manual {
                    issued_at: o.issued_at,
                    start_temp: start,
                    target_temp: target,
                    duration_min: o.duration_minutes,
                });
            }
            None => {
                if self.manual.take().is_some() {
                    tracing::info!("override cleared, resuming daylight schedule");
                }
            }
        }
    }

    /// One scheduler -> converter -> strip cycle at local time `now`.
    pub fn tick(&mut self, ctx: &Context, now: NaiveDateTime) -> Result<TickOutcome, strip::Error> {
        self.refresher.poll(now.date());
        self.sync_override(&ctx.paths);

        let Some(window) = self.windows.load() else {
            tracing::debug!("no daylight window yet");
            return Ok(TickOutcome::NoWindow);
        };

        let params = &ctx.config.schedule;
        let time = fractional_hours(now.time());

        let solar_temp = match params.temperature_at(time, &window) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    sunrise = %window.sunrise(),
                    sunset = %window.sunset(),
                    "cannot schedule against this window"
                );
                return Ok(TickOutcome::Rejected(e));
            }
        };

        let temp = match self.manual {
            Some(m) => {
                let elapsed_min = (now - m.issued_at).num_seconds() as f64 / 60.0;
                let finished = elapsed_min >= m.duration_min as f64;
                let resume = schedule::resume_due(m.issued_at, now, &window, params.ramp_hours());
                if finished && resume {
                    self.manual = None;
                    config::clear_override(&ctx.paths);
                    tracing::info!("auto-resuming daylight schedule (transition window reached)");
                    solar_temp
                } else {
                    schedule::manual_temp(m.start_temp, m.target_temp, elapsed_min, m.duration_min)
                }
            }
            None => solar_temp,
        };

        let color = match kelvin::convert(temp) {
            Ok(c) => c,
            Err(e) => {
                // only reachable through a hand-edited override file
                tracing::warn!(error = %e, "unusable temperature, dropping override");
                self.manual = None;
                config::clear_override(&ctx.paths);
                kelvin::convert(solar_temp).unwrap_or(Rgb { r: 255, g: 255, b: 255 })
            }
        };

        self.last_temp = Some(temp);

        if self.last_color == Some(color) {
            tracing::debug!(temp = temp.round(), "color unchanged");
            return Ok(TickOutcome::Held { temp, color });
        }

        self.strip.set_all(color)?;
        self.last_color = Some(color);

        tracing::info!(
            time = %now.format("%H:%M"),
            temp = temp.round(),
            r = color.r,
            g = color.g,
            b = color.b,
            mode = if self.manual.is_some() { "manual" } else { "daylight" },
            "applied"
        );
        Ok(TickOutcome::Applied { temp, color })
    }
}

/// Blocked SIGTERM/SIGINT delivered through a signalfd
struct Shutdown {
    fd: SignalFd,
}

impl Shutdown {
    fn install() -> Result<Self, Error> {
        let mut mask = SigSet::empty();
        mask.add(Signal::SIGTERM);
        mask.add(Signal::SIGINT);
        mask.thread_block()?;
        let fd = SignalFd::with_flags(&mask, SfdFlags::SFD_NONBLOCK | SfdFlags::SFD_CLOEXEC)?;
        Ok(Self { fd })
    }

    fn pending(&mut self) -> bool {
        matches!(self.fd.read_signal(), Ok(Some(_)))
    }

    /// Sleep for `period`; true if a shutdown signal arrived meanwhile
    fn wait(&mut self, period: Duration) -> bool {
        let deadline = Instant::now() + period;
        loop {
            if self.pending() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep((deadline - now).min(SHUTDOWN_CHECK));
        }
    }
}

fn open_strip(ctx: &Context, shutdown: &mut Shutdown) -> Result<Option<Box<dyn Strip>>, Error> {
    let mut attempt = 0;
    loop {
        match strip::init(&ctx.config.strip) {
            Ok(s) => return Ok(Some(s)),
            Err(e) => {
                attempt += 1;
                if attempt >= STRIP_INIT_MAX_RETRIES {
                    tracing::error!(error = %e, attempts = attempt, "no LED strip backend");
                    return Err(e.into());
                }
                tracing::warn!(error = %e, attempt, "strip init failed, retrying");
                if shutdown.wait(Duration::from_millis(STRIP_INIT_RETRY_MS)) {
                    tracing::info!("received signal during strip init, exiting");
                    return Ok(None);
                }
            }
        }
    }
}

/// Run until SIGTERM/SIGINT. Returns an error only for fatal conditions.
pub fn run(ctx: Context) -> Result<(), Error> {
    // block signals before any thread exists so workers inherit the mask
    let mut shutdown = Shutdown::install()?;

    let providers = build_providers(&ctx.config)?;

    let Some(strip) = open_strip(&ctx, &mut shutdown)? else {
        return Ok(());
    };

    let windows = Arc::new(match config::load_daylight_cache(&ctx.paths) {
        Some(cached) => {
            tracing::info!(
                date = %cached.date(),
                sunrise = %cached.sunrise(),
                sunset = %cached.sunset(),
                "loaded cached daylight window"
            );
            WindowCell::with_window(cached)
        }
        None => WindowCell::new(),
    });

    if let Err(e) = config::write_pid(&ctx.paths) {
        tracing::warn!(error = %e, "failed to write PID file");
    }

    let location = ctx.config.location.as_ref().map(|l| l.to_string()).unwrap_or_default();
    let provider_names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
    tracing::info!(
        backend = strip.backend_name(),
        pixels = strip.pixel_count(),
        location = %location,
        providers = %provider_names.join(","),
        poll_secs = ctx.config.poll_interval.as_secs(),
        "circadia daemon started"
    );

    let refresher = Refresher::new(
        providers,
        Arc::clone(&windows),
        Some(ctx.paths.clone()),
        RefreshMode::Background,
    );
    let mut daemon = Daemon::new(strip, windows, refresher);

    let mut result = Ok(());
    loop {
        let now = Local::now().naive_local();
        if let Err(e) = daemon.tick(&ctx, now) {
            tracing::error!(error = %e, "LED strip failure");
            result = Err(e.into());
            break;
        }
        if shutdown.wait(ctx.config.poll_interval) {
            tracing::info!("received shutdown signal");
            break;
        }
    }

    tracing::info!("shutting down");
    if result.is_ok() {
        if let Err(e) = daemon.strip_mut().blank() {
            tracing::warn!(error = %e, "failed to blank strip");
        }
    }
    config::remove_pid(&ctx.paths);
    result
}
