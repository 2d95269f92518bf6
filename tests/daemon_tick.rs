use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;

use circadia::config::{self, Config, OverrideState, Paths};
use circadia::daemon::{refresh_window, Context, Daemon, RefreshMode, Refresher, TickOutcome};
use circadia::daylight::{self, DaylightProvider};
use circadia::strip::{self, Strip};
use circadia::{ConfigurationError, DaylightWindow, Rgb, TimeOfDay, WindowCell, WindowSource};

struct RecordingStrip {
    shown: Arc<Mutex<Vec<Rgb>>>,
    broken: bool,
}

impl Strip for RecordingStrip {
    fn backend_name(&self) -> &str {
        "recording"
    }

    fn pixel_count(&self) -> usize {
        4
    }

    fn set_all(&mut self, color: Rgb) -> Result<(), strip::Error> {
        if self.broken {
            return Err(strip::Error::Hardware("spi write failed".into()));
        }
        self.shown.lock().push(color);
        Ok(())
    }
}

/// Provider that replays canned answers, then keeps failing
struct Scripted {
    answers: Mutex<VecDeque<Result<DaylightWindow, daylight::Error>>>,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(answers: Vec<Result<DaylightWindow, daylight::Error>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DaylightProvider for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fetch_today(&self, _today: NaiveDate) -> Result<DaylightWindow, daylight::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(daylight::Error::Network("connection refused".into())))
    }
}

fn day(n: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 4, n).unwrap()
}

fn at(d: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
    d.and_hms_opt(h, m, 0).unwrap()
}

fn window(d: NaiveDate, rise: (u8, u8), set: (u8, u8)) -> DaylightWindow {
    DaylightWindow::new(
        d,
        TimeOfDay::new(rise.0, rise.1).unwrap(),
        TimeOfDay::new(set.0, set.1).unwrap(),
        WindowSource::Service,
    )
    .unwrap()
}

fn context(name: &str) -> Context {
    let dir = std::env::temp_dir().join(format!("circadia-tick-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    Context {
        config: Config::default(),
        paths: Paths::in_dir(dir).unwrap(),
    }
}

struct Harness {
    daemon: Daemon<RecordingStrip>,
    shown: Arc<Mutex<Vec<Rgb>>>,
    windows: Arc<WindowCell>,
}

fn harness(initial: Option<DaylightWindow>, providers: Vec<Arc<dyn DaylightProvider>>) -> Harness {
    let windows = Arc::new(match initial {
        Some(w) => WindowCell::with_window(w),
        None => WindowCell::new(),
    });
    let shown = Arc::new(Mutex::new(Vec::new()));
    let strip = RecordingStrip {
        shown: Arc::clone(&shown),
        broken: false,
    };
    let refresher = Refresher::new(providers, Arc::clone(&windows), None, RefreshMode::Inline);
    Harness {
        daemon: Daemon::new(strip, Arc::clone(&windows), refresher),
        shown,
        windows,
    }
}

fn as_dyn(provider: &Arc<Scripted>) -> Arc<dyn DaylightProvider> {
    Arc::clone(provider) as Arc<dyn DaylightProvider>
}

/// A provider with nothing to say
fn idle() -> Vec<Arc<dyn DaylightProvider>> {
    vec![as_dyn(&Scripted::new(vec![]))]
}

fn temp_of(outcome: &TickOutcome) -> f64 {
    match outcome {
        TickOutcome::Applied { temp, .. } | TickOutcome::Held { temp, .. } => *temp,
        other => panic!("no temperature in {other:?}"),
    }
}

fn rgb(r: u8, g: u8, b: u8) -> Rgb {
    Rgb { r, g, b }
}

#[test]
fn reference_day_drives_the_strip() {
    let ctx = context("reference");
    let provider = Scripted::new(vec![]);
    let mut h = harness(Some(window(day(1), (6, 0), (20, 0))), vec![as_dyn(&provider)]);

    let out = h.daemon.tick(&ctx, at(day(1), 2, 0)).unwrap();
    assert_eq!(out, TickOutcome::Applied { temp: 650.0, color: rgb(255, 25, 0) });

    let out = h.daemon.tick(&ctx, at(day(1), 6, 0)).unwrap();
    assert!((temp_of(&out) - 2325.0).abs() < 1e-9);
    assert_eq!(h.shown.lock().last(), Some(&rgb(255, 152, 53)));

    let out = h.daemon.tick(&ctx, at(day(1), 12, 0)).unwrap();
    assert_eq!(out, TickOutcome::Applied { temp: 4000.0, color: rgb(255, 206, 166) });

    // same color: strip is not rewritten
    let out = h.daemon.tick(&ctx, at(day(1), 12, 1)).unwrap();
    assert!(matches!(out, TickOutcome::Held { .. }));
    assert_eq!(h.shown.lock().len(), 3);

    // window already describes today
    assert_eq!(provider.calls(), 0);
}

#[test]
fn failed_refresh_keeps_previous_window() {
    let ctx = context("rollover-fail");
    let provider = Scripted::new(vec![Err(daylight::Error::Status(503))]);
    let yesterday = window(day(1), (6, 0), (20, 0));
    let mut h = harness(Some(yesterday), vec![as_dyn(&provider)]);

    let out = h.daemon.tick(&ctx, at(day(2), 6, 0)).unwrap();
    assert_eq!(provider.calls(), 1);
    assert_eq!(*h.windows.load().unwrap(), yesterday);
    assert!((temp_of(&out) - 2325.0).abs() < 1e-9);

    // no retry until the next calendar day
    h.daemon.tick(&ctx, at(day(2), 7, 0)).unwrap();
    h.daemon.tick(&ctx, at(day(2), 23, 59)).unwrap();
    assert_eq!(provider.calls(), 1);

    h.daemon.tick(&ctx, at(day(3), 0, 0)).unwrap();
    assert_eq!(provider.calls(), 2);
    assert_eq!(*h.windows.load().unwrap(), yesterday);
}

#[test]
fn rollover_replaces_window() {
    let ctx = context("rollover-ok");
    let today = window(day(2), (7, 0), (19, 0));
    let provider = Scripted::new(vec![Ok(today)]);
    let mut h = harness(Some(window(day(1), (6, 0), (20, 0))), vec![as_dyn(&provider)]);

    let out = h.daemon.tick(&ctx, at(day(2), 7, 0)).unwrap();
    assert_eq!(*h.windows.load().unwrap(), today);
    assert!((temp_of(&out) - 2325.0).abs() < 1e-9);

    h.daemon.tick(&ctx, at(day(2), 8, 0)).unwrap();
    assert_eq!(provider.calls(), 1);
}

#[test]
fn without_any_window_the_strip_is_left_alone() {
    let ctx = context("no-window");
    let provider = Scripted::new(vec![]);
    let mut h = harness(None, vec![as_dyn(&provider)]);

    assert_eq!(h.daemon.tick(&ctx, at(day(1), 12, 0)).unwrap(), TickOutcome::NoWindow);
    assert_eq!(h.daemon.tick(&ctx, at(day(1), 12, 1)).unwrap(), TickOutcome::NoWindow);
    assert_eq!(provider.calls(), 2);
    assert!(h.shown.lock().is_empty());
}

#[test]
fn fallback_only_fills_an_empty_cell() {
    let primary = Scripted::new(vec![]);
    let fallback = Scripted::new(vec![Ok(window(day(5), (6, 30), (19, 30)))]);
    let providers = vec![as_dyn(&primary), as_dyn(&fallback)];

    let cell = WindowCell::new();
    let got = refresh_window(&providers, &cell, None, day(5)).unwrap();
    assert_eq!(got.sunrise(), TimeOfDay::new(6, 30).unwrap());
    assert_eq!(primary.calls(), 1);
    assert_eq!(fallback.calls(), 1);

    // with a window in place the fallback is not consulted
    let stale = window(day(4), (6, 0), (20, 0));
    let cell = WindowCell::with_window(stale);
    assert!(refresh_window(&providers, &cell, None, day(5)).is_err());
    assert_eq!(fallback.calls(), 1);
    assert_eq!(*cell.load().unwrap(), stale);
}

#[test]
fn refreshed_window_is_cached() {
    let ctx = context("cache");
    let fresh = window(day(9), (5, 58), (20, 4));
    let providers = vec![as_dyn(&Scripted::new(vec![Ok(fresh)]))];

    refresh_window(&providers, &WindowCell::new(), Some(&ctx.paths), day(9)).unwrap();
    let cached = config::load_daylight_cache(&ctx.paths).unwrap();
    assert_eq!(cached, fresh.with_source(WindowSource::Cache));
}

#[test]
fn manual_override_ramps_then_resumes() {
    let ctx = context("override");
    let mut h = harness(Some(window(day(1), (6, 0), (20, 0))), idle());

    h.daemon.tick(&ctx, at(day(1), 12, 0)).unwrap();

    let ovr = OverrideState {
        active: true,
        target_temp: 6600,
        duration_minutes: 10,
        issued_at: at(day(1), 12, 0),
        start_temp: None,
    };
    config::save_override(&ctx.paths, &ovr).unwrap();

    let out = h.daemon.tick(&ctx, at(day(1), 12, 5)).unwrap();
    assert!(h.daemon.in_manual_mode());
    assert!((temp_of(&out) - 5300.0).abs() < 1e-6);
    // start temperature is recorded for restarts
    assert_eq!(config::load_override(&ctx.paths).unwrap().start_temp, Some(4000.0));

    let out = h.daemon.tick(&ctx, at(day(1), 12, 10)).unwrap();
    assert_eq!(out, TickOutcome::Applied { temp: 6600.0, color: rgb(255, 255, 255) });

    let out = h.daemon.tick(&ctx, at(day(1), 18, 59)).unwrap();
    assert_eq!(temp_of(&out), 6600.0);

    // dusk ramp window opens at 19:00
    let out = h.daemon.tick(&ctx, at(day(1), 19, 0)).unwrap();
    assert!(!h.daemon.in_manual_mode());
    assert_eq!(temp_of(&out), 4000.0);
    assert!(config::load_override(&ctx.paths).is_none());
}

#[test]
fn resume_command_clears_override() {
    let ctx = context("resume");
    let mut h = harness(Some(window(day(1), (6, 0), (20, 0))), idle());

    config::save_override(
        &ctx.paths,
        &OverrideState {
            active: true,
            target_temp: 2000,
            duration_minutes: 0,
            issued_at: at(day(1), 13, 0),
            start_temp: None,
        },
    )
    .unwrap();
    let out = h.daemon.tick(&ctx, at(day(1), 13, 0)).unwrap();
    assert_eq!(temp_of(&out), 2000.0);

    config::clear_override(&ctx.paths);
    let out = h.daemon.tick(&ctx, at(day(1), 13, 1)).unwrap();
    assert!(!h.daemon.in_manual_mode());
    assert_eq!(temp_of(&out), 4000.0);
}

#[test]
fn overlapping_ramps_are_rejected() {
    let ctx = context("overlap");
    let mut h = harness(Some(window(day(1), (11, 0), (12, 30))), idle());

    let out = h.daemon.tick(&ctx, at(day(1), 12, 0)).unwrap();
    assert!(matches!(
        out,
        TickOutcome::Rejected(ConfigurationError::OverlappingRamps { .. })
    ));
    assert!(h.shown.lock().is_empty());
}

#[test]
fn strip_failure_is_fatal() {
    let ctx = context("hardware");
    let windows = Arc::new(WindowCell::with_window(window(day(1), (6, 0), (20, 0))));
    let strip = RecordingStrip {
        shown: Arc::new(Mutex::new(Vec::new())),
        broken: true,
    };
    let refresher = Refresher::new(vec![], Arc::clone(&windows), None, RefreshMode::Inline);
    let mut daemon = Daemon::new(strip, windows, refresher);

    assert!(matches!(
        daemon.tick(&ctx, at(day(1), 12, 0)),
        Err(strip::Error::Hardware(_))
    ));
    assert!(daemon.strip().shown.lock().is_empty());
}
