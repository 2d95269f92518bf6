//! circadia - circadian color temperature daemon for LED strips
//!
//! Commands:
//!   --daemon             Run as daemon (default)
//!   --status             Show current status
//!   --preview TEMP       Show the RGB color for a temperature
//!   --set-location LOC   Set location (LAT,LON or place name)
//!   --set-key KEY        Set astronomy service API key
//!   --refresh            Fetch today's sunrise/sunset now
//!   --set TEMP [MIN]     Manual override to TEMP over MIN minutes
//!   --resume             Clear manual override
//!   --reset              Clear override and blank the strip
//!   --help               Show usage

use std::process;

use chrono::Local;
use tracing_subscriber::EnvFilter;

use circadia::config::{self, Location, OverrideState, Paths};
use circadia::daemon::{self, Context};
use circadia::window::{fractional_hours, WindowCell};
use circadia::{kelvin, strip, OVERRIDE_DEFAULT_MINUTES, OVERRIDE_TEMP_MAX, OVERRIDE_TEMP_MIN};

enum Command {
    Daemon,
    Status,
    Preview(f64),
    SetLocation(String),
    SetKey(String),
    Refresh,
    Set { temp: i32, duration: i32 },
    Resume,
    Reset,
}

fn print_usage() {
    eprintln!("circadia - circadian color temperature for LED strips");
    eprintln!();
    eprintln!("Usage: circadia [COMMAND]");
    eprintln!();
    eprintln!("  --daemon              Run daemon (default)");
    eprintln!("  --status              Show current status");
    eprintln!("  --preview TEMP        Show the RGB color for TEMP kelvin");
    eprintln!("  --set-location LOC    Set location (LAT,LON or place name)");
    eprintln!("  --set-key KEY         Set astronomy service API key");
    eprintln!("  --refresh             Fetch today's sunrise/sunset now");
    eprintln!(
        "  --set TEMP [MINUTES]  Override to TEMP over MINUTES (default {OVERRIDE_DEFAULT_MINUTES})"
    );
    eprintln!("  --resume              Clear override, resume daylight schedule");
    eprintln!("  --reset               Clear override and blank the strip");
    eprintln!("  --help                Show this help");
}

fn required_arg(args: &[String], flag: &str, example: &str) -> String {
    match args.get(2) {
        Some(v) => v.clone(),
        None => {
            eprintln!("{flag} requires an argument");
            eprintln!("  Example: circadia {flag} {example}");
            process::exit(1);
        }
    }
}

fn parse_args() -> Command {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        return Command::Daemon;
    }

    match args[1].as_str() {
        "--daemon" | "daemon" => Command::Daemon,
        "--status" | "status" => Command::Status,
        "--preview" | "preview" => {
            let raw = required_arg(&args, "--preview", "2700");
            match raw.parse() {
                Ok(v) => Command::Preview(v),
                Err(_) => {
                    eprintln!("Invalid temperature: {raw}");
                    process::exit(1);
                }
            }
        }
        "--set-location" | "set-location" => {
            // allow unquoted multi-word place names
            if args.len() > 3 {
                Command::SetLocation(args[2..].join(" "))
            } else {
                Command::SetLocation(required_arg(&args, "--set-location", "41.88,-87.63"))
            }
        }
        "--set-key" | "set-key" => Command::SetKey(required_arg(&args, "--set-key", "0123abcd")),
        "--refresh" | "refresh" => Command::Refresh,
        "--set" | "set" => {
            let raw = required_arg(&args, "--set", "3500 30");
            let temp: i32 = match raw.parse() {
                Ok(v) => v,
                Err(_) => {
                    eprintln!("Invalid temperature: {raw}");
                    process::exit(1);
                }
            };
            let duration: i32 = match args.get(3) {
                Some(d) => match d.parse() {
                    Ok(v) => v,
                    Err(_) => {
                        eprintln!("Invalid duration: {d}");
                        process::exit(1);
                    }
                },
                None => OVERRIDE_DEFAULT_MINUTES,
            };
            Command::Set { temp, duration }
        }
        "--resume" | "resume" => Command::Resume,
        "--reset" | "reset" => Command::Reset,
        "--help" | "-h" | "help" => {
            print_usage();
            process::exit(0);
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let command = parse_args();
    init_tracing();

    let paths = match Paths::init() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize paths: {e}");
            process::exit(1);
        }
    };

    // Commands that don't need a valid config
    match &command {
        Command::Preview(temp) => process::exit(cmd_preview(*temp)),
        Command::Resume => {
            cmd_resume(&paths);
            return;
        }
        Command::SetLocation(loc) => process::exit(cmd_set_location(loc, &paths)),
        Command::SetKey(key) => process::exit(cmd_set_key(key, &paths)),
        Command::Set { temp, duration } => process::exit(cmd_set_temp(*temp, *duration, &paths)),
        _ => {}
    }

    let config = match config::load_config(&paths) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid configuration in {}: {e}", paths.config_file.display());
            process::exit(1);
        }
    };
    let ctx = Context { config, paths };

    let result = match command {
        Command::Status => cmd_status(&ctx),
        Command::Refresh => cmd_refresh(&ctx),
        Command::Reset => cmd_reset(&ctx),
        Command::Daemon => match daemon::run(ctx) {
            Ok(()) => 0,
            Err(e) => {
                tracing::error!(error = %e, "daemon stopped");
                1
            }
        },
        _ => unreachable!(),
    };

    process::exit(result);
}

fn cmd_preview(temp: f64) -> i32 {
    match kelvin::convert(temp) {
        Ok(c) => {
            println!(
                "{temp}K -> RGB({}, {}, {}) #{:02X}{:02X}{:02X}",
                c.r, c.g, c.b, c.r, c.g, c.b
            );
            0
        }
        Err(e) => {
            eprintln!("{e}");
            1
        }
    }
}

fn cmd_status(ctx: &Context) -> i32 {
    match ctx.config.location {
        Some(ref loc) => println!("Location: {loc}"),
        None => println!("Location: not configured"),
    }
    println!(
        "Service: {}",
        if ctx.config.service.api_key.is_some() { "astronomy API" } else { "solar calculation" }
    );

    let now = Local::now().naive_local();
    println!("Date: {}\n", now.format("%Y-%m-%d %H:%M:%S"));

    let params = &ctx.config.schedule;
    println!(
        "Schedule: {}K night, {}K day, {} h ramps",
        params.min_temp(),
        params.max_temp(),
        params.ramp_hours()
    );

    let window = config::load_daylight_cache(&ctx.paths);
    match window {
        Some(ref w) => {
            let stale = if w.date() == now.date() { "" } else { " (stale)" };
            println!("Sunrise: {}", w.sunrise());
            println!("Sunset: {}", w.sunset());
            println!("Window: {} via {}{}", w.date(), w.source(), stale);
        }
        None => println!("Sunrise/Sunset: not fetched yet"),
    }
    println!();

    println!(
        "Daemon: {}",
        if config::check_daemon_alive(&ctx.paths) { "running" } else { "not running" }
    );

    if let Some(o) = config::load_override(&ctx.paths).filter(|o| o.active) {
        println!("Mode: MANUAL OVERRIDE");
        println!("Target: {}K over {} min", o.target_temp, o.duration_minutes);
        println!("Issued: {}", o.issued_at.format("%Y-%m-%d %H:%M:%S"));
        return 0;
    }

    let Some(w) = window else {
        return 0;
    };
    match params.temperature_at(fractional_hours(now.time()), &w) {
        Ok(temp) => {
            println!("Mode: DAYLIGHT");
            print!("Target temperature: {}K", temp.round());
            match kelvin::convert(temp) {
                Ok(c) => println!(" -> RGB({}, {}, {})", c.r, c.g, c.b),
                Err(_) => println!(),
            }
            0
        }
        Err(e) => {
            println!("Mode: DAYLIGHT (not schedulable: {e})");
            1
        }
    }
}

fn cmd_set_location(loc_str: &str, paths: &Paths) -> i32 {
    let Some(location) = Location::parse(loc_str) else {
        eprintln!("Invalid location. Use LAT,LON (e.g., 41.88,-87.63) or a place name.");
        return 1;
    };

    if let Err(e) = config::save_location(paths, &location) {
        eprintln!("Failed to save config: {e}");
        return 1;
    }
    // the cached window belongs to the old location
    let _ = std::fs::remove_file(&paths.cache_file);

    println!("Location set to: {location}");
    if matches!(location, Location::Named(_)) {
        println!("Place names are resolved by the astronomy service; set a key with --set-key.");
    }
    0
}

fn cmd_set_key(key: &str, paths: &Paths) -> i32 {
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        eprintln!("Invalid API key.");
        return 1;
    }
    if let Err(e) = config::save_api_key(paths, key) {
        eprintln!("Failed to save config: {e}");
        return 1;
    }
    println!("API key saved.");
    0
}

fn cmd_refresh(ctx: &Context) -> i32 {
    let providers = match daemon::build_providers(&ctx.config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{e}");
            return 1;
        }
    };

    println!("Fetching sunrise/sunset...");
    let today = Local::now().date_naive();
    let windows = WindowCell::new();
    match daemon::refresh_window(&providers, &windows, Some(&ctx.paths), today) {
        Ok(w) => {
            println!("Sunrise: {}", w.sunrise());
            println!("Sunset: {}", w.sunset());
            println!("Source: {}", w.source());
            0
        }
        Err(e) => {
            eprintln!("Fetch failed: {e}");
            1
        }
    }
}

fn cmd_set_temp(target_temp: i32, duration_min: i32, paths: &Paths) -> i32 {
    if !(OVERRIDE_TEMP_MIN..=OVERRIDE_TEMP_MAX).contains(&target_temp) {
        eprintln!("Temperature must be between {OVERRIDE_TEMP_MIN}K and {OVERRIDE_TEMP_MAX}K.");
        return 1;
    }
    if duration_min < 0 {
        eprintln!("Duration must not be negative.");
        return 1;
    }

    let ovr = OverrideState {
        active: true,
        target_temp,
        duration_minutes: duration_min,
        issued_at: Local::now().naive_local(),
        start_temp: None, // daemon fills this
    };

    if let Err(e) = config::save_override(paths, &ovr) {
        eprintln!("Failed to write override: {e}");
        return 1;
    }

    if duration_min > 0 {
        println!("Override: -> {target_temp}K over {duration_min} min");
    } else {
        println!("Override: -> {target_temp}K (instant)");
    }
    println!("Daemon will process on next tick.");
    0
}

fn cmd_resume(paths: &Paths) {
    config::clear_override(paths);
    println!("Resume sent. Daemon will return to the daylight schedule.");
}

fn cmd_reset(ctx: &Context) -> i32 {
    config::clear_override(&ctx.paths);

    if config::check_daemon_alive(&ctx.paths) {
        eprintln!("Daemon is running; stop it first to blank the strip.");
        return 1;
    }

    match strip::init(&ctx.config.strip).and_then(|mut s| s.blank()) {
        Ok(()) => {
            println!("Strip blanked.");
            0
        }
        Err(e) => {
            eprintln!("Failed to blank strip: {e}");
            1
        }
    }
}

