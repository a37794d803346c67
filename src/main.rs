// src/main.rs
//! GPS Drag Timer - terminal front end for the race monitor

use anyhow::Context;
use clap::Parser;
use gps_dragtimer::{
    display::{TerminalDisplay, UiCommand},
    gps::serial::list_serial_ports,
    monitor::{GpsSource, Link, GPS_READ_INTERVAL_MS, UI_REFRESH_MS},
    race::RaceEvent,
    AppConfig, RaceMonitor,
};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

const JSON_REPORT_MS: u64 = 1000;

#[derive(Parser, Debug)]
#[command(name = "gps-dragtimer", version, about = "GPS acceleration-run timer")]
struct Args {
    /// Serial port of the GNSS receiver
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Receiver navigation rate (Hz)
    #[arg(short, long)]
    rate: Option<u8>,

    /// Replay a captured NMEA log instead of a live receiver
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Config file (default: ~/.config/gps-dragtimer/config.json)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write the effective config back to the config file
    #[arg(long)]
    save_config: bool,

    /// Print one JSON status line per second instead of the dashboard
    #[arg(long)]
    json: bool,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if args.list_ports {
        for port in list_serial_ports()? {
            println!("{}", port);
        }
        return Ok(());
    }

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => AppConfig::get_config_path()?,
    };
    let mut config = AppConfig::load_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    if let Some(port) = args.port.clone() {
        let baud = args.baud.unwrap_or(config.gps.baud);
        config.update_serial(port, baud);
    } else if let Some(baud) = args.baud {
        config.gps.baud = baud;
    }
    if let Some(rate) = args.rate {
        config.gps.rate_hz = rate;
    }
    config.validate()?;

    if args.save_config {
        config.save_to(&config_path)?;
    }

    let source = match (&args.replay, &config.gps.port) {
        (Some(path), _) => GpsSource::Replay { path: path.clone() },
        (None, Some(port)) => GpsSource::Serial {
            port: port.clone(),
            baudrate: config.gps.baud,
        },
        (None, None) => anyhow::bail!("no serial port configured; pass --port or --replay"),
    };
    log::info!("Using {:?}", source);

    let link = source
        .open(config.gps.rate_hz)
        .with_context(|| format!("opening {:?}", source))?;
    let mut monitor = RaceMonitor::new(link, &config);
    if let Err(e) = monitor.configure_receiver(config.gps.rate_hz) {
        log::warn!("Could not send rate command: {}", e);
    }

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            running_clone.store(false, Ordering::Relaxed);
        }
    });

    if args.json {
        run_json(&mut monitor, &running).await
    } else {
        let display = TerminalDisplay::new();
        display.enter()?;
        let result = run_dashboard(&mut monitor, &display, &running).await;
        display.leave()?;
        result
    }
}

async fn run_json(monitor: &mut RaceMonitor<Link>, running: &AtomicBool) -> anyhow::Result<()> {
    let start = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_millis(GPS_READ_INTERVAL_MS));
    let mut last_report = 0;

    while running.load(Ordering::Relaxed) {
        ticker.tick().await;
        let now_ms = start.elapsed().as_millis() as u64;
        log_events(&monitor.tick(now_ms).events);

        if now_ms - last_report >= JSON_REPORT_MS {
            last_report = now_ms;
            println!("{}", serde_json::to_string(&monitor.report())?);
        }
        if monitor.link().is_exhausted() {
            println!("{}", serde_json::to_string(&monitor.report())?);
            break;
        }
    }
    Ok(())
}

async fn run_dashboard(
    monitor: &mut RaceMonitor<Link>,
    display: &TerminalDisplay,
    running: &AtomicBool,
) -> anyhow::Result<()> {
    let start = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_millis(GPS_READ_INTERVAL_MS));
    let mut last_draw = 0;

    while running.load(Ordering::Relaxed) {
        ticker.tick().await;
        let now_ms = start.elapsed().as_millis() as u64;
        log_events(&monitor.tick(now_ms).events);

        match display.poll_command()? {
            Some(UiCommand::Arm) => {
                if !monitor.arm(now_ms) {
                    log::info!("Arm ignored: race not idle");
                }
            }
            Some(UiCommand::Reset) => monitor.reset_race(),
            Some(UiCommand::Quit) => break,
            None => {}
        }

        if now_ms - last_draw >= UI_REFRESH_MS {
            last_draw = now_ms;
            display.draw(&monitor.report())?;
        }

        // A finished replay keeps its results on screen; a dead port ends the run
        if matches!(monitor.link(), Link::Serial(_)) && monitor.link().is_exhausted() {
            anyhow::bail!("serial link closed");
        }
    }
    Ok(())
}

fn log_events(events: &[RaceEvent]) {
    for ev in events {
        log::info!("{:?}", ev);
    }
}
