// src/monitor.rs
//! Coordinating loop: drain the receiver, refresh the fix, feed the race engine.
//!
//! Everything runs on one thread of control; observers get copies.

use crate::config::AppConfig;
use crate::error::Result;
use crate::gps::data::{GpsFix, StatusReport};
use crate::gps::link::{ByteSink, ByteSource};
use crate::gps::pipeline::GpsPipeline;
use crate::gps::replay::ReplaySource;
use crate::gps::serial::SerialLink;
use crate::gps::ubx;
use crate::race::{RaceEngine, RaceEvent};
use std::path::PathBuf;

/// How often the coordinating loop runs (ms)
pub const GPS_READ_INTERVAL_MS: u64 = 5;

/// How often observers are refreshed (ms)
pub const UI_REFRESH_MS: u64 = 50;

/// GPS data source configuration
#[derive(Debug, Clone)]
pub enum GpsSource {
    Serial { port: String, baudrate: u32 },
    Replay { path: PathBuf },
}

/// Either kind of receiver link, behind the same byte seams
pub enum Link {
    Serial(SerialLink),
    Replay(ReplaySource),
}

impl GpsSource {
    /// Open the link. Serial links need a running tokio runtime.
    pub fn open(&self, rate_hz: u8) -> Result<Link> {
        match self {
            GpsSource::Serial { port, baudrate } => Ok(Link::Serial(SerialLink::open(port, *baudrate)?)),
            GpsSource::Replay { path } => Ok(Link::Replay(ReplaySource::open(path, rate_hz)?)),
        }
    }
}

impl Link {
    /// No more bytes will ever arrive
    pub fn is_exhausted(&self) -> bool {
        match self {
            Link::Serial(s) => s.is_closed(),
            Link::Replay(r) => r.is_finished(),
        }
    }
}

impl ByteSource for Link {
    fn read_available(&mut self, buf: &mut [u8]) -> usize {
        match self {
            Link::Serial(s) => s.read_available(buf),
            Link::Replay(r) => r.read_available(buf),
        }
    }
}

impl ByteSink for Link {
    fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        match self {
            Link::Serial(s) => s.send(bytes),
            Link::Replay(r) => r.send(bytes),
        }
    }
}

/// What one tick produced
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    pub fix: Option<GpsFix>,
    pub events: Vec<RaceEvent>,
}

/// Owns the pipeline, the race engine and the receiver link
pub struct RaceMonitor<S> {
    link: S,
    pipeline: GpsPipeline,
    race: RaceEngine,
}

impl<S: ByteSource> RaceMonitor<S> {
    pub fn new(link: S, config: &AppConfig) -> Self {
        Self {
            link,
            pipeline: GpsPipeline::new(config.filter, config.gps.line_max),
            race: RaceEngine::new(config.race.clone()),
        }
    }

    /// One scheduling tick. Never blocks.
    pub fn tick(&mut self, now_ms: u64) -> TickOutcome {
        let Some(fix) = self.pipeline.poll(&mut self.link, now_ms) else {
            return TickOutcome::default();
        };
        let events = self.race.update(&fix);
        TickOutcome {
            fix: Some(fix),
            events,
        }
    }

    /// Manual arm from the operator
    pub fn arm(&mut self, now_ms: u64) -> bool {
        self.race.arm(now_ms)
    }

    pub fn reset_race(&mut self) {
        self.race.reset();
    }

    /// Apply a new configuration; the current run is discarded.
    /// A config that fails validation is refused and nothing changes.
    pub fn reconfigure(&mut self, config: &AppConfig) -> Result<()> {
        config.validate()?;
        self.pipeline.set_tuning(config.filter);
        self.race.set_config(config.race.clone());
        Ok(())
    }

    pub fn link(&self) -> &S {
        &self.link
    }

    pub fn race(&self) -> &RaceEngine {
        &self.race
    }

    /// Snapshot for the dashboard and the status endpoint
    pub fn report(&self) -> StatusReport {
        StatusReport {
            gps: self.pipeline.status(),
            fix: self.pipeline.fix(),
            stats: self.pipeline.stats(),
            race: self.race.state(),
        }
    }
}

impl<S: ByteSource + ByteSink> RaceMonitor<S> {
    /// Send the one-time measurement-rate command to the receiver
    pub fn configure_receiver(&mut self, rate_hz: u8) -> Result<()> {
        ubx::send_rate(&mut self.link, rate_hz)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TimerError;
    use crate::gps::nmea::checksum;
    use crate::race::{RacePhase, Trap, EARTH_RADIUS_M};
    use approx::assert_abs_diff_eq;
    use std::collections::VecDeque;

    /// `ddmm.mmmm` for a latitude `meters` north of 10°N
    fn lat_dm(meters: f64) -> String {
        let deg = 10.0 + (meters / EARTH_RADIUS_M).to_degrees();
        let whole = deg.floor();
        format!("{:02}{:09.6}", whole as u32, (deg - whole) * 60.0)
    }

    fn push_epoch(src: &mut VecDeque<u8>, meters: f64, kph: f64) {
        let lat = lat_dm(meters);
        let knots = kph / 3.6 / 0.514444;
        for body in [
            format!("GPGGA,120000.00,{},N,10630.000000,E,1,12,0.7,10.0,M,0.0,M,,", lat),
            format!("GPRMC,120000.00,A,{},N,10630.000000,E,{:.3},0.0,010124,,,A", lat, knots),
        ] {
            src.extend(format!("${}*{:02X}\r\n", body, checksum(&body)).into_bytes());
        }
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.race.traps = vec![Trap::new("60ft", 18.288, 2.0)];
        config
    }

    #[test]
    fn test_idle_tick_without_bytes() {
        let mut monitor = RaceMonitor::new(VecDeque::new(), &config());
        let out = monitor.tick(0);
        assert!(out.fix.is_none());
        assert!(out.events.is_empty());
    }

    #[test]
    fn test_nmea_stream_times_sixty_foot() {
        let mut monitor = RaceMonitor::new(VecDeque::new(), &config());

        // Staged at the line, then a 1 g launch reported at 20 Hz
        let mut now = 0;
        let mut meters = 0.0;
        let mut kph: f64 = 0.0;
        let mut started_at = None;
        let mut crossed_at = None;
        for _ in 0..20 {
            push_epoch(&mut monitor.link, meters, 0.0);
            monitor.tick(now);
            now += 50;
        }
        for _ in 0..80 {
            kph += 10.0 * 3.6 * 0.05;
            meters += kph / 3.6 * 0.05;
            push_epoch(&mut monitor.link, meters, kph);
            let out = monitor.tick(now);
            for ev in &out.events {
                match ev {
                    RaceEvent::Started => started_at = Some(now),
                    RaceEvent::TrapCrossed(0) => crossed_at = Some(now),
                    _ => {}
                }
            }
            now += 50;
        }

        let started_at = started_at.expect("run never started");
        let crossed_at = crossed_at.expect("trap never crossed");
        let state = monitor.report().race;
        assert_eq!(state.results[0].et_ms, crossed_at - started_at);
        assert!(state.results[0].crossed);
        assert!(state.cum_dist_m > 18.288);
        assert!(monitor.race().finished());
        // Roughly 19 m/s at the sixty-foot mark, less a little filter lag
        assert!((state.results[0].trap_kph - 69.0).abs() < 10.0);

        let stats = monitor.report().stats;
        assert_eq!(stats.cks_fail, 0);
        assert_eq!(stats.reject_jump, 0);
        assert_eq!(stats.gga_ok, 100);
        assert_eq!(stats.rmc_ok, 100);
    }

    #[test]
    fn test_noisy_fixes_never_cross() {
        let mut cfg = config();
        cfg.filter.max_hdop_m = 1.0;
        let mut monitor = RaceMonitor::new(VecDeque::new(), &cfg);
        monitor.arm(0);

        for i in 0..50u64 {
            let body = format!(
                "GPGGA,120000.00,{},N,10630.000000,E,1,04,4.5,10.0,M,0.0,M,,",
                lat_dm(i as f64 * 5.0)
            );
            monitor
                .link
                .extend(format!("${}*{:02X}\r\n", body, checksum(&body)).into_bytes());
            let out = monitor.tick(i * 100);
            assert!(!out.fix.unwrap().valid);
        }
        let report = monitor.report();
        assert_eq!(report.race.phase(), RacePhase::Armed);
        assert_eq!(report.race.cum_dist_m, 0.0);
        assert_eq!(report.stats.reject_hdop, 50);
    }

    #[test]
    fn test_reset_and_reconfigure() {
        let mut monitor = RaceMonitor::new(VecDeque::new(), &config());
        assert!(monitor.arm(10));
        monitor.reset_race();
        assert_eq!(monitor.race().phase(), RacePhase::Idle);

        let mut cfg = config();
        cfg.race.traps.push(Trap::new("330ft", 100.584, 5.0));
        monitor.reconfigure(&cfg).unwrap();
        assert_eq!(monitor.report().race.results.len(), 2);
    }

    #[test]
    fn test_reconfigure_refuses_invalid_tuning() {
        let mut monitor = RaceMonitor::new(VecDeque::new(), &config());
        let mut cfg = config();
        cfg.filter.max_accel_mps2 = -1.0;
        cfg.race.traps.push(Trap::new("330ft", 100.584, 5.0));

        let err = monitor.reconfigure(&cfg).unwrap_err();
        assert!(matches!(err, TimerError::Config(_)));
        assert_eq!(monitor.report().race.results.len(), 1);

        // Still runs with the previous tuning
        push_epoch(&mut monitor.link, 0.0, 0.0);
        assert!(monitor.tick(100).fix.unwrap().valid);
    }

    #[test]
    fn test_configure_receiver_sends_rate() {
        let link = (VecDeque::new(), Vec::new());
        let mut monitor = RaceMonitor::new(TestLink(link), &config());
        monitor.configure_receiver(10).unwrap();
        assert_eq!(monitor.link().0 .1, ubx::cfg_rate(10));
    }

    #[test]
    fn test_report_serializes() {
        let mut monitor = RaceMonitor::new(VecDeque::new(), &config());
        push_epoch(&mut monitor.link, 0.0, 0.0);
        monitor.tick(100);
        let json = serde_json::to_value(monitor.report()).unwrap();
        assert_eq!(json["fix"]["valid"], true);
        assert_eq!(json["race"]["results"][0]["name"], "60ft");
        assert_abs_diff_eq!(json["gps"]["hdop"].as_f64().unwrap(), 0.7, epsilon = 1e-6);
    }

    struct TestLink((VecDeque<u8>, Vec<u8>));

    impl ByteSource for TestLink {
        fn read_available(&mut self, buf: &mut [u8]) -> usize {
            self.0 .0.read_available(buf)
        }
    }

    impl ByteSink for TestLink {
        fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
            self.0 .1.send(bytes)
        }
    }
}
