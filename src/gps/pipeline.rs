// src/gps/pipeline.rs
//! Fix aggregation: bytes in, one quality-gated, speed-filtered fix out per poll.
//!
//! GGA and RMC are decoded into separate slots, each stamped with the poll
//! time it arrived in. The merged fix takes position from whichever slot is
//! newer, so GGA-derived and RMC-derived fields may be up to one sentence
//! interval apart.

use super::data::{GpsFix, GpsStats, GpsStatus, NO_HDOP};
use super::filter::{GpsFilterTuning, SpeedFilter};
use super::framer::SentenceFramer;
use super::link::ByteSource;
use super::nmea::{self, GgaData, RmcData, SentenceKind};
use chrono::{DateTime, Utc};

/// Default NMEA line buffer size
pub const DEFAULT_LINE_MAX: usize = 128;

/// GGA data older than this no longer counts as a fix
pub const STALE_AFTER_MS: u64 = 2000;

/// Rough user-equivalent range error used for the accuracy estimate
const UERE_M: f32 = 5.0;

const READ_CHUNK: usize = 256;
const RATE_WINDOW_MS: u64 = 1000;

#[derive(Debug, Clone, Copy)]
struct Stamped<T> {
    value: T,
    at_ms: u64,
}

/// Sentence-rate estimate over a fixed window
#[derive(Debug, Default)]
struct RateMeter {
    window_start_ms: u64,
    count: u32,
    rate_hz: f32,
}

impl RateMeter {
    fn record(&mut self, now_ms: u64) {
        self.count += 1;
        self.roll(now_ms);
    }

    fn roll(&mut self, now_ms: u64) {
        let elapsed = now_ms.saturating_sub(self.window_start_ms);
        if elapsed >= RATE_WINDOW_MS {
            self.rate_hz = self.count as f32 * 1000.0 / elapsed as f32;
            self.count = 0;
            self.window_start_ms = now_ms;
        }
    }
}

/// One GPS source's parsing and filtering state
#[derive(Debug)]
pub struct GpsPipeline {
    framer: SentenceFramer,
    filter: SpeedFilter,
    stats: GpsStats,
    gga: Option<Stamped<GgaData>>,
    rmc: Option<Stamped<RmcData>>,
    utc: Option<DateTime<Utc>>,
    rate: RateMeter,
    fix: GpsFix,
}

impl GpsPipeline {
    pub fn new(tuning: GpsFilterTuning, line_max: usize) -> Self {
        Self {
            framer: SentenceFramer::new(line_max),
            filter: SpeedFilter::new(tuning),
            stats: GpsStats::default(),
            gga: None,
            rmc: None,
            utc: None,
            rate: RateMeter::default(),
            fix: GpsFix::default(),
        }
    }

    /// Drop all raw values, filter memory and counters
    pub fn reset(&mut self) {
        *self = Self::new(*self.filter.tuning(), self.framer.line_max());
    }

    pub fn set_tuning(&mut self, tuning: GpsFilterTuning) {
        self.filter.set_tuning(tuning);
    }

    pub fn tuning(&self) -> &GpsFilterTuning {
        self.filter.tuning()
    }

    /// Most recent fix (may be `valid == false`)
    pub fn fix(&self) -> GpsFix {
        self.fix
    }

    pub fn stats(&self) -> GpsStats {
        self.stats
    }

    /// Receiver status snapshot
    pub fn status(&self) -> GpsStatus {
        GpsStatus {
            has_fix: self.fix.valid,
            hdop: self.fix.hdop,
            acc_m: self.fix.hdop * UERE_M,
            sats: self.fix.satellites,
            rate_hz: self.rate.rate_hz,
            time_valid: self.utc.is_some(),
            utc: self.utc,
        }
    }

    /// Drain everything `source` has pending and refresh the fix.
    ///
    /// Returns `None` only when no bytes were available. Otherwise returns
    /// the current fix, rebuilt if a GGA or RMC sentence came in.
    pub fn poll(&mut self, source: &mut impl ByteSource, now_ms: u64) -> Option<GpsFix> {
        let mut buf = [0u8; READ_CHUNK];
        let mut any_bytes = false;
        let mut consumed = false;
        let mut new_speed = false;

        loop {
            let n = source.read_available(&mut buf);
            if n == 0 {
                break;
            }
            any_bytes = true;
            let lines: Vec<String> = self.framer.feed(&buf[..n]).collect();
            for line in lines {
                match self.handle_sentence(&line, now_ms) {
                    Some(SentenceKind::Rmc) => {
                        consumed = true;
                        new_speed = true;
                    }
                    Some(_) => consumed = true,
                    None => {}
                }
            }
        }
        self.stats.frame_overflow = self.framer.overflows();
        self.rate.roll(now_ms);

        if !any_bytes {
            return None;
        }
        if consumed {
            self.fix = self.aggregate(now_ms, new_speed);
        }
        Some(self.fix)
    }

    /// Validate and decode one sentence.
    ///
    /// Returns the kind of any checksum-valid GGA/RMC sentence consumed.
    fn handle_sentence(&mut self, line: &str, now_ms: u64) -> Option<SentenceKind> {
        self.stats.nmea_lines += 1;

        let Some(fields) = nmea::validate(line) else {
            self.stats.cks_fail += 1;
            log::debug!("NMEA checksum failed: {}", line);
            return None;
        };

        match nmea::sentence_kind(&fields) {
            SentenceKind::Gga => {
                if let Some(gga) = nmea::parse_gga(&fields) {
                    self.gga = Some(Stamped { value: gga, at_ms: now_ms });
                    self.stats.gga_ok += 1;
                    self.rate.record(now_ms);
                }
                Some(SentenceKind::Gga)
            }
            SentenceKind::Rmc => match nmea::parse_rmc(&fields) {
                Some(rmc) => {
                    if rmc.utc.is_some() {
                        self.utc = rmc.utc;
                    }
                    self.rmc = Some(Stamped { value: rmc, at_ms: now_ms });
                    self.stats.rmc_ok += 1;
                    self.rate.record(now_ms);
                    Some(SentenceKind::Rmc)
                }
                None => Some(SentenceKind::Other),
            },
            SentenceKind::Other => None,
        }
    }

    /// Merge held raw values into a fresh fix, gating and filtering as we go
    fn aggregate(&mut self, now_ms: u64, new_speed: bool) -> GpsFix {
        let (lat, lon) = match (self.gga, self.rmc) {
            (Some(g), Some(r)) if r.at_ms > g.at_ms => (r.value.lat, r.value.lon),
            (Some(g), _) => (g.value.lat, g.value.lon),
            (None, Some(r)) => (r.value.lat, r.value.lon),
            (None, None) => (self.fix.lat, self.fix.lon),
        };
        let fresh_gga = self
            .gga
            .filter(|g| now_ms.saturating_sub(g.at_ms) <= STALE_AFTER_MS)
            .map(|g| g.value);
        let (fix_quality, hdop, alt_m, satellites) = match self.gga {
            Some(g) => (g.value.fix_quality, g.value.hdop, g.value.alt_m, g.value.satellites),
            None => (0, NO_HDOP, 0.0, 0),
        };
        let course_deg = self.rmc.map(|r| r.value.course_deg).unwrap_or(0.0);

        let valid = if fresh_gga.is_none() {
            self.stats.reject_stale += 1;
            false
        } else if !self.filter.tuning().accepts(fix_quality, hdop) {
            self.stats.reject_hdop += 1;
            false
        } else {
            true
        };
        if valid && new_speed {
            let raw = self.rmc.map(|r| r.value.speed_mps).unwrap_or(0.0);
            if self.filter.update(raw, now_ms).rejected {
                self.stats.reject_jump += 1;
            }
        }

        GpsFix {
            lat,
            lon,
            alt_m,
            speed_mps: self.filter.speed(),
            course_deg,
            hdop,
            fix_quality,
            satellites,
            timestamp_ms: now_ms,
            valid,
        }
    }
}

impl Default for GpsPipeline {
    fn default() -> Self {
        Self::new(GpsFilterTuning::default(), DEFAULT_LINE_MAX)
    }
}
