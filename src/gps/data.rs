// src/gps/data.rs
//! GPS data structures shared between the pipeline, race engine and display

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Conversion factor from m/s to km/h
pub const MPS_TO_KPH: f32 = 3.6;

/// One merged, quality-gated fix produced per poll cycle.
///
/// Built whole by the aggregator and never patched field by field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpsFix {
    pub lat: f64,           // decimal degrees, negative = South
    pub lon: f64,           // decimal degrees, negative = West
    pub alt_m: f32,
    pub speed_mps: f32,     // filtered
    pub course_deg: f32,
    pub hdop: f32,
    pub fix_quality: u8,    // 0 = no fix
    pub satellites: u8,
    pub timestamp_ms: u64,  // monotonic
    pub valid: bool,
}

impl Default for GpsFix {
    fn default() -> Self {
        Self {
            lat: 0.0,
            lon: 0.0,
            alt_m: 0.0,
            speed_mps: 0.0,
            course_deg: 0.0,
            hdop: NO_HDOP,
            fix_quality: 0,
            satellites: 0,
            timestamp_ms: 0,
            valid: false,
        }
    }
}

/// HDOP reported before any GGA sentence has been decoded
pub const NO_HDOP: f32 = 99.9;

impl GpsFix {
    /// Filtered speed in km/h
    pub fn speed_kph(&self) -> f32 {
        self.speed_mps * MPS_TO_KPH
    }

    /// Get fix type description
    pub fn fix_description(&self) -> String {
        match self.fix_quality {
            0 => "No fix".to_string(),
            1 => "GPS".to_string(),
            2 => "DGPS".to_string(),
            3 => "PPS".to_string(),
            4 => "RTK".to_string(),
            5 => "Float RTK".to_string(),
            6 => "Estimated".to_string(),
            7 => "Manual".to_string(),
            8 => "Simulation".to_string(),
            q => format!("Unknown ({})", q),
        }
    }
}

/// Pipeline counters. They only grow, until the pipeline is rebuilt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GpsStats {
    pub nmea_lines: u32,
    pub gga_ok: u32,
    pub rmc_ok: u32,
    pub cks_fail: u32,
    pub frame_overflow: u32,
    pub reject_hdop: u32,
    /// Fixes invalidated because no GGA arrived within the staleness limit
    pub reject_stale: u32,
    pub reject_jump: u32,
}

/// Receiver status snapshot for the dashboard and the status endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GpsStatus {
    pub has_fix: bool,
    pub hdop: f32,
    pub acc_m: f32,     // rough, hdop * UERE
    pub sats: u8,
    pub rate_hz: f32,   // decoded sentences per second
    pub time_valid: bool,
    pub utc: Option<DateTime<Utc>>,
}

/// Everything an observer needs in one read-only copy
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub gps: GpsStatus,
    pub fix: GpsFix,
    pub stats: GpsStats,
    pub race: crate::race::RaceState,
}

/// Format coordinate for display
pub fn format_coordinate(coord: f64, valid: bool) -> String {
    if valid {
        format!("{:>12.6}°", coord)
    } else {
        "No fix".to_string()
    }
}
