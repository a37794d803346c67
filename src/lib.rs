// src/lib.rs
//! GPS Drag Timer Library
//!
//! Turns the NMEA stream of a high-rate GNSS receiver into a filtered
//! position/speed fix and times acceleration runs through distance traps.

pub mod config;
pub mod display;
pub mod error;
pub mod gps;
pub mod monitor;
pub mod race;

// Re-export main types for convenience
pub use config::AppConfig;
pub use error::{Result, TimerError};
pub use gps::{GpsFix, GpsPipeline};
pub use monitor::{GpsSource, RaceMonitor};
pub use race::RaceEngine;
