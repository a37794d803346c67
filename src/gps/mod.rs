// src/gps/mod.rs
//! GPS ingestion: framing, NMEA decoding, quality gating and speed filtering

pub mod data;
pub mod filter;
pub mod framer;
pub mod link;
pub mod nmea;
pub mod pipeline;
pub mod replay;
pub mod serial;
pub mod ubx;

pub use data::{GpsFix, GpsStats, GpsStatus};
pub use filter::GpsFilterTuning;
pub use link::{ByteSink, ByteSource};
pub use pipeline::GpsPipeline;
