// src/error.rs
//! Error types for the outer layers (config, serial port, replay, terminal).
//!
//! The GPS pipeline and race engine never fail; they count and absorb noise.

use std::fmt;

pub type Result<T> = std::result::Result<T, TimerError>;

#[derive(Debug)]
pub enum TimerError {
    Io(std::io::Error),
    Serial(tokio_serial::Error),
    Json(serde_json::Error),
    Config(String),
    Connection(String),
    Other(String),
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerError::Io(e) => write!(f, "IO error: {}", e),
            TimerError::Serial(e) => write!(f, "Serial error: {}", e),
            TimerError::Json(e) => write!(f, "JSON error: {}", e),
            TimerError::Config(msg) => write!(f, "Invalid configuration: {}", msg),
            TimerError::Connection(msg) => write!(f, "Connection error: {}", msg),
            TimerError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for TimerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TimerError::Io(e) => Some(e),
            TimerError::Serial(e) => Some(e),
            TimerError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TimerError {
    fn from(error: std::io::Error) -> Self {
        TimerError::Io(error)
    }
}

impl From<tokio_serial::Error> for TimerError {
    fn from(error: tokio_serial::Error) -> Self {
        TimerError::Serial(error)
    }
}

impl From<serde_json::Error> for TimerError {
    fn from(error: serde_json::Error) -> Self {
        TimerError::Json(error)
    }
}

impl From<anyhow::Error> for TimerError {
    fn from(error: anyhow::Error) -> Self {
        TimerError::Other(error.to_string())
    }
}
