// src/gps/replay.rs
//! NMEA log playback, released one sentence at a time at the receiver's pace

use super::link::{ByteSink, ByteSource};
use crate::error::{Result, TimerError};
use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

/// Replays a captured NMEA log as if it were arriving over the serial link
pub struct ReplaySource {
    lines: VecDeque<String>,
    pending: VecDeque<u8>,
    interval: Duration,
    started: Instant,
    released: u32,
}

impl ReplaySource {
    /// Load a log file; `rate_hz` is the receiver's navigation rate
    pub fn open(path: &Path, rate_hz: u8) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            TimerError::Other(format!("Failed to read replay file {}: {}", path.display(), e))
        })?;
        let source = Self::from_text(&text, sentence_interval(rate_hz));
        log::info!(
            "Replaying {} sentences from {}",
            source.remaining(),
            path.display()
        );
        Ok(source)
    }

    /// Release one line every `interval` (zero releases everything at once)
    pub fn from_text(text: &str, interval: Duration) -> Self {
        Self {
            lines: text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            pending: VecDeque::new(),
            interval,
            started: Instant::now(),
            released: 0,
        }
    }

    /// Sentences not yet handed to the pipeline
    pub fn remaining(&self) -> usize {
        self.lines.len()
    }

    pub fn is_finished(&self) -> bool {
        self.lines.is_empty() && self.pending.is_empty()
    }

    fn release_due(&mut self) {
        let due = if self.interval.is_zero() {
            u32::MAX
        } else {
            (self.started.elapsed().as_micros() / self.interval.as_micros().max(1)) as u32 + 1
        };
        while self.released < due {
            let Some(line) = self.lines.pop_front() else {
                break;
            };
            self.pending.extend(line.bytes());
            self.pending.extend(*b"\r\n");
            self.released += 1;
        }
    }
}

/// Two sentences (GGA + RMC) per navigation epoch
fn sentence_interval(rate_hz: u8) -> Duration {
    Duration::from_micros(1_000_000 / (2 * u64::from(rate_hz.max(1))))
}

impl ByteSource for ReplaySource {
    fn read_available(&mut self, buf: &mut [u8]) -> usize {
        self.release_due();
        self.pending.read_available(buf)
    }
}

impl ByteSink for ReplaySource {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        log::debug!("Replay ignores {} outbound bytes", bytes.len());
        Ok(())
    }
}
