// src/gps/filter.rs
//! Speed-over-ground smoothing.
//!
//! Each accepted sample goes through a median-of-three spike filter and an
//! exponential moving average whose gain drops as jerk rises; each step is
//! capped at `max_accel * dt`. A sample the median out-voted whose jump from
//! the previous raw sample implies implausible jerk is discarded outright.

use serde::{Deserialize, Serialize};

/// Smallest time step used for derivatives (seconds)
const MIN_DT_S: f32 = 0.05;

/// Jerk multiple above which a median-rejected sample is treated as a jump
const JUMP_JERK_FACTOR: f32 = 3.0;

/// Filter tunables, supplied by the config store
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsFilterTuning {
    pub max_hdop_m: f32,
    pub max_accel_mps2: f32,
    pub max_jerk_mps3: f32,
    pub ema_alpha_min: f32,
    pub ema_alpha_max: f32,
}

impl Default for GpsFilterTuning {
    fn default() -> Self {
        Self {
            max_hdop_m: 1.5,
            max_accel_mps2: 12.0,
            max_jerk_mps3: 100.0,
            ema_alpha_min: 0.15,
            ema_alpha_max: 0.6,
        }
    }
}

impl GpsFilterTuning {
    /// Check `0 < ema_alpha_min <= ema_alpha_max <= 1` and positive limits
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(self.ema_alpha_min > 0.0
            && self.ema_alpha_min <= self.ema_alpha_max
            && self.ema_alpha_max <= 1.0)
        {
            return Err(format!(
                "ema alphas must satisfy 0 < min <= max <= 1 (got min {}, max {})",
                self.ema_alpha_min, self.ema_alpha_max
            ));
        }
        if !(self.max_accel_mps2 > 0.0) || !(self.max_jerk_mps3 > 0.0) {
            return Err("max_accel_mps2 and max_jerk_mps3 must be positive".to_string());
        }
        if !(self.max_hdop_m > 0.0) {
            return Err("max_hdop_m must be positive".to_string());
        }
        Ok(())
    }

    /// Quality gate: a fix is usable when it has a fix and a tight enough HDOP
    pub fn accepts(&self, fix_quality: u8, hdop: f32) -> bool {
        fix_quality > 0 && hdop <= self.max_hdop_m
    }
}

/// Result of feeding one sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterOutput {
    pub speed_mps: f32,
    pub accel_mps2: f32,
    pub jerk_mps3: f32,
    pub alpha: f32,
    pub rejected: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct FilterState {
    smoothed: f32,
    prev_raw: f32,
    accel: f32,
    t_ms: u64,
    initialized: bool,
}

/// Jerk-adaptive speed smoother. One instance per GPS source.
#[derive(Debug, Clone)]
pub struct SpeedFilter {
    tuning: GpsFilterTuning,
    state: FilterState,
}

fn median3(a: f32, b: f32, c: f32) -> f32 {
    a.max(b).min(a.min(b).max(c))
}

// Unlike f32::clamp this never panics on inverted or NaN bounds
fn bounded(v: f32, lo: f32, hi: f32) -> f32 {
    v.max(lo).min(hi)
}

impl SpeedFilter {
    pub fn new(tuning: GpsFilterTuning) -> Self {
        Self {
            tuning,
            state: FilterState::default(),
        }
    }

    pub fn tuning(&self) -> &GpsFilterTuning {
        &self.tuning
    }

    /// Swap tunables without dropping filter memory
    pub fn set_tuning(&mut self, tuning: GpsFilterTuning) {
        self.tuning = tuning;
    }

    /// Current smoothed speed (m/s)
    pub fn speed(&self) -> f32 {
        self.state.smoothed
    }

    pub fn reset(&mut self) {
        self.state = FilterState::default();
    }

    /// Feed one raw speed sample taken at `now_ms`
    pub fn update(&mut self, raw_mps: f32, now_ms: u64) -> FilterOutput {
        let t = &self.tuning;
        let s = self.state;

        if !s.initialized {
            self.state = FilterState {
                smoothed: raw_mps,
                prev_raw: raw_mps,
                accel: 0.0,
                t_ms: now_ms,
                initialized: true,
            };
            return FilterOutput {
                speed_mps: raw_mps,
                accel_mps2: 0.0,
                jerk_mps3: 0.0,
                alpha: t.ema_alpha_max,
                rejected: false,
            };
        }

        let dt = (now_ms.saturating_sub(s.t_ms) as f32 * 0.001).max(MIN_DT_S);

        // Zero-order hold prediction; a lone spike loses the median vote
        let pred = s.smoothed;
        let median = median3(s.prev_raw, raw_mps, pred);

        let max_accel = t.max_accel_mps2.abs();
        let accel = bounded((median - s.smoothed) / dt, -max_accel, max_accel);
        let jerk = (accel - s.accel) / dt;

        let j = jerk.abs();
        let ratio = if t.max_jerk_mps3 > 0.0 { j / (j + t.max_jerk_mps3) } else { 1.0 };
        let alpha = bounded(
            t.ema_alpha_max - (t.ema_alpha_max - t.ema_alpha_min) * ratio,
            t.ema_alpha_min.min(t.ema_alpha_max),
            t.ema_alpha_max.max(t.ema_alpha_min),
        );

        let max_step = max_accel * dt;
        let step = bounded(alpha * (median - s.smoothed), -max_step, max_step);
        let mut smoothed = s.smoothed + step;

        // Jerk implied by consecutive raw samples
        let raw_jerk = ((raw_mps - s.prev_raw) / dt - s.accel) / dt;
        let rejected = median != raw_mps && raw_jerk.abs() > t.max_jerk_mps3 * JUMP_JERK_FACTOR;
        if rejected {
            log::trace!("speed sample {:.2} m/s rejected (jerk {:.0} m/s^3)", raw_mps, raw_jerk);
            smoothed = s.smoothed;
        }

        self.state = FilterState {
            smoothed,
            prev_raw: raw_mps,
            accel,
            t_ms: now_ms,
            initialized: true,
        };

        FilterOutput {
            speed_mps: smoothed,
            accel_mps2: accel,
            jerk_mps3: jerk,
            alpha,
            rejected,
        }
    }
}
