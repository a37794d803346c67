// src/race.rs
//! Acceleration-run timing: arm, start on a speed rising edge, accumulate
//! great-circle distance from the start line and time each trap.

use crate::gps::data::GpsFix;
use serde::{Deserialize, Serialize};

/// Mean Earth radius used for great-circle distance (metres)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points in decimal degrees (metres)
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let r1 = lat1.to_radians();
    let r2 = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + r1.cos() * r2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// A distance checkpoint measured from the start line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trap {
    pub name: String,
    pub at_m: f64,
    /// Width of the speed-averaging window centred on `at_m`; 0 disables it
    pub window_m: f64,
}

impl Trap {
    pub fn new(name: &str, at_m: f64, window_m: f64) -> Self {
        Self {
            name: name.to_string(),
            at_m,
            window_m,
        }
    }

    fn in_window(&self, dist_m: f64) -> bool {
        let half = self.window_m / 2.0;
        self.window_m > 0.0 && dist_m >= self.at_m - half && dist_m <= self.at_m + half
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    pub arm_speed_kph: f32,
    pub trigger_speed_kph: f32,
    pub max_hdop_m: f32,
    /// Interpolate crossing time between the two fixes bracketing a trap
    pub interpolate_crossing: bool,
    pub traps: Vec<Trap>,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            arm_speed_kph: 1.0,
            trigger_speed_kph: 5.0,
            max_hdop_m: 1.5,
            interpolate_crossing: false,
            traps: vec![
                Trap::new("60ft", 18.288, 2.0),
                Trap::new("330ft", 100.584, 5.0),
                Trap::new("1/8mi", 201.168, 10.0),
                Trap::new("1000ft", 304.8, 10.0),
                Trap::new("1/4mi", 402.336, 20.0),
            ],
        }
    }
}

impl RaceConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(self.arm_speed_kph < self.trigger_speed_kph) {
            return Err(format!(
                "arm_speed_kph ({}) must be below trigger_speed_kph ({})",
                self.arm_speed_kph, self.trigger_speed_kph
            ));
        }
        if !(self.max_hdop_m > 0.0) {
            return Err("race max_hdop_m must be positive".to_string());
        }
        for trap in &self.traps {
            if trap.name.is_empty() {
                return Err("trap name must not be empty".to_string());
            }
            if !(trap.at_m >= 0.0) || !(trap.window_m >= 0.0) {
                return Err(format!("trap '{}' has a negative distance or window", trap.name));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrapResult {
    pub name: String,
    pub at_m: f64,
    pub crossed: bool,
    pub t_start_ms: u64,
    pub t_cross_ms: u64,
    pub et_ms: u64,
    /// Average speed over the trap window; crossing speed when the window is 0
    pub trap_kph: f32,
}

impl TrapResult {
    fn pending(trap: &Trap, t_start_ms: u64) -> Self {
        Self {
            name: trap.name.clone(),
            at_m: trap.at_m,
            crossed: false,
            t_start_ms,
            t_cross_ms: 0,
            et_ms: 0,
            trap_kph: 0.0,
        }
    }

    /// Elapsed time in seconds
    pub fn et_s(&self) -> f64 {
        self.et_ms as f64 / 1000.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RacePhase {
    Idle,
    Armed,
    Running,
}

/// Read-only copy of the race for observers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RaceState {
    pub armed: bool,
    pub running: bool,
    pub t_arm_ms: u64,
    pub t_start_ms: u64,
    pub lat0: f64,
    pub lon0: f64,
    pub last_lat: f64,
    pub last_lon: f64,
    pub cum_dist_m: f64,
    pub results: Vec<TrapResult>,
}

impl RaceState {
    pub fn phase(&self) -> RacePhase {
        if self.running {
            RacePhase::Running
        } else if self.armed {
            RacePhase::Armed
        } else {
            RacePhase::Idle
        }
    }
}

/// What a fix changed, in the order it happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceEvent {
    Armed,
    Started,
    TrapCrossed(usize),
}

#[derive(Debug, Clone, Copy, Default)]
struct WindowAccumulator {
    sum_kph: f64,
    samples: u32,
}

impl WindowAccumulator {
    fn average(&self) -> Option<f32> {
        (self.samples > 0).then(|| (self.sum_kph / self.samples as f64) as f32)
    }
}

/// Race timing state machine; consumes fixes, owns the race state
#[derive(Debug)]
pub struct RaceEngine {
    config: RaceConfig,
    state: RaceState,
    windows: Vec<WindowAccumulator>,
    last_fix_ms: Option<u64>,
    last_kph: Option<f32>,
    /// Speed the start's rising edge is measured from while armed
    edge_kph: Option<f32>,
    last_sample: (f64, u64), // (cum_dist_m, timestamp_ms) of the previous running fix
}

impl RaceEngine {
    pub fn new(config: RaceConfig) -> Self {
        let mut engine = Self {
            config,
            state: RaceState::default(),
            windows: Vec::new(),
            last_fix_ms: None,
            last_kph: None,
            edge_kph: None,
            last_sample: (0.0, 0),
        };
        engine.clear();
        engine
    }

    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    /// Replace the configuration; any run in progress is discarded
    pub fn set_config(&mut self, config: RaceConfig) {
        self.config = config;
        self.clear();
    }

    /// Snapshot of the current race
    pub fn state(&self) -> RaceState {
        self.state.clone()
    }

    pub fn phase(&self) -> RacePhase {
        self.state.phase()
    }

    /// Every configured trap has been crossed
    pub fn finished(&self) -> bool {
        self.state.running && self.state.results.iter().all(|r| r.crossed)
    }

    /// Manual arm. Only possible from idle.
    pub fn arm(&mut self, now_ms: u64) -> bool {
        if self.phase() != RacePhase::Idle {
            return false;
        }
        self.edge_kph = self.last_kph;
        self.enter_armed(now_ms);
        true
    }

    /// Discard the run and all results; back to idle
    pub fn reset(&mut self) {
        self.clear();
        log::info!("Race reset");
    }

    fn clear(&mut self) {
        self.state = RaceState {
            results: self
                .config
                .traps
                .iter()
                .map(|t| TrapResult::pending(t, 0))
                .collect(),
            ..RaceState::default()
        };
        self.windows = vec![WindowAccumulator::default(); self.config.traps.len()];
        self.last_sample = (0.0, 0);
        self.edge_kph = None;
    }

    /// Feed one fix. Invalid, low-quality or repeated fixes are ignored.
    pub fn update(&mut self, fix: &GpsFix) -> Vec<RaceEvent> {
        let mut events = Vec::new();

        if !fix.valid || !(fix.hdop <= self.config.max_hdop_m) {
            return events;
        }
        if self.last_fix_ms.is_some_and(|t| fix.timestamp_ms <= t) {
            return events;
        }
        self.last_fix_ms = Some(fix.timestamp_ms);

        let kph = fix.speed_kph();
        let prev_kph = self.last_kph.replace(kph);

        match self.phase() {
            RacePhase::Idle => {
                if kph >= self.config.arm_speed_kph {
                    // The edge counts from the speed before this fix
                    self.edge_kph = prev_kph;
                    self.enter_armed(fix.timestamp_ms);
                    events.push(RaceEvent::Armed);
                }
            }
            RacePhase::Armed => {
                let trigger = self.config.trigger_speed_kph;
                if kph >= trigger && self.edge_kph.is_some_and(|p| p < trigger) {
                    self.start(fix);
                    events.push(RaceEvent::Started);
                    self.check_traps(fix, kph, &mut events);
                } else {
                    self.edge_kph = Some(kph);
                }
            }
            RacePhase::Running => {
                let step = haversine_m(self.state.last_lat, self.state.last_lon, fix.lat, fix.lon);
                self.state.cum_dist_m += step;
                self.state.last_lat = fix.lat;
                self.state.last_lon = fix.lon;
                self.check_traps(fix, kph, &mut events);
            }
        }
        events
    }

    fn enter_armed(&mut self, now_ms: u64) {
        self.state.armed = true;
        self.state.t_arm_ms = now_ms;
        log::info!("Race armed at {} ms", now_ms);
    }

    fn start(&mut self, fix: &GpsFix) {
        let t = fix.timestamp_ms;
        self.state.armed = false;
        self.state.running = true;
        self.state.t_start_ms = t;
        self.state.lat0 = fix.lat;
        self.state.lon0 = fix.lon;
        self.state.last_lat = fix.lat;
        self.state.last_lon = fix.lon;
        self.state.cum_dist_m = 0.0;
        self.state.results = self
            .config
            .traps
            .iter()
            .map(|trap| TrapResult::pending(trap, t))
            .collect();
        self.windows = vec![WindowAccumulator::default(); self.config.traps.len()];
        self.last_sample = (0.0, t);
        log::info!(
            "Race started at {} ms ({:.1} kph, {:.6}, {:.6})",
            t,
            fix.speed_kph(),
            fix.lat,
            fix.lon
        );
    }

    fn crossing_time(&self, at_m: f64, now_ms: u64) -> u64 {
        let (prev_dist, prev_ms) = self.last_sample;
        let dist = self.state.cum_dist_m;
        if !self.config.interpolate_crossing || dist <= prev_dist {
            return now_ms;
        }
        let frac = ((at_m - prev_dist) / (dist - prev_dist)).clamp(0.0, 1.0);
        prev_ms + (frac * now_ms.saturating_sub(prev_ms) as f64).round() as u64
    }

    fn check_traps(&mut self, fix: &GpsFix, kph: f32, events: &mut Vec<RaceEvent>) {
        let dist = self.state.cum_dist_m;
        let t_start = self.state.t_start_ms;

        for (i, trap) in self.config.traps.iter().enumerate() {
            if trap.in_window(dist) {
                let w = &mut self.windows[i];
                w.sum_kph += f64::from(kph);
                w.samples += 1;
            }
            let window_avg = self.windows[i].average();

            if !self.state.results[i].crossed {
                if dist >= trap.at_m {
                    let t_cross = self.crossing_time(trap.at_m, fix.timestamp_ms);
                    let result = &mut self.state.results[i];
                    result.crossed = true;
                    result.t_cross_ms = t_cross;
                    result.et_ms = t_cross.saturating_sub(t_start);
                    result.trap_kph = window_avg.unwrap_or(kph);
                    log::info!(
                        "Trap {} crossed: ET {:.3} s, {:.1} kph",
                        result.name,
                        result.et_s(),
                        result.trap_kph
                    );
                    events.push(RaceEvent::TrapCrossed(i));
                }
            } else if trap.in_window(dist) {
                // Window extends past the trap; keep refining the average
                if let Some(avg) = window_avg {
                    self.state.results[i].trap_kph = avg;
                }
            }
        }
        self.last_sample = (dist, fix.timestamp_ms);
    }
}

impl Default for RaceEngine {
    fn default() -> Self {
        Self::new(RaceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const LAT0: f64 = -6.2;
    const LON0: f64 = 106.8;

    /// Latitude `meters` north of LAT0 along the meridian
    fn north(meters: f64) -> f64 {
        LAT0 + (meters / EARTH_RADIUS_M).to_degrees()
    }

    fn fix_at(t_ms: u64, kph: f32, dist_m: f64) -> GpsFix {
        GpsFix {
            lat: north(dist_m),
            lon: LON0,
            speed_mps: kph / 3.6,
            hdop: 0.8,
            fix_quality: 1,
            satellites: 10,
            timestamp_ms: t_ms,
            valid: true,
            ..GpsFix::default()
        }
    }

    fn sixty_foot() -> RaceConfig {
        RaceConfig {
            arm_speed_kph: 1.0,
            trigger_speed_kph: 5.0,
            traps: vec![Trap::new("60ft", 18.288, 2.0)],
            ..RaceConfig::default()
        }
    }

    /// Staged at 0, armed at 50, started at 100 ms from the origin
    fn running_engine(config: RaceConfig) -> RaceEngine {
        let mut engine = RaceEngine::new(config);
        engine.update(&fix_at(0, 0.0, 0.0));
        engine.update(&fix_at(50, 2.0, 0.0));
        engine.update(&fix_at(100, 6.0, 0.0));
        assert_eq!(engine.phase(), RacePhase::Running);
        engine
    }

    #[test]
    fn test_haversine_known_distance() {
        // One degree of latitude
        let d = haversine_m(0.0, 0.0, 1.0, 0.0);
        assert_abs_diff_eq!(d, 111_194.93, epsilon = 0.1);
        assert_eq!(haversine_m(10.0, 20.0, 10.0, 20.0), 0.0);
    }

    #[test]
    fn test_north_helper_matches_haversine() {
        let d = haversine_m(north(0.0), LON0, north(18.5), LON0);
        assert_abs_diff_eq!(d, 18.5, epsilon = 1e-6);
    }

    #[test]
    fn test_end_to_end_sixty_foot() {
        let mut engine = RaceEngine::new(sixty_foot());
        let t = [1000, 1100, 1200, 1300, 1400];
        let speeds = [0.0, 2.0, 6.0, 8.0, 10.0];
        let dists = [0.0, 0.0, 0.0, 9.0, 19.0];

        let events: Vec<Vec<RaceEvent>> = (0..5)
            .map(|i| engine.update(&fix_at(t[i], speeds[i], dists[i])))
            .collect();

        assert!(events[0].is_empty());
        assert_eq!(events[1], vec![RaceEvent::Armed]);
        assert_eq!(events[2], vec![RaceEvent::Started]);
        assert!(events[3].is_empty());
        assert_eq!(events[4], vec![RaceEvent::TrapCrossed(0)]);

        let state = engine.state();
        assert!(state.running);
        assert!(!state.armed);
        assert_eq!(state.t_arm_ms, 1100);
        assert_eq!(state.t_start_ms, 1200);
        let r = &state.results[0];
        assert!(r.crossed);
        assert_eq!(r.t_cross_ms, 1400);
        assert_eq!(r.et_ms, 1400 - 1200);
        assert_abs_diff_eq!(r.trap_kph, 10.0, epsilon = 1e-3);
        assert!(engine.finished());
    }

    #[test]
    fn test_crossing_uses_first_fix_past_threshold() {
        let mut engine = running_engine(sixty_foot());
        engine.update(&fix_at(200, 20.0, 17.9));
        assert!(!engine.state().results[0].crossed);

        let events = engine.update(&fix_at(300, 22.0, 18.5));
        assert_eq!(events, vec![RaceEvent::TrapCrossed(0)]);
        let r = &engine.state().results[0];
        assert_eq!(r.t_cross_ms, 300);
        assert_eq!(r.et_ms, 200);

        // Never crossed twice
        let events = engine.update(&fix_at(400, 24.0, 19.0));
        assert!(events.is_empty());
        assert_eq!(engine.state().results[0].t_cross_ms, 300);
    }

    #[test]
    fn test_interpolated_crossing() {
        let config = RaceConfig {
            interpolate_crossing: true,
            ..sixty_foot()
        };
        let mut engine = running_engine(config);
        engine.update(&fix_at(200, 20.0, 17.9));
        engine.update(&fix_at(300, 22.0, 18.5));
        let r = &engine.state().results[0];
        // (18.288 - 17.9) / 0.6 of the way from 200 to 300 ms
        assert_eq!(r.t_cross_ms, 265);
        assert_eq!(r.et_ms, 165);
    }

    #[test]
    fn test_distance_is_monotonic() {
        let mut engine = running_engine(RaceConfig::default());
        let mut last = 0.0;
        // Wander back and forth; path length still only grows
        let path = [3.0, 7.5, 6.0, 12.0, 11.0, 20.0, 35.0, 34.0];
        for (i, d) in path.iter().enumerate() {
            engine.update(&fix_at(200 + i as u64 * 100, 30.0, *d));
            let cum = engine.state().cum_dist_m;
            assert!(cum >= last);
            last = cum;
        }
        assert_abs_diff_eq!(last, 3.0 + 4.5 + 1.5 + 6.0 + 1.0 + 9.0 + 15.0 + 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_invalid_and_high_hdop_fixes_are_ignored() {
        let mut engine = running_engine(sixty_foot());

        let mut jump = fix_at(200, 40.0, 50.0);
        jump.valid = false;
        assert!(engine.update(&jump).is_empty());

        let mut noisy = fix_at(300, 40.0, 50.0);
        noisy.hdop = 4.0;
        assert!(engine.update(&noisy).is_empty());

        let state = engine.state();
        assert_eq!(state.cum_dist_m, 0.0);
        assert!(!state.results[0].crossed);
    }

    #[test]
    fn test_invalid_fix_cannot_arm_or_start() {
        let mut engine = RaceEngine::new(sixty_foot());
        let mut fast = fix_at(0, 50.0, 0.0);
        fast.valid = false;
        engine.update(&fast);
        assert_eq!(engine.phase(), RacePhase::Idle);
    }

    #[test]
    fn test_repeated_timestamp_is_ignored() {
        let mut engine = running_engine(sixty_foot());
        engine.update(&fix_at(200, 20.0, 10.0));
        assert!(engine.update(&fix_at(200, 20.0, 30.0)).is_empty());
        assert_abs_diff_eq!(engine.state().cum_dist_m, 10.0, epsilon = 1e-6);
    }

    #[test]
    fn test_start_requires_rising_edge() {
        let mut engine = RaceEngine::new(sixty_foot());
        assert!(engine.arm(0));
        // Already above trigger when armed: no start until it drops below
        engine.update(&fix_at(100, 30.0, 0.0));
        engine.update(&fix_at(200, 30.0, 5.0));
        assert_eq!(engine.phase(), RacePhase::Armed);
        engine.update(&fix_at(300, 0.0, 5.0));
        engine.update(&fix_at(400, 6.0, 5.0));
        assert_eq!(engine.phase(), RacePhase::Running);
        assert_eq!(engine.state().t_start_ms, 400);
    }

    #[test]
    fn test_arm_and_start_never_share_a_fix() {
        let mut engine = RaceEngine::new(sixty_foot());
        engine.update(&fix_at(0, 0.0, 0.0));
        let events = engine.update(&fix_at(100, 8.0, 0.0));
        assert_eq!(events, vec![RaceEvent::Armed]);
        assert_eq!(engine.phase(), RacePhase::Armed);
    }

    #[test]
    fn test_auto_arm_above_trigger_still_starts() {
        // 5 Hz receiver: one fix below arming speed, the next already past trigger
        let mut engine = RaceEngine::new(RaceConfig::default());
        let speeds = [0.5, 6.0, 12.0, 20.0, 30.0, 40.0];
        let mut events = Vec::new();
        for (i, kph) in speeds.iter().enumerate() {
            events.push(engine.update(&fix_at(i as u64 * 200, *kph, 0.0)));
        }
        assert_eq!(events[1], vec![RaceEvent::Armed]);
        assert_eq!(events[2], vec![RaceEvent::Started]);
        assert_eq!(engine.phase(), RacePhase::Running);
        assert_eq!(engine.state().t_arm_ms, 200);
        assert_eq!(engine.state().t_start_ms, 400);
    }

    #[test]
    fn test_reset_while_moving_waits_for_a_new_launch() {
        let mut engine = running_engine(sixty_foot());
        engine.update(&fix_at(200, 40.0, 10.0));
        engine.reset();

        engine.update(&fix_at(300, 40.0, 20.0));
        assert_eq!(engine.phase(), RacePhase::Armed);
        engine.update(&fix_at(400, 40.0, 30.0));
        assert_eq!(engine.phase(), RacePhase::Armed);

        engine.update(&fix_at(500, 0.0, 30.0));
        engine.update(&fix_at(600, 8.0, 30.0));
        assert_eq!(engine.phase(), RacePhase::Running);
        assert_eq!(engine.state().t_start_ms, 600);
    }

    #[test]
    fn test_set_config_discards_run() {
        let mut engine = running_engine(sixty_foot());
        engine.set_config(RaceConfig::default());
        assert_eq!(engine.phase(), RacePhase::Idle);
        assert_eq!(engine.state().results.len(), 5);
    }

    #[test]
    fn test_manual_arm_only_from_idle() {
        let mut engine = RaceEngine::new(sixty_foot());
        assert!(engine.arm(50));
        assert_eq!(engine.state().t_arm_ms, 50);
        assert!(!engine.arm(60));
    }

    #[test]
    fn test_trap_window_average() {
        let config = RaceConfig {
            traps: vec![Trap::new("100m", 100.0, 10.0)],
            ..sixty_foot()
        };
        let mut engine = running_engine(config);
        engine.update(&fix_at(200, 90.0, 94.0)); // before window
        engine.update(&fix_at(300, 100.0, 96.0));
        engine.update(&fix_at(400, 110.0, 101.0)); // crossing
        assert_abs_diff_eq!(engine.state().results[0].trap_kph, 105.0, epsilon = 1e-3);
        engine.update(&fix_at(500, 120.0, 104.0)); // still in window
        engine.update(&fix_at(600, 200.0, 120.0)); // past window
        let r = &engine.state().results[0];
        assert_abs_diff_eq!(r.trap_kph, 110.0, epsilon = 1e-3);
        assert_eq!(r.t_cross_ms, 400);
    }

    #[test]
    fn test_zero_window_uses_crossing_speed() {
        let config = RaceConfig {
            traps: vec![Trap::new("50m", 50.0, 0.0)],
            ..sixty_foot()
        };
        let mut engine = running_engine(config);
        engine.update(&fix_at(200, 40.0, 49.0));
        engine.update(&fix_at(300, 44.0, 51.0));
        assert_abs_diff_eq!(engine.state().results[0].trap_kph, 44.0, epsilon = 1e-3);
    }

    #[test]
    fn test_multiple_traps_in_one_step() {
        let config = RaceConfig {
            traps: vec![Trap::new("a", 10.0, 0.0), Trap::new("b", 20.0, 0.0)],
            ..sixty_foot()
        };
        let mut engine = running_engine(config);
        let events = engine.update(&fix_at(200, 50.0, 25.0));
        assert_eq!(events, vec![RaceEvent::TrapCrossed(0), RaceEvent::TrapCrossed(1)]);
        assert!(engine.finished());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut engine = running_engine(sixty_foot());
        engine.update(&fix_at(200, 30.0, 25.0));
        assert!(engine.state().results[0].crossed);

        engine.reset();
        let state = engine.state();
        assert!(!state.running);
        assert!(!state.armed);
        assert_eq!(state.cum_dist_m, 0.0);
        assert_eq!(state.results.len(), 1);
        assert!(state.results.iter().all(|r| !r.crossed));
        assert_eq!(engine.phase(), RacePhase::Idle);
    }

    #[test]
    fn test_race_config_validation() {
        assert!(RaceConfig::default().validate().is_ok());
        let inverted = RaceConfig {
            arm_speed_kph: 10.0,
            trigger_speed_kph: 5.0,
            ..RaceConfig::default()
        };
        assert!(inverted.validate().is_err());
        let negative = RaceConfig {
            traps: vec![Trap::new("x", -1.0, 0.0)],
            ..RaceConfig::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let cfg: RaceConfig = serde_json::from_str(r#"{"trigger_speed_kph": 8.0}"#).unwrap();
        assert_eq!(cfg.trigger_speed_kph, 8.0);
        assert_eq!(cfg.traps.len(), 5);
        assert!(!cfg.interpolate_crossing);
    }
}
