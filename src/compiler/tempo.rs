//! Tempo and timing model

use super::event::{total_units, Event};
use serde::Serialize;
use std::time::Duration;

/// Lowest tempo a fit may produce
pub const MIN_FIT_BPM: f64 = 10.0;
/// Highest tempo a fit may produce
pub const MAX_FIT_BPM: f64 = 480.0;

/// Engine configuration
///
/// `unit_duration` is derived from tempo and unit denominator and is recomputed
/// by every setter that touches either, so it is never stale.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    tempo_bpm: f64,
    note_unit_denominator: u32,
    hold_fraction: f64,
    rest_weight_pipe: u32,
    rest_weight_space: u32,
    treat_space_as_rest: bool,
    unit_duration: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut config = Self {
            tempo_bpm: 120.0,
            note_unit_denominator: 16,
            hold_fraction: 0.90,
            rest_weight_pipe: 3,
            rest_weight_space: 1,
            treat_space_as_rest: false,
            unit_duration: 0.0,
        };
        config.recompute();
        config
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tempo_bpm(&self) -> f64 {
        self.tempo_bpm
    }

    pub fn note_unit_denominator(&self) -> u32 {
        self.note_unit_denominator
    }

    pub fn hold_fraction(&self) -> f64 {
        self.hold_fraction
    }

    pub fn rest_weight_pipe(&self) -> u32 {
        self.rest_weight_pipe
    }

    pub fn rest_weight_space(&self) -> u32 {
        self.rest_weight_space
    }

    pub fn treat_space_as_rest(&self) -> bool {
        self.treat_space_as_rest
    }

    /// Seconds per logical unit
    pub fn unit_duration(&self) -> f64 {
        self.unit_duration
    }

    /// Ignores non-positive or non-finite values.
    pub fn set_tempo_bpm(&mut self, bpm: f64) {
        if bpm.is_finite() && bpm > 0.0 {
            self.tempo_bpm = bpm;
            self.recompute();
        }
    }

    /// Ignores zero.
    pub fn set_note_unit_denominator(&mut self, denominator: u32) {
        if denominator > 0 {
            self.note_unit_denominator = denominator;
            self.recompute();
        }
    }

    /// Clamped to 0.0..=1.0
    pub fn set_hold_fraction(&mut self, fraction: f64) {
        if !fraction.is_nan() {
            self.hold_fraction = fraction.clamp(0.0, 1.0);
        }
    }

    pub fn set_rest_weight_pipe(&mut self, weight: u32) {
        self.rest_weight_pipe = weight;
    }

    pub fn set_rest_weight_space(&mut self, weight: u32) {
        self.rest_weight_space = weight;
    }

    pub fn set_treat_space_as_rest(&mut self, on: bool) {
        self.treat_space_as_rest = on;
    }

    fn recompute(&mut self) {
        self.unit_duration = unit_duration(self.tempo_bpm, self.note_unit_denominator);
    }

    /// Wall-clock length of `units`
    pub fn duration_of(&self, units: u32) -> Duration {
        seconds_to_duration(self.unit_duration * units as f64)
    }

    /// Wall-clock length of a whole sequence in seconds
    pub fn expected_duration_seconds(&self, events: &[Event]) -> f64 {
        total_units(events) as f64 * self.unit_duration
    }

    /// Split an event's length into its held and trailing-gap phases.
    pub fn hold_and_gap(&self, units: u32) -> (Duration, Duration) {
        let total = self.unit_duration * units as f64;
        let down = total * self.hold_fraction;
        (seconds_to_duration(down), seconds_to_duration(total - down))
    }

    /// Set the tempo so that `total_units` last `target_seconds`.
    ///
    /// Returns false and leaves the tempo untouched if there is nothing to fit.
    pub fn fit_units(&mut self, total_units: u64, target_seconds: f64) -> bool {
        match solve_bpm(total_units, target_seconds, self.note_unit_denominator) {
            Some(bpm) => {
                self.set_tempo_bpm(bpm);
                true
            }
            None => false,
        }
    }

    /// Set the tempo so that the whole sequence lasts `target_seconds`.
    pub fn fit_total_duration(&mut self, events: &[Event], target_seconds: f64) -> bool {
        if events.is_empty() {
            return false;
        }
        self.fit_units(total_units(events), target_seconds)
    }
}

/// `(60 / bpm) * (4 / denominator)` seconds
pub fn unit_duration(tempo_bpm: f64, denominator: u32) -> f64 {
    (60.0 / tempo_bpm) * (4.0 / denominator as f64)
}

/// Tempo that makes `total_units` span `target_seconds`, clamped to the fit range.
pub fn solve_bpm(total_units: u64, target_seconds: f64, denominator: u32) -> Option<f64> {
    if total_units == 0 || denominator == 0 || !target_seconds.is_finite() || target_seconds <= 0.0 {
        return None;
    }
    let bpm = 60.0 * (4.0 / denominator as f64) * (total_units as f64 / target_seconds);
    Some(bpm.clamp(MIN_FIT_BPM, MAX_FIT_BPM))
}

/// Saturates at `Duration::MAX` for lengths too long to represent.
fn seconds_to_duration(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        Duration::ZERO
    } else {
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    }
}
