use serde::{Deserialize, Serialize};

use crate::{CountInTempoEstimator, EngineAdapter, TrackerConfig, TAP_HISTORY_LEN};

/// An event leaving the tracker. A beat is always followed by the tempo
/// estimate taken at the same frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "bpm", rename_all = "snake_case")]
pub enum TrackerEvent {
    Beat,
    Tempo(f64),
}

/// Destination for beat and tempo events, one method per outlet.
///
/// Called from the audio path; implementations should not block.
pub trait EventSink {
    fn beat(&mut self);
    fn tempo(&mut self, bpm: f64);
}

impl EventSink for Vec<TrackerEvent> {
    fn beat(&mut self) {
        self.push(TrackerEvent::Beat);
    }

    fn tempo(&mut self, bpm: f64) {
        self.push(TrackerEvent::Tempo(bpm));
    }
}

impl<F: FnMut(TrackerEvent)> EventSink for F {
    fn beat(&mut self) {
        self(TrackerEvent::Beat)
    }

    fn tempo(&mut self, bpm: f64) {
        self(TrackerEvent::Tempo(bpm))
    }
}

/// Observable gate state, derived from the output flag and the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Active,
    Suppressed,
    /// Suppressed with a countdown in progress.
    CountingIn,
}

/// Snapshot of the per-stream tracker state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerState {
    pub should_output_beats: bool,
    pub time_of_last_bang_ms: f64,
    pub count_in: i32,
    pub count_in_tempi: [f64; TAP_HISTORY_LEN],
    pub fixed_tempo: Option<f64>,
}

/// Decides whether beats reported by the engine become events, and handles
/// the on/off/count-in/tap control messages.
#[derive(Debug, Clone)]
pub struct BeatEventGate {
    should_output_beats: bool,
    count_in: i32,
    count_in_length: i32,
    fixed_tempo: Option<f64>,
    estimator: CountInTempoEstimator,
}

impl Default for BeatEventGate {
    fn default() -> Self {
        Self::new(&TrackerConfig::default())
    }
}

impl BeatEventGate {
    pub fn new(config: &TrackerConfig) -> Self {
        let count_in_length = i32::try_from(config.count_in).unwrap_or(i32::MAX);
        Self {
            should_output_beats: true,
            count_in: count_in_length,
            count_in_length,
            fixed_tempo: None,
            estimator: CountInTempoEstimator::new(config.tap_unit, config.seed_tempo_bpm),
        }
    }

    pub fn on(&mut self) {
        self.should_output_beats = true;
    }

    /// Suppresses output and rearms the count-in.
    pub fn off(&mut self) {
        self.should_output_beats = false;
        self.count_in = self.count_in_length;
    }

    /// Counts one tap down, seeds the tempo from it, and re-enables output
    /// when the countdown reaches exactly zero. Returns the new seed tempo
    /// when the tap was trusted.
    pub fn count_in<E: EngineAdapter + ?Sized>(
        &mut self,
        now_ms: f64,
        engine: &mut E,
    ) -> Option<f64> {
        self.count_in -= 1;
        let tempo = self.bang(now_ms, engine);
        if self.count_in == 0 {
            self.should_output_beats = true;
        }
        tempo
    }

    /// Manual tap. Seeds the tempo in every state, not only during count-in.
    pub fn bang<E: EngineAdapter + ?Sized>(
        &mut self,
        now_ms: f64,
        engine: &mut E,
    ) -> Option<f64> {
        self.estimator.on_tap(now_ms, engine)
    }

    pub fn fix_tempo<E: EngineAdapter + ?Sized>(&mut self, bpm: f64, engine: &mut E) {
        self.fixed_tempo = Some(bpm);
        engine.fix_tempo(bpm);
    }

    pub fn unfix_tempo<E: EngineAdapter + ?Sized>(&mut self, engine: &mut E) {
        self.fixed_tempo = None;
        engine.do_not_fix_tempo();
    }

    /// Emits a beat and the current tempo estimate if output is enabled.
    /// Suppressed beats are dropped, never replayed.
    pub fn dispatch<E, S>(&self, engine: &E, sink: &mut S) -> bool
    where
        E: EngineAdapter + ?Sized,
        S: EventSink + ?Sized,
    {
        if !self.should_output_beats {
            return false;
        }
        sink.beat();
        sink.tempo(engine.current_tempo_estimate());
        true
    }

    pub fn state(&self) -> GateState {
        if self.should_output_beats {
            GateState::Active
        } else if self.count_in < self.count_in_length {
            GateState::CountingIn
        } else {
            GateState::Suppressed
        }
    }

    pub fn should_output_beats(&self) -> bool {
        self.should_output_beats
    }

    pub fn remaining_count_in(&self) -> i32 {
        self.count_in
    }

    pub fn fixed_tempo(&self) -> Option<f64> {
        self.fixed_tempo
    }

    pub fn estimator(&self) -> &CountInTempoEstimator {
        &self.estimator
    }

    pub fn snapshot(&self) -> TrackerState {
        TrackerState {
            should_output_beats: self.should_output_beats,
            time_of_last_bang_ms: self.estimator.time_of_last_bang_ms(),
            count_in: self.count_in,
            count_in_tempi: *self.estimator.tempi(),
            fixed_tempo: self.fixed_tempo,
        }
    }
}
