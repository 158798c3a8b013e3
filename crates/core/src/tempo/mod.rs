use crate::{EngineAdapter, TapUnit, DEFAULT_SEED_TEMPO_BPM};

/// Number of tap tempi averaged into the seed tempo.
pub const TAP_HISTORY_LEN: usize = 3;

/// Seeds the engine tempo from the spacing of manual taps.
///
/// Keeps the last [`TAP_HISTORY_LEN`] tap tempi, oldest first. The history is
/// prefilled with the seed tempo, so the first one or two real taps are
/// averaged against it.
#[derive(Debug, Clone, PartialEq)]
pub struct CountInTempoEstimator {
    unit: TapUnit,
    time_of_last_bang_ms: f64,
    tempi: [f64; TAP_HISTORY_LEN],
}

impl Default for CountInTempoEstimator {
    fn default() -> Self {
        Self::new(TapUnit::default(), DEFAULT_SEED_TEMPO_BPM)
    }
}

impl CountInTempoEstimator {
    pub fn new(unit: TapUnit, seed_bpm: f64) -> Self {
        Self {
            unit,
            time_of_last_bang_ms: 0.0,
            tempi: [seed_bpm; TAP_HISTORY_LEN],
        }
    }

    /// Registers a tap at `now_ms` on the stream's monotonic clock.
    ///
    /// The tap is trusted only when its period, in the configured
    /// [`TapUnit`], lies strictly inside `(0, 1)`. A trusted tap shifts its
    /// tempo into the history, pushes the mean to the engine with
    /// `set_tempo` and returns it. The timestamp is recorded either way.
    pub fn on_tap<E: EngineAdapter + ?Sized>(
        &mut self,
        now_ms: f64,
        engine: &mut E,
    ) -> Option<f64> {
        let period = self.unit.period(now_ms - self.time_of_last_bang_ms);
        self.time_of_last_bang_ms = now_ms;

        if !(period > 0.0 && period < 1.0) {
            return None;
        }

        let tempo = (1.0 / period) * 60.0;
        self.tempi.rotate_left(1);
        self.tempi[TAP_HISTORY_LEN - 1] = tempo;

        let mean_tempo = self.tempi.iter().sum::<f64>() / TAP_HISTORY_LEN as f64;
        engine.set_tempo(mean_tempo);
        Some(mean_tempo)
    }

    /// Tap tempi, oldest first.
    pub fn tempi(&self) -> &[f64; TAP_HISTORY_LEN] {
        &self.tempi
    }

    pub fn time_of_last_bang_ms(&self) -> f64 {
        self.time_of_last_bang_ms
    }

    pub fn unit(&self) -> TapUnit {
        self.unit
    }
}
