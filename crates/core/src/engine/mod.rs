//! Interface to the external beat tracking engine, plus a free-running clock
//! engine used when no analysis backend is wired in.

use serde::{Deserialize, Serialize};

use crate::{BeatGateError, Result, TrackerConfig};

const MIN_FOLDED_TEMPO: f64 = 80.0;
const MAX_FOLDED_TEMPO: f64 = 160.0;

/// Operations the streaming layer needs from a beat tracking engine.
///
/// `beat_due_in_current_frame` is queried exactly once per frame, after
/// `process_audio_frame`. `update_hop_and_frame_size` is never called while a
/// frame is being processed; the owning stream takes `&mut self` for both.
pub trait EngineAdapter {
    /// Advances the engine by one hop.
    fn process_audio_frame(&mut self, frame: &[f64]);

    /// Whether the most recent frame contained a beat onset.
    fn beat_due_in_current_frame(&self) -> bool;

    fn current_tempo_estimate(&self) -> f64;

    /// Biases the tempo estimate without pinning it.
    fn set_tempo(&mut self, bpm: f64);

    /// Pins the tempo until [`EngineAdapter::do_not_fix_tempo`] is called.
    fn fix_tempo(&mut self, bpm: f64);

    fn do_not_fix_tempo(&mut self);

    fn update_hop_and_frame_size(&mut self, hop_size: usize, frame_size: usize);
}

impl<E: EngineAdapter + ?Sized> EngineAdapter for Box<E> {
    fn process_audio_frame(&mut self, frame: &[f64]) {
        (**self).process_audio_frame(frame)
    }

    fn beat_due_in_current_frame(&self) -> bool {
        (**self).beat_due_in_current_frame()
    }

    fn current_tempo_estimate(&self) -> f64 {
        (**self).current_tempo_estimate()
    }

    fn set_tempo(&mut self, bpm: f64) {
        (**self).set_tempo(bpm)
    }

    fn fix_tempo(&mut self, bpm: f64) {
        (**self).fix_tempo(bpm)
    }

    fn do_not_fix_tempo(&mut self) {
        (**self).do_not_fix_tempo()
    }

    fn update_hop_and_frame_size(&mut self, hop_size: usize, frame_size: usize) {
        (**self).update_hop_and_frame_size(hop_size, frame_size)
    }
}

/// Engines that can be named in a [`TrackerConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    #[default]
    Clock,
}

/// Builds the engine selected by `config.engine`.
pub fn build_engine(config: &TrackerConfig) -> Result<Box<dyn EngineAdapter + Send>> {
    match config.engine {
        EngineKind::Clock => Ok(Box::new(ClockEngine::new(
            config.sample_rate,
            config.seed_tempo_bpm,
        )?)),
    }
}

/// Free-running tempo clock.
///
/// Reports a beat whenever the samples accumulated since the previous beat
/// reach one beat period at the current tempo. It never looks at the audio
/// content, so its tempo only moves through `set_tempo` and `fix_tempo`.
#[derive(Debug, Clone)]
pub struct ClockEngine {
    sample_rate: f64,
    tempo_bpm: f64,
    fixed: bool,
    hop_size: usize,
    frame_size: usize,
    samples_since_beat: f64,
    beat_due: bool,
}

impl ClockEngine {
    pub fn new(sample_rate: u32, seed_bpm: f64) -> Result<Self> {
        if sample_rate == 0 {
            return Err(BeatGateError::EngineInit(
                "sample rate must be positive".to_string(),
            ));
        }
        if !seed_bpm.is_finite() || seed_bpm <= 0.0 {
            return Err(BeatGateError::EngineInit(format!(
                "seed tempo {seed_bpm} is not a positive BPM value"
            )));
        }

        Ok(Self {
            sample_rate: sample_rate as f64,
            tempo_bpm: fold_tempo(seed_bpm),
            fixed: false,
            hop_size: 0,
            frame_size: 0,
            samples_since_beat: 0.0,
            beat_due: false,
        })
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn beat_period_samples(&self) -> f64 {
        60.0 / self.tempo_bpm * self.sample_rate
    }
}

impl EngineAdapter for ClockEngine {
    fn process_audio_frame(&mut self, frame: &[f64]) {
        let period = self.beat_period_samples();
        self.samples_since_beat += frame.len() as f64;
        self.beat_due = self.samples_since_beat >= period;
        if self.beat_due {
            // At most one beat per frame, even after a large tempo jump.
            self.samples_since_beat = (self.samples_since_beat - period) % period;
        }
    }

    fn beat_due_in_current_frame(&self) -> bool {
        self.beat_due
    }

    fn current_tempo_estimate(&self) -> f64 {
        self.tempo_bpm
    }

    fn set_tempo(&mut self, bpm: f64) {
        if self.fixed || !is_usable_tempo(bpm) {
            return;
        }
        self.tempo_bpm = fold_tempo(bpm);
    }

    fn fix_tempo(&mut self, bpm: f64) {
        if !is_usable_tempo(bpm) {
            return;
        }
        self.tempo_bpm = fold_tempo(bpm);
        self.fixed = true;
    }

    fn do_not_fix_tempo(&mut self) {
        self.fixed = false;
    }

    fn update_hop_and_frame_size(&mut self, hop_size: usize, frame_size: usize) {
        self.hop_size = hop_size;
        self.frame_size = frame_size;
    }
}

fn is_usable_tempo(bpm: f64) -> bool {
    bpm.is_finite() && bpm > 0.0
}

/// Moves a tempo by octaves into the 80-160 BPM band.
fn fold_tempo(mut bpm: f64) -> f64 {
    while bpm > MAX_FOLDED_TEMPO {
        bpm /= 2.0;
    }
    while bpm < MIN_FOLDED_TEMPO {
        bpm *= 2.0;
    }
    bpm
}
