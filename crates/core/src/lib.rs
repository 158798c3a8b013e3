//! Real-time streaming layer around a beat tracking engine.
//!
//! Host audio blocks are widened into engine frames, the engine is advanced
//! one hop per block, and beats it reports pass through a gate that turns
//! them into beat and tempo events. Control messages switch output on and
//! off, run a manual count-in that seeds the tempo from tap timing, and pin
//! or release the tempo.

pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod frame;
pub mod gate;
pub mod stream;
pub mod tempo;

pub use config::{TapUnit, TrackerConfig, DEFAULT_COUNT_IN, DEFAULT_SEED_TEMPO_BPM};
pub use control::{Command, ControlHandle, TapClock};
pub use engine::{build_engine, ClockEngine, EngineAdapter, EngineKind};
pub use error::{BeatGateError, ConfigError, Result};
pub use frame::{FrameAssembler, HopFrameConfig};
pub use gate::{BeatEventGate, EventSink, GateState, TrackerEvent, TrackerState};
pub use stream::{Applied, TrackedStream};
pub use tempo::{CountInTempoEstimator, TAP_HISTORY_LEN};
