//! Control messages and the channel that carries them to the audio thread.
//!
//! The stream that owns the engine also owns the receiving end. Control
//! threads hold [`ControlHandle`]s; commands are drained on the audio thread
//! at the start of each block, so tracker state is only ever mutated there.

use std::sync::{
    mpsc::{Receiver, Sender},
    Arc,
};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{BeatGateError, Result};

/// The closed set of control messages a tracked stream understands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    On,
    Off,
    /// Manual tap, stamped with the stream clock when it was sent.
    Bang { at_ms: f64 },
    CountIn { at_ms: f64 },
    FixTempo { bpm: f64 },
    UnfixTempo,
}

/// Monotonic millisecond clock anchored at stream creation.
#[derive(Debug, Clone, Copy)]
pub struct TapClock {
    origin: Instant,
}

impl Default for TapClock {
    fn default() -> Self {
        Self::start()
    }
}

impl TapClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Cloneable sender for control messages. Sending never blocks.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: Sender<Command>,
    clock: Arc<TapClock>,
}

impl ControlHandle {
    pub(crate) fn new(tx: Sender<Command>, clock: Arc<TapClock>) -> Self {
        Self { tx, clock }
    }

    pub fn send(&self, command: Command) -> Result<()> {
        debug!(?command, "queueing control message");
        self.tx
            .send(command)
            .map_err(|_| BeatGateError::ControlDisconnected)
    }

    pub fn on(&self) -> Result<()> {
        self.send(Command::On)
    }

    pub fn off(&self) -> Result<()> {
        self.send(Command::Off)
    }

    pub fn bang(&self) -> Result<()> {
        self.send(Command::Bang {
            at_ms: self.clock.now_ms(),
        })
    }

    pub fn count_in(&self) -> Result<()> {
        self.send(Command::CountIn {
            at_ms: self.clock.now_ms(),
        })
    }

    pub fn fix_tempo(&self, bpm: f64) -> Result<()> {
        self.send(Command::FixTempo { bpm })
    }

    pub fn unfix_tempo(&self) -> Result<()> {
        self.send(Command::UnfixTempo)
    }

    /// Milliseconds on the stream clock.
    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }
}

/// Receiving end, owned by the stream.
#[derive(Debug)]
pub(crate) struct CommandQueue {
    rx: Receiver<Command>,
    tx: Sender<Command>,
    clock: Arc<TapClock>,
}

impl CommandQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = std::sync::mpsc::channel();
        Self {
            rx,
            tx,
            clock: Arc::new(TapClock::start()),
        }
    }

    pub(crate) fn handle(&self) -> ControlHandle {
        ControlHandle::new(self.tx.clone(), Arc::clone(&self.clock))
    }

    pub(crate) fn try_recv(&self) -> Option<Command> {
        self.rx.try_recv().ok()
    }

    pub(crate) fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }
}
