use std::fmt;

use tracing::{debug, info, warn};

use crate::{
    control::CommandQueue, BeatEventGate, Command, ControlHandle, EngineAdapter, EventSink,
    FrameAssembler, GateState, HopFrameConfig, Result, TrackerConfig, TrackerState,
};

/// One tracked audio stream.
///
/// Owns its engine outright, together with the frame assembler, the event
/// gate and the receiving end of the control channel. Dropping the stream
/// releases the engine.
pub struct TrackedStream<E: EngineAdapter> {
    engine: E,
    sizing: HopFrameConfig,
    assembler: FrameAssembler,
    gate: BeatEventGate,
    commands: CommandQueue,
}

impl<E: EngineAdapter> TrackedStream<E> {
    /// Validates `config` and configures the engine for its block size.
    pub fn new(mut engine: E, config: &TrackerConfig) -> Result<Self> {
        config.validate()?;
        let mut sizing = HopFrameConfig::for_block_size(config.block_size)?;
        sizing.configure(config.block_size, &mut engine)?;

        Ok(Self {
            engine,
            sizing,
            assembler: FrameAssembler::new(sizing.hop_size()),
            gate: BeatEventGate::new(config),
            commands: CommandQueue::new(),
        })
    }

    /// Handles a host block size change. Takes `&mut self`, so it can never
    /// overlap [`TrackedStream::process_block`].
    pub fn configure(&mut self, host_block_size: usize) -> Result<()> {
        self.sizing.configure(host_block_size, &mut self.engine)?;
        self.assembler.resize(self.sizing.hop_size());
        Ok(())
    }

    /// Audio callback entry point.
    ///
    /// Applies pending control messages, feeds the block to the engine and
    /// dispatches through the gate when a beat is due. Returns whether the
    /// engine reported a beat, whether or not it was emitted.
    ///
    /// Nothing on this path logs. Hosts that want control outcomes reported
    /// call [`TrackedStream::drain_commands`] themselves off the audio thread.
    pub fn process_block<S: EventSink + ?Sized>(
        &mut self,
        block: &[f32],
        sink: &mut S,
    ) -> Result<bool> {
        self.drain_commands(|_, _| {});

        let beat_due = self.assembler.process(block, &mut self.engine)?;
        if beat_due {
            self.gate.dispatch(&self.engine, sink);
        }
        Ok(beat_due)
    }

    /// Applies every queued control message in arrival order, handing each
    /// command and its outcome to `report`.
    pub fn drain_commands<F: FnMut(Command, Applied)>(&mut self, mut report: F) -> usize {
        let mut applied = 0;
        while let Some(command) = self.commands.try_recv() {
            let outcome = self.apply(command);
            report(command, outcome);
            applied += 1;
        }
        applied
    }

    /// Applies a control message immediately and returns what it did.
    pub fn apply(&mut self, command: Command) -> Applied {
        match command {
            Command::On => {
                self.gate.on();
                Applied::Output(self.gate.state())
            }
            Command::Off => {
                self.gate.off();
                Applied::Output(self.gate.state())
            }
            Command::Bang { at_ms } => Applied::Tap {
                tempo: self.gate.bang(at_ms, &mut self.engine),
                state: self.gate.state(),
            },
            Command::CountIn { at_ms } => Applied::Tap {
                tempo: self.gate.count_in(at_ms, &mut self.engine),
                state: self.gate.state(),
            },
            Command::FixTempo { bpm } => {
                if !bpm.is_finite() || bpm <= 0.0 {
                    return Applied::Ignored;
                }
                self.gate.fix_tempo(bpm, &mut self.engine);
                Applied::TempoFixed(bpm)
            }
            Command::UnfixTempo => {
                self.gate.unfix_tempo(&mut self.engine);
                Applied::TempoReleased
            }
        }
    }

    /// New sender for control messages, stamped with this stream's clock.
    pub fn control(&self) -> ControlHandle {
        self.commands.handle()
    }

    /// Milliseconds since the stream was created.
    pub fn now_ms(&self) -> f64 {
        self.commands.now_ms()
    }

    pub fn state(&self) -> TrackerState {
        self.gate.snapshot()
    }

    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    pub fn hop_frame(&self) -> HopFrameConfig {
        self.sizing
    }

    pub fn current_tempo(&self) -> f64 {
        self.engine.current_tempo_estimate()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Consumes the stream and hands back its engine.
    pub fn into_engine(self) -> E {
        self.engine
    }
}

/// Outcome of one control message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Applied {
    /// Output switched; carries the resulting gate state.
    Output(GateState),
    /// Tap registered. `tempo` is the new seed tempo when the tap was trusted.
    Tap {
        tempo: Option<f64>,
        state: GateState,
    },
    TempoFixed(f64),
    TempoReleased,
    /// The message carried an unusable value and was dropped.
    Ignored,
}

impl Applied {
    /// Logs the outcome of `command`. Not for use on the audio thread.
    pub fn report(self, command: Command) {
        match self {
            Applied::Tap { tempo: None, state } => {
                warn!(?command, ?state, "tap outside trust window, tempo unchanged")
            }
            Applied::Tap {
                tempo: Some(bpm),
                state: GateState::Active,
            } if matches!(command, Command::CountIn { .. }) => {
                info!(?command, bpm, "count-in tap seeded tempo, beat output on")
            }
            Applied::Ignored => warn!(?command, "ignoring control message with unusable BPM"),
            outcome => debug!(?command, ?outcome, "applied control message"),
        }
    }
}

impl<E: EngineAdapter> fmt::Debug for TrackedStream<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedStream")
            .field("sizing", &self.sizing)
            .field("gate", &self.gate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{EngineCall, RecordingEngine};
    use crate::{BeatGateError, ConfigError, TapUnit, TrackerEvent};

    fn config(block_size: usize) -> TrackerConfig {
        TrackerConfig {
            block_size,
            ..Default::default()
        }
    }

    #[test]
    fn construction_configures_engine() {
        let stream = TrackedStream::new(RecordingEngine::default(), &config(256)).unwrap();
        assert_eq!(stream.hop_frame().hop_size(), 256);
        assert_eq!(stream.hop_frame().frame_size(), 512);
        assert_eq!(stream.engine().calls, vec![EngineCall::Resize(256, 512)]);
    }

    #[test]
    fn construction_rejects_invalid_config() {
        let err = TrackedStream::new(RecordingEngine::default(), &config(0)).unwrap_err();
        assert!(matches!(
            err,
            BeatGateError::Config(ConfigError::InvalidBlockSize(0))
        ));
    }

    #[test]
    fn end_to_end_beat_emission() {
        let engine = RecordingEngine::with_beats(&[false, true]);
        let mut stream = TrackedStream::new(engine, &config(256)).unwrap();
        let block = vec![0.1_f32; 256];
        let mut events: Vec<TrackerEvent> = Vec::new();

        assert!(!stream.process_block(&block, &mut events).unwrap());
        assert!(events.is_empty());

        assert!(stream.process_block(&block, &mut events).unwrap());
        assert_eq!(events, vec![TrackerEvent::Beat, TrackerEvent::Tempo(120.0)]);
    }

    #[test]
    fn suppressed_beats_are_dropped() {
        let engine = RecordingEngine::with_beats(&[true, true]);
        let mut stream = TrackedStream::new(engine, &config(4)).unwrap();
        let mut events: Vec<TrackerEvent> = Vec::new();

        stream.apply(Command::Off);
        assert!(stream.process_block(&[0.0; 4], &mut events).unwrap());
        assert!(events.is_empty());

        stream.apply(Command::On);
        stream.process_block(&[0.0; 4], &mut events).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn reconfigure_resizes_expected_block() {
        let mut stream = TrackedStream::new(RecordingEngine::default(), &config(4)).unwrap();
        stream.configure(8).unwrap();

        let mut events: Vec<TrackerEvent> = Vec::new();
        assert!(stream.process_block(&[0.0; 4], &mut events).is_err());
        assert!(stream.process_block(&[0.0; 8], &mut events).is_ok());
        assert_eq!(stream.hop_frame().frame_size(), 16);
    }

    #[test]
    fn failed_reconfigure_keeps_previous_sizing() {
        let mut stream = TrackedStream::new(RecordingEngine::default(), &config(64)).unwrap();
        assert!(stream.configure(0).is_err());

        assert_eq!(stream.hop_frame().hop_size(), 64);
        let mut events: Vec<TrackerEvent> = Vec::new();
        assert!(stream.process_block(&[0.0; 64], &mut events).is_ok());
    }

    #[test]
    fn queued_commands_apply_before_the_block() {
        let engine = RecordingEngine::with_beats(&[true]);
        let mut stream = TrackedStream::new(engine, &config(4)).unwrap();
        let control = stream.control();
        control.off().unwrap();

        let mut events: Vec<TrackerEvent> = Vec::new();
        stream.process_block(&[0.0; 4], &mut events).unwrap();

        assert!(events.is_empty());
        assert_eq!(stream.gate_state(), GateState::Suppressed);
    }

    #[test]
    fn drained_commands_report_their_outcomes() {
        let cfg = TrackerConfig {
            block_size: 4,
            count_in: 1,
            ..Default::default()
        };
        let mut stream = TrackedStream::new(RecordingEngine::default(), &cfg).unwrap();
        let control = stream.control();
        control.off().unwrap();
        control.send(Command::CountIn { at_ms: 500.0 }).unwrap();
        control.send(Command::Bang { at_ms: 500.0 }).unwrap();
        control.fix_tempo(f64::NAN).unwrap();
        control.unfix_tempo().unwrap();

        let mut outcomes = Vec::new();
        let drained = stream.drain_commands(|_, applied| outcomes.push(applied));

        assert_eq!(drained, 5);
        assert_eq!(outcomes[0], Applied::Output(GateState::Suppressed));
        match outcomes[1] {
            Applied::Tap {
                tempo: Some(bpm),
                state: GateState::Active,
            } => assert!((bpm - 120.0).abs() < 1e-9),
            other => panic!("expected trusted tap, got {other:?}"),
        }
        assert_eq!(
            outcomes[2],
            Applied::Tap {
                tempo: None,
                state: GateState::Active
            }
        );
        assert_eq!(outcomes[3..], [Applied::Ignored, Applied::TempoReleased]);
        assert_eq!(stream.drain_commands(|_, _| {}), 0);
    }

    #[test]
    fn count_in_commands_seed_tempo_and_reenable_output() {
        let cfg = TrackerConfig {
            block_size: 4,
            tap_unit: TapUnit::Seconds,
            ..Default::default()
        };
        let mut stream = TrackedStream::new(RecordingEngine::default(), &cfg).unwrap();

        stream.apply(Command::Off);
        for at_ms in [2000.0, 2400.0, 2800.0, 3200.0] {
            stream.apply(Command::CountIn { at_ms });
        }

        let state = stream.state();
        assert!(state.should_output_beats);
        assert_eq!(state.count_in, 0);
        assert_eq!(state.time_of_last_bang_ms, 3200.0);
        for tempo in state.count_in_tempi {
            assert!((tempo - 150.0).abs() < 1e-9);
        }
        assert!((stream.current_tempo() - 150.0).abs() < 1e-9);
    }

    #[test]
    fn fix_tempo_is_recorded_and_unusable_values_ignored() {
        let mut stream = TrackedStream::new(RecordingEngine::default(), &config(4)).unwrap();
        stream.apply(Command::FixTempo { bpm: -3.0 });
        assert_eq!(stream.state().fixed_tempo, None);

        stream.apply(Command::FixTempo { bpm: 90.0 });
        assert_eq!(stream.state().fixed_tempo, Some(90.0));
        stream.apply(Command::UnfixTempo);
        assert_eq!(stream.state().fixed_tempo, None);
        let calls = stream.into_engine().calls;
        assert_eq!(
            calls[1..],
            [EngineCall::FixTempo(90.0), EngineCall::Unfix]
        );
    }
}
