use tracing::info;

use crate::{BeatGateError, ConfigError, EngineAdapter, Result};

/// Hop and frame sizing derived from the host audio block size. The frame
/// size is always exactly twice the hop size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HopFrameConfig {
    hop_size: usize,
    frame_size: usize,
}

impl HopFrameConfig {
    /// Derives the sizing for a host block size without touching any engine.
    pub fn for_block_size(host_block_size: usize) -> std::result::Result<Self, ConfigError> {
        if host_block_size == 0 {
            return Err(ConfigError::InvalidBlockSize(host_block_size));
        }
        let frame_size = host_block_size
            .checked_mul(2)
            .ok_or(ConfigError::InvalidBlockSize(host_block_size))?;
        Ok(Self {
            hop_size: host_block_size,
            frame_size,
        })
    }

    /// Validates the new block size, then propagates hop and frame size to
    /// the engine. On error nothing changes, neither here nor in the engine.
    pub fn configure<E: EngineAdapter + ?Sized>(
        &mut self,
        host_block_size: usize,
        engine: &mut E,
    ) -> std::result::Result<(), ConfigError> {
        let next = Self::for_block_size(host_block_size)?;
        engine.update_hop_and_frame_size(next.hop_size, next.frame_size);
        *self = next;
        info!(
            hop_size = self.hop_size,
            frame_size = self.frame_size,
            "configured tracker block size"
        );
        Ok(())
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }
}

/// Turns host audio blocks into engine frames.
///
/// Each host block becomes exactly one frame of `hop_size` samples; there is
/// no buffering across calls. The frame buffer is allocated by
/// [`FrameAssembler::resize`], never on the audio path.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    frame: Vec<f64>,
}

impl FrameAssembler {
    pub fn new(hop_size: usize) -> Self {
        Self {
            frame: vec![0.0; hop_size],
        }
    }

    /// Reallocates the frame buffer for a new hop size. Call only while the
    /// audio path is quiet.
    pub fn resize(&mut self, hop_size: usize) {
        self.frame.clear();
        self.frame.resize(hop_size, 0.0);
    }

    pub fn hop_size(&self) -> usize {
        self.frame.len()
    }

    /// Widens `block` into the frame buffer, advances the engine by one hop
    /// and returns whether the engine reports a beat in this frame.
    ///
    /// A block of the wrong length is rejected before the engine is touched.
    pub fn process<E: EngineAdapter + ?Sized>(
        &mut self,
        block: &[f32],
        engine: &mut E,
    ) -> Result<bool> {
        if block.len() != self.frame.len() {
            return Err(BeatGateError::BlockSizeMismatch {
                expected: self.frame.len(),
                actual: block.len(),
            });
        }

        for (slot, sample) in self.frame.iter_mut().zip(block) {
            *slot = f64::from(*sample);
        }

        engine.process_audio_frame(&self.frame);
        Ok(engine.beat_due_in_current_frame())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{EngineCall, RecordingEngine};

    #[test]
    fn frame_size_is_double_the_hop_size() {
        let mut engine = RecordingEngine::default();
        let mut sizing = HopFrameConfig::for_block_size(1).unwrap();
        for block in [1_usize, 64, 256, 300, 4096] {
            sizing.configure(block, &mut engine).unwrap();
            assert_eq!(sizing.hop_size(), block);
            assert_eq!(sizing.frame_size(), 2 * block);
        }
        assert_eq!(engine.calls.last(), Some(&EngineCall::Resize(4096, 8192)));
    }

    #[test]
    fn zero_block_size_keeps_previous_configuration() {
        let mut engine = RecordingEngine::default();
        let mut sizing = HopFrameConfig::for_block_size(256).unwrap();

        let err = sizing.configure(0, &mut engine).unwrap_err();

        assert_eq!(err, ConfigError::InvalidBlockSize(0));
        assert_eq!(sizing.hop_size(), 256);
        assert_eq!(sizing.frame_size(), 512);
        assert!(engine.calls.is_empty());
    }

    #[test]
    fn block_size_whose_frame_overflows_is_rejected() {
        let mut engine = RecordingEngine::default();
        let mut sizing = HopFrameConfig::for_block_size(256).unwrap();
        let huge = usize::MAX / 2 + 1;

        assert_eq!(
            HopFrameConfig::for_block_size(huge),
            Err(ConfigError::InvalidBlockSize(huge))
        );
        assert!(sizing.configure(huge, &mut engine).is_err());
        assert_eq!(sizing.frame_size(), 512);
        assert!(engine.calls.is_empty());
        assert!(HopFrameConfig::for_block_size(usize::MAX / 2).is_ok());
    }

    #[test]
    fn widens_samples_and_reports_beat_due() {
        let mut engine = RecordingEngine::with_beats(&[false, true]);
        let mut assembler = FrameAssembler::new(4);
        let block = [0.5_f32, -0.25, 1.0, 0.0];

        assert!(!assembler.process(&block, &mut engine).unwrap());
        assert!(assembler.process(&block, &mut engine).unwrap());
        assert_eq!(engine.last_frame, vec![0.5, -0.25, 1.0, 0.0]);
        assert_eq!(
            engine.calls,
            vec![EngineCall::Process(4), EngineCall::Process(4)]
        );
    }

    #[test]
    fn mismatched_block_does_not_advance_engine() {
        let mut engine = RecordingEngine::with_beats(&[true]);
        let mut assembler = FrameAssembler::new(8);

        let err = assembler.process(&[0.0; 4], &mut engine).unwrap_err();

        assert!(matches!(
            err,
            BeatGateError::BlockSizeMismatch {
                expected: 8,
                actual: 4
            }
        ));
        assert!(engine.calls.is_empty());
    }

    #[test]
    fn resize_changes_expected_block_length() {
        let mut assembler = FrameAssembler::new(8);
        assembler.resize(16);
        assert_eq!(assembler.hop_size(), 16);
    }
}
