/// Result alias that carries the custom [`BeatGateError`] type.
pub type Result<T> = std::result::Result<T, BeatGateError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum BeatGateError {
    /// The stream or its configuration was rejected.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// The tracking engine could not be constructed. The owning stream must
    /// not be used.
    #[error("failed to initialise tracking engine: {0}")]
    EngineInit(String),
    /// A host block did not match the configured hop size. The engine was not
    /// advanced for this block.
    #[error("audio block has {actual} samples, expected {expected}")]
    BlockSizeMismatch { expected: usize, actual: usize },
    /// The stream that owns the control channel has been dropped.
    #[error("tracked stream is gone; control message was not delivered")]
    ControlDisconnected,
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Rejected configuration values. Nothing is applied when one of these is
/// returned, so the previous configuration stays in effect.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("host block size must be positive and at most half of usize::MAX, got {0}")]
    InvalidBlockSize(usize),
    #[error("sample rate must be positive, got {0}")]
    InvalidSampleRate(u32),
    #[error("seed tempo must be a positive finite BPM, got {0}")]
    InvalidSeedTempo(f64),
    #[error("count-in length must be positive, got {0}")]
    InvalidCountIn(u32),
}
