/// Error type for configuration values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Sample rate must be greater than zero.")]
    ZeroSampleRate,
}

/// Error type for fixed-capacity decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Output buffer holds {capacity} samples but {needed} are required.")]
    OutputCapacity { needed: usize, capacity: usize },
}

/// Error type for the background player handle.
#[cfg(feature = "player")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PlayerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("The playback worker is no longer running.")]
    WorkerGone,
    #[error("The playback worker panicked.")]
    WorkerPanicked,
}
