use thiserror::Error;

/// Why a live signal could not be opened. Callers recover by switching the
/// track to simulated beats; none of these are fatal.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("no audio input device found")]
    NoInputDevice,

    #[error("failed to query input config: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    Build(#[from] cpal::BuildStreamError),

    #[error("failed to start input stream: {0}")]
    Play(#[from] cpal::PlayStreamError),

    #[error("analysis thread could not be spawned: {0}")]
    Thread(#[from] std::io::Error),
}
