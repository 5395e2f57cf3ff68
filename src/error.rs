//! Error types for the streaming core.

/// Top-level error type for the streaming concurrency core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Stage wiring or queue error (closed queue, join timeout, ...).
    #[error("stage error: {0}")]
    Stage(String),

    /// Transcript bookkeeping error.
    #[error("transcript error: {0}")]
    Transcript(String),

    /// LLM generation run error.
    #[error("inference error: {0}")]
    Inference(String),

    /// External provider (STT/TTS/remote LLM transport) error.
    #[error("provider error: {0}")]
    Provider(String),

    /// Sentence segmentation error.
    #[error("segmenter error: {0}")]
    Segmenter(String),

    /// Configuration or credential error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, CoreError>;
