//! Error types for the deception pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// No generation provider has a credential configured. Surfaced to the
    /// caller as a 5xx-class failure: the honeypot must not silently degrade
    /// into an empty response.
    #[error("no text generator is configured")]
    GenerationUnavailable,

    #[error("text generation failed: {0}")]
    Generation(String),

    #[error("evidence capture failed: {0}")]
    EvidenceCapture(String),

    #[error("protected artifact read failed: {0}")]
    ArtifactRead(#[source] std::io::Error),

    #[error("protected artifact write failed: {0}")]
    ArtifactWrite(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
