//! Error types for the NTA engine.

use thiserror::Error;

/// Engine-level error type.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Record payload could not be decoded against the topic schema.
    #[error("decode error on topic {topic}: {source}")]
    Decode {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    /// Topic name with no registered handler.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// Event-bus fetch/commit failure (transient, retried next cycle).
    #[error("bus error: {0}")]
    Bus(String),

    /// Persistent-store failure (best-effort, logged by callers).
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid configuration at startup (fatal).
    #[error("config error: {0}")]
    Config(String),
}

/// Result alias used across the engine crates.
pub type EngineResult<T> = Result<T, EngineError>;
