// Typed errors with thiserror. Surface meaningful messages to JS.
// Non-fatal conditions (missing targets, provider failures, collaborator failures)
// are logged and absorbed by the engine; they never become an EngineError.

use thiserror::Error;

/// Engine error types.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("Unknown section: {0}")]
    UnknownSection(String),

    #[error("Unknown sub-demo {sub_demo} in section {section}")]
    UnknownSubDemo { section: String, sub_demo: String },

    #[error("Nothing to play: {0}")]
    EmptyContent(String),

    #[error("Guided help is turned off")]
    Disabled,

    #[error("Audio manifest error: {0}")]
    Manifest(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}
