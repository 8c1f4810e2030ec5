use provlane_types::EventError;
use thiserror::Error;

/// Errors that can occur while building, exporting or persisting flows
#[derive(Debug, Error)]
pub enum FlowError {
    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// File system error
    #[error("File error: {0}")]
    FileError(String),

    /// Export format not supported
    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),

    /// Text rendering failed
    #[error("Render error: {0}")]
    RenderError(String),

    /// Event rejected by the event model
    #[error(transparent)]
    Event(#[from] EventError),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl FlowError {
    /// Create a new serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Create a new file error
    pub fn file(msg: impl Into<String>) -> Self {
        Self::FileError(msg.into())
    }

    /// Create a new render error
    pub fn render(msg: impl Into<String>) -> Self {
        Self::RenderError(msg.into())
    }
}

/// Result type for flow operations
pub type FlowResult<T> = Result<T, FlowError>;
