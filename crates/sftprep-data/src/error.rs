//! Error types for data handlers and record processing.

use thiserror::Error;

/// Result type alias for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors raised while binding handlers or processing records.
#[derive(Error, Debug)]
pub enum DataError {
    /// A handler argument is absent, null, of the wrong type, or refers to a
    /// column the record does not have.
    #[error("Invalid argument for data handler `{handler}`: {message}")]
    HandlerArgument {
        /// Handler name.
        handler: String,
        /// What is wrong.
        message: String,
    },

    /// Template rendering failed (undefined variable, syntax error or
    /// disallowed access).
    #[error("Template render error: {0}")]
    TemplateRender(String),

    /// No handler is registered under this name.
    #[error("Unknown data handler `{name}`, registered handlers are {registered:?}")]
    UnknownHandler {
        /// Requested name.
        name: String,
        /// Names the registry knows about.
        registered: Vec<String>,
    },

    /// Tokenizer errors.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Malformed dataset file or unsupported loading backend.
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Invalid split or sampling settings.
    #[error("Invalid sampling configuration: {0}")]
    Sampling(String),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Config errors.
    #[error(transparent)]
    Config(#[from] sftprep_core::ConfigError),
}

impl DataError {
    pub(crate) fn argument(handler: &str, message: impl Into<String>) -> Self {
        Self::HandlerArgument {
            handler: handler.to_string(),
            message: message.into(),
        }
    }
}
