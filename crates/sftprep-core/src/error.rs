//! Error types for data config validation.

use thiserror::Error;

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading or validating a data config.
///
/// Every variant names the offending field using a dotted path such as
/// `datasets[1].sampling` so operators can find it in the document.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The document root is not a mapping.
    #[error("Invalid data config document: {0}")]
    InvalidDocument(String),

    /// A required field is absent.
    #[error("Missing required field `{field}`")]
    MissingField {
        /// Field path.
        field: String,
    },

    /// A field is present but has the wrong type.
    #[error("Field `{field}` should be {expected}, got {actual}")]
    WrongType {
        /// Field path.
        field: String,
        /// Expected type description.
        expected: &'static str,
        /// Type that was found.
        actual: &'static str,
    },

    /// A required collection is empty.
    #[error("Field `{field}` must not be empty")]
    EmptyField {
        /// Field path.
        field: String,
    },

    /// A numeric field lies outside its allowed range.
    #[error("Field `{field}` has value {value}, expected a value in {constraint}")]
    OutOfRange {
        /// Field path.
        field: String,
        /// Offending value.
        value: f64,
        /// Allowed range.
        constraint: &'static str,
    },

    /// A string field is not one of the allowed values.
    #[error("Field `{field}` has value `{value}`, allowed values are {allowed:?}")]
    InvalidEnumValue {
        /// Field path.
        field: String,
        /// Offending value.
        value: String,
        /// Allowed values.
        allowed: &'static [&'static str],
    },

    /// A data handler entry is not a `{name, arguments}` mapping.
    #[error("Malformed data handler `{field}`: {reason}")]
    MalformedHandler {
        /// Field path.
        field: String,
        /// What is wrong with the entry.
        reason: String,
    },

    /// An encoded field failed to decode.
    #[error(
        "Field `{field}` failed during decoding, check it or use the decoded form instead: {source}"
    )]
    InvalidEncoding {
        /// Field path.
        field: String,
        /// Underlying decode failure.
        #[source]
        source: DecodeError,
    },

    /// I/O errors while reading a config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Failure while decoding a base64 encoded text field.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Input is not valid base64.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Decoded bytes are not valid UTF-8.
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl ConfigError {
    pub(crate) fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub(crate) fn wrong_type(
        field: impl Into<String>,
        expected: &'static str,
        actual: &'static str,
    ) -> Self {
        Self::WrongType {
            field: field.into(),
            expected,
            actual,
        }
    }

    pub(crate) fn malformed_handler(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedHandler {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Path of the field this error refers to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingField { field }
            | Self::WrongType { field, .. }
            | Self::EmptyField { field }
            | Self::OutOfRange { field, .. }
            | Self::InvalidEnumValue { field, .. }
            | Self::MalformedHandler { field, .. }
            | Self::InvalidEncoding { field, .. } => Some(field),
            Self::InvalidDocument(_) | Self::Io(_) | Self::Json(_) | Self::Yaml(_) => None,
        }
    }
}
