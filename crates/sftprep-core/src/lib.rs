//! Data config types and validation for sftprep.
//!
//! This crate turns a raw data config document (YAML or JSON) into a typed
//! [`DataConfig`]:
//!
//! - Typed config tree with documented defaults
//! - Eager validation with errors naming the offending field
//! - Relative data path normalization behind a pluggable [`PathResolver`]
//! - Decoding of the deprecated base64 chat template field

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod validate;

pub use config::*;
pub use error::*;
pub use loader::{load_and_validate_data_config, load_yaml_or_json};
pub use validate::{
    validate_data_config, validate_dataprocessor, validate_handler, ConfigValidator,
    PathResolver, WorkingDirResolver,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::*;
    pub use crate::error::{ConfigError, Result};
    pub use crate::validate::{validate_data_config, ConfigValidator, PathResolver};
}
