//! Data handlers and preprocessing for sftprep.
//!
//! This crate provides:
//! - Record loading from JSON and JSONL files, eager or streamed
//! - Built-in data handlers and a registry to extend them
//! - Per-dataset handler pipelines
//! - Dataset splitting and weighted interleaving
//! - Tokenizer integration

#![warn(missing_docs)]

pub mod dataset;
pub mod error;
pub mod handlers;
pub mod mixing;
pub mod pipeline;
pub mod preprocessor;
pub mod tokenizer;

pub use dataset::*;
pub use error::{DataError, Result};
pub use handlers::{DataHandler, HandlerKind, HandlerRegistry, MapOptions, RecordHandler};
pub use mixing::{interleave, sampling_probabilities};
pub use pipeline::DatasetPipeline;
pub use preprocessor::{DataPreProcessor, DEFAULT_SPLIT};
pub use tokenizer::*;
