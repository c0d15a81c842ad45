//! Data config types.
//!
//! These are the typed, validated form of a data config document. They are
//! produced by [`ConfigValidator`](crate::ConfigValidator) and are read-only
//! afterwards.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Arguments of a data handler, passed through to the handler unvalidated.
pub type HandlerArguments = serde_json::Map<String, serde_json::Value>;

/// Policy for when multi-dataset interleaving halts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStoppingStrategy {
    /// Stop as soon as any one dataset runs out of records.
    FirstExhausted,
    /// Continue until every dataset is drained.
    AllExhausted,
}

impl SamplingStoppingStrategy {
    /// Accepted spellings, in config form.
    pub const ALLOWED: &'static [&'static str] = &["first_exhausted", "all_exhausted"];

    /// Config spelling of this strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstExhausted => "first_exhausted",
            Self::AllExhausted => "all_exhausted",
        }
    }
}

impl Default for SamplingStoppingStrategy {
    fn default() -> Self {
        Self::AllExhausted
    }
}

impl fmt::Display for SamplingStoppingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SamplingStoppingStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "first_exhausted" => Ok(Self::FirstExhausted),
            "all_exhausted" => Ok(Self::AllExhausted),
            other => Err(ConfigError::InvalidEnumValue {
                field: "dataprocessor.sampling_stopping_strategy".to_string(),
                value: other.to_string(),
                allowed: Self::ALLOWED,
            }),
        }
    }
}

/// A named data handler and the arguments it is invoked with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataHandlerConfig {
    /// Registered handler name.
    pub name: String,

    /// Keyword arguments for the handler.
    pub arguments: HandlerArguments,
}

/// One dataset declared in the data config.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataSetConfig {
    /// Dataset name, empty when not given.
    #[serde(default)]
    pub name: String,

    /// Files making up the dataset.
    pub data_paths: Vec<String>,

    /// Dataset loading backend (e.g. `json`, `parquet`).
    #[serde(default)]
    pub builder: Option<String>,

    /// Sampling ratio in `[0.0, 1.0]`.
    #[serde(default)]
    pub sampling: Option<f64>,

    /// Handlers applied to every record, in order.
    ///
    /// `None` means the key was absent, which is distinct from an empty list.
    #[serde(default)]
    pub data_handlers: Option<Vec<DataHandlerConfig>>,

    /// Split name to fraction, each in `[0.0, 1.0]`.
    #[serde(default)]
    pub split: Option<BTreeMap<String, f64>>,
}

/// Settings for the data preprocessor shared by all datasets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPreProcessorConfig {
    /// Preprocessor type.
    #[serde(rename = "type", default = "default_processor_type")]
    pub processor_type: String,

    /// Stopping strategy used when interleaving datasets.
    #[serde(default)]
    pub sampling_stopping_strategy: SamplingStoppingStrategy,

    /// Seed for shuffling and sampling. Not optional, for reproducibility.
    #[serde(default = "default_seed")]
    pub seed: i64,

    /// Process datasets lazily instead of materializing them.
    #[serde(default)]
    pub streaming: bool,

    /// Chat template used to format conversational data.
    #[serde(default)]
    pub chat_template: Option<String>,
}

impl Default for DataPreProcessorConfig {
    fn default() -> Self {
        Self {
            processor_type: default_processor_type(),
            sampling_stopping_strategy: SamplingStoppingStrategy::default(),
            seed: default_seed(),
            streaming: false,
            chat_template: None,
        }
    }
}

fn default_processor_type() -> String {
    "default".to_string()
}

fn default_seed() -> i64 {
    42
}

/// Root of a validated data config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Preprocessor settings.
    #[serde(default)]
    pub dataprocessor: DataPreProcessorConfig,

    /// Datasets, in declaration order. Never empty once validated.
    pub datasets: Vec<DataSetConfig>,
}

impl DataConfig {
    /// Load and validate a data config from a YAML or JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        crate::load_and_validate_data_config(path)
    }

    /// Parse and validate a data config from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let raw: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        crate::validate_data_config(&raw)
    }

    /// Parse and validate a data config from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: serde_yaml::Value = serde_json::from_str(json)?;
        crate::validate_data_config(&raw)
    }

    /// Check the invariants of a config that was built in code.
    ///
    /// Configs produced by the validator always pass.
    pub fn validate(&self) -> Result<()> {
        if self.datasets.is_empty() {
            return Err(ConfigError::EmptyField {
                field: "datasets".to_string(),
            });
        }

        for (i, dataset) in self.datasets.iter().enumerate() {
            let prefix = format!("datasets[{i}]");

            if dataset.data_paths.is_empty() {
                return Err(ConfigError::EmptyField {
                    field: format!("{prefix}.data_paths"),
                });
            }

            if let Some(ratio) = dataset.sampling {
                check_fraction(&format!("{prefix}.sampling"), ratio)?;
            }

            if let Some(split) = &dataset.split {
                for (name, ratio) in split {
                    check_fraction(&format!("{prefix}.split.{name}"), *ratio)?;
                }
            }

            for (j, handler) in dataset.data_handlers.iter().flatten().enumerate() {
                if handler.name.is_empty() {
                    return Err(ConfigError::malformed_handler(
                        format!("{prefix}.data_handlers[{j}]"),
                        "name must be a non-empty string",
                    ));
                }
            }
        }

        Ok(())
    }
}

pub(crate) fn check_fraction(field: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field: field.to_string(),
            value,
            constraint: "[0.0, 1.0]",
        })
    }
}
