//! Validation of raw data config documents.
//!
//! The validator walks a document that has already been parsed into a
//! [`serde_yaml::Value`] tree and turns it into a [`DataConfig`]. Each entity
//! is assembled from validated locals and constructed in one step, so a
//! partially validated config is never handed out.

use crate::config::{
    check_fraction, DataConfig, DataHandlerConfig, DataPreProcessorConfig, DataSetConfig,
    HandlerArguments, SamplingStoppingStrategy,
};
use crate::error::{ConfigError, DecodeError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Decides whether a relative data path should be rewritten as absolute.
pub trait PathResolver: Send + Sync {
    /// Return the absolute form of `path` when it should replace the original.
    fn resolve(&self, path: &str) -> Option<PathBuf>;
}

/// Rewrites relative paths that exist relative to the working directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkingDirResolver;

impl PathResolver for WorkingDirResolver {
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let path = Path::new(path);
        if path.is_absolute() {
            return None;
        }
        let absolute = std::path::absolute(path).ok()?;
        absolute.exists().then_some(absolute)
    }
}

/// Converts raw documents into [`DataConfig`] values.
pub struct ConfigValidator {
    resolver: Box<dyn PathResolver>,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidator {
    /// Create a validator that resolves paths against the working directory.
    pub fn new() -> Self {
        Self::with_resolver(WorkingDirResolver)
    }

    /// Create a validator with a custom path resolution policy.
    pub fn with_resolver(resolver: impl PathResolver + 'static) -> Self {
        Self {
            resolver: Box::new(resolver),
        }
    }

    /// Validate a whole data config document.
    pub fn validate(&self, raw: &Value) -> Result<DataConfig> {
        let root = raw.as_mapping().ok_or_else(|| {
            ConfigError::InvalidDocument(format!(
                "the data config should be a mapping, got {}",
                type_name(raw)
            ))
        })?;

        let raw_datasets = root
            .get("datasets")
            .ok_or_else(|| ConfigError::missing("datasets"))?;
        let raw_datasets = raw_datasets
            .as_sequence()
            .ok_or_else(|| ConfigError::wrong_type("datasets", "a list", type_name(raw_datasets)))?;
        if raw_datasets.is_empty() {
            return Err(ConfigError::EmptyField {
                field: "datasets".to_string(),
            });
        }

        let datasets = raw_datasets
            .iter()
            .enumerate()
            .map(|(i, d)| self.validate_dataset(d, &format!("datasets[{i}]")))
            .collect::<Result<Vec<_>>>()?;

        let dataprocessor = match root.get("dataprocessor") {
            Some(raw) => validate_dataprocessor(raw)?,
            None => DataPreProcessorConfig::default(),
        };

        Ok(DataConfig {
            dataprocessor,
            datasets,
        })
    }

    /// Validate one entry of the `datasets` list.
    pub fn validate_dataset(&self, raw: &Value, field: &str) -> Result<DataSetConfig> {
        let entry = raw
            .as_mapping()
            .ok_or_else(|| ConfigError::wrong_type(field, "a mapping", type_name(raw)))?;

        let name = match entry.get("name") {
            Some(v) => expect_str(v, &format!("{field}.name"))?.to_string(),
            None => String::new(),
        };

        let paths_field = format!("{field}.data_paths");
        let raw_paths = entry
            .get("data_paths")
            .ok_or_else(|| ConfigError::missing(&paths_field))?;
        let raw_paths = raw_paths
            .as_sequence()
            .ok_or_else(|| ConfigError::wrong_type(&paths_field, "a list", type_name(raw_paths)))?;
        if raw_paths.is_empty() {
            return Err(ConfigError::EmptyField { field: paths_field });
        }
        let data_paths = raw_paths
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let path = expect_str(p, &format!("{paths_field}[{i}]"))?;
                Ok(self.normalize_path(path))
            })
            .collect::<Result<Vec<_>>>()?;

        let builder = match present(entry, "builder") {
            Some(v) => Some(expect_str(v, &format!("{field}.builder"))?.to_string()),
            None => None,
        };

        let sampling = match present(entry, "sampling") {
            Some(v) => Some(expect_fraction(v, &format!("{field}.sampling"))?),
            None => None,
        };

        let data_handlers = match entry.get("data_handlers") {
            Some(v) => {
                let handlers_field = format!("{field}.data_handlers");
                let raw_handlers = v.as_sequence().ok_or_else(|| {
                    ConfigError::wrong_type(&handlers_field, "a list", type_name(v))
                })?;
                let handlers = raw_handlers
                    .iter()
                    .enumerate()
                    .map(|(i, h)| validate_handler(h, &format!("{handlers_field}[{i}]")))
                    .collect::<Result<Vec<_>>>()?;
                Some(handlers)
            }
            None => None,
        };

        let split = match present(entry, "split") {
            Some(v) => Some(validate_split(v, &format!("{field}.split"))?),
            None => None,
        };

        Ok(DataSetConfig {
            name,
            data_paths,
            builder,
            sampling,
            data_handlers,
            split,
        })
    }

    fn normalize_path(&self, path: &str) -> String {
        match self.resolver.resolve(path) {
            Some(absolute) => match absolute.to_str() {
                Some(s) => {
                    tracing::warn!(
                        "Provided path {} is not absolute, changing it to {}",
                        path,
                        s
                    );
                    s.to_string()
                }
                None => path.to_string(),
            },
            None => path.to_string(),
        }
    }
}

/// Validate a data config document, resolving paths against the working directory.
pub fn validate_data_config(raw: &Value) -> Result<DataConfig> {
    ConfigValidator::new().validate(raw)
}

/// Validate one `data_handlers` entry.
pub fn validate_handler(raw: &Value, field: &str) -> Result<DataHandlerConfig> {
    let entry = raw.as_mapping().ok_or_else(|| {
        ConfigError::malformed_handler(field, format!("expected a mapping, got {}", type_name(raw)))
    })?;

    let name = match entry.get("name") {
        Some(Value::String(name)) if !name.is_empty() => name.clone(),
        Some(Value::String(_)) => {
            return Err(ConfigError::malformed_handler(field, "name must not be empty"))
        }
        Some(other) => {
            return Err(ConfigError::malformed_handler(
                field,
                format!("name should be a string, got {}", type_name(other)),
            ))
        }
        None => return Err(ConfigError::malformed_handler(field, "name is required")),
    };

    let arguments = match entry.get("arguments") {
        Some(Value::Mapping(args)) => convert_arguments(args, field)?,
        Some(other) => {
            return Err(ConfigError::malformed_handler(
                field,
                format!("arguments should be a mapping, got {}", type_name(other)),
            ))
        }
        None => return Err(ConfigError::malformed_handler(field, "arguments are required")),
    };

    Ok(DataHandlerConfig { name, arguments })
}

/// Validate the `dataprocessor` section.
pub fn validate_dataprocessor(raw: &Value) -> Result<DataPreProcessorConfig> {
    let entry = raw
        .as_mapping()
        .ok_or_else(|| ConfigError::wrong_type("dataprocessor", "a mapping", type_name(raw)))?;
    let defaults = DataPreProcessorConfig::default();

    let processor_type = match entry.get("type") {
        Some(v) => expect_str(v, "dataprocessor.type")?.to_string(),
        None => defaults.processor_type,
    };

    let sampling_stopping_strategy = match entry.get("sampling_stopping_strategy") {
        Some(v) => expect_str(v, "dataprocessor.sampling_stopping_strategy")?
            .parse::<SamplingStoppingStrategy>()?,
        None => defaults.sampling_stopping_strategy,
    };

    let seed = match entry.get("seed") {
        Some(v) => v
            .as_i64()
            .ok_or_else(|| ConfigError::wrong_type("dataprocessor.seed", "an integer", type_name(v)))?,
        None => defaults.seed,
    };

    let streaming = match entry.get("streaming") {
        Some(v) => v.as_bool().ok_or_else(|| {
            ConfigError::wrong_type("dataprocessor.streaming", "a boolean", type_name(v))
        })?,
        None => defaults.streaming,
    };

    let chat_template = if let Some(v) = entry.get("chat_template") {
        Some(expect_str(v, "dataprocessor.chat_template")?.to_string())
    } else if let Some(v) = entry.get("chat_template_base64") {
        let encoded = expect_str(v, "dataprocessor.chat_template_base64")?;
        tracing::warn!(
            "You are using the 'chat_template_base64' field. \
             Please use the 'chat_template' field instead for better readability."
        );
        Some(decode_base64_text(encoded).map_err(|source| ConfigError::InvalidEncoding {
            field: "dataprocessor.chat_template_base64".to_string(),
            source,
        })?)
    } else {
        None
    };

    Ok(DataPreProcessorConfig {
        processor_type,
        sampling_stopping_strategy,
        seed,
        streaming,
        chat_template,
    })
}

/// Line breaks inside the encoded text are ignored, as in wrapped base64 output.
fn decode_base64_text(encoded: &str) -> std::result::Result<String, DecodeError> {
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD.decode(compact)?;
    Ok(String::from_utf8(bytes)?)
}

fn validate_split(raw: &Value, field: &str) -> Result<BTreeMap<String, f64>> {
    let entries = raw
        .as_mapping()
        .ok_or_else(|| ConfigError::wrong_type(field, "a mapping of split_name: ratio", type_name(raw)))?;

    let mut split = BTreeMap::new();
    for (key, value) in entries {
        let key = key
            .as_str()
            .ok_or_else(|| ConfigError::wrong_type(format!("{field} key"), "a string", type_name(key)))?;
        let ratio = expect_fraction(value, &format!("{field}.{key}"))?;
        split.insert(key.to_string(), ratio);
    }
    Ok(split)
}

/// Lookup that treats an explicit `null` the same as an absent key.
fn present<'a>(entry: &'a Mapping, key: &str) -> Option<&'a Value> {
    entry.get(key).filter(|v| !v.is_null())
}

fn expect_str<'a>(value: &'a Value, field: &str) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| ConfigError::wrong_type(field, "a string", type_name(value)))
}

/// Numeric value in `[0, 1]`. YAML turns `1.0` into `1`, so integers are accepted.
fn expect_fraction(value: &Value, field: &str) -> Result<f64> {
    let ratio = match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
    .ok_or_else(|| ConfigError::wrong_type(field, "a float in [0.0, 1.0]", type_name(value)))?;
    check_fraction(field, ratio)?;
    Ok(ratio)
}

fn convert_arguments(args: &Mapping, field: &str) -> Result<HandlerArguments> {
    let mut converted = HandlerArguments::new();
    for (key, value) in args {
        let key = key.as_str().ok_or_else(|| {
            ConfigError::malformed_handler(
                field,
                format!("argument keys should be strings, got {}", type_name(key)),
            )
        })?;
        converted.insert(key.to_string(), to_json(value, field)?);
    }
    Ok(converted)
}

fn to_json(value: &Value, field: &str) -> Result<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into()
            } else if let Some(u) = n.as_u64() {
                u.into()
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(serde_json::Value::Number)
                    .ok_or_else(|| {
                        ConfigError::malformed_handler(field, format!("unsupported number {n}"))
                    })?
            }
        }
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Sequence(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|v| to_json(v, field))
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Mapping(map) => serde_json::Value::Object(convert_arguments(map, field)?),
        Value::Tagged(tagged) => to_json(&tagged.value, field)?,
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(n) if n.is_f64() => "a float",
        Value::Number(_) => "an integer",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
