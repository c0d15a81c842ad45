//! Data handlers applied to dataset records.
//!
//! A data handler is a named, parameterized per-record transform (map) or
//! predicate (filter). Handlers are looked up by name in a
//! [`HandlerRegistry`], which binds the raw `arguments` of a
//! [`DataHandlerConfig`] to a typed argument struct once, up front. Binding
//! rejects unknown handlers, unknown argument keys, and missing or mistyped
//! arguments; checks that depend on the record itself (column existence,
//! column type) happen per record.
//!
//! Bound handlers are immutable and may be shared between threads. Each
//! invocation only touches the record it is given.

mod columns;
mod template;
mod tokenize;

pub use columns::{
    duplicate_columns, skip_samples_with_large_columns, DuplicateColumns, SkipLargeColumns,
};
pub use template::{apply_custom_jinja_template, CustomTemplate};
pub use tokenize::{tokenize, Tokenize};

use crate::dataset::Record;
use crate::error::{DataError, Result};
use crate::tokenizer::TextEncoder;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sftprep_core::{DataHandlerConfig, HandlerArguments};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Name of the template formatting handler.
pub const APPLY_CUSTOM_JINJA_TEMPLATE: &str = "apply_custom_jinja_template";
/// Name of the column copy handler.
pub const DUPLICATE_COLUMNS: &str = "duplicate_columns";
/// Name of the tokenization handler.
pub const TOKENIZE: &str = "tokenize";
/// Name of the length filter handler.
pub const SKIP_SAMPLES_WITH_LARGE_COLUMNS: &str = "skip_samples_with_large_columns";

/// How the engine applies a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    /// Transforms every record.
    Map,
    /// Keeps or drops records.
    Filter,
}

/// A bound handler implementation.
pub trait RecordHandler: Send + Sync {
    /// Whether this handler maps or filters.
    fn kind(&self) -> HandlerKind;

    /// Apply the handler to one record.
    ///
    /// Map handlers return the updated record. Filter handlers return the
    /// record unchanged when it is kept and `None` when it is dropped.
    fn apply(&self, record: Record, tokenizer: &dyn TextEncoder) -> Result<Option<Record>>;

    /// Columns written by this handler. These survive `remove_columns`.
    fn output_columns(&self) -> Vec<&str> {
        Vec::new()
    }
}

/// Builds a handler from its config arguments.
pub type BindFn = fn(&HandlerArguments) -> Result<Arc<dyn RecordHandler>>;

/// Maps handler names to their binding functions.
#[derive(Clone)]
pub struct HandlerRegistry {
    binders: BTreeMap<String, BindFn>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(APPLY_CUSTOM_JINJA_TEMPLATE, |args| {
            Ok(Arc::new(CustomTemplate::from_arguments(args)?))
        });
        registry.register(DUPLICATE_COLUMNS, |args| {
            Ok(Arc::new(DuplicateColumns::from_arguments(args)?))
        });
        registry.register(TOKENIZE, |args| Ok(Arc::new(Tokenize::from_arguments(args)?)));
        registry.register(SKIP_SAMPLES_WITH_LARGE_COLUMNS, |args| {
            Ok(Arc::new(SkipLargeColumns::from_arguments(args)?))
        });
        registry
    }
}

impl HandlerRegistry {
    /// Create a registry without any handlers.
    pub fn empty() -> Self {
        Self {
            binders: BTreeMap::new(),
        }
    }

    /// Register a handler, returning the binder it replaced.
    pub fn register(&mut self, name: impl Into<String>, bind: BindFn) -> Option<BindFn> {
        self.binders.insert(name.into(), bind)
    }

    /// Check whether a handler name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.binders.contains_key(name)
    }

    /// Registered handler names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.binders.keys().map(String::as_str).collect()
    }

    /// Bind a handler config entry to its implementation.
    pub fn bind(&self, config: &DataHandlerConfig) -> Result<DataHandler> {
        let bind = self
            .binders
            .get(&config.name)
            .ok_or_else(|| DataError::UnknownHandler {
                name: config.name.clone(),
                registered: self.binders.keys().cloned().collect(),
            })?;

        let (kwargs, options) = split_arguments(&config.name, &config.arguments)?;
        let handler = bind(&kwargs)?;
        if handler.kind() == HandlerKind::Filter && options.remove_columns.is_some() {
            return Err(DataError::argument(
                &config.name,
                "remove_columns only applies to map handlers, filters keep records unchanged",
            ));
        }
        tracing::debug!(
            "Bound data handler {} ({:?}) with options {:?}",
            config.name,
            handler.kind(),
            options
        );

        Ok(DataHandler {
            name: config.name.clone(),
            handler,
            options,
        })
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

/// A handler bound to its arguments, ready to run on records.
#[derive(Clone)]
pub struct DataHandler {
    name: String,
    handler: Arc<dyn RecordHandler>,
    options: MapOptions,
}

impl DataHandler {
    /// Handler name as given in the config.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this handler maps or filters.
    pub fn kind(&self) -> HandlerKind {
        self.handler.kind()
    }

    /// Engine options given alongside the handler arguments.
    pub fn options(&self) -> &MapOptions {
        &self.options
    }

    /// Run the handler on one record. `None` means the record was filtered out.
    pub fn apply(&self, record: Record, tokenizer: &dyn TextEncoder) -> Result<Option<Record>> {
        let removed = match &self.options.remove_columns {
            Some(RemoveColumns::All) => record.keys().cloned().collect(),
            Some(RemoveColumns::Columns(columns)) => {
                if let Some(missing) = columns.iter().find(|c| !record.contains_key(*c)) {
                    return Err(DataError::argument(
                        &self.name,
                        format!("remove_columns refers to missing column `{missing}`"),
                    ));
                }
                columns.clone()
            }
            None => Vec::new(),
        };

        let Some(mut output) = self.handler.apply(record, tokenizer)? else {
            return Ok(None);
        };

        if !removed.is_empty() {
            let kept = self.handler.output_columns();
            for column in removed.iter().filter(|c| !kept.contains(&c.as_str())) {
                output.remove(column);
            }
        }
        Ok(Some(output))
    }
}

impl fmt::Debug for DataHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataHandler")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("options", &self.options)
            .finish()
    }
}

/// Engine options that may accompany `fn_kwargs` in a handler's arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapOptions {
    /// Input columns to drop after a map handler runs.
    #[serde(default)]
    pub remove_columns: Option<RemoveColumns>,

    /// Batched application. Only `false` is supported.
    #[serde(default)]
    pub batched: bool,

    /// Worker count hint for the engine.
    #[serde(default)]
    pub num_proc: Option<usize>,

    /// Cache hint for the engine.
    #[serde(default)]
    pub load_from_cache_file: Option<bool>,
}

/// Columns removed after mapping.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RemoveColumnsRepr")]
pub enum RemoveColumns {
    /// Every column of the input record.
    All,
    /// The listed columns.
    Columns(Vec<String>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RemoveColumnsRepr {
    One(String),
    Many(Vec<String>),
}

impl From<RemoveColumnsRepr> for RemoveColumns {
    fn from(repr: RemoveColumnsRepr) -> Self {
        match repr {
            RemoveColumnsRepr::One(name) if name == "all" => Self::All,
            RemoveColumnsRepr::One(name) => Self::Columns(vec![name]),
            RemoveColumnsRepr::Many(names) => Self::Columns(names),
        }
    }
}

/// Separate handler keyword arguments from engine options.
///
/// Arguments are either the keyword arguments themselves, or a mapping with
/// the keyword arguments under `fn_kwargs` next to [`MapOptions`] keys.
fn split_arguments(
    handler: &str,
    arguments: &HandlerArguments,
) -> Result<(HandlerArguments, MapOptions)> {
    match arguments.get("fn_kwargs") {
        None => Ok((arguments.clone(), MapOptions::default())),
        Some(serde_json::Value::Object(kwargs)) => {
            let mut rest = arguments.clone();
            rest.remove("fn_kwargs");
            let options: MapOptions = parse_arguments(handler, &rest)?;
            if options.batched {
                return Err(DataError::argument(
                    handler,
                    "batched application is not supported, handlers run once per record",
                ));
            }
            Ok((kwargs.clone(), options))
        }
        Some(_) => Err(DataError::argument(handler, "`fn_kwargs` should be a mapping")),
    }
}

/// Deserialize handler arguments into their typed form.
pub(crate) fn parse_arguments<T: DeserializeOwned>(
    handler: &str,
    arguments: &HandlerArguments,
) -> Result<T> {
    serde_json::from_value(serde_json::Value::Object(arguments.clone()))
        .map_err(|e| DataError::argument(handler, e.to_string()))
}

/// Unwrap an argument that must be present and non-null.
pub(crate) fn required<T>(handler: &str, field: &str, value: Option<T>) -> Result<T> {
    value.ok_or_else(|| {
        DataError::argument(handler, format!("`{field}` is required and must not be null"))
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tokenizer::tests::WhitespaceEncoder;
    use serde_json::json;

    pub(crate) fn args(value: serde_json::Value) -> HandlerArguments {
        value.as_object().cloned().unwrap()
    }

    pub(crate) fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    pub(crate) const ENCODER: WhitespaceEncoder = WhitespaceEncoder { eos: Some("</s>") };

    fn config(name: &str, arguments: serde_json::Value) -> DataHandlerConfig {
        DataHandlerConfig {
            name: name.to_string(),
            arguments: args(arguments),
        }
    }

    #[test]
    fn test_default_registry_names() {
        let registry = HandlerRegistry::default();
        assert_eq!(
            registry.names(),
            vec![
                APPLY_CUSTOM_JINJA_TEMPLATE,
                DUPLICATE_COLUMNS,
                SKIP_SAMPLES_WITH_LARGE_COLUMNS,
                TOKENIZE
            ]
        );
    }

    #[test]
    fn test_unknown_handler() {
        let err = HandlerRegistry::default()
            .bind(&config("shuffle_columns", json!({})))
            .unwrap_err();
        assert!(matches!(err, DataError::UnknownHandler { .. }));
    }

    #[test]
    fn test_unknown_argument_rejected_at_bind() {
        let err = HandlerRegistry::default()
            .bind(&config(
                DUPLICATE_COLUMNS,
                json!({"existing_column_name": "a", "new_column_name": "b", "extra": 1}),
            ))
            .unwrap_err();
        assert!(matches!(err, DataError::HandlerArgument { .. }));
    }

    #[test]
    fn test_kinds() {
        let registry = HandlerRegistry::default();
        let map = registry
            .bind(&config(TOKENIZE, json!({"text_column_name": "text"})))
            .unwrap();
        assert_eq!(map.kind(), HandlerKind::Map);

        let filter = registry
            .bind(&config(
                SKIP_SAMPLES_WITH_LARGE_COLUMNS,
                json!({"column_name": "input_ids", "max_allowed_length": 4}),
            ))
            .unwrap();
        assert_eq!(filter.kind(), HandlerKind::Filter);
    }

    #[test]
    fn test_fn_kwargs_with_remove_all_columns() {
        let handler = HandlerRegistry::default()
            .bind(&config(
                APPLY_CUSTOM_JINJA_TEMPLATE,
                json!({
                    "remove_columns": "all",
                    "batched": false,
                    "fn_kwargs": {
                        "formatted_text_column_name": "formatted_text",
                        "template": "{{ question }} {{ answer }}{{ eos_token }}"
                    }
                }),
            ))
            .unwrap();
        assert_eq!(handler.options().remove_columns, Some(RemoveColumns::All));

        let out = handler
            .apply(record(json!({"question": "Q", "answer": "A"})), &ENCODER)
            .unwrap()
            .unwrap();
        assert_eq!(out, record(json!({"formatted_text": "Q A</s>"})));
    }

    #[test]
    fn test_remove_named_columns() {
        let handler = HandlerRegistry::default()
            .bind(&config(
                TOKENIZE,
                json!({
                    "remove_columns": ["text"],
                    "fn_kwargs": {"text_column_name": "text"}
                }),
            ))
            .unwrap();

        let out = handler
            .apply(record(json!({"text": "a bb", "id": 7})), &ENCODER)
            .unwrap()
            .unwrap();
        assert!(!out.contains_key("text"));
        assert_eq!(out["id"], 7);
        assert_eq!(out["input_ids"], json!([1, 2]));

        let err = handler
            .apply(record(json!({"id": 7})), &ENCODER)
            .unwrap_err();
        assert!(matches!(err, DataError::HandlerArgument { .. }));
    }

    #[test]
    fn test_filter_rejects_remove_columns() {
        let err = HandlerRegistry::default()
            .bind(&config(
                SKIP_SAMPLES_WITH_LARGE_COLUMNS,
                json!({
                    "remove_columns": "all",
                    "fn_kwargs": {"column_name": "input_ids", "max_allowed_length": 4}
                }),
            ))
            .unwrap_err();
        assert!(matches!(err, DataError::HandlerArgument { .. }));

        let filter = HandlerRegistry::default()
            .bind(&config(
                SKIP_SAMPLES_WITH_LARGE_COLUMNS,
                json!({"fn_kwargs": {"column_name": "input_ids", "max_allowed_length": 4}}),
            ))
            .unwrap();
        let kept = filter
            .apply(record(json!({"input_ids": [1, 2], "id": 3})), &ENCODER)
            .unwrap()
            .unwrap();
        assert_eq!(kept, record(json!({"input_ids": [1, 2], "id": 3})));
    }

    #[test]
    fn test_batched_rejected() {
        let err = HandlerRegistry::default()
            .bind(&config(
                TOKENIZE,
                json!({"batched": true, "fn_kwargs": {"text_column_name": "text"}}),
            ))
            .unwrap_err();
        assert!(matches!(err, DataError::HandlerArgument { .. }));
    }

    #[test]
    fn test_custom_handler_registration() {
        struct DropAll;

        impl RecordHandler for DropAll {
            fn kind(&self) -> HandlerKind {
                HandlerKind::Filter
            }

            fn apply(&self, _record: Record, _tokenizer: &dyn TextEncoder) -> Result<Option<Record>> {
                Ok(None)
            }
        }

        let mut registry = HandlerRegistry::default();
        assert!(registry
            .register("drop_all", |_| Ok(Arc::new(DropAll)))
            .is_none());
        assert!(registry.contains("drop_all"));

        let handler = registry.bind(&config("drop_all", json!({}))).unwrap();
        assert!(handler
            .apply(record(json!({"a": 1})), &ENCODER)
            .unwrap()
            .is_none());
    }
}
