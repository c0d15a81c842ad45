//! Column manipulation and length filtering handlers.

use super::{parse_arguments, required, HandlerKind, RecordHandler};
use super::{DUPLICATE_COLUMNS, SKIP_SAMPLES_WITH_LARGE_COLUMNS};
use crate::dataset::Record;
use crate::error::{DataError, Result};
use crate::tokenizer::TextEncoder;
use serde::Deserialize;
use serde_json::Value;
use sftprep_core::HandlerArguments;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DuplicateColumnsArgs {
    existing_column_name: Option<String>,
    new_column_name: Option<String>,
}

/// Copies one column into a new column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateColumns {
    /// Column to copy from.
    pub existing_column_name: String,
    /// Column to create.
    pub new_column_name: String,
}

impl DuplicateColumns {
    /// Bind from handler arguments.
    pub fn from_arguments(arguments: &HandlerArguments) -> Result<Self> {
        let args: DuplicateColumnsArgs = parse_arguments(DUPLICATE_COLUMNS, arguments)?;
        Ok(Self {
            existing_column_name: required(
                DUPLICATE_COLUMNS,
                "existing_column_name",
                args.existing_column_name,
            )?,
            new_column_name: required(DUPLICATE_COLUMNS, "new_column_name", args.new_column_name)?,
        })
    }

    fn duplicate(&self, mut record: Record) -> Result<Record> {
        let value = record
            .get(&self.existing_column_name)
            .cloned()
            .ok_or_else(|| {
                DataError::argument(
                    DUPLICATE_COLUMNS,
                    format!(
                        "column `{}` does not exist in the record",
                        self.existing_column_name
                    ),
                )
            })?;
        record.insert(self.new_column_name.clone(), value);
        Ok(record)
    }
}

impl RecordHandler for DuplicateColumns {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Map
    }

    fn apply(&self, record: Record, _tokenizer: &dyn TextEncoder) -> Result<Option<Record>> {
        self.duplicate(record).map(Some)
    }

    fn output_columns(&self) -> Vec<&str> {
        vec![self.new_column_name.as_str()]
    }
}

/// Copy `existing_column_name` into `new_column_name`.
///
/// Fails when either name is missing or the existing column is not in the
/// record. The tokenizer is unused; it is part of the common map signature.
pub fn duplicate_columns(
    record: Record,
    _tokenizer: &dyn TextEncoder,
    existing_column_name: Option<&str>,
    new_column_name: Option<&str>,
) -> Result<Record> {
    let handler = DuplicateColumns {
        existing_column_name: required(
            DUPLICATE_COLUMNS,
            "existing_column_name",
            existing_column_name,
        )?
        .to_string(),
        new_column_name: required(DUPLICATE_COLUMNS, "new_column_name", new_column_name)?
            .to_string(),
    };
    handler.duplicate(record)
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SkipLargeColumnsArgs {
    column_name: Option<String>,
    max_allowed_length: Option<usize>,
}

/// Drops records whose column holds more than `max_allowed_length` elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipLargeColumns {
    /// Column whose length is checked.
    pub column_name: String,
    /// Largest length that is kept (inclusive).
    pub max_allowed_length: usize,
}

impl SkipLargeColumns {
    /// Bind from handler arguments.
    pub fn from_arguments(arguments: &HandlerArguments) -> Result<Self> {
        let args: SkipLargeColumnsArgs =
            parse_arguments(SKIP_SAMPLES_WITH_LARGE_COLUMNS, arguments)?;
        Ok(Self {
            column_name: required(
                SKIP_SAMPLES_WITH_LARGE_COLUMNS,
                "column_name",
                args.column_name,
            )?,
            max_allowed_length: required(
                SKIP_SAMPLES_WITH_LARGE_COLUMNS,
                "max_allowed_length",
                args.max_allowed_length,
            )?,
        })
    }

    /// Whether the record is short enough to keep.
    pub fn keep(&self, record: &Record) -> Result<bool> {
        let value = record.get(&self.column_name).ok_or_else(|| {
            DataError::argument(
                SKIP_SAMPLES_WITH_LARGE_COLUMNS,
                format!("column `{}` does not exist in the record", self.column_name),
            )
        })?;

        let length = match value {
            Value::Array(items) => items.len(),
            Value::String(text) => text.chars().count(),
            _ => {
                return Err(DataError::argument(
                    SKIP_SAMPLES_WITH_LARGE_COLUMNS,
                    format!("column `{}` is not a sequence", self.column_name),
                ))
            }
        };
        Ok(length <= self.max_allowed_length)
    }
}

impl RecordHandler for SkipLargeColumns {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Filter
    }

    fn apply(&self, record: Record, _tokenizer: &dyn TextEncoder) -> Result<Option<Record>> {
        Ok(self.keep(&record)?.then_some(record))
    }
}

/// Keep the record when `column_name` holds at most `max_allowed_length` elements.
pub fn skip_samples_with_large_columns(
    record: &Record,
    column_name: Option<&str>,
    max_allowed_length: Option<usize>,
) -> Result<bool> {
    let handler = SkipLargeColumns {
        column_name: required(SKIP_SAMPLES_WITH_LARGE_COLUMNS, "column_name", column_name)?
            .to_string(),
        max_allowed_length: required(
            SKIP_SAMPLES_WITH_LARGE_COLUMNS,
            "max_allowed_length",
            max_allowed_length,
        )?,
    };
    handler.keep(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::{args, record, ENCODER};
    use serde_json::json;

    #[test]
    fn test_duplicate_columns_copies_column() {
        let out = duplicate_columns(
            record(json!({"input_ids": [1, 2, 3]})),
            &ENCODER,
            Some("input_ids"),
            Some("labels"),
        )
        .unwrap();
        assert_eq!(out["input_ids"], json!([1, 2, 3]));
        assert_eq!(out["labels"], out["input_ids"]);
    }

    #[test]
    fn test_duplicate_columns_errors() {
        let tweet = record(json!({"Tweet text": "hi", "text_label": "no complaint"}));
        for (old, new) in [
            (Some("input_ids"), Some("labels")),
            (None, None),
            (Some("input_ids"), None),
            (None, Some("labels")),
        ] {
            let err = duplicate_columns(tweet.clone(), &ENCODER, old, new).unwrap_err();
            assert!(
                matches!(err, DataError::HandlerArgument { .. }),
                "{old:?} -> {new:?}"
            );
        }
    }

    #[test]
    fn test_duplicate_columns_argument_types() {
        for bad in [
            json!({"existing_column_name": null, "new_column_name": null}),
            json!({"existing_column_name": "input_ids"}),
            json!({"existing_column_name": 5, "new_column_name": "labels"}),
        ] {
            assert!(DuplicateColumns::from_arguments(&args(bad)).is_err());
        }
    }

    #[test]
    fn test_skip_large_columns_keeps_up_to_limit() {
        let handler = SkipLargeColumns::from_arguments(&args(
            json!({"column_name": "input", "max_allowed_length": 60}),
        ))
        .unwrap();

        let kept = (0..100)
            .map(|i| record(json!({ "input": (0..=i).collect::<Vec<u32>>() })))
            .filter(|r| handler.keep(r).unwrap())
            .count();
        assert_eq!(kept, 60);
    }

    #[test]
    fn test_skip_large_columns_boundary_inclusive() {
        let r = record(json!({"input_ids": [1, 2, 3]}));
        assert!(skip_samples_with_large_columns(&r, Some("input_ids"), Some(3)).unwrap());
        assert!(!skip_samples_with_large_columns(&r, Some("input_ids"), Some(2)).unwrap());
    }

    #[test]
    fn test_skip_large_columns_text_length() {
        let r = record(json!({"output": "héllo"}));
        assert!(skip_samples_with_large_columns(&r, Some("output"), Some(5)).unwrap());
    }

    #[test]
    fn test_skip_large_columns_bad_arguments() {
        for bad in [
            json!({"column_name": null, "max_allowed_length": null}),
            json!({"column_name": "input_ids", "max_allowed_length": null}),
            json!({"column_name": 1024, "max_allowed_length": 1024}),
            json!({"column_name": "not_existing", "max_allowed_length": "not_existing"}),
            json!({"column_name": "input_ids", "max_allowed_length": -1}),
        ] {
            let err = SkipLargeColumns::from_arguments(&args(bad)).unwrap_err();
            assert!(matches!(err, DataError::HandlerArgument { .. }));
        }

        let r = record(json!({"output": "x", "id": 3}));
        assert!(skip_samples_with_large_columns(&r, None, Some(3)).is_err());
        assert!(skip_samples_with_large_columns(&r, Some("output"), None).is_err());
        assert!(skip_samples_with_large_columns(&r, Some("input_ids"), Some(3)).is_err());
        assert!(skip_samples_with_large_columns(&r, Some("id"), Some(3)).is_err());
    }

    #[test]
    fn test_skip_large_columns_as_filter() {
        let handler = SkipLargeColumns {
            column_name: "input_ids".to_string(),
            max_allowed_length: 1,
        };
        assert!(handler
            .apply(record(json!({"input_ids": [1, 2]})), &ENCODER)
            .unwrap()
            .is_none());
        assert!(handler
            .apply(record(json!({"input_ids": [1]})), &ENCODER)
            .unwrap()
            .is_some());
    }
}
