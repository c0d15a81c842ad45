//! Tokenization handler.

use super::{parse_arguments, required, HandlerKind, RecordHandler, TOKENIZE};
use crate::dataset::Record;
use crate::error::{DataError, Result};
use crate::tokenizer::{EncodeOptions, TextEncoder};
use serde::Deserialize;
use serde_json::Value;
use sftprep_core::HandlerArguments;

const INPUT_IDS: &str = "input_ids";
const ATTENTION_MASK: &str = "attention_mask";

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TokenizeArgs {
    text_column_name: Option<String>,
    #[serde(default = "default_true")]
    truncation: bool,
    #[serde(default)]
    max_length: Option<usize>,
    #[serde(default = "default_true")]
    add_special_tokens: bool,
}

/// Encodes a text column into `input_ids` and `attention_mask`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokenize {
    /// Column holding the text to encode.
    pub text_column_name: String,
    /// Options forwarded to the tokenizer.
    pub options: EncodeOptions,
}

impl Tokenize {
    /// Bind from handler arguments.
    pub fn from_arguments(arguments: &HandlerArguments) -> Result<Self> {
        let args: TokenizeArgs = parse_arguments(TOKENIZE, arguments)?;
        Ok(Self {
            text_column_name: required(TOKENIZE, "text_column_name", args.text_column_name)?,
            options: EncodeOptions {
                add_special_tokens: args.add_special_tokens,
                truncation: args.truncation,
                max_length: args.max_length,
            },
        })
    }
}

impl RecordHandler for Tokenize {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Map
    }

    fn apply(&self, record: Record, tokenizer: &dyn TextEncoder) -> Result<Option<Record>> {
        tokenize(record, tokenizer, &self.text_column_name, &self.options).map(Some)
    }

    fn output_columns(&self) -> Vec<&str> {
        vec![INPUT_IDS, ATTENTION_MASK]
    }
}

/// Encode `record[text_column_name]` and add `input_ids` and `attention_mask`.
///
/// With truncation and a `max_length`, `input_ids` never exceeds `max_length`.
pub fn tokenize(
    mut record: Record,
    tokenizer: &dyn TextEncoder,
    text_column_name: &str,
    options: &EncodeOptions,
) -> Result<Record> {
    let text = match record.get(text_column_name) {
        Some(Value::String(text)) => text,
        Some(_) => {
            return Err(DataError::argument(
                TOKENIZE,
                format!("column `{text_column_name}` is not text"),
            ))
        }
        None => {
            return Err(DataError::argument(
                TOKENIZE,
                format!("column `{text_column_name}` does not exist in the record"),
            ))
        }
    };

    let input_ids = tokenizer.encode_with_options(text, options)?;
    let attention_mask = vec![1u32; input_ids.len()];
    record.insert(INPUT_IDS.to_string(), Value::from(input_ids));
    record.insert(ATTENTION_MASK.to_string(), Value::from(attention_mask));
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::{args, record, ENCODER};
    use crate::tokenizer::tests::WORD_LEVEL_TOKENIZER;
    use crate::tokenizer::Tokenizer;
    use serde_json::json;

    #[test]
    fn test_tokenize_truncates() {
        let tokenizer = Tokenizer::from_bytes(WORD_LEVEL_TOKENIZER.as_bytes()).unwrap();
        let handler = Tokenize::from_arguments(&args(json!({
            "text_column_name": "output",
            "truncation": true,
            "max_length": 10
        })))
        .unwrap();

        let short = handler
            .apply(record(json!({"output": "hello world"})), &tokenizer)
            .unwrap()
            .unwrap();
        assert_eq!(short["input_ids"], json!([1, 2]));
        assert_eq!(short["attention_mask"], json!([1, 1]));

        let long_text = vec!["hello"; 25].join(" ");
        let long = handler
            .apply(record(json!({ "output": long_text })), &tokenizer)
            .unwrap()
            .unwrap();
        assert_eq!(long["input_ids"].as_array().unwrap().len(), 10);
    }

    #[test]
    fn test_tokenize_without_truncation() {
        let text = vec!["word"; 12].join(" ");
        let out = tokenize(
            record(json!({ "text": text.clone() })),
            &ENCODER,
            "text",
            &EncodeOptions {
                truncation: false,
                max_length: Some(4),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(out["input_ids"].as_array().unwrap().len(), 12);
        assert_eq!(out["text"], json!(text));
    }

    #[test]
    fn test_tokenize_column_errors() {
        let options = EncodeOptions::default();
        let err = tokenize(record(json!({"text": 3})), &ENCODER, "text", &options).unwrap_err();
        assert!(matches!(err, DataError::HandlerArgument { .. }));

        let err = tokenize(record(json!({"other": "a"})), &ENCODER, "text", &options).unwrap_err();
        assert!(matches!(err, DataError::HandlerArgument { .. }));
    }

    #[test]
    fn test_tokenize_argument_errors() {
        for bad in [
            json!({}),
            json!({"text_column_name": null}),
            json!({"text_column_name": "text", "max_length": "ten"}),
            json!({"text_column_name": "text", "padding": "max_length"}),
        ] {
            assert!(Tokenize::from_arguments(&args(bad)).is_err());
        }
    }

    #[test]
    fn test_tokenize_defaults() {
        let handler = Tokenize::from_arguments(&args(json!({"text_column_name": "text"}))).unwrap();
        assert_eq!(handler.options, EncodeOptions::default());
    }
}
