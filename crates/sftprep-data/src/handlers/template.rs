//! Prompt formatting with custom templates.
//!
//! Templates are rendered with `tera` against a context that holds only the
//! record's columns (at top level and under `element`) and `eos_token`.
//! The template language has no way to reach into the runtime internals of
//! context values, so anything outside that context is a render error.
//! The `get_env` global is replaced so templates cannot read the process
//! environment.

use super::{parse_arguments, required, HandlerKind, RecordHandler, APPLY_CUSTOM_JINJA_TEMPLATE};
use crate::dataset::Record;
use crate::error::{DataError, Result};
use crate::tokenizer::TextEncoder;
use serde::Deserialize;
use sftprep_core::HandlerArguments;
use std::collections::HashMap;
use tera::{Context, Tera};

const TEMPLATE_NAME: &str = "custom_template";

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CustomTemplateArgs {
    formatted_text_column_name: Option<String>,
    template: Option<String>,
}

/// Renders a template per record into a new text column.
///
/// The template is parsed once when the handler is built.
pub struct CustomTemplate {
    formatted_text_column_name: String,
    tera: Tera,
}

impl CustomTemplate {
    /// Parse `template`, failing on syntax errors.
    pub fn new(formatted_text_column_name: impl Into<String>, template: &str) -> Result<Self> {
        let mut tera = Tera::default();
        tera.autoescape_on(Vec::new());
        tera.register_function(
            "get_env",
            |_: &HashMap<String, tera::Value>| -> tera::Result<tera::Value> {
                Err(tera::Error::msg("get_env is not available in data templates"))
            },
        );
        tera.add_raw_template(TEMPLATE_NAME, template)
            .map_err(render_error)?;
        Ok(Self {
            formatted_text_column_name: formatted_text_column_name.into(),
            tera,
        })
    }

    /// Bind from handler arguments.
    pub fn from_arguments(arguments: &HandlerArguments) -> Result<Self> {
        let args: CustomTemplateArgs = parse_arguments(APPLY_CUSTOM_JINJA_TEMPLATE, arguments)?;
        let column = required(
            APPLY_CUSTOM_JINJA_TEMPLATE,
            "formatted_text_column_name",
            args.formatted_text_column_name,
        )?;
        let template = required(APPLY_CUSTOM_JINJA_TEMPLATE, "template", args.template)?;
        Self::new(column, &template)
    }

    /// Column the rendered text is written to.
    pub fn formatted_text_column_name(&self) -> &str {
        &self.formatted_text_column_name
    }

    /// Render the template for one record.
    pub fn render(&self, record: &Record, eos_token: Option<&str>) -> Result<String> {
        let mut context = Context::new();
        for (column, value) in record {
            context.insert(column.as_str(), value);
        }
        context.insert("element", record);
        // Left unbound when the tokenizer has none, so templates using it fail.
        if let Some(eos_token) = eos_token {
            context.insert("eos_token", eos_token);
        }

        self.tera
            .render(TEMPLATE_NAME, &context)
            .map_err(render_error)
    }
}

impl RecordHandler for CustomTemplate {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Map
    }

    fn apply(&self, mut record: Record, tokenizer: &dyn TextEncoder) -> Result<Option<Record>> {
        let text = self.render(&record, tokenizer.eos_token())?;
        record.insert(self.formatted_text_column_name.clone(), text.into());
        Ok(Some(record))
    }

    fn output_columns(&self) -> Vec<&str> {
        vec![self.formatted_text_column_name.as_str()]
    }
}

impl std::fmt::Debug for CustomTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomTemplate")
            .field("formatted_text_column_name", &self.formatted_text_column_name)
            .finish_non_exhaustive()
    }
}

/// Render `template` for `record` into `formatted_text_column_name`.
///
/// `eos_token` is bound to the tokenizer's end-of-sequence token.
pub fn apply_custom_jinja_template(
    record: Record,
    tokenizer: &dyn TextEncoder,
    formatted_text_column_name: &str,
    template: &str,
) -> Result<Record> {
    let handler = CustomTemplate::new(formatted_text_column_name, template)?;
    let record = handler.apply(record, tokenizer)?;
    record.ok_or_else(|| DataError::TemplateRender("template handler dropped the record".into()))
}

/// Flatten a tera error and its causes into one message.
fn render_error(err: tera::Error) -> DataError {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    DataError::TemplateRender(message)
}
