//! Per-dataset handler pipelines.
//!
//! A pipeline applies a dataset's handlers to each record in declaration
//! order. Every handler application is committed per record: a failing
//! record ends the stream with its error, records already yielded stay
//! yielded.

use crate::dataset::Record;
use crate::error::Result;
use crate::handlers::{DataHandler, HandlerRegistry};
use crate::tokenizer::TextEncoder;
use sftprep_core::DataSetConfig;

/// Ordered handlers bound for one dataset.
#[derive(Debug, Clone, Default)]
pub struct DatasetPipeline {
    name: String,
    handlers: Vec<DataHandler>,
}

impl DatasetPipeline {
    /// Create a pipeline from already bound handlers.
    pub fn new(name: impl Into<String>, handlers: Vec<DataHandler>) -> Self {
        Self {
            name: name.into(),
            handlers,
        }
    }

    /// Bind every handler of a dataset config.
    ///
    /// Fails on the first handler that cannot be bound, before any record is read.
    pub fn from_config(config: &DataSetConfig, registry: &HandlerRegistry) -> Result<Self> {
        let handlers = config
            .data_handlers
            .iter()
            .flatten()
            .map(|handler| registry.bind(handler))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            "Dataset {} uses handlers {:?}",
            config.name,
            handlers.iter().map(DataHandler::name).collect::<Vec<_>>()
        );
        Ok(Self::new(config.name.clone(), handlers))
    }

    /// Dataset name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound handlers, in application order.
    pub fn handlers(&self) -> &[DataHandler] {
        &self.handlers
    }

    /// Run every handler on one record. `None` means a filter dropped it.
    pub fn process(&self, record: Record, tokenizer: &dyn TextEncoder) -> Result<Option<Record>> {
        let mut record = record;
        for handler in &self.handlers {
            match handler.apply(record, tokenizer)? {
                Some(updated) => record = updated,
                None => return Ok(None),
            }
        }
        Ok(Some(record))
    }

    /// Lazily run the pipeline over a record stream.
    pub fn run<'t, I>(&self, records: I, tokenizer: &'t dyn TextEncoder) -> PipelineIter<'t, I::IntoIter>
    where
        I: IntoIterator<Item = Result<Record>>,
    {
        PipelineIter {
            pipeline: self.clone(),
            records: records.into_iter(),
            tokenizer,
            failed: false,
        }
    }
}

/// Iterator returned by [`DatasetPipeline::run`].
///
/// Stops after yielding the first error.
pub struct PipelineIter<'t, I> {
    pipeline: DatasetPipeline,
    records: I,
    tokenizer: &'t dyn TextEncoder,
    failed: bool,
}

impl<I> Iterator for PipelineIter<'_, I>
where
    I: Iterator<Item = Result<Record>>,
{
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let outcome = self
                .records
                .next()?
                .and_then(|record| self.pipeline.process(record, self.tokenizer));

            match outcome {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
