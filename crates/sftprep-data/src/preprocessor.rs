//! Drives a validated data config end to end.

use crate::dataset::{split_records, stream_dataset, Record, RecordStream};
use crate::error::Result;
use crate::handlers::HandlerRegistry;
use crate::mixing::{interleave, sampling_probabilities, Interleave};
use crate::pipeline::{DatasetPipeline, PipelineIter};
use crate::tokenizer::TextEncoder;
use sftprep_core::DataConfig;
use std::collections::BTreeMap;

/// Split name used for datasets without a `split` section.
pub const DEFAULT_SPLIT: &str = "train";

/// Applies every dataset's handlers and mixes the results.
pub struct DataPreProcessor<'a> {
    config: &'a DataConfig,
    pipelines: Vec<DatasetPipeline>,
    tokenizer: &'a dyn TextEncoder,
}

impl<'a> DataPreProcessor<'a> {
    /// Check the config and bind every handler of every dataset.
    pub fn new(
        config: &'a DataConfig,
        registry: &HandlerRegistry,
        tokenizer: &'a dyn TextEncoder,
    ) -> Result<Self> {
        config.validate()?;
        let pipelines = config
            .datasets
            .iter()
            .map(|dataset| DatasetPipeline::from_config(dataset, registry))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            pipelines,
            tokenizer,
        })
    }

    /// Whether the config asks for lazy processing.
    pub fn is_streaming(&self) -> bool {
        self.config.dataprocessor.streaming
    }

    /// Bound pipelines, one per dataset.
    pub fn pipelines(&self) -> &[DatasetPipeline] {
        &self.pipelines
    }

    fn seed(&self) -> u64 {
        self.config.dataprocessor.seed as u64
    }

    /// Process all datasets lazily and interleave them into one stream.
    ///
    /// `split` sections are ignored here since splitting needs every record.
    pub fn stream(&self) -> Result<Interleave<PipelineIter<'a, RecordStream>>> {
        let streams = self
            .config
            .datasets
            .iter()
            .zip(&self.pipelines)
            .map(|(dataset, pipeline)| Ok(pipeline.run(stream_dataset(dataset)?, self.tokenizer)))
            .collect::<Result<Vec<_>>>()?;

        interleave(
            streams,
            sampling_probabilities(&self.config.datasets)?,
            self.seed(),
            self.config.dataprocessor.sampling_stopping_strategy,
        )
    }

    /// Process all datasets into memory, grouped by split name.
    ///
    /// Each dataset is split by its own `split` section (or goes to
    /// [`DEFAULT_SPLIT`] entirely). Within a split, datasets are interleaved
    /// with their sampling ratios when set and concatenated otherwise.
    pub fn process(&self) -> Result<BTreeMap<String, Vec<Record>>> {
        let probabilities = sampling_probabilities(&self.config.datasets)?;
        let mut per_split: BTreeMap<String, Vec<(usize, Vec<Record>)>> = BTreeMap::new();

        for (index, (dataset, pipeline)) in
            self.config.datasets.iter().zip(&self.pipelines).enumerate()
        {
            let records = pipeline
                .run(stream_dataset(dataset)?, self.tokenizer)
                .collect::<Result<Vec<_>>>()?;
            tracing::debug!("Dataset {} produced {} records", dataset.name, records.len());

            let splits = match &dataset.split {
                Some(split) => split_records(records, split, self.seed())?,
                None => BTreeMap::from([(DEFAULT_SPLIT.to_string(), records)]),
            };
            for (name, records) in splits {
                per_split.entry(name).or_default().push((index, records));
            }
        }

        let mut output = BTreeMap::new();
        for (name, parts) in per_split {
            let records: Vec<Record> = match &probabilities {
                Some(all) => {
                    let weights: Vec<f64> = parts.iter().map(|(i, _)| all[*i]).collect();
                    let streams: Vec<_> = parts.into_iter().map(|(_, r)| r.into_iter()).collect();
                    interleave(
                        streams,
                        Some(weights),
                        self.seed(),
                        self.config.dataprocessor.sampling_stopping_strategy,
                    )?
                    .collect()
                }
                None => parts.into_iter().flat_map(|(_, r)| r).collect(),
            };
            output.insert(name, records);
        }
        Ok(output)
    }
}
