//! Interleaving several datasets into one.

use crate::error::{DataError, Result};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sftprep_core::{DataSetConfig, SamplingStoppingStrategy};

/// Mixing weights from the datasets' `sampling` ratios.
///
/// Returns `None` when no dataset sets a ratio. Either every dataset sets
/// one or none does.
pub fn sampling_probabilities(datasets: &[DataSetConfig]) -> Result<Option<Vec<f64>>> {
    let ratios: Vec<Option<f64>> = datasets.iter().map(|d| d.sampling).collect();
    if ratios.iter().all(Option::is_none) {
        return Ok(None);
    }

    let probabilities = ratios
        .into_iter()
        .zip(datasets)
        .map(|(ratio, dataset)| {
            ratio.ok_or_else(|| {
                DataError::Sampling(format!(
                    "dataset `{}` has no sampling ratio, either all datasets set one or none",
                    dataset.name
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if probabilities.iter().sum::<f64>() <= 0.0 {
        return Err(DataError::Sampling(
            "sampling ratios must not all be zero".to_string(),
        ));
    }
    Ok(Some(probabilities))
}

/// Interleave streams, either round-robin or by weighted random choice.
///
/// With [`SamplingStoppingStrategy::FirstExhausted`] the result ends as soon
/// as any stream runs out. With [`SamplingStoppingStrategy::AllExhausted`]
/// it continues with the remaining streams until all are drained. A stream
/// with zero weight is never drawn from.
pub fn interleave<I: Iterator>(
    streams: Vec<I>,
    probabilities: Option<Vec<f64>>,
    seed: u64,
    strategy: SamplingStoppingStrategy,
) -> Result<Interleave<I>> {
    if let Some(weights) = &probabilities {
        if weights.len() != streams.len() {
            return Err(DataError::Sampling(format!(
                "got {} probabilities for {} datasets",
                weights.len(),
                streams.len()
            )));
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(DataError::Sampling(format!(
                "probabilities must be non-negative, got {weights:?}"
            )));
        }
    }

    Ok(Interleave {
        streams: streams.into_iter().map(Some).collect(),
        weights: probabilities,
        strategy,
        rng: StdRng::seed_from_u64(seed),
        next_index: 0,
    })
}

/// Iterator returned by [`interleave`].
pub struct Interleave<I> {
    streams: Vec<Option<I>>,
    weights: Option<Vec<f64>>,
    strategy: SamplingStoppingStrategy,
    rng: StdRng,
    next_index: usize,
}

impl<I: Iterator> Interleave<I> {
    fn pick(&mut self) -> Option<usize> {
        match &self.weights {
            None => {
                let n = self.streams.len();
                let index = (0..n)
                    .map(|offset| (self.next_index + offset) % n)
                    .find(|&i| self.streams[i].is_some())?;
                self.next_index = index + 1;
                Some(index)
            }
            Some(weights) => {
                let active: Vec<(usize, f64)> = weights
                    .iter()
                    .enumerate()
                    .filter(|(i, w)| self.streams[*i].is_some() && **w > 0.0)
                    .map(|(i, w)| (i, *w))
                    .collect();
                let dist = WeightedIndex::new(active.iter().map(|(_, w)| *w)).ok()?;
                Some(active[dist.sample(&mut self.rng)].0)
            }
        }
    }
}

impl<I: Iterator> Iterator for Interleave<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let index = self.pick()?;
            let stream = self.streams[index].as_mut()?;
            match stream.next() {
                Some(item) => return Some(item),
                None => {
                    self.streams[index] = None;
                    if self.strategy == SamplingStoppingStrategy::FirstExhausted {
                        self.streams.iter_mut().for_each(|s| *s = None);
                        return None;
                    }
                }
            }
        }
    }
}
