//! Sample identity and run-wide sample pruning.

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::eval::FieldSource;
use crate::filter::{Filter, evaluate_filter};
use crate::header::VariantHeader;
use crate::value::Value;

/// A sample column as seen by sample filters.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Position in the input header.
    pub index: usize,
    pub name: String,
}

impl FieldSource for Sample {
    fn field(&self, name: &str) -> Value {
        match name {
            "NAME" => Value::String(self.name.clone()),
            "INDEX" => self.index.into(),
            _ => Value::Missing,
        }
    }
}

/// The samples that survive the sample filters, as ascending header indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleSelection {
    indices: Arc<[usize]>,
    total: usize,
}

impl SampleSelection {
    /// Keep every one of `total` samples.
    pub fn all(total: usize) -> Self {
        Self {
            indices: (0..total).collect(),
            total,
        }
    }

    /// Keep the given indices out of `total`. Indices are sorted and deduplicated.
    pub fn from_indices(mut indices: Vec<usize>, total: usize) -> Self {
        indices.retain(|&i| i < total);
        indices.sort_unstable();
        indices.dedup();
        Self {
            indices: indices.into(),
            total,
        }
    }

    /// Evaluate the sample filters once against every header sample.
    ///
    /// A sample survives when it passes all filters; evaluation of a sample
    /// stops at the first filter that discards it.
    pub fn compute(
        header: &VariantHeader,
        filters: &[Box<dyn Filter<Input = Sample>>],
    ) -> Result<Self> {
        let mut kept = Vec::with_capacity(header.sample_count());
        'samples: for (index, name) in header.samples().iter().enumerate() {
            let sample = Sample {
                index,
                name: name.clone(),
            };
            for filter in filters {
                if !evaluate_filter(filter.as_ref(), &sample)? {
                    debug!(sample = %name, filter = %filter.summary(), "sample removed");
                    continue 'samples;
                }
            }
            kept.push(index);
        }
        Ok(Self::from_indices(kept, header.sample_count()))
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of samples in the unpruned header.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_all(&self) -> bool {
        self.indices.len() == self.total
    }

    /// One flag per header sample, true when kept.
    pub fn mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.total];
        for &i in self.indices.iter() {
            mask[i] = true;
        }
        mask
    }

    /// Names of the kept samples, in header order.
    pub fn names<'a>(&self, header: &'a VariantHeader) -> Vec<&'a str> {
        self.indices
            .iter()
            .filter_map(|&i| header.samples().get(i).map(String::as_str))
            .collect()
    }
}
