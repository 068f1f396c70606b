//! The filter capability shared by every pipeline stage.
//!
//! A filter is a named predicate over one stage's input type with an
//! immutable polarity. With `keep == true` an input passes when the
//! predicate holds; with `keep == false` (a discard filter) an input passes
//! when the predicate does *not* hold. Polarity flips the interpretation,
//! never the predicate itself.

use std::fmt;

use crate::error::{Result, VcfFilterError};
use crate::filters::ExprFilter;
use crate::genotype::Genotype;
use crate::record::{FixedColumns, VariantRecord};
use crate::sample::Sample;
use crate::stats::Variant;

/// Pipeline stages, in the order the driver runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Fixed columns only, before any genotype decoding.
    Quick,
    /// Sample identity, evaluated once per run.
    Sample,
    /// Individual genotype calls, which are masked rather than removed.
    Genotype,
    /// Whole records after genotype masking.
    Line,
    /// Records with recomputed AC/AN/AF.
    Variant,
}

impl Stage {
    pub const ORDER: [Stage; 5] = [
        Stage::Quick,
        Stage::Sample,
        Stage::Genotype,
        Stage::Line,
        Stage::Variant,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Quick => "QuickFilter",
            Stage::Sample => "SampleFilter",
            Stage::Genotype => "GenotypeFilter",
            Stage::Line => "LineFilter",
            Stage::Variant => "VariantFilter",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// A predicate over one stage's input.
///
/// Implementations must be pure functions of their input and their own
/// configuration; the driver may call them from several threads at once.
pub trait Filter: Send + Sync {
    type Input: ?Sized;

    /// Filter kind, used as the summary prefix.
    fn name(&self) -> &str;

    /// Polarity: `true` keeps matching inputs, `false` discards them.
    fn keep(&self) -> bool;

    /// The raw predicate, before polarity is applied.
    fn matches(&self, input: &Self::Input) -> Result<bool>;

    /// Internal parameters as ordered key/value pairs.
    fn details(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Reject configurations this filter cannot honour at `stage`.
    fn validate(&self, _stage: Stage) -> Result<()> {
        Ok(())
    }

    /// Declares that only CHROM..INFO are read. Required at the quick stage.
    fn left_columns_only(&self) -> bool {
        false
    }

    /// Declares that the decoded genotypes are read, e.g. to count calls at
    /// the line stage.
    fn needs_genotypes(&self) -> bool {
        false
    }

    /// Whether `input` survives this filter.
    fn evaluate(&self, input: &Self::Input) -> Result<bool> {
        Ok(self.matches(input)? == self.keep())
    }

    /// True for discard polarity.
    fn is_filter(&self) -> bool {
        !self.keep()
    }

    /// `<Name>{keep=..,key=value,...}`, byte-stable for a given configuration.
    fn summary(&self) -> String {
        let mut pairs = vec![format!("keep={}", self.keep())];
        pairs.extend(self.details().into_iter().map(|(k, v)| format!("{k}={v}")));
        format!("{}{{{}}}", self.name(), pairs.join(","))
    }
}

/// Evaluate a filter, reporting any failure as a `FilterEvaluationError`.
pub fn evaluate_filter<I: ?Sized>(filter: &dyn Filter<Input = I>, input: &I) -> Result<bool> {
    filter.evaluate(input).map_err(|err| match err {
        err @ VcfFilterError::FilterEvaluationError { .. } => err,
        other => VcfFilterError::FilterEvaluationError {
            filter: filter.summary(),
            reason: other.to_string(),
        },
    })
}

/// A filter tagged with the stage it belongs to.
pub enum StagedFilter {
    Quick(Box<dyn Filter<Input = FixedColumns>>),
    Sample(Box<dyn Filter<Input = Sample>>),
    Genotype(Box<dyn Filter<Input = Genotype>>),
    Line(Box<dyn Filter<Input = VariantRecord>>),
    Variant(Box<dyn Filter<Input = Variant>>),
}

impl StagedFilter {
    pub fn quick(filter: impl Filter<Input = FixedColumns> + 'static) -> Self {
        StagedFilter::Quick(Box::new(filter))
    }

    pub fn sample(filter: impl Filter<Input = Sample> + 'static) -> Self {
        StagedFilter::Sample(Box::new(filter))
    }

    pub fn genotype(filter: impl Filter<Input = Genotype> + 'static) -> Self {
        StagedFilter::Genotype(Box::new(filter))
    }

    pub fn line(filter: impl Filter<Input = VariantRecord> + 'static) -> Self {
        StagedFilter::Line(Box::new(filter))
    }

    pub fn variant(filter: impl Filter<Input = Variant> + 'static) -> Self {
        StagedFilter::Variant(Box::new(filter))
    }

    /// An expression filter for `stage`.
    pub fn expr(stage: Stage, text: &str, keep: bool) -> Result<Self> {
        Ok(match stage {
            Stage::Quick => Self::quick(ExprFilter::<FixedColumns>::new(text, keep)?),
            Stage::Sample => Self::sample(ExprFilter::<Sample>::new(text, keep)?),
            Stage::Genotype => Self::genotype(ExprFilter::<Genotype>::new(text, keep)?),
            Stage::Line => Self::line(ExprFilter::<VariantRecord>::new(text, keep)?),
            Stage::Variant => Self::variant(ExprFilter::<Variant>::new(text, keep)?),
        })
    }

    pub fn stage(&self) -> Stage {
        match self {
            StagedFilter::Quick(_) => Stage::Quick,
            StagedFilter::Sample(_) => Stage::Sample,
            StagedFilter::Genotype(_) => Stage::Genotype,
            StagedFilter::Line(_) => Stage::Line,
            StagedFilter::Variant(_) => Stage::Variant,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            StagedFilter::Quick(f) => f.summary(),
            StagedFilter::Sample(f) => f.summary(),
            StagedFilter::Genotype(f) => f.summary(),
            StagedFilter::Line(f) => f.summary(),
            StagedFilter::Variant(f) => f.summary(),
        }
    }

    /// Check the filter against its stage before any line is processed.
    pub fn validate(&self) -> Result<()> {
        let stage = self.stage();
        match self {
            StagedFilter::Quick(f) => {
                if !f.left_columns_only() {
                    return Err(VcfFilterError::FilterConfigurationError {
                        filter: f.summary(),
                        stage,
                        reason: "quick filters must only read CHROM..INFO".to_string(),
                    });
                }
                f.validate(stage)
            }
            StagedFilter::Sample(f) => f.validate(stage),
            StagedFilter::Genotype(f) => f.validate(stage),
            StagedFilter::Line(f) => f.validate(stage),
            StagedFilter::Variant(f) => f.validate(stage),
        }
    }
}

impl fmt::Debug for StagedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.stage(), self.summary())
    }
}
