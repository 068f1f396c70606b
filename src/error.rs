//! Error types for the VCF filter pipeline.

use thiserror::Error;

use crate::filter::Stage;

/// Errors that can occur while building or running a filter pipeline.
#[derive(Error, Debug)]
pub enum VcfFilterError {
    /// Failed to parse the VCF header.
    #[error("Header parse error: {0}")]
    HeaderParseError(String),

    /// A record's fixed columns or genotype block could not be decoded.
    #[error("Malformed record{}: {reason}", line.map(|l| format!(" at line {l}")).unwrap_or_default())]
    MalformedRecord { line: Option<usize>, reason: String },

    /// The genotype sequence disagrees with the pruned sample list.
    #[error("Sample column mismatch: expected {expected} genotypes, found {found}")]
    SampleColumnMismatch { expected: usize, found: usize },

    /// A filter was attached to a stage whose input it cannot accept.
    #[error("Filter {filter} cannot run at the {stage} stage: {reason}")]
    FilterConfigurationError {
        filter: String,
        stage: Stage,
        reason: String,
    },

    /// A filter failed while evaluating a record.
    #[error("Filter {filter} failed: {reason}")]
    FilterEvaluationError { filter: String, reason: String },

    /// Failed to parse a filter expression.
    #[error("Filter parse error: {0}")]
    FilterParseError(String),

    /// Error during expression evaluation.
    #[error("Evaluation error: {0}")]
    EvaluationError(String),

    /// Attempted to access an unknown field.
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Type mismatch during comparison.
    #[error("Type mismatch: cannot compare {left} with {right}")]
    TypeMismatch { left: String, right: String },

    /// Error raised by the line source or sink.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl VcfFilterError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        VcfFilterError::MalformedRecord {
            line: None,
            reason: reason.into(),
        }
    }

    /// Attach a 1-based input line number to a `MalformedRecord`.
    pub fn at_line(self, number: usize) -> Self {
        match self {
            VcfFilterError::MalformedRecord { line: None, reason } => {
                VcfFilterError::MalformedRecord {
                    line: Some(number),
                    reason,
                }
            }
            other => other,
        }
    }

    /// Whether this error must abort the run.
    ///
    /// Only malformed records are recoverable, and only outside strict mode.
    pub fn is_fatal(&self, strict: bool) -> bool {
        match self {
            VcfFilterError::MalformedRecord { .. } => strict,
            _ => true,
        }
    }
}

/// Result type alias for VCF filter operations.
pub type Result<T> = std::result::Result<T, VcfFilterError>;
