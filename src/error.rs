//! Error types for the tabreg pipeline.
//!
//! Every stage fails fast: the first error aborts the run and is surfaced to
//! the caller with the stage that raised it and the offending column or value.

use std::fmt;
use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

/// Pipeline stage that raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Loader,
    Cleaner,
    Deriver,
    Reshaper,
    Aggregator,
    Modeler,
    Reporter,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Config => "config",
            Stage::Loader => "loader",
            Stage::Cleaner => "cleaner",
            Stage::Deriver => "deriver",
            Stage::Reshaper => "reshaper",
            Stage::Aggregator => "aggregator",
            Stage::Modeler => "modeler",
            Stage::Reporter => "reporter",
        };
        write!(f, "{}", name)
    }
}

/// Errors that can occur while running the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Resource unreachable, non-success response, timeout or malformed CSV.
    #[error("[loader] failed to retrieve '{locator}': {reason}")]
    Retrieval { locator: String, reason: String },

    /// Schema or date-pattern mismatch.
    #[error("[{stage}] format error in column '{column}': {reason}")]
    Format {
        stage: Stage,
        column: String,
        reason: String,
    },

    /// Outcome cardinality, conflicting per-column policy, invalid settings.
    #[error("[{stage}] validation failed: {reason}")]
    Validation { stage: Stage, reason: String },

    /// A model term is a linear combination of earlier terms.
    #[error("[modeler] term '{term}' is collinear with earlier terms: {reason}")]
    Collinearity { term: String, reason: String },

    /// Underlying dataframe operation failed.
    #[error("[{stage}] dataframe operation failed: {source}")]
    Frame {
        stage: Stage,
        #[source]
        source: PolarsError,
    },

    /// Pipeline configuration file could not be read or parsed.
    #[error("[config] cannot use '{}': {reason}", path.display())]
    Config { path: PathBuf, reason: String },
}

impl PipelineError {
    pub fn format(stage: Stage, column: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::Format {
            stage,
            column: column.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(stage: Stage, reason: impl Into<String>) -> Self {
        PipelineError::Validation {
            stage,
            reason: reason.into(),
        }
    }

    pub fn retrieval(locator: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::Retrieval {
            locator: locator.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a polars error raised while running `stage`.
    pub fn frame(stage: Stage) -> impl FnOnce(PolarsError) -> Self {
        move |source| PipelineError::Frame { stage, source }
    }

    /// Stage that raised this error.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Retrieval { .. } => Stage::Loader,
            PipelineError::Format { stage, .. } => *stage,
            PipelineError::Validation { stage, .. } => *stage,
            PipelineError::Collinearity { .. } => Stage::Modeler,
            PipelineError::Frame { stage, .. } => *stage,
            PipelineError::Config { .. } => Stage::Config,
        }
    }
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, PipelineError>;
