//! tabreg: tabular ETL and regression reporting
//!
//! Loads CSV datasets from files or URLs, cleans and reshapes them,
//! aggregates by group, and fits a linear or logistic regression on the
//! result. Stages run strictly forward and the first error aborts the run.

pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod table;
pub mod utils;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result, Stage};
pub use table::{ColumnDescriptor, ColumnKind, Table, Value};
