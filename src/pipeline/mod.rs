//! Pipeline module - the forward-only ETL and modeling stages

pub mod aggregate;
pub mod cleaner;
pub mod derive;
pub mod loader;
pub mod model;
pub mod reshape;
pub mod runner;

pub use aggregate::{aggregate, combine, AggFn, AggregateSpec, AggregationResult, Summary};
pub use cleaner::{clean_table, CleanReport, CleanSpec, DateColumn, MissingPolicy, MissingRule};
pub use derive::{derive_columns, DeriveOp};
pub use loader::{inspect_schema, load_table, ColumnProfile, LoadOptions, Locator, SchemaProfile};
pub use model::{fit_model, Coefficient, Family, FitSummary, ModelResult, ModelSpec, NaPolicy};
pub use reshape::{pivot_longer, pivot_wider, ReshapeSpec};
pub use runner::{run_pipeline, run_pipeline_with, DatasetOutput, RunObserver, RunOutput, Silent};
