//! Runs a configured pipeline end to end
//!
//! Each dataset goes through load, clean, derive, then the optional reshape
//! and aggregate steps. Aggregated datasets can then be joined, and one model
//! is fitted on a named table. The first error aborts the run.

use tracing::{debug, info};

use crate::config::{DatasetConfig, PipelineConfig};
use crate::error::{PipelineError, Result, Stage};
use crate::pipeline::aggregate::{aggregate, combine, AggregationResult};
use crate::pipeline::cleaner::{clean_table, CleanReport};
use crate::pipeline::derive::derive_columns;
use crate::pipeline::loader::load_table;
use crate::pipeline::model::{fit_model, ModelResult};
use crate::pipeline::reshape::pivot_longer;
use crate::table::{ColumnDescriptor, Table};

/// Hooks called as the run moves through its stages.
///
/// The CLI uses these to drive spinners; library callers can ignore them.
pub trait RunObserver {
    fn stage_started(&mut self, _dataset: &str, _stage: Stage) {}

    fn stage_finished(&mut self, _dataset: &str, _stage: Stage, _shape: (usize, usize)) {}
}

/// Observer that does nothing.
pub struct Silent;

impl RunObserver for Silent {}

/// Everything one dataset produced.
#[derive(Debug, Clone)]
pub struct DatasetOutput {
    pub name: String,
    pub source: String,
    /// Schema as inferred by the loader
    pub loaded_schema: Vec<ColumnDescriptor>,
    pub loaded_shape: (usize, usize),
    pub clean_report: CleanReport,
    pub cleaned_shape: (usize, usize),
    pub long_shape: Option<(usize, usize)>,
    pub aggregation: Option<AggregationResult>,
    /// Aggregation table if aggregated, else the long table, else the cleaned table
    pub table: Table,
}

/// Result of a whole run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub datasets: Vec<DatasetOutput>,
    /// Joined aggregation table, by name
    pub combined: Option<(String, Table)>,
    /// Name of the table the model was fitted on
    pub model_dataset: Option<String>,
    pub model: Option<ModelResult>,
}

impl RunOutput {
    /// Final table registered under `name`.
    pub fn table(&self, name: &str) -> Option<&Table> {
        if let Some((combined_name, table)) = &self.combined {
            if combined_name == name {
                return Some(table);
            }
        }
        self.datasets
            .iter()
            .find(|d| d.name == name)
            .map(|d| &d.table)
    }

    /// All final tables with their names, datasets first.
    pub fn tables(&self) -> Vec<(&str, &Table)> {
        let mut out: Vec<(&str, &Table)> = self
            .datasets
            .iter()
            .map(|d| (d.name.as_str(), &d.table))
            .collect();
        if let Some((name, table)) = &self.combined {
            out.push((name.as_str(), table));
        }
        out
    }
}

/// Run `config` without progress hooks.
pub fn run_pipeline(config: &PipelineConfig) -> Result<RunOutput> {
    run_pipeline_with(config, &mut Silent)
}

/// Run `config`, reporting stage transitions to `observer`.
///
/// # Arguments
/// * `config` - Validated pipeline configuration
/// * `observer` - Receives a start and finish event per stage
pub fn run_pipeline_with(config: &PipelineConfig, observer: &mut dyn RunObserver) -> Result<RunOutput> {
    config.validate()?;

    let mut datasets = Vec::with_capacity(config.datasets.len());
    for dataset in &config.datasets {
        datasets.push(run_dataset(config, dataset, observer)?);
    }

    let combined = match &config.combine {
        Some(spec) => {
            observer.stage_started(&spec.name, Stage::Aggregator);
            let inputs = spec
                .inputs
                .iter()
                .map(|input| {
                    let output = datasets.iter().find(|d| &d.name == input);
                    let result = output.and_then(|d| d.aggregation.as_ref()).ok_or_else(|| {
                        PipelineError::validation(
                            Stage::Aggregator,
                            format!("dataset '{}' has no aggregation to combine", input),
                        )
                    })?;
                    Ok((input.as_str(), result))
                })
                .collect::<Result<Vec<_>>>()?;
            let table = combine(&inputs)?;
            observer.stage_finished(&spec.name, Stage::Aggregator, table.shape());
            info!(name = %spec.name, rows = table.height(), "combined aggregations");
            Some((spec.name.clone(), table))
        }
        None => None,
    };

    let mut output = RunOutput {
        datasets,
        combined,
        model_dataset: None,
        model: None,
    };

    if let Some(model) = &config.model {
        observer.stage_started(&model.dataset, Stage::Modeler);
        let table = output.table(&model.dataset).ok_or_else(|| {
            PipelineError::validation(
                Stage::Modeler,
                format!("no table named '{}'", model.dataset),
            )
        })?;
        let result = fit_model(table, &model.spec)?;
        observer.stage_finished(
            &model.dataset,
            Stage::Modeler,
            (result.n_obs, result.coefficients.len()),
        );
        output.model_dataset = Some(model.dataset.clone());
        output.model = Some(result);
    }

    Ok(output)
}

fn run_dataset(
    config: &PipelineConfig,
    dataset: &DatasetConfig,
    observer: &mut dyn RunObserver,
) -> Result<DatasetOutput> {
    let name = dataset.name.as_str();

    observer.stage_started(name, Stage::Loader);
    let loaded = load_table(&dataset.locator(), &config.load_options(dataset))?;
    observer.stage_finished(name, Stage::Loader, loaded.shape());

    observer.stage_started(name, Stage::Cleaner);
    let (cleaned, clean_report) = clean_table(&loaded, &dataset.clean)?;
    observer.stage_finished(name, Stage::Cleaner, cleaned.shape());

    let mut table = if dataset.derive.is_empty() {
        cleaned
    } else {
        observer.stage_started(name, Stage::Deriver);
        let derived = derive_columns(&cleaned, &dataset.derive)?;
        observer.stage_finished(name, Stage::Deriver, derived.shape());
        derived
    };
    let cleaned_shape = table.shape();

    let mut long_shape = None;
    if let Some(spec) = &dataset.reshape {
        observer.stage_started(name, Stage::Reshaper);
        table = pivot_longer(&table, spec)?;
        long_shape = Some(table.shape());
        observer.stage_finished(name, Stage::Reshaper, table.shape());
    }

    let mut aggregation = None;
    if let Some(spec) = &dataset.aggregate {
        observer.stage_started(name, Stage::Aggregator);
        let result = aggregate(&table, spec)?;
        table = result.to_table()?;
        observer.stage_finished(name, Stage::Aggregator, table.shape());
        aggregation = Some(result);
    }

    debug!(dataset = name, shape = ?table.shape(), "dataset complete");
    info!(dataset = name, rows = table.height(), cols = table.width(), "dataset ready");

    Ok(DatasetOutput {
        name: dataset.name.clone(),
        source: dataset.source.clone(),
        loaded_schema: loaded.schema().to_vec(),
        loaded_shape: loaded.shape(),
        clean_report,
        cleaned_shape,
        long_shape,
        aggregation,
        table,
    })
}
