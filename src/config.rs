//! JSON pipeline configuration

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result, Stage};
use crate::pipeline::aggregate::AggregateSpec;
use crate::pipeline::cleaner::CleanSpec;
use crate::pipeline::derive::DeriveOp;
use crate::pipeline::loader::{LoadOptions, Locator, DEFAULT_TIMEOUT_SECS};
use crate::pipeline::model::ModelSpec;
use crate::pipeline::reshape::ReshapeSpec;

fn default_expected_columns() -> usize {
    1
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// One input dataset and the stages applied to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    /// URL or path; relative paths resolve against the config file's directory
    pub source: String,
    #[serde(default = "default_expected_columns")]
    pub expected_columns: usize,
    #[serde(default)]
    pub null_values: Vec<String>,
    #[serde(default)]
    pub clean: CleanSpec,
    #[serde(default)]
    pub derive: Vec<DeriveOp>,
    #[serde(default)]
    pub reshape: Option<ReshapeSpec>,
    #[serde(default)]
    pub aggregate: Option<AggregateSpec>,
}

impl DatasetConfig {
    pub fn locator(&self) -> Locator {
        Locator::parse(&self.source)
    }
}

/// Joins the aggregation results of several datasets into one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombineConfig {
    pub name: String,
    /// Dataset names; each must have an `aggregate` step
    pub inputs: Vec<String>,
}

/// The model step: which dataset to fit on, plus the model itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub dataset: String,
    #[serde(flatten)]
    pub spec: ModelSpec,
}

/// Complete description of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub datasets: Vec<DatasetConfig>,
    #[serde(default)]
    pub combine: Option<CombineConfig>,
    #[serde(default)]
    pub model: Option<ModelConfig>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl PipelineConfig {
    /// Parse and validate a config file, resolving relative sources against
    /// its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| config_error(path, e))?;
        let mut config: PipelineConfig =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| config_error(path, e))?;

        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        for dataset in &mut config.datasets {
            if let Locator::Path(resolved) = dataset.locator().resolve_against(&base) {
                dataset.source = resolved.to_string_lossy().into_owned();
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-references and per-step settings before any I/O happens.
    pub fn validate(&self) -> Result<()> {
        if self.datasets.is_empty() {
            return Err(invalid("at least one dataset is required"));
        }
        if self.timeout_secs == 0 {
            return Err(invalid("timeout_secs must be at least 1"));
        }

        let mut names = HashSet::new();
        for dataset in &self.datasets {
            if !names.insert(dataset.name.as_str()) {
                return Err(invalid(format!("duplicate dataset name '{}'", dataset.name)));
            }
            if dataset.expected_columns == 0 {
                return Err(invalid(format!(
                    "dataset '{}': expected_columns must be at least 1",
                    dataset.name
                )));
            }
            dataset.clean.validate()?;
        }

        if let Some(combine) = &self.combine {
            if names.contains(combine.name.as_str()) {
                return Err(invalid(format!(
                    "combined table '{}' reuses a dataset name",
                    combine.name
                )));
            }
            if combine.inputs.is_empty() {
                return Err(invalid(format!("combine '{}' has no inputs", combine.name)));
            }
            for input in &combine.inputs {
                let dataset = self
                    .datasets
                    .iter()
                    .find(|d| &d.name == input)
                    .ok_or_else(|| invalid(format!("combine refers to unknown dataset '{}'", input)))?;
                if dataset.aggregate.is_none() {
                    return Err(invalid(format!(
                        "combine input '{}' has no aggregate step",
                        input
                    )));
                }
            }
        }

        if let Some(model) = &self.model {
            let known = names.contains(model.dataset.as_str())
                || self.combine.as_ref().is_some_and(|c| c.name == model.dataset);
            if !known {
                return Err(invalid(format!(
                    "model refers to unknown dataset '{}'",
                    model.dataset
                )));
            }
            if model.spec.predictors.is_empty() {
                return Err(invalid("model needs at least one predictor"));
            }
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Loader options for one dataset.
    pub fn load_options(&self, dataset: &DatasetConfig) -> LoadOptions {
        LoadOptions {
            expected_columns: dataset.expected_columns,
            timeout: self.timeout(),
            null_values: dataset.null_values.clone(),
        }
    }
}

fn invalid(reason: impl Into<String>) -> PipelineError {
    PipelineError::validation(Stage::Config, reason)
}

fn config_error(path: &Path, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Config {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::model::Family;
    use std::io::Write;

    const MINIMAL: &str = r#"{
        "datasets": [
            { "name": "cases", "source": "data/cases.csv",
              "reshape": { "id_columns": ["Country/Region"] },
              "aggregate": { "group_by": ["Date"], "function": "sum", "value_column": "Value", "alias": "cases" } },
            { "name": "deaths", "source": "https://example.org/deaths.csv",
              "reshape": { "id_columns": ["Country/Region"] },
              "aggregate": { "group_by": ["Date"], "function": "sum", "value_column": "Value", "alias": "deaths" } }
        ],
        "combine": { "name": "daily", "inputs": ["cases", "deaths"] },
        "model": { "dataset": "daily", "outcome": "deaths", "predictors": ["cases"], "family": "linear" }
    }"#;

    #[test]
    fn test_load_resolves_relative_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        File::create(&path)
            .unwrap()
            .write_all(MINIMAL.as_bytes())
            .unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(
            PathBuf::from(&config.datasets[0].source),
            dir.path().join("data/cases.csv")
        );
        assert_eq!(config.datasets[1].source, "https://example.org/deaths.csv");
        let model = config.model.unwrap();
        assert_eq!(model.spec.family, Family::Linear);
    }

    #[test]
    fn test_unknown_model_dataset() {
        let mut config: PipelineConfig = serde_json::from_str(MINIMAL).unwrap();
        config.model.as_mut().unwrap().dataset = "weekly".into();
        let err = config.validate().unwrap_err();
        assert_eq!(err.stage(), Stage::Config);
        assert!(err.to_string().contains("weekly"));
    }

    #[test]
    fn test_duplicate_dataset_names() {
        let mut config: PipelineConfig = serde_json::from_str(MINIMAL).unwrap();
        config.datasets[1].name = "cases".into();
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Validation { .. })
        ));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let mut config: PipelineConfig = serde_json::from_str(MINIMAL).unwrap();
        config.timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PipelineError::Validation { .. }));
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn test_unreadable_file_is_config_error() {
        let err = PipelineConfig::load(Path::new("/nonexistent/pipeline.json")).unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }));
    }
}
