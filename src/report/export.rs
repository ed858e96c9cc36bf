//! Run report export (JSON) and final-table export (CSV / Parquet)

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::ValueEnum;
use polars::prelude::*;
use serde::Serialize;

use crate::pipeline::{AggregationResult, CleanReport, ModelResult, RunOutput};
use crate::report::residuals::ResidualDiagnostics;
use crate::table::{ColumnDescriptor, Table};

/// On-disk format for exported tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TableFormat {
    Csv,
    Parquet,
}

impl TableFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TableFormat::Csv => "csv",
            TableFormat::Parquet => "parquet",
        }
    }
}

/// Report metadata
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub timestamp: String,
    pub tabreg_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<String>,
}

/// One dataset's section of the report
#[derive(Debug, Clone, Serialize)]
pub struct DatasetEntry {
    pub name: String,
    pub source: String,
    pub schema: Vec<ColumnDescriptor>,
    pub loaded_shape: (usize, usize),
    pub clean: CleanReport,
    pub cleaned_shape: (usize, usize),
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_shape: Option<(usize, usize)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<AggregationResult>,
    pub final_shape: (usize, usize),
}

/// Model section of the report
#[derive(Debug, Clone, Serialize)]
pub struct ModelEntry {
    pub dataset: String,
    #[serde(flatten)]
    pub result: ModelResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub residual_diagnostics: Option<ResidualDiagnostics>,
}

/// Complete JSON report of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub metadata: ReportMetadata,
    pub datasets: Vec<DatasetEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined: Option<CombinedEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CombinedEntry {
    pub name: String,
    pub schema: Vec<ColumnDescriptor>,
    pub shape: (usize, usize),
}

/// Assemble the report for a finished run.
///
/// # Arguments
/// * `output` - Result of the run
/// * `config_path` - Config file the run came from, if any
/// * `histogram_bins` - Residual histogram bins; Sturges' rule when `None`
pub fn build_run_report(
    output: &RunOutput,
    config_path: Option<&Path>,
    histogram_bins: Option<usize>,
) -> RunReport {
    let datasets = output
        .datasets
        .iter()
        .map(|d| DatasetEntry {
            name: d.name.clone(),
            source: d.source.clone(),
            schema: d.loaded_schema.clone(),
            loaded_shape: d.loaded_shape,
            clean: d.clean_report.clone(),
            cleaned_shape: d.cleaned_shape,
            long_shape: d.long_shape,
            aggregation: d.aggregation.clone(),
            final_shape: d.table.shape(),
        })
        .collect();

    let combined = output.combined.as_ref().map(|(name, table)| CombinedEntry {
        name: name.clone(),
        schema: table.schema().to_vec(),
        shape: table.shape(),
    });

    let model = output.model.as_ref().map(|result| ModelEntry {
        dataset: output.model_dataset.clone().unwrap_or_default(),
        residual_diagnostics: ResidualDiagnostics::from_residuals(&result.residuals, histogram_bins),
        result: result.clone(),
    });

    RunReport {
        metadata: ReportMetadata {
            timestamp: Utc::now().to_rfc3339(),
            tabreg_version: env!("CARGO_PKG_VERSION").to_string(),
            config_file: config_path.map(|p| p.display().to_string()),
        },
        datasets,
        combined,
        model,
    }
}

/// Export the run report to a JSON file
pub fn export_run_report(report: &RunReport, output_path: &Path) -> Result<()> {
    let json =
        serde_json::to_string_pretty(report).context("Failed to serialize run report to JSON")?;

    std::fs::write(output_path, json)
        .with_context(|| format!("Failed to write run report to {}", output_path.display()))?;

    Ok(())
}

/// Save a table to file (CSV or Parquet based on extension)
pub fn save_table(table: &Table, path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    let mut df = table.frame().clone();

    match extension.as_str() {
        "csv" => {
            let mut file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            CsvWriter::new(&mut file)
                .finish(&mut df)
                .with_context(|| format!("Failed to write CSV file: {}", path.display()))?;
        }
        "parquet" => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            ParquetWriter::new(file)
                .finish(&mut df)
                .with_context(|| format!("Failed to write Parquet file: {}", path.display()))?;
        }
        _ => anyhow::bail!(
            "Unsupported output format: {}. Supported formats: csv, parquet",
            extension
        ),
    }

    Ok(())
}

/// Write every final table of a run into `dir`, one file per table.
///
/// Returns the written paths in dataset order, combined table last.
pub fn export_tables(output: &RunOutput, dir: &Path, format: TableFormat) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create export directory: {}", dir.display()))?;

    output
        .tables()
        .into_iter()
        .map(|(name, table)| {
            let path = dir.join(format!("{}.{}", file_stem(name), format.extension()));
            save_table(table, &path)?;
            Ok(path)
        })
        .collect()
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{ColumnKind, Value};

    fn small_table() -> Table {
        Table::from_columns(vec![
            (
                ColumnDescriptor::new("k", ColumnKind::Text),
                vec![Value::Text("a".into()), Value::Text("b".into())],
            ),
            (
                ColumnDescriptor::new("v", ColumnKind::Real),
                vec![Value::Real(1.5), Value::Null],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_save_table_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("out.csv");
        save_table(&small_table(), &csv).unwrap();
        let text = std::fs::read_to_string(&csv).unwrap();
        assert!(text.starts_with("k,v"));

        let parquet = dir.path().join("out.parquet");
        save_table(&small_table(), &parquet).unwrap();
        assert!(parquet.exists());

        assert!(save_table(&small_table(), &dir.path().join("out.xlsx")).is_err());
    }

    #[test]
    fn test_file_stem_sanitised() {
        assert_eq!(file_stem("Province/State"), "Province_State");
        assert_eq!(file_stem("daily-totals_2"), "daily-totals_2");
    }
}
