//! Dataset loader for local and remote CSV resources

use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use polars::prelude::*;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{PipelineError, Result, Stage};
use crate::table::{ColumnDescriptor, ColumnKind, Table, Value};
use crate::utils::dates::parse_inferred_date;

/// Default timeout for a remote fetch.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where a CSV resource lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Url(String),
    Path(PathBuf),
}

impl Locator {
    /// Interpret `text` as an HTTP(S) URL or a filesystem path.
    pub fn parse(text: &str) -> Self {
        let lower = text.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Locator::Url(text.to_string())
        } else {
            Locator::Path(PathBuf::from(text))
        }
    }

    /// Resolve a relative path against `base`; URLs and absolute paths are unchanged.
    pub fn resolve_against(self, base: &Path) -> Self {
        match self {
            Locator::Path(p) if p.is_relative() => Locator::Path(base.join(p)),
            other => other,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Url(url) => write!(f, "{}", url),
            Locator::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Options controlling a single load.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Minimum number of columns the resource must have (at least 1)
    pub expected_columns: usize,
    /// Upper bound on the remote fetch
    pub timeout: Duration,
    /// Cell texts treated as missing in addition to the empty string
    pub null_values: Vec<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            expected_columns: 1,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            null_values: Vec::new(),
        }
    }
}

/// Column summary produced by [`inspect_schema`].
#[derive(Debug, Clone, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub kind: String,
    pub missing: usize,
}

/// Load a CSV resource into a [`Table`] with an inferred schema.
///
/// # Arguments
/// * `locator` - URL or filesystem path of the CSV
/// * `options` - Expected column count, fetch timeout and extra null markers
///
/// # Errors
/// Any failure to fetch or parse the resource, or a column count below
/// `expected_columns`, is a [`PipelineError::Retrieval`].
pub fn load_table(locator: &Locator, options: &LoadOptions) -> Result<Table> {
    if options.expected_columns == 0 {
        return Err(PipelineError::validation(
            Stage::Loader,
            "expected column count must be at least 1",
        ));
    }

    let bytes = fetch_bytes(locator, options.timeout)?;
    debug!(locator = %locator, bytes = bytes.len(), "fetched resource");

    let raw = parse_csv(locator, bytes)?;
    let (rows, cols) = raw.shape();
    if cols < options.expected_columns {
        return Err(PipelineError::retrieval(
            locator.to_string(),
            format!(
                "malformed CSV: expected at least {} columns, found {}",
                options.expected_columns, cols
            ),
        ));
    }

    let names: Vec<String> = raw.get_column_names().iter().map(|s| s.to_string()).collect();

    // Infer each column independently; no shared state between columns
    let inferred = names
        .par_iter()
        .map(|name| {
            let cells = raw_cells(&raw, name, &options.null_values)?;
            let (desc, values) = infer_column(name, &cells);
            let slash_dates = desc.kind == ColumnKind::Date
                && cells.iter().flatten().any(|s| s.contains('/'));
            Ok((desc, values, slash_dates.then_some(cells)))
        })
        .collect::<Result<Vec<(ColumnDescriptor, Vec<Value>, Option<Vec<Option<String>>>)>>>()?;

    let mut date_text = Vec::new();
    let mut columns = Vec::with_capacity(inferred.len());
    for (desc, values, text) in inferred {
        if let Some(text) = text {
            date_text.push((desc.name.clone(), text));
        }
        columns.push((desc, values));
    }

    let mut table = Table::from_columns(columns)?;
    for (name, text) in date_text {
        table = table.with_date_text(&name, text);
    }
    info!(locator = %locator, rows, cols, "loaded table");
    Ok(table)
}

/// Inferred schema of a resource, as printed by `tabreg inspect`.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaProfile {
    pub rows: usize,
    pub columns: Vec<ColumnProfile>,
}

/// Load a resource and summarise its inferred schema.
pub fn inspect_schema(locator: &Locator, options: &LoadOptions) -> Result<SchemaProfile> {
    let table = load_table(locator, options)?;
    let columns = table
        .schema()
        .iter()
        .map(|desc| {
            let missing = table
                .values(&desc.name, Stage::Loader)?
                .iter()
                .filter(|v| v.is_null())
                .count();
            Ok(ColumnProfile {
                name: desc.name.clone(),
                kind: desc.kind.to_string(),
                missing,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(SchemaProfile {
        rows: table.height(),
        columns,
    })
}

fn fetch_bytes(locator: &Locator, timeout: Duration) -> Result<Vec<u8>> {
    match locator {
        Locator::Path(path) => std::fs::read(path)
            .map_err(|e| PipelineError::retrieval(locator.to_string(), e.to_string())),
        Locator::Url(url) => fetch_url(url, timeout),
    }
}

fn fetch_url(url: &str, timeout: Duration) -> Result<Vec<u8>> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("tabreg/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PipelineError::retrieval(url, format!("failed to create HTTP client: {}", e)))?;

    let response = client.get(url).send().map_err(|e| {
        if e.is_timeout() {
            PipelineError::retrieval(url, format!("timed out after {}s", timeout.as_secs()))
        } else {
            PipelineError::retrieval(url, format!("request failed: {}", e))
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(PipelineError::retrieval(
            url,
            format!("unexpected HTTP status {}", status),
        ));
    }

    let body = response
        .bytes()
        .map_err(|e| PipelineError::retrieval(url, format!("failed to read body: {}", e)))?;
    Ok(body.to_vec())
}

/// Parse CSV bytes with every column read as a string.
fn parse_csv(locator: &Locator, bytes: Vec<u8>) -> Result<DataFrame> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(PipelineError::retrieval(
            locator.to_string(),
            "malformed CSV: resource is empty",
        ));
    }

    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
        .map_err(|e| PipelineError::retrieval(locator.to_string(), format!("malformed CSV: {}", e)))
}

fn raw_cells(raw: &DataFrame, name: &str, null_values: &[String]) -> Result<Vec<Option<String>>> {
    let column = raw.column(name).map_err(PipelineError::frame(Stage::Loader))?;
    let cast = column
        .cast(&DataType::String)
        .map_err(PipelineError::frame(Stage::Loader))?;
    let ca = cast.str().map_err(PipelineError::frame(Stage::Loader))?;

    Ok(ca
        .into_iter()
        .map(|cell| {
            cell.map(str::trim)
                .filter(|s| !s.is_empty() && !null_values.iter().any(|n| n == s))
                .map(str::to_string)
        })
        .collect())
}

/// Infer a column kind from raw cells and convert them.
///
/// First matching rule wins: integer, real, boolean, date, text. Missing cells
/// are ignored; an all-missing column is text.
pub fn infer_column(name: &str, cells: &[Option<String>]) -> (ColumnDescriptor, Vec<Value>) {
    let present: Vec<&str> = cells.iter().flatten().map(String::as_str).collect();

    let kind = if present.is_empty() {
        ColumnKind::Text
    } else if present.iter().all(|s| s.parse::<i64>().is_ok()) {
        ColumnKind::Integer
    } else if present.iter().all(|s| parse_finite(s).is_some()) {
        ColumnKind::Real
    } else if present.iter().all(|s| parse_bool(s).is_some()) {
        ColumnKind::Boolean
    } else if present.iter().all(|s| parse_inferred_date(s).is_some()) {
        ColumnKind::Date
    } else {
        ColumnKind::Text
    };

    // Every present cell matched the chosen rule above, so conversion cannot fail
    let values = cells
        .iter()
        .map(|cell| match cell {
            None => Value::Null,
            Some(s) => match kind {
                ColumnKind::Integer => s.parse().map(Value::Int).unwrap_or(Value::Null),
                ColumnKind::Real => parse_finite(s).map(Value::Real).unwrap_or(Value::Null),
                ColumnKind::Boolean => parse_bool(s).map(Value::Bool).unwrap_or(Value::Null),
                ColumnKind::Date => parse_inferred_date(s).map(Value::Date).unwrap_or(Value::Null),
                _ => Value::Text(s.clone()),
            },
        })
        .collect();

    (ColumnDescriptor::new(name, kind), values)
}

/// Parse a finite real number; `NaN` and infinities are not numeric data.
fn parse_finite(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|x| x.is_finite())
}

pub(crate) fn parse_bool(text: &str) -> Option<bool> {
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}
