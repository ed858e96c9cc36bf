//! Table cleaning: date parsing, categorical conversion, missing values, column drops
//!
//! Operations always run in the same order (dates, categoricals, missing
//! values, column drops) so that row-drop decisions can depend on columns that
//! are discarded afterwards.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result, Stage};
use crate::pipeline::loader::parse_bool;
use crate::table::{distinct_labels, ColumnDescriptor, ColumnKind, Table, Value};
use crate::utils::dates::{parse_inferred_date, DateOrder};

/// A column to parse as calendar dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateColumn {
    pub column: String,
    #[serde(default)]
    pub order: DateOrder,
}

/// What to do with missing values in one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Remove every row with a missing value in this column
    DropRow,
    /// Replace missing values with this text, parsed per the column kind
    Impute { value: String },
}

/// Missing-value policy bound to a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingRule {
    pub column: String,
    #[serde(flatten)]
    pub policy: MissingPolicy,
}

impl MissingRule {
    pub fn drop_row(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            policy: MissingPolicy::DropRow,
        }
    }

    pub fn impute(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            policy: MissingPolicy::Impute {
                value: value.into(),
            },
        }
    }
}

/// Per-column cleaning operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanSpec {
    pub dates: Vec<DateColumn>,
    pub categorical: Vec<String>,
    pub missing: Vec<MissingRule>,
    pub drop_columns: Vec<String>,
}

impl CleanSpec {
    /// Reject a column that carries more than one missing-value policy.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for rule in &self.missing {
            if !seen.insert(rule.column.as_str()) {
                return Err(PipelineError::validation(
                    Stage::Cleaner,
                    format!(
                        "column '{}' has more than one missing-value policy; drop and impute are exclusive per column",
                        rule.column
                    ),
                ));
            }
        }
        Ok(())
    }

    fn policy_for(&self, column: &str) -> Option<&MissingPolicy> {
        self.missing
            .iter()
            .find(|r| r.column == column)
            .map(|r| &r.policy)
    }
}

/// What the cleaner did to a table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanReport {
    pub rows_in: usize,
    pub rows_out: usize,
    pub rows_dropped: usize,
    pub imputed: BTreeMap<String, usize>,
    pub date_parse_failures: BTreeMap<String, usize>,
    pub dropped_columns: Vec<String>,
}

/// Working copy of one column while the cleaner runs.
struct WorkColumn {
    desc: ColumnDescriptor,
    values: Vec<Value>,
    /// Rows whose date text failed to parse
    sentinels: Vec<usize>,
}

/// Clean a table according to `spec`, returning a new table and a report.
///
/// # Arguments
/// * `table` - Input table (left untouched)
/// * `spec` - Date, categorical, missing-value and column-drop operations
///
/// # Errors
/// * Validation error when a column has conflicting missing-value policies
/// * Format error for unknown columns, non-text date columns, or unparsed dates
///   in a column that has no missing-value policy
pub fn clean_table(table: &Table, spec: &CleanSpec) -> Result<(Table, CleanReport)> {
    spec.validate()?;

    let mut report = CleanReport {
        rows_in: table.height(),
        ..Default::default()
    };

    let mut columns: Vec<WorkColumn> = table
        .to_columns(Stage::Cleaner)?
        .into_iter()
        .map(|(desc, values)| WorkColumn {
            desc,
            values,
            sentinels: Vec::new(),
        })
        .collect();

    // Fail on unknown column references before doing any work
    let referenced = spec
        .dates
        .iter()
        .map(|d| &d.column)
        .chain(spec.categorical.iter())
        .chain(spec.missing.iter().map(|r| &r.column))
        .chain(spec.drop_columns.iter());
    for name in referenced {
        table.descriptor(name, Stage::Cleaner)?;
    }

    // Step 1: parse dates
    for date_spec in &spec.dates {
        let source = table.date_text(&date_spec.column);
        let column = find_mut(&mut columns, &date_spec.column)?;
        parse_date_column(column, date_spec.order, source)?;
        if !column.sentinels.is_empty() {
            let first = column.sentinels[0];
            let count = column.sentinels.len();
            report
                .date_parse_failures
                .insert(column.desc.name.clone(), count);

            if spec.policy_for(&column.desc.name).is_none() {
                let raw = match source.and_then(|cells| cells.get(first)) {
                    Some(cell) => cell.clone().unwrap_or_default(),
                    None => table
                        .values(&column.desc.name, Stage::Cleaner)?
                        .get(first)
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                };
                return Err(PipelineError::format(
                    Stage::Cleaner,
                    &column.desc.name,
                    format!(
                        "{} value(s) are not {} dates (first: '{}' at row {}); add a missing-value policy to drop or impute them",
                        count, date_spec.order, raw, first
                    ),
                ));
            }
            warn!(
                column = %column.desc.name,
                count,
                "date parse failures will be handled by the missing-value policy"
            );
        }
    }

    // Step 2: categorical conversion
    for name in &spec.categorical {
        let column = find_mut(&mut columns, name)?;
        column.values = column
            .values
            .iter()
            .map(|v| v.to_label().map(Value::Text).unwrap_or(Value::Null))
            .collect();
        column.desc.kind = ColumnKind::Categorical {
            labels: distinct_labels(&column.values),
        };
    }

    // Step 3: missing values - imputation first, then one combined row mask
    let date_orders: BTreeMap<&str, DateOrder> = spec
        .dates
        .iter()
        .map(|d| (d.column.as_str(), d.order))
        .collect();

    let mut keep = vec![true; table.height()];
    for rule in &spec.missing {
        let order = date_orders.get(rule.column.as_str()).copied();
        let column = find_mut(&mut columns, &rule.column)?;
        match &rule.policy {
            MissingPolicy::DropRow => {
                for (row, value) in column.values.iter().enumerate() {
                    if value.is_null() {
                        keep[row] = false;
                    }
                }
            }
            MissingPolicy::Impute { value } => {
                let fill = parse_fill(&column.desc, value, order)?;
                let mut count = 0;
                for cell in column.values.iter_mut().filter(|v| v.is_null()) {
                    *cell = fill.clone();
                    count += 1;
                }
                if let ColumnKind::Categorical { labels } = &mut column.desc.kind {
                    if count > 0 && !labels.contains(value) {
                        labels.push(value.clone());
                        labels.sort();
                    }
                }
                if count > 0 {
                    warn!(column = %column.desc.name, count, fill = %value, "imputed missing values");
                }
                report.imputed.insert(column.desc.name.clone(), count);
            }
        }
    }

    let mut cleaned = Table::from_columns(
        columns
            .into_iter()
            .map(|c| (c.desc, c.values))
            .collect(),
    )?;

    if keep.iter().any(|k| !k) {
        cleaned = cleaned.filter_rows(&keep, Stage::Cleaner)?;
        cleaned = refresh_labels(cleaned)?;
    }

    // Step 4: drop columns
    if !spec.drop_columns.is_empty() {
        cleaned = cleaned.drop_columns(&spec.drop_columns, Stage::Cleaner)?;
        report.dropped_columns = spec.drop_columns.clone();
    }

    report.rows_out = cleaned.height();
    report.rows_dropped = report.rows_in - report.rows_out;
    debug!(
        rows_in = report.rows_in,
        rows_out = report.rows_out,
        columns = cleaned.width(),
        "cleaned table"
    );

    Ok((cleaned, report))
}

fn find_mut<'a>(columns: &'a mut [WorkColumn], name: &str) -> Result<&'a mut WorkColumn> {
    columns
        .iter_mut()
        .find(|c| c.desc.name == name)
        .ok_or_else(|| PipelineError::format(Stage::Cleaner, name, "column not found"))
}

/// Parse a text column as dates in `order`.
///
/// A column the loader already read as dates passes through, except that cells
/// it read from `M/D/Y` text are re-read from `source` when `order` differs.
fn parse_date_column(
    column: &mut WorkColumn,
    order: DateOrder,
    source: Option<&[Option<String>]>,
) -> Result<()> {
    match column.desc.kind {
        ColumnKind::Date => {
            let Some(source) = source.filter(|_| order != DateOrder::Mdy) else {
                return Ok(());
            };
            for (row, (value, text)) in column.values.iter_mut().zip(source).enumerate() {
                let Some(text) = text.as_deref().filter(|t| t.contains('/')) else {
                    continue;
                };
                match order.parse(text) {
                    Some(date) => *value = Value::Date(date),
                    None => {
                        *value = Value::Null;
                        column.sentinels.push(row);
                    }
                }
            }
            Ok(())
        }
        ColumnKind::Text => {
            let mut sentinels = Vec::new();
            let parsed = column
                .values
                .iter()
                .enumerate()
                .map(|(row, value)| match value {
                    Value::Text(s) => match order.parse(s) {
                        Some(date) => Value::Date(date),
                        None => {
                            sentinels.push(row);
                            Value::Null
                        }
                    },
                    _ => Value::Null,
                })
                .collect();
            column.values = parsed;
            column.sentinels = sentinels;
            column.desc.kind = ColumnKind::Date;
            Ok(())
        }
        ref other => Err(PipelineError::format(
            Stage::Cleaner,
            &column.desc.name,
            format!("cannot parse a {} column as dates", other),
        )),
    }
}

/// Parse an imputation fill text according to the column kind.
///
/// Dates use the column's declared order, or the loader's patterns (ISO or
/// `M/D/Y`) for a column the cleaner did not parse.
fn parse_fill(desc: &ColumnDescriptor, text: &str, order: Option<DateOrder>) -> Result<Value> {
    let parsed = match &desc.kind {
        ColumnKind::Integer => text.trim().parse().ok().map(Value::Int),
        ColumnKind::Real => text.trim().parse().ok().map(Value::Real),
        ColumnKind::Boolean => parse_bool(text.trim()).map(Value::Bool),
        ColumnKind::Date => match order {
            Some(order) => order.parse(text),
            None => parse_inferred_date(text),
        }
        .map(Value::Date),
        ColumnKind::Text | ColumnKind::Categorical { .. } => Some(Value::Text(text.to_string())),
    };
    parsed.ok_or_else(|| {
        PipelineError::validation(
            Stage::Cleaner,
            format!(
                "fill value '{}' is not a valid {} for column '{}'",
                text, desc.kind, desc.name
            ),
        )
    })
}

/// Recompute categorical label sets after rows were removed.
fn refresh_labels(table: Table) -> Result<Table> {
    let needs_refresh = table
        .schema()
        .iter()
        .any(|c| matches!(c.kind, ColumnKind::Categorical { .. }));
    if !needs_refresh {
        return Ok(table);
    }

    let columns = table
        .to_columns(Stage::Cleaner)?
        .into_iter()
        .map(|(mut desc, values)| {
            if let ColumnKind::Categorical { .. } = desc.kind {
                desc.kind = ColumnKind::Categorical {
                    labels: distinct_labels(&values),
                };
            }
            (desc, values)
        })
        .collect();
    Table::from_columns(columns)
}
