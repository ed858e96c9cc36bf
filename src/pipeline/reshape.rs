//! Wide-to-long reshaping of date-per-column time series, and its inverse

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result, Stage};
use crate::table::{ColumnDescriptor, ColumnKind, KeyValue, Table, Value};
use crate::utils::dates::DateOrder;

fn default_date_column() -> String {
    "Date".to_string()
}

fn default_value_column() -> String {
    "Value".to_string()
}

fn default_header_format() -> String {
    "%-m/%-d/%y".to_string()
}

/// How to turn a wide table into a long one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReshapeSpec {
    /// Columns carried through unchanged; every other column is a date column
    pub id_columns: Vec<String>,
    /// Order of the parts in date column names
    #[serde(default)]
    pub date_order: DateOrder,
    #[serde(default = "default_date_column")]
    pub date_column: String,
    #[serde(default = "default_value_column")]
    pub value_column: String,
    /// chrono format used to render date headers when re-widening
    #[serde(default = "default_header_format")]
    pub header_format: String,
}

impl ReshapeSpec {
    pub fn new(id_columns: &[&str]) -> Self {
        Self {
            id_columns: id_columns.iter().map(|s| s.to_string()).collect(),
            date_order: DateOrder::Mdy,
            date_column: default_date_column(),
            value_column: default_value_column(),
            header_format: default_header_format(),
        }
    }
}

/// Convert a wide table (one column per date) into a long table.
///
/// The output holds the id columns, then `date_column` and `value_column`,
/// with one row per (input row, date column): R×M rows and N+2 columns.
/// Rows follow the input row order, then date-column order within each row.
///
/// # Errors
/// Format error if an id column is absent, a non-id column name is not a date
/// under `spec.date_order`, or a date column is not numeric.
pub fn pivot_longer(table: &Table, spec: &ReshapeSpec) -> Result<Table> {
    for id in &spec.id_columns {
        table.descriptor(id, Stage::Reshaper)?;
    }
    for name in [&spec.date_column, &spec.value_column] {
        if spec.id_columns.contains(name) {
            return Err(PipelineError::validation(
                Stage::Reshaper,
                format!("output column '{}' collides with an id column", name),
            ));
        }
    }

    let mut dates: Vec<(String, NaiveDate)> = Vec::new();
    let mut all_integer = true;
    for desc in table.schema() {
        if spec.id_columns.contains(&desc.name) {
            continue;
        }
        let date = spec.date_order.parse(&desc.name).ok_or_else(|| {
            PipelineError::format(
                Stage::Reshaper,
                &desc.name,
                format!("column name is not a {} date", spec.date_order),
            )
        })?;
        match desc.kind {
            ColumnKind::Integer => {}
            ColumnKind::Real => all_integer = false,
            ref other => {
                return Err(PipelineError::format(
                    Stage::Reshaper,
                    &desc.name,
                    format!("date column must be numeric, found {}", other),
                ))
            }
        }
        dates.push((desc.name.clone(), date));
    }

    let rows = table.height();
    let total = rows * dates.len();

    let id_values: Vec<(ColumnDescriptor, Vec<Value>)> = spec
        .id_columns
        .iter()
        .map(|id| {
            let desc = table.descriptor(id, Stage::Reshaper)?.clone();
            Ok((desc, table.values(id, Stage::Reshaper)?))
        })
        .collect::<Result<_>>()?;
    let date_values: Vec<Vec<Value>> = dates
        .iter()
        .map(|(name, _)| table.values(name, Stage::Reshaper))
        .collect::<Result<_>>()?;

    let mut out_ids: Vec<Vec<Value>> = vec![Vec::with_capacity(total); id_values.len()];
    let mut out_dates = Vec::with_capacity(total);
    let mut out_values = Vec::with_capacity(total);

    for row in 0..rows {
        for (m, (_, date)) in dates.iter().enumerate() {
            for (i, (_, values)) in id_values.iter().enumerate() {
                out_ids[i].push(values[row].clone());
            }
            out_dates.push(Value::Date(*date));
            out_values.push(date_values[m][row].clone());
        }
    }

    let value_kind = if all_integer {
        ColumnKind::Integer
    } else {
        ColumnKind::Real
    };

    let mut columns: Vec<(ColumnDescriptor, Vec<Value>)> = id_values
        .into_iter()
        .zip(out_ids)
        .map(|((desc, _), values)| (desc, values))
        .collect();
    columns.push((
        ColumnDescriptor::new(&spec.date_column, ColumnKind::Date),
        out_dates,
    ));
    columns.push((
        ColumnDescriptor::new(&spec.value_column, value_kind),
        out_values,
    ));

    let long = Table::from_columns(columns)?;
    debug!(
        rows_in = rows,
        date_columns = dates.len(),
        rows_out = long.height(),
        "reshaped wide table to long"
    );
    Ok(long)
}

/// Convert a long table back to wide format.
///
/// Entities (distinct id tuples) keep first-appearance order, as do dates.
/// Date headers are rendered with `spec.header_format`; an entity with no row
/// for a date gets a missing cell.
///
/// # Errors
/// Validation error on a duplicate (entity, date) pair.
pub fn pivot_wider(table: &Table, spec: &ReshapeSpec) -> Result<Table> {
    let date_desc = table.descriptor(&spec.date_column, Stage::Reshaper)?;
    if date_desc.kind != ColumnKind::Date {
        return Err(PipelineError::format(
            Stage::Reshaper,
            &spec.date_column,
            format!("expected a date column, found {}", date_desc.kind),
        ));
    }
    let value_desc = table.descriptor(&spec.value_column, Stage::Reshaper)?.clone();

    let id_values: Vec<(ColumnDescriptor, Vec<Value>)> = spec
        .id_columns
        .iter()
        .map(|id| {
            let desc = table.descriptor(id, Stage::Reshaper)?.clone();
            Ok((desc, table.values(id, Stage::Reshaper)?))
        })
        .collect::<Result<_>>()?;
    let date_cells = table.values(&spec.date_column, Stage::Reshaper)?;
    let value_cells = table.values(&spec.value_column, Stage::Reshaper)?;

    let mut entity_order: Vec<Vec<KeyValue>> = Vec::new();
    let mut entity_index: HashMap<Vec<KeyValue>, usize> = HashMap::new();
    let mut date_order: Vec<NaiveDate> = Vec::new();
    let mut date_index: HashMap<NaiveDate, usize> = HashMap::new();
    let mut cells: HashMap<(usize, usize), Value> = HashMap::new();

    for row in 0..table.height() {
        let key: Vec<KeyValue> = id_values
            .iter()
            .map(|(_, values)| KeyValue::from(&values[row]))
            .collect();
        let entity = *entity_index.entry(key.clone()).or_insert_with(|| {
            entity_order.push(key);
            entity_order.len() - 1
        });

        let Value::Date(date) = date_cells[row] else {
            return Err(PipelineError::format(
                Stage::Reshaper,
                &spec.date_column,
                format!("missing date at row {}", row),
            ));
        };
        let date_pos = *date_index.entry(date).or_insert_with(|| {
            date_order.push(date);
            date_order.len() - 1
        });

        if cells
            .insert((entity, date_pos), value_cells[row].clone())
            .is_some()
        {
            return Err(PipelineError::validation(
                Stage::Reshaper,
                format!(
                    "duplicate entry for entity {:?} on {}",
                    entity_order[entity]
                        .iter()
                        .map(|k| k.to_string())
                        .collect::<Vec<_>>(),
                    date
                ),
            ));
        }
    }

    let mut columns: Vec<(ColumnDescriptor, Vec<Value>)> = id_values
        .iter()
        .enumerate()
        .map(|(i, (desc, _))| {
            let values = entity_order.iter().map(|key| Value::from(&key[i])).collect();
            (desc.clone(), values)
        })
        .collect();

    for (pos, date) in date_order.iter().enumerate() {
        let header = date.format(&spec.header_format).to_string();
        let values = (0..entity_order.len())
            .map(|entity| cells.remove(&(entity, pos)).unwrap_or(Value::Null))
            .collect();
        columns.push((ColumnDescriptor::new(header, value_desc.kind.clone()), values));
    }

    Table::from_columns(columns)
}
