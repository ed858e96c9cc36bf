//! Derived columns computed from cleaned data

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result, Stage};
use crate::table::{ColumnDescriptor, ColumnKind, Table, Value};
use crate::utils::dates::{parse_hour_of_day, year_of};

/// A column derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DeriveOp {
    /// Integer hour (0-23) from a `H:MM[:SS]` text column
    HourOfDay { source: String, target: String },
    /// Integer calendar year from a date column
    Year { source: String, target: String },
}

impl DeriveOp {
    fn target(&self) -> &str {
        match self {
            DeriveOp::HourOfDay { target, .. } | DeriveOp::Year { target, .. } => target,
        }
    }
}

/// Append derived columns to a table, in the order given.
pub fn derive_columns(table: &Table, ops: &[DeriveOp]) -> Result<Table> {
    if ops.is_empty() {
        return Ok(table.clone());
    }

    let mut columns = table.to_columns(Stage::Deriver)?;
    for op in ops {
        if columns.iter().any(|(d, _)| d.name == op.target()) {
            return Err(PipelineError::validation(
                Stage::Deriver,
                format!("derived column '{}' already exists", op.target()),
            ));
        }

        let derived = match op {
            DeriveOp::HourOfDay { source, target } => {
                let (desc, values) = source_column(&columns, source)?;
                if desc.kind != ColumnKind::Text {
                    return Err(PipelineError::format(
                        Stage::Deriver,
                        source,
                        format!("hour of day needs a text time column, found {}", desc.kind),
                    ));
                }
                let hours = values
                    .iter()
                    .map(|v| match v {
                        Value::Text(s) => parse_hour_of_day(s).map(Value::Int).ok_or_else(|| {
                            PipelineError::format(
                                Stage::Deriver,
                                source,
                                format!("'{}' is not a H:MM[:SS] time", s),
                            )
                        }),
                        _ => Ok(Value::Null),
                    })
                    .collect::<Result<Vec<Value>>>()?;
                (ColumnDescriptor::new(target, ColumnKind::Integer), hours)
            }
            DeriveOp::Year { source, target } => {
                let (desc, values) = source_column(&columns, source)?;
                if desc.kind != ColumnKind::Date {
                    return Err(PipelineError::format(
                        Stage::Deriver,
                        source,
                        format!("year needs a date column, found {}", desc.kind),
                    ));
                }
                let years = values
                    .iter()
                    .map(|v| match v {
                        Value::Date(d) => Value::Int(year_of(*d)),
                        _ => Value::Null,
                    })
                    .collect();
                (ColumnDescriptor::new(target, ColumnKind::Integer), years)
            }
        };
        debug!(column = %derived.0.name, "derived column");
        columns.push(derived);
    }

    Table::from_columns(columns)
}

fn source_column<'a>(
    columns: &'a [(ColumnDescriptor, Vec<Value>)],
    name: &str,
) -> Result<&'a (ColumnDescriptor, Vec<Value>)> {
    columns
        .iter()
        .find(|(d, _)| d.name == name)
        .ok_or_else(|| PipelineError::format(Stage::Deriver, name, "column not found"))
}
