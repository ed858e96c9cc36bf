//! Grouped summaries (count, sum, mean) and joining of summaries

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result, Stage};
use crate::table::{ColumnDescriptor, ColumnKind, KeyValue, Table, Value};

/// Summary statistic computed per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFn {
    Count,
    Sum,
    Mean,
}

impl fmt::Display for AggFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggFn::Count => write!(f, "count"),
            AggFn::Sum => write!(f, "sum"),
            AggFn::Mean => write!(f, "mean"),
        }
    }
}

/// Grouping and summary settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSpec {
    pub group_by: Vec<String>,
    pub function: AggFn,
    /// Column summarised; required for sum and mean, optional for count
    #[serde(default)]
    pub value_column: Option<String>,
    /// Count rows whose value is missing (count only)
    #[serde(default)]
    pub count_missing: bool,
    /// Name of the summary column; defaults to `<function>_<value column>`
    #[serde(default)]
    pub alias: Option<String>,
}

impl AggregateSpec {
    pub fn sum(group_by: &[&str], value_column: &str) -> Self {
        Self::new(group_by, AggFn::Sum, Some(value_column))
    }

    pub fn new(group_by: &[&str], function: AggFn, value_column: Option<&str>) -> Self {
        Self {
            group_by: group_by.iter().map(|s| s.to_string()).collect(),
            function,
            value_column: value_column.map(str::to_string),
            count_missing: false,
            alias: None,
        }
    }

    fn output_name(&self) -> String {
        match (&self.alias, &self.value_column) {
            (Some(alias), _) => alias.clone(),
            (None, Some(col)) => format!("{}_{}", self.function, col),
            (None, None) => self.function.to_string(),
        }
    }
}

/// One group's summary: exact for integer sums and counts, real otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Summary {
    Int(i64),
    Real(f64),
}

impl Summary {
    pub fn as_f64(&self) -> f64 {
        match self {
            Summary::Int(i) => *i as f64,
            Summary::Real(r) => *r,
        }
    }
}

impl From<Summary> for Value {
    fn from(summary: Summary) -> Self {
        match summary {
            Summary::Int(i) => Value::Int(i),
            Summary::Real(r) => Value::Real(r),
        }
    }
}

/// Per-group summaries.
///
/// Holds one entry per distinct group key that has at least one contributing
/// row after missing-value exclusion. Groups with no contributing rows are
/// omitted rather than emitted as zero or NaN, so the result is sparse with
/// respect to the full grid of key combinations.
#[derive(Debug, Clone, Serialize)]
pub struct AggregationResult {
    pub group_columns: Vec<ColumnDescriptor>,
    pub function: AggFn,
    pub value_name: String,
    /// Kind of the summary column when materialised as a table
    pub value_kind: ColumnKind,
    #[serde(serialize_with = "serialize_groups")]
    pub groups: BTreeMap<Vec<KeyValue>, Summary>,
}

impl AggregationResult {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Summary for a group key given as cells, as a real number.
    pub fn get(&self, key: &[Value]) -> Option<f64> {
        self.summary(key).map(|s| s.as_f64())
    }

    /// Exact summary for a group key given as cells.
    pub fn summary(&self, key: &[Value]) -> Option<Summary> {
        let key: Vec<KeyValue> = key.iter().map(KeyValue::from).collect();
        self.groups.get(&key).copied()
    }

    /// Sum of all group summaries.
    pub fn total(&self) -> f64 {
        self.groups.values().map(Summary::as_f64).sum()
    }

    /// Materialise as a table: key columns then the summary column.
    pub fn to_table(&self) -> Result<Table> {
        let mut columns: Vec<(ColumnDescriptor, Vec<Value>)> = self
            .group_columns
            .iter()
            .enumerate()
            .map(|(i, desc)| {
                let values = self.groups.keys().map(|k| Value::from(&k[i])).collect();
                (desc.clone(), values)
            })
            .collect();

        let summaries = self.groups.values().map(|v| Value::from(*v)).collect();
        columns.push((
            ColumnDescriptor::new(&self.value_name, self.value_kind.clone()),
            summaries,
        ));
        Table::from_columns(columns)
    }
}

fn serialize_groups<S>(groups: &BTreeMap<Vec<KeyValue>, Summary>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeSeq;

    let mut seq = serializer.serialize_seq(Some(groups.len()))?;
    for (key, value) in groups {
        let key: Vec<String> = key.iter().map(|k| k.to_string()).collect();
        seq.serialize_element(&(key, value))?;
    }
    seq.end()
}

/// Group `table` by `spec.group_by` and summarise `spec.value_column`.
///
/// Missing values in the value column are excluded from every summary; for
/// `count` they are included only when `spec.count_missing` is set. A missing
/// component in a group key forms its own group.
pub fn aggregate(table: &Table, spec: &AggregateSpec) -> Result<AggregationResult> {
    if spec.group_by.is_empty() {
        return Err(PipelineError::validation(
            Stage::Aggregator,
            "at least one grouping column is required",
        ));
    }

    let group_columns: Vec<ColumnDescriptor> = spec
        .group_by
        .iter()
        .map(|name| table.descriptor(name, Stage::Aggregator).cloned())
        .collect::<Result<_>>()?;
    let key_cells: Vec<Vec<Value>> = spec
        .group_by
        .iter()
        .map(|name| table.values(name, Stage::Aggregator))
        .collect::<Result<_>>()?;

    let (value_cells, value_kind) = match (&spec.value_column, spec.function) {
        (None, AggFn::Count) => (None, ColumnKind::Integer),
        (None, _) => {
            return Err(PipelineError::validation(
                Stage::Aggregator,
                format!("{} needs a value column", spec.function),
            ))
        }
        (Some(name), function) => {
            let desc = table.descriptor(name, Stage::Aggregator)?;
            let kind = match function {
                AggFn::Count => ColumnKind::Integer,
                _ if !desc.kind.is_numeric() => {
                    return Err(PipelineError::format(
                        Stage::Aggregator,
                        name,
                        format!("{} needs a numeric column, found {}", function, desc.kind),
                    ))
                }
                AggFn::Sum => desc.kind.clone(),
                AggFn::Mean => ColumnKind::Real,
            };
            (Some(table.values(name, Stage::Aggregator)?), kind)
        }
    };

    let exact = value_kind == ColumnKind::Integer;

    // (running total, contributing rows) per key
    let mut acc: BTreeMap<Vec<KeyValue>, (Summary, usize)> = BTreeMap::new();
    for row in 0..table.height() {
        let contribution = match &value_cells {
            None => Some(Summary::Int(0)),
            Some(cells) => match &cells[row] {
                Value::Null if spec.function == AggFn::Count && spec.count_missing => {
                    Some(Summary::Int(0))
                }
                Value::Null => None,
                _ if spec.function == AggFn::Count => Some(Summary::Int(0)),
                Value::Int(i) if exact => Some(Summary::Int(*i)),
                cell => cell.as_f64().map(Summary::Real),
            },
        };
        let Some(x) = contribution else { continue };

        let key: Vec<KeyValue> = key_cells.iter().map(|c| KeyValue::from(&c[row])).collect();
        let start = if exact { Summary::Int(0) } else { Summary::Real(0.0) };
        let entry = acc.entry(key).or_insert((start, 0));
        entry.0 = match (entry.0, x) {
            (Summary::Int(total), Summary::Int(i)) => {
                Summary::Int(total.checked_add(i).ok_or_else(|| {
                    PipelineError::validation(
                        Stage::Aggregator,
                        format!("{} of '{}' overflows a 64-bit integer", spec.function, spec.output_name()),
                    )
                })?)
            }
            (total, x) => Summary::Real(total.as_f64() + x.as_f64()),
        };
        entry.1 += 1;
    }

    let groups: BTreeMap<Vec<KeyValue>, Summary> = acc
        .into_iter()
        .map(|(key, (total, n))| {
            let summary = match spec.function {
                AggFn::Count => Summary::Int(n as i64),
                AggFn::Sum => total,
                AggFn::Mean => Summary::Real(total.as_f64() / n as f64),
            };
            (key, summary)
        })
        .collect();

    debug!(
        groups = groups.len(),
        function = %spec.function,
        "aggregated table"
    );

    Ok(AggregationResult {
        group_columns,
        function: spec.function,
        value_name: spec.output_name(),
        value_kind,
        groups,
    })
}

/// Inner-join aggregation results that share the same group columns.
///
/// The output has the shared key columns followed by one column per input,
/// named by the paired string. Keys missing from any input are dropped.
pub fn combine(inputs: &[(&str, &AggregationResult)]) -> Result<Table> {
    let Some((_, first)) = inputs.first() else {
        return Err(PipelineError::validation(
            Stage::Aggregator,
            "combine needs at least one aggregation result",
        ));
    };

    let key_names: Vec<&str> = first.group_columns.iter().map(|c| c.name.as_str()).collect();
    for (name, result) in inputs {
        let names: Vec<&str> = result.group_columns.iter().map(|c| c.name.as_str()).collect();
        if names != key_names {
            return Err(PipelineError::validation(
                Stage::Aggregator,
                format!(
                    "cannot combine '{}': grouped by {:?}, expected {:?}",
                    name, names, key_names
                ),
            ));
        }
        if key_names.contains(name) {
            return Err(PipelineError::validation(
                Stage::Aggregator,
                format!("combined column '{}' collides with a group column", name),
            ));
        }
    }

    let shared: Vec<&Vec<KeyValue>> = first
        .groups
        .keys()
        .filter(|key| inputs.iter().all(|(_, r)| r.groups.contains_key(*key)))
        .collect();

    let mut columns: Vec<(ColumnDescriptor, Vec<Value>)> = first
        .group_columns
        .iter()
        .enumerate()
        .map(|(i, desc)| {
            let values = shared.iter().map(|k| Value::from(&k[i])).collect();
            (desc.clone(), values)
        })
        .collect();

    for (name, result) in inputs {
        let values = shared
            .iter()
            .map(|k| Value::from(result.groups[*k]))
            .collect();
        columns.push((ColumnDescriptor::new(*name, result.value_kind.clone()), values));
    }

    Table::from_columns(columns)
}
