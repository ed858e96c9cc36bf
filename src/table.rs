//! In-memory table model: a polars `DataFrame` paired with a declared schema
//!
//! The loader infers the schema once; later stages read and write cells through
//! [`Table::values`] and [`Table::from_columns`] and never re-infer column types.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result, Stage};
use crate::utils::dates::{date_to_days, days_to_date};

/// A single typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Date(NaiveDate),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the cell: integers and reals as-is, booleans as 0/1,
    /// dates as days since 1970-01-01.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Date(d) => Some(date_to_days(*d) as f64),
            _ => None,
        }
    }

    /// Label text used for categorical conversion.
    pub fn to_label(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Real(r) => Some(r.to_string()),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Value::Text(s) => Some(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NA"),
            other => write!(f, "{}", other.to_label().unwrap_or_default()),
        }
    }
}

/// Hashable, totally ordered form of a [`Value`], used as a grouping or entity key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    Null,
    Bool(bool),
    Int(i64),
    Real(OrderedReal),
    Date(NaiveDate),
    Text(String),
}

/// `f64` wrapper ordered by `total_cmp` so reals can be keys.
#[derive(Debug, Clone, Copy)]
pub struct OrderedReal(pub f64);

impl PartialEq for OrderedReal {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for OrderedReal {}

impl PartialOrd for OrderedReal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedReal {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::hash::Hash for OrderedReal {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl From<&Value> for KeyValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => KeyValue::Null,
            Value::Bool(b) => KeyValue::Bool(*b),
            Value::Int(i) => KeyValue::Int(*i),
            Value::Real(r) => KeyValue::Real(OrderedReal(*r)),
            Value::Date(d) => KeyValue::Date(*d),
            Value::Text(s) => KeyValue::Text(s.clone()),
        }
    }
}

impl From<&KeyValue> for Value {
    fn from(key: &KeyValue) -> Self {
        match key {
            KeyValue::Null => Value::Null,
            KeyValue::Bool(b) => Value::Bool(*b),
            KeyValue::Int(i) => Value::Int(*i),
            KeyValue::Real(r) => Value::Real(r.0),
            KeyValue::Date(d) => Value::Date(*d),
            KeyValue::Text(s) => Value::Text(s.clone()),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::from(self))
    }
}

/// Declared semantic type of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnKind {
    Integer,
    Real,
    Boolean,
    Date,
    Text,
    /// Finite label set. Label order is alphabetical unless reordered with
    /// [`Table::with_levels`]; the first label is the modeling reference level.
    Categorical { labels: Vec<String> },
}

impl ColumnKind {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnKind::Integer | ColumnKind::Real)
    }

    fn dtype(&self) -> DataType {
        match self {
            ColumnKind::Integer => DataType::Int64,
            ColumnKind::Real => DataType::Float64,
            ColumnKind::Boolean => DataType::Boolean,
            ColumnKind::Date => DataType::Date,
            ColumnKind::Text | ColumnKind::Categorical { .. } => DataType::String,
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Integer => write!(f, "integer"),
            ColumnKind::Real => write!(f, "real"),
            ColumnKind::Boolean => write!(f, "boolean"),
            ColumnKind::Date => write!(f, "date"),
            ColumnKind::Text => write!(f, "text"),
            ColumnKind::Categorical { labels } => write!(f, "categorical({})", labels.len()),
        }
    }
}

/// Name and declared kind of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub kind: ColumnKind,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Ordered rows of typed cells with a uniform declared schema.
#[derive(Debug, Clone)]
pub struct Table {
    frame: DataFrame,
    columns: Vec<ColumnDescriptor>,
    /// Source text of date columns whose cells the loader read as `M/D/Y`
    date_text: BTreeMap<String, Vec<Option<String>>>,
}

impl Table {
    /// Build a table from column descriptors and their cells.
    ///
    /// All columns must have the same length and every cell must fit the
    /// declared kind (integers are accepted in real columns).
    pub fn from_columns(columns: Vec<(ColumnDescriptor, Vec<Value>)>) -> Result<Self> {
        if let Some((first, rest)) = columns.split_first() {
            let height = first.1.len();
            if let Some((desc, _)) = rest.iter().find(|(_, v)| v.len() != height) {
                return Err(PipelineError::format(
                    Stage::Loader,
                    &desc.name,
                    format!("column length differs from table height {}", height),
                ));
            }
        }

        let mut polars_columns = Vec::with_capacity(columns.len());
        let mut descriptors = Vec::with_capacity(columns.len());
        for (desc, values) in columns {
            polars_columns.push(build_column(&desc, &values)?);
            descriptors.push(desc);
        }

        let frame = DataFrame::new(polars_columns).map_err(PipelineError::frame(Stage::Loader))?;
        Ok(Self {
            frame,
            columns: descriptors,
            date_text: BTreeMap::new(),
        })
    }

    /// Empty table with no columns and no rows.
    pub fn empty() -> Self {
        Self {
            frame: DataFrame::empty(),
            columns: Vec::new(),
            date_text: BTreeMap::new(),
        }
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    pub fn schema(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Descriptor of `name`, or a format error attributed to `stage`.
    pub fn descriptor(&self, name: &str, stage: Stage) -> Result<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name).ok_or_else(|| {
            PipelineError::format(
                stage,
                name,
                format!("column not found. Available columns: {:?}", self.column_names()),
            )
        })
    }

    /// Read every cell of `name` in row order.
    pub fn values(&self, name: &str, stage: Stage) -> Result<Vec<Value>> {
        let desc = self.descriptor(name, stage)?;
        let column = self
            .frame
            .column(name)
            .map_err(PipelineError::frame(stage))?;
        read_column(column, &desc.kind).map_err(PipelineError::frame(stage))
    }

    /// Every column as (descriptor, cells), in schema order.
    pub fn to_columns(&self, stage: Stage) -> Result<Vec<(ColumnDescriptor, Vec<Value>)>> {
        self.columns
            .iter()
            .map(|desc| Ok((desc.clone(), self.values(&desc.name, stage)?)))
            .collect()
    }

    /// Keep only rows where `mask` is true.
    pub fn filter_rows(&self, mask: &[bool], stage: Stage) -> Result<Self> {
        if mask.len() != self.height() {
            return Err(PipelineError::validation(
                stage,
                format!("row mask has {} entries for {} rows", mask.len(), self.height()),
            ));
        }
        let chunked = BooleanChunked::from_slice("mask".into(), mask);
        let frame = self
            .frame
            .filter(&chunked)
            .map_err(PipelineError::frame(stage))?;
        let date_text = self
            .date_text
            .iter()
            .map(|(name, cells)| {
                let kept = cells
                    .iter()
                    .zip(mask)
                    .filter(|(_, keep)| **keep)
                    .map(|(cell, _)| cell.clone())
                    .collect();
                (name.clone(), kept)
            })
            .collect();
        Ok(Self {
            frame,
            columns: self.columns.clone(),
            date_text,
        })
    }

    /// Remove the named columns.
    pub fn drop_columns(&self, names: &[String], stage: Stage) -> Result<Self> {
        for name in names {
            self.descriptor(name, stage)?;
        }
        let frame = self.frame.drop_many(names);
        let columns = self
            .columns
            .iter()
            .filter(|c| !names.contains(&c.name))
            .cloned()
            .collect();
        let mut date_text = self.date_text.clone();
        date_text.retain(|name, _| !names.contains(name));
        Ok(Self {
            frame,
            columns,
            date_text,
        })
    }

    /// Attach the source text of a loaded date column so a later stage can
    /// re-read it in a different day/month order.
    pub(crate) fn with_date_text(mut self, name: &str, cells: Vec<Option<String>>) -> Self {
        self.date_text.insert(name.to_string(), cells);
        self
    }

    /// Source text of a date column read as `M/D/Y` by the loader, if any.
    pub fn date_text(&self, name: &str) -> Option<&[Option<String>]> {
        self.date_text.get(name).map(Vec::as_slice)
    }

    /// Replace the label order of a categorical column.
    ///
    /// `levels` must be a permutation of the current labels; the first entry
    /// becomes the reference level when the column is used as a predictor.
    pub fn with_levels(&self, name: &str, levels: &[&str]) -> Result<Self> {
        let desc = self.descriptor(name, Stage::Modeler)?;
        let ColumnKind::Categorical { labels } = &desc.kind else {
            return Err(PipelineError::validation(
                Stage::Modeler,
                format!("column '{}' is {}, not categorical", name, desc.kind),
            ));
        };

        let mut requested: Vec<String> = levels.iter().map(|s| s.to_string()).collect();
        let mut current = labels.clone();
        requested.sort();
        current.sort();
        if requested != current {
            return Err(PipelineError::validation(
                Stage::Modeler,
                format!(
                    "levels {:?} are not a permutation of the labels of '{}': {:?}",
                    levels, name, labels
                ),
            ));
        }

        let mut table = self.clone();
        for column in table.columns.iter_mut().filter(|c| c.name == name) {
            column.kind = ColumnKind::Categorical {
                labels: levels.iter().map(|s| s.to_string()).collect(),
            };
        }
        Ok(table)
    }
}

fn mismatch(desc: &ColumnDescriptor, value: &Value) -> PipelineError {
    PipelineError::format(
        Stage::Loader,
        &desc.name,
        format!("cell '{}' does not fit declared kind {}", value, desc.kind),
    )
}

/// Materialise cells as a polars column of the kind's physical dtype.
fn build_column(desc: &ColumnDescriptor, values: &[Value]) -> Result<Column> {
    let name: PlSmallStr = desc.name.as_str().into();
    let column = match &desc.kind {
        ColumnKind::Integer => {
            let cells = values
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Int(i) => Ok(Some(*i)),
                    other => Err(mismatch(desc, other)),
                })
                .collect::<Result<Vec<Option<i64>>>>()?;
            Column::new(name, cells)
        }
        ColumnKind::Real => {
            let cells = values
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Real(r) => Ok(Some(*r)),
                    Value::Int(i) => Ok(Some(*i as f64)),
                    other => Err(mismatch(desc, other)),
                })
                .collect::<Result<Vec<Option<f64>>>>()?;
            Column::new(name, cells)
        }
        ColumnKind::Boolean => {
            let cells = values
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Bool(b) => Ok(Some(*b)),
                    other => Err(mismatch(desc, other)),
                })
                .collect::<Result<Vec<Option<bool>>>>()?;
            Column::new(name, cells)
        }
        ColumnKind::Date => {
            let cells = values
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Date(d) => Ok(Some(date_to_days(*d))),
                    other => Err(mismatch(desc, other)),
                })
                .collect::<Result<Vec<Option<i32>>>>()?;
            Column::new(name, cells)
                .cast(&DataType::Date)
                .map_err(PipelineError::frame(Stage::Loader))?
        }
        ColumnKind::Text | ColumnKind::Categorical { .. } => {
            let cells = values
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Text(s) => Ok(Some(s.clone())),
                    other => Err(mismatch(desc, other)),
                })
                .collect::<Result<Vec<Option<String>>>>()?;
            Column::new(name, cells)
        }
    };
    debug_assert_eq!(column.dtype(), &desc.kind.dtype());
    Ok(column)
}

/// Read a polars column back into cells according to its declared kind.
fn read_column(column: &Column, kind: &ColumnKind) -> PolarsResult<Vec<Value>> {
    let values = match kind {
        ColumnKind::Integer => {
            let cast = column.cast(&DataType::Int64)?;
            cast.i64()?
                .into_iter()
                .map(|v| v.map(Value::Int).unwrap_or(Value::Null))
                .collect()
        }
        ColumnKind::Real => {
            let cast = column.cast(&DataType::Float64)?;
            cast.f64()?
                .into_iter()
                .map(|v| v.map(Value::Real).unwrap_or(Value::Null))
                .collect()
        }
        ColumnKind::Boolean => column
            .bool()?
            .into_iter()
            .map(|v| v.map(Value::Bool).unwrap_or(Value::Null))
            .collect(),
        ColumnKind::Date => {
            let cast = column.cast(&DataType::Int32)?;
            cast.i32()?
                .into_iter()
                .map(|v| v.map(|d| Value::Date(days_to_date(d))).unwrap_or(Value::Null))
                .collect()
        }
        ColumnKind::Text | ColumnKind::Categorical { .. } => column
            .str()?
            .into_iter()
            .map(|v| v.map(|s| Value::Text(s.to_string())).unwrap_or(Value::Null))
            .collect(),
    };
    Ok(values)
}

/// Sorted distinct non-missing labels of a set of cells.
pub fn distinct_labels(values: &[Value]) -> Vec<String> {
    let mut labels: Vec<String> = values.iter().filter_map(Value::to_label).collect();
    labels.sort();
    labels.dedup();
    labels
}
