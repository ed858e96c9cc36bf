//! Design-matrix construction: row selection, predictor expansion, outcome coding

use std::collections::BTreeSet;

use faer::Mat;

use super::linalg;
use super::{Family, ModelSpec, NaPolicy};
use crate::error::{PipelineError, Result, Stage};
use crate::table::{ColumnKind, KeyValue, Table, Value};

pub const INTERCEPT: &str = "(Intercept)";

/// Model inputs ready for fitting.
pub(crate) struct Design {
    pub terms: Vec<String>,
    /// `n × p`, intercept in column 0
    pub x: Mat<f64>,
    pub y: Vec<f64>,
    pub rows_omitted: usize,
    /// Outcome level coded 1 (logistic only)
    pub event_level: Option<String>,
}

impl Design {
    pub fn n(&self) -> usize {
        self.x.nrows()
    }

    pub fn p(&self) -> usize {
        self.x.ncols()
    }
}

/// How one predictor column turns into design columns.
enum Expansion {
    Numeric,
    /// One indicator per non-reference level
    Indicators(Vec<String>),
}

/// Build the design matrix for `spec` over `table`.
pub(crate) fn build_design(table: &Table, spec: &ModelSpec) -> Result<Design> {
    validate_spec(spec)?;

    let outcome_desc = table.descriptor(&spec.outcome, Stage::Modeler)?.clone();
    let outcome_cells = table.values(&spec.outcome, Stage::Modeler)?;

    let mut expansions = Vec::with_capacity(spec.predictors.len());
    let mut predictor_cells = Vec::with_capacity(spec.predictors.len());
    for name in &spec.predictors {
        let desc = table.descriptor(name, Stage::Modeler)?;
        let expansion = match &desc.kind {
            ColumnKind::Integer | ColumnKind::Real | ColumnKind::Date => Expansion::Numeric,
            ColumnKind::Boolean => Expansion::Indicators(vec!["false".into(), "true".into()]),
            ColumnKind::Categorical { labels } => Expansion::Indicators(labels.clone()),
            ColumnKind::Text => {
                return Err(PipelineError::validation(
                    Stage::Modeler,
                    format!(
                        "predictor '{}' is text; declare it categorical before modeling",
                        name
                    ),
                ))
            }
        };
        expansions.push(expansion);
        predictor_cells.push(table.values(name, Stage::Modeler)?);
    }

    let complete: Vec<bool> = (0..table.height())
        .map(|row| {
            !outcome_cells[row].is_null() && predictor_cells.iter().all(|c| !c[row].is_null())
        })
        .collect();
    let rows_omitted = complete.iter().filter(|keep| !**keep).count();
    if rows_omitted > 0 && spec.missing == NaPolicy::Fail {
        return Err(PipelineError::validation(
            Stage::Modeler,
            format!(
                "{} row(s) have missing outcome or predictor values and missing = fail",
                rows_omitted
            ),
        ));
    }

    let (y, event_level) = match spec.family {
        Family::Linear => {
            if !matches!(
                outcome_desc.kind,
                ColumnKind::Integer | ColumnKind::Real | ColumnKind::Boolean
            ) {
                return Err(PipelineError::validation(
                    Stage::Modeler,
                    format!(
                        "linear outcome '{}' must be numeric or boolean, found {}",
                        spec.outcome, outcome_desc.kind
                    ),
                ));
            }
            let y = selected(&outcome_cells, &complete)
                .filter_map(Value::as_f64)
                .collect();
            (y, None)
        }
        Family::Logistic => {
            let levels = outcome_levels(&spec.outcome, &outcome_desc.kind, &outcome_cells)?;
            let event = &levels[1];
            let y: Vec<f64> = selected(&outcome_cells, &complete)
                .map(|v| if KeyValue::from(v) == *event { 1.0 } else { 0.0 })
                .collect();
            let events = y.iter().filter(|v| **v == 1.0).count();
            if events == 0 || events == y.len() {
                return Err(PipelineError::validation(
                    Stage::Modeler,
                    format!(
                        "outcome '{}' has a single level after omitting incomplete rows",
                        spec.outcome
                    ),
                ));
            }
            (y, Some(level_label(event)))
        }
    };

    let mut terms = vec![INTERCEPT.to_string()];
    for (name, expansion) in spec.predictors.iter().zip(&expansions) {
        match expansion {
            Expansion::Numeric => terms.push(name.clone()),
            Expansion::Indicators(levels) => terms.extend(
                levels
                    .iter()
                    .skip(1)
                    .map(|level| format!("{}[{}]", name, level)),
            ),
        }
    }

    let rows: Vec<Vec<f64>> = (0..table.height())
        .filter(|row| complete[*row])
        .map(|row| {
            let mut r = Vec::with_capacity(terms.len());
            r.push(1.0);
            for (cells, expansion) in predictor_cells.iter().zip(&expansions) {
                let cell = &cells[row];
                match expansion {
                    Expansion::Numeric => r.push(cell.as_f64().unwrap_or(f64::NAN)),
                    Expansion::Indicators(levels) => {
                        let label = cell.to_label();
                        r.extend(levels.iter().skip(1).map(|level| {
                            if label.as_deref() == Some(level.as_str()) {
                                1.0
                            } else {
                                0.0
                            }
                        }));
                    }
                }
            }
            r
        })
        .collect();

    let n = rows.len();
    let p = terms.len();
    if n <= p {
        return Err(PipelineError::validation(
            Stage::Modeler,
            format!("{} complete row(s) cannot fit {} term(s); need at least {}", n, p, p + 1),
        ));
    }

    let x = linalg::from_rows(&rows, p);
    if let Some(j) = linalg::first_collinear_column(&x) {
        return Err(PipelineError::Collinearity {
            term: terms[j].clone(),
            reason: "term is a linear combination of earlier terms".into(),
        });
    }

    Ok(Design {
        terms,
        x,
        y,
        rows_omitted,
        event_level,
    })
}

fn validate_spec(spec: &ModelSpec) -> Result<()> {
    if spec.predictors.is_empty() {
        return Err(PipelineError::validation(
            Stage::Modeler,
            "at least one predictor is required",
        ));
    }
    if spec.predictors.contains(&spec.outcome) {
        return Err(PipelineError::validation(
            Stage::Modeler,
            format!("outcome '{}' is also listed as a predictor", spec.outcome),
        ));
    }
    let mut seen = BTreeSet::new();
    for p in &spec.predictors {
        if !seen.insert(p) {
            return Err(PipelineError::validation(
                Stage::Modeler,
                format!("predictor '{}' is listed twice", p),
            ));
        }
    }
    Ok(())
}

fn selected<'a>(cells: &'a [Value], mask: &'a [bool]) -> impl Iterator<Item = &'a Value> + 'a {
    cells.iter().zip(mask).filter(|(_, keep)| **keep).map(|(v, _)| v)
}

/// The two outcome levels in coding order: `[reference, event]`.
fn outcome_levels(name: &str, kind: &ColumnKind, cells: &[Value]) -> Result<Vec<KeyValue>> {
    let present: BTreeSet<KeyValue> = cells
        .iter()
        .filter(|v| !v.is_null())
        .map(KeyValue::from)
        .collect();

    if present.len() != 2 {
        return Err(PipelineError::validation(
            Stage::Modeler,
            format!(
                "logistic outcome '{}' needs exactly two distinct values, found {}",
                name,
                present.len()
            ),
        ));
    }

    let levels = match kind {
        ColumnKind::Categorical { labels } => labels
            .iter()
            .map(|l| KeyValue::Text(l.clone()))
            .filter(|k| present.contains(k))
            .collect(),
        _ => present.into_iter().collect(),
    };
    Ok(levels)
}

fn level_label(level: &KeyValue) -> String {
    match level {
        KeyValue::Text(s) => s.clone(),
        other => other.to_string(),
    }
}
