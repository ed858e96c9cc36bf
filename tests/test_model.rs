//! Tests for linear and logistic model fitting

use tabreg::pipeline::model::INTERCEPT_TERM;
use tabreg::pipeline::{fit_model, Family, FitSummary, ModelSpec, NaPolicy};
use tabreg::{ColumnDescriptor, ColumnKind, PipelineError, Stage, Table, Value};

#[path = "common/mod.rs"]
mod common;

use common::*;

fn categorical(name: &str, values: &[&str]) -> (ColumnDescriptor, Vec<Value>) {
    let mut labels: Vec<String> = values.iter().map(|s| s.to_string()).collect();
    labels.sort();
    labels.dedup();
    (
        ColumnDescriptor::new(name, ColumnKind::Categorical { labels }),
        values.iter().map(|s| text(s)).collect(),
    )
}

fn ints(name: &str, values: &[i64]) -> (ColumnDescriptor, Vec<Value>) {
    (
        ColumnDescriptor::new(name, ColumnKind::Integer),
        values.iter().map(|v| Value::Int(*v)).collect(),
    )
}

fn reals(name: &str, values: &[f64]) -> (ColumnDescriptor, Vec<Value>) {
    (
        ColumnDescriptor::new(name, ColumnKind::Real),
        values.iter().map(|v| Value::Real(*v)).collect(),
    )
}

/// y = {0,1,1,0,1} against g = {X,Y,Y,X,Y}
fn separated_table() -> Table {
    Table::from_columns(vec![
        ints("y", &[0, 1, 1, 0, 1]),
        categorical("g", &["X", "Y", "Y", "X", "Y"]),
    ])
    .unwrap()
}

/// P(y=1 | X) = 1/4, P(y=1 | Y) = 3/4
fn grouped_table() -> Table {
    Table::from_columns(vec![
        ints("y", &[0, 1, 0, 0, 0, 1, 1, 1]),
        categorical("g", &["X", "X", "X", "X", "Y", "Y", "Y", "Y"]),
    ])
    .unwrap()
}

fn linear_table() -> Table {
    Table::from_columns(vec![
        reals("x", &[1.0, 2.0, 3.0, 4.0, 5.0]),
        reals("y", &[3.1, 4.9, 7.2, 8.8, 11.0]),
    ])
    .unwrap()
}

#[test]
fn test_logistic_scenario_converges_with_one_indicator() {
    let result = fit_model(
        &separated_table(),
        &ModelSpec::new("y", &["g"], Family::Logistic),
    )
    .unwrap();

    assert_eq!(result.terms(), vec![INTERCEPT_TERM, "g[Y]"]);
    assert_eq!(result.event_level.as_deref(), Some("1"));
    assert_eq!(result.n_obs, 5);
    assert_eq!(result.residuals.len(), 5);
    match result.summary {
        FitSummary::Logistic {
            converged,
            iterations,
            ..
        } => {
            assert!(converged);
            assert!(iterations <= tabreg::pipeline::model::MAX_ITERATIONS);
        }
        other => panic!("expected a logistic summary, got {:?}", other),
    }
    let slope = result.coefficient("g[Y]").unwrap();
    assert!(slope.estimate > 0.0);
}

#[test]
fn test_logistic_recovers_group_log_odds() {
    let result = fit_model(
        &grouped_table(),
        &ModelSpec::new("y", &["g"], Family::Logistic),
    )
    .unwrap();

    let log_3 = 3f64.ln();
    let intercept = result.coefficient(INTERCEPT_TERM).unwrap();
    let slope = result.coefficient("g[Y]").unwrap();
    assert!((intercept.estimate + log_3).abs() < 1e-4);
    assert!((slope.estimate - 2.0 * log_3).abs() < 1e-4);
    assert!(slope.std_error > 0.0);
    assert!(slope.p_value > 0.0 && slope.p_value < 1.0);
    assert_eq!(result.statistic_name(), "z value");
}

#[test]
fn test_reference_level_follows_label_order() {
    let table = grouped_table().with_levels("g", &["Y", "X"]).unwrap();
    let result = fit_model(&table, &ModelSpec::new("y", &["g"], Family::Logistic)).unwrap();

    assert_eq!(result.terms(), vec![INTERCEPT_TERM, "g[X]"]);
    let log_3 = 3f64.ln();
    assert!((result.coefficient(INTERCEPT_TERM).unwrap().estimate - log_3).abs() < 1e-4);
    assert!((result.coefficient("g[X]").unwrap().estimate + 2.0 * log_3).abs() < 1e-4);
}

#[test]
fn test_with_levels_rejects_unknown_labels() {
    let err = grouped_table().with_levels("g", &["X", "Z"]).unwrap_err();
    assert!(matches!(err, PipelineError::Validation { .. }));
}

#[test]
fn test_linear_fit() {
    let result = fit_model(&linear_table(), &ModelSpec::new("y", &["x"], Family::Linear)).unwrap();

    assert_eq!(result.terms(), vec![INTERCEPT_TERM, "x"]);
    assert!((result.coefficient("x").unwrap().estimate - 1.97).abs() < 1e-9);
    assert!((result.coefficient(INTERCEPT_TERM).unwrap().estimate - 1.09).abs() < 1e-9);
    assert_eq!(result.df_residual, 3);
    assert_eq!(result.statistic_name(), "t value");

    let residual_sum: f64 = result.residuals.iter().sum();
    assert!(residual_sum.abs() < 1e-9);
    match result.summary {
        FitSummary::Linear {
            r_squared,
            f_statistic,
            ..
        } => {
            assert!(r_squared > 0.99 && r_squared < 1.0);
            assert!(f_statistic.is_some());
        }
        other => panic!("expected a linear summary, got {:?}", other),
    }
}

#[test]
fn test_fitting_is_deterministic() {
    let table = grouped_table();
    let spec = ModelSpec::new("y", &["g"], Family::Logistic);
    let first = fit_model(&table, &spec).unwrap();
    let second = fit_model(&table, &spec).unwrap();

    let bits = |r: &tabreg::pipeline::ModelResult| {
        r.coefficients
            .iter()
            .map(|c| c.estimate.to_bits())
            .collect::<Vec<_>>()
    };
    assert_eq!(bits(&first), bits(&second));

    let linear = ModelSpec::new("y", &["x"], Family::Linear);
    let a = fit_model(&linear_table(), &linear).unwrap();
    let b = fit_model(&linear_table(), &linear).unwrap();
    assert_eq!(bits(&a), bits(&b));
}

#[test]
fn test_collinear_term_is_named() {
    let table = Table::from_columns(vec![
        reals("x1", &[1.0, 2.0, 3.0, 4.0, 5.0]),
        reals("x2", &[2.0, 4.0, 6.0, 8.0, 10.0]),
        reals("y", &[1.0, 3.0, 2.0, 5.0, 4.0]),
    ])
    .unwrap();

    let err = fit_model(&table, &ModelSpec::new("y", &["x1", "x2"], Family::Linear)).unwrap_err();
    match &err {
        PipelineError::Collinearity { term, .. } => assert_eq!(term, "x2"),
        other => panic!("expected a collinearity error, got {:?}", other),
    }
    assert_eq!(err.stage(), Stage::Modeler);
}

#[test]
fn test_logistic_outcome_cardinality() {
    let three_levels = Table::from_columns(vec![
        ints("y", &[0, 1, 2, 0, 1, 2]),
        reals("x", &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
    ])
    .unwrap();
    let err = fit_model(&three_levels, &ModelSpec::new("y", &["x"], Family::Logistic)).unwrap_err();
    assert!(matches!(err, PipelineError::Validation { .. }));
    assert!(err.to_string().contains("exactly two"));

    let one_level = Table::from_columns(vec![
        ints("y", &[1, 1, 1, 1]),
        reals("x", &[1.0, 2.0, 3.0, 4.0]),
    ])
    .unwrap();
    let err = fit_model(&one_level, &ModelSpec::new("y", &["x"], Family::Logistic)).unwrap_err();
    assert!(matches!(err, PipelineError::Validation { .. }));
}

#[test]
fn test_boolean_outcome_event_is_true() {
    let table = Table::from_columns(vec![
        (
            ColumnDescriptor::new("flag", ColumnKind::Boolean),
            [false, true, false, false, false, true, true, true]
                .iter()
                .map(|b| Value::Bool(*b))
                .collect(),
        ),
        categorical("g", &["X", "X", "X", "X", "Y", "Y", "Y", "Y"]),
    ])
    .unwrap();
    let result = fit_model(&table, &ModelSpec::new("flag", &["g"], Family::Logistic)).unwrap();
    assert_eq!(result.event_level.as_deref(), Some("true"));
}

#[test]
fn test_missing_rows_follow_policy() {
    let table = Table::from_columns(vec![
        (
            ColumnDescriptor::new("x", ColumnKind::Real),
            vec![
                Value::Real(1.0),
                Value::Null,
                Value::Real(3.0),
                Value::Real(4.0),
                Value::Real(5.0),
                Value::Real(6.0),
            ],
        ),
        reals("y", &[2.0, 4.0, 5.5, 8.0, 10.5, 12.0]),
    ])
    .unwrap();

    let omit = fit_model(&table, &ModelSpec::new("y", &["x"], Family::Linear)).unwrap();
    assert_eq!(omit.rows_omitted, 1);
    assert_eq!(omit.n_obs, 5);
    assert_eq!(omit.residuals.len(), 5);

    let spec = ModelSpec {
        missing: NaPolicy::Fail,
        ..ModelSpec::new("y", &["x"], Family::Linear)
    };
    let err = fit_model(&table, &spec).unwrap_err();
    assert!(matches!(err, PipelineError::Validation { .. }));
}

#[test]
fn test_text_predictor_and_too_few_rows() {
    let table = Table::from_columns(vec![
        (
            ColumnDescriptor::new("name", ColumnKind::Text),
            vec![text("a"), text("b"), text("c")],
        ),
        reals("x", &[1.0, 2.0, 3.0]),
        reals("y", &[1.0, 2.0, 4.0]),
    ])
    .unwrap();

    let err = fit_model(&table, &ModelSpec::new("y", &["name"], Family::Linear)).unwrap_err();
    assert!(err.to_string().contains("categorical"));

    // 3 rows cannot support 3 terms
    let table = table.drop_columns(&["name".to_string()], Stage::Modeler).unwrap();
    let table = Table::from_columns({
        let mut cols = table.to_columns(Stage::Modeler).unwrap();
        cols.push(reals("z", &[0.5, 0.1, 0.9]));
        cols
    })
    .unwrap();
    let err = fit_model(&table, &ModelSpec::new("y", &["x", "z"], Family::Linear)).unwrap_err();
    assert!(matches!(err, PipelineError::Validation { .. }));
}
