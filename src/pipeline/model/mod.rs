//! Regression fitting on a cleaned or aggregated table
//!
//! Supports ordinary least squares for continuous outcomes and logistic
//! regression (IRLS) for two-level outcomes. Predictors are expanded into a
//! design matrix with an intercept, categorical columns become treatment
//! indicators against their first label, and collinear terms are rejected
//! rather than dropped.

mod design;
mod linalg;
mod linear;
mod logistic;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::table::Table;

pub use design::INTERCEPT as INTERCEPT_TERM;
pub use linalg::COLLINEARITY_TOLERANCE;
pub use logistic::{DEVIANCE_TOLERANCE, MAX_ITERATIONS};

/// Regression family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Linear,
    Logistic,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::Linear => write!(f, "linear"),
            Family::Logistic => write!(f, "logistic"),
        }
    }
}

/// What to do with rows that have a missing outcome or predictor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NaPolicy {
    #[default]
    Omit,
    Fail,
}

/// Model to fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub outcome: String,
    pub predictors: Vec<String>,
    /// No default: the family must always be stated
    pub family: Family,
    #[serde(default)]
    pub missing: NaPolicy,
}

impl ModelSpec {
    pub fn new(outcome: &str, predictors: &[&str], family: Family) -> Self {
        Self {
            outcome: outcome.to_string(),
            predictors: predictors.iter().map(|s| s.to_string()).collect(),
            family,
            missing: NaPolicy::Omit,
        }
    }
}

/// One row of the coefficient table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coefficient {
    pub term: String,
    pub estimate: f64,
    pub std_error: f64,
    /// t (linear) or z (logistic)
    pub statistic: f64,
    pub p_value: f64,
}

/// Family-specific goodness-of-fit figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum FitSummary {
    Linear {
        r_squared: f64,
        adj_r_squared: f64,
        /// Residual standard error
        sigma: f64,
        /// Absent for an intercept-only model
        f_statistic: Option<f64>,
        f_p_value: Option<f64>,
        log_likelihood: f64,
        aic: f64,
    },
    Logistic {
        deviance: f64,
        null_deviance: f64,
        log_likelihood: f64,
        aic: f64,
        iterations: usize,
        converged: bool,
    },
}

/// Output of [`fit_model`].
#[derive(Debug, Clone, Serialize)]
pub struct ModelResult {
    pub family: Family,
    pub outcome: String,
    /// Outcome level coded 1 (logistic only)
    pub event_level: Option<String>,
    pub coefficients: Vec<Coefficient>,
    /// One per training row, in input order: y − ŷ (linear) or deviance
    /// residuals (logistic)
    pub residuals: Vec<f64>,
    /// Fitted means
    pub fitted: Vec<f64>,
    pub n_obs: usize,
    pub rows_omitted: usize,
    pub df_residual: usize,
    pub summary: FitSummary,
}

impl ModelResult {
    pub fn terms(&self) -> Vec<&str> {
        self.coefficients.iter().map(|c| c.term.as_str()).collect()
    }

    pub fn coefficient(&self, term: &str) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.term == term)
    }

    /// Column header for the test statistic.
    pub fn statistic_name(&self) -> &'static str {
        match self.family {
            Family::Linear => "t value",
            Family::Logistic => "z value",
        }
    }
}

/// Fit the model described by `spec` to `table`.
///
/// # Arguments
/// * `table` - Source table; the outcome and predictors must be present
/// * `spec` - Outcome, predictors, family and missing-row policy
///
/// # Errors
/// * Validation error for a bad spec, a text predictor, the wrong outcome
///   cardinality, or too few complete rows
/// * Collinearity error naming the first redundant term
pub fn fit_model(table: &Table, spec: &ModelSpec) -> Result<ModelResult> {
    let design = design::build_design(table, spec)?;
    let n_obs = design.n();
    let df_residual = design.n() - design.p();

    let (coefficients, fitted, residuals, summary) = match spec.family {
        Family::Linear => {
            let fit = linear::fit_linear(&design)?;
            (fit.coefficients, fit.fitted, fit.residuals, fit.summary)
        }
        Family::Logistic => {
            let fit = logistic::fit_logistic(&design)?;
            (fit.coefficients, fit.fitted, fit.residuals, fit.summary)
        }
    };

    info!(
        family = %spec.family,
        outcome = %spec.outcome,
        n_obs,
        rows_omitted = design.rows_omitted,
        terms = coefficients.len(),
        "fitted model"
    );

    Ok(ModelResult {
        family: spec.family,
        outcome: spec.outcome.clone(),
        event_level: design.event_level,
        coefficients,
        residuals,
        fitted,
        n_obs,
        rows_omitted: design.rows_omitted,
        df_residual,
        summary,
    })
}
