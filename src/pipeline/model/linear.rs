//! Ordinary least squares

use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};

use super::design::Design;
use super::linalg;
use super::{Coefficient, FitSummary};
use crate::error::{PipelineError, Result, Stage};

pub(crate) struct LinearFit {
    pub coefficients: Vec<Coefficient>,
    pub fitted: Vec<f64>,
    pub residuals: Vec<f64>,
    pub summary: FitSummary,
}

/// Fit `y = Xβ + ε` by the normal equations.
pub(crate) fn fit_linear(design: &Design) -> Result<LinearFit> {
    let n = design.n();
    let p = design.p();
    let df = (n - p) as f64;

    let xtx = linalg::cross_product(&design.x, None);
    let xtx_inv = linalg::invert(&xtx).ok_or_else(|| singular(design))?;
    let xty = linalg::cross_vector(&design.x, None, &design.y);
    let beta = linalg::apply(&xtx_inv, &xty);

    let fitted = linalg::multiply(&design.x, &beta);
    let residuals: Vec<f64> = design.y.iter().zip(&fitted).map(|(y, f)| y - f).collect();

    let rss: f64 = residuals.iter().map(|r| r * r).sum();
    let sigma2 = rss / df;

    let t_dist = StudentsT::new(0.0, 1.0, df).map_err(|e| distribution_error(design, e))?;
    let coefficients = design
        .terms
        .iter()
        .enumerate()
        .map(|(j, term)| {
            let std_error = (sigma2 * xtx_inv[(j, j)]).sqrt();
            let statistic = beta[j] / std_error;
            Coefficient {
                term: term.clone(),
                estimate: beta[j],
                std_error,
                statistic,
                p_value: 2.0 * (1.0 - t_dist.cdf(statistic.abs())),
            }
        })
        .collect();

    let mean_y = design.y.iter().sum::<f64>() / n as f64;
    let tss: f64 = design.y.iter().map(|y| (y - mean_y).powi(2)).sum();
    let r_squared = 1.0 - rss / tss;
    let adj_r_squared = 1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / df;

    let (f_statistic, f_p_value) = if p > 1 {
        let df_model = (p - 1) as f64;
        let f = ((tss - rss) / df_model) / sigma2;
        let p_value = FisherSnedecor::new(df_model, df)
            .map(|dist| 1.0 - dist.cdf(f))
            .ok();
        (Some(f), p_value)
    } else {
        (None, None)
    };

    let nf = n as f64;
    let log_likelihood = -0.5 * nf * ((2.0 * std::f64::consts::PI).ln() + (rss / nf).ln() + 1.0);
    let aic = -2.0 * log_likelihood + 2.0 * (p as f64 + 1.0);

    Ok(LinearFit {
        coefficients,
        fitted,
        residuals,
        summary: FitSummary::Linear {
            r_squared,
            adj_r_squared,
            sigma: sigma2.sqrt(),
            f_statistic,
            f_p_value,
            log_likelihood,
            aic,
        },
    })
}

fn singular(design: &Design) -> PipelineError {
    PipelineError::Collinearity {
        term: design.terms.last().cloned().unwrap_or_default(),
        reason: "cross-product matrix is singular".into(),
    }
}

fn distribution_error(design: &Design, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::validation(
        Stage::Modeler,
        format!(
            "cannot build t distribution with {} residual degrees of freedom: {}",
            design.n() - design.p(),
            e
        ),
    )
}
