//! Binomial logistic regression by iteratively reweighted least squares

use statrs::distribution::{ContinuousCDF, Normal};
use tracing::{debug, warn};

use super::design::Design;
use super::linalg;
use super::{Coefficient, FitSummary};
use crate::error::{PipelineError, Result, Stage};

/// IRLS iteration cap.
pub const MAX_ITERATIONS: usize = 25;
/// Relative deviance change that counts as converged.
pub const DEVIANCE_TOLERANCE: f64 = 1e-8;
/// Bound on the linear predictor before the inverse link.
const ETA_LIMIT: f64 = 30.0;

pub(crate) struct LogisticFit {
    pub coefficients: Vec<Coefficient>,
    pub fitted: Vec<f64>,
    pub residuals: Vec<f64>,
    pub summary: FitSummary,
}

fn inverse_link(eta: f64) -> f64 {
    let eta = eta.clamp(-ETA_LIMIT, ETA_LIMIT);
    let mu = 1.0 / (1.0 + (-eta).exp());
    mu.clamp(f64::EPSILON, 1.0 - f64::EPSILON)
}

/// Per-observation deviance contribution for a 0/1 outcome.
fn unit_deviance(y: f64, mu: f64) -> f64 {
    if y > 0.5 {
        -2.0 * mu.ln()
    } else {
        -2.0 * (1.0 - mu).ln()
    }
}

fn deviance(y: &[f64], mu: &[f64]) -> f64 {
    y.iter().zip(mu).map(|(y, m)| unit_deviance(*y, *m)).sum()
}

/// Fit a logit-link binomial model to a 0/1 outcome.
///
/// Non-convergence after [`MAX_ITERATIONS`] is reported through the summary's
/// `converged` flag rather than as an error.
pub(crate) fn fit_logistic(design: &Design) -> Result<LogisticFit> {
    let n = design.n();
    let p = design.p();
    let y = &design.y;

    let mut mu: Vec<f64> = y.iter().map(|y| (y + 0.5) / 2.0).collect();
    let mut eta: Vec<f64> = mu.iter().map(|m| (m / (1.0 - m)).ln()).collect();
    let mut dev_old = deviance(y, &mu);

    let mut beta = vec![0.0; p];
    let mut weights = vec![0.0; n];
    let mut covariance = None;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < MAX_ITERATIONS {
        iterations += 1;

        for i in 0..n {
            weights[i] = mu[i] * (1.0 - mu[i]);
        }
        let z: Vec<f64> = (0..n)
            .map(|i| eta[i] + (y[i] - mu[i]) / weights[i])
            .collect();

        let xtwx = linalg::cross_product(&design.x, Some(&weights));
        let inv = linalg::invert(&xtwx).ok_or_else(|| PipelineError::Collinearity {
            term: design.terms.last().cloned().unwrap_or_default(),
            reason: format!("weighted cross-product is singular at iteration {}", iterations),
        })?;
        let xtwz = linalg::cross_vector(&design.x, Some(&weights), &z);
        beta = linalg::apply(&inv, &xtwz);
        covariance = Some(inv);

        eta = linalg::multiply(&design.x, &beta);
        mu = eta.iter().map(|e| inverse_link(*e)).collect();
        let dev = deviance(y, &mu);
        debug!(iteration = iterations, deviance = dev, "IRLS step");

        if (dev - dev_old).abs() / (dev.abs() + 0.1) < DEVIANCE_TOLERANCE {
            converged = true;
            break;
        }
        dev_old = dev;
    }

    if !converged {
        warn!(
            iterations,
            "logistic fit did not converge; estimates may be unreliable"
        );
    }

    let covariance = covariance.ok_or_else(|| {
        PipelineError::validation(Stage::Modeler, "logistic fit ran no iterations")
    })?;

    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| PipelineError::validation(Stage::Modeler, e.to_string()))?;
    let coefficients = design
        .terms
        .iter()
        .enumerate()
        .map(|(j, term)| {
            let std_error = covariance[(j, j)].sqrt();
            let statistic = beta[j] / std_error;
            Coefficient {
                term: term.clone(),
                estimate: beta[j],
                std_error,
                statistic,
                p_value: 2.0 * (1.0 - normal.cdf(statistic.abs())),
            }
        })
        .collect();

    let residuals: Vec<f64> = y
        .iter()
        .zip(&mu)
        .map(|(y, m)| (y - m).signum() * unit_deviance(*y, *m).sqrt())
        .collect();

    let dev = deviance(y, &mu);
    let y_bar = y.iter().sum::<f64>() / n as f64;
    let null_deviance: f64 = y.iter().map(|y| unit_deviance(*y, y_bar)).sum();

    Ok(LogisticFit {
        coefficients,
        fitted: mu,
        residuals,
        summary: FitSummary::Logistic {
            deviance: dev,
            null_deviance,
            log_likelihood: -dev / 2.0,
            aic: dev + 2.0 * p as f64,
            iterations,
            converged,
        },
    })
}
