use ndarray::{Array1, Array2};
use tracing::debug;

use crate::{
    data::{EventGroup, SurvivalData},
    error::{Result, SurvivalError},
    linalg,
};

/// |coefficient| beyond this means the fit is running off to infinity
/// (perfect separation / monotone likelihood)
pub const MAX_ABS_COEFFICIENT: f64 = 25.0;

/// how many times a newton step may be halved before giving up
const MAX_STEP_HALVINGS: usize = 30;

/// largest coefficient move still counted as converged
const STEP_TOLERANCE: f64 = 1e-6;

/// Configuration for Cox model optimization
#[derive(Debug, Clone)]
pub struct OptimizationConfig {
    pub l2_penalty: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            l2_penalty: 0.0,
            max_iterations: 100,
            tolerance: 1e-9,
        }
    }
}

/// Everything the model summary needs from a finished optimization
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub beta: Array1<f64>,
    /// observed information (negative hessian of the penalized log-likelihood)
    pub information: Array2<f64>,
    /// unpenalized log partial likelihood at `beta`
    pub log_likelihood: f64,
    /// log partial likelihood at beta = 0
    pub null_log_likelihood: f64,
    pub iterations: usize,
}

/// Newton-Raphson on the Efron partial likelihood, with optional ridge penalty
pub struct CoxOptimizer {
    config: OptimizationConfig,
}

impl CoxOptimizer {
    pub fn new(config: OptimizationConfig) -> Self {
        Self { config }
    }

    /// Maximize the (penalized) partial likelihood
    pub fn optimize(&self, data: &SurvivalData) -> Result<OptimizationResult> {
        let names = data.feature_names();
        let fail = |msg: String| SurvivalError::fit_failure("cox", names, msg);

        if data.n_events() == 0 {
            return Err(SurvivalError::data_insufficient("cox fit (events)", 0, 1));
        }
        if data.n_features() == 0 {
            return Err(SurvivalError::invalid_input("cox fit needs at least one covariate"));
        }

        let n_features = data.n_features();
        let mut beta = Array1::zeros(n_features);

        let (null_loglik, mut gradient, mut hessian) =
            self.compute_likelihood_derivatives(data, &beta)?;
        let mut penalized = null_loglik;

        for iteration in 0..self.config.max_iterations {
            // Newton direction: (-H) step = g
            let information = hessian.mapv(|h| -h);
            let step = linalg::solve(&information, &gradient)
                .map_err(|e| fail(format!("singular information matrix: {e}")))?;

            // Step halving until the likelihood stops going down
            let mut scale = 1.0;
            let mut accepted = None;
            for _ in 0..MAX_STEP_HALVINGS {
                let candidate = &beta + &(scale * &step);
                if let Ok(derivs) = self.compute_likelihood_derivatives(data, &candidate) {
                    let cand_penalized = self.penalize(derivs.0, &candidate);
                    if cand_penalized.is_finite() && cand_penalized >= penalized - 1e-12 {
                        accepted = Some((candidate, derivs, cand_penalized));
                        break;
                    }
                }
                scale *= 0.5;
            }

            let Some((candidate, (_, g, h), cand_penalized)) = accepted else {
                return Err(fail("line search could not improve the likelihood".into()));
            };

            let change = (cand_penalized - penalized).abs();
            let step_size = scale * step.iter().fold(0.0f64, |m, s| m.max(s.abs()));
            beta = candidate;
            gradient = g;
            hessian = h;
            penalized = cand_penalized;

            debug!(iteration, loglik = penalized, change, step_size, "cox newton step");

            if beta.iter().any(|b| b.abs() > MAX_ABS_COEFFICIENT || !b.is_finite()) {
                return Err(fail(format!(
                    "coefficients diverging (|beta| > {MAX_ABS_COEFFICIENT}) - \
                     likely perfect separation"
                )));
            }

            // a flat likelihood with steps that won't shrink is separation, not convergence
            if change < self.config.tolerance && step_size < STEP_TOLERANCE {
                let (loglik, _, _) = self.compute_likelihood_derivatives(data, &beta)?;
                return Ok(OptimizationResult {
                    beta,
                    information: hessian.mapv(|v| -v),
                    log_likelihood: loglik,
                    null_log_likelihood: null_loglik,
                    iterations: iteration + 1,
                });
            }
        }

        Err(fail(format!(
            "newton-raphson failed to converge in {} iterations",
            self.config.max_iterations
        )))
    }

    fn penalize(&self, loglik: f64, beta: &Array1<f64>) -> f64 {
        loglik - 0.5 * self.config.l2_penalty * beta.dot(beta)
    }

    /// Compute the Efron log partial likelihood and its derivatives, with the
    /// ridge penalty folded into gradient and hessian (not the returned loglik)
    pub fn compute_likelihood_derivatives(
        &self,
        data: &SurvivalData,
        beta: &Array1<f64>,
    ) -> Result<(f64, Array1<f64>, Array2<f64>)> {
        let (loglik, mut gradient, mut hessian) = efron_derivatives(data, beta)?;

        if self.config.l2_penalty > 0.0 {
            gradient = &gradient - &(self.config.l2_penalty * beta);
            for i in 0..beta.len() {
                hessian[[i, i]] -= self.config.l2_penalty;
            }
        }

        Ok((loglik, gradient, hessian))
    }
}

/// Efron-approximated log partial likelihood, gradient and hessian at `beta`
pub fn efron_derivatives(
    data: &SurvivalData,
    beta: &Array1<f64>,
) -> Result<(f64, Array1<f64>, Array2<f64>)> {
    let x = data.covariates();
    let eta = x.dot(beta);
    efron_from_linear_predictor(data, &eta, true)
}

/// Same as [`efron_derivatives`] but from precomputed linear predictors.
/// Skips the gradient/hessian when `with_derivatives` is false.
pub fn efron_from_linear_predictor(
    data: &SurvivalData,
    eta: &Array1<f64>,
    with_derivatives: bool,
) -> Result<(f64, Array1<f64>, Array2<f64>)> {
    let p = if with_derivatives { data.n_features() } else { 0 };
    let x = data.covariates();

    // shift by the max so exp() can't overflow; cancels in every ratio
    let shift = eta.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let risk = eta.mapv(|e| (e - shift).exp());
    if risk.iter().any(|r| !r.is_finite()) {
        return Err(SurvivalError::numerical_error("non-finite risk score"));
    }

    let mut loglik = 0.0;
    let mut gradient = Array1::zeros(p);
    let mut hessian = Array2::zeros((p, p));

    for EventGroup { events, risk_set, .. } in data.event_groups() {
        let d = events.len();

        let (s0, s1, s2) = weighted_moments(&x, &risk, risk_set, p);
        let (d0, d1, d2) = weighted_moments(&x, &risk, events, p);

        for &i in events {
            loglik += eta[i];
            if with_derivatives {
                gradient += &x.row(i);
            }
        }

        for l in 0..d {
            let f = l as f64 / d as f64;
            let phi0 = s0 - f * d0;
            if phi0 <= 0.0 || !phi0.is_finite() {
                return Err(SurvivalError::numerical_error("risk set sum is non-positive"));
            }
            loglik -= phi0.ln() + shift;

            if with_derivatives {
                let phi1 = &s1 - &(f * &d1);
                let phi2 = &s2 - &(f * &d2);
                let mean = &phi1 / phi0;
                gradient -= &mean;
                for j in 0..p {
                    for k in 0..p {
                        hessian[[j, k]] -= phi2[[j, k]] / phi0 - mean[j] * mean[k];
                    }
                }
            }
        }
    }

    Ok((loglik, gradient, hessian))
}

/// (sum r, sum r x, sum r x x^T) over `rows`
fn weighted_moments(
    x: &ndarray::ArrayView2<'_, f64>,
    risk: &Array1<f64>,
    rows: &[usize],
    p: usize,
) -> (f64, Array1<f64>, Array2<f64>) {
    let mut s0 = 0.0;
    let mut s1 = Array1::zeros(p);
    let mut s2 = Array2::zeros((p, p));
    for &i in rows {
        let r = risk[i];
        s0 += r;
        if p == 0 {
            continue;
        }
        let xi = x.row(i);
        for j in 0..p {
            s1[j] += r * xi[j];
            for k in 0..p {
                s2[[j, k]] += r * xi[j] * xi[k];
            }
        }
    }
    (s0, s1, s2)
}
