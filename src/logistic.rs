//! logistic regression on "was this a short marriage?"
//!
//! Rows censored before the threshold have an unknown label and never enter
//! the fit. Newton-Raphson (IRLS) with an optional ridge penalty on the slopes;
//! the intercept is never penalized.

use std::fmt;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, s};
use serde::Serialize;
use statrs::distribution::Normal;
use tracing::{debug, info};

use crate::{
    config::LogisticConfig,
    error::{Result, SurvivalError},
    features::{Covariate, DerivedRecord, MissingPolicy},
    linalg,
    model::two_sided_p,
    optimization::MAX_ABS_COEFFICIENT,
};

const MAX_STEP_HALVINGS: usize = 30;
const STEP_TOLERANCE: f64 = 1e-6;

/// binary-outcome fit table
#[derive(Debug, Clone)]
pub struct BinaryOutcomeData {
    covariates: Array2<f64>,
    targets: Array1<f64>, // 1.0 = short marriage
    feature_names: Vec<String>,
}

/// what happened to the rows while building the table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BinaryOutcomeCounts {
    pub kept: usize,
    pub missing_covariates: usize,
    pub unknown_label: usize,
}

impl BinaryOutcomeData {
    pub fn new(
        covariates: Array2<f64>,
        targets: Vec<bool>,
        feature_names: Vec<String>,
    ) -> Result<Self> {
        if covariates.nrows() != targets.len() {
            return Err(SurvivalError::invalid_dimensions(format!(
                "covariates rows ({}) != targets len ({})",
                covariates.nrows(),
                targets.len()
            )));
        }
        if feature_names.len() != covariates.ncols() {
            return Err(SurvivalError::invalid_dimensions(format!(
                "{} feature names for {} covariate columns",
                feature_names.len(),
                covariates.ncols()
            )));
        }
        if covariates.iter().any(|v| !v.is_finite()) {
            return Err(SurvivalError::invalid_input(
                "logistic covariates contain missing values",
            ));
        }

        Ok(Self {
            covariates,
            targets: targets.into_iter().map(|t| if t { 1.0 } else { 0.0 }).collect(),
            feature_names,
        })
    }

    /// label = duration <= threshold. kept rows: observed events, or anything
    /// (censored included) that has already lasted past the threshold
    pub fn short_marriage(
        records: &[DerivedRecord],
        covariates: &[Covariate],
        policy: MissingPolicy,
        threshold_years: f64,
    ) -> Result<(Self, BinaryOutcomeCounts)> {
        let mut counts = BinaryOutcomeCounts::default();
        let mut values = Vec::with_capacity(records.len() * covariates.len());
        let mut targets = Vec::with_capacity(records.len());

        for rec in records {
            let norm = rec.normalized();
            let duration = norm.duration_years();
            if !norm.is_event() && duration <= threshold_years {
                counts.unknown_label += 1;
                continue;
            }
            let row: Option<Vec<f64>> = covariates
                .iter()
                .map(|c| c.value(rec.covariates(), policy))
                .collect();
            let Some(row) = row else {
                counts.missing_covariates += 1;
                continue;
            };
            values.extend(row);
            targets.push(duration <= threshold_years);
        }
        counts.kept = targets.len();

        debug!(?counts, threshold_years, "built short-marriage table");

        let matrix = Array2::from_shape_vec((targets.len(), covariates.len()), values)
            .map_err(|e| SurvivalError::invalid_dimensions(e.to_string()))?;
        let names = covariates.iter().map(|c| c.name().to_string()).collect();
        Ok((Self::new(matrix, targets, names)?, counts))
    }

    pub fn n_samples(&self) -> usize {
        self.targets.len()
    }

    pub fn n_positive(&self) -> usize {
        self.targets.iter().filter(|&&y| y > 0.5).count()
    }

    pub fn covariates(&self) -> ArrayView2<'_, f64> {
        self.covariates.view()
    }

    pub fn targets(&self) -> ArrayView1<'_, f64> {
        self.targets.view()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// covariates with a leading column of ones
    fn design(&self) -> Array2<f64> {
        let (n, p) = self.covariates.dim();
        Array2::from_shape_fn((n, p + 1), |(i, j)| {
            if j == 0 { 1.0 } else { self.covariates[[i, j - 1]] }
        })
    }
}

/// logistic model settings
#[derive(Debug, Clone)]
pub struct LogisticModel {
    l2_penalty: f64,
    max_iterations: usize,
    tolerance: f64,
}

impl Default for LogisticModel {
    fn default() -> Self {
        Self::from_config(&LogisticConfig::default())
    }
}

impl LogisticModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &LogisticConfig) -> Self {
        Self {
            l2_penalty: config.l2_penalty.max(0.0),
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
        }
    }

    pub fn with_l2_penalty(mut self, penalty: f64) -> Self {
        self.l2_penalty = penalty.max(0.0);
        self
    }

    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    pub fn fit(&self, data: &BinaryOutcomeData) -> Result<LogisticFit> {
        let names = data.feature_names();
        let fail = |msg: String| SurvivalError::fit_failure("logistic", names, msg);

        let positives = data.n_positive();
        let negatives = data.n_samples() - positives;
        if positives == 0 || negatives == 0 {
            return Err(SurvivalError::data_insufficient(
                "logistic fit (minority class)",
                positives.min(negatives),
                1,
            ));
        }

        let x = data.design();
        let y = data.targets();
        let p = x.ncols();
        let mut beta = Array1::zeros(p);
        let (mut ll, mut grad, mut hess) = self.derivatives(&x, y, &beta);

        for iteration in 0..self.max_iterations {
            let information = hess.mapv(|h| -h);
            let step = linalg::solve(&information, &grad)
                .map_err(|e| fail(format!("singular information matrix: {e}")))?;

            let mut scale = 1.0;
            let mut accepted = None;
            for _ in 0..MAX_STEP_HALVINGS {
                let candidate = &beta + &(scale * &step);
                let derivs = self.derivatives(&x, y, &candidate);
                if derivs.0.is_finite() && derivs.0 >= ll - 1e-12 {
                    accepted = Some((candidate, derivs));
                    break;
                }
                scale *= 0.5;
            }
            let Some((candidate, (new_ll, g, h))) = accepted else {
                return Err(fail("line search could not improve the likelihood".into()));
            };

            let change = (new_ll - ll).abs();
            let step_size = scale * step.iter().fold(0.0f64, |m, s| m.max(s.abs()));
            beta = candidate;
            ll = new_ll;
            grad = g;
            hess = h;

            debug!(iteration, loglik = ll, change, step_size, "logistic newton step");

            if beta.iter().any(|b| b.abs() > MAX_ABS_COEFFICIENT || !b.is_finite()) {
                return Err(fail(format!(
                    "coefficients diverging (|beta| > {MAX_ABS_COEFFICIENT}) - \
                     likely perfect separation"
                )));
            }

            if change < self.tolerance && step_size < STEP_TOLERANCE {
                let covariance = linalg::invert(&hess.mapv(|h| -h))
                    .map_err(|e| fail(format!("can't invert information matrix: {e}")))?;

                info!(
                    n = data.n_samples(),
                    positives,
                    iterations = iteration + 1,
                    "fitted logistic model"
                );

                let log_likelihood = self.log_likelihood(&x, y, &beta);
                return Ok(LogisticFit {
                    coefficients: beta,
                    covariance,
                    feature_names: data.feature_names().to_vec(),
                    log_likelihood,
                    n_samples: data.n_samples(),
                    n_positive: positives,
                    l2_penalty: self.l2_penalty,
                });
            }
        }

        Err(fail(format!(
            "newton-raphson failed to converge in {} iterations",
            self.max_iterations
        )))
    }

    /// unpenalized bernoulli log-likelihood
    fn log_likelihood(&self, x: &Array2<f64>, y: ArrayView1<f64>, beta: &Array1<f64>) -> f64 {
        let eta = x.dot(beta);
        eta.iter()
            .zip(y.iter())
            .map(|(&e, &yi)| yi * e - softplus(e))
            .sum()
    }

    /// penalized log-likelihood, gradient & hessian
    fn derivatives(
        &self,
        x: &Array2<f64>,
        y: ArrayView1<f64>,
        beta: &Array1<f64>,
    ) -> (f64, Array1<f64>, Array2<f64>) {
        let eta = x.dot(beta);
        let prob = eta.mapv(sigmoid);
        let residual = &y - &prob;

        let mut ll = self.log_likelihood(x, y, beta);
        let mut gradient = x.t().dot(&residual);

        let weights = prob.mapv(|q| q * (1.0 - q));
        let weighted = x * &weights.insert_axis(Axis(1));
        let mut hessian = -x.t().dot(&weighted);

        if self.l2_penalty > 0.0 {
            for j in 1..beta.len() {
                ll -= 0.5 * self.l2_penalty * beta[j] * beta[j];
                gradient[j] -= self.l2_penalty * beta[j];
                hessian[[j, j]] -= self.l2_penalty;
            }
        }

        (ll, gradient, hessian)
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// ln(1 + e^z) without overflow
fn softplus(z: f64) -> f64 {
    z.max(0.0) + (-z.abs()).exp().ln_1p()
}

/// fitted logistic model. `coefficients[0]` is the intercept
#[derive(Debug, Clone)]
pub struct LogisticFit {
    coefficients: Array1<f64>,
    covariance: Array2<f64>,
    feature_names: Vec<String>,
    log_likelihood: f64,
    n_samples: usize,
    n_positive: usize,
    l2_penalty: f64,
}

impl LogisticFit {
    pub fn intercept(&self) -> f64 {
        self.coefficients[0]
    }

    /// slopes only, in feature order
    pub fn coefficients(&self) -> ArrayView1<'_, f64> {
        self.coefficients.slice(s![1..])
    }

    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    /// P(short marriage | x)
    pub fn predict_proba(&self, covariates: ArrayView2<f64>) -> Result<Array1<f64>> {
        let slopes = self.coefficients();
        if covariates.ncols() != slopes.len() {
            return Err(SurvivalError::invalid_dimensions(format!(
                "feature count mismatch: expected {}, got {}",
                slopes.len(),
                covariates.ncols()
            )));
        }
        Ok((covariates.dot(&slopes) + self.intercept()).mapv(sigmoid))
    }

    pub fn summary(&self) -> Result<LogisticSummary> {
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| SurvivalError::numerical_error(e.to_string()))?;
        let row = |j: usize, name: &str| {
            let coef = self.coefficients[j];
            let se = self.covariance[[j, j]].max(0.0).sqrt();
            let z = coef / se;
            LogisticCoefficient {
                name: name.to_string(),
                coefficient: coef,
                odds_ratio: coef.exp(),
                std_err: se,
                z,
                p_value: two_sided_p(&normal, z),
            }
        };

        Ok(LogisticSummary {
            intercept: row(0, "intercept"),
            coefficients: self
                .feature_names
                .iter()
                .enumerate()
                .map(|(j, name)| row(j + 1, name))
                .collect(),
            n_samples: self.n_samples,
            n_positive: self.n_positive,
            log_likelihood: self.log_likelihood,
            l2_penalty: self.l2_penalty,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogisticCoefficient {
    pub name: String,
    pub coefficient: f64, // > 0: more likely to be a short marriage
    pub odds_ratio: f64,
    pub std_err: f64,
    pub z: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogisticSummary {
    pub intercept: LogisticCoefficient,
    pub coefficients: Vec<LogisticCoefficient>,
    pub n_samples: usize,
    pub n_positive: usize,
    pub log_likelihood: f64,
    pub l2_penalty: f64,
}

impl LogisticSummary {
    pub fn get(&self, name: &str) -> Option<&LogisticCoefficient> {
        self.coefficients.iter().find(|c| c.name == name)
    }
}

impl fmt::Display for LogisticSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "short-marriage risk factors (logistic regression)")?;
        writeln!(
            f,
            "observations: {}  short: {}",
            self.n_samples, self.n_positive
        )?;
        writeln!(
            f,
            "{:<20} {:>10} {:>10} {:>10}",
            "factor", "coef", "odds", "p"
        )?;
        writeln!(f, "{:-<53}", "")?;
        for c in std::iter::once(&self.intercept).chain(&self.coefficients) {
            writeln!(
                f,
                "{:<20} {:>10.4} {:>10.4} {:>10.4}",
                c.name, c.coefficient, c.odds_ratio, c.p_value
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn table(x: Vec<f64>, y: Vec<bool>) -> BinaryOutcomeData {
        let n = y.len();
        let p = x.len() / n;
        let names = (0..p).map(|j| format!("x{j}")).collect();
        BinaryOutcomeData::new(Array2::from_shape_vec((n, p), x).unwrap(), y, names).unwrap()
    }

    #[test]
    fn test_intercept_only_matches_base_rate() {
        // no slope signal: x constant at 0 makes the slope unidentifiable, so
        // use a covariate uncorrelated with y instead
        let data = table(
            vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0],
            vec![true, true, false, false, false, false, false, false],
        );
        let fit = LogisticModel::new().fit(&data).unwrap();
        assert_relative_eq!(fit.coefficients()[0], 0.0, epsilon = 1e-6);
        let p = sigmoid(fit.intercept());
        assert_relative_eq!(p, 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_known_two_by_two_odds_ratio() {
        // x=1: 3 short / 1 long, x=0: 1 short / 3 long -> OR = 9
        let data = table(
            vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0],
            vec![true, true, true, false, true, false, false, false],
        );
        let fit = LogisticModel::new().fit(&data).unwrap();
        let summary = fit.summary().unwrap();
        assert_relative_eq!(summary.coefficients[0].odds_ratio, 9.0, epsilon = 1e-6);
        // wald se for a 2x2 table: sqrt(1/3 + 1 + 1 + 1/3)
        assert_relative_eq!(
            summary.coefficients[0].std_err,
            (8.0f64 / 3.0).sqrt(),
            epsilon = 1e-6
        );
        assert!((0.0..=1.0).contains(&summary.coefficients[0].p_value));
        assert!(summary.to_string().contains("intercept"));
    }

    #[test]
    fn test_ridge_shrinks_slope() {
        let x = vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        let y = vec![true, true, true, false, true, false, false, false];
        let plain = LogisticModel::new().fit(&table(x.clone(), y.clone())).unwrap();
        let ridge = LogisticModel::new()
            .with_l2_penalty(2.0)
            .fit(&table(x, y))
            .unwrap();
        assert!(ridge.coefficients()[0].abs() < plain.coefficients()[0].abs());
    }

    #[test]
    fn test_perfect_separation_fails() {
        let data = table(
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
            vec![false, false, false, true, true, true],
        );
        let err = LogisticModel::new().fit(&data).unwrap_err();
        assert!(matches!(err, SurvivalError::FitFailure { .. }));
    }

    #[test]
    fn test_single_class_is_insufficient() {
        let data = table(vec![0.0, 1.0, 2.0], vec![true, true, true]);
        let err = LogisticModel::new().fit(&data).unwrap_err();
        assert!(matches!(err, SurvivalError::DataInsufficient { .. }));
    }

    #[test]
    fn test_predict_proba() {
        let data = table(
            vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0],
            vec![true, true, true, false, true, false, false, false],
        );
        let fit = LogisticModel::new().fit(&data).unwrap();
        let probs = fit.predict_proba(data.covariates()).unwrap();
        assert_relative_eq!(probs[0], 0.75, epsilon = 1e-6);
        assert_relative_eq!(probs[7], 0.25, epsilon = 1e-6);
        assert!(fit.predict_proba(Array2::zeros((1, 2)).view()).is_err());
    }

    #[test]
    fn test_numeric_helpers() {
        assert_relative_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(-800.0) >= 0.0 && sigmoid(800.0) <= 1.0);
        assert_relative_eq!(softplus(0.0), 2.0f64.ln(), epsilon = 1e-12);
        assert_relative_eq!(softplus(800.0), 800.0, epsilon = 1e-9);
    }
}
