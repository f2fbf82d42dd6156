use std::fmt;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};
use tracing::info;

use crate::{
    config::CoxConfig,
    data::SurvivalData,
    error::{Result, SurvivalError},
    linalg,
    metrics::ModelMetrics,
    optimization::{CoxOptimizer, OptimizationConfig},
};

const Z_95: f64 = 1.959_963_984_540_054;

/// cox proportional hazards model - settings only, `fit` hands back a `CoxFit`
#[derive(Debug, Clone)]
pub struct CoxModel {
    l2_penalty: f64,       // ridge penalty
    max_iterations: usize, // optimization limit
    tolerance: f64,        // convergence threshold on the log-likelihood
}

impl Default for CoxModel {
    fn default() -> Self {
        let defaults = OptimizationConfig::default();
        Self {
            l2_penalty: defaults.l2_penalty,
            max_iterations: defaults.max_iterations,
            tolerance: defaults.tolerance,
        }
    }
}

impl CoxModel {
    /// new cox model w/ defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &CoxConfig) -> Self {
        Self::new()
            .with_l2_penalty(config.l2_penalty)
            .with_max_iterations(config.max_iterations)
            .with_tolerance(config.tolerance)
    }

    /// add ridge penalty (L2) - shrinks coefficients, also rescues singular fits
    pub fn with_l2_penalty(mut self, penalty: f64) -> Self {
        self.l2_penalty = penalty.max(0.0);
        self
    }

    /// max iterations before giving up
    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    /// how close is close enough for convergence
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn l2_penalty(&self) -> f64 {
        self.l2_penalty
    }

    /// fit the model to data - this does the actual work
    pub fn fit(&self, data: &SurvivalData) -> Result<CoxFit> {
        let optimizer = CoxOptimizer::new(OptimizationConfig {
            l2_penalty: self.l2_penalty,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
        });
        let result = optimizer.optimize(data)?;

        let covariance = linalg::invert(&result.information).map_err(|e| {
            SurvivalError::fit_failure(
                "cox",
                data.feature_names(),
                format!("can't invert information matrix: {e}"),
            )
        })?;

        let risk_scores = data.covariates().dot(&result.beta);
        let metrics = ModelMetrics::compute(data, risk_scores.view(), data.n_features())?;
        let baseline = breslow_baseline(data, &risk_scores);

        info!(
            n = data.n_samples(),
            events = data.n_events(),
            iterations = result.iterations,
            loglik = result.log_likelihood,
            c_index = metrics.c_index,
            "fitted cox model"
        );

        Ok(CoxFit {
            coefficients: result.beta,
            covariance,
            feature_names: data.feature_names().to_vec(),
            log_likelihood: result.log_likelihood,
            null_log_likelihood: result.null_log_likelihood,
            iterations: result.iterations,
            n_samples: data.n_samples(),
            n_events: data.n_events(),
            l2_penalty: self.l2_penalty,
            metrics,
            baseline,
        })
    }
}

/// breslow cumulative baseline hazard: (event time, H0(t))
fn breslow_baseline(data: &SurvivalData, risk_scores: &Array1<f64>) -> Vec<(f64, f64)> {
    let risk = risk_scores.mapv(f64::exp);
    let mut cumulative = 0.0;
    data.event_groups()
        .iter()
        .map(|group| {
            let denom: f64 = group.risk_set.iter().map(|&i| risk[i]).sum();
            cumulative += group.events.len() as f64 / denom;
            (group.time, cumulative)
        })
        .collect()
}

/// a fitted cox model - immutable
#[derive(Debug, Clone)]
pub struct CoxFit {
    coefficients: Array1<f64>, // the betas
    covariance: Array2<f64>,   // inverse information
    feature_names: Vec<String>,
    log_likelihood: f64,
    null_log_likelihood: f64,
    iterations: usize,
    n_samples: usize,
    n_events: usize,
    l2_penalty: f64,
    metrics: ModelMetrics,
    baseline: Vec<(f64, f64)>,
}

impl CoxFit {
    pub fn coefficients(&self) -> ArrayView1<'_, f64> {
        self.coefficients.view()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn metrics(&self) -> &ModelMetrics {
        &self.metrics
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// linear predictor for new rows
    pub fn predict(&self, covariates: ArrayView2<f64>) -> Result<Array1<f64>> {
        if covariates.ncols() != self.coefficients.len() {
            return Err(SurvivalError::invalid_dimensions(format!(
                "feature count mismatch: expected {}, got {}",
                self.coefficients.len(),
                covariates.ncols()
            )));
        }

        Ok(covariates.dot(&self.coefficients))
    }

    /// partial hazard exp(x . beta)
    pub fn predict_hazard_ratios(&self, covariates: ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(self.predict(covariates)?.mapv(f64::exp))
    }

    /// S(t | x) = exp(-H0(t) exp(x . beta)), breslow baseline
    pub fn predict_survival(
        &self,
        covariates: ArrayView2<f64>,
        times: ArrayView1<f64>,
    ) -> Result<Array2<f64>> {
        let partial = self.predict_hazard_ratios(covariates)?;
        let mut out = Array2::zeros((covariates.nrows(), times.len()));

        for (j, &t) in times.iter().enumerate() {
            let h0 = self.baseline_cumulative_hazard(t);
            for (i, &hr) in partial.iter().enumerate() {
                out[[i, j]] = (-h0 * hr).exp();
            }
        }

        Ok(out)
    }

    /// H0(t), flat between event times
    pub fn baseline_cumulative_hazard(&self, t: f64) -> f64 {
        let idx = self.baseline.partition_point(|&(time, _)| time <= t);
        if idx == 0 { 0.0 } else { self.baseline[idx - 1].1 }
    }

    /// coefficient table + global tests
    pub fn summary(&self) -> Result<CoxModelSummary> {
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| SurvivalError::numerical_error(e.to_string()))?;

        let rows = self
            .feature_names
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let coef = self.coefficients[j];
                let se = self.covariance[[j, j]].max(0.0).sqrt();
                let z = coef / se;
                CoxCoefficient {
                    name: name.clone(),
                    coefficient: coef,
                    hazard_ratio: coef.exp(),
                    std_err: se,
                    z,
                    p_value: two_sided_p(&normal, z),
                    hazard_ratio_lower: (coef - Z_95 * se).exp(),
                    hazard_ratio_upper: (coef + Z_95 * se).exp(),
                }
            })
            .collect();

        let lr_statistic = (2.0 * (self.log_likelihood - self.null_log_likelihood)).max(0.0);
        let df = self.coefficients.len();
        let chi2 = ChiSquared::new(df as f64)
            .map_err(|e| SurvivalError::numerical_error(e.to_string()))?;

        Ok(CoxModelSummary {
            coefficients: rows,
            n_samples: self.n_samples,
            n_events: self.n_events,
            log_likelihood: self.log_likelihood,
            null_log_likelihood: self.null_log_likelihood,
            likelihood_ratio: lr_statistic,
            likelihood_ratio_df: df,
            likelihood_ratio_p: 1.0 - chi2.cdf(lr_statistic),
            concordance: self.metrics.c_index,
            aic: self.metrics.aic,
            l2_penalty: self.l2_penalty,
        })
    }
}

/// two-sided p from a standard normal z; NaN z (zero variance) gives NaN
pub(crate) fn two_sided_p(normal: &Normal, z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    2.0 * (1.0 - normal.cdf(z.abs()))
}

/// one covariate's row of the summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoxCoefficient {
    pub name: String,
    pub coefficient: f64,
    pub hazard_ratio: f64, // exp(coef): >1 riskier, <1 protective
    pub std_err: f64,
    pub z: f64,
    pub p_value: f64,
    pub hazard_ratio_lower: f64,
    pub hazard_ratio_upper: f64,
}

/// what the model learned
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoxModelSummary {
    pub coefficients: Vec<CoxCoefficient>,
    pub n_samples: usize,
    pub n_events: usize,
    pub log_likelihood: f64,
    pub null_log_likelihood: f64,
    pub likelihood_ratio: f64,
    pub likelihood_ratio_df: usize,
    pub likelihood_ratio_p: f64,
    pub concordance: f64,
    pub aic: f64,
    pub l2_penalty: f64,
}

impl CoxModelSummary {
    pub fn get(&self, name: &str) -> Option<&CoxCoefficient> {
        self.coefficients.iter().find(|c| c.name == name)
    }
}

impl fmt::Display for CoxModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "cox proportional hazards model (efron ties)")?;
        writeln!(f, "===========================================")?;
        writeln!(f, "observations: {}  events: {}", self.n_samples, self.n_events)?;
        if self.l2_penalty > 0.0 {
            writeln!(f, "l2 penalty (ridge): {:.6}", self.l2_penalty)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:<20} {:>10} {:>10} {:>10} {:>10}",
            "covariate", "coef", "exp(coef)", "se", "p"
        )?;
        writeln!(f, "{:-<64}", "")?;
        for c in &self.coefficients {
            writeln!(
                f,
                "{:<20} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
                c.name, c.coefficient, c.hazard_ratio, c.std_err, c.p_value
            )?;
        }
        writeln!(f)?;
        writeln!(f, "concordance: {:.4}", self.concordance)?;
        writeln!(f, "partial log-likelihood: {:.4}", self.log_likelihood)?;
        write!(
            f,
            "likelihood ratio test: {:.4} on {} df, p = {:.4}",
            self.likelihood_ratio, self.likelihood_ratio_df, self.likelihood_ratio_p
        )
    }
}
