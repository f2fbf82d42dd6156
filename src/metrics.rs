use ndarray::{Array1, ArrayView1};
use serde::Serialize;

use crate::{
    data::SurvivalData,
    error::{Result, SurvivalError},
    optimization::efron_from_linear_predictor,
};

/// Harrell's C-index - how often does the higher risk score go with the
/// shorter marriage? tied scores count half
pub fn harrell_c_index(
    risk_scores: ArrayView1<f64>,
    times: ArrayView1<f64>,
    events: &[bool],
) -> Result<f64> {
    let n = risk_scores.len();
    if n != times.len() || n != events.len() {
        return Err(SurvivalError::invalid_dimensions(
            "risk scores, times, and events must have same length",
        ));
    }
    if n < 2 {
        return Err(SurvivalError::data_insufficient("concordance", n, 2));
    }

    let mut concordant = 0.0;
    let mut discordant = 0.0;
    let mut tied_risk = 0.0;

    for i in 0..n {
        if !events[i] {
            continue; // censored rows can't anchor a pair
        }

        for j in 0..n {
            if i == j {
                continue;
            }

            // j outlived i (event or censored later)
            if times[j] > times[i] || (!events[j] && times[j] >= times[i]) {
                if risk_scores[i] > risk_scores[j] {
                    concordant += 1.0;
                } else if risk_scores[i] < risk_scores[j] {
                    discordant += 1.0;
                } else {
                    tied_risk += 1.0;
                }
            }
        }
    }

    let total_pairs = concordant + discordant + tied_risk;
    if total_pairs == 0.0 {
        return Err(SurvivalError::numerical_error(
            "no comparable pairs for C-index calculation",
        ));
    }

    Ok((concordant + 0.5 * tied_risk) / total_pairs)
}

/// Efron log partial likelihood for given linear predictors
pub fn log_partial_likelihood(data: &SurvivalData, risk_scores: ArrayView1<f64>) -> Result<f64> {
    if risk_scores.len() != data.n_samples() {
        return Err(SurvivalError::invalid_dimensions(
            "risk scores length must match number of samples",
        ));
    }
    let eta: Array1<f64> = risk_scores.to_owned();
    let (loglik, _, _) = efron_from_linear_predictor(data, &eta, false)?;
    Ok(loglik)
}

/// AIC on the partial likelihood
pub fn aic(log_likelihood: f64, n_parameters: usize) -> f64 {
    2.0 * n_parameters as f64 - 2.0 * log_likelihood
}

/// BIC, penalized by the number of observed events
pub fn bic(log_likelihood: f64, n_parameters: usize, n_events: usize) -> f64 {
    (n_parameters as f64) * (n_events.max(1) as f64).ln() - 2.0 * log_likelihood
}

/// fit-quality numbers for a cox model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelMetrics {
    pub c_index: f64,
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
}

impl ModelMetrics {
    pub fn compute(
        data: &SurvivalData,
        risk_scores: ArrayView1<f64>,
        n_parameters: usize,
    ) -> Result<Self> {
        // no comparable pairs is a property of the data, not a fit failure
        let c_index = match harrell_c_index(risk_scores, data.times(), data.events()) {
            Ok(c) => c,
            Err(err @ SurvivalError::InvalidDimensions { .. }) => return Err(err),
            Err(_) => f64::NAN,
        };
        let log_likelihood = log_partial_likelihood(data, risk_scores)?;

        Ok(Self {
            c_index,
            log_likelihood,
            aic: aic(log_likelihood, n_parameters),
            bic: bic(log_likelihood, n_parameters, data.n_events()),
        })
    }
}
