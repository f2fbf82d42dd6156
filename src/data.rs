use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use tracing::debug;

use crate::{
    error::{Result, SurvivalError},
    features::{Covariate, DerivedRecord, MissingPolicy},
};

/// one distinct event time: who failed there & who was still at risk
#[derive(Debug, Clone, PartialEq)]
pub struct EventGroup {
    pub time: f64,
    pub events: Vec<usize>,   // rows with an observed event at `time`
    pub risk_set: Vec<usize>, // rows with duration >= `time`
}

/// survival fit table - durations, events, covariates (no missing values)
#[derive(Debug, Clone)]
pub struct SurvivalData {
    times: Array1<f64>,            // duration in years
    events: Vec<bool>,             // true = dissolution observed, false = censored
    covariates: Array2<f64>,       // n_samples x n_features
    feature_names: Vec<String>,
    event_groups: Vec<EventGroup>, // precomputed, ascending by time
}

impl SurvivalData {
    /// build from raw vecs/arrays. any NaN/inf is an `InvalidInput` error
    pub fn new(
        times: Vec<f64>,
        events: Vec<bool>,
        covariates: Array2<f64>,
        feature_names: Vec<String>,
    ) -> Result<Self> {
        let n_samples = times.len();

        if events.len() != n_samples {
            return Err(SurvivalError::invalid_dimensions(format!(
                "times len ({}) != events len ({})",
                n_samples,
                events.len()
            )));
        }

        if covariates.nrows() != n_samples {
            return Err(SurvivalError::invalid_dimensions(format!(
                "covariates rows ({}) != n_samples ({})",
                covariates.nrows(),
                n_samples
            )));
        }

        if feature_names.len() != covariates.ncols() {
            return Err(SurvivalError::invalid_dimensions(format!(
                "{} feature names for {} covariate columns",
                feature_names.len(),
                covariates.ncols()
            )));
        }

        if times.iter().any(|&t| t <= 0.0 || !t.is_finite()) {
            return Err(SurvivalError::invalid_input(
                "durations must be positive & finite",
            ));
        }

        for (j, column) in covariates.columns().into_iter().enumerate() {
            if let Some(i) = column.iter().position(|v| !v.is_finite()) {
                return Err(SurvivalError::invalid_input(format!(
                    "column '{}' has a missing value at row {}",
                    feature_names[j], i
                )));
            }
        }

        let times = Array1::from(times);
        let event_groups = compute_event_groups(&times, &events);

        Ok(Self {
            times,
            events,
            covariates,
            feature_names,
            event_groups,
        })
    }

    /// build a fit table from derived records.
    ///
    /// rows missing any requested covariate are dropped (`Exclude`) or
    /// zero-filled (`ImputeZero`). returns the table & the dropped count.
    pub fn from_records(
        records: &[DerivedRecord],
        covariates: &[Covariate],
        policy: MissingPolicy,
    ) -> Result<(Self, usize)> {
        let n_features = covariates.len();
        let mut times = Vec::with_capacity(records.len());
        let mut events = Vec::with_capacity(records.len());
        let mut values = Vec::with_capacity(records.len() * n_features);
        let mut dropped = 0;

        for rec in records {
            let row: Option<Vec<f64>> = covariates
                .iter()
                .map(|c| c.value(rec.covariates(), policy))
                .collect();
            match row {
                Some(row) => {
                    times.push(rec.normalized().duration_years());
                    events.push(rec.normalized().is_event());
                    values.extend(row);
                }
                None => dropped += 1,
            }
        }

        debug!(
            kept = times.len(),
            dropped,
            ?policy,
            "built survival fit table"
        );

        let n_samples = times.len();
        let matrix = Array2::from_shape_vec((n_samples, n_features), values)
            .map_err(|e| SurvivalError::invalid_dimensions(e.to_string()))?;
        let names = covariates.iter().map(|c| c.name().to_string()).collect();

        Ok((Self::new(times, events, matrix, names)?, dropped))
    }

    /// how many rows
    pub fn n_samples(&self) -> usize {
        self.times.len()
    }

    /// how many covariates per row
    pub fn n_features(&self) -> usize {
        self.covariates.ncols()
    }

    pub fn n_events(&self) -> usize {
        self.events.iter().filter(|&&e| e).count()
    }

    pub fn times(&self) -> ArrayView1<'_, f64> {
        self.times.view()
    }

    /// event indicators (true = event, false = censored)
    pub fn events(&self) -> &[bool] {
        &self.events
    }

    pub fn covariates(&self) -> ArrayView2<'_, f64> {
        self.covariates.view()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// precomputed (time, events, risk set) triples, ascending by time
    pub fn event_groups(&self) -> &[EventGroup] {
        &self.event_groups
    }

    /// unique event times in order
    pub fn event_times(&self) -> Vec<f64> {
        self.event_groups.iter().map(|g| g.time).collect()
    }
}

fn compute_event_groups(times: &Array1<f64>, events: &[bool]) -> Vec<EventGroup> {
    let mut event_times: Vec<f64> = times
        .iter()
        .zip(events)
        .filter_map(|(&t, &e)| e.then_some(t))
        .collect();
    event_times.sort_by(f64::total_cmp);
    event_times.dedup();

    event_times
        .into_iter()
        .map(|time| EventGroup {
            time,
            events: (0..times.len())
                .filter(|&i| events[i] && times[i] == time)
                .collect(),
            // everyone who hasn't failed or been censored before this time
            risk_set: (0..times.len()).filter(|&i| times[i] >= time).collect(),
        })
        .collect()
}
