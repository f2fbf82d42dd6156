//! kaplan-meier survival curves, plain & stratified

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    error::{Result, SurvivalError},
    record::ObservationWindow,
};

/// z for a two-sided 95% band
const Z_95: f64 = 1.959_963_984_540_054;

/// fitted kaplan-meier step function
///
/// Stores one entry per distinct event time. Between event times the curve
/// is flat; at an event time it already has the post-drop value
/// (right-continuous). `S(t) = 1` for every `t` before the first event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KaplanMeierCurve {
    /// distinct times with at least one event, ascending
    pub times: Vec<f64>,
    /// S(t) right after each event time
    pub survival: Vec<f64>,
    /// number at risk just before each event time
    pub at_risk: Vec<usize>,
    /// number of events at each event time
    pub events: Vec<usize>,
    /// greenwood standard error of S(t)
    pub std_err: Vec<f64>,
    /// 95% log-log confidence band
    pub ci_lower: Vec<f64>,
    pub ci_upper: Vec<f64>,
    pub n_observations: usize,
    pub n_events: usize,
}

impl KaplanMeierCurve {
    /// fit on a set of observation windows. empty input is an error
    pub fn fit(windows: &[ObservationWindow]) -> Result<Self> {
        if windows.is_empty() {
            return Err(SurvivalError::data_insufficient("kaplan-meier fit", 0, 1));
        }

        let mut data: Vec<(f64, bool)> = windows
            .iter()
            .map(|w| (w.duration_years(), w.is_event()))
            .collect();
        data.sort_by(|a, b| a.0.total_cmp(&b.0));

        let total = data.len();
        let mut curve = Self {
            times: vec![],
            survival: vec![],
            at_risk: vec![],
            events: vec![],
            std_err: vec![],
            ci_lower: vec![],
            ci_upper: vec![],
            n_observations: total,
            n_events: data.iter().filter(|(_, e)| *e).count(),
        };

        let mut current = 1.0;
        let mut greenwood = 0.0;

        let mut i = 0;
        while i < total {
            let time = data[i].0;
            let at_risk = total - i;

            // everything tied at `time` - events & censorings alike
            let mut j = i;
            let mut event_count = 0;
            while j < total && data[j].0 == time {
                if data[j].1 {
                    event_count += 1;
                }
                j += 1;
            }

            if event_count > 0 {
                let (n, d) = (at_risk as f64, event_count as f64);
                current *= 1.0 - d / n;
                if at_risk > event_count {
                    greenwood += d / (n * (n - d));
                } else {
                    greenwood = f64::INFINITY;
                }

                let (se, lo, hi) = confidence_band(current, greenwood);
                curve.times.push(time);
                curve.survival.push(current);
                curve.at_risk.push(at_risk);
                curve.events.push(event_count);
                curve.std_err.push(se);
                curve.ci_lower.push(lo);
                curve.ci_upper.push(hi);
            }

            // censored rows at `time` drop out of the risk set here too
            i = j;
        }

        debug!(
            n = total,
            events = curve.n_events,
            steps = curve.times.len(),
            "fitted kaplan-meier curve"
        );
        Ok(curve)
    }

    /// S(t); 1 before the first event, flat between events
    pub fn survival_at(&self, t: f64) -> f64 {
        let idx = self.times.partition_point(|&x| x <= t);
        if idx == 0 { 1.0 } else { self.survival[idx - 1] }
    }

    pub fn survival_at_many(&self, ts: &[f64]) -> Vec<f64> {
        ts.iter().map(|&t| self.survival_at(t)).collect()
    }

    /// smallest t with S(t) <= 0.5, `None` if the curve never gets there
    pub fn median_survival(&self) -> Option<f64> {
        self.survival
            .iter()
            .position(|&s| s <= 0.5)
            .map(|i| self.times[i])
    }

    pub fn summary(&self, probe_years: f64) -> SurvivalSummary {
        SurvivalSummary {
            n_observations: self.n_observations,
            n_events: self.n_events,
            median_survival: self.median_survival(),
            probe_years,
            survival_at_probe: self.survival_at(probe_years),
        }
    }
}

/// (std err, lower, upper) for one step
fn confidence_band(s: f64, greenwood: f64) -> (f64, f64, f64) {
    if s <= 0.0 || !greenwood.is_finite() {
        return (0.0, 0.0, 0.0);
    }
    let se = s * greenwood.sqrt();
    let log_s = s.ln();
    if log_s == 0.0 {
        return (se, s, s);
    }
    // log(-log S) transform keeps the band inside [0, 1]
    let width = Z_95 * (greenwood / (log_s * log_s)).sqrt();
    (se, s.powf(width.exp()), s.powf((-width).exp()))
}

/// the numbers everybody asks for
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurvivalSummary {
    pub n_observations: usize,
    pub n_events: usize,
    pub median_survival: Option<f64>,
    pub probe_years: f64,
    pub survival_at_probe: f64,
}

/// a stratum that didn't get a curve
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedStratum {
    pub label: String,
    pub observed: usize,
    pub minimum: usize,
}

impl SkippedStratum {
    pub fn to_error(&self) -> SurvivalError {
        SurvivalError::data_insufficient(
            format!("stratum '{}'", self.label),
            self.observed,
            self.minimum,
        )
    }
}

/// one independent curve per stratum
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StratifiedCurves {
    pub curves: BTreeMap<String, KaplanMeierCurve>,
    pub skipped: Vec<SkippedStratum>,
}

impl StratifiedCurves {
    /// split by label, fit each stratum on its own subset. strata below
    /// `min_size` are skipped with a warning
    pub fn fit<I>(labelled: I, min_size: usize) -> Self
    where
        I: IntoIterator<Item = (String, ObservationWindow)>,
    {
        let mut groups: BTreeMap<String, Vec<ObservationWindow>> = BTreeMap::new();
        for (label, window) in labelled {
            groups.entry(label).or_default().push(window);
        }

        let mut out = Self::default();
        for (label, windows) in groups {
            if windows.len() < min_size {
                let skipped = SkippedStratum {
                    label,
                    observed: windows.len(),
                    minimum: min_size,
                };
                warn!(error = %skipped.to_error(), "skipping stratum");
                out.skipped.push(skipped);
                continue;
            }
            match KaplanMeierCurve::fit(&windows) {
                Ok(curve) => {
                    out.curves.insert(label, curve);
                }
                Err(err) => warn!(stratum = %label, error = %err, "stratum fit failed"),
            }
        }
        out
    }

    pub fn get(&self, label: &str) -> Option<&KaplanMeierCurve> {
        self.curves.get(label)
    }

    pub fn summaries(&self, probe_years: f64) -> BTreeMap<String, SurvivalSummary> {
        self.curves
            .iter()
            .map(|(label, curve)| (label.clone(), curve.summary(probe_years)))
            .collect()
    }
}
