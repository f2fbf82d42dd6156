//! celebrities vs a simulated general population
//!
//! The population is a seeded Weibull draw with a duration-dependent divorce
//! probability. The numbers are illustrative, so every parameter is config.

use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Weibull};
use serde::Serialize;
use tracing::info;

use crate::{
    config::ComparisonGroupConfig,
    error::{Result, SurvivalError},
    kaplan_meier::{KaplanMeierCurve, SurvivalSummary},
    record::{EventStatus, ObservationWindow},
    summary::median,
};

/// simulated comparison cohort
#[derive(Debug, Clone)]
pub struct ComparisonGroup {
    config: ComparisonGroupConfig,
}

impl ComparisonGroup {
    pub fn new(config: &ComparisonGroupConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// P(divorce | lasted t years)
    pub fn divorce_probability(&self, years: f64) -> f64 {
        let c = &self.config;
        1.0 - (-(years / c.divorce_scale).powf(c.divorce_shape)).exp()
    }

    /// same seed, same cohort
    pub fn generate(&self) -> Result<Vec<ObservationWindow>> {
        let c = &self.config;
        // every draw would be capped to <= 0 and redrawn forever
        if !(c.max_years > 0.0) {
            return Err(SurvivalError::invalid_parameter(
                "comparison.max_years",
                c.max_years.to_string(),
            ));
        }
        let weibull = Weibull::new(c.weibull_scale, c.weibull_shape).map_err(|e| {
            SurvivalError::invalid_parameter(
                "comparison.weibull",
                format!("scale={} shape={}: {e}", c.weibull_scale, c.weibull_shape),
            )
        })?;
        let mut rng = StdRng::seed_from_u64(c.seed);

        let mut windows = Vec::with_capacity(c.size);
        while windows.len() < c.size {
            let years = weibull.sample(&mut rng).min(c.max_years);
            // a zero draw has no window; redraw
            if years <= 0.0 {
                continue;
            }
            let divorced = rng.r#gen::<f64>() < self.divorce_probability(years);
            let status = if divorced {
                EventStatus::Observed
            } else {
                EventStatus::Censored
            };
            windows.push(ObservationWindow::new(years, status)?);
        }
        Ok(windows)
    }
}

/// one side of the comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortSummary {
    pub survival: SurvivalSummary,
    /// plain median of durations, censoring ignored
    pub median_duration: Option<f64>,
}

impl CohortSummary {
    fn from_windows(windows: &[ObservationWindow], probe_years: f64) -> Result<Self> {
        let curve = KaplanMeierCurve::fit(windows)?;
        let durations: Vec<f64> = windows.iter().map(|w| w.duration_years()).collect();
        Ok(Self {
            survival: curve.summary(probe_years),
            median_duration: median(&durations),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub celebrities: CohortSummary,
    pub population: CohortSummary,
    /// population median minus celebrity median, in years.
    /// positive = celebrity marriages are shorter
    pub fame_penalty_years: Option<f64>,
}

impl ComparisonReport {
    pub fn compute(
        celebrities: &[ObservationWindow],
        config: &ComparisonGroupConfig,
        probe_years: f64,
    ) -> Result<Self> {
        let population = ComparisonGroup::new(config).generate()?;
        let celebrities = CohortSummary::from_windows(celebrities, probe_years)?;
        let population = CohortSummary::from_windows(&population, probe_years)?;

        let fame_penalty_years = match (population.median_duration, celebrities.median_duration) {
            (Some(p), Some(c)) => Some(p - c),
            _ => None,
        };

        info!(
            celebrity_median = ?celebrities.median_duration,
            population_median = ?population.median_duration,
            fame_penalty = ?fame_penalty_years,
            "compared against simulated population"
        );

        Ok(Self {
            celebrities,
            population,
            fame_penalty_years,
        })
    }
}
