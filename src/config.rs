//! analysis configuration - every tunable constant lives here, shared by all estimators
//!
//! loads from toml; anything left out keeps its default.
//!
//! ```toml
//! [features]
//! famous_spouse_threshold = 25.0
//!
//! [survival]
//! min_stratum_size = 10
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SurvivalError};

/// fixed average-year length used for every day -> year conversion
pub const DAYS_PER_YEAR: f64 = 365.25;

/// top-level config, one section per pipeline stage
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub event: EventConfig,
    pub features: FeatureConfig,
    pub survival: SurvivalConfig,
    pub cox: CoxConfig,
    pub logistic: LogisticConfig,
    pub comparison: ComparisonGroupConfig,
    pub strata: StrataConfig,
}

/// what counts as "the event"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// end-cause keywords that censor instead of counting as a dissolution
    /// (case-insensitive substring match)
    pub censoring_keywords: Vec<String>,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            censoring_keywords: vec!["death".to_string(), "widow".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// spouse fame score strictly above this marks a famous spouse
    pub famous_spouse_threshold: f64,
    /// debut strictly before this age marks a child star
    pub child_star_age: f64,
    /// debut ages outside (min, max) are treated as bad data
    pub min_debut_age: f64,
    pub max_debut_age: f64,
    /// age gaps at or above this are dropped from age-gap stratified output
    pub age_gap_cutoff: f64,
    /// bin edges for the age-gap strata, ascending
    pub age_gap_bins: Vec<f64>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            famous_spouse_threshold: 20.0,
            child_star_age: 16.0,
            min_debut_age: 0.0,
            max_debut_age: 80.0,
            age_gap_cutoff: 60.0,
            age_gap_bins: vec![0.0, 5.0, 10.0, 20.0, 100.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurvivalConfig {
    /// strata smaller than this are skipped
    pub min_stratum_size: usize,
    /// horizon (years) reported as S(t) in summaries
    pub probe_years: f64,
}

impl Default for SurvivalConfig {
    fn default() -> Self {
        Self {
            min_stratum_size: 5,
            probe_years: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoxConfig {
    pub max_iterations: usize,
    pub tolerance: f64,
    pub l2_penalty: f64,
}

impl Default for CoxConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-9,
            l2_penalty: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticConfig {
    /// marriages lasting at most this many years count as "short"
    pub short_marriage_years: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
    /// ridge penalty on slopes (intercept never penalized); 0 = plain mle
    pub l2_penalty: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            short_marriage_years: 5.0,
            max_iterations: 100,
            tolerance: 1e-9,
            l2_penalty: 0.0,
        }
    }
}

/// synthetic "general population" group. illustrative parameters, not
/// validated survival data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonGroupConfig {
    pub size: usize,
    pub weibull_shape: f64,
    pub weibull_scale: f64,
    pub max_years: f64,
    pub divorce_scale: f64,
    pub divorce_shape: f64,
    pub seed: u64,
}

impl Default for ComparisonGroupConfig {
    fn default() -> Self {
        Self {
            size: 3000,
            weibull_shape: 1.5,
            weibull_scale: 15.0,
            max_years: 60.0,
            divorce_scale: 20.0,
            divorce_shape: 1.2,
            seed: 42,
        }
    }
}

/// categorical strata built from free text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    /// countries matched by case-insensitive substring
    pub target_countries: Vec<String>,
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            target_countries: vec![
                "United States".to_string(),
                "United Kingdom".to_string(),
                "India".to_string(),
                "France".to_string(),
            ],
        }
    }
}

impl AnalysisConfig {
    /// parse from toml text, then validate
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| SurvivalError::config(format!("toml parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SurvivalError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<()> {
        let f = &self.features;
        if !(f.famous_spouse_threshold.is_finite()) {
            return Err(invalid("features.famous_spouse_threshold", f.famous_spouse_threshold));
        }
        if !(f.child_star_age > 0.0) {
            return Err(invalid("features.child_star_age", f.child_star_age));
        }
        if !(f.min_debut_age < f.max_debut_age) {
            return Err(SurvivalError::invalid_parameter(
                "features.min_debut_age..max_debut_age",
                format!("{}..{}", f.min_debut_age, f.max_debut_age),
            ));
        }
        if !(f.age_gap_cutoff > 0.0) {
            return Err(invalid("features.age_gap_cutoff", f.age_gap_cutoff));
        }
        if f.age_gap_bins.len() < 2 || f.age_gap_bins.windows(2).any(|w| !(w[0] < w[1])) {
            return Err(SurvivalError::invalid_parameter(
                "features.age_gap_bins",
                format!("{:?}", f.age_gap_bins),
            ));
        }
        if self.survival.min_stratum_size == 0 {
            return Err(invalid("survival.min_stratum_size", 0));
        }
        if !(self.survival.probe_years >= 0.0) {
            return Err(invalid("survival.probe_years", self.survival.probe_years));
        }
        if !(self.logistic.short_marriage_years > 0.0) {
            return Err(invalid(
                "logistic.short_marriage_years",
                self.logistic.short_marriage_years,
            ));
        }
        if self.cox.l2_penalty < 0.0 || self.logistic.l2_penalty < 0.0 {
            return Err(SurvivalError::invalid_parameter(
                "l2_penalty",
                format!("cox={} logistic={}", self.cox.l2_penalty, self.logistic.l2_penalty),
            ));
        }
        let c = &self.comparison;
        if !(c.weibull_shape > 0.0 && c.weibull_scale > 0.0 && c.divorce_scale > 0.0) {
            return Err(SurvivalError::invalid_parameter(
                "comparison",
                format!(
                    "shape={} scale={} divorce_scale={}",
                    c.weibull_shape, c.weibull_scale, c.divorce_scale
                ),
            ));
        }
        if !(c.max_years > 0.0) {
            return Err(invalid("comparison.max_years", c.max_years));
        }
        Ok(())
    }
}

fn invalid(parameter: &str, value: impl ToString) -> SurvivalError {
    SurvivalError::invalid_parameter(parameter, value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.features.famous_spouse_threshold, 20.0);
        assert_eq!(config.features.child_star_age, 16.0);
        assert_eq!(config.features.age_gap_cutoff, 60.0);
        assert_eq!(config.logistic.short_marriage_years, 5.0);
        assert_eq!(config.event.censoring_keywords, vec!["death", "widow"]);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AnalysisConfig::from_toml(
            r#"
            [features]
            famous_spouse_threshold = 30.0

            [survival]
            min_stratum_size = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.features.famous_spouse_threshold, 30.0);
        assert_eq!(config.features.child_star_age, 16.0);
        assert_eq!(config.survival.min_stratum_size, 10);
        assert_eq!(config.comparison.size, 3000);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = AnalysisConfig::from_toml("[features\nfoo = ").unwrap_err();
        assert!(matches!(err, SurvivalError::Config { .. }));
    }

    #[test]
    fn test_unsorted_bins_rejected() {
        let err = AnalysisConfig::from_toml("[features]\nage_gap_bins = [0.0, 10.0, 5.0]")
            .unwrap_err();
        assert!(matches!(err, SurvivalError::InvalidParameter { .. }));
    }

    #[test]
    fn test_non_positive_comparison_cap_rejected() {
        for cap in ["0.0", "-3.0", "nan"] {
            let err = AnalysisConfig::from_toml(&format!("[comparison]\nmax_years = {cap}"))
                .unwrap_err();
            assert!(matches!(err, SurvivalError::InvalidParameter { .. }), "{cap}");
        }
    }

    #[test]
    fn test_zero_stratum_size_rejected() {
        let mut config = AnalysisConfig::default();
        config.survival.min_stratum_size = 0;
        assert!(config.validate().is_err());
    }
}
