//! the whole analysis in one call
//!
//! normalize -> derive -> every estimator on the same derived table. each
//! sub-analysis carries its own outcome, so a singular cox fit doesn't cost
//! you the kaplan-meier tables.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use tracing::{info, warn};

use crate::{
    comparison::ComparisonReport,
    config::AnalysisConfig,
    data::SurvivalData,
    error::{Result, SurvivalError},
    features::{Covariate, DerivedRecord, FeatureDeriver, MissingPolicy},
    kaplan_meier::{KaplanMeierCurve, StratifiedCurves, SurvivalSummary},
    logistic::{BinaryOutcomeCounts, BinaryOutcomeData, LogisticModel, LogisticSummary},
    model::{CoxModel, CoxModelSummary},
    record::{ExclusionReport, Normalizer, ObservationWindow, RawMarriageRow},
    summary::{CorrelationMatrix, DataCheck, GroupSummary, group_summaries},
};

/// covariates of the psycho-economic cox model
pub const COX_COVARIATES: [Covariate; 3] = [
    Covariate::ChildStar,
    Covariate::ChildrenCount,
    Covariate::AwardsCount,
];

/// covariates of the short-marriage classifier
pub const LOGISTIC_COVARIATES: [Covariate; 3] = [
    Covariate::AgeGap,
    Covariate::FameGap,
    Covariate::FamousSpouse,
];

const DATA_CHECK_TOP_N: usize = 5;

/// result of one sub-analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum AnalysisOutcome<T> {
    Completed(T),
    Failed {
        #[serde(serialize_with = "serialize_display")]
        error: SurvivalError,
    },
}

impl<T> AnalysisOutcome<T> {
    /// wrap a result, logging the failure under `analysis`
    pub fn from_result(analysis: &str, result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Completed(value),
            Err(error) => {
                warn!(analysis, %error, "analysis failed");
                Self::Failed { error }
            }
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn completed(&self) -> Option<&T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&SurvivalError> {
        match self {
            Self::Completed(_) => None,
            Self::Failed { error } => Some(error),
        }
    }
}

fn serialize_display<S: Serializer>(
    error: &SurvivalError,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.collect_str(error)
}

/// unstratified curve + headline numbers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallSurvival {
    pub summary: SurvivalSummary,
    pub curve: KaplanMeierCurve,
}

/// the categorical splits the study stratifies by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stratification {
    AgeGap,
    SpouseType,
    ChildStar,
    Children,
    Profession,
    Country,
}

impl Stratification {
    pub const ALL: [Stratification; 6] = [
        Self::AgeGap,
        Self::SpouseType,
        Self::ChildStar,
        Self::Children,
        Self::Profession,
        Self::Country,
    ];

    /// stratum label for one record, `None` = not part of this split
    pub fn label(self, deriver: &FeatureDeriver, rec: &DerivedRecord) -> Option<String> {
        let set = rec.covariates();
        match self {
            Self::AgeGap => {
                if !deriver.within_age_gap_cutoff(set) {
                    return None;
                }
                set.age_gap.and_then(|gap| deriver.age_gap_bin(gap))
            }
            Self::SpouseType => Some(deriver.spouse_type(set).to_string()),
            Self::ChildStar => set.is_child_star.map(|child| {
                if child { "Child Star" } else { "Adult Debut" }.to_string()
            }),
            Self::Children => set.children_bucket.map(|b| b.label().to_string()),
            Self::Profession => set.profession.map(|p| p.label().to_string()),
            Self::Country => set.country.clone(),
        }
    }
}

/// one stratified kaplan-meier analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StratifiedAnalysis {
    pub stratification: Stratification,
    pub curves: StratifiedCurves,
}

impl StratifiedAnalysis {
    pub fn summaries(&self, probe_years: f64) -> BTreeMap<String, SurvivalSummary> {
        self.curves.summaries(probe_years)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoxReport {
    pub rows_used: usize,
    pub rows_dropped: usize,
    pub summary: CoxModelSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogisticReport {
    pub threshold_years: f64,
    pub rows: BinaryOutcomeCounts,
    pub summary: LogisticSummary,
}

/// everything the study computed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudyReport {
    pub as_of: NaiveDate,
    pub exclusions: ExclusionReport,
    pub data_check: DataCheck,
    pub overall: AnalysisOutcome<OverallSurvival>,
    pub age_gap_groups: Vec<GroupSummary>,
    pub spouse_type_groups: Vec<GroupSummary>,
    pub strata: Vec<StratifiedAnalysis>,
    pub cox: AnalysisOutcome<CoxReport>,
    pub logistic: AnalysisOutcome<LogisticReport>,
    pub correlation: CorrelationMatrix,
    pub comparison: AnalysisOutcome<ComparisonReport>,
}

impl StudyReport {
    pub fn stratified(&self, which: Stratification) -> Option<&StratifiedAnalysis> {
        self.strata.iter().find(|s| s.stratification == which)
    }
}

/// runs every analysis over one table
#[derive(Debug, Clone)]
pub struct MarriageStudy {
    config: AnalysisConfig,
    deriver: FeatureDeriver,
}

impl MarriageStudy {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        let deriver = FeatureDeriver::new(&config.features, &config.strata);
        Ok(Self { config, deriver })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// run on `rows`, with open marriages observed up to `as_of`
    pub fn run(&self, rows: &[RawMarriageRow], as_of: NaiveDate) -> StudyReport {
        let table = Normalizer::new(&self.config.event, as_of).normalize(rows);
        let records = self.deriver.derive_table(&table);
        let probe = self.config.survival.probe_years;

        let overall = AnalysisOutcome::from_result(
            "overall kaplan-meier",
            KaplanMeierCurve::fit(&table.windows()).map(|curve| OverallSurvival {
                summary: curve.summary(probe),
                curve,
            }),
        );

        let age_gap_groups = group_summaries(
            &self.deriver.age_gap_bin_labels(),
            self.labelled(&records, Stratification::AgeGap),
        );
        let spouse_type_groups = group_summaries(
            &["Famous Spouse".to_string(), "Non-Famous Spouse".to_string()],
            self.labelled(&records, Stratification::SpouseType),
        );

        let strata = Stratification::ALL
            .iter()
            .map(|&which| StratifiedAnalysis {
                stratification: which,
                curves: StratifiedCurves::fit(
                    self.labelled(&records, which),
                    self.config.survival.min_stratum_size,
                ),
            })
            .collect();

        let cox = AnalysisOutcome::from_result("cox", self.fit_cox(&records));
        let logistic = AnalysisOutcome::from_result("logistic", self.fit_logistic(&records));

        let divorced_inliers: Vec<DerivedRecord> = records
            .iter()
            .filter(|r| {
                r.normalized().is_event() && self.deriver.within_age_gap_cutoff(r.covariates())
            })
            .cloned()
            .collect();
        let correlation = CorrelationMatrix::duration_age_fame(&divorced_inliers);

        let comparison = AnalysisOutcome::from_result(
            "comparison group",
            ComparisonReport::compute(&table.windows(), &self.config.comparison, probe),
        );

        info!(
            records = table.len(),
            excluded = table.exclusions.excluded(),
            cox = cox.is_completed(),
            logistic = logistic.is_completed(),
            "study finished"
        );

        let data_check = DataCheck::compute(&table, DATA_CHECK_TOP_N);
        StudyReport {
            as_of,
            exclusions: table.exclusions,
            data_check,
            overall,
            age_gap_groups,
            spouse_type_groups,
            strata,
            cox,
            logistic,
            correlation,
            comparison,
        }
    }

    fn labelled<'a>(
        &'a self,
        records: &'a [DerivedRecord],
        which: Stratification,
    ) -> impl Iterator<Item = (String, ObservationWindow)> + 'a {
        records.iter().filter_map(move |rec| {
            which
                .label(&self.deriver, rec)
                .map(|label| (label, rec.normalized().window()))
        })
    }

    fn fit_cox(&self, records: &[DerivedRecord]) -> Result<CoxReport> {
        let (data, rows_dropped) =
            SurvivalData::from_records(records, &COX_COVARIATES, MissingPolicy::Exclude)?;
        let fit = CoxModel::from_config(&self.config.cox).fit(&data)?;
        Ok(CoxReport {
            rows_used: data.n_samples(),
            rows_dropped,
            summary: fit.summary()?,
        })
    }

    fn fit_logistic(&self, records: &[DerivedRecord]) -> Result<LogisticReport> {
        let threshold = self.config.logistic.short_marriage_years;
        let (data, rows) = BinaryOutcomeData::short_marriage(
            records,
            &LOGISTIC_COVARIATES,
            MissingPolicy::ImputeZero,
            threshold,
        )?;
        let fit = LogisticModel::from_config(&self.config.logistic).fit(&data)?;
        Ok(LogisticReport {
            threshold_years: threshold,
            rows,
            summary: fit.summary()?,
        })
    }
}
