//! raw rows -> typed marriage records + observation windows
//!
//! this is the single place where "the event" is defined. every estimator
//! downstream reads `ObservationWindow::event` and never re-derives it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    config::{DAYS_PER_YEAR, EventConfig},
    dates::{days_between, parse_optional_date},
    error::{Result, SurvivalError},
};

/// one row as it arrives from the tabular boundary - nothing parsed yet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMarriageRow {
    #[serde(rename = "Celebrity")]
    pub celebrity: Option<String>,
    #[serde(rename = "Spouse")]
    pub spouse: Option<String>,
    #[serde(rename = "Start_Date")]
    pub start_date: Option<String>,
    #[serde(rename = "End_Date")]
    pub end_date: Option<String>,
    #[serde(rename = "End_Cause")]
    pub end_cause: Option<String>,
    #[serde(rename = "Celebrity_Birth")]
    pub celebrity_birth: Option<String>,
    #[serde(rename = "Spouse_Birth")]
    pub spouse_birth: Option<String>,
    #[serde(rename = "Celebrity_Fame_Score")]
    pub celebrity_fame_score: Option<f64>,
    #[serde(rename = "Spouse_Fame_Score")]
    pub spouse_fame_score: Option<f64>,
    #[serde(rename = "Career_Start_Year")]
    pub career_start: Option<String>,
    #[serde(rename = "Children_Count")]
    pub children_count: Option<f64>,
    #[serde(rename = "Awards_Count")]
    pub awards_count: Option<f64>,
    #[serde(rename = "Occupation")]
    pub occupation: Option<String>,
    #[serde(rename = "Country")]
    pub country: Option<String>,
}

impl RawMarriageRow {
    /// minimal row: start, optional end, optional cause
    pub fn new(start: &str, end: Option<&str>, cause: Option<&str>) -> Self {
        Self {
            start_date: Some(start.to_string()),
            end_date: end.map(str::to_string),
            end_cause: cause.map(str::to_string),
            ..Self::default()
        }
    }
}

/// parsed record - dates are real dates, bad numbers are gone
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarriageRecord {
    pub celebrity: String,
    pub spouse: String,
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
    pub end_cause: Option<String>,
    pub celebrity_birth: Option<NaiveDate>,
    pub spouse_birth: Option<NaiveDate>,
    pub celebrity_fame_score: Option<f64>,
    pub spouse_fame_score: Option<f64>,
    pub career_start: Option<NaiveDate>,
    pub children_count: Option<u32>,
    pub awards_count: Option<u32>,
    pub occupation: Option<String>,
    pub country: Option<String>,
}

/// did the marriage end in a dissolution we can see?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventStatus {
    Observed,
    Censored,
}

impl EventStatus {
    pub fn is_observed(self) -> bool {
        matches!(self, Self::Observed)
    }

    /// 1.0 / 0.0 indicator for rates and regressions
    pub fn indicator(self) -> f64 {
        if self.is_observed() { 1.0 } else { 0.0 }
    }
}

/// (duration, event) pair - the only thing the estimators see
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ObservationWindow {
    duration_years: f64,
    event: EventStatus,
}

impl ObservationWindow {
    /// duration must be positive & finite
    pub fn new(duration_years: f64, event: EventStatus) -> Result<Self> {
        if !(duration_years > 0.0 && duration_years.is_finite()) {
            return Err(SurvivalError::invalid_input(format!(
                "observation duration must be positive & finite, got {duration_years}"
            )));
        }
        Ok(Self {
            duration_years,
            event,
        })
    }

    pub fn duration_years(&self) -> f64 {
        self.duration_years
    }

    pub fn event(&self) -> EventStatus {
        self.event
    }

    pub fn is_event(&self) -> bool {
        self.event.is_observed()
    }
}

/// keyword-driven event classification
#[derive(Debug, Clone, PartialEq)]
pub struct EventClassifier {
    keywords: Vec<String>, // lowercased
}

impl EventClassifier {
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &EventConfig) -> Self {
        Self::new(&config.censoring_keywords)
    }

    /// no end date -> censored (ongoing); cause mentions a censoring keyword
    /// -> censored (ended for another reason); anything else -> observed
    pub fn classify(&self, end_date_present: bool, cause: Option<&str>) -> EventStatus {
        if !end_date_present {
            return EventStatus::Censored;
        }
        let cause = cause.map(str::to_lowercase).unwrap_or_default();
        if self.keywords.iter().any(|k| cause.contains(k.as_str())) {
            EventStatus::Censored
        } else {
            EventStatus::Observed
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

impl Default for EventClassifier {
    fn default() -> Self {
        Self::from_config(&EventConfig::default())
    }
}

/// a record that survived normalization, with its window attached
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    record: MarriageRecord,
    duration_days: i64,
    window: ObservationWindow,
}

impl NormalizedRecord {
    pub fn record(&self) -> &MarriageRecord {
        &self.record
    }

    pub fn duration_days(&self) -> i64 {
        self.duration_days
    }

    pub fn window(&self) -> ObservationWindow {
        self.window
    }

    pub fn duration_years(&self) -> f64 {
        self.window.duration_years()
    }

    pub fn is_event(&self) -> bool {
        self.window.is_event()
    }
}

/// why rows got dropped, aggregated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExclusionReport {
    pub total_rows: usize,
    pub retained: usize,
    pub missing_start_date: usize,
    pub non_positive_duration: usize,
}

impl ExclusionReport {
    pub fn excluded(&self) -> usize {
        self.missing_start_date + self.non_positive_duration
    }

    fn record(&mut self, err: &SurvivalError) {
        match err {
            SurvivalError::MissingRequiredField { .. } => self.missing_start_date += 1,
            SurvivalError::InvalidDuration { .. } => self.non_positive_duration += 1,
            _ => {}
        }
    }
}

/// output of one normalization pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedTable {
    pub records: Vec<NormalizedRecord>,
    pub exclusions: ExclusionReport,
    pub as_of: Option<NaiveDate>,
}

impl NormalizedTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn windows(&self) -> Vec<ObservationWindow> {
        self.records.iter().map(NormalizedRecord::window).collect()
    }
}

/// turns raw rows into normalized records. `as_of` stands in for "now" when
/// a marriage has no end date.
#[derive(Debug, Clone)]
pub struct Normalizer {
    classifier: EventClassifier,
    as_of: NaiveDate,
}

impl Normalizer {
    pub fn new(config: &EventConfig, as_of: NaiveDate) -> Self {
        Self {
            classifier: EventClassifier::from_config(config),
            as_of,
        }
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn classifier(&self) -> &EventClassifier {
        &self.classifier
    }

    /// normalize one row. errors here are exclusions, not failures
    pub fn normalize_row(&self, row: &RawMarriageRow) -> Result<NormalizedRecord> {
        let start = parse_optional_date(row.start_date.as_deref())
            .ok_or_else(|| SurvivalError::missing_required_field("Start_Date"))?;
        let end = parse_optional_date(row.end_date.as_deref());

        let observed_end = end.unwrap_or(self.as_of);
        let duration_days = days_between(start, observed_end);
        if duration_days <= 0 {
            return Err(SurvivalError::InvalidDuration {
                days: duration_days,
            });
        }

        let end_cause = clean_text(row.end_cause.as_deref());
        let event = self.classifier.classify(end.is_some(), end_cause.as_deref());
        let window = ObservationWindow::new(duration_days as f64 / DAYS_PER_YEAR, event)?;

        let record = MarriageRecord {
            celebrity: clean_text(row.celebrity.as_deref()).unwrap_or_default(),
            spouse: clean_text(row.spouse.as_deref()).unwrap_or_default(),
            start,
            end,
            end_cause,
            celebrity_birth: parse_optional_date(row.celebrity_birth.as_deref()),
            spouse_birth: parse_optional_date(row.spouse_birth.as_deref()),
            celebrity_fame_score: finite(row.celebrity_fame_score),
            spouse_fame_score: finite(row.spouse_fame_score),
            career_start: parse_optional_date(row.career_start.as_deref()),
            children_count: count(row.children_count),
            awards_count: count(row.awards_count),
            occupation: clean_text(row.occupation.as_deref()),
            country: clean_text(row.country.as_deref()),
        };

        Ok(NormalizedRecord {
            record,
            duration_days,
            window,
        })
    }

    /// normalize a whole table, counting exclusions instead of failing
    pub fn normalize(&self, rows: &[RawMarriageRow]) -> NormalizedTable {
        let mut exclusions = ExclusionReport {
            total_rows: rows.len(),
            ..ExclusionReport::default()
        };
        let mut records = Vec::with_capacity(rows.len());

        for (i, row) in rows.iter().enumerate() {
            match self.normalize_row(row) {
                Ok(rec) => records.push(rec),
                Err(err) => {
                    debug!(row = i, error = %err, "excluding row");
                    exclusions.record(&err);
                }
            }
        }
        exclusions.retained = records.len();

        info!(
            total = exclusions.total_rows,
            retained = exclusions.retained,
            missing_start = exclusions.missing_start_date,
            bad_duration = exclusions.non_positive_duration,
            "normalized marriage records"
        );

        NormalizedTable {
            records,
            exclusions,
            as_of: Some(self.as_of),
        }
    }
}

fn clean_text(raw: Option<&str>) -> Option<String> {
    let s = raw?.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(s.to_string())
    }
}

fn finite(x: Option<f64>) -> Option<f64> {
    x.filter(|v| v.is_finite())
}

fn count(x: Option<f64>) -> Option<u32> {
    x.filter(|v| v.is_finite() && *v >= 0.0 && *v <= u32::MAX as f64)
        .map(|v| v.round() as u32)
}
