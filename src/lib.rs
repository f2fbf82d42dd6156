//! # marriage survival
//!
//! survival analysis for celebrity marriages - how long do they last, and what
//! makes them end sooner?
//!
//! ## what you get
//!
//! - tolerant record normalization w/ right-censoring (ongoing & widowed = censored)
//! - derived covariates: age gap, fame gap, child star, kids, profession, country
//! - kaplan-meier curves, plain or stratified, with greenwood CIs
//! - cox proportional hazards (efron ties, newton-raphson, optional ridge)
//! - logistic "short marriage" risk model
//! - a seeded synthetic comparison group
//!
//! ## quick start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use marriage_survival::{AnalysisConfig, MarriageStudy, RawMarriageRow};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rows = vec![
//!     RawMarriageRow::new("2000-01-01", Some("2005-01-01"), Some("divorce")),
//!     RawMarriageRow::new("2000-01-01", None, None), // still married
//!     RawMarriageRow::new("2000-01-01", Some("2010-01-01"), Some("death of spouse")),
//! ];
//!
//! let study = MarriageStudy::new(AnalysisConfig::default())?;
//! let report = study.run(&rows, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
//!
//! assert_eq!(report.exclusions.retained, 3);
//! if let Some(overall) = report.overall.completed() {
//!     println!("median marriage: {:?} years", overall.summary.median_survival);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! every estimator can also be used on its own - see [`KaplanMeierCurve`],
//! [`CoxModel`] and [`LogisticModel`].

pub mod comparison;
pub mod config;
pub mod data;
pub mod dates;
pub mod error;
pub mod features;
pub mod kaplan_meier;
pub mod linalg;
pub mod logistic;
pub mod metrics;
pub mod model;
pub mod optimization;
pub mod record;
pub mod study;
pub mod summary;

pub use config::AnalysisConfig;
pub use data::SurvivalData;
pub use error::{Result, SurvivalError};
pub use features::{Covariate, CovariateSet, FeatureDeriver, MissingPolicy};
pub use kaplan_meier::{KaplanMeierCurve, StratifiedCurves};
pub use logistic::LogisticModel;
pub use model::{CoxFit, CoxModel};
pub use record::{EventClassifier, EventStatus, Normalizer, ObservationWindow, RawMarriageRow};
pub use study::{MarriageStudy, StudyReport};
