use approx::assert_relative_eq;
use chrono::{Duration, NaiveDate};
use marriage_survival::{
    AnalysisConfig, CoxModel, Covariate, EventStatus, FeatureDeriver, KaplanMeierCurve,
    LogisticModel, MarriageStudy, MissingPolicy, Normalizer, ObservationWindow, RawMarriageRow,
    StratifiedCurves, SurvivalData, SurvivalError,
    logistic::BinaryOutcomeData,
    metrics::ModelMetrics,
    study::{COX_COVARIATES, LOGISTIC_COVARIATES, Stratification},
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

/// hazard goes up for child stars & big age gaps, down with each kid
fn create_synthetic_rows(n: usize, seed: u64) -> Vec<RawMarriageRow> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = Vec::with_capacity(n);

    for i in 0..n {
        let child_star = rng.gen_bool(0.3);
        let kids: u32 = rng.gen_range(0..5);
        let awards: u32 = rng.gen_range(0..4);
        let gap: i32 = rng.gen_range(0..25);

        let birth_year: i32 = rng.gen_range(1940..1980);
        let debut_age: i32 = if child_star {
            rng.gen_range(6..15)
        } else {
            rng.gen_range(18..40)
        };
        let start = NaiveDate::from_ymd_opt(
            birth_year + rng.gen_range(20..35),
            rng.gen_range(1..=12),
            rng.gen_range(1..=28),
        )
        .unwrap();

        let hazard = 0.08
            * (0.9 * f64::from(u8::from(child_star)) - 0.15 * f64::from(kids)
                + 0.06 * f64::from(gap))
            .exp();
        let u = rng.r#gen::<f64>().max(1e-12);
        let years = -u.ln() / hazard;
        let end = start + Duration::days(((years * 365.25) as i64).clamp(1, 36_500));

        let (end_date, cause) = if end < as_of() {
            let cause = if rng.gen_bool(0.1) { "death" } else { "divorce" };
            (Some(end.to_string()), Some(cause.to_string()))
        } else {
            (None, None)
        };

        rows.push(RawMarriageRow {
            celebrity: Some(format!("celebrity {}", i % (n / 3).max(1))),
            spouse: Some(format!("spouse {i}")),
            start_date: Some(start.to_string()),
            end_date,
            end_cause: cause,
            celebrity_birth: Some(format!("{birth_year}-03-15")),
            spouse_birth: Some(format!("{}-03-15", birth_year + gap)),
            celebrity_fame_score: Some(rng.gen_range(10.0..100.0)),
            spouse_fame_score: Some(rng.gen_range(0.0..60.0)),
            career_start: Some(format!("{}", birth_year + debut_age)),
            children_count: Some(f64::from(kids)),
            awards_count: Some(f64::from(awards)),
            occupation: Some(if i % 2 == 0 { "actor" } else { "singer" }.to_string()),
            country: Some(
                ["United States of America", "United Kingdom", "India", "France"][i % 4]
                    .to_string(),
            ),
        });
    }
    rows
}

fn derived(rows: &[RawMarriageRow]) -> Vec<marriage_survival::features::DerivedRecord> {
    let config = AnalysisConfig::default();
    let table = Normalizer::new(&config.event, as_of()).normalize(rows);
    FeatureDeriver::new(&config.features, &config.strata).derive_table(&table)
}

#[test]
fn test_censoring_scenario() {
    let rows = vec![
        RawMarriageRow::new("2000-01-01", Some("2005-01-01"), Some("divorce")),
        RawMarriageRow::new("2000-01-01", None, None),
        RawMarriageRow::new("2000-01-01", Some("2010-01-01"), Some("death of spouse")),
    ];
    let table = Normalizer::new(&AnalysisConfig::default().event, as_of()).normalize(&rows);
    assert_eq!(table.len(), 3);

    let durations: Vec<f64> = table.records.iter().map(|r| r.duration_years()).collect();
    assert_relative_eq!(durations[0], 5.0, epsilon = 0.01);
    assert!(durations[1] >= 24.0);
    assert_relative_eq!(durations[2], 10.0, epsilon = 0.01);

    let events: Vec<EventStatus> = table.records.iter().map(|r| r.window().event()).collect();
    assert_eq!(
        events,
        [EventStatus::Observed, EventStatus::Censored, EventStatus::Censored]
    );

    for rec in &table.records {
        assert!(rec.duration_days() > 0);
        assert_relative_eq!(rec.duration_years(), rec.duration_days() as f64 / 365.25);
    }
}

#[test]
fn test_kaplan_meier_properties() {
    let rows = create_synthetic_rows(400, 11);
    let table = Normalizer::new(&AnalysisConfig::default().event, as_of()).normalize(&rows);
    let curve = KaplanMeierCurve::fit(&table.windows()).unwrap();

    assert_eq!(curve.survival_at(0.0), 1.0);
    let grid: Vec<f64> = (0..=120).map(|i| f64::from(i) * 0.5).collect();
    let values = curve.survival_at_many(&grid);
    assert!(values.iter().all(|s| (0.0..=1.0).contains(s)));
    assert!(values.windows(2).all(|w| w[1] <= w[0]));

    // median is the first time the curve reaches 0.5
    if let Some(median) = curve.median_survival() {
        assert!(curve.survival_at(median) <= 0.5);
        assert!(curve.survival_at(median - 1e-9) > 0.5);
    }

    for ((lo, s), hi) in curve.ci_lower.iter().zip(&curve.survival).zip(&curve.ci_upper) {
        assert!(*lo <= *s + 1e-12 && *s <= *hi + 1e-12);
    }
}

#[test]
fn test_kaplan_meier_without_events_stays_at_one() {
    let windows: Vec<ObservationWindow> = [1.0, 2.0, 7.5, 30.0]
        .iter()
        .map(|&t| ObservationWindow::new(t, EventStatus::Censored).unwrap())
        .collect();
    let curve = KaplanMeierCurve::fit(&windows).unwrap();
    for t in [0.0, 1.0, 5.0, 100.0] {
        assert_eq!(curve.survival_at(t), 1.0);
    }
    assert_eq!(curve.median_survival(), None);
}

#[test]
fn test_stratified_curves_start_at_one() {
    let records = derived(&create_synthetic_rows(300, 5));
    let deriver = FeatureDeriver::new(
        &AnalysisConfig::default().features,
        &AnalysisConfig::default().strata,
    );
    let labelled = records.iter().filter_map(|r| {
        Stratification::Country
            .label(&deriver, r)
            .map(|label| (label, r.normalized().window()))
    });
    let strata = StratifiedCurves::fit(labelled, 5);

    assert_eq!(strata.curves.len(), 4);
    assert!(strata.get("United States").is_some());
    for curve in strata.curves.values() {
        assert_eq!(curve.survival_at(0.0), 1.0);
    }
}

#[test]
fn test_cox_recovers_effect_directions() {
    let records = derived(&create_synthetic_rows(800, 42));
    let (data, dropped) =
        SurvivalData::from_records(&records, &COX_COVARIATES, MissingPolicy::Exclude).unwrap();
    assert_eq!(dropped, 0);

    let fit = CoxModel::new().fit(&data).unwrap();
    let summary = fit.summary().unwrap();

    let child = summary.get("is_child_star").unwrap();
    assert!(child.coefficient > 0.0, "child star coef = {}", child.coefficient);
    assert!(child.p_value < 0.05);

    let kids = summary.get("children_count").unwrap();
    assert!(kids.coefficient < 0.0, "kids coef = {}", kids.coefficient);

    for c in &summary.coefficients {
        assert!(c.hazard_ratio > 0.0);
        assert!(c.hazard_ratio_lower <= c.hazard_ratio && c.hazard_ratio <= c.hazard_ratio_upper);
        assert!((0.0..=1.0).contains(&c.p_value));
    }
    assert!(summary.log_likelihood >= summary.null_log_likelihood);
    assert!(summary.concordance > 0.5);
}

#[test]
fn test_cox_metrics_and_predictions() {
    let records = derived(&create_synthetic_rows(300, 321));
    let (data, _) =
        SurvivalData::from_records(&records, &COX_COVARIATES, MissingPolicy::Exclude).unwrap();
    let fit = CoxModel::new().with_l2_penalty(0.01).fit(&data).unwrap();

    let risk = fit.predict(data.covariates()).unwrap();
    let metrics = ModelMetrics::compute(&data, risk.view(), 3).unwrap();
    assert!(metrics.c_index > 0.3 && metrics.c_index <= 1.0);
    assert!(metrics.log_likelihood.is_finite());
    assert!(metrics.aic > 0.0 && metrics.bic > 0.0);

    let ratios = fit.predict_hazard_ratios(data.covariates()).unwrap();
    assert!(ratios.iter().all(|&r| r > 0.0 && r.is_finite()));

    let survival = fit
        .predict_survival(data.covariates(), ndarray::array![0.0, 5.0, 10.0, 20.0].view())
        .unwrap();
    for row in survival.rows() {
        assert_relative_eq!(row[0], 1.0);
        assert!(row.iter().all(|s| (0.0..=1.0).contains(s)));
        assert!(row[1] >= row[2] && row[2] >= row[3]);
    }
}

#[test]
fn test_cox_rejects_missing_covariates() {
    let mut rows = create_synthetic_rows(50, 3);
    rows[0].children_count = None;
    let records = derived(&rows);

    let (data, dropped) =
        SurvivalData::from_records(&records, &COX_COVARIATES, MissingPolicy::Exclude).unwrap();
    assert_eq!(dropped, 1);
    assert_eq!(data.n_samples(), records.len() - 1);

    // missing values slipped in by hand fail the fit table itself
    let covariates = ndarray::Array2::from_shape_vec((2, 1), vec![1.0, f64::NAN]).unwrap();
    let err = SurvivalData::new(vec![1.0, 2.0], vec![true, true], covariates, vec!["x".into()])
        .unwrap_err();
    assert!(matches!(err, SurvivalError::InvalidInput { .. }));
}

#[test]
fn test_logistic_short_marriage_model() {
    let records = derived(&create_synthetic_rows(1500, 7));
    let (data, counts) = BinaryOutcomeData::short_marriage(
        &records,
        &LOGISTIC_COVARIATES,
        MissingPolicy::ImputeZero,
        5.0,
    )
    .unwrap();
    assert_eq!(counts.missing_covariates, 0);
    assert_eq!(counts.kept + counts.unknown_label, records.len());

    // censored before 5 years never gets a label
    let unknown = records
        .iter()
        .filter(|r| !r.normalized().is_event() && r.normalized().duration_years() <= 5.0)
        .count();
    assert_eq!(counts.unknown_label, unknown);

    let fit = LogisticModel::new().fit(&data).unwrap();
    let summary = fit.summary().unwrap();
    let gap = summary.get(Covariate::AgeGap.name()).unwrap();
    assert!(gap.coefficient > 0.0, "age gap coef = {}", gap.coefficient);
    assert!(gap.odds_ratio > 1.0);
    for c in &summary.coefficients {
        assert!(c.coefficient.is_finite());
        assert!((0.0..=1.0).contains(&c.p_value));
    }

    let probs = fit.predict_proba(data.covariates()).unwrap();
    assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
}

#[test]
fn test_full_study() {
    let rows = create_synthetic_rows(600, 2024);
    let study = MarriageStudy::new(AnalysisConfig::default()).unwrap();
    let report = study.run(&rows, as_of());

    assert_eq!(report.exclusions.total_rows, 600);
    assert!(report.overall.is_completed());
    assert!(report.cox.is_completed(), "{:?}", report.cox.error());
    assert!(report.logistic.is_completed(), "{:?}", report.logistic.error());
    assert!(report.comparison.is_completed());

    let age_rows: usize = report.age_gap_groups.iter().map(|g| g.count).sum();
    assert_eq!(age_rows, report.exclusions.retained);
    for g in report.age_gap_groups.iter().chain(&report.spouse_type_groups) {
        if let Some(rate) = g.event_rate {
            assert!((0.0..=1.0).contains(&rate));
        }
    }

    for which in Stratification::ALL {
        let strata = report.stratified(which).unwrap();
        assert!(!strata.curves.curves.is_empty(), "{which:?} has no curves");
    }

    let r = report.correlation.get("duration_years", "duration_years").unwrap();
    assert_relative_eq!(r, 1.0, epsilon = 1e-12);

    assert_eq!(report.data_check.most_married.len(), 5);

    // the whole thing has to survive serialization
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["cox"]["status"], "completed");
    assert!(json["overall"]["result"]["summary"]["n_observations"].is_u64());
}

#[test]
fn test_study_from_toml_config() {
    let config = AnalysisConfig::from_toml(
        r#"
        [survival]
        min_stratum_size = 1000

        [event]
        censoring_keywords = ["death", "widow", "annul"]
        "#,
    )
    .unwrap();
    let study = MarriageStudy::new(config).unwrap();
    let report = study.run(&create_synthetic_rows(200, 9), as_of());

    // every stratum is below the minimum now
    for which in Stratification::ALL {
        let strata = report.stratified(which).unwrap();
        assert!(strata.curves.curves.is_empty());
    }
    assert!(report.overall.is_completed());
}
