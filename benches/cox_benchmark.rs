use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use marriage_survival::{
    CoxModel, EventStatus, KaplanMeierCurve, LogisticModel, ObservationWindow, SurvivalData,
    logistic::BinaryOutcomeData,
};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn generate_synthetic_data(n_samples: usize, n_features: usize) -> SurvivalData {
    let mut rng = StdRng::seed_from_u64(42);

    let mut covariates_vec = Vec::with_capacity(n_samples * n_features);
    for _ in 0..(n_samples * n_features) {
        covariates_vec.push(rng.gen_range(-2.0..2.0));
    }
    let covariates = Array2::from_shape_vec((n_samples, n_features), covariates_vec).unwrap();

    let mut times = Vec::with_capacity(n_samples);
    let mut events = Vec::with_capacity(n_samples);

    let true_coefficients = Array1::from(vec![0.5, -0.3, 0.2]);

    for i in 0..n_samples {
        let n_coef = n_features.min(3);
        let linear_pred: f64 = covariates
            .row(i)
            .slice(ndarray::s![0..n_coef])
            .dot(&true_coefficients.slice(ndarray::s![0..n_coef]));

        // years until divorce, censored by the observation window
        let hazard = 0.1 * linear_pred.exp();
        let time = (-rng.r#gen::<f64>().max(1e-12).ln() / hazard).max(0.1);
        let censoring_time = rng.gen_range(1.0..30.0);

        if time < censoring_time {
            times.push(time);
            events.push(true);
        } else {
            times.push(censoring_time);
            events.push(false);
        }
    }

    let names = (0..n_features).map(|j| format!("x{j}")).collect();
    SurvivalData::new(times, events, covariates, names).unwrap()
}

fn windows(data: &SurvivalData) -> Vec<ObservationWindow> {
    data.times()
        .iter()
        .zip(data.events())
        .map(|(&t, &e)| {
            let status = if e {
                EventStatus::Observed
            } else {
                EventStatus::Censored
            };
            ObservationWindow::new(t, status).unwrap()
        })
        .collect()
}

fn benchmark_cox_fitting(c: &mut Criterion) {
    let mut group = c.benchmark_group("cox_fitting");

    for &n_samples in [100, 500, 2000].iter() {
        for &n_features in [3, 6].iter() {
            group.bench_with_input(
                BenchmarkId::from_parameter(format!("{}x{}", n_samples, n_features)),
                &(n_samples, n_features),
                |b, &(n_samples, n_features)| {
                    let data = generate_synthetic_data(n_samples, n_features);
                    let model = CoxModel::new().with_max_iterations(100);
                    b.iter(|| model.fit(black_box(&data)).unwrap());
                },
            );
        }
    }
    group.finish();
}

fn benchmark_ridge_fitting(c: &mut Criterion) {
    let mut group = c.benchmark_group("ridge_fitting");

    let data = generate_synthetic_data(500, 6);

    for &l2_penalty in [0.0, 0.1, 1.0].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("l2_{}", l2_penalty)),
            &l2_penalty,
            |b, &l2_penalty| {
                let model = CoxModel::new().with_l2_penalty(l2_penalty);
                b.iter(|| model.fit(black_box(&data)).unwrap());
            },
        );
    }
    group.finish();
}

fn benchmark_kaplan_meier(c: &mut Criterion) {
    let mut group = c.benchmark_group("kaplan_meier");

    for &n_samples in [500, 3000, 10000].iter() {
        let data = generate_synthetic_data(n_samples, 3);
        let windows = windows(&data);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_samples", n_samples)),
            &windows,
            |b, windows| b.iter(|| KaplanMeierCurve::fit(black_box(windows)).unwrap()),
        );
    }
    group.finish();
}

fn benchmark_logistic(c: &mut Criterion) {
    let data = generate_synthetic_data(2000, 3);
    let targets: Vec<bool> = data.times().iter().map(|&t| t <= 5.0).collect();
    let table = BinaryOutcomeData::new(
        data.covariates().to_owned(),
        targets,
        data.feature_names().to_vec(),
    )
    .unwrap();
    let model = LogisticModel::new();

    c.bench_function("logistic_2000x3", |b| {
        b.iter(|| model.fit(black_box(&table)).unwrap())
    });
}

fn benchmark_metrics_computation(c: &mut Criterion) {
    let mut group = c.benchmark_group("metrics");

    let data = generate_synthetic_data(1000, 3);
    let fit = CoxModel::new().fit(&data).unwrap();
    let risk_scores = fit.predict(data.covariates()).unwrap();

    group.bench_function("harrell_c_index", |b| {
        b.iter(|| {
            marriage_survival::metrics::harrell_c_index(
                black_box(risk_scores.view()),
                black_box(data.times()),
                black_box(data.events()),
            )
            .unwrap();
        });
    });

    group.bench_function("log_likelihood", |b| {
        b.iter(|| {
            marriage_survival::metrics::log_partial_likelihood(
                black_box(&data),
                black_box(risk_scores.view()),
            )
            .unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_cox_fitting,
    benchmark_ridge_fitting,
    benchmark_kaplan_meier,
    benchmark_logistic,
    benchmark_metrics_computation
);

criterion_main!(benches);
