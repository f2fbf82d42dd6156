//! run the full study and print the findings
//!
//! ```text
//! cargo run --example celebrity_study -- [rows.json] [config.toml]
//! RUST_LOG=marriage_survival=debug cargo run --example celebrity_study
//! ```
//!
//! `rows.json` is an array of objects keyed by the table's column names
//! (`Celebrity`, `Start_Date`, `End_Date`, `End_Cause`, ...).

use std::path::Path;

use chrono::Local;
use marriage_survival::{
    AnalysisConfig, MarriageStudy, RawMarriageRow, study::Stratification,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let rows: Vec<RawMarriageRow> = match args.next() {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => sample_rows(),
    };
    let config = match args.next() {
        Some(path) => AnalysisConfig::from_path(Path::new(&path))?,
        None => AnalysisConfig::default(),
    };
    let probe = config.survival.probe_years;

    let study = MarriageStudy::new(config)?;
    let report = study.run(&rows, Local::now().date_naive());

    println!("Celebrity Marriage Survival Study");
    println!("=================================\n");

    let check = &report.data_check;
    println!("records: {} (excluded {})", check.total_records, report.exclusions.excluded());
    if let Some(median) = check.median_ended_duration {
        println!("median duration of ended marriages: {median:.2} years");
    }
    println!("most married:");
    for (name, count) in &check.most_married {
        println!("  {name:<30} {count}");
    }
    println!("shortest ended marriages:");
    for m in &check.shortest_ended {
        println!("  {} & {}: {} days (from {})", m.celebrity, m.spouse, m.duration_days, m.start);
    }
    println!();

    match report.overall.completed() {
        Some(overall) => {
            let s = &overall.summary;
            println!("overall: n={} divorces={}", s.n_observations, s.n_events);
            match s.median_survival {
                Some(m) => println!("  median survival: {m:.2} years"),
                None => println!("  median survival: not reached"),
            }
            println!("  S({probe}) = {:.3}", s.survival_at_probe);
        }
        None => println!("overall: {:?}", report.overall.error()),
    }
    println!();

    println!("{:<20} {:>6} {:>10} {:>10}", "age gap", "n", "div rate", "median");
    for g in report.age_gap_groups.iter().chain(&report.spouse_type_groups) {
        println!(
            "{:<20} {:>6} {:>10} {:>10}",
            g.label,
            g.count,
            g.event_rate.map_or("-".into(), |r| format!("{r:.3}")),
            g.median_duration.map_or("-".into(), |m| format!("{m:.2}")),
        );
    }
    println!();

    for which in Stratification::ALL {
        let Some(strata) = report.stratified(which) else {
            continue;
        };
        println!("kaplan-meier by {which:?}:");
        for (label, s) in strata.summaries(probe) {
            let median = s
                .median_survival
                .map_or("not reached".to_string(), |m| format!("{m:.2}y"));
            println!(
                "  {label:<20} n={:<5} median={median:<12} S({probe})={:.3}",
                s.n_observations, s.survival_at_probe
            );
        }
        for skipped in &strata.curves.skipped {
            println!("  {} skipped ({} < {})", skipped.label, skipped.observed, skipped.minimum);
        }
    }
    println!();

    match report.cox.completed() {
        Some(cox) => println!("{}", cox.summary),
        None => println!("cox model failed: {:?}\n", report.cox.error()),
    }
    match report.logistic.completed() {
        Some(logit) => println!("{}", logit.summary),
        None => println!("logistic model failed: {:?}\n", report.logistic.error()),
    }

    if let Some(cmp) = report.comparison.completed() {
        println!("celebrities vs simulated population");
        println!("  celebrity median:  {:?}", cmp.celebrities.median_duration);
        println!("  population median: {:?}", cmp.population.median_duration);
        if let Some(penalty) = cmp.fame_penalty_years {
            println!("  fame penalty: {penalty:.2} years");
        }
    }

    Ok(())
}

fn sample_rows() -> Vec<RawMarriageRow> {
    let raw = [
        ("Liz", "Conrad", "1950-05-06", Some("1951-01-29"), Some("divorce"), "1932-02-27", "1926-07-06"),
        ("Liz", "Michael", "1952-02-21", Some("1957-01-26"), Some("divorce"), "1932-02-27", "1912-04-12"),
        ("Liz", "Mike", "1957-02-02", Some("1958-03-22"), Some("death of spouse"), "1932-02-27", "1909-04-22"),
        ("Liz", "Eddie", "1959-05-12", Some("1964-03-06"), Some("divorce"), "1932-02-27", "1928-08-29"),
        ("Liz", "Richard", "1964-03-15", Some("1974-06-26"), Some("divorce"), "1932-02-27", "1925-11-10"),
        ("Paul", "Joanne", "1958-01-29", None, None, "1925-01-26", "1930-02-27"),
        ("Tom", "Rita", "1988-04-30", None, None, "1956-07-09", "1956-10-25"),
        ("Kim", "Kris", "2011-08-20", Some("2013-06-06"), Some("divorce"), "1980-10-21", "1985-02-23"),
        ("Kim", "Kanye", "2014-05-24", Some("2022-11-29"), Some("divorce"), "1980-10-21", "1977-06-08"),
        ("Britney", "Jason", "2004-01-03", Some("2004-01-05"), Some("annulment"), "1981-12-02", "1981-05-30"),
        ("Britney", "Kevin", "2004-10-06", Some("2007-07-30"), Some("divorce"), "1981-12-02", "1978-03-31"),
        ("Johnny", "Amber", "2015-02-03", Some("2017-01-13"), Some("divorce"), "1963-06-09", "1986-04-22"),
        ("Jennifer", "Brad", "2000-07-29", Some("2005-10-02"), Some("divorce"), "1969-02-11", "1963-12-18"),
        ("Jennifer", "Justin", "2015-08-05", Some("2018-02-15"), Some("divorce"), "1969-02-11", "1971-05-28"),
        ("Denzel", "Pauletta", "1983-06-25", None, None, "1954-12-28", "1951-08-15"),
        ("Meryl", "Don", "1978-09-30", None, None, "1949-06-22", "1949-01-01"),
    ];
    raw.iter()
        .map(|&(celeb, spouse, start, end, cause, cb, sb)| RawMarriageRow {
            celebrity: Some(celeb.to_string()),
            spouse: Some(spouse.to_string()),
            celebrity_birth: Some(cb.to_string()),
            spouse_birth: Some(sb.to_string()),
            ..RawMarriageRow::new(start, end, cause)
        })
        .collect()
}
