//! descriptive tables - per-group divorce rates, correlations, data checks

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use crate::{
    features::DerivedRecord,
    record::{NormalizedTable, ObservationWindow},
};

/// median with the usual even-length average. `None` for no data
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// count / divorce rate / median duration for one group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub label: String,
    pub count: usize,
    pub event_rate: Option<f64>,
    pub median_duration: Option<f64>,
}

impl GroupSummary {
    pub fn from_windows(label: impl Into<String>, windows: &[ObservationWindow]) -> Self {
        let count = windows.len();
        let events = windows.iter().filter(|w| w.is_event()).count();
        let durations: Vec<f64> = windows.iter().map(|w| w.duration_years()).collect();
        Self {
            label: label.into(),
            count,
            event_rate: (count > 0).then(|| events as f64 / count as f64),
            median_duration: median(&durations),
        }
    }
}

/// one summary per group. `order` fixes the row order and keeps empty groups;
/// labels not in `order` are appended alphabetically
pub fn group_summaries<I>(order: &[String], labelled: I) -> Vec<GroupSummary>
where
    I: IntoIterator<Item = (String, ObservationWindow)>,
{
    let mut groups: BTreeMap<String, Vec<ObservationWindow>> = BTreeMap::new();
    for (label, window) in labelled {
        groups.entry(label).or_default().push(window);
    }

    let mut out: Vec<GroupSummary> = order
        .iter()
        .map(|label| {
            let windows = groups.remove(label).unwrap_or_default();
            GroupSummary::from_windows(label.clone(), &windows)
        })
        .collect();
    out.extend(
        groups
            .into_iter()
            .map(|(label, windows)| GroupSummary::from_windows(label, &windows)),
    );
    out
}

/// pearson's r. `None` when fewer than two pairs or a column is constant
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some(sxy / (sxx * syy).sqrt())
}

/// symmetric correlation table, pairwise-complete
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub variables: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
    pub n_records: usize,
}

impl CorrelationMatrix {
    /// duration vs age gap vs fame gap over the given records
    pub fn duration_age_fame(records: &[DerivedRecord]) -> Self {
        let columns: Vec<(&str, Vec<Option<f64>>)> = vec![
            (
                "duration_years",
                records
                    .iter()
                    .map(|r| Some(r.normalized().duration_years()))
                    .collect(),
            ),
            ("age_gap", records.iter().map(|r| r.covariates().age_gap).collect()),
            ("fame_gap", records.iter().map(|r| r.covariates().fame_gap).collect()),
        ];
        Self::from_columns(&columns, records.len())
    }

    fn from_columns(columns: &[(&str, Vec<Option<f64>>)], n_records: usize) -> Self {
        let k = columns.len();
        let mut values = vec![vec![None; k]; k];
        for i in 0..k {
            for j in i..k {
                let (xs, ys): (Vec<f64>, Vec<f64>) = columns[i]
                    .1
                    .iter()
                    .zip(&columns[j].1)
                    .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
                    .unzip();
                let r = pearson(&xs, &ys);
                values[i][j] = r;
                values[j][i] = r;
            }
        }
        Self {
            variables: columns.iter().map(|(name, _)| name.to_string()).collect(),
            values,
            n_records,
        }
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.variables.iter().position(|v| v == a)?;
        let j = self.variables.iter().position(|v| v == b)?;
        self.values[i][j]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndedMarriage {
    pub celebrity: String,
    pub spouse: String,
    pub start: NaiveDate,
    pub duration_days: i64,
}

/// sanity numbers printed before any modelling
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataCheck {
    pub total_records: usize,
    pub ended_records: usize,
    pub median_ended_duration: Option<f64>,
    pub most_married: Vec<(String, usize)>,
    pub shortest_ended: Vec<EndedMarriage>,
}

impl DataCheck {
    /// "ended" = has an end date, whatever the cause
    pub fn compute(table: &NormalizedTable, top_n: usize) -> Self {
        let ended: Vec<_> = table
            .records
            .iter()
            .filter(|r| r.record().end.is_some())
            .collect();

        let durations: Vec<f64> = ended.iter().map(|r| r.duration_years()).collect();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for rec in &table.records {
            *counts.entry(rec.record().celebrity.as_str()).or_default() += 1;
        }
        let mut most_married: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(name, n)| (name.to_string(), n))
            .collect();
        most_married.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        most_married.truncate(top_n);

        let mut shortest: Vec<EndedMarriage> = ended
            .iter()
            .map(|r| EndedMarriage {
                celebrity: r.record().celebrity.clone(),
                spouse: r.record().spouse.clone(),
                start: r.record().start,
                duration_days: r.duration_days(),
            })
            .collect();
        shortest.sort_by_key(|m| m.duration_days);
        shortest.truncate(top_n);

        Self {
            total_records: table.len(),
            ended_records: ended.len(),
            median_ended_duration: median(&durations),
            most_married,
            shortest_ended: shortest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventConfig;
    use crate::record::{EventStatus, Normalizer, RawMarriageRow};
    use approx::assert_relative_eq;

    fn w(t: f64, event: bool) -> ObservationWindow {
        let status = if event {
            EventStatus::Observed
        } else {
            EventStatus::Censored
        };
        ObservationWindow::new(t, status).unwrap()
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), None);
        assert_relative_eq!(median(&[3.0, 1.0, 2.0]).unwrap(), 2.0);
        assert_relative_eq!(median(&[4.0, 1.0, 2.0, 3.0]).unwrap(), 2.5);
    }

    #[test]
    fn test_group_summaries_keep_order_and_empty_groups() {
        let order = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let rows = vec![
            ("c".to_string(), w(1.0, true)),
            ("a".to_string(), w(2.0, true)),
            ("a".to_string(), w(4.0, false)),
            ("z".to_string(), w(9.0, false)),
        ];
        let out = group_summaries(&order, rows);
        let labels: Vec<_> = out.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, ["a", "b", "c", "z"]);

        assert_eq!(out[0].count, 2);
        assert_relative_eq!(out[0].event_rate.unwrap(), 0.5);
        assert_relative_eq!(out[0].median_duration.unwrap(), 3.0);

        assert_eq!(out[1].count, 0);
        assert_eq!(out[1].event_rate, None);
        assert_eq!(out[1].median_duration, None);
    }

    #[test]
    fn test_pearson() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(pearson(&x, &[2.0, 4.0, 6.0, 8.0]).unwrap(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(pearson(&x, &[8.0, 6.0, 4.0, 2.0]).unwrap(), -1.0, epsilon = 1e-12);
        assert_eq!(pearson(&x, &[1.0; 4]), None);
        assert_eq!(pearson(&[1.0], &[1.0]), None);
    }

    #[test]
    fn test_correlation_pairwise_complete() {
        let columns = vec![
            ("a", vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]),
            ("b", vec![Some(1.0), None, Some(3.0), Some(5.0)]),
        ];
        let m = CorrelationMatrix::from_columns(&columns, 4);
        assert_relative_eq!(m.get("a", "a").unwrap(), 1.0, epsilon = 1e-12);
        // rows 0, 2, 3 -> perfectly linear
        assert_relative_eq!(m.get("a", "b").unwrap(), 1.0, epsilon = 1e-12);
        assert_eq!(m.get("a", "b"), m.get("b", "a"));
        assert_eq!(m.get("a", "nope"), None);
    }

    #[test]
    fn test_data_check() {
        let as_of = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut rows = vec![
            RawMarriageRow::new("2000-01-01", Some("2000-01-31"), Some("divorce")),
            RawMarriageRow::new("2001-01-01", Some("2011-01-01"), Some("death")),
            RawMarriageRow::new("2012-01-01", None, None),
            RawMarriageRow::new("2005-01-01", Some("2006-01-01"), None),
        ];
        for (row, name) in rows.iter_mut().zip(["Liz", "Liz", "Liz", "Bob"]) {
            row.celebrity = Some(name.to_string());
        }
        let table = Normalizer::new(&EventConfig::default(), as_of).normalize(&rows);
        let check = DataCheck::compute(&table, 2);

        assert_eq!(check.total_records, 4);
        // a death still ends the marriage for this view
        assert_eq!(check.ended_records, 3);
        assert_eq!(check.most_married[0], ("Liz".to_string(), 3));
        assert_eq!(check.shortest_ended.len(), 2);
        assert_eq!(check.shortest_ended[0].duration_days, 30);
        assert_eq!(check.shortest_ended[1].celebrity, "Bob");
        assert_relative_eq!(check.median_ended_duration.unwrap(), 365.0 / 365.25, epsilon = 1e-12);
    }
}
