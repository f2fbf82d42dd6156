//! tolerant date parsing - bad input becomes `None`, never an error

use chrono::NaiveDate;

use crate::config::DAYS_PER_YEAR;

/// parse a date field the way the source tables write them
///
/// accepts `YYYY-MM-DD`, wikidata timestamps (`+1999-05-01T00:00:00Z`),
/// datetime columns (`2000-01-01 00:00:00`), `YYYY-MM` and bare `YYYY`. partial dates snap to the first day of the
/// period. blanks, null sentinels and garbage give `None`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() || is_missing_sentinel(s) {
        return None;
    }

    // drop the time part of a timestamp and any explicit era sign
    let s = s.split(|c| c == 'T' || c == ' ').next().unwrap_or(s);
    let s = s.strip_prefix('+').unwrap_or(s);

    let mut parts = s.split('-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = match parts.next() {
        Some(m) => m.parse().ok()?,
        None => 1,
    };
    let day: u32 = match parts.next() {
        Some(d) => d.parse().ok()?,
        None => 1,
    };
    if parts.next().is_some() {
        return None;
    }

    // wikidata uses month/day 00 for year-precision dates
    NaiveDate::from_ymd_opt(year, month.max(1), day.max(1))
}

/// parse an optional field; `None` and unparseable both come back as `None`
pub fn parse_optional_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(parse_date)
}

/// signed whole days from `from` to `to`
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// signed fractional years from `from` to `to`, using the fixed average year
pub fn years_between(from: NaiveDate, to: NaiveDate) -> f64 {
    days_between(from, to) as f64 / DAYS_PER_YEAR
}

fn is_missing_sentinel(s: &str) -> bool {
    matches!(
        s.to_ascii_lowercase().as_str(),
        "nan" | "nat" | "null" | "none" | "na" | "n/a"
    )
}
