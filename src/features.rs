//! derived covariates - age gap, fame gap, child star, kids, profession, culture

use std::fmt;

use serde::Serialize;

use crate::{
    config::{FeatureConfig, StrataConfig},
    dates::years_between,
    record::{NormalizedRecord, NormalizedTable},
};

/// children count, binned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ChildrenBucket {
    NoKids,
    OneToTwo,
    ThreePlus,
}

impl ChildrenBucket {
    pub fn from_count(count: u32) -> Self {
        match count {
            0 => Self::NoKids,
            1 | 2 => Self::OneToTwo,
            _ => Self::ThreePlus,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::NoKids => "No Kids",
            Self::OneToTwo => "1-2 Kids",
            Self::ThreePlus => "3+ Kids",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ProfessionGroup {
    Actor,
    Musician,
}

impl ProfessionGroup {
    /// "actor" wins over "musician"/"singer" when both appear
    pub fn from_occupation(occupation: &str) -> Option<Self> {
        let occ = occupation.to_lowercase();
        if occ.contains("actor") {
            Some(Self::Actor)
        } else if occ.contains("musician") || occ.contains("singer") {
            Some(Self::Musician)
        } else {
            None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Actor => "Actor",
            Self::Musician => "Musician",
        }
    }
}

impl fmt::Display for ProfessionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// covariates attached to one observation window. `None` = missing
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CovariateSet {
    pub age_gap: Option<f64>,
    pub fame_gap: Option<f64>,        // both scores known
    pub fame_gap_imputed: f64,        // missing scores treated as 0
    pub is_famous_spouse: Option<bool>,
    pub age_at_debut: Option<f64>,    // only when inside the valid range
    pub is_child_star: Option<bool>,
    pub children_count: Option<u32>,
    pub children_bucket: Option<ChildrenBucket>,
    pub awards_count: Option<u32>,
    pub profession: Option<ProfessionGroup>,
    pub country: Option<String>,      // matched target country
}

/// what to do with a missing covariate when building a fit table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MissingPolicy {
    /// drop the row
    Exclude,
    /// substitute 0 (fame gap: scores are zeroed before subtracting)
    ImputeZero,
}

/// numeric covariates the regression models can use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Covariate {
    AgeGap,
    FameGap,
    FamousSpouse,
    ChildStar,
    ChildrenCount,
    AwardsCount,
}

impl Covariate {
    pub fn name(self) -> &'static str {
        match self {
            Self::AgeGap => "age_gap",
            Self::FameGap => "fame_gap",
            Self::FamousSpouse => "is_famous_spouse",
            Self::ChildStar => "is_child_star",
            Self::ChildrenCount => "children_count",
            Self::AwardsCount => "awards_count",
        }
    }

    pub fn value(self, set: &CovariateSet, policy: MissingPolicy) -> Option<f64> {
        let raw = match self {
            Self::AgeGap => set.age_gap,
            Self::FameGap => set.fame_gap,
            Self::FamousSpouse => set.is_famous_spouse.map(flag),
            Self::ChildStar => set.is_child_star.map(flag),
            Self::ChildrenCount => set.children_count.map(f64::from),
            Self::AwardsCount => set.awards_count.map(f64::from),
        };
        match (raw, policy) {
            (Some(v), _) => Some(v),
            (None, MissingPolicy::Exclude) => None,
            (None, MissingPolicy::ImputeZero) if self == Self::FameGap => {
                Some(set.fame_gap_imputed)
            }
            (None, MissingPolicy::ImputeZero) => Some(0.0),
        }
    }
}

impl fmt::Display for Covariate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn flag(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

/// normalized record + its covariates; built once, read everywhere
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedRecord {
    normalized: NormalizedRecord,
    covariates: CovariateSet,
}

impl DerivedRecord {
    pub fn normalized(&self) -> &NormalizedRecord {
        &self.normalized
    }

    pub fn covariates(&self) -> &CovariateSet {
        &self.covariates
    }
}

/// computes `CovariateSet`s from normalized records
#[derive(Debug, Clone)]
pub struct FeatureDeriver {
    features: FeatureConfig,
    target_countries: Vec<String>,
}

impl FeatureDeriver {
    pub fn new(features: &FeatureConfig, strata: &StrataConfig) -> Self {
        Self {
            features: features.clone(),
            target_countries: strata.target_countries.clone(),
        }
    }

    pub fn derive(&self, rec: &NormalizedRecord) -> CovariateSet {
        let r = rec.record();
        let f = &self.features;

        let age_gap = match (r.celebrity_birth, r.spouse_birth) {
            (Some(a), Some(b)) => Some(years_between(a, b).abs()),
            _ => None,
        };

        let fame_gap = match (r.celebrity_fame_score, r.spouse_fame_score) {
            (Some(a), Some(b)) => Some((a - b).abs()),
            _ => None,
        };
        let fame_gap_imputed =
            (r.celebrity_fame_score.unwrap_or(0.0) - r.spouse_fame_score.unwrap_or(0.0)).abs();
        let is_famous_spouse = r
            .spouse_fame_score
            .map(|s| s > f.famous_spouse_threshold);

        let age_at_debut = match (r.celebrity_birth, r.career_start) {
            (Some(birth), Some(debut)) => Some(years_between(birth, debut)),
            _ => None,
        }
        .filter(|age| *age > f.min_debut_age && *age < f.max_debut_age);
        let is_child_star = age_at_debut.map(|age| age < f.child_star_age);

        CovariateSet {
            age_gap,
            fame_gap,
            fame_gap_imputed,
            is_famous_spouse,
            age_at_debut,
            is_child_star,
            children_count: r.children_count,
            children_bucket: r.children_count.map(ChildrenBucket::from_count),
            awards_count: r.awards_count,
            profession: r.occupation.as_deref().and_then(ProfessionGroup::from_occupation),
            country: r.country.as_deref().and_then(|c| self.match_country(c)),
        }
    }

    pub fn derive_table(&self, table: &NormalizedTable) -> Vec<DerivedRecord> {
        table
            .records
            .iter()
            .map(|rec| DerivedRecord {
                covariates: self.derive(rec),
                normalized: rec.clone(),
            })
            .collect()
    }

    /// first configured target contained in `country` (case-insensitive)
    pub fn match_country(&self, country: &str) -> Option<String> {
        let country = country.to_lowercase();
        self.target_countries
            .iter()
            .find(|t| country.contains(&t.to_lowercase()))
            .cloned()
    }

    /// age gap below the outlier cutoff?
    pub fn within_age_gap_cutoff(&self, set: &CovariateSet) -> bool {
        set.age_gap
            .is_some_and(|gap| gap < self.features.age_gap_cutoff)
    }

    /// label of the age-gap bin; first bin closed on both ends, the rest `(lo, hi]`
    pub fn age_gap_bin(&self, age_gap: f64) -> Option<String> {
        let edges = &self.features.age_gap_bins;
        let last = edges.len().checked_sub(2)?;
        edges.windows(2).enumerate().find_map(|(i, w)| {
            let inside = if i == 0 {
                age_gap >= w[0] && age_gap <= w[1]
            } else {
                age_gap > w[0] && age_gap <= w[1]
            };
            inside.then(|| bin_label(w[0], w[1], i == last))
        })
    }

    pub fn age_gap_bin_labels(&self) -> Vec<String> {
        let edges = &self.features.age_gap_bins;
        let last = edges.len().saturating_sub(2);
        edges
            .windows(2)
            .enumerate()
            .map(|(i, w)| bin_label(w[0], w[1], i == last))
            .collect()
    }

    pub fn spouse_type(&self, set: &CovariateSet) -> &'static str {
        if set.is_famous_spouse.unwrap_or(false) {
            "Famous Spouse"
        } else {
            "Non-Famous Spouse"
        }
    }
}

fn bin_label(lo: f64, hi: f64, last: bool) -> String {
    if last {
        format!("{lo}+ Years")
    } else {
        format!("{lo}-{hi} Years")
    }
}
