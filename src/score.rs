use std::collections::{BTreeMap, HashSet};
use std::fmt;

use log::warn;
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::populations::UNKNOWN_POPULATION;

/// Theoretical ceiling on diploid observed heterozygosity (p = q = 0.5).
pub const DIPLOID_HET_CEILING: f64 = 0.5;

/// Literature heterozygosity fallback for populations the panel does not
/// list.
pub const DEFAULT_LITERATURE_HET: f64 = 0.25;

/// UNKNOWN fraction above which the representation index is withheld.
const UNKNOWN_FRACTION_LIMIT: f64 = 0.5;

static GLOBAL_PANEL: Lazy<ReferencePanel> = Lazy::new(|| {
    let proportions = [
        ("AFR", 0.17),
        ("AMR", 0.13),
        ("EAS", 0.22),
        ("EUR", 0.16),
        ("SAS", 0.26),
        ("OCE", 0.005),
        ("MID", 0.06),
    ];
    let continents = [
        ("AFR", "Africa"),
        ("AMR", "Americas"),
        ("EAS", "East Asia"),
        ("EUR", "Europe"),
        ("SAS", "South Asia"),
        ("OCE", "Oceania"),
        ("MID", "Middle East"),
    ];
    let literature_het = [
        ("AFR", 0.35),
        ("AMR", 0.28),
        ("EAS", 0.25),
        ("EUR", 0.27),
        ("SAS", 0.26),
        ("OCE", 0.30),
        ("MID", 0.28),
        (UNKNOWN_POPULATION, 0.25),
    ];
    ReferencePanel::new(
        proportions
            .iter()
            .map(|&(p, v)| (p.to_string(), v))
            .collect(),
        continents
            .iter()
            .map(|&(p, c)| (p.to_string(), c.to_string()))
            .collect(),
        literature_het
            .iter()
            .map(|&(p, v)| (p.to_string(), v))
            .collect(),
    )
});

/// Read-only reference configuration for the composer and resolver:
/// expected global population proportions, continental grouping, and
/// published per-population heterozygosity estimates for runs without
/// genotype data.
#[derive(Debug, Clone)]
pub struct ReferencePanel {
    proportions: BTreeMap<String, f64>,
    continents: BTreeMap<String, String>,
    literature_het: BTreeMap<String, f64>,
}

impl ReferencePanel {
    pub fn new(
        proportions: BTreeMap<String, f64>,
        continents: BTreeMap<String, String>,
        literature_het: BTreeMap<String, f64>,
    ) -> Self {
        ReferencePanel {
            proportions,
            continents,
            literature_het,
        }
    }

    /// The built-in panel: approximate continental proportions from the
    /// 1000 Genomes Project, seven continental groups.
    pub fn global() -> &'static ReferencePanel {
        &GLOBAL_PANEL
    }

    pub fn is_reference_population(&self, label: &str) -> bool {
        self.proportions.contains_key(label)
    }

    pub fn proportions(&self) -> impl Iterator<Item = (&str, f64)> {
        self.proportions.iter().map(|(label, &p)| (label.as_str(), p))
    }

    /// Reference proportion for a label, matched case-sensitively.
    pub fn reference_proportion(&self, label: &str) -> Option<f64> {
        self.proportions.get(label).copied()
    }

    /// Continental group for a label, matched uppercase.
    pub fn continent_of(&self, label: &str) -> Option<&str> {
        self.continents.get(&label.to_uppercase()).map(String::as_str)
    }

    /// Number of distinct continental groups the panel covers.
    pub fn n_continental_groups(&self) -> usize {
        self.continents.values().collect::<HashSet<_>>().len()
    }

    /// Published observed-heterozygosity estimate for a label (uppercase
    /// match), falling back to a neutral default.
    pub fn literature_heterozygosity(&self, label: &str) -> f64 {
        self.literature_het
            .get(&label.to_uppercase())
            .copied()
            .unwrap_or(DEFAULT_LITERATURE_HET)
    }
}

/// Component weights for the composite score. Applied exactly as given,
/// never renormalized to sum to 1, so extreme custom weights can push the
/// score outside the usual 0-100 range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreWeights {
    pub representation: f64,
    pub heterozygosity: f64,
    pub fst_coverage: f64,
    pub geographic_spread: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        ScoreWeights {
            representation: 0.35,
            heterozygosity: 0.25,
            fst_coverage: 0.20,
            geographic_spread: 0.20,
        }
    }
}

/// Representation index with its reliability context. `index` is `None`
/// when it could not be trusted (no samples, or too many UNKNOWN); the
/// numeric score substitutes 0 for that case but the `None` is preserved
/// in every reported breakdown.
#[derive(Debug, Clone)]
pub struct RepresentationIndex {
    pub index: Option<f64>,
    pub unknown_fraction: f64,
    pub warning: Option<String>,
}

/// How closely the cohort's population proportions track the reference
/// panel: 1 minus the worst absolute deviation, clamped to [0,1].
pub fn representation_index(
    counts: &BTreeMap<String, usize>,
    panel: &ReferencePanel,
) -> RepresentationIndex {
    let total: usize = counts.values().sum();
    if total == 0 {
        return RepresentationIndex {
            index: None,
            unknown_fraction: 0.0,
            warning: Some("No samples provided.".to_string()),
        };
    }

    let unknown = counts.get(UNKNOWN_POPULATION).copied().unwrap_or(0);
    let unknown_fraction = unknown as f64 / total as f64;

    if unknown_fraction > UNKNOWN_FRACTION_LIMIT {
        return RepresentationIndex {
            index: None,
            unknown_fraction,
            warning: Some(format!(
                "{:.1}% of samples have UNKNOWN population. Representation index is \
                 unreliable and was not computed. Provide a population map to resolve.",
                unknown_fraction * 100.0
            )),
        };
    }

    let mut max_deviation = 0.0f64;
    for (population, reference) in panel.proportions() {
        let observed = counts
            .get(population)
            .map_or(0.0, |&n| n as f64 / total as f64);
        max_deviation = max_deviation.max((observed - reference).abs());
    }
    let index = (1.0 - max_deviation).max(0.0);

    let warning = if unknown_fraction > 0.0 {
        Some(format!(
            "{:.1}% of samples have UNKNOWN population. Representation index may \
             be affected.",
            unknown_fraction * 100.0
        ))
    } else {
        None
    };

    RepresentationIndex {
        index: Some(index),
        unknown_fraction,
        warning,
    }
}

/// Mean observed heterozygosity over populations with a defined value,
/// relative to the diploid ceiling, capped at 1. Populations whose
/// heterozygosity is undefined are excluded; if none is defined the
/// balance is 0.
pub fn heterozygosity_balance(observed: &BTreeMap<String, Option<f64>>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for value in observed.values().flatten() {
        sum += value;
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    let mean = sum / count as f64;
    (mean / DIPLOID_HET_CEILING).min(1.0)
}

/// Fraction of possible population pairs with a defined FST, capped at 1;
/// 0 when fewer than two populations exist.
pub fn fst_coverage(n_populations: usize, computed_pairs: usize) -> f64 {
    let possible = n_populations * n_populations.saturating_sub(1) / 2;
    if possible == 0 {
        0.0
    } else {
        (computed_pairs as f64 / possible as f64).min(1.0)
    }
}

/// Fraction of the panel's continental groups represented among the given
/// population labels (uppercase match).
pub fn geographic_spread<'a>(
    labels: impl IntoIterator<Item = &'a str>,
    panel: &ReferencePanel,
) -> f64 {
    let total = panel.n_continental_groups();
    if total == 0 {
        return 0.0;
    }
    let mut represented: HashSet<&str> = HashSet::new();
    for label in labels {
        if let Some(continent) = panel.continent_of(label) {
            represented.insert(continent);
        }
    }
    represented.len() as f64 / total as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Rating {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl Rating {
    pub fn from_score(score: f64) -> Rating {
        if score >= 80.0 {
            Rating::Excellent
        } else if score >= 60.0 {
            Rating::Good
        } else if score >= 40.0 {
            Rating::Fair
        } else if score >= 20.0 {
            Rating::Poor
        } else {
            Rating::Critical
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            Rating::Excellent => "Excellent",
            Rating::Good => "Good",
            Rating::Fair => "Fair",
            Rating::Poor => "Poor",
            Rating::Critical => "Critical",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreComponents {
    pub representation_index: Option<f64>,
    pub heterozygosity_balance: f64,
    pub fst_coverage: f64,
    pub geographic_spread: f64,
}

/// The composite equity score and everything needed to explain it.
#[derive(Debug, Clone, Serialize)]
pub struct HeimScore {
    pub score: f64,
    pub rating: Rating,
    pub components: ScoreComponents,
    pub weights: ScoreWeights,
    pub n_samples: usize,
    pub n_populations: usize,
    pub population_counts: BTreeMap<String, usize>,
    pub unknown_fraction: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Combines the sub-scores into the weighted 0-100 composite.
///
/// `n_populations` counts every label present, UNKNOWN included. An
/// undefined representation index contributes 0 to the weighted sum while
/// staying `None` in the reported components.
pub fn compose_heim_score(
    counts: &BTreeMap<String, usize>,
    observed_het: &BTreeMap<String, Option<f64>>,
    computed_fst_pairs: usize,
    weights: ScoreWeights,
    panel: &ReferencePanel,
) -> HeimScore {
    let n_samples: usize = counts.values().sum();
    let n_populations = counts.len();

    let representation = representation_index(counts, panel);
    if let Some(text) = &representation.warning {
        warn!("{}", text);
    }
    let representation_for_score = representation.index.unwrap_or(0.0);

    let balance = heterozygosity_balance(observed_het);
    let coverage = fst_coverage(n_populations, computed_fst_pairs);
    let spread = geographic_spread(counts.keys().map(String::as_str), panel);

    let score = 100.0
        * (weights.representation * representation_for_score
            + weights.heterozygosity * balance
            + weights.fst_coverage * coverage
            + weights.geographic_spread * spread);

    HeimScore {
        score,
        rating: Rating::from_score(score),
        components: ScoreComponents {
            representation_index: representation.index,
            heterozygosity_balance: balance,
            fst_coverage: coverage,
            geographic_spread: spread,
        },
        weights,
        n_samples,
        n_populations,
        population_counts: counts.clone(),
        unknown_fraction: representation.unknown_fraction,
        warning: representation.warning,
    }
}
