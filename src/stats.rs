use std::collections::BTreeMap;

use itertools::Itertools;
use rayon::prelude::*;

use crate::matrix::GenotypeMatrix;
use crate::populations::PopulationIndex;

/// Minimum total expected heterozygosity for a site to enter the FST sums.
pub const HT_INFORMATIVE_MIN: f64 = 0.001;

/// Per-population alternate-allele frequencies, one entry per variant.
/// `None` marks a site where the population has zero valid calls; it is
/// never collapsed to 0.0.
#[derive(Debug, Clone)]
pub struct AlleleFrequencyTable {
    freqs: BTreeMap<String, Vec<Option<f64>>>,
}

impl AlleleFrequencyTable {
    pub fn populations(&self) -> impl Iterator<Item = &str> {
        self.freqs.keys().map(String::as_str)
    }

    pub fn frequencies(&self, label: &str) -> Option<&[Option<f64>]> {
        self.freqs.get(label).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Option<f64>])> {
        self.freqs
            .iter()
            .map(|(label, freqs)| (label.as_str(), freqs.as_slice()))
    }
}

/// Computes the alternate-allele frequency for every population at every
/// site: allele sum over valid calls divided by twice the valid-call count
/// (diploid). Zero valid calls leaves the site undefined.
pub fn compute_allele_frequencies(
    matrix: &GenotypeMatrix,
    index: &PopulationIndex,
) -> AlleleFrequencyTable {
    let mut freqs = BTreeMap::new();

    for (label, rows) in index.groups() {
        let mut per_site = Vec::with_capacity(matrix.n_variants());
        for v in 0..matrix.n_variants() {
            let mut allele_sum = 0i64;
            let mut valid_calls = 0usize;
            for &row in rows {
                let dosage = matrix.dosage(row, v);
                if dosage >= 0 {
                    allele_sum += i64::from(dosage);
                    valid_calls += 1;
                }
            }
            per_site.push(if valid_calls == 0 {
                None
            } else {
                Some(allele_sum as f64 / (2.0 * valid_calls as f64))
            });
        }
        freqs.insert(label.to_string(), per_site);
    }

    AlleleFrequencyTable { freqs }
}

/// Observed and expected heterozygosity for one population: per-site arrays
/// plus their means over defined sites.
#[derive(Debug, Clone)]
pub struct PopulationHeterozygosity {
    pub observed_per_site: Vec<Option<f64>>,
    pub expected_per_site: Vec<Option<f64>>,
    pub observed: Option<f64>,
    pub expected: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct HeterozygosityTable {
    by_population: BTreeMap<String, PopulationHeterozygosity>,
}

impl HeterozygosityTable {
    pub fn get(&self, label: &str) -> Option<&PopulationHeterozygosity> {
        self.by_population.get(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PopulationHeterozygosity)> {
        self.by_population
            .iter()
            .map(|(label, het)| (label.as_str(), het))
    }

    /// Observed scalar per population, as the composer consumes it.
    pub fn observed_scalars(&self) -> BTreeMap<String, Option<f64>> {
        self.by_population
            .iter()
            .map(|(label, het)| (label.clone(), het.observed))
            .collect()
    }

    /// Wraps externally supplied scalars (literature estimates) in the same
    /// shape the genotype path produces, with empty per-site arrays.
    pub fn from_scalars(scalars: &BTreeMap<String, f64>) -> Self {
        let by_population = scalars
            .iter()
            .map(|(label, &value)| {
                (
                    label.clone(),
                    PopulationHeterozygosity {
                        observed_per_site: Vec::new(),
                        expected_per_site: Vec::new(),
                        observed: Some(value),
                        expected: Some(value),
                    },
                )
            })
            .collect();
        HeterozygosityTable { by_population }
    }
}

/// Computes per-site and mean observed/expected heterozygosity for every
/// population. Observed = heterozygous calls over valid calls; expected =
/// 2p(1-p) from the population's allele frequency. Undefined sites are
/// excluded from the means, and a population with no defined site at all
/// gets an undefined mean.
pub fn compute_heterozygosity(
    matrix: &GenotypeMatrix,
    index: &PopulationIndex,
    freqs: &AlleleFrequencyTable,
) -> HeterozygosityTable {
    let mut by_population = BTreeMap::new();

    for (label, rows) in index.groups() {
        let mut observed_per_site = Vec::with_capacity(matrix.n_variants());
        for v in 0..matrix.n_variants() {
            let mut het_calls = 0usize;
            let mut valid_calls = 0usize;
            for &row in rows {
                let dosage = matrix.dosage(row, v);
                if dosage >= 0 {
                    valid_calls += 1;
                    if dosage == 1 {
                        het_calls += 1;
                    }
                }
            }
            observed_per_site.push(if valid_calls == 0 {
                None
            } else {
                Some(het_calls as f64 / valid_calls as f64)
            });
        }

        let expected_per_site: Vec<Option<f64>> = match freqs.frequencies(label) {
            Some(per_site) => per_site
                .iter()
                .map(|p| p.map(|p| 2.0 * p * (1.0 - p)))
                .collect(),
            None => vec![None; matrix.n_variants()],
        };

        let observed = mean_defined(&observed_per_site);
        let expected = mean_defined(&expected_per_site);

        by_population.insert(
            label.to_string(),
            PopulationHeterozygosity {
                observed_per_site,
                expected_per_site,
                observed,
                expected,
            },
        );
    }

    HeterozygosityTable { by_population }
}

fn mean_defined(values: &[Option<f64>]) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for value in values.iter().flatten() {
        sum += value;
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Symmetric population x population FST matrix. The diagonal is always 0;
/// an off-diagonal `None` means no site was informative for that pair.
#[derive(Debug, Clone)]
pub struct PairwiseFstMatrix {
    labels: Vec<String>,
    values: Vec<Vec<Option<f64>>>,
}

impl PairwiseFstMatrix {
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn n_populations(&self) -> usize {
        self.labels.len()
    }

    pub fn value(&self, i: usize, j: usize) -> Option<f64> {
        self.values[i][j]
    }

    /// Upper-triangle pairs in label order.
    pub fn pairs(&self) -> impl Iterator<Item = ((&str, &str), Option<f64>)> {
        let n = self.labels.len();
        (0..n).flat_map(move |i| {
            (i + 1..n).map(move |j| {
                (
                    (self.labels[i].as_str(), self.labels[j].as_str()),
                    self.values[i][j],
                )
            })
        })
    }

    /// Number of unordered pairs whose FST is defined.
    pub fn computed_pairs(&self) -> usize {
        self.pairs().filter(|(_, value)| value.is_some()).count()
    }
}

/// Computes Nei's Gst between every unordered population pair.
///
/// Pairs are independent, so the loop runs on the rayon pool; each result
/// is keyed by its pair indices and the matrix assembled afterwards, which
/// keeps the output deterministic regardless of scheduling.
pub fn compute_pairwise_fst(
    freqs: &AlleleFrequencyTable,
    index: &PopulationIndex,
) -> PairwiseFstMatrix {
    let labels: Vec<String> = index.labels().map(String::from).collect();
    let n = labels.len();

    let computed: Vec<(usize, usize, Option<f64>)> = (0..n)
        .combinations(2)
        .par_bridge()
        .map(|pair| {
            let (i, j) = (pair[0], pair[1]);
            let freqs_pair = (
                freqs.frequencies(&labels[i]),
                freqs.frequencies(&labels[j]),
            );
            let (p_a, p_b) = match freqs_pair {
                (Some(a), Some(b)) => (a, b),
                _ => return (i, j, None),
            };
            let n_a = index.rows(&labels[i]).map_or(0, <[usize]>::len) as f64;
            let n_b = index.rows(&labels[j]).map_or(0, <[usize]>::len) as f64;
            (i, j, fst_for_pair(p_a, p_b, n_a, n_b))
        })
        .collect();

    let mut values = vec![vec![None; n]; n];
    for (i, row) in values.iter_mut().enumerate() {
        row[i] = Some(0.0);
    }
    for (i, j, fst) in computed {
        values[i][j] = fst;
        values[j][i] = fst;
    }

    PairwiseFstMatrix { labels, values }
}

/// Ratio-of-sums Nei's Gst for one pair.
///
/// Sites where either population's frequency is undefined are skipped; the
/// rest contribute HT-HS and HT to running sums whenever HT clears the
/// informative-site threshold, and the division happens once over the
/// sums. A negative ratio is clamped to 0; no informative site at all
/// leaves the pair undefined.
fn fst_for_pair(p_a: &[Option<f64>], p_b: &[Option<f64>], n_a: f64, n_b: f64) -> Option<f64> {
    let total_n = n_a + n_b;
    if total_n == 0.0 {
        return None;
    }

    let mut numerator_sum = 0.0;
    let mut denominator_sum = 0.0;

    for (site_a, site_b) in p_a.iter().zip(p_b.iter()) {
        let (pa, pb) = match (site_a, site_b) {
            (Some(a), Some(b)) => (*a, *b),
            _ => continue,
        };

        let p_total = (pa * n_a + pb * n_b) / total_n;
        let ht = 2.0 * p_total * (1.0 - p_total);
        if ht > HT_INFORMATIVE_MIN {
            let hs = (n_a * 2.0 * pa * (1.0 - pa) + n_b * 2.0 * pb * (1.0 - pb)) / total_n;
            numerator_sum += ht - hs;
            denominator_sum += ht;
        }
    }

    if denominator_sum > 0.0 {
        Some((numerator_sum / denominator_sum).max(0.0))
    } else {
        None
    }
}
