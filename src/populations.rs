use std::collections::{BTreeMap, HashMap};

use log::warn;

use crate::score::ReferencePanel;

/// Reserved label for samples no assignment or inference could place.
pub const UNKNOWN_POPULATION: &str = "UNKNOWN";

/// Population label -> ordered sample row indices. Every row index belongs
/// to exactly one label; the union of all groups covers the full sample
/// range. Labels iterate in lexicographic order.
#[derive(Debug, Clone, Default)]
pub struct PopulationIndex {
    groups: BTreeMap<String, Vec<usize>>,
    n_samples: usize,
}

impl PopulationIndex {
    /// Partitions samples into populations.
    ///
    /// With an explicit assignment map, each sample takes its mapped label
    /// verbatim (trimmed); unmapped or empty-labelled samples fall into
    /// UNKNOWN. Without a map, the prefix of the sample name before the
    /// first `_` is uppercased and accepted if the panel knows it as a
    /// reference population, else UNKNOWN.
    pub fn resolve(
        sample_names: &[String],
        assignments: Option<&HashMap<String, String>>,
        panel: &ReferencePanel,
    ) -> Self {
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();

        for (row, name) in sample_names.iter().enumerate() {
            let label = match assignments {
                Some(map) => map
                    .get(name)
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .unwrap_or_else(|| UNKNOWN_POPULATION.to_string()),
                None => infer_from_prefix(name, panel)
                    .unwrap_or_else(|| UNKNOWN_POPULATION.to_string()),
            };
            groups.entry(label).or_default().push(row);
        }

        let index = PopulationIndex {
            groups,
            n_samples: sample_names.len(),
        };

        let unknown = index.unknown_count();
        if unknown > 0 {
            warn!(
                "{}/{} samples ({:.1}%) could not be mapped to a population and were \
                 assigned UNKNOWN. Provide a population map to resolve.",
                unknown,
                index.n_samples,
                index.unknown_fraction() * 100.0
            );
        }

        index
    }

    /// Builds the index directly from per-sample labels (ancestry-table
    /// runs, where every sample arrives already labelled).
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut n_samples = 0;
        for (row, label) in labels.into_iter().enumerate() {
            let label = label.trim();
            let label = if label.is_empty() {
                UNKNOWN_POPULATION
            } else {
                label
            };
            groups.entry(label.to_string()).or_default().push(row);
            n_samples = row + 1;
        }
        PopulationIndex { groups, n_samples }
    }

    /// (label, row indices) pairs in lexicographic label order.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.groups
            .iter()
            .map(|(label, rows)| (label.as_str(), rows.as_slice()))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn rows(&self, label: &str) -> Option<&[usize]> {
        self.groups.get(label).map(Vec::as_slice)
    }

    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.groups
            .iter()
            .map(|(label, rows)| (label.clone(), rows.len()))
            .collect()
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn n_populations(&self) -> usize {
        self.groups.len()
    }

    pub fn unknown_count(&self) -> usize {
        self.groups
            .get(UNKNOWN_POPULATION)
            .map_or(0, |rows| rows.len())
    }

    pub fn unknown_fraction(&self) -> f64 {
        if self.n_samples == 0 {
            0.0
        } else {
            self.unknown_count() as f64 / self.n_samples as f64
        }
    }

    /// Per-row population labels, indexed by sample row.
    pub fn sample_labels(&self) -> Vec<&str> {
        let mut labels = vec![UNKNOWN_POPULATION; self.n_samples];
        for (label, rows) in &self.groups {
            for &row in rows {
                labels[row] = label.as_str();
            }
        }
        labels
    }
}

fn infer_from_prefix(sample: &str, panel: &ReferencePanel) -> Option<String> {
    let prefix = sample.split('_').next()?.to_uppercase();
    if panel.is_reference_population(&prefix) {
        Some(prefix)
    } else {
        None
    }
}
