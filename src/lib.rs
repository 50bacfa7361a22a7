//! Population-genetics equity scoring for cohort genotype data.
//!
//! Parses a cohort (VCF genotypes or an ancestry table), groups samples by
//! population, computes allele frequencies, heterozygosity, pairwise Nei's
//! Gst and a PCA projection, and composes the HEIM equity score with a full
//! report of tables, JSON and markdown.

// Module declarations
pub mod matrix;
pub mod parse;
pub mod pca;
pub mod pipeline;
pub mod populations;
pub mod report;
pub mod score;
pub mod stats;

#[cfg(test)]
mod tests;

pub use matrix::{GenotypeMatrix, VariantRecord, MISSING_DOSAGE};
pub use pca::PcaProjection;
pub use pipeline::{RunOptions, ScoreError};
pub use populations::{PopulationIndex, UNKNOWN_POPULATION};
pub use score::{HeimScore, Rating, ReferencePanel, ScoreWeights};
pub use stats::{AlleleFrequencyTable, HeterozygosityTable, PairwiseFstMatrix};
