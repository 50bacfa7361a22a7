// pca.rs

use std::cmp::Ordering;

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::Array2;

use crate::matrix::GenotypeMatrix;

/// Near-zero variance cutoff below which a projection is degenerate.
const VARIANCE_EPSILON: f64 = 1e-12;

/// Projection of the cohort into principal-component space.
pub struct PcaProjection {
    /// Per-sample coordinates, n_samples x k.
    pub coordinates: Array2<f64>,
    /// Fraction of total variance carried by each component, length k.
    pub explained_variance_ratio: Vec<f64>,
}

impl PcaProjection {
    pub fn n_components(&self) -> usize {
        self.coordinates.ncols()
    }
}

/// Computes an exact PCA of the dosage matrix.
///
/// Missing cells are imputed with their column mean (0.0 for an all-missing
/// column), columns are mean-centered, and the projection comes from a
/// symmetric eigendecomposition of whichever of the Gram matrix (n <= p) or
/// the covariance matrix (p < n) is smaller. Both routes recover the same
/// singular-value decomposition of the centered data.
///
/// # Arguments
/// * `matrix` - the raw dosage matrix (missing cells allowed)
/// * `n_components` - requested component count, clamped to min(n, p)
///
/// # Returns
/// Coordinates and explained-variance ratios. A single-sample cohort or a
/// zero-variance matrix yields all-zero coordinates and ratios rather than
/// an error; the sign of each axis is arbitrary.
pub fn compute_pca(matrix: &GenotypeMatrix, n_components: usize) -> PcaProjection {
    let n = matrix.n_samples();
    let p = matrix.n_variants();
    let k = n_components.min(n).min(p);

    if k == 0 || n < 2 {
        return degenerate(n, k);
    }

    let data = imputed_centered(matrix);
    let denom = (n - 1) as f64;
    let total_variance: f64 = data.iter().map(|x| x * x).sum::<f64>() / denom;
    if total_variance <= VARIANCE_EPSILON {
        return degenerate(n, k);
    }

    let mut coordinates = Array2::<f64>::zeros((n, k));
    let mut ratios = Vec::with_capacity(k);

    if n <= p {
        // Gram path: eigenvectors of X Xt / (n-1) are the left singular
        // vectors, scaled into scores by the singular values.
        let gram = &data * data.transpose() / denom;
        let eigen = SymmetricEigen::new(gram);
        let order = descending_order(eigen.eigenvalues.as_slice());
        for (component, &e_idx) in order.iter().take(k).enumerate() {
            // Small negative eigenvalues are roundoff on a PSD matrix.
            let lambda = eigen.eigenvalues[e_idx].max(0.0);
            let sigma = (lambda * denom).sqrt();
            for i in 0..n {
                coordinates[[i, component]] = eigen.eigenvectors[(i, e_idx)] * sigma;
            }
            ratios.push(lambda / total_variance);
        }
    } else {
        // Covariance path: project the data onto the top eigenvectors of
        // Xt X / (n-1).
        let covariance = data.transpose() * &data / denom;
        let eigen = SymmetricEigen::new(covariance);
        let order = descending_order(eigen.eigenvalues.as_slice());
        for (component, &e_idx) in order.iter().take(k).enumerate() {
            let lambda = eigen.eigenvalues[e_idx].max(0.0);
            let scores = &data * eigen.eigenvectors.column(e_idx);
            for i in 0..n {
                coordinates[[i, component]] = scores[i];
            }
            ratios.push(lambda / total_variance);
        }
    }

    PcaProjection {
        coordinates,
        explained_variance_ratio: ratios,
    }
}

/// Column-mean imputation of missing cells followed by column centering.
/// An all-missing column imputes to 0.0, where the allele-frequency engine
/// instead leaves such a site undefined.
fn imputed_centered(matrix: &GenotypeMatrix) -> DMatrix<f64> {
    let n = matrix.n_samples();
    let p = matrix.n_variants();
    let mut data = DMatrix::<f64>::zeros(n, p);

    for j in 0..p {
        let mut valid_sum = 0.0;
        let mut valid_count = 0usize;
        for i in 0..n {
            let dosage = matrix.dosage(i, j);
            if dosage >= 0 {
                valid_sum += f64::from(dosage);
                valid_count += 1;
            }
        }
        let impute = if valid_count > 0 {
            valid_sum / valid_count as f64
        } else {
            0.0
        };

        let mut column_sum = 0.0;
        for i in 0..n {
            let dosage = matrix.dosage(i, j);
            let value = if dosage >= 0 { f64::from(dosage) } else { impute };
            data[(i, j)] = value;
            column_sum += value;
        }

        let mean = column_sum / n as f64;
        for i in 0..n {
            data[(i, j)] -= mean;
        }
    }

    data
}

/// Index order sorting eigenvalues descending. The decomposition itself
/// does not guarantee any eigenpair ordering.
fn descending_order(eigenvalues: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..eigenvalues.len()).collect();
    order.sort_by(|&a, &b| {
        eigenvalues[b]
            .partial_cmp(&eigenvalues[a])
            .unwrap_or(Ordering::Equal)
    });
    order
}

fn degenerate(n: usize, k: usize) -> PcaProjection {
    PcaProjection {
        coordinates: Array2::zeros((n, k)),
        explained_variance_ratio: vec![0.0; k],
    }
}
