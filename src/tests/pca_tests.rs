use crate::matrix::{GenotypeMatrix, VariantRecord};
use crate::pca::compute_pca;

fn call_for(dosage: i8) -> &'static str {
    match dosage {
        0 => "0|0",
        1 => "0|1",
        2 => "1|1",
        _ => ".|.",
    }
}

fn build_matrix(n_samples: usize, sites: &[Vec<i8>]) -> GenotypeMatrix {
    let sample_names: Vec<String> = (0..n_samples).map(|i| format!("S{}", i)).collect();
    let records: Vec<VariantRecord> = sites
        .iter()
        .enumerate()
        .map(|(v, dosages)| VariantRecord {
            id: format!("var{}", v),
            format: vec!["GT".to_string()],
            calls: dosages.iter().map(|&d| call_for(d).to_string()).collect(),
        })
        .collect();
    GenotypeMatrix::from_records(sample_names, &records).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_clusters_separate_on_pc1() {
        // Samples 0-2 fixed ref, samples 3-5 fixed alt at every site.
        // More samples than variants exercises the covariance path.
        let sites: Vec<Vec<i8>> = (0..4).map(|_| vec![0, 0, 0, 2, 2, 2]).collect();
        let matrix = build_matrix(6, &sites);

        let projection = compute_pca(&matrix, 3);

        let mean_a: f64 = (0..3).map(|i| projection.coordinates[[i, 0]]).sum::<f64>() / 3.0;
        let mean_b: f64 = (3..6).map(|i| projection.coordinates[[i, 0]]).sum::<f64>() / 3.0;
        // Axis sign is arbitrary, the gap is not
        assert!((mean_a - mean_b).abs() > 1.0);

        // One axis of variation carries everything
        assert!((projection.explained_variance_ratio[0] - 1.0).abs() < 1e-9);
        for ratio in &projection.explained_variance_ratio[1..] {
            assert!(ratio.abs() < 1e-9);
        }
    }

    #[test]
    fn test_gram_path_with_more_variants_than_samples() {
        // 3 samples, 5 variants: a perfect dosage gradient
        let sites: Vec<Vec<i8>> = (0..5).map(|_| vec![0, 1, 2]).collect();
        let matrix = build_matrix(3, &sites);

        let projection = compute_pca(&matrix, 2);

        assert_eq!(projection.n_components(), 2);
        // The middle sample sits at the centroid
        assert!(projection.coordinates[[1, 0]].abs() < 1e-9);
        // Endpoints land at +-sqrt(5) on PC1
        let spread = (projection.coordinates[[0, 0]] - projection.coordinates[[2, 0]]).abs();
        assert!((spread - 2.0 * 5.0f64.sqrt()).abs() < 1e-9);
        assert!((projection.explained_variance_ratio[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_explained_variance_ratios_are_bounded() {
        let matrix = build_matrix(
            5,
            &[
                vec![0, 1, 2, 0, 1],
                vec![2, 0, 1, 1, 0],
                vec![1, 1, 0, 2, 2],
                vec![0, 2, 2, 0, 1],
            ],
        );

        let projection = compute_pca(&matrix, 4);

        let sum: f64 = projection.explained_variance_ratio.iter().sum();
        assert!(sum <= 1.0 + 1e-9);
        for &ratio in &projection.explained_variance_ratio {
            assert!(ratio >= 0.0);
        }
        // Ratios come out sorted descending
        for pair in projection.explained_variance_ratio.windows(2) {
            assert!(pair[0] >= pair[1] - 1e-12);
        }
    }

    #[test]
    fn test_requested_components_are_capped() {
        let sites: Vec<Vec<i8>> = (0..5).map(|_| vec![0, 1, 2]).collect();
        let matrix = build_matrix(3, &sites);

        let projection = compute_pca(&matrix, 10);

        assert_eq!(projection.n_components(), 3);
        assert_eq!(projection.explained_variance_ratio.len(), 3);
        assert_eq!(projection.coordinates.dim(), (3, 3));
    }

    #[test]
    fn test_single_sample_is_degenerate() {
        let matrix = build_matrix(1, &[vec![0], vec![2], vec![1]]);

        let projection = compute_pca(&matrix, 2);

        assert_eq!(projection.coordinates.dim(), (1, 1));
        assert!(projection.coordinates.iter().all(|&c| c == 0.0));
        assert!(projection.explained_variance_ratio.iter().all(|&r| r == 0.0));
    }

    #[test]
    fn test_zero_variance_matrix_is_degenerate() {
        let matrix = build_matrix(3, &[vec![1, 1, 1], vec![1, 1, 1]]);

        let projection = compute_pca(&matrix, 2);

        assert_eq!(projection.coordinates.dim(), (3, 2));
        assert!(projection.coordinates.iter().all(|&c| c == 0.0));
        assert!(projection.explained_variance_ratio.iter().all(|&r| r == 0.0));
    }

    #[test]
    fn test_missing_cells_impute_to_column_mean() {
        // Column 1 is entirely missing and must impute to 0.0 rather than
        // produce NaN coordinates
        let matrix = build_matrix(
            4,
            &[
                vec![0, 0, 2, 2],
                vec![-1, -1, -1, -1],
                vec![0, 2, 0, 2],
            ],
        );

        let projection = compute_pca(&matrix, 3);

        assert!(projection.coordinates.iter().all(|c| c.is_finite()));
        assert!(projection
            .explained_variance_ratio
            .iter()
            .all(|r| r.is_finite()));
    }
}
