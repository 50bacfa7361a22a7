use crate::matrix::{GenotypeMatrix, VariantRecord, MISSING_DOSAGE};
use crate::pipeline::ScoreError;

// Helper to build a biallelic GT-only record for testing
fn record(id: &str, calls: &[&str]) -> VariantRecord {
    VariantRecord {
        id: id.to_string(),
        format: vec!["GT".to_string()],
        calls: calls.iter().map(|c| c.to_string()).collect(),
    }
}

fn samples(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dosage_encoding() {
        let records = vec![record(
            "rs1",
            &["0|0", "0|1", "1|0", "1|1", ".|.", "./1", "0/1"],
        )];
        let names = samples(&["a", "b", "c", "d", "e", "f", "g"]);
        let matrix = GenotypeMatrix::from_records(names, &records).unwrap();

        assert_eq!(matrix.dosage(0, 0), 0);
        assert_eq!(matrix.dosage(1, 0), 1);
        assert_eq!(matrix.dosage(2, 0), 1);
        assert_eq!(matrix.dosage(3, 0), 2);
        // Any '.' in the genotype marks the whole call missing
        assert_eq!(matrix.dosage(4, 0), MISSING_DOSAGE);
        assert_eq!(matrix.dosage(5, 0), MISSING_DOSAGE);
        // Unphased separator is equivalent to phased
        assert_eq!(matrix.dosage(6, 0), 1);
    }

    #[test]
    fn test_gt_position_in_format() {
        // GT is not the first FORMAT field
        let records = vec![VariantRecord {
            id: "rs2".to_string(),
            format: vec!["DP".to_string(), "GT".to_string()],
            calls: vec!["12:0|1".to_string(), "7:1|1".to_string()],
        }];
        let matrix = GenotypeMatrix::from_records(samples(&["a", "b"]), &records).unwrap();

        assert_eq!(matrix.dosage(0, 0), 1);
        assert_eq!(matrix.dosage(1, 0), 2);
    }

    #[test]
    fn test_format_without_gt_is_rejected() {
        let records = vec![VariantRecord {
            id: "rs3".to_string(),
            format: vec!["DP".to_string()],
            calls: vec!["12".to_string()],
        }];
        let result = GenotypeMatrix::from_records(samples(&["a"]), &records);

        assert!(matches!(result, Err(ScoreError::MissingGenotypeField(_))));
    }

    #[test]
    fn test_empty_inputs_are_rejected() {
        let records = vec![record("rs1", &["0|0"])];
        assert!(matches!(
            GenotypeMatrix::from_records(Vec::new(), &records),
            Err(ScoreError::EmptyInput(_))
        ));
        assert!(matches!(
            GenotypeMatrix::from_records(samples(&["a"]), &[]),
            Err(ScoreError::EmptyInput(_))
        ));
    }

    #[test]
    fn test_call_count_mismatch_is_rejected() {
        let records = vec![record("rs1", &["0|0", "0|1"])];
        let result = GenotypeMatrix::from_records(samples(&["a", "b", "c"]), &records);

        assert!(matches!(result, Err(ScoreError::Parse(_))));
    }

    #[test]
    fn test_multi_allelic_genotype_is_rejected() {
        let records = vec![record("rs1", &["0|0", "0|2"])];
        let result = GenotypeMatrix::from_records(samples(&["a", "b"]), &records);

        assert!(matches!(result, Err(ScoreError::Parse(_))));
    }

    #[test]
    fn test_haploid_genotype_is_rejected() {
        let records = vec![record("rs1", &["0|0", "1"])];
        let result = GenotypeMatrix::from_records(samples(&["a", "b"]), &records);

        assert!(matches!(result, Err(ScoreError::Parse(_))));
    }

    #[test]
    fn test_shape_and_names() {
        let records = vec![
            record("rs1", &["0|0", "1|1"]),
            record("rs2", &["0|1", ".|."]),
            record("rs3", &["1|1", "0|0"]),
        ];
        let matrix = GenotypeMatrix::from_records(samples(&["a", "b"]), &records).unwrap();

        assert_eq!(matrix.n_samples(), 2);
        assert_eq!(matrix.n_variants(), 3);
        assert_eq!(matrix.sample_names(), &["a", "b"]);
        assert_eq!(matrix.variant_ids(), &["rs1", "rs2", "rs3"]);
        assert_eq!(matrix.dosages().dim(), (2, 3));
    }
}
