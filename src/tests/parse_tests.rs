use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::NamedTempFile;

use crate::parse::{read_ancestry_table, read_population_map, read_vcf, validate_vcf_header};
use crate::pipeline::ScoreError;

const SMALL_VCF: &str = "\
##fileformat=VCFv4.2
##source=unit-test
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\tS3
1\t100\trs1\tA\tG\t.\tPASS\t.\tGT\t0|0\t0|1\t1|1
1\t200\t.\tC\tT\t.\tPASS\t.\tGT\t0|0\t.|.\t0|1
";

fn temp_file_with(content: &str, suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_vcf_basic() {
        let file = temp_file_with(SMALL_VCF, ".vcf");
        let input = read_vcf(file.path()).unwrap();

        assert_eq!(input.sample_names, vec!["S1", "S2", "S3"]);
        assert_eq!(input.records.len(), 2);
        assert_eq!(input.records[0].id, "rs1");
        // A '.' ID is replaced by CHROM:POS
        assert_eq!(input.records[1].id, "1:200");
        assert_eq!(input.records[0].calls, vec!["0|0", "0|1", "1|1"]);
    }

    #[test]
    fn test_read_vcf_gzip() {
        let mut file = tempfile::Builder::new()
            .suffix(".vcf.gz")
            .tempfile()
            .unwrap();
        {
            let mut encoder = GzEncoder::new(file.as_file_mut(), Compression::default());
            encoder.write_all(SMALL_VCF.as_bytes()).unwrap();
            encoder.finish().unwrap();
        }

        let input = read_vcf(file.path()).unwrap();
        assert_eq!(input.sample_names.len(), 3);
        assert_eq!(input.records.len(), 2);
    }

    #[test]
    fn test_read_vcf_skips_comments_and_blanks() {
        let content = "\
##fileformat=VCFv4.2
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1

#stray comment
1\t100\trs1\tA\tG\t.\tPASS\t.\tGT\t0|1
";
        let file = temp_file_with(content, ".vcf");
        let input = read_vcf(file.path()).unwrap();

        assert_eq!(input.records.len(), 1);
    }

    #[test]
    fn test_read_vcf_rejects_data_before_header() {
        let content = "1\t100\trs1\tA\tG\t.\tPASS\t.\tGT\t0|1\n";
        let file = temp_file_with(content, ".vcf");

        assert!(matches!(
            read_vcf(file.path()),
            Err(ScoreError::InvalidVcfFormat(_))
        ));
    }

    #[test]
    fn test_read_vcf_rejects_missing_header() {
        let file = temp_file_with("##fileformat=VCFv4.2\n", ".vcf");

        assert!(matches!(
            read_vcf(file.path()),
            Err(ScoreError::InvalidVcfFormat(_))
        ));
    }

    #[test]
    fn test_read_vcf_rejects_headers_without_samples() {
        let content = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\n";
        let file = temp_file_with(content, ".vcf");

        assert!(matches!(
            read_vcf(file.path()),
            Err(ScoreError::EmptyInput(_))
        ));
    }

    #[test]
    fn test_read_vcf_rejects_ragged_rows() {
        let content = "\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2
1\t100\trs1\tA\tG\t.\tPASS\t.\tGT\t0|1
";
        let file = temp_file_with(content, ".vcf");

        assert!(matches!(read_vcf(file.path()), Err(ScoreError::Parse(_))));
    }

    #[test]
    fn test_read_vcf_rejects_empty_body() {
        let content = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\n";
        let file = temp_file_with(content, ".vcf");

        assert!(matches!(
            read_vcf(file.path()),
            Err(ScoreError::EmptyInput(_))
        ));
    }

    #[test]
    fn test_validate_vcf_header() {
        assert!(validate_vcf_header(
            "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1"
        )
        .is_ok());
        assert!(validate_vcf_header("#CHROM\tPOS\tID").is_err());
        assert!(validate_vcf_header(
            "#CHROM\tID\tPOS\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1"
        )
        .is_err());
    }

    #[test]
    fn test_population_map_csv() {
        let content = "sample_id,population\nS1,AFR\nS2,EUR\n,AFR\n";
        let file = temp_file_with(content, ".csv");

        let map = read_population_map(file.path()).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("S1"), Some(&"AFR".to_string()));
        assert_eq!(map.get("S2"), Some(&"EUR".to_string()));
    }

    #[test]
    fn test_population_map_tsv_with_aliases() {
        // Column headers match case-insensitively against the alias lists
        let content = "IID\tSuperpopulation\nHG00096\tEUR\nNA18939\tEAS\n";
        let file = temp_file_with(content, ".tsv");

        let map = read_population_map(file.path()).unwrap();
        assert_eq!(map.get("HG00096"), Some(&"EUR".to_string()));
        assert_eq!(map.get("NA18939"), Some(&"EAS".to_string()));
    }

    #[test]
    fn test_population_map_requires_both_columns() {
        let file = temp_file_with("sample_id,notes\nS1,hello\n", ".csv");
        assert!(matches!(
            read_population_map(file.path()),
            Err(ScoreError::Parse(_))
        ));

        let file = temp_file_with("population\nAFR\n", ".csv");
        assert!(matches!(
            read_population_map(file.path()),
            Err(ScoreError::Parse(_))
        ));
    }

    #[test]
    fn test_ancestry_table_with_sample_column() {
        let content = "sample,ancestry\nX1,AFR\nX2,EUR\n";
        let file = temp_file_with(content, ".csv");

        let rows = read_ancestry_table(file.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], ("X1".to_string(), "AFR".to_string()));
    }

    #[test]
    fn test_ancestry_table_synthesizes_sample_ids() {
        let content = "population\nAFR\nAFR\nEUR\n";
        let file = temp_file_with(content, ".csv");

        let rows = read_ancestry_table(file.path()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].0, "SAMPLE_0");
        assert_eq!(rows[2], ("SAMPLE_2".to_string(), "EUR".to_string()));
    }

    #[test]
    fn test_ancestry_table_rejects_empty() {
        let file = temp_file_with("population\n", ".csv");
        assert!(matches!(
            read_ancestry_table(file.path()),
            Err(ScoreError::EmptyInput(_))
        ));

        let file = temp_file_with("sample,notes\nX1,hello\n", ".csv");
        assert!(matches!(
            read_ancestry_table(file.path()),
            Err(ScoreError::Parse(_))
        ));
    }
}
