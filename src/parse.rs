use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use log::info;

use crate::matrix::VariantRecord;
use crate::pipeline::ScoreError;

/// Header names accepted for the population column, first match wins.
pub const POPULATION_COLUMN_ALIASES: &[&str] =
    &["population", "ancestry", "pop", "superpopulation"];

/// Header names accepted for the sample-identifier column.
pub const SAMPLE_COLUMN_ALIASES: &[&str] = &["sample_id", "sample", "id", "iid"];

/// Loader output for a VCF: ordered sample names plus one record per data
/// row, still as raw call strings.
#[derive(Debug)]
pub struct VcfInput {
    pub sample_names: Vec<String>,
    pub records: Vec<VariantRecord>,
}

/// Opens a genotype file for buffered reading, decoding gzip transparently
/// for `.gz` paths.
pub fn open_genotype_reader(path: &Path) -> Result<Box<dyn BufRead + Send>, ScoreError> {
    let file = File::open(path)?;

    if path.extension().and_then(|s| s.to_str()) == Some("gz") {
        let decoder = MultiGzDecoder::new(file);
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Checks that a `#CHROM` line declares the nine fixed VCF columns.
pub fn validate_vcf_header(header: &str) -> Result<(), ScoreError> {
    let fields: Vec<&str> = header.split('\t').collect();
    let required_fields = [
        "#CHROM", "POS", "ID", "REF", "ALT", "QUAL", "FILTER", "INFO", "FORMAT",
    ];

    if fields.len() < required_fields.len()
        || fields[..required_fields.len()] != required_fields[..]
    {
        return Err(ScoreError::InvalidVcfFormat(
            "Invalid VCF header format".to_string(),
        ));
    }
    Ok(())
}

/// Reads a (possibly gzipped) VCF into sample names and variant records.
///
/// `##` meta lines and stray `#` lines are skipped. The `#CHROM` header
/// must precede data rows and declare at least one sample. Each data row
/// must carry exactly one call per declared sample; `.` in the ID column
/// is replaced by `CHROM:POS`.
pub fn read_vcf(path: &Path) -> Result<VcfInput, ScoreError> {
    let reader = open_genotype_reader(path)?;

    let mut sample_names: Vec<String> = Vec::new();
    let mut header_seen = false;
    let mut records = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        if line.trim().is_empty() || line.starts_with("##") {
            continue;
        }
        if line.starts_with("#CHROM") {
            validate_vcf_header(&line)?;
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() <= 9 {
                return Err(ScoreError::EmptyInput(
                    "VCF header declares no samples".to_string(),
                ));
            }
            sample_names = fields[9..].iter().map(|s| s.to_string()).collect();
            header_seen = true;
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        if !header_seen {
            return Err(ScoreError::InvalidVcfFormat(
                "data row before #CHROM header".to_string(),
            ));
        }

        let fields: Vec<&str> = line.split('\t').collect();
        let expected = 9 + sample_names.len();
        if fields.len() != expected {
            return Err(ScoreError::Parse(format!(
                "data row with {} fields where {} were expected",
                fields.len(),
                expected
            )));
        }

        let id = if fields[2] == "." {
            format!("{}:{}", fields[0], fields[1])
        } else {
            fields[2].to_string()
        };
        let format = fields[8].split(':').map(String::from).collect();
        let calls = fields[9..].iter().map(|s| s.to_string()).collect();

        records.push(VariantRecord { id, format, calls });
    }

    if !header_seen {
        return Err(ScoreError::InvalidVcfFormat(
            "no #CHROM header line found".to_string(),
        ));
    }
    if records.is_empty() {
        return Err(ScoreError::EmptyInput(
            "no variant records in VCF".to_string(),
        ));
    }

    info!(
        "Parsed {} samples, {} variants from {}",
        sample_names.len(),
        records.len(),
        path.display()
    );

    Ok(VcfInput {
        sample_names,
        records,
    })
}

/// Reads a sample -> population assignment table. Column headers are
/// matched case-insensitively against the alias lists; labels are kept
/// verbatim apart from trimming.
pub fn read_population_map(path: &Path) -> Result<HashMap<String, String>, ScoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(table_delimiter(path))
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let population_col = find_column(&headers, POPULATION_COLUMN_ALIASES).ok_or_else(|| {
        ScoreError::Parse(format!(
            "no population column in {} (expected one of: {})",
            path.display(),
            POPULATION_COLUMN_ALIASES.join(", ")
        ))
    })?;
    let sample_col = find_column(&headers, SAMPLE_COLUMN_ALIASES).ok_or_else(|| {
        ScoreError::Parse(format!(
            "no sample column in {} (expected one of: {})",
            path.display(),
            SAMPLE_COLUMN_ALIASES.join(", ")
        ))
    })?;

    let mut assignments = HashMap::new();
    for result in reader.records() {
        let record = result?;
        let sample = record.get(sample_col).unwrap_or("").trim();
        let label = record.get(population_col).unwrap_or("").trim();
        if sample.is_empty() {
            continue;
        }
        assignments.insert(sample.to_string(), label.to_string());
    }

    info!(
        "Loaded {} population assignments from {}",
        assignments.len(),
        path.display()
    );

    Ok(assignments)
}

/// Reads an ancestry-only table (no genotypes) into ordered
/// (sample, population) pairs. The sample column is optional; missing
/// identifiers are synthesized as `SAMPLE_{row}`.
pub fn read_ancestry_table(path: &Path) -> Result<Vec<(String, String)>, ScoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(table_delimiter(path))
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let population_col = find_column(&headers, POPULATION_COLUMN_ALIASES).ok_or_else(|| {
        ScoreError::Parse(format!(
            "no population/ancestry column in {}; columns are: {}",
            path.display(),
            headers.iter().collect::<Vec<_>>().join(", ")
        ))
    })?;
    let sample_col = find_column(&headers, SAMPLE_COLUMN_ALIASES);

    let mut rows = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result?;
        let label = record.get(population_col).unwrap_or("").trim().to_string();
        let sample = sample_col
            .and_then(|idx| record.get(idx))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .unwrap_or_else(|| format!("SAMPLE_{}", row_idx));
        rows.push((sample, label));
    }

    if rows.is_empty() {
        return Err(ScoreError::EmptyInput(format!(
            "no rows in ancestry table {}",
            path.display()
        )));
    }

    Ok(rows)
}

fn table_delimiter(path: &Path) -> u8 {
    if path.extension().and_then(|s| s.to_str()) == Some("tsv") {
        b'\t'
    } else {
        b','
    }
}

fn find_column(headers: &csv::StringRecord, aliases: &[&str]) -> Option<usize> {
    for alias in aliases {
        if let Some(idx) = headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(alias))
        {
            return Some(idx);
        }
    }
    None
}
