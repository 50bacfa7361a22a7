use ndarray::Array2;

use crate::pipeline::ScoreError;

/// Dosage value standing in for a missing genotype call.
pub const MISSING_DOSAGE: i8 = -1;

/// One variant as delivered by the loader: an identifier, the declared
/// colon-joined field layout, and one raw call string per sample.
#[derive(Debug, Clone)]
pub struct VariantRecord {
    pub id: String,
    pub format: Vec<String>,
    pub calls: Vec<String>,
}

/// Samples x variants dosage matrix. Values are -1 (missing), 0, 1 or 2
/// (alternate-allele count). Immutable once built.
#[derive(Debug, Clone)]
pub struct GenotypeMatrix {
    dosages: Array2<i8>,
    sample_names: Vec<String>,
    variant_ids: Vec<String>,
}

impl GenotypeMatrix {
    /// Builds the dosage matrix from loader output.
    ///
    /// Fails on zero samples, zero variant records, a FORMAT without GT,
    /// per-sample call counts that do not match the sample count, and any
    /// call string that cannot be read as a diploid biallelic genotype.
    pub fn from_records(
        sample_names: Vec<String>,
        records: &[VariantRecord],
    ) -> Result<Self, ScoreError> {
        if sample_names.is_empty() {
            return Err(ScoreError::EmptyInput(
                "zero samples declared".to_string(),
            ));
        }
        if records.is_empty() {
            return Err(ScoreError::EmptyInput(
                "zero variant records".to_string(),
            ));
        }

        let n_samples = sample_names.len();
        let n_variants = records.len();
        let mut dosages = Array2::<i8>::zeros((n_samples, n_variants));

        for (v_idx, record) in records.iter().enumerate() {
            let gt_index = record
                .format
                .iter()
                .position(|field| field == "GT")
                .ok_or_else(|| ScoreError::MissingGenotypeField(record.id.clone()))?;

            if record.calls.len() != n_samples {
                return Err(ScoreError::Parse(format!(
                    "variant {} has {} genotype calls but {} samples are declared",
                    record.id,
                    record.calls.len(),
                    n_samples
                )));
            }

            for (s_idx, call) in record.calls.iter().enumerate() {
                dosages[[s_idx, v_idx]] = dosage_from_call(call, gt_index, &record.id)?;
            }
        }

        let variant_ids = records.iter().map(|r| r.id.clone()).collect();

        Ok(GenotypeMatrix {
            dosages,
            sample_names,
            variant_ids,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.dosages.nrows()
    }

    pub fn n_variants(&self) -> usize {
        self.dosages.ncols()
    }

    pub fn sample_names(&self) -> &[String] {
        &self.sample_names
    }

    pub fn variant_ids(&self) -> &[String] {
        &self.variant_ids
    }

    pub fn dosages(&self) -> &Array2<i8> {
        &self.dosages
    }

    pub fn dosage(&self, sample: usize, variant: usize) -> i8 {
        self.dosages[[sample, variant]]
    }
}

/// Converts one raw call string ("0|1:35:..." etc.) into a dosage.
///
/// Any `.` in the GT subfield marks the call missing (-1). Otherwise the GT
/// subfield must be exactly two `/`- or `|`-separated allele indices, each 0
/// or 1, and the dosage is their sum. Any other shape is rejected, including
/// allele indices above 1 since the 0/1/2 dosage domain has no slot for a
/// second alternate allele.
fn dosage_from_call(call: &str, gt_index: usize, variant_id: &str) -> Result<i8, ScoreError> {
    let gt = call.split(':').nth(gt_index).ok_or_else(|| {
        ScoreError::Parse(format!(
            "call '{}' in variant {} has fewer subfields than its FORMAT declares",
            call, variant_id
        ))
    })?;

    if gt.contains('.') {
        return Ok(MISSING_DOSAGE);
    }

    let alleles: Vec<&str> = gt.split(['|', '/']).collect();
    if alleles.len() != 2 {
        return Err(ScoreError::Parse(format!(
            "genotype '{}' in variant {} is not a diploid call",
            gt, variant_id
        )));
    }

    let mut dosage = 0i8;
    for allele in alleles {
        let index: u8 = allele.parse().map_err(|_| {
            ScoreError::Parse(format!(
                "unparsable allele '{}' in genotype '{}' of variant {}",
                allele, gt, variant_id
            ))
        })?;
        if index > 1 {
            return Err(ScoreError::Parse(format!(
                "multi-allelic genotype '{}' in variant {} is unsupported",
                gt, variant_id
            )));
        }
        dosage += index as i8;
    }

    Ok(dosage)
}
