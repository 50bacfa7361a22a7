use std::collections::BTreeMap;
use std::path::PathBuf;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use log::{info, warn};
use thiserror::Error;

use crate::matrix::GenotypeMatrix;
use crate::parse::{self, VcfInput};
use crate::pca;
use crate::populations::PopulationIndex;
use crate::report::{self, ReportContext};
use crate::score::{compose_heim_score, HeimScore, ReferencePanel, ScoreWeights};
use crate::stats;

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid VCF format: {0}")]
    InvalidVcfFormat(String),
    #[error("variant {0}: FORMAT declares no GT field")]
    MissingGenotypeField(String),
    #[error("empty input: {0}")]
    EmptyInput(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Resolved settings for one scoring run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input: PathBuf,
    pub population_map: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub n_components: usize,
    pub weights: ScoreWeights,
}

fn stage_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.bold.green} {msg}")
            .expect("Spinner template error"),
    );
    spinner.set_message(message.to_string());
    spinner
}

fn fmt_stat(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.4}", v),
        None => "undefined".to_string(),
    }
}

/// Full scoring run from VCF genotype data: parse, resolve populations,
/// compute the population statistics and PCA, compose the score and write
/// every report artifact.
pub fn run_genotype_pipeline(options: &RunOptions) -> Result<HeimScore, ScoreError> {
    let panel = ReferencePanel::global();
    let checksum = report::sha256_of_file(&options.input)?;

    println!("{}", "Starting genomic equity audit...".green());
    info!("Input: {}", options.input.display());
    info!("Checksum (SHA-256): {}", checksum);

    let spinner = stage_spinner(&format!("Parsing {}", options.input.display()));
    let VcfInput {
        sample_names,
        records,
    } = parse::read_vcf(&options.input)?;
    spinner.finish_and_clear();
    info!("{} samples, {} variants", sample_names.len(), records.len());

    let assignments = match options.population_map.as_deref() {
        Some(path) => Some(parse::read_population_map(path)?),
        None => None,
    };
    let index = PopulationIndex::resolve(&sample_names, assignments.as_ref(), panel);
    let counts = index.counts();
    info!(
        "Populations: {}",
        counts
            .iter()
            .map(|(label, n)| format!("{} (n={})", label, n))
            .join(", ")
    );

    let matrix = GenotypeMatrix::from_records(sample_names, &records)?;

    println!("{}", "Computing heterozygosity...".blue());
    let frequencies = stats::compute_allele_frequencies(&matrix, &index);
    let heterozygosity = stats::compute_heterozygosity(&matrix, &index, &frequencies);
    for (label, het) in heterozygosity.iter() {
        info!(
            "{}: obs={}  exp={}",
            label,
            fmt_stat(het.observed),
            fmt_stat(het.expected)
        );
    }

    let spinner = stage_spinner("Computing pairwise FST");
    let fst = stats::compute_pairwise_fst(&frequencies, &index);
    spinner.finish_and_clear();
    for ((a, b), value) in fst.pairs() {
        match value {
            Some(v) => info!("{} vs {}: {:.4}", a, b, v),
            None => info!("{} vs {}: undefined (no informative site)", a, b),
        }
    }

    println!("{}", "Computing PCA...".blue());
    let projection = pca::compute_pca(&matrix, options.n_components);
    if projection.explained_variance_ratio.len() >= 2 {
        info!(
            "PC1: {:.1}%  PC2: {:.1}%",
            projection.explained_variance_ratio[0] * 100.0,
            projection.explained_variance_ratio[1] * 100.0
        );
    }

    let observed = heterozygosity.observed_scalars();
    let score = compose_heim_score(&counts, &observed, fst.computed_pairs(), options.weights, panel);
    info!("Score: {:.1}/100 ({})", score.score, score.rating);

    let context = ReportContext {
        input_path: &options.input,
        input_sha256: checksum,
        score: &score,
        panel,
        heterozygosity: Some(&heterozygosity),
        fst: Some(&fst),
        pca: Some(&projection),
        sample_names: Some(matrix.sample_names()),
        sample_labels: Some(index.sample_labels()),
        n_variants: Some(matrix.n_variants()),
        population_map: options.population_map.as_deref(),
        het_from_literature: false,
    };
    report::write_all(&context, &options.output_dir)?;
    report::print_terminal_summary(&score, panel);

    println!("{}", "Analysis complete.".green());
    info!(
        "Report: {}",
        options.output_dir.join("report.md").display()
    );

    Ok(score)
}

/// Scoring run from an ancestry table alone. No genotypes means no allele
/// frequencies, so heterozygosity falls back to the panel's literature
/// estimates, no FST pair is computed and PCA is skipped.
pub fn run_ancestry_pipeline(options: &RunOptions) -> Result<HeimScore, ScoreError> {
    let panel = ReferencePanel::global();
    let checksum = report::sha256_of_file(&options.input)?;

    println!("{}", "Starting genomic equity audit...".green());
    info!("Input: {}", options.input.display());
    info!("Checksum (SHA-256): {}", checksum);

    if options.population_map.is_some() {
        warn!("--pop-map is ignored for ancestry-table input");
    }

    let rows = parse::read_ancestry_table(&options.input)?;
    let index = PopulationIndex::from_labels(rows.iter().map(|(_, label)| label.as_str()));
    let counts = index.counts();
    info!(
        "Populations: {}",
        counts
            .iter()
            .map(|(label, n)| format!("{} (n={})", label, n))
            .join(", ")
    );

    let literature: BTreeMap<String, f64> = counts
        .keys()
        .map(|label| (label.clone(), panel.literature_heterozygosity(label)))
        .collect();
    let heterozygosity = stats::HeterozygosityTable::from_scalars(&literature);

    let observed = heterozygosity.observed_scalars();
    let score = compose_heim_score(&counts, &observed, 0, options.weights, panel);
    info!("Score: {:.1}/100 ({})", score.score, score.rating);

    let context = ReportContext {
        input_path: &options.input,
        input_sha256: checksum,
        score: &score,
        panel,
        heterozygosity: Some(&heterozygosity),
        fst: None,
        pca: None,
        sample_names: None,
        sample_labels: None,
        n_variants: None,
        population_map: None,
        het_from_literature: true,
    };
    report::write_all(&context, &options.output_dir)?;
    report::print_terminal_summary(&score, panel);

    println!("{}", "Analysis complete.".green());
    info!(
        "Report: {}",
        options.output_dir.join("report.md").display()
    );

    Ok(score)
}
