use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;
use rayon::ThreadPoolBuilder;

use heimscore::pipeline::{self, RunOptions, ScoreError};
use heimscore::score::ScoreWeights;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input cohort: VCF (.vcf / .vcf.gz) or ancestry table (.csv / .tsv)
    #[arg(short, long)]
    input: PathBuf,

    /// Sample -> population assignment table (CSV/TSV)
    #[arg(long = "pop-map")]
    pop_map: Option<PathBuf>,

    /// Output directory for the report and tables
    #[arg(short, long, default_value = "equity_report")]
    output: PathBuf,

    /// Number of principal components to compute
    #[arg(long, default_value = "10")]
    components: usize,

    /// Score weights as four comma-separated floats:
    /// representation,heterozygosity,fst_coverage,geographic_spread
    #[arg(long)]
    weights: Option<String>,

    #[arg(short, long, default_value_t = num_cpus::get())]
    threads: usize,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

/// Parses `--weights` into the four component weights, in the order
/// representation, heterozygosity, FST coverage, geographic spread.
fn parse_weights(text: &str) -> Result<ScoreWeights, ScoreError> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(ScoreError::Config(format!(
            "--weights expects four comma-separated values, got {}",
            parts.len()
        )));
    }
    let mut values = [0.0f64; 4];
    for (slot, part) in values.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| ScoreError::Config(format!("invalid weight value: {}", part)))?;
    }
    Ok(ScoreWeights {
        representation: values[0],
        heterozygosity: values[1],
        fst_coverage: values[2],
        geographic_spread: values[3],
    })
}

enum InputKind {
    Genotype,
    Ancestry,
}

fn input_kind(path: &std::path::Path) -> Result<InputKind, ScoreError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if name.ends_with(".vcf") || name.ends_with(".vcf.gz") {
        Ok(InputKind::Genotype)
    } else if name.ends_with(".csv") || name.ends_with(".tsv") {
        Ok(InputKind::Ancestry)
    } else {
        Err(ScoreError::Config(format!(
            "unsupported input type: {} (expected .vcf, .vcf.gz, .csv or .tsv)",
            path.display()
        )))
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.quiet {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    };
    Builder::new().filter_level(level).init();

    ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()?;

    let weights = match args.weights.as_deref() {
        Some(text) => parse_weights(text)?,
        None => ScoreWeights::default(),
    };

    let options = RunOptions {
        input: args.input.clone(),
        population_map: args.pop_map.clone(),
        output_dir: args.output.clone(),
        n_components: args.components,
        weights,
    };

    match input_kind(&args.input)? {
        InputKind::Genotype => pipeline::run_genotype_pipeline(&options)
            .with_context(|| format!("scoring {}", args.input.display()))?,
        InputKind::Ancestry => pipeline::run_ancestry_pipeline(&options)
            .with_context(|| format!("scoring {}", args.input.display()))?,
    };

    Ok(())
}
