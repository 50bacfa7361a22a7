use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use chrono::Utc;
use colored::Colorize;
use log::info;
use prettytable::{row, Table};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::pca::PcaProjection;
use crate::pipeline::ScoreError;
use crate::populations::UNKNOWN_POPULATION;
use crate::score::{HeimScore, Rating, ReferencePanel};
use crate::stats::{HeterozygosityTable, PairwiseFstMatrix};

/// Cell text for statistics that could not be computed.
pub const UNDEFINED_CELL: &str = "NA";

/// Everything the reporter needs to render one run. Optional members are
/// absent for ancestry-only runs (no genotypes means no per-site
/// heterozygosity, no FST matrix and no PCA).
pub struct ReportContext<'a> {
    pub input_path: &'a Path,
    pub input_sha256: String,
    pub score: &'a HeimScore,
    pub panel: &'a ReferencePanel,
    pub heterozygosity: Option<&'a HeterozygosityTable>,
    pub fst: Option<&'a PairwiseFstMatrix>,
    pub pca: Option<&'a PcaProjection>,
    pub sample_names: Option<&'a [String]>,
    pub sample_labels: Option<Vec<&'a str>>,
    pub n_variants: Option<usize>,
    pub population_map: Option<&'a Path>,
    pub het_from_literature: bool,
}

/// Writes every artifact for a run: the CSV/TSV tables, the JSON score
/// record and the markdown report.
pub fn write_all(context: &ReportContext, output_dir: &Path) -> Result<(), ScoreError> {
    let tables_dir = output_dir.join("tables");
    fs::create_dir_all(&tables_dir)?;

    write_population_summary(context, &tables_dir.join("population_summary.csv"))?;
    if let Some(het) = context.heterozygosity {
        write_heterozygosity(het, &tables_dir.join("heterozygosity.csv"))?;
    }
    if let Some(fst) = context.fst {
        write_fst_matrix(fst, &tables_dir.join("fst_matrix.csv"))?;
    }
    if let (Some(pca), Some(names)) = (context.pca, context.sample_names) {
        write_pca_coordinates(
            pca,
            names,
            context.sample_labels.as_deref(),
            &tables_dir.join("pca_coordinates.tsv"),
        )?;
    }
    write_score_json(context, &tables_dir.join("heim_score.json"))?;
    write_markdown_report(context, output_dir, &output_dir.join("report.md"))?;

    info!("Report artifacts written to {}", output_dir.display());
    Ok(())
}

fn write_population_summary(context: &ReportContext, path: &Path) -> Result<(), ScoreError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "population",
        "count",
        "proportion",
        "reference_proportion",
        "ratio",
        "observed_het",
        "expected_het",
    ])?;

    let total = context.score.n_samples as f64;
    for (label, &count) in &context.score.population_counts {
        let proportion = if total > 0.0 { count as f64 / total } else { 0.0 };
        let reference = context.panel.reference_proportion(&label.to_uppercase());
        let ratio = reference.filter(|r| *r > 0.0).map(|r| proportion / r);
        let het = context.heterozygosity.and_then(|t| t.get(label));

        let count_cell = count.to_string();
        let proportion_cell = format!("{:.6}", proportion);
        let reference_cell = fmt_optional(reference, 4);
        let ratio_cell = fmt_optional(ratio, 4);
        let observed_cell = fmt_optional(het.and_then(|h| h.observed), 6);
        let expected_cell = fmt_optional(het.and_then(|h| h.expected), 6);
        writer.write_record([
            label.as_str(),
            count_cell.as_str(),
            proportion_cell.as_str(),
            reference_cell.as_str(),
            ratio_cell.as_str(),
            observed_cell.as_str(),
            expected_cell.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_heterozygosity(table: &HeterozygosityTable, path: &Path) -> Result<(), ScoreError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["population", "observed_het", "expected_het"])?;
    for (label, het) in table.iter() {
        let observed = fmt_optional(het.observed, 6);
        let expected = fmt_optional(het.expected, 6);
        writer.write_record([label, observed.as_str(), expected.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_fst_matrix(fst: &PairwiseFstMatrix, path: &Path) -> Result<(), ScoreError> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec!["population".to_string()];
    header.extend(fst.labels().iter().cloned());
    writer.write_record(&header)?;

    for (i, label) in fst.labels().iter().enumerate() {
        let mut record = vec![label.clone()];
        for j in 0..fst.n_populations() {
            record.push(fmt_optional(fst.value(i, j), 6));
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_pca_coordinates(
    pca: &PcaProjection,
    sample_names: &[String],
    sample_labels: Option<&[&str]>,
    path: &Path,
) -> Result<(), ScoreError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    write!(writer, "sample\tpopulation")?;
    for component in 0..pca.n_components() {
        write!(writer, "\tPC{}", component + 1)?;
    }
    writeln!(writer)?;

    for (idx, name) in sample_names.iter().enumerate() {
        let label = sample_labels
            .and_then(|labels| labels.get(idx).copied())
            .unwrap_or(UNKNOWN_POPULATION);
        write!(writer, "{}\t{}", name, label)?;
        for component in 0..pca.n_components() {
            write!(writer, "\t{:.6}", pca.coordinates[[idx, component]])?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct ScoreDocument<'a> {
    generated: String,
    input: String,
    input_sha256: &'a str,
    heterozygosity_source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    n_variants: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    explained_variance_ratio: Option<&'a [f64]>,
    #[serde(flatten)]
    score: &'a HeimScore,
}

fn write_score_json(context: &ReportContext, path: &Path) -> Result<(), ScoreError> {
    let document = ScoreDocument {
        generated: Utc::now().format("%Y-%m-%d %H:%M UTC").to_string(),
        input: context.input_path.display().to_string(),
        input_sha256: &context.input_sha256,
        heterozygosity_source: if context.het_from_literature {
            "literature_estimate"
        } else {
            "computed"
        },
        n_variants: context.n_variants,
        explained_variance_ratio: context.pca.map(|p| p.explained_variance_ratio.as_slice()),
        score: context.score,
    };

    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &document)?;
    Ok(())
}

fn write_markdown_report(
    context: &ReportContext,
    output_dir: &Path,
    path: &Path,
) -> Result<(), ScoreError> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);
    let score = context.score;
    let now = Utc::now().format("%Y-%m-%d %H:%M UTC");

    writeln!(w, "# HEIM Equity Report")?;
    writeln!(w)?;
    writeln!(w, "**Date**: {}", now)?;
    writeln!(w, "**Input**: `{}`", context.input_path.display())?;
    writeln!(w, "**Checksum (SHA-256)**: `{}`", context.input_sha256)?;
    writeln!(w, "**Samples**: {}", score.n_samples)?;
    writeln!(w, "**Populations**: {}", score.n_populations)?;
    if let Some(n_variants) = context.n_variants {
        writeln!(w, "**Variants analysed**: {}", n_variants)?;
    }
    writeln!(w)?;
    writeln!(w, "---")?;
    writeln!(w)?;
    writeln!(
        w,
        "## HEIM Equity Score: {:.1}/100 ({})",
        score.score, score.rating
    )?;
    writeln!(w)?;
    writeln!(w, "### Score Breakdown")?;
    writeln!(w)?;
    writeln!(w, "| Component | Value | Weight | Description |")?;
    writeln!(w, "|-----------|-------|--------|-------------|")?;
    writeln!(
        w,
        "| Representation Index | {} | {} | Match to global population proportions |",
        fmt_optional(score.components.representation_index, 3),
        score.weights.representation
    )?;
    writeln!(
        w,
        "| Heterozygosity Balance | {:.3} | {} | Genetic diversity relative to the diploid ceiling |",
        score.components.heterozygosity_balance, score.weights.heterozygosity
    )?;
    writeln!(
        w,
        "| FST Coverage | {:.3} | {} | Fraction of pairwise comparisons computed |",
        score.components.fst_coverage, score.weights.fst_coverage
    )?;
    writeln!(
        w,
        "| Geographic Spread | {:.3} | {} | Continental groups represented (out of {}) |",
        score.components.geographic_spread,
        score.weights.geographic_spread,
        context.panel.n_continental_groups()
    )?;

    if let Some(warning) = &score.warning {
        writeln!(w)?;
        writeln!(w, "> **WARNING**: {}", warning)?;
    }
    if context.het_from_literature {
        writeln!(w)?;
        writeln!(
            w,
            "> **Note**: Heterozygosity values are literature estimates (not computed \
             from data). Provide VCF genotype data for computed values."
        )?;
    }

    if score.n_samples > 0 {
        writeln!(w)?;
        writeln!(w, "### Key Findings")?;
        writeln!(w)?;

        let mut ranked: Vec<(&String, &usize)> = score.population_counts.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        let total = score.n_samples as f64;

        if let (Some(&(most_label, &most_count)), Some(&(least_label, &least_count))) =
            (ranked.first(), ranked.last())
        {
            for (heading, label, count) in [
                ("Most represented", most_label, most_count),
                ("Least represented", least_label, least_count),
            ] {
                let share = count as f64 / total;
                let reference = context
                    .panel
                    .reference_proportion(&label.to_uppercase())
                    .unwrap_or(0.01);
                writeln!(
                    w,
                    "- **{}**: {} ({:.1}% of samples, {:.1}x the reference share)",
                    heading,
                    label,
                    share * 100.0,
                    share / reference
                )?;
            }
        }

        if let Some(table) = context.heterozygosity {
            let defined: Vec<(&str, f64)> = table
                .iter()
                .filter_map(|(label, het)| het.observed.map(|value| (label, value)))
                .collect();
            if !defined.is_empty() {
                let mean = defined.iter().map(|(_, v)| *v).sum::<f64>() / defined.len() as f64;
                let max = defined
                    .iter()
                    .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
                if let Some(&(max_label, max_value)) = max {
                    writeln!(
                        w,
                        "- **Mean observed heterozygosity**: {:.4} (highest: {} at {:.4})",
                        mean, max_label, max_value
                    )?;
                }
            }
        }
    }

    writeln!(w)?;
    writeln!(w, "---")?;
    writeln!(w)?;
    writeln!(w, "## Population Distribution")?;
    writeln!(w)?;
    writeln!(
        w,
        "| Population | Count | Sample % | Reference % | Ratio | Obs Het | Exp Het |"
    )?;
    writeln!(
        w,
        "|------------|-------|----------|-------------|-------|---------|---------|"
    )?;
    for (label, &count) in &score.population_counts {
        let share = if score.n_samples > 0 {
            count as f64 / score.n_samples as f64
        } else {
            0.0
        };
        let reference = context.panel.reference_proportion(&label.to_uppercase());
        let reference_cell = match reference {
            Some(r) => format!("{:.1}%", r * 100.0),
            None => UNDEFINED_CELL.to_string(),
        };
        let ratio_cell = match reference {
            Some(r) if r > 0.0 => format!("{:.2}x", share / r),
            _ => UNDEFINED_CELL.to_string(),
        };
        let het = context.heterozygosity.and_then(|t| t.get(label));
        writeln!(
            w,
            "| {} | {} | {:.1}% | {} | {} | {} | {} |",
            label,
            count,
            share * 100.0,
            reference_cell,
            ratio_cell,
            fmt_optional(het.and_then(|h| h.observed), 4),
            fmt_optional(het.and_then(|h| h.expected), 4)
        )?;
    }

    if let Some(fst) = context.fst {
        writeln!(w)?;
        writeln!(w, "## Pairwise FST")?;
        writeln!(w)?;
        writeln!(w, "| Comparison | Nei's Gst |")?;
        writeln!(w, "|------------|-----------|")?;
        for ((a, b), value) in fst.pairs() {
            writeln!(w, "| {} vs {} | {} |", a, b, fmt_optional(value, 4))?;
        }
    }

    if let Some(pca) = context.pca {
        writeln!(w)?;
        writeln!(w, "## Principal Component Analysis")?;
        writeln!(w)?;
        let ratios = &pca.explained_variance_ratio;
        if !ratios.is_empty() {
            writeln!(w, "- PC1 explains {:.1}% of variance", ratios[0] * 100.0)?;
        }
        if ratios.len() > 1 {
            writeln!(w, "- PC2 explains {:.1}% of variance", ratios[1] * 100.0)?;
        }
        let top: f64 = ratios.iter().take(5).sum();
        writeln!(
            w,
            "- Top {} components explain {:.1}% of total variance",
            ratios.len().min(5),
            top * 100.0
        )?;
    }

    writeln!(w)?;
    writeln!(w, "---")?;
    writeln!(w)?;
    writeln!(w, "## Methods")?;
    writeln!(w)?;
    writeln!(w, "- **Tool**: heimscore v{}", env!("CARGO_PKG_VERSION"))?;
    writeln!(
        w,
        "- **HEIM framework**: Health Equity Index for Minorities"
    )?;
    match context.n_variants {
        Some(n) => writeln!(
            w,
            "- **Heterozygosity**: observed = proportion of heterozygous genotypes per \
             site, averaged across {} variants. Expected = 2pq from population allele \
             frequencies.",
            n
        )?,
        None => writeln!(
            w,
            "- **Heterozygosity**: population-level literature estimates; no genotype \
             data was provided."
        )?,
    }
    writeln!(
        w,
        "- **FST**: Nei's Gst (HT-HS)/HT, summed over informative sites before the \
         ratio is taken. Values floored at 0."
    )?;
    if context.pca.is_some() {
        writeln!(
            w,
            "- **PCA**: exact eigendecomposition of the mean-imputed, centered dosage \
             matrix."
        )?;
    }
    writeln!(
        w,
        "- **Reference panel**: approximate continental proportions from the 1000 \
         Genomes Project."
    )?;

    writeln!(w)?;
    writeln!(w, "## Reproducibility")?;
    writeln!(w)?;
    writeln!(w, "```bash")?;
    write!(w, "heimscore --input {}", context.input_path.display())?;
    if let Some(map) = context.population_map {
        write!(w, " --pop-map {}", map.display())?;
    }
    writeln!(w, " --output {}", output_dir.display())?;
    writeln!(w, "```")?;
    writeln!(w)?;
    writeln!(w, "**Input checksum**: `{}`", context.input_sha256)?;

    writeln!(w)?;
    writeln!(w, "## References")?;
    writeln!(w)?;
    writeln!(
        w,
        "- Nei, M. (1973). Analysis of gene diversity in subdivided populations. \
         PNAS, 70(12), 3321-3323."
    )?;
    writeln!(
        w,
        "- The 1000 Genomes Project Consortium (2015). A global reference for human \
         genetic variation. Nature, 526, 68-74."
    )?;

    Ok(())
}

/// Prints the colored score headline and a population table to stdout.
pub fn print_terminal_summary(score: &HeimScore, panel: &ReferencePanel) {
    let headline = format!(
        "HEIM Equity Score: {:.1}/100 ({})",
        score.score, score.rating
    );
    let colored_headline = match score.rating {
        Rating::Excellent | Rating::Good => headline.green().bold(),
        Rating::Fair => headline.yellow().bold(),
        Rating::Poor | Rating::Critical => headline.red().bold(),
    };

    let mut table = Table::new();
    table.add_row(row!["Population", "Samples", "Share", "Reference"]);
    let total = score.n_samples as f64;
    for (label, &count) in &score.population_counts {
        let share = if total > 0.0 {
            format!("{:.1}%", count as f64 / total * 100.0)
        } else {
            UNDEFINED_CELL.to_string()
        };
        let reference = match panel.reference_proportion(&label.to_uppercase()) {
            Some(r) => format!("{:.1}%", r * 100.0),
            None => UNDEFINED_CELL.to_string(),
        };
        table.add_row(row![label, count, share, reference]);
    }

    // Render to a buffer first so the block prints atomically.
    let mut output = Vec::new();
    table
        .print(&mut output)
        .expect("Failed to print table to buffer");
    let table_string = String::from_utf8(output).expect("Failed to convert table to string");

    print!("\n{}\n{}", colored_headline, table_string);
    if let Some(warning) = &score.warning {
        println!("{}", format!("WARNING: {}", warning).yellow());
    }
    std::io::stdout().flush().expect("Failed to flush stdout");
}

/// SHA-256 of a file's contents as lowercase hex.
pub fn sha256_of_file(path: &Path) -> Result<String, ScoreError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn fmt_optional(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", precision, v),
        None => UNDEFINED_CELL.to_string(),
    }
}
