// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Study results CLI for SRL weight-learning experiments
//!
//! Usage:
//!   write-study-results psl
//!   write-study-results tuffy --study sampling --root ./experiments --format all

use anyhow::{bail, Result};
use clap::Parser;
use srl_wl_results::datasets::DatasetRegistry;
use srl_wl_results::paths::{SrlMethod, Study, StudyLayout};
use srl_wl_results::pipeline::{format_optional, StudyConfig, StudyPipeline};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "write-study-results")]
#[command(about = "Summarize weight-learning study results into a CSV")]
#[command(version)]
struct Args {
    /// SRL method whose results are summarized (psl, tuffy)
    method: String,

    /// Study to summarize (robustness, sampling, acquisition)
    #[arg(short, long, default_value = "robustness")]
    study: String,

    /// Experiment root holding data/ and results/weightlearning/
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Dataset directory (overrides <root>/data)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Results directory (overrides <root>/results/weightlearning)
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Data fold holding truth, observed and target files
    #[arg(long, default_value_t = 0)]
    fold: usize,

    /// Datasets to include (comma-separated, empty = all)
    #[arg(short, long)]
    datasets: Option<String>,

    /// Weight-learning methods to include (comma-separated, empty = all)
    #[arg(short, long)]
    wl_methods: Option<String>,

    /// JSON file with per-dataset evaluation predicates
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output CSV path (defaults to <results>/<method>/<study>_study/<method>_<study>.csv)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format (csv, json, markdown, all)
    #[arg(short, long, default_value = "csv")]
    format: String,
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let method: SrlMethod = args.method.parse()?;
    let study: Study = args.study.parse()?;

    if !["csv", "json", "markdown", "all"].contains(&args.format.as_str()) {
        bail!("Unknown output format '{}'. Try: [csv, json, markdown, all]", args.format);
    }

    let mut datasets = match args.config {
        Some(ref path) => DatasetRegistry::load(path)?,
        None => DatasetRegistry::builtin(),
    };
    let dataset_filter = split_list(args.datasets);
    if !dataset_filter.is_empty() {
        datasets.retain(&dataset_filter);
    }

    let layout = StudyLayout::resolve(&args.root, args.data_dir, args.results_dir);
    let csv_path = args.output.unwrap_or_else(|| layout.output_path(method, study));

    tracing::info!("SRL Weight-Learning Study Results");
    tracing::info!("=================================");
    tracing::info!("Method: {}", method);
    tracing::info!("Study: {}", study);
    tracing::info!("Fold: {}", args.fold);

    let config = StudyConfig {
        method,
        study,
        layout,
        fold: args.fold,
        datasets,
        wl_methods: split_list(args.wl_methods),
    };

    let pipeline = StudyPipeline::new(config);
    let results = pipeline.run()?;

    // Print summary to console
    println!("\n{}", "=".repeat(78));
    println!("{} {} STUDY", method.as_str().to_uppercase(), study.short_name().to_uppercase());
    println!("{}", "=".repeat(78));
    println!(
        "{:<12} {:<18} {:<12} {:>8} {:>6} {:>8} {:>8}",
        "Dataset", "WL Method", "Evaluator", "Variant", "Runs", "Mean", "Std"
    );
    println!("{:-<78}", "");

    for row in &results.rows {
        println!(
            "{:<12} {:<18} {:<12} {:>8} {:>6} {:>8} {:>8}",
            row.dataset,
            row.wl_method,
            row.evaluation_method,
            row.variant.as_deref().unwrap_or("-"),
            row.iterations,
            format_optional(row.mean),
            format_optional(row.standard_deviation)
        );
    }
    println!("{:-<78}", "");

    // Save outputs
    if args.format == "csv" || args.format == "all" {
        StudyPipeline::save_csv(&results, &csv_path)?;
        println!("\nCSV results saved to: {}", csv_path.display());
    }

    if args.format == "json" || args.format == "all" {
        let json_path = csv_path.with_extension("json");
        StudyPipeline::save_json(&results, &json_path)?;
        println!("JSON results saved to: {}", json_path.display());
    }

    if args.format == "markdown" || args.format == "all" {
        let report = StudyPipeline::generate_report(&results);
        let md_path = csv_path.with_extension("md");
        if let Some(parent) = md_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&md_path, report)?;
        println!("Markdown report saved to: {}", md_path.display());
    }

    println!("\nAggregation complete!");

    Ok(())
}
