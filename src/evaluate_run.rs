// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Standalone run evaluator
//!
//! Scores a single iteration's predictions with every evaluator for quick inspection

use anyhow::{Context, Result};
use clap::Parser;
use srl_wl_results::datasets::DatasetRegistry;
use srl_wl_results::frames::{load_prediction_frame, EvaluationFrames};
use srl_wl_results::metrics::Evaluator;
use srl_wl_results::paths::{RunPath, SrlMethod, Study, StudyLayout};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "evaluate-run")]
#[command(about = "Score one weight-learning run with every evaluator")]
#[command(version)]
struct Args {
    /// SRL method that produced the run (psl, tuffy)
    method: String,

    /// Dataset name
    #[arg(short, long)]
    dataset: String,

    /// Weight-learning method directory
    #[arg(short, long)]
    wl_method: String,

    /// Evaluator directory the run was tuned for
    #[arg(short, long, default_value = "Categorical")]
    evaluator: String,

    /// Iteration directory
    #[arg(short, long, default_value = "0")]
    iteration: String,

    /// Study the run belongs to (robustness, sampling, acquisition)
    #[arg(short, long, default_value = "robustness")]
    study: String,

    /// Alpha value or acquisition function directory (sampling and acquisition studies)
    #[arg(long)]
    variant: Option<String>,

    /// Experiment root holding data/ and results/weightlearning/
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Data fold holding truth, observed and target files
    #[arg(long, default_value_t = 0)]
    fold: usize,

    /// Predicate to score (defaults to the dataset's evaluation predicate)
    #[arg(short, long)]
    predicate: Option<String>,

    /// JSON file with per-dataset evaluation predicates
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let method: SrlMethod = args.method.parse()?;
    let study: Study = args.study.parse()?;
    let layout = StudyLayout::from_root(&args.root);

    let registry = match args.config {
        Some(ref path) => DatasetRegistry::load(path)?,
        None => DatasetRegistry::builtin(),
    };

    let predicate = match args.predicate {
        Some(predicate) => predicate,
        None => registry
            .evaluation_predicate(&args.dataset)
            .map(str::to_string)
            .with_context(|| format!("No evaluation predicate configured for dataset '{}'", args.dataset))?,
    };

    let run = RunPath {
        dataset: args.dataset.clone(),
        wl_method: args.wl_method,
        evaluator: args.evaluator,
        variant: args.variant,
        iteration: args.iteration,
    };

    let frames = EvaluationFrames::load(&layout, &run.dataset, args.fold, &predicate)?;
    let predicted = load_prediction_frame(&layout, method, study, &run, &predicate)?;

    println!("\nRun: {}", layout.iteration_dir(method, study, &run).display());
    println!("  Predicate: {}", predicate);
    println!("  Predicted atoms: {}", predicted.len());
    println!("  Target atoms: {}", frames.target.len());
    println!("  Truth atoms: {}", frames.truth.len());
    println!("  Observed atoms: {}", frames.observed.len());

    println!("\n{}", "=".repeat(50));
    println!("{:<14} {:<10} {:>10}", "Evaluator", "Metric", "Score");
    println!("{:-<50}", "");

    for evaluator in Evaluator::ALL {
        let score = match evaluator.evaluate(&predicted, &frames.truth, &frames.observed, &frames.target) {
            Ok(score) => format!("{:.4}", score),
            Err(err) => {
                tracing::debug!("{} undefined: {}", evaluator, err);
                "-".to_string()
            }
        };
        let marker = if evaluator.name() == run.evaluator { " *" } else { "" };
        println!("{:<14} {:<10} {:>10}{}", evaluator.name(), evaluator.metric_name(), score, marker);
    }
    println!("{:-<50}", "");

    Ok(())
}
