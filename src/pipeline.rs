// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Study aggregation pipeline
//!
//! Orchestrates:
//! - Traversal of `dataset / wl_method / evaluator / [variant /] iteration` directories
//! - Loading truth, observed and target frames once per dataset
//! - Scoring every iteration's predictions with the evaluator it was tuned for
//! - Mean and standard deviation per combination
//! - Results serialization (CSV, JSON, Markdown)

use crate::datasets::DatasetRegistry;
use crate::frames::{load_prediction_frame, EvaluationFrames};
use crate::metrics::{Evaluator, SummaryStatistics};
use crate::paths::{list_subdirs, RunPath, SrlMethod, Study, StudyLayout};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the study pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyConfig {
    /// SRL system whose results are aggregated
    pub method: SrlMethod,
    pub study: Study,
    pub layout: StudyLayout,
    /// Data fold holding the truth, observed and target files
    pub fold: usize,
    /// Evaluation predicate per dataset
    pub datasets: DatasetRegistry,
    /// Weight-learning methods to include (empty = all)
    pub wl_methods: Vec<String>,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            method: SrlMethod::Psl,
            study: Study::Robustness,
            layout: StudyLayout::default(),
            fold: 0,
            datasets: DatasetRegistry::default(),
            wl_methods: vec![],
        }
    }
}

/// Summary of all iterations of one combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyRow {
    pub dataset: String,
    pub wl_method: String,
    pub evaluation_method: String,
    /// Alpha value or acquisition function for studies that have one
    pub variant: Option<String>,
    /// Iterations that were scored
    pub iterations: usize,
    /// Iterations skipped for a missing prediction file or an undefined metric
    pub skipped: usize,
    pub mean: Option<f64>,
    pub standard_deviation: Option<f64>,
}

/// Complete study results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyResults {
    pub config: StudyConfig,
    pub rows: Vec<StudyRow>,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

/// Main study pipeline
pub struct StudyPipeline {
    config: StudyConfig,
}

impl StudyPipeline {
    pub fn new(config: StudyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    /// Walk the study directory and summarize every combination found
    pub fn run(&self) -> Result<StudyResults> {
        let study_dir = self.config.layout.study_dir(self.config.method, self.config.study);
        if !study_dir.is_dir() {
            bail!("Study directory does not exist: {}", study_dir.display());
        }

        tracing::info!("Aggregating {} {} study in {}", self.config.method, self.config.study, study_dir.display());

        let mut rows = Vec::new();

        for dataset in list_subdirs(&study_dir)? {
            let Some(predicate) = self.config.datasets.evaluation_predicate(&dataset) else {
                tracing::warn!("No evaluation predicate configured for dataset '{}', skipping", dataset);
                continue;
            };

            let frames = match EvaluationFrames::load(&self.config.layout, &dataset, self.config.fold, predicate) {
                Ok(frames) => frames,
                Err(err) if err.is_missing() => {
                    tracing::warn!("Skipping dataset '{}': {}", dataset, err);
                    continue;
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("Failed to load evaluation frames for {}", dataset));
                }
            };

            self.aggregate_dataset(&study_dir, &dataset, predicate, &frames, &mut rows)?;
        }

        tracing::info!("Aggregated {} combinations", rows.len());

        Ok(StudyResults {
            config: self.config.clone(),
            rows,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    fn aggregate_dataset(
        &self,
        study_dir: &Path,
        dataset: &str,
        predicate: &str,
        frames: &EvaluationFrames,
        rows: &mut Vec<StudyRow>,
    ) -> Result<()> {
        let dataset_dir = study_dir.join(dataset);

        for wl_method in list_subdirs(&dataset_dir)? {
            if !self.config.wl_methods.is_empty() && !self.config.wl_methods.contains(&wl_method) {
                continue;
            }

            let wl_dir = dataset_dir.join(&wl_method);
            for evaluator_name in list_subdirs(&wl_dir)? {
                let Some(evaluator) = Evaluator::from_dir_name(&evaluator_name) else {
                    tracing::warn!("Unknown evaluator '{}' in {}, skipping", evaluator_name, wl_dir.display());
                    continue;
                };

                let evaluator_dir = wl_dir.join(&evaluator_name);
                let variants: Vec<Option<String>> = if self.config.study.variant_column().is_some() {
                    list_subdirs(&evaluator_dir)?.into_iter().map(Some).collect()
                } else {
                    vec![None]
                };

                for variant in variants {
                    let iterations_dir = match variant {
                        Some(ref v) => evaluator_dir.join(v),
                        None => evaluator_dir.clone(),
                    };

                    let mut run = RunPath {
                        dataset: dataset.to_string(),
                        wl_method: wl_method.clone(),
                        evaluator: evaluator_name.clone(),
                        variant,
                        iteration: String::new(),
                    };

                    let iterations = list_subdirs(&iterations_dir)?;
                    let row = self.evaluate_iterations(evaluator, predicate, frames, &mut run, &iterations)?;

                    tracing::info!(
                        "  {} / {} / {}{} - {} iterations, mean={}, std={}",
                        row.dataset,
                        row.wl_method,
                        row.evaluation_method,
                        row.variant.as_deref().map(|v| format!(" / {}", v)).unwrap_or_default(),
                        row.iterations,
                        format_optional(row.mean),
                        format_optional(row.standard_deviation)
                    );

                    rows.push(row);
                }
            }
        }

        Ok(())
    }

    /// Score each iteration of one combination and summarize the scores
    fn evaluate_iterations(
        &self,
        evaluator: Evaluator,
        predicate: &str,
        frames: &EvaluationFrames,
        run: &mut RunPath,
        iterations: &[String],
    ) -> Result<StudyRow> {
        let mut scores = Vec::with_capacity(iterations.len());
        let mut skipped = 0;

        for iteration in iterations {
            run.iteration = iteration.clone();

            let predicted =
                match load_prediction_frame(&self.config.layout, self.config.method, self.config.study, run, predicate) {
                    Ok(frame) => frame,
                    Err(err) if err.is_missing() || err.is_malformed() => {
                        tracing::warn!("Skipping iteration {}: {}", iteration, err);
                        skipped += 1;
                        continue;
                    }
                    Err(err) => {
                        return Err(err).with_context(|| format!("Failed to load predictions for iteration {}", iteration));
                    }
                };

            match evaluator.evaluate(&predicted, &frames.truth, &frames.observed, &frames.target) {
                Ok(score) => {
                    tracing::debug!("    iteration {}: {} = {:.4}", iteration, evaluator.metric_name(), score);
                    scores.push(score);
                }
                Err(err) => {
                    tracing::warn!("Iteration {} of {}/{}: {}", iteration, run.dataset, run.wl_method, err);
                    skipped += 1;
                }
            }
        }

        let stats = SummaryStatistics::from_values(&scores);

        Ok(StudyRow {
            dataset: run.dataset.clone(),
            wl_method: run.wl_method.clone(),
            evaluation_method: evaluator.name().to_string(),
            variant: run.variant.clone(),
            iterations: stats.count,
            skipped,
            mean: stats.mean,
            standard_deviation: stats.std_dev,
        })
    }

    /// CSV header for a study
    pub fn csv_header(study: Study) -> Vec<&'static str> {
        let mut header = vec!["Dataset", "Wl_Method", "Evaluation_Method"];
        if let Some(column) = study.variant_column() {
            header.push(column);
        }
        header.extend(["Mean", "Standard_Deviation"]);
        header
    }

    /// Write one row per combination, overwriting `output_path`
    pub fn save_csv(results: &StudyResults, output_path: &Path) -> Result<()> {
        std::fs::create_dir_all(output_path.parent().unwrap_or(Path::new(".")))?;
        let mut writer = csv::Writer::from_path(output_path)
            .with_context(|| format!("Failed to create {}", output_path.display()))?;

        let has_variant = results.config.study.variant_column().is_some();
        writer.write_record(Self::csv_header(results.config.study))?;

        for row in &results.rows {
            let mut record = vec![row.dataset.clone(), row.wl_method.clone(), row.evaluation_method.clone()];
            if has_variant {
                record.push(row.variant.clone().unwrap_or_default());
            }
            record.push(row.mean.map(format_csv_float).unwrap_or_default());
            record.push(row.standard_deviation.map(format_csv_float).unwrap_or_default());
            writer.write_record(&record)?;
        }

        writer.flush()?;
        tracing::info!("Results saved to {}", output_path.display());
        Ok(())
    }

    /// Save results to JSON file
    pub fn save_json(results: &StudyResults, output_path: &Path) -> Result<()> {
        std::fs::create_dir_all(output_path.parent().unwrap_or(Path::new(".")))?;
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(output_path, json)?;
        tracing::info!("Results saved to {}", output_path.display());
        Ok(())
    }

    /// Generate a markdown report
    pub fn generate_report(results: &StudyResults) -> String {
        let mut report = String::new();
        let study = results.config.study;

        report.push_str(&format!(
            "# {} {} Study Results\n\n",
            results.config.method.as_str().to_uppercase(),
            capitalize(study.short_name())
        ));
        report.push_str(&format!("**Generated:** {}\n\n", results.timestamp.format("%Y-%m-%d %H:%M:%S UTC")));
        report.push_str(&format!("**Version:** {}\n\n", results.version));
        report.push_str(&format!("**Fold:** {}\n\n", results.config.fold));

        let variant_column = study.variant_column();
        report.push_str("| Dataset | WL Method | Evaluator |");
        if let Some(column) = variant_column {
            report.push_str(&format!(" {} |", column));
        }
        report.push_str(" Iterations | Mean | Std Dev |\n");

        report.push_str("|---------|-----------|-----------|");
        if variant_column.is_some() {
            report.push_str("------|");
        }
        report.push_str("------------|------|---------|\n");

        for row in &results.rows {
            report.push_str(&format!("| {} | {} | {} |", row.dataset, row.wl_method, row.evaluation_method));
            if variant_column.is_some() {
                report.push_str(&format!(" {} |", row.variant.as_deref().unwrap_or("-")));
            }
            report.push_str(&format!(
                " {} | {} | {} |\n",
                row.iterations,
                format_optional(row.mean),
                format_optional(row.standard_deviation)
            ));
        }

        let skipped: usize = results.rows.iter().map(|r| r.skipped).sum();
        if skipped > 0 {
            report.push_str(&format!("\n{} iterations were skipped.\n", skipped));
        }

        report
    }
}

/// Shortest round-trip form that keeps a decimal point (`1.0`, `0.125`)
fn format_csv_float(value: f64) -> String {
    format!("{:?}", value)
}

/// `-` for a missing value, four decimals otherwise
pub fn format_optional(value: Option<f64>) -> String {
    value.map_or("-".to_string(), |v| format!("{:.4}", v))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    /// Experiment tree with one cora dataset and two BOWLOS iterations per evaluator
    fn write_fixture(root: &Path) -> StudyLayout {
        let layout = StudyLayout::from_root(root);

        let eval_dir = layout.eval_dir("cora", 0);
        std::fs::create_dir_all(&eval_dir).unwrap();
        std::fs::write(eval_dir.join("hasCat_truth.txt"), "1\t1\t1\n1\t2\t0\n2\t1\t0\n2\t2\t1\n").unwrap();
        std::fs::write(eval_dir.join("hasCat_obs.txt"), "3\t1\t1\n3\t2\t0\n").unwrap();
        std::fs::write(eval_dir.join("hasCat_targets.txt"), "1\t1\n1\t2\n2\t1\n2\t2\n").unwrap();

        let run = |evaluator: &str, iteration: &str| RunPath {
            dataset: "cora".to_string(),
            wl_method: "BOWLOS".to_string(),
            evaluator: evaluator.to_string(),
            variant: None,
            iteration: iteration.to_string(),
        };

        let write_prediction = |evaluator: &str, iteration: &str, text: &str| {
            let path = layout.prediction_path(SrlMethod::Psl, Study::Robustness, &run(evaluator, iteration), "hasCat");
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, text).unwrap();
        };

        // Iteration 0 gets both entities right, iteration 1 only entity 1.
        write_prediction("Categorical", "0", "1\t1\t0.9\n1\t2\t0.1\n2\t1\t0.2\n2\t2\t0.8\n");
        write_prediction("Categorical", "1", "1\t1\t0.9\n1\t2\t0.1\n2\t1\t0.7\n2\t2\t0.3\n");

        // MSE 0 and 0.25
        write_prediction("Continuous", "0", "1\t1\t1\n1\t2\t0\n2\t1\t0\n2\t2\t1\n");
        write_prediction("Continuous", "1", "1\t1\t0.5\n1\t2\t0.5\n2\t1\t0.5\n2\t2\t0.5\n");

        // Iteration 1 has no prediction file and is skipped.
        write_prediction("Discrete", "0", "1\t1\t1\n1\t2\t0\n2\t1\t0\n2\t2\t1\n");
        std::fs::create_dir_all(layout.iteration_dir(SrlMethod::Psl, Study::Robustness, &run("Discrete", "1"))).unwrap();

        layout
    }

    fn config(layout: StudyLayout) -> StudyConfig {
        StudyConfig {
            layout,
            ..StudyConfig::default()
        }
    }

    fn row<'a>(results: &'a StudyResults, evaluator: &str) -> &'a StudyRow {
        results
            .rows
            .iter()
            .find(|r| r.evaluation_method == evaluator)
            .expect("row for evaluator")
    }

    #[test]
    fn test_pipeline_robustness() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = write_fixture(tmp.path());

        let results = StudyPipeline::new(config(layout)).run().expect("Pipeline should succeed");

        assert_eq!(results.rows.len(), 3);

        let categorical = row(&results, "Categorical");
        assert_eq!(categorical.dataset, "cora");
        assert_eq!(categorical.wl_method, "BOWLOS");
        assert_eq!(categorical.iterations, 2);
        assert!((categorical.mean.unwrap() - 0.75).abs() < 1e-6);
        assert!((categorical.standard_deviation.unwrap() - 0.25).abs() < 1e-6);

        let continuous = row(&results, "Continuous");
        assert!((continuous.mean.unwrap() - 0.125).abs() < 1e-6);
        assert!((continuous.standard_deviation.unwrap() - 0.125).abs() < 1e-6);

        let discrete = row(&results, "Discrete");
        assert_eq!(discrete.iterations, 1);
        assert_eq!(discrete.skipped, 1);
        assert!((discrete.mean.unwrap() - 1.0).abs() < 1e-6);
        assert!(discrete.standard_deviation.unwrap().abs() < 1e-6);
    }

    #[test]
    fn test_pipeline_skips_non_finite_prediction() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = write_fixture(tmp.path());

        for (iteration, text) in [("0", "1\t1\tNaN\n1\t2\t0.3\n"), ("1", "1\t1\t0.9\n1\t2\t0.3\n2\t1\t0.2\n2\t2\t0.8\n")] {
            let run = RunPath {
                dataset: "cora".to_string(),
                wl_method: "BOWLOS".to_string(),
                evaluator: "Ranking".to_string(),
                variant: None,
                iteration: iteration.to_string(),
            };
            let path = layout.prediction_path(SrlMethod::Psl, Study::Robustness, &run, "hasCat");
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, text).unwrap();
        }

        let results = StudyPipeline::new(config(layout)).run().expect("Pipeline should succeed");

        let ranking = row(&results, "Ranking");
        assert_eq!(ranking.iterations, 1);
        assert_eq!(ranking.skipped, 1);
        assert!((ranking.mean.unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_pipeline_skips_unknown_dataset_and_evaluator() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = write_fixture(tmp.path());
        let study_dir = layout.study_dir(SrlMethod::Psl, Study::Robustness);
        std::fs::create_dir_all(study_dir.join("movielens").join("BOWLOS").join("Categorical").join("0")).unwrap();
        std::fs::create_dir_all(study_dir.join("cora").join("BOWLOS").join("Hamming").join("0")).unwrap();

        let results = StudyPipeline::new(config(layout)).run().expect("Pipeline should succeed");

        assert_eq!(results.rows.len(), 3);
        assert!(results.rows.iter().all(|r| r.dataset == "cora"));
    }

    #[test]
    fn test_pipeline_skips_dataset_without_frames() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = write_fixture(tmp.path());
        let study_dir = layout.study_dir(SrlMethod::Psl, Study::Robustness);
        std::fs::create_dir_all(study_dir.join("citeseer").join("BOWLOS").join("Categorical").join("0")).unwrap();

        let results = StudyPipeline::new(config(layout)).run().expect("Pipeline should succeed");
        assert!(results.rows.iter().all(|r| r.dataset != "citeseer"));
    }

    #[test]
    fn test_pipeline_wl_method_filter() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = write_fixture(tmp.path());

        let mut config = config(layout);
        config.wl_methods = vec!["MLE".to_string()];

        let results = StudyPipeline::new(config).run().expect("Pipeline should succeed");
        assert!(results.rows.is_empty());
    }

    #[test]
    fn test_pipeline_missing_study_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let result = StudyPipeline::new(config(StudyLayout::from_root(tmp.path()))).run();
        assert!(result.is_err());
    }

    #[test]
    fn test_pipeline_sampling_variants() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = write_fixture(tmp.path());

        for alpha in ["0.1", "0.5"] {
            let run = RunPath {
                dataset: "cora".to_string(),
                wl_method: "RGS".to_string(),
                evaluator: "Continuous".to_string(),
                variant: Some(alpha.to_string()),
                iteration: "0".to_string(),
            };
            let path = layout.prediction_path(SrlMethod::Psl, Study::Sampling, &run, "hasCat");
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "1\t1\t1\n1\t2\t0\n2\t1\t0\n2\t2\t1\n").unwrap();
        }

        let mut config = config(layout);
        config.study = Study::Sampling;

        let results = StudyPipeline::new(config).run().expect("Pipeline should succeed");

        let variants: Vec<_> = results.rows.iter().map(|r| r.variant.clone()).collect();
        assert_eq!(variants, vec![Some("0.1".to_string()), Some("0.5".to_string())]);
        assert!(results.rows.iter().all(|r| r.mean == Some(0.0)));
    }

    #[test]
    fn test_pipeline_tuffy_predictions() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = write_fixture(tmp.path());

        let run = RunPath {
            dataset: "cora".to_string(),
            wl_method: "DiagonalNewton".to_string(),
            evaluator: "Discrete".to_string(),
            variant: None,
            iteration: "0".to_string(),
        };
        let path = layout.prediction_path(SrlMethod::Tuffy, Study::Robustness, &run, "hasCat");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "hasCat(\"1\", \"1\")\nhasCat(\"2\", \"2\")\n").unwrap();

        let mut config = config(layout);
        config.method = SrlMethod::Tuffy;

        let results = StudyPipeline::new(config).run().expect("Pipeline should succeed");

        assert_eq!(results.rows.len(), 1);
        assert!((results.rows[0].mean.unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_save_csv() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = write_fixture(tmp.path());
        let results = StudyPipeline::new(config(layout.clone())).run().expect("Pipeline should succeed");

        let output = layout.output_path(SrlMethod::Psl, Study::Robustness);
        StudyPipeline::save_csv(&results, &output).unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Dataset,Wl_Method,Evaluation_Method,Mean,Standard_Deviation"));
        assert_eq!(lines.next(), Some("cora,BOWLOS,Categorical,0.75,0.25"));
        assert_eq!(lines.next(), Some("cora,BOWLOS,Continuous,0.125,0.125"));
        assert_eq!(lines.next(), Some("cora,BOWLOS,Discrete,1.0,0.0"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_save_csv_empty_statistics() {
        let tmp = tempfile::tempdir().unwrap();
        let results = StudyResults {
            config: StudyConfig {
                study: Study::Acquisition,
                ..StudyConfig::default()
            },
            rows: vec![StudyRow {
                dataset: "jester".to_string(),
                wl_method: "HB".to_string(),
                evaluation_method: "Ranking".to_string(),
                variant: Some("UCB".to_string()),
                iterations: 0,
                skipped: 3,
                mean: None,
                standard_deviation: None,
            }],
            timestamp: Utc::now(),
            version: "test".to_string(),
        };

        let output: PathBuf = tmp.path().join("out").join("summary.csv");
        StudyPipeline::save_csv(&results, &output).unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        assert_eq!(
            text,
            "Dataset,Wl_Method,Evaluation_Method,Acquisition,Mean,Standard_Deviation\njester,HB,Ranking,UCB,,\n"
        );
    }

    #[test]
    fn test_save_json_and_report() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = write_fixture(tmp.path());
        let results = StudyPipeline::new(config(layout)).run().expect("Pipeline should succeed");

        let json_path = tmp.path().join("summary.json");
        StudyPipeline::save_json(&results, &json_path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(json["rows"].as_array().map(Vec::len), Some(3));
        assert_eq!(json["config"]["method"], "psl");

        let report = StudyPipeline::generate_report(&results);
        assert!(report.contains("PSL Robustness Study Results"));
        assert!(report.contains("| cora | BOWLOS | Categorical | 2 | 0.7500 | 0.2500 |"));
        assert!(report.contains("1 iterations were skipped."));
    }
}
