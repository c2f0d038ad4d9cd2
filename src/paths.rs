// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Path building for the weight-learning results hierarchy
//!
//! Layout on disk:
//! - `<data>/<dataset>/<fold>/eval/<predicate>_{truth,obs,targets}.txt`
//! - `<results>/<method>/<study>/<dataset>/<wl_method>/<evaluator>/[<variant>/]<iteration>/`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// SRL system that produced the predictions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SrlMethod {
    Psl,
    Tuffy,
}

#[derive(Debug, thiserror::Error)]
#[error("{0} not supported. Try: [psl, tuffy]")]
pub struct UnsupportedMethod(pub String);

impl SrlMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SrlMethod::Psl => "psl",
            SrlMethod::Tuffy => "tuffy",
        }
    }
}

impl fmt::Display for SrlMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SrlMethod {
    type Err = UnsupportedMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "psl" => Ok(SrlMethod::Psl),
            "tuffy" => Ok(SrlMethod::Tuffy),
            _ => Err(UnsupportedMethod(s.to_string())),
        }
    }
}

/// Which study a set of runs belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Study {
    /// Repeated runs of the same configuration
    Robustness,
    /// Runs per sampling alpha value
    Sampling,
    /// Runs per acquisition function
    Acquisition,
}

#[derive(Debug, thiserror::Error)]
#[error("{0} is not a known study. Try: [robustness, sampling, acquisition]")]
pub struct UnknownStudy(pub String);

impl Study {
    /// Directory name under `<results>/<method>/`
    pub fn dir_name(&self) -> &'static str {
        match self {
            Study::Robustness => "robustness_study",
            Study::Sampling => "sampling_study",
            Study::Acquisition => "acquisition_study",
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            Study::Robustness => "robustness",
            Study::Sampling => "sampling",
            Study::Acquisition => "acquisition",
        }
    }

    /// Column header for the extra directory level between evaluator and iteration.
    /// `None` when runs sit directly under the evaluator directory.
    pub fn variant_column(&self) -> Option<&'static str> {
        match self {
            Study::Robustness => None,
            Study::Sampling => Some("Alpha"),
            Study::Acquisition => Some("Acquisition"),
        }
    }
}

impl fmt::Display for Study {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for Study {
    type Err = UnknownStudy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        let name = normalized.strip_suffix("_study").unwrap_or(&normalized);
        match name {
            "robustness" => Ok(Study::Robustness),
            "sampling" => Ok(Study::Sampling),
            "acquisition" => Ok(Study::Acquisition),
            _ => Err(UnknownStudy(s.to_string())),
        }
    }
}

/// Coordinates of a single run inside a study directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPath {
    pub dataset: String,
    pub wl_method: String,
    pub evaluator: String,
    /// Alpha value or acquisition function, for studies that have one
    pub variant: Option<String>,
    pub iteration: String,
}

/// Root directories for input data and study results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyLayout {
    /// Dataset root holding `<dataset>/<fold>/eval/`
    pub data_dir: PathBuf,
    /// The `results/weightlearning` directory
    pub results_dir: PathBuf,
}

impl Default for StudyLayout {
    fn default() -> Self {
        Self::from_root(Path::new("."))
    }
}

impl StudyLayout {
    pub fn new(data_dir: impl Into<PathBuf>, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            results_dir: results_dir.into(),
        }
    }

    /// Experiment repository layout: `<root>/data` and `<root>/results/weightlearning`
    pub fn from_root(root: &Path) -> Self {
        Self::new(root.join("data"), root.join("results").join("weightlearning"))
    }

    /// Layout rooted at `root` with optional overrides for either directory
    pub fn resolve(root: &Path, data_dir: Option<PathBuf>, results_dir: Option<PathBuf>) -> Self {
        let mut layout = Self::from_root(root);
        if let Some(dir) = data_dir {
            layout.data_dir = dir;
        }
        if let Some(dir) = results_dir {
            layout.results_dir = dir;
        }
        layout
    }

    pub fn eval_dir(&self, dataset: &str, fold: usize) -> PathBuf {
        self.data_dir.join(dataset).join(fold.to_string()).join("eval")
    }

    pub fn truth_path(&self, dataset: &str, fold: usize, predicate: &str) -> PathBuf {
        self.eval_dir(dataset, fold).join(format!("{}_truth.txt", predicate))
    }

    pub fn observed_path(&self, dataset: &str, fold: usize, predicate: &str) -> PathBuf {
        self.eval_dir(dataset, fold).join(format!("{}_obs.txt", predicate))
    }

    pub fn target_path(&self, dataset: &str, fold: usize, predicate: &str) -> PathBuf {
        self.eval_dir(dataset, fold).join(format!("{}_targets.txt", predicate))
    }

    pub fn study_dir(&self, method: SrlMethod, study: Study) -> PathBuf {
        self.results_dir.join(method.as_str()).join(study.dir_name())
    }

    pub fn iteration_dir(&self, method: SrlMethod, study: Study, run: &RunPath) -> PathBuf {
        let mut dir = self
            .study_dir(method, study)
            .join(&run.dataset)
            .join(&run.wl_method)
            .join(&run.evaluator);
        if let Some(ref variant) = run.variant {
            dir.push(variant);
        }
        dir.join(&run.iteration)
    }

    /// PSL writes one file per predicate; Tuffy writes all atoms into one file.
    pub fn prediction_path(&self, method: SrlMethod, study: Study, run: &RunPath, predicate: &str) -> PathBuf {
        let dir = self.iteration_dir(method, study, run);
        match method {
            SrlMethod::Psl => dir
                .join("inferred-predicates")
                .join(format!("{}.txt", predicate.to_uppercase())),
            SrlMethod::Tuffy => dir.join("inferred-predicates.txt"),
        }
    }

    /// Summary CSV location, e.g. `<results>/psl/robustness_study/psl_robustness.csv`
    pub fn output_path(&self, method: SrlMethod, study: Study) -> PathBuf {
        self.study_dir(method, study)
            .join(format!("{}_{}.csv", method, study.short_name()))
    }
}

/// Sorted names of the immediate subdirectories of `dir`. Plain files are ignored.
pub fn list_subdirs(dir: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list directory: {}", dir.display()))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read entry in {}", dir.display()))?;
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }

    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_run(variant: Option<&str>) -> RunPath {
        RunPath {
            dataset: "citeseer".to_string(),
            wl_method: "BOWLOS".to_string(),
            evaluator: "Categorical".to_string(),
            variant: variant.map(str::to_string),
            iteration: "3".to_string(),
        }
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("psl".parse::<SrlMethod>().unwrap(), SrlMethod::Psl);
        assert_eq!("Tuffy".parse::<SrlMethod>().unwrap(), SrlMethod::Tuffy);

        let err = "alchemy".parse::<SrlMethod>().unwrap_err();
        assert_eq!(err.to_string(), "alchemy not supported. Try: [psl, tuffy]");
    }

    #[test]
    fn test_study_parsing() {
        assert_eq!("robustness".parse::<Study>().unwrap(), Study::Robustness);
        assert_eq!("sampling_study".parse::<Study>().unwrap(), Study::Sampling);
        assert_eq!("ACQUISITION".parse::<Study>().unwrap(), Study::Acquisition);
        assert!("performance".parse::<Study>().is_err());
    }

    #[test]
    fn test_data_paths() {
        let layout = StudyLayout::from_root(Path::new("/exp"));

        assert_eq!(
            layout.truth_path("cora", 0, "hasCat"),
            PathBuf::from("/exp/data/cora/0/eval/hasCat_truth.txt")
        );
        assert_eq!(
            layout.observed_path("cora", 0, "hasCat"),
            PathBuf::from("/exp/data/cora/0/eval/hasCat_obs.txt")
        );
        assert_eq!(
            layout.target_path("cora", 1, "hasCat"),
            PathBuf::from("/exp/data/cora/1/eval/hasCat_targets.txt")
        );
    }

    #[test]
    fn test_prediction_paths() {
        let layout = StudyLayout::from_root(Path::new("/exp"));

        assert_eq!(
            layout.prediction_path(SrlMethod::Psl, Study::Robustness, &sample_run(None), "hasCat"),
            PathBuf::from(
                "/exp/results/weightlearning/psl/robustness_study/citeseer/BOWLOS/Categorical/3/inferred-predicates/HASCAT.txt"
            )
        );
        assert_eq!(
            layout.prediction_path(SrlMethod::Tuffy, Study::Sampling, &sample_run(Some("0.1")), "hasCat"),
            PathBuf::from(
                "/exp/results/weightlearning/tuffy/sampling_study/citeseer/BOWLOS/Categorical/0.1/3/inferred-predicates.txt"
            )
        );
    }

    #[test]
    fn test_output_path() {
        let layout = StudyLayout::from_root(Path::new("/exp"));
        assert_eq!(
            layout.output_path(SrlMethod::Psl, Study::Robustness),
            PathBuf::from("/exp/results/weightlearning/psl/robustness_study/psl_robustness.csv")
        );
    }

    #[test]
    fn test_resolve_overrides() {
        let layout = StudyLayout::resolve(Path::new("/exp"), Some(PathBuf::from("/data")), None);
        assert_eq!(layout.data_dir, PathBuf::from("/data"));
        assert_eq!(layout.results_dir, PathBuf::from("/exp/results/weightlearning"));
    }

    #[test]
    fn test_list_subdirs_sorted_dirs_only() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("b")).unwrap();
        std::fs::create_dir(tmp.path().join("a")).unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "x").unwrap();

        let names = list_subdirs(tmp.path()).unwrap();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_list_subdirs_missing() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(list_subdirs(&tmp.path().join("nope")).is_err());
    }
}
