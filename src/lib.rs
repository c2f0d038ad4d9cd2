// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Result aggregation for SRL weight-learning studies
//!
//! This crate provides:
//! - Path building over the `results/weightlearning` study hierarchy (PSL and Tuffy)
//! - Frame loading for truth, observed, target and predicted atoms
//! - Evaluators (Categorical accuracy, Discrete F1, Continuous MSE, Ranking AUC-ROC)
//! - A study pipeline that summarizes every run with mean and standard deviation
//!   and writes the summary as CSV, JSON or Markdown

pub mod datasets;
pub mod frames;
pub mod metrics;
pub mod paths;
pub mod pipeline;

pub use datasets::{DatasetProperties, DatasetRegistry};
pub use frames::{EvaluationFrames, Frame, FrameError};
pub use metrics::{ConfusionMatrix, EvaluationError, Evaluator, SummaryStatistics};
pub use paths::{RunPath, SrlMethod, Study, StudyLayout};
pub use pipeline::{StudyConfig, StudyPipeline, StudyResults, StudyRow};
