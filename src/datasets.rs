// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Dataset properties for weight-learning evaluation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Per-dataset evaluation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetProperties {
    /// Predicate whose inferred atoms are scored
    pub evaluation_predicate: String,
}

/// Known datasets, keyed by the directory name used in data and results trees.
///
/// Serializes as `{"cora": {"evaluation_predicate": "hasCat"}, ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetRegistry {
    datasets: BTreeMap<String, DatasetProperties>,
}

impl Default for DatasetRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DatasetRegistry {
    /// Registry with no datasets
    pub fn empty() -> Self {
        Self {
            datasets: BTreeMap::new(),
        }
    }

    /// Datasets used by the weight-learning experiments
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.insert("jester", "rating");
        registry.insert("epinions", "trusts");
        registry.insert("cora", "hasCat");
        registry.insert("citeseer", "hasCat");
        registry.insert("lastfm", "rating");
        registry
    }

    /// Built-in datasets overridden and extended by a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dataset config: {}", path.display()))?;
        let overrides: DatasetRegistry = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse dataset config: {}", path.display()))?;

        let mut registry = Self::builtin();
        registry.merge(overrides);
        tracing::info!("Loaded dataset config from {} ({} datasets)", path.display(), registry.len());
        Ok(registry)
    }

    pub fn insert(&mut self, dataset: &str, evaluation_predicate: &str) {
        self.datasets.insert(
            dataset.to_string(),
            DatasetProperties {
                evaluation_predicate: evaluation_predicate.to_string(),
            },
        );
    }

    /// Entries of `other` replace entries with the same name
    pub fn merge(&mut self, other: DatasetRegistry) {
        self.datasets.extend(other.datasets);
    }

    /// Keep only the named datasets
    pub fn retain(&mut self, names: &[String]) {
        self.datasets.retain(|name, _| names.contains(name));
    }

    pub fn get(&self, dataset: &str) -> Option<&DatasetProperties> {
        self.datasets.get(dataset)
    }

    pub fn evaluation_predicate(&self, dataset: &str) -> Option<&str> {
        self.get(dataset).map(|p| p.evaluation_predicate.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}
