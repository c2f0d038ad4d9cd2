// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Frame loading for ground atoms
//!
//! A frame maps a tuple of integer arguments to a single value. Data files are
//! header-less TSV (comma separated files are accepted too): every column but
//! the last is an argument, the last column is the value. Target files carry
//! arguments only.

use crate::paths::{RunPath, SrlMethod, Study, StudyLayout};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// Errors raised while loading a frame from disk
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("File not found: {}", path.display())]
    Missing { path: PathBuf },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}:{line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error("{}:{line}: expected {expected} argument columns, found {found}", path.display())]
    InconsistentArity {
        path: PathBuf,
        line: u64,
        expected: usize,
        found: usize,
    },
}

impl FrameError {
    /// True when the file simply does not exist, so the caller may skip it
    pub fn is_missing(&self) -> bool {
        matches!(self, FrameError::Missing { .. })
    }

    /// True when the file exists but its contents could not be parsed
    pub fn is_malformed(&self) -> bool {
        matches!(self, FrameError::Parse { .. } | FrameError::InconsistentArity { .. })
    }

    fn parse(path: &Path, line: u64, message: impl Into<String>) -> Self {
        FrameError::Parse {
            path: path.to_path_buf(),
            line,
            message: message.into(),
        }
    }
}

/// Ground atoms of one predicate, keyed by their integer arguments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    rows: BTreeMap<Vec<i64>, f64>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an atom. A repeated key overwrites the earlier value.
    pub fn insert(&mut self, args: Vec<i64>, value: f64) -> Option<f64> {
        self.rows.insert(args, value)
    }

    pub fn get(&self, args: &[i64]) -> Option<f64> {
        self.rows.get(args).copied()
    }

    pub fn contains(&self, args: &[i64]) -> bool {
        self.rows.contains_key(args)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of argument columns (0 for an empty frame)
    pub fn arity(&self) -> usize {
        self.rows.keys().next().map_or(0, Vec::len)
    }

    pub fn keys(&self) -> btree_map::Keys<'_, Vec<i64>, f64> {
        self.rows.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, Vec<i64>, f64> {
        self.rows.iter()
    }
}

impl FromIterator<(Vec<i64>, f64)> for Frame {
    fn from_iter<I: IntoIterator<Item = (Vec<i64>, f64)>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Frame {
    type Item = (&'a Vec<i64>, &'a f64);
    type IntoIter = btree_map::Iter<'a, Vec<i64>, f64>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

fn read_text(path: &Path) -> Result<String, FrameError> {
    std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            FrameError::Missing {
                path: path.to_path_buf(),
            }
        } else {
            FrameError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

/// Tab if the first non-blank line has one, otherwise comma
fn sniff_delimiter(text: &str) -> u8 {
    let first = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    if first.contains('\t') {
        b'\t'
    } else if first.contains(',') {
        b','
    } else {
        b'\t'
    }
}

fn parse_arg(path: &Path, line: u64, field: &str) -> Result<i64, FrameError> {
    field
        .trim()
        .trim_matches('"')
        .parse::<i64>()
        .map_err(|_| FrameError::parse(path, line, format!("argument '{}' is not an integer", field)))
}

/// Parse a finite float; NaN and infinities are rejected
fn parse_value(path: &Path, line: u64, field: &str, what: &str) -> Result<f64, FrameError> {
    let value = field
        .trim()
        .parse::<f64>()
        .map_err(|_| FrameError::parse(path, line, format!("{} '{}' is not a number", what, field)))?;
    if !value.is_finite() {
        return Err(FrameError::parse(path, line, format!("{} '{}' is not a finite number", what, field)));
    }
    Ok(value)
}

/// Parse a header-less table. With `has_value` the last column is the value,
/// otherwise every column is an argument and the value is 1.0.
pub fn parse_frame(path: &Path, text: &str, has_value: bool) -> Result<Frame, FrameError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(sniff_delimiter(text))
        .from_reader(text.as_bytes());

    let mut frame = Frame::new();
    let mut arity: Option<usize> = None;

    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| FrameError::parse(path, idx as u64 + 1, e.to_string()))?;
        let line = record.position().map_or(idx as u64 + 1, |p| p.line());

        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        let fields: Vec<&str> = record.iter().collect();
        let (arg_fields, value) = if has_value {
            let (value_field, args) = match fields.split_last() {
                Some((value_field, args)) if !args.is_empty() => (value_field, args),
                _ => return Err(FrameError::parse(path, line, "expected at least one argument and a value")),
            };
            let value = parse_value(path, line, value_field, "value")?;
            (args, value)
        } else {
            (fields.as_slice(), 1.0)
        };

        match arity {
            Some(expected) if expected != arg_fields.len() => {
                return Err(FrameError::InconsistentArity {
                    path: path.to_path_buf(),
                    line,
                    expected,
                    found: arg_fields.len(),
                });
            }
            None => arity = Some(arg_fields.len()),
            _ => {}
        }

        let args = arg_fields
            .iter()
            .map(|field| parse_arg(path, line, field))
            .collect::<Result<Vec<_>, _>>()?;

        if frame.insert(args, value).is_some() {
            tracing::debug!("Duplicate atom at {}:{}, keeping the later value", path.display(), line);
        }
    }

    Ok(frame)
}

/// Load a frame whose last column is the value
pub fn read_value_frame(path: &Path) -> Result<Frame, FrameError> {
    parse_frame(path, &read_text(path)?, true)
}

/// Load a frame of argument columns only
pub fn read_key_frame(path: &Path) -> Result<Frame, FrameError> {
    parse_frame(path, &read_text(path)?, false)
}

pub fn load_truth_frame(layout: &StudyLayout, dataset: &str, fold: usize, predicate: &str) -> Result<Frame, FrameError> {
    read_value_frame(&layout.truth_path(dataset, fold, predicate))
}

pub fn load_observed_frame(layout: &StudyLayout, dataset: &str, fold: usize, predicate: &str) -> Result<Frame, FrameError> {
    read_value_frame(&layout.observed_path(dataset, fold, predicate))
}

pub fn load_target_frame(layout: &StudyLayout, dataset: &str, fold: usize, predicate: &str) -> Result<Frame, FrameError> {
    read_key_frame(&layout.target_path(dataset, fold, predicate))
}

/// PSL inferred predicates: `<args...>\t<value>` per line
pub fn load_psl_prediction_frame(path: &Path) -> Result<Frame, FrameError> {
    read_value_frame(path)
}

/// Tuffy output holds atoms of every query predicate, one per line:
/// `<probability>\t<pred>(a, b)` for marginal inference or `<pred>(a, b)` for MAP.
pub fn load_tuffy_prediction_frame(path: &Path, predicate: &str) -> Result<Frame, FrameError> {
    parse_tuffy_atoms(path, &read_text(path)?, predicate)
}

pub fn parse_tuffy_atoms(path: &Path, text: &str, predicate: &str) -> Result<Frame, FrameError> {
    let mut frame = Frame::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = idx as u64 + 1;
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let open = raw
            .find('(')
            .ok_or_else(|| FrameError::parse(path, line, "expected an atom like pred(a, b)"))?;
        let close = raw
            .rfind(')')
            .filter(|close| *close > open)
            .ok_or_else(|| FrameError::parse(path, line, "unterminated atom"))?;

        let head: Vec<&str> = raw[..open].split_whitespace().collect();
        let (value, name) = match head.as_slice() {
            [name] => (1.0, *name),
            [prob, name] => {
                let value = parse_value(path, line, prob, "probability")?;
                (value, *name)
            }
            _ => return Err(FrameError::parse(path, line, "expected '[probability] pred(args)'")),
        };

        if !name.eq_ignore_ascii_case(predicate) {
            continue;
        }

        let args = raw[open + 1..close]
            .split(',')
            .map(|field| parse_arg(path, line, field))
            .collect::<Result<Vec<_>, _>>()?;

        frame.insert(args, value);
    }

    Ok(frame)
}

/// Prediction frame for one run, dispatching on the SRL method's output format
pub fn load_prediction_frame(
    layout: &StudyLayout,
    method: SrlMethod,
    study: Study,
    run: &RunPath,
    predicate: &str,
) -> Result<Frame, FrameError> {
    let path = layout.prediction_path(method, study, run, predicate);
    match method {
        SrlMethod::Psl => load_psl_prediction_frame(&path),
        SrlMethod::Tuffy => load_tuffy_prediction_frame(&path, predicate),
    }
}

/// The fixed frames every run of a dataset is evaluated against
#[derive(Debug, Clone, Default)]
pub struct EvaluationFrames {
    pub truth: Frame,
    pub observed: Frame,
    pub target: Frame,
}

impl EvaluationFrames {
    pub fn load(layout: &StudyLayout, dataset: &str, fold: usize, predicate: &str) -> Result<Self, FrameError> {
        let frames = Self {
            truth: load_truth_frame(layout, dataset, fold, predicate)?,
            observed: load_observed_frame(layout, dataset, fold, predicate)?,
            target: load_target_frame(layout, dataset, fold, predicate)?,
        };

        tracing::debug!(
            "Loaded {} frames: truth={}, observed={}, targets={}",
            dataset,
            frames.truth.len(),
            frames.observed.len(),
            frames.target.len()
        );

        Ok(frames)
    }
}
