//! Declarative filter configuration attached to a run.
//!
//! A `FilterSpec` is plain data. It is deserialized from JSON by callers and
//! interpreted by [`crate::filter::FilterEvaluator`] and the transform
//! pipeline.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Default checksum algorithm name when none is configured.
pub const DEFAULT_CHECKSUM_ALGORITHM: &str = "SHA-256";

/// Complete filter and transform configuration for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    /// Creation/modification date filter
    pub date: Option<DateFilter>,
    /// Extension include/exclude list
    pub extensions: Option<ExtensionFilter>,
    /// Matched against the lower-cased file name without extension
    pub file_name_criteria: Vec<NameCriterion>,
    /// Matched against the parent directory (files) or the directory itself
    pub folder_path_criteria: Vec<NameCriterion>,
    pub include_owners: Vec<String>,
    pub exclude_owners: Vec<String>,
    pub size_from_kb: Option<u64>,
    pub size_to_kb: Option<u64>,
    pub transform: TransformOptions,
}

/// Which timestamp a date filter looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateAttribute {
    Creation,
    Modification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateFilter {
    pub base: DateAttribute,
    pub segmentation: Segmentation,
}

/// How a date filter bounds the selected timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segmentation {
    /// Absolute local date-time bounds; `None` is an open bound
    DateRange {
        #[serde(default)]
        from: Option<NaiveDateTime>,
        #[serde(default)]
        to: Option<NaiveDateTime>,
    },
    /// Age bounds relative to now
    FileAge(AgeBounds),
}

/// Inclusive age bounds. Every configured bound must hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgeBounds {
    pub days_from: Option<i64>,
    pub days_to: Option<i64>,
    pub months_from: Option<i64>,
    pub months_to: Option<i64>,
    pub years_from: Option<i64>,
    pub years_to: Option<i64>,
}

/// Include or exclude on match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Include,
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionFilter {
    pub extensions: Vec<String>,
    pub mode: Disposition,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    StartsWith,
    #[default]
    Contains,
    EndsWith,
}

impl MatchMode {
    /// Test `candidate` against `pattern`. Both must already be lower-cased.
    pub fn matches(self, candidate: &str, pattern: &str) -> bool {
        match self {
            MatchMode::StartsWith => candidate.starts_with(pattern),
            MatchMode::Contains => candidate.contains(pattern),
            MatchMode::EndsWith => candidate.ends_with(pattern),
        }
    }
}

/// One file-name or folder-path rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameCriterion {
    pub value: String,
    #[serde(default)]
    pub match_mode: MatchMode,
    pub disposition: Disposition,
}

impl NameCriterion {
    pub fn new(value: impl Into<String>, match_mode: MatchMode, disposition: Disposition) -> Self {
        NameCriterion {
            value: value.into(),
            match_mode,
            disposition,
        }
    }
}

/// Per-file transform switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    pub encryption: bool,
    pub compression: bool,
    pub versioning: bool,
    pub checksum_algorithm: String,
    pub check_duplicates: bool,
    /// Nest the copied tree under a folder named after the source root
    pub preserve_source_root: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        TransformOptions {
            encryption: false,
            compression: false,
            versioning: false,
            checksum_algorithm: DEFAULT_CHECKSUM_ALGORITHM.to_string(),
            check_duplicates: false,
            preserve_source_root: false,
        }
    }
}
