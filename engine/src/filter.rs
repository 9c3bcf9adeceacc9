//! File and directory inclusion decisions.
//!
//! A file passes through a fixed sequence of independent stages. Each stage
//! either does not apply (`Verdict::Skip`), lets the file through
//! (`Verdict::Include`) or rejects it (`Verdict::Exclude`); the first
//! rejection ends evaluation.

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::attributes::{split_extension, FileAttributes};
use crate::filter_spec::{
    AgeBounds, DateAttribute, Disposition, FilterSpec, MatchMode, NameCriterion, Segmentation,
};

/// The individual predicates, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStage {
    Date,
    Extension,
    FileName,
    FolderPath,
    Owner,
    Size,
}

impl FilterStage {
    pub const FILE_STAGES: [FilterStage; 6] = [
        FilterStage::Date,
        FilterStage::Extension,
        FilterStage::FileName,
        FilterStage::FolderPath,
        FilterStage::Owner,
        FilterStage::Size,
    ];
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterStage::Date => "date",
            FilterStage::Extension => "extension",
            FilterStage::FileName => "file name",
            FilterStage::FolderPath => "folder path",
            FilterStage::Owner => "owner",
            FilterStage::Size => "size",
        };
        f.write_str(name)
    }
}

/// Outcome of a single stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Include,
    Exclude(String),
    /// Stage not configured
    Skip,
}

/// Outcome of a full file evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Included,
    Excluded { stage: FilterStage, reason: String },
}

impl FilterDecision {
    pub fn is_included(&self) -> bool {
        matches!(self, FilterDecision::Included)
    }
}

/// Evaluates a `FilterSpec` against files and directories.
#[derive(Debug, Clone)]
pub struct FilterEvaluator<'a> {
    spec: &'a FilterSpec,
    now: NaiveDateTime,
}

/// Per-file values derived once and shared by every stage.
struct Candidate<'p> {
    attrs: &'p FileAttributes,
    stem_lower: String,
    extension_lower: String,
    parent_lower: String,
}

impl<'a> FilterEvaluator<'a> {
    pub fn new(spec: &'a FilterSpec) -> Self {
        Self::at(spec, Local::now().naive_local())
    }

    /// Evaluator with a fixed notion of "now" for file-age filters.
    pub fn at(spec: &'a FilterSpec, now: NaiveDateTime) -> Self {
        FilterEvaluator { spec, now }
    }

    /// Decide whether a file is included. Attribute read failures exclude.
    pub fn include_file(&self, path: &Path) -> bool {
        match FileAttributes::read(path) {
            Ok(attrs) => self.evaluate(path, &attrs).is_included(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Error reading attributes for filtering; excluding file");
                false
            }
        }
    }

    /// Run every file stage against an attribute snapshot.
    pub fn evaluate(&self, path: &Path, attrs: &FileAttributes) -> FilterDecision {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (stem, extension) = split_extension(&file_name);
        let candidate = Candidate {
            attrs,
            stem_lower: stem.to_lowercase(),
            extension_lower: extension.to_lowercase(),
            parent_lower: path.parent().map(normalized_lower).unwrap_or_default(),
        };

        for stage in FilterStage::FILE_STAGES {
            match self.apply(stage, &candidate) {
                Verdict::Exclude(reason) => {
                    debug!(path = %path.display(), %stage, %reason, "File excluded");
                    return FilterDecision::Excluded { stage, reason };
                }
                Verdict::Include | Verdict::Skip => {}
            }
        }
        FilterDecision::Included
    }

    /// Decide whether the walker should descend into `path`.
    ///
    /// Only folder-path criteria apply, matched against the directory's own
    /// path with each criterion's match mode.
    pub fn include_directory(&self, path: &Path) -> bool {
        let dir_lower = normalized_lower(path);
        match apply_criteria(&self.spec.folder_path_criteria, |c| {
            c.match_mode.matches(&dir_lower, &c.value.to_lowercase())
        }) {
            Verdict::Exclude(reason) => {
                info!(path = %path.display(), %reason, "Excluding directory by folder path criteria");
                false
            }
            _ => true,
        }
    }

    fn apply(&self, stage: FilterStage, candidate: &Candidate<'_>) -> Verdict {
        match stage {
            FilterStage::Date => self.date_stage(candidate.attrs),
            FilterStage::Extension => self.extension_stage(&candidate.extension_lower),
            FilterStage::FileName => apply_criteria(&self.spec.file_name_criteria, |c| {
                c.match_mode.matches(&candidate.stem_lower, &c.value.to_lowercase())
            }),
            // File-level folder rules are substring tests on the parent path
            FilterStage::FolderPath => apply_criteria(&self.spec.folder_path_criteria, |c| {
                MatchMode::Contains.matches(&candidate.parent_lower, &c.value.to_lowercase())
            }),
            FilterStage::Owner => self.owner_stage(&candidate.attrs.owner),
            FilterStage::Size => self.size_stage(candidate.attrs.size_kb()),
        }
    }

    fn date_stage(&self, attrs: &FileAttributes) -> Verdict {
        let Some(filter) = &self.spec.date else {
            return Verdict::Skip;
        };
        let date = match filter.base {
            DateAttribute::Creation => attrs.created.naive_local(),
            DateAttribute::Modification => attrs.modified.naive_local(),
        };

        match &filter.segmentation {
            Segmentation::DateRange { from, to } => {
                if let Some(from) = from.filter(|from| date < *from) {
                    return Verdict::Exclude(format!("date {date} is before {from}"));
                }
                if let Some(to) = to.filter(|to| date > *to) {
                    return Verdict::Exclude(format!("date {date} is after {to}"));
                }
                Verdict::Include
            }
            Segmentation::FileAge(bounds) => check_age(bounds, date, self.now),
        }
    }

    fn extension_stage(&self, extension_lower: &str) -> Verdict {
        let Some(filter) = &self.spec.extensions else {
            return Verdict::Skip;
        };
        if filter.extensions.is_empty() {
            return Verdict::Skip;
        }

        let matches = filter
            .extensions
            .iter()
            .any(|ext| ext.trim_start_matches('.').eq_ignore_ascii_case(extension_lower));

        match (filter.mode, matches) {
            (Disposition::Include, false) => {
                Verdict::Exclude(format!("extension '{extension_lower}' is not included"))
            }
            (Disposition::Exclude, true) => {
                Verdict::Exclude(format!("extension '{extension_lower}' is excluded"))
            }
            _ => Verdict::Include,
        }
    }

    fn owner_stage(&self, owner: &str) -> Verdict {
        let spec = self.spec;
        if spec.include_owners.is_empty() && spec.exclude_owners.is_empty() {
            return Verdict::Skip;
        }
        if !spec.include_owners.is_empty()
            && !spec.include_owners.iter().any(|o| o.eq_ignore_ascii_case(owner))
        {
            return Verdict::Exclude(format!("owner '{owner}' is not included"));
        }
        if spec.exclude_owners.iter().any(|o| o.eq_ignore_ascii_case(owner)) {
            return Verdict::Exclude(format!("owner '{owner}' is excluded"));
        }
        Verdict::Include
    }

    fn size_stage(&self, size_kb: u64) -> Verdict {
        let (from, to) = (self.spec.size_from_kb, self.spec.size_to_kb);
        if from.is_none() && to.is_none() {
            return Verdict::Skip;
        }
        if let Some(from) = from.filter(|&from| size_kb < from) {
            return Verdict::Exclude(format!("size {size_kb}KB below {from}KB"));
        }
        if let Some(to) = to.filter(|&to| size_kb > to) {
            return Verdict::Exclude(format!("size {size_kb}KB above {to}KB"));
        }
        Verdict::Include
    }
}

/// Shared include/exclude semantics for name and folder criteria: any
/// matching exclude rejects, and when include rules exist one must match.
fn apply_criteria(criteria: &[NameCriterion], matches: impl Fn(&NameCriterion) -> bool) -> Verdict {
    let mut has_include = false;
    let mut include_matched = false;

    for criterion in criteria.iter().filter(|c| !c.value.trim().is_empty()) {
        let matched = matches(criterion);
        match criterion.disposition {
            Disposition::Exclude if matched => {
                return Verdict::Exclude(format!("matches exclude rule '{}'", criterion.value));
            }
            Disposition::Exclude => {}
            Disposition::Include => {
                has_include = true;
                include_matched |= matched;
            }
        }
    }

    if has_include && !include_matched {
        Verdict::Exclude("matches no include rule".to_string())
    } else if has_include {
        Verdict::Include
    } else {
        Verdict::Skip
    }
}

fn check_age(bounds: &AgeBounds, date: NaiveDateTime, now: NaiveDateTime) -> Verdict {
    let months = whole_months_between(date, now);
    let ages = [
        ("days", (now - date).num_days(), bounds.days_from, bounds.days_to),
        ("months", months, bounds.months_from, bounds.months_to),
        ("years", months / 12, bounds.years_from, bounds.years_to),
    ];

    for (unit, age, from, to) in ages {
        if from.is_some_and(|from| age < from) || to.is_some_and(|to| age > to) {
            return Verdict::Exclude(format!("age of {age} {unit} is outside {from:?}..={to:?}"));
        }
    }
    Verdict::Include
}

/// Whole calendar months from `start` to `end`, truncated toward zero.
fn whole_months_between(start: NaiveDateTime, end: NaiveDateTime) -> i64 {
    let mut months = (i64::from(end.year()) - i64::from(start.year())) * 12
        + (i64::from(end.month()) - i64::from(start.month()));
    let start_rest = (start.day(), start.num_seconds_from_midnight(), start.nanosecond());
    let end_rest = (end.day(), end.num_seconds_from_midnight(), end.nanosecond());
    if months > 0 && end_rest < start_rest {
        months -= 1;
    } else if months < 0 && end_rest > start_rest {
        months += 1;
    }
    months
}

/// Lower-case a path and use `/` separators regardless of platform.
fn normalized_lower(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter_spec::{DateFilter, ExtensionFilter};
    use chrono::{Duration, NaiveDate, TimeZone};

    fn attrs(size: u64, modified: NaiveDateTime, owner: &str) -> FileAttributes {
        let modified = Local
            .from_local_datetime(&modified)
            .single()
            .expect("Unambiguous local time");
        FileAttributes {
            size,
            created: modified,
            modified,
            owner: owner.to_string(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .expect("Valid date")
    }

    fn extensions(list: &[&str], mode: Disposition) -> Option<ExtensionFilter> {
        Some(ExtensionFilter {
            extensions: list.iter().map(|s| s.to_string()).collect(),
            mode,
        })
    }

    #[test]
    fn test_no_filters_includes_everything() {
        let spec = FilterSpec::default();
        let evaluator = FilterEvaluator::new(&spec);
        let decision = evaluator.evaluate(Path::new("/src/a.txt"), &attrs(10, date(2024, 1, 1), "alice"));
        assert_eq!(decision, FilterDecision::Included);
    }

    #[test]
    fn test_extension_include_and_size() {
        let file = Path::new("/src/report_2023.pdf");
        let a = attrs(5 * 1024, date(2024, 1, 1), "alice");

        let mut spec = FilterSpec {
            extensions: extensions(&["pdf"], Disposition::Include),
            size_from_kb: Some(0),
            ..FilterSpec::default()
        };
        assert!(FilterEvaluator::new(&spec).evaluate(file, &a).is_included());

        spec.extensions = extensions(&["txt"], Disposition::Include);
        let decision = FilterEvaluator::new(&spec).evaluate(file, &a);
        assert!(matches!(
            decision,
            FilterDecision::Excluded { stage: FilterStage::Extension, .. }
        ));
    }

    #[test]
    fn test_extension_exclude_is_case_insensitive() {
        let spec = FilterSpec {
            extensions: extensions(&["TMP"], Disposition::Exclude),
            ..FilterSpec::default()
        };
        let evaluator = FilterEvaluator::new(&spec);
        let a = attrs(1, date(2024, 1, 1), "alice");
        assert!(!evaluator.evaluate(Path::new("/src/cache.tmp"), &a).is_included());
        assert!(evaluator.evaluate(Path::new("/src/notes.md"), &a).is_included());
    }

    #[test]
    fn test_file_name_include_is_or_and_exclude_wins() {
        let spec = FilterSpec {
            file_name_criteria: vec![
                NameCriterion::new("report", MatchMode::StartsWith, Disposition::Include),
                NameCriterion::new("summary", MatchMode::EndsWith, Disposition::Include),
                NameCriterion::new("draft", MatchMode::Contains, Disposition::Exclude),
            ],
            ..FilterSpec::default()
        };
        let evaluator = FilterEvaluator::new(&spec);
        let a = attrs(1, date(2024, 1, 1), "alice");

        assert!(evaluator.evaluate(Path::new("/src/Report_Q1.pdf"), &a).is_included());
        assert!(evaluator.evaluate(Path::new("/src/weekly_summary.doc"), &a).is_included());
        assert!(!evaluator.evaluate(Path::new("/src/report_draft.pdf"), &a).is_included());
        assert!(!evaluator.evaluate(Path::new("/src/invoice.pdf"), &a).is_included());
    }

    #[test]
    fn test_file_name_ignores_extension() {
        let spec = FilterSpec {
            file_name_criteria: vec![NameCriterion::new(
                "pdf",
                MatchMode::EndsWith,
                Disposition::Include,
            )],
            ..FilterSpec::default()
        };
        let a = attrs(1, date(2024, 1, 1), "alice");
        assert!(!FilterEvaluator::new(&spec)
            .evaluate(Path::new("/src/report.pdf"), &a)
            .is_included());
    }

    #[test]
    fn test_folder_path_file_level_uses_parent() {
        let spec = FilterSpec {
            folder_path_criteria: vec![NameCriterion::new(
                "/Archive",
                MatchMode::StartsWith,
                Disposition::Exclude,
            )],
            ..FilterSpec::default()
        };
        let evaluator = FilterEvaluator::new(&spec);
        let a = attrs(1, date(2024, 1, 1), "alice");

        // Substring test at file level regardless of the criterion's mode
        assert!(!evaluator.evaluate(Path::new("/src/archive/old.txt"), &a).is_included());
        assert!(evaluator.evaluate(Path::new("/src/live/archive.txt"), &a).is_included());
    }

    #[test]
    fn test_include_directory_prunes_by_criterion() {
        let spec = FilterSpec {
            folder_path_criteria: vec![NameCriterion::new(
                "/tmp/",
                MatchMode::Contains,
                Disposition::Exclude,
            )],
            ..FilterSpec::default()
        };
        let evaluator = FilterEvaluator::new(&spec);
        assert!(!evaluator.include_directory(Path::new("/src/tmp/cache")));
        assert!(evaluator.include_directory(Path::new("/src/tmp")));
        assert!(evaluator.include_directory(Path::new("/src/docs")));
    }

    #[test]
    fn test_include_directory_respects_match_mode() {
        let spec = FilterSpec {
            folder_path_criteria: vec![NameCriterion::new(
                "/cache",
                MatchMode::EndsWith,
                Disposition::Exclude,
            )],
            ..FilterSpec::default()
        };
        let evaluator = FilterEvaluator::new(&spec);
        assert!(!evaluator.include_directory(Path::new("/src/CACHE")));
        assert!(evaluator.include_directory(Path::new("/src/cache/inner")));
    }

    #[test]
    fn test_date_range_bounds() {
        let spec = FilterSpec {
            date: Some(DateFilter {
                base: DateAttribute::Modification,
                segmentation: Segmentation::DateRange {
                    from: Some(date(2023, 1, 1)),
                    to: None,
                },
            }),
            ..FilterSpec::default()
        };
        let evaluator = FilterEvaluator::new(&spec);
        let path = Path::new("/src/a.txt");
        assert!(evaluator.evaluate(path, &attrs(1, date(2023, 6, 1), "a")).is_included());
        assert!(!evaluator.evaluate(path, &attrs(1, date(2022, 6, 1), "a")).is_included());
    }

    #[test]
    fn test_file_age_bounds_are_independent() {
        let now = date(2024, 6, 15);
        let spec = FilterSpec {
            date: Some(DateFilter {
                base: DateAttribute::Creation,
                segmentation: Segmentation::FileAge(AgeBounds {
                    days_from: Some(30),
                    years_to: Some(1),
                    ..AgeBounds::default()
                }),
            }),
            ..FilterSpec::default()
        };
        let evaluator = FilterEvaluator::at(&spec, now);
        let path = Path::new("/src/a.txt");

        // 10 days old: too young
        assert!(!evaluator.evaluate(path, &attrs(1, now - Duration::days(10), "a")).is_included());
        // ~4 months old: both bounds satisfied
        assert!(evaluator.evaluate(path, &attrs(1, date(2024, 2, 1), "a")).is_included());
        // 2 years old: too old
        assert!(!evaluator.evaluate(path, &attrs(1, date(2022, 5, 1), "a")).is_included());
    }

    #[test]
    fn test_whole_months_between() {
        assert_eq!(whole_months_between(date(2024, 1, 31), date(2024, 2, 29)), 0);
        assert_eq!(whole_months_between(date(2024, 1, 15), date(2024, 2, 15)), 1);
        assert_eq!(whole_months_between(date(2022, 6, 16), date(2024, 6, 15)), 23);
    }

    #[test]
    fn test_owner_filters() {
        let spec = FilterSpec {
            include_owners: vec!["Alice".to_string(), "bob".to_string()],
            exclude_owners: vec!["bob".to_string()],
            ..FilterSpec::default()
        };
        let evaluator = FilterEvaluator::new(&spec);
        let path = Path::new("/src/a.txt");
        assert!(evaluator.evaluate(path, &attrs(1, date(2024, 1, 1), "alice")).is_included());
        assert!(!evaluator.evaluate(path, &attrs(1, date(2024, 1, 1), "BOB")).is_included());
        assert!(!evaluator.evaluate(path, &attrs(1, date(2024, 1, 1), "carol")).is_included());
    }

    #[test]
    fn test_size_bounds() {
        let spec = FilterSpec {
            size_from_kb: Some(1),
            size_to_kb: Some(4),
            ..FilterSpec::default()
        };
        let evaluator = FilterEvaluator::new(&spec);
        let path = Path::new("/src/a.bin");
        let d = date(2024, 1, 1);
        assert!(!evaluator.evaluate(path, &attrs(1023, d, "a")).is_included());
        assert!(evaluator.evaluate(path, &attrs(1024, d, "a")).is_included());
        assert!(evaluator.evaluate(path, &attrs(5 * 1024 - 1, d, "a")).is_included());
        assert!(!evaluator.evaluate(path, &attrs(5 * 1024, d, "a")).is_included());
    }

    #[test]
    fn test_stage_order_reports_first_exclusion() {
        let spec = FilterSpec {
            extensions: extensions(&["txt"], Disposition::Include),
            size_to_kb: Some(0),
            ..FilterSpec::default()
        };
        let decision = FilterEvaluator::new(&spec)
            .evaluate(Path::new("/src/a.pdf"), &attrs(10_000, date(2024, 1, 1), "a"));
        assert!(matches!(
            decision,
            FilterDecision::Excluded { stage: FilterStage::Extension, .. }
        ));
    }

    #[test]
    fn test_include_file_fails_closed_on_missing_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let spec = FilterSpec::default();
        assert!(!FilterEvaluator::new(&spec).include_file(&temp_dir.path().join("gone.txt")));
    }
}
