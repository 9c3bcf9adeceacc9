//! Core data model for migration runs.
//!
//! - RunContext: one invocation of the engine
//! - FileRecord: the audit row produced for each processed file
//! - Activity, CancellationToken: run controls

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::checksums::ChecksumAlgorithm;
use crate::error::EngineError;
use crate::filter_spec::FilterSpec;

/// What a run does with each included file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    /// Copy files; source remains unchanged
    Copy,
    /// Copy files, then delete each source whose copy validated
    CopyAndPurge,
    /// Record what would happen without touching any bytes
    Preview,
    /// Delete matching source files
    PurgeOnly,
}

impl Activity {
    /// True for activities that write to a destination.
    pub fn writes_destination(self) -> bool {
        matches!(self, Activity::Copy | Activity::CopyAndPurge)
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activity::Copy => write!(f, "copy"),
            Activity::CopyAndPurge => write!(f, "copyandpurge"),
            Activity::Preview => write!(f, "preview"),
            Activity::PurgeOnly => write!(f, "purgeonly"),
        }
    }
}

impl FromStr for Activity {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "copy" => Ok(Activity::Copy),
            "copyandpurge" => Ok(Activity::CopyAndPurge),
            "preview" => Ok(Activity::Preview),
            "purgeonly" => Ok(Activity::PurgeOnly),
            _ => Err(EngineError::UnknownActivity {
                value: s.to_string(),
            }),
        }
    }
}

/// Shared flag used to stop a run early.
///
/// Cancelling stops descent into further directories and makes workers
/// drop any queued files without processing them.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// One invocation of the engine.
///
/// Created by [`crate::job::create_run`], which validates the roots.
#[derive(Debug)]
pub struct RunContext {
    /// Caller-allocated run identifier
    pub run_id: u64,

    pub activity: Activity,

    /// Absolute source root
    pub source_root: PathBuf,

    /// Absolute destination root; always set for copy activities
    pub destination_root: Option<PathBuf>,

    pub filters: FilterSpec,

    /// Base64 key, present when encryption is enabled
    pub encryption_key: Option<String>,

    parallelism: usize,

    cancellation: CancellationToken,

    file_counter: AtomicU32,
}

impl RunContext {
    pub(crate) fn new(
        run_id: u64,
        activity: Activity,
        source_root: PathBuf,
        destination_root: Option<PathBuf>,
        filters: FilterSpec,
        encryption_key: Option<String>,
    ) -> Self {
        RunContext {
            run_id,
            activity,
            source_root,
            destination_root,
            filters,
            encryption_key,
            parallelism: 1,
            cancellation: CancellationToken::new(),
            file_counter: AtomicU32::new(0),
        }
    }

    /// Set the worker count (at least one).
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Number of worker threads processing files.
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Handle that can cancel this run from another thread.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Mint the next file identifier, `{run_id}.{counter:03}`.
    pub fn next_file_id(&self) -> String {
        let count = self.file_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}.{:03}", self.run_id, count)
    }

    /// Number of identifiers minted so far.
    pub fn files_processed(&self) -> u32 {
        self.file_counter.load(Ordering::SeqCst)
    }
}

/// Audit row for one processed file. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: String,
    pub run_id: u64,
    pub activity: Activity,

    /// Source file name, including extension
    pub file_name: String,
    pub source_path: PathBuf,
    pub source_parent: Option<PathBuf>,

    /// Final destination path, including transform extensions
    pub destination_path: Option<PathBuf>,
    /// Directory part of `destination_path`
    pub target_dir: Option<PathBuf>,
    /// File name part of `destination_path`
    pub target_file_name: Option<String>,

    /// Size in bytes
    pub size: u64,
    pub created: Option<DateTime<Local>>,
    pub modified: Option<DateTime<Local>>,
    pub owner: String,
    /// Extension without the dot; empty when there is none
    pub extension: String,

    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    pub source_checksum: Option<String>,
    pub target_checksum: Option<String>,
    /// Source and target checksums were both computed and equal
    pub validated: bool,

    pub versioned: bool,
    pub encrypted: bool,
    pub encryption_key: Option<String>,
    pub compressed: bool,

    /// Same as `validated`; the persisted copy is trustworthy
    pub archived: bool,

    /// Failure description when processing did not fully succeed
    pub error: Option<String>,

    pub recorded_at: DateTime<Local>,
}
