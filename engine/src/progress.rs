//! Progress reporting trait.
//!
//! This module defines the RunObserver trait, which decouples the migration
//! engine from whatever front end is watching a run.

use std::path::Path;

use crate::model::{FileRecord, RunContext};

/// Trait for receiving progress updates from a migration run.
///
/// Implement this trait to receive callbacks during run execution. The CLI
/// provides a simple implementation for stderr output.
///
/// Callbacks for individual files arrive from worker threads, so an
/// implementation must be `Sync`. All methods default to doing nothing.
pub trait RunObserver: Send + Sync {
    /// Called once, before the walk starts.
    fn on_run_started(&self, _ctx: &RunContext) {}

    /// Called when a directory is excluded and not descended into.
    fn on_directory_pruned(&self, _path: &Path) {}

    /// Called when a file is rejected by the filters or cannot be read.
    fn on_file_skipped(&self, _path: &Path) {}

    /// Called with each file's record, just before it joins the run sink.
    fn on_file_recorded(&self, _record: &FileRecord) {}

    /// Called once after every worker has finished.
    fn on_run_completed(&self, _ctx: &RunContext, _records: usize) {}
}
