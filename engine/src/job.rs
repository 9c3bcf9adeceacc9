//! Run orchestration module.
//!
//! This module provides the public API for running migrations:
//! - create_run: validate inputs and build a RunContext
//! - execute_run: walk the source and process every file
//! - run_migration: both of the above, returning the run's records

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::destination::normalize;
use crate::error::EngineError;
use crate::filter_spec::FilterSpec;
use crate::model::{Activity, FileRecord, RunContext};
use crate::progress::RunObserver;
use crate::sink::{MetadataStore, RunMetadataSink};
use crate::walker::process_tree;

/// Check that `source` is an existing, readable directory.
fn validate_source(source: &Path) -> Result<(), EngineError> {
    match fs::metadata(source) {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => {
            return Err(EngineError::SourceNotDirectory {
                path: source.to_path_buf(),
            })
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(EngineError::SourceNotFound {
                path: source.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(EngineError::SourceAccessDenied {
                path: source.to_path_buf(),
                source: e,
            })
        }
    }

    fs::read_dir(source)
        .map(|_| ())
        .map_err(|e| EngineError::SourceAccessDenied {
            path: source.to_path_buf(),
            source: e,
        })
}

/// Whether `destination` is `source` or somewhere beneath it, either as
/// written or once symlinks are resolved.
fn nested_in_source(destination: &Path, source: &Path) -> bool {
    if normalize(destination).starts_with(normalize(source)) {
        return true;
    }
    match (fs::canonicalize(destination), fs::canonicalize(source)) {
        (Ok(destination), Ok(source)) => destination.starts_with(source),
        _ => false,
    }
}

fn absolute(path: &Path) -> Result<PathBuf, EngineError> {
    std::path::absolute(path).map_err(|e| EngineError::SourceAccessDenied {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Create a new migration run.
///
/// Validates that the source exists and is a readable directory, that copy
/// activities have a destination outside the source tree, and that
/// encryption has a key. The destination may not exist yet; it is created
/// by [`execute_run`].
///
/// # Errors
/// Returns EngineError for any of the structural problems above.
pub fn create_run(
    run_id: u64,
    activity: Activity,
    source_root: &Path,
    destination_root: Option<&Path>,
    filters: FilterSpec,
    encryption_key: Option<String>,
) -> Result<RunContext, EngineError> {
    let source_root = absolute(source_root)?;
    validate_source(&source_root)?;

    let destination_root = destination_root
        .filter(|d| !d.as_os_str().is_empty())
        .map(absolute)
        .transpose()?;
    if activity.writes_destination() && destination_root.is_none() {
        return Err(EngineError::MissingDestination {
            activity: activity.to_string(),
        });
    }
    if let Some(destination) = destination_root.as_deref() {
        if activity.writes_destination() && nested_in_source(destination, &source_root) {
            return Err(EngineError::DestinationInsideSource {
                destination: destination.to_path_buf(),
                root: source_root,
            });
        }
    }

    let encryption_key = encryption_key.filter(|k| !k.trim().is_empty());
    if filters.transform.encryption && encryption_key.is_none() {
        return Err(EngineError::MissingEncryptionKey);
    }

    Ok(RunContext::new(
        run_id,
        activity,
        source_root,
        destination_root,
        filters,
        encryption_key,
    ))
}

/// Execute a run, appending one record per processed file to `sink`.
///
/// Individual file errors are recorded but do NOT stop the run.
///
/// # Errors
/// Returns EngineError only for run-level issues: the source disappearing
/// after `create_run`, or the destination root not being creatable.
pub fn execute_run(
    ctx: &RunContext,
    sink: &RunMetadataSink,
    store: &dyn MetadataStore,
    observer: Option<&dyn RunObserver>,
) -> Result<(), EngineError> {
    validate_source(&ctx.source_root)?;

    if ctx.activity.writes_destination() {
        if let Some(destination_root) = &ctx.destination_root {
            fs::create_dir_all(destination_root).map_err(|e| {
                EngineError::DirectoryCreationFailed {
                    path: destination_root.clone(),
                    source: e,
                }
            })?;
        }
    }

    info!(
        run_id = ctx.run_id,
        activity = %ctx.activity,
        source = %ctx.source_root.display(),
        destination = ?ctx.destination_root,
        workers = ctx.parallelism(),
        "Starting run"
    );
    if let Some(observer) = observer {
        observer.on_run_started(ctx);
    }

    let before = sink.len();
    process_tree(ctx, store, sink, observer);
    let recorded = sink.len() - before;

    info!(run_id = ctx.run_id, recorded, cancelled = ctx.is_cancelled(), "Run finished");
    if let Some(observer) = observer {
        observer.on_run_completed(ctx, recorded);
    }
    Ok(())
}

/// Execute `ctx` with a fresh sink and return its records.
pub fn run_migration(
    ctx: &RunContext,
    store: &dyn MetadataStore,
    observer: Option<&dyn RunObserver>,
) -> Result<Vec<FileRecord>, EngineError> {
    let sink = RunMetadataSink::new();
    execute_run(ctx, &sink, store, observer)?;
    Ok(sink.into_records())
}
