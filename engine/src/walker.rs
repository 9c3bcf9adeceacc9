//! Depth-first source walk feeding a pool of file workers.
//!
//! The walk runs on the calling thread. File paths go through a bounded
//! channel to `parallelism` scoped workers, each running its own
//! `TransformPipeline`. With one worker, records land in walk order.

use crossbeam_channel::Sender;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{debug, trace, warn};

use crate::filter::FilterEvaluator;
use crate::model::RunContext;
use crate::progress::RunObserver;
use crate::sink::{MetadataStore, RunMetadataSink};
use crate::transform::TransformPipeline;

/// Walks a source tree, pruning excluded directories.
pub struct DirectoryWalker<'a> {
    ctx: &'a RunContext,
    evaluator: FilterEvaluator<'a>,
    observer: Option<&'a dyn RunObserver>,
}

impl<'a> DirectoryWalker<'a> {
    pub fn new(ctx: &'a RunContext, observer: Option<&'a dyn RunObserver>) -> Self {
        DirectoryWalker {
            ctx,
            evaluator: FilterEvaluator::new(&ctx.filters),
            observer,
        }
    }

    /// Send every candidate file under the source root to `files`.
    ///
    /// Stops early when the run is cancelled or every receiver is gone.
    pub fn walk(&self, files: &Sender<PathBuf>) {
        let root = self.ctx.source_root.as_path();
        self.visit(root, self.ctx.destination_root.as_deref(), files);
    }

    /// Returns false once the walk should stop.
    fn visit(&self, dir: &Path, mirrored: Option<&Path>, files: &Sender<PathBuf>) -> bool {
        if self.ctx.is_cancelled() {
            return false;
        }
        if !self.evaluator.include_directory(dir) {
            if let Some(observer) = self.observer {
                observer.on_directory_pruned(dir);
            }
            return true;
        }
        trace!(dir = %dir.display(), mirrored = ?mirrored, "Visiting directory");

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Unable to read directory; skipping");
                return true;
            }
        };

        for entry in entries {
            if self.ctx.is_cancelled() {
                return false;
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Unable to read directory entry; skipping");
                    continue;
                }
            };
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unable to read file type; skipping");
                    continue;
                }
            };

            let keep_going = if file_type.is_dir() {
                let child_mirror = mirrored.map(|m| m.join(entry.file_name()));
                self.visit(&path, child_mirror.as_deref(), files)
            } else if file_type.is_file() {
                files.send(path).is_ok()
            } else if file_type.is_symlink() {
                self.visit_symlink(path, files)
            } else {
                true
            };
            if !keep_going {
                return false;
            }
        }
        true
    }

    fn visit_symlink(&self, path: PathBuf, files: &Sender<PathBuf>) -> bool {
        match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => files.send(path).is_ok(),
            Ok(metadata) if metadata.is_dir() => {
                debug!(path = %path.display(), "Not following symlinked directory");
                true
            }
            Ok(_) => true,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Broken symlink; skipping");
                true
            }
        }
    }
}

/// Walk the source tree and process every file on a worker pool.
///
/// Blocks until the walk and all workers are finished.
pub fn process_tree(
    ctx: &RunContext,
    store: &dyn MetadataStore,
    sink: &RunMetadataSink,
    observer: Option<&dyn RunObserver>,
) {
    let workers = ctx.parallelism().max(1);
    let (sender, receiver) = crossbeam_channel::bounded::<PathBuf>(workers);

    thread::scope(|scope| {
        for _ in 0..workers {
            let receiver = receiver.clone();
            scope.spawn(move || {
                let pipeline = TransformPipeline::new(ctx, store);
                for path in receiver.iter() {
                    // Drain without processing once cancelled
                    if ctx.is_cancelled() {
                        continue;
                    }
                    match pipeline.process_file(&path) {
                        Some(record) => {
                            if let Some(observer) = observer {
                                observer.on_file_recorded(&record);
                            }
                            sink.append(record);
                        }
                        None => {
                            if let Some(observer) = observer {
                                observer.on_file_skipped(&path);
                            }
                        }
                    }
                }
            });
        }
        drop(receiver);

        DirectoryWalker::new(ctx, observer).walk(&sender);
        drop(sender);
    });
}
