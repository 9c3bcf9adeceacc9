//! Per-file processing for each activity.
//!
//! The copy chain is `source -> hasher -> gzip -> AES-CTR -> file`. Once the
//! file is on disk it is read back through the inverse chain and hashed
//! again; the copy is validated only when both digests agree.

use chrono::Local;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

use crate::attributes::{split_extension, FileAttributes};
use crate::checksums::{
    copy_hashed, create_hasher, hash_reader, ChecksumAlgorithm, ChecksumValue, CopyFailure,
};
use crate::crypto::{decode_key, EncryptingWriter};
use crate::destination::resolve_destination;
use crate::error::TransferError;
use crate::filter::{FilterDecision, FilterEvaluator};
use crate::fs_ops::{ensure_parent_dir_exists, preserve_mtime, version_existing};
use crate::model::{Activity, FileRecord, RunContext};
use crate::restore::{open_decoded, COMPRESSED_SUFFIX, ENCRYPTED_SUFFIX};
use crate::sink::MetadataStore;

/// Hashes a written file after undoing its transforms.
type ReadBack = fn(&Path, bool, Option<&str>, ChecksumAlgorithm) -> Result<ChecksumValue, TransferError>;

/// Applies a run's activity to individual files.
pub struct TransformPipeline<'a> {
    ctx: &'a RunContext,
    store: &'a dyn MetadataStore,
    evaluator: FilterEvaluator<'a>,
    read_back: ReadBack,
}

/// Digests produced by a successful copy.
struct CopyOutcome {
    source: ChecksumValue,
    target: ChecksumValue,
}

impl<'a> TransformPipeline<'a> {
    pub fn new(ctx: &'a RunContext, store: &'a dyn MetadataStore) -> Self {
        TransformPipeline {
            ctx,
            store,
            evaluator: FilterEvaluator::new(&ctx.filters),
            read_back: read_back_checksum,
        }
    }

    #[cfg(test)]
    fn with_read_back(mut self, read_back: ReadBack) -> Self {
        self.read_back = read_back;
        self
    }

    /// Filter one file and apply the run's activity to it.
    ///
    /// Returns `None` when the file is filtered out or its attributes
    /// cannot be read. Every other outcome, failures included, produces a
    /// record which has already been handed to the metadata store.
    pub fn process_file(&self, path: &Path) -> Option<FileRecord> {
        let attrs = match FileAttributes::read(path) {
            Ok(attrs) => attrs,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Error reading attributes for filtering; excluding file");
                return None;
            }
        };

        if let FilterDecision::Excluded { stage, reason } = self.evaluator.evaluate(path, &attrs) {
            info!(path = %path.display(), %stage, %reason, "Skipping file due to filter criteria");
            return None;
        }

        let mut record = self.base_record(path, &attrs);
        match self.ctx.activity {
            Activity::Copy | Activity::CopyAndPurge => self.migrate(path, &attrs, &mut record),
            Activity::Preview => self.preview(path, &mut record),
            Activity::PurgeOnly => purge(path, &mut record),
        }

        self.persist(&record);
        Some(record)
    }

    fn base_record(&self, path: &Path, attrs: &FileAttributes) -> FileRecord {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = split_extension(&file_name).1.to_string();

        FileRecord {
            file_id: self.ctx.next_file_id(),
            run_id: self.ctx.run_id,
            activity: self.ctx.activity,
            file_name,
            source_path: path.to_path_buf(),
            source_parent: path.parent().map(Path::to_path_buf),
            destination_path: None,
            target_dir: None,
            target_file_name: None,
            size: attrs.size,
            created: Some(attrs.created),
            modified: Some(attrs.modified),
            owner: attrs.owner.clone(),
            extension,
            checksum_algorithm: None,
            source_checksum: None,
            target_checksum: None,
            validated: false,
            versioned: false,
            encrypted: false,
            encryption_key: None,
            compressed: false,
            archived: false,
            error: None,
            recorded_at: Local::now(),
        }
    }

    /// Where `source` ends up, transform extensions included.
    fn final_destination(&self, source: &Path) -> Result<Option<PathBuf>, TransferError> {
        let Some(destination_root) = &self.ctx.destination_root else {
            return Ok(None);
        };
        let options = &self.ctx.filters.transform;
        let resolved = resolve_destination(
            source,
            &self.ctx.source_root,
            destination_root,
            options.preserve_source_root,
        )?;
        let file_name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Some(resolved.with_file_name(final_file_name(
            &file_name,
            options.compression,
            options.encryption,
        ))))
    }

    fn migrate(&self, source: &Path, attrs: &FileAttributes, record: &mut FileRecord) {
        let options = &self.ctx.filters.transform;
        record.compressed = options.compression;
        record.encrypted = options.encryption;
        record.versioned = options.versioning;
        if options.encryption {
            record.encryption_key = self.ctx.encryption_key.clone();
        }

        let destination = match self.final_destination(source) {
            Ok(Some(destination)) => destination,
            Ok(None) => {
                record.error = Some("No destination root configured".to_string());
                return;
            }
            Err(e) => {
                error!(path = %source.display(), error = %e, "Failed to resolve destination");
                record.error = Some(e.to_string());
                return;
            }
        };
        set_destination(record, &destination);

        if same_file(source, &destination) {
            let e = TransferError::DestinationIsSource {
                path: destination.clone(),
            };
            error!(path = %source.display(), error = %e, "Refusing to copy file onto itself");
            record.error = Some(e.to_string());
            return;
        }

        if options.versioning && destination.exists() {
            version_existing(&destination);
        }

        match self.copy_transformed(source, &destination, attrs.modified.into()) {
            Ok(outcome) => {
                record.checksum_algorithm = Some(outcome.source.algorithm());
                record.validated = outcome.source.hex() == outcome.target.hex();
                record.archived = record.validated;
                record.source_checksum = Some(outcome.source.into_hex());
                record.target_checksum = Some(outcome.target.into_hex());
                if record.validated {
                    info!(from = %source.display(), to = %destination.display(), "Copied file");
                } else {
                    error!(path = %destination.display(), "Checksum mismatch after copy");
                    record.error = Some("Checksum mismatch between source and written file".to_string());
                }
            }
            Err(e) => {
                error!(from = %source.display(), to = %destination.display(), error = %e, "Failed to transform file");
                record.error = Some(e.to_string());
            }
        }

        if self.ctx.activity == Activity::CopyAndPurge {
            if record.validated {
                purge(source, record);
            } else {
                warn!(path = %source.display(), "Copy not validated; keeping source file");
            }
        }
    }

    fn copy_transformed(
        &self,
        source: &Path,
        destination: &Path,
        mtime: SystemTime,
    ) -> Result<CopyOutcome, TransferError> {
        let options = &self.ctx.filters.transform;
        let algorithm: ChecksumAlgorithm = options.checksum_algorithm.parse()?;
        let key = if options.encryption {
            Some(self.encryption_key()?)
        } else {
            None
        };
        let key_bytes = key.map(decode_key).transpose()?;

        ensure_parent_dir_exists(destination)?;
        let mut input = File::open(source).map_err(|e| TransferError::ReadError {
            path: source.to_path_buf(),
            source: e,
        })?;
        let output = File::create(destination).map_err(|e| write_error(destination, e))?;

        let mut writer: Box<dyn Write> = Box::new(BufWriter::new(output));
        if let Some(key_bytes) = &key_bytes {
            writer = Box::new(EncryptingWriter::new(writer, key_bytes)?);
        }

        let mut hasher = create_hasher(algorithm);
        let copy_error = |failure: CopyFailure| match failure {
            CopyFailure::Read(e) => TransferError::ReadError {
                path: source.to_path_buf(),
                source: e,
            },
            CopyFailure::Write(e) => write_error(destination, e),
        };
        if options.compression {
            let mut encoder = GzEncoder::new(writer, Compression::default());
            copy_hashed(&mut input, &mut encoder, hasher.as_mut()).map_err(copy_error)?;
            writer = encoder.finish().map_err(|e| write_error(destination, e))?;
        } else {
            copy_hashed(&mut input, &mut writer, hasher.as_mut()).map_err(copy_error)?;
        }
        writer.flush().map_err(|e| write_error(destination, e))?;
        drop(writer);

        preserve_mtime(destination, mtime);
        let target = (self.read_back)(destination, options.compression, key, algorithm)?;
        Ok(CopyOutcome {
            source: hasher.finalize(),
            target,
        })
    }

    fn encryption_key(&self) -> Result<&'a str, TransferError> {
        self.ctx
            .encryption_key
            .as_deref()
            .ok_or_else(|| TransferError::InvalidKey("no encryption key configured".to_string()))
    }

    fn preview(&self, source: &Path, record: &mut FileRecord) {
        match self.final_destination(source) {
            Ok(Some(destination)) => {
                info!(from = %source.display(), to = %destination.display(), "Preview: file would be copied");
                set_destination(record, &destination);
            }
            Ok(None) => info!(path = %source.display(), "Preview: file matches filters"),
            Err(e) => {
                warn!(path = %source.display(), error = %e, "Preview: failed to resolve destination");
                record.error = Some(e.to_string());
            }
        }
    }

    fn persist(&self, record: &FileRecord) {
        if record.activity.writes_destination() && self.ctx.filters.transform.check_duplicates {
            self.remove_duplicates(record);
        }
        if let Err(e) = self.store.save(record) {
            error!(file_id = %record.file_id, error = %e, "Failed to save file metadata");
        }
    }

    fn remove_duplicates(&self, record: &FileRecord) {
        let (Some(dir), Some(name)) = (&record.target_dir, &record.target_file_name) else {
            return;
        };
        match self.store.find_by_destination(dir, name) {
            Ok(rows) if rows.is_empty() => {}
            Ok(rows) => {
                debug!(count = rows.len(), dir = %dir.display(), %name, "Removing duplicate metadata rows");
                if let Err(e) = self.store.delete_all(&rows) {
                    error!(error = %e, "Failed to delete duplicate metadata rows");
                }
            }
            Err(e) => error!(error = %e, "Failed to look up duplicate metadata rows"),
        }
    }
}

/// Append `.gz` and then `.enc` as requested, unless already present.
pub fn final_file_name(file_name: &str, compress: bool, encrypt: bool) -> String {
    let mut name = file_name.to_string();
    if compress && !name.ends_with(COMPRESSED_SUFFIX) {
        name.push_str(COMPRESSED_SUFFIX);
    }
    if encrypt && !name.ends_with(ENCRYPTED_SUFFIX) {
        name.push_str(ENCRYPTED_SUFFIX);
    }
    name
}

/// Hash a written file after undoing its transforms.
pub fn read_back_checksum(
    path: &Path,
    compressed: bool,
    key: Option<&str>,
    algorithm: ChecksumAlgorithm,
) -> Result<ChecksumValue, TransferError> {
    let mut reader = open_decoded(path, compressed, key)?;
    hash_reader(&mut reader, algorithm).map_err(|e| TransferError::VerifyError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn same_file(source: &Path, destination: &Path) -> bool {
    if source == destination {
        return true;
    }
    match (fs::canonicalize(source), fs::canonicalize(destination)) {
        (Ok(source), Ok(destination)) => source == destination,
        _ => false,
    }
}

fn set_destination(record: &mut FileRecord, destination: &Path) {
    record.target_dir = destination.parent().map(Path::to_path_buf);
    record.target_file_name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    record.destination_path = Some(destination.to_path_buf());
}

fn purge(source: &Path, record: &mut FileRecord) {
    match fs::remove_file(source) {
        Ok(()) => info!(path = %source.display(), "Deleted source file"),
        Err(e) => {
            error!(path = %source.display(), error = %e, "Failed to delete source file");
            record.error = Some(format!("Failed to delete source file: {e}"));
        }
    }
}

fn write_error(path: &Path, source: std::io::Error) -> TransferError {
    TransferError::WriteError {
        path: path.to_path_buf(),
        source,
    }
}
