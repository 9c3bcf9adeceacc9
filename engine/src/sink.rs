//! Run-scoped record collection and metadata persistence.
//!
//! `RunMetadataSink` holds the records of one run and is owned by the
//! caller. `MetadataStore` is the persistence seam; the engine only needs
//! save, lookup by destination, and delete.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::model::FileRecord;

/// Append-only collection of the records produced by one run.
#[derive(Debug, Default)]
pub struct RunMetadataSink {
    records: Mutex<Vec<FileRecord>>,
}

impl RunMetadataSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: FileRecord) {
        self.lock().push(record);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the records appended so far.
    pub fn snapshot(&self) -> Vec<FileRecord> {
        self.lock().clone()
    }

    pub fn into_records(self) -> Vec<FileRecord> {
        self.records
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // A panicking worker cannot leave a half-pushed Vec, so recover the data
    fn lock(&self) -> MutexGuard<'_, Vec<FileRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Persistence for file metadata rows.
pub trait MetadataStore: Send + Sync {
    fn save(&self, record: &FileRecord) -> Result<(), StoreError>;

    /// Rows whose target directory and target file name match.
    fn find_by_destination(
        &self,
        target_dir: &Path,
        target_file_name: &str,
    ) -> Result<Vec<FileRecord>, StoreError>;

    /// Delete rows by (run id, file id).
    fn delete_all(&self, records: &[FileRecord]) -> Result<(), StoreError>;

    fn all(&self) -> Result<Vec<FileRecord>, StoreError>;
}

fn same_destination(record: &FileRecord, target_dir: &Path, target_file_name: &str) -> bool {
    record.target_dir.as_deref() == Some(target_dir)
        && record.target_file_name.as_deref() == Some(target_file_name)
}

fn same_row(a: &FileRecord, b: &FileRecord) -> bool {
    a.run_id == b.run_id && a.file_id == b.file_id
}

/// Store that keeps rows in memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    rows: Mutex<Vec<FileRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> Result<MutexGuard<'_, Vec<FileRecord>>, StoreError> {
        self.rows.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl MetadataStore for InMemoryStore {
    fn save(&self, record: &FileRecord) -> Result<(), StoreError> {
        self.rows()?.push(record.clone());
        Ok(())
    }

    fn find_by_destination(
        &self,
        target_dir: &Path,
        target_file_name: &str,
    ) -> Result<Vec<FileRecord>, StoreError> {
        Ok(self
            .rows()?
            .iter()
            .filter(|r| same_destination(r, target_dir, target_file_name))
            .cloned()
            .collect())
    }

    fn delete_all(&self, records: &[FileRecord]) -> Result<(), StoreError> {
        self.rows()?
            .retain(|row| !records.iter().any(|r| same_row(row, r)));
        Ok(())
    }

    fn all(&self) -> Result<Vec<FileRecord>, StoreError> {
        Ok(self.rows()?.clone())
    }
}

/// Store backed by a JSON array on disk.
///
/// Every write loads and rewrites the whole file, so a `save` costs time
/// proportional to the rows already stored and a run of `n` files costs
/// `O(n^2)`. That is fine for the CLI's audit log; large migrations should
/// implement [`MetadataStore`] over a real database. The mutex serializes
/// writers within one process.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        JsonFileStore {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Vec<FileRecord>, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&self, rows: &[FileRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(rows)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut Vec<FileRecord>)) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut rows = self.load()?;
        f(&mut rows);
        self.persist(&rows)
    }
}

impl MetadataStore for JsonFileStore {
    fn save(&self, record: &FileRecord) -> Result<(), StoreError> {
        self.update(|rows| rows.push(record.clone()))
    }

    fn find_by_destination(
        &self,
        target_dir: &Path,
        target_file_name: &str,
    ) -> Result<Vec<FileRecord>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self
            .load()?
            .into_iter()
            .filter(|r| same_destination(r, target_dir, target_file_name))
            .collect())
    }

    fn delete_all(&self, records: &[FileRecord]) -> Result<(), StoreError> {
        self.update(|rows| rows.retain(|row| !records.iter().any(|r| same_row(row, r))))
    }

    fn all(&self) -> Result<Vec<FileRecord>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        self.load()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::Activity;
    use chrono::Local;

    pub(crate) fn record(run_id: u64, file_id: &str, dir: &str, name: &str) -> FileRecord {
        FileRecord {
            file_id: file_id.to_string(),
            run_id,
            activity: Activity::Copy,
            file_name: name.to_string(),
            source_path: PathBuf::from("/src").join(name),
            source_parent: Some(PathBuf::from("/src")),
            destination_path: Some(PathBuf::from(dir).join(name)),
            target_dir: Some(PathBuf::from(dir)),
            target_file_name: Some(name.to_string()),
            size: 1,
            created: None,
            modified: None,
            owner: "alice".to_string(),
            extension: "txt".to_string(),
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

    fn exercise_store(store: &dyn MetadataStore) {
        store.save(&record(1, "1.001", "/dst", "a.txt")).expect("Failed to save");
        store.save(&record(1, "1.002", "/dst", "b.txt")).expect("Failed to save");
        store.save(&record(2, "2.001", "/dst", "a.txt")).expect("Failed to save");

        let found = store
            .find_by_destination(Path::new("/dst"), "a.txt")
            .expect("Failed to query");
        assert_eq!(found.len(), 2);

        store.delete_all(&found[..1]).expect("Failed to delete");
        let remaining = store.all().expect("Failed to list");
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|r| r.file_id != found[0].file_id));
    }

    #[test]
    fn test_sink_appends_in_order() {
        let sink = RunMetadataSink::new();
        assert!(sink.is_empty());
        sink.append(record(1, "1.001", "/dst", "a.txt"));
        sink.append(record(1, "1.002", "/dst", "b.txt"));

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.snapshot()[0].file_id, "1.001");
        let records = sink.into_records();
        assert_eq!(records[1].file_id, "1.002");
    }

    #[test]
    fn test_in_memory_store() {
        exercise_store(&InMemoryStore::new());
    }

    #[test]
    fn test_json_file_store_persists() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("meta").join("store.json");

        exercise_store(&JsonFileStore::open(&path));

        let reopened = JsonFileStore::open(&path);
        assert_eq!(reopened.all().expect("Failed to list").len(), 2);
    }

    #[test]
    fn test_json_file_store_missing_file_is_empty() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = JsonFileStore::open(temp_dir.path().join("none.json"));
        assert!(store.all().expect("Failed to list").is_empty());
    }
}
