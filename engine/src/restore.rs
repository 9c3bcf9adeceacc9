//! Reading migrated files back to their original bytes.
//!
//! The write chain is gzip then AES-CTR, so the read chain is AES-CTR then
//! gunzip. The same chain verifies freshly written files and serves
//! downloads.

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use crate::crypto::{decode_key, DecryptingReader};
use crate::error::{RestoreError, TransferError};
use crate::model::FileRecord;
use crate::sink::MetadataStore;

pub const COMPRESSED_SUFFIX: &str = ".gz";
pub const ENCRYPTED_SUFFIX: &str = ".enc";

/// Open `path` and undo encryption and compression as requested.
///
/// `key` is the base64 key and must be given when the file is encrypted.
pub fn open_decoded(
    path: &Path,
    compressed: bool,
    key: Option<&str>,
) -> Result<Box<dyn Read>, TransferError> {
    let file = File::open(path).map_err(|e| TransferError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut reader: Box<dyn Read> = Box::new(BufReader::new(file));

    if let Some(key) = key {
        let key = decode_key(key)?;
        reader = Box::new(DecryptingReader::new(reader, &key)?);
    }
    if compressed {
        reader = Box::new(GzDecoder::new(reader));
    }
    Ok(reader)
}

/// Strip `.enc` and then `.gz` from a stored file name.
pub fn original_file_name(stored_name: &str) -> &str {
    let name = stored_name
        .strip_suffix(ENCRYPTED_SUFFIX)
        .unwrap_or(stored_name);
    name.strip_suffix(COMPRESSED_SUFFIX).unwrap_or(name)
}

/// Decode a migrated file at `path` into `out`.
///
/// Transform flags and key come from the newest store row for the file's
/// directory and name. Without a row the suffixes decide, and an encrypted
/// file then has no key to decrypt with. Returns the number of bytes
/// written to `out`.
pub fn restore_file(
    path: &Path,
    store: &dyn MetadataStore,
    out: &mut dyn Write,
) -> Result<u64, RestoreError> {
    let record = latest_record(path, store)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (compressed, encrypted, key) = match &record {
        Some(r) => (r.compressed, r.encrypted, r.encryption_key.clone()),
        None => {
            let without_enc = file_name.strip_suffix(ENCRYPTED_SUFFIX);
            let encrypted = without_enc.is_some();
            let compressed = without_enc
                .unwrap_or(&file_name)
                .ends_with(COMPRESSED_SUFFIX);
            (compressed, encrypted, None)
        }
    };

    let key = match (encrypted, key) {
        (true, Some(key)) => Some(key),
        (true, None) => {
            return Err(RestoreError::MissingKey {
                path: path.to_path_buf(),
            })
        }
        (false, _) => None,
    };

    let mut reader = open_decoded(path, compressed, key.as_deref())?;
    let written = io::copy(&mut reader, out).map_err(|e| TransferError::VerifyError {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(written)
}

fn latest_record(
    path: &Path,
    store: &dyn MetadataStore,
) -> Result<Option<FileRecord>, RestoreError> {
    let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
        return Ok(None);
    };
    let rows = store.find_by_destination(dir, &name.to_string_lossy())?;
    Ok(rows.into_iter().max_by_key(|r| r.recorded_at))
}
