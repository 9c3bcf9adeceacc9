//! Checksum algorithms and streaming hashers.
//!
//! Hashers are fed incrementally while bytes stream through the transform
//! chain, so a file is never read twice just to hash it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

use crate::error::TransferError;

/// Supported checksum algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// MD5 (deprecated, but included for compatibility)
    Md5,
    /// SHA-1 (legacy compatibility)
    Sha1,
    /// SHA-256 (default)
    Sha256,
    /// BLAKE3 (modern, fast, 256-bit)
    Blake3,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "MD5"),
            Self::Sha1 => write!(f, "SHA1"),
            Self::Sha256 => write!(f, "SHA-256"),
            Self::Blake3 => write!(f, "BLAKE3"),
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = TransferError;

    /// Accepts the names callers send, with or without a dash, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "").as_str() {
            "MD5" => Ok(Self::Md5),
            "SHA1" => Ok(Self::Sha1),
            "SHA256" => Ok(Self::Sha256),
            "BLAKE3" => Ok(Self::Blake3),
            _ => Err(TransferError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// A computed checksum value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumValue {
    algorithm: ChecksumAlgorithm,
    hex: String,
}

impl ChecksumValue {
    pub fn new(algorithm: ChecksumAlgorithm, hex: String) -> Self {
        ChecksumValue { algorithm, hex }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Lower-case hex digest
    pub fn hex(&self) -> &str {
        &self.hex
    }

    pub fn into_hex(self) -> String {
        self.hex
    }
}

impl fmt::Display for ChecksumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex)
    }
}

/// Trait for computing checksums
pub trait ChecksumHasher: Send {
    /// Update the hasher with new data
    fn update(&mut self, data: &[u8]);

    /// Finalize and return the checksum value
    fn finalize(self: Box<Self>) -> ChecksumValue;
}

struct Md5Hasher {
    context: md5::Context,
}

impl ChecksumHasher for Md5Hasher {
    fn update(&mut self, data: &[u8]) {
        self.context.consume(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        let digest = self.context.compute();
        ChecksumValue::new(ChecksumAlgorithm::Md5, format!("{:x}", digest))
    }
}

struct Sha1Hasher {
    hasher: sha1::Sha1,
}

impl ChecksumHasher for Sha1Hasher {
    fn update(&mut self, data: &[u8]) {
        use sha1::Digest;
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        use sha1::Digest;
        let digest = self.hasher.finalize();
        ChecksumValue::new(ChecksumAlgorithm::Sha1, format!("{:x}", digest))
    }
}

struct Sha256Hasher {
    hasher: sha2::Sha256,
}

impl ChecksumHasher for Sha256Hasher {
    fn update(&mut self, data: &[u8]) {
        use sha2::Digest;
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        use sha2::Digest;
        let digest = self.hasher.finalize();
        ChecksumValue::new(ChecksumAlgorithm::Sha256, format!("{:x}", digest))
    }
}

struct Blake3Hasher {
    hasher: blake3::Hasher,
}

impl ChecksumHasher for Blake3Hasher {
    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        let digest = self.hasher.finalize();
        ChecksumValue::new(ChecksumAlgorithm::Blake3, digest.to_hex().to_string())
    }
}

/// Create a new hasher for the given algorithm
pub fn create_hasher(algorithm: ChecksumAlgorithm) -> Box<dyn ChecksumHasher> {
    match algorithm {
        ChecksumAlgorithm::Md5 => Box::new(Md5Hasher {
            context: md5::Context::new(),
        }),
        ChecksumAlgorithm::Sha1 => Box::new(Sha1Hasher {
            hasher: sha1::Sha1::default(),
        }),
        ChecksumAlgorithm::Sha256 => Box::new(Sha256Hasher {
            hasher: sha2::Sha256::default(),
        }),
        ChecksumAlgorithm::Blake3 => Box::new(Blake3Hasher {
            hasher: blake3::Hasher::new(),
        }),
    }
}

/// Copy `reader` into `writer`, hashing every byte read.
///
/// Returns the number of bytes copied. Read and write failures are kept
/// apart so callers can attribute them to the right path.
pub fn copy_hashed<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    hasher: &mut dyn ChecksumHasher,
) -> Result<u64, CopyFailure> {
    let mut buffer = [0u8; 65536]; // 64 KB buffer
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyFailure::Read(e)),
        };
        hasher.update(&buffer[..n]);
        writer.write_all(&buffer[..n]).map_err(CopyFailure::Write)?;
        total += n as u64;
    }
    Ok(total)
}

/// Hash everything `reader` yields.
pub fn hash_reader<R: Read + ?Sized>(
    reader: &mut R,
    algorithm: ChecksumAlgorithm,
) -> io::Result<ChecksumValue> {
    let mut hasher = create_hasher(algorithm);
    copy_hashed(reader, &mut io::sink(), hasher.as_mut()).map_err(CopyFailure::into_inner)?;
    Ok(hasher.finalize())
}

/// Which side of a [`copy_hashed`] call failed.
#[derive(Debug)]
pub enum CopyFailure {
    Read(io::Error),
    Write(io::Error),
}

impl CopyFailure {
    pub fn into_inner(self) -> io::Error {
        match self {
            CopyFailure::Read(e) | CopyFailure::Write(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("SHA-256".parse::<ChecksumAlgorithm>().ok(), Some(ChecksumAlgorithm::Sha256));
        assert_eq!("sha256".parse::<ChecksumAlgorithm>().ok(), Some(ChecksumAlgorithm::Sha256));
        assert_eq!("md5".parse::<ChecksumAlgorithm>().ok(), Some(ChecksumAlgorithm::Md5));
        assert_eq!("SHA1".parse::<ChecksumAlgorithm>().ok(), Some(ChecksumAlgorithm::Sha1));
        assert_eq!("SHA-1".parse::<ChecksumAlgorithm>().ok(), Some(ChecksumAlgorithm::Sha1));
        assert!(matches!(
            "crc64".parse::<ChecksumAlgorithm>(),
            Err(TransferError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_known_digests() {
        let data = b"hello world";
        let cases = [
            (ChecksumAlgorithm::Md5, "5eb63bbbe01eeed093cb22bb8f5acdc3"),
            (ChecksumAlgorithm::Sha1, "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"),
            (
                ChecksumAlgorithm::Sha256,
                "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9",
            ),
        ];
        for (algorithm, expected) in cases {
            let value = hash_reader(&mut &data[..], algorithm).expect("Failed to hash");
            assert_eq!(value.hex(), expected, "{algorithm}");
            assert_eq!(value.algorithm(), algorithm);
        }
    }

    #[test]
    fn test_blake3_matches_direct_hash() {
        let data = b"hello world";
        let value = hash_reader(&mut &data[..], ChecksumAlgorithm::Blake3).expect("Failed to hash");
        assert_eq!(value.hex(), blake3::hash(data).to_hex().as_str());
    }

    #[test]
    fn test_copy_hashed_copies_and_hashes() {
        let data = vec![7u8; 200_000];
        let mut out = Vec::new();
        let mut hasher = create_hasher(ChecksumAlgorithm::Sha256);
        let copied = copy_hashed(&mut &data[..], &mut out, hasher.as_mut()).expect("Failed to copy");

        assert_eq!(copied, 200_000);
        assert_eq!(out, data);
        let direct = hash_reader(&mut &data[..], ChecksumAlgorithm::Sha256).expect("Failed to hash");
        assert_eq!(hasher.finalize(), direct);
    }
}
