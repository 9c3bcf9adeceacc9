//! Stream encryption for migrated files.
//!
//! Files are encrypted with AES in counter mode. The key length picks the
//! variant (16, 24 or 32 bytes for AES-128/192/256). Each file starts with a
//! random 16-byte IV followed by the ciphertext, which has the same length as
//! the plaintext.

use aes::{Aes128, Aes192, Aes256};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ctr::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use rand::RngCore;
use std::io::{self, Read, Write};

use crate::error::TransferError;

/// Length of the IV written at the start of every encrypted file.
pub const IV_LEN: usize = 16;

/// Size of keys produced by [`generate_key`] (128 bits).
const GENERATED_KEY_LEN: usize = 16;

/// Generate a random base64-encoded 128-bit key.
pub fn generate_key() -> String {
    let mut key = [0u8; GENERATED_KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key);
    STANDARD.encode(key)
}

/// Decode a base64 key and check its length.
pub fn decode_key(encoded: &str) -> Result<Vec<u8>, TransferError> {
    let key = STANDARD
        .decode(encoded.trim())
        .map_err(|e| TransferError::InvalidKey(e.to_string()))?;
    match key.len() {
        16 | 24 | 32 => Ok(key),
        n => Err(TransferError::InvalidKey(format!(
            "key must be 16, 24 or 32 bytes, got {n}"
        ))),
    }
}

enum Keystream {
    Aes128(Ctr128BE<Aes128>),
    Aes192(Ctr128BE<Aes192>),
    Aes256(Ctr128BE<Aes256>),
}

impl Keystream {
    fn new(key: &[u8], iv: &[u8; IV_LEN]) -> Result<Self, TransferError> {
        let cipher = |e: ctr::cipher::InvalidLength| TransferError::Cipher(e.to_string());
        match key.len() {
            16 => Ctr128BE::<Aes128>::new_from_slices(key, iv).map(Keystream::Aes128).map_err(cipher),
            24 => Ctr128BE::<Aes192>::new_from_slices(key, iv).map(Keystream::Aes192).map_err(cipher),
            32 => Ctr128BE::<Aes256>::new_from_slices(key, iv).map(Keystream::Aes256).map_err(cipher),
            n => Err(TransferError::InvalidKey(format!(
                "key must be 16, 24 or 32 bytes, got {n}"
            ))),
        }
    }

    fn apply(&mut self, buf: &mut [u8]) {
        match self {
            Keystream::Aes128(c) => c.apply_keystream(buf),
            Keystream::Aes192(c) => c.apply_keystream(buf),
            Keystream::Aes256(c) => c.apply_keystream(buf),
        }
    }
}

/// Writer that encrypts everything written through it.
pub struct EncryptingWriter<W: Write> {
    inner: W,
    keystream: Keystream,
    scratch: Vec<u8>,
}

impl<W: Write> EncryptingWriter<W> {
    /// Write a fresh IV to `inner` and start encrypting.
    pub fn new(mut inner: W, key: &[u8]) -> Result<Self, TransferError> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);
        let keystream = Keystream::new(key, &iv)?;
        inner
            .write_all(&iv)
            .map_err(|e| TransferError::Cipher(format!("failed to write IV: {e}")))?;
        Ok(EncryptingWriter {
            inner,
            keystream,
            scratch: Vec::new(),
        })
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for EncryptingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.scratch.clear();
        self.scratch.extend_from_slice(buf);
        self.keystream.apply(&mut self.scratch);
        // The keystream has advanced past all of buf, so all of it must land
        self.inner.write_all(&self.scratch)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reader that decrypts a stream produced by [`EncryptingWriter`].
pub struct DecryptingReader<R: Read> {
    inner: R,
    keystream: Keystream,
}

impl<R: Read> DecryptingReader<R> {
    /// Read the IV from `inner` and start decrypting.
    pub fn new(mut inner: R, key: &[u8]) -> Result<Self, TransferError> {
        let mut iv = [0u8; IV_LEN];
        inner
            .read_exact(&mut iv)
            .map_err(|e| TransferError::Cipher(format!("failed to read IV: {e}")))?;
        let keystream = Keystream::new(key, &iv)?;
        Ok(DecryptingReader { inner, keystream })
    }
}

impl<R: Read> Read for DecryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.keystream.apply(&mut buf[..n]);
        Ok(n)
    }
}
