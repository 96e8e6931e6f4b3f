//! Checksum parsing and streaming verification.
//!
//! Catalog records carry either a `checksum` field in `algo:hex` form or a
//! legacy bare-hex `sha256` field. Delivery verifies the archive while it
//! streams through a [`ValidatingReader`]; the comparison is deferred to
//! [`ValidatingReader::finalize`], which drains the stream first so every
//! byte the transport produced counts against the digest.

use std::fmt;
use std::io::{self, Read};

use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChecksumError {
    #[error("unsupported algorithm {0:?}")]
    UnsupportedAlgorithm(String),

    #[error("checksum does not match")]
    Mismatch {
        /// Bytes the consumer never read that the drain had to hash. Zero
        /// means the stream was fully consumed before the comparison.
        trailing: u64,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A parsed checksum: algorithm tag plus hex digest.
///
/// Tags outside the verifiable set are kept as [`Checksum::Unknown`] so the
/// bill of materials can still report them; delivery rejects them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checksum {
    Sha256(String),
    Sha512(String),
    Unknown { algorithm: String, hex: String },
}

impl Checksum {
    /// Parse an `algo:hex` string. Bare hex with no tag is the legacy
    /// sha256 form.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some(("sha256", hex)) => Checksum::Sha256(hex.to_string()),
            Some(("sha512", hex)) => Checksum::Sha512(hex.to_string()),
            Some((algorithm, hex)) => Checksum::Unknown {
                algorithm: algorithm.to_string(),
                hex: hex.to_string(),
            },
            None => Checksum::Sha256(raw.to_string()),
        }
    }

    pub fn algorithm(&self) -> &str {
        match self {
            Checksum::Sha256(_) => "sha256",
            Checksum::Sha512(_) => "sha512",
            Checksum::Unknown { algorithm, .. } => algorithm,
        }
    }

    pub fn hex(&self) -> &str {
        match self {
            Checksum::Sha256(hex) | Checksum::Sha512(hex) => hex,
            Checksum::Unknown { hex, .. } => hex,
        }
    }
}

impl fmt::Display for Checksum {
    /// Canonical `algo:hex` form, the shape dependency mappings are keyed by.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm(), self.hex())
    }
}

enum Hasher {
    Sha256(Box<Sha256>),
    Sha512(Box<Sha512>),
}

impl Hasher {
    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha256(hasher) => hasher.update(data),
            Hasher::Sha512(hasher) => hasher.update(data),
        }
    }

    fn hex(self) -> String {
        match self {
            Hasher::Sha256(hasher) => hex::encode(hasher.finalize()),
            Hasher::Sha512(hasher) => hex::encode(hasher.finalize()),
        }
    }
}

/// Pass-through reader that feeds every byte it serves into a digest.
pub struct ValidatingReader<R> {
    inner: R,
    hasher: Hasher,
    expected: String,
}

impl<R: Read> ValidatingReader<R> {
    /// Wrap `inner` so it is hashed as it is read.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::UnsupportedAlgorithm`] before a single byte
    /// is consumed when the checksum cannot be verified.
    pub fn new(inner: R, checksum: &Checksum) -> Result<Self, ChecksumError> {
        let hasher = match checksum {
            Checksum::Sha256(_) => Hasher::Sha256(Box::new(Sha256::new())),
            Checksum::Sha512(_) => Hasher::Sha512(Box::new(Sha512::new())),
            Checksum::Unknown { algorithm, .. } => {
                return Err(ChecksumError::UnsupportedAlgorithm(algorithm.clone()));
            }
        };

        Ok(Self {
            inner,
            hasher,
            expected: checksum.hex().to_ascii_lowercase(),
        })
    }

    /// Drain the stream to EOF and compare digests.
    ///
    /// Draining first means bytes the consumer never asked for, such as tar
    /// end-of-archive padding or trailing garbage, still count against the
    /// digest.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Mismatch`] when the finalized digest differs
    /// from the expected hex; the variant records how many unconsumed bytes
    /// the drain had to account for.
    pub fn finalize(mut self) -> Result<(), ChecksumError> {
        let trailing = io::copy(&mut self, &mut io::sink())?;

        let actual = self.hasher.hex();
        if actual != self.expected {
            return Err(ChecksumError::Mismatch { trailing });
        }

        Ok(())
    }
}

impl<R: Read> Read for ValidatingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}
