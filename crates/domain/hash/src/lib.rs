//! Hasher/Comparator: digest computation and constant-time hex comparison.
//!
//! Used wherever a pointer-value or download hash is compared against an
//! expected value, so that timing cannot be used to narrow down a guess.

use digest::Digest;
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha384};
use subtle::ConstantTimeEq;

/// The two digest algorithms the supply chain recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
}

impl HashAlgorithm {
    /// Hex-string length for a digest under this algorithm.
    pub fn hex_len(self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha384 => 96,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sha256" => Some(HashAlgorithm::Sha256),
            "sha384" => Some(HashAlgorithm::Sha384),
            _ => None,
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computes the lowercase hex digest of `data` under `algorithm`.
pub fn hash(data: &[u8], algorithm: HashAlgorithm) -> String {
    match algorithm {
        HashAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
        HashAlgorithm::Sha384 => hex::encode(Sha384::digest(data)),
    }
}

/// Constant-time comparison of two hex digests.
///
/// Unequal lengths compare false without leaking anything about where the
/// content would have diverged: the length check itself is not secret
/// (digest lengths are a public property of the algorithm), only the byte
/// content is.
pub fn hash_equal(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// A streaming hasher used while reading a response body, so the digest is
/// available the moment the last byte has arrived without a second pass.
pub struct StreamingHasher {
    algorithm: HashAlgorithm,
    sha256: Option<Sha256>,
    sha384: Option<Sha384>,
    len: u64,
}

impl StreamingHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Self {
                algorithm,
                sha256: Some(Sha256::new()),
                sha384: None,
                len: 0,
            },
            HashAlgorithm::Sha384 => Self {
                algorithm,
                sha256: None,
                sha384: Some(Sha384::new()),
                len: 0,
            },
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.len += chunk.len() as u64;
        match self.algorithm {
            HashAlgorithm::Sha256 => self.sha256.as_mut().unwrap().update(chunk),
            HashAlgorithm::Sha384 => self.sha384.as_mut().unwrap().update(chunk),
        }
    }

    pub fn bytes_seen(&self) -> u64 {
        self.len
    }

    pub fn finalize_hex(self) -> String {
        match self.algorithm {
            HashAlgorithm::Sha256 => hex::encode(self.sha256.unwrap().finalize()),
            HashAlgorithm::Sha384 => hex::encode(self.sha384.unwrap().finalize()),
        }
    }
}
