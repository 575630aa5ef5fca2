// src/hash.rs

//! Source checksum parsing and verification
//!
//! Formulas declare the archive checksum either prefixed
//! (`sha256:<hex>`, `sha512:<hex>`) or as a bare 64-character SHA-256 hex
//! string. Any value that does not parse that way is treated as a
//! placeholder: the formula author has not pinned the archive yet.

use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

/// Hash algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Get the hash output length as a hex string
    #[inline]
    pub const fn hex_len(&self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }

    /// Get the algorithm name as a string
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha512" | "sha-512" => Ok(Self::Sha512),
            _ => Err(format!("unknown hash algorithm: {}", s)),
        }
    }
}

/// A declared source checksum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checksum {
    /// A well-formed digest that downloads are verified against
    Pinned {
        algorithm: HashAlgorithm,
        value: String,
    },
    /// Anything else, kept verbatim for diagnostics
    Placeholder(String),
}

impl Checksum {
    /// Parse a declared checksum, never failing
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let (algorithm, value) = match raw.split_once(':') {
            Some((algo, value)) => match algo.parse::<HashAlgorithm>() {
                Ok(algorithm) => (algorithm, value),
                Err(_) => return Self::Placeholder(raw.to_string()),
            },
            None => (HashAlgorithm::Sha256, raw),
        };

        if value.len() == algorithm.hex_len() && value.chars().all(|c| c.is_ascii_hexdigit()) {
            Self::Pinned {
                algorithm,
                value: value.to_lowercase(),
            }
        } else {
            Self::Placeholder(raw.to_string())
        }
    }

    /// Whether downloads can be verified against this checksum
    pub fn is_pinned(&self) -> bool {
        matches!(self, Self::Pinned { .. })
    }

    /// Stable file name for caching content with this checksum
    ///
    /// Placeholders have no key: their content cannot be verified on reuse.
    pub fn cache_key(&self) -> Option<String> {
        match self {
            Self::Pinned { algorithm, value } => Some(format!("{}_{}", algorithm.name(), value)),
            Self::Placeholder(_) => None,
        }
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pinned { algorithm, value } => write!(f, "{}:{}", algorithm, value),
            Self::Placeholder(raw) => write!(f, "{}", raw),
        }
    }
}

/// Compute hash of data from a reader
pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, reader: &mut R) -> io::Result<String> {
    let mut buffer = [0u8; 8192];

    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            loop {
                let n = reader.read(&mut buffer)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buffer[..n]);
            }
            Ok(hex::encode(hasher.finalize()))
        }
        HashAlgorithm::Sha512 => {
            let mut hasher = Sha512::new();
            loop {
                let n = reader.read(&mut buffer)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buffer[..n]);
            }
            Ok(hex::encode(hasher.finalize()))
        }
    }
}

/// Compute SHA-256 hash of a byte slice
pub fn sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hash a file, streaming its content
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    hash_reader(algorithm, &mut file)
}

/// Verify a file against a pinned checksum
///
/// Returns the actual digest on mismatch. Placeholder checksums always
/// verify; callers decide beforehand whether they are acceptable.
pub fn verify_file(path: &Path, expected: &Checksum) -> io::Result<Result<(), String>> {
    match expected {
        Checksum::Pinned { algorithm, value } => {
            let actual = hash_file(path, *algorithm)?;
            if &actual == value {
                Ok(Ok(()))
            } else {
                Ok(Err(actual))
            }
        }
        Checksum::Placeholder(_) => Ok(Ok(())),
    }
}
