//! Content hashing for documents and resolved artifacts.
//!
//! A [`ContentHash`] is the SHA-256 digest of a document's bytes. It is the
//! key of every cache in the resolver and the token compared when the same
//! document is reached through different import paths.
//!
//! The textual form is `sha256:` followed by 64 lowercase hex digits, which
//! is also the syntax of content-addressed import references.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Error returned when a string is not a valid content hash.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseHashError {
    #[error("content hash must start with `{}`", ContentHash::PREFIX)]
    MissingPrefix,

    #[error("content hash must have 64 hex digits, found {0}")]
    InvalidLength(usize),

    #[error("content hash must use lowercase hex digits")]
    InvalidHex,
}

/// A SHA-256 digest identifying content.
///
/// # Examples
///
/// ```
/// use blue_core::ContentHash;
///
/// let hash = ContentHash::of(b"types: {}");
/// let parsed: ContentHash = hash.to_string().parse().unwrap();
/// assert_eq!(hash, parsed);
/// assert!(hash.to_string().starts_with("sha256:"));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Prefix of the textual representation.
    pub const PREFIX: &'static str = "sha256:";

    /// Hash a byte slice.
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = ContentHasher::new();
        hasher.update(bytes);
        hasher.finish()
    }

    /// Create a hash from raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding of the digest, without prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First twelve hex digits, for log output.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(12);
        hex
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self)
    }
}

impl FromStr for ContentHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix(Self::PREFIX)
            .ok_or(ParseHashError::MissingPrefix)?;
        if digits.len() != 64 {
            return Err(ParseHashError::InvalidLength(digits.len()));
        }
        // The textual form is canonical, so uppercase digits are rejected.
        if !digits.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(ParseHashError::InvalidHex);
        }

        let mut bytes = [0u8; 32];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| ParseHashError::InvalidHex)?;
        Ok(Self(bytes))
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Incremental hasher for keys built from several parts.
///
/// Each part is length-prefixed so that `["ab", "c"]` and `["a", "bc"]`
/// produce different hashes.
#[derive(Debug, Clone, Default)]
pub struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    /// Create an empty hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes.
    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    /// Feed one length-prefixed part.
    pub fn update_part(&mut self, bytes: &[u8]) {
        self.inner.update((bytes.len() as u64).to_le_bytes());
        self.inner.update(bytes);
    }

    /// Finish and return the digest.
    pub fn finish(self) -> ContentHash {
        ContentHash(self.inner.finalize().into())
    }
}
