//! Import reference strings.
//!
//! The value of an import is one of three forms:
//!
//! - `sha256:<64 lowercase hex>` addresses a document by its content
//! - `http://`, `https://`, and `file://` URLs
//! - anything else is a path, relative to the importing document

use std::{fmt, str::FromStr};

use blue_core::{ContentHash, hash::ParseHashError};
use thiserror::Error;
use url::Url;

const URL_SCHEMES: [&str; 3] = ["http", "https", "file"];

/// Error returned for a malformed import reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportRefError {
    #[error("import reference is empty")]
    Empty,

    #[error("invalid content hash: {0}")]
    InvalidHash(#[from] ParseHashError),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported URL scheme `{0}`")]
    UnsupportedScheme(String),
}

/// Where an import points.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportRef {
    Content(ContentHash),
    Url(Url),
    Path(String),
}

impl ImportRef {
    /// Parse an import reference.
    ///
    /// # Examples
    ///
    /// ```
    /// use blue_parser::ImportRef;
    ///
    /// assert!(matches!(ImportRef::parse("./geo.yaml"), Ok(ImportRef::Path(_))));
    /// assert!(matches!(ImportRef::parse("https://example.com/t.yaml"), Ok(ImportRef::Url(_))));
    /// assert!(ImportRef::parse("ftp://example.com/t.yaml").is_err());
    /// ```
    pub fn parse(text: &str) -> Result<Self, ImportRefError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ImportRefError::Empty);
        }

        if text.starts_with(ContentHash::PREFIX) {
            return Ok(ImportRef::Content(text.parse()?));
        }

        if let Some((scheme, _)) = text.split_once("://") {
            let scheme = scheme.to_ascii_lowercase();
            if !URL_SCHEMES.contains(&scheme.as_str()) {
                return Err(ImportRefError::UnsupportedScheme(scheme));
            }
            return Ok(ImportRef::Url(Url::parse(text)?));
        }

        Ok(ImportRef::Path(text.to_string()))
    }

    /// Whether the reference is interpreted relative to the importer.
    pub fn is_relative(&self) -> bool {
        matches!(self, ImportRef::Path(path) if !path.starts_with('/'))
    }
}

impl FromStr for ImportRef {
    type Err = ImportRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ImportRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportRef::Content(hash) => write!(f, "{hash}"),
            ImportRef::Url(url) => write!(f, "{url}"),
            ImportRef::Path(path) => f.write_str(path),
        }
    }
}
