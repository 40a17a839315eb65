//! On-disk store for fetched documents.
//!
//! Layout under the configured cache directory:
//!
//! ```text
//! objects/<hex>          document bytes, named by their content hash
//! remote/<sha256(url)>   last body downloaded from a URL
//! ```
//!
//! Objects never expire since their name is their content. Remote bodies are
//! reused while younger than the configured TTL. Every write goes to a
//! temporary file in the target directory and is renamed into place, so
//! readers never observe a partial file.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use log::{debug, trace, warn};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use url::Url;

use blue_core::ContentHash;

/// A directory of stored documents.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
    ttl: Duration,
}

impl DiskStore {
    /// Open the store at `root`, creating its directories.
    pub fn open(root: impl Into<PathBuf>, ttl: Duration) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("objects"))?;
        fs::create_dir_all(root.join("remote"))?;
        debug!(root:? = root, ttl_secs = ttl.as_secs(); "Opened disk store");
        Ok(Self { root, ttl })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load a stored document by content hash.
    ///
    /// A stored file whose bytes no longer match its name is ignored.
    pub fn load_object(&self, hash: &ContentHash) -> Option<Vec<u8>> {
        let path = self.object_path(hash);
        let bytes = read_existing(&path)?;
        if ContentHash::of(&bytes) != *hash {
            warn!(path:? = path; "Stored object does not match its hash, ignoring");
            return None;
        }
        trace!(hash = hash.short(); "Loaded stored object");
        Some(bytes)
    }

    /// Store a document under its content hash.
    pub fn store_object(&self, bytes: &[u8]) -> io::Result<ContentHash> {
        let hash = ContentHash::of(bytes);
        let path = self.object_path(&hash);
        if !path.exists() {
            write_atomic(&path, bytes)?;
            trace!(hash = hash.short(); "Stored object");
        }
        Ok(hash)
    }

    /// Load the stored body of `url` if it is still fresh.
    pub fn load_remote(&self, url: &Url) -> Option<Vec<u8>> {
        let path = self.remote_path(url);
        let modified = fs::metadata(&path).and_then(|meta| meta.modified()).ok()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age >= self.ttl {
            trace!(url:% = url, age_secs = age.as_secs(); "Stored body expired");
            return None;
        }
        let bytes = read_existing(&path)?;
        trace!(url:% = url; "Loaded stored body");
        Some(bytes)
    }

    /// Store the body downloaded from `url`, replacing any older copy.
    pub fn store_remote(&self, url: &Url, bytes: &[u8]) -> io::Result<()> {
        write_atomic(&self.remote_path(url), bytes)?;
        trace!(url:% = url; "Stored body");
        Ok(())
    }

    fn object_path(&self, hash: &ContentHash) -> PathBuf {
        self.root.join("objects").join(hash.to_hex())
    }

    fn remote_path(&self, url: &Url) -> PathBuf {
        let key = hex::encode(Sha256::digest(url.as_str().as_bytes()));
        self.root.join("remote").join(key)
    }
}

fn read_existing(path: &Path) -> Option<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(err) if err.kind() == io::ErrorKind::NotFound => None,
        Err(err) => {
            warn!(path:? = path, error:% = err; "Failed to read stored file");
            None
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "store path has no parent"))?;
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| err.error)?;
    Ok(())
}
