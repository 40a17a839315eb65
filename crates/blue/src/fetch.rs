//! Reading imported documents.
//!
//! A [`Fetcher`] downloads the bytes behind a URL. [`HttpFetcher`] is the
//! default, built on a `ureq` agent; tests substitute an in-memory fetcher.
//! [`fetch_with_retry`] wraps any fetcher in the retry policy from
//! [`FetchConfig`], and [`read_file`] reads local documents.

use std::{
    fmt, fs,
    io::{self, Read},
    path::Path,
};

use log::{debug, trace, warn};
use thiserror::Error;
use url::Url;

use crate::{cancel::CancellationToken, config::FetchConfig};

/// Documents larger than this are refused.
pub const MAX_DOCUMENT_BYTES: usize = 16 * 1024 * 1024;

const READ_CHUNK: usize = 16 * 1024;

/// What went wrong while fetching.
#[derive(Debug, Error)]
pub enum FetchCause {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("not found")]
    NotFound,

    #[error("document exceeds {MAX_DOCUMENT_BYTES} bytes")]
    TooLarge,

    #[error("cancelled")]
    Cancelled,
}

/// A failed fetch of `url`.
#[derive(Debug, Error)]
#[error("failed to fetch `{url}`: {cause}{}", attempts_suffix(.attempts))]
pub struct FetchError {
    url: String,
    #[source]
    cause: FetchCause,
    attempts: u32,
}

fn attempts_suffix(attempts: &u32) -> String {
    if *attempts > 1 {
        format!(" (after {attempts} attempts)")
    } else {
        String::new()
    }
}

impl FetchError {
    pub fn new(url: impl fmt::Display, cause: impl Into<FetchCause>) -> Self {
        Self {
            url: url.to_string(),
            cause: cause.into(),
            attempts: 1,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn cause(&self) -> &FetchCause {
        &self.cause
    }

    /// How many attempts were made before giving up.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, FetchCause::Cancelled)
    }

    /// Whether another attempt could succeed: transport failures, timeouts,
    /// rate limiting and server errors.
    pub fn is_retryable(&self) -> bool {
        match &self.cause {
            FetchCause::Transport(_) => true,
            FetchCause::Status(status) => *status == 408 || *status == 429 || *status >= 500,
            FetchCause::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::ConnectionReset
            ),
            FetchCause::NotFound | FetchCause::TooLarge | FetchCause::Cancelled => false,
        }
    }

    fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

/// Downloads documents by URL.
pub trait Fetcher: Send + Sync {
    /// Fetch the body behind `url`, checking `cancel` while reading.
    fn fetch(&self, url: &Url, cancel: &CancellationToken) -> Result<Vec<u8>, FetchError>;
}

/// HTTP(S) fetcher backed by a `ureq` agent.
///
/// `file://` URLs are read from the local filesystem.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFetcher").finish_non_exhaustive()
    }
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.timeout())
            .timeout_connect(config.connect_timeout())
            .user_agent(concat!("blue/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &Url, cancel: &CancellationToken) -> Result<Vec<u8>, FetchError> {
        if url.scheme() == "file" {
            let path = url
                .to_file_path()
                .map_err(|()| FetchError::new(url, FetchCause::NotFound))?;
            return read_file(&path);
        }

        debug!(url:% = url; "Downloading document");
        let response = match self.agent.request_url("GET", url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(404 | 410, _)) => {
                return Err(FetchError::new(url, FetchCause::NotFound));
            }
            Err(ureq::Error::Status(status, _)) => {
                return Err(FetchError::new(url, FetchCause::Status(status)));
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(FetchError::new(
                    url,
                    FetchCause::Transport(transport.to_string()),
                ));
            }
        };

        read_body(response.into_reader(), cancel).map_err(|cause| FetchError::new(url, cause))
    }
}

/// Read a response body in chunks, stopping early on cancellation.
fn read_body(mut reader: impl Read, cancel: &CancellationToken) -> Result<Vec<u8>, FetchCause> {
    let mut body = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        if cancel.is_cancelled() {
            return Err(FetchCause::Cancelled);
        }
        let read = match reader.read(&mut chunk) {
            Ok(0) => return Ok(body),
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if body.len() + read > MAX_DOCUMENT_BYTES {
            return Err(FetchCause::TooLarge);
        }
        body.extend_from_slice(&chunk[..read]);
    }
}

/// Read a local document.
pub fn read_file(path: &Path) -> Result<Vec<u8>, FetchError> {
    trace!(path:? = path; "Reading document");
    let cause = match fs::metadata(path) {
        Ok(meta) if meta.len() > MAX_DOCUMENT_BYTES as u64 => FetchCause::TooLarge,
        Ok(_) => match fs::read(path) {
            Ok(bytes) => return Ok(bytes),
            Err(err) => err.into(),
        },
        Err(err) if err.kind() == io::ErrorKind::NotFound => FetchCause::NotFound,
        Err(err) => err.into(),
    };
    Err(FetchError::new(path.display(), cause))
}

/// Fetch `url`, retrying retryable failures with exponential backoff.
///
/// The token is checked before each attempt and wakes the backoff sleep, so a
/// cancelled fetch returns promptly with [`FetchCause::Cancelled`].
pub fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    url: &Url,
    config: &FetchConfig,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, FetchError> {
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(FetchError::new(url, FetchCause::Cancelled).with_attempts(attempt));
        }

        let err = match fetcher.fetch(url, cancel) {
            Ok(bytes) => {
                debug!(url:% = url, bytes = bytes.len(), attempts = attempt + 1; "Fetched document");
                return Ok(bytes);
            }
            Err(err) => err,
        };

        if !err.is_retryable() || attempt >= config.retries() {
            return Err(err.with_attempts(attempt + 1));
        }

        let delay = config.backoff_delay(attempt);
        warn!(
            url:% = url,
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error:% = err;
            "Fetch failed, retrying",
        );
        if !cancel.sleep(delay) {
            return Err(FetchError::new(url, FetchCause::Cancelled).with_attempts(attempt + 1));
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Cursor,
        sync::atomic::{AtomicU32, Ordering},
        time::{Duration, Instant},
    };

    use super::*;

    /// Fails with the given cause for the first `failures` calls.
    struct Flaky {
        failures: u32,
        status: u16,
        calls: AtomicU32,
    }

    impl Fetcher for Flaky {
        fn fetch(&self, url: &Url, _cancel: &CancellationToken) -> Result<Vec<u8>, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(FetchError::new(url, FetchCause::Status(self.status)))
            } else {
                Ok(b"types: {}".to_vec())
            }
        }
    }

    fn fast_config(retries: u32) -> FetchConfig {
        FetchConfig::default()
            .with_retries(retries)
            .with_backoff(Duration::from_millis(1), 2.0)
    }

    fn url() -> Url {
        Url::parse("https://example.test/types.yaml").unwrap()
    }

    #[test]
    fn test_retries_until_success() {
        let fetcher = Flaky {
            failures: 2,
            status: 503,
            calls: AtomicU32::new(0),
        };
        let cancel = CancellationToken::new();
        let body = fetch_with_retry(&fetcher, &url(), &fast_config(3), &cancel).unwrap();
        assert_eq!(body, b"types: {}");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_gives_up_after_retries() {
        let fetcher = Flaky {
            failures: u32::MAX,
            status: 500,
            calls: AtomicU32::new(0),
        };
        let cancel = CancellationToken::new();
        let err = fetch_with_retry(&fetcher, &url(), &fast_config(2), &cancel).unwrap_err();
        assert_eq!(err.attempts(), 3);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        assert!(err.to_string().contains("after 3 attempts"));
        assert_eq!(err.url(), "https://example.test/types.yaml");
    }

    #[test]
    fn test_client_errors_are_not_retried() {
        let fetcher = Flaky {
            failures: u32::MAX,
            status: 403,
            calls: AtomicU32::new(0),
        };
        let cancel = CancellationToken::new();
        let err = fetch_with_retry(&fetcher, &url(), &fast_config(5), &cancel).unwrap_err();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err.cause(), FetchCause::Status(403)));
    }

    #[test]
    fn test_cancel_interrupts_backoff() {
        let fetcher = Flaky {
            failures: u32::MAX,
            status: 503,
            calls: AtomicU32::new(0),
        };
        let config = FetchConfig::default()
            .with_retries(10)
            .with_backoff(Duration::from_secs(60), 1.0);
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();

        let start = Instant::now();
        let err = std::thread::scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(Duration::from_millis(20));
                canceller.cancel();
            });
            fetch_with_retry(&fetcher, &url(), &config, &cancel).unwrap_err()
        });
        assert!(err.is_cancelled());
        assert!(start.elapsed() < Duration::from_secs(30));
    }

    #[test]
    fn test_read_body_stops_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = read_body(Cursor::new(vec![b'a'; 10]), &cancel);
        assert!(matches!(result, Err(FetchCause::Cancelled)));

        let fresh = CancellationToken::new();
        let body = read_body(Cursor::new(vec![b'a'; READ_CHUNK * 2 + 3]), &fresh).unwrap();
        assert_eq!(body.len(), READ_CHUNK * 2 + 3);
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_file(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(err.cause(), FetchCause::NotFound));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.yaml");
        fs::write(&path, "types: {}\n").unwrap();
        let fetcher = HttpFetcher::new(&FetchConfig::default());
        let url = Url::from_file_path(&path).unwrap();
        let body = fetcher.fetch(&url, &CancellationToken::new()).unwrap();
        assert_eq!(body, b"types: {}\n");
    }
}
