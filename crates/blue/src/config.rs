//! Configuration types for the Blue engine.
//!
//! All types implement [`serde::Deserialize`] so they can be loaded from a
//! TOML file; every key is optional and falls back to its default.
//!
//! # Overview
//!
//! - [`AppConfig`] - Top-level configuration combining the sections below.
//! - [`CacheConfig`] - In-memory bounds and the optional on-disk store.
//! - [`FetchConfig`] - Timeouts and the retry policy for imports.
//! - [`ResolveConfig`] - Resolution and linking options.
//!
//! # Example
//!
//! ```
//! # use blue::config::AppConfig;
//! let config = AppConfig::default();
//! assert_eq!(config.fetch().retries(), 3);
//! assert!(config.cache().directory().is_none());
//! ```

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;

use blue_core::UnifyOptions;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Cache configuration section.
    #[serde(default)]
    cache: CacheConfig,

    /// Fetch configuration section.
    #[serde(default)]
    fetch: FetchConfig,

    /// Resolution configuration section.
    #[serde(default)]
    resolve: ResolveConfig,
}

impl AppConfig {
    /// Creates a new [`AppConfig`] from its sections.
    pub fn new(cache: CacheConfig, fetch: FetchConfig, resolve: ResolveConfig) -> Self {
        Self {
            cache,
            fetch,
            resolve,
        }
    }

    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    pub fn fetch(&self) -> &FetchConfig {
        &self.fetch
    }

    pub fn resolve(&self) -> &ResolveConfig {
        &self.resolve
    }

    /// Returns a mutable reference to the resolution section, for command
    /// line overrides.
    pub fn resolve_mut(&mut self) -> &mut ResolveConfig {
        &mut self.resolve
    }
}

/// Cache configuration.
///
/// The in-memory caches are unbounded unless `max_entries` is set. With a
/// `directory`, fetched sources are also kept on disk across runs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Root of the on-disk store.
    directory: Option<PathBuf>,

    /// How long a stored remote body stays fresh, in seconds.
    ttl_secs: u64,

    /// Upper bound on entries per in-memory cache.
    max_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: None,
            ttl_secs: 24 * 60 * 60,
            max_entries: None,
        }
    }
}

impl CacheConfig {
    pub fn directory(&self) -> Option<&PathBuf> {
        self.directory.as_ref()
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn max_entries(&self) -> Option<usize> {
        self.max_entries
    }

    /// Sets the on-disk store directory.
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Sets the in-memory bound.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }
}

/// Fetch configuration: timeouts and the retry policy.
///
/// A failed attempt is retried up to `retries` times. The delay before
/// retry `n` (0-based) is `backoff_base_ms * backoff_multiplier^n`, capped at
/// `max_backoff_ms`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    timeout_ms: u64,
    connect_timeout_ms: u64,
    retries: u32,
    backoff_base_ms: u64,
    backoff_multiplier: f64,
    max_backoff_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            retries: 3,
            backoff_base_ms: 200,
            backoff_multiplier: 2.0,
            max_backoff_ms: 10_000,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Sets the number of retries after the first attempt.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the backoff base delay and multiplier.
    pub fn with_backoff(mut self, base: Duration, multiplier: f64) -> Self {
        self.backoff_base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        self.backoff_multiplier = multiplier;
        self
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// # Examples
    ///
    /// ```
    /// # use blue::config::FetchConfig;
    /// # use std::time::Duration;
    /// let fetch = FetchConfig::default();
    /// assert_eq!(fetch.backoff_delay(0), Duration::from_millis(200));
    /// assert_eq!(fetch.backoff_delay(2), Duration::from_millis(800));
    /// assert_eq!(fetch.backoff_delay(30), Duration::from_millis(10_000));
    /// ```
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.max(1.0);
        let delay = self.backoff_base_ms as f64 * multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let capped = if delay.is_finite() {
            delay.min(self.max_backoff_ms as f64)
        } else {
            self.max_backoff_ms as f64
        };
        Duration::from_millis(capped as u64)
    }
}

/// Resolution and linking options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolveConfig {
    /// Treat every object as closed while unifying `extends` bases.
    closed_objects: bool,

    /// Keep recursive occurrences as references instead of failing.
    allow_recursive_types: bool,

    /// Maximum length of an import chain below the root document.
    max_depth: usize,

    /// Fetch sibling imports on the rayon pool.
    parallel_fetch: bool,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            closed_objects: false,
            allow_recursive_types: false,
            max_depth: 32,
            parallel_fetch: true,
        }
    }
}

impl ResolveConfig {
    pub fn closed_objects(&self) -> bool {
        self.closed_objects
    }

    pub fn allow_recursive_types(&self) -> bool {
        self.allow_recursive_types
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn parallel_fetch(&self) -> bool {
        self.parallel_fetch
    }

    pub fn set_closed_objects(&mut self, closed: bool) {
        self.closed_objects = closed;
    }

    pub fn set_allow_recursive_types(&mut self, allow: bool) {
        self.allow_recursive_types = allow;
    }

    pub fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth;
    }

    pub fn set_parallel_fetch(&mut self, parallel: bool) {
        self.parallel_fetch = parallel;
    }

    /// The unifier options implied by this configuration.
    pub fn unify_options(&self) -> UnifyOptions {
        UnifyOptions {
            closed_objects: self.closed_objects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.cache().ttl(), Duration::from_secs(86_400));
        assert_eq!(config.cache().max_entries(), None);
        assert_eq!(config.fetch().timeout(), Duration::from_secs(30));
        assert_eq!(config.fetch().connect_timeout(), Duration::from_secs(10));
        assert!(!config.resolve().closed_objects());
        assert!(!config.resolve().allow_recursive_types());
        assert_eq!(config.resolve().max_depth(), 32);
        assert!(config.resolve().parallel_fetch());
    }

    #[test]
    fn test_backoff_growth_and_cap() {
        let fetch = FetchConfig::default().with_backoff(Duration::from_millis(100), 3.0);
        assert_eq!(fetch.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(fetch.backoff_delay(1), Duration::from_millis(300));
        assert_eq!(fetch.backoff_delay(2), Duration::from_millis(900));
        assert_eq!(fetch.backoff_delay(10), Duration::from_millis(10_000));
        assert_eq!(fetch.backoff_delay(u32::MAX), Duration::from_millis(10_000));
    }

    #[test]
    fn test_multiplier_below_one_is_constant() {
        let fetch = FetchConfig::default().with_backoff(Duration::from_millis(50), 0.5);
        assert_eq!(fetch.backoff_delay(0), Duration::from_millis(50));
        assert_eq!(fetch.backoff_delay(4), Duration::from_millis(50));
    }

    #[test]
    fn test_unify_options() {
        let mut resolve = ResolveConfig::default();
        assert!(!resolve.unify_options().closed_objects);
        resolve.set_closed_objects(true);
        assert!(resolve.unify_options().closed_objects);
    }
}
