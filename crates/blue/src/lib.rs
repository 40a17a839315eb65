//! Blue - structural type resolution for the Blue data-description language.
//!
//! Documents are parsed by [`blue_parser`], their imports are resolved from
//! local files, URLs, or content hashes, and their type declarations are
//! linked and unified into a [`ResolvedGraph`]. Parsed documents are cached
//! by content hash and location, and linked results by the closure of
//! documents they were built from, for the lifetime of an [`Engine`].
//!
//! # Examples
//!
//! ```
//! use blue::{CancellationToken, Engine};
//! use blue_parser::Origin;
//!
//! let engine = Engine::default();
//! let doc = engine
//!     .parse(
//!         "types:\n  Base:\n    fields: {id: Text}\n  User:\n    extends: Base\n    fields: {name: Text}\n",
//!         Origin::Memory("users".into()),
//!     )
//!     .unwrap();
//!
//! let resolution = engine.resolve(doc, &CancellationToken::new()).unwrap();
//! assert!(resolution.is_success());
//!
//! let graph = resolution.into_result().unwrap();
//! let user = graph.lookup("User").unwrap();
//! assert_eq!(user.node.as_object().unwrap().fields.len(), 2);
//! ```

pub mod cache;
pub mod cancel;
pub mod config;
pub mod fetch;
pub mod graph;
pub mod location;
pub mod reporter;
pub mod serialize;
pub mod store;

mod error;
mod link;
mod resolver;

pub use blue_core::{Bound, Constraints, ContentHash, Definitions, TypeNode, UnificationError};

pub use cancel::CancellationToken;
pub use error::{BlueError, ResolutionError};
pub use graph::{DocumentId, ImportEdge, ResolvedGraph, TypeDefinition};
pub use serialize::{Format, serialize, serialize_graph};

use std::{convert::Infallible, fmt, sync::Arc};

use log::{debug, info, trace};

use blue_parser::{Diagnostic, Document, ImportRef, Origin};

use cache::{CacheStats, ContentCache};
use config::AppConfig;
use fetch::{Fetcher, HttpFetcher};
use link::Linked;
use location::Locator;
use reporter::Reporter;
use resolver::{Cancelled, LoadError, Loader, Resolver};
use store::DiskStore;

/// Entry point for parsing and resolving Blue documents.
///
/// An engine owns the document cache, the linked-result cache, the optional
/// disk store, and a [`Reporter`] that accumulates every diagnostic raised
/// through it. It is `Send + Sync`; independent documents may be resolved
/// from several threads at once and share the caches.
pub struct Engine {
    config: AppConfig,
    fetcher: Arc<dyn Fetcher>,
    store: Option<DiskStore>,
    documents: ContentCache<Arc<Document>>,
    objects: ContentCache<Arc<[u8]>>,
    linked: ContentCache<Linked>,
    reporter: Reporter,
}

impl Default for Engine {
    fn default() -> Self {
        Self::with_store(AppConfig::default(), None)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("documents", &self.documents)
            .field("linked", &self.linked)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BlueError::Io`] if the configured cache directory cannot be
    /// created.
    pub fn new(config: AppConfig) -> Result<Self, BlueError> {
        let store = match config.cache().directory() {
            Some(directory) => Some(DiskStore::open(directory, config.cache().ttl())?),
            None => None,
        };
        Ok(Self::with_store(config, store))
    }

    fn with_store(config: AppConfig, store: Option<DiskStore>) -> Self {
        let max_entries = config.cache().max_entries();
        Self {
            fetcher: Arc::new(HttpFetcher::new(config.fetch())),
            store,
            documents: ContentCache::with_max_entries(max_entries),
            objects: ContentCache::with_max_entries(max_entries),
            linked: ContentCache::with_max_entries(max_entries),
            reporter: Reporter::new(),
            config,
        }
    }

    /// Replace the fetcher used for URL imports.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Every diagnostic raised through this engine, until drained.
    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    // ============================================================================
    // Loading
    // ============================================================================

    /// Parse document text, reusing the cached document for the same text
    /// at the same origin.
    ///
    /// # Errors
    ///
    /// Returns [`BlueError::Parse`] with every syntax and elaboration error.
    pub fn parse(&self, text: &str, origin: Origin) -> Result<Arc<Document>, BlueError> {
        let hash = ContentHash::of(text.as_bytes());
        let key = origin.document_key(hash);
        let entry = self
            .documents
            .get_or_compute(key, || Document::parse(text, origin).map(Arc::new))
            .map_err(|err| self.report_parse_error(err))?;
        let stored = self
            .objects
            .get_or_compute(hash, || Ok::<_, Infallible>(Arc::from(text.as_bytes())));
        if let Err(never) = stored {
            match never {}
        }
        let document = Arc::clone(entry.value());
        self.reporter.extend(document.warnings().iter().cloned());
        Ok(document)
    }

    /// Load a document from a path, URL, or `sha256:` content reference.
    ///
    /// Relative paths are taken from the working directory.
    pub fn load(&self, input: &str, cancel: &CancellationToken) -> Result<Arc<Document>, BlueError> {
        info!(input = input; "Loading document");
        let invalid = |message: String| BlueError::InvalidInput {
            input: input.to_string(),
            message,
        };
        let reference = ImportRef::parse(input).map_err(|err| invalid(err.to_string()))?;
        let locator = Locator::resolve(&reference, &Origin::Memory(input.to_string()))
            .map_err(invalid)?;

        match self.loader(cancel).load(&locator, None) {
            Ok(document) => {
                self.reporter.extend(document.warnings().iter().cloned());
                Ok(document)
            }
            Err(LoadError::Fetch(err)) => Err(err.into()),
            Err(LoadError::Parse(err)) => Err(self.report_parse_error(err)),
            Err(LoadError::Cancelled) => Err(ResolutionError::Cancelled.into()),
            Err(LoadError::PinMismatch { expected, actual }) => Err(invalid(format!(
                "expected content {expected}, found {actual}"
            ))),
        }
    }

    fn report_parse_error(&self, err: blue_parser::ParseError) -> BlueError {
        self.reporter.extend(err.diagnostics().iter().cloned());
        BlueError::Parse(err)
    }

    fn loader<'a>(&'a self, cancel: &'a CancellationToken) -> Loader<'a> {
        Loader {
            fetcher: self.fetcher.as_ref(),
            fetch_config: self.config.fetch(),
            store: self.store.as_ref(),
            documents: &self.documents,
            objects: &self.objects,
            cancel,
        }
    }

    // ============================================================================
    // Resolution
    // ============================================================================

    /// Resolve the imports of `root` and link its types.
    ///
    /// Problems with individual imports or types do not stop resolution: the
    /// returned [`Resolution`] holds the best-effort graph and every
    /// diagnostic. Callers must treat any error diagnostic as failure, or use
    /// [`Resolution::into_result`].
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::Cancelled`] if `cancel` fires. Nothing
    /// from a cancelled resolution is committed to the caches.
    pub fn resolve(
        &self,
        root: Arc<Document>,
        cancel: &CancellationToken,
    ) -> Result<Resolution, ResolutionError> {
        let reporter = Reporter::new();
        let resolve_config = self.config.resolve();

        let resolved = Resolver::new(self.loader(cancel), resolve_config, &reporter)
            .resolve(root)
            .map_err(|Cancelled| ResolutionError::Cancelled)?;
        if cancel.is_cancelled() {
            return Err(ResolutionError::Cancelled);
        }

        let run_link = || {
            link::link(
                &resolved.documents,
                &resolved.prefixes,
                &resolved.imports,
                resolve_config,
            )
        };
        // Partial closures are not memoized; their result depends on which
        // imports failed.
        let linked = if reporter.has_errors() {
            run_link()
        } else {
            let key = link::link_key(&resolved.documents, resolve_config);
            let entry = self
                .linked
                .get_or_compute(key, || {
                    let linked = run_link();
                    if cancel.is_cancelled() {
                        Err(Cancelled)
                    } else {
                        Ok(linked)
                    }
                })
                .map_err(|Cancelled| ResolutionError::Cancelled)?;
            trace!(key = key.short(); "Linked types");
            entry.value().clone()
        };

        reporter.extend(linked.diagnostics);
        let diagnostics = reporter.drain();
        self.reporter.extend(diagnostics.iter().cloned());

        let graph = ResolvedGraph::new(
            resolved.documents,
            resolved.prefixes,
            resolved.imports,
            linked.types,
        );
        debug!(
            documents = graph.document_count(),
            types = graph.types().len(),
            diagnostics = diagnostics.len();
            "Resolution finished",
        );
        Ok(Resolution { graph, diagnostics })
    }

    /// Unify two types with the engine's options.
    pub fn unify(&self, a: &TypeNode, b: &TypeNode) -> Result<TypeNode, UnificationError> {
        blue_core::unify_with(a, b, self.config.resolve().unify_options())
    }

    // ============================================================================
    // Caches
    // ============================================================================

    pub fn document_cache_stats(&self) -> CacheStats {
        self.documents.stats()
    }

    pub fn link_cache_stats(&self) -> CacheStats {
        self.linked.stats()
    }

    /// Drop every cached document, source, and linked result.
    pub fn clear_caches(&self) {
        self.documents.clear();
        self.objects.clear();
        self.linked.clear();
    }
}

/// The outcome of [`Engine::resolve`]: the best-effort graph and every
/// diagnostic raised while building it.
#[derive(Debug, Clone)]
pub struct Resolution {
    graph: ResolvedGraph,
    diagnostics: Vec<Diagnostic>,
}

impl Resolution {
    pub fn graph(&self) -> &ResolvedGraph {
        &self.graph
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Whether no error diagnostic was raised.
    pub fn is_success(&self) -> bool {
        !self.diagnostics.iter().any(|d| d.severity().is_error())
    }

    /// The graph if resolution succeeded, else every diagnostic.
    pub fn into_result(self) -> Result<ResolvedGraph, ResolutionError> {
        if self.is_success() {
            Ok(self.graph)
        } else {
            Err(ResolutionError::Failed {
                diagnostics: self.diagnostics,
            })
        }
    }

    pub fn into_parts(self) -> (ResolvedGraph, Vec<Diagnostic>) {
        (self.graph, self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use blue_parser::ErrorCode;

    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_engine_is_send_and_sync() {
        assert_send_sync::<Engine>();
        assert_send_sync::<Resolution>();
    }

    #[test]
    fn test_parse_is_cached() {
        let engine = Engine::default();
        let first = engine.parse("types: {A: Text}", Origin::Memory("a".into())).unwrap();
        let again = engine.parse("types: {A: Text}", Origin::Memory("a".into())).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(engine.document_cache_stats().computations, 1);
    }

    #[test]
    fn test_same_text_at_two_origins_is_two_documents() {
        let engine = Engine::default();
        let first = engine.parse("types: {A: Text}", Origin::Memory("a".into())).unwrap();
        let second = engine.parse("types: {A: Text}", Origin::Memory("b".into())).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.hash(), second.hash());
        assert_eq!(second.origin(), &Origin::Memory("b".into()));
        assert_eq!(engine.document_cache_stats().computations, 2);
    }

    #[test]
    fn test_parsed_text_serves_content_references() {
        let engine = Engine::default();
        let shared = engine.parse("types: {Id: Text}", Origin::Memory("shared".into())).unwrap();
        let root = engine
            .parse(
                &format!("imports: {{s: \"{}\"}}\ntypes: {{Key: s.Id}}\n", shared.hash()),
                Origin::Memory("main".into()),
            )
            .unwrap();
        let resolution = engine.resolve(root, &CancellationToken::new()).unwrap();
        assert!(resolution.is_success(), "{:?}", resolution.diagnostics());
        assert!(resolution.graph().lookup("s.Id").is_some());
    }

    #[test]
    fn test_parse_errors_are_reported() {
        let engine = Engine::default();
        let err = engine.parse("types: [", Origin::Memory("bad".into())).unwrap_err();
        assert!(!err.diagnostics().is_empty());
        assert!(engine.reporter().has_errors());
    }

    #[test]
    fn test_linked_result_is_memoized() {
        let engine = Engine::default();
        let cancel = CancellationToken::new();
        let doc = engine.parse("types: {A: Text, B: A}", Origin::Memory("m".into())).unwrap();

        let first = engine.resolve(Arc::clone(&doc), &cancel).unwrap();
        let second = engine.resolve(doc, &cancel).unwrap();
        assert!(first.is_success());
        assert_eq!(first.graph().types(), second.graph().types());
        assert_eq!(engine.link_cache_stats().computations, 1);
        assert_eq!(engine.link_cache_stats().hits, 1);
    }

    #[test]
    fn test_failed_resolution_result() {
        let engine = Engine::default();
        let doc = engine
            .parse("types: {A: Missing}", Origin::Memory("m".into()))
            .unwrap();
        let resolution = engine.resolve(doc, &CancellationToken::new()).unwrap();
        assert!(!resolution.is_success());
        match resolution.into_result() {
            Err(ResolutionError::Failed { diagnostics }) => {
                assert_eq!(diagnostics[0].code(), Some(ErrorCode::E200));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(engine.reporter().drain().len(), 1);
    }

    #[test]
    fn test_cancelled_resolution() {
        let engine = Engine::default();
        let doc = engine.parse("types: {A: Text}", Origin::Memory("m".into())).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            engine.resolve(doc, &cancel),
            Err(ResolutionError::Cancelled)
        ));
        assert!(engine.link_cache_stats().computations == 0);
    }

    #[test]
    fn test_unify_uses_config() {
        let mut config = AppConfig::default();
        config.resolve_mut().set_closed_objects(true);
        let engine = Engine::new(config).unwrap();
        let a = TypeNode::object([("x", TypeNode::text())]);
        let b = TypeNode::object([("y", TypeNode::text())]);
        assert!(engine.unify(&a, &b).is_err());
        assert!(Engine::default().unify(&a, &b).is_ok());
    }
}
