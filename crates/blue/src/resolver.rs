//! Import resolution.
//!
//! Starting from a root document, the resolver loads every import, parses it
//! through the engine's document cache, and descends into it. Documents are
//! kept in an arena indexed by [`DocumentId`]. A document is its content
//! together with its location: the same file reached along several paths is
//! loaded once and shares one id, while identical text at another location
//! is a separate document whose relative imports resolve from there.
//!
//! Problems are reported per import and never stop sibling imports:
//!
//! - `E201` when one name is reached with different content, or a
//!   pinned import does not match its pin
//! - `E202` when an import re-enters a document on the active path
//! - `E203` when an import cannot be read, downloaded, or parsed
//! - `E205` when the import chain exceeds the configured depth
//!
//! Sibling imports are loaded in parallel on the rayon pool. Descent into
//! the loaded children is sequential so the active path stays exact.

use std::{
    collections::HashMap,
    convert::Infallible,
    sync::Arc,
};

use log::{debug, info, trace};
use rayon::prelude::*;

use blue_core::ContentHash;
use blue_parser::{Diagnostic, Document, ErrorCode, ImportDecl, ParseError};

use crate::{
    cache::ContentCache,
    cancel::CancellationToken,
    config::{FetchConfig, ResolveConfig},
    fetch::{self, FetchCause, FetchError, Fetcher},
    graph::{DocumentId, ImportEdge},
    location::Locator,
    reporter::Reporter,
    store::DiskStore,
};

/// Marker for a resolution stopped by its cancellation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cancelled;

/// Why one import could not be loaded.
#[derive(Debug)]
pub(crate) enum LoadError {
    Fetch(FetchError),
    Parse(ParseError),
    PinMismatch {
        expected: ContentHash,
        actual: ContentHash,
    },
    Cancelled,
}

impl From<FetchError> for LoadError {
    fn from(err: FetchError) -> Self {
        if err.is_cancelled() {
            LoadError::Cancelled
        } else {
            LoadError::Fetch(err)
        }
    }
}

/// Loads documents through the fetcher, the disk store, and the document
/// cache. Shared by reference across the rayon pool.
#[derive(Clone, Copy)]
pub(crate) struct Loader<'a> {
    pub fetcher: &'a dyn Fetcher,
    pub fetch_config: &'a FetchConfig,
    pub store: Option<&'a DiskStore>,
    /// Parsed documents by [`Document::key`].
    pub documents: &'a ContentCache<Arc<Document>>,
    /// Raw sources by content hash, serving `sha256:` references.
    pub objects: &'a ContentCache<Arc<[u8]>>,
    pub cancel: &'a CancellationToken,
}

impl Loader<'_> {
    /// Load and parse the document at `locator`, checking it against `pin`.
    pub fn load(
        &self,
        locator: &Locator,
        pin: Option<ContentHash>,
    ) -> Result<Arc<Document>, LoadError> {
        if self.cancel.is_cancelled() {
            return Err(LoadError::Cancelled);
        }

        let bytes: Arc<[u8]> = match locator {
            Locator::Path(path) => fetch::read_file(path)?.into(),
            Locator::Url(url) => self.download(url)?.into(),
            Locator::Content(hash) => self.object(hash)?,
        };

        let hash = ContentHash::of(&bytes);
        if let Some(expected) = pin {
            if expected != hash {
                return Err(LoadError::PinMismatch {
                    expected,
                    actual: hash,
                });
            }
        }

        let origin = locator.origin();
        let key = origin.document_key(hash);
        let entry = self.documents.get_or_compute(key, || {
            let document = Document::parse_bytes(&bytes, origin.clone()).map_err(LoadError::Parse)?;
            // A cancelled resolution commits nothing.
            if self.cancel.is_cancelled() {
                return Err(LoadError::Cancelled);
            }
            Ok(Arc::new(document))
        })?;

        if !self.cancel.is_cancelled() {
            self.remember(hash, &bytes);
        }
        Ok(Arc::clone(entry.value()))
    }

    /// Keep `bytes` for later `sha256:` references, in memory and in the
    /// disk store.
    pub fn remember(&self, hash: ContentHash, bytes: &Arc<[u8]>) {
        let stored = self
            .objects
            .get_or_compute(hash, || Ok::<_, Infallible>(Arc::clone(bytes)));
        if let Err(never) = stored {
            match never {}
        }
        if let Some(store) = self.store {
            if let Err(err) = store.store_object(bytes) {
                debug!(error:% = err; "Failed to store object");
            }
        }
    }

    fn object(&self, hash: &ContentHash) -> Result<Arc<[u8]>, FetchError> {
        if let Some(entry) = self.objects.get(hash) {
            trace!(hash = hash.short(); "Content reference served from memory");
            return Ok(Arc::clone(entry.value()));
        }
        self.store
            .and_then(|store| store.load_object(hash))
            .map(Arc::from)
            .ok_or_else(|| FetchError::new(hash, FetchCause::NotFound))
    }

    fn download(&self, url: &url::Url) -> Result<Vec<u8>, FetchError> {
        if let Some(bytes) = self.store.and_then(|store| store.load_remote(url)) {
            return Ok(bytes);
        }
        let bytes = fetch::fetch_with_retry(self.fetcher, url, self.fetch_config, self.cancel)?;
        if let Some(store) = self.store {
            if !self.cancel.is_cancelled() {
                if let Err(err) = store.store_remote(url, &bytes) {
                    debug!(url:% = url, error:% = err; "Failed to store remote body");
                }
            }
        }
        Ok(bytes)
    }
}

/// Documents and import edges reached from a root.
#[derive(Debug)]
pub(crate) struct ResolvedDocuments {
    pub documents: Vec<Arc<Document>>,
    pub prefixes: Vec<String>,
    pub imports: Vec<ImportEdge>,
}

/// Walks the import graph of one root document.
pub(crate) struct Resolver<'a> {
    loader: Loader<'a>,
    config: &'a ResolveConfig,
    reporter: &'a Reporter,
    documents: Vec<Arc<Document>>,
    prefixes: Vec<String>,
    imports: Vec<ImportEdge>,
    /// Arena ids by [`Document::key`].
    by_key: HashMap<ContentHash, DocumentId>,
    /// First document loaded under each identifier.
    by_identifier: HashMap<String, DocumentId>,
}

impl<'a> Resolver<'a> {
    pub fn new(loader: Loader<'a>, config: &'a ResolveConfig, reporter: &'a Reporter) -> Self {
        Self {
            loader,
            config,
            reporter,
            documents: Vec::new(),
            prefixes: Vec::new(),
            imports: Vec::new(),
            by_key: HashMap::new(),
            by_identifier: HashMap::new(),
        }
    }

    /// Resolve every import reachable from `root`.
    pub fn resolve(mut self, root: Arc<Document>) -> Result<ResolvedDocuments, Cancelled> {
        info!(root:% = root.origin(), hash = root.hash().short(); "Resolving imports");
        let root_id = self.add_document(root, String::new());
        let mut path = vec![root_id];
        self.visit(root_id, &mut path)?;

        info!(
            documents = self.documents.len(),
            imports = self.imports.len();
            "Resolved imports",
        );
        Ok(ResolvedDocuments {
            documents: self.documents,
            prefixes: self.prefixes,
            imports: self.imports,
        })
    }

    fn add_document(&mut self, document: Arc<Document>, prefix: String) -> DocumentId {
        let id = DocumentId::new(self.documents.len());
        self.by_key.insert(document.key(), id);
        self.by_identifier.entry(document.identifier()).or_insert(id);
        self.reporter.extend(document.warnings().iter().cloned());
        trace!(id:% = id, origin:% = document.origin(), prefix = prefix.as_str(); "Added document");
        self.documents.push(document);
        self.prefixes.push(prefix);
        id
    }

    // ============================================================================
    // Traversal
    // ============================================================================

    /// Load the imports of `id` and descend into new documents. `path` is the
    /// chain of documents from the root down to `id`, inclusive.
    fn visit(&mut self, id: DocumentId, path: &mut Vec<DocumentId>) -> Result<(), Cancelled> {
        if self.loader.cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let document = Arc::clone(&self.documents[id.index()]);
        let decls = &document.module().imports;
        if decls.is_empty() {
            return Ok(());
        }
        debug!(origin:% = document.origin(), imports = decls.len(); "Loading imports");

        let requests: Vec<Option<(Locator, Option<ContentHash>)>> = decls
            .iter()
            .map(|decl| self.request(&document, decl, path.len()))
            .collect();

        let loader = self.loader;
        let load = |request: &Option<(Locator, Option<ContentHash>)>| {
            request
                .as_ref()
                .map(|(locator, pin)| loader.load(locator, *pin))
        };
        let results: Vec<_> = if self.config.parallel_fetch() && requests.len() > 1 {
            requests.par_iter().map(load).collect()
        } else {
            requests.iter().map(load).collect()
        };

        for (decl, result) in decls.iter().zip(results) {
            let edge = self.imports.len();
            self.imports.push(ImportEdge {
                source: id,
                alias: decl.alias.inner().clone(),
                reference: decl.reference.inner().to_string(),
                target: None,
            });

            let child = match result {
                None => continue,
                Some(Ok(child)) => child,
                Some(Err(LoadError::Cancelled)) => return Err(Cancelled),
                Some(Err(err)) => {
                    self.report_load_error(&document, decl, err);
                    continue;
                }
            };

            if let Some(&existing) = self.by_key.get(&child.key()) {
                if let Some(start) = path.iter().position(|p| *p == existing) {
                    self.report_cycle(&document, decl, &path[start..], existing);
                } else {
                    self.imports[edge].target = Some(existing);
                }
                continue;
            }

            // Identical content under one name at two locations is no
            // conflict; each copy resolves its own imports.
            let identifier = child.identifier();
            if let Some(&other) = self.by_identifier.get(&identifier) {
                let other_hash = self.documents[other.index()].hash();
                if other_hash != child.hash() {
                    self.report_conflict(&document, decl, &identifier, other_hash, child.hash());
                    continue;
                }
            }

            let prefix = match self.prefixes[id.index()].as_str() {
                "" => decl.alias.inner().clone(),
                parent => format!("{parent}.{}", decl.alias.inner()),
            };
            let child_id = self.add_document(child, prefix);
            self.imports[edge].target = Some(child_id);

            path.push(child_id);
            self.visit(child_id, path)?;
            path.pop();
        }
        Ok(())
    }

    /// Where to load `decl` from, or `None` after reporting why it cannot be
    /// loaded.
    fn request(
        &self,
        document: &Document,
        decl: &ImportDecl,
        depth: usize,
    ) -> Option<(Locator, Option<ContentHash>)> {
        if depth > self.config.max_depth() {
            self.reporter.report(
                Diagnostic::error(format!(
                    "import depth exceeds the maximum of {}",
                    self.config.max_depth()
                ))
                .with_code(ErrorCode::E205)
                .with_label(decl.reference.span(), "import not loaded")
                .with_help("raise `resolve.max_depth` or flatten the import chain")
                .with_source(Arc::clone(document.source())),
            );
            return None;
        }

        match Locator::resolve(decl.reference.inner(), document.origin()) {
            Ok(locator) => Some((locator, decl.pin)),
            Err(message) => {
                self.reporter.report(
                    Diagnostic::error(format!("cannot locate import `{}`", decl.alias.inner()))
                        .with_code(ErrorCode::E203)
                        .with_label(decl.reference.span(), message)
                        .with_source(Arc::clone(document.source())),
                );
                None
            }
        }
    }

    // ============================================================================
    // Diagnostics
    // ============================================================================

    fn report_load_error(&self, document: &Document, decl: &ImportDecl, err: LoadError) {
        let source = Arc::clone(document.source());
        let span = decl.reference.span();
        match err {
            LoadError::Fetch(err) => self.reporter.report(
                Diagnostic::error(format!("failed to load import `{}`", decl.alias.inner()))
                    .with_code(ErrorCode::E203)
                    .with_label(span, err.to_string())
                    .with_help("check that the document exists and is reachable")
                    .with_source(source),
            ),
            LoadError::Parse(err) => {
                self.reporter.report(
                    Diagnostic::error(format!("import `{}` has errors", decl.alias.inner()))
                        .with_code(ErrorCode::E203)
                        .with_label(span, "imported here")
                        .with_source(source),
                );
                self.reporter.extend(err.into_diagnostics());
            }
            LoadError::PinMismatch { expected, actual } => self.reporter.report(
                Diagnostic::error(format!(
                    "import `{}` does not match its pinned hash",
                    decl.alias.inner()
                ))
                .with_code(ErrorCode::E201)
                .with_label(span, format!("expected {expected}, found {actual}"))
                .with_help("update the pin or restore the pinned version")
                .with_source(source),
            ),
            LoadError::Cancelled => {}
        }
    }

    fn report_cycle(
        &self,
        document: &Document,
        decl: &ImportDecl,
        cycle: &[DocumentId],
        reentered: DocumentId,
    ) {
        let names: Vec<String> = cycle
            .iter()
            .chain([&reentered])
            .map(|id| self.documents[id.index()].identifier())
            .collect();
        self.reporter.report(
            Diagnostic::error(format!("cyclic import [{}]", names.join(", ")))
                .with_code(ErrorCode::E202)
                .with_label(decl.reference.span(), "this import closes the cycle")
                .with_help("break the cycle by moving shared types into a separate document")
                .with_source(Arc::clone(document.source())),
        );
    }

    fn report_conflict(
        &self,
        document: &Document,
        decl: &ImportDecl,
        identifier: &str,
        first: ContentHash,
        second: ContentHash,
    ) {
        self.reporter.report(
            Diagnostic::error(format!(
                "import conflict: `{identifier}` resolves to both {first} and {second}"
            ))
            .with_code(ErrorCode::E201)
            .with_label(decl.reference.span(), format!("this import has content {second}"))
            .with_help("make every import of this document refer to the same version")
            .with_source(Arc::clone(document.source())),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use blue_parser::Origin;

    use super::*;
    use crate::fetch::HttpFetcher;

    struct Fixture {
        fetcher: HttpFetcher,
        fetch: FetchConfig,
        settings: ResolveConfig,
        documents: ContentCache<Arc<Document>>,
        objects: ContentCache<Arc<[u8]>>,
        cancel: CancellationToken,
        reporter: Reporter,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                fetcher: HttpFetcher::new(&FetchConfig::default()),
                fetch: FetchConfig::default(),
                settings: ResolveConfig::default(),
                documents: ContentCache::new(),
                objects: ContentCache::new(),
                cancel: CancellationToken::new(),
                reporter: Reporter::new(),
            }
        }

        fn loader(&self) -> Loader<'_> {
            Loader {
                fetcher: &self.fetcher,
                fetch_config: &self.fetch,
                store: None,
                documents: &self.documents,
                objects: &self.objects,
                cancel: &self.cancel,
            }
        }

        fn resolve(&self, root: &Path) -> Result<ResolvedDocuments, Cancelled> {
            let bytes = fs::read(root).unwrap();
            let root = Document::parse_bytes(&bytes, Origin::Path(root.to_path_buf())).unwrap();
            Resolver::new(self.loader(), &self.settings, &self.reporter).resolve(Arc::new(root))
        }

        fn codes(&self) -> Vec<ErrorCode> {
            self.reporter
                .drain()
                .iter()
                .filter_map(|d| d.code())
                .collect()
        }
    }

    fn write(dir: &Path, name: &str, text: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, text).unwrap();
    }

    fn origin_of(resolved: &ResolvedDocuments, prefix: &str) -> Origin {
        let index = resolved.prefixes.iter().position(|p| p == prefix).unwrap();
        resolved.documents[index].origin().clone()
    }

    #[test]
    fn test_loads_transitive_imports() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.yaml", "imports: {a: ./a.yaml}\ntypes: {}\n");
        write(dir.path(), "a.yaml", "imports: {b: ./b.yaml}\ntypes: {}\n");
        write(dir.path(), "b.yaml", "types: {}\n");

        let fixture = Fixture::new();
        let resolved = fixture.resolve(&dir.path().join("main.yaml")).unwrap();
        assert_eq!(resolved.documents.len(), 3);
        assert_eq!(resolved.prefixes, ["", "a", "a.b"]);
        assert!(resolved.imports.iter().all(|edge| edge.target.is_some()));
        assert!(fixture.codes().is_empty());
    }

    #[test]
    fn test_shared_import_is_loaded_once() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.yaml", "imports: {a: a.yaml, b: b.yaml}\n");
        write(dir.path(), "a.yaml", "imports: {c: c.yaml}\n");
        write(dir.path(), "b.yaml", "imports: {c: ./sub/../c.yaml}\n");
        write(dir.path(), "c.yaml", "name: common\ntypes: {}\n");

        let fixture = Fixture::new();
        let resolved = fixture.resolve(&dir.path().join("main.yaml")).unwrap();
        assert_eq!(resolved.documents.len(), 4);
        let targets: Vec<_> = resolved.imports.iter().map(|edge| edge.target).collect();
        assert_eq!(targets[1], targets[3]);
        assert_eq!(fixture.documents.stats().computations, 3);
    }

    #[test]
    fn test_identical_text_in_two_directories() {
        let dir = tempfile::tempdir().unwrap();
        let shared = "imports: {dep: ./dep.yaml}\ntypes: {}\n";
        write(dir.path(), "main.yaml", "imports: {one: one/lib.yaml, two: two/lib.yaml}\n");
        write(dir.path(), "one/lib.yaml", shared);
        write(dir.path(), "two/lib.yaml", shared);
        write(dir.path(), "one/dep.yaml", "types: {V: Integer}\n");
        write(dir.path(), "two/dep.yaml", "types: {V: Text}\n");

        let fixture = Fixture::new();
        let resolved = fixture.resolve(&dir.path().join("main.yaml")).unwrap();
        assert!(fixture.codes().is_empty());
        assert_eq!(resolved.prefixes, ["", "one", "one.dep", "two", "two.dep"]);
        assert_eq!(
            origin_of(&resolved, "two.dep"),
            Origin::Path(dir.path().join("two/dep.yaml"))
        );
        assert_ne!(resolved.documents[1].key(), resolved.documents[3].key());
        assert_eq!(fixture.documents.stats().computations, 4);
    }

    #[test]
    fn test_same_name_and_content_at_two_locations() {
        let dir = tempfile::tempdir().unwrap();
        let common = "name: common\ntypes: {Id: Text}\n";
        write(dir.path(), "main.yaml", "imports: {a: ./v1/common.yaml, b: ./copy/common.yaml}\n");
        write(dir.path(), "v1/common.yaml", common);
        write(dir.path(), "copy/common.yaml", common);

        let fixture = Fixture::new();
        let resolved = fixture.resolve(&dir.path().join("main.yaml")).unwrap();
        assert!(fixture.codes().is_empty());
        assert_eq!(resolved.documents.len(), 3);
        assert!(resolved.imports.iter().all(|edge| edge.target.is_some()));
    }

    #[test]
    fn test_content_reference_served_from_memory() {
        let dir = tempfile::tempdir().unwrap();
        let shared = "types: {Id: Text}\n";
        let hash = ContentHash::of(shared.as_bytes());
        write(dir.path(), "main.yaml", "imports: {a: a.yaml, s: shared.yaml}\n");
        write(dir.path(), "shared.yaml", shared);
        write(dir.path(), "a.yaml", &format!("imports: {{s: \"{hash}\"}}\n"));

        let fixture = Fixture::new();
        let resolved = fixture.resolve(&dir.path().join("main.yaml")).unwrap();
        assert!(fixture.codes().is_empty());
        assert_eq!(origin_of(&resolved, "a.s"), Origin::Content(hash));
        assert!(fixture.objects.contains(&hash));
    }

    #[test]
    fn test_missing_import_keeps_siblings() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "main.yaml",
            "imports:\n  gone: ./missing.yaml\n  ok: ./ok.yaml\n",
        );
        write(dir.path(), "ok.yaml", "types: {}\n");

        let fixture = Fixture::new();
        let resolved = fixture.resolve(&dir.path().join("main.yaml")).unwrap();
        assert_eq!(resolved.imports[0].target, None);
        assert!(resolved.imports[1].target.is_some());
        assert_eq!(fixture.codes(), [ErrorCode::E203]);
    }

    #[test]
    fn test_depth_limit() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.yaml", "imports: {a: a.yaml}\n");
        write(dir.path(), "a.yaml", "imports: {b: b.yaml}\n");
        write(dir.path(), "b.yaml", "types: {}\n");

        let mut fixture = Fixture::new();
        fixture.settings.set_max_depth(1);
        let resolved = fixture.resolve(&dir.path().join("main.yaml")).unwrap();
        assert_eq!(resolved.documents.len(), 2);
        assert_eq!(fixture.codes(), [ErrorCode::E205]);
    }

    #[test]
    fn test_pin_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let wrong = ContentHash::of(b"something else");
        write(
            dir.path(),
            "main.yaml",
            &format!("imports:\n  a: {{from: a.yaml, hash: \"{wrong}\"}}\n"),
        );
        write(dir.path(), "a.yaml", "types: {}\n");

        let fixture = Fixture::new();
        let resolved = fixture.resolve(&dir.path().join("main.yaml")).unwrap();
        assert_eq!(resolved.imports[0].target, None);
        assert_eq!(fixture.codes(), [ErrorCode::E201]);
    }

    #[test]
    fn test_parse_errors_of_imports_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.yaml", "imports: {a: a.yaml}\n");
        write(dir.path(), "a.yaml", "types: {A: [}\n");

        let fixture = Fixture::new();
        fixture.resolve(&dir.path().join("main.yaml")).unwrap();
        let codes = fixture.codes();
        assert_eq!(codes[0], ErrorCode::E203);
        assert!(codes.len() > 1);
    }

    #[test]
    fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.yaml", "imports: {a: a.yaml}\n");
        write(dir.path(), "a.yaml", "types: {}\n");

        let fixture = Fixture::new();
        fixture.cancel.cancel();
        assert_eq!(
            fixture.resolve(&dir.path().join("main.yaml")).unwrap_err(),
            Cancelled
        );
        assert!(fixture.documents.is_empty());
    }
}
