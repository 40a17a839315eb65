//! Parsed documents.
//!
//! A [`Document`] bundles everything known about one source: where it came
//! from, its text and line index, its content hash, the syntax tree, and the
//! elaborated [`Module`]. Documents are immutable once built and are shared
//! between resolutions behind an `Arc`.

use std::{fmt, path::PathBuf, sync::Arc};

use log::debug;
use url::Url;

use blue_core::{ContentHash, hash::ContentHasher};

use crate::{
    ast::Node,
    elaborate::Module,
    error::{Diagnostic, ErrorCode, ParseError},
    parser,
    source::{Location, SourceFile},
    span::Span,
};

/// Where a document was loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    Path(PathBuf),
    Url(Url),
    /// Looked up by content hash, with no known location.
    Content(ContentHash),
    /// Supplied directly by the caller, under a display label.
    Memory(String),
}

impl Origin {
    /// Cache key of content `hash` loaded from this origin.
    ///
    /// Relative imports resolve against the origin, so byte-identical text at
    /// two locations is two documents.
    pub fn document_key(&self, hash: ContentHash) -> ContentHash {
        let mut hasher = ContentHasher::new();
        hasher.update_part(hash.as_bytes());
        hasher.update_part(self.to_string().as_bytes());
        hasher.finish()
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Path(path) => write!(f, "{}", path.display()),
            Origin::Url(url) => write!(f, "{url}"),
            Origin::Content(hash) => write!(f, "{hash}"),
            Origin::Memory(label) => f.write_str(label),
        }
    }
}

/// A parsed and elaborated document.
#[derive(Debug)]
pub struct Document {
    origin: Origin,
    source: Arc<SourceFile>,
    hash: ContentHash,
    root: Node,
    module: Module,
    warnings: Vec<Diagnostic>,
}

impl Document {
    /// Parse and elaborate document text.
    ///
    /// Errors carry the document source, so they render with file name,
    /// line, and column.
    ///
    /// # Examples
    ///
    /// ```
    /// use blue_parser::{Document, Origin};
    ///
    /// let doc = Document::parse("types:\n  Id: Text\n", Origin::Memory("inline".into())).unwrap();
    /// assert!(doc.module().types.contains_key("Id"));
    /// ```
    pub fn parse(text: &str, origin: Origin) -> Result<Self, ParseError> {
        Self::build(text, ContentHash::of(text.as_bytes()), origin)
    }

    /// Parse raw bytes, which must be UTF-8. A leading byte order mark is
    /// skipped; the content hash covers the bytes as given.
    pub fn parse_bytes(bytes: &[u8], origin: Origin) -> Result<Self, ParseError> {
        let hash = ContentHash::of(bytes);
        let text = std::str::from_utf8(bytes).map_err(|err| {
            let start = err.valid_up_to();
            let end = start + err.error_len().unwrap_or(1);
            let source = Arc::new(SourceFile::new(
                origin.to_string(),
                String::from_utf8_lossy(bytes).into_owned(),
            ));
            ParseError::from(
                Diagnostic::error("document is not valid UTF-8")
                    .with_code(ErrorCode::E001)
                    .with_label(Span::new(start..end), "invalid byte sequence")
                    .with_help("save the document as UTF-8")
                    .with_source(source),
            )
        })?;

        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        Self::build(text, hash, origin)
    }

    fn build(text: &str, hash: ContentHash, origin: Origin) -> Result<Self, ParseError> {
        let source = Arc::new(SourceFile::new(origin.to_string(), text));

        let root = parser::parse_node(text).map_err(|err| err.with_source(&source))?;
        let (module, warnings) = Module::elaborate(&root).map_err(|err| err.with_source(&source))?;
        let warnings = warnings
            .into_iter()
            .map(|w| w.with_source(Arc::clone(&source)))
            .collect();

        debug!(origin:% = origin, hash = hash.short(); "Parsed document");
        Ok(Self {
            origin,
            source,
            hash,
            root,
            module,
            warnings,
        })
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn source(&self) -> &Arc<SourceFile> {
        &self.source
    }

    pub fn text(&self) -> &str {
        self.source.text()
    }

    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    /// Identity of this document: its content together with its origin.
    pub fn key(&self) -> ContentHash {
        self.origin.document_key(self.hash)
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Warnings raised during elaboration.
    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    /// The declared `name`, if any.
    pub fn name(&self) -> Option<&str> {
        self.module.name.as_ref().map(|name| name.as_str())
    }

    /// The identifier used to detect conflicting versions of a document:
    /// its declared `name`, or else its location.
    pub fn identifier(&self) -> String {
        self.name()
            .map_or_else(|| self.origin.to_string(), str::to_string)
    }

    /// 1-based line and column of a byte offset.
    pub fn location(&self, offset: usize) -> Location {
        self.source.location(offset)
    }
}
