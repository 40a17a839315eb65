//! Resolving import references against the importing document.

use std::{
    fmt,
    path::{Component, Path, PathBuf},
};

use url::Url;

use blue_core::ContentHash;
use blue_parser::{ImportRef, Origin};

/// A concrete place to load a document from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Path(PathBuf),
    Url(Url),
    Content(ContentHash),
}

impl Locator {
    /// Resolve `reference` as written in a document loaded from `base`.
    ///
    /// Relative paths are joined to the importer's directory, or to its URL
    /// for remote importers. Documents without a location (in memory or
    /// content-addressed) resolve relative paths against the working
    /// directory. `file://` URLs become paths.
    ///
    /// # Examples
    ///
    /// ```
    /// # use std::path::PathBuf;
    /// # use blue::location::Locator;
    /// # use blue_parser::{ImportRef, Origin};
    /// let base = Origin::Path(PathBuf::from("/schemas/shapes/main.yaml"));
    /// let reference = ImportRef::parse("../geo.yaml").unwrap();
    /// assert_eq!(
    ///     Locator::resolve(&reference, &base).unwrap(),
    ///     Locator::Path(PathBuf::from("/schemas/geo.yaml")),
    /// );
    /// ```
    pub fn resolve(reference: &ImportRef, base: &Origin) -> Result<Self, String> {
        match reference {
            ImportRef::Content(hash) => Ok(Locator::Content(*hash)),
            ImportRef::Url(url) => Self::from_url(url.clone()),
            ImportRef::Path(path) => match base {
                Origin::Path(base) if !Path::new(path).is_absolute() => {
                    let dir = base.parent().unwrap_or_else(|| Path::new(""));
                    Ok(Locator::Path(normalize(&dir.join(path))))
                }
                Origin::Url(base) => {
                    let joined = base
                        .join(path)
                        .map_err(|err| format!("cannot join `{path}` to `{base}`: {err}"))?;
                    Self::from_url(joined)
                }
                _ => Ok(Locator::Path(normalize(Path::new(path)))),
            },
        }
    }

    fn from_url(url: Url) -> Result<Self, String> {
        if url.scheme() == "file" {
            url.to_file_path()
                .map(|path| Locator::Path(normalize(&path)))
                .map_err(|()| format!("`{url}` is not a valid file path"))
        } else {
            Ok(Locator::Url(url))
        }
    }

    /// The origin recorded on a document loaded from here.
    pub fn origin(&self) -> Origin {
        match self {
            Locator::Path(path) => Origin::Path(path.clone()),
            Locator::Url(url) => Origin::Url(url.clone()),
            Locator::Content(hash) => Origin::Content(*hash),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Path(path) => write!(f, "{}", path.display()),
            Locator::Url(url) => write!(f, "{url}"),
            Locator::Content(hash) => write!(f, "{hash}"),
        }
    }
}

/// Remove `.` and resolvable `..` components without touching the
/// filesystem, so that one file reached by different relative paths gets
/// one canonical location.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let pops = matches!(out.components().next_back(), Some(Component::Normal(_)));
                if pops {
                    out.pop();
                } else if !matches!(
                    out.components().next_back(),
                    Some(Component::RootDir | Component::Prefix(_))
                ) {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(reference: &str, base: &Origin) -> Locator {
        Locator::resolve(&ImportRef::parse(reference).unwrap(), base).unwrap()
    }

    #[test]
    fn test_relative_to_path() {
        let base = Origin::Path(PathBuf::from("/a/b/main.yaml"));
        assert_eq!(
            resolve("./geo.yaml", &base),
            Locator::Path(PathBuf::from("/a/b/geo.yaml"))
        );
        assert_eq!(
            resolve("../../../x.yaml", &base),
            Locator::Path(PathBuf::from("/x.yaml"))
        );
        assert_eq!(
            resolve("/abs/x.yaml", &base),
            Locator::Path(PathBuf::from("/abs/x.yaml"))
        );
    }

    #[test]
    fn test_relative_to_url() {
        let base = Origin::Url(Url::parse("https://example.test/types/main.yaml").unwrap());
        assert_eq!(
            resolve("geo.yaml", &base),
            Locator::Url(Url::parse("https://example.test/types/geo.yaml").unwrap())
        );
        assert_eq!(
            resolve("../common.yaml", &base),
            Locator::Url(Url::parse("https://example.test/common.yaml").unwrap())
        );
    }

    #[test]
    fn test_memory_origin_keeps_relative_path() {
        let base = Origin::Memory("inline".to_string());
        assert_eq!(
            resolve("./x/../geo.yaml", &base),
            Locator::Path(PathBuf::from("geo.yaml"))
        );
        assert_eq!(
            resolve("../geo.yaml", &base),
            Locator::Path(PathBuf::from("../geo.yaml"))
        );
    }

    #[test]
    fn test_content_and_file_urls() {
        let base = Origin::Memory("inline".to_string());
        let hash = ContentHash::of(b"x");
        assert_eq!(resolve(&hash.to_string(), &base), Locator::Content(hash));
        assert_eq!(
            resolve("file:///tmp/x.yaml", &base),
            Locator::Path(PathBuf::from("/tmp/x.yaml"))
        );
    }

    #[test]
    fn test_origin_roundtrip() {
        let locator = Locator::Path(PathBuf::from("/a.yaml"));
        assert_eq!(locator.origin(), Origin::Path(PathBuf::from("/a.yaml")));
        assert_eq!(locator.to_string(), "/a.yaml");
    }
}
