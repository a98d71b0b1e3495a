//! Cache sources: local paths and remote URLs.

use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Something a cached object was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    /// A local file or directory, held as an absolute path.
    Local(PathBuf),
    /// An `http://` or `https://` URL.
    Remote(String),
}

impl Source {
    /// Interprets a string as a URL when it carries an HTTP(S) scheme and as
    /// a local path otherwise.
    pub fn parse(name: &str) -> Self {
        let lower = name.get(..8).unwrap_or(name).to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Remote(name.to_string())
        } else {
            Self::local(name)
        }
    }

    /// Creates a local source. Relative paths are resolved against the
    /// current directory; the path does not have to exist.
    ///
    /// The path is normalized lexically: `.` components and trailing
    /// separators are dropped and `..` removes the preceding component, so
    /// `data/`, `./data` and `x/../data` all name the same source. Links are
    /// not consulted, which means `link/..` resolves to the directory holding
    /// `link` rather than the link target's parent.
    pub fn local(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::path::absolute(path) {
            Ok(absolute) => Self::Local(normalize(&absolute)),
            Err(_) => Self::Local(path.to_path_buf()),
        }
    }

    /// Returns the stable identifier recorded in cache keys.
    pub fn identifier(&self) -> String {
        match self {
            Self::Local(path) => path.to_string_lossy().into_owned(),
            Self::Remote(url) => url.clone(),
        }
    }

    /// Returns `true` for URL sources.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            // Never climbs above the root or prefix.
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => f.write_str(url),
        }
    }
}

impl From<&str> for Source {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

impl From<String> for Source {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

impl From<&String> for Source {
    fn from(name: &String) -> Self {
        Self::parse(name)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Self::local(path)
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Self::local(path)
    }
}

impl From<&PathBuf> for Source {
    fn from(path: &PathBuf) -> Self {
        Self::local(path)
    }
}

impl From<&Source> for Source {
    fn from(source: &Source) -> Self {
        source.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_remote() {
        assert!(Source::parse("http://hl7.org/fhir/fhir.ttl").is_remote());
        assert!(Source::parse("HTTPS://example.org/").is_remote());
        assert!(!Source::parse("httpdata/file.txt").is_remote());
    }

    #[test]
    fn relative_paths_become_absolute() {
        let source = Source::parse("data/datafile");
        match &source {
            Source::Local(path) => {
                assert!(path.is_absolute());
                assert!(path.ends_with("data/datafile"));
            }
            Source::Remote(_) => panic!("expected local source"),
        }
    }

    #[test]
    fn spellings_of_one_path_share_an_identifier() {
        let plain = Source::parse("data").identifier();
        assert_eq!(Source::parse("data/").identifier(), plain);
        assert_eq!(Source::parse("./data").identifier(), plain);
        assert_eq!(Source::parse("data/./").identifier(), plain);
        assert_eq!(Source::parse("other/../data").identifier(), plain);
        assert_ne!(Source::parse("data/sub").identifier(), plain);
        assert!(!plain.ends_with('/'));
    }

    #[cfg(unix)]
    #[test]
    fn parent_components_resolve_lexically() {
        assert_eq!(Source::parse("/a/b/../c").identifier(), "/a/c");
        assert_eq!(Source::parse("/a/./b//c/").identifier(), "/a/b/c");
        assert_eq!(Source::parse("/../x").identifier(), "/x");
        assert_eq!(Source::parse("/a/..").identifier(), "/");
    }

    #[test]
    fn identifier_is_stable() {
        let a = Source::from(PathBuf::from("/tmp/x/y"));
        let b = Source::from("/tmp/x/y");
        assert_eq!(a.identifier(), b.identifier());
        assert_eq!(
            Source::parse("http://example.org/a").identifier(),
            "http://example.org/a"
        );
    }
}
