//! Filesystem paths as the rest of `mcfg` sees them.

use std::ffi::OsStr;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};

use compact_str::CompactString;
use indexmap::IndexSet;

/// An absolute filesystem path.
///
/// Paths are lexically normalized on construction: `.` components are dropped and `..`
/// components remove their parent. Equality and hashing use the normalized string, so
/// `/a/./b` and `/a/c/../b` are the same [`FilePath`].
///
/// [`FilePath`]s are values, every operation returns a new one.
#[derive(Clone)]
pub struct FilePath {
    inner: PathBuf,
    /// Normalized string form, used as the identity of this path.
    key: CompactString,
}

impl FilePath {
    /// Create a new [`FilePath`], normalizing `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let inner = normalize(path.as_ref());
        let key = CompactString::from(inner.to_string_lossy());
        FilePath { inner, key }
    }

    /// Create a [`FilePath`] from a path that a unix-like tool printed.
    ///
    /// Build tools on Windows run under MSYS and report paths like `/c/mozilla/src`, this
    /// converts those back to `c:\mozilla\src`. Everywhere else this is [`FilePath::new`].
    pub fn from_unixy(path: &str) -> Self {
        #[cfg(windows)]
        if let Some(native) = unixy_to_windows(path) {
            return FilePath::new(native);
        }
        FilePath::new(path)
    }

    /// Returns the underlying [`Path`].
    pub fn as_path(&self) -> &Path {
        &self.inner
    }

    /// Returns the normalized string form of this path.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Append `components` to this path.
    pub fn join<I, S>(&self, components: I) -> FilePath
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        let mut inner = self.inner.clone();
        for component in components {
            inner.push(component);
        }
        FilePath::new(inner)
    }

    /// Interpret `path` relative to this one, unless it is already absolute.
    pub fn resolve(&self, path: impl AsRef<Path>) -> FilePath {
        let path = path.as_ref();
        if path.is_absolute() {
            FilePath::new(path)
        } else {
            self.join([path])
        }
    }

    /// Returns the directory containing this path, or this path if it is a root.
    pub fn parent(&self) -> FilePath {
        match self.inner.parent() {
            Some(parent) => FilePath::new(parent),
            None => self.clone(),
        }
    }

    /// Returns the final component of this path, if any.
    pub fn file_name(&self) -> Option<&OsStr> {
        self.inner.file_name()
    }

    /// Returns the extension without the leading `.`, if any.
    pub fn extension(&self) -> Option<&str> {
        self.inner.extension().and_then(OsStr::to_str)
    }

    /// Returns this path with its extension replaced by `extension`.
    pub fn with_extension(&self, extension: &str) -> FilePath {
        FilePath::new(self.inner.with_extension(extension))
    }

    /// Returns true if `self` is `base` or lives underneath it.
    pub fn starts_with(&self, base: &FilePath) -> bool {
        self.inner.starts_with(&base.inner)
    }

    /// Reproject this path from underneath `from` to the same location underneath `to`.
    ///
    /// Returns `None` if this path is not underneath `from`.
    ///
    /// ```ignore
    /// let src = FilePath::new("/src/dom/base");
    /// let obj = src.rebase(&FilePath::new("/src"), &FilePath::new("/obj")).unwrap();
    /// assert_eq!(obj, FilePath::new("/obj/dom/base"));
    /// ```
    pub fn rebase(&self, from: &FilePath, to: &FilePath) -> Option<FilePath> {
        let relative = self.inner.strip_prefix(&from.inner).ok()?;
        if relative.as_os_str().is_empty() {
            Some(to.clone())
        } else {
            Some(to.join([relative]))
        }
    }
}

impl PartialEq for FilePath {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for FilePath {}

impl Hash for FilePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.key)
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl AsRef<Path> for FilePath {
    fn as_ref(&self) -> &Path {
        &self.inner
    }
}

impl serde::Serialize for FilePath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key)
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => (),
            Component::ParentDir => {
                // `..` at the root stays at the root, leading `..` of a relative path is kept.
                let popped = match normalized.components().next_back() {
                    Some(Component::Normal(_)) => normalized.pop(),
                    _ => false,
                };
                if !popped && !normalized.has_root() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

#[cfg(windows)]
fn unixy_to_windows(path: &str) -> Option<String> {
    let rest = path.strip_prefix('/')?;
    let mut chars = rest.chars();
    let drive = chars.next().filter(char::is_ascii_alphabetic)?;
    let remainder = chars.as_str();
    if !(remainder.is_empty() || remainder.starts_with('/')) {
        return None;
    }
    Some(format!("{drive}:{}", remainder.replace('/', "\\")))
}

/// An insertion ordered set of [`FilePath`]s.
///
/// Search paths are "first match wins", so the order paths were added in is preserved when
/// iterating and adding a path that is already present does not move it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilePathSet {
    inner: IndexSet<FilePath>,
}

impl FilePathSet {
    pub fn new() -> Self {
        FilePathSet::default()
    }

    /// Add `path` to the set, returns `false` if it was already present.
    pub fn insert(&mut self, path: FilePath) -> bool {
        self.inner.insert(path)
    }

    pub fn contains(&self, path: &FilePath) -> bool {
        self.inner.contains(path)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilePath> + '_ {
        self.inner.iter()
    }
}

impl Extend<FilePath> for FilePathSet {
    fn extend<T: IntoIterator<Item = FilePath>>(&mut self, iter: T) {
        self.inner.extend(iter);
    }
}

impl<'a> Extend<&'a FilePath> for FilePathSet {
    fn extend<T: IntoIterator<Item = &'a FilePath>>(&mut self, iter: T) {
        self.inner.extend(iter.into_iter().cloned());
    }
}

impl FromIterator<FilePath> for FilePathSet {
    fn from_iter<T: IntoIterator<Item = FilePath>>(iter: T) -> Self {
        FilePathSet {
            inner: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a FilePathSet {
    type Item = &'a FilePath;
    type IntoIter = indexmap::set::Iter<'a, FilePath>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

impl serde::Serialize for FilePathSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.inner.iter())
    }
}

#[cfg(all(test, unix))]
mod test {
    use super::*;

    #[test]
    fn normalizes() {
        assert_eq!(FilePath::new("/a/./b/../c/").as_str(), "/a/c");
        assert_eq!(FilePath::new("/../a").as_str(), "/a");
        assert_eq!(FilePath::new("a/../../b").as_str(), "../b");
        assert_eq!(FilePath::new("/a/./b"), FilePath::new("/a/c/../b"));
    }

    #[test]
    fn join_parent_extension() {
        let obj = FilePath::new("/obj");
        let backend = obj.join(["dom", "base", "backend.mk"]);
        assert_eq!(backend.as_str(), "/obj/dom/base/backend.mk");
        assert_eq!(backend.parent().as_str(), "/obj/dom/base");
        assert_eq!(backend.extension(), Some("mk"));
        assert_eq!(FilePath::new("/").parent().as_str(), "/");

        let header = FilePath::new("/src/foo.h");
        assert_eq!(header.with_extension("c").as_str(), "/src/foo.c");
        assert_eq!(FilePath::new("/src/Makefile").extension(), None);
    }

    #[test]
    fn resolve() {
        let base = FilePath::new("/obj/dom");
        assert_eq!(base.resolve("inc").as_str(), "/obj/dom/inc");
        assert_eq!(base.resolve("../ipc").as_str(), "/obj/ipc");
        assert_eq!(base.resolve("/usr/include").as_str(), "/usr/include");
    }

    #[test]
    fn rebase() {
        let src = FilePath::new("/src");
        let obj = FilePath::new("/obj");

        let dir = FilePath::new("/src/dom/base");
        assert_eq!(dir.rebase(&src, &obj), Some(FilePath::new("/obj/dom/base")));
        assert_eq!(src.rebase(&src, &obj), Some(obj.clone()));

        // Prefix matching is per component, not per character.
        assert_eq!(FilePath::new("/srcdir/x").rebase(&src, &obj), None);
        assert_eq!(FilePath::new("/elsewhere").rebase(&src, &obj), None);
    }

    #[test]
    fn set_preserves_order_and_dedups() {
        let mut set = FilePathSet::new();
        assert!(set.insert(FilePath::new("/b")));
        assert!(set.insert(FilePath::new("/a")));
        assert!(!set.insert(FilePath::new("/b/../b")));
        assert!(set.insert(FilePath::new("/c")));

        let order: Vec<_> = set.iter().map(FilePath::as_str).collect();
        assert_eq!(order, vec!["/b", "/a", "/c"]);
        assert!(set.contains(&FilePath::new("/a/.")));
    }

    #[test]
    fn from_unixy_is_identity_off_windows() {
        assert_eq!(FilePath::from_unixy("/c/mozilla").as_str(), "/c/mozilla");
    }
}
