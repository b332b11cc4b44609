//! Parser for the makefile fragments a build generates, e.g. `autoconf.mk` and `backend.mk`.
//!
//! We don't evaluate make, we only care about simple variable assignments:
//!
//! ```text
//! CC_TYPE = clang
//! COMPUTED_CFLAGS = -DNDEBUG
//! COMPUTED_CFLAGS += -I/obj/dist/include
//! ```
//!
//! Everything else (rules, conditionals, comments, includes) is skipped.

use std::collections::BTreeMap;

use compact_str::CompactString;
use mcfg_types::FilePath;

static ASSIGN: &str = " = ";
static APPEND: &str = " += ";

/// Errors that can occur when reading a [`Fragment`].
#[derive(Debug, thiserror::Error)]
pub enum FragmentError {
    #[error("failed to read fragment {path}: {source}")]
    Read {
        path: FilePath,
        #[source]
        source: std::io::Error,
    },
    #[error("fragment {path} is not a regular file")]
    NotAFile { path: FilePath },
}

/// One recognized line of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    /// `KEY = VALUE`
    Assign { key: &'a str, value: &'a str },
    /// `KEY += VALUE`
    Append { key: &'a str, value: &'a str },
    /// Anything we don't understand.
    Ignored,
}

impl<'a> Line<'a> {
    /// Classify a single line.
    ///
    /// Whichever of `" = "` and `" += "` occurs first decides the kind of the line, so the
    /// value of an assignment may itself contain either marker.
    pub fn parse(line: &'a str) -> Line<'a> {
        let assign = line.find(ASSIGN);
        let append = line.find(APPEND);

        let (pos, marker_len, is_append) = match (assign, append) {
            (Some(a), Some(b)) if b < a => (b, APPEND.len(), true),
            (Some(a), _) => (a, ASSIGN.len(), false),
            (None, Some(b)) => (b, APPEND.len(), true),
            (None, None) => return Line::Ignored,
        };

        let key = line[..pos].trim();
        if key.is_empty() {
            return Line::Ignored;
        }
        let value = line[pos + marker_len..].trim();

        if is_append {
            Line::Append { key, value }
        } else {
            Line::Assign { key, value }
        }
    }
}

/// Variables accumulated from one or more fragment files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    vars: BTreeMap<CompactString, String>,
}

impl Fragment {
    /// Returns an empty [`Fragment`].
    pub fn new() -> Self {
        Fragment::default()
    }

    /// Read and parse the fragment at `path`.
    pub async fn read(path: &FilePath) -> Result<Self, FragmentError> {
        let mut fragment = Fragment::new();
        fragment.read_into(path).await?;
        Ok(fragment)
    }

    /// Parse the fragment at `path` on top of the variables already in this [`Fragment`].
    pub async fn read_into(&mut self, path: &FilePath) -> Result<(), FragmentError> {
        tracing::debug!(%path, "parsing fragment");

        let read_err = |source| FragmentError::Read {
            path: path.clone(),
            source,
        };
        let metadata = tokio::fs::metadata(path.as_path()).await.map_err(read_err)?;
        if !metadata.is_file() {
            return Err(FragmentError::NotAFile { path: path.clone() });
        }
        let contents = tokio::fs::read_to_string(path.as_path())
            .await
            .map_err(read_err)?;

        self.parse_str(&contents);
        Ok(())
    }

    /// Parse `contents` on top of the variables already in this [`Fragment`].
    pub fn parse_str(&mut self, contents: &str) {
        for line in contents.lines() {
            match Line::parse(line) {
                Line::Assign { key, value } => self.set(key, value),
                Line::Append { key, value } => self.append(key, value),
                Line::Ignored => (),
            }
        }
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn set(&mut self, key: &str, value: &str) {
        self.vars.insert(CompactString::new(key), value.to_string());
    }

    /// Appends `value` to `key` separated by a single space.
    pub fn append(&mut self, key: &str, value: &str) {
        match self.vars.get_mut(key) {
            Some(existing) if !existing.is_empty() => {
                existing.push(' ');
                existing.push_str(value);
            }
            _ => self.set(key, value),
        }
    }

    /// Returns the value of `key`, if it was ever assigned.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Returns the value of `key` if it was assigned something other than an empty string.
    pub fn get_nonempty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|value| !value.is_empty())
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<'a> FromIterator<&'a str> for Fragment {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        let mut fragment = Fragment::new();
        for line in iter {
            fragment.parse_str(line);
        }
        fragment
    }
}
