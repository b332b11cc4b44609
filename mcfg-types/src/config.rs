//! The compiler configuration we resolve for a source file.

use std::fmt;

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::Serialize;

use crate::path::{FilePath, FilePathSet};

/// The two languages a build compiles with distinct compilers and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLanguage {
    C,
    Cpp,
}

impl SourceLanguage {
    /// Name of the per-directory build variable holding the flags for this language.
    pub fn flags_variable(&self) -> &'static str {
        match self {
            SourceLanguage::C => "COMPUTED_CFLAGS",
            SourceLanguage::Cpp => "COMPUTED_CXXFLAGS",
        }
    }

    /// The language standard we report for this language.
    pub fn standard(&self) -> LanguageStandard {
        match self {
            SourceLanguage::C => LanguageStandard::C99,
            SourceLanguage::Cpp => LanguageStandard::Cpp14,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceLanguage::C => "c",
            SourceLanguage::Cpp => "cpp",
        }
    }
}

impl fmt::Display for SourceLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language standards understood by the consumers of a [`CompileConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LanguageStandard {
    #[serde(rename = "c89")]
    C89,
    #[serde(rename = "c99")]
    C99,
    #[serde(rename = "c11")]
    C11,
    #[serde(rename = "c++98")]
    Cpp98,
    #[serde(rename = "c++03")]
    Cpp03,
    #[serde(rename = "c++11")]
    Cpp11,
    #[serde(rename = "c++14")]
    Cpp14,
    #[serde(rename = "c++17")]
    Cpp17,
}

impl LanguageStandard {
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageStandard::C89 => "c89",
            LanguageStandard::C99 => "c99",
            LanguageStandard::C11 => "c11",
            LanguageStandard::Cpp98 => "c++98",
            LanguageStandard::Cpp03 => "c++03",
            LanguageStandard::Cpp11 => "c++11",
            LanguageStandard::Cpp14 => "c++14",
            LanguageStandard::Cpp17 => "c++17",
        }
    }
}

/// Which compiler a semantic analyzer should emulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IntelliSenseMode {
    #[serde(rename = "msvc-x64")]
    MsvcX64,
    #[serde(rename = "gcc-x64")]
    GccX64,
    #[serde(rename = "clang-x64")]
    ClangX64,
}

/// A preprocessor definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Define {
    pub key: CompactString,
    pub value: CompactString,
}

impl Define {
    /// Parse `text` as a name and value separated by the first `splitter`.
    ///
    /// A name without a value is defined to `1`, like `-DNAME` is.
    ///
    /// ```ignore
    /// assert_eq!(Define::parse("FOO=bar", '=').value, "bar");
    /// assert_eq!(Define::parse("FOO", '=').value, "1");
    /// assert_eq!(Define::parse("__clang__ 1", ' ').key, "__clang__");
    /// ```
    pub fn parse(text: &str, splitter: char) -> Define {
        match text.split_once(splitter) {
            Some((key, value)) => Define {
                key: key.into(),
                value: value.into(),
            },
            None => Define {
                key: text.into(),
                value: "1".into(),
            },
        }
    }
}

impl fmt::Display for Define {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Preprocessor definitions keyed by name.
///
/// Inserting a name that already exists replaces its value, mirroring how a later `-D`
/// shadows an earlier one, but keeps its original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Defines {
    inner: IndexMap<CompactString, Define>,
}

impl Defines {
    pub fn new() -> Self {
        Defines::default()
    }

    /// Insert `define`, returning the definition it replaced.
    pub fn insert(&mut self, define: Define) -> Option<Define> {
        self.inner.insert(define.key.clone(), define)
    }

    pub fn get(&self, key: &str) -> Option<&Define> {
        self.inner.get(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Define> + '_ {
        self.inner.values()
    }
}

impl Serialize for Defines {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.inner.values())
    }
}

/// Everything a compiler needs to know to understand a single source file.
///
/// Cloning is a deep copy, handing a clone to a caller can never affect the original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileConfig {
    /// User include directories, `-I`.
    pub includes: FilePathSet,
    /// System include directories, `-isystem`.
    pub sys_includes: FilePathSet,
    /// macOS framework directories, `-iframework`.
    pub framework_includes: FilePathSet,
    /// Headers included before the first line of the source, `-include`.
    pub forced_includes: FilePathSet,
    pub defines: Defines,
    pub intellisense_mode: IntelliSenseMode,
    pub standard: LanguageStandard,
    pub compiler_path: Option<FilePath>,
    pub windows_sdk_version: Option<String>,
    /// macOS SDK root, `-isysroot`.
    pub macos_sdk: Option<FilePath>,
}

impl CompileConfig {
    /// An empty configuration.
    pub fn new(standard: LanguageStandard, intellisense_mode: IntelliSenseMode) -> Self {
        CompileConfig {
            includes: FilePathSet::new(),
            sys_includes: FilePathSet::new(),
            framework_includes: FilePathSet::new(),
            forced_includes: FilePathSet::new(),
            defines: Defines::new(),
            intellisense_mode,
            standard,
            compiler_path: None,
            windows_sdk_version: None,
            macos_sdk: None,
        }
    }

    /// Converts this config into the shape an editor's C/C++ integration consumes.
    pub fn to_source_file_configuration(&self) -> SourceFileConfiguration {
        let include_path = self
            .includes
            .iter()
            .chain(self.sys_includes.iter())
            .chain(self.framework_includes.iter())
            .map(|path| path.to_string())
            .collect();

        SourceFileConfiguration {
            include_path,
            defines: self.defines.iter().map(|define| define.to_string()).collect(),
            forced_include: self
                .forced_includes
                .iter()
                .map(|path| path.to_string())
                .collect(),
            standard: self.standard,
            intellisense_mode: self.intellisense_mode,
            compiler_path: self.compiler_path.as_ref().map(|path| path.to_string()),
            windows_sdk_version: self.windows_sdk_version.clone(),
        }
    }
}

/// Per-file configuration in the format of the `vscode-cpptools` custom configuration API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFileConfiguration {
    pub include_path: Vec<String>,
    pub defines: Vec<String>,
    pub forced_include: Vec<String>,
    pub standard: LanguageStandard,
    #[serde(rename = "intelliSenseMode")]
    pub intellisense_mode: IntelliSenseMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiler_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub windows_sdk_version: Option<String>,
}
