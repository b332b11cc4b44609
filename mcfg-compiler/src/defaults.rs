//! Parsing the implicit configuration a compiler reports about itself.
//!
//! Run in preprocessor mode with verbose output, Clang-family compilers print their header
//! search list followed by every predefined macro:
//!
//! ```text
//! #include "..." search starts here:
//! #include <...> search starts here:
//!  /usr/lib/clang/17/include
//!  /usr/include
//!  /System/Library/Frameworks (framework directory)
//! End of search list.
//! #define __clang__ 1
//! #define __STDC__ 1
//! ```
//!
//! Anything we don't recognize is skipped.

use mcfg_types::{CompileConfig, Define, Defines, FilePath, FilePathSet};

/// Suffix the compiler appends to search directories that hold macOS frameworks.
pub static FRAMEWORK_MARKER: &str = " (framework directory)";

static INCLUDE_PREFIX: &str = "#include ";
static DEFINE_PREFIX: &str = "#define ";

/// Where [`DefaultsParser`] is within the compiler's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Not inside a search list.
    Outside,
    /// Inside the `#include "..."` search list.
    InsideUserBlock,
    /// Inside the `#include <...>` search list.
    InsideSystemBlock,
}

/// Line-by-line parser for the output of a compiler's diagnostic mode.
#[derive(Debug)]
pub struct DefaultsParser {
    state: ParseState,
    defaults: DiscoveredDefaults,
}

impl Default for DefaultsParser {
    fn default() -> Self {
        DefaultsParser {
            state: ParseState::Outside,
            defaults: DiscoveredDefaults::default(),
        }
    }
}

impl DefaultsParser {
    pub fn new() -> Self {
        DefaultsParser::default()
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Feed a single line of output to the parser.
    pub fn feed(&mut self, line: &str) {
        if self.state != ParseState::Outside {
            if line.starts_with(' ') {
                self.push_search_path(line.trim());
                return;
            }
            // The line ending a block still gets looked at below.
            self.state = ParseState::Outside;
        }

        if let Some(rest) = line.strip_prefix(INCLUDE_PREFIX) {
            self.state = if rest.starts_with('<') {
                ParseState::InsideSystemBlock
            } else {
                ParseState::InsideUserBlock
            };
        } else if let Some(rest) = line.strip_prefix(DEFINE_PREFIX) {
            let rest = rest.trim();
            if !rest.is_empty() {
                self.defaults.defines.insert(Define::parse(rest, ' '));
            }
        }
    }

    /// Consume the parser returning everything it found.
    pub fn finish(self) -> DiscoveredDefaults {
        self.defaults
    }

    fn push_search_path(&mut self, entry: &str) {
        if entry.is_empty() {
            return;
        }
        if let Some(framework) = entry.strip_suffix(FRAMEWORK_MARKER) {
            self.defaults
                .framework_includes
                .insert(FilePath::new(framework));
            return;
        }

        let path = FilePath::new(entry);
        match self.state {
            ParseState::InsideSystemBlock => self.defaults.sys_includes.insert(path),
            ParseState::InsideUserBlock => self.defaults.includes.insert(path),
            ParseState::Outside => unreachable!("search path outside of a block"),
        };
    }
}

/// Search directories and macros a compiler uses without being told to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredDefaults {
    pub includes: FilePathSet,
    pub sys_includes: FilePathSet,
    pub framework_includes: FilePathSet,
    pub defines: Defines,
}

impl DiscoveredDefaults {
    /// Parse every line of a compiler's diagnostic output.
    pub fn parse<I, S>(lines: I) -> DiscoveredDefaults
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parser = DefaultsParser::new();
        for line in lines {
            parser.feed(line.as_ref());
        }
        parser.finish()
    }

    /// Merge these defaults into `config`.
    pub fn apply_to(self, config: &mut CompileConfig) {
        config.includes.extend(self.includes.iter());
        config.sys_includes.extend(self.sys_includes.iter());
        config.framework_includes.extend(self.framework_includes.iter());
        for define in self.defines.iter() {
            config.defines.insert(define.clone());
        }
    }
}
