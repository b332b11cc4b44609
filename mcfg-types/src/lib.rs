//! Types used throughout `mcfg`.
//!
//! The goal of this crate is to be very lightweight, so take care with adding dependencies.

mod config;
mod path;

pub use config::{
    CompileConfig, Define, Defines, IntelliSenseMode, LanguageStandard, SourceFileConfiguration,
    SourceLanguage,
};
pub use path::{FilePath, FilePathSet};
