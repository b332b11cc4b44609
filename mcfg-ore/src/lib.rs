//! Small utilities shared by every `mcfg` crate.
//!
//! Nothing in here should know about compilers or builds.

pub mod env;
pub mod shell;
