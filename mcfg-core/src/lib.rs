//! Resolving the compiler configuration of source files in a Mozilla style build.
//!
//! A [`Build`] is discovered from the root of a source tree by asking `mach` where the
//! object directory is, reading the top level `autoconf.mk`, and discovering the C and C++
//! compilers it names. After that, the configuration for any source file comes from the
//! flags recorded in the `backend.mk` of its directory.

use mcfg_cfg::ConfigSetBuilder;

pub mod build;
pub mod cfgs;
pub mod mach;

pub use build::{Build, BuildError, BuildState, CompileOutcome};
pub use mcfg_compiler::CompilerContext;

/// Register all of the [`Config`]s used by this crate.
///
/// [`Config`]: mcfg_cfg::Config
pub fn register_configs(builder: &mut ConfigSetBuilder) {
    builder
        .register(&mach::MACH_COMMAND)
        .register(&mach::MACH_ENVIRONMENT);
}
