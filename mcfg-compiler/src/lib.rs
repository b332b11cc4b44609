//! Talking to the compilers a build uses.
//!
//! A [`Compiler`] is discovered once per language by running the real compiler in a
//! diagnostic mode (see [`defaults`]). After that, resolving the configuration for a file is
//! just folding that file's arguments (see [`args`]) into a copy of what was discovered.

use mcfg_cfg::ConfigSetBuilder;

pub mod args;
mod compiler;
pub mod defaults;

pub use compiler::{
    Compiler, CompilerContext, CompilerError, CompilerFamily, CompilerState, CPP_COMPILER_COMMAND,
    C_COMPILER_COMMAND,
};

/// Register all of the [`Config`]s used by this crate.
///
/// [`Config`]: mcfg_cfg::Config
pub fn register_configs(builder: &mut ConfigSetBuilder) {
    builder
        .register(&C_COMPILER_COMMAND)
        .register(&CPP_COMPILER_COMMAND);
}
