//! Single interface for registering all of the [`Config`]s for the entire engine.
//!
//! [`Config`]: mcfg_cfg::Config

use mcfg_cfg::ConfigSetBuilder;

pub fn all_cfgs(builder: &mut ConfigSetBuilder) {
    crate::register_configs(builder);
    mcfg_compiler::register_configs(builder);
}
