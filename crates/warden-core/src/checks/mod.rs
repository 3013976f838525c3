//! Built-in checks

mod config_check;
mod module_enabled;
mod module_known_versions;

pub use config_check::ConfigCheck;
pub use module_enabled::ModuleEnabled;
pub use module_known_versions::{KnownVersionRule, ModuleKnownVersions};

use crate::check::CheckRegistry;
use std::sync::Arc;

/// Register every built-in check
pub fn register_builtins(registry: &mut CheckRegistry) {
    registry.register(Arc::new(ModuleKnownVersions::new()));
    registry.register(Arc::new(ConfigCheck::new()));
    registry.register(Arc::new(ModuleEnabled::new()));
}
