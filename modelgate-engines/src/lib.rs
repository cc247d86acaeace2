//! Modelgate engines - external scan-engine adapters
//!
//! Each adapter invokes its engine as an isolated subprocess with a hard
//! timeout, captures the engine-native output, and maps it onto the unified
//! finding model from `modelgate-core`. Adding an engine means adding an
//! adapter module with its own mapping function; shared logic never branches
//! on engine identity.

pub mod executor;
pub mod modelscan;
pub mod picklescan;

use std::sync::Arc;

use modelgate_core::config::EnginesConfig;
use modelgate_core::domain::engine::ScanEngine;

pub use modelscan::ModelscanEngine;
pub use picklescan::PicklescanEngine;

/// Instantiate every enabled engine from configuration.
pub fn engines_from_config(config: &EnginesConfig) -> Vec<Arc<dyn ScanEngine>> {
    let mut engines: Vec<Arc<dyn ScanEngine>> = Vec::new();
    if config.modelscan.enabled {
        engines.push(Arc::new(ModelscanEngine::new(config.modelscan.clone())));
    }
    if config.picklescan.enabled {
        engines.push(Arc::new(PicklescanEngine::new(config.picklescan.clone())));
    }
    engines
}
