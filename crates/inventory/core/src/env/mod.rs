//! Read-only definition data.
//!
//! Item definitions are immutable templates supplied by content. The core
//! only reads them through [`DefinitionOracle`], so lookups must be
//! idempotent and side-effect-free.
mod catalog;
mod definition;

pub use catalog::DefinitionCatalog;
pub use definition::{AttributeSet, ComponentState, ItemDefinition};

use std::sync::Arc;

use crate::ids::DefinitionId;

pub trait DefinitionOracle: Send + Sync {
    fn definition(&self, id: DefinitionId) -> Option<Arc<ItemDefinition>>;

    /// Returns every definition known to this oracle, ordered by id.
    fn all_definitions(&self) -> Vec<Arc<ItemDefinition>>;

    fn definition_by_name(&self, script_name: &str) -> Option<Arc<ItemDefinition>> {
        self.all_definitions()
            .into_iter()
            .find(|def| def.script_name == script_name)
    }
}
