use std::collections::BTreeMap;
use std::sync::Arc;

use super::{DefinitionOracle, ItemDefinition};
use crate::ids::DefinitionId;

/// In-memory [`DefinitionOracle`] keyed by definition id.
#[derive(Clone, Debug, Default)]
pub struct DefinitionCatalog {
    definitions: BTreeMap<DefinitionId, Arc<ItemDefinition>>,
}

impl DefinitionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a definition, replacing any previous one with the same id.
    pub fn insert(&mut self, definition: ItemDefinition) -> Arc<ItemDefinition> {
        let definition = Arc::new(definition);
        self.definitions
            .insert(definition.id, Arc::clone(&definition));
        definition
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl FromIterator<ItemDefinition> for DefinitionCatalog {
    fn from_iter<I: IntoIterator<Item = ItemDefinition>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for definition in iter {
            catalog.insert(definition);
        }
        catalog
    }
}

impl DefinitionOracle for DefinitionCatalog {
    fn definition(&self, id: DefinitionId) -> Option<Arc<ItemDefinition>> {
        self.definitions.get(&id).cloned()
    }

    fn all_definitions(&self) -> Vec<Arc<ItemDefinition>> {
        self.definitions.values().cloned().collect()
    }
}
