//! Item catalog loader.

use std::collections::BTreeSet;
use std::path::Path;

use inventory_core::{DefinitionCatalog, ItemDefinition};
use serde::{Deserialize, Serialize};

use crate::loaders::{LoadResult, read_file};

/// Item catalog structure for RON files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemCatalog {
    pub items: Vec<ItemDefinition>,
}

/// Loader for item catalogs from RON files.
pub struct ItemLoader;

impl ItemLoader {
    /// Load item definitions from a RON file.
    ///
    /// Definition ids and script names must both be unique; layouts and
    /// replication look definitions up by one or the other.
    pub fn load(path: &Path) -> LoadResult<Vec<ItemDefinition>> {
        let content = read_file(path)?;
        Self::parse(&content)
            .map_err(|e| anyhow::anyhow!("Failed to load item catalog {}: {}", path.display(), e))
    }

    /// Load a catalog file straight into a [`DefinitionCatalog`].
    pub fn load_catalog(path: &Path) -> LoadResult<DefinitionCatalog> {
        Ok(Self::load(path)?.into_iter().collect())
    }

    fn parse(content: &str) -> LoadResult<Vec<ItemDefinition>> {
        let catalog: ItemCatalog = ron::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse item catalog RON: {}", e))?;

        let mut ids = BTreeSet::new();
        let mut names = BTreeSet::new();
        for item in &catalog.items {
            if !ids.insert(item.id) {
                anyhow::bail!("duplicate definition id {}", item.id.0);
            }
            if !names.insert(item.script_name.as_str()) {
                anyhow::bail!("duplicate script name '{}'", item.script_name);
            }
        }

        Ok(catalog.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory_core::{DefinitionId, DefinitionOracle, Tag};
    use tempfile::TempDir;

    const CATALOG: &str = r#"(
        items: [
            (
                id: (1),
                script_name: "health_potion",
                tags: ["Consumable"],
                stackable: true,
                stack_amount: 5,
                stack_maximum: Some(20),
                additive_attributes: [
                    (tag: "Heal", default: 25.0, min: 0.0, max: 100.0),
                ],
            ),
            (
                id: (2),
                script_name: "iron_sword",
                tags: ["Weapon"],
            ),
        ],
    )"#;

    #[test]
    fn parses_definitions_with_defaults() {
        let items = ItemLoader::parse(CATALOG).unwrap();
        assert_eq!(items.len(), 2);

        let potion = &items[0];
        assert!(potion.stackable);
        assert_eq!(potion.stack_maximum, Some(20));
        assert_eq!(potion.additive_attributes[0].tag, Tag::new("Heal"));

        let sword = &items[1];
        assert!(!sword.stackable);
        assert_eq!(sword.stack_amount, 1);
    }

    #[test]
    fn rejects_duplicate_names() {
        let duplicated = CATALOG.replace("iron_sword", "health_potion");
        let err = ItemLoader::parse(&duplicated).unwrap_err();
        assert!(err.to_string().contains("duplicate script name"));
    }

    #[test]
    fn loads_catalog_from_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("items.ron");
        std::fs::write(&path, CATALOG).unwrap();

        let catalog = ItemLoader::load_catalog(&path).unwrap();
        assert_eq!(
            catalog.definition_by_name("iron_sword").unwrap().id,
            DefinitionId(2)
        );
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = ItemLoader::load(Path::new("/nonexistent/items.ron")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/items.ron"));
    }
}
