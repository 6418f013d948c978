//! Content factory for building inventories from data files.

use std::path::{Path, PathBuf};

use inventory_core::{DefinitionCatalog, InventoryConfig, ItemDefinition};

use crate::layout::InventoryLayout;
use crate::loaders::{ConfigLoader, ItemLoader, LayoutLoader, LoadResult};

/// Content factory that loads all inventory content from a data directory.
///
/// # Directory Structure
///
/// ```text
/// data_dir/
/// ├── config.toml
/// ├── items.ron
/// └── layout.toml
/// ```
pub struct ContentFactory {
    data_dir: PathBuf,
}

impl ContentFactory {
    /// Creates a new content factory pointing to a data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Load inventory configuration from `config.toml`. A missing file
    /// yields the defaults.
    pub fn load_config(&self) -> LoadResult<InventoryConfig> {
        let path = self.data_dir.join("config.toml");
        if !path.exists() {
            return Ok(InventoryConfig::default());
        }
        ConfigLoader::load(&path)
    }

    /// Load item definitions from `items.ron`.
    pub fn load_items(&self) -> LoadResult<Vec<ItemDefinition>> {
        let path = self.data_dir.join("items.ron");
        ItemLoader::load(&path)
    }

    /// Load `items.ron` into a definition oracle.
    pub fn load_catalog(&self) -> LoadResult<DefinitionCatalog> {
        Ok(self.load_items()?.into_iter().collect())
    }

    /// Load the pawn and world layout from `layout.toml`.
    pub fn load_layout(&self) -> LoadResult<InventoryLayout> {
        let path = self.data_dir.join("layout.toml");
        LayoutLoader::load(&path)
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory_core::{ContainerId, DefinitionOracle};

    fn shipped() -> ContentFactory {
        ContentFactory::new(concat!(env!("CARGO_MANIFEST_DIR"), "/data"))
    }

    #[test]
    fn test_factory_paths() {
        let factory = ContentFactory::new("/tmp/data");
        assert_eq!(factory.data_dir(), Path::new("/tmp/data"));
    }

    #[test]
    fn shipped_content_builds() {
        let factory = shipped();
        let catalog = factory.load_catalog().unwrap();
        let layout = factory.load_layout().unwrap();
        factory.load_config().unwrap();

        for name in ["health_potion", "iron_sword", "oak_shield", "gold_coin"] {
            assert!(catalog.definition_by_name(name).is_some(), "{name} missing");
        }

        let inventory = layout.build_inventory(&catalog).unwrap();
        assert!(inventory.container(ContainerId(1)).unwrap().total_units() > 0);
        assert!(inventory.slot("MainHand").unwrap().is_equipped());

        let world = layout.build_sources(&catalog).unwrap();
        assert!(world.iter().all(|(_, chest)| !chest.is_empty()));
    }

    #[test]
    fn missing_config_uses_defaults() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let factory = ContentFactory::new(temp_dir.path());
        assert_eq!(factory.load_config().unwrap(), InventoryConfig::default());
        assert!(factory.load_items().is_err());
    }
}
