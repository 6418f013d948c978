//! Inventory layout loader.

use std::path::Path;

use crate::layout::InventoryLayout;
use crate::loaders::{LoadResult, read_file};

/// Loader for pawn and world layouts from TOML files.
pub struct LayoutLoader;

impl LayoutLoader {
    pub fn load(path: &Path) -> LoadResult<InventoryLayout> {
        let content = read_file(path)?;
        let layout: InventoryLayout = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse layout TOML {}: {}", path.display(), e))?;

        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory_core::{ContainerId, SourceId};
    use tempfile::TempDir;

    const LAYOUT: &str = r#"
[[containers]]
id = 1
name = "backpack"
tags = ["Consumable", "Loot"]
items = [{ item = "health_potion", amount = 12 }, { item = "gold_coin" }]

[[slots]]
name = "MainHand"
tags = ["Weapon"]
occupant = "iron_sword"

[[slots]]
name = "OffHand"
tags = ["Weapon", "Shield"]
available = false

[[sources]]
id = 100
name = "loot_chest"
tags = ["Loot"]
"#;

    #[test]
    fn parses_layout_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("layout.toml");
        std::fs::write(&path, LAYOUT).unwrap();

        let layout = LayoutLoader::load(&path).unwrap();
        assert_eq!(layout.containers[0].id, ContainerId(1));
        assert_eq!(layout.containers[0].items[1].amount, 1);
        assert!(layout.slots[0].available);
        assert!(!layout.slots[1].available);
        assert_eq!(layout.slots[0].occupant.as_deref(), Some("iron_sword"));
        assert_eq!(layout.source_ids(), vec![SourceId(100)]);
        assert!(layout.sources[0].items.is_empty());
    }
}
