//! Inventory configuration loader.

use std::path::Path;

use inventory_core::InventoryConfig;

use crate::loaders::{LoadResult, read_file};

/// Loader for inventory configuration from TOML files.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config data from a TOML file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> LoadResult<InventoryConfig> {
        let content = read_file(path)?;
        let config: InventoryConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config TOML: {}", e))?;

        // a zero cap would never ship anything
        let cap = config.max_delta_entries;
        Ok(config.with_max_delta_entries(cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_keys_use_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "enforce_slot_availability = false\n").unwrap();

        let config = ConfigLoader::load(&path).unwrap();
        assert!(!config.enforce_slot_availability);
        assert_eq!(
            config.max_delta_entries,
            InventoryConfig::DEFAULT_MAX_DELTA_ENTRIES
        );
    }

    #[test]
    fn zero_cap_is_raised() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "max_delta_entries = 0\n").unwrap();

        assert_eq!(ConfigLoader::load(&path).unwrap().max_delta_entries, 1);
    }
}
