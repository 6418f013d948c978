//! Data-driven inventory content and loaders.
//!
//! This crate houses inventory content and provides loaders for RON/TOML data files:
//! - Item catalogs (data-driven via RON)
//! - Pawn and world layouts (data-driven via TOML)
//! - Inventory configuration (data-driven via TOML)
//!
//! Definitions are consumed through `DefinitionOracle` and are never mutated
//! after loading.

pub mod layout;

#[cfg(feature = "loaders")]
pub mod loaders;

pub use layout::{
    ContainerLayout, InventoryLayout, LayoutError, SlotLayout, SourceLayout, StartingItem,
};

#[cfg(feature = "loaders")]
pub use loaders::{ConfigLoader, ContentFactory, ItemCatalog, ItemLoader, LayoutLoader, LoadResult};
