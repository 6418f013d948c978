use crate::ids::{ContainerId, ItemId};

use super::ItemInstance;

/// Lifecycle callbacks attached to an item instance.
///
/// Hooks let gameplay code react to an item's own lifecycle (e.g. a torch
/// that starts burning when equipped). Every method defaults to a no-op.
/// The factory copies a source item's hook onto items generated from it.
pub trait ItemHook: Send + Sync {
    fn on_initialized(&self, _item: &ItemInstance) {}

    fn on_amount_changed(&self, _item: ItemId, _new: u32, _previous: u32) {}

    fn on_added_to_container(&self, _item: ItemId, _container: ContainerId) {}

    fn on_added_to_slot(&self, _item: ItemId, _slot: &str) {}
}
