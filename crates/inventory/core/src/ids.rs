//! Identifier newtypes shared across the inventory model.
//!
//! Item ids and modifier handles are allocated from process-wide monotonic
//! counters and are never reused. Container, source, controller and
//! definition ids are assigned by whoever builds the world.
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_MODIFIER_HANDLE: AtomicU64 = AtomicU64::new(0);

/// Unique identity of one item instance (one stack).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ItemId(pub u64);

impl ItemId {
    /// Allocates the next process-wide item id. The first id handed out is 1.
    pub fn allocate() -> Self {
        Self(NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Ensures later allocations never collide with an id minted elsewhere
    /// (e.g. by the authority and received through replication).
    pub fn reserve_through(id: ItemId) {
        NEXT_ITEM_ID.fetch_max(id.0.saturating_add(1), Ordering::Relaxed);
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

/// Token identifying one applied attribute modifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModifierHandle(pub u64);

impl ModifierHandle {
    /// Allocates the next process-wide handle. The first handle is 0.
    pub fn allocate() -> Self {
        Self(NEXT_MODIFIER_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identity of an item definition (immutable template).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DefinitionId(pub u32);

/// Container identity, unique within one [`crate::Inventory`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContainerId(pub u32);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container#{}", self.0)
    }
}

/// Identity of a foreign item source (vendor, loot chest, world pile).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceId(pub u32);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// Identity of the controller (connection) that owns an inventory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControllerId(pub u32);

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "controller#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_ids_are_monotonic() {
        let a = ItemId::allocate();
        let b = ItemId::allocate();
        assert!(b > a);
        assert!(a.0 >= 1);
    }

    #[test]
    fn reserve_through_skips_foreign_ids() {
        let foreign = ItemId(ItemId::allocate().0 + 1_000);
        ItemId::reserve_through(foreign);
        assert!(ItemId::allocate() > foreign);
    }
}
