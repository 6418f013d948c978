//! Observation feed payloads.
//!
//! These are the only externally visible state-change signals. Entities
//! deliver them through their own [`crate::Observers`] lists; the runtime
//! republishes them on its event bus as [`InventoryEvent`].
use crate::ids::{ContainerId, ItemId};

/// An item's amount changed. Carries both values so observers never need
/// to track previous state themselves.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AmountChanged {
    pub item: ItemId,
    pub new: u32,
    pub previous: u32,
}

/// Container membership delta. Never a full snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContainerChanged {
    pub container: ContainerId,
    pub added: Vec<ItemId>,
    pub removed: Vec<ItemId>,
}

impl ContainerChanged {
    pub fn added(container: ContainerId, item: ItemId) -> Self {
        Self {
            container,
            added: vec![item],
            removed: Vec::new(),
        }
    }

    pub fn removed(container: ContainerId, item: ItemId) -> Self {
        Self {
            container,
            added: Vec::new(),
            removed: vec![item],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SlotChanged {
    pub slot: String,
    pub item: ItemId,
    pub equipped: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AvailabilityChanged {
    pub slot: String,
    pub available: bool,
}

/// Union of every observation payload, for consumers that want one stream.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InventoryEvent {
    Amount(AmountChanged),
    Container(ContainerChanged),
    Slot(SlotChanged),
    Availability(AvailabilityChanged),
}

impl From<AmountChanged> for InventoryEvent {
    fn from(value: AmountChanged) -> Self {
        Self::Amount(value)
    }
}

impl From<ContainerChanged> for InventoryEvent {
    fn from(value: ContainerChanged) -> Self {
        Self::Container(value)
    }
}

impl From<SlotChanged> for InventoryEvent {
    fn from(value: SlotChanged) -> Self {
        Self::Slot(value)
    }
}

impl From<AvailabilityChanged> for InventoryEvent {
    fn from(value: AvailabilityChanged) -> Self {
        Self::Availability(value)
    }
}
