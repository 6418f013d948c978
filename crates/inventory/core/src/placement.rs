//! Outcomes of handing an owned item to a container or slot.
use crate::error::InventoryError;
use crate::ids::ItemId;
use crate::item::ItemInstance;

/// Where an accepted item ended up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Merged into an existing stack; the incoming instance was consumed.
    Stacked(ItemId),
    /// Inserted as its own entry.
    Inserted(ItemId),
}

impl Placement {
    /// Id of the instance that now holds the units.
    pub fn item(&self) -> ItemId {
        match self {
            Placement::Stacked(id) | Placement::Inserted(id) => *id,
        }
    }
}

/// An item that was not accepted, handed back untouched with the reason.
#[derive(Debug)]
pub struct Refused {
    pub item: Box<ItemInstance>,
    pub error: InventoryError,
}

impl Refused {
    pub fn new(item: ItemInstance, error: InventoryError) -> Self {
        Self {
            item: Box::new(item),
            error,
        }
    }

    pub fn into_item(self) -> ItemInstance {
        *self.item
    }

    pub fn into_parts(self) -> (ItemInstance, InventoryError) {
        (*self.item, self.error)
    }
}
