//! Capability interface for anything items can be pulled from or pushed back to.
//!
//! The transaction layer never reaches into a foreign source's internals.
//! It reads through [`ItemSource::item`] to check preconditions and mutates
//! only through `remove_item`, `subtract_or_remove_item` and `leave_item`.
//! Containers and slots implement the capability too, so every transaction
//! that accepts a source accepts any of them.
use std::collections::BTreeMap;
use std::fmt;

use crate::container::{Container, Withdrawal};
use crate::ids::{ContainerId, ItemId, SourceId};
use crate::item::ItemInstance;
use crate::placement::Refused;
use crate::slot::EquipmentSlot;

pub trait ItemSource {
    fn item(&self, id: ItemId) -> Option<&ItemInstance>;

    fn remove_item(&mut self, id: ItemId) -> Option<ItemInstance>;

    /// Takes `amount` units. If the remainder would be zero or less the whole
    /// instance is removed instead and returned as [`Withdrawal::Removed`].
    fn subtract_or_remove_item(&mut self, id: ItemId, amount: u32) -> Option<Withdrawal>;

    /// Puts an instance (usually a remainder) back into the source.
    fn leave_item(&mut self, item: ItemInstance) -> Result<(), Refused>;
}

/// Where a transaction takes an item from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SourceRef {
    Container(ContainerId),
    Slot(String),
    External(SourceId),
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Container(id) => write!(f, "{id}"),
            SourceRef::Slot(name) => write!(f, "slot `{name}`"),
            SourceRef::External(id) => write!(f, "{id}"),
        }
    }
}

/// Resolves external source ids. Supplied by the embedding world.
pub trait SourceProvider {
    fn source(&self, id: SourceId) -> Option<&dyn ItemSource>;

    fn source_mut(&mut self, id: SourceId) -> Option<&mut dyn ItemSource>;

    fn contains_source(&self, id: SourceId) -> bool {
        self.source(id).is_some()
    }
}

/// A world without external sources.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSources;

impl SourceProvider for NoSources {
    fn source(&self, _id: SourceId) -> Option<&dyn ItemSource> {
        None
    }

    fn source_mut(&mut self, _id: SourceId) -> Option<&mut dyn ItemSource> {
        None
    }
}

/// Shared containers that live in the world rather than in any pawn's
/// inventory (loot chests, vendor stock).
#[derive(Debug, Default)]
pub struct WorldSources {
    containers: BTreeMap<SourceId, Container>,
}

impl WorldSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any container already registered under `id`.
    pub fn insert(&mut self, id: SourceId, container: Container) -> Option<Container> {
        self.containers.insert(id, container)
    }

    pub fn remove(&mut self, id: SourceId) -> Option<Container> {
        self.containers.remove(&id)
    }

    pub fn get(&self, id: SourceId) -> Option<&Container> {
        self.containers.get(&id)
    }

    pub fn get_mut(&mut self, id: SourceId) -> Option<&mut Container> {
        self.containers.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SourceId, &Container)> {
        self.containers.iter().map(|(id, container)| (*id, container))
    }

    pub fn ids(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.containers.keys().copied()
    }
}

impl SourceProvider for WorldSources {
    fn source(&self, id: SourceId) -> Option<&dyn ItemSource> {
        self.containers
            .get(&id)
            .map(|container| container as &dyn ItemSource)
    }

    fn source_mut(&mut self, id: SourceId) -> Option<&mut dyn ItemSource> {
        self.containers
            .get_mut(&id)
            .map(|container| container as &mut dyn ItemSource)
    }
}

impl ItemSource for Container {
    fn item(&self, id: ItemId) -> Option<&ItemInstance> {
        Container::item(self, id)
    }

    fn remove_item(&mut self, id: ItemId) -> Option<ItemInstance> {
        Container::remove_item(self, id)
    }

    fn subtract_or_remove_item(&mut self, id: ItemId, amount: u32) -> Option<Withdrawal> {
        self.subtract_or_remove(id, amount)
    }

    fn leave_item(&mut self, item: ItemInstance) -> Result<(), Refused> {
        self.find_available_place(item).map(|_| ())
    }
}

impl ItemSource for EquipmentSlot {
    fn item(&self, id: ItemId) -> Option<&ItemInstance> {
        self.occupant().filter(|item| item.id() == id)
    }

    fn remove_item(&mut self, id: ItemId) -> Option<ItemInstance> {
        if self.occupant().map(ItemInstance::id) != Some(id) {
            return None;
        }
        self.unequip()
    }

    fn subtract_or_remove_item(&mut self, id: ItemId, amount: u32) -> Option<Withdrawal> {
        let held = ItemSource::item(self, id)?.amount();
        if held <= amount {
            return ItemSource::remove_item(self, id).map(Withdrawal::Removed);
        }
        let occupant = self.occupant_mut()?;
        let remaining = occupant.remove_amount(amount);
        Some(Withdrawal::Subtracted { remaining })
    }

    fn leave_item(&mut self, item: ItemInstance) -> Result<(), Refused> {
        self.equip(item).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{DefinitionCatalog, ItemDefinition};
    use crate::ids::DefinitionId;
    use crate::item::ItemFactory;
    use crate::tags::TagSet;

    fn catalog() -> DefinitionCatalog {
        [ItemDefinition::new(DefinitionId(1), "gem", TagSet::from_iter(["Loot"])).stackable(10)]
            .into_iter()
            .collect()
    }

    #[test]
    fn world_sources_resolve_through_the_capability() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut chest = Container::new(ContainerId(90), "chest", TagSet::from_iter(["Loot"]));
        let gem = chest.add_item(factory.spawn(DefinitionId(1), 3).unwrap()).unwrap();

        let mut world = WorldSources::new();
        world.insert(SourceId(1), chest);
        assert!(world.contains_source(SourceId(1)));
        assert!(!world.contains_source(SourceId(2)));

        let source = world.source_mut(SourceId(1)).unwrap();
        assert!(matches!(
            source.subtract_or_remove_item(gem, 1),
            Some(Withdrawal::Subtracted { remaining: 2 })
        ));
        let taken = source.remove_item(gem).unwrap();
        assert_eq!(taken.amount(), 2);
        source.leave_item(taken).unwrap();
        assert_eq!(world.get(SourceId(1)).unwrap().total_units(), 2);
    }

    #[test]
    fn slots_act_as_sources_for_their_occupant_only() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut pouch = EquipmentSlot::new("Pouch", TagSet::from_iter(["Loot"]));
        let gem = pouch.equip(factory.spawn(DefinitionId(1), 4).unwrap()).unwrap();

        assert!(ItemSource::item(&pouch, ItemId(u64::MAX)).is_none());
        assert!(ItemSource::remove_item(&mut pouch, ItemId(u64::MAX)).is_none());
        assert!(matches!(
            pouch.subtract_or_remove_item(gem, 4),
            Some(Withdrawal::Removed(_))
        ));
        assert!(!pouch.is_equipped());
    }
}
