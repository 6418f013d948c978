//! Comparable snapshots of inventory state.
//!
//! Snapshots list items in container order with their full replicated
//! records, so two peers holding the same state produce equal snapshots
//! (and, with the `serde` feature, equal digests).
use crate::container::Container;
use crate::ids::{ContainerId, SourceId};
use crate::inventory::Inventory;
use crate::item::ItemRecord;
use crate::source::WorldSources;

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContainerSnapshot {
    pub id: ContainerId,
    pub items: Vec<ItemRecord>,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SlotSnapshot {
    pub name: String,
    pub available: bool,
    pub occupant: Option<ItemRecord>,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceSnapshot {
    pub id: SourceId,
    pub items: Vec<ItemRecord>,
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InventorySnapshot {
    pub containers: Vec<ContainerSnapshot>,
    pub slots: Vec<SlotSnapshot>,
    pub sources: Vec<SourceSnapshot>,
}

impl InventorySnapshot {
    pub fn of(inventory: &Inventory) -> Self {
        let mut containers: Vec<ContainerSnapshot> = inventory
            .containers()
            .map(|container| ContainerSnapshot {
                id: container.id(),
                items: records(container),
            })
            .collect();
        containers.sort_by_key(|snapshot| snapshot.id);

        let mut slots: Vec<SlotSnapshot> = inventory
            .equipment()
            .slots()
            .map(|slot| SlotSnapshot {
                name: slot.name().to_owned(),
                available: slot.is_available(),
                occupant: slot.occupant().map(|item| item.record()),
            })
            .collect();
        slots.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            containers,
            slots,
            sources: Vec::new(),
        }
    }

    /// Adds the listed world sources (missing ids are skipped).
    #[must_use]
    pub fn with_sources(mut self, world: &WorldSources, ids: impl IntoIterator<Item = SourceId>) -> Self {
        for id in ids {
            if let Some(container) = world.get(id) {
                self.sources.push(SourceSnapshot {
                    id,
                    items: records(container),
                });
            }
        }
        self.sources.sort_by_key(|snapshot| snapshot.id);
        self.sources.dedup_by_key(|snapshot| snapshot.id);
        self
    }

    pub fn total_units(&self) -> u64 {
        let held = self
            .containers
            .iter()
            .flat_map(|c| &c.items)
            .chain(self.sources.iter().flat_map(|s| &s.items))
            .chain(self.slots.iter().filter_map(|s| s.occupant.as_ref()));
        held.map(|record| u64::from(record.amount)).sum()
    }

    /// SHA-256 over the bincode encoding of the snapshot.
    #[cfg(feature = "serde")]
    pub fn digest(&self) -> Result<[u8; 32], bincode::Error> {
        use sha2::{Digest, Sha256};

        let bytes = bincode::serialize(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hasher.finalize().into())
    }
}

fn records(container: &Container) -> Vec<ItemRecord> {
    container.items().map(|item| item.record()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{DefinitionCatalog, ItemDefinition};
    use crate::ids::DefinitionId;
    use crate::item::ItemFactory;
    use crate::slot::{EquipmentSet, EquipmentSlot};
    use crate::tags::TagSet;

    fn catalog() -> DefinitionCatalog {
        [ItemDefinition::new(DefinitionId(1), "ore", TagSet::from_iter(["Loot"])).stackable(50)]
            .into_iter()
            .collect()
    }

    fn inventory() -> Inventory {
        Inventory::with_equipment(EquipmentSet::new().with_slot(EquipmentSlot::new("Pack", TagSet::from_iter(["Loot"]))))
            .with_container(Container::new(ContainerId(2), "cart", TagSet::from_iter(["Loot"])))
            .with_container(Container::new(ContainerId(1), "sack", TagSet::from_iter(["Loot"])))
    }

    #[test]
    fn snapshots_are_ordered_by_identity() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut inventory = inventory();
        inventory
            .container_mut(ContainerId(2))
            .unwrap()
            .add_item(factory.spawn(DefinitionId(1), 8).unwrap())
            .unwrap();

        let mut world = WorldSources::new();
        world.insert(SourceId(3), Container::new(ContainerId(90), "heap", TagSet::from_iter(["Loot"])));

        let snapshot = InventorySnapshot::of(&inventory).with_sources(&world, [SourceId(3), SourceId(4), SourceId(3)]);
        let ids: Vec<_> = snapshot.containers.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![ContainerId(1), ContainerId(2)]);
        assert_eq!(snapshot.sources.len(), 1);
        assert_eq!(snapshot.total_units(), 8);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn digests_track_content() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut inventory = inventory();
        let empty = InventorySnapshot::of(&inventory).digest().unwrap();
        assert_eq!(empty, InventorySnapshot::of(&inventory).digest().unwrap());

        inventory
            .container_mut(ContainerId(1))
            .unwrap()
            .add_item(factory.spawn(DefinitionId(1), 1).unwrap())
            .unwrap();
        let filled = InventorySnapshot::of(&inventory).digest().unwrap();
        assert_ne!(hex::encode(empty), hex::encode(filled));
    }
}
