//! The pawn-hosted aggregate a manager operates on.
use tracing::warn;

use crate::container::Container;
use crate::error::InventoryError;
use crate::ids::{ContainerId, ItemId};
use crate::item::ItemInstance;
use crate::slot::{EquipmentSet, EquipmentSlot};

/// Containers plus an equipment set, owned by one pawn.
///
/// Container ids and slot names are unique within an inventory. Only the
/// owning [`crate::InventoryManager`] mutates it during a session.
#[derive(Debug, Default)]
pub struct Inventory {
    containers: Vec<Container>,
    equipment: EquipmentSet,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_equipment(equipment: EquipmentSet) -> Self {
        Self {
            containers: Vec::new(),
            equipment,
        }
    }

    // ===== containers =====

    pub fn add_container(&mut self, container: Container) -> Result<(), InventoryError> {
        if self.container(container.id()).is_some() {
            return Err(InventoryError::DuplicateContainer(container.id()));
        }
        self.containers.push(container);
        Ok(())
    }

    #[must_use]
    /// Builder form of [`Inventory::add_container`]. A duplicate id keeps
    /// the container already present.
    pub fn with_container(mut self, container: Container) -> Self {
        if let Err(err) = self.add_container(container) {
            warn!("ignoring container: {err}");
        }
        self
    }

    pub fn remove_container(&mut self, id: ContainerId) -> Option<Container> {
        let index = self.containers.iter().position(|c| c.id() == id)?;
        Some(self.containers.remove(index))
    }

    pub fn container(&self, id: ContainerId) -> Option<&Container> {
        self.containers.iter().find(|c| c.id() == id)
    }

    pub fn container_mut(&mut self, id: ContainerId) -> Option<&mut Container> {
        self.containers.iter_mut().find(|c| c.id() == id)
    }

    pub fn containers(&self) -> impl Iterator<Item = &Container> {
        self.containers.iter()
    }

    pub fn containers_mut(&mut self) -> impl Iterator<Item = &mut Container> {
        self.containers.iter_mut()
    }

    pub fn container_ids(&self) -> Vec<ContainerId> {
        self.containers.iter().map(Container::id).collect()
    }

    /// Two distinct containers borrowed mutably at once.
    pub fn pair_mut(
        &mut self,
        a: ContainerId,
        b: ContainerId,
    ) -> Option<(&mut Container, &mut Container)> {
        if a == b {
            return None;
        }
        let ia = self.containers.iter().position(|c| c.id() == a)?;
        let ib = self.containers.iter().position(|c| c.id() == b)?;
        if ia < ib {
            let (left, right) = self.containers.split_at_mut(ib);
            Some((&mut left[ia], &mut right[0]))
        } else {
            let (left, right) = self.containers.split_at_mut(ia);
            Some((&mut right[0], &mut left[ib]))
        }
    }

    // ===== equipment =====

    pub fn equipment(&self) -> &EquipmentSet {
        &self.equipment
    }

    pub fn equipment_mut(&mut self) -> &mut EquipmentSet {
        &mut self.equipment
    }

    pub fn add_slot(&mut self, slot: EquipmentSlot) -> Result<(), InventoryError> {
        self.equipment.insert(slot)
    }

    pub fn slot(&self, name: &str) -> Option<&EquipmentSlot> {
        self.equipment.find_slot_by_name(name)
    }

    pub fn slot_mut(&mut self, name: &str) -> Option<&mut EquipmentSlot> {
        self.equipment.find_slot_by_name_mut(name)
    }

    pub fn slot_names(&self) -> Vec<String> {
        self.equipment.slots().map(|s| s.name().to_owned()).collect()
    }

    // ===== queries =====

    /// Finds an item wherever it is held.
    pub fn find_item(&self, id: ItemId) -> Option<&ItemInstance> {
        self.containers
            .iter()
            .find_map(|c| c.item(id))
            .or_else(|| {
                self.equipment
                    .slots()
                    .find_map(|s| s.occupant().filter(|item| item.id() == id))
            })
    }

    /// Units held across every container and slot.
    pub fn total_units(&self) -> u64 {
        let contained: u64 = self.containers.iter().map(Container::total_units).sum();
        let equipped: u64 = self
            .equipment
            .slots()
            .filter_map(EquipmentSlot::occupant)
            .map(|item| u64::from(item.amount()))
            .sum();
        contained + equipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::TagSet;

    #[test]
    fn container_ids_are_unique() {
        let mut inventory = Inventory::new()
            .with_container(Container::new(ContainerId(1), "bag", TagSet::from_iter(["Misc"])))
            .with_container(Container::new(ContainerId(2), "belt", TagSet::from_iter(["Misc"])))
            .with_container(Container::new(ContainerId(2), "shadow", TagSet::new()));
        assert_eq!(inventory.container(ContainerId(2)).map(Container::name), Some("belt"));
        let duplicate = Container::new(ContainerId(1), "again", TagSet::new());
        assert_eq!(
            inventory.add_container(duplicate),
            Err(InventoryError::DuplicateContainer(ContainerId(1)))
        );
        assert_eq!(inventory.container_ids(), vec![ContainerId(1), ContainerId(2)]);

        let (belt, bag) = inventory.pair_mut(ContainerId(2), ContainerId(1)).unwrap();
        assert_eq!(belt.name(), "belt");
        assert_eq!(bag.name(), "bag");
        assert!(inventory.pair_mut(ContainerId(1), ContainerId(1)).is_none());
        assert!(inventory.pair_mut(ContainerId(1), ContainerId(9)).is_none());
    }
}
