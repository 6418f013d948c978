//! Inventory layouts: the containers and slots every pawn starts with, plus
//! the shared world sources of a session.
//!
//! Layouts reference definitions by script name so data files stay readable.
//! Building a layout resolves those names through a [`DefinitionOracle`].

use inventory_core::{
    Container, ContainerId, DefinitionOracle, EquipmentSlot, Inventory, InventoryError,
    ItemFactory, ItemInstance, SourceId, TagSet, WorldSources,
};
use thiserror::Error;

/// A stack placed into a container or slot when the layout is built.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StartingItem {
    /// Script name of the item definition.
    pub item: String,
    #[cfg_attr(feature = "serde", serde(default = "one"))]
    pub amount: u32,
}

impl StartingItem {
    pub fn new(item: impl Into<String>, amount: u32) -> Self {
        Self {
            item: item.into(),
            amount,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContainerLayout {
    pub id: ContainerId,
    pub name: String,
    pub tags: TagSet,
    #[cfg_attr(feature = "serde", serde(default))]
    pub items: Vec<StartingItem>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SlotLayout {
    pub name: String,
    pub tags: TagSet,
    #[cfg_attr(feature = "serde", serde(default = "yes"))]
    pub available: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub occupant: Option<String>,
}

/// A world source shared by every client (loot chest, vendor stock).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceLayout {
    pub id: SourceId,
    pub name: String,
    pub tags: TagSet,
    #[cfg_attr(feature = "serde", serde(default))]
    pub items: Vec<StartingItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct InventoryLayout {
    pub containers: Vec<ContainerLayout>,
    pub slots: Vec<SlotLayout>,
    pub sources: Vec<SourceLayout>,
}

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("unknown item definition '{0}'")]
    UnknownItem(String),

    #[error("starting stack of '{0}' has no units")]
    EmptyStack(String),

    #[error("slot '{slot}' rejects starting occupant '{item}': {reason}")]
    OccupantRejected {
        slot: String,
        item: String,
        reason: InventoryError,
    },

    #[error(transparent)]
    Inventory(#[from] InventoryError),
}

impl InventoryLayout {
    /// Builds the pawn inventory with its starting items. Inadmissible
    /// container items are logged and dropped by the container.
    pub fn build_inventory(&self, oracle: &dyn DefinitionOracle) -> Result<Inventory, LayoutError> {
        let factory = ItemFactory::new(oracle);
        let mut inventory = self.build_shell()?;

        for spec in &self.containers {
            let items = spawn_all(&factory, &spec.items)?;
            if let Some(container) = inventory.container_mut(spec.id) {
                container.add_starting_data(items);
            }
        }

        for spec in &self.slots {
            let Some(name) = &spec.occupant else {
                continue;
            };
            let item = spawn(&factory, &StartingItem::new(name.clone(), 1))?;
            if let Some(slot) = inventory.slot_mut(&spec.name) {
                slot.equip(item).map_err(|refused| LayoutError::OccupantRejected {
                    slot: spec.name.clone(),
                    item: name.clone(),
                    reason: refused.error,
                })?;
            }
        }

        Ok(inventory)
    }

    /// Builds the containers and slots without any items. Clients start from
    /// the shell and receive their contents through replication.
    pub fn build_shell(&self) -> Result<Inventory, LayoutError> {
        let mut inventory = Inventory::new();
        for spec in &self.containers {
            inventory.add_container(Container::new(spec.id, spec.name.clone(), spec.tags.clone()))?;
        }
        for spec in &self.slots {
            let mut slot = EquipmentSlot::new(spec.name.clone(), spec.tags.clone());
            slot.set_availability(spec.available);
            inventory.add_slot(slot)?;
        }
        Ok(inventory)
    }

    /// Builds the shared world sources with their stock.
    pub fn build_sources(&self, oracle: &dyn DefinitionOracle) -> Result<WorldSources, LayoutError> {
        let factory = ItemFactory::new(oracle);
        let mut world = WorldSources::new();
        for spec in &self.sources {
            let mut stock = source_container(spec);
            stock.add_starting_data(spawn_all(&factory, &spec.items)?);
            world.insert(spec.id, stock);
        }
        Ok(world)
    }

    /// Builds the shared world sources with no stock (client side).
    pub fn build_source_shells(&self) -> WorldSources {
        let mut world = WorldSources::new();
        for spec in &self.sources {
            world.insert(spec.id, source_container(spec));
        }
        world
    }

    pub fn source_ids(&self) -> Vec<SourceId> {
        self.sources.iter().map(|spec| spec.id).collect()
    }
}

fn source_container(spec: &SourceLayout) -> Container {
    Container::new(ContainerId(spec.id.0), spec.name.clone(), spec.tags.clone())
}

fn spawn(factory: &ItemFactory<'_>, spec: &StartingItem) -> Result<ItemInstance, LayoutError> {
    let definition = factory
        .oracle()
        .definition_by_name(&spec.item)
        .ok_or_else(|| LayoutError::UnknownItem(spec.item.clone()))?;
    if spec.amount == 0 {
        return Err(LayoutError::EmptyStack(spec.item.clone()));
    }
    factory
        .spawn(definition.id, spec.amount)
        .ok_or_else(|| LayoutError::UnknownItem(spec.item.clone()))
}

fn spawn_all(factory: &ItemFactory<'_>, specs: &[StartingItem]) -> Result<Vec<ItemInstance>, LayoutError> {
    specs.iter().map(|spec| spawn(factory, spec)).collect()
}

#[cfg(feature = "serde")]
fn one() -> u32 {
    1
}

#[cfg(feature = "serde")]
fn yes() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory_core::{DefinitionCatalog, DefinitionId, ItemDefinition};

    fn catalog() -> DefinitionCatalog {
        [
            ItemDefinition::new(DefinitionId(1), "potion", TagSet::from_iter(["Consumable"])).stackable(5),
            ItemDefinition::new(DefinitionId(2), "sword", TagSet::from_iter(["Weapon"])),
        ]
        .into_iter()
        .collect()
    }

    fn layout() -> InventoryLayout {
        InventoryLayout {
            containers: vec![ContainerLayout {
                id: ContainerId(1),
                name: "backpack".into(),
                tags: TagSet::from_iter(["Consumable"]),
                items: vec![StartingItem::new("potion", 12), StartingItem::new("sword", 1)],
            }],
            slots: vec![SlotLayout {
                name: "MainHand".into(),
                tags: TagSet::from_iter(["Weapon"]),
                available: true,
                occupant: Some("sword".into()),
            }],
            sources: vec![SourceLayout {
                id: SourceId(7),
                name: "chest".into(),
                tags: TagSet::from_iter(["Consumable"]),
                items: vec![StartingItem::new("potion", 3)],
            }],
        }
    }

    #[test]
    fn builds_inventory_and_drops_inadmissible_items() {
        let catalog = catalog();
        let inventory = layout().build_inventory(&catalog).unwrap();

        let backpack = inventory.container(ContainerId(1)).unwrap();
        assert_eq!(backpack.len(), 1);
        assert_eq!(backpack.total_units(), 12);
        assert_eq!(
            inventory.slot("MainHand").unwrap().occupant().unwrap().script_name(),
            "sword"
        );
    }

    #[test]
    fn shells_carry_no_items() {
        let shell = layout().build_shell().unwrap();
        assert_eq!(shell.total_units(), 0);
        assert!(shell.slot("MainHand").unwrap().is_available());

        let world = layout().build_source_shells();
        assert!(world.get(SourceId(7)).unwrap().is_empty());
    }

    #[test]
    fn sources_are_stocked() {
        let catalog = catalog();
        let world = layout().build_sources(&catalog).unwrap();
        assert_eq!(world.get(SourceId(7)).unwrap().total_units(), 3);
    }

    #[test]
    fn unknown_items_fail_the_build() {
        let catalog = catalog();
        let mut layout = layout();
        layout.containers[0].items.push(StartingItem::new("shield", 1));

        let err = layout.build_inventory(&catalog).unwrap_err();
        assert!(matches!(err, LayoutError::UnknownItem(name) if name == "shield"));
    }

    #[test]
    fn rejected_occupant_is_reported() {
        let catalog = catalog();
        let mut layout = layout();
        layout.slots[0].occupant = Some("potion".into());

        let err = layout.build_inventory(&catalog).unwrap_err();
        assert!(matches!(err, LayoutError::OccupantRejected { .. }));
    }

    #[test]
    fn duplicate_containers_are_rejected() {
        let mut layout = layout();
        layout.containers.push(layout.containers[0].clone());
        assert!(matches!(layout.build_shell(), Err(LayoutError::Inventory(_))));
    }
}
