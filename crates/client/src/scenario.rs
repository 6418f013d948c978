//! Demo script played by every client against the shipped content.
use anyhow::{Context, Result};
use inventory_core::{
    ContainerId, DefinitionId, DefinitionOracle, InventorySnapshot, ItemId, SourceId, SourceRef,
    Transaction,
};

const BACKPACK: ContainerId = ContainerId(1);
const BELT_POUCH: ContainerId = ContainerId(2);
const QUIVER: ContainerId = ContainerId(3);
const LOOT_CHEST: SourceId = SourceId(100);

/// Peels a nominal stack of potions into the belt, straps on the shield,
/// splits the arrows, then grabs the chest's sword. Every client runs the
/// same script, so all but one lose the race for the sword.
pub fn demo_script(view: &InventorySnapshot, oracle: &dyn DefinitionOracle) -> Result<Vec<Transaction>> {
    let potions = held(view, oracle, BACKPACK, "health_potion")?;
    let shield = held(view, oracle, BACKPACK, "oak_shield")?;
    let arrows = held(view, oracle, QUIVER, "arrow")?;
    let sword = looted(view, oracle, LOOT_CHEST, "iron_sword")?;

    Ok(vec![
        Transaction::MoveContainerToContainer {
            from: BACKPACK,
            to: BELT_POUCH,
            item: potions,
            full_stack: false,
        },
        Transaction::MoveContainerToSlot {
            from: BACKPACK,
            slot: "OffHand".into(),
            item: shield,
        },
        Transaction::SplitItem {
            container: QUIVER,
            item: arrows,
            amount: 10,
        },
        Transaction::AddItem {
            source: SourceRef::External(LOOT_CHEST),
            container: BACKPACK,
            item: sword,
        },
    ])
}

fn definition(oracle: &dyn DefinitionOracle, name: &str) -> Result<DefinitionId> {
    oracle
        .definition_by_name(name)
        .map(|definition| definition.id)
        .with_context(|| format!("content has no '{name}'"))
}

fn held(
    view: &InventorySnapshot,
    oracle: &dyn DefinitionOracle,
    container: ContainerId,
    name: &str,
) -> Result<ItemId> {
    let definition = definition(oracle, name)?;
    view.containers
        .iter()
        .filter(|snapshot| snapshot.id == container)
        .flat_map(|snapshot| &snapshot.items)
        .find(|record| record.definition == definition)
        .map(|record| record.id)
        .with_context(|| format!("{container} holds no '{name}'"))
}

fn looted(
    view: &InventorySnapshot,
    oracle: &dyn DefinitionOracle,
    source: SourceId,
    name: &str,
) -> Result<ItemId> {
    let definition = definition(oracle, name)?;
    view.sources
        .iter()
        .filter(|snapshot| snapshot.id == source)
        .flat_map(|snapshot| &snapshot.items)
        .find(|record| record.definition == definition)
        .map(|record| record.id)
        .with_context(|| format!("{source} holds no '{name}'"))
}
