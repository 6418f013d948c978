//! Structural validation of transactions.
//!
//! Checks only what holds regardless of current item state: every
//! referenced container, slot and source exists, amounts are positive and
//! endpoints differ. State-dependent preconditions (item present, slot
//! empty, stack matching) belong to execution, which checks them before
//! mutating anything.

use crate::error::InventoryError;
use crate::ids::ContainerId;
use crate::inventory::Inventory;
use crate::source::{SourceProvider, SourceRef};

use super::Transaction;

pub(super) fn validate(
    tx: &Transaction,
    inventory: &Inventory,
    sources: &dyn SourceProvider,
) -> Result<(), InventoryError> {
    match tx {
        Transaction::AddItem {
            source, container, ..
        } => {
            known_source(source, inventory, sources)?;
            known_container(*container, inventory)?;
            if *source == SourceRef::Container(*container) {
                return Err(InventoryError::SameEndpoint);
            }
        }
        Transaction::RemoveItem { container, .. } => known_container(*container, inventory)?,
        Transaction::StackItem {
            source,
            container,
            item,
            target,
        } => {
            known_source(source, inventory, sources)?;
            known_container(*container, inventory)?;
            if item == target {
                return Err(InventoryError::SameEndpoint);
            }
        }
        Transaction::SplitItem {
            container, amount, ..
        } => {
            known_container(*container, inventory)?;
            if *amount == 0 {
                return Err(InventoryError::ZeroAmount);
            }
        }
        Transaction::Equip { source, slot, .. } => {
            known_source(source, inventory, sources)?;
            known_slot(slot, inventory)?;
            if *source == SourceRef::Slot(slot.clone()) {
                return Err(InventoryError::SameEndpoint);
            }
        }
        Transaction::Unequip { slot } => known_slot(slot, inventory)?,
        Transaction::MoveContainerToContainer { from, to, .. } => {
            known_container(*from, inventory)?;
            known_container(*to, inventory)?;
            if from == to {
                return Err(InventoryError::SameEndpoint);
            }
        }
        Transaction::MoveContainerToSlot { from, slot, .. } => {
            known_container(*from, inventory)?;
            known_slot(slot, inventory)?;
        }
        Transaction::MoveSlotToContainer { slot, to } => {
            known_slot(slot, inventory)?;
            known_container(*to, inventory)?;
        }
        Transaction::MoveSlotToSlot { from, to } => {
            known_slot(from, inventory)?;
            known_slot(to, inventory)?;
            if from == to {
                return Err(InventoryError::SameEndpoint);
            }
        }
    }
    Ok(())
}

fn known_container(id: ContainerId, inventory: &Inventory) -> Result<(), InventoryError> {
    inventory
        .container(id)
        .map(|_| ())
        .ok_or(InventoryError::UnknownContainer(id))
}

fn known_slot(name: &str, inventory: &Inventory) -> Result<(), InventoryError> {
    inventory
        .slot(name)
        .map(|_| ())
        .ok_or_else(|| InventoryError::UnknownSlot(name.to_owned()))
}

fn known_source(
    source: &SourceRef,
    inventory: &Inventory,
    sources: &dyn SourceProvider,
) -> Result<(), InventoryError> {
    match source {
        SourceRef::Container(id) => known_container(*id, inventory),
        SourceRef::Slot(name) => known_slot(name, inventory),
        SourceRef::External(id) if sources.contains_source(*id) => Ok(()),
        SourceRef::External(id) => Err(InventoryError::UnknownSource(*id)),
    }
}
