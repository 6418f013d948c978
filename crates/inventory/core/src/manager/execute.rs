//! Transaction execution against local state.
//!
//! Both the authority and a predicting client run these functions. Each one
//! checks every state-dependent precondition through read-only lookups
//! first and mutates second, so an `Err` always means nothing changed.

use tracing::warn;

use crate::config::InventoryConfig;
use crate::container::{Container, Withdrawal};
use crate::error::InventoryError;
use crate::ids::{ContainerId, ItemId};
use crate::inventory::Inventory;
use crate::item::{ItemFactory, ItemInstance};
use crate::slot::EquipmentSlot;
use crate::source::{ItemSource, SourceProvider, SourceRef};

use super::moves;
use super::{Applied, Transaction};

/// Everything a transaction may touch while it executes.
pub struct ExecutionContext<'a> {
    pub inventory: &'a mut Inventory,
    pub sources: &'a mut dyn SourceProvider,
    pub factory: ItemFactory<'a>,
    pub config: &'a InventoryConfig,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        inventory: &'a mut Inventory,
        sources: &'a mut dyn SourceProvider,
        factory: ItemFactory<'a>,
        config: &'a InventoryConfig,
    ) -> Self {
        Self {
            inventory,
            sources,
            factory,
            config,
        }
    }

    pub(super) fn container(&self, id: ContainerId) -> Result<&Container, InventoryError> {
        self.inventory
            .container(id)
            .ok_or(InventoryError::UnknownContainer(id))
    }

    pub(super) fn slot(&self, name: &str) -> Result<&EquipmentSlot, InventoryError> {
        self.inventory
            .slot(name)
            .ok_or_else(|| InventoryError::UnknownSlot(name.to_owned()))
    }

    /// Read-only lookup of an item in any source.
    pub(super) fn peek(&self, source: &SourceRef, item: ItemId) -> Result<&ItemInstance, InventoryError> {
        let found = match source {
            SourceRef::Container(id) => self.container(*id)?.item(item),
            SourceRef::Slot(name) => ItemSource::item(self.slot(name)?, item),
            SourceRef::External(id) => self
                .sources
                .source(*id)
                .ok_or(InventoryError::UnknownSource(*id))?
                .item(item),
        };
        found.ok_or(InventoryError::ItemMissing { item })
    }

    fn source_mut(&mut self, source: &SourceRef) -> Result<&mut dyn ItemSource, InventoryError> {
        match source {
            SourceRef::Container(id) => self
                .inventory
                .container_mut(*id)
                .map(|container| container as &mut dyn ItemSource)
                .ok_or(InventoryError::UnknownContainer(*id)),
            SourceRef::Slot(name) => self
                .inventory
                .slot_mut(name)
                .map(|slot| slot as &mut dyn ItemSource)
                .ok_or_else(|| InventoryError::UnknownSlot(name.clone())),
            SourceRef::External(id) => self
                .sources
                .source_mut(*id)
                .ok_or(InventoryError::UnknownSource(*id)),
        }
    }

    /// Takes ownership of a whole item out of `source`.
    pub(super) fn take(&mut self, source: &SourceRef, item: ItemId) -> Result<ItemInstance, InventoryError> {
        self.source_mut(source)?
            .remove_item(item)
            .ok_or(InventoryError::ItemMissing { item })
    }

    /// Takes `amount` units of `item` out of `source`. A larger stack stays
    /// behind with the rest and the taken units come back as a new instance.
    pub(super) fn take_units(
        &mut self,
        source: &SourceRef,
        item: ItemId,
        amount: u32,
    ) -> Result<ItemInstance, InventoryError> {
        let held = self.peek(source, item)?;
        let piece = if held.amount() > amount {
            let mut piece = self
                .factory
                .generate_item(Some(held))
                .ok_or(InventoryError::DefinitionUnavailable(held.definition_id()))?;
            piece.set_amount(amount);
            Some(piece)
        } else {
            None
        };

        match self.source_mut(source)?.subtract_or_remove_item(item, amount) {
            Some(Withdrawal::Removed(whole)) => Ok(whole),
            Some(Withdrawal::Subtracted { .. }) => piece.ok_or(InventoryError::ItemMissing { item }),
            None => Err(InventoryError::ItemMissing { item }),
        }
    }

    /// Returns an item to the source it was taken from.
    pub(super) fn give_back(&mut self, source: &SourceRef, item: ItemInstance) {
        let id = item.id();
        match self.source_mut(source) {
            Ok(origin) => {
                if let Err(refused) = origin.leave_item(item) {
                    warn!(item = %id, %source, "source refused returned item: {}", refused.error);
                }
            }
            Err(error) => warn!(item = %id, %source, "cannot return item: {error}"),
        }
    }
}

pub(super) fn execute(tx: &Transaction, ctx: &mut ExecutionContext<'_>) -> Result<Applied, InventoryError> {
    match tx {
        Transaction::AddItem {
            source,
            container,
            item,
        } => add_item(ctx, source, *container, *item),
        Transaction::RemoveItem { container, item } => remove_item(ctx, *container, *item),
        Transaction::StackItem {
            source,
            container,
            item,
            target,
        } => stack_item(ctx, source, *container, *item, *target),
        Transaction::SplitItem {
            container,
            item,
            amount,
        } => split_item(ctx, *container, *item, *amount),
        Transaction::Equip { source, slot, item } => equip(ctx, source, slot, *item),
        Transaction::Unequip { slot } => unequip(ctx, slot),
        Transaction::MoveContainerToContainer {
            from,
            to,
            item,
            full_stack,
        } => moves::container_to_container(ctx, *from, *to, *item, *full_stack),
        Transaction::MoveContainerToSlot { from, slot, item } => {
            moves::container_to_slot(ctx, *from, slot, *item)
        }
        Transaction::MoveSlotToContainer { slot, to } => moves::slot_to_container(ctx, slot, *to),
        Transaction::MoveSlotToSlot { from, to } => moves::slot_to_slot(ctx, from, to),
    }
}

/// Slot admission as seen by the transaction layer: availability (when
/// enforced), emptiness, then tags.
pub(super) fn ensure_equippable(
    slot: &EquipmentSlot,
    item: &ItemInstance,
    config: &InventoryConfig,
) -> Result<(), InventoryError> {
    if config.enforce_slot_availability && !slot.is_available() {
        return Err(InventoryError::SlotUnavailable {
            slot: slot.name().to_owned(),
        });
    }
    if slot.is_equipped() {
        return Err(InventoryError::SlotOccupied {
            slot: slot.name().to_owned(),
        });
    }
    if !slot.can_equip_item(item) {
        return Err(InventoryError::NotAdmitted { item: item.id() });
    }
    Ok(())
}

fn add_item(
    ctx: &mut ExecutionContext<'_>,
    source: &SourceRef,
    container: ContainerId,
    item: ItemId,
) -> Result<Applied, InventoryError> {
    let incoming = ctx.peek(source, item)?;
    if !ctx.container(container)?.has_place_for(incoming) {
        return Err(InventoryError::NotAdmitted { item });
    }

    let taken = ctx.take(source, item)?;
    let placed = match ctx.inventory.container_mut(container) {
        Some(destination) => destination.find_available_place(taken),
        None => {
            ctx.give_back(source, taken);
            return Err(InventoryError::UnknownContainer(container));
        }
    };
    match placed {
        Ok(placement) => Ok(Applied::item(placement.item())),
        Err(refused) => {
            let (taken, error) = refused.into_parts();
            ctx.give_back(source, taken);
            Err(error)
        }
    }
}

fn remove_item(
    ctx: &mut ExecutionContext<'_>,
    container: ContainerId,
    item: ItemId,
) -> Result<Applied, InventoryError> {
    ctx.inventory
        .container_mut(container)
        .ok_or(InventoryError::UnknownContainer(container))?
        .remove_item(item)
        .ok_or(InventoryError::ItemMissing { item })?;
    Ok(Applied::nothing())
}

fn stack_item(
    ctx: &mut ExecutionContext<'_>,
    source: &SourceRef,
    container: ContainerId,
    item: ItemId,
    target: ItemId,
) -> Result<Applied, InventoryError> {
    let incoming = ctx.peek(source, item)?;
    let existing = ctx
        .container(container)?
        .item(target)
        .ok_or(InventoryError::ItemMissing { item: target })?;
    if !existing.can_stack_with(incoming) {
        return Err(InventoryError::NotStackable { item, target });
    }

    let taken = ctx.take(source, item)?;
    let stacked = match ctx.inventory.container_mut(container) {
        Some(destination) => destination.stack_item(taken, target),
        None => {
            ctx.give_back(source, taken);
            return Err(InventoryError::UnknownContainer(container));
        }
    };
    match stacked {
        Ok(id) => Ok(Applied::item(id)),
        Err(refused) => {
            let (taken, error) = refused.into_parts();
            ctx.give_back(source, taken);
            Err(error)
        }
    }
}

fn split_item(
    ctx: &mut ExecutionContext<'_>,
    container: ContainerId,
    item: ItemId,
    amount: u32,
) -> Result<Applied, InventoryError> {
    let factory = ctx.factory;
    let piece = ctx
        .inventory
        .container_mut(container)
        .ok_or(InventoryError::UnknownContainer(container))?
        .split_item(item, amount, &factory)?;
    Ok(Applied::item(piece))
}

fn equip(
    ctx: &mut ExecutionContext<'_>,
    source: &SourceRef,
    slot: &str,
    item: ItemId,
) -> Result<Applied, InventoryError> {
    let incoming = ctx.peek(source, item)?;
    ensure_equippable(ctx.slot(slot)?, incoming, ctx.config)?;

    let taken = ctx.take_units(source, item, 1)?;
    let equipped = match ctx.inventory.slot_mut(slot) {
        Some(destination) => destination.equip(taken),
        None => {
            ctx.give_back(source, taken);
            return Err(InventoryError::UnknownSlot(slot.to_owned()));
        }
    };
    match equipped {
        Ok(id) => Ok(Applied::item(id)),
        Err(refused) => {
            let (taken, error) = refused.into_parts();
            ctx.give_back(source, taken);
            Err(error)
        }
    }
}

fn unequip(ctx: &mut ExecutionContext<'_>, slot: &str) -> Result<Applied, InventoryError> {
    ctx.inventory
        .slot_mut(slot)
        .ok_or_else(|| InventoryError::UnknownSlot(slot.to_owned()))?
        .unequip()
        .ok_or_else(|| InventoryError::SlotEmpty {
            slot: slot.to_owned(),
        })?;
    Ok(Applied::nothing())
}
