//! Compound moves between containers and slots.
//!
//! Each move resolves every precondition (admission, occupancy, merge
//! target, factory allocation) before the first mutation. The fallback
//! branches after a mutation only run if a container or slot disagrees with
//! its own predicate, and they put everything back.

use tracing::warn;

use crate::error::InventoryError;
use crate::ids::{ContainerId, ItemId};
use crate::item::ItemInstance;
use crate::slot::EquipmentSlot;

use super::execute::{ExecutionContext, ensure_equippable};
use super::Applied;

/// Container→container. Whole stacks (or stacks no larger than the nominal
/// size) move with the standard placement rule. Larger stacks give up one
/// nominal stack, merged into the first matching destination stack or
/// materialized as a new instance.
pub(super) fn container_to_container(
    ctx: &mut ExecutionContext<'_>,
    from: ContainerId,
    to: ContainerId,
    item: ItemId,
    full_stack: bool,
) -> Result<Applied, InventoryError> {
    let source_item = ctx
        .container(from)?
        .item(item)
        .ok_or(InventoryError::ItemMissing { item })?;
    let nominal = source_item.stack_amount().max(1);
    if full_stack || source_item.amount() <= nominal {
        move_whole(ctx, from, to, item)
    } else {
        move_nominal(ctx, from, to, item, nominal)
    }
}

fn move_whole(
    ctx: &mut ExecutionContext<'_>,
    from: ContainerId,
    to: ContainerId,
    item: ItemId,
) -> Result<Applied, InventoryError> {
    let incoming = ctx
        .container(from)?
        .item(item)
        .ok_or(InventoryError::ItemMissing { item })?;
    if !ctx.container(to)?.has_place_for(incoming) {
        return Err(InventoryError::NotAdmitted { item });
    }

    let (source, destination) = ctx
        .inventory
        .pair_mut(from, to)
        .ok_or(InventoryError::SameEndpoint)?;
    let taken = source
        .remove_item(item)
        .ok_or(InventoryError::ItemMissing { item })?;
    match destination.find_available_place(taken) {
        Ok(placement) => Ok(Applied::item(placement.item())),
        Err(refused) => {
            let (taken, error) = refused.into_parts();
            if let Err(lost) = source.find_available_place(taken) {
                warn!(item = %item, container = %from, "cannot restore moved item: {}", lost.error);
            }
            Err(error)
        }
    }
}

fn move_nominal(
    ctx: &mut ExecutionContext<'_>,
    from: ContainerId,
    to: ContainerId,
    item: ItemId,
    nominal: u32,
) -> Result<Applied, InventoryError> {
    let factory = ctx.factory;
    let (merge_target, piece) = {
        let source_item = ctx
            .container(from)?
            .item(item)
            .ok_or(InventoryError::ItemMissing { item })?;
        let destination = ctx.container(to)?;
        match destination.find_first_stack_for_item(source_item) {
            Some(target) => (Some(target), None),
            None => {
                if !destination.can_add_item(source_item) {
                    return Err(InventoryError::NotAdmitted { item });
                }
                let mut piece = factory
                    .generate_item(Some(source_item))
                    .ok_or(InventoryError::DefinitionUnavailable(source_item.definition_id()))?;
                piece.set_amount(nominal);
                (None, Some(piece))
            }
        }
    };

    let (source, destination) = ctx
        .inventory
        .pair_mut(from, to)
        .ok_or(InventoryError::SameEndpoint)?;
    source.remove_amount(item, nominal)?;

    let placed = match (merge_target, piece) {
        (Some(target), _) => destination.add_amount(target, nominal).map(|_| target),
        (None, Some(piece)) => destination.add_item(piece).map_err(|refused| refused.error),
        (None, None) => Err(InventoryError::ItemMissing { item }),
    };
    if placed.is_err() && source.add_amount(item, nominal).is_err() {
        warn!(item = %item, container = %from, "cannot restore peeled units");
    }
    placed.map(Applied::item)
}

/// Container→slot. The slot is checked first; a stack of more than one
/// leaves its surplus behind as a new stack and exactly one unit is equipped.
pub(super) fn container_to_slot(
    ctx: &mut ExecutionContext<'_>,
    from: ContainerId,
    slot: &str,
    item: ItemId,
) -> Result<Applied, InventoryError> {
    let factory = ctx.factory;
    let candidate = ctx
        .container(from)?
        .item(item)
        .ok_or(InventoryError::ItemMissing { item })?;
    ensure_equippable(ctx.slot(slot)?, candidate, ctx.config)?;
    let amount = candidate.amount();

    let container = ctx
        .inventory
        .container_mut(from)
        .ok_or(InventoryError::UnknownContainer(from))?;
    if amount > 1 {
        container.split_item(item, amount - 1, &factory)?;
    }
    let single = container
        .remove_item(item)
        .ok_or(InventoryError::ItemMissing { item })?;

    let equipped = match ctx.inventory.slot_mut(slot) {
        Some(destination) => destination.equip(single).map_err(|refused| refused.into_parts()),
        None => Err((single, InventoryError::UnknownSlot(slot.to_owned()))),
    };
    match equipped {
        Ok(id) => Ok(Applied::item(id)),
        Err((single, error)) => {
            restore_to_container(ctx, from, single);
            Err(error)
        }
    }
}

/// Slot→container with the standard placement rule.
pub(super) fn slot_to_container(
    ctx: &mut ExecutionContext<'_>,
    slot: &str,
    to: ContainerId,
) -> Result<Applied, InventoryError> {
    let occupant = ctx
        .slot(slot)?
        .occupant()
        .ok_or_else(|| InventoryError::SlotEmpty {
            slot: slot.to_owned(),
        })?;
    if !ctx.container(to)?.has_place_for(occupant) {
        return Err(InventoryError::NotAdmitted {
            item: occupant.id(),
        });
    }

    let origin = ctx
        .inventory
        .slot_mut(slot)
        .ok_or_else(|| InventoryError::UnknownSlot(slot.to_owned()))?;
    let moved = origin.unequip().ok_or_else(|| InventoryError::SlotEmpty {
        slot: slot.to_owned(),
    })?;

    let placed = match ctx.inventory.container_mut(to) {
        Some(destination) => destination.find_available_place(moved).map_err(|refused| refused.into_parts()),
        None => Err((moved, InventoryError::UnknownContainer(to))),
    };
    match placed {
        Ok(placement) => Ok(Applied::item(placement.item())),
        Err((moved, error)) => {
            if let Some(origin) = ctx.inventory.slot_mut(slot) {
                restore_to_slot(origin, moved);
            }
            Err(error)
        }
    }
}

/// Slot→slot. An occupied destination swaps its occupant into the origin.
pub(super) fn slot_to_slot(
    ctx: &mut ExecutionContext<'_>,
    from: &str,
    to: &str,
) -> Result<Applied, InventoryError> {
    let enforce = ctx.config.enforce_slot_availability;
    let origin = ctx.slot(from)?;
    let destination = ctx.slot(to)?;
    let moved = origin.occupant().ok_or_else(|| InventoryError::SlotEmpty {
        slot: from.to_owned(),
    })?;
    if enforce && !destination.is_available() {
        return Err(InventoryError::SlotUnavailable { slot: to.to_owned() });
    }
    if !destination.can_equip_item(moved) {
        return Err(InventoryError::NotAdmitted { item: moved.id() });
    }
    if let Some(displaced) = destination.occupant() {
        if enforce && !origin.is_available() {
            return Err(InventoryError::SlotUnavailable {
                slot: from.to_owned(),
            });
        }
        if !origin.can_equip_item(displaced) {
            return Err(InventoryError::NotAdmitted {
                item: displaced.id(),
            });
        }
    }

    let (origin, destination) = ctx
        .inventory
        .equipment_mut()
        .pair_mut(from, to)
        .ok_or(InventoryError::SameEndpoint)?;
    let moved = origin.unequip().ok_or_else(|| InventoryError::SlotEmpty {
        slot: from.to_owned(),
    })?;

    if let Some(displaced) = destination.unequip() {
        if let Err(refused) = origin.equip(displaced) {
            let (displaced, error) = refused.into_parts();
            restore_to_slot(destination, displaced);
            restore_to_slot(origin, moved);
            return Err(error);
        }
    }

    match destination.equip(moved) {
        Ok(id) => Ok(Applied::item(id)),
        Err(refused) => {
            let (moved, error) = refused.into_parts();
            if let Some(displaced) = origin.unequip() {
                restore_to_slot(destination, displaced);
            }
            restore_to_slot(origin, moved);
            Err(error)
        }
    }
}

fn restore_to_slot(slot: &mut EquipmentSlot, item: ItemInstance) {
    if let Err(refused) = slot.equip(item) {
        warn!(slot = slot.name(), item = %refused.item.id(), "cannot restore occupant: {}", refused.error);
    }
}

fn restore_to_container(ctx: &mut ExecutionContext<'_>, container: ContainerId, item: ItemInstance) {
    let id = item.id();
    match ctx.inventory.container_mut(container) {
        Some(origin) => {
            if let Err(refused) = origin.find_available_place(item) {
                warn!(item = %id, %container, "cannot restore item: {}", refused.error);
            }
        }
        None => warn!(item = %id, %container, "cannot restore item into missing container"),
    }
}
