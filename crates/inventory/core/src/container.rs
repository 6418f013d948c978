//! Ordered item containers with tag-based admission and stacking.
//!
//! A [`Container`] exclusively owns the instances it lists. Every mutating
//! method checks first and acts second; a method that returns an error or a
//! [`Refused`] leaves the container exactly as it was.
use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::InventoryError;
use crate::events::{AmountChanged, ContainerChanged};
use crate::ids::{ContainerId, DefinitionId, ItemId};
use crate::item::{ItemFactory, ItemInstance, ItemRecord};
use crate::observe::{ObserverId, Observers};
use crate::placement::{Placement, Refused};
use crate::tags::TagSet;

/// Result of pulling units out of a container.
#[derive(Debug)]
pub enum Withdrawal {
    /// Units were subtracted; the instance stays with `remaining` units.
    Subtracted { remaining: u32 },
    /// The whole instance was taken out.
    Removed(ItemInstance),
}

#[derive(Debug)]
struct Entry {
    order: u64,
    item: ItemInstance,
}

#[derive(Debug)]
pub struct Container {
    id: ContainerId,
    name: String,
    tags: TagSet,
    entries: Vec<Entry>,
    next_order: u64,
    observers: Observers<ContainerChanged>,
    amount_observers: Observers<AmountChanged>,
}

impl Container {
    pub fn new(id: ContainerId, name: impl Into<String>, tags: TagSet) -> Self {
        Self {
            id,
            name: name.into(),
            tags,
            entries: Vec::new(),
            next_order: 0,
            observers: Observers::new(),
            amount_observers: Observers::new(),
        }
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item = &ItemInstance> {
        self.entries.iter().map(|entry| &entry.item)
    }

    /// Items paired with their insertion order numbers.
    pub fn ordered_items(&self) -> impl Iterator<Item = (u64, &ItemInstance)> {
        self.entries.iter().map(|entry| (entry.order, &entry.item))
    }

    pub fn item(&self, id: ItemId) -> Option<&ItemInstance> {
        self.entries
            .iter()
            .find(|entry| entry.item.id() == id)
            .map(|entry| &entry.item)
    }

    /// Mutable access for attribute and component changes. Amounts must go
    /// through [`Container::set_amount`] and friends so zero-amount items are evicted.
    pub fn with_item_mut<R>(&mut self, id: ItemId, f: impl FnOnce(&mut ItemInstance) -> R) -> Option<R> {
        let index = self.index_of(id)?;
        let item = &mut self.entries[index].item;
        let before = item.amount();
        let result = f(item);
        let after = item.amount();
        if after != before {
            self.after_amount_change(index, after, before);
        }
        Some(result)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.index_of(id).is_some()
    }

    /// Total units held across all entries.
    pub fn total_units(&self) -> u64 {
        self.items().map(|item| u64::from(item.amount())).sum()
    }

    pub fn total_amount_of(&self, definition: DefinitionId) -> u64 {
        self.items()
            .filter(|item| item.definition_id() == definition)
            .map(|item| u64::from(item.amount()))
            .sum()
    }

    // ===== queries =====

    pub fn can_add_item(&self, item: &ItemInstance) -> bool {
        item.tags().intersects(&self.tags)
    }

    /// First contained instance that can absorb `item`. Deterministic:
    /// scan order is insertion order and the first match wins.
    pub fn find_first_stack_for_item(&self, item: &ItemInstance) -> Option<ItemId> {
        self.items()
            .find(|existing| existing.can_stack_with(item))
            .map(ItemInstance::id)
    }

    pub fn find_item_by_definition(&self, definition: DefinitionId) -> Option<&ItemInstance> {
        self.items().find(|item| item.definition_id() == definition)
    }

    pub fn find_item_by_name(&self, script_name: &str) -> Option<&ItemInstance> {
        self.items().find(|item| item.script_name() == script_name)
    }

    /// True when [`Container::find_available_place`] would accept `item`.
    pub fn has_place_for(&self, item: &ItemInstance) -> bool {
        self.find_first_stack_for_item(item).is_some() || self.can_add_item(item)
    }

    // ===== membership =====

    /// Merge into the first matching stack, else insert, else hand the item back.
    pub fn find_available_place(&mut self, item: ItemInstance) -> Result<Placement, Refused> {
        if let Some(target) = self.find_first_stack_for_item(&item) {
            return self.stack_item(item, target).map(Placement::Stacked);
        }
        self.add_item(item).map(Placement::Inserted)
    }

    /// Inserts as a new entry (no merging). Requires admission.
    pub fn add_item(&mut self, item: ItemInstance) -> Result<ItemId, Refused> {
        if !self.can_add_item(&item) {
            let error = InventoryError::NotAdmitted { item: item.id() };
            return Err(Refused::new(item, error));
        }
        if self.contains(item.id()) {
            let error = InventoryError::NotAdmitted { item: item.id() };
            return Err(Refused::new(item, error));
        }
        let id = self.insert_unchecked(item);
        self.observers.notify(&ContainerChanged::added(self.id, id));
        Ok(id)
    }

    pub fn remove_item(&mut self, id: ItemId) -> Option<ItemInstance> {
        let index = self.index_of(id)?;
        let mut item = self.entries.remove(index).item;
        item.detach();
        self.observers.notify(&ContainerChanged::removed(self.id, id));
        Some(item)
    }

    /// Moves all of `source`'s units onto `target`; `source` is consumed.
    pub fn stack_item(&mut self, source: ItemInstance, target: ItemId) -> Result<ItemId, Refused> {
        let Some(index) = self.index_of(target) else {
            return Err(Refused::new(source, InventoryError::ItemMissing { item: target }));
        };
        if !self.entries[index].item.can_stack_with(&source) {
            let error = InventoryError::NotStackable {
                item: source.id(),
                target,
            };
            return Err(Refused::new(source, error));
        }
        let previous = self.entries[index].item.amount();
        let new = self.entries[index].item.add_amount(source.amount());
        self.after_amount_change(index, new, previous);
        Ok(target)
    }

    /// Splits `amount` units off `id` into a new instance in this container.
    ///
    /// Legal only when the item holds more than one unit and more than
    /// `amount`. Otherwise nothing changes and [`InventoryError::InvalidSplit`]
    /// is returned.
    pub fn split_item(
        &mut self,
        id: ItemId,
        amount: u32,
        factory: &ItemFactory<'_>,
    ) -> Result<ItemId, InventoryError> {
        if amount == 0 {
            return Err(InventoryError::ZeroAmount);
        }
        let index = self
            .index_of(id)
            .ok_or(InventoryError::ItemMissing { item: id })?;
        let held = self.entries[index].item.amount();
        if held <= 1 || held <= amount {
            return Err(InventoryError::InvalidSplit {
                item: id,
                amount,
                held,
            });
        }
        let source = &self.entries[index].item;
        let mut piece = factory
            .generate_item(Some(source))
            .ok_or(InventoryError::DefinitionUnavailable(source.definition_id()))?;

        let new = self.entries[index].item.remove_amount(amount);
        self.after_amount_change(index, new, held);
        piece.set_amount(amount);
        let piece_id = self.insert_unchecked(piece);
        self.observers.notify(&ContainerChanged::added(self.id, piece_id));
        Ok(piece_id)
    }

    // ===== amounts =====

    pub fn set_amount(&mut self, id: ItemId, amount: u32) -> Result<u32, InventoryError> {
        let index = self
            .index_of(id)
            .ok_or(InventoryError::ItemMissing { item: id })?;
        let previous = self.entries[index].item.set_amount(amount);
        self.after_amount_change(index, amount, previous);
        Ok(amount)
    }

    pub fn add_amount(&mut self, id: ItemId, amount: u32) -> Result<u32, InventoryError> {
        let current = self.item(id).map(ItemInstance::amount);
        let current = current.ok_or(InventoryError::ItemMissing { item: id })?;
        self.set_amount(id, current.saturating_add(amount))
    }

    /// Subtracts units, evicting the instance if nothing is left.
    pub fn remove_amount(&mut self, id: ItemId, amount: u32) -> Result<u32, InventoryError> {
        let current = self.item(id).map(ItemInstance::amount);
        let current = current.ok_or(InventoryError::ItemMissing { item: id })?;
        self.set_amount(id, current.saturating_sub(amount))
    }

    /// Takes `amount` units; if that would leave nothing, takes the whole instance.
    pub fn subtract_or_remove(&mut self, id: ItemId, amount: u32) -> Option<Withdrawal> {
        let held = self.item(id)?.amount();
        if held <= amount {
            return self.remove_item(id).map(Withdrawal::Removed);
        }
        let remaining = held - amount;
        self.set_amount(id, remaining).ok()?;
        Some(Withdrawal::Subtracted { remaining })
    }

    /// Admits starting items; inadmissible ones are logged and dropped.
    pub fn add_starting_data(&mut self, items: impl IntoIterator<Item = ItemInstance>) -> usize {
        let mut added = 0;
        for item in items {
            match self.add_item(item) {
                Ok(_) => added += 1,
                Err(refused) => warn!(
                    container = %self.id,
                    item = refused.item.script_name(),
                    "starting item rejected: {}",
                    refused.error
                ),
            }
        }
        added
    }

    // ===== observers =====

    pub fn subscribe<F>(&mut self, callback: F) -> ObserverId
    where
        F: FnMut(&ContainerChanged) + Send + 'static,
    {
        self.observers.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Amount changes of any held item, including evictions to zero.
    pub fn subscribe_amounts<F>(&mut self, callback: F) -> ObserverId
    where
        F: FnMut(&AmountChanged) + Send + 'static,
    {
        self.amount_observers.subscribe(callback)
    }

    pub fn unsubscribe_amounts(&mut self, id: ObserverId) -> bool {
        self.amount_observers.unsubscribe(id)
    }

    // ===== replication =====

    /// Makes membership equal to `records` (order, record). Existing instances
    /// are updated in place, missing ones are rebuilt through `factory` and
    /// extra ones are dropped. Fires one membership delta for the symmetric
    /// difference.
    pub(crate) fn overwrite_membership(
        &mut self,
        records: &BTreeMap<ItemId, (u64, ItemRecord)>,
        factory: &ItemFactory<'_>,
    ) -> ContainerChanged {
        let mut change = ContainerChanged {
            container: self.id,
            added: Vec::new(),
            removed: Vec::new(),
        };

        let mut index = 0;
        while index < self.entries.len() {
            let id = self.entries[index].item.id();
            if records.contains_key(&id) {
                index += 1;
            } else {
                self.entries.remove(index);
                change.removed.push(id);
            }
        }

        for (id, (order, record)) in records {
            match self.index_of(*id) {
                Some(index) => {
                    let previous = self.entries[index].item.amount();
                    self.entries[index].order = *order;
                    if self.entries[index].item.overwrite_from(record) {
                        let new = self.entries[index].item.amount();
                        if new != previous {
                            self.amount_observers.notify(&AmountChanged {
                                item: *id,
                                new,
                                previous,
                            });
                        }
                    }
                }
                None => match factory.rebuild(record) {
                    Some(mut item) => {
                        item.attach_to_container(self.id);
                        self.entries.push(Entry {
                            order: *order,
                            item,
                        });
                        change.added.push(*id);
                    }
                    None => debug!(container = %self.id, item = %id, "cannot rebuild replicated item"),
                },
            }
            self.next_order = self.next_order.max(order.saturating_add(1));
        }

        self.entries.sort_by_key(|entry| entry.order);
        if !change.is_empty() {
            self.observers.notify(&change);
        }
        change
    }

    // ===== internals =====

    fn index_of(&self, id: ItemId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.item.id() == id)
    }

    fn insert_unchecked(&mut self, mut item: ItemInstance) -> ItemId {
        let id = item.id();
        item.attach_to_container(self.id);
        let order = self.next_order;
        self.next_order += 1;
        self.entries.push(Entry { order, item });
        id
    }

    fn after_amount_change(&mut self, index: usize, new: u32, previous: u32) {
        let id = self.entries[index].item.id();
        self.amount_observers.notify(&AmountChanged {
            item: id,
            new,
            previous,
        });
        if new == 0 {
            self.entries.remove(index);
            self.observers.notify(&ContainerChanged::removed(self.id, id));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::env::{DefinitionCatalog, ItemDefinition};

    const POTION: DefinitionId = DefinitionId(1);
    const SWORD: DefinitionId = DefinitionId(2);

    fn catalog() -> DefinitionCatalog {
        [
            ItemDefinition::new(POTION, "potion", TagSet::from_iter(["Consumable"])).stackable(5),
            ItemDefinition::new(SWORD, "sword", TagSet::from_iter(["Weapon"])),
        ]
        .into_iter()
        .collect()
    }

    fn bag() -> Container {
        Container::new(ContainerId(1), "bag", TagSet::from_iter(["Consumable", "Misc"]))
    }

    #[test]
    fn admission_follows_tag_intersection() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut bag = bag();

        let potion = factory.spawn(POTION, 1).unwrap();
        let sword = factory.spawn(SWORD, 1).unwrap();
        assert!(bag.can_add_item(&potion));
        assert!(!bag.can_add_item(&sword));

        let refused = bag.add_item(sword).unwrap_err();
        assert!(matches!(refused.error, InventoryError::NotAdmitted { .. }));
        assert_eq!(refused.into_item().definition_id(), SWORD);
        assert!(bag.is_empty());
    }

    #[test]
    fn available_place_prefers_first_matching_stack() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut bag = bag();

        let first = bag.add_item(factory.spawn(POTION, 2).unwrap()).unwrap();
        let second = bag.add_item(factory.spawn(POTION, 3).unwrap()).unwrap();

        let incoming = factory.spawn(POTION, 4).unwrap();
        assert_eq!(bag.find_first_stack_for_item(&incoming), Some(first));
        assert_eq!(bag.find_first_stack_for_item(&incoming), Some(first));

        let placement = bag.find_available_place(incoming).unwrap();
        assert_eq!(placement, Placement::Stacked(first));
        assert_eq!(bag.item(first).unwrap().amount(), 6);
        assert_eq!(bag.item(second).unwrap().amount(), 3);
        assert_eq!(bag.len(), 2);
    }

    #[test]
    fn refused_placement_has_no_side_effects() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut bag = bag();
        bag.add_item(factory.spawn(POTION, 2).unwrap()).unwrap();

        let sword = factory.spawn(SWORD, 1).unwrap();
        let sword_id = sword.id();
        let refused = bag.find_available_place(sword).unwrap_err();
        assert_eq!(refused.item.id(), sword_id);
        assert_eq!(bag.len(), 1);
        assert_eq!(bag.total_units(), 2);
    }

    #[test]
    fn split_then_stack_round_trips() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut bag = bag();
        let original = bag.add_item(factory.spawn(POTION, 10).unwrap()).unwrap();

        let piece = bag.split_item(original, 4, &factory).unwrap();
        assert_eq!(bag.item(original).unwrap().amount(), 6);
        assert_eq!(bag.item(piece).unwrap().amount(), 4);

        let piece = bag.remove_item(piece).unwrap();
        bag.stack_item(piece, original).unwrap();
        assert_eq!(bag.len(), 1);
        let merged = bag.item(original).unwrap();
        assert_eq!(merged.amount(), 10);
        assert_eq!(merged.definition_id(), POTION);
    }

    #[test]
    fn split_outside_bounds_changes_nothing() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut bag = bag();
        let single = bag.add_item(factory.spawn(POTION, 1).unwrap()).unwrap();
        let five = bag.add_item(factory.spawn(POTION, 5).unwrap()).unwrap();

        assert!(matches!(
            bag.split_item(single, 1, &factory),
            Err(InventoryError::InvalidSplit { held: 1, .. })
        ));
        assert!(matches!(
            bag.split_item(five, 5, &factory),
            Err(InventoryError::InvalidSplit { .. })
        ));
        assert_eq!(bag.split_item(five, 0, &factory), Err(InventoryError::ZeroAmount));
        assert_eq!(bag.len(), 2);
        assert_eq!(bag.total_units(), 6);
    }

    #[test]
    fn reaching_zero_evicts_the_item() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut bag = bag();
        let id = bag.add_item(factory.spawn(POTION, 3).unwrap()).unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        bag.subscribe(move |change| sink.lock().unwrap().push(change.clone()));

        assert_eq!(bag.remove_amount(id, 2), Ok(1));
        assert!(bag.contains(id));
        assert_eq!(bag.remove_amount(id, 7), Ok(0));
        assert!(!bag.contains(id));
        assert_eq!(
            *events.lock().unwrap(),
            vec![ContainerChanged::removed(ContainerId(1), id)]
        );
    }

    #[test]
    fn subtract_or_remove_takes_whole_instance_at_remainder_zero() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut bag = bag();
        let id = bag.add_item(factory.spawn(POTION, 4).unwrap()).unwrap();

        assert!(matches!(
            bag.subtract_or_remove(id, 3),
            Some(Withdrawal::Subtracted { remaining: 1 })
        ));
        match bag.subtract_or_remove(id, 3) {
            Some(Withdrawal::Removed(item)) => {
                assert_eq!(item.id(), id);
                assert!(item.owner().is_none());
            }
            other => panic!("expected removal, got {other:?}"),
        }
        assert!(bag.is_empty());
    }

    #[test]
    fn lookups_by_definition_and_name() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut bag = bag();
        let id = bag.add_item(factory.spawn(POTION, 2).unwrap()).unwrap();

        assert_eq!(bag.find_item_by_definition(POTION).unwrap().id(), id);
        assert_eq!(bag.find_item_by_name("potion").unwrap().id(), id);
        assert!(bag.find_item_by_name("sword").is_none());
        assert_eq!(bag.total_amount_of(POTION), 2);
    }

    #[test]
    fn starting_data_skips_inadmissible_items() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut bag = bag();
        let added = bag.add_starting_data([
            factory.spawn(POTION, 2).unwrap(),
            factory.spawn(SWORD, 1).unwrap(),
        ]);
        assert_eq!(added, 1);
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn membership_overwrite_reports_symmetric_difference() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut bag = bag();
        let kept = bag.add_item(factory.spawn(POTION, 2).unwrap()).unwrap();
        let dropped = bag.add_item(factory.spawn(POTION, 1).unwrap()).unwrap();

        let mut kept_record = bag.item(kept).unwrap().record();
        kept_record.amount = 5;
        let incoming = factory.spawn(POTION, 3).unwrap().record();

        let mut records = BTreeMap::new();
        records.insert(kept, (4, kept_record));
        records.insert(incoming.id, (2, incoming.clone()));

        let change = bag.overwrite_membership(&records, &factory);
        assert_eq!(change.added, vec![incoming.id]);
        assert_eq!(change.removed, vec![dropped]);
        assert_eq!(bag.item(kept).unwrap().amount(), 5);

        let order: Vec<_> = bag.items().map(ItemInstance::id).collect();
        assert_eq!(order, vec![incoming.id, kept]);
    }
}
