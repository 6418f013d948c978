use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::events::ContainerChanged;
use crate::ids::ItemId;
use crate::inventory::Inventory;
use crate::item::{ItemFactory, ItemRecord};
use crate::source::WorldSources;

use super::{ReplicationDelta, TargetRef};

/// What a reconciliation pass changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Membership corrections, one per container or source that differed.
    pub containers: Vec<ContainerChanged>,
    /// Slots whose occupant or availability was overwritten.
    pub slots: Vec<String>,
    /// Replicated targets with no local counterpart.
    pub unresolved: Vec<TargetRef>,
    /// Targets the authority stopped replicating. Their local state was
    /// cleared, since nothing will correct it any more.
    pub retired: Vec<TargetRef>,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty() && self.slots.is_empty() && self.retired.is_empty()
    }
}

/// Client-side copy of the authoritative view.
#[derive(Debug, Default)]
pub struct ReplicaMirror {
    applied: u64,
    targets: BTreeMap<TargetRef, Option<bool>>,
    entries: BTreeMap<TargetRef, BTreeMap<ItemId, (u64, ItemRecord)>>,
    /// Retired since the last reconciliation and not replicated again.
    released: BTreeSet<TargetRef>,
}

impl ReplicaMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest sequence folded in so far.
    pub fn applied(&self) -> u64 {
        self.applied
    }

    pub fn targets(&self) -> impl Iterator<Item = &TargetRef> {
        self.targets.keys()
    }

    pub fn records(&self, target: &TargetRef) -> Option<&BTreeMap<ItemId, (u64, ItemRecord)>> {
        self.entries.get(target)
    }

    /// Folds a delta into the mirror. Deltas at or below the applied
    /// sequence are stale and ignored; returns whether it was applied.
    pub fn apply(&mut self, delta: &ReplicationDelta) -> bool {
        if delta.sequence <= self.applied {
            return false;
        }
        for target in &delta.retired {
            self.targets.remove(target);
            self.entries.remove(target);
            self.released.insert(target.clone());
        }
        for update in &delta.targets {
            self.released.remove(&update.target);
            self.targets.insert(update.target.clone(), update.available);
            self.entries.entry(update.target.clone()).or_default();
        }
        for key in &delta.removals {
            if let Some(records) = self.entries.get_mut(&key.target) {
                records.remove(&key.item);
            }
        }
        for upsert in &delta.upserts {
            self.released.remove(&upsert.target);
            self.targets.entry(upsert.target.clone()).or_insert(None);
            self.entries
                .entry(upsert.target.clone())
                .or_default()
                .insert(upsert.record.id, (upsert.order, upsert.record.clone()));
        }
        self.applied = delta.sequence;
        true
    }

    /// Overwrites every mirrored target in local state with the mirror's
    /// contents, discarding any speculation the authority did not confirm.
    /// Local state of retired targets is emptied.
    pub fn reconcile(
        &mut self,
        inventory: &mut Inventory,
        mut sources: Option<&mut WorldSources>,
        factory: &ItemFactory<'_>,
    ) -> Reconciliation {
        let mut outcome = Reconciliation::default();
        let empty = BTreeMap::new();

        for target in std::mem::take(&mut self.released) {
            match &target {
                TargetRef::Container(id) => {
                    if let Some(container) = inventory.container_mut(*id) {
                        let change = container.overwrite_membership(&empty, factory);
                        if !change.is_empty() {
                            outcome.containers.push(change);
                        }
                    }
                }
                TargetRef::Source(id) => {
                    if let Some(container) = sources.as_deref_mut().and_then(|world| world.get_mut(*id)) {
                        let change = container.overwrite_membership(&empty, factory);
                        if !change.is_empty() {
                            outcome.containers.push(change);
                        }
                    }
                }
                TargetRef::Slot(name) => {
                    if let Some(slot) = inventory.slot_mut(name) {
                        if slot.is_equipped() {
                            slot.overwrite_occupant(None, factory);
                            outcome.slots.push(name.clone());
                        }
                    }
                }
            }
            outcome.retired.push(target);
        }

        for (target, available) in &self.targets {
            let records = self.entries.get(target).unwrap_or(&empty);
            match target {
                TargetRef::Container(id) => match inventory.container_mut(*id) {
                    Some(container) => {
                        let change = container.overwrite_membership(records, factory);
                        if !change.is_empty() {
                            outcome.containers.push(change);
                        }
                    }
                    None => outcome.unresolved.push(target.clone()),
                },
                TargetRef::Source(id) => {
                    match sources.as_deref_mut().and_then(|world| world.get_mut(*id)) {
                        Some(container) => {
                            let change = container.overwrite_membership(records, factory);
                            if !change.is_empty() {
                                outcome.containers.push(change);
                            }
                        }
                        None => outcome.unresolved.push(target.clone()),
                    }
                }
                TargetRef::Slot(name) => match inventory.slot_mut(name) {
                    Some(slot) => {
                        let occupant = records.values().next().map(|(_, record)| record);
                        let before = (slot.occupant().map(|item| item.record()), slot.is_available());
                        slot.overwrite_occupant(occupant, factory);
                        if let Some(available) = available {
                            slot.set_availability(*available);
                        }
                        let after = (slot.occupant().map(|item| item.record()), slot.is_available());
                        if before != after {
                            outcome.slots.push(name.clone());
                        }
                    }
                    None => outcome.unresolved.push(target.clone()),
                },
            }
        }

        if !outcome.unresolved.is_empty() {
            debug!(targets = ?outcome.unresolved, "replicated targets without local state");
        }
        if !outcome.retired.is_empty() {
            debug!(targets = ?outcome.retired, "cleared local state of retired targets");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::env::{DefinitionCatalog, ItemDefinition};
    use crate::ids::{ContainerId, ControllerId, DefinitionId};
    use crate::replication::{ReplicationSet, TargetView};
    use crate::slot::{EquipmentSet, EquipmentSlot};
    use crate::tags::TagSet;

    const GEM: DefinitionId = DefinitionId(1);
    const BLADE: DefinitionId = DefinitionId(2);
    const CLIENT: ControllerId = ControllerId(4);

    fn catalog() -> DefinitionCatalog {
        [
            ItemDefinition::new(GEM, "gem", TagSet::from_iter(["Loot"])).stackable(10),
            ItemDefinition::new(BLADE, "blade", TagSet::from_iter(["Weapon"])),
        ]
        .into_iter()
        .collect()
    }

    fn inventory() -> Inventory {
        Inventory::with_equipment(
            EquipmentSet::new().with_slot(EquipmentSlot::new("Hands", TagSet::from_iter(["Weapon"]))),
        )
        .with_container(Container::new(ContainerId(1), "pouch", TagSet::from_iter(["Loot"])))
    }

    fn views(inventory: &Inventory) -> Vec<TargetView> {
        inventory
            .containers()
            .map(TargetView::container)
            .chain(inventory.equipment().slots().map(TargetView::slot))
            .collect()
    }

    #[test]
    fn reconciliation_discards_unconfirmed_speculation() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);

        let mut server = inventory();
        server
            .container_mut(ContainerId(1))
            .unwrap()
            .add_item(factory.spawn(GEM, 3).unwrap())
            .unwrap();
        let mut set = ReplicationSet::new(64);
        set.add_observer(CLIENT);
        set.add_target(TargetRef::Container(ContainerId(1)));
        set.add_target(TargetRef::Slot("Hands".into()));
        set.capture(views(&server));

        let mut client = inventory();
        let speculative = client
            .container_mut(ContainerId(1))
            .unwrap()
            .add_item(factory.spawn(GEM, 1).unwrap())
            .unwrap();
        client
            .slot_mut("Hands")
            .unwrap()
            .equip(factory.spawn(BLADE, 1).unwrap())
            .unwrap();

        let mut mirror = ReplicaMirror::new();
        let delta = set.delta_for(CLIENT).unwrap();
        assert!(mirror.apply(&delta));
        assert!(!mirror.apply(&delta));

        let outcome = mirror.reconcile(&mut client, None, &factory);
        assert_eq!(outcome.containers.len(), 1);
        assert_eq!(outcome.containers[0].removed, vec![speculative]);
        assert_eq!(outcome.slots, vec!["Hands".to_owned()]);
        assert!(!client.slot("Hands").unwrap().is_equipped());

        let pouch = client.container(ContainerId(1)).unwrap();
        assert_eq!(pouch.total_units(), 3);
        assert_eq!(
            pouch.items().next().map(|item| item.id()),
            server.container(ContainerId(1)).unwrap().items().next().map(|item| item.id())
        );
    }

    #[test]
    fn slot_availability_is_mirrored() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);

        let mut server = inventory();
        server.slot_mut("Hands").unwrap().set_availability(false);
        let mut set = ReplicationSet::new(64);
        set.add_observer(CLIENT);
        set.add_target(TargetRef::Slot("Hands".into()));
        set.capture(views(&server));

        let mut client = inventory();
        let mut mirror = ReplicaMirror::new();
        mirror.apply(&set.delta_for(CLIENT).unwrap());
        mirror.reconcile(&mut client, None, &factory);
        assert!(!client.slot("Hands").unwrap().is_available());
    }

    #[test]
    fn retired_targets_are_cleared_locally() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let pouch = TargetRef::Container(ContainerId(1));
        let hands = TargetRef::Slot("Hands".into());

        let mut server = inventory();
        server
            .container_mut(ContainerId(1))
            .unwrap()
            .add_item(factory.spawn(GEM, 3).unwrap())
            .unwrap();
        server
            .slot_mut("Hands")
            .unwrap()
            .equip(factory.spawn(BLADE, 1).unwrap())
            .unwrap();
        let mut set = ReplicationSet::new(64);
        set.add_observer(CLIENT);
        set.add_target(pouch.clone());
        set.add_target(hands.clone());
        set.capture(views(&server));

        let mut client = inventory();
        let mut mirror = ReplicaMirror::new();
        let delta = set.delta_for(CLIENT).unwrap();
        mirror.apply(&delta);
        mirror.reconcile(&mut client, None, &factory);
        set.acknowledge(CLIENT, delta.sequence);
        assert_eq!(client.container(ContainerId(1)).unwrap().total_units(), 3);

        set.clear();
        mirror.apply(&set.delta_for(CLIENT).unwrap());
        let outcome = mirror.reconcile(&mut client, None, &factory);

        assert_eq!(outcome.retired, vec![pouch, hands]);
        assert_eq!(outcome.containers.len(), 1);
        assert_eq!(outcome.slots, vec!["Hands".to_owned()]);
        assert_eq!(client.container(ContainerId(1)).unwrap().total_units(), 0);
        assert!(!client.slot("Hands").unwrap().is_equipped());

        let again = mirror.reconcile(&mut client, None, &factory);
        assert!(again.is_empty());
    }

    #[test]
    fn retargeted_targets_are_not_reported_as_retired() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let pouch = TargetRef::Container(ContainerId(1));

        let mut server = inventory();
        server
            .container_mut(ContainerId(1))
            .unwrap()
            .add_item(factory.spawn(GEM, 3).unwrap())
            .unwrap();
        let mut set = ReplicationSet::new(64);
        set.add_observer(CLIENT);
        set.add_target(pouch.clone());
        set.capture(views(&server));

        let mut client = inventory();
        let mut mirror = ReplicaMirror::new();
        let delta = set.delta_for(CLIENT).unwrap();
        mirror.apply(&delta);
        mirror.reconcile(&mut client, None, &factory);
        set.acknowledge(CLIENT, delta.sequence);

        set.remove_target(&pouch);
        set.add_target(pouch.clone());
        set.capture(views(&server));
        mirror.apply(&set.delta_for(CLIENT).unwrap());
        let outcome = mirror.reconcile(&mut client, None, &factory);

        assert!(outcome.retired.is_empty());
        assert_eq!(client.container(ContainerId(1)).unwrap().total_units(), 3);
    }

    #[test]
    fn unknown_targets_are_reported() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut set = ReplicationSet::new(64);
        set.add_observer(CLIENT);
        set.add_target(TargetRef::Container(ContainerId(42)));

        let mut mirror = ReplicaMirror::new();
        mirror.apply(&set.delta_for(CLIENT).unwrap());
        let outcome = mirror.reconcile(&mut inventory(), None, &factory);
        assert_eq!(outcome.unresolved, vec![TargetRef::Container(ContainerId(42))]);
    }
}
