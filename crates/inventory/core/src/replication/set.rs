use std::collections::{BTreeMap, BTreeSet};

use crate::container::Container;
use crate::ids::{ControllerId, ItemId, SourceId};
use crate::item::ItemRecord;
use crate::slot::EquipmentSlot;

use super::{EntryKey, EntryUpdate, RecordFields, ReplicationDelta, TargetRef, TargetUpdate};

/// Live membership of one target, as read at capture time.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetView {
    pub target: TargetRef,
    pub available: Option<bool>,
    pub items: Vec<(u64, ItemRecord)>,
}

impl TargetView {
    pub fn container(container: &Container) -> Self {
        Self {
            target: TargetRef::Container(container.id()),
            available: None,
            items: records_of(container),
        }
    }

    pub fn slot(slot: &EquipmentSlot) -> Self {
        Self {
            target: TargetRef::Slot(slot.name().to_owned()),
            available: Some(slot.is_available()),
            items: slot.occupant().map(|item| (0, item.record())).into_iter().collect(),
        }
    }

    pub fn source(id: SourceId, container: &Container) -> Self {
        Self {
            target: TargetRef::Source(id),
            available: None,
            items: records_of(container),
        }
    }
}

fn records_of(container: &Container) -> Vec<(u64, ItemRecord)> {
    container
        .ordered_items()
        .map(|(order, item)| (order, item.record()))
        .collect()
}

#[derive(Clone, Debug)]
struct Tracked {
    order: u64,
    record: ItemRecord,
    sequence: u64,
    /// Change masks by sequence, pruned at compaction.
    changes: Vec<(u64, RecordFields)>,
    /// Bases below this lost their history and get every field.
    pruned: u64,
}

impl Tracked {
    fn new(order: u64, record: ItemRecord, sequence: u64) -> Self {
        Self {
            order,
            record,
            sequence,
            changes: vec![(sequence, RecordFields::all())],
            pruned: 0,
        }
    }

    /// Union of everything that changed after `base`.
    fn fields_since(&self, base: u64) -> RecordFields {
        if base < self.pruned {
            return RecordFields::all();
        }
        self.changes
            .iter()
            .filter(|(seq, _)| *seq > base)
            .fold(RecordFields::empty(), |acc, (_, fields)| acc | *fields)
    }

    fn prune(&mut self, floor: u64) {
        let before = self.changes.len();
        self.changes.retain(|(seq, _)| *seq > floor);
        if self.changes.len() != before {
            self.pruned = self.pruned.max(floor);
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct TargetState {
    available: Option<bool>,
    sequence: u64,
}

enum Pending<'a> {
    Retired(&'a TargetRef),
    Target(&'a TargetRef, &'a TargetState),
    Removal(&'a EntryKey),
    Upsert(&'a EntryKey, &'a Tracked),
}

/// Authoritative, versioned view of every replicated target.
#[derive(Debug)]
pub struct ReplicationSet {
    sequence: u64,
    max_delta_entries: usize,
    targets: BTreeMap<TargetRef, TargetState>,
    entries: BTreeMap<EntryKey, Tracked>,
    tombstones: BTreeMap<EntryKey, u64>,
    retired: BTreeMap<TargetRef, u64>,
    acked: BTreeMap<ControllerId, u64>,
}

impl ReplicationSet {
    pub fn new(max_delta_entries: usize) -> Self {
        Self {
            sequence: 0,
            max_delta_entries: max_delta_entries.max(1),
            targets: BTreeMap::new(),
            entries: BTreeMap::new(),
            tombstones: BTreeMap::new(),
            retired: BTreeMap::new(),
            acked: BTreeMap::new(),
        }
    }

    /// Latest issued sequence number. Zero until the first change.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_replicated(&self, target: &TargetRef) -> bool {
        self.targets.contains_key(target)
    }

    pub fn targets(&self) -> impl Iterator<Item = &TargetRef> {
        self.targets.keys()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    // ===== targets =====

    /// Starts replicating `target`. Returns false if it already was.
    ///
    /// A pending retirement of the same target is kept until compaction, so
    /// an observer that has not acknowledged it still drops its old copy
    /// before the fresh one arrives.
    pub fn add_target(&mut self, target: TargetRef) -> bool {
        if self.targets.contains_key(&target) {
            return false;
        }
        let sequence = self.bump();
        self.targets.insert(
            target,
            TargetState {
                available: None,
                sequence,
            },
        );
        true
    }

    /// Stops replicating `target` and tells observers to forget it.
    pub fn remove_target(&mut self, target: &TargetRef) -> bool {
        if self.targets.remove(target).is_none() {
            return false;
        }
        let keys: Vec<EntryKey> = self.keys_of(target).collect();
        for key in keys {
            self.entries.remove(&key);
        }
        self.tombstones.retain(|key, _| &key.target != target);
        let sequence = self.bump();
        self.retired.insert(target.clone(), sequence);
        true
    }

    /// Retires every target.
    pub fn clear(&mut self) {
        let targets: Vec<TargetRef> = self.targets.keys().cloned().collect();
        for target in targets {
            self.remove_target(&target);
        }
    }

    // ===== observers =====

    /// Registers an observer that has seen nothing yet.
    pub fn add_observer(&mut self, observer: ControllerId) {
        self.acked.entry(observer).or_insert(0);
    }

    pub fn remove_observer(&mut self, observer: ControllerId) -> bool {
        let removed = self.acked.remove(&observer).is_some();
        self.compact();
        removed
    }

    pub fn acknowledged(&self, observer: ControllerId) -> Option<u64> {
        self.acked.get(&observer).copied()
    }

    pub fn has_pending(&self, observer: ControllerId) -> bool {
        self.acked
            .get(&observer)
            .is_some_and(|acked| *acked < self.sequence)
    }

    /// Records that `observer` applied everything up to `sequence`, then
    /// drops tombstones every observer is past.
    pub fn acknowledge(&mut self, observer: ControllerId, sequence: u64) {
        if let Some(acked) = self.acked.get_mut(&observer) {
            *acked = (*acked).max(sequence.min(self.sequence));
        }
        self.compact();
    }

    // ===== capture =====

    /// Diffs the given views against the tracked entries. Every change found
    /// is stamped with one new sequence number, which is returned. Views of
    /// targets that are not replicated are ignored.
    pub fn capture<I>(&mut self, views: I) -> Option<u64>
    where
        I: IntoIterator<Item = TargetView>,
    {
        let next = self.sequence + 1;
        let mut changed = false;
        for view in views {
            let Some(state) = self.targets.get_mut(&view.target) else {
                continue;
            };
            if view.available.is_some() && state.available != view.available {
                state.available = view.available;
                state.sequence = next;
                changed = true;
            }
            changed |= self.diff_target(&view, next);
        }
        if changed {
            self.sequence = next;
            Some(next)
        } else {
            None
        }
    }

    fn diff_target(&mut self, view: &TargetView, sequence: u64) -> bool {
        let mut stale: BTreeSet<ItemId> = self.keys_of(&view.target).map(|key| key.item).collect();
        let mut changed = false;

        for (order, record) in &view.items {
            stale.remove(&record.id);
            let key = EntryKey::new(view.target.clone(), record.id);
            match self.entries.get_mut(&key) {
                Some(tracked) => {
                    let fields = RecordFields::between(tracked.order, &tracked.record, *order, record);
                    if !fields.is_empty() {
                        tracked.order = *order;
                        tracked.record = record.clone();
                        tracked.sequence = sequence;
                        tracked.changes.push((sequence, fields));
                        changed = true;
                    }
                }
                None => {
                    self.tombstones.remove(&key);
                    self.entries
                        .insert(key, Tracked::new(*order, record.clone(), sequence));
                    changed = true;
                }
            }
        }

        for item in stale {
            let key = EntryKey::new(view.target.clone(), item);
            self.entries.remove(&key);
            self.tombstones.insert(key, sequence);
            changed = true;
        }
        changed
    }

    // ===== deltas =====

    /// Changes `observer` has not acknowledged, oldest first.
    ///
    /// Entries stamped with the same sequence always travel together. When
    /// the entry cap cuts the delta short its `sequence` stops at the last
    /// complete capture and [`ReplicationSet::has_pending`] stays true.
    pub fn delta_for(&self, observer: ControllerId) -> Option<ReplicationDelta> {
        let base = *self.acked.get(&observer)?;

        let mut pending: Vec<(u64, Pending<'_>)> = Vec::new();
        pending.extend(
            self.retired
                .iter()
                .filter(|(_, seq)| **seq > base)
                .map(|(target, seq)| (*seq, Pending::Retired(target))),
        );
        pending.extend(
            self.targets
                .iter()
                .filter(|(_, state)| state.sequence > base)
                .map(|(target, state)| (state.sequence, Pending::Target(target, state))),
        );
        pending.extend(
            self.tombstones
                .iter()
                .filter(|(_, seq)| **seq > base)
                .map(|(key, seq)| (*seq, Pending::Removal(key))),
        );
        pending.extend(
            self.entries
                .iter()
                .filter(|(_, tracked)| tracked.sequence > base)
                .map(|(key, tracked)| (tracked.sequence, Pending::Upsert(key, tracked))),
        );
        pending.sort_by_key(|(seq, _)| *seq);

        let mut delta = ReplicationDelta::empty(base, self.sequence);
        let mut entries = 0;
        let mut last = base;
        for (seq, change) in pending {
            if seq != last && entries >= self.max_delta_entries {
                delta.sequence = last;
                break;
            }
            last = seq;
            match change {
                Pending::Retired(target) => delta.retired.push(target.clone()),
                Pending::Target(target, state) => delta.targets.push(TargetUpdate {
                    target: target.clone(),
                    available: state.available,
                }),
                Pending::Removal(key) => {
                    entries += 1;
                    delta.removals.push(key.clone());
                }
                Pending::Upsert(key, tracked) => {
                    entries += 1;
                    delta.upserts.push(EntryUpdate {
                        target: key.target.clone(),
                        order: tracked.order,
                        record: tracked.record.clone(),
                        fields: tracked.fields_since(base),
                    });
                }
            }
        }
        Some(delta)
    }

    // ===== internals =====

    fn bump(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn keys_of<'a>(&'a self, target: &TargetRef) -> impl Iterator<Item = EntryKey> + use<'a> {
        let start = EntryKey::new(target.clone(), ItemId(0));
        let end = EntryKey::new(target.clone(), ItemId(u64::MAX));
        self.entries.range(start..=end).map(|(key, _)| key.clone())
    }

    fn compact(&mut self) {
        let floor = self.acked.values().copied().min().unwrap_or(self.sequence);
        self.tombstones.retain(|_, seq| *seq > floor);
        self.retired.retain(|_, seq| *seq > floor);
        for tracked in self.entries.values_mut() {
            tracked.prune(floor);
        }
    }
}

impl Default for ReplicationSet {
    fn default() -> Self {
        Self::new(crate::config::InventoryConfig::DEFAULT_MAX_DELTA_ENTRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{DefinitionCatalog, ItemDefinition};
    use crate::ids::{ContainerId, DefinitionId};
    use crate::item::ItemFactory;
    use crate::replication::ReplicaMirror;
    use crate::tags::TagSet;

    const OBSERVER: ControllerId = ControllerId(1);
    const GEM: DefinitionId = DefinitionId(1);

    fn catalog() -> DefinitionCatalog {
        [ItemDefinition::new(GEM, "gem", TagSet::from_iter(["Loot"])).stackable(10)]
            .into_iter()
            .collect()
    }

    fn pouch() -> Container {
        Container::new(ContainerId(1), "pouch", TagSet::from_iter(["Loot"]))
    }

    fn tracked_set() -> ReplicationSet {
        let mut set = ReplicationSet::new(64);
        set.add_observer(OBSERVER);
        set.add_target(TargetRef::Container(ContainerId(1)));
        set
    }

    #[test]
    fn unchanged_state_issues_no_sequence() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut pouch = pouch();
        pouch.add_item(factory.spawn(GEM, 2).unwrap()).unwrap();

        let mut set = tracked_set();
        let first = set.capture([TargetView::container(&pouch)]).unwrap();
        assert_eq!(set.capture([TargetView::container(&pouch)]), None);
        assert_eq!(set.sequence(), first);
    }

    #[test]
    fn deltas_start_at_the_acknowledged_sequence() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut pouch = pouch();
        let gem = pouch.add_item(factory.spawn(GEM, 2).unwrap()).unwrap();

        let mut set = tracked_set();
        set.capture([TargetView::container(&pouch)]);
        let delta = set.delta_for(OBSERVER).unwrap();
        assert_eq!(delta.base, 0);
        assert_eq!(delta.targets.len(), 1);
        assert_eq!(delta.upserts.len(), 1);
        assert_eq!(delta.upserts[0].fields, RecordFields::all());
        set.acknowledge(OBSERVER, delta.sequence);

        pouch.add_amount(gem, 3).unwrap();
        set.capture([TargetView::container(&pouch)]);
        let delta = set.delta_for(OBSERVER).unwrap();
        assert!(delta.targets.is_empty());
        assert_eq!(delta.upserts.len(), 1);
        assert_eq!(delta.upserts[0].record.amount, 5);
        assert_eq!(delta.upserts[0].fields, RecordFields::AMOUNT);
    }

    #[test]
    fn tombstones_compact_after_every_observer_acknowledges() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut pouch = pouch();
        let gem = pouch.add_item(factory.spawn(GEM, 2).unwrap()).unwrap();

        let mut set = tracked_set();
        set.add_observer(ControllerId(2));
        set.capture([TargetView::container(&pouch)]);
        pouch.remove_item(gem).unwrap();
        let sequence = set.capture([TargetView::container(&pouch)]).unwrap();
        assert_eq!(set.tombstone_count(), 1);

        let delta = set.delta_for(OBSERVER).unwrap();
        assert!(delta.upserts.is_empty());
        assert_eq!(
            delta.removals,
            vec![EntryKey::new(TargetRef::Container(ContainerId(1)), gem)]
        );

        set.acknowledge(OBSERVER, sequence);
        assert_eq!(set.tombstone_count(), 1);
        set.acknowledge(ControllerId(2), sequence);
        assert_eq!(set.tombstone_count(), 0);
        assert!(!set.has_pending(OBSERVER));
    }

    #[test]
    fn lagging_observers_see_every_field_changed_since_their_base() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut pouch = pouch();
        let gem = pouch.add_item(factory.spawn(GEM, 2).unwrap()).unwrap();
        let view = |order: u64, pouch: &Container| TargetView {
            target: TargetRef::Container(ContainerId(1)),
            available: None,
            items: vec![(order, pouch.item(gem).unwrap().record())],
        };

        let mut set = tracked_set();
        set.add_observer(ControllerId(2));
        let first = set.capture([view(0, &pouch)]).unwrap();
        set.acknowledge(OBSERVER, first);
        set.acknowledge(ControllerId(2), first);

        pouch.add_amount(gem, 1).unwrap();
        let second = set.capture([view(0, &pouch)]).unwrap();
        set.acknowledge(OBSERVER, second);
        set.capture([view(7, &pouch)]).unwrap();

        let current = set.delta_for(OBSERVER).unwrap();
        assert_eq!(current.upserts.len(), 1);
        assert_eq!(current.upserts[0].fields, RecordFields::ORDER);

        let lagging = set.delta_for(ControllerId(2)).unwrap();
        assert_eq!(lagging.upserts.len(), 1);
        assert_eq!(lagging.upserts[0].fields, RecordFields::AMOUNT | RecordFields::ORDER);

        set.acknowledge(ControllerId(2), second);
        let caught_up = set.delta_for(ControllerId(2)).unwrap();
        assert_eq!(caught_up.upserts[0].fields, RecordFields::ORDER);
    }

    #[test]
    fn capped_deltas_keep_captures_together() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut pouch = pouch();
        let mut set = ReplicationSet::new(1);
        set.add_observer(OBSERVER);
        set.add_target(TargetRef::Container(ContainerId(1)));

        pouch.add_item(factory.spawn(GEM, 1).unwrap()).unwrap();
        pouch.add_item(factory.spawn(GEM, 1).unwrap()).unwrap();
        let first = set.capture([TargetView::container(&pouch)]).unwrap();
        pouch.add_item(factory.spawn(GEM, 1).unwrap()).unwrap();
        set.capture([TargetView::container(&pouch)]).unwrap();

        let delta = set.delta_for(OBSERVER).unwrap();
        assert_eq!(delta.sequence, first);
        assert_eq!(delta.upserts.len(), 2);
        set.acknowledge(OBSERVER, delta.sequence);
        assert!(set.has_pending(OBSERVER));

        let rest = set.delta_for(OBSERVER).unwrap();
        assert_eq!(rest.base, first);
        assert_eq!(rest.upserts.len(), 1);
        assert_eq!(rest.sequence, set.sequence());
    }

    #[test]
    fn removed_targets_are_retired_for_observers() {
        let mut set = tracked_set();
        set.acknowledge(OBSERVER, set.sequence());
        assert!(set.remove_target(&TargetRef::Container(ContainerId(1))));
        assert!(!set.remove_target(&TargetRef::Container(ContainerId(1))));

        let delta = set.delta_for(OBSERVER).unwrap();
        assert_eq!(delta.retired, vec![TargetRef::Container(ContainerId(1))]);
        assert!(set.delta_for(ControllerId(9)).is_none());
    }

    #[test]
    fn retargeting_before_acknowledgement_still_retires_old_entries() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut pouch = pouch();
        let gem = pouch.add_item(factory.spawn(GEM, 2).unwrap()).unwrap();
        let target = TargetRef::Container(ContainerId(1));

        let mut set = tracked_set();
        set.capture([TargetView::container(&pouch)]);
        let mut mirror = ReplicaMirror::new();
        let delta = set.delta_for(OBSERVER).unwrap();
        mirror.apply(&delta);
        set.acknowledge(OBSERVER, delta.sequence);

        assert!(set.remove_target(&target));
        pouch.remove_item(gem).unwrap();
        assert!(set.add_target(target.clone()));
        set.capture([TargetView::container(&pouch)]);

        let delta = set.delta_for(OBSERVER).unwrap();
        assert_eq!(delta.retired, vec![target.clone()]);
        assert!(mirror.apply(&delta));
        assert_eq!(mirror.records(&target).map(|records| records.len()), Some(0));
        assert!(mirror.targets().any(|mirrored| mirrored == &target));

        set.acknowledge(OBSERVER, delta.sequence);
        assert!(set.delta_for(OBSERVER).unwrap().is_empty());
    }

    #[test]
    fn retargeting_refills_entries_the_observer_already_had() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut pouch = pouch();
        pouch.add_item(factory.spawn(GEM, 2).unwrap()).unwrap();
        let target = TargetRef::Container(ContainerId(1));

        let mut set = tracked_set();
        set.capture([TargetView::container(&pouch)]);
        let mut mirror = ReplicaMirror::new();
        let delta = set.delta_for(OBSERVER).unwrap();
        mirror.apply(&delta);
        set.acknowledge(OBSERVER, delta.sequence);

        set.remove_target(&target);
        set.add_target(target.clone());
        set.capture([TargetView::container(&pouch)]);

        mirror.apply(&set.delta_for(OBSERVER).unwrap());
        assert_eq!(mirror.records(&target).map(|records| records.len()), Some(1));
    }

    #[test]
    fn untracked_views_are_ignored() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut other = Container::new(ContainerId(5), "other", TagSet::from_iter(["Loot"]));
        other.add_item(factory.spawn(GEM, 1).unwrap()).unwrap();

        let mut set = tracked_set();
        assert_eq!(set.capture([TargetView::container(&other)]), None);
        assert_eq!(set.entry_count(), 0);
    }
}
