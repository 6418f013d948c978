//! Single-capacity equipment slots and the named set that groups them.
//!
//! A slot is a two-state machine (`Empty` ⇄ `Occupied`). It never
//! overwrites an occupant; callers unequip first.
use tracing::{debug, warn};

use crate::error::InventoryError;
use crate::events::{AvailabilityChanged, SlotChanged};
use crate::ids::ItemId;
use crate::item::{ItemFactory, ItemInstance, ItemRecord};
use crate::observe::{ObserverId, Observers};
use crate::placement::Refused;
use crate::tags::TagSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Occupied,
}

#[derive(Debug)]
pub struct EquipmentSlot {
    name: String,
    tags: TagSet,
    occupant: Option<ItemInstance>,
    available: bool,
    observers: Observers<SlotChanged>,
    availability_observers: Observers<AvailabilityChanged>,
}

impl EquipmentSlot {
    pub const DEFAULT_NAME: &'static str = "Default";

    pub fn new(name: impl Into<String>, tags: TagSet) -> Self {
        Self {
            name: name.into(),
            tags,
            occupant: None,
            available: true,
            observers: Observers::new(),
            availability_observers: Observers::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn state(&self) -> SlotState {
        if self.occupant.is_some() {
            SlotState::Occupied
        } else {
            SlotState::Empty
        }
    }

    pub fn is_equipped(&self) -> bool {
        self.occupant.is_some()
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn occupant(&self) -> Option<&ItemInstance> {
        self.occupant.as_ref()
    }

    pub fn occupant_mut(&mut self) -> Option<&mut ItemInstance> {
        self.occupant.as_mut()
    }

    /// Tag admission only; occupancy is checked by [`EquipmentSlot::equip`].
    pub fn can_equip_item(&self, item: &ItemInstance) -> bool {
        item.tags().intersects(&self.tags)
    }

    pub fn equip(&mut self, mut item: ItemInstance) -> Result<ItemId, Refused> {
        if self.occupant.is_some() {
            let error = InventoryError::SlotOccupied {
                slot: self.name.clone(),
            };
            return Err(Refused::new(item, error));
        }
        if !self.can_equip_item(&item) {
            let error = InventoryError::NotAdmitted { item: item.id() };
            return Err(Refused::new(item, error));
        }
        let id = item.id();
        item.attach_to_slot(&self.name);
        self.occupant = Some(item);
        self.observers.notify(&SlotChanged {
            slot: self.name.clone(),
            item: id,
            equipped: true,
        });
        Ok(id)
    }

    pub fn unequip(&mut self) -> Option<ItemInstance> {
        let mut item = self.occupant.take()?;
        item.detach();
        self.observers.notify(&SlotChanged {
            slot: self.name.clone(),
            item: item.id(),
            equipped: false,
        });
        Some(item)
    }

    /// Notifies only when the flag actually changes.
    pub fn set_availability(&mut self, available: bool) {
        if self.available == available {
            return;
        }
        self.available = available;
        self.availability_observers.notify(&AvailabilityChanged {
            slot: self.name.clone(),
            available,
        });
    }

    pub fn subscribe<F>(&mut self, callback: F) -> ObserverId
    where
        F: FnMut(&SlotChanged) + Send + 'static,
    {
        self.observers.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub fn subscribe_availability<F>(&mut self, callback: F) -> ObserverId
    where
        F: FnMut(&AvailabilityChanged) + Send + 'static,
    {
        self.availability_observers.subscribe(callback)
    }

    pub fn unsubscribe_availability(&mut self, id: ObserverId) -> bool {
        self.availability_observers.unsubscribe(id)
    }

    /// Makes the occupant match a replicated record (or emptiness), firing
    /// the usual slot notifications for whatever changed.
    pub(crate) fn overwrite_occupant(&mut self, record: Option<&ItemRecord>, factory: &ItemFactory<'_>) {
        let same_identity = match (self.occupant.as_ref(), record) {
            (Some(current), Some(record)) => current.id() == record.id,
            _ => false,
        };
        if same_identity {
            if let (Some(current), Some(record)) = (self.occupant.as_mut(), record) {
                current.overwrite_from(record);
            }
            return;
        }

        self.unequip();
        if let Some(record) = record {
            match factory.rebuild(record) {
                Some(item) => {
                    if let Err(refused) = self.equip(item) {
                        debug!(slot = %self.name, "replicated occupant refused: {}", refused.error);
                    }
                }
                None => debug!(slot = %self.name, item = %record.id, "cannot rebuild replicated occupant"),
            }
        }
    }
}

impl Default for EquipmentSlot {
    fn default() -> Self {
        Self::new(Self::DEFAULT_NAME, TagSet::new())
    }
}

/// Uniquely named slots in declaration order.
#[derive(Debug, Default)]
pub struct EquipmentSet {
    slots: Vec<EquipmentSlot>,
}

impl EquipmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, slot: EquipmentSlot) -> Result<(), InventoryError> {
        if self.find_slot_by_name(slot.name()).is_some() {
            return Err(InventoryError::DuplicateSlot(slot.name().to_owned()));
        }
        self.slots.push(slot);
        Ok(())
    }

    #[must_use]
    /// Builder form of [`EquipmentSet::insert`]. A duplicate name keeps the
    /// slot already present.
    pub fn with_slot(mut self, slot: EquipmentSlot) -> Self {
        if let Err(err) = self.insert(slot) {
            warn!("ignoring slot: {err}");
        }
        self
    }

    pub fn find_slot_by_name(&self, name: &str) -> Option<&EquipmentSlot> {
        self.slots.iter().find(|slot| slot.name() == name)
    }

    pub fn find_slot_by_name_mut(&mut self, name: &str) -> Option<&mut EquipmentSlot> {
        self.slots.iter_mut().find(|slot| slot.name() == name)
    }

    /// Two distinct slots borrowed mutably at once.
    pub fn pair_mut(&mut self, a: &str, b: &str) -> Option<(&mut EquipmentSlot, &mut EquipmentSlot)> {
        if a == b {
            return None;
        }
        let ia = self.slots.iter().position(|slot| slot.name() == a)?;
        let ib = self.slots.iter().position(|slot| slot.name() == b)?;
        if ia < ib {
            let (left, right) = self.slots.split_at_mut(ib);
            Some((&mut left[ia], &mut right[0]))
        } else {
            let (left, right) = self.slots.split_at_mut(ia);
            Some((&mut right[0], &mut left[ib]))
        }
    }

    pub fn slots(&self) -> impl Iterator<Item = &EquipmentSlot> {
        self.slots.iter()
    }

    pub fn slots_mut(&mut self) -> impl Iterator<Item = &mut EquipmentSlot> {
        self.slots.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
