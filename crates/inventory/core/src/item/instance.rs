use std::fmt;
use std::sync::Arc;

use crate::attribute::{AttributeError, AttributeState, Modifier, ModifierSpec};
use crate::env::{ComponentState, ItemDefinition};
use crate::events::AmountChanged;
use crate::ids::{ContainerId, DefinitionId, ItemId, ModifierHandle};
use crate::observe::{ObserverId, Observers};
use crate::tags::{Tag, TagSet};

use super::ItemHook;

/// Weak back-reference to whatever currently holds an item.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Owner {
    Container(ContainerId),
    Slot(String),
}

/// Replicated form of an instance: everything a peer needs to rebuild it.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ItemRecord {
    pub id: ItemId,
    pub definition: DefinitionId,
    pub amount: u32,
    pub attributes: AttributeState,
    pub components: Vec<ComponentState>,
}

pub struct ItemInstance {
    id: ItemId,
    definition: Arc<ItemDefinition>,
    amount: u32,
    attributes: AttributeState,
    components: Vec<ComponentState>,
    owner: Option<Owner>,
    hook: Option<Arc<dyn ItemHook>>,
    observers: Observers<AmountChanged>,
}

impl ItemInstance {
    /// Builds an instance and runs the `on_initialized` hook. Only the
    /// factory calls this, so ids always come from the allocator.
    pub(crate) fn initialize(
        id: ItemId,
        definition: Arc<ItemDefinition>,
        amount: u32,
        attributes: AttributeState,
        components: Vec<ComponentState>,
        hook: Option<Arc<dyn ItemHook>>,
    ) -> Self {
        let item = Self {
            id,
            definition,
            amount,
            attributes,
            components,
            owner: None,
            hook,
            observers: Observers::new(),
        };
        if let Some(hook) = &item.hook {
            hook.on_initialized(&item);
        }
        item
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn definition(&self) -> &Arc<ItemDefinition> {
        &self.definition
    }

    pub fn definition_id(&self) -> DefinitionId {
        self.definition.id
    }

    pub fn script_name(&self) -> &str {
        &self.definition.script_name
    }

    pub fn tags(&self) -> &TagSet {
        &self.definition.tags
    }

    pub fn amount(&self) -> u32 {
        self.amount
    }

    /// Nominal stack size from the definition.
    pub fn stack_amount(&self) -> u32 {
        self.definition.stack_amount
    }

    pub fn owner(&self) -> Option<&Owner> {
        self.owner.as_ref()
    }

    pub fn hook(&self) -> Option<&Arc<dyn ItemHook>> {
        self.hook.as_ref()
    }

    pub fn set_hook(&mut self, hook: Arc<dyn ItemHook>) {
        self.hook = Some(hook);
    }

    pub fn components(&self) -> &[ComponentState] {
        &self.components
    }

    pub fn component(&self, name: &str) -> Option<&ComponentState> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Mutating a component changes which items this one can stack with.
    pub fn component_mut(&mut self, name: &str) -> Option<&mut ComponentState> {
        self.components.iter_mut().find(|c| c.name == name)
    }

    // ===== amount =====

    /// Sets the amount and returns the previous one.
    pub fn set_amount(&mut self, amount: u32) -> u32 {
        let previous = self.amount;
        self.amount = amount;
        let change = AmountChanged {
            item: self.id,
            new: amount,
            previous,
        };
        self.observers.notify(&change);
        if let Some(hook) = &self.hook {
            hook.on_amount_changed(self.id, amount, previous);
        }
        previous
    }

    pub fn add_amount(&mut self, amount: u32) -> u32 {
        self.set_amount(self.amount.saturating_add(amount));
        self.amount
    }

    /// Saturates at zero. A container holding this item evicts it at zero.
    pub fn remove_amount(&mut self, amount: u32) -> u32 {
        self.set_amount(self.amount.saturating_sub(amount));
        self.amount
    }

    pub fn subscribe<F>(&mut self, callback: F) -> ObserverId
    where
        F: FnMut(&AmountChanged) + Send + 'static,
    {
        self.observers.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    // ===== stacking =====

    /// Stacking allowed by the definition and the maximum (if any) not yet reached.
    pub fn is_stackable(&self) -> bool {
        self.definition.stackable
            && self
                .definition
                .stack_maximum
                .is_none_or(|maximum| self.amount < maximum)
    }

    /// Same definition and equal component states.
    pub fn matches(&self, other: &ItemInstance) -> bool {
        self.definition.id == other.definition.id && self.components == other.components
    }

    pub fn can_stack_with(&self, other: &ItemInstance) -> bool {
        other.id != self.id && self.is_stackable() && self.matches(other)
    }

    // ===== attributes =====

    pub fn attributes(&self) -> &AttributeState {
        &self.attributes
    }

    pub fn attribute_value(&self, tag: &Tag) -> Option<f32> {
        self.attributes.value(tag)
    }

    pub fn apply_modifier(&mut self, spec: ModifierSpec) -> Result<ModifierHandle, AttributeError> {
        self.attributes.apply_modifier(spec)
    }

    pub fn remove_modifier(&mut self, handle: ModifierHandle) -> Result<Modifier, AttributeError> {
        self.attributes.remove_modifier(handle)
    }

    pub fn toggle_modifier(&mut self, handle: ModifierHandle, on: bool) -> Result<(), AttributeError> {
        self.attributes.toggle_modifier(handle, on)
    }

    // ===== attachment =====

    pub(crate) fn attach_to_container(&mut self, container: ContainerId) {
        self.owner = Some(Owner::Container(container));
        if let Some(hook) = &self.hook {
            hook.on_added_to_container(self.id, container);
        }
    }

    pub(crate) fn attach_to_slot(&mut self, slot: &str) {
        self.owner = Some(Owner::Slot(slot.to_owned()));
        if let Some(hook) = &self.hook {
            hook.on_added_to_slot(self.id, slot);
        }
    }

    pub(crate) fn detach(&mut self) {
        self.owner = None;
    }

    // ===== replication =====

    pub fn record(&self) -> ItemRecord {
        ItemRecord {
            id: self.id,
            definition: self.definition.id,
            amount: self.amount,
            attributes: self.attributes.clone(),
            components: self.components.clone(),
        }
    }

    /// Overwrites replicated state in place, keeping observers and owner.
    /// Returns true when anything changed. Amount changes notify observers.
    pub(crate) fn overwrite_from(&mut self, record: &ItemRecord) -> bool {
        let mut changed = false;
        if self.amount != record.amount {
            self.set_amount(record.amount);
            changed = true;
        }
        if self.attributes != record.attributes {
            self.attributes = record.attributes.clone();
            changed = true;
        }
        if self.components != record.components {
            self.components = record.components.clone();
            changed = true;
        }
        changed
    }
}

impl fmt::Debug for ItemInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemInstance")
            .field("id", &self.id)
            .field("definition", &self.definition.id)
            .field("script_name", &self.definition.script_name)
            .field("amount", &self.amount)
            .field("owner", &self.owner)
            .field("has_hook", &self.hook.is_some())
            .field("observers", &self.observers)
            .finish()
    }
}
