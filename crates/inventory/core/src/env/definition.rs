use std::collections::BTreeMap;

use crate::attribute::AttributeSpec;
use crate::ids::DefinitionId;
use crate::tags::TagSet;

/// Immutable item template.
///
/// # Stacking
///
/// - `stackable == false`: every instance stays a single stack.
/// - `stack_amount` is the nominal "one full stack" used by partial transfers.
/// - `stack_maximum`, when set, stops an instance from accepting merges once
///   its amount reaches the maximum.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ItemDefinition {
    pub id: DefinitionId,
    pub script_name: String,
    pub tags: TagSet,
    pub stackable: bool,
    pub stack_amount: u32,
    pub stack_maximum: Option<u32>,
    pub components: Vec<ComponentState>,
    pub attribute_sets: Vec<AttributeSet>,
    /// Merged after `attribute_sets`; a tag already present is skipped.
    pub additive_attributes: Vec<AttributeSpec>,
}

impl ItemDefinition {
    pub fn new(id: DefinitionId, script_name: impl Into<String>, tags: TagSet) -> Self {
        Self {
            id,
            script_name: script_name.into(),
            tags,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn stackable(mut self, stack_amount: u32) -> Self {
        self.stackable = true;
        self.stack_amount = stack_amount.max(1);
        self
    }

    #[must_use]
    pub fn with_stack_maximum(mut self, maximum: u32) -> Self {
        self.stack_maximum = Some(maximum);
        self
    }

    #[must_use]
    pub fn with_component(mut self, component: ComponentState) -> Self {
        self.components.push(component);
        self
    }

    #[must_use]
    pub fn with_attribute_set(mut self, set: AttributeSet) -> Self {
        self.attribute_sets.push(set);
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, spec: AttributeSpec) -> Self {
        self.additive_attributes.push(spec);
        self
    }

    /// Every attribute spec in merge order: sets first, then additive ones.
    pub fn attribute_specs(&self) -> impl Iterator<Item = &AttributeSpec> {
        self.attribute_sets
            .iter()
            .flat_map(|set| set.attributes.iter())
            .chain(self.additive_attributes.iter())
    }
}

impl Default for ItemDefinition {
    fn default() -> Self {
        Self {
            id: DefinitionId::default(),
            script_name: String::new(),
            tags: TagSet::new(),
            stackable: false,
            stack_amount: 1,
            stack_maximum: None,
            components: Vec::new(),
            attribute_sets: Vec::new(),
            additive_attributes: Vec::new(),
        }
    }
}

/// Named group of attribute specs shared between definitions.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributeSet {
    pub name: String,
    pub attributes: Vec<AttributeSpec>,
}

impl AttributeSet {
    pub fn new(name: impl Into<String>, attributes: impl IntoIterator<Item = AttributeSpec>) -> Self {
        Self {
            name: name.into(),
            attributes: attributes.into_iter().collect(),
        }
    }
}

/// Component attached to an item, with instance-specific state.
///
/// Definitions carry the template; each instance owns a copy. Two instances
/// only stack when their component states compare equal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ComponentState {
    pub name: String,
    pub properties: BTreeMap<String, i64>,
}

impl ComponentState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: i64) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn property(&self, key: &str) -> Option<i64> {
        self.properties.get(key).copied()
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: i64) {
        self.properties.insert(key.into(), value);
    }
}
