use std::sync::Arc;

use tracing::debug;

use crate::attribute::AttributeState;
use crate::env::{DefinitionOracle, ItemDefinition};
use crate::ids::{DefinitionId, ItemId};

use super::{ItemInstance, ItemRecord};

/// Mints item instances from definitions.
///
/// Every path resolves the definition through the oracle, so a missing
/// template surfaces as `None` (an allocation failure) instead of a
/// half-built instance.
#[derive(Clone, Copy)]
pub struct ItemFactory<'a> {
    oracle: &'a dyn DefinitionOracle,
}

impl<'a> ItemFactory<'a> {
    pub fn new(oracle: &'a dyn DefinitionOracle) -> Self {
        Self { oracle }
    }

    pub fn oracle(&self) -> &'a dyn DefinitionOracle {
        self.oracle
    }

    /// Clones `source`'s definition into a brand-new instance with a fresh id
    /// and amount 1. Component state and the lifecycle hook are copied from
    /// the source so the result stacks back onto it.
    pub fn generate_item(&self, source: Option<&ItemInstance>) -> Option<ItemInstance> {
        let source = source?;
        let definition = self.lookup(source.definition_id())?;
        let attributes = attributes_for(&definition);
        Some(ItemInstance::initialize(
            ItemId::allocate(),
            definition,
            1,
            attributes,
            source.components().to_vec(),
            source.hook().cloned(),
        ))
    }

    /// Creates a fresh instance straight from a definition.
    pub fn spawn(&self, definition: DefinitionId, amount: u32) -> Option<ItemInstance> {
        if amount == 0 {
            return None;
        }
        let definition = self.lookup(definition)?;
        let attributes = attributes_for(&definition);
        let components = definition.components.clone();
        Some(ItemInstance::initialize(
            ItemId::allocate(),
            definition,
            amount,
            attributes,
            components,
            None,
        ))
    }

    /// Rebuilds an instance received through replication, keeping its id.
    pub fn rebuild(&self, record: &ItemRecord) -> Option<ItemInstance> {
        let definition = self.lookup(record.definition)?;
        ItemId::reserve_through(record.id);
        Some(ItemInstance::initialize(
            record.id,
            definition,
            record.amount,
            record.attributes.clone(),
            record.components.clone(),
            None,
        ))
    }

    fn lookup(&self, id: DefinitionId) -> Option<Arc<ItemDefinition>> {
        let definition = self.oracle.definition(id);
        if definition.is_none() {
            debug!(definition = ?id, "definition lookup failed");
        }
        definition
    }
}

fn attributes_for(definition: &ItemDefinition) -> AttributeState {
    AttributeState::from_specs(definition.attribute_specs().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{AttributeSpec, ModifierSpec};
    use crate::env::{AttributeSet, DefinitionCatalog};
    use crate::tags::{Tag, TagSet};

    fn catalog() -> DefinitionCatalog {
        [ItemDefinition::new(DefinitionId(7), "arrow", TagSet::from_iter(["Ammo"]))
            .stackable(20)
            .with_attribute_set(AttributeSet::new(
                "Projectile",
                [AttributeSpec::new("Damage", 4.0, 0.0, 50.0)],
            ))
            .with_attribute(AttributeSpec::new("Damage", 99.0, 0.0, 99.0))
            .with_attribute(AttributeSpec::unbounded("Weight", 0.1))]
        .into_iter()
        .collect()
    }

    #[test]
    fn generated_items_get_fresh_ids_and_amount_one() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let source = factory.spawn(DefinitionId(7), 12).unwrap();

        let copy = factory.generate_item(Some(&source)).unwrap();
        assert!(copy.id() > source.id());
        assert_eq!(copy.amount(), 1);
        assert_eq!(copy.definition_id(), source.definition_id());
        assert!(copy.matches(&source));
    }

    #[test]
    fn generation_fails_without_source_or_definition() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        assert!(factory.generate_item(None).is_none());
        assert!(factory.spawn(DefinitionId(99), 1).is_none());
        assert!(factory.spawn(DefinitionId(7), 0).is_none());

        let source = factory.spawn(DefinitionId(7), 1).unwrap();
        let empty = DefinitionCatalog::new();
        assert!(ItemFactory::new(&empty).generate_item(Some(&source)).is_none());
    }

    #[test]
    fn first_attribute_spec_for_a_tag_wins() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let arrow = factory.spawn(DefinitionId(7), 1).unwrap();
        assert_eq!(arrow.attribute_value(&Tag::from("Damage")), Some(4.0));
        assert_eq!(arrow.attribute_value(&Tag::from("Weight")), Some(0.1));
    }

    #[test]
    fn generated_items_start_without_modifiers() {
        let catalog = catalog();
        let factory = ItemFactory::new(&catalog);
        let mut source = factory.spawn(DefinitionId(7), 3).unwrap();
        source
            .apply_modifier(ModifierSpec::add("Damage", 6.0))
            .unwrap();

        let copy = factory.generate_item(Some(&source)).unwrap();
        assert!(copy.attributes().modifiers().is_empty());
        assert_eq!(copy.attribute_value(&Tag::from("Damage")), Some(4.0));
    }
}
