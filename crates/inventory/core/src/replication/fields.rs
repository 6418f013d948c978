use bitflags::bitflags;

use crate::item::ItemRecord;

bitflags! {
    /// Which parts of a replicated entry changed since the receiving
    /// observer's acknowledged sequence.
    ///
    /// A freshly tracked entry reports every field, as does one whose
    /// history was compacted past the observer's base.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct RecordFields: u8 {
        const AMOUNT     = 1 << 0;
        const ATTRIBUTES = 1 << 1;
        const COMPONENTS = 1 << 2;
        const ORDER      = 1 << 3;
    }
}

impl RecordFields {
    pub(super) fn between(
        before_order: u64,
        before: &ItemRecord,
        after_order: u64,
        after: &ItemRecord,
    ) -> Self {
        debug_assert_eq!(before.id, after.id, "Cannot compare records with different IDs");

        let mut fields = RecordFields::empty();
        if before.amount != after.amount {
            fields |= RecordFields::AMOUNT;
        }
        if before.attributes != after.attributes {
            fields |= RecordFields::ATTRIBUTES;
        }
        if before.components != after.components {
            fields |= RecordFields::COMPONENTS;
        }
        if before_order != after_order {
            fields |= RecordFields::ORDER;
        }
        fields
    }
}
