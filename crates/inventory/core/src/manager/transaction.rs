//! Serializable inventory transactions.
use crate::ids::{ContainerId, ItemId};
use crate::source::SourceRef;

/// Every cross-entity mutation a manager accepts.
///
/// The same value is executed speculatively on the issuing client and
/// authoritatively on the server.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Transaction {
    // ========================================================================
    // Container
    // ========================================================================
    /// Moves a whole item from `source` into `container`, merging into the
    /// first matching stack when one exists.
    AddItem {
        source: SourceRef,
        container: ContainerId,
        item: ItemId,
    },

    /// Removes and destroys an item.
    RemoveItem { container: ContainerId, item: ItemId },

    /// Merges `item` (taken from `source`) onto `target` in `container`.
    StackItem {
        source: SourceRef,
        container: ContainerId,
        item: ItemId,
        target: ItemId,
    },

    /// Splits `amount` units off `item` into a new stack in the same container.
    SplitItem {
        container: ContainerId,
        item: ItemId,
        amount: u32,
    },

    // ========================================================================
    // Equipment
    // ========================================================================
    /// Equips one unit of an item taken from `source`. Any surplus stays in
    /// the source under the original id.
    Equip {
        source: SourceRef,
        slot: String,
        item: ItemId,
    },

    /// Unequips and destroys the occupant.
    Unequip { slot: String },

    // ========================================================================
    // Compound moves
    // ========================================================================
    /// Moves between containers. Without `full_stack`, an item holding more
    /// than its nominal stack only gives up one nominal stack.
    MoveContainerToContainer {
        from: ContainerId,
        to: ContainerId,
        item: ItemId,
        full_stack: bool,
    },

    /// Equips one unit; any surplus stays behind as a new stack.
    MoveContainerToSlot {
        from: ContainerId,
        slot: String,
        item: ItemId,
    },

    MoveSlotToContainer { slot: String, to: ContainerId },

    /// Moves the occupant of `from` into `to`, swapping if `to` is occupied.
    MoveSlotToSlot { from: String, to: String },
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum TransactionKind {
    AddItem,
    RemoveItem,
    StackItem,
    SplitItem,
    Equip,
    Unequip,
    MoveContainerToContainer,
    MoveContainerToSlot,
    MoveSlotToContainer,
    MoveSlotToSlot,
}

impl Transaction {
    pub fn kind(&self) -> TransactionKind {
        match self {
            Transaction::AddItem { .. } => TransactionKind::AddItem,
            Transaction::RemoveItem { .. } => TransactionKind::RemoveItem,
            Transaction::StackItem { .. } => TransactionKind::StackItem,
            Transaction::SplitItem { .. } => TransactionKind::SplitItem,
            Transaction::Equip { .. } => TransactionKind::Equip,
            Transaction::Unequip { .. } => TransactionKind::Unequip,
            Transaction::MoveContainerToContainer { .. } => TransactionKind::MoveContainerToContainer,
            Transaction::MoveContainerToSlot { .. } => TransactionKind::MoveContainerToSlot,
            Transaction::MoveSlotToContainer { .. } => TransactionKind::MoveSlotToContainer,
            Transaction::MoveSlotToSlot { .. } => TransactionKind::MoveSlotToSlot,
        }
    }
}

/// What an executed transaction produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Applied {
    /// Instance now holding the moved, split or equipped units, if any remain.
    pub item: Option<ItemId>,
}

impl Applied {
    pub(super) fn item(id: ItemId) -> Self {
        Self { item: Some(id) }
    }

    pub(super) fn nothing() -> Self {
        Self { item: None }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn kinds_render_in_snake_case() {
        let tx = Transaction::MoveSlotToSlot {
            from: "Hands".into(),
            to: "Back".into(),
        };
        assert_eq!(tx.kind().to_string(), "move_slot_to_slot");
        assert_eq!(
            TransactionKind::from_str("SPLIT_ITEM"),
            Ok(TransactionKind::SplitItem)
        );
    }
}
