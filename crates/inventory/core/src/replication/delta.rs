use crate::item::ItemRecord;

use super::{EntryKey, RecordFields, TargetRef};

/// A target that became replicated, or whose availability changed.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TargetUpdate {
    pub target: TargetRef,
    /// Slot availability; `None` for containers and sources.
    pub available: Option<bool>,
}

/// Current state of one replicated entry.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntryUpdate {
    pub target: TargetRef,
    pub order: u64,
    pub record: ItemRecord,
    pub fields: RecordFields,
}

impl EntryUpdate {
    pub fn key(&self) -> EntryKey {
        EntryKey::new(self.target.clone(), self.record.id)
    }
}

/// Everything an observer needs to move from `base` to `sequence`.
///
/// Entries carry their latest state, not a history, so applying the same
/// delta twice is harmless.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReplicationDelta {
    /// Sequence the observer had acknowledged when this delta was cut.
    pub base: u64,
    /// Sequence the observer reaches after applying this delta.
    pub sequence: u64,
    pub retired: Vec<TargetRef>,
    pub targets: Vec<TargetUpdate>,
    pub removals: Vec<EntryKey>,
    pub upserts: Vec<EntryUpdate>,
}

impl ReplicationDelta {
    pub fn empty(base: u64, sequence: u64) -> Self {
        Self {
            base,
            sequence,
            retired: Vec::new(),
            targets: Vec::new(),
            removals: Vec::new(),
            upserts: Vec::new(),
        }
    }

    /// True when applying the delta changes nothing but the sequence.
    pub fn is_empty(&self) -> bool {
        self.retired.is_empty()
            && self.targets.is_empty()
            && self.removals.is_empty()
            && self.upserts.is_empty()
    }

    /// Entries carried (upserts plus removals).
    pub fn entry_count(&self) -> usize {
        self.removals.len() + self.upserts.len()
    }
}
