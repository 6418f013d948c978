//! Versioned, incremental replication of container and slot membership.
//!
//! The authority keeps a [`ReplicationSet`] per manager. Each capture diffs
//! the live state of every replicated target against the tracked entries and
//! stamps whatever changed with one new sequence number. Observers receive
//! [`ReplicationDelta`]s computed against the sequence they last
//! acknowledged; tombstones are compacted once every observer has moved past
//! them.
//!
//! The client half, [`ReplicaMirror`], folds deltas into a mirror of the
//! authoritative view and then overwrites local (possibly speculative) state
//! to match it. There is no per-transaction pending state: a rejected
//! speculation simply disappears at the next reconciliation.
mod delta;
mod fields;
mod mirror;
mod set;

use core::fmt;

use crate::ids::{ContainerId, ItemId, SourceId};

pub use delta::{EntryUpdate, ReplicationDelta, TargetUpdate};
pub use fields::RecordFields;
pub use mirror::{Reconciliation, ReplicaMirror};
pub use set::{ReplicationSet, TargetView};

/// A replicated membership target.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TargetRef {
    Container(ContainerId),
    Slot(String),
    Source(SourceId),
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetRef::Container(id) => write!(f, "{id}"),
            TargetRef::Slot(name) => write!(f, "slot `{name}`"),
            TargetRef::Source(id) => write!(f, "{id}"),
        }
    }
}

/// One item under one target.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntryKey {
    pub target: TargetRef,
    pub item: ItemId,
}

impl EntryKey {
    pub fn new(target: TargetRef, item: ItemId) -> Self {
        Self { target, item }
    }
}
