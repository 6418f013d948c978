//! Event types for different topics.

use inventory_core::{ControllerId, FailureClass, InventoryEvent, ItemId, TransactionKind};
use serde::{Deserialize, Serialize};

/// Which half of the session produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Server,
    Client,
}

/// An observation from a client-side inventory, republished from the
/// entity's own observer list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryFeedEvent {
    pub controller: ControllerId,
    pub event: InventoryEvent,
}

/// Events related to delta traffic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReplicationEvent {
    /// The authority shipped a delta to a client
    DeltaSent {
        controller: ControllerId,
        base: u64,
        sequence: u64,
        entries: usize,
    },

    /// A client folded a delta into its mirror and reconciled local state
    DeltaApplied {
        controller: ControllerId,
        sequence: u64,
        /// The delta was older than what the mirror already held.
        stale: bool,
        containers_changed: usize,
        unresolved: usize,
        /// Targets the authority stopped replicating to this client.
        retired: usize,
    },

    /// The authority recorded a client acknowledgement
    Acknowledged { controller: ControllerId, sequence: u64 },
}

/// Events related to the transaction lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransactionEvent {
    /// A client executed a transaction speculatively
    Predicted {
        controller: ControllerId,
        kind: TransactionKind,
        item: Option<ItemId>,
    },

    /// A client sent a transaction to the authority
    Forwarded {
        controller: ControllerId,
        kind: TransactionKind,
    },

    /// A client refused a transaction locally; nothing was forwarded
    Rejected {
        controller: ControllerId,
        kind: TransactionKind,
        code: String,
    },

    /// The authority executed a request
    Applied {
        controller: ControllerId,
        kind: TransactionKind,
        item: Option<ItemId>,
    },

    /// The authority declined a request; the client hears nothing but the
    /// next delta
    Declined {
        controller: ControllerId,
        kind: TransactionKind,
        code: String,
        class: FailureClass,
    },

    /// The authority dropped an undecodable or unroutable frame
    Dropped {
        connection: ControllerId,
        side: Side,
        reason: String,
    },
}
