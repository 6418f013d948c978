//! Common error infrastructure for inventory-core.
//!
//! Every public operation returns a definite outcome; failures are values,
//! never panics. A returned error guarantees that no state was mutated.
//!
//! # Classification
//!
//! - **Precondition**: absent handle, admission tags, amount bounds. The
//!   request itself is wrong and would be wrong on any peer.
//! - **RaceLoss**: a state-dependent check failed. A client's speculative
//!   check may have passed while the authority, which saw another transaction
//!   first, rejects it. Replication repairs the client.
//! - **Allocation**: the factory could not build an instance (definition
//!   lookup failed). The enclosing operation declines as a whole.
use thiserror::Error;

use crate::attribute::AttributeError;
use crate::ids::{ContainerId, ControllerId, DefinitionId, ItemId, SourceId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FailureClass {
    Precondition,
    RaceLoss,
    Allocation,
}

impl FailureClass {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Precondition => "precondition",
            Self::RaceLoss => "race_loss",
            Self::Allocation => "allocation",
        }
    }

    /// Race losses may succeed if re-issued against newer state.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::RaceLoss)
    }

    /// Allocation failures point at missing content rather than bad input.
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Allocation)
    }
}

/// Uniform classification interface for inventory errors.
pub trait ClassifiedError: core::fmt::Display + core::fmt::Debug {
    fn class(&self) -> FailureClass;

    /// Stable machine-readable code, suitable for logs and metrics labels.
    fn error_code(&self) -> &'static str;

    fn is_recoverable(&self) -> bool {
        self.class().is_recoverable()
    }
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum InventoryError {
    #[error("no controlling identity")]
    NoController,

    #[error("{controller} does not control this inventory")]
    Unauthorized { controller: ControllerId },

    #[error("operation requires authority")]
    NotAuthority,

    #[error("operation requires a client")]
    NotClient,

    #[error("unknown {0}")]
    UnknownContainer(ContainerId),

    #[error("unknown slot `{0}`")]
    UnknownSlot(String),

    #[error("unknown {0}")]
    UnknownSource(SourceId),

    #[error("{item} is not present")]
    ItemMissing { item: ItemId },

    #[error("{item} is not admitted by its destination")]
    NotAdmitted { item: ItemId },

    #[error("{item} cannot stack onto {target}")]
    NotStackable { item: ItemId, target: ItemId },

    #[error("cannot split {amount} from {item} holding {held}")]
    InvalidSplit { item: ItemId, amount: u32, held: u32 },

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("slot `{slot}` is occupied")]
    SlotOccupied { slot: String },

    #[error("slot `{slot}` is empty")]
    SlotEmpty { slot: String },

    #[error("slot `{slot}` is unavailable")]
    SlotUnavailable { slot: String },

    #[error("source and destination are the same")]
    SameEndpoint,

    #[error("duplicate {0}")]
    DuplicateContainer(ContainerId),

    #[error("duplicate slot `{0}`")]
    DuplicateSlot(String),

    #[error("definition {0:?} is unavailable")]
    DefinitionUnavailable(DefinitionId),

    #[error(transparent)]
    Attribute(#[from] AttributeError),
}

impl ClassifiedError for InventoryError {
    fn class(&self) -> FailureClass {
        match self {
            Self::ItemMissing { .. }
            | Self::NotStackable { .. }
            | Self::InvalidSplit { .. }
            | Self::SlotOccupied { .. }
            | Self::SlotEmpty { .. }
            | Self::SlotUnavailable { .. } => FailureClass::RaceLoss,
            Self::DefinitionUnavailable(_) => FailureClass::Allocation,
            Self::Attribute(err) => err.class(),
            _ => FailureClass::Precondition,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::NoController => "NO_CONTROLLER",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::NotAuthority => "NOT_AUTHORITY",
            Self::NotClient => "NOT_CLIENT",
            Self::UnknownContainer(_) => "UNKNOWN_CONTAINER",
            Self::UnknownSlot(_) => "UNKNOWN_SLOT",
            Self::UnknownSource(_) => "UNKNOWN_SOURCE",
            Self::ItemMissing { .. } => "ITEM_MISSING",
            Self::NotAdmitted { .. } => "NOT_ADMITTED",
            Self::NotStackable { .. } => "NOT_STACKABLE",
            Self::InvalidSplit { .. } => "INVALID_SPLIT",
            Self::ZeroAmount => "ZERO_AMOUNT",
            Self::SlotOccupied { .. } => "SLOT_OCCUPIED",
            Self::SlotEmpty { .. } => "SLOT_EMPTY",
            Self::SlotUnavailable { .. } => "SLOT_UNAVAILABLE",
            Self::SameEndpoint => "SAME_ENDPOINT",
            Self::DuplicateContainer(_) => "DUPLICATE_CONTAINER",
            Self::DuplicateSlot(_) => "DUPLICATE_SLOT",
            Self::DefinitionUnavailable(_) => "DEFINITION_UNAVAILABLE",
            Self::Attribute(err) => err.error_code(),
        }
    }
}
