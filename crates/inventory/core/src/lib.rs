//! Inventory model shared by the authoritative server and predicting clients.
//!
//! `inventory-core` defines item identity and amount semantics, container
//! and slot membership rules, the attribute engine, and the transaction and
//! replication model. Everything here is synchronous and deterministic: the
//! authority and a client run the exact same code, and all cross-entity
//! mutation flows through [`InventoryManager`].
pub mod attribute;
pub mod config;
pub mod container;
pub mod env;
pub mod error;
pub mod events;
pub mod ids;
pub mod inventory;
pub mod item;
pub mod manager;
pub mod observe;
pub mod placement;
pub mod replication;
pub mod slot;
pub mod snapshot;
pub mod source;
pub mod tags;

pub use attribute::{
    AttributeError, AttributeSpec, AttributeState, AttributeValue, Modifier, ModifierOp,
    ModifierSpec,
};
pub use config::InventoryConfig;
pub use container::{Container, Withdrawal};
pub use env::{AttributeSet, ComponentState, DefinitionCatalog, DefinitionOracle, ItemDefinition};
pub use error::{ClassifiedError, FailureClass, InventoryError};
pub use events::{AmountChanged, AvailabilityChanged, ContainerChanged, InventoryEvent, SlotChanged};
pub use ids::{ContainerId, ControllerId, DefinitionId, ItemId, ModifierHandle, SourceId};
pub use inventory::Inventory;
pub use item::{ItemFactory, ItemHook, ItemInstance, ItemRecord, Owner};
pub use manager::{
    Applied, ExecutionContext, InventoryManager, NoLink, Role, ServerLink, ServerRequest,
    Submitted, Transaction, TransactionKind,
};
pub use observe::{ObserverId, Observers};
pub use placement::{Placement, Refused};
pub use replication::{
    EntryKey, EntryUpdate, Reconciliation, RecordFields, ReplicaMirror, ReplicationDelta,
    ReplicationSet, TargetRef, TargetUpdate, TargetView,
};
pub use slot::{EquipmentSet, EquipmentSlot, SlotState};
pub use snapshot::{ContainerSnapshot, InventorySnapshot, SlotSnapshot, SourceSnapshot};
pub use source::{ItemSource, NoSources, SourceProvider, SourceRef, WorldSources};
pub use tags::{Tag, TagSet};
