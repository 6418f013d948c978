//! Transaction coordinator for one pawn's inventory.
//!
//! Every operation follows the same path:
//! 1. **Reject early**: no controlling identity, or structural validation fails
//! 2. **Predict**: a locally controlled client executes speculatively
//! 3. **Forward**: clients hand the transaction to the authority through [`ServerLink`]
//! 4. **Authoritative apply**: the server validates the untrusted request again and executes
//!
//! ## Authority model
//!
//! - The authority owns the truth. A declined request is a silent no-op on
//!   its state; the client learns about it from the next replication delta.
//! - Clients keep no pending-transaction bookkeeping. Reconciliation
//!   overwrites their local state with the mirrored authoritative view.
//!
//! ## Modules
//!
//! - `transaction`: the serializable [`Transaction`] value
//! - `validation`: structural checks shared by both sides
//! - `execute` / `moves`: check-then-act execution

mod execute;
mod moves;
mod transaction;
mod validation;

use tracing::debug;

use crate::config::InventoryConfig;
use crate::env::DefinitionOracle;
use crate::error::{ClassifiedError, InventoryError};
use crate::ids::{ContainerId, ControllerId, SourceId};
use crate::inventory::Inventory;
use crate::item::ItemFactory;
use crate::replication::{
    Reconciliation, ReplicaMirror, ReplicationDelta, ReplicationSet, TargetRef, TargetView,
};
use crate::source::{SourceProvider, WorldSources};

// ============================================================================
// Public Exports
// ============================================================================

pub use execute::ExecutionContext;
pub use transaction::{Applied, Transaction, TransactionKind};

// ============================================================================
// Transport seam
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Role {
    /// Holds the authoritative copy and executes untrusted requests.
    Authority,
    /// Predicts locally and forwards to the authority.
    Client,
}

/// A transaction on its way to the authority.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServerRequest {
    pub controller: ControllerId,
    pub transaction: Transaction,
}

/// Reliable, ordered channel to the authority. One call per transaction.
pub trait ServerLink {
    fn forward(&mut self, request: ServerRequest);
}

/// Link for managers that never forward (the authority itself, tests).
#[derive(Clone, Copy, Debug, Default)]
pub struct NoLink;

impl ServerLink for NoLink {
    fn forward(&mut self, _request: ServerRequest) {}
}

impl ServerLink for Vec<ServerRequest> {
    fn forward(&mut self, request: ServerRequest) {
        self.push(request);
    }
}

/// How a submitted transaction was handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Submitted {
    /// Executed against authoritative state.
    Applied(Applied),
    /// Sent to the authority; `speculative` holds the local prediction.
    Forwarded { speculative: Option<Applied> },
}

// ============================================================================
// Manager
// ============================================================================

#[derive(Debug)]
pub struct InventoryManager {
    role: Role,
    controller: Option<ControllerId>,
    locally_controlled: bool,
    inventory: Inventory,
    config: InventoryConfig,
    replication: ReplicationSet,
    mirror: ReplicaMirror,
}

impl InventoryManager {
    pub fn new(role: Role, inventory: Inventory, config: InventoryConfig) -> Self {
        let replication = ReplicationSet::new(config.max_delta_entries);
        Self {
            role,
            controller: None,
            locally_controlled: false,
            inventory,
            config,
            replication,
            mirror: ReplicaMirror::new(),
        }
    }

    /// Authority-side manager for the pawn possessed by `controller`.
    pub fn authority(controller: ControllerId, inventory: Inventory, config: InventoryConfig) -> Self {
        let mut manager = Self::new(Role::Authority, inventory, config);
        manager.controller = Some(controller);
        manager
    }

    /// Client-side manager for the locally controlled pawn.
    pub fn client(controller: ControllerId, inventory: Inventory, config: InventoryConfig) -> Self {
        let mut manager = Self::new(Role::Client, inventory, config);
        manager.controller = Some(controller);
        manager.locally_controlled = true;
        manager
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn controller(&self) -> Option<ControllerId> {
        self.controller
    }

    /// Possession changes hand the manager to another controller (or none).
    pub fn set_controller(&mut self, controller: Option<ControllerId>, locally_controlled: bool) {
        self.controller = controller;
        self.locally_controlled = controller.is_some() && locally_controlled;
    }

    pub fn is_locally_controlled(&self) -> bool {
        self.locally_controlled
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    /// Direct access for setup and observer registration. Mutations made
    /// here bypass prediction and are overwritten on clients.
    pub fn inventory_mut(&mut self) -> &mut Inventory {
        &mut self.inventory
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    pub fn replication(&self) -> &ReplicationSet {
        &self.replication
    }

    pub fn mirror(&self) -> &ReplicaMirror {
        &self.mirror
    }

    // ===== transactions =====

    /// Issues a transaction from the local actor.
    pub fn submit(
        &mut self,
        transaction: Transaction,
        sources: &mut dyn SourceProvider,
        oracle: &dyn DefinitionOracle,
        link: &mut dyn ServerLink,
    ) -> Result<Submitted, InventoryError> {
        let Some(controller) = self.controller else {
            debug!(kind = %transaction.kind(), "transaction rejected: no controller");
            return Err(InventoryError::NoController);
        };
        self.validate(&transaction, sources)?;

        match self.role {
            Role::Authority => self
                .execute(&transaction, sources, oracle)
                .map(Submitted::Applied),
            Role::Client => {
                let speculative = if self.locally_controlled {
                    Some(self.execute(&transaction, sources, oracle)?)
                } else {
                    None
                };
                link.forward(ServerRequest {
                    controller,
                    transaction,
                });
                Ok(Submitted::Forwarded { speculative })
            }
        }
    }

    /// Executes a request received from a client. Only the authority accepts
    /// these, and only from the controller that owns this inventory.
    pub fn handle_remote(
        &mut self,
        request: &ServerRequest,
        sources: &mut dyn SourceProvider,
        oracle: &dyn DefinitionOracle,
    ) -> Result<Applied, InventoryError> {
        if self.role != Role::Authority {
            return Err(InventoryError::NotAuthority);
        }
        if self.controller != Some(request.controller) {
            debug!(controller = %request.controller, "request from foreign controller dropped");
            return Err(InventoryError::Unauthorized {
                controller: request.controller,
            });
        }
        self.validate(&request.transaction, sources)?;
        self.execute(&request.transaction, sources, oracle)
    }

    fn validate(&self, transaction: &Transaction, sources: &dyn SourceProvider) -> Result<(), InventoryError> {
        validation::validate(transaction, &self.inventory, sources).inspect_err(|err| {
            debug!(
                kind = %transaction.kind(),
                code = err.error_code(),
                "transaction failed validation: {err}"
            );
        })
    }

    fn execute(
        &mut self,
        transaction: &Transaction,
        sources: &mut dyn SourceProvider,
        oracle: &dyn DefinitionOracle,
    ) -> Result<Applied, InventoryError> {
        let mut ctx = ExecutionContext::new(
            &mut self.inventory,
            sources,
            ItemFactory::new(oracle),
            &self.config,
        );
        execute::execute(transaction, &mut ctx).inspect_err(|err| {
            debug!(
                kind = %transaction.kind(),
                role = ?self.role,
                code = err.error_code(),
                class = err.class().as_str(),
                "transaction declined: {err}"
            );
        })
    }

    // ===== replication (authority) =====

    /// Registers every container and slot of the pawn as replicated targets
    /// and the owning controller as an observer.
    pub fn setup(&mut self) -> Result<(), InventoryError> {
        if self.role != Role::Authority {
            return Err(InventoryError::NotAuthority);
        }
        for id in self.inventory.container_ids() {
            self.replication.add_target(TargetRef::Container(id));
        }
        for name in self.inventory.slot_names() {
            self.replication.add_target(TargetRef::Slot(name));
        }
        if let Some(controller) = self.controller {
            self.replication.add_observer(controller);
        }
        Ok(())
    }

    /// Stops replicating everything (pawn unpossessed).
    pub fn reset(&mut self) {
        self.replication.clear();
    }

    pub fn replicate_container(&mut self, id: ContainerId) -> Result<bool, InventoryError> {
        if self.inventory.container(id).is_none() {
            return Err(InventoryError::UnknownContainer(id));
        }
        Ok(self.replication.add_target(TargetRef::Container(id)))
    }

    pub fn stop_replicating_container(&mut self, id: ContainerId) -> bool {
        self.replication.remove_target(&TargetRef::Container(id))
    }

    pub fn replicate_slot(&mut self, name: &str) -> Result<bool, InventoryError> {
        if self.inventory.slot(name).is_none() {
            return Err(InventoryError::UnknownSlot(name.to_owned()));
        }
        Ok(self.replication.add_target(TargetRef::Slot(name.to_owned())))
    }

    pub fn stop_replicating_slot(&mut self, name: &str) -> bool {
        self.replication.remove_target(&TargetRef::Slot(name.to_owned()))
    }

    /// Shares a world source (loot chest) with this manager's observers.
    pub fn replicate_source(&mut self, id: SourceId) -> bool {
        self.replication.add_target(TargetRef::Source(id))
    }

    pub fn stop_replicating_source(&mut self, id: SourceId) -> bool {
        self.replication.remove_target(&TargetRef::Source(id))
    }

    pub fn add_observer(&mut self, observer: ControllerId) {
        self.replication.add_observer(observer);
    }

    pub fn remove_observer(&mut self, observer: ControllerId) -> bool {
        self.replication.remove_observer(observer)
    }

    /// Diffs the inventory (and any replicated world sources) into the
    /// replication set. Returns the new sequence if anything changed.
    pub fn capture(&mut self, sources: Option<&WorldSources>) -> Option<u64> {
        let mut views: Vec<TargetView> = self
            .inventory
            .containers()
            .map(TargetView::container)
            .chain(self.inventory.equipment().slots().map(TargetView::slot))
            .collect();
        if let Some(world) = sources {
            views.extend(
                world
                    .iter()
                    .filter(|(id, _)| self.replication.is_replicated(&TargetRef::Source(*id)))
                    .map(|(id, container)| TargetView::source(id, container)),
            );
        }
        self.replication.capture(views)
    }

    pub fn delta_for(&self, observer: ControllerId) -> Option<ReplicationDelta> {
        self.replication.delta_for(observer)
    }

    pub fn acknowledge(&mut self, observer: ControllerId, sequence: u64) {
        self.replication.acknowledge(observer, sequence);
    }

    pub fn has_pending(&self, observer: ControllerId) -> bool {
        self.replication.has_pending(observer)
    }

    // ===== reconciliation (client) =====

    /// Folds an authoritative delta into the mirror and overwrites local
    /// state to match. Reconciliation runs even for stale deltas so that a
    /// declined speculation is undone by the reply that follows it.
    pub fn apply_delta(
        &mut self,
        delta: &ReplicationDelta,
        sources: Option<&mut WorldSources>,
        oracle: &dyn DefinitionOracle,
    ) -> Result<Reconciliation, InventoryError> {
        if self.role != Role::Client {
            return Err(InventoryError::NotClient);
        }
        if !self.mirror.apply(delta) {
            debug!(sequence = delta.sequence, applied = self.mirror.applied(), "stale delta");
        }
        let factory = ItemFactory::new(oracle);
        Ok(self.mirror.reconcile(&mut self.inventory, sources, &factory))
    }
}
