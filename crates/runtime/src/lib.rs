//! Runtime orchestration for client-predicted, server-reconciled inventories.
//!
//! This crate runs one authoritative server worker and any number of client
//! workers on tokio. Clients predict transactions locally and forward them as
//! byte frames; the server validates, executes, and ships replication deltas
//! back, which clients reconcile against. Consumers embed [`Session`] to wire
//! everything up and interact through [`ClientHandle`] and [`ServerHandle`].
//!
//! Modules are organized by responsibility:
//! - [`session`] hosts the orchestrator, builder and configuration
//! - [`api`] exposes the types downstream clients interact with
//! - [`events`] provides topic-based event bus for flexible event routing
//! - [`transport`] carries frames between workers with simulated latency
//! - [`workers`] keeps background tasks internal to the crate
pub mod api;
pub mod events;
pub mod session;
pub mod transport;

mod workers;

pub use api::{
    ClientHandle, DriveReport, Result, RuntimeError, ScriptedProvider, ServerHandle,
    TransactionProvider, WorkerKind,
};
pub use events::{
    Event, EventBus, InventoryFeedEvent, ReplicationEvent, Side, Topic, TransactionEvent,
};
pub use session::{Convergence, RuntimeConfig, Session, SessionBuilder};
pub use workers::{ClientStatus, ConnectionStatus, GrantTarget};
