//! Unified error types surfaced by the runtime API.
//!
//! Wraps failures from worker coordination, the wire codec, layout building
//! and local transaction rejection so clients can bubble them up with
//! consistent context.
use std::fmt;
use std::time::Duration;

use inventory_content::LayoutError;
use inventory_core::{ControllerId, InventoryError};
use thiserror::Error;
use tokio::sync::oneshot;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("{worker} worker command channel closed")]
    CommandChannelClosed { worker: WorkerKind },

    #[error("worker reply channel closed")]
    ReplyChannelClosed(#[source] oneshot::error::RecvError),

    #[error("worker join failed")]
    WorkerJoin(#[source] tokio::task::JoinError),

    /// The local prediction failed; nothing was forwarded.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error("wire codec failure")]
    Codec(#[from] bincode::Error),

    #[error("unknown client {0}")]
    UnknownClient(ControllerId),

    #[error("client {0} is already connected")]
    DuplicateClient(ControllerId),

    #[error("session requires an item catalog before building")]
    MissingCatalog,

    #[error("session requires an inventory layout before building")]
    MissingLayout,

    #[error("failed to build inventory layout")]
    Layout(#[from] LayoutError),

    #[error("transport did not settle within {0:?}")]
    SettleTimeout(Duration),

    #[error("invalid runtime configuration: {0}")]
    Config(String),
}

impl RuntimeError {
    /// The inventory error behind a local rejection, if that is what this is.
    pub fn as_inventory(&self) -> Option<&InventoryError> {
        match self {
            RuntimeError::Inventory(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WorkerKind {
    Server,
    Client,
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WorkerKind::Server => "server",
            WorkerKind::Client => "client",
        };
        write!(f, "{}", label)
    }
}
