//! Worker tasks that back the runtime orchestration.
//!
//! The server worker owns every authoritative inventory and the shared world
//! sources. Each client worker owns one predicting inventory and talks to the
//! server only through byte frames.

mod client;
mod server;

pub use client::{ClientCommand, ClientStatus, ClientWorker};
pub use server::{ConnectionStatus, GrantTarget, ServerCommand, ServerWorker};
