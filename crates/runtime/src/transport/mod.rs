//! In-process transport between the authority and its clients.
//!
//! - [`wire`]: bincode frames for both directions
//! - [`link`]: reliable ordered links with optional simulated latency
//!
//! Links carry encoded bytes, so every frame crosses the same codec a real
//! socket would.

pub mod link;
pub mod wire;

pub use link::{Envelope, Link, Uplink, spawn_relay};
pub use wire::{ClientFrame, MAX_FRAME_BYTES, ServerFrame};
