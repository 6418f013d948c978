//! Item instances, their lifecycle hooks, and the factory that mints them.
//!
//! An [`ItemInstance`] is one stack: a unique id, a shared definition, an
//! amount and per-instance attribute and component state. Splitting and
//! stacking are container-level operations; an instance only knows how to
//! change its own amount and whether it can merge with another.
mod factory;
mod hook;
mod instance;

pub use factory::ItemFactory;
pub use hook::ItemHook;
pub use instance::{ItemInstance, ItemRecord, Owner};
