//! Asynchronous abstraction for sourcing player intent.
//!
//! Runtime users plug in [`TransactionProvider`] implementations so a client
//! can be driven by UI input, scripted fixtures, or bots.
use std::collections::VecDeque;

use async_trait::async_trait;
use inventory_core::{ControllerId, InventorySnapshot, Transaction};
use tokio::sync::Mutex;

use super::errors::Result;

/// Trait for providing transactions based on a client's current view.
///
/// Different implementations can handle:
/// - Player input (drag and drop, hotkeys)
/// - Scripted or replayed sessions
/// - Testing fixtures
#[async_trait]
pub trait TransactionProvider: Send + Sync {
    /// Provide the next transaction for `controller`.
    ///
    /// # Arguments
    /// * `controller` - The client that is about to act
    /// * `view` - The client's current, possibly speculative, view
    ///
    /// # Returns
    /// `None` once the provider has nothing more to issue.
    async fn next_transaction(
        &self,
        controller: ControllerId,
        view: &InventorySnapshot,
    ) -> Result<Option<Transaction>>;
}

/// Replays a fixed list of transactions in order.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    queue: Mutex<VecDeque<Transaction>>,
}

impl ScriptedProvider {
    pub fn new(transactions: impl IntoIterator<Item = Transaction>) -> Self {
        Self {
            queue: Mutex::new(transactions.into_iter().collect()),
        }
    }

    pub async fn remaining(&self) -> usize {
        self.queue.lock().await.len()
    }
}

#[async_trait]
impl TransactionProvider for ScriptedProvider {
    async fn next_transaction(
        &self,
        _controller: ControllerId,
        _view: &InventorySnapshot,
    ) -> Result<Option<Transaction>> {
        Ok(self.queue.lock().await.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory_core::{ContainerId, ItemId};

    #[tokio::test]
    async fn scripted_provider_drains_in_order() {
        let provider = ScriptedProvider::new([
            Transaction::RemoveItem {
                container: ContainerId(1),
                item: ItemId(4),
            },
            Transaction::RemoveItem {
                container: ContainerId(1),
                item: ItemId(5),
            },
        ]);
        let view = InventorySnapshot::default();

        let first = provider.next_transaction(ControllerId(1), &view).await.unwrap();
        assert!(matches!(first, Some(Transaction::RemoveItem { item: ItemId(4), .. })));
        assert_eq!(provider.remaining().await, 1);

        provider.next_transaction(ControllerId(1), &view).await.unwrap();
        assert!(provider.next_transaction(ControllerId(1), &view).await.unwrap().is_none());
    }
}
