//! Cloneable façades for issuing commands to the workers.
//!
//! [`ClientHandle`] and [`ServerHandle`] hide channel plumbing and offer async
//! helpers for submitting transactions, querying views, or streaming events
//! from specific topics.
use std::collections::HashMap;

use inventory_core::{
    ControllerId, DefinitionId, Inventory, InventorySnapshot, ItemId, Submitted, Transaction,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

use super::errors::{Result, RuntimeError, WorkerKind};
use super::providers::TransactionProvider;
use crate::events::{Event, EventBus, Topic};
use crate::transport::Link;
use crate::workers::{ClientCommand, ClientStatus, ConnectionStatus, GrantTarget, ServerCommand};

/// Outcome of [`ClientHandle::drive`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveReport {
    /// Transactions predicted locally and forwarded.
    pub forwarded: usize,
    /// Transactions the local validation rejected.
    pub rejected: usize,
}

/// Handle to one predicting client
#[derive(Clone)]
pub struct ClientHandle {
    controller: ControllerId,
    command_tx: mpsc::Sender<ClientCommand>,
    event_bus: EventBus,
}

impl ClientHandle {
    pub(crate) fn new(
        controller: ControllerId,
        command_tx: mpsc::Sender<ClientCommand>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            controller,
            command_tx,
            event_bus,
        }
    }

    pub fn controller(&self) -> ControllerId {
        self.controller
    }

    /// Predicts `transaction` locally and forwards it to the authority.
    ///
    /// Fails with [`RuntimeError::Inventory`] when the local validation or
    /// prediction rejects it; nothing is forwarded in that case.
    pub async fn submit(&self, transaction: Transaction) -> Result<Submitted> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ClientCommand::Submit {
            transaction,
            reply: reply_tx,
        })
        .await?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)?
    }

    /// The client's current view, including unconfirmed predictions.
    pub async fn view(&self) -> Result<InventorySnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ClientCommand::View { reply: reply_tx }).await?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)
    }

    pub async fn status(&self) -> Result<ClientStatus> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ClientCommand::Status { reply: reply_tx }).await?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)
    }

    /// Pulls transactions from `provider` until it runs dry. Local
    /// rejections are counted and skipped; any other failure stops the loop.
    pub async fn drive(&self, provider: &dyn TransactionProvider) -> Result<DriveReport> {
        let mut report = DriveReport::default();
        loop {
            let view = self.view().await?;
            let Some(transaction) = provider.next_transaction(self.controller, &view).await?
            else {
                break;
            };

            match self.submit(transaction).await {
                Ok(_) => report.forwarded += 1,
                Err(RuntimeError::Inventory(err)) => {
                    debug!(controller = %self.controller, "transaction rejected locally: {err}");
                    report.rejected += 1;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(report)
    }

    /// Subscribe to events from a specific topic
    ///
    /// # Topics
    ///
    /// - `Topic::Inventory` - Observer notifications from client inventories
    /// - `Topic::Replication` - Deltas sent, applied and acknowledged
    /// - `Topic::Transaction` - Predictions, forwards, verdicts and drops
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use inventory_runtime::Topic;
    ///
    /// let mut rx = client.subscribe(Topic::Transaction);
    /// while let Ok(event) = rx.recv().await {
    ///     // Handle transaction events
    /// }
    /// ```
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.event_bus.subscribe(topic)
    }

    pub(crate) async fn shutdown(&self) -> Result<()> {
        self.send(ClientCommand::Shutdown).await
    }

    async fn send(&self, command: ClientCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed {
                worker: WorkerKind::Client,
            })
    }
}

/// Handle to the authoritative server
#[derive(Clone)]
pub struct ServerHandle {
    command_tx: mpsc::Sender<ServerCommand>,
    event_bus: EventBus,
}

impl ServerHandle {
    pub(crate) fn new(command_tx: mpsc::Sender<ServerCommand>, event_bus: EventBus) -> Self {
        Self {
            command_tx,
            event_bus,
        }
    }

    /// Registers `inventory` as the authoritative inventory of `controller`
    /// and ships the initial delta over `downstream`.
    pub async fn connect(
        &self,
        controller: ControllerId,
        inventory: Inventory,
        downstream: Link<Vec<u8>>,
    ) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ServerCommand::Connect {
            controller,
            inventory: Box::new(inventory),
            downstream,
            reply: reply_tx,
        })
        .await?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)?
    }

    pub async fn disconnect(&self, controller: ControllerId) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ServerCommand::Disconnect {
            controller,
            reply: reply_tx,
        })
        .await?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)?
    }

    /// Authoritative view of one client's inventory plus the shared sources.
    pub async fn view(&self, controller: ControllerId) -> Result<InventorySnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ServerCommand::View {
            controller,
            reply: reply_tx,
        })
        .await?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)?
    }

    pub async fn status(&self) -> Result<Vec<ConnectionStatus>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ServerCommand::Status { reply: reply_tx }).await?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)
    }

    /// Spawns `amount` units of `definition` into `target` on the authority.
    pub async fn grant(
        &self,
        target: GrantTarget,
        definition: DefinitionId,
        amount: u32,
    ) -> Result<ItemId> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ServerCommand::Grant {
            target,
            definition,
            amount,
            reply: reply_tx,
        })
        .await?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)?
    }

    pub async fn set_availability(
        &self,
        controller: ControllerId,
        slot: impl Into<String>,
        available: bool,
    ) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(ServerCommand::SetAvailability {
            controller,
            slot: slot.into(),
            available,
            reply: reply_tx,
        })
        .await?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)?
    }

    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.event_bus.subscribe(topic)
    }

    /// Subscribe to multiple topics at once
    pub fn subscribe_multiple(&self, topics: &[Topic]) -> HashMap<Topic, broadcast::Receiver<Event>> {
        self.event_bus.subscribe_multiple(topics)
    }

    pub(crate) async fn shutdown(&self) -> Result<()> {
        self.send(ServerCommand::Shutdown).await
    }

    async fn send(&self, command: ServerCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed {
                worker: WorkerKind::Server,
            })
    }
}
