//! Client worker that owns one speculative inventory.
//!
//! Transactions submitted through [`crate::ClientHandle`] are predicted
//! locally and forwarded over the [`Uplink`]. Deltas from the authority are
//! folded into the manager's mirror, local state is overwritten to match, and
//! the delta is acknowledged.

use std::sync::Arc;

use inventory_core::{
    ClassifiedError, ControllerId, DefinitionCatalog, InventoryEvent, InventoryManager,
    InventorySnapshot, SourceId, Submitted, Transaction, WorldSources,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::api::Result;
use crate::events::{
    Event, EventBus, InventoryFeedEvent, ReplicationEvent, Side, TransactionEvent,
};
use crate::transport::Uplink;
use crate::transport::wire::{self, ServerFrame};

/// Local progress of one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientStatus {
    pub controller: ControllerId,
    /// Requests forwarded to the authority.
    pub submitted: u64,
    /// Highest delta sequence folded into the mirror.
    pub applied: u64,
}

/// Commands that can be sent to a client worker
pub enum ClientCommand {
    Submit {
        transaction: Transaction,
        reply: oneshot::Sender<Result<Submitted>>,
    },
    /// The client's current (possibly speculative) view.
    View {
        reply: oneshot::Sender<InventorySnapshot>,
    },
    Status {
        reply: oneshot::Sender<ClientStatus>,
    },
    Shutdown,
}

pub struct ClientWorker {
    controller: ControllerId,
    manager: InventoryManager,
    world: WorldSources,
    shared: Vec<SourceId>,
    catalog: Arc<DefinitionCatalog>,
    uplink: Uplink,
    command_rx: mpsc::Receiver<ClientCommand>,
    downstream_rx: mpsc::Receiver<Vec<u8>>,
    event_bus: EventBus,
    submitted: u64,
}

impl ClientWorker {
    pub fn new(
        mut manager: InventoryManager,
        mut world: WorldSources,
        catalog: Arc<DefinitionCatalog>,
        uplink: Uplink,
        command_rx: mpsc::Receiver<ClientCommand>,
        downstream_rx: mpsc::Receiver<Vec<u8>>,
        event_bus: EventBus,
    ) -> Self {
        let controller = uplink.connection();
        let shared: Vec<SourceId> = world.ids().collect();
        republish_observations(&mut manager, &mut world, controller, &event_bus);
        info!(%controller, "ClientWorker initialized");

        Self {
            controller,
            manager,
            world,
            shared,
            catalog,
            uplink,
            command_rx,
            downstream_rx,
            event_bus,
            submitted: 0,
        }
    }

    /// Main worker loop. Stops when the handle side goes away; the downstream
    /// alone never keeps a client alive.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(ClientCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(bytes) = self.downstream_rx.recv() => {
                    self.handle_frame(&bytes);
                }
            }
        }
        info!(controller = %self.controller, "ClientWorker stopped");
    }

    fn handle_command(&mut self, cmd: ClientCommand) {
        match cmd {
            ClientCommand::Submit { transaction, reply } => {
                let result = self.submit(transaction);
                if reply.send(result).is_err() {
                    debug!("Submit reply channel closed (caller dropped)");
                }
            }
            ClientCommand::View { reply } => {
                if reply.send(self.view()).is_err() {
                    debug!("View reply channel closed (caller dropped)");
                }
            }
            ClientCommand::Status { reply } => {
                let status = ClientStatus {
                    controller: self.controller,
                    submitted: self.submitted,
                    applied: self.manager.mirror().applied(),
                };
                if reply.send(status).is_err() {
                    debug!("Status reply channel closed (caller dropped)");
                }
            }
            ClientCommand::Shutdown => {}
        }
    }

    fn submit(&mut self, transaction: Transaction) -> Result<Submitted> {
        let kind = transaction.kind();
        let result = self.manager.submit(
            transaction,
            &mut self.world,
            self.catalog.as_ref(),
            &mut self.uplink,
        );

        match &result {
            Ok(Submitted::Forwarded { speculative }) => {
                self.submitted += 1;
                if let Some(applied) = speculative {
                    self.publish(TransactionEvent::Predicted {
                        controller: self.controller,
                        kind,
                        item: applied.item,
                    });
                }
                self.publish(TransactionEvent::Forwarded {
                    controller: self.controller,
                    kind,
                });
            }
            Ok(Submitted::Applied(_)) => {
                warn!(controller = %self.controller, "client manager applied authoritatively");
            }
            Err(err) => self.publish(TransactionEvent::Rejected {
                controller: self.controller,
                kind,
                code: err.error_code().to_owned(),
            }),
        }

        Ok(result?)
    }

    fn view(&self) -> InventorySnapshot {
        InventorySnapshot::of(self.manager.inventory())
            .with_sources(&self.world, self.shared.iter().copied())
    }

    fn handle_frame(&mut self, bytes: &[u8]) {
        let frame: ServerFrame = match wire::decode(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(controller = %self.controller, "dropping malformed frame: {err}");
                self.publish(TransactionEvent::Dropped {
                    connection: self.controller,
                    side: Side::Client,
                    reason: err.to_string(),
                });
                return;
            }
        };

        let ServerFrame::Delta(delta) = frame;
        let stale = delta.sequence <= self.manager.mirror().applied();
        match self
            .manager
            .apply_delta(&delta, Some(&mut self.world), self.catalog.as_ref())
        {
            Ok(reconciliation) => {
                if !reconciliation.unresolved.is_empty() {
                    debug!(
                        controller = %self.controller,
                        unresolved = reconciliation.unresolved.len(),
                        "delta references targets this client does not hold"
                    );
                }
                self.event_bus
                    .publish(Event::Replication(ReplicationEvent::DeltaApplied {
                        controller: self.controller,
                        sequence: delta.sequence,
                        stale,
                        containers_changed: reconciliation.containers.len(),
                        unresolved: reconciliation.unresolved.len(),
                        retired: reconciliation.retired.len(),
                    }));
                self.uplink.acknowledge(delta.sequence);
            }
            Err(err) => warn!(controller = %self.controller, "cannot apply delta: {err}"),
        }
    }

    fn publish(&self, event: TransactionEvent) {
        self.event_bus.publish(Event::Transaction(event));
    }
}

/// Forwards every observer notification of the client's containers, slots
/// and mirrored sources to the bus.
fn republish_observations(
    manager: &mut InventoryManager,
    world: &mut WorldSources,
    controller: ControllerId,
    event_bus: &EventBus,
) {
    let inventory = manager.inventory_mut();
    for container in inventory.containers_mut() {
        subscribe_container(container, controller, event_bus);
    }
    for slot in inventory.equipment_mut().slots_mut() {
        let bus = event_bus.clone();
        slot.subscribe(move |event| feed(&bus, controller, event.clone().into()));
        let bus = event_bus.clone();
        slot.subscribe_availability(move |event| feed(&bus, controller, event.clone().into()));
    }
    let ids: Vec<SourceId> = world.ids().collect();
    for id in ids {
        if let Some(container) = world.get_mut(id) {
            subscribe_container(container, controller, event_bus);
        }
    }
}

fn subscribe_container(
    container: &mut inventory_core::Container,
    controller: ControllerId,
    event_bus: &EventBus,
) {
    let bus = event_bus.clone();
    container.subscribe(move |event| feed(&bus, controller, event.clone().into()));
    let bus = event_bus.clone();
    container.subscribe_amounts(move |event| feed(&bus, controller, event.clone().into()));
}

fn feed(bus: &EventBus, controller: ControllerId, event: InventoryEvent) {
    bus.publish(Event::Inventory(InventoryFeedEvent { controller, event }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use inventory_core::{
        Container, ContainerId, DefinitionId, Inventory, InventoryConfig, ItemDefinition,
        ItemFactory, ItemId, TagSet,
    };

    use crate::api::RuntimeError;
    use crate::events::Topic;
    use crate::transport::wire::ClientFrame;
    use crate::transport::{Envelope, Link};

    const PLAYER: ControllerId = ControllerId(4);
    const SACK: ContainerId = ContainerId(1);

    struct Harness {
        command_tx: mpsc::Sender<ClientCommand>,
        downstream_tx: mpsc::Sender<Vec<u8>>,
        inbound_rx: mpsc::Receiver<Envelope>,
        authority: InventoryManager,
        catalog: Arc<DefinitionCatalog>,
        bus: EventBus,
    }

    impl Harness {
        async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> ClientCommand) -> T {
            let (reply, rx) = oneshot::channel();
            self.command_tx.send(build(reply)).await.unwrap();
            rx.await.unwrap()
        }

        /// Ships everything the authority has not seen acknowledged yet.
        async fn replicate(&mut self) -> u64 {
            self.authority.capture(None);
            let delta = self.authority.delta_for(PLAYER).unwrap();
            let sequence = delta.sequence;
            self.downstream_tx
                .send(wire::encode(&ServerFrame::Delta(delta)).unwrap())
                .await
                .unwrap();
            sequence
        }

        async fn next_frame(&mut self) -> ClientFrame {
            let envelope = self.inbound_rx.recv().await.unwrap();
            assert_eq!(envelope.connection, PLAYER);
            wire::decode(&envelope.bytes).unwrap()
        }
    }

    fn sack() -> Inventory {
        Inventory::new().with_container(Container::new(SACK, "sack", TagSet::from_iter(["Loot"])))
    }

    fn harness() -> Harness {
        let catalog: Arc<DefinitionCatalog> = Arc::new(
            [ItemDefinition::new(DefinitionId(1), "ore", TagSet::from_iter(["Loot"])).stackable(10)]
                .into_iter()
                .collect(),
        );
        let bus = EventBus::new();
        let (command_tx, command_rx) = mpsc::channel(8);
        let (downstream_tx, downstream_rx) = mpsc::channel(8);
        let (inbound_tx, inbound_rx) = mpsc::channel(8);
        let (uplink, _relay) = Link::spawn(inbound_tx, Duration::ZERO);

        let worker = ClientWorker::new(
            InventoryManager::client(PLAYER, sack(), InventoryConfig::default()),
            WorldSources::new(),
            Arc::clone(&catalog),
            Uplink::new(PLAYER, uplink),
            command_rx,
            downstream_rx,
            bus.clone(),
        );
        tokio::spawn(worker.run());

        let mut authority = InventoryManager::authority(PLAYER, sack(), InventoryConfig::default());
        authority.setup().unwrap();

        Harness {
            command_tx,
            downstream_tx,
            inbound_rx,
            authority,
            catalog,
            bus,
        }
    }

    fn grant(h: &mut Harness, amount: u32) -> ItemId {
        let item = ItemFactory::new(h.catalog.as_ref()).spawn(DefinitionId(1), amount).unwrap();
        h.authority
            .inventory_mut()
            .container_mut(SACK)
            .unwrap()
            .add_item(item)
            .unwrap()
    }

    #[tokio::test]
    async fn deltas_are_applied_acknowledged_and_observed() {
        let mut h = harness();
        let mut feed = h.bus.subscribe(Topic::Inventory);
        let ore = grant(&mut h, 6);

        let sequence = h.replicate().await;
        assert!(matches!(h.next_frame().await, ClientFrame::Ack { sequence: acked } if acked == sequence));

        let view = h.call(|reply| ClientCommand::View { reply }).await;
        assert_eq!(view.containers[0].items[0].id, ore);
        assert_eq!(view.total_units(), 6);

        let changed = loop {
            if let Event::Inventory(InventoryFeedEvent {
                controller,
                event: InventoryEvent::Container(changed),
            }) = feed.recv().await.unwrap()
            {
                assert_eq!(controller, PLAYER);
                break changed;
            }
        };
        assert_eq!(changed.container, SACK);
        assert!(changed.added.contains(&ore));

        let status = h.call(|reply| ClientCommand::Status { reply }).await;
        assert_eq!(status.applied, sequence);
        assert_eq!(status.submitted, 0);
    }

    #[tokio::test]
    async fn submissions_are_predicted_then_forwarded() {
        let mut h = harness();
        let ore = grant(&mut h, 6);
        h.replicate().await;
        h.next_frame().await;

        let transaction = Transaction::SplitItem {
            container: SACK,
            item: ore,
            amount: 2,
        };
        let submitted = h
            .call(|reply| ClientCommand::Submit {
                transaction: transaction.clone(),
                reply,
            })
            .await
            .unwrap();
        assert!(matches!(submitted, Submitted::Forwarded { speculative: Some(_) }));

        match h.next_frame().await {
            ClientFrame::Request(request) => {
                assert_eq!(request.controller, PLAYER);
                assert_eq!(request.transaction, transaction);
            }
            other => panic!("unexpected frame {other:?}"),
        }
        let view = h.call(|reply| ClientCommand::View { reply }).await;
        assert_eq!(view.containers[0].items.len(), 2);
        assert_eq!(view.total_units(), 6);
    }

    #[tokio::test]
    async fn local_rejections_stay_local() {
        let mut h = harness();
        let ore = grant(&mut h, 1);
        h.replicate().await;
        h.next_frame().await;

        let result = h
            .call(|reply| ClientCommand::Submit {
                transaction: Transaction::SplitItem {
                    container: SACK,
                    item: ore,
                    amount: 1,
                },
                reply,
            })
            .await;
        assert!(matches!(
            result,
            Err(RuntimeError::Inventory(inventory_core::InventoryError::InvalidSplit { .. }))
        ));

        let status = h.call(|reply| ClientCommand::Status { reply }).await;
        assert_eq!(status.submitted, 0);
        assert!(h.inbound_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_deltas_are_dropped() {
        let h = harness();
        let mut events = h.bus.subscribe(Topic::Transaction);
        h.downstream_tx.send(vec![0xff; 3]).await.unwrap();

        match events.recv().await.unwrap() {
            Event::Transaction(TransactionEvent::Dropped { side, .. }) => {
                assert_eq!(side, Side::Client);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
