//! Server worker that owns every authoritative inventory.
//!
//! Holds one authority-side [`InventoryManager`] per connected client plus the
//! shared [`WorldSources`]. Inbound frames from all clients are multiplexed
//! onto one channel and processed strictly in arrival order, so there is a
//! single writer for every inventory and every shared source.

use std::collections::BTreeMap;
use std::sync::Arc;

use inventory_core::{
    ClassifiedError, ContainerId, ControllerId, DefinitionCatalog, DefinitionId, Inventory,
    InventoryConfig, InventoryError, InventoryManager, InventorySnapshot, ItemFactory, ItemId,
    SourceId, WorldSources,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::api::{Result, RuntimeError};
use crate::events::{Event, EventBus, ReplicationEvent, Side, TransactionEvent};
use crate::transport::wire::{self, ClientFrame, ServerFrame};
use crate::transport::{Envelope, Link};

/// Where a server-side grant lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantTarget {
    Container {
        controller: ControllerId,
        container: ContainerId,
    },
    Source(SourceId),
}

/// Replication progress of one connection, as seen by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub controller: ControllerId,
    /// Requests received from this client (executed or declined).
    pub handled: u64,
    /// Current sequence of the client's replication set.
    pub sequence: u64,
    pub acknowledged: Option<u64>,
}

impl ConnectionStatus {
    pub fn is_caught_up(&self) -> bool {
        self.acknowledged == Some(self.sequence)
    }
}

/// Commands that can be sent to the server worker
pub enum ServerCommand {
    /// Possess a pawn: register its inventory and start replicating to the
    /// client behind `downstream`.
    Connect {
        controller: ControllerId,
        inventory: Box<Inventory>,
        downstream: Link<Vec<u8>>,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Unpossess: stop replicating and drop the pawn's inventory.
    Disconnect {
        controller: ControllerId,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Authoritative view of one client's inventory plus the shared sources.
    View {
        controller: ControllerId,
        reply: oneshot::Sender<Result<InventorySnapshot>>,
    },
    Status {
        reply: oneshot::Sender<Vec<ConnectionStatus>>,
    },
    /// Spawn new units on the authority (loot drop, vendor restock).
    Grant {
        target: GrantTarget,
        definition: DefinitionId,
        amount: u32,
        reply: oneshot::Sender<Result<ItemId>>,
    },
    SetAvailability {
        controller: ControllerId,
        slot: String,
        available: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

struct Connection {
    manager: InventoryManager,
    downstream: Link<Vec<u8>>,
    handled: u64,
}

/// Background task that processes client frames and server commands.
pub struct ServerWorker {
    catalog: Arc<DefinitionCatalog>,
    config: InventoryConfig,
    world: WorldSources,
    shared: Vec<SourceId>,
    connections: BTreeMap<ControllerId, Connection>,
    command_rx: mpsc::Receiver<ServerCommand>,
    inbound_rx: mpsc::Receiver<Envelope>,
    event_bus: EventBus,
}

impl ServerWorker {
    pub fn new(
        catalog: Arc<DefinitionCatalog>,
        config: InventoryConfig,
        world: WorldSources,
        command_rx: mpsc::Receiver<ServerCommand>,
        inbound_rx: mpsc::Receiver<Envelope>,
        event_bus: EventBus,
    ) -> Self {
        let shared: Vec<SourceId> = world.ids().collect();
        info!(sources = shared.len(), "ServerWorker initialized");

        Self {
            catalog,
            config,
            world,
            shared,
            connections: BTreeMap::new(),
            command_rx,
            inbound_rx,
            event_bus,
        }
    }

    /// Main worker loop.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(cmd) = self.command_rx.recv() => {
                    if !self.handle_command(cmd) {
                        break;
                    }
                }
                Some(envelope) = self.inbound_rx.recv() => {
                    self.handle_frame(envelope);
                }
                else => break,
            }
        }
        info!(connections = self.connections.len(), "ServerWorker stopped");
    }

    /// Returns false on shutdown.
    fn handle_command(&mut self, cmd: ServerCommand) -> bool {
        match cmd {
            ServerCommand::Connect {
                controller,
                inventory,
                downstream,
                reply,
            } => {
                let result = self.connect(controller, *inventory, downstream);
                if reply.send(result).is_err() {
                    debug!("Connect reply channel closed (caller dropped)");
                }
            }
            ServerCommand::Disconnect { controller, reply } => {
                let result = self.disconnect(controller);
                if reply.send(result).is_err() {
                    debug!("Disconnect reply channel closed (caller dropped)");
                }
            }
            ServerCommand::View { controller, reply } => {
                let result = self.view(controller);
                if reply.send(result).is_err() {
                    debug!("View reply channel closed (caller dropped)");
                }
            }
            ServerCommand::Status { reply } => {
                if reply.send(self.status()).is_err() {
                    debug!("Status reply channel closed (caller dropped)");
                }
            }
            ServerCommand::Grant {
                target,
                definition,
                amount,
                reply,
            } => {
                let result = self.grant(target, definition, amount);
                if result.is_ok() {
                    self.replicate(None);
                }
                if reply.send(result).is_err() {
                    debug!("Grant reply channel closed (caller dropped)");
                }
            }
            ServerCommand::SetAvailability {
                controller,
                slot,
                available,
                reply,
            } => {
                let result = self.set_availability(controller, &slot, available);
                if result.is_ok() {
                    self.replicate(None);
                }
                if reply.send(result).is_err() {
                    debug!("SetAvailability reply channel closed (caller dropped)");
                }
            }
            ServerCommand::Shutdown => return false,
        }
        true
    }

    fn connect(
        &mut self,
        controller: ControllerId,
        inventory: Inventory,
        downstream: Link<Vec<u8>>,
    ) -> Result<()> {
        if self.connections.contains_key(&controller) {
            return Err(RuntimeError::DuplicateClient(controller));
        }

        let mut manager = InventoryManager::authority(controller, inventory, self.config.clone());
        manager.setup()?;
        for id in &self.shared {
            manager.replicate_source(*id);
        }
        manager.capture(Some(&self.world));

        let mut connection = Connection {
            manager,
            downstream,
            handled: 0,
        };
        send_delta(&mut connection, controller, &self.event_bus);
        self.connections.insert(controller, connection);

        info!(%controller, "client connected");
        Ok(())
    }

    fn disconnect(&mut self, controller: ControllerId) -> Result<()> {
        let mut connection = self
            .connections
            .remove(&controller)
            .ok_or(RuntimeError::UnknownClient(controller))?;
        connection.manager.reset();
        info!(%controller, "client disconnected");
        Ok(())
    }

    fn view(&self, controller: ControllerId) -> Result<InventorySnapshot> {
        let connection = self
            .connections
            .get(&controller)
            .ok_or(RuntimeError::UnknownClient(controller))?;
        Ok(InventorySnapshot::of(connection.manager.inventory())
            .with_sources(&self.world, self.shared.iter().copied()))
    }

    fn status(&self) -> Vec<ConnectionStatus> {
        self.connections
            .iter()
            .map(|(controller, connection)| ConnectionStatus {
                controller: *controller,
                handled: connection.handled,
                sequence: connection.manager.replication().sequence(),
                acknowledged: connection.manager.replication().acknowledged(*controller),
            })
            .collect()
    }

    fn grant(&mut self, target: GrantTarget, definition: DefinitionId, amount: u32) -> Result<ItemId> {
        let factory = ItemFactory::new(self.catalog.as_ref());
        let item = factory
            .spawn(definition, amount)
            .ok_or(InventoryError::DefinitionUnavailable(definition))?;

        let container = match target {
            GrantTarget::Container {
                controller,
                container,
            } => self
                .connections
                .get_mut(&controller)
                .ok_or(RuntimeError::UnknownClient(controller))?
                .manager
                .inventory_mut()
                .container_mut(container)
                .ok_or(InventoryError::UnknownContainer(container))?,
            GrantTarget::Source(source) => self
                .world
                .get_mut(source)
                .ok_or(InventoryError::UnknownSource(source))?,
        };
        let placement = container
            .find_available_place(item)
            .map_err(|refused| refused.error)?;

        debug!(?target, definition = definition.0, amount, "units granted");
        Ok(placement.item())
    }

    fn set_availability(&mut self, controller: ControllerId, slot: &str, available: bool) -> Result<()> {
        let slot = self
            .connections
            .get_mut(&controller)
            .ok_or(RuntimeError::UnknownClient(controller))?
            .manager
            .inventory_mut()
            .slot_mut(slot)
            .ok_or_else(|| InventoryError::UnknownSlot(slot.to_owned()))?;
        slot.set_availability(available);
        Ok(())
    }

    fn handle_frame(&mut self, envelope: Envelope) {
        let connection_id = envelope.connection;
        let frame: ClientFrame = match wire::decode(&envelope.bytes) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(connection = %connection_id, "dropping malformed frame: {err}");
                self.dropped(connection_id, err.to_string());
                return;
            }
        };
        let Some(connection) = self.connections.get_mut(&connection_id) else {
            warn!(connection = %connection_id, "dropping frame from unknown connection");
            self.dropped(connection_id, "unknown connection".to_owned());
            return;
        };

        match frame {
            ClientFrame::Request(request) => {
                connection.handled += 1;
                let kind = request.transaction.kind();
                let event = match connection.manager.handle_remote(
                    &request,
                    &mut self.world,
                    self.catalog.as_ref(),
                ) {
                    Ok(applied) => TransactionEvent::Applied {
                        controller: request.controller,
                        kind,
                        item: applied.item,
                    },
                    // silent toward the client; the next delta corrects it
                    Err(err) => TransactionEvent::Declined {
                        controller: request.controller,
                        kind,
                        code: err.error_code().to_owned(),
                        class: err.class(),
                    },
                };
                self.event_bus.publish(Event::Transaction(event));
                self.replicate(Some(connection_id));
            }
            ClientFrame::Ack { sequence } => {
                connection.manager.acknowledge(connection_id, sequence);
                self.event_bus
                    .publish(Event::Replication(ReplicationEvent::Acknowledged {
                        controller: connection_id,
                        sequence,
                    }));
                if connection.manager.has_pending(connection_id) {
                    send_delta(connection, connection_id, &self.event_bus);
                }
            }
        }
    }

    /// Captures every connection's view and ships deltas. The requester
    /// always gets one (even if empty) so a declined prediction is undone;
    /// everyone else only when their view changed.
    fn replicate(&mut self, requester: Option<ControllerId>) {
        for (controller, connection) in self.connections.iter_mut() {
            let changed = connection.manager.capture(Some(&self.world)).is_some();
            if changed || requester == Some(*controller) {
                send_delta(connection, *controller, &self.event_bus);
            }
        }
    }

    fn dropped(&self, connection: ControllerId, reason: String) {
        self.event_bus
            .publish(Event::Transaction(TransactionEvent::Dropped {
                connection,
                side: Side::Server,
                reason,
            }));
    }
}

fn send_delta(connection: &mut Connection, controller: ControllerId, event_bus: &EventBus) {
    let Some(delta) = connection.manager.delta_for(controller) else {
        return;
    };
    let sent = ReplicationEvent::DeltaSent {
        controller,
        base: delta.base,
        sequence: delta.sequence,
        entries: delta.entry_count(),
    };
    match wire::encode(&ServerFrame::Delta(delta)) {
        Ok(bytes) => {
            if connection.downstream.send(bytes) {
                event_bus.publish(Event::Replication(sent));
            } else {
                warn!(%controller, "downstream closed, delta lost");
            }
        }
        Err(err) => warn!(%controller, "failed to encode delta: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use inventory_core::{
        Container, EquipmentSlot, ItemDefinition, ServerRequest, TagSet, Transaction,
    };

    use crate::events::Topic;

    struct Harness {
        command_tx: mpsc::Sender<ServerCommand>,
        inbound_tx: mpsc::Sender<Envelope>,
        downstream_rx: mpsc::Receiver<Vec<u8>>,
        bus: EventBus,
    }

    fn catalog() -> Arc<DefinitionCatalog> {
        Arc::new(
            [ItemDefinition::new(DefinitionId(1), "ore", TagSet::from_iter(["Loot"])).stackable(10)]
                .into_iter()
                .collect(),
        )
    }

    async fn harness() -> Harness {
        let bus = EventBus::new();
        let (command_tx, command_rx) = mpsc::channel(8);
        let (inbound_tx, inbound_rx) = mpsc::channel(8);
        let worker = ServerWorker::new(
            catalog(),
            InventoryConfig::default(),
            WorldSources::new(),
            command_rx,
            inbound_rx,
            bus.clone(),
        );
        tokio::spawn(worker.run());

        let (down_tx, downstream_rx) = mpsc::channel(8);
        let (downstream, _relay) = Link::spawn(down_tx, Duration::ZERO);
        let mut inventory = Inventory::new()
            .with_container(Container::new(ContainerId(1), "sack", TagSet::from_iter(["Loot"])));
        inventory
            .add_slot(EquipmentSlot::new("Hands", TagSet::from_iter(["Loot"])))
            .unwrap();

        let (reply, rx) = oneshot::channel();
        command_tx
            .send(ServerCommand::Connect {
                controller: ControllerId(1),
                inventory: Box::new(inventory),
                downstream,
                reply,
            })
            .await
            .unwrap();
        rx.await.unwrap().unwrap();

        Harness {
            command_tx,
            inbound_tx,
            downstream_rx,
            bus,
        }
    }

    #[tokio::test]
    async fn connect_ships_an_initial_delta() {
        let mut h = harness().await;
        let bytes = h.downstream_rx.recv().await.unwrap();
        let frame: ServerFrame = wire::decode(&bytes).unwrap();
        let ServerFrame::Delta(delta) = frame;
        assert_eq!(delta.base, 0);
        assert_eq!(delta.targets.len(), 2);
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped() {
        let h = harness().await;
        let mut events = h.bus.subscribe(Topic::Transaction);

        h.inbound_tx
            .send(Envelope {
                connection: ControllerId(1),
                bytes: vec![0xde, 0xad],
            })
            .await
            .unwrap();

        match events.recv().await.unwrap() {
            Event::Transaction(TransactionEvent::Dropped { connection, .. }) => {
                assert_eq!(connection, ControllerId(1));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn requests_claiming_another_controller_are_declined() {
        let mut h = harness().await;
        let _initial = h.downstream_rx.recv().await.unwrap();
        let mut events = h.bus.subscribe(Topic::Transaction);

        let forged = ClientFrame::Request(ServerRequest {
            controller: ControllerId(2),
            transaction: Transaction::Unequip {
                slot: "Hands".into(),
            },
        });
        h.inbound_tx
            .send(Envelope {
                connection: ControllerId(1),
                bytes: wire::encode(&forged).unwrap(),
            })
            .await
            .unwrap();

        match events.recv().await.unwrap() {
            Event::Transaction(TransactionEvent::Declined { code, .. }) => {
                assert_eq!(code, "UNAUTHORIZED");
            }
            other => panic!("unexpected event {other:?}"),
        }
        // the requester still hears back
        assert!(h.downstream_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn grants_replicate_and_report_status() {
        let mut h = harness().await;
        let _initial = h.downstream_rx.recv().await.unwrap();

        let (reply, rx) = oneshot::channel();
        h.command_tx
            .send(ServerCommand::Grant {
                target: GrantTarget::Container {
                    controller: ControllerId(1),
                    container: ContainerId(1),
                },
                definition: DefinitionId(1),
                amount: 4,
                reply,
            })
            .await
            .unwrap();
        rx.await.unwrap().unwrap();

        let bytes = h.downstream_rx.recv().await.unwrap();
        let frame: ServerFrame = wire::decode(&bytes).unwrap();
        let ServerFrame::Delta(delta) = frame;
        assert_eq!(delta.upserts.len(), 1);
        assert_eq!(delta.upserts[0].record.amount, 4);

        let (reply, rx) = oneshot::channel();
        h.command_tx.send(ServerCommand::Status { reply }).await.unwrap();
        let status = rx.await.unwrap();
        assert_eq!(status.len(), 1);
        assert!(!status[0].is_caught_up());
    }
}
