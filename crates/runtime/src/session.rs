//! High-level session orchestrator.
//!
//! A [`Session`] owns one server worker and any number of client workers,
//! wires the byte links between them, and exposes a builder-based API for
//! driving and inspecting the whole arrangement.

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::sync::Arc;
use std::time::Duration;

use inventory_content::InventoryLayout;
use inventory_core::{ControllerId, DefinitionCatalog, Inventory, InventoryConfig, InventoryManager};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::api::{ClientHandle, Result, RuntimeError, ServerHandle};
use crate::events::{Event, EventBus, Topic};
use crate::transport::{Envelope, Link, Uplink};
use crate::workers::{ClientCommand, ClientWorker, ServerCommand, ServerWorker};

/// Runtime configuration shared across the orchestrator and workers.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub inventory: InventoryConfig,
    pub command_buffer_size: usize,
    /// Frames a worker may have queued before the relay waits.
    pub frame_buffer_size: usize,
    pub event_buffer_size: usize,
    /// One-way delay applied to every frame in both directions.
    pub latency: Duration,
    pub settle_poll: Duration,
    pub settle_timeout: Duration,
}

impl RuntimeConfig {
    pub const DEFAULT_COMMAND_BUFFER: usize = 32;
    pub const DEFAULT_FRAME_BUFFER: usize = 64;
    pub const DEFAULT_EVENT_BUFFER: usize = EventBus::DEFAULT_CAPACITY;
    pub const DEFAULT_SETTLE_POLL: Duration = Duration::from_millis(5);
    pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Construct configuration from process environment variables.
    ///
    /// Environment variables:
    /// - `INVENTORY_COMMAND_BUFFER` - Worker command queue size (default: 32)
    /// - `INVENTORY_FRAME_BUFFER` - Per-worker inbound frame queue (default: 64)
    /// - `INVENTORY_EVENT_BUFFER` - Event bus capacity per topic (default: 256)
    /// - `INVENTORY_LATENCY_MS` - Simulated one-way latency (default: 0)
    /// - `INVENTORY_SETTLE_TIMEOUT_MS` - Upper bound for [`Session::settle`] (default: 5000)
    /// - `INVENTORY_MAX_DELTA_ENTRIES` - Item entries per delta (default: 256)
    /// - `INVENTORY_ENFORCE_SLOT_AVAILABILITY` - Refuse unavailable slots (default: true)
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies the variables read by [`RuntimeConfig::from_env`] on top of
    /// `self`, leaving unset ones untouched.
    pub fn with_env_overrides(self) -> Self {
        let mut config = self;

        if let Some(size) = read_env::<usize>("INVENTORY_COMMAND_BUFFER") {
            config.command_buffer_size = size.max(1);
        }
        if let Some(size) = read_env::<usize>("INVENTORY_FRAME_BUFFER") {
            config.frame_buffer_size = size.max(1);
        }
        if let Some(size) = read_env::<usize>("INVENTORY_EVENT_BUFFER") {
            config.event_buffer_size = size.max(1);
        }
        if let Some(ms) = read_env::<u64>("INVENTORY_LATENCY_MS") {
            config.latency = Duration::from_millis(ms);
        }
        if let Some(ms) = read_env::<u64>("INVENTORY_SETTLE_TIMEOUT_MS") {
            config.settle_timeout = Duration::from_millis(ms);
        }
        if let Some(cap) = read_env::<usize>("INVENTORY_MAX_DELTA_ENTRIES") {
            config.inventory = config.inventory.with_max_delta_entries(cap);
        }
        if let Some(enforce) = read_env_bool("INVENTORY_ENFORCE_SLOT_AVAILABILITY") {
            config.inventory.enforce_slot_availability = enforce;
        }

        config
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_inventory(mut self, inventory: InventoryConfig) -> Self {
        self.inventory = inventory;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let buffers = [
            ("command_buffer_size", self.command_buffer_size),
            ("frame_buffer_size", self.frame_buffer_size),
            ("event_buffer_size", self.event_buffer_size),
        ];
        if let Some((name, _)) = buffers.iter().find(|(_, size)| *size == 0) {
            return Err(RuntimeError::Config(format!("{name} must be at least 1")));
        }
        if self.inventory.max_delta_entries == 0 {
            return Err(RuntimeError::Config(
                "max_delta_entries must be at least 1".to_owned(),
            ));
        }
        if self.settle_poll.is_zero() {
            return Err(RuntimeError::Config("settle_poll must be positive".to_owned()));
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            inventory: InventoryConfig::default(),
            command_buffer_size: Self::DEFAULT_COMMAND_BUFFER,
            frame_buffer_size: Self::DEFAULT_FRAME_BUFFER,
            event_buffer_size: Self::DEFAULT_EVENT_BUFFER,
            latency: Duration::ZERO,
            settle_poll: Self::DEFAULT_SETTLE_POLL,
            settle_timeout: Self::DEFAULT_SETTLE_TIMEOUT,
        }
    }
}

/// Result of comparing every client's view with the authority's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Convergence {
    /// Hex digests per controller: `(server, client)`.
    pub digests: BTreeMap<ControllerId, (String, String)>,
}

impl Convergence {
    pub fn is_converged(&self) -> bool {
        self.digests.values().all(|(server, client)| server == client)
    }

    pub fn diverged(&self) -> Vec<ControllerId> {
        self.digests
            .iter()
            .filter(|(_, (server, client))| server != client)
            .map(|(controller, _)| *controller)
            .collect()
    }
}

/// One authority plus its connected clients
///
/// Design: Session owns workers and coordinates lifecycle.
/// [`ClientHandle`] and [`ServerHandle`] provide cloneable façades.
pub struct Session {
    config: RuntimeConfig,
    server: ServerHandle,
    clients: BTreeMap<ControllerId, ClientHandle>,
    event_bus: EventBus,
    workers: Vec<JoinHandle<()>>,
    relays: Vec<JoinHandle<()>>,
}

impl Session {
    /// Create a new session builder
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub fn server(&self) -> ServerHandle {
        self.server.clone()
    }

    pub fn client(&self, controller: ControllerId) -> Result<ClientHandle> {
        self.clients
            .get(&controller)
            .cloned()
            .ok_or(RuntimeError::UnknownClient(controller))
    }

    pub fn clients(&self) -> impl Iterator<Item = &ClientHandle> {
        self.clients.values()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.event_bus.subscribe(topic)
    }

    /// Waits until every forwarded request has been handled, every client
    /// holds the latest delta, and the authority has seen the matching ack.
    pub async fn settle(&self) -> Result<()> {
        let deadline = Instant::now() + self.config.settle_timeout;
        loop {
            if self.is_quiescent().await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(RuntimeError::SettleTimeout(self.config.settle_timeout));
            }
            tokio::time::sleep(self.config.settle_poll).await;
        }
    }

    async fn is_quiescent(&self) -> Result<bool> {
        let server: BTreeMap<_, _> = self
            .server
            .status()
            .await?
            .into_iter()
            .map(|status| (status.controller, status))
            .collect();

        for client in self.clients.values() {
            let local = client.status().await?;
            let Some(remote) = server.get(&local.controller) else {
                return Ok(false);
            };
            if local.submitted != remote.handled
                || local.applied != remote.sequence
                || !remote.is_caught_up()
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Compares the digest of each client's view with the authority's view
    /// of the same controller.
    pub async fn verify_convergence(&self) -> Result<Convergence> {
        let mut digests = BTreeMap::new();
        for (controller, client) in &self.clients {
            let server = self.server.view(*controller).await?.digest()?;
            let local = client.view().await?.digest()?;
            digests.insert(*controller, (hex::encode(server), hex::encode(local)));
        }
        Ok(Convergence { digests })
    }

    /// Shutdown every worker gracefully
    pub async fn shutdown(self) -> Result<()> {
        for client in self.clients.values() {
            client.shutdown().await?;
        }
        self.server.shutdown().await?;
        drop(self.clients);
        drop(self.server);

        for worker in self.workers {
            worker.await.map_err(RuntimeError::WorkerJoin)?;
        }
        for relay in self.relays {
            relay.abort();
        }

        info!("session shut down");
        Ok(())
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    config: RuntimeConfig,
    catalog: Option<DefinitionCatalog>,
    layout: Option<InventoryLayout>,
    controllers: Vec<ControllerId>,
}

impl SessionBuilder {
    fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            catalog: None,
            layout: None,
            controllers: Vec::new(),
        }
    }

    /// Override runtime configuration
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set required item catalog
    pub fn catalog(mut self, catalog: DefinitionCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Set required layout (pawn inventory and shared sources)
    pub fn layout(mut self, layout: InventoryLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn client(mut self, controller: ControllerId) -> Self {
        self.controllers.push(controller);
        self
    }

    pub fn clients(mut self, controllers: impl IntoIterator<Item = ControllerId>) -> Self {
        self.controllers.extend(controllers);
        self
    }

    /// Build the session: spawn the server, connect every client's pawn on
    /// it, then spawn each client starting from an empty shell.
    pub async fn build(self) -> Result<Session> {
        self.config.validate()?;
        let catalog = Arc::new(self.catalog.ok_or(RuntimeError::MissingCatalog)?);
        let layout = self.layout.ok_or(RuntimeError::MissingLayout)?;
        let config = self.config;

        let world = layout.build_sources(catalog.as_ref())?;
        let prepared = prepare_clients(&self.controllers, &layout, catalog.as_ref())?;
        let event_bus = EventBus::with_capacity(config.event_buffer_size);

        let (server_tx, server_rx) = mpsc::channel::<ServerCommand>(config.command_buffer_size);
        let (inbound_tx, inbound_rx) = mpsc::channel::<Envelope>(config.frame_buffer_size);
        let (uplink, uplink_relay) = Link::spawn(inbound_tx, config.latency);

        let server_worker = ServerWorker::new(
            Arc::clone(&catalog),
            config.inventory.clone(),
            world,
            server_rx,
            inbound_rx,
            event_bus.clone(),
        );
        let mut workers = vec![tokio::spawn(async move {
            server_worker.run().await;
        })];
        let mut relays = vec![uplink_relay];
        let server = ServerHandle::new(server_tx, event_bus.clone());

        let mut clients = BTreeMap::new();
        for PreparedClient {
            controller,
            authority,
            shell,
        } in prepared
        {
            let (downstream_tx, downstream_rx) = mpsc::channel(config.frame_buffer_size);
            let (downstream, downstream_relay) = Link::spawn(downstream_tx, config.latency);
            relays.push(downstream_relay);
            if let Err(err) = server.connect(controller, authority, downstream).await {
                for task in workers.iter().chain(&relays) {
                    task.abort();
                }
                return Err(err);
            }

            let manager = InventoryManager::client(controller, shell, config.inventory.clone());
            let (command_tx, command_rx) =
                mpsc::channel::<ClientCommand>(config.command_buffer_size);
            let client_worker = ClientWorker::new(
                manager,
                layout.build_source_shells(),
                Arc::clone(&catalog),
                Uplink::new(controller, uplink.clone()),
                command_rx,
                downstream_rx,
                event_bus.clone(),
            );
            workers.push(tokio::spawn(async move {
                client_worker.run().await;
            }));

            debug!(%controller, "client spawned");
            clients.insert(
                controller,
                ClientHandle::new(controller, command_tx, event_bus.clone()),
            );
        }

        info!(
            clients = clients.len(),
            latency_ms = config.latency.as_millis() as u64,
            "session started"
        );

        Ok(Session {
            config,
            server,
            clients,
            event_bus,
            workers,
            relays,
        })
    }
}

/// A client's authoritative pawn and its starting shell.
struct PreparedClient {
    controller: ControllerId,
    authority: Inventory,
    shell: Inventory,
}

/// Checks the controller list and builds every inventory up front, so a bad
/// builder fails before any task is spawned.
fn prepare_clients(
    controllers: &[ControllerId],
    layout: &InventoryLayout,
    catalog: &DefinitionCatalog,
) -> Result<Vec<PreparedClient>> {
    let mut seen = BTreeSet::new();
    controllers
        .iter()
        .map(|&controller| {
            if !seen.insert(controller) {
                return Err(RuntimeError::DuplicateClient(controller));
            }
            Ok(PreparedClient {
                controller,
                authority: layout.build_inventory(catalog)?,
                shell: layout.build_shell()?,
            })
        })
        .collect()
}

fn read_env<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    env::var(key).ok()?.parse().ok()
}

fn read_env_bool(key: &str) -> Option<bool> {
    match env::var(key).ok()?.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
