//! Inventory client binary.
//!
//! Composition root that loads content, starts a [`Session`] with one
//! authority and several predicting clients, plays a demo script on every
//! client at once, and reports whether everyone converged.
//!
//! # Examples
//!
//! ```bash
//! # shipped content, two clients, 40ms one-way latency
//! INVENTORY_LATENCY_MS=40 cargo run -p inventory-client
//!
//! # custom content directory, file logging into the platform cache dir
//! INVENTORY_LOG_DIR=default cargo run -p inventory-client -- ./my-data
//! ```

mod config;
mod logging;
mod scenario;

use anyhow::{Context, Result};
use inventory_content::ContentFactory;
use inventory_runtime::{Event, RuntimeConfig, ScriptedProvider, Session, Topic};
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use config::ClientConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (silently ignore if not found)
    dotenvy::dotenv().ok();

    let config = ClientConfig::from_env();
    let _guard = logging::setup_logging(config.log_dir.as_deref())?;

    let content = ContentFactory::new(&config.data_dir);
    let catalog = content.load_catalog()?;
    let layout = content.load_layout()?;
    let runtime_config = RuntimeConfig::default()
        .with_inventory(content.load_config()?)
        .with_env_overrides();

    tracing::info!("Content: {}", content.data_dir().display());
    tracing::info!("Clients: {}", config.clients);
    tracing::info!("Latency: {:?}", runtime_config.latency);

    let session = Session::builder()
        .config(runtime_config)
        .catalog(catalog.clone())
        .layout(layout)
        .clients(config.controllers())
        .build()
        .await?;
    session.settle().await?;

    let mut loggers = JoinSet::new();
    for topic in [Topic::Replication, Topic::Transaction] {
        loggers.spawn(log_events(session.subscribe(topic)));
    }

    let mut drivers = JoinSet::new();
    for client in session.clients() {
        let view = client.view().await?;
        let script = scenario::demo_script(&view, &catalog)
            .with_context(|| format!("cannot script {}", client.controller()))?;
        let client = client.clone();
        drivers.spawn(async move {
            let provider = ScriptedProvider::new(script);
            client.drive(&provider).await.map(|report| (client.controller(), report))
        });
    }
    while let Some(joined) = drivers.join_next().await {
        let (controller, report) = joined??;
        tracing::info!(
            %controller,
            forwarded = report.forwarded,
            rejected = report.rejected,
            "script finished"
        );
    }

    session.settle().await?;
    let convergence = session.verify_convergence().await?;
    for (controller, (server, client)) in &convergence.digests {
        tracing::info!(%controller, server = %server, client = %client, "final digest");
    }

    if config.print_views {
        for client in session.clients() {
            let view = client.view().await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
    }

    loggers.abort_all();
    let diverged = convergence.diverged();
    session.shutdown().await?;

    if !diverged.is_empty() {
        anyhow::bail!("clients diverged from the authority: {diverged:?}");
    }
    tracing::info!("All clients converged");
    Ok(())
}

async fn log_events(mut rx: broadcast::Receiver<Event>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => tracing::debug!(topic = ?event.topic(), "{json}"),
                Err(e) => tracing::warn!("Failed to encode event: {}", e),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Dropped {} stale events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
