// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use apisix_ingress::{
    admin::{AdminApi, HttpAdminClient},
    cache::ResourceCache,
    config::{ControllerConfig, OperatingMode},
    constants::LEASE_RELEASE_TIMEOUT_SECS,
    engine::Engine,
    health,
    leader::start_election,
    status::{KubeStatusWriter, StatusWriter},
    watch,
};
use clap::Parser;
use kube::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch as signal_watch;
use tracing::{debug, error, info, warn};

/// Kubernetes controller that programs APISIX gateway groups.
#[derive(Debug, Parser)]
#[command(name = "apisix-ingress", version, about)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Resource families to reconcile
    #[arg(long, value_enum)]
    mode: Option<OperatingMode>,

    /// Full resync interval, e.g. `5m` or `90s`
    #[arg(long, value_parser = apisix_ingress::duration::parse_duration)]
    resync_interval: Option<Duration>,

    /// Number of reconciliation workers
    #[arg(long)]
    workers: Option<usize>,

    /// Address of the probe and metrics server
    #[arg(long)]
    metrics_bind_address: Option<String>,

    /// Do not write status back to Kubernetes
    #[arg(long)]
    disable_status: bool,

    /// Act as the only writer instead of joining the election
    #[arg(long)]
    disable_leader_election: bool,
}

impl Cli {
    /// Layer command-line flags over the file configuration.
    fn apply(&self, mut config: ControllerConfig) -> ControllerConfig {
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(interval) = self.resync_interval {
            config.resync_interval = interval;
        }
        if let Some(workers) = self.workers {
            config.worker_count = workers;
        }
        if let Some(address) = &self.metrics_bind_address {
            config.metrics_bind_address.clone_from(address);
        }
        if self.disable_status {
            config.enable_status_updates = false;
        }
        if self.disable_leader_election {
            config.leader_election.enabled = false;
        }
        config
    }
}

/// Identity used in the election: the pod name, falling back to the host name.
fn identity() -> String {
    std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("apisix-ingress-{}", std::process::id()))
}

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("apisix-ingress")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

fn init_tracing() {
    // RUST_LOG selects levels (default info); RUST_LOG_FORMAT=json switches to JSON lines.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

/// Resolve on SIGTERM or Ctrl+C.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
    }
}

async fn async_main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = cli.apply(ControllerConfig::load(cli.config.as_deref())?);
    config.validate()?;

    info!(
        mode = ?config.mode,
        controller = %config.controller_name,
        workers = config.worker_count,
        "Starting APISIX ingress controller"
    );
    if config.default_gateway_group.is_none() {
        warn!("No default gateway group configured; only objects resolving to a GatewayProxy are synced");
    }

    debug!("Initializing Kubernetes client");
    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let identity = identity();
    let (lease, election) = start_election(client.clone(), &config.leader_election, &identity).await?;

    let cache = Arc::new(ResourceCache::new());
    let admin: Arc<dyn AdminApi> = Arc::new(HttpAdminClient::new(&config.admin)?);
    let writer: Arc<dyn StatusWriter> = Arc::new(KubeStatusWriter::new(client.clone()));
    let engine = Arc::new(Engine::new(cache.clone(), admin, writer, lease, &config));

    let watchers = watch::start(&client, &engine, config.mode);
    info!(watchers = watchers.len(), "Watchers started");

    let (stop_tx, stop_rx) = signal_watch::channel(false);
    let health_stop = {
        let mut stop_rx = stop_rx.clone();
        async move {
            let _ = stop_rx.wait_for(|stopped| *stopped).await;
        }
    };
    let health = tokio::spawn({
        let address = config.metrics_bind_address.clone();
        let cache = cache.clone();
        async move { health::serve(&address, cache, health_stop).await }
    });

    let engine_task = tokio::spawn(Arc::clone(&engine).run());

    shutdown_signal().await;
    info!("Shutting down");

    engine.shutdown();
    stop_tx.send_replace(true);
    for watcher in &watchers {
        watcher.abort();
    }

    if let Err(e) = engine_task.await {
        error!(error = %e, "Engine task failed");
    }
    let release = Duration::from_secs(LEASE_RELEASE_TIMEOUT_SECS);
    if tokio::time::timeout(release, election.release()).await.is_err() {
        warn!("Timed out releasing the leader election lease");
    }
    match health.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Health server failed"),
        Err(e) => error!(error = %e, "Health server task failed"),
    }
    drop(stop_rx);

    info!("Controller stopped");
    Ok(())
}
