// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Leader election.
//!
//! A [`Lease`] is the capability to drive the data plane. The sync executor
//! and the status reporter receive one at construction and consult it before
//! every write; watchers and the cache ignore it and run on every replica.
//!
//! With election enabled the lease follows a `coordination.k8s.io/v1` Lease
//! managed by `kube-lease-manager`. With election disabled a standalone lease
//! is granted immediately. On shutdown [`Election::release`] hands the Lease
//! back so another replica takes over without waiting for it to expire.

use crate::config::LeaderElectionConfig;
use crate::metrics::{record_leader_elected, record_leader_lost};
use anyhow::{Context, Result};
use kube::Client;
use kube_lease_manager::LeaseManagerBuilder;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Read side of the leadership state.
#[derive(Clone, Debug)]
pub struct Lease {
    rx: watch::Receiver<bool>,
    /// Keeps a standalone lease open so `lost` never resolves
    _standalone: Option<Arc<watch::Sender<bool>>>,
}

impl Lease {
    /// A lease that is always held.
    #[must_use]
    pub fn standalone() -> Self {
        let (tx, rx) = watch::channel(true);
        Self {
            rx,
            _standalone: Some(Arc::new(tx)),
        }
    }

    #[must_use]
    pub fn is_leader(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once leadership is held.
    pub async fn acquired(&mut self) {
        // An error means the sender is gone and the state is final
        let _ = self.rx.wait_for(|leader| *leader).await;
    }

    /// Resolve once leadership is lost.
    pub async fn lost(&mut self) {
        let _ = self.rx.wait_for(|leader| !*leader).await;
    }
}

/// Write side of the leadership state.
#[derive(Debug)]
pub struct LeaseHandle {
    tx: watch::Sender<bool>,
}

impl LeaseHandle {
    pub fn set(&self, leader: bool) {
        self.tx.send_replace(leader);
    }
}

/// A connected handle and lease starting at `initial`.
#[must_use]
pub fn lease_channel(initial: bool) -> (LeaseHandle, Lease) {
    let (tx, rx) = watch::channel(initial);
    (
        LeaseHandle { tx },
        Lease {
            rx,
            _standalone: None,
        },
    )
}

/// A running election campaign.
#[derive(Debug)]
pub struct Election {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Election {
    fn standalone() -> Self {
        Self {
            stop: None,
            task: None,
        }
    }

    /// Step down and release the Lease if it is held.
    ///
    /// The lease reads as lost before the Lease object is released.
    pub async fn release(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Election task failed");
            }
        }
    }
}

/// Join the election for the configured Lease object.
///
/// Returns the lease and the running campaign.
///
/// # Errors
///
/// Returns an error if the lease manager cannot be created.
pub async fn start_election(
    client: Client,
    config: &LeaderElectionConfig,
    identity: &str,
) -> Result<(Lease, Election)> {
    if !config.enabled {
        info!("Leader election disabled, running as the only writer");
        record_leader_elected(identity);
        return Ok((Lease::standalone(), Election::standalone()));
    }

    info!(
        lease = %config.lease_name,
        namespace = %config.namespace,
        identity = %identity,
        "Joining leader election"
    );

    let manager = LeaseManagerBuilder::new(client, &config.lease_name)
        .with_namespace(&config.namespace)
        .with_identity(identity)
        .with_duration(config.lease_duration.as_secs())
        .with_grace(config.grace_period.as_secs())
        .build()
        .await
        .context("Failed to create lease manager")?;

    let (mut channel, manager_task) = manager.watch().await;
    let (handle, lease) = lease_channel(*channel.borrow_and_update());
    let (stop, stopped) = oneshot::channel();
    let identity = identity.to_string();

    let task = tokio::spawn(async move {
        forward_leadership(channel, handle, identity, stopped).await;
        // The manager releases the Lease once its channel is closed.
        match manager_task.await {
            Ok(Ok(_)) => info!("Lease manager stopped"),
            Ok(Err(e)) => warn!(error = %e, "Lease manager failed"),
            Err(e) => warn!(error = %e, "Lease manager task panicked"),
        }
    });

    Ok((
        lease,
        Election {
            stop: Some(stop),
            task: Some(task),
        },
    ))
}

/// Mirror election changes into `handle` until the manager stops or `stop`
/// fires, then close `channel`.
async fn forward_leadership(
    mut channel: watch::Receiver<bool>,
    handle: LeaseHandle,
    identity: String,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            changed = channel.changed() => {
                if changed.is_err() {
                    break;
                }
                let leader = *channel.borrow_and_update();
                if leader {
                    info!(identity = %identity, "Leadership acquired");
                    record_leader_elected(&identity);
                } else {
                    warn!(identity = %identity, "Leadership lost");
                    record_leader_lost(&identity);
                }
                handle.set(leader);
            }
            _ = &mut stop => {
                info!(identity = %identity, "Leaving leader election");
                break;
            }
        }
    }
    handle.set(false);
    record_leader_lost(&identity);
    drop(channel);
}

#[cfg(test)]
#[path = "leader_tests.rs"]
mod leader_tests;
