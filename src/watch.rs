// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes watchers feeding the [`ResourceCache`].
//!
//! One `kube` watcher runs per kind the operating mode needs. Every event is
//! applied to the cache first and then handed to [`Engine::on_change`], so the
//! relationship resolver always sees the post-event state. A relist (`Init` ..
//! `InitDone`) replaces the kind's index in one step; objects that vanished
//! while the watch was down are reported as changes like ordinary deletes.

use crate::cache::{key_of, CachedKind, ObjectKey, ResourceCache, ResourceKind};
use crate::config::OperatingMode;
use crate::crd::{
    ApisixClusterConfig, ApisixConsumer, ApisixPluginConfig, ApisixRoute, ApisixTls,
    ApisixUpstream, BackendTrafficPolicy, GRPCRoute, Gateway, GatewayClass, GatewayProxy,
    HTTPRoute, HTTPRoutePolicy, PluginConfig, TCPRoute, TLSRoute, UDPRoute,
};
use crate::engine::Engine;
use crate::metrics;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Pod, Secret, Service};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use k8s_openapi::api::networking::v1::{Ingress, IngressClass};
use kube::api::ListParams;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client, ResourceExt};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Kinds watched in `mode`.
#[must_use]
pub fn kinds_for_mode(mode: OperatingMode) -> Vec<ResourceKind> {
    ResourceKind::ALL
        .into_iter()
        .filter(|kind| {
            if kind.is_gateway_api() {
                mode.handles_gateway()
            } else if kind.is_ingress_family() {
                mode.handles_ingress()
            } else {
                true
            }
        })
        .collect()
}

/// Objects buffered during a relist.
pub struct Relist<K> {
    pending: Vec<K>,
}

impl<K> Default for Relist<K> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
        }
    }
}

/// Apply one watcher event to the cache.
///
/// Returns the keys whose cached state changed.
pub fn apply_event<K: CachedKind>(
    cache: &ResourceCache,
    relist: &mut Relist<K>,
    event: Event<K>,
) -> Vec<ObjectKey> {
    let kind = K::KIND.as_str();
    match event {
        Event::Apply(obj) => {
            metrics::record_watch_event(kind, "apply");
            let key = key_of(&obj);
            let version = obj.resource_version();
            match cache.apply(obj) {
                Some(previous) if version.is_some() && previous.resource_version() == version => {
                    Vec::new()
                }
                _ => vec![key],
            }
        }
        Event::Delete(obj) => {
            metrics::record_watch_event(kind, "delete");
            let key = key_of(&obj);
            match cache.delete::<K>(&key.namespace, &key.name) {
                Some(_) => vec![key],
                None => Vec::new(),
            }
        }
        Event::Init => {
            relist.pending.clear();
            Vec::new()
        }
        Event::InitApply(obj) => {
            relist.pending.push(obj);
            Vec::new()
        }
        Event::InitDone => {
            metrics::record_watch_event(kind, "relist");
            let objects = std::mem::take(&mut relist.pending);
            let mut changed: Vec<ObjectKey> = objects
                .iter()
                .filter(|obj| {
                    let key = key_of(*obj);
                    match cache.meta(&key) {
                        Some(meta) => {
                            obj.resource_version().is_none()
                                || meta.resource_version != obj.resource_version()
                        }
                        None => true,
                    }
                })
                .map(key_of)
                .collect();
            let total = objects.len();
            let removed = cache.replace(objects);
            changed.extend(removed.iter().map(|obj| key_of(obj.as_ref())));
            cache.mark_synced(K::KIND);
            debug!(
                kind,
                objects = total,
                changed = changed.len(),
                "Relist complete"
            );
            changed
        }
    }
}

/// Whether the API server serves `K`; CRDs may be missing from the cluster.
async fn is_served<K>(api: &Api<K>) -> bool
where
    K: CachedKind + DeserializeOwned + Debug,
{
    match api.list_metadata(&ListParams::default().limit(1)).await {
        Ok(_) => true,
        Err(kube::Error::Api(status)) if status.code == 404 => false,
        // Transient failures: start the watcher and let its backoff retry
        Err(e) => {
            warn!(kind = K::KIND.as_str(), error = %e, "Could not probe resource; watching anyway");
            true
        }
    }
}

fn spawn_kind<K>(client: Client, engine: Arc<Engine>) -> JoinHandle<()>
where
    K: CachedKind + DeserializeOwned + Debug,
{
    tokio::spawn(async move {
        let kind = K::KIND.as_str();
        let api: Api<K> = Api::all(client);
        let cache = engine.cache().clone();
        if !is_served(&api).await {
            warn!(kind, "Resource is not served by the API server; skipping");
            cache.mark_synced(K::KIND);
            return;
        }

        info!(kind, "Starting watcher");
        let mut relist = Relist::<K>::default();
        let mut stream = watcher::watcher(api, watcher::Config::default())
            .default_backoff()
            .boxed();
        while let Some(event) = stream.next().await {
            match event {
                Ok(event) => {
                    for key in apply_event(&cache, &mut relist, event) {
                        engine.on_change(&key);
                    }
                }
                Err(e) => {
                    metrics::record_watch_event(kind, "error");
                    warn!(kind, error = %e, "Watch error");
                }
            }
        }
        warn!(kind, "Watch stream ended");
    })
}

/// Start a watcher for every kind `mode` needs.
///
/// The cache is told which kinds to expect before any watcher starts, so it
/// only reports ready once all of them finished their first list.
#[must_use]
pub fn start(client: &Client, engine: &Arc<Engine>, mode: OperatingMode) -> Vec<JoinHandle<()>> {
    let kinds = kinds_for_mode(mode);
    engine.cache().expect_kinds(&kinds);

    kinds
        .into_iter()
        .map(|kind| {
            let client = client.clone();
            let engine = Arc::clone(engine);
            match kind {
                ResourceKind::Ingress => spawn_kind::<Ingress>(client, engine),
                ResourceKind::IngressClass => spawn_kind::<IngressClass>(client, engine),
                ResourceKind::Service => spawn_kind::<Service>(client, engine),
                ResourceKind::EndpointSlice => spawn_kind::<EndpointSlice>(client, engine),
                ResourceKind::Pod => spawn_kind::<Pod>(client, engine),
                ResourceKind::Secret => spawn_kind::<Secret>(client, engine),
                ResourceKind::GatewayClass => spawn_kind::<GatewayClass>(client, engine),
                ResourceKind::Gateway => spawn_kind::<Gateway>(client, engine),
                ResourceKind::HTTPRoute => spawn_kind::<HTTPRoute>(client, engine),
                ResourceKind::GRPCRoute => spawn_kind::<GRPCRoute>(client, engine),
                ResourceKind::TCPRoute => spawn_kind::<TCPRoute>(client, engine),
                ResourceKind::TLSRoute => spawn_kind::<TLSRoute>(client, engine),
                ResourceKind::UDPRoute => spawn_kind::<UDPRoute>(client, engine),
                ResourceKind::ApisixRoute => spawn_kind::<ApisixRoute>(client, engine),
                ResourceKind::ApisixUpstream => spawn_kind::<ApisixUpstream>(client, engine),
                ResourceKind::ApisixTls => spawn_kind::<ApisixTls>(client, engine),
                ResourceKind::ApisixConsumer => spawn_kind::<ApisixConsumer>(client, engine),
                ResourceKind::ApisixPluginConfig => {
                    spawn_kind::<ApisixPluginConfig>(client, engine)
                }
                ResourceKind::ApisixClusterConfig => {
                    spawn_kind::<ApisixClusterConfig>(client, engine)
                }
                ResourceKind::PluginConfig => spawn_kind::<PluginConfig>(client, engine),
                ResourceKind::HTTPRoutePolicy => spawn_kind::<HTTPRoutePolicy>(client, engine),
                ResourceKind::BackendTrafficPolicy => {
                    spawn_kind::<BackendTrafficPolicy>(client, engine)
                }
                ResourceKind::GatewayProxy => spawn_kind::<GatewayProxy>(client, engine),
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod watch_tests;
