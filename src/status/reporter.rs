// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Writes computed status to the API server.
//!
//! Only the leader writes, and only when the status differs (ignoring
//! `lastTransitionTime`) from both what is on the object and what this
//! process last wrote.

use super::{
    apisix_status, comparable, gateway_status, ingress_status, policy_status, route_status,
    Outcome, Outcomes,
};
use crate::cache::{ObjectKey, ResourceCache, ResourceKind};
use crate::conflict::{policy_attachments, policy_targets};
use crate::crd::{
    ApisixClusterConfig, ApisixConsumer, ApisixPluginConfig, ApisixRoute, ApisixTls,
    ApisixUpstream, GRPCRoute, Gateway, GatewayProxy, HTTPRoute, HTTPRoutePolicy,
    ParentReference, TCPRoute, TLSRoute, UDPRoute,
};
use crate::errors::StatusError;
use crate::leader::Lease;
use crate::metrics;
use crate::retry::retry_api_call;
use crate::router::GroupRouter;
use crate::status_reasons::REASON_GATEWAY_GROUP_UNAVAILABLE;
use async_trait::async_trait;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Sink for status patches.
#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Replace the status of `key` with `status`.
    async fn patch_status(&self, key: &ObjectKey, status: Value) -> Result<(), StatusError>;
}

/// [`StatusWriter`] that merge-patches the status subresource.
pub struct KubeStatusWriter {
    client: Client,
}

impl KubeStatusWriter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, key: &ObjectKey) -> Api<DynamicObject> {
        let (group, version, plural) = key.kind.api_coordinates();
        let gvk = GroupVersionKind::gvk(group, version, key.kind.as_str());
        let resource = ApiResource::from_gvk_with_plural(&gvk, plural);
        if key.kind.is_cluster_scoped() {
            Api::all_with(self.client.clone(), &resource)
        } else {
            Api::namespaced_with(self.client.clone(), &key.namespace, &resource)
        }
    }
}

#[async_trait]
impl StatusWriter for KubeStatusWriter {
    async fn patch_status(&self, key: &ObjectKey, status: Value) -> Result<(), StatusError> {
        let api = self.api(key);
        let patch = json!({ "status": status });
        let name = key.name.clone();
        retry_api_call(
            || {
                let api = api.clone();
                let patch = patch.clone();
                let name = name.clone();
                async move {
                    api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
                        .await
                }
            },
            "patch status",
        )
        .await
        .map(|_| ())
        .map_err(|e| StatusError::Patch {
            key: key.clone(),
            message: e.to_string(),
        })
    }
}

/// What the reporter needs from the controller configuration.
#[derive(Clone, Debug)]
pub struct StatusSettings {
    pub enabled: bool,
    pub controller_name: String,
    /// Published on `Ingress` load-balancer status and `Gateway` addresses
    pub addresses: Vec<String>,
}

pub struct StatusReporter {
    writer: Arc<dyn StatusWriter>,
    lease: Lease,
    cache: Arc<ResourceCache>,
    router: Arc<GroupRouter>,
    settings: StatusSettings,
    last_written: Mutex<HashMap<ObjectKey, Value>>,
}

fn to_value<T: Serialize>(status: &T) -> Option<Value> {
    serde_json::to_value(status).ok()
}

impl StatusReporter {
    #[must_use]
    pub fn new(
        writer: Arc<dyn StatusWriter>,
        lease: Lease,
        cache: Arc<ResourceCache>,
        router: Arc<GroupRouter>,
        settings: StatusSettings,
    ) -> Self {
        Self {
            writer,
            lease,
            cache,
            router,
            settings,
            last_written: Mutex::new(HashMap::new()),
        }
    }

    fn active(&self) -> bool {
        self.settings.enabled && self.lease.is_leader()
    }

    /// Drop what we remember about a deleted object.
    pub fn forget(&self, key: &ObjectKey) {
        self.last_written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Report the outcome of a root.
    ///
    /// Returns `true` when a patch was sent.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError`] when the patch is rejected or the kind has no status.
    pub async fn report(&self, root: &ObjectKey, outcomes: &Outcomes) -> Result<bool, StatusError> {
        if !self.active() {
            return Ok(false);
        }
        match self.build(root, outcomes)? {
            Some(status) => self.write(root, status).await,
            None => Ok(false),
        }
    }

    /// Report every `HTTPRoutePolicy` that targets `target`.
    ///
    /// # Errors
    ///
    /// Returns the first [`StatusError`]; remaining policies are still reported.
    pub async fn report_policies(&self, target: &ObjectKey) -> Result<usize, StatusError> {
        if !self.active() {
            return Ok(0);
        }
        let mut written = 0;
        let mut first_error = None;
        for policy in self.cache.list_namespaced::<HTTPRoutePolicy>(&target.namespace) {
            if !policy_targets(&policy).contains(target) {
                continue;
            }
            match self.write_policy(&policy).await {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(policy = %policy.name_any(), error = %e, "Failed to update policy status");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    /// Report one `HTTPRoutePolicy`, whether or not its targets exist.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError`] when the patch is rejected.
    pub async fn report_policy(&self, key: &ObjectKey) -> Result<bool, StatusError> {
        if !self.active() {
            return Ok(false);
        }
        match self.cache.get_by_key::<HTTPRoutePolicy>(key) {
            Some(policy) => self.write_policy(&policy).await,
            None => Ok(false),
        }
    }

    async fn write_policy(&self, policy: &HTTPRoutePolicy) -> Result<bool, StatusError> {
        let namespace = policy.namespace().unwrap_or_default();
        let key = ObjectKey::new(ResourceKind::HTTPRoutePolicy, &namespace, &policy.name_any());
        let status = policy_status(
            policy.status.as_ref(),
            &self.settings.controller_name,
            &namespace,
            &policy_attachments(&self.cache, policy),
            policy.metadata.generation,
        );
        match to_value(&status) {
            Some(status) => self.write(&key, status).await,
            None => Ok(false),
        }
    }

    /// Status `root` should carry, or `None` when there is nothing to write.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::Unsupported`] for kinds without a status subresource.
    pub fn build(&self, root: &ObjectKey, outcomes: &Outcomes) -> Result<Option<Value>, StatusError> {
        let ns = root.namespace.as_str();
        let name = root.name.as_str();
        let generation = self.cache.meta(root).and_then(|m| m.generation);
        let aggregate = outcomes.aggregate();

        macro_rules! route {
            ($ty:ty) => {
                self.cache.get::<$ty>(ns, name).and_then(|route| {
                    let parents = self.route_parents(ns, &route.spec.parent_refs, outcomes);
                    to_value(&route_status(
                        route.status.as_ref(),
                        &self.settings.controller_name,
                        &parents,
                        generation,
                    ))
                })
            };
        }
        macro_rules! apisix {
            ($ty:ty) => {
                self.cache
                    .get::<$ty>(ns, name)
                    .and_then(|_| to_value(&apisix_status(&aggregate, generation)))
            };
        }

        let status = match root.kind {
            ResourceKind::HTTPRoute => route!(HTTPRoute),
            ResourceKind::GRPCRoute => route!(GRPCRoute),
            ResourceKind::TCPRoute => route!(TCPRoute),
            ResourceKind::TLSRoute => route!(TLSRoute),
            ResourceKind::UDPRoute => route!(UDPRoute),
            ResourceKind::Gateway => self.cache.get::<Gateway>(ns, name).and_then(|_| {
                to_value(&gateway_status(&aggregate, &self.settings.addresses, generation))
            }),
            ResourceKind::Ingress => {
                if self.settings.addresses.is_empty() || !self.cache.contains(root) {
                    None
                } else {
                    to_value(&ingress_status(&self.settings.addresses))
                }
            }
            ResourceKind::ApisixRoute => apisix!(ApisixRoute),
            ResourceKind::ApisixUpstream => apisix!(ApisixUpstream),
            ResourceKind::ApisixTls => apisix!(ApisixTls),
            ResourceKind::ApisixConsumer => apisix!(ApisixConsumer),
            ResourceKind::ApisixPluginConfig => apisix!(ApisixPluginConfig),
            ResourceKind::ApisixClusterConfig => apisix!(ApisixClusterConfig),
            ResourceKind::GatewayProxy => apisix!(GatewayProxy),
            _ => return Err(StatusError::Unsupported(root.clone())),
        };
        Ok(status)
    }

    /// Our parents of a route, each with the outcome of the group it maps to.
    fn route_parents(
        &self,
        namespace: &str,
        parent_refs: &[ParentReference],
        outcomes: &Outcomes,
    ) -> Vec<(ParentReference, Outcome)> {
        self.router
            .attached_gateways(namespace, parent_refs)
            .into_iter()
            .map(|attachment| {
                let outcome = match self.router.resolve_gateway(&attachment.gateway) {
                    Ok(Some(group)) => outcomes.for_group(&group.id),
                    Ok(None) => outcomes.aggregate(),
                    Err(e) => Outcome::failed(REASON_GATEWAY_GROUP_UNAVAILABLE, e.to_string()),
                };
                (attachment.parent_ref, outcome)
            })
            .collect()
    }

    fn current_status(&self, key: &ObjectKey) -> Option<Value> {
        macro_rules! status_of {
            ($ty:ty) => {
                self.cache
                    .get_by_key::<$ty>(key)
                    .and_then(|obj| obj.status.as_ref().and_then(to_value))
            };
        }
        match key.kind {
            ResourceKind::Ingress => status_of!(Ingress),
            ResourceKind::Gateway => status_of!(Gateway),
            ResourceKind::HTTPRoute => status_of!(HTTPRoute),
            ResourceKind::GRPCRoute => status_of!(GRPCRoute),
            ResourceKind::TCPRoute => status_of!(TCPRoute),
            ResourceKind::TLSRoute => status_of!(TLSRoute),
            ResourceKind::UDPRoute => status_of!(UDPRoute),
            ResourceKind::ApisixRoute => status_of!(ApisixRoute),
            ResourceKind::ApisixUpstream => status_of!(ApisixUpstream),
            ResourceKind::ApisixTls => status_of!(ApisixTls),
            ResourceKind::ApisixConsumer => status_of!(ApisixConsumer),
            ResourceKind::ApisixPluginConfig => status_of!(ApisixPluginConfig),
            ResourceKind::ApisixClusterConfig => status_of!(ApisixClusterConfig),
            ResourceKind::HTTPRoutePolicy => status_of!(HTTPRoutePolicy),
            ResourceKind::GatewayProxy => status_of!(GatewayProxy),
            _ => None,
        }
    }

    async fn write(&self, key: &ObjectKey, status: Value) -> Result<bool, StatusError> {
        let wanted = comparable(&status);
        let unchanged = self
            .last_written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .is_some_and(|last| *last == wanted)
            || self
                .current_status(key)
                .is_some_and(|current| comparable(&current) == wanted);
        if unchanged {
            debug!(object = %key, "Status unchanged, skipping patch");
            return Ok(false);
        }

        let result = self.writer.patch_status(key, status).await;
        metrics::record_status_update(key.kind.as_str(), result.is_ok());
        result?;
        debug!(object = %key, "Updated status");
        self.last_written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), wanted);
        Ok(true)
    }
}

#[cfg(test)]
#[path = "reporter_tests.rs"]
mod reporter_tests;
