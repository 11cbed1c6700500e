// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Gateway-group routing.
//!
//! Every root object is pushed to one or more data-plane clusters ("gateway
//! groups"). A group is identified by the `GatewayProxy` it resolves to:
//!
//! - Gateway API routes → parent `Gateway` → `spec.infrastructure.parametersRef`
//!   (or the `GatewayClass` `parametersRef`) → `GatewayProxy`
//! - `Ingress` and `Apisix*` → `IngressClass` → `spec.parameters` → `GatewayProxy`
//!
//! Objects whose class carries no parameters use the configured default group.
//! An empty result means the object is not handled by this controller.

use crate::cache::{ObjectKey, ResourceCache, ResourceKind};
use crate::config::{ControllerConfig, OperatingMode};
use crate::constants::{
    APISIX_API_GROUP, CLUSTER_DOMAIN, DEFAULT_GATEWAY_GROUP_ID, DEFAULT_INGRESS_CLASS_ANNOTATION,
    LEGACY_INGRESS_CLASS_ANNOTATION,
};
use crate::crd::{
    ApisixConsumer, ApisixPluginConfig, ApisixRoute, ApisixTls, GRPCRoute,
    Gateway, GatewayClass, GatewayProxy, HTTPRoute, Listener, ParentReference, TCPRoute,
    TLSRoute, UDPRoute,
};
use crate::dataplane::id::object_id;
use crate::dataplane::GroupId;
use crate::errors::GroupUnavailableError;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::networking::v1::{Ingress, IngressClass};
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A data-plane cluster and the credentials to reach its admin API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayGroup {
    pub id: GroupId,
    pub endpoints: Vec<String>,
    pub admin_key: Option<String>,
    /// `GatewayProxy` the group was built from; `None` for the default group
    pub proxy: Option<ObjectKey>,
}

impl GatewayGroup {
    /// Changes whenever the admin client of the group must be rebuilt.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut parts: Vec<&str> = self.endpoints.iter().map(String::as_str).collect();
        parts.push(self.admin_key.as_deref().unwrap_or_default());
        object_id(&parts)
    }
}

/// Group identifier of a `GatewayProxy`.
#[must_use]
pub fn group_id_for_proxy(namespace: &str, name: &str) -> GroupId {
    format!("{namespace}/{name}")
}

/// Result of routing one root to its gateway groups.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resolution {
    pub groups: Vec<GatewayGroup>,
    /// Groups the root belongs to that cannot be reached right now
    pub unavailable: Vec<GroupUnavailableError>,
}

impl Resolution {
    /// The groups, or the first error when nothing resolved.
    ///
    /// # Errors
    ///
    /// Returns the first [`GroupUnavailableError`] if no group resolved.
    pub fn into_result(self) -> Result<Vec<GatewayGroup>, GroupUnavailableError> {
        match self.unavailable.into_iter().next() {
            Some(e) if self.groups.is_empty() => Err(e),
            _ => Ok(self.groups),
        }
    }
}

impl From<Result<Vec<GatewayGroup>, GroupUnavailableError>> for Resolution {
    fn from(result: Result<Vec<GatewayGroup>, GroupUnavailableError>) -> Self {
        match result {
            Ok(groups) => Self {
                groups,
                unavailable: Vec::new(),
            },
            Err(e) => Self {
                groups: Vec::new(),
                unavailable: vec![e],
            },
        }
    }
}

/// A `Gateway` a route is attached to, with the listeners it may bind.
#[derive(Clone, Debug)]
pub struct ParentAttachment {
    pub parent_ref: ParentReference,
    pub gateway: Arc<Gateway>,
    pub listeners: Vec<Listener>,
}

/// Settings the router needs from the controller configuration.
#[derive(Clone, Debug)]
pub struct RouterSettings {
    pub controller_name: String,
    pub ingress_class: String,
    pub mode: OperatingMode,
    pub default_group: Option<GatewayGroup>,
}

impl RouterSettings {
    #[must_use]
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            controller_name: config.controller_name.clone(),
            ingress_class: config.ingress_class.clone(),
            mode: config.mode,
            default_group: config.default_gateway_group.as_ref().map(|group| GatewayGroup {
                id: DEFAULT_GATEWAY_GROUP_ID.to_string(),
                endpoints: group.endpoints.clone(),
                admin_key: group.admin_key.clone(),
                proxy: None,
            }),
        }
    }
}

pub struct GroupRouter {
    cache: Arc<ResourceCache>,
    settings: RouterSettings,
}

impl GroupRouter {
    #[must_use]
    pub fn new(cache: Arc<ResourceCache>, settings: RouterSettings) -> Self {
        Self { cache, settings }
    }

    #[must_use]
    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    #[must_use]
    pub fn controller_name(&self) -> &str {
        &self.settings.controller_name
    }

    /// Gateway groups a root object must be pushed to.
    ///
    /// # Errors
    ///
    /// Returns [`GroupUnavailableError`] when the object is ours but none of
    /// its groups can be resolved. See [`GroupRouter::resolve_all`] for the
    /// per-group result.
    pub fn resolve(&self, root: &ObjectKey) -> Result<Vec<GatewayGroup>, GroupUnavailableError> {
        self.resolve_all(root).into_result()
    }

    /// Every group of a root that resolves, plus the reasons the others do not.
    ///
    /// A route whose parents map to several groups keeps its healthy groups
    /// when one `GatewayProxy` is missing or unusable.
    #[must_use]
    pub fn resolve_all(&self, root: &ObjectKey) -> Resolution {
        if root.kind.is_gateway_api() && !self.settings.mode.handles_gateway() {
            return Resolution::default();
        }
        if root.kind.is_ingress_family() && !self.settings.mode.handles_ingress() {
            return Resolution::default();
        }

        let ns = root.namespace.as_str();
        let name = root.name.as_str();
        let parent_refs = match root.kind {
            ResourceKind::HTTPRoute => {
                self.cache.get::<HTTPRoute>(ns, name).map(|r| r.spec.parent_refs.clone())
            }
            ResourceKind::GRPCRoute => {
                self.cache.get::<GRPCRoute>(ns, name).map(|r| r.spec.parent_refs.clone())
            }
            ResourceKind::TCPRoute => {
                self.cache.get::<TCPRoute>(ns, name).map(|r| r.spec.parent_refs.clone())
            }
            ResourceKind::TLSRoute => {
                self.cache.get::<TLSRoute>(ns, name).map(|r| r.spec.parent_refs.clone())
            }
            ResourceKind::UDPRoute => {
                self.cache.get::<UDPRoute>(ns, name).map(|r| r.spec.parent_refs.clone())
            }
            _ => return Resolution::from(self.resolve_object(root)),
        };
        match parent_refs {
            Some(parent_refs) => self.resolve_route(ns, &parent_refs),
            None => Resolution::default(),
        }
    }

    /// Groups of a root that is not a Gateway API route.
    fn resolve_object(&self, root: &ObjectKey) -> Result<Vec<GatewayGroup>, GroupUnavailableError> {
        let ns = root.namespace.as_str();
        let name = root.name.as_str();
        match root.kind {
            ResourceKind::Gateway => match self.cache.get::<Gateway>(ns, name) {
                Some(gateway) => self.resolve_gateway(&gateway).map(|g| g.into_iter().collect()),
                None => Ok(Vec::new()),
            },
            ResourceKind::Ingress => match self.cache.get::<Ingress>(ns, name) {
                Some(ingress) => self.resolve_ingress(root, &ingress),
                None => Ok(Vec::new()),
            },
            ResourceKind::ApisixRoute => self.resolve_apisix_class(
                root,
                self.cache
                    .get::<ApisixRoute>(ns, name)
                    .map(|o| o.spec.ingress_class_name.clone()),
            ),
            ResourceKind::ApisixTls => self.resolve_apisix_class(
                root,
                self.cache
                    .get::<ApisixTls>(ns, name)
                    .map(|o| o.spec.ingress_class_name.clone()),
            ),
            ResourceKind::ApisixConsumer => self.resolve_apisix_class(
                root,
                self.cache
                    .get::<ApisixConsumer>(ns, name)
                    .map(|o| o.spec.ingress_class_name.clone()),
            ),
            ResourceKind::ApisixPluginConfig => self.resolve_apisix_class(
                root,
                self.cache
                    .get::<ApisixPluginConfig>(ns, name)
                    .map(|o| o.spec.ingress_class_name.clone()),
            ),
            ResourceKind::ApisixClusterConfig => {
                if self.cache.contains(root) {
                    self.default_group(root).map(|g| vec![g])
                } else {
                    Ok(Vec::new())
                }
            }
            ResourceKind::GatewayProxy => match self.cache.get::<GatewayProxy>(ns, name) {
                Some(proxy) if self.proxy_is_referenced(ns, name) => {
                    self.group_for_proxy(&proxy).map(|g| vec![g])
                }
                _ => Ok(Vec::new()),
            },
            _ => Ok(Vec::new()),
        }
    }

    fn default_group(&self, root: &ObjectKey) -> Result<GatewayGroup, GroupUnavailableError> {
        self.settings
            .default_group
            .clone()
            .ok_or_else(|| GroupUnavailableError::NoDefaultGroup(root.clone()))
    }

    /// Build the group a `GatewayProxy` describes.
    ///
    /// # Errors
    ///
    /// Returns [`GroupUnavailableError`] when the proxy has no endpoints or its
    /// admin key secret is missing.
    pub fn group_for_proxy(&self, proxy: &GatewayProxy) -> Result<GatewayGroup, GroupUnavailableError> {
        let namespace = proxy.namespace().unwrap_or_default();
        let name = proxy.name_any();
        let control_plane = proxy
            .spec
            .provider
            .as_ref()
            .and_then(|provider| provider.control_plane.as_ref());

        let mut endpoints: Vec<String> = control_plane
            .map(|cp| cp.endpoints.clone())
            .unwrap_or_default();
        if endpoints.is_empty() {
            if let Some(service) = control_plane.and_then(|cp| cp.service.as_ref()) {
                endpoints.push(format!(
                    "http://{}.{namespace}.{CLUSTER_DOMAIN}:{}",
                    service.name, service.port
                ));
            }
        }
        if endpoints.is_empty() {
            return Err(GroupUnavailableError::NoEndpoints { namespace, name });
        }

        let admin_key = match control_plane.and_then(|cp| cp.auth.admin_key.as_ref()) {
            Some(auth) => match (&auth.value, &auth.value_from) {
                (Some(value), _) => Some(value.clone()),
                (None, Some(from)) => {
                    let selector = &from.secret_key_ref;
                    let value = self
                        .cache
                        .get::<Secret>(&namespace, &selector.name)
                        .and_then(|secret| secret_string(&secret, &selector.key));
                    match value {
                        Some(value) => Some(value),
                        None => {
                            return Err(GroupUnavailableError::AdminKeyUnavailable {
                                namespace,
                                name: selector.name.clone(),
                                key: selector.key.clone(),
                            })
                        }
                    }
                }
                (None, None) => None,
            },
            None => None,
        };

        Ok(GatewayGroup {
            id: group_id_for_proxy(&namespace, &name),
            endpoints,
            admin_key,
            proxy: Some(ObjectKey::new(ResourceKind::GatewayProxy, &namespace, &name)),
        })
    }

    fn proxy_group(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<GatewayGroup, GroupUnavailableError> {
        let proxy = self.cache.get::<GatewayProxy>(namespace, name).ok_or_else(|| {
            GroupUnavailableError::ProxyNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }
        })?;
        self.group_for_proxy(&proxy)
    }

    // ========================================================================
    // Gateway API
    // ========================================================================

    /// The `GatewayClass` of a gateway, if it is handled by this controller.
    #[must_use]
    pub fn owned_class(&self, gateway: &Gateway) -> Option<Arc<GatewayClass>> {
        self.cache
            .get::<GatewayClass>("", &gateway.spec.gateway_class_name)
            .filter(|class| class.spec.controller_name == self.settings.controller_name)
    }

    /// Group of a `Gateway`, or `None` when its class is not ours.
    ///
    /// # Errors
    ///
    /// Returns [`GroupUnavailableError`] if the referenced `GatewayProxy` is unusable.
    pub fn resolve_gateway(
        &self,
        gateway: &Gateway,
    ) -> Result<Option<GatewayGroup>, GroupUnavailableError> {
        let Some(class) = self.owned_class(gateway) else {
            return Ok(None);
        };
        let namespace = gateway.namespace().unwrap_or_default();

        let infra = gateway
            .spec
            .infrastructure
            .as_ref()
            .and_then(|infra| infra.parameters_ref.as_ref())
            .filter(|r| r.group == APISIX_API_GROUP && r.kind == "GatewayProxy");
        if let Some(reference) = infra {
            return self.proxy_group(&namespace, &reference.name).map(Some);
        }

        let class_params = class
            .spec
            .parameters_ref
            .as_ref()
            .filter(|r| r.group == APISIX_API_GROUP && r.kind == "GatewayProxy");
        if let Some(reference) = class_params {
            let proxy_ns = reference.namespace.clone().unwrap_or(namespace);
            return self.proxy_group(&proxy_ns, &reference.name).map(Some);
        }

        let key = ObjectKey::new(ResourceKind::Gateway, &namespace, &gateway.name_any());
        self.default_group(&key).map(Some)
    }

    /// Parents of a route that are our `Gateway`s and admit the route.
    #[must_use]
    pub fn attached_gateways(
        &self,
        route_namespace: &str,
        parent_refs: &[ParentReference],
    ) -> Vec<ParentAttachment> {
        let mut attachments = Vec::new();
        for parent_ref in parent_refs.iter().filter(|p| p.is_gateway()) {
            let gw_namespace = parent_ref.namespace.as_deref().unwrap_or(route_namespace);
            let Some(gateway) = self.cache.get::<Gateway>(gw_namespace, &parent_ref.name) else {
                continue;
            };
            if self.owned_class(&gateway).is_none() {
                continue;
            }
            let listeners: Vec<Listener> = gateway
                .spec
                .listeners
                .iter()
                .filter(|listener| {
                    parent_ref
                        .section_name
                        .as_ref()
                        .is_none_or(|section| *section == listener.name)
                        && parent_ref.port.is_none_or(|port| port == listener.port)
                        && listener_admits(listener, gw_namespace, route_namespace)
                })
                .cloned()
                .collect();
            if listeners.is_empty() {
                continue;
            }
            attachments.push(ParentAttachment {
                parent_ref: parent_ref.clone(),
                gateway,
                listeners,
            });
        }
        attachments
    }

    fn resolve_route(&self, namespace: &str, parent_refs: &[ParentReference]) -> Resolution {
        let mut groups: BTreeMap<GroupId, GatewayGroup> = BTreeMap::new();
        let mut unavailable = Vec::new();
        for attachment in self.attached_gateways(namespace, parent_refs) {
            match self.resolve_gateway(&attachment.gateway) {
                Ok(Some(group)) => {
                    groups.entry(group.id.clone()).or_insert(group);
                }
                Ok(None) => {}
                Err(e) if !unavailable.contains(&e) => unavailable.push(e),
                Err(_) => {}
            }
        }
        Resolution {
            groups: groups.into_values().collect(),
            unavailable,
        }
    }

    /// Whether any of our classes or gateways points at this `GatewayProxy`.
    fn proxy_is_referenced(&self, namespace: &str, name: &str) -> bool {
        let by_ingress_class = self.cache.list::<IngressClass>().iter().any(|class| {
            self.ingress_class_is_ours(class)
                && ingress_class_proxy(class).is_some_and(|(ns, n)| ns == namespace && n == name)
        });
        let by_gateway_class = self.cache.list::<GatewayClass>().iter().any(|class| {
            class.spec.controller_name == self.settings.controller_name
                && class.spec.parameters_ref.as_ref().is_some_and(|r| {
                    r.kind == "GatewayProxy"
                        && r.name == name
                        && r.namespace.as_deref() == Some(namespace)
                })
        });
        let by_gateway = self.cache.list_namespaced::<Gateway>(namespace).iter().any(|gw| {
            self.owned_class(gw).is_some()
                && gw
                    .spec
                    .infrastructure
                    .as_ref()
                    .and_then(|i| i.parameters_ref.as_ref())
                    .is_some_and(|r| r.kind == "GatewayProxy" && r.name == name)
        });
        by_ingress_class || by_gateway_class || by_gateway
    }

    // ========================================================================
    // Ingress and Apisix CRDs
    // ========================================================================

    fn ingress_class_is_ours(&self, class: &IngressClass) -> bool {
        class
            .spec
            .as_ref()
            .and_then(|spec| spec.controller.as_deref())
            == Some(self.settings.controller_name.as_str())
    }

    /// Class name an `Ingress` asks for, falling back to the default `IngressClass`.
    #[must_use]
    pub fn ingress_class_name(&self, ingress: &Ingress) -> Option<String> {
        let explicit = ingress
            .spec
            .as_ref()
            .and_then(|spec| spec.ingress_class_name.clone())
            .or_else(|| {
                ingress
                    .annotations()
                    .get(LEGACY_INGRESS_CLASS_ANNOTATION)
                    .cloned()
            });
        explicit.or_else(|| {
            self.cache
                .list::<IngressClass>()
                .iter()
                .find(|class| {
                    class
                        .annotations()
                        .get(DEFAULT_INGRESS_CLASS_ANNOTATION)
                        .is_some_and(|v| v == "true")
                })
                .map(|class| class.name_any())
        })
    }

    fn resolve_ingress(
        &self,
        root: &ObjectKey,
        ingress: &Ingress,
    ) -> Result<Vec<GatewayGroup>, GroupUnavailableError> {
        match self.ingress_class_name(ingress) {
            Some(class_name) => self.resolve_class_name(root, &class_name),
            None => Ok(Vec::new()),
        }
    }

    fn resolve_apisix_class(
        &self,
        root: &ObjectKey,
        class_name: Option<Option<String>>,
    ) -> Result<Vec<GatewayGroup>, GroupUnavailableError> {
        match class_name {
            // Classless Apisix objects belong to the configured ingress class.
            Some(class_name) => {
                let class_name =
                    class_name.unwrap_or_else(|| self.settings.ingress_class.clone());
                self.resolve_class_name(root, &class_name)
            }
            None => Ok(Vec::new()),
        }
    }

    fn resolve_class_name(
        &self,
        root: &ObjectKey,
        class_name: &str,
    ) -> Result<Vec<GatewayGroup>, GroupUnavailableError> {
        match self.cache.get::<IngressClass>("", class_name) {
            Some(class) if self.ingress_class_is_ours(&class) => {
                match ingress_class_proxy(&class) {
                    Some((namespace, name)) => {
                        let namespace = if namespace.is_empty() {
                            root.namespace.clone()
                        } else {
                            namespace
                        };
                        self.proxy_group(&namespace, &name).map(|g| vec![g])
                    }
                    None => self.default_group(root).map(|g| vec![g]),
                }
            }
            Some(_) => Ok(Vec::new()),
            None if class_name == self.settings.ingress_class => {
                self.default_group(root).map(|g| vec![g])
            }
            None => Ok(Vec::new()),
        }
    }
}

/// `(namespace, name)` of the `GatewayProxy` an `IngressClass` names.
#[must_use]
pub fn ingress_class_proxy(class: &IngressClass) -> Option<(String, String)> {
    let params = class.spec.as_ref()?.parameters.as_ref()?;
    let group_matches = params.api_group.as_deref() == Some(APISIX_API_GROUP);
    (group_matches && params.kind == "GatewayProxy").then(|| {
        (
            params.namespace.clone().unwrap_or_default(),
            params.name.clone(),
        )
    })
}

fn listener_admits(listener: &Listener, gateway_namespace: &str, route_namespace: &str) -> bool {
    let from = listener
        .allowed_routes
        .as_ref()
        .and_then(|allowed| allowed.namespaces.as_ref())
        .and_then(|namespaces| namespaces.from.as_deref())
        .unwrap_or("Same");
    match from {
        "Same" => gateway_namespace == route_namespace,
        // Selector is treated as All; namespace labels are not watched.
        _ => true,
    }
}

/// UTF-8 value of a key in a `Secret`.
#[must_use]
pub fn secret_string(secret: &Secret, key: &str) -> Option<String> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .and_then(|bytes| String::from_utf8(bytes.0.clone()).ok())
        .or_else(|| {
            secret
                .string_data
                .as_ref()
                .and_then(|data| data.get(key).cloned())
        })
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod router_tests;
