// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Identity of watched Kubernetes objects.

use crate::constants::{
    APISIX_API_GROUP, APISIX_API_VERSION, APISIX_POLICY_API_VERSION,
    GATEWAY_API_EXPERIMENTAL_VERSION, GATEWAY_API_GROUP, GATEWAY_API_VERSION,
    NETWORKING_API_GROUP,
};
use std::fmt;

/// Every Kubernetes kind the controller watches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Ingress,
    IngressClass,
    Service,
    EndpointSlice,
    Pod,
    Secret,
    GatewayClass,
    Gateway,
    HTTPRoute,
    GRPCRoute,
    TCPRoute,
    TLSRoute,
    UDPRoute,
    ApisixRoute,
    ApisixUpstream,
    ApisixTls,
    ApisixConsumer,
    ApisixPluginConfig,
    ApisixClusterConfig,
    PluginConfig,
    HTTPRoutePolicy,
    BackendTrafficPolicy,
    GatewayProxy,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 23] = [
        Self::Ingress,
        Self::IngressClass,
        Self::Service,
        Self::EndpointSlice,
        Self::Pod,
        Self::Secret,
        Self::GatewayClass,
        Self::Gateway,
        Self::HTTPRoute,
        Self::GRPCRoute,
        Self::TCPRoute,
        Self::TLSRoute,
        Self::UDPRoute,
        Self::ApisixRoute,
        Self::ApisixUpstream,
        Self::ApisixTls,
        Self::ApisixConsumer,
        Self::ApisixPluginConfig,
        Self::ApisixClusterConfig,
        Self::PluginConfig,
        Self::HTTPRoutePolicy,
        Self::BackendTrafficPolicy,
        Self::GatewayProxy,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingress => "Ingress",
            Self::IngressClass => "IngressClass",
            Self::Service => "Service",
            Self::EndpointSlice => "EndpointSlice",
            Self::Pod => "Pod",
            Self::Secret => "Secret",
            Self::GatewayClass => "GatewayClass",
            Self::Gateway => "Gateway",
            Self::HTTPRoute => "HTTPRoute",
            Self::GRPCRoute => "GRPCRoute",
            Self::TCPRoute => "TCPRoute",
            Self::TLSRoute => "TLSRoute",
            Self::UDPRoute => "UDPRoute",
            Self::ApisixRoute => "ApisixRoute",
            Self::ApisixUpstream => "ApisixUpstream",
            Self::ApisixTls => "ApisixTls",
            Self::ApisixConsumer => "ApisixConsumer",
            Self::ApisixPluginConfig => "ApisixPluginConfig",
            Self::ApisixClusterConfig => "ApisixClusterConfig",
            Self::PluginConfig => "PluginConfig",
            Self::HTTPRoutePolicy => "HTTPRoutePolicy",
            Self::BackendTrafficPolicy => "BackendTrafficPolicy",
            Self::GatewayProxy => "GatewayProxy",
        }
    }

    /// Parse a kind name as written in references and data-plane labels.
    #[must_use]
    pub fn parse(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == kind)
    }

    /// Root kinds are translated into data-plane objects; the rest are
    /// dependencies that only influence how roots translate.
    #[must_use]
    pub fn is_root(self) -> bool {
        matches!(
            self,
            Self::Ingress
                | Self::Gateway
                | Self::HTTPRoute
                | Self::GRPCRoute
                | Self::TCPRoute
                | Self::TLSRoute
                | Self::UDPRoute
                | Self::ApisixRoute
                | Self::ApisixTls
                | Self::ApisixConsumer
                | Self::ApisixPluginConfig
                | Self::ApisixClusterConfig
                | Self::GatewayProxy
        )
    }

    #[must_use]
    pub fn is_cluster_scoped(self) -> bool {
        matches!(
            self,
            Self::IngressClass | Self::GatewayClass | Self::ApisixClusterConfig
        )
    }

    /// Gateway API kinds, handled only in `gateway` and `all` modes.
    #[must_use]
    pub fn is_gateway_api(self) -> bool {
        matches!(
            self,
            Self::GatewayClass
                | Self::Gateway
                | Self::HTTPRoute
                | Self::GRPCRoute
                | Self::TCPRoute
                | Self::TLSRoute
                | Self::UDPRoute
                | Self::PluginConfig
                | Self::HTTPRoutePolicy
        )
    }

    /// Kinds handled only in `ingress` and `all` modes.
    #[must_use]
    pub fn is_ingress_family(self) -> bool {
        matches!(
            self,
            Self::Ingress
                | Self::IngressClass
                | Self::ApisixRoute
                | Self::ApisixUpstream
                | Self::ApisixTls
                | Self::ApisixConsumer
                | Self::ApisixPluginConfig
                | Self::ApisixClusterConfig
        )
    }

    /// `(group, version, plural)` of the kind on the API server.
    #[must_use]
    pub fn api_coordinates(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::Ingress => (NETWORKING_API_GROUP, "v1", "ingresses"),
            Self::IngressClass => (NETWORKING_API_GROUP, "v1", "ingressclasses"),
            Self::Service => ("", "v1", "services"),
            Self::EndpointSlice => ("discovery.k8s.io", "v1", "endpointslices"),
            Self::Pod => ("", "v1", "pods"),
            Self::Secret => ("", "v1", "secrets"),
            Self::GatewayClass => (GATEWAY_API_GROUP, GATEWAY_API_VERSION, "gatewayclasses"),
            Self::Gateway => (GATEWAY_API_GROUP, GATEWAY_API_VERSION, "gateways"),
            Self::HTTPRoute => (GATEWAY_API_GROUP, GATEWAY_API_VERSION, "httproutes"),
            Self::GRPCRoute => (GATEWAY_API_GROUP, GATEWAY_API_VERSION, "grpcroutes"),
            Self::TCPRoute => (GATEWAY_API_GROUP, GATEWAY_API_EXPERIMENTAL_VERSION, "tcproutes"),
            Self::TLSRoute => (GATEWAY_API_GROUP, GATEWAY_API_EXPERIMENTAL_VERSION, "tlsroutes"),
            Self::UDPRoute => (GATEWAY_API_GROUP, GATEWAY_API_EXPERIMENTAL_VERSION, "udproutes"),
            Self::ApisixRoute => (APISIX_API_GROUP, APISIX_API_VERSION, "apisixroutes"),
            Self::ApisixUpstream => (APISIX_API_GROUP, APISIX_API_VERSION, "apisixupstreams"),
            Self::ApisixTls => (APISIX_API_GROUP, APISIX_API_VERSION, "apisixtlses"),
            Self::ApisixConsumer => (APISIX_API_GROUP, APISIX_API_VERSION, "apisixconsumers"),
            Self::ApisixPluginConfig => {
                (APISIX_API_GROUP, APISIX_API_VERSION, "apisixpluginconfigs")
            }
            Self::ApisixClusterConfig => {
                (APISIX_API_GROUP, APISIX_API_VERSION, "apisixclusterconfigs")
            }
            Self::PluginConfig => (APISIX_API_GROUP, APISIX_POLICY_API_VERSION, "pluginconfigs"),
            Self::HTTPRoutePolicy => {
                (APISIX_API_GROUP, APISIX_POLICY_API_VERSION, "httproutepolicies")
            }
            Self::BackendTrafficPolicy => (
                APISIX_API_GROUP,
                APISIX_POLICY_API_VERSION,
                "backendtrafficpolicies",
            ),
            Self::GatewayProxy => (APISIX_API_GROUP, APISIX_POLICY_API_VERSION, "gatewayproxies"),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(Kind, Namespace, Name)` of a watched object. Cluster-scoped objects use
/// an empty namespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    #[must_use]
    pub fn new(kind: ResourceKind, namespace: &str, name: &str) -> Self {
        Self {
            kind,
            namespace: if kind.is_cluster_scoped() {
                String::new()
            } else {
                namespace.to_string()
            },
            name: name.to_string(),
        }
    }

    #[must_use]
    pub fn cluster(kind: ResourceKind, name: &str) -> Self {
        Self::new(kind, "", name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
        }
    }
}
