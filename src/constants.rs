// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the APISIX ingress controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for the APISIX CRD family
pub const APISIX_API_GROUP: &str = "apisix.apache.org";

/// Stable API version of the `Apisix*` CRDs
pub const APISIX_API_VERSION: &str = "v2";

/// API version of the policy and `GatewayProxy` CRDs
pub const APISIX_POLICY_API_VERSION: &str = "v1alpha1";

/// Gateway API group
pub const GATEWAY_API_GROUP: &str = "gateway.networking.k8s.io";

/// Gateway API version for `Gateway`, `GatewayClass`, `HTTPRoute` and `GRPCRoute`
pub const GATEWAY_API_VERSION: &str = "v1";

/// Gateway API version for the experimental stream route kinds
pub const GATEWAY_API_EXPERIMENTAL_VERSION: &str = "v1alpha2";

/// API group of the native `Ingress` and `IngressClass` kinds
pub const NETWORKING_API_GROUP: &str = "networking.k8s.io";

// ============================================================================
// Controller Identity Constants
// ============================================================================

/// Controller name matched against `GatewayClass` and `IngressClass` controllers
pub const DEFAULT_CONTROLLER_NAME: &str = "apisix.apache.org/apisix-ingress-controller";

/// Ingress class handled when an object does not name one
pub const DEFAULT_INGRESS_CLASS: &str = "apisix";

/// Annotation that marks an `IngressClass` as the cluster default
pub const DEFAULT_INGRESS_CLASS_ANNOTATION: &str = "ingressclass.kubernetes.io/is-default-class";

/// Legacy annotation selecting the ingress class of an `Ingress`
pub const LEGACY_INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

/// Identifier of the gateway group built from the static configuration
pub const DEFAULT_GATEWAY_GROUP_ID: &str = "default";

// ============================================================================
// Admin API Constants
// ============================================================================

/// Path prefix of every admin API resource
pub const ADMIN_API_PREFIX: &str = "/apisix/admin";

/// Header carrying the admin key
pub const ADMIN_KEY_HEADER: &str = "X-API-KEY";

/// Default timeout for a single admin API call (10 seconds)
pub const DEFAULT_ADMIN_TIMEOUT_SECS: u64 = 10;

/// Default number of attempts for one admin API operation
pub const DEFAULT_ADMIN_MAX_ATTEMPTS: u32 = 3;

// ============================================================================
// Translation Constants
// ============================================================================

/// Weight given to every upstream node
pub const DEFAULT_NODE_WEIGHT: i32 = 100;

/// Weight of a Gateway API backend without an explicit weight
pub const DEFAULT_GATEWAY_BACKEND_WEIGHT: i32 = 1;

/// Weight of an `ApisixRoute` backend without an explicit weight
pub const DEFAULT_APISIX_BACKEND_WEIGHT: i32 = 100;

/// Status code returned by redirects that do not set one
pub const DEFAULT_REDIRECT_STATUS_CODE: i32 = 302;

/// Status code returned by rules that have no usable backend
pub const NO_BACKEND_STATUS_CODE: i32 = 500;

/// Kubernetes label linking an `EndpointSlice` to its `Service`
pub const ENDPOINT_SLICE_SERVICE_LABEL: &str = "kubernetes.io/service-name";

/// Cluster DNS suffix used to address mirror targets
pub const CLUSTER_DOMAIN: &str = "svc.cluster.local";

// ============================================================================
// Ingress Annotation Constants
// ============================================================================

/// `"true"` proxies websocket upgrades
pub const ANNOTATION_ENABLE_WEBSOCKET: &str = "k8s.apisix.apache.org/enable-websocket";

/// `"true"` redirects plain HTTP requests to HTTPS
pub const ANNOTATION_HTTP_TO_HTTPS: &str = "k8s.apisix.apache.org/http-to-https";

/// Fixed URI sent upstream
pub const ANNOTATION_REWRITE_TARGET: &str = "k8s.apisix.apache.org/rewrite-target";

/// Regex applied to the request URI before proxying
pub const ANNOTATION_REWRITE_TARGET_REGEX: &str = "k8s.apisix.apache.org/rewrite-target-regex";

/// Replacement template for [`ANNOTATION_REWRITE_TARGET_REGEX`]
pub const ANNOTATION_REWRITE_TARGET_REGEX_TEMPLATE: &str =
    "k8s.apisix.apache.org/rewrite-target-regex-template";

/// Comma separated CIDRs allowed to reach the backends
pub const ANNOTATION_ALLOWLIST_SOURCE_RANGE: &str = "k8s.apisix.apache.org/allowlist-source-range";

/// Comma separated CIDRs denied access to the backends
pub const ANNOTATION_BLOCKLIST_SOURCE_RANGE: &str = "k8s.apisix.apache.org/blocklist-source-range";

/// `"true"` enables the `cors` plugin
pub const ANNOTATION_ENABLE_CORS: &str = "k8s.apisix.apache.org/enable-cors";

/// Allowed origins for the `cors` plugin
pub const ANNOTATION_CORS_ALLOW_ORIGIN: &str = "k8s.apisix.apache.org/cors-allow-origin";

/// Allowed methods for the `cors` plugin
pub const ANNOTATION_CORS_ALLOW_METHODS: &str = "k8s.apisix.apache.org/cors-allow-methods";

/// Allowed headers for the `cors` plugin
pub const ANNOTATION_CORS_ALLOW_HEADERS: &str = "k8s.apisix.apache.org/cors-allow-headers";

/// Name of an `ApisixPluginConfig` in the same namespace
pub const ANNOTATION_PLUGIN_CONFIG_NAME: &str = "k8s.apisix.apache.org/plugin-config-name";

/// `"true"` treats `ImplementationSpecific` paths as regular expressions
pub const ANNOTATION_USE_REGEX: &str = "k8s.apisix.apache.org/use-regex";

// ============================================================================
// Reconciliation Constants
// ============================================================================

/// Default interval between full resync passes (5 minutes)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Default number of reconciliation workers
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// First retry delay for an object whose sync failed (1 second)
pub const FAILED_OBJECT_INITIAL_BACKOFF_MILLIS: u64 = 1000;

/// Requeue delay when a gateway group cannot be resolved (30 seconds)
pub const GROUP_UNAVAILABLE_REQUEUE_SECS: u64 = 30;

// ============================================================================
// Leader Election Constants
// ============================================================================

/// Default leader election lease name
pub const DEFAULT_LEASE_NAME: &str = "apisix-ingress-controller-leader";

/// Default namespace holding the leader election lease
pub const DEFAULT_LEASE_NAMESPACE: &str = "apisix-ingress";

/// Default leader election lease duration (15 seconds)
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 15;

/// Default grace period before a lease is considered expired (5 seconds)
pub const DEFAULT_LEASE_GRACE_SECS: u64 = 5;

/// How long shutdown waits for the Lease to be released
pub const LEASE_RELEASE_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Default bind address of the health and metrics server
pub const DEFAULT_METRICS_BIND_ADDRESS: &str = "0.0.0.0:8080";
