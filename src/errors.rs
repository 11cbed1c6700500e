// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error taxonomy for the reconciliation engine.
//!
//! Each error class maps to one handling policy:
//!
//! | Error | Handling |
//! |-------|----------|
//! | [`TranslationError`] | reported as `ResourceSyncAborted`, never retried automatically |
//! | [`AdminApiError`] | bounded retry in the client, then backoff up to the resync interval |
//! | [`GroupUnavailableError`] | isolates the affected root, requeued with a fixed delay |
//! | [`SyncError`] | aggregated per gateway group |
//!
//! Policy arbitration losses are not errors: see [`crate::conflict`].

use crate::cache::ObjectKey;
use thiserror::Error;

/// Why a root object could not be translated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{source_key}: {reason}")]
pub struct TranslationError {
    /// The root object whose translation aborted
    pub source_key: ObjectKey,
    /// What went wrong
    pub reason: TranslationReason,
}

impl TranslationError {
    #[must_use]
    pub fn new(source_key: &ObjectKey, reason: TranslationReason) -> Self {
        Self {
            source_key: source_key.clone(),
            reason,
        }
    }
}

/// Specific translation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslationReason {
    #[error("service {namespace}/{name} not found")]
    ServiceNotFound { namespace: String, name: String },

    #[error("service {namespace}/{name} has no port {port}")]
    ServicePortNotFound {
        namespace: String,
        name: String,
        port: String,
    },

    #[error("subset {subset} is not declared by ApisixUpstream {namespace}/{name}")]
    SubsetNotFound {
        namespace: String,
        name: String,
        subset: String,
    },

    #[error("secret {namespace}/{name} not found")]
    SecretNotFound { namespace: String, name: String },

    #[error("secret {namespace}/{name} has no key {key}")]
    SecretKeyMissing {
        namespace: String,
        name: String,
        key: String,
    },

    #[error("{kind} {namespace}/{name} referenced as plugin config not found")]
    PluginConfigNotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("unsupported backend {kind} {name}")]
    UnsupportedBackend { kind: String, name: String },

    #[error("unsupported filter combination: {0}")]
    UnsupportedFilter(String),

    #[error("invalid value for {field}: {message}")]
    InvalidField { field: String, message: String },

    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// Plugin configuration rejected by the plugin registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("plugin {plugin} configuration must be a JSON object")]
    NotAnObject { plugin: String },

    #[error("plugin {plugin}: field {field} {message}")]
    InvalidField {
        plugin: String,
        field: String,
        message: String,
    },
}

/// Failure talking to a data-plane admin API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdminApiError {
    #[error("admin API returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("admin API connection failed: {0}")]
    Connection(String),

    #[error("admin API call timed out")]
    Timeout,

    #[error("admin API response could not be decoded: {0}")]
    Decode(String),

    #[error("gateway group has no admin endpoints")]
    NoEndpoints,
}

impl AdminApiError {
    /// Whether retrying the same call could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => {
                matches!(*status, 429 | 500 | 502 | 503 | 504)
            }
            Self::Connection(_) | Self::Timeout => true,
            Self::Decode(_) | Self::NoEndpoints => false,
        }
    }
}

/// A root object could not be mapped to its gateway group.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupUnavailableError {
    #[error("GatewayProxy {namespace}/{name} not found")]
    ProxyNotFound { namespace: String, name: String },

    #[error("GatewayProxy {namespace}/{name} declares no admin endpoints")]
    NoEndpoints { namespace: String, name: String },

    #[error("admin key secret {namespace}/{name} (key {key}) not available")]
    AdminKeyUnavailable {
        namespace: String,
        name: String,
        key: String,
    },

    #[error("{0} has no GatewayProxy and no default gateway group is configured")]
    NoDefaultGroup(ObjectKey),
}

/// Failure of a sync pass for one gateway group.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("leadership is not held; sync skipped")]
    NotLeader,

    #[error("gateway group {0} is not known to the executor")]
    UnknownGroup(String),

    #[error("listing {kind} from gateway group {group} failed: {source}")]
    List {
        group: String,
        kind: String,
        #[source]
        source: AdminApiError,
    },
}

/// Failure writing status back to Kubernetes.
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("status patch for {key} failed: {message}")]
    Patch { key: ObjectKey, message: String },

    #[error("{0} has no status subresource")]
    Unsupported(ObjectKey),
}
