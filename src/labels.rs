// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Data-plane label constants.
//!
//! Data-plane labels tie every object pushed to the admin API back to the
//! Kubernetes object that produced it, which is what orphan collection keys on.

// ============================================================================
// Data-Plane Object Labels
// ============================================================================

/// Label marking objects owned by this controller
pub const DP_MANAGED_BY: &str = "managed-by";

/// Value of [`DP_MANAGED_BY`] on every object this controller pushes
pub const MANAGED_BY_CONTROLLER: &str = "apisix-ingress-controller";

/// Label holding the kind of the source object
pub const DP_SOURCE_KIND: &str = "k8s/kind";

/// Label holding the namespace of the source object
pub const DP_SOURCE_NAMESPACE: &str = "k8s/namespace";

/// Label holding the name of the source object
pub const DP_SOURCE_NAME: &str = "k8s/name";
