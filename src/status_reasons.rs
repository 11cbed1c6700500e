// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Standard Kubernetes status condition types and reasons.
//!
//! Reasons are programmatic identifiers in CamelCase that explain why a condition has
//! a particular status. The Gateway API kinds reuse the upstream Gateway API vocabulary
//! (`Accepted`, `ResolvedRefs`, `Programmed`); the APISIX CRDs and `Ingress` report a
//! single `Accepted` condition.
//!
//! # Example Status
//!
//! ```yaml
//! status:
//!   parents:
//!     - parentRef:
//!         name: apisix
//!       controllerName: apisix.apache.org/apisix-ingress-controller
//!       conditions:
//!         - type: Accepted
//!           status: "True"
//!           reason: Accepted
//!           observedGeneration: 3
//!         - type: ResolvedRefs
//!           status: "True"
//!           reason: ResolvedRefs
//!           observedGeneration: 3
//! ```

// ============================================================================
// Condition Types
// ============================================================================

/// The object was accepted and its configuration reached the data plane.
pub const CONDITION_TYPE_ACCEPTED: &str = "Accepted";

/// Every object referenced by a route could be resolved.
pub const CONDITION_TYPE_RESOLVED_REFS: &str = "ResolvedRefs";

/// A `Gateway` has been programmed into its data plane.
pub const CONDITION_TYPE_PROGRAMMED: &str = "Programmed";

// ============================================================================
// Success Reasons
// ============================================================================

/// The object was translated and synced.
pub const REASON_ACCEPTED: &str = "Accepted";

/// Every reference was resolved.
pub const REASON_RESOLVED_REFS: &str = "ResolvedRefs";

/// The gateway configuration was pushed to its data plane.
pub const REASON_PROGRAMMED: &str = "Programmed";

// ============================================================================
// Failure Reasons
// ============================================================================

/// Translation failed; the object keeps serving its last synced configuration.
///
/// Not retried until the object (or something it references) changes.
pub const REASON_RESOURCE_SYNC_ABORTED: &str = "ResourceSyncAborted";

/// The admin API rejected or failed one of the object's data-plane entities.
///
/// Retried with backoff up to the resync interval.
pub const REASON_SYNC_FAILED: &str = "SyncFailed";

/// The object's gateway group could not be resolved.
pub const REASON_GATEWAY_GROUP_UNAVAILABLE: &str = "GatewayGroupUnavailable";

/// A referenced object does not exist.
pub const REASON_BACKEND_NOT_FOUND: &str = "BackendNotFound";

/// A referenced object exists but its kind is not supported.
pub const REASON_INVALID_KIND: &str = "InvalidKind";

/// A policy lost arbitration against another policy for the same target.
pub const REASON_CONFLICTED: &str = "Conflicted";

// ============================================================================
// Admin API Reasons
// ============================================================================

/// The admin API refused the payload as malformed (HTTP 400).
pub const REASON_ADMIN_BAD_REQUEST: &str = "AdminBadRequest";

/// The admin key was missing or rejected (HTTP 401 / 403).
pub const REASON_ADMIN_AUTH_FAILED: &str = "AdminAuthFailed";

/// The admin API reported an internal error (HTTP 500).
pub const REASON_ADMIN_INTERNAL_ERROR: &str = "AdminInternalError";

/// A proxy or load balancer in front of the admin API failed (HTTP 502 / 503 / 504).
pub const REASON_ADMIN_GATEWAY_ERROR: &str = "AdminGatewayError";

/// No admin endpoint of the group could be reached.
pub const REASON_ADMIN_UNREACHABLE: &str = "AdminUnreachable";
