// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Admin API failures mapped to Kubernetes status condition reasons.
//!
//! # Usage
//!
//! ```rust
//! use apisix_ingress::http_errors::map_http_error_to_reason;
//!
//! let (reason, message) = map_http_error_to_reason(401);
//! assert_eq!(reason, "AdminAuthFailed");
//! assert!(message.contains("401"));
//! ```

use crate::errors::AdminApiError;
use crate::status_reasons::{
    REASON_ADMIN_AUTH_FAILED, REASON_ADMIN_BAD_REQUEST, REASON_ADMIN_GATEWAY_ERROR,
    REASON_ADMIN_INTERNAL_ERROR, REASON_ADMIN_UNREACHABLE, REASON_SYNC_FAILED,
};

/// Map an admin API HTTP status code to a condition reason and message.
///
/// | HTTP Code | Reason |
/// |-----------|--------|
/// | 400 | `AdminBadRequest` |
/// | 401, 403 | `AdminAuthFailed` |
/// | 500 | `AdminInternalError` |
/// | 502, 503, 504 | `AdminGatewayError` |
/// | Other | `SyncFailed` |
#[must_use]
pub fn map_http_error_to_reason(status_code: u16) -> (&'static str, String) {
    match status_code {
        400 => (
            REASON_ADMIN_BAD_REQUEST,
            "Admin API rejected the payload (400)".into(),
        ),
        401 => (
            REASON_ADMIN_AUTH_FAILED,
            "Admin API requires a valid admin key (401)".into(),
        ),
        403 => (
            REASON_ADMIN_AUTH_FAILED,
            "Admin key is not allowed to modify this object (403)".into(),
        ),
        500 => (
            REASON_ADMIN_INTERNAL_ERROR,
            "Admin API internal error (500)".into(),
        ),
        502 => (
            REASON_ADMIN_GATEWAY_ERROR,
            "Bad gateway reaching the admin API (502)".into(),
        ),
        503 => (
            REASON_ADMIN_GATEWAY_ERROR,
            "Admin API unavailable (503)".into(),
        ),
        504 => (
            REASON_ADMIN_GATEWAY_ERROR,
            "Gateway timeout reaching the admin API (504)".into(),
        ),
        _ => (
            REASON_SYNC_FAILED,
            format!("Unexpected HTTP status from the admin API ({status_code})"),
        ),
    }
}

/// Reason and message for an admin endpoint that never answered.
#[must_use]
pub fn map_connection_error() -> (&'static str, String) {
    (
        REASON_ADMIN_UNREACHABLE,
        "Cannot connect to any admin API endpoint of the gateway group".into(),
    )
}

/// Reason and message for any [`AdminApiError`].
#[must_use]
pub fn map_admin_error(err: &AdminApiError) -> (&'static str, String) {
    match err {
        AdminApiError::Http { status, message } => {
            let (reason, summary) = map_http_error_to_reason(*status);
            if message.is_empty() {
                (reason, summary)
            } else {
                (reason, format!("{summary}: {message}"))
            }
        }
        AdminApiError::Connection(_) | AdminApiError::Timeout | AdminApiError::NoEndpoints => {
            let (reason, summary) = map_connection_error();
            (reason, format!("{summary}: {err}"))
        }
        AdminApiError::Decode(_) => (REASON_SYNC_FAILED, err.to_string()),
    }
}

#[cfg(test)]
#[path = "http_errors_tests.rs"]
mod http_errors_tests;
