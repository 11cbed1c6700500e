// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # apisix-ingress - Kubernetes controller for APISIX data planes
//!
//! Watches `Ingress`, Gateway API and APISIX custom resources, translates them
//! into APISIX admin objects (routes, upstreams, SSL certificates, consumers,
//! global rules, plugin metadata and stream routes) and keeps one or more
//! APISIX gateway groups in sync with that intent through their admin API.
//!
//! ## Overview
//!
//! ```text
//! watch ─▶ cache ─▶ relations ─▶ queue ─▶ router ─▶ translator ─▶ sync ─▶ admin API
//!                                                                   │
//!                                                                   └▶ status
//! ```
//!
//! ## Modules
//!
//! - [`crd`] - Gateway API and APISIX custom resource types
//! - [`cache`] - In-memory store of watched objects
//! - [`relations`] - Which root objects a change affects
//! - [`router`] - Gateway group resolution
//! - [`translator`] - Kubernetes objects to data-plane objects
//! - [`dataplane`] - Data-plane object model and plugin registry
//! - [`sync`] - Ordered, idempotent sync to the admin API
//! - [`admin`] - Admin API clients
//! - [`status`] - Status conditions written back to Kubernetes
//! - [`engine`] - Work queue driven reconciliation
//! - [`watch`] - Kubernetes watchers
//! - [`leader`] - Lease based leader election
//! - [`health`] - Probe and metrics endpoints
//!
//! ## Example
//!
//! ```rust,no_run
//! use apisix_ingress::config::ControllerConfig;
//!
//! let config = ControllerConfig::from_yaml(
//!     "default_gateway_group:\n  endpoints: [\"http://apisix-admin:9180\"]\n",
//! )
//! .expect("valid configuration");
//! assert_eq!(config.worker_count, 4);
//! ```

pub mod admin;
pub mod cache;
pub mod config;
pub mod conflict;
pub mod constants;
pub mod crd;
pub mod dataplane;
pub mod duration;
pub mod engine;
pub mod errors;
pub mod health;
pub mod http_errors;
pub mod labels;
pub mod leader;
pub mod metrics;
pub mod queue;
pub mod relations;
pub mod retry;
pub mod router;
pub mod status;
pub mod status_reasons;
pub mod sync;
pub mod translator;
pub mod watch;

#[cfg(test)]
mod test_fixtures;
