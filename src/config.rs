// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller configuration.
//!
//! Configuration is read from an optional YAML file and then overridden by
//! command-line flags. Every field has a default, so an empty file (or no file)
//! yields a working single-group controller once a default admin endpoint is set.
//!
//! ```yaml
//! mode: all
//! resync_interval: 5m
//! worker_count: 4
//! default_gateway_group:
//!   endpoints: ["http://apisix-admin.apisix.svc:9180"]
//!   admin_key: edd1c9f034335f136f87ad84b625c8f1
//! leader_election:
//!   enabled: true
//!   namespace: apisix-ingress
//! ```

use crate::constants::{
    DEFAULT_ADMIN_MAX_ATTEMPTS, DEFAULT_ADMIN_TIMEOUT_SECS, DEFAULT_CONTROLLER_NAME,
    DEFAULT_INGRESS_CLASS, DEFAULT_LEASE_DURATION_SECS, DEFAULT_LEASE_GRACE_SECS,
    DEFAULT_LEASE_NAME, DEFAULT_LEASE_NAMESPACE, DEFAULT_METRICS_BIND_ADDRESS,
    DEFAULT_RESYNC_INTERVAL_SECS, DEFAULT_WORKER_COUNT,
};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Which families of resources the controller reconciles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    /// `Ingress` and the `Apisix*` CRDs
    Ingress,
    /// Gateway API kinds
    Gateway,
    /// Everything
    #[default]
    All,
}

impl OperatingMode {
    #[must_use]
    pub fn handles_ingress(self) -> bool {
        matches!(self, Self::Ingress | Self::All)
    }

    #[must_use]
    pub fn handles_gateway(self) -> bool {
        matches!(self, Self::Gateway | Self::All)
    }
}

/// Admin endpoint used when an object resolves to no `GatewayProxy`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultGatewayGroupConfig {
    pub endpoints: Vec<String>,
    pub admin_key: Option<String>,
}

/// Admin API client settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Timeout of one HTTP call
    #[serde(with = "crate::duration::human")]
    pub timeout: Duration,
    /// Attempts per operation before the object is marked failed
    pub max_attempts: u32,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_ADMIN_TIMEOUT_SECS),
            max_attempts: DEFAULT_ADMIN_MAX_ATTEMPTS,
        }
    }
}

/// Leader election settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderElectionConfig {
    pub enabled: bool,
    pub lease_name: String,
    pub namespace: String,
    #[serde(with = "crate::duration::human")]
    pub lease_duration: Duration,
    #[serde(with = "crate::duration::human")]
    pub grace_period: Duration,
}

impl Default for LeaderElectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lease_name: DEFAULT_LEASE_NAME.to_string(),
            namespace: DEFAULT_LEASE_NAMESPACE.to_string(),
            lease_duration: Duration::from_secs(DEFAULT_LEASE_DURATION_SECS),
            grace_period: Duration::from_secs(DEFAULT_LEASE_GRACE_SECS),
        }
    }
}

/// Top-level controller configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub mode: OperatingMode,
    pub controller_name: String,
    pub ingress_class: String,
    #[serde(with = "crate::duration::human")]
    pub resync_interval: Duration,
    pub worker_count: usize,
    pub enable_status_updates: bool,
    /// Addresses published in `Ingress` and `Gateway` status
    pub status_addresses: Vec<String>,
    pub default_gateway_group: Option<DefaultGatewayGroupConfig>,
    pub admin: AdminConfig,
    pub leader_election: LeaderElectionConfig,
    pub metrics_bind_address: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mode: OperatingMode::All,
            controller_name: DEFAULT_CONTROLLER_NAME.to_string(),
            ingress_class: DEFAULT_INGRESS_CLASS.to_string(),
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS),
            worker_count: DEFAULT_WORKER_COUNT,
            enable_status_updates: true,
            status_addresses: Vec::new(),
            default_gateway_group: None,
            admin: AdminConfig::default(),
            leader_election: LeaderElectionConfig::default(),
            metrics_bind_address: DEFAULT_METRICS_BIND_ADDRESS.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from a YAML file, or defaults when no path is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid YAML, or fails
    /// [`ControllerConfig::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_yaml(&raw)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid YAML for this schema.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Reject configurations that cannot run.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            bail!("worker_count must be at least 1");
        }
        if self.controller_name.trim().is_empty() {
            bail!("controller_name cannot be empty");
        }
        if self.resync_interval.is_zero() {
            bail!("resync_interval must be greater than zero");
        }
        if self.admin.max_attempts == 0 {
            bail!("admin.max_attempts must be at least 1");
        }
        if let Some(group) = &self.default_gateway_group {
            for endpoint in &group.endpoints {
                let parsed = url::Url::parse(endpoint)
                    .with_context(|| format!("Invalid default admin endpoint '{endpoint}'"))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    bail!("Default admin endpoint '{endpoint}' must use http or https");
                }
            }
        }
        if self.leader_election.enabled && self.leader_election.namespace.trim().is_empty() {
            bail!("leader_election.namespace cannot be empty when leader election is enabled");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
