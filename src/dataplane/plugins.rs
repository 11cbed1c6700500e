// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Typed plugin envelopes and the schema registry that produces them.
//!
//! Plugin configuration reaches the data plane as free-form JSON. Every plugin
//! attached to a desired object passes through [`PluginRegistry::validate`],
//! which rejects configurations the admin API would refuse, so a bad plugin
//! fails the translation of its root instead of a push.

use crate::errors::PluginError;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A plugin configuration accepted by the registry.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedPlugin {
    name: String,
    config: Value,
}

impl ValidatedPlugin {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn config(&self) -> &Value {
        &self.config
    }
}

/// Plugins of one data-plane object, serialized as `{name: config}`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PluginMap(BTreeMap<String, ValidatedPlugin>);

impl PluginMap {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Insert a plugin, replacing any previous configuration of the same name.
    pub fn insert(&mut self, plugin: ValidatedPlugin) {
        self.0.insert(plugin.name.clone(), plugin);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).map(ValidatedPlugin::config)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Merge `other` into `self`; entries of `self` win.
    pub fn merge_missing(&mut self, other: &PluginMap) {
        for (name, plugin) in &other.0 {
            self.0.entry(name.clone()).or_insert_with(|| plugin.clone());
        }
    }
}

impl Serialize for PluginMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, plugin) in &self.0 {
            map.serialize_entry(name, &plugin.config)?;
        }
        map.end()
    }
}

type Validator = fn(&str, &Map<String, Value>) -> Result<(), PluginError>;

/// Schema checks keyed by plugin name. Unknown plugins only need an object.
pub struct PluginRegistry {
    validators: BTreeMap<&'static str, Validator>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        let mut validators: BTreeMap<&'static str, Validator> = BTreeMap::new();
        validators.insert("limit-count", validate_limit_count);
        validators.insert("limit-req", validate_limit_req);
        validators.insert("limit-conn", validate_limit_conn);
        validators.insert("redirect", validate_redirect);
        validators.insert("response-rewrite", validate_response_rewrite);
        validators.insert("fault-injection", validate_fault_injection);
        validators.insert("traffic-split", validate_traffic_split);
        validators.insert("proxy-rewrite", validate_proxy_rewrite);
        validators.insert("proxy-mirror", validate_proxy_mirror);
        validators.insert("ip-restriction", validate_ip_restriction);
        validators.insert("skywalking", validate_skywalking);
        Self { validators }
    }
}

impl PluginRegistry {
    /// Check one plugin configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError`] if the configuration is not an object or breaks
    /// a rule of the plugin's schema.
    pub fn validate(&self, name: &str, config: Value) -> Result<ValidatedPlugin, PluginError> {
        let Value::Object(fields) = &config else {
            return Err(PluginError::NotAnObject {
                plugin: name.to_string(),
            });
        };
        if let Some(validator) = self.validators.get(name) {
            validator(name, fields)?;
        }
        Ok(ValidatedPlugin {
            name: name.to_string(),
            config,
        })
    }

    /// Validate a set of plugins into a [`PluginMap`].
    ///
    /// # Errors
    ///
    /// Returns the first [`PluginError`] encountered.
    pub fn validate_all(
        &self,
        plugins: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<PluginMap, PluginError> {
        let mut map = PluginMap::default();
        for (name, config) in plugins {
            map.insert(self.validate(&name, config)?);
        }
        Ok(map)
    }
}

// ============================================================================
// Validators
// ============================================================================

fn invalid(plugin: &str, field: &str, message: &str) -> PluginError {
    PluginError::InvalidField {
        plugin: plugin.to_string(),
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn require_positive(plugin: &str, fields: &Map<String, Value>, field: &str) -> Result<(), PluginError> {
    match fields.get(field).and_then(Value::as_f64) {
        Some(value) if value > 0.0 => Ok(()),
        Some(_) => Err(invalid(plugin, field, "must be greater than zero")),
        None => Err(invalid(plugin, field, "is required")),
    }
}

fn require_non_negative(
    plugin: &str,
    fields: &Map<String, Value>,
    field: &str,
) -> Result<(), PluginError> {
    match fields.get(field).and_then(Value::as_f64) {
        Some(value) if value >= 0.0 => Ok(()),
        Some(_) => Err(invalid(plugin, field, "must not be negative")),
        None => Err(invalid(plugin, field, "is required")),
    }
}

fn optional_status_in(
    plugin: &str,
    fields: &Map<String, Value>,
    field: &str,
    range: std::ops::RangeInclusive<i64>,
) -> Result<(), PluginError> {
    match fields.get(field) {
        None => Ok(()),
        Some(value) => match value.as_i64() {
            Some(code) if range.contains(&code) => Ok(()),
            _ => Err(invalid(
                plugin,
                field,
                &format!("must be an integer in {}..={}", range.start(), range.end()),
            )),
        },
    }
}

fn validate_limit_count(plugin: &str, fields: &Map<String, Value>) -> Result<(), PluginError> {
    require_positive(plugin, fields, "count")?;
    require_positive(plugin, fields, "time_window")
}

fn validate_limit_req(plugin: &str, fields: &Map<String, Value>) -> Result<(), PluginError> {
    require_positive(plugin, fields, "rate")?;
    require_non_negative(plugin, fields, "burst")
}

fn validate_limit_conn(plugin: &str, fields: &Map<String, Value>) -> Result<(), PluginError> {
    require_positive(plugin, fields, "conn")?;
    require_non_negative(plugin, fields, "burst")?;
    require_non_negative(plugin, fields, "default_conn_delay")
}

fn validate_redirect(plugin: &str, fields: &Map<String, Value>) -> Result<(), PluginError> {
    optional_status_in(plugin, fields, "ret_code", 300..=399)?;
    if !(fields.contains_key("uri")
        || fields.contains_key("regex_uri")
        || fields.contains_key("http_to_https"))
    {
        return Err(invalid(
            plugin,
            "uri",
            "one of uri, regex_uri or http_to_https is required",
        ));
    }
    Ok(())
}

fn validate_response_rewrite(plugin: &str, fields: &Map<String, Value>) -> Result<(), PluginError> {
    optional_status_in(plugin, fields, "status_code", 200..=598)
}

fn validate_fault_injection(plugin: &str, fields: &Map<String, Value>) -> Result<(), PluginError> {
    match (fields.get("abort"), fields.get("delay")) {
        (None, None) => Err(invalid(plugin, "abort", "abort or delay is required")),
        (Some(Value::Object(abort)), _) => optional_status_in(plugin, abort, "http_status", 200..=599)
            .and_then(|()| {
                if abort.contains_key("http_status") {
                    Ok(())
                } else {
                    Err(invalid(plugin, "abort.http_status", "is required"))
                }
            }),
        (Some(_), _) => Err(invalid(plugin, "abort", "must be an object")),
        (None, Some(_)) => Ok(()),
    }
}

fn validate_traffic_split(plugin: &str, fields: &Map<String, Value>) -> Result<(), PluginError> {
    let Some(Value::Array(rules)) = fields.get("rules") else {
        return Err(invalid(plugin, "rules", "must be an array"));
    };
    for rule in rules {
        let Some(Value::Array(upstreams)) = rule.get("weighted_upstreams") else {
            return Err(invalid(plugin, "rules.weighted_upstreams", "must be an array"));
        };
        for upstream in upstreams {
            match upstream.get("weight").and_then(Value::as_i64) {
                Some(weight) if weight >= 0 => {}
                _ => {
                    return Err(invalid(
                        plugin,
                        "rules.weighted_upstreams.weight",
                        "must be a non-negative integer",
                    ))
                }
            }
        }
    }
    Ok(())
}

fn validate_proxy_rewrite(plugin: &str, fields: &Map<String, Value>) -> Result<(), PluginError> {
    if let Some(regex_uri) = fields.get("regex_uri") {
        let valid = regex_uri.as_array().is_some_and(|items| {
            items.len() >= 2 && items.len() % 2 == 0 && items.iter().all(Value::is_string)
        });
        if !valid {
            return Err(invalid(
                plugin,
                "regex_uri",
                "must be pattern/replacement string pairs",
            ));
        }
    }
    if fields.contains_key("uri") && fields.contains_key("regex_uri") {
        return Err(invalid(plugin, "uri", "cannot be combined with regex_uri"));
    }
    Ok(())
}

fn validate_proxy_mirror(plugin: &str, fields: &Map<String, Value>) -> Result<(), PluginError> {
    match fields.get("host").and_then(Value::as_str) {
        Some(host) if host.starts_with("http://") || host.starts_with("https://") => Ok(()),
        Some(_) => Err(invalid(plugin, "host", "must start with http:// or https://")),
        None => Err(invalid(plugin, "host", "is required")),
    }
}

fn validate_ip_restriction(plugin: &str, fields: &Map<String, Value>) -> Result<(), PluginError> {
    let non_empty = |field: &str| {
        fields
            .get(field)
            .and_then(Value::as_array)
            .is_some_and(|items| !items.is_empty())
    };
    if non_empty("whitelist") || non_empty("blacklist") {
        Ok(())
    } else {
        Err(invalid(
            plugin,
            "whitelist",
            "whitelist or blacklist must list at least one address",
        ))
    }
}

fn validate_skywalking(plugin: &str, fields: &Map<String, Value>) -> Result<(), PluginError> {
    match fields.get("sample_ratio") {
        None => Ok(()),
        Some(value) => match value.as_f64() {
            Some(ratio) if (0.0..=1.0).contains(&ratio) => Ok(()),
            _ => Err(invalid(plugin, "sample_ratio", "must be between 0 and 1")),
        },
    }
}

#[cfg(test)]
#[path = "plugins_tests.rs"]
mod plugins_tests;
