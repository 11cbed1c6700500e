// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Single-object APISIX resources: `ApisixTls`, `ApisixConsumer`,
//! `ApisixPluginConfig` and `ApisixClusterConfig`.

use super::apisix_route::enabled_plugins;
use super::filters::ScratchPlugins;
use super::ingress::tls_pair;
use super::{secret_values, TranslateContext, Translation};
use crate::cache::{ObjectKey, ResourceKind};
use crate::crd::{ApisixClusterConfig, ApisixConsumer, ApisixPluginConfig, ApisixTls};
use crate::dataplane::id::{consumer_username, root_scoped_id};
use crate::dataplane::{
    labels_for, ConsumerPayload, DesiredObject, GlobalRulePayload, Payload, PluginConfigPayload,
    SslClient, SslPayload,
};
use crate::errors::{TranslationError, TranslationReason};
use crate::router::secret_string;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Id of the plugin config produced by an `ApisixPluginConfig` in the root's namespace.
///
/// # Errors
///
/// Returns [`TranslationReason::PluginConfigNotFound`] if it does not exist.
pub fn apisix_plugin_config_id(
    ctx: &TranslateContext<'_>,
    root: &ObjectKey,
    name: &str,
) -> Result<String, TranslationError> {
    let key = ObjectKey::new(ResourceKind::ApisixPluginConfig, &root.namespace, name);
    if !ctx.cache.contains(&key) {
        return Err(TranslationError::new(
            root,
            TranslationReason::PluginConfigNotFound {
                kind: "ApisixPluginConfig".to_string(),
                namespace: root.namespace.clone(),
                name: name.to_string(),
            },
        ));
    }
    Ok(root_scoped_id(&key, &[]))
}

/// # Errors
///
/// Returns [`TranslationError`] if the certificate or CA secret is unusable.
pub fn translate_apisix_tls(
    ctx: &TranslateContext<'_>,
    root: &ObjectKey,
    tls: &ApisixTls,
    out: &mut Translation,
) -> Result<(), TranslationError> {
    let spec = &tls.spec;
    let namespace = spec.secret.namespace.as_deref().unwrap_or(&root.namespace);
    let (cert, key) = tls_pair(ctx, root, namespace, &spec.secret.name)?;

    let client = match &spec.client {
        Some(client) => {
            let ca_namespace = client.ca_secret.namespace.as_deref().unwrap_or(&root.namespace);
            let secret = ctx.secret(root, ca_namespace, &client.ca_secret.name)?;
            let ca = secret_string(&secret, "ca.crt").ok_or_else(|| {
                TranslationError::new(
                    root,
                    TranslationReason::SecretKeyMissing {
                        namespace: ca_namespace.to_string(),
                        name: client.ca_secret.name.clone(),
                        key: "ca.crt".to_string(),
                    },
                )
            })?;
            Some(SslClient {
                ca,
                depth: client.depth,
            })
        }
        None => None,
    };

    let payload = SslPayload {
        id: root_scoped_id(root, &[]),
        labels: labels_for(root),
        cert,
        key,
        snis: spec.hosts.clone(),
        client,
    };
    out.push(DesiredObject::new(
        payload.id.clone(),
        out.group(),
        Payload::Ssl(payload),
        root,
    ));
    Ok(())
}

/// A consumer named `{namespace}_{name}` with one auth plugin per method.
///
/// # Errors
///
/// Returns [`TranslationError`] for a missing secret, a method with no
/// credentials, or a consumer with no method at all.
pub fn translate_apisix_consumer(
    ctx: &TranslateContext<'_>,
    root: &ObjectKey,
    consumer: &ApisixConsumer,
    out: &mut Translation,
) -> Result<(), TranslationError> {
    let methods = consumer.spec.auth_parameter.methods();
    if methods.is_empty() {
        return Err(TranslationError::new(
            root,
            TranslationReason::InvalidField {
                field: "authParameter".to_string(),
                message: "at least one authentication method is required".to_string(),
            },
        ));
    }

    let mut scratch = ScratchPlugins::new();
    for (plugin, auth) in methods {
        let config: Map<String, Value> = match &auth.secret_ref {
            Some(secret_name) => secret_values(&*ctx.secret(root, &root.namespace, secret_name)?),
            None => auth.value.clone().into_iter().collect(),
        };
        if config.is_empty() {
            return Err(TranslationError::new(
                root,
                TranslationReason::InvalidField {
                    field: format!("authParameter.{plugin}"),
                    message: "secretRef or value is required".to_string(),
                },
            ));
        }
        scratch.insert(plugin.to_string(), Value::Object(config));
    }

    let username = consumer_username(&root.namespace, &root.name);
    let payload = ConsumerPayload {
        username: username.clone(),
        labels: labels_for(root),
        plugins: ctx.plugins(root, scratch)?,
    };
    out.push(DesiredObject::new(
        username,
        out.group(),
        Payload::Consumer(payload),
        root,
    ));
    Ok(())
}

/// # Errors
///
/// Returns [`TranslationError`] if a plugin is rejected or its secret is missing.
pub fn translate_apisix_plugin_config(
    ctx: &TranslateContext<'_>,
    root: &ObjectKey,
    config: &ApisixPluginConfig,
    out: &mut Translation,
) -> Result<(), TranslationError> {
    let scratch = enabled_plugins(ctx, root, &config.spec.plugins)?;
    let payload = PluginConfigPayload {
        id: root_scoped_id(root, &[]),
        labels: labels_for(root),
        plugins: ctx.plugins(root, scratch)?,
    };
    out.push(DesiredObject::new(
        payload.id.clone(),
        out.group(),
        Payload::PluginConfig(payload),
        root,
    ));
    Ok(())
}

/// Cluster-wide monitoring plugins as one global rule.
///
/// # Errors
///
/// Returns [`TranslationError`] if the sample ratio is out of range.
pub fn translate_cluster_config(
    ctx: &TranslateContext<'_>,
    root: &ObjectKey,
    config: &ApisixClusterConfig,
    out: &mut Translation,
) -> Result<(), TranslationError> {
    let monitoring = &config.spec.monitoring;
    let mut scratch = ScratchPlugins::new();
    if monitoring.prometheus.as_ref().is_some_and(|p| p.enable) {
        scratch.insert("prometheus".to_string(), json!({}));
    }
    if let Some(skywalking) = monitoring.skywalking.as_ref().filter(|s| s.enable) {
        scratch.insert(
            "skywalking".to_string(),
            json!({"sample_ratio": skywalking.sample_ratio.unwrap_or(1.0)}),
        );
    }
    if scratch.is_empty() {
        debug!(config = %root, "no monitoring plugin enabled");
        return Ok(());
    }

    let payload = GlobalRulePayload {
        id: root_scoped_id(root, &[]),
        plugins: ctx.plugins(root, scratch)?,
    };
    out.push(DesiredObject::new(
        payload.id.clone(),
        out.group(),
        Payload::GlobalRule(payload),
        root,
    ));
    Ok(())
}

#[cfg(test)]
#[path = "apisix_resources_tests.rs"]
mod apisix_resources_tests;
