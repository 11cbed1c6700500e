// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `ApisixRoute` translation.
//!
//! Every `spec.http[]` rule becomes one route and every `spec.stream[]` rule
//! one stream route. Rule names are unique within a resource and are part of
//! the object ids, so renaming a rule replaces its route.

use super::apisix_resources::apisix_plugin_config_id;
use super::backends::{resolve_upstream, BackendSpec, PortRef, WeightedUpstream};
use super::filters::ScratchPlugins;
use super::httproute::attach_backends;
use super::matching::expr_var;
use super::{object_name, secret_values, timeout, TranslateContext, Translation};
use crate::cache::ObjectKey;
use crate::constants::DEFAULT_APISIX_BACKEND_WEIGHT;
use crate::crd::{
    ApisixRoute, ApisixRouteAuthentication, ApisixRouteHttp, ApisixRoutePlugin, ApisixRouteStream,
};
use crate::dataplane::id::root_scoped_id;
use crate::dataplane::{labels_for, DesiredObject, Payload, RoutePayload, StreamRoutePayload};
use crate::errors::{TranslationError, TranslationReason};
use serde_json::{json, Value};

/// Enabled plugins of a rule or plugin config, with `secretRef` values
/// merged over the inline configuration.
///
/// # Errors
///
/// Returns [`TranslationReason::SecretNotFound`] for a missing secret.
pub fn enabled_plugins(
    ctx: &TranslateContext<'_>,
    root: &ObjectKey,
    plugins: &[ApisixRoutePlugin],
) -> Result<ScratchPlugins, TranslationError> {
    let mut scratch = ScratchPlugins::new();
    for plugin in plugins.iter().filter(|p| p.enable) {
        let mut config = plugin.config.clone().unwrap_or_else(|| json!({}));
        if let Some(secret_name) = &plugin.secret_ref {
            let secret = ctx.secret(root, &root.namespace, secret_name)?;
            if let Value::Object(fields) = &mut config {
                fields.extend(secret_values(&secret));
            }
        }
        scratch.insert(plugin.name.clone(), config);
    }
    Ok(scratch)
}

fn authentication_plugin(
    root: &ObjectKey,
    auth: &ApisixRouteAuthentication,
) -> Result<(&'static str, Value), TranslationError> {
    let plugin = match auth.r#type.as_str() {
        "basicAuth" => "basic-auth",
        "keyAuth" => {
            let config = match auth.key_auth.as_ref().and_then(|k| k.header.as_ref()) {
                Some(header) => json!({"header": header}),
                None => json!({}),
            };
            return Ok(("key-auth", config));
        }
        "jwtAuth" => "jwt-auth",
        "hmacAuth" => "hmac-auth",
        "ldapAuth" => "ldap-auth",
        other => {
            return Err(TranslationError::new(
                root,
                TranslationReason::InvalidField {
                    field: "authentication.type".to_string(),
                    message: format!("unknown authentication type {other:?}"),
                },
            ))
        }
    };
    Ok((plugin, json!({})))
}

fn translate_http_rule(
    ctx: &TranslateContext<'_>,
    root: &ObjectKey,
    rule: &ApisixRouteHttp,
    out: &mut Translation,
) -> Result<(), TranslationError> {
    let route_match = &rule.r#match;
    let vars = route_match
        .exprs
        .iter()
        .map(|expr| expr_var(root, expr))
        .collect::<Result<Vec<_>, _>>()?;

    let mut scratch = enabled_plugins(ctx, root, &rule.plugins)?;
    if let Some(auth) = rule.authentication.as_ref().filter(|a| a.enable) {
        let (name, config) = authentication_plugin(root, auth)?;
        scratch.entry(name.to_string()).or_insert(config);
    }

    let mut backends = Vec::with_capacity(rule.backends.len());
    for backend in &rule.backends {
        let spec = BackendSpec {
            namespace: root.namespace.clone(),
            service: backend.service_name.clone(),
            port: PortRef::from(&backend.service_port),
            subset: backend.subset.clone(),
            granularity: backend.resolve_granularity.unwrap_or_default(),
            grpc: false,
        };
        backends.push(WeightedUpstream {
            upstream_id: resolve_upstream(ctx, &spec, out)?,
            weight: backend.weight.unwrap_or(DEFAULT_APISIX_BACKEND_WEIGHT),
        });
    }

    let plugin_config_id = rule
        .plugin_config_name
        .as_deref()
        .map(|name| apisix_plugin_config_id(ctx, root, name))
        .transpose()?;

    let uris = if route_match.paths.is_empty() {
        vec!["/*".to_string()]
    } else {
        route_match.paths.clone()
    };

    let mut payload = RoutePayload {
        id: root_scoped_id(root, &["http", &rule.name]),
        name: object_name(root, &rule.name),
        labels: labels_for(root),
        uris,
        hosts: route_match.hosts.clone(),
        methods: route_match.methods.clone(),
        remote_addrs: route_match.remote_addrs.clone(),
        vars,
        priority: rule.priority,
        plugin_config_id,
        timeout: rule.timeout.as_ref().map(|t| timeout(root, t)).transpose()?.flatten(),
        enable_websocket: rule.websocket.then_some(true),
        ..RoutePayload::default()
    };
    // Plugin-only rules (a redirect, say) carry no upstream.
    if !backends.is_empty() {
        attach_backends(&mut payload, &backends, &mut scratch);
    }
    payload.plugins = ctx.plugins(root, scratch)?;

    out.push(DesiredObject::new(
        payload.id.clone(),
        out.group(),
        Payload::Route(payload),
        root,
    ));
    Ok(())
}

fn translate_stream_rule(
    ctx: &TranslateContext<'_>,
    root: &ObjectKey,
    rule: &ApisixRouteStream,
    out: &mut Translation,
) -> Result<(), TranslationError> {
    if !matches!(rule.protocol.to_ascii_uppercase().as_str(), "TCP" | "UDP") {
        return Err(TranslationError::new(
            root,
            TranslationReason::InvalidField {
                field: format!("stream[{}].protocol", rule.name),
                message: format!("expected TCP or UDP, got {:?}", rule.protocol),
            },
        ));
    }
    let backend = &rule.backend;
    let spec = BackendSpec {
        namespace: root.namespace.clone(),
        service: backend.service_name.clone(),
        port: PortRef::from(&backend.service_port),
        subset: backend.subset.clone(),
        granularity: backend.resolve_granularity.unwrap_or_default(),
        grpc: false,
    };
    let upstream_id = resolve_upstream(ctx, &spec, out)?;
    let scratch = enabled_plugins(ctx, root, &rule.plugins)?;

    let payload = StreamRoutePayload {
        id: root_scoped_id(root, &["stream", &rule.name]),
        labels: labels_for(root),
        server_port: Some(rule.r#match.ingress_port),
        sni: rule.r#match.host.clone(),
        upstream_id,
        plugins: ctx.plugins(root, scratch)?,
    };
    out.push(DesiredObject::new(
        payload.id.clone(),
        out.group(),
        Payload::StreamRoute(payload),
        root,
    ));
    Ok(())
}

/// Translate an `ApisixRoute`.
///
/// # Errors
///
/// Returns [`TranslationError`] for the first rule that cannot be translated.
pub fn translate_apisix_route(
    ctx: &TranslateContext<'_>,
    root: &ObjectKey,
    route: &ApisixRoute,
    out: &mut Translation,
) -> Result<(), TranslationError> {
    for rule in &route.spec.http {
        translate_http_rule(ctx, root, rule, out)?;
    }
    for rule in &route.spec.stream {
        translate_stream_rule(ctx, root, rule, out)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "apisix_route_tests.rs"]
mod apisix_route_tests;
