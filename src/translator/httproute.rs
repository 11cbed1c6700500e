// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `HTTPRoute` translation.
//!
//! Every `(rule, match)` pair becomes one data-plane route. A rule without
//! matches behaves as a single prefix `/` match. The first backend of a rule
//! is the route's upstream; further backends are reached through
//! `traffic-split`.

use super::backends::{
    has_live_backend, no_backend_abort, resolve_upstream, traffic_split, uniform_timeout,
    BackendSpec, PortRef, WeightedUpstream,
};
use super::filters::{apply_filters, ScratchPlugins};
use super::matching::{header_match, http_path, query_match};
use super::{object_name, timeout, TranslateContext, Translation};
use crate::cache::ObjectKey;
use crate::conflict::{apply_policy, resolve_target};
use crate::constants::DEFAULT_GATEWAY_BACKEND_WEIGHT;
use crate::crd::{BackendRef, HTTPRoute, HTTPRouteMatch, ResolveGranularity};
use crate::dataplane::id::root_scoped_id;
use crate::dataplane::{labels_for, DesiredObject, Payload, RoutePayload};
use crate::errors::{TranslationError, TranslationReason};
use kube::ResourceExt;
use tracing::debug;

/// Resolve the `Service` backends of one rule, in declaration order.
///
/// # Errors
///
/// Returns [`TranslationReason::UnsupportedBackend`] for non-`Service`
/// references and propagates resolution failures.
pub fn resolve_backend_refs(
    ctx: &TranslateContext<'_>,
    namespace: &str,
    backend_refs: &[BackendRef],
    grpc: bool,
    out: &mut Translation,
) -> Result<Vec<WeightedUpstream>, TranslationError> {
    let root = out.root().clone();
    let mut resolved = Vec::with_capacity(backend_refs.len());
    for backend in backend_refs {
        if !backend.is_service() {
            return Err(TranslationError::new(
                &root,
                TranslationReason::UnsupportedBackend {
                    kind: backend.kind.clone().unwrap_or_default(),
                    name: backend.name.clone(),
                },
            ));
        }
        let port = backend.port.ok_or_else(|| {
            TranslationError::new(
                &root,
                TranslationReason::InvalidField {
                    field: format!("backendRefs[{}].port", backend.name),
                    message: "a Service backend needs a port".to_string(),
                },
            )
        })?;
        let spec = BackendSpec {
            namespace: backend.namespace.clone().unwrap_or_else(|| namespace.to_string()),
            service: backend.name.clone(),
            port: PortRef::Number(port),
            subset: None,
            granularity: ResolveGranularity::Endpoint,
            grpc,
        };
        let upstream_id = resolve_upstream(ctx, &spec, out)?;
        resolved.push(WeightedUpstream {
            upstream_id,
            weight: backend.weight.unwrap_or(DEFAULT_GATEWAY_BACKEND_WEIGHT),
        });
    }
    Ok(resolved)
}

/// Point a route at its backends, or make it answer 500 when none can serve.
pub fn attach_backends(
    route: &mut RoutePayload,
    backends: &[WeightedUpstream],
    scratch: &mut ScratchPlugins,
) {
    route.upstream_id = backends.first().map(|b| b.upstream_id.clone());
    if let Some(split) = traffic_split(backends) {
        scratch.insert("traffic-split".to_string(), split);
    }
    if !has_live_backend(backends) {
        scratch.insert("fault-injection".to_string(), no_backend_abort());
    }
}

fn match_vars(route_match: &HTTPRouteMatch) -> Vec<serde_json::Value> {
    let mut vars = Vec::new();
    if let Some(var) = http_path(route_match.path.as_ref()).var {
        vars.push(var);
    }
    vars.extend(route_match.headers.iter().map(header_match));
    vars.extend(route_match.query_params.iter().map(query_match));
    vars
}

/// Translate an `HTTPRoute` attached to gateways of the current group.
///
/// # Errors
///
/// Returns [`TranslationError`] if a backend, filter or plugin cannot be translated.
pub fn translate_http_route(
    ctx: &TranslateContext<'_>,
    root: &ObjectKey,
    route: &HTTPRoute,
    out: &mut Translation,
) -> Result<(), TranslationError> {
    let namespace = route.namespace().unwrap_or_default();
    if ctx.group_attachments(&namespace, &route.spec.parent_refs).is_empty() {
        debug!(route = %root, group = %ctx.group.id, "HTTPRoute has no parent in this gateway group");
        return Ok(());
    }
    let policies = resolve_target(ctx.cache, root);
    let labels = labels_for(root);

    for (rule_index, rule) in route.spec.rules.iter().enumerate() {
        let backends = resolve_backend_refs(ctx, &namespace, &rule.backend_refs, false, out)?;
        let rule_timeout = match rule.timeouts.as_ref().and_then(|t| t.request.as_deref()) {
            Some(request) => timeout(root, &uniform_timeout(request))?,
            None => None,
        };

        let default_match = [HTTPRouteMatch::default()];
        let matches = if rule.matches.is_empty() {
            &default_match[..]
        } else {
            &rule.matches[..]
        };

        for (match_index, route_match) in matches.iter().enumerate() {
            let mut scratch = ScratchPlugins::new();
            let outcome = apply_filters(
                ctx,
                root,
                &namespace,
                &rule.filters,
                route_match.path.as_ref(),
                &mut scratch,
            )?;

            let (rule_part, match_part) = (rule_index.to_string(), match_index.to_string());
            let mut payload = RoutePayload {
                id: root_scoped_id(root, &["rule", &rule_part, "match", &match_part]),
                name: object_name(root, &format!("rule{rule_index}_match{match_index}")),
                labels: labels.clone(),
                uris: http_path(route_match.path.as_ref()).uris,
                hosts: route.spec.hostnames.clone(),
                methods: route_match.method.iter().cloned().collect(),
                vars: match_vars(route_match),
                timeout: rule_timeout.clone(),
                ..RoutePayload::default()
            };
            if !outcome.redirect {
                attach_backends(&mut payload, &backends, &mut scratch);
            }
            payload.plugins = ctx.plugins(root, scratch)?;
            if let Some(policy) = policies.effective(rule.name.as_deref()) {
                apply_policy(&mut payload, policy);
            }

            out.push(DesiredObject::new(
                payload.id.clone(),
                out.group(),
                Payload::Route(payload),
                root,
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "httproute_tests.rs"]
mod httproute_tests;
