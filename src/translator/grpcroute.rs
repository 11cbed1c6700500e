// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `GRPCRoute` translation.
//!
//! gRPC calls are HTTP/2 requests to `/{package.Service}/{Method}`, so method
//! matches compile to URIs (exact matches) or a URI regex. Backends get the
//! `grpc` scheme unless their port declares another application protocol.

use super::filters::{apply_filters, ScratchPlugins};
use super::httproute::{attach_backends, resolve_backend_refs};
use super::matching::{escape_regex, header_match};
use super::{object_name, TranslateContext, Translation};
use crate::cache::ObjectKey;
use crate::crd::{GRPCMethodMatch, GRPCRoute, GRPCRouteMatch, HTTPRouteFilterType, ValueMatchType};
use crate::dataplane::id::root_scoped_id;
use crate::dataplane::{labels_for, DesiredObject, Payload, RoutePayload};
use crate::errors::{TranslationError, TranslationReason};
use kube::ResourceExt;
use serde_json::{json, Value};
use tracing::debug;

/// URIs and optional predicate selecting the calls of one method match.
fn method_uris(method: Option<&GRPCMethodMatch>) -> (Vec<String>, Option<Value>) {
    let Some(method) = method else {
        return (vec!["/*".to_string()], None);
    };
    let service = method.service.as_deref();
    let name = method.method.as_deref();
    match (method.r#type, service, name) {
        (ValueMatchType::Exact, Some(service), Some(name)) => {
            (vec![format!("/{service}/{name}")], None)
        }
        (ValueMatchType::Exact, Some(service), None) => (vec![format!("/{service}/*")], None),
        (ValueMatchType::Exact, None, Some(name)) => (
            vec!["/*".to_string()],
            Some(json!(["uri", "~~", format!("^/[^/]+/{}$", escape_regex(name))])),
        ),
        (ValueMatchType::RegularExpression, service, name) => (
            vec!["/*".to_string()],
            Some(json!([
                "uri",
                "~~",
                format!("^/{}/{}$", service.unwrap_or("[^/]+"), name.unwrap_or("[^/]+"))
            ])),
        ),
        (ValueMatchType::Exact, None, None) => (vec!["/*".to_string()], None),
    }
}

/// Translate a `GRPCRoute` attached to gateways of the current group.
///
/// # Errors
///
/// Returns [`TranslationReason::UnsupportedFilter`] for redirect and rewrite
/// filters and any backend or plugin failure.
pub fn translate_grpc_route(
    ctx: &TranslateContext<'_>,
    root: &ObjectKey,
    route: &GRPCRoute,
    out: &mut Translation,
) -> Result<(), TranslationError> {
    let namespace = route.namespace().unwrap_or_default();
    if ctx.group_attachments(&namespace, &route.spec.parent_refs).is_empty() {
        debug!(route = %root, group = %ctx.group.id, "GRPCRoute has no parent in this gateway group");
        return Ok(());
    }
    let labels = labels_for(root);

    for (rule_index, rule) in route.spec.rules.iter().enumerate() {
        if let Some(filter) = rule.filters.iter().find(|f| {
            matches!(
                f.r#type,
                HTTPRouteFilterType::RequestRedirect | HTTPRouteFilterType::URLRewrite
            )
        }) {
            return Err(TranslationError::new(
                root,
                TranslationReason::UnsupportedFilter(format!(
                    "{:?} is not available on GRPCRoute",
                    filter.r#type
                )),
            ));
        }
        let backends = resolve_backend_refs(ctx, &namespace, &rule.backend_refs, true, out)?;

        let default_match = [GRPCRouteMatch::default()];
        let matches = if rule.matches.is_empty() {
            &default_match[..]
        } else {
            &rule.matches[..]
        };

        for (match_index, route_match) in matches.iter().enumerate() {
            let mut scratch = ScratchPlugins::new();
            apply_filters(ctx, root, &namespace, &rule.filters, None, &mut scratch)?;

            let (uris, uri_var) = method_uris(route_match.method.as_ref());
            let mut vars: Vec<Value> = uri_var.into_iter().collect();
            vars.extend(route_match.headers.iter().map(header_match));

            let (rule_part, match_part) = (rule_index.to_string(), match_index.to_string());
            let mut payload = RoutePayload {
                id: root_scoped_id(root, &["rule", &rule_part, "match", &match_part]),
                name: object_name(root, &format!("rule{rule_index}_match{match_index}")),
                labels: labels.clone(),
                uris,
                hosts: route.spec.hostnames.clone(),
                vars,
                ..RoutePayload::default()
            };
            attach_backends(&mut payload, &backends, &mut scratch);
            payload.plugins = ctx.plugins(root, scratch)?;

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
#[path = "grpcroute_tests.rs"]
mod grpcroute_tests;
