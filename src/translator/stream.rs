// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `TCPRoute`, `UDPRoute` and `TLSRoute` translation into stream routes.
//!
//! A stream route is bound to the port of each admitting listener. Stream
//! routes have no traffic splitting, so only the first backend of a rule is
//! used.

use super::httproute::resolve_backend_refs;
use super::{TranslateContext, Translation};
use crate::cache::ObjectKey;
use crate::crd::{ParentReference, StreamRouteRule, TCPRoute, TLSRoute, UDPRoute};
use crate::dataplane::id::root_scoped_id;
use crate::dataplane::{labels_for, DesiredObject, Payload, StreamRoutePayload};
use crate::errors::TranslationError;
use kube::ResourceExt;
use std::collections::BTreeSet;
use tracing::debug;

/// Ports of listeners in this group that speak `protocol` and admit the route.
fn listener_ports(
    ctx: &TranslateContext<'_>,
    namespace: &str,
    parent_refs: &[ParentReference],
    protocol: &str,
) -> BTreeSet<i32> {
    ctx.group_attachments(namespace, parent_refs)
        .iter()
        .flat_map(|attachment| attachment.listeners.iter())
        .filter(|listener| listener.protocol == protocol)
        .map(|listener| listener.port)
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn translate_stream_rules(
    ctx: &TranslateContext<'_>,
    root: &ObjectKey,
    namespace: &str,
    parent_refs: &[ParentReference],
    rules: &[StreamRouteRule],
    protocol: &str,
    snis: &[String],
    out: &mut Translation,
) -> Result<(), TranslationError> {
    let ports = listener_ports(ctx, namespace, parent_refs, protocol);
    if ports.is_empty() {
        debug!(route = %root, group = %ctx.group.id, protocol, "no admitting listener in this gateway group");
        return Ok(());
    }
    let labels = labels_for(root);
    let snis: Vec<Option<&str>> = if snis.is_empty() {
        vec![None]
    } else {
        snis.iter().map(|s| Some(s.as_str())).collect()
    };

    for (rule_index, rule) in rules.iter().enumerate() {
        let backends = resolve_backend_refs(ctx, namespace, &rule.backend_refs, false, out)?;
        let Some(first) = backends.first() else {
            debug!(route = %root, rule = rule_index, "stream rule has no backend, skipping");
            continue;
        };
        for port in &ports {
            for sni in &snis {
                let (port_part, rule_part) = (port.to_string(), rule_index.to_string());
                let payload = StreamRoutePayload {
                    id: root_scoped_id(
                        root,
                        &["port", &port_part, "rule", &rule_part, sni.unwrap_or_default()],
                    ),
                    labels: labels.clone(),
                    server_port: Some(*port),
                    sni: sni.map(str::to_string),
                    upstream_id: first.upstream_id.clone(),
                    ..StreamRoutePayload::default()
                };
                out.push(DesiredObject::new(
                    payload.id.clone(),
                    out.group(),
                    Payload::StreamRoute(payload),
                    root,
                ));
            }
        }
    }
    Ok(())
}

/// # Errors
///
/// Returns [`TranslationError`] if a backend cannot be resolved.
pub fn translate_tcp_route(
    ctx: &TranslateContext<'_>,
    root: &ObjectKey,
    route: &TCPRoute,
    out: &mut Translation,
) -> Result<(), TranslationError> {
    let namespace = route.namespace().unwrap_or_default();
    translate_stream_rules(
        ctx,
        root,
        &namespace,
        &route.spec.parent_refs,
        &route.spec.rules,
        "TCP",
        &[],
        out,
    )
}

/// # Errors
///
/// Returns [`TranslationError`] if a backend cannot be resolved.
pub fn translate_udp_route(
    ctx: &TranslateContext<'_>,
    root: &ObjectKey,
    route: &UDPRoute,
    out: &mut Translation,
) -> Result<(), TranslationError> {
    let namespace = route.namespace().unwrap_or_default();
    translate_stream_rules(
        ctx,
        root,
        &namespace,
        &route.spec.parent_refs,
        &route.spec.rules,
        "UDP",
        &[],
        out,
    )
}

/// TLS passthrough: one stream route per hostname, selected by SNI.
///
/// # Errors
///
/// Returns [`TranslationError`] if a backend cannot be resolved.
pub fn translate_tls_route(
    ctx: &TranslateContext<'_>,
    root: &ObjectKey,
    route: &TLSRoute,
    out: &mut Translation,
) -> Result<(), TranslationError> {
    let namespace = route.namespace().unwrap_or_default();
    translate_stream_rules(
        ctx,
        root,
        &namespace,
        &route.spec.parent_refs,
        &route.spec.rules,
        "TLS",
        &route.spec.hostnames,
        out,
    )
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod stream_tests;
