// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `Gateway` listener certificates and `GatewayProxy` global configuration.

use super::filters::ScratchPlugins;
use super::ingress::tls_pair;
use super::{TranslateContext, Translation};
use crate::cache::ObjectKey;
use crate::crd::{Gateway, GatewayProxy, Listener};
use crate::dataplane::id::root_scoped_id;
use crate::dataplane::{labels_for, DesiredObject, GlobalRulePayload, Payload, SslPayload};
use crate::errors::{PluginError, TranslationError, TranslationReason};
use serde_json::json;
use tracing::debug;

fn terminates_tls(listener: &Listener) -> bool {
    matches!(listener.protocol.as_str(), "HTTPS" | "TLS")
        && listener
            .tls
            .as_ref()
            .is_some_and(|tls| tls.mode.as_deref().unwrap_or("Terminate") == "Terminate")
}

/// One SSL object per certificate of every TLS-terminating listener.
///
/// Listeners without a hostname are skipped: the data plane selects
/// certificates by SNI only.
///
/// # Errors
///
/// Returns [`TranslationError`] for a non-Secret certificate reference or an
/// unusable secret.
pub fn translate_gateway(
    ctx: &TranslateContext<'_>,
    root: &ObjectKey,
    gateway: &Gateway,
    out: &mut Translation,
) -> Result<(), TranslationError> {
    for listener in gateway.spec.listeners.iter().filter(|l| terminates_tls(l)) {
        let Some(hostname) = &listener.hostname else {
            debug!(gateway = %root, listener = %listener.name, "TLS listener without hostname, no SSL object");
            continue;
        };
        let refs = listener.tls.iter().flat_map(|tls| tls.certificate_refs.iter());
        for (index, cert_ref) in refs.enumerate() {
            let is_secret = cert_ref.group.as_deref().unwrap_or_default().is_empty()
                && cert_ref.kind.as_deref().unwrap_or("Secret") == "Secret";
            if !is_secret {
                return Err(TranslationError::new(
                    root,
                    TranslationReason::InvalidField {
                        field: format!("listeners[{}].tls.certificateRefs[{index}]", listener.name),
                        message: "only core Secrets are supported".to_string(),
                    },
                ));
            }
            let namespace = cert_ref.namespace.as_deref().unwrap_or(&root.namespace);
            let (cert, key) = tls_pair(ctx, root, namespace, &cert_ref.name)?;
            let index = index.to_string();
            let payload = SslPayload {
                id: root_scoped_id(root, &["listener", &listener.name, "cert", &index]),
                labels: labels_for(root),
                cert,
                key,
                snis: vec![hostname.clone()],
                client: None,
            };
            out.push(DesiredObject::new(
                payload.id.clone(),
                out.group(),
                Payload::Ssl(payload),
                root,
            ));
        }
    }
    Ok(())
}

/// Global plugins and plugin metadata of a gateway group.
///
/// # Errors
///
/// Returns [`TranslationError`] if a plugin or metadata entry is rejected.
pub fn translate_gateway_proxy(
    ctx: &TranslateContext<'_>,
    root: &ObjectKey,
    proxy: &GatewayProxy,
    out: &mut Translation,
) -> Result<(), TranslationError> {
    let scratch: ScratchPlugins = proxy
        .spec
        .plugins
        .iter()
        .filter(|p| p.enabled)
        .map(|p| (p.name.clone(), p.config.clone().unwrap_or_else(|| json!({}))))
        .collect();
    if !scratch.is_empty() {
        let payload = GlobalRulePayload {
            id: root_scoped_id(root, &["global"]),
            plugins: ctx.plugins(root, scratch)?,
        };
        out.push(DesiredObject::new(
            payload.id.clone(),
            out.group(),
            Payload::GlobalRule(payload),
            root,
        ));
    }

    for (plugin, metadata) in &proxy.spec.plugin_metadata {
        if !metadata.is_object() {
            return Err(TranslationError::new(
                root,
                PluginError::NotAnObject {
                    plugin: plugin.clone(),
                }
                .into(),
            ));
        }
        out.push(DesiredObject::new(
            plugin.clone(),
            out.group(),
            Payload::PluginMetadata(metadata.clone()),
            root,
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod gateway_tests;
