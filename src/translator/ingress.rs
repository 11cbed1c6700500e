// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Native `Ingress` translation.
//!
//! Each `(rule, path)` pair becomes one route and every `spec.tls` entry one
//! SSL object. Behaviour beyond the `Ingress` schema is opted into through
//! `k8s.apisix.apache.org/*` annotations:
//!
//! | Annotation | Effect |
//! |------------|--------|
//! | `enable-websocket` | `enable_websocket` on every route |
//! | `http-to-https` | `redirect.http_to_https` |
//! | `rewrite-target` | `proxy-rewrite.uri` |
//! | `rewrite-target-regex` + `-template` | `proxy-rewrite.regex_uri` |
//! | `allowlist-source-range` / `blocklist-source-range` | `ip-restriction` |
//! | `enable-cors` and `cors-allow-*` | `cors` |
//! | `plugin-config-name` | `plugin_config_id` of an `ApisixPluginConfig` |
//! | `use-regex` | `ImplementationSpecific` paths are regular expressions |

use super::apisix_resources::apisix_plugin_config_id;
use super::backends::{resolve_upstream, BackendSpec, PortRef, WeightedUpstream};
use super::filters::ScratchPlugins;
use super::httproute::attach_backends;
use super::matching::{prefix_uris, regex_path, PathMatch};
use super::{object_name, TranslateContext, Translation};
use crate::cache::ObjectKey;
use crate::conflict::{apply_policy, resolve_target};
use crate::constants::{
    ANNOTATION_ALLOWLIST_SOURCE_RANGE, ANNOTATION_BLOCKLIST_SOURCE_RANGE,
    ANNOTATION_CORS_ALLOW_HEADERS, ANNOTATION_CORS_ALLOW_METHODS, ANNOTATION_CORS_ALLOW_ORIGIN,
    ANNOTATION_ENABLE_CORS, ANNOTATION_ENABLE_WEBSOCKET, ANNOTATION_HTTP_TO_HTTPS,
    ANNOTATION_PLUGIN_CONFIG_NAME, ANNOTATION_REWRITE_TARGET, ANNOTATION_REWRITE_TARGET_REGEX,
    ANNOTATION_REWRITE_TARGET_REGEX_TEMPLATE, ANNOTATION_USE_REGEX, DEFAULT_GATEWAY_BACKEND_WEIGHT,
};
use crate::crd::ResolveGranularity;
use crate::dataplane::id::root_scoped_id;
use crate::dataplane::{labels_for, DesiredObject, Payload, RoutePayload, SslPayload};
use crate::errors::{TranslationError, TranslationReason};
use crate::router::secret_string;
use k8s_openapi::api::networking::v1::{HTTPIngressPath, Ingress, IngressBackend};
use kube::ResourceExt;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Route settings derived from annotations, shared by every path.
#[derive(Clone, Debug, Default)]
struct AnnotationSettings {
    websocket: bool,
    use_regex: bool,
    plugin_config_id: Option<String>,
    plugins: ScratchPlugins,
}

fn is_true(annotations: &BTreeMap<String, String>, key: &str) -> bool {
    annotations.get(key).is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

fn cidrs(raw: &str) -> Vec<Value> {
    raw.split(',')
        .map(str::trim)
        .filter(|cidr| !cidr.is_empty())
        .map(|cidr| Value::String(cidr.to_string()))
        .collect()
}

fn annotation_settings(
    ctx: &TranslateContext<'_>,
    root: &ObjectKey,
    annotations: &BTreeMap<String, String>,
) -> Result<AnnotationSettings, TranslationError> {
    let mut settings = AnnotationSettings {
        websocket: is_true(annotations, ANNOTATION_ENABLE_WEBSOCKET),
        use_regex: is_true(annotations, ANNOTATION_USE_REGEX),
        ..AnnotationSettings::default()
    };
    let plugins = &mut settings.plugins;

    if is_true(annotations, ANNOTATION_HTTP_TO_HTTPS) {
        plugins.insert("redirect".to_string(), json!({"http_to_https": true}));
    }

    let mut rewrite = Map::new();
    if let Some(target) = annotations.get(ANNOTATION_REWRITE_TARGET) {
        rewrite.insert("uri".to_string(), Value::String(target.clone()));
    }
    if let Some(regex) = annotations.get(ANNOTATION_REWRITE_TARGET_REGEX) {
        let template = annotations
            .get(ANNOTATION_REWRITE_TARGET_REGEX_TEMPLATE)
            .ok_or_else(|| {
                TranslationError::new(
                    root,
                    TranslationReason::InvalidField {
                        field: ANNOTATION_REWRITE_TARGET_REGEX_TEMPLATE.to_string(),
                        message: "required together with rewrite-target-regex".to_string(),
                    },
                )
            })?;
        rewrite.insert("regex_uri".to_string(), json!([regex, template]));
    }
    if !rewrite.is_empty() {
        plugins.insert("proxy-rewrite".to_string(), Value::Object(rewrite));
    }

    let mut restriction = Map::new();
    if let Some(allow) = annotations.get(ANNOTATION_ALLOWLIST_SOURCE_RANGE) {
        restriction.insert("whitelist".to_string(), Value::Array(cidrs(allow)));
    }
    if let Some(block) = annotations.get(ANNOTATION_BLOCKLIST_SOURCE_RANGE) {
        restriction.insert("blacklist".to_string(), Value::Array(cidrs(block)));
    }
    if !restriction.is_empty() {
        plugins.insert("ip-restriction".to_string(), Value::Object(restriction));
    }

    if is_true(annotations, ANNOTATION_ENABLE_CORS) {
        let mut cors = Map::new();
        for (annotation, field) in [
            (ANNOTATION_CORS_ALLOW_ORIGIN, "allow_origins"),
            (ANNOTATION_CORS_ALLOW_METHODS, "allow_methods"),
            (ANNOTATION_CORS_ALLOW_HEADERS, "allow_headers"),
        ] {
            if let Some(value) = annotations.get(annotation) {
                cors.insert(field.to_string(), Value::String(value.clone()));
            }
        }
        plugins.insert("cors".to_string(), Value::Object(cors));
    }

    if let Some(name) = annotations.get(ANNOTATION_PLUGIN_CONFIG_NAME) {
        settings.plugin_config_id = Some(apisix_plugin_config_id(ctx, root, name)?);
    }
    Ok(settings)
}

fn path_match(path: &HTTPIngressPath, use_regex: bool) -> PathMatch {
    let value = path.path.as_deref().unwrap_or("/");
    match path.path_type.as_str() {
        "Exact" => PathMatch {
            uris: vec![value.to_string()],
            var: None,
        },
        "Prefix" => PathMatch {
            uris: prefix_uris(value),
            var: None,
        },
        _ if use_regex => regex_path(value),
        _ => {
            let uri = if value.ends_with('*') {
                value.to_string()
            } else {
                format!("{value}*")
            };
            PathMatch {
                uris: vec![uri],
                var: None,
            }
        }
    }
}

fn ingress_upstream(
    ctx: &TranslateContext<'_>,
    root: &ObjectKey,
    backend: &IngressBackend,
    out: &mut Translation,
) -> Result<WeightedUpstream, TranslationError> {
    let Some(service) = &backend.service else {
        let resource = backend.resource.as_ref();
        return Err(TranslationError::new(
            root,
            TranslationReason::UnsupportedBackend {
                kind: resource.map(|r| r.kind.clone()).unwrap_or_default(),
                name: resource.map(|r| r.name.clone()).unwrap_or_default(),
            },
        ));
    };
    let port = service.port.as_ref();
    let port = match (port.and_then(|p| p.number), port.and_then(|p| p.name.clone())) {
        (Some(number), _) => PortRef::Number(number),
        (None, Some(name)) => PortRef::Name(name),
        (None, None) => {
            return Err(TranslationError::new(
                root,
                TranslationReason::InvalidField {
                    field: format!("backend.service[{}].port", service.name),
                    message: "a port number or name is required".to_string(),
                },
            ))
        }
    };
    let spec = BackendSpec {
        namespace: root.namespace.clone(),
        service: service.name.clone(),
        port,
        subset: None,
        granularity: ResolveGranularity::Endpoint,
        grpc: false,
    };
    Ok(WeightedUpstream {
        upstream_id: resolve_upstream(ctx, &spec, out)?,
        weight: DEFAULT_GATEWAY_BACKEND_WEIGHT,
    })
}

/// Translate an `Ingress` of a class handled by the current group.
///
/// # Errors
///
/// Returns [`TranslationError`] if a backend, secret, annotation or plugin
/// cannot be translated.
pub fn translate_ingress(
    ctx: &TranslateContext<'_>,
    root: &ObjectKey,
    ingress: &Ingress,
    out: &mut Translation,
) -> Result<(), TranslationError> {
    let Some(spec) = &ingress.spec else {
        return Ok(());
    };
    let settings = annotation_settings(ctx, root, ingress.annotations())?;
    let policy = resolve_target(ctx.cache, root);
    let labels = labels_for(root);

    let push_route = |out: &mut Translation,
                          suffix: &str,
                          id_parts: &[&str],
                          hosts: Vec<String>,
                          matched: PathMatch,
                          backend: &IngressBackend|
     -> Result<(), TranslationError> {
        let upstream = ingress_upstream(ctx, root, backend, out)?;
        let mut scratch = settings.plugins.clone();
        let mut payload = RoutePayload {
            id: root_scoped_id(root, id_parts),
            name: object_name(root, suffix),
            labels: labels.clone(),
            uris: matched.uris,
            hosts,
            vars: matched.var.into_iter().collect(),
            plugin_config_id: settings.plugin_config_id.clone(),
            enable_websocket: settings.websocket.then_some(true),
            ..RoutePayload::default()
        };
        attach_backends(&mut payload, &[upstream], &mut scratch);
        payload.plugins = ctx.plugins(root, scratch)?;
        if let Some(policy) = policy.effective(None) {
            apply_policy(&mut payload, policy);
        }
        out.push(DesiredObject::new(
            payload.id.clone(),
            out.group(),
            Payload::Route(payload),
            root,
        ));
        Ok(())
    };

    for (rule_index, rule) in spec.rules.iter().flatten().enumerate() {
        let hosts: Vec<String> = rule.host.iter().cloned().collect();
        let Some(http) = &rule.http else {
            continue;
        };
        for (path_index, path) in http.paths.iter().enumerate() {
            let (rule_part, path_part) = (rule_index.to_string(), path_index.to_string());
            push_route(
                out,
                &format!("rule{rule_index}_path{path_index}"),
                &["rule", &rule_part, "path", &path_part],
                hosts.clone(),
                path_match(path, settings.use_regex),
                &path.backend,
            )?;
        }
    }

    if let Some(backend) = &spec.default_backend {
        push_route(
            out,
            "default",
            &["default"],
            Vec::new(),
            PathMatch {
                uris: vec!["/*".to_string()],
                var: None,
            },
            backend,
        )?;
    }

    for (tls_index, tls) in spec.tls.iter().flatten().enumerate() {
        let (Some(secret_name), Some(hosts)) = (&tls.secret_name, &tls.hosts) else {
            continue;
        };
        if hosts.is_empty() {
            continue;
        }
        let (cert, key) = tls_pair(ctx, root, &root.namespace, secret_name)?;
        let index = tls_index.to_string();
        let payload = SslPayload {
            id: root_scoped_id(root, &["tls", &index]),
            labels: labels.clone(),
            cert,
            key,
            snis: hosts.clone(),
            client: None,
        };
        out.push(DesiredObject::new(
            payload.id.clone(),
            out.group(),
            Payload::Ssl(payload),
            root,
        ));
    }
    Ok(())
}

/// Certificate and key of a `kubernetes.io/tls` secret.
///
/// # Errors
///
/// Returns [`TranslationReason::SecretNotFound`] or
/// [`TranslationReason::SecretKeyMissing`].
pub fn tls_pair(
    ctx: &TranslateContext<'_>,
    root: &ObjectKey,
    namespace: &str,
    name: &str,
) -> Result<(String, String), TranslationError> {
    let secret = ctx.secret(root, namespace, name)?;
    let value = |key: &str| {
        secret_string(&secret, key).ok_or_else(|| {
            TranslationError::new(
                root,
                TranslationReason::SecretKeyMissing {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                    key: key.to_string(),
                },
            )
        })
    };
    Ok((value("tls.crt")?, value("tls.key")?))
}

#[cfg(test)]
#[path = "ingress_tests.rs"]
mod ingress_tests;
