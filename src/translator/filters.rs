// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Gateway API route filters to data-plane plugins.
//!
//! | Filter | Plugin |
//! |--------|--------|
//! | `RequestHeaderModifier` | `proxy-rewrite.headers` |
//! | `ResponseHeaderModifier` | `response-rewrite.headers` |
//! | `RequestRedirect` | `redirect` |
//! | `URLRewrite` | `proxy-rewrite` (`host`, `uri`, `regex_uri`) |
//! | `RequestMirror` | `proxy-mirror` |
//! | `ExtensionRef` to a `PluginConfig` | every enabled plugin of the config |

use super::matching::escape_regex;
use super::TranslateContext;
use crate::cache::ObjectKey;
use crate::constants::{APISIX_API_GROUP, CLUSTER_DOMAIN, DEFAULT_REDIRECT_STATUS_CODE};
use crate::crd::{
    HTTPHeaderFilter, HTTPPathMatch, HTTPPathModifier, HTTPRequestRedirectFilter, HTTPRouteFilter,
    HTTPRouteFilterType, HTTPURLRewriteFilter, PathMatchType, PathModifierType, PluginConfig,
};
use crate::errors::{TranslationError, TranslationReason};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Scratch plugin configuration of one route before validation.
pub type ScratchPlugins = BTreeMap<String, Value>;

/// What the filters of one rule decided besides plugin configuration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterOutcome {
    /// A redirect answers every request, so the rule needs no backend
    pub redirect: bool,
}

fn unsupported(root: &ObjectKey, message: &str) -> TranslationError {
    TranslationError::new(root, TranslationReason::UnsupportedFilter(message.to_string()))
}

fn missing_config(root: &ObjectKey, filter: &str) -> TranslationError {
    TranslationError::new(
        root,
        TranslationReason::InvalidField {
            field: format!("filters[{filter}]"),
            message: "filter configuration is missing".to_string(),
        },
    )
}

/// Run `update` on the object stored under `name`, creating it when absent.
fn with_plugin_object<T>(
    scratch: &mut ScratchPlugins,
    name: &str,
    update: impl FnOnce(&mut Map<String, Value>) -> T,
) -> T {
    let mut map = match scratch.remove(name) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    let result = update(&mut map);
    scratch.insert(name.to_string(), Value::Object(map));
    result
}

fn header_operations(filter: &HTTPHeaderFilter) -> Value {
    let mut headers = Map::new();
    if !filter.add.is_empty() {
        let add: Map<String, Value> = filter
            .add
            .iter()
            .map(|h| (h.name.clone(), Value::String(h.value.clone())))
            .collect();
        headers.insert("add".to_string(), Value::Object(add));
    }
    if !filter.set.is_empty() {
        let set: Map<String, Value> = filter
            .set
            .iter()
            .map(|h| (h.name.clone(), Value::String(h.value.clone())))
            .collect();
        headers.insert("set".to_string(), Value::Object(set));
    }
    if !filter.remove.is_empty() {
        headers.insert("remove".to_string(), json!(filter.remove));
    }
    Value::Object(headers)
}

/// Prefix of a `PathPrefix` match, required by `ReplacePrefixMatch`.
fn matched_prefix<'a>(
    root: &ObjectKey,
    path_match: Option<&'a HTTPPathMatch>,
) -> Result<&'a str, TranslationError> {
    match path_match {
        None => Ok("/"),
        Some(path) if path.r#type == PathMatchType::PathPrefix => {
            Ok(path.value.as_deref().unwrap_or("/"))
        }
        Some(_) => Err(unsupported(
            root,
            "ReplacePrefixMatch requires a PathPrefix match",
        )),
    }
}

fn redirect_plugin(
    root: &ObjectKey,
    redirect: &HTTPRequestRedirectFilter,
    path_match: Option<&HTTPPathMatch>,
) -> Result<Value, TranslationError> {
    let scheme = redirect.scheme.as_deref().unwrap_or("$scheme");
    let host = redirect.hostname.as_deref().unwrap_or("$host");
    let port = match (redirect.port, &redirect.scheme) {
        (Some(port), _) => format!(":{port}"),
        (None, Some(_)) => String::new(),
        (None, None) => ":$server_port".to_string(),
    };
    let base = format!("{scheme}://{host}{port}");
    let ret_code = redirect.status_code.unwrap_or(DEFAULT_REDIRECT_STATUS_CODE);

    match &redirect.path {
        None => Ok(json!({"uri": format!("{base}$request_uri"), "ret_code": ret_code})),
        Some(HTTPPathModifier {
            r#type: PathModifierType::ReplaceFullPath,
            replace_full_path,
            ..
        }) => {
            let path = replace_full_path.as_deref().unwrap_or("/");
            Ok(json!({"uri": format!("{base}{path}"), "ret_code": ret_code}))
        }
        Some(HTTPPathModifier {
            r#type: PathModifierType::ReplacePrefixMatch,
            replace_prefix_match,
            ..
        }) => {
            let prefix = matched_prefix(root, path_match)?.trim_end_matches('/');
            let replacement = replace_prefix_match
                .as_deref()
                .unwrap_or("/")
                .trim_end_matches('/');
            Ok(json!({
                "regex_uri": [
                    format!("^{}(/.*)?$", escape_regex(prefix)),
                    format!("{base}{replacement}$1"),
                ],
                "ret_code": ret_code,
            }))
        }
    }
}

fn rewrite_into(
    root: &ObjectKey,
    rewrite: &HTTPURLRewriteFilter,
    path_match: Option<&HTTPPathMatch>,
    proxy_rewrite: &mut Map<String, Value>,
) -> Result<(), TranslationError> {
    if let Some(host) = &rewrite.hostname {
        proxy_rewrite.insert("host".to_string(), Value::String(host.clone()));
    }
    match &rewrite.path {
        None => {}
        Some(HTTPPathModifier {
            r#type: PathModifierType::ReplaceFullPath,
            replace_full_path,
            ..
        }) => {
            let path = replace_full_path.as_deref().unwrap_or("/");
            proxy_rewrite.insert("uri".to_string(), Value::String(path.to_string()));
        }
        Some(HTTPPathModifier {
            r#type: PathModifierType::ReplacePrefixMatch,
            replace_prefix_match,
            ..
        }) => {
            let prefix = escape_regex(matched_prefix(root, path_match)?.trim_end_matches('/'));
            let replacement = replace_prefix_match.as_deref().unwrap_or("/");
            let trimmed = replacement.trim_end_matches('/');
            let regex_uri = if prefix.is_empty() {
                json!(["^/(.*)", format!("{trimmed}/$1")])
            } else {
                let exact = if replacement.is_empty() { "/" } else { replacement };
                json!([
                    format!("^{prefix}$"),
                    exact,
                    format!("^{prefix}/(.*)"),
                    format!("{trimmed}/$1"),
                ])
            };
            proxy_rewrite.insert("regex_uri".to_string(), regex_uri);
        }
    }
    Ok(())
}

fn merge_plugin_config(
    ctx: &TranslateContext<'_>,
    root: &ObjectKey,
    namespace: &str,
    filter: &HTTPRouteFilter,
    scratch: &mut ScratchPlugins,
) -> Result<(), TranslationError> {
    let reference = filter
        .extension_ref
        .as_ref()
        .ok_or_else(|| missing_config(root, "ExtensionRef"))?;
    if reference.group != APISIX_API_GROUP || reference.kind != "PluginConfig" {
        return Err(unsupported(
            root,
            &format!("ExtensionRef to {}/{}", reference.group, reference.kind),
        ));
    }
    let config = ctx
        .cache
        .get::<PluginConfig>(namespace, &reference.name)
        .ok_or_else(|| {
            TranslationError::new(
                root,
                TranslationReason::PluginConfigNotFound {
                    kind: "PluginConfig".to_string(),
                    namespace: namespace.to_string(),
                    name: reference.name.clone(),
                },
            )
        })?;
    for plugin in config.spec.plugins.iter().filter(|p| p.enabled) {
        scratch
            .entry(plugin.name.clone())
            .or_insert_with(|| plugin.config.clone().unwrap_or_else(|| json!({})));
    }
    Ok(())
}

/// Apply the filters of one rule for one of its path matches.
///
/// `path_match` is needed by `ReplacePrefixMatch` modifiers.
///
/// # Errors
///
/// Returns [`TranslationReason::UnsupportedFilter`] for combinations the data
/// plane cannot express: a redirect together with a rewrite, more than one
/// mirror, or a prefix replacement without a prefix match.
pub fn apply_filters(
    ctx: &TranslateContext<'_>,
    root: &ObjectKey,
    namespace: &str,
    filters: &[HTTPRouteFilter],
    path_match: Option<&HTTPPathMatch>,
    scratch: &mut ScratchPlugins,
) -> Result<FilterOutcome, TranslationError> {
    let has = |kind: HTTPRouteFilterType| filters.iter().any(|f| f.r#type == kind);
    if has(HTTPRouteFilterType::RequestRedirect) && has(HTTPRouteFilterType::URLRewrite) {
        return Err(unsupported(root, "RequestRedirect cannot be combined with URLRewrite"));
    }
    let mirrors = filters
        .iter()
        .filter(|f| f.r#type == HTTPRouteFilterType::RequestMirror)
        .count();
    if mirrors > 1 {
        return Err(unsupported(root, "only one RequestMirror is supported per rule"));
    }

    let mut outcome = FilterOutcome::default();
    for filter in filters {
        match filter.r#type {
            HTTPRouteFilterType::RequestHeaderModifier => {
                let modifier = filter
                    .request_header_modifier
                    .as_ref()
                    .ok_or_else(|| missing_config(root, "RequestHeaderModifier"))?;
                with_plugin_object(scratch, "proxy-rewrite", |plugin| {
                    plugin.insert("headers".to_string(), header_operations(modifier));
                });
            }
            HTTPRouteFilterType::ResponseHeaderModifier => {
                let modifier = filter
                    .response_header_modifier
                    .as_ref()
                    .ok_or_else(|| missing_config(root, "ResponseHeaderModifier"))?;
                with_plugin_object(scratch, "response-rewrite", |plugin| {
                    plugin.insert("headers".to_string(), header_operations(modifier));
                });
            }
            HTTPRouteFilterType::RequestRedirect => {
                let redirect = filter
                    .request_redirect
                    .as_ref()
                    .ok_or_else(|| missing_config(root, "RequestRedirect"))?;
                scratch.insert(
                    "redirect".to_string(),
                    redirect_plugin(root, redirect, path_match)?,
                );
                outcome.redirect = true;
            }
            HTTPRouteFilterType::URLRewrite => {
                let rewrite = filter
                    .url_rewrite
                    .as_ref()
                    .ok_or_else(|| missing_config(root, "URLRewrite"))?;
                with_plugin_object(scratch, "proxy-rewrite", |plugin| {
                    rewrite_into(root, rewrite, path_match, plugin)
                })?;
            }
            HTTPRouteFilterType::RequestMirror => {
                let mirror = filter
                    .request_mirror
                    .as_ref()
                    .ok_or_else(|| missing_config(root, "RequestMirror"))?;
                let backend = &mirror.backend_ref;
                if !backend.is_service() {
                    return Err(TranslationError::new(
                        root,
                        TranslationReason::UnsupportedBackend {
                            kind: backend.kind.clone().unwrap_or_default(),
                            name: backend.name.clone(),
                        },
                    ));
                }
                let port = backend.port.ok_or_else(|| {
                    TranslationError::new(
                        root,
                        TranslationReason::InvalidField {
                            field: "filters[RequestMirror].backendRef.port".to_string(),
                            message: "a Service mirror needs a port".to_string(),
                        },
                    )
                })?;
                let mirror_ns = backend.namespace.as_deref().unwrap_or(namespace);
                scratch.insert(
                    "proxy-mirror".to_string(),
                    json!({"host": format!("http://{}.{mirror_ns}.{CLUSTER_DOMAIN}:{port}", backend.name)}),
                );
            }
            HTTPRouteFilterType::ExtensionRef => {
                merge_plugin_config(ctx, root, namespace, filter, scratch)?;
            }
        }
    }
    Ok(outcome)
}

#[cfg(test)]
#[path = "filters_tests.rs"]
mod filters_tests;
