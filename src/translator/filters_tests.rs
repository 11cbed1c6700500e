// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for route filter translation

#[cfg(test)]
mod tests {
    use super::super::{apply_filters, ScratchPlugins};
    use crate::cache::{ObjectKey, ResourceKind};
    use crate::crd::{HTTPPathMatch, HTTPRouteFilter, PathMatchType, PluginConfig};
    use crate::errors::TranslationReason;
    use crate::test_fixtures::{object, Harness};
    use serde_json::{json, Value};

    fn root() -> ObjectKey {
        ObjectKey::new(ResourceKind::HTTPRoute, "default", "r")
    }

    fn filters(value: Value) -> Vec<HTTPRouteFilter> {
        object(value)
    }

    fn prefix(value: &str) -> HTTPPathMatch {
        HTTPPathMatch {
            r#type: PathMatchType::PathPrefix,
            value: Some(value.into()),
        }
    }

    fn run(
        harness: &Harness,
        value: Value,
        path: Option<&HTTPPathMatch>,
    ) -> Result<(bool, ScratchPlugins), TranslationReason> {
        let mut scratch = ScratchPlugins::new();
        let outcome = apply_filters(&harness.ctx(), &root(), "default", &filters(value), path, &mut scratch)
            .map_err(|e| e.reason)?;
        Ok((outcome.redirect, scratch))
    }

    #[test]
    fn test_header_modifiers() {
        let harness = Harness::new();
        let (redirect, scratch) = run(
            &harness,
            json!([
                {"type": "RequestHeaderModifier", "requestHeaderModifier": {
                    "add": [{"name": "X-Env", "value": "prod"}], "remove": ["X-Debug"]}},
                {"type": "ResponseHeaderModifier", "responseHeaderModifier": {
                    "set": [{"name": "Cache-Control", "value": "no-store"}]}}
            ]),
            None,
        )
        .unwrap();
        assert!(!redirect);
        assert_eq!(
            scratch["proxy-rewrite"],
            json!({"headers": {"add": {"X-Env": "prod"}, "remove": ["X-Debug"]}})
        );
        assert_eq!(
            scratch["response-rewrite"],
            json!({"headers": {"set": {"Cache-Control": "no-store"}}})
        );
    }

    #[test]
    fn test_redirect_defaults_keep_request_parts() {
        let harness = Harness::new();
        let (redirect, scratch) = run(
            &harness,
            json!([{"type": "RequestRedirect", "requestRedirect": {"hostname": "example.com"}}]),
            None,
        )
        .unwrap();
        assert!(redirect);
        assert_eq!(
            scratch["redirect"],
            json!({"uri": "$scheme://example.com:$server_port$request_uri", "ret_code": 302})
        );

        let (_, scratch) = run(
            &harness,
            json!([{"type": "RequestRedirect", "requestRedirect": {"scheme": "https", "statusCode": 301}}]),
            None,
        )
        .unwrap();
        assert_eq!(
            scratch["redirect"],
            json!({"uri": "https://$host$request_uri", "ret_code": 301})
        );
    }

    #[test]
    fn test_redirect_prefix_replacement() {
        let harness = Harness::new();
        let (_, scratch) = run(
            &harness,
            json!([{"type": "RequestRedirect", "requestRedirect": {
                "scheme": "https", "path": {"type": "ReplacePrefixMatch", "replacePrefixMatch": "/v2"}}}]),
            Some(&prefix("/v1")),
        )
        .unwrap();
        assert_eq!(
            scratch["redirect"]["regex_uri"],
            json!(["^/v1(/.*)?$", "https://$host/v2$1"])
        );
    }

    #[test]
    fn test_url_rewrite_prefix() {
        let harness = Harness::new();
        let (_, scratch) = run(
            &harness,
            json!([{"type": "URLRewrite", "urlRewrite": {
                "hostname": "internal", "path": {"type": "ReplacePrefixMatch", "replacePrefixMatch": "/new"}}}]),
            Some(&prefix("/old")),
        )
        .unwrap();
        assert_eq!(
            scratch["proxy-rewrite"],
            json!({
                "host": "internal",
                "regex_uri": ["^/old$", "/new", "^/old/(.*)", "/new/$1"]
            })
        );

        let (_, scratch) = run(
            &harness,
            json!([{"type": "URLRewrite", "urlRewrite": {
                "path": {"type": "ReplacePrefixMatch", "replacePrefixMatch": "/api/"}}}]),
            Some(&prefix("/")),
        )
        .unwrap();
        assert_eq!(scratch["proxy-rewrite"]["regex_uri"], json!(["^/(.*)", "/api/$1"]));
    }

    #[test]
    fn test_header_modifier_and_rewrite_share_plugin() {
        let harness = Harness::new();
        let (_, scratch) = run(
            &harness,
            json!([
                {"type": "URLRewrite", "urlRewrite": {"path": {"type": "ReplaceFullPath", "replaceFullPath": "/x"}}},
                {"type": "RequestHeaderModifier", "requestHeaderModifier": {"set": [{"name": "A", "value": "b"}]}}
            ]),
            None,
        )
        .unwrap();
        assert_eq!(scratch["proxy-rewrite"]["uri"], "/x");
        assert_eq!(scratch["proxy-rewrite"]["headers"]["set"]["A"], "b");
    }

    #[test]
    fn test_mirror_targets_cluster_dns() {
        let harness = Harness::new();
        let (_, scratch) = run(
            &harness,
            json!([{"type": "RequestMirror", "requestMirror": {"backendRef": {"name": "shadow", "port": 8080}}}]),
            None,
        )
        .unwrap();
        assert_eq!(
            scratch["proxy-mirror"],
            json!({"host": "http://shadow.default.svc.cluster.local:8080"})
        );
    }

    #[test]
    fn test_rejected_combinations() {
        let harness = Harness::new();
        let both = run(
            &harness,
            json!([
                {"type": "RequestRedirect", "requestRedirect": {"scheme": "https"}},
                {"type": "URLRewrite", "urlRewrite": {"hostname": "a"}}
            ]),
            None,
        );
        assert!(matches!(both, Err(TranslationReason::UnsupportedFilter(_))));

        let two_mirrors = run(
            &harness,
            json!([
                {"type": "RequestMirror", "requestMirror": {"backendRef": {"name": "a", "port": 1}}},
                {"type": "RequestMirror", "requestMirror": {"backendRef": {"name": "b", "port": 1}}}
            ]),
            None,
        );
        assert!(matches!(two_mirrors, Err(TranslationReason::UnsupportedFilter(_))));

        let exact = HTTPPathMatch {
            r#type: PathMatchType::Exact,
            value: Some("/a".into()),
        };
        let prefix_without_prefix = run(
            &harness,
            json!([{"type": "URLRewrite", "urlRewrite": {
                "path": {"type": "ReplacePrefixMatch", "replacePrefixMatch": "/b"}}}]),
            Some(&exact),
        );
        assert!(matches!(prefix_without_prefix, Err(TranslationReason::UnsupportedFilter(_))));
    }

    #[test]
    fn test_extension_ref_fills_missing_plugins() {
        let harness = Harness::new();
        let reference = json!([
            {"type": "ResponseHeaderModifier", "responseHeaderModifier": {"remove": ["Server"]}},
            {"type": "ExtensionRef", "extensionRef": {
                "group": "apisix.apache.org", "kind": "PluginConfig", "name": "auth"}}
        ]);

        let missing = run(&harness, reference.clone(), None);
        assert!(matches!(missing, Err(TranslationReason::PluginConfigNotFound { .. })));

        harness.cache.apply(object::<PluginConfig>(json!({
            "apiVersion": "apisix.apache.org/v1alpha1",
            "kind": "PluginConfig",
            "metadata": {"name": "auth", "namespace": "default"},
            "spec": {"plugins": [
                {"name": "key-auth"},
                {"name": "response-rewrite", "config": {"status_code": 200}},
                {"name": "cors", "enabled": false}
            ]}
        })));
        let (_, scratch) = run(&harness, reference, None).unwrap();
        assert_eq!(scratch["key-auth"], json!({}));
        assert_eq!(scratch["response-rewrite"], json!({"headers": {"remove": ["Server"]}}));
        assert!(!scratch.contains_key("cors"));

        let foreign = run(
            &harness,
            json!([{"type": "ExtensionRef", "extensionRef": {"group": "example.com", "kind": "Thing", "name": "x"}}]),
            None,
        );
        assert!(matches!(foreign, Err(TranslationReason::UnsupportedFilter(_))));
    }
}
