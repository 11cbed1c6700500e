// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `Gateway` and `GatewayProxy` translation

#[cfg(test)]
mod tests {
    use crate::cache::{ObjectKey, ResourceKind};
    use crate::crd::{Gateway, GatewayProxy};
    use crate::dataplane::{ObjectKind, Payload};
    use crate::errors::{PluginError, TranslationReason};
    use crate::test_fixtures::{count, gateway_class, object, secret, Harness};
    use serde_json::{json, Value};

    fn tls_gateway(listeners: Value) -> Gateway {
        object(json!({
            "apiVersion": "gateway.networking.k8s.io/v1",
            "kind": "Gateway",
            "metadata": {"name": "gw", "namespace": "default"},
            "spec": {"gatewayClassName": "apisix", "listeners": listeners}
        }))
    }

    fn gw_key() -> ObjectKey {
        ObjectKey::new(ResourceKind::Gateway, "default", "gw")
    }

    #[test]
    fn test_terminating_listener_produces_ssl() {
        let harness = Harness::new();
        harness.cache.apply(gateway_class("apisix"));
        harness.cache.apply(secret(
            "default",
            "site-cert",
            &[("tls.crt", "CERT"), ("tls.key", "KEY")],
        ));
        harness.cache.apply(tls_gateway(json!([
            {"name": "https", "port": 443, "protocol": "HTTPS", "hostname": "example.com",
             "tls": {"certificateRefs": [{"name": "site-cert"}]}},
            {"name": "no-host", "port": 8443, "protocol": "HTTPS",
             "tls": {"certificateRefs": [{"name": "site-cert"}]}},
            {"name": "passthrough", "port": 9443, "protocol": "TLS", "hostname": "db.example.com",
             "tls": {"mode": "Passthrough"}},
            {"name": "http", "port": 80, "protocol": "HTTP"}
        ])));

        let objects = harness.translate(&gw_key()).unwrap();
        assert_eq!(objects.len(), 1);
        let Payload::Ssl(ssl) = &objects[0].payload else {
            panic!("expected an SSL object");
        };
        assert_eq!(ssl.snis, vec!["example.com"]);
        assert_eq!(ssl.cert, "CERT");
    }

    #[test]
    fn test_listener_certificate_missing() {
        let harness = Harness::new();
        harness.cache.apply(tls_gateway(json!([
            {"name": "https", "port": 443, "protocol": "HTTPS", "hostname": "example.com",
             "tls": {"certificateRefs": [{"name": "absent"}]}}
        ])));
        let err = harness.translate(&gw_key()).unwrap_err();
        assert!(matches!(err.reason, TranslationReason::SecretNotFound { .. }));
    }

    fn proxy(spec: Value) -> GatewayProxy {
        object(json!({
            "apiVersion": "apisix.apache.org/v1alpha1",
            "kind": "GatewayProxy",
            "metadata": {"name": "proxy", "namespace": "default"},
            "spec": spec,
        }))
    }

    #[test]
    fn test_gateway_proxy_global_rule_and_metadata() {
        let harness = Harness::new();
        harness.cache.apply(proxy(json!({
            "plugins": [
                {"name": "prometheus"},
                {"name": "request-id", "enabled": false}
            ],
            "pluginMetadata": {"http-logger": {"log_format": {"host": "$host"}}}
        })));

        let objects = harness
            .translate(&ObjectKey::new(ResourceKind::GatewayProxy, "default", "proxy"))
            .unwrap();
        assert_eq!(count(&objects, ObjectKind::GlobalRule), 1);
        assert_eq!(count(&objects, ObjectKind::PluginMetadata), 1);
        for object in &objects {
            match &object.payload {
                Payload::GlobalRule(rule) => {
                    assert_eq!(rule.plugins.names().collect::<Vec<_>>(), vec!["prometheus"]);
                }
                Payload::PluginMetadata(metadata) => {
                    assert_eq!(object.id, "http-logger");
                    assert_eq!(metadata, &json!({"log_format": {"host": "$host"}}));
                }
                other => panic!("unexpected payload {other:?}"),
            }
        }
    }

    #[test]
    fn test_gateway_proxy_metadata_must_be_object() {
        let harness = Harness::new();
        harness
            .cache
            .apply(proxy(json!({"pluginMetadata": {"http-logger": "text"}})));
        let err = harness
            .translate(&ObjectKey::new(ResourceKind::GatewayProxy, "default", "proxy"))
            .unwrap_err();
        assert!(matches!(
            err.reason,
            TranslationReason::Plugin(PluginError::NotAnObject { .. })
        ));
    }
}
