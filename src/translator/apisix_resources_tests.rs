// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `ApisixTls`, `ApisixConsumer`, `ApisixPluginConfig` and
//! `ApisixClusterConfig` translation

#[cfg(test)]
mod tests {
    use crate::cache::{ObjectKey, ResourceKind};
    use crate::crd::{ApisixClusterConfig, ApisixConsumer, ApisixPluginConfig, ApisixTls};
    use crate::dataplane::{ObjectKind, Payload};
    use crate::errors::TranslationReason;
    use crate::test_fixtures::{object, secret, Harness};
    use serde_json::{json, Value};

    fn apisix<K: serde::de::DeserializeOwned>(kind: &str, name: &str, spec: Value) -> K {
        object(json!({
            "apiVersion": "apisix.apache.org/v2",
            "kind": kind,
            "metadata": {"name": name, "namespace": "default"},
            "spec": spec,
        }))
    }

    #[test]
    fn test_tls_with_client_ca() {
        let harness = Harness::new();
        harness.cache.apply(secret(
            "certs",
            "site",
            &[("tls.crt", "CERT"), ("tls.key", "KEY")],
        ));
        harness
            .cache
            .apply(secret("default", "client-ca", &[("ca.crt", "CA")]));
        harness.cache.apply(apisix::<ApisixTls>(
            "ApisixTls",
            "site",
            json!({
                "hosts": ["a.example.com", "*.example.com"],
                "secret": {"name": "site", "namespace": "certs"},
                "client": {"caSecret": {"name": "client-ca"}, "depth": 2}
            }),
        ));

        let objects = harness
            .translate(&ObjectKey::new(ResourceKind::ApisixTls, "default", "site"))
            .unwrap();
        assert_eq!(objects.len(), 1);
        let Payload::Ssl(ssl) = &objects[0].payload else {
            panic!("expected an SSL object");
        };
        assert_eq!(ssl.cert, "CERT");
        assert_eq!(ssl.snis, vec!["a.example.com", "*.example.com"]);
        let client = ssl.client.as_ref().unwrap();
        assert_eq!(client.ca, "CA");
        assert_eq!(client.depth, Some(2));
    }

    #[test]
    fn test_tls_secret_defaults_to_own_namespace() {
        let harness = Harness::new();
        harness.cache.apply(apisix::<ApisixTls>(
            "ApisixTls",
            "site",
            json!({"hosts": ["a.example.com"], "secret": {"name": "site"}}),
        ));
        let err = harness
            .translate(&ObjectKey::new(ResourceKind::ApisixTls, "default", "site"))
            .unwrap_err();
        assert!(matches!(
            err.reason,
            TranslationReason::SecretNotFound { ref namespace, .. } if namespace == "default"
        ));
    }

    #[test]
    fn test_consumer_from_secret_and_inline_values() {
        let harness = Harness::new();
        harness
            .cache
            .apply(secret("default", "jack-key", &[("key", "auth-one")]));
        harness.cache.apply(apisix::<ApisixConsumer>(
            "ApisixConsumer",
            "jack-smith",
            json!({"authParameter": {
                "keyAuth": {"secretRef": "jack-key"},
                "basicAuth": {"value": {"username": "jack", "password": "secret"}}
            }}),
        ));

        let objects = harness
            .translate(&ObjectKey::new(ResourceKind::ApisixConsumer, "default", "jack-smith"))
            .unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].kind, ObjectKind::Consumer);
        assert_eq!(objects[0].id, "default_jack_smith");
        let Payload::Consumer(consumer) = &objects[0].payload else {
            panic!("expected a consumer");
        };
        assert_eq!(consumer.username, "default_jack_smith");
        assert_eq!(consumer.plugins.get("key-auth"), Some(&json!({"key": "auth-one"})));
        assert_eq!(
            consumer.plugins.get("basic-auth"),
            Some(&json!({"username": "jack", "password": "secret"}))
        );
    }

    #[test]
    fn test_consumer_without_credentials() {
        let harness = Harness::new();
        harness.cache.apply(apisix::<ApisixConsumer>(
            "ApisixConsumer",
            "empty",
            json!({"authParameter": {"keyAuth": {}}}),
        ));
        let err = harness
            .translate(&ObjectKey::new(ResourceKind::ApisixConsumer, "default", "empty"))
            .unwrap_err();
        assert!(matches!(err.reason, TranslationReason::InvalidField { .. }));
    }

    #[test]
    fn test_plugin_config_keeps_enabled_plugins() {
        let harness = Harness::new();
        harness.cache.apply(apisix::<ApisixPluginConfig>(
            "ApisixPluginConfig",
            "shared",
            json!({"plugins": [
                {"name": "cors", "enable": true, "config": {}},
                {"name": "gzip", "enable": false, "config": {}}
            ]}),
        ));
        let objects = harness
            .translate(&ObjectKey::new(ResourceKind::ApisixPluginConfig, "default", "shared"))
            .unwrap();
        let Payload::PluginConfig(config) = &objects[0].payload else {
            panic!("expected a plugin config");
        };
        assert_eq!(config.plugins.names().collect::<Vec<_>>(), vec!["cors"]);
    }

    #[test]
    fn test_cluster_config_monitoring() {
        let harness = Harness::new();
        let key = ObjectKey::cluster(ResourceKind::ApisixClusterConfig, "default");
        let config = |spec: Value| -> ApisixClusterConfig {
            object(json!({
                "apiVersion": "apisix.apache.org/v2",
                "kind": "ApisixClusterConfig",
                "metadata": {"name": "default"},
                "spec": spec,
            }))
        };

        harness
            .cache
            .apply(config(json!({"monitoring": {"prometheus": {"enable": false}}})));
        assert!(harness.translate(&key).unwrap().is_empty());

        harness.cache.apply(config(json!({"monitoring": {
            "prometheus": {"enable": true},
            "skywalking": {"enable": true}
        }})));
        let objects = harness.translate(&key).unwrap();
        assert_eq!(objects.len(), 1);
        let Payload::GlobalRule(rule) = &objects[0].payload else {
            panic!("expected a global rule");
        };
        assert_eq!(rule.plugins.get("prometheus"), Some(&json!({})));
        assert_eq!(rule.plugins.get("skywalking"), Some(&json!({"sample_ratio": 1.0})));
    }
}
