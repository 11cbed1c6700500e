// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for upstream resolution and traffic splitting

#[cfg(test)]
mod tests {
    use super::super::{
        has_live_backend, resolve_upstream, traffic_split, BackendSpec, PortRef, WeightedUpstream,
    };
    use crate::cache::{ObjectKey, ResourceCache, ResourceKind};
    use crate::crd::{ApisixUpstream, BackendTrafficPolicy, ResolveGranularity};
    use crate::dataplane::{Payload, UpstreamPayload};
    use crate::errors::TranslationReason;
    use crate::test_fixtures::{endpoint_slice, object, pod, service, Harness};
    use crate::translator::Translation;
    use serde_json::json;
    use std::sync::Arc;

    fn spec(port: PortRef, subset: Option<&str>, granularity: ResolveGranularity) -> BackendSpec {
        BackendSpec {
            namespace: "default".into(),
            service: "web".into(),
            port,
            subset: subset.map(str::to_string),
            granularity,
            grpc: false,
        }
    }

    fn resolve(harness: &Harness, backend: &BackendSpec) -> Result<UpstreamPayload, TranslationReason> {
        let root = ObjectKey::new(ResourceKind::HTTPRoute, "default", "r");
        let mut out = Translation::new(&root, "default");
        let id = resolve_upstream(&harness.ctx(), backend, &mut out).map_err(|e| e.reason)?;
        let objects = out.into_objects();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].id, id);
        match &objects[0].payload {
            Payload::Upstream(upstream) => Ok(upstream.clone()),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    fn populated() -> Harness {
        let harness = Harness::new();
        let cache: &Arc<ResourceCache> = &harness.cache;
        cache.apply(service("default", "web", &[("http", 80, 8080)]));
        cache.apply(endpoint_slice(
            "default",
            "web-abc",
            "web",
            &[("http", 8080)],
            &[
                ("10.0.0.2", true, "web-2"),
                ("10.0.0.1", true, "web-1"),
                ("10.0.0.3", false, "web-3"),
            ],
        ));
        cache.apply(pod("default", "web-1", &[("version", "v1")]));
        cache.apply(pod("default", "web-2", &[("version", "v2")]));
        harness
    }

    #[test]
    fn test_endpoint_granularity_uses_ready_endpoints() {
        let harness = populated();
        let upstream = resolve(
            &harness,
            &spec(PortRef::Number(80), None, ResolveGranularity::Endpoint),
        )
        .unwrap();

        let hosts: Vec<&str> = upstream.nodes.iter().map(|n| n.host.as_str()).collect();
        assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.2"]);
        assert!(upstream.nodes.iter().all(|n| n.port == 8080 && n.weight == 100));
        assert_eq!(upstream.labels["k8s/kind"], "Service");
    }

    #[test]
    fn test_service_granularity_uses_cluster_ip() {
        let harness = populated();
        let upstream = resolve(
            &harness,
            &spec(PortRef::Name("http".into()), None, ResolveGranularity::Service),
        )
        .unwrap();
        assert_eq!(upstream.nodes.len(), 1);
        assert_eq!(upstream.nodes[0].host, "10.96.0.10");
        assert_eq!(upstream.nodes[0].port, 80);
    }

    #[test]
    fn test_same_tuple_same_id_regardless_of_port_form() {
        let harness = populated();
        let by_number = resolve(&harness, &spec(PortRef::Number(80), None, ResolveGranularity::Endpoint)).unwrap();
        let by_name = resolve(&harness, &spec(PortRef::Name("http".into()), None, ResolveGranularity::Endpoint)).unwrap();
        assert_eq!(by_number.id, by_name.id);
        assert_eq!(by_number, by_name);
    }

    #[test]
    fn test_subset_filters_by_pod_labels() {
        let harness = populated();
        harness.cache.apply(object::<ApisixUpstream>(json!({
            "apiVersion": "apisix.apache.org/v2",
            "kind": "ApisixUpstream",
            "metadata": {"name": "web", "namespace": "default"},
            "spec": {"subsets": [
                {"name": "v2", "labels": {"version": "v2"}},
                {"name": "v9", "labels": {"version": "v9"}}
            ]}
        })));

        let v2 = resolve(&harness, &spec(PortRef::Number(80), Some("v2"), ResolveGranularity::Endpoint)).unwrap();
        assert_eq!(v2.nodes.len(), 1);
        assert_eq!(v2.nodes[0].host, "10.0.0.2");

        let v9 = resolve(&harness, &spec(PortRef::Number(80), Some("v9"), ResolveGranularity::Endpoint)).unwrap();
        assert!(v9.nodes.is_empty(), "subset without matches yields zero nodes");

        let unknown = resolve(&harness, &spec(PortRef::Number(80), Some("v3"), ResolveGranularity::Endpoint));
        assert!(matches!(unknown, Err(TranslationReason::SubsetNotFound { .. })));
    }

    #[test]
    fn test_missing_service_and_port() {
        let harness = Harness::new();
        assert!(matches!(
            resolve(&harness, &spec(PortRef::Number(80), None, ResolveGranularity::Endpoint)),
            Err(TranslationReason::ServiceNotFound { .. })
        ));
        harness.cache.apply(service("default", "web", &[("http", 80, 8080)]));
        assert!(matches!(
            resolve(&harness, &spec(PortRef::Number(81), None, ResolveGranularity::Endpoint)),
            Err(TranslationReason::ServicePortNotFound { .. })
        ));
    }

    #[test]
    fn test_overlay_order_and_absent_fields() {
        let harness = populated();
        let plain = resolve(&harness, &spec(PortRef::Number(80), None, ResolveGranularity::Endpoint)).unwrap();
        assert!(plain.scheme.is_none());
        assert!(plain.retries.is_none());

        harness.cache.apply(object::<BackendTrafficPolicy>(json!({
            "apiVersion": "apisix.apache.org/v1alpha1",
            "kind": "BackendTrafficPolicy",
            "metadata": {"name": "btp", "namespace": "default"},
            "spec": {
                "targetRefs": [{"kind": "Service", "name": "web"}],
                "scheme": "https",
                "retries": 1,
                "timeout": {"connect": "2s"}
            }
        })));
        harness.cache.apply(object::<ApisixUpstream>(json!({
            "apiVersion": "apisix.apache.org/v2",
            "kind": "ApisixUpstream",
            "metadata": {"name": "web", "namespace": "default"},
            "spec": {
                "retries": 5,
                "portLevelSettings": [{"port": 80, "scheme": "grpcs"}]
            }
        })));

        let upstream = resolve(&harness, &spec(PortRef::Number(80), None, ResolveGranularity::Endpoint)).unwrap();
        assert_eq!(upstream.scheme.as_deref(), Some("grpcs"));
        assert_eq!(upstream.retries, Some(5));
        assert_eq!(upstream.timeout.unwrap().connect, Some(2.0));
    }

    #[test]
    fn test_traffic_split_shapes() {
        let two = [
            WeightedUpstream { upstream_id: "a".into(), weight: 50 },
            WeightedUpstream { upstream_id: "b".into(), weight: 50 },
        ];
        assert_eq!(
            traffic_split(&two).unwrap(),
            json!({"rules": [{"weighted_upstreams": [
                {"upstream_id": "b", "weight": 50},
                {"weight": 50}
            ]}]})
        );

        let zero = [
            WeightedUpstream { upstream_id: "a".into(), weight: 100 },
            WeightedUpstream { upstream_id: "b".into(), weight: 0 },
        ];
        let split = traffic_split(&zero).unwrap();
        assert_eq!(split["rules"][0]["weighted_upstreams"][0]["weight"], 0);
        assert!(has_live_backend(&zero));

        assert!(traffic_split(&two[..1]).is_none());
        assert!(!has_live_backend(&[]));
    }
}
