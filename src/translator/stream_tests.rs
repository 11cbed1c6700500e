// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for stream route translation

#[cfg(test)]
mod tests {
    use crate::cache::{ObjectKey, ResourceKind};
    use crate::crd::{Gateway, TCPRoute, TLSRoute};
    use crate::dataplane::{DesiredObject, Payload, StreamRoutePayload};
    use crate::test_fixtures::{gateway_class, object, Harness};
    use serde_json::json;

    fn stream_gateway(harness: &Harness) {
        harness.cache.apply(gateway_class("apisix"));
        harness.cache.apply(object::<Gateway>(json!({
            "apiVersion": "gateway.networking.k8s.io/v1",
            "kind": "Gateway",
            "metadata": {"name": "gw", "namespace": "default"},
            "spec": {
                "gatewayClassName": "apisix",
                "listeners": [
                    {"name": "tcp", "port": 9000, "protocol": "TCP"},
                    {"name": "tcp-alt", "port": 9001, "protocol": "TCP"},
                    {"name": "tls", "port": 9443, "protocol": "TLS", "tls": {"mode": "Passthrough"}}
                ]
            }
        })));
    }

    fn stream_routes(objects: &[DesiredObject]) -> Vec<&StreamRoutePayload> {
        objects
            .iter()
            .filter_map(|o| match &o.payload {
                Payload::StreamRoute(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_tcp_route_binds_each_tcp_listener() {
        let harness = Harness::new().with_backend("db");
        stream_gateway(&harness);
        harness.cache.apply(object::<TCPRoute>(json!({
            "apiVersion": "gateway.networking.k8s.io/v1alpha2",
            "kind": "TCPRoute",
            "metadata": {"name": "t", "namespace": "default"},
            "spec": {"parentRefs": [{"name": "gw"}], "rules": [{"backendRefs": [{"name": "db", "port": 80}]}]}
        })));

        let objects = harness
            .translate(&ObjectKey::new(ResourceKind::TCPRoute, "default", "t"))
            .unwrap();
        let streams = stream_routes(&objects);
        let mut ports: Vec<i32> = streams.iter().filter_map(|s| s.server_port).collect();
        ports.sort_unstable();
        assert_eq!(ports, vec![9000, 9001]);
        assert!(streams.iter().all(|s| s.sni.is_none()));
        assert_eq!(streams[0].upstream_id, streams[1].upstream_id);
    }

    #[test]
    fn test_tcp_route_section_name_limits_listeners() {
        let harness = Harness::new().with_backend("db");
        stream_gateway(&harness);
        harness.cache.apply(object::<TCPRoute>(json!({
            "apiVersion": "gateway.networking.k8s.io/v1alpha2",
            "kind": "TCPRoute",
            "metadata": {"name": "t", "namespace": "default"},
            "spec": {"parentRefs": [{"name": "gw", "sectionName": "tcp-alt"}],
                     "rules": [{"backendRefs": [{"name": "db", "port": 80}]}]}
        })));
        let objects = harness
            .translate(&ObjectKey::new(ResourceKind::TCPRoute, "default", "t"))
            .unwrap();
        let streams = stream_routes(&objects);
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].server_port, Some(9001));
    }

    #[test]
    fn test_tls_route_one_stream_route_per_hostname() {
        let harness = Harness::new().with_backend("secure");
        stream_gateway(&harness);
        harness.cache.apply(object::<TLSRoute>(json!({
            "apiVersion": "gateway.networking.k8s.io/v1alpha2",
            "kind": "TLSRoute",
            "metadata": {"name": "s", "namespace": "default"},
            "spec": {
                "parentRefs": [{"name": "gw"}],
                "hostnames": ["a.example.com", "b.example.com"],
                "rules": [{"backendRefs": [{"name": "secure", "port": 80}]}]
            }
        })));
        let objects = harness
            .translate(&ObjectKey::new(ResourceKind::TLSRoute, "default", "s"))
            .unwrap();
        let streams = stream_routes(&objects);
        let mut snis: Vec<&str> = streams.iter().filter_map(|s| s.sni.as_deref()).collect();
        snis.sort_unstable();
        assert_eq!(snis, vec!["a.example.com", "b.example.com"]);
        assert!(streams.iter().all(|s| s.server_port == Some(9443)));
    }
}
