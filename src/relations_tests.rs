// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `relations.rs`

#[cfg(test)]
mod tests {
    use super::super::Relations;
    use crate::cache::{key_of, CachedKind, ObjectKey, ResourceCache, ResourceKind};
    use crate::crd::{ApisixUpstream, HTTPRoute, HTTPRoutePolicy};
    use crate::test_fixtures::{
        apisix_route, endpoint_slice, gateway, gateway_class, gateway_proxy, http_route, ingress,
        ingress_class, object, pod, secret, service,
    };
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    struct World {
        cache: Arc<ResourceCache>,
        relations: Relations,
    }

    impl World {
        fn new() -> Self {
            let cache = Arc::new(ResourceCache::new());
            let relations = Relations::new(cache.clone(), "apisix");
            Self { cache, relations }
        }

        /// Apply like a watcher would and return the affected roots.
        fn apply<K: CachedKind>(&self, obj: K) -> BTreeSet<ObjectKey> {
            let key = key_of(&obj);
            self.cache.apply(obj);
            self.relations.on_change(&key)
        }

        fn delete<K: CachedKind>(&self, namespace: &str, name: &str) -> BTreeSet<ObjectKey> {
            let key = ObjectKey::new(K::KIND, namespace, name);
            self.cache.delete::<K>(namespace, name);
            self.relations.on_change(&key)
        }
    }

    fn web_route() -> HTTPRoute {
        http_route(
            "default",
            "web",
            json!({
                "parentRefs": [{"name": "gw"}],
                "rules": [{"backendRefs": [{"name": "httpbin", "port": 80}]}],
            }),
        )
    }

    fn key(kind: ResourceKind, name: &str) -> ObjectKey {
        ObjectKey::new(kind, "default", name)
    }

    #[test]
    fn test_root_change_returns_itself() {
        let world = World::new();
        let roots = world.apply(web_route());
        assert_eq!(roots, BTreeSet::from([key(ResourceKind::HTTPRoute, "web")]));
    }

    #[test]
    fn test_deleted_root_is_still_returned() {
        let world = World::new();
        let _ = world.apply(web_route());
        let roots = world.delete::<HTTPRoute>("default", "web");
        assert_eq!(roots, BTreeSet::from([key(ResourceKind::HTTPRoute, "web")]));

        let roots = world.apply(service("default", "httpbin", &[("http", 80, 8080)]));
        assert!(roots.is_empty(), "a deleted route no longer references the service");
    }

    #[test]
    fn test_endpoint_and_pod_changes_reach_routes() {
        let world = World::new();
        let _ = world.apply(web_route());
        let _ = world.apply(service("default", "httpbin", &[("http", 80, 8080)]));
        let _ = world.apply(pod("default", "httpbin-a", &[]));

        let roots = world.apply(endpoint_slice(
            "default",
            "httpbin-1",
            "httpbin",
            &[("http", 8080)],
            &[("10.0.0.1", true, "httpbin-a")],
        ));
        assert_eq!(roots, BTreeSet::from([key(ResourceKind::HTTPRoute, "web")]));

        let roots = world.apply(pod("default", "httpbin-a", &[("version", "v2")]));
        assert_eq!(roots, BTreeSet::from([key(ResourceKind::HTTPRoute, "web")]));

        let roots = world.apply(pod("default", "unrelated", &[]));
        assert!(roots.is_empty());
    }

    #[test]
    fn test_children_before_parents() {
        let world = World::new();
        // Route arrives before its gateway and class.
        let _ = world.apply(web_route());
        let roots = world.apply(gateway("default", "gw", "apisix", Some("proxy")));
        assert!(roots.contains(&key(ResourceKind::HTTPRoute, "web")));
        assert!(roots.contains(&key(ResourceKind::Gateway, "gw")));

        let roots = world.apply(gateway_class("apisix"));
        assert!(roots.contains(&key(ResourceKind::Gateway, "gw")));
        assert!(roots.contains(&key(ResourceKind::HTTPRoute, "web")));
    }

    #[test]
    fn test_gateway_proxy_change_reaches_every_routed_object() {
        let world = World::new();
        let _ = world.apply(gateway_class("apisix"));
        let _ = world.apply(gateway("default", "gw", "apisix", Some("proxy")));
        let _ = world.apply(web_route());
        let _ = world.apply(ingress_class("apisix", Some(("default", "proxy"))));
        let _ = world.apply(apisix_route("default", "legacy", json!({"http": []})));
        let _ = world.apply(ingress("default", "site", "apisix", json!([])));

        let roots = world.apply(gateway_proxy("default", "proxy", &["http://a:9180"], "k"));
        for expected in [
            key(ResourceKind::GatewayProxy, "proxy"),
            key(ResourceKind::Gateway, "gw"),
            key(ResourceKind::HTTPRoute, "web"),
            key(ResourceKind::ApisixRoute, "legacy"),
            key(ResourceKind::Ingress, "site"),
        ] {
            assert!(roots.contains(&expected), "{expected} should be resynced");
        }
    }

    #[test]
    fn test_secret_reaches_tls_ingress() {
        let world = World::new();
        let mut site = ingress("default", "site", "apisix", json!([]));
        if let Some(spec) = site.spec.as_mut() {
            spec.tls = Some(vec![object(json!({"hosts": ["a.example.com"], "secretName": "cert"}))]);
        }
        let _ = world.apply(site);

        let roots = world.apply(secret("default", "cert", &[("tls.crt", "x"), ("tls.key", "y")]));
        assert_eq!(roots, BTreeSet::from([key(ResourceKind::Ingress, "site")]));
    }

    #[test]
    fn test_policy_retarget_reaches_old_and_new_targets() {
        let world = World::new();
        let _ = world.apply(web_route());
        let _ = world.apply(http_route("default", "api", json!({"parentRefs": [{"name": "gw"}]})));

        let policy = |target: &str| -> HTTPRoutePolicy {
            object(json!({
                "apiVersion": "apisix.apache.org/v1alpha1",
                "kind": "HTTPRoutePolicy",
                "metadata": {"name": "p", "namespace": "default"},
                "spec": {"targetRefs": [{"group": "gateway.networking.k8s.io", "kind": "HTTPRoute", "name": target}]},
            }))
        };
        let roots = world.apply(policy("web"));
        assert_eq!(roots, BTreeSet::from([key(ResourceKind::HTTPRoute, "web")]));

        let roots = world.apply(policy("api"));
        assert_eq!(
            roots,
            BTreeSet::from([key(ResourceKind::HTTPRoute, "api"), key(ResourceKind::HTTPRoute, "web")])
        );

        let roots = world.delete::<HTTPRoutePolicy>("default", "p");
        assert_eq!(roots, BTreeSet::from([key(ResourceKind::HTTPRoute, "api")]));
    }

    #[test]
    fn test_apisix_upstream_reaches_routes_of_its_service() {
        let world = World::new();
        let _ = world.apply(apisix_route(
            "default",
            "legacy",
            json!({"http": [{"name": "r", "match": {"paths": ["/"]},
                             "backends": [{"serviceName": "httpbin", "servicePort": 80}]}]}),
        ));
        let upstream: ApisixUpstream = object(json!({
            "apiVersion": "apisix.apache.org/v2",
            "kind": "ApisixUpstream",
            "metadata": {"name": "httpbin", "namespace": "default"},
            "spec": {"retries": 3},
        }));
        let roots = world.apply(upstream);
        assert_eq!(roots, BTreeSet::from([key(ResourceKind::ApisixRoute, "legacy")]));

        let roots = world.delete::<ApisixUpstream>("default", "httpbin");
        assert_eq!(roots, BTreeSet::from([key(ResourceKind::ApisixRoute, "legacy")]));
    }

    #[test]
    fn test_on_change_is_idempotent() {
        let world = World::new();
        let _ = world.apply(web_route());
        let route_key = key(ResourceKind::HTTPRoute, "web");
        let first = world.relations.on_change(&route_key);
        let second = world.relations.on_change(&route_key);
        assert_eq!(first, second);
        assert_eq!(
            world.relations.referrers(&key(ResourceKind::Service, "httpbin")),
            BTreeSet::from([route_key])
        );
    }
}
