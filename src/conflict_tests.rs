// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `HTTPRoutePolicy` arbitration

#[cfg(test)]
mod tests {
    use super::super::{apply_policy, policy_attachments, resolve_target};
    use crate::cache::{ObjectKey, ResourceCache, ResourceKind};
    use crate::crd::{HTTPRoute, HTTPRoutePolicy};
    use crate::dataplane::RoutePayload;
    use crate::test_fixtures::{http_route, object};
    use kube::ResourceExt;
    use serde_json::{json, Value};

    fn policy(name: &str, priority: Option<i64>, section: Option<&str>, created: &str) -> HTTPRoutePolicy {
        let mut target = json!({"group": "gateway.networking.k8s.io", "kind": "HTTPRoute", "name": "web"});
        if let Some(section) = section {
            target["sectionName"] = json!(section);
        }
        let mut spec = json!({
            "targetRefs": [target],
            "vars": [["http_x_policy", "==", name]],
        });
        if let Some(priority) = priority {
            spec["priority"] = json!(priority);
        }
        object(json!({
            "apiVersion": "apisix.apache.org/v1alpha1",
            "kind": "HTTPRoutePolicy",
            "metadata": {"name": name, "namespace": "default", "creationTimestamp": created},
            "spec": spec,
        }))
    }

    fn web_key() -> ObjectKey {
        ObjectKey::new(ResourceKind::HTTPRoute, "default", "web")
    }

    fn cache_with_route() -> ResourceCache {
        let cache = ResourceCache::new();
        cache.apply(http_route("default", "web", json!({"rules": [{"name": "api"}]})));
        cache
    }

    #[test]
    fn test_equal_priority_conflicts_all() {
        let cache = cache_with_route();
        cache.apply(policy("p1", Some(10), None, "2025-01-01T00:00:00Z"));
        cache.apply(policy("p2", Some(10), None, "2025-01-02T00:00:00Z"));

        let resolution = resolve_target(&cache, &web_key());
        assert!(resolution.effective(None).is_none());
        assert_eq!(resolution.section(None).unwrap().conflicted.len(), 2);

        for name in ["p1", "p2"] {
            let p = cache.get::<HTTPRoutePolicy>("default", name).unwrap();
            let attachments = policy_attachments(&cache, &p);
            assert_eq!(attachments.len(), 1);
            assert!(!attachments[0].accepted);
        }
    }

    #[test]
    fn test_higher_priority_wins() {
        let cache = cache_with_route();
        cache.apply(policy("p1", Some(10), None, "2025-01-01T00:00:00Z"));
        cache.apply(policy("p2", Some(20), None, "2025-01-02T00:00:00Z"));

        let resolution = resolve_target(&cache, &web_key());
        assert_eq!(resolution.effective(None).unwrap().name_any(), "p2");

        let loser = cache.get::<HTTPRoutePolicy>("default", "p1").unwrap();
        let attachment = &policy_attachments(&cache, &loser)[0];
        assert!(!attachment.accepted);
        assert!(attachment.message.contains("p2"));
    }

    #[test]
    fn test_section_policy_shadows_whole_route() {
        let cache = cache_with_route();
        cache.apply(policy("route-wide", Some(5), None, "2025-01-01T00:00:00Z"));
        cache.apply(policy("api-only", Some(1), Some("api"), "2025-01-01T00:00:00Z"));

        let resolution = resolve_target(&cache, &web_key());
        assert_eq!(resolution.effective(Some("api")).unwrap().name_any(), "api-only");
        assert_eq!(
            resolution.effective(Some("other")).unwrap().name_any(),
            "route-wide"
        );
        assert_eq!(resolution.effective(None).unwrap().name_any(), "route-wide");
    }

    #[test]
    fn test_deleted_target_has_no_ancestors() {
        let cache = cache_with_route();
        cache.apply(policy("p1", Some(10), None, "2025-01-01T00:00:00Z"));
        cache.delete::<HTTPRoute>("default", "web");

        let p = cache.get::<HTTPRoutePolicy>("default", "p1").unwrap();
        assert!(policy_attachments(&cache, &p).is_empty());
    }

    #[test]
    fn test_apply_policy_merges_priority_and_vars() {
        let p = policy("p1", Some(7), None, "2025-01-01T00:00:00Z");
        let mut route = RoutePayload {
            vars: vec![json!(["uri", "~~", "^/a"])],
            ..RoutePayload::default()
        };
        apply_policy(&mut route, &p);

        assert_eq!(route.priority, Some(7));
        assert_eq!(route.vars.len(), 2);
        assert_eq!(route.vars[1], Value::Array(vec![json!("http_x_policy"), json!("=="), json!("p1")]));
    }
}
