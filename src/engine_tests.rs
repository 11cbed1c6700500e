// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `engine.rs`

#[cfg(test)]
mod tests {
    use super::super::{translation_outcome, Engine};
    use crate::admin::{AdminApi, MemoryAdmin};
    use crate::cache::{ObjectKey, ResourceCache, ResourceKind};
    use crate::config::{ControllerConfig, DefaultGatewayGroupConfig};
    use crate::constants::GROUP_UNAVAILABLE_REQUEUE_SECS;
    use crate::crd::HTTPRoute;
    use crate::dataplane::{labels_for, ObjectKind};
    use crate::errors::{TranslationError, TranslationReason};
    use crate::leader::{lease_channel, Lease};
    use crate::status::Outcome;
    use crate::status_reasons::{
        REASON_BACKEND_NOT_FOUND, REASON_GATEWAY_GROUP_UNAVAILABLE, REASON_INVALID_KIND,
        REASON_RESOURCE_SYNC_ABORTED,
    };
    use crate::test_fixtures::{
        endpoint_slice, gateway, gateway_class, http_route, service, RecordingStatusWriter,
        CONTROLLER,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    const GROUP: &str = "default";

    struct Setup {
        engine: Arc<Engine>,
        cache: Arc<ResourceCache>,
        admin: Arc<MemoryAdmin>,
        writer: Arc<RecordingStatusWriter>,
    }

    fn config() -> ControllerConfig {
        ControllerConfig {
            controller_name: CONTROLLER.into(),
            worker_count: 2,
            default_gateway_group: Some(DefaultGatewayGroupConfig {
                endpoints: vec!["http://127.0.0.1:9180".into()],
                admin_key: None,
            }),
            ..ControllerConfig::default()
        }
    }

    fn setup_with(lease: Lease) -> Setup {
        let cache = Arc::new(ResourceCache::new());
        let admin = Arc::new(MemoryAdmin::new());
        let writer = Arc::new(RecordingStatusWriter::default());
        let engine = Arc::new(Engine::new(
            cache.clone(),
            admin.clone() as Arc<dyn AdminApi>,
            writer.clone(),
            lease,
            &config(),
        ));
        Setup {
            engine,
            cache,
            admin,
            writer,
        }
    }

    fn setup() -> Setup {
        setup_with(Lease::standalone())
    }

    fn web() -> ObjectKey {
        ObjectKey::new(ResourceKind::HTTPRoute, "default", "web")
    }

    /// Gateway `gw`, service `httpbin` with one ready endpoint and route `web`.
    fn seed(cache: &ResourceCache, proxy: Option<&str>) {
        cache.apply(gateway_class("apisix"));
        cache.apply(gateway("default", "gw", "apisix", proxy));
        seed_backend(cache);
        cache.apply(http_route(
            "default",
            "web",
            json!({
                "parentRefs": [{"name": "gw"}],
                "rules": [{"backendRefs": [{"name": "httpbin", "port": 80}]}],
            }),
        ));
    }

    fn seed_backend(cache: &ResourceCache) {
        cache.apply(service("default", "httpbin", &[("http", 80, 8080)]));
        cache.apply(endpoint_slice(
            "default",
            "httpbin-1",
            "httpbin",
            &[("http", 8080)],
            &[("10.0.1.1", true, "httpbin-a")],
        ));
    }

    /// Every `reason` found anywhere in a status document.
    fn reasons(status: &Value) -> Vec<String> {
        let mut found = Vec::new();
        collect_reasons(status, &mut found);
        found
    }

    fn collect_reasons(value: &Value, found: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                for (k, v) in map {
                    match (k.as_str(), v) {
                        ("reason", Value::String(reason)) => found.push(reason.clone()),
                        _ => collect_reasons(v, found),
                    }
                }
            }
            Value::Array(items) => items.iter().for_each(|v| collect_reasons(v, found)),
            _ => {}
        }
    }

    #[test]
    fn test_translation_outcome_reasons() {
        let err = |reason| TranslationError {
            source_key: web(),
            reason,
        };
        let missing = translation_outcome(&err(TranslationReason::ServiceNotFound {
            namespace: "default".into(),
            name: "httpbin".into(),
        }));
        assert!(matches!(missing, Outcome::SyncFailed { ref reason, .. } if reason == REASON_BACKEND_NOT_FOUND));

        let kind = translation_outcome(&err(TranslationReason::UnsupportedBackend {
            kind: "Bucket".into(),
            name: "assets".into(),
        }));
        assert!(matches!(kind, Outcome::SyncFailed { ref reason, .. } if reason == REASON_INVALID_KIND));

        let other = translation_outcome(&err(TranslationReason::InvalidField {
            field: "timeout".into(),
            message: "bad".into(),
        }));
        assert!(matches!(other, Outcome::SyncFailed { ref reason, .. } if reason == REASON_RESOURCE_SYNC_ABORTED));
    }

    #[tokio::test]
    async fn test_reconcile_pushes_objects_and_reports_status() {
        let s = setup();
        seed(&s.cache, None);

        assert_eq!(s.engine.reconcile(&web()).await, None);
        assert!(!s.admin.ids(GROUP, ObjectKind::Route).is_empty());
        assert!(!s.admin.ids(GROUP, ObjectKind::Upstream).is_empty());

        let status = s.writer.last(&web()).expect("route status written");
        let parents = status["parents"].as_array().expect("parents");
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0]["controllerName"], CONTROLLER);
    }

    #[tokio::test]
    async fn test_second_reconcile_makes_no_admin_mutations() {
        let s = setup();
        seed(&s.cache, None);
        let _ = s.engine.reconcile(&web()).await;
        s.admin.clear_calls();
        let patches = s.writer.patches().len();

        let _ = s.engine.reconcile(&web()).await;
        assert_eq!(s.admin.mutation_count(), 0);
        assert_eq!(s.writer.patches().len(), patches, "unchanged status is not rewritten");
    }

    #[tokio::test]
    async fn test_translation_failure_keeps_previous_configuration() {
        let s = setup();
        seed(&s.cache, None);
        let _ = s.engine.reconcile(&web()).await;
        let routes = s.admin.ids(GROUP, ObjectKind::Route);
        s.admin.clear_calls();

        s.cache.apply(http_route(
            "default",
            "web",
            json!({
                "parentRefs": [{"name": "gw"}],
                "rules": [{"backendRefs": [{"name": "missing", "port": 80}]}],
            }),
        ));
        let _ = s.engine.reconcile(&web()).await;

        assert_eq!(s.admin.mutation_count(), 0);
        assert_eq!(s.admin.ids(GROUP, ObjectKind::Route), routes);
        let status = s.writer.last(&web()).expect("status written");
        assert!(reasons(&status).contains(&REASON_BACKEND_NOT_FOUND.to_string()));
    }

    #[tokio::test]
    async fn test_unavailable_group_requeues_and_reports() {
        let s = setup();
        seed(&s.cache, Some("missing-proxy"));

        let requeue = s.engine.reconcile(&web()).await;
        assert_eq!(requeue, Some(Duration::from_secs(GROUP_UNAVAILABLE_REQUEUE_SECS)));
        assert!(s.admin.calls().is_empty());
        let status = s.writer.last(&web()).expect("status written");
        assert!(reasons(&status).contains(&REASON_GATEWAY_GROUP_UNAVAILABLE.to_string()));
    }

    #[tokio::test]
    async fn test_deleted_root_removes_its_objects() {
        let s = setup();
        seed(&s.cache, None);
        let _ = s.engine.reconcile(&web()).await;
        assert!(s.admin.len(GROUP) > 0);

        s.cache.delete::<HTTPRoute>("default", "web");
        let _ = s.engine.reconcile(&web()).await;
        assert!(s.admin.ids(GROUP, ObjectKind::Route).is_empty());
        assert!(s.admin.ids(GROUP, ObjectKind::Upstream).is_empty());
    }

    #[tokio::test]
    async fn test_on_change_enqueues_affected_roots() {
        let s = setup();
        seed(&s.cache, None);
        s.engine.on_change(&web());
        assert_eq!(s.engine.queue().len(), 1);

        let _ = s.engine.queue().next().await;
        s.engine.queue().done(&web());
        s.engine
            .on_change(&ObjectKey::new(ResourceKind::Service, "default", "httpbin"));
        assert_eq!(s.engine.queue().len(), 1);
        assert_eq!(s.engine.queue().next().await, Some(web()));
    }

    #[tokio::test]
    async fn test_enqueue_all_queues_every_root() {
        let s = setup();
        seed(&s.cache, None);
        s.engine.enqueue_all();
        // Gateway and route; services are not roots.
        assert_eq!(s.engine.queue().len(), 2);
    }

    #[tokio::test]
    async fn test_follower_makes_no_admin_calls() {
        let (handle, lease) = lease_channel(false);
        let s = setup_with(lease);
        seed(&s.cache, None);

        let _ = s.engine.reconcile(&web()).await;
        assert_eq!(s.admin.mutation_count(), 0);
        assert!(s.writer.patches().is_empty());

        handle.set(true);
        let _ = s.engine.reconcile(&web()).await;
        assert!(!s.admin.ids(GROUP, ObjectKind::Route).is_empty());
    }

    #[tokio::test]
    async fn test_resync_all_reclaims_orphans() {
        let s = setup();
        seed(&s.cache, None);
        let _ = s.engine.reconcile(&web()).await;

        let gone = ObjectKey::new(ResourceKind::HTTPRoute, "default", "deleted-while-down");
        s.admin.insert(
            GROUP,
            ObjectKind::Route,
            "orphan",
            json!({"id": "orphan", "labels": labels_for(&gone)}),
        );
        s.engine.resync_all().await;

        assert!(s.admin.get(GROUP, ObjectKind::Route, "orphan").is_none());
        assert!(!s.admin.ids(GROUP, ObjectKind::Route).is_empty());
    }

    #[tokio::test]
    async fn test_run_reconciles_and_stops_on_shutdown() {
        let s = setup();
        seed(&s.cache, None);
        for kind in ResourceKind::ALL {
            s.cache.mark_synced(kind);
        }

        let running = tokio::spawn(Arc::clone(&s.engine).run());
        s.engine.on_change(&web());

        let pushed = async {
            while s.admin.ids(GROUP, ObjectKind::Route).is_empty() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), pushed)
            .await
            .expect("route pushed by a worker");

        s.engine.shutdown();
        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("engine stops")
            .expect("engine task");
        assert!(s.engine.queue().is_closed());
    }
}
