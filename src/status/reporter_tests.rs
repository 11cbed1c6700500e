// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `status/reporter.rs`

#[cfg(test)]
mod tests {
    use super::super::{StatusReporter, StatusSettings};
    use crate::cache::{ObjectKey, ResourceKind};
    use crate::crd::{HTTPRoute, HTTPRoutePolicy};
    use crate::errors::StatusError;
    use crate::leader::{lease_channel, Lease};
    use crate::status::{Outcome, Outcomes};
    use crate::status_reasons::REASON_GATEWAY_GROUP_UNAVAILABLE;
    use crate::test_fixtures::{
        http_route, ingress, object, Harness, RecordingStatusWriter, CONTROLLER,
    };
    use serde_json::json;
    use std::sync::Arc;

    fn settings(addresses: &[&str]) -> StatusSettings {
        StatusSettings {
            enabled: true,
            controller_name: CONTROLLER.into(),
            addresses: addresses.iter().map(ToString::to_string).collect(),
        }
    }

    fn reporter(
        h: &Harness,
        lease: Lease,
        settings: StatusSettings,
    ) -> (StatusReporter, Arc<RecordingStatusWriter>) {
        let writer = Arc::new(RecordingStatusWriter::default());
        let reporter = StatusReporter::new(
            writer.clone(),
            lease,
            h.cache.clone(),
            h.router.clone(),
            settings,
        );
        (reporter, writer)
    }

    fn harness_with_route() -> Harness {
        let h = Harness::new().with_gateway();
        h.cache.apply(http_route(
            "default",
            "web",
            json!({"parentRefs": [{"name": "gw"}], "rules": [{}]}),
        ));
        h
    }

    fn web() -> ObjectKey {
        ObjectKey::new(ResourceKind::HTTPRoute, "default", "web")
    }

    fn policy(name: &str) -> HTTPRoutePolicy {
        object(json!({
            "apiVersion": "apisix.apache.org/v1alpha1",
            "kind": "HTTPRoutePolicy",
            "metadata": {"name": name, "namespace": "default", "generation": 2,
                         "creationTimestamp": "2025-01-01T00:00:00Z"},
            "spec": {
                "targetRefs": [{"group": "gateway.networking.k8s.io", "kind": "HTTPRoute", "name": "web"}],
                "priority": 1,
            },
        }))
    }

    #[tokio::test]
    async fn test_route_parents_are_written_once() {
        let h = harness_with_route();
        let (reporter, writer) = reporter(&h, Lease::standalone(), settings(&[]));

        let outcomes = Outcomes::single(Outcome::Synced);
        assert!(reporter.report(&web(), &outcomes).await.unwrap());
        assert!(!reporter.report(&web(), &outcomes).await.unwrap());

        let status = writer.last(&web()).unwrap();
        assert_eq!(status["parents"][0]["parentRef"]["name"], "gw");
        assert_eq!(status["parents"][0]["controllerName"], CONTROLLER);
        assert_eq!(status["parents"][0]["conditions"][0]["status"], "True");
        assert_eq!(writer.patches().len(), 1);
    }

    #[tokio::test]
    async fn test_changed_outcome_is_written_again() {
        let h = harness_with_route();
        let (reporter, writer) = reporter(&h, Lease::standalone(), settings(&[]));

        reporter
            .report(&web(), &Outcomes::single(Outcome::Synced))
            .await
            .unwrap();
        let failed = Outcomes::single(Outcome::failed(REASON_GATEWAY_GROUP_UNAVAILABLE, "no proxy"));
        assert!(reporter.report(&web(), &failed).await.unwrap());

        let status = writer.last(&web()).unwrap();
        assert_eq!(status["parents"][0]["conditions"][0]["reason"], REASON_GATEWAY_GROUP_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_status_matching_object_is_not_patched() {
        let h = harness_with_route();
        let (first, _) = reporter(&h, Lease::standalone(), settings(&[]));
        let outcomes = Outcomes::single(Outcome::Synced);
        let status = first.build(&web(), &outcomes).unwrap().unwrap();

        let mut route: HTTPRoute = (*h.cache.get::<HTTPRoute>("default", "web").unwrap()).clone();
        route.status = Some(serde_json::from_value(status).unwrap());
        h.cache.apply(route);

        let (second, writer) = reporter(&h, Lease::standalone(), settings(&[]));
        assert!(!second.report(&web(), &outcomes).await.unwrap());
        assert!(writer.patches().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_or_follower_writes_nothing() {
        let h = harness_with_route();
        let outcomes = Outcomes::single(Outcome::Synced);

        let mut disabled = settings(&[]);
        disabled.enabled = false;
        let (reporter_off, writer_off) = reporter(&h, Lease::standalone(), disabled);
        assert!(!reporter_off.report(&web(), &outcomes).await.unwrap());
        assert!(writer_off.patches().is_empty());

        let (handle, lease) = lease_channel(false);
        let (follower, writer) = reporter(&h, lease, settings(&[]));
        assert!(!follower.report(&web(), &outcomes).await.unwrap());
        assert!(writer.patches().is_empty());

        handle.set(true);
        assert!(follower.report(&web(), &outcomes).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_patch_is_retried_next_time() {
        let h = harness_with_route();
        let (reporter, writer) = reporter(&h, Lease::standalone(), settings(&[]));
        let outcomes = Outcomes::single(Outcome::Synced);

        writer.set_failing(true);
        assert!(matches!(
            reporter.report(&web(), &outcomes).await,
            Err(StatusError::Patch { .. })
        ));
        writer.set_failing(false);
        assert!(reporter.report(&web(), &outcomes).await.unwrap());
    }

    #[tokio::test]
    async fn test_policy_ancestors_follow_target() {
        let h = harness_with_route();
        h.cache.apply(policy("timeouts"));
        let (reporter, writer) = reporter(&h, Lease::standalone(), settings(&[]));
        let policy_key = ObjectKey::new(ResourceKind::HTTPRoutePolicy, "default", "timeouts");

        assert_eq!(reporter.report_policies(&web()).await.unwrap(), 1);
        let status = writer.last(&policy_key).unwrap();
        assert_eq!(status["ancestors"][0]["ancestorRef"]["name"], "web");
        assert_eq!(status["ancestors"][0]["conditions"][0]["status"], "True");
        assert_eq!(status["ancestors"][0]["conditions"][0]["observedGeneration"], 2);

        h.cache.delete::<HTTPRoute>("default", "web");
        assert_eq!(reporter.report_policies(&web()).await.unwrap(), 1);
        let status = writer.last(&policy_key).unwrap();
        assert_eq!(status["ancestors"], json!([]));
    }

    #[tokio::test]
    async fn test_ingress_load_balancer_needs_addresses() {
        let h = Harness::new();
        h.cache.apply(ingress("default", "web", "apisix", json!([])));
        let key = ObjectKey::new(ResourceKind::Ingress, "default", "web");
        let outcomes = Outcomes::single(Outcome::Synced);

        let (silent, writer) = reporter(&h, Lease::standalone(), settings(&[]));
        assert!(!silent.report(&key, &outcomes).await.unwrap());
        assert!(writer.patches().is_empty());

        let (publishing, writer) = reporter(&h, Lease::standalone(), settings(&["203.0.113.7"]));
        assert!(publishing.report(&key, &outcomes).await.unwrap());
        let status = writer.last(&key).unwrap();
        assert_eq!(status["loadBalancer"]["ingress"][0]["ip"], "203.0.113.7");
    }

    #[tokio::test]
    async fn test_deleted_root_and_unsupported_kind() {
        let h = Harness::new();
        let (reporter, writer) = reporter(&h, Lease::standalone(), settings(&[]));
        let outcomes = Outcomes::single(Outcome::Synced);

        assert!(!reporter.report(&web(), &outcomes).await.unwrap());
        assert!(writer.patches().is_empty());

        let service = ObjectKey::new(ResourceKind::Service, "default", "web");
        assert!(matches!(
            reporter.report(&service, &outcomes).await,
            Err(StatusError::Unsupported(_))
        ));
    }
}
