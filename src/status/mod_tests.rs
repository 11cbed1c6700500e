// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `status/mod.rs`

#[cfg(test)]
mod tests {
    use super::super::{
        comparable, gateway_status, ingress_status, route_conditions, route_status, Outcome,
        Outcomes,
    };
    use crate::crd::{ParentReference, RouteParentStatus, RouteStatus};
    use crate::status_reasons::{REASON_BACKEND_NOT_FOUND, REASON_SYNC_FAILED};
    use serde_json::json;

    fn parent(name: &str) -> ParentReference {
        ParentReference {
            group: None,
            kind: None,
            namespace: None,
            name: name.to_string(),
            section_name: None,
            port: None,
        }
    }

    #[test]
    fn test_aggregate_picks_worst_outcome() {
        let mut outcomes = Outcomes::default();
        assert_eq!(outcomes.aggregate(), Outcome::Accepted);

        outcomes.set("a", Outcome::Synced);
        outcomes.set("b", Outcome::failed(REASON_SYNC_FAILED, "boom"));
        assert!(matches!(outcomes.aggregate(), Outcome::SyncFailed { .. }));
        assert_eq!(outcomes.for_group("a"), Outcome::Synced);
        assert!(matches!(outcomes.for_group("unknown"), Outcome::SyncFailed { .. }));
    }

    #[test]
    fn test_backend_not_found_fails_resolved_refs() {
        let conditions = route_conditions(
            &Outcome::failed(REASON_BACKEND_NOT_FOUND, "service default/missing not found"),
            Some(3),
        );
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].r#type, "Accepted");
        assert_eq!(conditions[0].status, "False");
        assert_eq!(conditions[1].r#type, "ResolvedRefs");
        assert_eq!(conditions[1].status, "False");
        assert_eq!(conditions[1].reason.as_deref(), Some(REASON_BACKEND_NOT_FOUND));
        assert_eq!(conditions[1].observed_generation, Some(3));
    }

    #[test]
    fn test_synced_route_is_accepted_and_resolved() {
        let conditions = route_conditions(&Outcome::Synced, None);
        assert!(conditions.iter().all(|c| c.status == "True"));
    }

    #[test]
    fn test_route_status_keeps_other_controllers() {
        let existing = RouteStatus {
            parents: vec![
                RouteParentStatus {
                    parent_ref: parent("other-gw"),
                    controller_name: "example.com/other".into(),
                    conditions: Vec::new(),
                },
                RouteParentStatus {
                    parent_ref: parent("stale"),
                    controller_name: "ours".into(),
                    conditions: Vec::new(),
                },
            ],
        };
        let status = route_status(
            Some(&existing),
            "ours",
            &[(parent("gw"), Outcome::Synced)],
            Some(1),
        );
        let names: Vec<&str> = status.parents.iter().map(|p| p.parent_ref.name.as_str()).collect();
        assert_eq!(names, vec!["other-gw", "gw"]);
    }

    #[test]
    fn test_addresses_are_typed() {
        let status = gateway_status(
            &Outcome::Synced,
            &["10.0.0.1".into(), "lb.example.com".into()],
            None,
        );
        assert_eq!(status.addresses[0].r#type.as_deref(), Some("IPAddress"));
        assert_eq!(status.addresses[1].r#type.as_deref(), Some("Hostname"));
        assert!(status.conditions.iter().all(|c| c.status == "True"));

        let ingress = ingress_status(&["10.0.0.1".into(), "lb.example.com".into()]);
        let entries = ingress.load_balancer.unwrap().ingress.unwrap();
        assert_eq!(entries[0].ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(entries[1].hostname.as_deref(), Some("lb.example.com"));
    }

    #[test]
    fn test_comparable_ignores_transition_time() {
        let a = json!({"conditions": [{"type": "Accepted", "lastTransitionTime": "2025-01-01T00:00:00Z"}]});
        let b = json!({"conditions": [{"type": "Accepted", "lastTransitionTime": "2025-06-01T00:00:00Z"}]});
        assert_eq!(comparable(&a), comparable(&b));
        assert_ne!(comparable(&a), comparable(&json!({"conditions": []})));
    }
}
