// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status conditions written back to source objects.
//!
//! # Condition Format
//!
//! - `type`: `Accepted`, `ResolvedRefs` or `Programmed`
//! - `status`: `True` or `False`
//! - `reason`: a `CamelCase` identifier from [`crate::status_reasons`]
//! - `observedGeneration`: generation the outcome was computed from
//! - `lastTransitionTime`: RFC3339 timestamp set when the status is written
//!
//! The builders in this module are pure; [`reporter`] decides whether and how
//! a computed status reaches the API server.

pub mod reporter;

pub use reporter::{KubeStatusWriter, StatusReporter, StatusSettings, StatusWriter};

use crate::conflict::PolicyAttachment;
use crate::crd::{
    ApisixStatus, Condition, GatewayStatus, GatewayStatusAddress, ParentReference,
    PolicyAncestorStatus, PolicyStatus, RouteParentStatus, RouteStatus,
};
use crate::dataplane::GroupId;
use crate::status_reasons::{
    CONDITION_TYPE_ACCEPTED, CONDITION_TYPE_PROGRAMMED, CONDITION_TYPE_RESOLVED_REFS,
    REASON_ACCEPTED, REASON_BACKEND_NOT_FOUND, REASON_CONFLICTED, REASON_INVALID_KIND,
    REASON_PROGRAMMED, REASON_RESOLVED_REFS,
};
use chrono::Utc;
use k8s_openapi::api::networking::v1::{IngressLoadBalancerIngress, IngressLoadBalancerStatus, IngressStatus};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Result of reconciling a root in one gateway group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Accepted, data-plane sync still pending
    Accepted,
    /// Every object is on the data plane
    Synced,
    SyncFailed { reason: String, message: String },
    Conflicted(String),
}

impl Outcome {
    #[must_use]
    pub fn failed(reason: &str, message: impl Into<String>) -> Self {
        Self::SyncFailed {
            reason: reason.to_string(),
            message: message.into(),
        }
    }

    fn severity(&self) -> u8 {
        match self {
            Self::Synced => 0,
            Self::Accepted => 1,
            Self::Conflicted(_) => 2,
            Self::SyncFailed { .. } => 3,
        }
    }
}

/// Outcomes of one root across its gateway groups.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Outcomes {
    by_group: BTreeMap<GroupId, Outcome>,
    fallback: Option<Outcome>,
}

impl Outcomes {
    /// The same outcome for every group.
    #[must_use]
    pub fn single(outcome: Outcome) -> Self {
        Self {
            by_group: BTreeMap::new(),
            fallback: Some(outcome),
        }
    }

    pub fn set(&mut self, group: &str, outcome: Outcome) {
        self.by_group.insert(group.to_string(), outcome);
    }

    #[must_use]
    pub fn for_group(&self, group: &str) -> Outcome {
        self.by_group
            .get(group)
            .cloned()
            .unwrap_or_else(|| self.aggregate())
    }

    /// The worst outcome over every group.
    #[must_use]
    pub fn aggregate(&self) -> Outcome {
        self.by_group
            .values()
            .chain(self.fallback.iter())
            .max_by_key(|o| o.severity())
            .cloned()
            .unwrap_or(Outcome::Accepted)
    }
}

/// Create a condition with the current timestamp.
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: bool,
    reason: &str,
    message: &str,
    observed_generation: Option<i64>,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: if status { "True" } else { "False" }.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        observed_generation,
        last_transition_time: Some(Utc::now().to_rfc3339()),
    }
}

/// The `Accepted` condition of an outcome.
#[must_use]
pub fn accepted_condition(outcome: &Outcome, generation: Option<i64>) -> Condition {
    match outcome {
        Outcome::Synced => create_condition(
            CONDITION_TYPE_ACCEPTED,
            true,
            REASON_ACCEPTED,
            "The resource has been accepted and synced to the data plane",
            generation,
        ),
        Outcome::Accepted => create_condition(
            CONDITION_TYPE_ACCEPTED,
            true,
            REASON_ACCEPTED,
            "The resource has been accepted",
            generation,
        ),
        Outcome::SyncFailed { reason, message } => {
            create_condition(CONDITION_TYPE_ACCEPTED, false, reason, message, generation)
        }
        Outcome::Conflicted(message) => create_condition(
            CONDITION_TYPE_ACCEPTED,
            false,
            REASON_CONFLICTED,
            message,
            generation,
        ),
    }
}

/// `Accepted` plus `ResolvedRefs`, as reported for each parent of a route.
#[must_use]
pub fn route_conditions(outcome: &Outcome, generation: Option<i64>) -> Vec<Condition> {
    let resolved = match outcome {
        Outcome::SyncFailed { reason, message }
            if reason == REASON_BACKEND_NOT_FOUND || reason == REASON_INVALID_KIND =>
        {
            create_condition(CONDITION_TYPE_RESOLVED_REFS, false, reason, message, generation)
        }
        _ => create_condition(
            CONDITION_TYPE_RESOLVED_REFS,
            true,
            REASON_RESOLVED_REFS,
            "All references are resolved",
            generation,
        ),
    };
    vec![accepted_condition(outcome, generation), resolved]
}

/// `status.parents` of a Gateway API route.
///
/// Entries written by other controllers are kept; ours are replaced.
#[must_use]
pub fn route_status(
    existing: Option<&RouteStatus>,
    controller_name: &str,
    parents: &[(ParentReference, Outcome)],
    generation: Option<i64>,
) -> RouteStatus {
    let mut status = RouteStatus {
        parents: existing
            .map(|s| {
                s.parents
                    .iter()
                    .filter(|p| p.controller_name != controller_name)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default(),
    };
    status
        .parents
        .extend(parents.iter().map(|(parent_ref, outcome)| RouteParentStatus {
            parent_ref: parent_ref.clone(),
            controller_name: controller_name.to_string(),
            conditions: route_conditions(outcome, generation),
        }));
    status
}

/// `status.ancestors` of an `HTTPRoutePolicy`.
///
/// One ancestor per existing target; a policy whose targets are all gone
/// reports none.
#[must_use]
pub fn policy_status(
    existing: Option<&PolicyStatus>,
    controller_name: &str,
    namespace: &str,
    attachments: &[PolicyAttachment],
    generation: Option<i64>,
) -> PolicyStatus {
    let mut status = PolicyStatus {
        ancestors: existing
            .map(|s| {
                s.ancestors
                    .iter()
                    .filter(|a| a.controller_name != controller_name)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default(),
    };
    for attachment in attachments {
        let reason = if attachment.accepted {
            REASON_ACCEPTED
        } else {
            REASON_CONFLICTED
        };
        status.ancestors.push(PolicyAncestorStatus {
            ancestor_ref: ParentReference {
                group: Some(attachment.target.group.clone()),
                kind: Some(attachment.target.kind.clone()),
                namespace: Some(namespace.to_string()),
                name: attachment.target.name.clone(),
                section_name: attachment.target.section_name.clone(),
                port: None,
            },
            controller_name: controller_name.to_string(),
            conditions: vec![create_condition(
                CONDITION_TYPE_ACCEPTED,
                attachment.accepted,
                reason,
                &attachment.message,
                generation,
            )],
        });
    }
    status
}

/// `Gateway` status: `Accepted`, `Programmed` and the published addresses.
#[must_use]
pub fn gateway_status(outcome: &Outcome, addresses: &[String], generation: Option<i64>) -> GatewayStatus {
    let programmed = match outcome {
        Outcome::Synced => create_condition(
            CONDITION_TYPE_PROGRAMMED,
            true,
            REASON_PROGRAMMED,
            "Listeners are programmed on the data plane",
            generation,
        ),
        Outcome::SyncFailed { reason, message } => {
            create_condition(CONDITION_TYPE_PROGRAMMED, false, reason, message, generation)
        }
        Outcome::Accepted | Outcome::Conflicted(_) => create_condition(
            CONDITION_TYPE_PROGRAMMED,
            false,
            REASON_PROGRAMMED,
            "Waiting for the data plane",
            generation,
        ),
    };
    GatewayStatus {
        addresses: addresses
            .iter()
            .map(|address| GatewayStatusAddress {
                r#type: Some(
                    if address.parse::<IpAddr>().is_ok() {
                        "IPAddress"
                    } else {
                        "Hostname"
                    }
                    .to_string(),
                ),
                value: address.clone(),
            })
            .collect(),
        conditions: vec![accepted_condition(outcome, generation), programmed],
    }
}

/// Status of the APISIX CRDs and `GatewayProxy`.
#[must_use]
pub fn apisix_status(outcome: &Outcome, generation: Option<i64>) -> ApisixStatus {
    ApisixStatus {
        conditions: vec![accepted_condition(outcome, generation)],
    }
}

/// `Ingress` status: one load-balancer entry per configured address.
#[must_use]
pub fn ingress_status(addresses: &[String]) -> IngressStatus {
    let ingress = addresses
        .iter()
        .map(|address| {
            if address.parse::<IpAddr>().is_ok() {
                IngressLoadBalancerIngress {
                    ip: Some(address.clone()),
                    ..IngressLoadBalancerIngress::default()
                }
            } else {
                IngressLoadBalancerIngress {
                    hostname: Some(address.clone()),
                    ..IngressLoadBalancerIngress::default()
                }
            }
        })
        .collect();
    IngressStatus {
        load_balancer: Some(IngressLoadBalancerStatus {
            ingress: Some(ingress),
        }),
    }
}

/// Copy of `status` without `lastTransitionTime`, for change detection.
#[must_use]
pub fn comparable(status: &Value) -> Value {
    match status {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| key.as_str() != "lastTransitionTime")
                .map(|(key, value)| (key.clone(), comparable(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(comparable).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
