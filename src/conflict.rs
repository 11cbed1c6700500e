// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `HTTPRoutePolicy` arbitration.
//!
//! Policies attach to an `HTTPRoute` (optionally one named rule via
//! `sectionName`) or an `Ingress` in their own namespace. For each exact target
//! `(route, section)` the policies are ranked by priority (higher first), then
//! creation time, then name. A single policy holding the top priority is
//! accepted and merged into the targeted routes; every other policy is
//! conflicted. When several policies share the top priority none of them wins.
//!
//! A section-specific accepted policy shadows a whole-route accepted policy
//! for the routes generated from that section.

use crate::cache::{ObjectKey, ResourceCache, ResourceKind};
use crate::constants::{GATEWAY_API_GROUP, NETWORKING_API_GROUP};
use crate::crd::{HTTPRoutePolicy, PolicyTargetReference};
use crate::dataplane::RoutePayload;
use kube::ResourceExt;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Arbitration result for one `(target, section)`.
#[derive(Clone, Debug, Default)]
pub struct SectionResolution {
    pub accepted: Option<Arc<HTTPRoutePolicy>>,
    pub conflicted: Vec<Arc<HTTPRoutePolicy>>,
}

/// Arbitration results for every section of one target.
#[derive(Clone, Debug, Default)]
pub struct TargetPolicies {
    sections: BTreeMap<Option<String>, SectionResolution>,
}

impl TargetPolicies {
    /// Policy merged into routes generated from `section`.
    #[must_use]
    pub fn effective(&self, section: Option<&str>) -> Option<&HTTPRoutePolicy> {
        section
            .and_then(|s| self.sections.get(&Some(s.to_string())))
            .and_then(|r| r.accepted.as_deref())
            .or_else(|| {
                self.sections
                    .get(&None)
                    .and_then(|r| r.accepted.as_deref())
            })
    }

    #[must_use]
    pub fn section(&self, section: Option<&str>) -> Option<&SectionResolution> {
        self.sections.get(&section.map(str::to_string))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Kind of object a policy target reference names, if supported.
#[must_use]
pub fn target_kind(target: &PolicyTargetReference) -> Option<ResourceKind> {
    match (target.group.as_str(), target.kind.as_str()) {
        (GATEWAY_API_GROUP, "HTTPRoute") => Some(ResourceKind::HTTPRoute),
        (NETWORKING_API_GROUP, "Ingress") => Some(ResourceKind::Ingress),
        _ => None,
    }
}

/// Keys of the objects a policy targets (whether or not they exist).
#[must_use]
pub fn policy_targets(policy: &HTTPRoutePolicy) -> Vec<ObjectKey> {
    let namespace = policy.namespace().unwrap_or_default();
    let mut keys: Vec<ObjectKey> = policy
        .spec
        .target_refs
        .iter()
        .filter_map(|t| target_kind(t).map(|kind| ObjectKey::new(kind, &namespace, &t.name)))
        .collect();
    keys.sort();
    keys.dedup();
    keys
}

fn rank(a: &HTTPRoutePolicy, b: &HTTPRoutePolicy) -> Ordering {
    let priority = |p: &HTTPRoutePolicy| p.spec.priority.unwrap_or(0);
    priority(b)
        .cmp(&priority(a))
        .then_with(|| a.creation_timestamp().cmp(&b.creation_timestamp()))
        .then_with(|| a.name_any().cmp(&b.name_any()))
}

fn arbitrate(mut candidates: Vec<Arc<HTTPRoutePolicy>>) -> SectionResolution {
    candidates.sort_by(|a, b| rank(a, b));
    let top = candidates.first().map(|p| p.spec.priority.unwrap_or(0));
    let tied_at_top = candidates
        .iter()
        .filter(|p| Some(p.spec.priority.unwrap_or(0)) == top)
        .count();
    if tied_at_top != 1 {
        return SectionResolution {
            accepted: None,
            conflicted: candidates,
        };
    }
    let mut rest = candidates.into_iter();
    SectionResolution {
        accepted: rest.next(),
        conflicted: rest.collect(),
    }
}

/// Arbitrate every policy targeting `target`.
#[must_use]
pub fn resolve_target(cache: &ResourceCache, target: &ObjectKey) -> TargetPolicies {
    let mut by_section: BTreeMap<Option<String>, Vec<Arc<HTTPRoutePolicy>>> = BTreeMap::new();
    for policy in cache.list_namespaced::<HTTPRoutePolicy>(&target.namespace) {
        let mut sections: Vec<Option<String>> = policy
            .spec
            .target_refs
            .iter()
            .filter(|t| target_kind(t) == Some(target.kind) && t.name == target.name)
            .map(|t| t.section_name.clone())
            .collect();
        sections.sort();
        sections.dedup();
        for section in sections {
            by_section.entry(section).or_default().push(policy.clone());
        }
    }
    TargetPolicies {
        sections: by_section
            .into_iter()
            .map(|(section, candidates)| (section, arbitrate(candidates)))
            .collect(),
    }
}

/// Merge an accepted policy into a route payload.
pub fn apply_policy(route: &mut RoutePayload, policy: &HTTPRoutePolicy) {
    if let Some(priority) = policy.spec.priority {
        route.priority = Some(priority);
    }
    route
        .vars
        .extend(policy.spec.vars.iter().cloned().map(Value::Array));
}

/// Outcome of one attachment of a policy, used for its status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyAttachment {
    pub target: PolicyTargetReference,
    pub accepted: bool,
    pub message: String,
}

/// Attachments of `policy` to targets that currently exist.
///
/// A deleted target yields no attachment, so the policy reports zero ancestors.
#[must_use]
pub fn policy_attachments(cache: &ResourceCache, policy: &HTTPRoutePolicy) -> Vec<PolicyAttachment> {
    let namespace = policy.namespace().unwrap_or_default();
    let name = policy.name_any();
    let mut attachments = Vec::new();
    for target_ref in &policy.spec.target_refs {
        let Some(kind) = target_kind(target_ref) else {
            continue;
        };
        let target = ObjectKey::new(kind, &namespace, &target_ref.name);
        if !cache.contains(&target) {
            continue;
        }
        let resolution = resolve_target(cache, &target);
        let section = resolution.section(target_ref.section_name.as_deref());
        let winner = section
            .and_then(|s| s.accepted.as_ref())
            .map(|p| p.name_any());
        let accepted = winner.as_deref() == Some(name.as_str());
        let message = if accepted {
            "Policy has been accepted".to_string()
        } else {
            match winner {
                Some(winner) => format!("Policy conflicts with higher ranked policy {winner}"),
                None => "Policy shares the highest priority with another policy".to_string(),
            }
        };
        attachments.push(PolicyAttachment {
            target: target_ref.clone(),
            accepted,
            message,
        });
    }
    attachments
}

#[cfg(test)]
#[path = "conflict_tests.rs"]
mod conflict_tests;
