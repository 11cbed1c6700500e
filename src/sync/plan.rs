// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Diff of intent against the synced snapshot, in apply order.
//!
//! Dependencies (upstreams, SSLs, plugin configs) are referenced by id from
//! dependents, so a plan runs in four steps:
//!
//! 1. delete dependents
//! 2. upsert dependencies
//! 3. upsert dependents
//! 4. delete dependencies

use super::state::{IntentObject, ObjectRef, SyncedObject};
use crate::cache::ObjectKey;
use crate::dataplane::Phase;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Delete,
}

/// One admin call to make.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedOp {
    pub object: ObjectRef,
    pub action: Action,
    /// Body for create and update
    pub body: Option<Value>,
    /// Roots affected by the outcome of the call
    pub roots: BTreeSet<ObjectKey>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncPlan {
    pub dependent_deletes: Vec<PlannedOp>,
    pub dependency_upserts: Vec<PlannedOp>,
    pub dependent_upserts: Vec<PlannedOp>,
    pub dependency_deletes: Vec<PlannedOp>,
}

impl SyncPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.dependent_deletes.len()
            + self.dependency_upserts.len()
            + self.dependent_upserts.len()
            + self.dependency_deletes.len()
    }

    /// All operations in apply order.
    pub fn ops(&self) -> impl Iterator<Item = &PlannedOp> {
        self.dependent_deletes
            .iter()
            .chain(&self.dependency_upserts)
            .chain(&self.dependent_upserts)
            .chain(&self.dependency_deletes)
    }
}

/// Compute the operations that bring `snapshot` to `intent`.
///
/// Objects whose synced body equals the intended body produce no operation.
#[must_use]
pub fn plan(
    intent: &BTreeMap<ObjectRef, IntentObject>,
    snapshot: &BTreeMap<ObjectRef, SyncedObject>,
) -> SyncPlan {
    let mut plan = SyncPlan::default();

    for (object, wanted) in intent {
        let action = match snapshot.get(object) {
            None => Action::Create,
            Some(synced) if synced.body != wanted.body => Action::Update,
            Some(_) => continue,
        };
        let op = PlannedOp {
            object: object.clone(),
            action,
            body: Some(wanted.body.clone()),
            roots: wanted.source_refs.clone(),
        };
        match object.0.phase() {
            Phase::Dependency => plan.dependency_upserts.push(op),
            Phase::Dependent => plan.dependent_upserts.push(op),
        }
    }

    for (object, synced) in snapshot {
        if intent.contains_key(object) {
            continue;
        }
        let op = PlannedOp {
            object: object.clone(),
            action: Action::Delete,
            body: None,
            roots: synced.source_refs.clone(),
        };
        match object.0.phase() {
            Phase::Dependency => plan.dependency_deletes.push(op),
            Phase::Dependent => plan.dependent_deletes.push(op),
        }
    }

    plan
}

/// Whether every field of `desired` appears in `remote` with the same value.
///
/// The admin API adds fields such as `create_time` to stored objects, so a
/// listed object matches the intent when it is a superset of it.
#[must_use]
pub fn covers(remote: &Value, desired: &Value) -> bool {
    match (remote, desired) {
        (Value::Object(remote), Value::Object(desired)) => desired.iter().all(|(key, value)| {
            remote
                .get(key)
                .is_some_and(|remote_value| covers(remote_value, value))
        }),
        (Value::Array(remote), Value::Array(desired)) => {
            remote.len() == desired.len()
                && remote.iter().zip(desired).all(|(r, d)| covers(r, d))
        }
        // 1 and 1.0 are the same timeout
        (Value::Number(remote), Value::Number(desired)) => {
            match (remote.as_f64(), desired.as_f64()) {
                (Some(r), Some(d)) => (r - d).abs() < f64::EPSILON,
                _ => remote == desired,
            }
        }
        _ => remote == desired,
    }
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod plan_tests;
