// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory [`AdminApi`] that records every call.
//!
//! Used by the executor and engine tests in place of a data plane. Failures
//! can be injected per group, or per group and kind, and stay in effect until
//! [`MemoryAdmin::heal`] is called.

use super::{AdminApi, RemoteObject};
use crate::dataplane::{GroupId, ObjectKind};
use crate::errors::AdminApiError;
use crate::router::GatewayGroup;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Admin operation kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdminOp {
    Put,
    Delete,
    List,
}

/// One recorded call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdminCall {
    pub group: GroupId,
    pub op: AdminOp,
    pub kind: ObjectKind,
    pub id: Option<String>,
}

#[derive(Default)]
struct MemoryState {
    objects: BTreeMap<(GroupId, ObjectKind, String), Value>,
    calls: Vec<AdminCall>,
    failures: BTreeMap<(GroupId, Option<ObjectKind>), AdminApiError>,
}

#[derive(Default)]
pub struct MemoryAdmin {
    state: Mutex<MemoryState>,
}

impl MemoryAdmin {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an object as if something else had created it.
    pub fn insert(&self, group: &str, kind: ObjectKind, id: &str, value: Value) {
        self.lock()
            .objects
            .insert((group.to_string(), kind, id.to_string()), value);
    }

    #[must_use]
    pub fn get(&self, group: &str, kind: ObjectKind, id: &str) -> Option<Value> {
        self.lock()
            .objects
            .get(&(group.to_string(), kind, id.to_string()))
            .cloned()
    }

    /// Ids of every object of `kind` held for `group`.
    #[must_use]
    pub fn ids(&self, group: &str, kind: ObjectKind) -> Vec<String> {
        self.lock()
            .objects
            .keys()
            .filter(|(g, k, _)| g == group && *k == kind)
            .map(|(_, _, id)| id.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self, group: &str) -> usize {
        self.lock()
            .objects
            .keys()
            .filter(|(g, _, _)| g == group)
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().objects.is_empty()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<AdminCall> {
        self.lock().calls.clone()
    }

    /// Number of `put` and `delete` calls recorded.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.op != AdminOp::List)
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Fail every call against `group`.
    pub fn fail_group(&self, group: &str, error: AdminApiError) {
        self.lock().failures.insert((group.to_string(), None), error);
    }

    /// Fail calls against `kind` in `group`.
    pub fn fail_kind(&self, group: &str, kind: ObjectKind, error: AdminApiError) {
        self.lock()
            .failures
            .insert((group.to_string(), Some(kind)), error);
    }

    /// Remove every injected failure of `group`.
    pub fn heal(&self, group: &str) {
        self.lock().failures.retain(|(g, _), _| g != group);
    }

    fn record(
        &self,
        group: &GatewayGroup,
        op: AdminOp,
        kind: ObjectKind,
        id: Option<&str>,
    ) -> Result<MutexGuard<'_, MemoryState>, AdminApiError> {
        let mut state = self.lock();
        state.calls.push(AdminCall {
            group: group.id.clone(),
            op,
            kind,
            id: id.map(str::to_string),
        });
        let failure = state
            .failures
            .get(&(group.id.clone(), Some(kind)))
            .or_else(|| state.failures.get(&(group.id.clone(), None)))
            .cloned();
        match failure {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }
}

#[async_trait]
impl AdminApi for MemoryAdmin {
    async fn put(
        &self,
        group: &GatewayGroup,
        kind: ObjectKind,
        id: &str,
        body: &Value,
    ) -> Result<(), AdminApiError> {
        let mut state = self.record(group, AdminOp::Put, kind, Some(id))?;
        state
            .objects
            .insert((group.id.clone(), kind, id.to_string()), body.clone());
        Ok(())
    }

    async fn delete(
        &self,
        group: &GatewayGroup,
        kind: ObjectKind,
        id: &str,
    ) -> Result<(), AdminApiError> {
        let mut state = self.record(group, AdminOp::Delete, kind, Some(id))?;
        state
            .objects
            .remove(&(group.id.clone(), kind, id.to_string()));
        Ok(())
    }

    async fn list(
        &self,
        group: &GatewayGroup,
        kind: ObjectKind,
    ) -> Result<Vec<RemoteObject>, AdminApiError> {
        let state = self.record(group, AdminOp::List, kind, None)?;
        Ok(state
            .objects
            .iter()
            .filter(|((g, k, _), _)| *g == group.id && *k == kind)
            .map(|((_, _, id), value)| RemoteObject {
                id: id.clone(),
                labels: value
                    .get("labels")
                    .and_then(Value::as_object)
                    .map(|labels| {
                        labels
                            .iter()
                            .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                            .collect()
                    })
                    .unwrap_or_default(),
                value: value.clone(),
            })
            .collect())
    }
}
