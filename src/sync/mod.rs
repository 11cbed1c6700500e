// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Sync executor.
//!
//! Holds, per gateway group, the objects each root declares and the snapshot
//! of what was last pushed, and drives the admin API to close the gap.
//!
//! # Object lifecycle
//!
//! `Pending → Pushed → Synced`, or `Pushed → Failed`. A failed object is
//! retried by a later pass once its backoff (capped at the resync interval)
//! has elapsed.
//!
//! # Failure isolation
//!
//! Every group has its own lock and its own snapshot. Which groups a root
//! declares objects in is indexed outside those locks, so a data plane that
//! hangs only stalls work for its own group.
//!
//! Within a pass, a failed dependency upsert blocks dependent upserts and
//! dependency deletes of that group; a failed dependent call blocks
//! dependency deletes. An operation still waiting out its backoff counts as
//! failed. Nothing blocks across groups.

pub mod plan;
pub mod state;

pub use plan::{Action, PlannedOp, SyncPlan};
pub use state::{GroupState, ObjectRef, ObjectState, SyncedObject};

use crate::admin::AdminApi;
use crate::cache::ObjectKey;
use crate::dataplane::{is_managed, DesiredObject, GroupId, ObjectKind};
use crate::errors::{AdminApiError, SyncError};
use crate::leader::Lease;
use crate::metrics::{record_orphan_deleted, set_synced_objects};
use crate::router::GatewayGroup;
use plan::covers;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Sync result of one root in one pass.
#[derive(Clone, Debug, PartialEq)]
pub enum RootOutcome {
    /// Every object of the root matches the data plane
    Synced,
    /// A call for one of the root's objects failed or is waiting out its backoff
    Failed(AdminApiError),
    /// Calls were skipped because a dependency failed
    Blocked,
}

/// A failed call.
#[derive(Clone, Debug)]
pub struct ObjectFailure {
    pub object: ObjectRef,
    pub action: Action,
    pub error: AdminApiError,
}

/// Result of one sync pass over a group.
#[derive(Clone, Debug)]
pub struct SyncReport {
    pub group: GroupId,
    /// Successful admin calls
    pub applied: usize,
    pub failures: Vec<ObjectFailure>,
    /// Operations skipped because a dependency failed
    pub blocked: Vec<ObjectRef>,
    /// Operations skipped because their backoff has not elapsed
    pub deferred: Vec<ObjectRef>,
    /// Earliest time a retry can make progress
    pub retry_after: Option<Duration>,
    roots: BTreeMap<ObjectKey, RootOutcome>,
}

impl SyncReport {
    fn new(group: &str) -> Self {
        Self {
            group: group.to_string(),
            applied: 0,
            failures: Vec::new(),
            blocked: Vec::new(),
            deferred: Vec::new(),
            retry_after: None,
            roots: BTreeMap::new(),
        }
    }

    /// Outcome for `root`; roots untouched by the pass are synced.
    #[must_use]
    pub fn outcome(&self, root: &ObjectKey) -> RootOutcome {
        self.roots.get(root).cloned().unwrap_or(RootOutcome::Synced)
    }

    /// Roots that did not fully sync in this pass.
    pub fn unsynced_roots(&self) -> impl Iterator<Item = &ObjectKey> {
        self.roots
            .iter()
            .filter(|(_, outcome)| **outcome != RootOutcome::Synced)
            .map(|(root, _)| root)
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.blocked.is_empty() && self.deferred.is_empty()
    }

    fn retry_in(&mut self, delay: Duration) {
        self.retry_after = Some(self.retry_after.map_or(delay, |current| current.min(delay)));
    }

    fn fail_roots(&mut self, roots: &BTreeSet<ObjectKey>, error: &AdminApiError) {
        for root in roots {
            self.roots
                .insert(root.clone(), RootOutcome::Failed(error.clone()));
        }
    }

    fn block_roots(&mut self, roots: &BTreeSet<ObjectKey>) {
        for root in roots {
            self.roots
                .entry(root.clone())
                .or_insert(RootOutcome::Blocked);
        }
    }
}

/// Applies intent to the data planes of every known group.
pub struct SyncExecutor {
    admin: Arc<dyn AdminApi>,
    lease: Lease,
    resync_interval: Duration,
    groups: RwLock<BTreeMap<GroupId, Arc<Mutex<GroupState>>>>,
    /// Groups each root declares objects in
    memberships: RwLock<BTreeMap<ObjectKey, BTreeSet<GroupId>>>,
}

impl SyncExecutor {
    #[must_use]
    pub fn new(admin: Arc<dyn AdminApi>, lease: Lease, resync_interval: Duration) -> Self {
        Self {
            admin,
            lease,
            resync_interval,
            groups: RwLock::new(BTreeMap::new()),
            memberships: RwLock::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub fn lease(&self) -> &Lease {
        &self.lease
    }

    fn handle(&self, group_id: &str) -> Option<Arc<Mutex<GroupState>>> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(group_id)
            .cloned()
    }

    fn handle_or_insert(&self, group: &GatewayGroup) -> Arc<Mutex<GroupState>> {
        self.groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(group.id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(GroupState::new(group.clone()))))
            .clone()
    }

    /// Track `group` even before any root declares objects in it, so a full
    /// resync can reclaim its orphans.
    pub fn ensure_group(&self, group: &GatewayGroup) {
        self.handle_or_insert(group);
    }

    /// Ids of every group holding state.
    #[must_use]
    pub fn group_ids(&self) -> Vec<GroupId> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Replace what `root` declares in `group`. Returns false when unchanged.
    ///
    /// Also refreshes the group's endpoints and credentials.
    pub async fn set_intent(
        &self,
        group: &GatewayGroup,
        root: &ObjectKey,
        objects: Vec<DesiredObject>,
    ) -> bool {
        let handle = self.handle_or_insert(group);
        let mut state = handle.lock().await;
        if state.group != *group {
            debug!(group = %group.id, "Gateway group endpoints changed");
            state.group = group.clone();
        }
        let changed = state.set_intent(root, objects);
        self.set_membership(root, &group.id, state.has_root(root));
        changed
    }

    /// Forget what `root` declares in `group_id`.
    pub async fn clear_intent(&self, group_id: &str, root: &ObjectKey) -> bool {
        self.set_membership(root, group_id, false);
        match self.handle(group_id) {
            Some(handle) => handle.lock().await.clear_intent(root),
            None => false,
        }
    }

    fn set_membership(&self, root: &ObjectKey, group_id: &str, member: bool) {
        let mut memberships = self
            .memberships
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if member {
            memberships
                .entry(root.clone())
                .or_default()
                .insert(group_id.to_string());
        } else if let Some(groups) = memberships.get_mut(root) {
            groups.remove(group_id);
            if groups.is_empty() {
                memberships.remove(root);
            }
        }
    }

    /// Groups in which `root` currently declares objects.
    ///
    /// Never waits on a group lock.
    #[must_use]
    pub fn groups_of(&self, root: &ObjectKey) -> Vec<GroupId> {
        self.memberships
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(root)
            .map(|groups| groups.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop all state of a group whose `GatewayProxy` is gone.
    pub fn drop_group(&self, group_id: &str) -> bool {
        let removed = self
            .groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(group_id)
            .is_some();
        self.memberships
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, groups| {
                groups.remove(group_id);
                !groups.is_empty()
            });
        if removed {
            info!(group = %group_id, "Dropped gateway group state");
        }
        removed
    }

    pub async fn object_state(
        &self,
        group_id: &str,
        kind: ObjectKind,
        id: &str,
    ) -> Option<ObjectState> {
        let handle = self.handle(group_id)?;
        let state = handle.lock().await;
        state.states.get(&(kind, id.to_string())).copied()
    }

    /// Number of objects in the synced snapshot of a group.
    pub async fn synced_len(&self, group_id: &str) -> usize {
        match self.handle(group_id) {
            Some(handle) => handle.lock().await.snapshot.len(),
            None => 0,
        }
    }

    /// Apply the current intent of `group_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotLeader`] without calling the admin API when the
    /// lease is not held, and [`SyncError::UnknownGroup`] for a group without
    /// state.
    pub async fn sync_group(&self, group_id: &str) -> Result<SyncReport, SyncError> {
        if !self.lease.is_leader() {
            return Err(SyncError::NotLeader);
        }
        let handle = self
            .handle(group_id)
            .ok_or_else(|| SyncError::UnknownGroup(group_id.to_string()))?;
        let mut state = handle.lock().await;
        Ok(self.apply(&mut state).await)
    }

    /// Rebuild the snapshot of `group_id` from the data plane and apply.
    ///
    /// Managed objects nobody declares are deleted, declared objects missing
    /// or drifted remotely are pushed again, and failed objects are retried
    /// regardless of their backoff.
    ///
    /// # Errors
    ///
    /// As [`SyncExecutor::sync_group`], plus [`SyncError::List`] when a kind
    /// cannot be listed. Nothing is changed in that case.
    pub async fn full_resync(&self, group_id: &str) -> Result<SyncReport, SyncError> {
        if !self.lease.is_leader() {
            return Err(SyncError::NotLeader);
        }
        let handle = self
            .handle(group_id)
            .ok_or_else(|| SyncError::UnknownGroup(group_id.to_string()))?;
        let mut state = handle.lock().await;
        let group = state.group.clone();
        let intent = state.merged_intent();

        let mut rebuilt: BTreeMap<ObjectRef, SyncedObject> = state
            .snapshot
            .iter()
            .filter(|((kind, _), _)| !kind.is_listable())
            .map(|(object, synced)| (object.clone(), synced.clone()))
            .collect();

        for kind in ObjectKind::ALL.into_iter().filter(|k| k.is_listable()) {
            let remote = self
                .admin
                .list(&group, kind)
                .await
                .map_err(|source| SyncError::List {
                    group: group_id.to_string(),
                    kind: kind.to_string(),
                    source,
                })?;

            for object in remote {
                let key = (kind, object.id.clone());
                match intent.get(&key) {
                    Some(wanted) if covers(&object.value, &wanted.body) => {
                        rebuilt.insert(
                            key,
                            SyncedObject {
                                body: wanted.body.clone(),
                                source_refs: wanted.source_refs.clone(),
                            },
                        );
                    }
                    // Drifted: left out of the snapshot so it is pushed again
                    Some(_) => {}
                    None => {
                        let managed = if kind.is_labeled() {
                            is_managed(&object.labels)
                        } else {
                            state.snapshot.contains_key(&key)
                        };
                        if managed {
                            debug!(group = %group_id, kind = %kind, id = %object.id, "Found orphaned data-plane object");
                            rebuilt.insert(
                                key,
                                SyncedObject {
                                    body: object.value,
                                    source_refs: BTreeSet::new(),
                                },
                            );
                        }
                    }
                }
            }
        }

        state.snapshot = rebuilt;
        state.expire_backoff();
        let report = self.apply(&mut state).await;
        info!(
            group = %group_id,
            applied = report.applied,
            failures = report.failures.len(),
            "Full resync finished"
        );
        Ok(report)
    }

    async fn apply(&self, state: &mut GroupState) -> SyncReport {
        let group = state.group.clone();
        let intent = state.merged_intent();
        state.prune(&intent);
        for (object, synced) in &mut state.snapshot {
            if let Some(wanted) = intent.get(object) {
                synced.source_refs.clone_from(&wanted.source_refs);
            }
        }
        for (object, wanted) in &intent {
            let in_sync = state
                .snapshot
                .get(object)
                .is_some_and(|synced| synced.body == wanted.body);
            let entry = state
                .states
                .entry(object.clone())
                .or_insert(ObjectState::Pending);
            if in_sync {
                *entry = ObjectState::Synced;
            }
        }

        let plan = plan::plan(&intent, &state.snapshot);
        let mut report = SyncReport::new(&group.id);
        if plan.is_empty() {
            return report;
        }
        debug!(group = %group.id, operations = plan.len(), "Applying sync plan");

        let now = Instant::now();
        let dependents_failed = self
            .apply_step(state, &group, &plan.dependent_deletes, now, &mut report)
            .await;
        let dependencies_failed = self
            .apply_step(state, &group, &plan.dependency_upserts, now, &mut report)
            .await;

        if dependencies_failed {
            Self::block(state, &plan.dependent_upserts, &mut report);
            Self::block(state, &plan.dependency_deletes, &mut report);
        } else {
            let upserts_failed = self
                .apply_step(state, &group, &plan.dependent_upserts, now, &mut report)
                .await;
            if dependents_failed || upserts_failed {
                Self::block(state, &plan.dependency_deletes, &mut report);
            } else {
                self.apply_step(state, &group, &plan.dependency_deletes, now, &mut report)
                    .await;
            }
        }

        for kind in ObjectKind::ALL {
            let count = state.snapshot.keys().filter(|(k, _)| *k == kind).count();
            set_synced_objects(&group.id, kind.admin_path(), count);
        }
        report
    }

    /// Apply one step. Returns true if any call failed or was deferred.
    async fn apply_step(
        &self,
        state: &mut GroupState,
        group: &GatewayGroup,
        ops: &[PlannedOp],
        now: Instant,
        report: &mut SyncReport,
    ) -> bool {
        let mut failed = false;
        for op in ops {
            let (kind, id) = &op.object;

            if state.in_backoff(&op.object, now) {
                // Still failed as far as later steps are concerned.
                failed = true;
                if let Some(record) = state.failures.get(&op.object) {
                    report.fail_roots(&op.roots, &record.last_error);
                    report.retry_in(record.retry_at.saturating_duration_since(now));
                }
                report.deferred.push(op.object.clone());
                continue;
            }

            state.states.insert(op.object.clone(), ObjectState::Pushed);
            let result = match (&op.action, &op.body) {
                (Action::Delete, _) => self.admin.delete(group, *kind, id).await,
                (_, Some(body)) => self.admin.put(group, *kind, id, body).await,
                (_, None) => Ok(()),
            };

            match result {
                Ok(()) => {
                    report.applied += 1;
                    if op.action == Action::Delete {
                        let orphan = state
                            .snapshot
                            .remove(&op.object)
                            .is_some_and(|synced| synced.source_refs.is_empty());
                        if orphan {
                            record_orphan_deleted(&group.id, kind.admin_path());
                        }
                        state.states.remove(&op.object);
                        state.failures.remove(&op.object);
                    } else if let Some(body) = &op.body {
                        state.snapshot.insert(
                            op.object.clone(),
                            SyncedObject {
                                body: body.clone(),
                                source_refs: op.roots.clone(),
                            },
                        );
                        state.mark_synced(op.object.clone());
                    }
                }
                Err(e) => {
                    failed = true;
                    let delay = state.mark_failed(op.object.clone(), e.clone(), self.resync_interval);
                    warn!(
                        group = %group.id,
                        kind = %kind,
                        id = %id,
                        retry_after = ?delay,
                        error = %e,
                        "Data-plane object failed to sync"
                    );
                    report.fail_roots(&op.roots, &e);
                    report.retry_in(delay);
                    report.failures.push(ObjectFailure {
                        object: op.object.clone(),
                        action: op.action,
                        error: e,
                    });
                }
            }
        }
        failed
    }

    fn block(state: &mut GroupState, ops: &[PlannedOp], report: &mut SyncReport) {
        for op in ops {
            if op.action != Action::Delete {
                state
                    .states
                    .entry(op.object.clone())
                    .or_insert(ObjectState::Pending);
            }
            report.block_roots(&op.roots);
            report.blocked.push(op.object.clone());
        }
    }
}
