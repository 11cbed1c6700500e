// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-group sync state: declared intent, last synced snapshot and failure
//! bookkeeping.

use crate::cache::ObjectKey;
use crate::dataplane::{DesiredObject, ObjectKind};
use crate::errors::AdminApiError;
use crate::retry::failure_backoff;
use crate::router::GatewayGroup;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};
use tracing::warn;

/// Identity of a data-plane object within one group.
pub type ObjectRef = (ObjectKind, String);

/// Lifecycle of one desired object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectState {
    /// Declared but not yet attempted
    Pending,
    /// Call in flight
    Pushed,
    /// Last call succeeded and the snapshot matches the intent
    Synced,
    /// Last call failed; retried once the backoff elapses
    Failed,
}

/// What the data plane holds according to the last successful call.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncedObject {
    pub body: Value,
    /// Roots that required the object when it was pushed; empty for orphans
    pub source_refs: BTreeSet<ObjectKey>,
}

/// Consecutive failures of one object.
#[derive(Clone, Debug)]
pub struct FailureRecord {
    pub failures: u32,
    pub retry_at: Instant,
    pub last_error: AdminApiError,
}

/// Objects declared by one root.
#[derive(Clone, Debug)]
struct RootIntent {
    objects: Vec<DesiredObject>,
    /// Order of the translation that produced `objects`
    translated: u64,
}

/// Merged intent entry.
#[derive(Clone, Debug, PartialEq)]
pub struct IntentObject {
    pub body: Value,
    pub source_refs: BTreeSet<ObjectKey>,
}

/// Everything the executor knows about one gateway group.
#[derive(Debug)]
pub struct GroupState {
    pub group: GatewayGroup,
    intents: BTreeMap<ObjectKey, RootIntent>,
    translations: u64,
    pub snapshot: BTreeMap<ObjectRef, SyncedObject>,
    pub states: BTreeMap<ObjectRef, ObjectState>,
    pub failures: BTreeMap<ObjectRef, FailureRecord>,
}

impl GroupState {
    #[must_use]
    pub fn new(group: GatewayGroup) -> Self {
        Self {
            group,
            intents: BTreeMap::new(),
            translations: 0,
            snapshot: BTreeMap::new(),
            states: BTreeMap::new(),
            failures: BTreeMap::new(),
        }
    }

    /// Replace the objects declared by `root` with a fresh translation.
    /// Returns false when the objects are unchanged.
    ///
    /// The translation becomes the newest one, so its bodies win for objects
    /// shared with other roots.
    pub fn set_intent(&mut self, root: &ObjectKey, objects: Vec<DesiredObject>) -> bool {
        if objects.is_empty() {
            return self.intents.remove(root).is_some();
        }
        self.translations += 1;
        let translated = self.translations;
        match self.intents.get_mut(root) {
            Some(current) if current.objects == objects => {
                current.translated = translated;
                false
            }
            _ => {
                self.intents
                    .insert(root.clone(), RootIntent { objects, translated });
                true
            }
        }
    }

    /// Forget the objects declared by `root`.
    pub fn clear_intent(&mut self, root: &ObjectKey) -> bool {
        self.intents.remove(root).is_some()
    }

    #[must_use]
    pub fn has_root(&self, root: &ObjectKey) -> bool {
        self.intents.contains_key(root)
    }

    pub fn roots(&self) -> impl Iterator<Item = &ObjectKey> {
        self.intents.keys()
    }

    /// Union of every root's objects keyed by `(kind, id)`.
    ///
    /// When several roots declare the same object the body of the most recent
    /// translation wins and the source refs are merged. A root that failed to
    /// translate keeps its older intent, so its copy of a shared upstream never
    /// shadows a fresher one.
    #[must_use]
    pub fn merged_intent(&self) -> BTreeMap<ObjectRef, IntentObject> {
        let mut roots: Vec<(&ObjectKey, &RootIntent)> = self.intents.iter().collect();
        roots.sort_by(|a, b| b.1.translated.cmp(&a.1.translated).then_with(|| a.0.cmp(b.0)));

        let mut merged: BTreeMap<ObjectRef, IntentObject> = BTreeMap::new();
        for (root, intent) in roots {
            for object in &intent.objects {
                let key = (object.kind, object.id.clone());
                if let Some(existing) = merged.get_mut(&key) {
                    existing.source_refs.extend(object.source_refs.iter().cloned());
                    continue;
                }
                let body = match object.body() {
                    Ok(body) => body,
                    Err(e) => {
                        warn!(
                            root = %root,
                            kind = %object.kind,
                            id = %object.id,
                            error = %e,
                            "Dropping data-plane object that cannot be serialized"
                        );
                        continue;
                    }
                };
                merged.insert(
                    key,
                    IntentObject {
                        body,
                        source_refs: object.source_refs.clone(),
                    },
                );
            }
        }
        merged
    }

    /// Whether `object` is waiting out its failure backoff.
    #[must_use]
    pub fn in_backoff(&self, object: &ObjectRef, now: Instant) -> bool {
        self.failures
            .get(object)
            .is_some_and(|record| record.retry_at > now)
    }

    pub fn mark_synced(&mut self, object: ObjectRef) {
        self.failures.remove(&object);
        self.states.insert(object, ObjectState::Synced);
    }

    /// Record a failed call and return the delay before the next attempt.
    pub fn mark_failed(&mut self, object: ObjectRef, error: AdminApiError, cap: Duration) -> Duration {
        let failures = self
            .failures
            .get(&object)
            .map_or(1, |record| record.failures.saturating_add(1));
        let delay = failure_backoff(failures, cap);
        self.failures.insert(
            object.clone(),
            FailureRecord {
                failures,
                retry_at: Instant::now() + delay,
                last_error: error,
            },
        );
        self.states.insert(object, ObjectState::Failed);
        delay
    }

    /// Make every failed object eligible for an immediate retry.
    pub fn expire_backoff(&mut self) {
        let now = Instant::now();
        for record in self.failures.values_mut() {
            record.retry_at = now;
        }
    }

    /// Drop bookkeeping of objects that are neither declared nor synced.
    pub fn prune(&mut self, intent: &BTreeMap<ObjectRef, IntentObject>) {
        let snapshot = &self.snapshot;
        self.states
            .retain(|object, _| intent.contains_key(object) || snapshot.contains_key(object));
        self.failures
            .retain(|object, _| intent.contains_key(object) || snapshot.contains_key(object));
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod state_tests;
