// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation engine.
//!
//! Ties the pieces together: watch events go through the relationship
//! resolver into the work queue; workers translate each root per gateway
//! group, hand the result to the sync executor and report the outcome.
//!
//! ```text
//! watch event ─▶ cache ─▶ relations ─▶ queue ─▶ worker
//!                                                 │
//!                       router ◀──────────────────┤
//!                       translator ◀──────────────┤
//!                       sync executor ◀───────────┤ (leader only)
//!                       status reporter ◀─────────┘ (leader only)
//! ```
//!
//! A periodic full resync rebuilds every group snapshot from the data plane
//! and reclaims orphans.

use crate::admin::AdminApi;
use crate::cache::{ObjectKey, ResourceCache, ResourceKind};
use crate::config::ControllerConfig;
use crate::constants::GROUP_UNAVAILABLE_REQUEUE_SECS;
use crate::dataplane::{GroupId, PluginRegistry};
use crate::errors::{SyncError, TranslationError, TranslationReason};
use crate::http_errors::map_admin_error;
use crate::leader::Lease;
use crate::metrics;
use crate::queue::WorkQueue;
use crate::relations::Relations;
use crate::router::{group_id_for_proxy, GroupRouter, RouterSettings};
use crate::status::{Outcome, Outcomes, StatusReporter, StatusSettings, StatusWriter};
use crate::status_reasons::{
    REASON_BACKEND_NOT_FOUND, REASON_GATEWAY_GROUP_UNAVAILABLE, REASON_INVALID_KIND,
    REASON_RESOURCE_SYNC_ABORTED, REASON_SYNC_FAILED,
};
use crate::sync::{RootOutcome, SyncExecutor};
use crate::translator::{translate, TranslateContext};
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Map a translation failure to the status it produces.
#[must_use]
pub fn translation_outcome(err: &TranslationError) -> Outcome {
    let reason = match err.reason {
        TranslationReason::ServiceNotFound { .. } | TranslationReason::ServicePortNotFound { .. } => {
            REASON_BACKEND_NOT_FOUND
        }
        TranslationReason::UnsupportedBackend { .. } => REASON_INVALID_KIND,
        _ => REASON_RESOURCE_SYNC_ABORTED,
    };
    Outcome::failed(reason, err.reason.to_string())
}

fn sync_outcome(outcome: RootOutcome) -> Outcome {
    match outcome {
        RootOutcome::Synced => Outcome::Synced,
        RootOutcome::Failed(err) => {
            let (reason, message) = map_admin_error(&err);
            Outcome::failed(reason, message)
        }
        RootOutcome::Blocked => Outcome::failed(
            REASON_SYNC_FAILED,
            "Waiting for a dependency that failed to sync",
        ),
    }
}

pub struct Engine {
    cache: Arc<ResourceCache>,
    router: Arc<GroupRouter>,
    relations: Relations,
    registry: PluginRegistry,
    executor: SyncExecutor,
    status: StatusReporter,
    queue: Arc<WorkQueue<ObjectKey>>,
    lease: Lease,
    workers: usize,
    resync_interval: Duration,
    shutdown: watch::Sender<bool>,
}

impl Engine {
    #[must_use]
    pub fn new(
        cache: Arc<ResourceCache>,
        admin: Arc<dyn AdminApi>,
        writer: Arc<dyn StatusWriter>,
        lease: Lease,
        config: &ControllerConfig,
    ) -> Self {
        let router = Arc::new(GroupRouter::new(
            cache.clone(),
            RouterSettings::from_config(config),
        ));
        let status = StatusReporter::new(
            writer,
            lease.clone(),
            cache.clone(),
            router.clone(),
            StatusSettings {
                enabled: config.enable_status_updates,
                controller_name: config.controller_name.clone(),
                addresses: config.status_addresses.clone(),
            },
        );
        let (shutdown, _) = watch::channel(false);
        Self {
            relations: Relations::new(cache.clone(), &config.ingress_class),
            registry: PluginRegistry::default(),
            executor: SyncExecutor::new(admin, lease.clone(), config.resync_interval),
            queue: Arc::new(WorkQueue::new()),
            workers: config.worker_count.max(1),
            resync_interval: config.resync_interval,
            cache,
            router,
            status,
            lease,
            shutdown,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    #[must_use]
    pub fn executor(&self) -> &SyncExecutor {
        &self.executor
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<WorkQueue<ObjectKey>> {
        &self.queue
    }

    /// React to a cache change: enqueue every affected root.
    pub fn on_change(&self, key: &ObjectKey) {
        let roots = self.relations.on_change(key);
        if key.kind == ResourceKind::HTTPRoutePolicy {
            self.queue.add(key.clone());
        }
        if !roots.is_empty() {
            debug!(object = %key, roots = roots.len(), "Enqueueing affected roots");
        }
        for root in roots {
            self.queue.add(root);
        }
    }

    /// Enqueue every cached root object.
    pub fn enqueue_all(&self) {
        for kind in ResourceKind::ALL.into_iter().filter(|k| k.is_root()) {
            for key in self.cache.keys(kind) {
                self.queue.add(key);
            }
        }
    }

    /// Reconcile one queued key. Returns when it should be processed again.
    pub async fn reconcile(&self, key: &ObjectKey) -> Option<Duration> {
        let start = Instant::now();
        let kind = key.kind.as_str();

        if key.kind == ResourceKind::HTTPRoutePolicy {
            if let Err(e) = self.status.report_policy(key).await {
                warn!(policy = %key, error = %e, "Failed to update policy status");
            }
            return None;
        }

        let resolution = self.router.resolve_all(key);
        if resolution.groups.is_empty() {
            if let Some(e) = resolution.unavailable.first() {
                warn!(object = %key, error = %e, "Gateway group unavailable");
                // The previous intent stays in place so the data plane keeps serving.
                let outcome = Outcome::failed(REASON_GATEWAY_GROUP_UNAVAILABLE, e.to_string());
                self.report(key, &Outcomes::single(outcome)).await;
                metrics::record_reconciliation_error(kind, start.elapsed());
                metrics::record_reconciliation_requeue(kind, REASON_GATEWAY_GROUP_UNAVAILABLE);
                return Some(Duration::from_secs(GROUP_UNAVAILABLE_REQUEUE_SECS));
            }
        }
        let groups = resolution.groups;
        let partial = !resolution.unavailable.is_empty();
        for e in &resolution.unavailable {
            warn!(object = %key, error = %e, "Gateway group unavailable; syncing the others");
        }

        let resolved: BTreeSet<GroupId> = groups.iter().map(|g| g.id.clone()).collect();
        let mut to_sync: BTreeSet<GroupId> = BTreeSet::new();
        // An unresolvable group may be one the root still belongs to.
        if !partial {
            for stale in self.executor.groups_of(key) {
                if !resolved.contains(&stale) {
                    debug!(object = %key, group = %stale, "Root left gateway group");
                    self.executor.clear_intent(&stale, key).await;
                    to_sync.insert(stale);
                }
            }
        }

        let mut outcomes = Outcomes::default();
        let mut translation_failed = false;
        for group in &groups {
            let ctx = TranslateContext {
                cache: &self.cache,
                router: &self.router,
                group,
                registry: &self.registry,
            };
            match translate(key, &ctx) {
                Ok(objects) => {
                    debug!(object = %key, group = %group.id, objects = objects.len(), "Translated");
                    self.executor.set_intent(group, key, objects).await;
                    to_sync.insert(group.id.clone());
                }
                Err(e) => {
                    warn!(object = %key, group = %group.id, error = %e, "Translation failed; keeping previous configuration");
                    metrics::record_translation_error(kind);
                    outcomes.set(&group.id, translation_outcome(&e));
                    translation_failed = true;
                }
            }
        }

        let mut retry_after: Option<Duration> =
            partial.then(|| Duration::from_secs(GROUP_UNAVAILABLE_REQUEUE_SECS));
        for group_id in &to_sync {
            match self.executor.sync_group(group_id).await {
                Ok(report) => {
                    if let Some(delay) = report.retry_after {
                        retry_after = Some(retry_after.map_or(delay, |d| d.min(delay)));
                    }
                    if resolved.contains(group_id) {
                        outcomes.set(group_id, sync_outcome(report.outcome(key)));
                    }
                }
                Err(SyncError::NotLeader) => {
                    outcomes.set(group_id, Outcome::Accepted);
                }
                Err(e) => {
                    error!(object = %key, group = %group_id, error = %e, "Sync failed");
                    outcomes.set(group_id, Outcome::failed(REASON_SYNC_FAILED, e.to_string()));
                }
            }
        }

        if self.cache.contains(key) {
            if groups.is_empty() {
                debug!(object = %key, "Not handled by this controller");
            } else {
                self.report(key, &outcomes).await;
            }
        } else {
            self.status.forget(key);
            if key.kind == ResourceKind::GatewayProxy {
                self.executor
                    .drop_group(&group_id_for_proxy(&key.namespace, &key.name));
            }
        }
        if matches!(key.kind, ResourceKind::HTTPRoute | ResourceKind::Ingress) {
            if let Err(e) = self.status.report_policies(key).await {
                warn!(object = %key, error = %e, "Failed to update policy status");
            }
        }

        if translation_failed || retry_after.is_some() {
            metrics::record_reconciliation_error(kind, start.elapsed());
        } else {
            metrics::record_reconciliation_success(kind, start.elapsed());
        }
        if partial {
            metrics::record_reconciliation_requeue(kind, REASON_GATEWAY_GROUP_UNAVAILABLE);
        } else if retry_after.is_some() {
            metrics::record_reconciliation_requeue(kind, REASON_SYNC_FAILED);
        }
        retry_after
    }

    async fn report(&self, key: &ObjectKey, outcomes: &Outcomes) {
        if let Err(e) = self.status.report(key, outcomes).await {
            warn!(object = %key, error = %e, "Failed to update status");
        }
    }

    /// Full resync of every known gateway group.
    ///
    /// Groups resync concurrently; one slow data plane does not hold up the
    /// others. Roots that fail to sync are queued again so their status is
    /// refreshed.
    pub async fn resync_all(&self) {
        let group_ids = self.executor.group_ids();
        let results = join_all(group_ids.iter().map(|id| self.executor.full_resync(id))).await;
        for (group_id, result) in group_ids.iter().zip(results) {
            match result {
                Ok(report) => {
                    if report.is_clean() {
                        debug!(group = %group_id, applied = report.applied, "Full resync complete");
                    } else {
                        warn!(
                            group = %group_id,
                            applied = report.applied,
                            failures = report.failures.len(),
                            blocked = report.blocked.len(),
                            "Full resync left objects unsynced"
                        );
                    }
                    for root in report.unsynced_roots() {
                        self.queue.add(root.clone());
                    }
                }
                Err(SyncError::NotLeader) => return,
                Err(e) => warn!(group = %group_id, error = %e, "Full resync failed"),
            }
        }
    }

    /// Run workers, the resync timer and the leadership watcher until
    /// [`Engine::shutdown`] is called.
    pub async fn run(self: Arc<Self>) {
        info!(workers = self.workers, resync = ?self.resync_interval, "Starting reconciliation engine");
        let mut tasks = JoinSet::new();
        for worker in 0..self.workers {
            tasks.spawn(Arc::clone(&self).worker(worker));
        }
        tasks.spawn(Arc::clone(&self).resync_loop());
        tasks.spawn(Arc::clone(&self).leadership_loop());
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Engine task failed");
            }
        }
        info!("Reconciliation engine stopped");
    }

    /// Stop dequeueing; in-flight reconciliations finish.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.queue.close();
    }

    async fn worker(self: Arc<Self>, id: usize) {
        let mut lease = self.lease.clone();
        let mut stop = self.shutdown.subscribe();
        loop {
            tokio::select! {
                () = lease.acquired() => {}
                _ = stop.wait_for(|stopped| *stopped) => break,
            }
            let Some(key) = self.queue.next().await else {
                break;
            };
            debug!(worker = id, object = %key, "Reconciling");
            let requeue = self.reconcile(&key).await;
            self.queue.done(&key);
            if let Some(delay) = requeue {
                self.queue.add_after(key, delay);
            }
        }
        debug!(worker = id, "Worker stopped");
    }

    async fn resync_loop(self: Arc<Self>) {
        let mut stop = self.shutdown.subscribe();
        let mut ticker = tokio::time::interval(self.resync_interval);
        // The leadership watcher performs the first resync.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.lease.is_leader() && self.cache.is_ready() {
                        info!("Periodic full resync");
                        self.resync_all().await;
                    }
                }
                _ = async { let _ = stop.wait_for(|stopped| *stopped).await; } => break,
            }
        }
    }

    /// On every leadership gain: wait for the cache, enqueue all roots, resync.
    async fn leadership_loop(self: Arc<Self>) {
        let mut lease = self.lease.clone();
        let mut stop = self.shutdown.subscribe();
        loop {
            tokio::select! {
                () = lease.acquired() => {}
                _ = stop.wait_for(|stopped| *stopped) => break,
            }
            while !self.cache.is_ready() {
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_millis(200)) => {}
                    _ = stop.wait_for(|stopped| *stopped) => return,
                }
            }
            info!("Leadership held; reconciling every root");
            if let Some(group) = &self.router.settings().default_group {
                self.executor.ensure_group(group);
            }
            self.enqueue_all();
            // Intent must be rebuilt before the resync decides what is orphaned.
            while !self.queue.is_idle() {
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_millis(100)) => {}
                    _ = stop.wait_for(|stopped| *stopped) => return,
                }
            }
            self.resync_all().await;
            tokio::select! {
                () = lease.lost() => warn!("Leadership lost; pausing data-plane sync"),
                _ = stop.wait_for(|stopped| *stopped) => break,
            }
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod engine_tests;
