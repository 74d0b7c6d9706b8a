//! Hand-off of proxy build results from merge workers to the scene thread.
//!
//! The owning thread registers a job with [`ProxyCoordinator::submit`] and
//! passes a completion closure to the merge service. Workers report results
//! through [`ProxyCoordinator::on_result`], which only moves the job between
//! two locked collections. Once per frame the owning thread calls
//! [`ProxyCoordinator::drain`] to apply the finished jobs to the tree.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::{self, ThreadId};

use nebula_config::LevelSettings;
use rustc_hash::FxHashMap;

use crate::cluster_utils::{ViewProjection, draw_distance_from_screen_size};
use crate::merge::{ProducedAssets, ProxyCompletion};
use crate::messages::{MessageCategory, MessageLog};
use crate::node::{HlodTree, NodeId};

/// Identifier of a proxy build job. Unique per coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u64);

/// Settings captured when a job is submitted.
#[derive(Clone, Debug)]
pub struct JobSettings {
    pub level: u32,
    pub level_settings: LevelSettings,
    pub view: ViewProjection,
    /// Vertex budget of the platform index format, if bounded.
    pub max_vertices: Option<u32>,
    /// Node revision at submission time.
    pub revision: u64,
}

/// A submitted proxy build.
#[derive(Clone, Debug)]
pub struct BuildJob {
    pub id: JobId,
    pub node: NodeId,
    pub settings: JobSettings,
    /// Filled in by [`ProxyCoordinator::on_result`].
    pub produced: Option<ProducedAssets>,
}

/// Outcome of one [`ProxyCoordinator::drain`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Proxies assigned to nodes.
    pub applied: usize,
    /// Results without a mesh; the node stays dirty.
    pub failed: usize,
    /// Results whose node no longer exists.
    pub stale: usize,
    /// Applied proxies whose node changed after submission and stays dirty.
    pub outdated: usize,
    /// Applied proxies above the index format's vertex budget.
    pub over_budget: usize,
}

impl DrainReport {
    pub fn is_empty(&self) -> bool {
        self.applied == 0 && self.failed == 0 && self.stale == 0
    }
}

#[derive(Debug, Default)]
struct JobQueues {
    pending: FxHashMap<JobId, BuildJob>,
    completed: VecDeque<BuildJob>,
    next_id: u64,
}

/// Registry of in-flight proxy builds for one loaded level.
#[derive(Debug)]
pub struct ProxyCoordinator {
    queues: Mutex<JobQueues>,
    owner: ThreadId,
}

impl Default for ProxyCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyCoordinator {
    /// Creates a coordinator owned by the calling thread.
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(JobQueues::default()),
            owner: thread::current().id(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, JobQueues> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn debug_assert_owner(&self, operation: &str) {
        debug_assert_eq!(
            thread::current().id(),
            self.owner,
            "ProxyCoordinator::{operation} must run on the owning thread"
        );
    }

    /// Registers a build for `node`. Earlier jobs for the same node, pending
    /// or completed, are discarded.
    pub fn submit(&self, node: NodeId, settings: JobSettings) -> JobId {
        self.debug_assert_owner("submit");
        let mut queues = self.lock();
        let before = queues.pending.len() + queues.completed.len();
        queues.pending.retain(|_, job| job.node != node);
        queues.completed.retain(|job| job.node != node);
        let superseded = before - queues.pending.len() - queues.completed.len();

        let id = JobId(queues.next_id);
        queues.next_id += 1;
        queues.pending.insert(
            id,
            BuildJob {
                id,
                node,
                settings,
                produced: None,
            },
        );
        tracing::debug!(job = id.0, %node, superseded, "proxy job submitted");
        id
    }

    /// Records a finished build. Callable from any thread.
    ///
    /// Returns `false` and drops the result if the job is unknown, which is
    /// the case after [`cancel_all`](Self::cancel_all), after a newer job for
    /// the same node, or when the same result is delivered twice.
    pub fn on_result(&self, id: JobId, produced: ProducedAssets) -> bool {
        let mut queues = self.lock();
        match queues.pending.remove(&id) {
            Some(mut job) => {
                job.produced = Some(produced);
                queues.completed.push_back(job);
                true
            }
            None => {
                tracing::trace!(job = id.0, "dropping result for unknown proxy job");
                false
            }
        }
    }

    /// A completion closure that delivers into this coordinator.
    ///
    /// Holds only a weak reference, so results arriving after the
    /// coordinator is gone are dropped.
    pub fn completion(self: &Arc<Self>) -> ProxyCompletion {
        let coordinator = Arc::downgrade(self);
        Box::new(move |id, produced| match coordinator.upgrade() {
            Some(coordinator) => {
                coordinator.on_result(id, produced);
            }
            None => tracing::trace!(job = id.0, "coordinator dropped before proxy result"),
        })
    }

    /// Applies every completed job to `tree`. Never blocks: if a worker holds
    /// the lock the call returns an empty report and the jobs wait for the
    /// next frame.
    pub fn drain(&self, tree: &mut HlodTree, messages: &mut MessageLog) -> DrainReport {
        self.debug_assert_owner("drain");
        let completed = match self.queues.try_lock() {
            Ok(mut queues) => std::mem::take(&mut queues.completed),
            Err(TryLockError::Poisoned(poisoned)) => {
                std::mem::take(&mut poisoned.into_inner().completed)
            }
            Err(TryLockError::WouldBlock) => return DrainReport::default(),
        };

        let mut report = DrainReport::default();
        for job in completed {
            apply_job(job, tree, messages, &mut report);
        }
        if !report.is_empty() {
            tracing::debug!(
                applied = report.applied,
                failed = report.failed,
                stale = report.stale,
                "drained proxy results"
            );
        }
        report
    }

    /// Forgets every pending and completed job. Returns how many were dropped.
    pub fn cancel_all(&self) -> usize {
        let mut queues = self.lock();
        let dropped = queues.pending.len() + queues.completed.len();
        queues.pending.clear();
        queues.completed.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "cancelled proxy jobs");
        }
        dropped
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn completed_count(&self) -> usize {
        self.lock().completed.len()
    }

    pub fn is_pending(&self, id: JobId) -> bool {
        self.lock().pending.contains_key(&id)
    }

    /// No job is waiting for a result or for a drain.
    pub fn is_idle(&self) -> bool {
        let queues = self.lock();
        queues.pending.is_empty() && queues.completed.is_empty()
    }
}

fn apply_job(job: BuildJob, tree: &mut HlodTree, messages: &mut MessageLog, report: &mut DrainReport) {
    let Some(node) = tree.get_mut(job.node) else {
        report.stale += 1;
        tracing::trace!(job = job.id.0, node = %job.node, "proxy result for destroyed node");
        return;
    };
    let produced = job.produced.unwrap_or_default();

    let Some(mesh) = produced.mesh else {
        report.failed += 1;
        node.dirty = true;
        messages.error(
            MessageCategory::ProxyBuild,
            Some(node.id),
            format!("proxy build for {} produced no mesh", node.name),
        );
        return;
    };

    if let Some(max) = job.settings.max_vertices
        && mesh.vertex_count > max
    {
        report.over_budget += 1;
        messages.warn(
            MessageCategory::IndexBudget,
            Some(node.id),
            format!(
                "proxy {} has {} vertices, more than the {max} the platform index format addresses",
                mesh.name, mesh.vertex_count
            ),
        );
    }

    node.proxy = Some(mesh);
    node.location = produced.origin;
    node.sub_assets = produced.sub_assets;
    node.draw_distance = draw_distance_from_screen_size(
        node.bounds.radius,
        job.settings.level_settings.transition_screen_size,
        &job.settings.view,
    );
    if node.revision == job.settings.revision {
        node.dirty = false;
    } else {
        report.outdated += 1;
        messages.info(
            MessageCategory::Coordinator,
            Some(node.id),
            format!("{} changed while its proxy was building; it stays dirty", node.name),
        );
    }
    report.applied += 1;
}
