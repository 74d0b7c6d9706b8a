//! Interfaces to the mesh merge service and the asset package allocator,
//! plus a thread pool that turns any synchronous merge into an async one.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

use glam::Vec3;
use nebula_config::ProxySettings;
use nebula_math::BoundingSphere;

use crate::node::{AssetRef, NodeId, ProxyMesh};
use crate::proxy::JobId;
use crate::scene::{ActorId, PrimitiveComponent};

/// One component to bake into a proxy.
#[derive(Clone, Debug, PartialEq)]
pub struct MergeComponent {
    pub actor: ActorId,
    pub component: PrimitiveComponent,
    pub world_bounds: BoundingSphere,
}

/// Output location for produced assets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageRef {
    pub path: String,
}

/// Everything the merge service needs to build one proxy.
///
/// Owned data only, so requests can cross to worker threads.
#[derive(Clone, Debug)]
pub struct ProxyRequest {
    pub job: JobId,
    pub node: NodeId,
    pub level: u32,
    pub components: Vec<MergeComponent>,
    pub settings: ProxySettings,
    /// Simplify the merged geometry instead of concatenating it.
    pub simplify: bool,
    pub package: PackageRef,
    pub name_hint: String,
    pub bounds: BoundingSphere,
}

/// What a merge produced. `mesh` is `None` when the build failed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProducedAssets {
    pub mesh: Option<ProxyMesh>,
    pub sub_assets: Vec<AssetRef>,
    /// World position the proxy mesh is authored around.
    pub origin: Vec3,
}

/// Called exactly once per async request, from any thread.
pub type ProxyCompletion = Box<dyn FnOnce(JobId, ProducedAssets) + Send + 'static>;

/// Builds proxy meshes from scene components.
pub trait MeshMergeService {
    /// Whether [`create_proxy_async`](Self::create_proxy_async) returns before
    /// the proxy is built.
    fn supports_async(&self) -> bool {
        false
    }

    /// Starts a proxy build and reports the result through `on_result`.
    ///
    /// The default runs the synchronous merge inline.
    fn create_proxy_async(&self, request: ProxyRequest, on_result: ProxyCompletion) {
        let produced = self.merge_components_to_static_mesh(&request);
        on_result(request.job, produced);
    }

    /// Builds a proxy on the calling thread.
    fn merge_components_to_static_mesh(&self, request: &ProxyRequest) -> ProducedAssets;
}

impl<F> MeshMergeService for F
where
    F: Fn(&ProxyRequest) -> ProducedAssets,
{
    fn merge_components_to_static_mesh(&self, request: &ProxyRequest) -> ProducedAssets {
        self(request)
    }
}

/// Allocates output packages for proxy assets.
pub trait AssetPackageProvider {
    fn package_for(&self, level: u32, name_hint: &str) -> PackageRef;
}

/// Places every proxy under `<root>/HLOD<level>/<name>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefaultPackageProvider {
    pub root: String,
}

impl Default for DefaultPackageProvider {
    fn default() -> Self {
        Self {
            root: "/Game/HLOD".to_string(),
        }
    }
}

impl AssetPackageProvider for DefaultPackageProvider {
    fn package_for(&self, level: u32, name_hint: &str) -> PackageRef {
        PackageRef {
            path: format!("{}/HLOD{level}/{name_hint}", self.root.trim_end_matches('/')),
        }
    }
}

type MergeFn = dyn Fn(&ProxyRequest) -> ProducedAssets + Send + Sync;

struct MergeTask {
    request: ProxyRequest,
    on_result: ProxyCompletion,
}

/// Async [`MeshMergeService`] that runs a synchronous merge function on a
/// pool of OS threads.
///
/// Requests are queued on an unbounded channel and each worker calls the
/// request's completion closure itself. Dropping the pool finishes queued
/// work and joins the workers.
pub struct MergeWorkerPool {
    task_sender: Option<crossbeam_channel::Sender<MergeTask>>,
    worker_handles: Vec<JoinHandle<()>>,
    in_flight: Arc<AtomicUsize>,
    merge: Arc<MergeFn>,
}

impl MergeWorkerPool {
    /// Spawns `worker_count` (at least one) named worker threads.
    pub fn new<F>(worker_count: usize, merge: F) -> std::io::Result<Self>
    where
        F: Fn(&ProxyRequest) -> ProducedAssets + Send + Sync + 'static,
    {
        let (task_tx, task_rx) = crossbeam_channel::unbounded::<MergeTask>();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let merge: Arc<MergeFn> = Arc::new(merge);
        let worker_count = worker_count.max(1);

        let mut handles = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let rx = task_rx.clone();
            let flight = Arc::clone(&in_flight);
            let merge = Arc::clone(&merge);
            let handle = std::thread::Builder::new()
                .name(format!("hlod-merge-worker-{index}"))
                .spawn(move || {
                    while let Ok(task) = rx.recv() {
                        let produced = merge(&task.request);
                        tracing::trace!(
                            job = task.request.job.0,
                            node = %task.request.node,
                            built = produced.mesh.is_some(),
                            "proxy merge finished"
                        );
                        (task.on_result)(task.request.job, produced);
                        flight.fetch_sub(1, Ordering::Relaxed);
                    }
                })?;
            handles.push(handle);
        }

        tracing::debug!(workers = worker_count, "merge worker pool started");
        Ok(Self {
            task_sender: Some(task_tx),
            worker_handles: handles,
            in_flight,
            merge,
        })
    }

    /// Pool sized to the machine, leaving one core for the main thread.
    pub fn with_defaults<F>(merge: F) -> std::io::Result<Self>
    where
        F: Fn(&ProxyRequest) -> ProducedAssets + Send + Sync + 'static,
    {
        Self::new(num_cpus::get().saturating_sub(1).max(1), merge)
    }

    /// Requests queued or running.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_handles.len()
    }

    /// Closes the queue and joins every worker once queued requests finish.
    pub fn shutdown(&mut self) {
        self.task_sender.take();
        for handle in self.worker_handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl MeshMergeService for MergeWorkerPool {
    fn supports_async(&self) -> bool {
        self.task_sender.is_some()
    }

    fn create_proxy_async(&self, request: ProxyRequest, on_result: ProxyCompletion) {
        let Some(sender) = &self.task_sender else {
            tracing::warn!(job = request.job.0, "merge pool is shut down, merging inline");
            let produced = (self.merge)(&request);
            on_result(request.job, produced);
            return;
        };
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        if let Err(crossbeam_channel::SendError(task)) = sender.send(MergeTask { request, on_result }) {
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
            let produced = (self.merge)(&task.request);
            (task.on_result)(task.request.job, produced);
        }
    }

    fn merge_components_to_static_mesh(&self, request: &ProxyRequest) -> ProducedAssets {
        (self.merge)(request)
    }
}

impl Drop for MergeWorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn request(job: u64) -> ProxyRequest {
        ProxyRequest {
            job: JobId(job),
            node: NodeId(job),
            level: 1,
            components: vec![MergeComponent {
                actor: ActorId(0),
                component: PrimitiveComponent::static_mesh("rock", 100, 50),
                world_bounds: BoundingSphere::new(Vec3::ZERO, 1.0),
            }],
            settings: ProxySettings::default(),
            simplify: true,
            package: PackageRef {
                path: "/Game/HLOD/HLOD1/test".into(),
            },
            name_hint: "test".into(),
            bounds: BoundingSphere::new(Vec3::ZERO, 1.0),
        }
    }

    fn count_vertices(request: &ProxyRequest) -> ProducedAssets {
        let vertex_count = request.components.iter().map(|c| c.component.vertex_count).sum();
        ProducedAssets {
            mesh: Some(ProxyMesh {
                name: request.package.path.clone(),
                vertex_count,
                triangle_count: vertex_count / 2,
            }),
            sub_assets: Vec::new(),
            origin: request.bounds.center,
        }
    }

    /// Package paths are grouped by level.
    #[test]
    fn test_default_package_provider_path() {
        let provider = DefaultPackageProvider {
            root: "/Game/Maps/HLOD/".into(),
        };
        assert_eq!(provider.package_for(2, "HLOD2_7").path, "/Game/Maps/HLOD/HLOD2/HLOD2_7");
    }

    /// Plain closures act as synchronous merge services.
    #[test]
    fn test_closure_service_runs_inline() {
        let service = count_vertices;
        assert!(!service.supports_async());
        let (tx, rx) = crossbeam_channel::unbounded();
        service.create_proxy_async(
            request(3),
            Box::new(move |job, produced| {
                let _ = tx.send((job, produced));
            }),
        );
        let (job, produced) = rx.try_recv().unwrap();
        assert_eq!(job, JobId(3));
        assert_eq!(produced.mesh.unwrap().vertex_count, 100);
    }

    /// Every request submitted to the pool completes on a worker thread.
    #[test]
    fn test_pool_completes_every_request() {
        let pool = MergeWorkerPool::new(3, count_vertices).unwrap();
        assert!(pool.supports_async());
        assert_eq!(pool.worker_count(), 3);

        let (tx, rx) = crossbeam_channel::unbounded();
        for job in 0..20 {
            let tx = tx.clone();
            pool.create_proxy_async(
                request(job),
                Box::new(move |id, _| {
                    let name = std::thread::current().name().map(str::to_owned);
                    let _ = tx.send((id, name));
                }),
            );
        }

        let start = Instant::now();
        let mut seen = Vec::new();
        while seen.len() < 20 {
            if let Ok((id, name)) = rx.recv_timeout(Duration::from_millis(50)) {
                assert!(name.unwrap_or_default().starts_with("hlod-merge-worker-"));
                seen.push(id);
            }
            assert!(start.elapsed() < Duration::from_secs(10), "merge pool timed out");
        }
        seen.sort();
        assert_eq!(seen, (0..20).map(JobId).collect::<Vec<_>>());
    }

    /// After shutdown, requests are merged inline instead of being lost.
    #[test]
    fn test_pool_after_shutdown_merges_inline() {
        let mut pool = MergeWorkerPool::new(1, count_vertices).unwrap();
        pool.shutdown();
        assert!(!pool.supports_async());
        assert_eq!(pool.in_flight_count(), 0);

        let (tx, rx) = crossbeam_channel::unbounded();
        pool.create_proxy_async(
            request(9),
            Box::new(move |job, _| {
                let _ = tx.send(job);
            }),
        );
        assert_eq!(rx.try_recv().unwrap(), JobId(9));
    }
}
