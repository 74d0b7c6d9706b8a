//! Hierarchical level of detail (HLOD) for static scenes.
//!
//! Small static actors are grouped into clusters by a bounding-sphere cost
//! model, each accepted cluster becomes a [`LodNode`], and nodes of one level
//! are clustered again into the next. Proxy meshes for the nodes are built by
//! an external [`MeshMergeService`], possibly on worker threads, and applied
//! on the owning thread by [`ProxyCoordinator::drain`].

pub mod builder;
pub mod cluster;
pub mod cluster_utils;
mod error;
pub mod merge;
pub mod messages;
pub mod node;
pub mod proxy;
pub mod scene;

pub use builder::{ClusterBuilder, ClusterSummary, LevelReport, SkipReason};
pub use cluster::{Cluster, ClusterEntry, filling_factor, overlap_volume};
pub use cluster_utils::{
    Eligibility, ViewProjection, draw_distance_from_screen_size, level_for_screen_size,
    screen_size_at_distance,
};
pub use error::HlodError;
pub use merge::{
    AssetPackageProvider, DefaultPackageProvider, MergeComponent, MergeWorkerPool,
    MeshMergeService, PackageRef, ProducedAssets, ProxyCompletion, ProxyRequest,
};
pub use messages::{HlodMessage, MessageCategory, MessageLog, Severity};
pub use node::{AssetRef, HlodTree, LevelStats, LodNode, NodeId, ProxyMesh, TreeStats};
pub use proxy::{BuildJob, DrainReport, JobId, JobSettings, ProxyCoordinator};
pub use scene::{
    ActorFlags, ActorId, ClusterMember, HlodVolume, Mobility, PrimitiveComponent, SceneActor,
    SceneGraph, SceneQuery,
};
