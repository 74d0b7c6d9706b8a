//! Level-by-level cluster generation.
//!
//! A level build gathers candidates (eligible leaves, plus the parentless
//! nodes of the level below), groups the ones inside authored volumes,
//! scores every remaining pair, merges overlapping candidates over a few
//! greedy passes and turns the surviving clusters into [`LodNode`]s. Proxy
//! meshes for those nodes are requested through the [`ProxyCoordinator`].
//!
//! [`LodNode`]: crate::node::LodNode

use std::sync::Arc;

use nebula_config::{HlodConfig, LevelSettings};
use rustc_hash::FxHashSet;

use crate::cluster::{Cluster, ClusterEntry};
use crate::cluster_utils::{
    self, Eligibility, ViewProjection, draw_distance_from_screen_size, leaf_actors,
};
use crate::error::HlodError;
use crate::merge::{
    AssetPackageProvider, DefaultPackageProvider, MergeComponent, MeshMergeService, ProxyRequest,
};
use crate::messages::{MessageCategory, MessageLog};
use crate::node::{HlodTree, NodeId};
use crate::proxy::{DrainReport, JobId, JobSettings, ProxyCoordinator};
use crate::scene::{ClusterMember, Mobility, SceneQuery};

/// Why a build request did nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// HLOD generation is switched off.
    Disabled,
    /// No levels are configured.
    NoConfiguration,
}

/// One accepted cluster.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterSummary {
    pub node: NodeId,
    pub member_count: usize,
    pub cost: f32,
    pub filling_factor: f32,
    pub radius: f32,
}

/// Result of clustering one level.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LevelReport {
    pub level: u32,
    pub nodes_created: usize,
    pub clusters: Vec<ClusterSummary>,
    /// Candidates left without a node on this level.
    pub unclustered: usize,
    pub jobs_submitted: usize,
    pub merge_passes: u32,
    pub skipped: Option<SkipReason>,
}

impl LevelReport {
    fn skipped(level: u32, reason: SkipReason) -> Self {
        Self {
            level,
            skipped: Some(reason),
            ..Self::default()
        }
    }
}

/// Builds and maintains the HLOD hierarchy of one loaded level.
///
/// Owns the node arena and the proxy coordinator; both live exactly as long
/// as the builder. Dropping the builder cancels every outstanding proxy job.
pub struct ClusterBuilder<S: SceneQuery, M: MeshMergeService> {
    scene: S,
    merge_service: M,
    packages: Box<dyn AssetPackageProvider>,
    config: HlodConfig,
    view: ViewProjection,
    tree: HlodTree,
    coordinator: Arc<ProxyCoordinator>,
    messages: MessageLog,
    log_cluster_details: bool,
}

impl<S: SceneQuery, M: MeshMergeService> ClusterBuilder<S, M> {
    pub fn new(scene: S, merge_service: M, config: HlodConfig) -> Self {
        let view = ViewProjection::from_config(&config.view);
        Self {
            scene,
            merge_service,
            packages: Box::new(DefaultPackageProvider::default()),
            config,
            view,
            tree: HlodTree::new(),
            coordinator: Arc::new(ProxyCoordinator::new()),
            messages: MessageLog::new(),
            log_cluster_details: false,
        }
    }

    /// Replaces the default package provider.
    pub fn with_package_provider(mut self, packages: Box<dyn AssetPackageProvider>) -> Self {
        self.packages = packages;
        self
    }

    /// Log every accepted cluster at info level.
    pub fn with_cluster_details(mut self, enabled: bool) -> Self {
        self.log_cluster_details = enabled;
        self
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    pub fn tree(&self) -> &HlodTree {
        &self.tree
    }

    pub fn config(&self) -> &HlodConfig {
        &self.config
    }

    pub fn merge_service(&self) -> &M {
        &self.merge_service
    }

    pub fn coordinator(&self) -> &Arc<ProxyCoordinator> {
        &self.coordinator
    }

    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    pub fn messages_mut(&mut self) -> &mut MessageLog {
        &mut self.messages
    }

    fn skip_reason(&mut self) -> Option<SkipReason> {
        let reason = if !self.config.enabled {
            SkipReason::Disabled
        } else if self.config.levels.is_empty() {
            SkipReason::NoConfiguration
        } else {
            return None;
        };
        let text = match reason {
            SkipReason::Disabled => "HLOD generation is disabled; nothing to build",
            SkipReason::NoConfiguration => "no HLOD levels are configured; nothing to build",
        };
        self.messages.warn(MessageCategory::Configuration, None, text);
        Some(reason)
    }

    fn level_settings(&self, level: u32) -> Result<LevelSettings, HlodError> {
        self.config
            .level(level)
            .cloned()
            .ok_or(HlodError::LevelOutOfRange {
                level,
                configured: self.config.level_count(),
            })
    }

    // --- Level builds ---

    /// Clusters `level` from scratch, replacing its nodes and every node
    /// above it. Proxy jobs are submitted for the new nodes when
    /// `make_meshes` is set.
    pub fn build_level(&mut self, level: u32, make_meshes: bool) -> Result<LevelReport, HlodError> {
        if let Some(reason) = self.skip_reason() {
            return Ok(LevelReport::skipped(level, reason));
        }
        let settings = self.level_settings(level)?;

        let cleared = self.clear_levels_from(level);
        if cleared > 0 {
            tracing::debug!(level, cleared, "cleared previous HLOD nodes");
        }

        let mut report = self.cluster_level(level, &settings)?;
        if make_meshes {
            let nodes: Vec<NodeId> = report.clusters.iter().map(|c| c.node).collect();
            report.jobs_submitted = self.submit_builds(&nodes, level, &settings);
        }

        tracing::info!(
            level,
            nodes = report.nodes_created,
            unclustered = report.unclustered,
            passes = report.merge_passes,
            jobs = report.jobs_submitted,
            "HLOD level built"
        );
        Ok(report)
    }

    /// Structural pass only: nodes are created but no proxies are built.
    pub fn preview_level(&mut self, level: u32) -> Result<LevelReport, HlodError> {
        self.build_level(level, false)
    }

    /// Builds every configured level in order.
    pub fn build_all(&mut self, make_meshes: bool) -> Result<Vec<LevelReport>, HlodError> {
        if let Some(reason) = self.skip_reason() {
            return Ok(vec![LevelReport::skipped(1, reason)]);
        }
        let levels = self.config.level_count() as u32;
        (1..=levels)
            .map(|level| self.build_level(level, make_meshes))
            .collect()
    }

    /// Requests proxies for the dirty nodes of `level`, or all of them when
    /// `force` is set. Returns the number of jobs submitted.
    pub fn build_meshes(&mut self, level: u32, force: bool) -> Result<usize, HlodError> {
        if self.skip_reason().is_some() {
            return Ok(0);
        }
        let settings = self.level_settings(level)?;
        let nodes: Vec<NodeId> = self
            .tree
            .nodes_at_level(level)
            .into_iter()
            .filter(|id| force || self.tree.get(*id).is_some_and(|n| n.dirty))
            .collect();
        Ok(self.submit_builds(&nodes, level, &settings))
    }

    /// Rebuilds the proxy of a single node. `Ok(None)` when HLOD is disabled.
    pub fn build_node(&mut self, node: NodeId, level: u32) -> Result<Option<JobId>, HlodError> {
        if self.skip_reason().is_some() {
            return Ok(None);
        }
        let settings = self.level_settings(level)?;
        let actual = self.tree.get(node).ok_or(HlodError::UnknownNode(node))?.level;
        if actual != level {
            return Err(HlodError::NodeLevelMismatch {
                node,
                actual,
                requested: level,
            });
        }
        self.submit_build(node, level, &settings).map(Some)
    }

    /// Destroys every node on `level`. Higher nodes left without children
    /// are destroyed with them. Returns the number of nodes destroyed.
    pub fn clear_level(&mut self, level: u32) -> usize {
        let mut destroyed = 0;
        for id in self.tree.nodes_at_level(level) {
            destroyed += cluster_utils::destroy_node(&mut self.scene, &mut self.tree, id).len();
        }
        destroyed
    }

    /// Destroys the whole hierarchy and cancels outstanding proxy jobs.
    pub fn clear_all(&mut self) -> usize {
        self.coordinator.cancel_all();
        let mut destroyed = 0;
        for id in self.tree.ids() {
            destroyed += cluster_utils::destroy_node(&mut self.scene, &mut self.tree, id).len();
        }
        self.tree.clear();
        destroyed
    }

    /// Applies finished proxy builds. Call once per frame.
    pub fn tick(&mut self) -> DrainReport {
        self.coordinator.drain(&mut self.tree, &mut self.messages)
    }

    fn clear_levels_from(&mut self, level: u32) -> usize {
        let Some(top) = self.tree.iter().map(|n| n.level).max() else {
            return 0;
        };
        (level..=top).rev().map(|l| self.clear_level(l)).sum()
    }

    // --- Clustering ---

    fn gather_candidates(&self, level: u32) -> Vec<ClusterEntry> {
        let mut candidates = Vec::new();
        if level > 1 {
            for id in self.tree.nodes_at_level(level - 1) {
                if let Some(node) = self.tree.get(id)
                    && node.parent().is_none()
                {
                    candidates.push(ClusterEntry {
                        member: ClusterMember::Node(id),
                        bounds: node.bounds,
                    });
                }
            }
        }

        let mut actors = self.scene.actor_ids();
        actors.sort_unstable();
        let mut skipped = 0usize;
        for actor in actors {
            let eligibility = cluster_utils::eligibility(
                &self.scene,
                &self.tree,
                actor,
                level,
                self.config.min_bound_radius_m,
            );
            match (eligibility, self.scene.bounds(actor)) {
                (Eligibility::Eligible, Some(bounds)) => candidates.push(ClusterEntry {
                    member: ClusterMember::Actor(actor),
                    bounds,
                }),
                (reason, _) => {
                    skipped += 1;
                    tracing::trace!(%actor, ?reason, level, "actor not clustered");
                }
            }
        }
        tracing::debug!(level, candidates = candidates.len(), skipped, "gathered HLOD candidates");
        candidates
    }

    /// Pulls candidates inside authored volumes into one cluster per volume.
    fn group_by_volumes(
        &self,
        level: u32,
        candidates: Vec<ClusterEntry>,
    ) -> (Vec<Cluster>, Vec<ClusterEntry>) {
        let volumes: Vec<_> = self
            .scene
            .hlod_volumes()
            .into_iter()
            .filter(|v| v.applies_to(level))
            .collect();
        if volumes.is_empty() {
            return (Vec::new(), candidates);
        }

        let mut groups: Vec<Vec<ClusterEntry>> = vec![Vec::new(); volumes.len()];
        let mut remaining = Vec::new();
        for entry in candidates {
            let location = cluster_utils::member_location(&self.scene, &self.tree, entry.member);
            let volume = location.and_then(|p| volumes.iter().position(|v| v.encloses(p)));
            match volume {
                Some(index) => groups[index].push(entry),
                None => remaining.push(entry),
            }
        }
        let clusters = groups
            .iter()
            .filter(|g| !g.is_empty())
            .map(|g| Cluster::from_volume(g))
            .collect();
        (clusters, remaining)
    }

    fn cluster_level(&mut self, level: u32, settings: &LevelSettings) -> Result<LevelReport, HlodError> {
        let highest_cost = settings.highest_allowed_cost();
        let candidates = self.gather_candidates(level);
        let candidate_count = candidates.len();

        let (volume_clusters, free) = self.group_by_volumes(level, candidates);
        let mut clusters = generate_pairs(&free, highest_cost);
        let passes = merge_passes(&mut clusters, highest_cost, self.config.max_merge_passes);
        tracing::debug!(
            level,
            pairs = clusters.len(),
            volumes = volume_clusters.len(),
            passes,
            highest_cost,
            "merged HLOD clusters"
        );

        let mut report = LevelReport {
            level,
            merge_passes: passes,
            ..LevelReport::default()
        };
        let mut claimed: FxHashSet<ClusterMember> = FxHashSet::default();
        let tagged = volume_clusters
            .iter()
            .map(|c| (c, true))
            .chain(clusters.iter().map(|c| (c, false)));
        for (cluster, from_volume) in tagged {
            if !cluster.is_valid() {
                continue;
            }
            debug_assert!(!cluster.is_empty(), "valid cluster without members");

            let free_entries: Vec<ClusterEntry> = cluster
                .entries()
                .iter()
                .filter(|e| !claimed.contains(&e.member))
                .copied()
                .collect();
            if free_entries.is_empty() || free_entries.len() < settings.min_actors_to_build {
                if from_volume {
                    self.messages.info(
                        MessageCategory::Clustering,
                        None,
                        format!(
                            "HLOD{level}: volume kept {} of {} actors, below the minimum of {}",
                            free_entries.len(),
                            cluster.len(),
                            settings.min_actors_to_build
                        ),
                    );
                }
                continue;
            }
            let accepted = match (free_entries.len() == cluster.len(), from_volume) {
                (true, _) => cluster.clone(),
                (false, true) => Cluster::from_volume(&free_entries),
                (false, false) => Cluster::from_entries(&free_entries),
            };
            if !accepted.is_valid() || (!from_volume && accepted.cost() > highest_cost) {
                continue;
            }

            let node = self.create_node(level, settings, &accepted)?;
            claimed.extend(accepted.members());
            report.clusters.push(ClusterSummary {
                node,
                member_count: accepted.len(),
                cost: accepted.cost(),
                filling_factor: accepted.filling_factor(),
                radius: accepted.bounds().radius,
            });
        }

        report.nodes_created = report.clusters.len();
        report.unclustered = candidate_count - claimed.len();
        self.messages.info(
            MessageCategory::Clustering,
            None,
            format!(
                "HLOD{level}: {} clusters from {candidate_count} candidates, {} left unclustered",
                report.nodes_created, report.unclustered
            ),
        );
        Ok(report)
    }

    fn create_node(
        &mut self,
        level: u32,
        settings: &LevelSettings,
        cluster: &Cluster,
    ) -> Result<NodeId, HlodError> {
        let node = self.tree.create_node(level, cluster.bounds());
        for member in cluster.members() {
            cluster_utils::add_child(&mut self.scene, &mut self.tree, node, member)?;
        }
        if let Some(n) = self.tree.get_mut(node) {
            n.draw_distance = draw_distance_from_screen_size(
                n.bounds.radius,
                settings.transition_screen_size,
                &self.view,
            );
        }
        if self.log_cluster_details {
            tracing::info!(
                %node,
                level,
                members = cluster.len(),
                cost = cluster.cost(),
                filling_factor = cluster.filling_factor(),
                radius = cluster.bounds().radius,
                "accepted HLOD cluster"
            );
        }
        Ok(node)
    }

    // --- Proxy builds ---

    fn submit_builds(&mut self, nodes: &[NodeId], level: u32, settings: &LevelSettings) -> usize {
        let mut submitted = 0;
        for &node in nodes {
            match self.submit_build(node, level, settings) {
                Ok(_) => submitted += 1,
                Err(err) => tracing::debug!(%node, %err, "proxy build not submitted"),
            }
        }
        submitted
    }

    /// Static, meshed components of every actor below `node`.
    fn merge_components(&self, node: NodeId) -> Vec<MergeComponent> {
        let mut components = Vec::new();
        for actor in leaf_actors(&self.tree, node) {
            let Some(world_bounds) = self.scene.bounds(actor) else {
                continue;
            };
            for component in self.scene.components(actor) {
                if component.mesh.is_some() && component.mobility != Mobility::Movable {
                    components.push(MergeComponent {
                        actor,
                        component: component.clone(),
                        world_bounds,
                    });
                }
            }
        }
        components
    }

    fn submit_build(
        &mut self,
        node: NodeId,
        level: u32,
        settings: &LevelSettings,
    ) -> Result<JobId, HlodError> {
        let (name, bounds, revision) = {
            let n = self.tree.get(node).ok_or(HlodError::UnknownNode(node))?;
            (n.name.clone(), n.bounds, n.revision)
        };
        let components = self.merge_components(node);
        if components.is_empty() {
            self.messages.error(
                MessageCategory::ProxyBuild,
                Some(node),
                format!("{name} has no static components to merge"),
            );
            return Err(HlodError::NoMergeableComponents(node));
        }

        let job = self.coordinator.submit(
            node,
            JobSettings {
                level,
                level_settings: settings.clone(),
                view: self.view,
                max_vertices: self.config.index_format.max_vertices(),
                revision,
            },
        );
        let request = ProxyRequest {
            job,
            node,
            level,
            components,
            settings: settings.proxy.clone(),
            simplify: settings.simplify_mesh,
            package: self.packages.package_for(level, &name),
            name_hint: name,
            bounds,
        };

        if self.merge_service.supports_async() {
            self.merge_service
                .create_proxy_async(request, self.coordinator.completion());
        } else {
            let produced = self.merge_service.merge_components_to_static_mesh(&request);
            self.coordinator.on_result(job, produced);
            self.coordinator.drain(&mut self.tree, &mut self.messages);
        }
        Ok(job)
    }
}

impl<S: SceneQuery, M: MeshMergeService> Drop for ClusterBuilder<S, M> {
    fn drop(&mut self) {
        self.coordinator.cancel_all();
    }
}

/// Every pair of entries whose cluster cost is within `highest_cost`,
/// sorted by cost. Equal costs keep generation order.
pub(crate) fn generate_pairs(entries: &[ClusterEntry], highest_cost: f32) -> Vec<Cluster> {
    let mut clusters = Vec::new();
    for (i, a) in entries.iter().enumerate() {
        for b in &entries[i + 1..] {
            let pair = Cluster::from_pair(*a, *b);
            if pair.cost() <= highest_cost {
                clusters.push(pair);
            }
        }
    }
    clusters.sort_by(|a, b| a.cost().total_cmp(&b.cost()));
    clusters
}

/// Greedy overlap resolution over cost-sorted clusters.
///
/// Each valid cluster is compared with every earlier valid cluster sharing a
/// member: it is merged into the earlier one when the merge stays within
/// `highest_cost`, otherwise the earlier cluster's members are taken out of
/// it. Stops after `max_passes` or once a pass changes nothing, and returns
/// the number of passes run.
pub(crate) fn merge_passes(clusters: &mut [Cluster], highest_cost: f32, max_passes: u32) -> u32 {
    let mut passes = 0;
    while passes < max_passes {
        passes += 1;
        let mut changed = false;
        for i in 0..clusters.len() {
            let (earlier, rest) = clusters.split_at_mut(i);
            let current = &mut rest[0];
            if !current.is_valid() {
                continue;
            }
            for previous in earlier.iter_mut() {
                if !previous.is_valid() || !previous.contains(current) {
                    continue;
                }
                changed = true;
                let merged = previous.merged(current);
                if merged.cost() <= highest_cost {
                    *previous = merged;
                    current.invalidate();
                    break;
                }
                current.subtract(previous);
                if !current.is_valid() {
                    break;
                }
            }
        }
        if !changed {
            break;
        }
    }
    passes
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
