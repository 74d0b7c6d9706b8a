//! Persistent HLOD nodes stored in an id-indexed arena.
//!
//! Nodes never point at each other directly: children and parents are
//! [`NodeId`]s resolved through [`HlodTree`]. Ids are handed out in increasing
//! order and never reused, so a stale id simply fails to resolve.

use std::collections::BTreeMap;
use std::fmt;

use glam::Vec3;
use nebula_math::BoundingSphere;
use rustc_hash::FxHashMap;

use crate::scene::ClusterMember;

/// Identifier of a node in an [`HlodTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Handle to a proxy mesh produced by the merge service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyMesh {
    /// Asset path of the mesh.
    pub name: String,
    /// Vertex count, checked against the platform index budget.
    pub vertex_count: u32,
    /// Triangle count.
    pub triangle_count: u32,
}

/// An auxiliary asset (material, texture) produced alongside a proxy mesh.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AssetRef(pub String);

/// One accepted cluster, materialized as a node of the HLOD hierarchy.
#[derive(Clone, Debug, PartialEq)]
pub struct LodNode {
    /// Arena id.
    pub id: NodeId,
    /// One-based HLOD level.
    pub level: u32,
    /// Display name, also used as the proxy asset name hint.
    pub name: String,
    /// Bounding sphere enclosing every child.
    pub bounds: BoundingSphere,
    /// World position of the proxy pivot.
    pub location: Vec3,
    /// Proxy mesh, once built.
    pub proxy: Option<ProxyMesh>,
    /// Materials and textures produced with the proxy.
    pub sub_assets: Vec<AssetRef>,
    /// Set whenever the children change; cleared when a matching proxy lands.
    pub dirty: bool,
    /// Distance beyond which the proxy replaces its children.
    pub draw_distance: f32,
    /// Bumped on every structural change; lets late proxy results be recognized.
    pub revision: u64,
    pub(crate) children: Vec<ClusterMember>,
    pub(crate) parent: Option<NodeId>,
}

impl LodNode {
    fn new(id: NodeId, level: u32, bounds: BoundingSphere) -> Self {
        Self {
            id,
            level,
            name: format!("HLOD{level}_{}", id.0),
            bounds,
            location: bounds.center,
            proxy: None,
            sub_assets: Vec::new(),
            dirty: true,
            draw_distance: 0.0,
            revision: 0,
            children: Vec::new(),
            parent: None,
        }
    }

    /// Direct children, in insertion order.
    pub fn children(&self) -> &[ClusterMember] {
        &self.children
    }

    /// Node this one is merged into at the next level.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Returns `true` once a proxy mesh has been applied.
    pub fn is_built(&self) -> bool {
        self.proxy.is_some()
    }

    /// Number of direct children that are scene actors.
    pub fn actor_child_count(&self) -> usize {
        self.children
            .iter()
            .filter(|c| matches!(c, ClusterMember::Actor(_)))
            .count()
    }
}

/// Per-level aggregate of the tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LevelStats {
    pub level: u32,
    pub nodes: usize,
    pub built: usize,
    pub dirty: usize,
    /// Direct actor children across the level's nodes.
    pub leaf_members: usize,
    pub proxy_triangles: u64,
}

/// Snapshot of the whole hierarchy, ordered by level.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub levels: Vec<LevelStats>,
}

impl TreeStats {
    /// Total node count across all levels.
    pub fn total_nodes(&self) -> usize {
        self.levels.iter().map(|l| l.nodes).sum()
    }

    /// Stats for a single level, if it has any nodes.
    pub fn level(&self, level: u32) -> Option<&LevelStats> {
        self.levels.iter().find(|l| l.level == level)
    }
}

/// Arena of every live [`LodNode`].
#[derive(Debug, Default)]
pub struct HlodTree {
    nodes: FxHashMap<NodeId, LodNode>,
    next_id: u64,
}

impl HlodTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a childless, dirty node on `level`.
    pub fn create_node(&mut self, level: u32, bounds: BoundingSphere) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, LodNode::new(id, level, bounds));
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&LodNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut LodNode> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node id, sorted.
    pub fn ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Ids of the nodes on `level`, sorted.
    pub fn nodes_at_level(&self, level: u32) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.level == level)
            .map(|n| n.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Iterate over all nodes in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &LodNode> {
        self.nodes.values()
    }

    /// Removes a node without touching its links. Callers fix up the links.
    pub(crate) fn remove(&mut self, id: NodeId) -> Option<LodNode> {
        self.nodes.remove(&id)
    }

    /// Drops every node. Ids keep increasing afterwards.
    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Aggregates node, build and triangle counts per level.
    pub fn stats(&self) -> TreeStats {
        let mut per_level: BTreeMap<u32, LevelStats> = BTreeMap::new();
        for node in self.nodes.values() {
            let entry = per_level.entry(node.level).or_insert_with(|| LevelStats {
                level: node.level,
                ..LevelStats::default()
            });
            entry.nodes += 1;
            if node.is_built() {
                entry.built += 1;
            }
            if node.dirty {
                entry.dirty += 1;
            }
            entry.leaf_members += node.actor_child_count();
            entry.proxy_triangles += node
                .proxy
                .as_ref()
                .map_or(0, |p| u64::from(p.triangle_count));
        }
        TreeStats {
            levels: per_level.into_values().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::ActorId;

    fn unit_sphere() -> BoundingSphere {
        BoundingSphere::new(Vec3::ZERO, 1.0)
    }

    /// Ids increase and are not reused after removal.
    #[test]
    fn test_ids_are_never_reused() {
        let mut tree = HlodTree::new();
        let a = tree.create_node(1, unit_sphere());
        tree.remove(a);
        let b = tree.create_node(1, unit_sphere());
        assert_ne!(a, b);
        assert!(!tree.contains(a));
        assert!(tree.contains(b));
    }

    /// New nodes start dirty, unbuilt and named after their level.
    #[test]
    fn test_new_node_defaults() {
        let mut tree = HlodTree::new();
        let id = tree.create_node(2, unit_sphere());
        let node = tree.get(id).unwrap();
        assert!(node.dirty);
        assert!(!node.is_built());
        assert_eq!(node.name, format!("HLOD2_{}", id.0));
        assert_eq!(node.location, Vec3::ZERO);
        assert!(node.parent().is_none());
    }

    /// Level queries return sorted ids of that level only.
    #[test]
    fn test_nodes_at_level() {
        let mut tree = HlodTree::new();
        let a = tree.create_node(1, unit_sphere());
        let _b = tree.create_node(2, unit_sphere());
        let c = tree.create_node(1, unit_sphere());
        assert_eq!(tree.nodes_at_level(1), vec![a, c]);
        assert_eq!(tree.nodes_at_level(3), Vec::<NodeId>::new());
    }

    /// Stats group nodes by level and sum proxy triangles.
    #[test]
    fn test_stats_per_level() {
        let mut tree = HlodTree::new();
        let a = tree.create_node(1, unit_sphere());
        let b = tree.create_node(1, unit_sphere());
        let _c = tree.create_node(2, unit_sphere());
        {
            let node = tree.get_mut(a).unwrap();
            node.children = vec![ClusterMember::Actor(ActorId(0)), ClusterMember::Actor(ActorId(1))];
            node.proxy = Some(ProxyMesh {
                name: "proxy".into(),
                vertex_count: 30,
                triangle_count: 10,
            });
            node.dirty = false;
        }
        tree.get_mut(b).unwrap().children = vec![ClusterMember::Actor(ActorId(2))];

        let stats = tree.stats();
        assert_eq!(stats.total_nodes(), 3);
        let level1 = stats.level(1).unwrap();
        assert_eq!(level1.nodes, 2);
        assert_eq!(level1.built, 1);
        assert_eq!(level1.dirty, 1);
        assert_eq!(level1.leaf_members, 3);
        assert_eq!(level1.proxy_triangles, 10);
        assert_eq!(stats.level(2).unwrap().nodes, 1);
    }
}
