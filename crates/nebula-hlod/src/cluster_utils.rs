//! Eligibility checks, hierarchy mutation and draw-distance math.
//!
//! Hierarchy edits keep three things in sync: a node's child list, the
//! child's parent link (on the node, or on the actor's components), and the
//! bounds/dirty state of every node whose children changed. Nodes emptied by
//! an edit are destroyed, and the destruction walks up the parent chain in a
//! loop until it reaches a node that still has children.

use glam::{Mat4, Vec3};
use nebula_config::{LevelSettings, ViewConfig};
use nebula_math::BoundingSphere;

use crate::error::HlodError;
use crate::node::{HlodTree, NodeId};
use crate::scene::{ActorId, ClusterMember, Mobility, SceneQuery};

/// Why an actor may or may not take part in clustering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Hidden,
    /// HLOD generation switched off for the actor, or the actor is unknown.
    Disabled,
    AlreadyClustered,
    /// Bounds degenerate or no larger than the configured minimum radius.
    TooSmall,
    ExcludedMovingComponent,
    ExcludedFromLevel,
    NoRenderableComponents,
}

impl Eligibility {
    pub fn is_eligible(self) -> bool {
        self == Eligibility::Eligible
    }
}

/// Classifies a leaf actor for clustering on `level`.
pub fn eligibility<S: SceneQuery + ?Sized>(
    scene: &S,
    tree: &HlodTree,
    actor: ActorId,
    level: u32,
    min_bound_radius: f32,
) -> Eligibility {
    let Some(flags) = scene.flags(actor) else {
        return Eligibility::Disabled;
    };
    if flags.hidden {
        return Eligibility::Hidden;
    }
    if !flags.hlod_enabled {
        return Eligibility::Disabled;
    }
    if flags.is_excluded_from(level) {
        return Eligibility::ExcludedFromLevel;
    }

    let components = scene.components(actor);
    if components.iter().all(|c| c.mesh.is_none()) {
        return Eligibility::NoRenderableComponents;
    }
    if components.iter().any(|c| c.mobility == Mobility::Movable) {
        return Eligibility::ExcludedMovingComponent;
    }
    if parent_of(scene, tree, actor).is_some() {
        return Eligibility::AlreadyClustered;
    }

    match scene.bounds(actor) {
        Some(bounds) if !bounds.is_degenerate() && bounds.radius > min_bound_radius => {
            Eligibility::Eligible
        }
        _ => Eligibility::TooSmall,
    }
}

// --- Hierarchy queries ---

/// Live HLOD node an actor is represented by, found through its components.
pub fn parent_of<S: SceneQuery + ?Sized>(scene: &S, tree: &HlodTree, actor: ActorId) -> Option<NodeId> {
    scene
        .components(actor)
        .iter()
        .filter_map(|c| c.lod_parent)
        .find(|id| tree.contains(*id))
}

/// Parent of either kind of member.
pub fn member_parent<S: SceneQuery + ?Sized>(
    scene: &S,
    tree: &HlodTree,
    member: ClusterMember,
) -> Option<NodeId> {
    match member {
        ClusterMember::Actor(actor) => parent_of(scene, tree, actor),
        ClusterMember::Node(node) => tree.get(node).and_then(|n| n.parent),
    }
}

pub fn member_bounds<S: SceneQuery + ?Sized>(
    scene: &S,
    tree: &HlodTree,
    member: ClusterMember,
) -> Option<BoundingSphere> {
    match member {
        ClusterMember::Actor(actor) => scene.bounds(actor),
        ClusterMember::Node(node) => tree.get(node).map(|n| n.bounds),
    }
}

/// Pivot used to test a member against authored volumes.
pub fn member_location<S: SceneQuery + ?Sized>(
    scene: &S,
    tree: &HlodTree,
    member: ClusterMember,
) -> Option<Vec3> {
    match member {
        ClusterMember::Actor(actor) => scene.location(actor),
        ClusterMember::Node(node) => tree.get(node).map(|n| n.bounds.center),
    }
}

/// Every actor below `node`. Direct actor children come before those of
/// nested nodes.
pub fn leaf_actors(tree: &HlodTree, node: NodeId) -> Vec<ActorId> {
    let mut leaves = Vec::new();
    let mut stack = vec![node];
    while let Some(id) = stack.pop() {
        let Some(current) = tree.get(id) else {
            continue;
        };
        for child in &current.children {
            if let ClusterMember::Actor(actor) = *child {
                leaves.push(actor);
            }
        }
        for child in current.children.iter().rev() {
            if let ClusterMember::Node(n) = *child {
                stack.push(n);
            }
        }
    }
    leaves
}

fn is_ancestor_or_self(tree: &HlodTree, candidate: NodeId, start: NodeId) -> bool {
    let mut current = Some(start);
    while let Some(id) = current {
        if id == candidate {
            return true;
        }
        current = tree.get(id).and_then(|n| n.parent);
    }
    false
}

// --- Hierarchy mutation ---

fn set_member_parent<S: SceneQuery + ?Sized>(
    scene: &mut S,
    tree: &mut HlodTree,
    member: ClusterMember,
    parent: Option<NodeId>,
) {
    match member {
        ClusterMember::Actor(actor) => scene.set_lod_parent(actor, parent),
        ClusterMember::Node(node) => {
            if let Some(n) = tree.get_mut(node) {
                n.parent = parent;
            }
        }
    }
}

fn detach(tree: &mut HlodTree, parent: NodeId, member: ClusterMember) {
    if let Some(node) = tree.get_mut(parent) {
        node.children.retain(|c| *c != member);
    }
}

/// After a child left `node`: refresh it, or destroy it and continue upward
/// while parents end up empty. Returns the destroyed ids.
fn settle_after_removal<S: SceneQuery + ?Sized>(
    scene: &mut S,
    tree: &mut HlodTree,
    node: NodeId,
) -> Vec<NodeId> {
    let mut destroyed = Vec::new();
    let mut current = node;
    loop {
        let Some(n) = tree.get(current) else {
            break;
        };
        if !n.children.is_empty() {
            refresh_bounds(scene, tree, current);
            mark_dirty(tree, current);
            break;
        }
        let parent = n.parent;
        tree.remove(current);
        destroyed.push(current);
        match parent {
            Some(p) => {
                detach(tree, p, ClusterMember::Node(current));
                current = p;
            }
            None => break,
        }
    }
    destroyed
}

/// Makes `member` a child of `node`, taking it away from its previous parent.
///
/// A previous parent left empty is destroyed, cascading upward.
pub fn add_child<S: SceneQuery + ?Sized>(
    scene: &mut S,
    tree: &mut HlodTree,
    node: NodeId,
    member: ClusterMember,
) -> Result<(), HlodError> {
    if !tree.contains(node) {
        return Err(HlodError::UnknownNode(node));
    }
    if let ClusterMember::Node(child) = member {
        if !tree.contains(child) {
            return Err(HlodError::UnknownNode(child));
        }
        if is_ancestor_or_self(tree, child, node) {
            return Err(HlodError::CyclicHierarchy { node, child });
        }
    }

    let previous = member_parent(&*scene, tree, member);
    if previous == Some(node) {
        return Ok(());
    }
    if let Some(old) = previous {
        detach(tree, old, member);
    }
    if let Some(n) = tree.get_mut(node) {
        n.children.push(member);
    }
    set_member_parent(scene, tree, member, Some(node));
    refresh_bounds(scene, tree, node);
    mark_dirty(tree, node);

    if let Some(old) = previous {
        settle_after_removal(scene, tree, old);
    }
    Ok(())
}

/// Removes `member` from `node`. Returns the nodes destroyed because they
/// were left without children.
pub fn remove_child<S: SceneQuery + ?Sized>(
    scene: &mut S,
    tree: &mut HlodTree,
    node: NodeId,
    member: ClusterMember,
) -> Result<Vec<NodeId>, HlodError> {
    let n = tree.get(node).ok_or(HlodError::UnknownNode(node))?;
    if !n.children.contains(&member) {
        return Ok(Vec::new());
    }
    detach(tree, node, member);
    set_member_parent(scene, tree, member, None);
    Ok(settle_after_removal(scene, tree, node))
}

/// Destroys `node`. Its children become unparented; its parent loses a child
/// and is destroyed in turn if that was the last one.
pub fn destroy_node<S: SceneQuery + ?Sized>(
    scene: &mut S,
    tree: &mut HlodTree,
    node: NodeId,
) -> Vec<NodeId> {
    let Some(removed) = tree.remove(node) else {
        return Vec::new();
    };
    for child in &removed.children {
        set_member_parent(scene, tree, *child, None);
    }

    let mut destroyed = vec![node];
    if let Some(parent) = removed.parent {
        detach(tree, parent, ClusterMember::Node(node));
        destroyed.extend(settle_after_removal(scene, tree, parent));
    }
    destroyed
}

/// Moves every child of `source` into `target` and destroys `source`.
///
/// Both nodes must be on the same level. Returns the destroyed ids.
pub fn merge_nodes<S: SceneQuery + ?Sized>(
    scene: &mut S,
    tree: &mut HlodTree,
    target: NodeId,
    source: NodeId,
) -> Result<Vec<NodeId>, HlodError> {
    let target_level = tree.get(target).ok_or(HlodError::UnknownNode(target))?.level;
    let source_level = tree.get(source).ok_or(HlodError::UnknownNode(source))?.level;
    if target == source {
        return Ok(Vec::new());
    }
    if source_level != target_level {
        return Err(HlodError::NodeLevelMismatch {
            node: source,
            actual: source_level,
            requested: target_level,
        });
    }
    if is_ancestor_or_self(tree, source, target) {
        return Err(HlodError::CyclicHierarchy {
            node: target,
            child: source,
        });
    }

    let children = tree
        .get_mut(source)
        .map(|n| std::mem::take(&mut n.children))
        .unwrap_or_default();
    for child in &children {
        set_member_parent(scene, tree, *child, Some(target));
    }
    if let Some(n) = tree.get_mut(target) {
        n.children.extend(children);
    }
    refresh_bounds(scene, tree, target);
    mark_dirty(tree, target);

    Ok(destroy_node(scene, tree, source))
}

/// Flags `node` and all of its ancestors for a proxy rebuild.
pub fn mark_dirty(tree: &mut HlodTree, node: NodeId) {
    let mut current = Some(node);
    while let Some(id) = current {
        let Some(n) = tree.get_mut(id) else {
            break;
        };
        n.dirty = true;
        n.revision += 1;
        current = n.parent;
    }
}

/// Recomputes a node's bounds from its children. Unbuilt nodes also move
/// their pivot to the new center.
pub fn refresh_bounds<S: SceneQuery + ?Sized>(scene: &S, tree: &mut HlodTree, node: NodeId) {
    let Some(n) = tree.get(node) else {
        return;
    };
    let bounds = n
        .children
        .iter()
        .filter_map(|c| member_bounds(scene, tree, *c))
        .reduce(|acc, b| acc.union(&b));
    let Some(bounds) = bounds else {
        return;
    };
    if let Some(n) = tree.get_mut(node) {
        n.bounds = bounds;
        if n.proxy.is_none() {
            n.location = bounds.center;
        }
    }
}

// --- Screen size / draw distance ---

/// Projection used to relate on-screen size to world distance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewProjection {
    pub matrix: Mat4,
}

impl ViewProjection {
    /// Perspective projection for the configured horizontal FOV and viewport.
    pub fn from_config(view: &ViewConfig) -> Self {
        let aspect = view.width.max(1) as f32 / view.height.max(1) as f32;
        let half_h = view.horizontal_fov_deg.to_radians() * 0.5;
        let fov_y = 2.0 * (half_h.tan() / aspect).atan();
        Self {
            matrix: Mat4::perspective_rh(fov_y, aspect, 0.01, 100_000.0),
        }
    }

    /// Larger of the two half-scale terms of the projection.
    pub fn screen_multiple(&self) -> f32 {
        (0.5 * self.matrix.x_axis.x).max(0.5 * self.matrix.y_axis.y)
    }
}

impl Default for ViewProjection {
    fn default() -> Self {
        Self::from_config(&ViewConfig::default())
    }
}

/// Distance at which a sphere of `radius` covers `screen_size` of the screen.
pub fn draw_distance_from_screen_size(radius: f32, screen_size: f32, view: &ViewProjection) -> f32 {
    let screen_radius = (screen_size * 0.5).max(f32::EPSILON);
    view.screen_multiple() * radius / screen_radius
}

/// Fraction of the screen covered by a sphere of `radius` at `distance`.
pub fn screen_size_at_distance(radius: f32, distance: f32, view: &ViewProjection) -> f32 {
    2.0 * view.screen_multiple() * radius / distance.max(0.01)
}

/// Coarsest level whose transition threshold `screen_size` has fallen below,
/// walking levels in order. `None` while above level 1's threshold.
pub fn level_for_screen_size(levels: &[LevelSettings], screen_size: f32) -> Option<u32> {
    let mut selected = None;
    for (index, settings) in levels.iter().enumerate() {
        if screen_size >= settings.transition_screen_size {
            break;
        }
        selected = Some(index as u32 + 1);
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{ActorFlags, PrimitiveComponent, SceneActor, SceneGraph};

    fn scene_with(n: usize) -> (SceneGraph, Vec<ActorId>) {
        let mut scene = SceneGraph::new();
        let ids = (0..n)
            .map(|i| scene.spawn(SceneActor::sphere(Vec3::new(i as f32, 0.0, 0.0), 1.0)))
            .collect();
        (scene, ids)
    }

    fn node_with(
        scene: &mut SceneGraph,
        tree: &mut HlodTree,
        level: u32,
        members: &[ClusterMember],
    ) -> NodeId {
        let node = tree.create_node(level, BoundingSphere::default());
        for m in members {
            add_child(scene, tree, node, *m).unwrap();
        }
        node
    }

    /// Each exclusion reason is reported before bounds are looked at.
    #[test]
    fn test_eligibility_reasons() {
        let mut scene = SceneGraph::new();
        let tree = HlodTree::new();
        let ok = scene.spawn(SceneActor::sphere(Vec3::ZERO, 1.0));
        let hidden = scene.spawn(SceneActor::sphere(Vec3::ZERO, 1.0).with_flags(ActorFlags {
            hidden: true,
            ..ActorFlags::default()
        }));
        let disabled = scene.spawn(SceneActor::sphere(Vec3::ZERO, 1.0).with_flags(ActorFlags {
            hlod_enabled: false,
            ..ActorFlags::default()
        }));
        let excluded = scene.spawn(SceneActor::sphere(Vec3::ZERO, 1.0).with_flags(ActorFlags {
            excluded_levels: 1,
            ..ActorFlags::default()
        }));
        let mut moving = PrimitiveComponent::static_mesh("door", 8, 4);
        moving.mobility = Mobility::Movable;
        let movable = scene.spawn(SceneActor::sphere(Vec3::ZERO, 1.0).with_components(vec![moving]));
        let empty = scene.spawn(SceneActor::sphere(Vec3::ZERO, 1.0).with_components(Vec::new()));
        let tiny = scene.spawn(SceneActor::sphere(Vec3::ZERO, 0.05));
        let point = scene.spawn(SceneActor::sphere(Vec3::ZERO, 0.0));

        let check = |actor| eligibility(&scene, &tree, actor, 1, 0.1);
        assert_eq!(check(ok), Eligibility::Eligible);
        assert_eq!(check(hidden), Eligibility::Hidden);
        assert_eq!(check(disabled), Eligibility::Disabled);
        assert_eq!(check(excluded), Eligibility::ExcludedFromLevel);
        assert_eq!(check(movable), Eligibility::ExcludedMovingComponent);
        assert_eq!(check(empty), Eligibility::NoRenderableComponents);
        assert_eq!(check(tiny), Eligibility::TooSmall);
        assert_eq!(check(point), Eligibility::TooSmall);
        assert_eq!(check(ActorId(999)), Eligibility::Disabled);
        assert_eq!(eligibility(&scene, &tree, excluded, 2, 0.1), Eligibility::Eligible);
    }

    /// An actor placed under a node is reported as already clustered.
    #[test]
    fn test_eligibility_already_clustered() {
        let (mut scene, ids) = scene_with(2);
        let mut tree = HlodTree::new();
        let node = node_with(&mut scene, &mut tree, 1, &[ids[0].into()]);
        assert_eq!(parent_of(&scene, &tree, ids[0]), Some(node));
        assert_eq!(eligibility(&scene, &tree, ids[0], 1, 0.0), Eligibility::AlreadyClustered);
        assert_eq!(eligibility(&scene, &tree, ids[1], 1, 0.0), Eligibility::Eligible);
    }

    /// Adding children grows the bounds and marks the node dirty.
    #[test]
    fn test_add_child_updates_bounds() {
        let (mut scene, ids) = scene_with(3);
        let mut tree = HlodTree::new();
        let node = node_with(&mut scene, &mut tree, 1, &[ids[0].into(), ids[2].into()]);
        let n = tree.get(node).unwrap();
        assert_eq!(n.children().len(), 2);
        assert!((n.bounds.radius - 2.0).abs() < 1e-5);
        assert!((n.bounds.center.x - 1.0).abs() < 1e-5);
        assert!(n.dirty);
    }

    /// Moving an actor to another node empties and destroys its old parent.
    #[test]
    fn test_add_child_moves_from_previous_parent() {
        let (mut scene, ids) = scene_with(2);
        let mut tree = HlodTree::new();
        let a = node_with(&mut scene, &mut tree, 1, &[ids[0].into()]);
        let b = node_with(&mut scene, &mut tree, 1, &[ids[1].into()]);
        add_child(&mut scene, &mut tree, b, ids[0].into()).unwrap();
        assert!(!tree.contains(a));
        assert_eq!(tree.get(b).unwrap().children().len(), 2);
        assert_eq!(parent_of(&scene, &tree, ids[0]), Some(b));
    }

    /// A node cannot become its own ancestor.
    #[test]
    fn test_add_child_rejects_cycles() {
        let (mut scene, ids) = scene_with(1);
        let mut tree = HlodTree::new();
        let low = node_with(&mut scene, &mut tree, 1, &[ids[0].into()]);
        let high = node_with(&mut scene, &mut tree, 2, &[low.into()]);
        assert_eq!(
            add_child(&mut scene, &mut tree, low, high.into()),
            Err(HlodError::CyclicHierarchy { node: low, child: high })
        );
        assert_eq!(
            add_child(&mut scene, &mut tree, low, low.into()),
            Err(HlodError::CyclicHierarchy { node: low, child: low })
        );
        assert_eq!(
            add_child(&mut scene, &mut tree, NodeId(77), ids[0].into()),
            Err(HlodError::UnknownNode(NodeId(77)))
        );
    }

    /// Removing the last child destroys the node and every emptied ancestor.
    #[test]
    fn test_remove_child_cascades_upward() {
        let (mut scene, ids) = scene_with(2);
        let mut tree = HlodTree::new();
        let l1 = node_with(&mut scene, &mut tree, 1, &[ids[0].into()]);
        let l2 = node_with(&mut scene, &mut tree, 2, &[l1.into()]);
        let l3 = node_with(&mut scene, &mut tree, 3, &[l2.into()]);
        let other = node_with(&mut scene, &mut tree, 2, &[ids[1].into()]);
        add_child(&mut scene, &mut tree, l3, other.into()).unwrap();

        let destroyed = remove_child(&mut scene, &mut tree, l1, ids[0].into()).unwrap();
        assert_eq!(destroyed, vec![l1, l2]);
        assert!(tree.contains(l3));
        assert_eq!(tree.get(l3).unwrap().children(), &[ClusterMember::Node(other)]);
        assert!(parent_of(&scene, &tree, ids[0]).is_none());
    }

    /// Cascades through a deep chain without recursion.
    #[test]
    fn test_deep_cascade() {
        let (mut scene, ids) = scene_with(1);
        let mut tree = HlodTree::new();
        let mut below: ClusterMember = ids[0].into();
        for level in 1..=5000 {
            let node = node_with(&mut scene, &mut tree, level, &[below]);
            below = node.into();
        }
        assert_eq!(tree.len(), 5000);
        let first = tree.ids()[0];
        let destroyed = remove_child(&mut scene, &mut tree, first, ids[0].into()).unwrap();
        assert_eq!(destroyed.len(), 5000);
        assert!(tree.is_empty());
    }

    /// Destroying a node unparents its children and prunes its parent.
    #[test]
    fn test_destroy_node_unparents_children() {
        let (mut scene, ids) = scene_with(2);
        let mut tree = HlodTree::new();
        let low = node_with(&mut scene, &mut tree, 1, &[ids[0].into(), ids[1].into()]);
        let high = node_with(&mut scene, &mut tree, 2, &[low.into()]);
        let destroyed = destroy_node(&mut scene, &mut tree, low);
        assert_eq!(destroyed, vec![low, high]);
        assert!(parent_of(&scene, &tree, ids[0]).is_none());
        assert!(scene.components(ids[1]).iter().all(|c| c.lod_parent.is_none()));
        assert!(destroy_node(&mut scene, &mut tree, low).is_empty());
    }

    /// Merging moves children and destroys the source node.
    #[test]
    fn test_merge_nodes() {
        let (mut scene, ids) = scene_with(3);
        let mut tree = HlodTree::new();
        let a = node_with(&mut scene, &mut tree, 1, &[ids[0].into()]);
        let b = node_with(&mut scene, &mut tree, 1, &[ids[1].into(), ids[2].into()]);
        let destroyed = merge_nodes(&mut scene, &mut tree, a, b).unwrap();
        assert_eq!(destroyed, vec![b]);
        assert_eq!(tree.get(a).unwrap().children().len(), 3);
        assert_eq!(parent_of(&scene, &tree, ids[2]), Some(a));
        assert_eq!(leaf_actors(&tree, a), vec![ids[0], ids[1], ids[2]]);
    }

    /// Nodes on different levels are not merged.
    #[test]
    fn test_merge_nodes_level_mismatch() {
        let (mut scene, ids) = scene_with(2);
        let mut tree = HlodTree::new();
        let a = node_with(&mut scene, &mut tree, 1, &[ids[0].into()]);
        let b = node_with(&mut scene, &mut tree, 2, &[ids[1].into()]);
        assert_eq!(
            merge_nodes(&mut scene, &mut tree, a, b),
            Err(HlodError::NodeLevelMismatch {
                node: b,
                actual: 2,
                requested: 1
            })
        );
    }

    /// Dirty marks and revisions propagate to every ancestor.
    #[test]
    fn test_mark_dirty_walks_ancestors() {
        let (mut scene, ids) = scene_with(1);
        let mut tree = HlodTree::new();
        let low = node_with(&mut scene, &mut tree, 1, &[ids[0].into()]);
        let high = node_with(&mut scene, &mut tree, 2, &[low.into()]);
        for id in [low, high] {
            tree.get_mut(id).unwrap().dirty = false;
        }
        let before = tree.get(high).unwrap().revision;
        mark_dirty(&mut tree, low);
        assert!(tree.get(low).unwrap().dirty);
        assert!(tree.get(high).unwrap().dirty);
        assert_eq!(tree.get(high).unwrap().revision, before + 1);
    }

    /// The reference view is 90 degrees wide at 16:9.
    #[test]
    fn test_reference_screen_multiple() {
        let view = ViewProjection::default();
        assert!((view.screen_multiple() - 16.0 / 18.0).abs() < 1e-4);
    }

    /// Draw distance and screen size are inverse conversions.
    #[test]
    fn test_draw_distance_round_trip() {
        let view = ViewProjection::default();
        let distance = draw_distance_from_screen_size(10.0, 0.25, &view);
        assert!(distance > 0.0);
        let size = screen_size_at_distance(10.0, distance, &view);
        assert!((size - 0.25).abs() < 1e-4);
        assert!(draw_distance_from_screen_size(10.0, 0.0, &view).is_finite());
        assert!(screen_size_at_distance(10.0, 0.0, &view).is_finite());
    }

    /// Smaller screen sizes select coarser levels.
    #[test]
    fn test_level_for_screen_size() {
        let levels = vec![
            LevelSettings {
                transition_screen_size: 0.3,
                ..LevelSettings::default()
            },
            LevelSettings {
                transition_screen_size: 0.1,
                ..LevelSettings::default()
            },
        ];
        assert_eq!(level_for_screen_size(&levels, 0.5), None);
        assert_eq!(level_for_screen_size(&levels, 0.2), Some(1));
        assert_eq!(level_for_screen_size(&levels, 0.05), Some(2));
        assert_eq!(level_for_screen_size(&[], 0.05), None);
    }
}
