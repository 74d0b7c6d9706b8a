//! The narrow view of the scene graph the clustering algorithm depends on.
//!
//! Leaf renderables are addressed by [`ActorId`] and queried through
//! [`SceneQuery`]; the subsystem never owns them. [`SceneGraph`] is a plain
//! in-memory implementation used by tools and tests.

use std::collections::BTreeMap;
use std::fmt;

use glam::Vec3;
use nebula_math::{Aabb, BoundingSphere};

use crate::node::NodeId;

/// Opaque identifier of a leaf renderable owned by the scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId(pub u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

/// Anything a cluster can hold: a scene leaf or a nested HLOD node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClusterMember {
    /// A leaf renderable in the scene.
    Actor(ActorId),
    /// A node produced by a lower HLOD level.
    Node(NodeId),
}

impl fmt::Display for ClusterMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterMember::Actor(id) => id.fmt(f),
            ClusterMember::Node(id) => id.fmt(f),
        }
    }
}

impl From<ActorId> for ClusterMember {
    fn from(id: ActorId) -> Self {
        ClusterMember::Actor(id)
    }
}

impl From<NodeId> for ClusterMember {
    fn from(id: NodeId) -> Self {
        ClusterMember::Node(id)
    }
}

/// How a component is allowed to move at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Mobility {
    /// Never moves.
    #[default]
    Static,
    /// Never moves but may change lighting.
    Stationary,
    /// Free to move; cannot be baked into a proxy.
    Movable,
}

/// A renderable component attached to an actor.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct PrimitiveComponent {
    /// Component name, unique within its actor.
    pub name: String,
    /// Runtime mobility.
    pub mobility: Mobility,
    /// Source mesh asset, if any.
    pub mesh: Option<String>,
    /// Vertex count of the source mesh.
    pub vertex_count: u32,
    /// Triangle count of the source mesh.
    pub triangle_count: u32,
    /// HLOD node this component is currently represented by.
    pub lod_parent: Option<NodeId>,
}

impl PrimitiveComponent {
    /// A static mesh component with the given geometry size.
    pub fn static_mesh(name: impl Into<String>, vertex_count: u32, triangle_count: u32) -> Self {
        let name = name.into();
        Self {
            mesh: Some(format!("SM_{name}")),
            name,
            mobility: Mobility::Static,
            vertex_count,
            triangle_count,
            lod_parent: None,
        }
    }
}

/// Per-actor switches that gate HLOD generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActorFlags {
    /// Hidden in game.
    pub hidden: bool,
    /// Whether the actor takes part in automatic HLOD generation.
    pub hlod_enabled: bool,
    /// Bitmask of HLOD levels the actor is excluded from (bit 0 = level 1).
    pub excluded_levels: u32,
}

impl Default for ActorFlags {
    fn default() -> Self {
        Self {
            hidden: false,
            hlod_enabled: true,
            excluded_levels: 0,
        }
    }
}

impl ActorFlags {
    /// Returns true if the actor opted out of the given one-based level.
    pub fn is_excluded_from(&self, level: u32) -> bool {
        (1..=32).contains(&level) && self.excluded_levels & (1 << (level - 1)) != 0
    }
}

/// An authored volume whose enclosed actors are always grouped together.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HlodVolume {
    /// World-space extent of the volume.
    pub bounds: Aabb,
    /// Restricts the volume to one level; `None` applies to every level.
    pub level: Option<u32>,
}

impl HlodVolume {
    /// Returns true if the volume groups actors on the given level.
    pub fn applies_to(&self, level: u32) -> bool {
        self.level.is_none_or(|l| l == level)
    }

    /// Returns true if the point lies inside the volume.
    pub fn encloses(&self, point: Vec3) -> bool {
        self.bounds.contains_point(point)
    }
}

/// Capabilities the clustering algorithm needs from the scene graph.
///
/// All methods are called from the thread that owns the scene.
pub trait SceneQuery {
    /// All leaf actors, in any order.
    fn actor_ids(&self) -> Vec<ActorId>;

    /// World-space bounding sphere of an actor.
    fn bounds(&self, actor: ActorId) -> Option<BoundingSphere>;

    /// World-space pivot of an actor.
    fn location(&self, actor: ActorId) -> Option<Vec3>;

    /// Renderable components of an actor (empty for unknown actors).
    fn components(&self, actor: ActorId) -> &[PrimitiveComponent];

    /// HLOD switches of an actor; `None` for unknown actors.
    fn flags(&self, actor: ActorId) -> Option<ActorFlags>;

    /// Points every component of the actor at a new HLOD parent.
    fn set_lod_parent(&mut self, actor: ActorId, parent: Option<NodeId>);

    /// Authored grouping volumes.
    fn hlod_volumes(&self) -> Vec<HlodVolume> {
        Vec::new()
    }
}

/// A leaf actor stored in a [`SceneGraph`].
#[derive(Clone, Debug, PartialEq)]
pub struct SceneActor {
    /// World-space bounds.
    pub bounds: BoundingSphere,
    /// World-space pivot.
    pub location: Vec3,
    /// HLOD switches.
    pub flags: ActorFlags,
    /// Renderable components.
    pub components: Vec<PrimitiveComponent>,
}

impl SceneActor {
    /// A static actor with one mesh component, pivoted at its bounds center.
    pub fn new(bounds: BoundingSphere) -> Self {
        Self {
            location: bounds.center,
            bounds,
            flags: ActorFlags::default(),
            components: vec![PrimitiveComponent::static_mesh("mesh", 24, 12)],
        }
    }

    /// A default actor bounded by a sphere at `center` with `radius` meters.
    pub fn sphere(center: Vec3, radius: f32) -> Self {
        Self::new(BoundingSphere::new(center, radius))
    }

    /// Replace the flags.
    pub fn with_flags(mut self, flags: ActorFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Replace the components.
    pub fn with_components(mut self, components: Vec<PrimitiveComponent>) -> Self {
        self.components = components;
        self
    }
}

/// In-memory scene: actors keyed by id plus authored volumes.
#[derive(Clone, Debug, Default)]
pub struct SceneGraph {
    actors: BTreeMap<ActorId, SceneActor>,
    volumes: Vec<HlodVolume>,
    next_id: u64,
}

impl SceneGraph {
    /// Creates an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an actor and returns its id.
    pub fn spawn(&mut self, actor: SceneActor) -> ActorId {
        let id = ActorId(self.next_id);
        self.next_id += 1;
        self.actors.insert(id, actor);
        id
    }

    /// Removes an actor.
    pub fn despawn(&mut self, id: ActorId) -> Option<SceneActor> {
        self.actors.remove(&id)
    }

    /// Borrow an actor.
    pub fn get(&self, id: ActorId) -> Option<&SceneActor> {
        self.actors.get(&id)
    }

    /// Mutably borrow an actor.
    pub fn get_mut(&mut self, id: ActorId) -> Option<&mut SceneActor> {
        self.actors.get_mut(&id)
    }

    /// Adds an authored grouping volume.
    pub fn add_volume(&mut self, volume: HlodVolume) {
        self.volumes.push(volume);
    }

    /// Number of actors.
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    /// Returns `true` if the scene has no actors.
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}

impl SceneQuery for SceneGraph {
    fn actor_ids(&self) -> Vec<ActorId> {
        self.actors.keys().copied().collect()
    }

    fn bounds(&self, actor: ActorId) -> Option<BoundingSphere> {
        self.actors.get(&actor).map(|a| a.bounds)
    }

    fn location(&self, actor: ActorId) -> Option<Vec3> {
        self.actors.get(&actor).map(|a| a.location)
    }

    fn components(&self, actor: ActorId) -> &[PrimitiveComponent] {
        self.actors
            .get(&actor)
            .map(|a| a.components.as_slice())
            .unwrap_or(&[])
    }

    fn flags(&self, actor: ActorId) -> Option<ActorFlags> {
        self.actors.get(&actor).map(|a| a.flags)
    }

    fn set_lod_parent(&mut self, actor: ActorId, parent: Option<NodeId>) {
        if let Some(a) = self.actors.get_mut(&actor) {
            for component in &mut a.components {
                component.lod_parent = parent;
            }
        }
    }

    fn hlod_volumes(&self) -> Vec<HlodVolume> {
        self.volumes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_assigns_sequential_ids() {
        let mut scene = SceneGraph::new();
        let a = scene.spawn(SceneActor::sphere(Vec3::ZERO, 1.0));
        let b = scene.spawn(SceneActor::sphere(Vec3::X, 1.0));
        assert_eq!(a, ActorId(0));
        assert_eq!(b, ActorId(1));
        assert_eq!(scene.actor_ids(), vec![a, b]);
    }

    #[test]
    fn test_set_lod_parent_updates_every_component() {
        let mut scene = SceneGraph::new();
        let actor = scene.spawn(SceneActor::sphere(Vec3::ZERO, 1.0).with_components(vec![
            PrimitiveComponent::static_mesh("a", 3, 1),
            PrimitiveComponent::static_mesh("b", 3, 1),
        ]));
        scene.set_lod_parent(actor, Some(NodeId(7)));
        assert!(
            scene
                .components(actor)
                .iter()
                .all(|c| c.lod_parent == Some(NodeId(7)))
        );
    }

    #[test]
    fn test_unknown_actor_queries_are_empty() {
        let scene = SceneGraph::new();
        assert!(scene.bounds(ActorId(3)).is_none());
        assert!(scene.flags(ActorId(3)).is_none());
        assert!(scene.components(ActorId(3)).is_empty());
    }

    #[test]
    fn test_level_exclusion_mask() {
        let flags = ActorFlags {
            excluded_levels: 0b10,
            ..ActorFlags::default()
        };
        assert!(!flags.is_excluded_from(1));
        assert!(flags.is_excluded_from(2));
        assert!(!flags.is_excluded_from(0));
        assert!(!flags.is_excluded_from(40));
    }

    #[test]
    fn test_volume_level_filter() {
        let volume = HlodVolume {
            bounds: Aabb::new(Vec3::ZERO, Vec3::ONE),
            level: Some(2),
        };
        assert!(!volume.applies_to(1));
        assert!(volume.applies_to(2));
        assert!(volume.encloses(Vec3::splat(0.5)));
        assert!(!volume.encloses(Vec3::splat(1.5)));
    }
}
