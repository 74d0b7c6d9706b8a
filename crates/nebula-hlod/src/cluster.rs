//! Candidate clusters and the cost model used to score them.
//!
//! A cluster's cost is `radius³ / filling_factor`: big clusters cost more, and
//! sparse ones (low filling factor) cost much more. The filling factor is a
//! density estimate carried through merges, so a cluster built from two
//! half-empty spheres stays half-empty.

use nebula_math::{BoundingSphere, sphere_volume};

use crate::scene::ClusterMember;

/// A member together with the bounds it had when it joined.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClusterEntry {
    pub member: ClusterMember,
    pub bounds: BoundingSphere,
}

/// A group of members with a shared bounding sphere.
///
/// Entries are kept sorted by member and free of duplicates.
#[derive(Clone, Debug, PartialEq)]
pub struct Cluster {
    entries: Vec<ClusterEntry>,
    bounds: BoundingSphere,
    filling_factor: f32,
    cost: f32,
    valid: bool,
}

impl Cluster {
    /// A single-member cluster. Its filling factor is 1.
    pub fn new(member: ClusterMember, bounds: BoundingSphere) -> Self {
        Self {
            entries: vec![ClusterEntry { member, bounds }],
            bounds,
            filling_factor: 1.0,
            cost: compute_cost(bounds.radius, 1.0),
            valid: true,
        }
    }

    /// A two-member cluster bounded by the smallest sphere around both.
    pub fn from_pair(a: ClusterEntry, b: ClusterEntry) -> Self {
        Self::new(a.member, a.bounds).merged(&Self::new(b.member, b.bounds))
    }

    /// Rebuilds a cluster from scratch: empty input yields an invalid cluster,
    /// one entry a trivial cluster, more entries are merged one at a time.
    pub fn from_entries(entries: &[ClusterEntry]) -> Self {
        match entries {
            [] => Self::invalid(),
            [only] => Self::new(only.member, only.bounds),
            [first, second, rest @ ..] => {
                let mut cluster = Self::from_pair(*first, *second);
                for entry in rest {
                    cluster.merge(&Self::new(entry.member, entry.bounds));
                }
                cluster
            }
        }
    }

    /// An authored grouping: bounds enclose every entry and the filling factor
    /// is fixed at 1.
    pub fn from_volume(entries: &[ClusterEntry]) -> Self {
        let Some((first, rest)) = entries.split_first() else {
            return Self::invalid();
        };
        let bounds = rest
            .iter()
            .fold(first.bounds, |acc, e| acc.union(&e.bounds));
        let mut sorted = entries.to_vec();
        sort_entries(&mut sorted);
        Self {
            entries: sorted,
            bounds,
            filling_factor: 1.0,
            cost: compute_cost(bounds.radius, 1.0),
            valid: true,
        }
    }

    /// An empty, invalid cluster.
    pub fn invalid() -> Self {
        Self {
            entries: Vec::new(),
            bounds: BoundingSphere::default(),
            filling_factor: 0.0,
            cost: 0.0,
            valid: false,
        }
    }

    /// Absorbs `other`: members are unioned, bounds enclose both and the
    /// filling factor is recomputed from both clusters' spheres.
    pub fn merge(&mut self, other: &Cluster) {
        if !other.valid {
            return;
        }
        if !self.valid {
            *self = other.clone();
            return;
        }

        let union = self.bounds.union(&other.bounds);
        self.filling_factor = filling_factor(
            &self.bounds,
            self.filling_factor,
            &other.bounds,
            other.filling_factor,
        );
        self.bounds = union;
        self.cost = compute_cost(union.radius, self.filling_factor);

        self.entries.extend_from_slice(&other.entries);
        sort_entries(&mut self.entries);
    }

    /// Non-mutating [`merge`](Self::merge).
    pub fn merged(&self, other: &Cluster) -> Cluster {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// Removes every member of `other` and rebuilds bounds, filling factor and
    /// cost from what is left.
    pub fn subtract(&mut self, other: &Cluster) {
        let remaining: Vec<ClusterEntry> = self
            .entries
            .iter()
            .filter(|e| !other.contains_member(e.member))
            .copied()
            .collect();
        if remaining.len() != self.entries.len() {
            *self = Self::from_entries(&remaining);
        }
    }

    /// Returns `true` if the two member sets share at least one member.
    pub fn contains(&self, other: &Cluster) -> bool {
        let (mut i, mut j) = (0, 0);
        while i < self.entries.len() && j < other.entries.len() {
            match self.entries[i].member.cmp(&other.entries[j].member) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => return true,
            }
        }
        false
    }

    pub fn contains_member(&self, member: ClusterMember) -> bool {
        self.entries
            .binary_search_by(|e| e.member.cmp(&member))
            .is_ok()
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ClusterEntry] {
        &self.entries
    }

    /// Members in sorted order.
    pub fn members(&self) -> impl Iterator<Item = ClusterMember> + '_ {
        self.entries.iter().map(|e| e.member)
    }

    pub fn bounds(&self) -> BoundingSphere {
        self.bounds
    }

    pub fn filling_factor(&self) -> f32 {
        self.filling_factor
    }

    pub fn cost(&self) -> f32 {
        self.cost
    }
}

fn sort_entries(entries: &mut Vec<ClusterEntry>) {
    entries.sort_by(|a, b| a.member.cmp(&b.member));
    entries.dedup_by(|a, b| a.member == b.member);
}

/// `radius³ / filling_factor`, or 0 for degenerate bounds and `f32::MAX`
/// when the filling factor has collapsed.
fn compute_cost(radius: f32, filling_factor: f32) -> f32 {
    if radius <= 0.0 || !radius.is_finite() {
        return 0.0;
    }
    if filling_factor <= 0.0 || filling_factor.is_nan() {
        return f32::MAX;
    }
    let cost = radius.powi(3) / filling_factor;
    if cost.is_finite() { cost } else { f32::MAX }
}

/// Geometry two filled spheres have in common.
///
/// Zero when disjoint. When one sphere encloses the other the inner sphere's
/// filled volume is returned; otherwise the lens volume is scaled by both
/// filling factors.
pub fn overlap_volume(a: &BoundingSphere, fill_a: f32, b: &BoundingSphere, fill_b: f32) -> f32 {
    let dist = a.center.distance(b.center);
    if dist >= a.radius + b.radius {
        return 0.0;
    }
    if dist + a.radius <= b.radius {
        return sphere_volume(a.radius) * fill_a;
    }
    if dist + b.radius <= a.radius {
        return sphere_volume(b.radius) * fill_b;
    }
    a.intersection_volume(b) * fill_a * fill_b
}

/// Density of the sphere enclosing `a` and `b`, clamped to `[0, 1]`.
///
/// A degenerate union (zero volume) counts as fully filled.
pub fn filling_factor(a: &BoundingSphere, fill_a: f32, b: &BoundingSphere, fill_b: f32) -> f32 {
    let union_volume = a.union(b).volume();
    if union_volume <= f32::MIN_POSITIVE || !union_volume.is_finite() {
        return 1.0;
    }
    let overlap = overlap_volume(a, fill_a, b, fill_b);
    let filled = fill_a * a.volume() + fill_b * b.volume() - overlap;
    let factor = filled / union_volume;
    if factor.is_nan() {
        1.0
    } else {
        factor.clamp(0.0, 1.0)
    }
}
