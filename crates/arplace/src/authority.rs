//! Tracking authority selection.
//!
//! The selector mirrors the tracking subsystem's add/remove reports in a
//! working set and decides, once per frame, which target drives the placed
//! content: the only member when there is one, otherwise the member nearest
//! to the observer. A change is reported only when the winner's identity
//! differs from the current authority, so re-affirming the same target every
//! frame is silent.

use nalgebra::Point3;

use crate::content::ContentHandle;
use crate::scene::NodeId;

/// Identity of a tracked target, assigned by the tracking subsystem.
///
/// A re-detected image gets a fresh id; equal ids mean the same trackable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct TargetId(pub u64);

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "target#{}", self.0)
    }
}

/// Non-owning view of a trackable reported by the tracking subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedTarget {
    /// Trackable identity.
    pub id: TargetId,
    /// Scene node carrying the live pose.
    pub node: NodeId,
    /// Name of the reference image that was recognized.
    pub reference_name: String,
}

impl TrackedTarget {
    /// Create a target view.
    pub fn new(id: TargetId, node: NodeId, reference_name: impl Into<String>) -> Self {
        Self {
            id,
            node,
            reference_name: reference_name.into(),
        }
    }
}

/// One frame's batch of tracking changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackablesChanged {
    /// Newly detected targets.
    pub added: Vec<TrackedTarget>,
    /// Ids of targets whose tracking was lost.
    pub removed: Vec<TargetId>,
}

impl TrackablesChanged {
    /// `true` when the batch carries nothing.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// A new authoritative target was selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityChange {
    /// New authority.
    pub target: TargetId,
    /// Its scene node.
    pub node: NodeId,
    /// Its reference image name, used to pick the content anchor.
    pub reference_name: String,
}

/// Working set + authoritative pointer + content back-reference.
#[derive(Debug, Clone, Default)]
pub struct AuthoritySelector {
    working_set: Vec<TrackedTarget>,
    authoritative: Option<TargetId>,
    content: Option<ContentHandle>,
}

impl AuthoritySelector {
    /// Create an empty selector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Targets currently visible.
    pub fn working_set(&self) -> &[TrackedTarget] {
        &self.working_set
    }

    /// `true` if `id` is in the working set.
    pub fn contains(&self, id: TargetId) -> bool {
        self.working_set.iter().any(|t| t.id == id)
    }

    /// Current authority, if any.
    pub fn authoritative(&self) -> Option<TargetId> {
        self.authoritative
    }

    /// Handle of the content instance this session placed, if any.
    pub fn content(&self) -> Option<ContentHandle> {
        self.content
    }

    /// Record the content instance created for this session.
    pub fn set_content(&mut self, handle: ContentHandle) {
        self.content = Some(handle);
    }

    /// Add a detected target. A repeated report for a known id refreshes the
    /// entry in place.
    pub fn add_target(&mut self, target: TrackedTarget) {
        match self.working_set.iter_mut().find(|t| t.id == target.id) {
            Some(existing) => {
                tracing::debug!("{} reported twice; refreshing entry", target.id);
                *existing = target;
            }
            None => self.working_set.push(target),
        }
    }

    /// Drop a lost target. Unknown ids are ignored.
    ///
    /// Authority is not reassigned here; if the removed target was
    /// authoritative the pointer is cleared and the next evaluation picks a
    /// successor.
    pub fn remove_target(&mut self, id: TargetId) -> bool {
        let before = self.working_set.len();
        self.working_set.retain(|t| t.id != id);
        let removed = self.working_set.len() != before;
        if removed && self.authoritative == Some(id) {
            self.authoritative = None;
        }
        removed
    }

    /// Select the authoritative target.
    ///
    /// `position_of` resolves a target's world position; it is not called
    /// when the working set has a single member. Targets it cannot resolve
    /// are skipped. Equal distances go to the first member in iteration
    /// order.
    pub fn evaluate<F>(&mut self, observer: &Point3<f64>, mut position_of: F) -> Option<AuthorityChange>
    where
        F: FnMut(&TrackedTarget) -> Option<Point3<f64>>,
    {
        let found = match self.working_set.as_slice() {
            [] => return None,
            [only] => only,
            many => {
                let mut distance_min = f64::INFINITY;
                let mut found = None;
                for target in many {
                    let Some(position) = position_of(target) else {
                        continue;
                    };
                    let distance = nalgebra::distance(observer, &position);
                    if distance < distance_min {
                        distance_min = distance;
                        found = Some(target);
                    }
                }
                found?
            }
        };

        if self.authoritative == Some(found.id) {
            return None;
        }
        let change = AuthorityChange {
            target: found.id,
            node: found.node,
            reference_name: found.reference_name.clone(),
        };
        self.authoritative = Some(change.target);
        Some(change)
    }

    /// Forget every target, the authority and the content back-reference.
    pub fn clear(&mut self) {
        self.working_set.clear();
        self.authoritative = None;
        self.content = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    struct World {
        positions: HashMap<TargetId, Point3<f64>>,
        lookups: usize,
    }

    impl World {
        fn new() -> Self {
            Self {
                positions: HashMap::new(),
                lookups: 0,
            }
        }

        fn put(&mut self, id: u64, p: [f64; 3]) -> TrackedTarget {
            let id = TargetId(id);
            self.positions.insert(id, Point3::from(p));
            TrackedTarget::new(id, crate::test_utils::node(id.0 as usize), format!("image_{}", id.0))
        }

        fn evaluate(&mut self, selector: &mut AuthoritySelector) -> Option<AuthorityChange> {
            let positions = &self.positions;
            let lookups = &mut self.lookups;
            selector.evaluate(&Point3::origin(), |t| {
                *lookups += 1;
                positions.get(&t.id).copied()
            })
        }
    }

    #[test]
    fn empty_set_is_a_no_op() {
        let mut world = World::new();
        let mut selector = AuthoritySelector::new();
        assert_eq!(world.evaluate(&mut selector), None);
        assert_eq!(selector.authoritative(), None);
    }

    #[test]
    fn single_target_fast_path_skips_distance() {
        let mut world = World::new();
        let mut selector = AuthoritySelector::new();
        selector.add_target(world.put(1, [0.0, 0.0, 5.0]));

        let change = world.evaluate(&mut selector).expect("first selection");
        assert_eq!(change.target, TargetId(1));
        assert_eq!(change.reference_name, "image_1");
        for _ in 0..10 {
            assert_eq!(world.evaluate(&mut selector), None);
        }
        assert_eq!(world.lookups, 0);
    }

    #[test]
    fn nearest_target_wins_then_fast_path_takes_over() {
        let mut world = World::new();
        let mut selector = AuthoritySelector::new();
        selector.add_target(world.put(1, [0.0, 0.0, 2.0]));
        selector.add_target(world.put(2, [0.0, 1.5, 0.0]));

        assert_eq!(world.evaluate(&mut selector).map(|c| c.target), Some(TargetId(2)));
        assert_eq!(world.evaluate(&mut selector), None);

        assert!(selector.remove_target(TargetId(2)));
        let change = world.evaluate(&mut selector).expect("successor");
        assert_eq!(change.target, TargetId(1));
        assert_eq!(world.evaluate(&mut selector), None);
    }

    #[test]
    fn identity_not_value_decides_change() {
        let mut world = World::new();
        let mut selector = AuthoritySelector::new();
        selector.add_target(world.put(1, [0.0, 0.0, 1.0]));
        world.evaluate(&mut selector);

        selector.remove_target(TargetId(1));
        let mut twin = world.put(7, [0.0, 0.0, 1.0]);
        twin.reference_name = "image_1".to_string();
        selector.add_target(twin);
        let change = world.evaluate(&mut selector).expect("new identity");
        assert_eq!(change.target, TargetId(7));
    }

    #[test]
    fn ties_go_to_first_member() {
        let mut world = World::new();
        let mut selector = AuthoritySelector::new();
        selector.add_target(world.put(3, [1.0, 0.0, 0.0]));
        selector.add_target(world.put(4, [0.0, 1.0, 0.0]));
        assert_eq!(world.evaluate(&mut selector).map(|c| c.target), Some(TargetId(3)));
    }

    #[test]
    fn unresolvable_targets_are_skipped() {
        let mut world = World::new();
        let mut selector = AuthoritySelector::new();
        selector.add_target(world.put(1, [0.0, 0.0, 9.0]));
        selector.add_target(TrackedTarget::new(TargetId(2), crate::test_utils::node(2), "ghost"));
        assert_eq!(world.evaluate(&mut selector).map(|c| c.target), Some(TargetId(1)));
    }

    #[test]
    fn removal_of_unknown_target_is_tolerated() {
        let mut world = World::new();
        let mut selector = AuthoritySelector::new();
        selector.add_target(world.put(1, [0.0, 0.0, 1.0]));
        world.evaluate(&mut selector);
        assert!(!selector.remove_target(TargetId(42)));
        assert_eq!(selector.authoritative(), Some(TargetId(1)));
        assert_eq!(selector.working_set().len(), 1);
    }

    #[test]
    fn removing_authority_clears_pointer_without_reassigning() {
        let mut world = World::new();
        let mut selector = AuthoritySelector::new();
        selector.add_target(world.put(1, [0.0, 0.0, 1.0]));
        selector.add_target(world.put(2, [0.0, 0.0, 3.0]));
        world.evaluate(&mut selector);
        selector.remove_target(TargetId(1));
        assert_eq!(selector.authoritative(), None);
        assert!(selector.contains(TargetId(2)));
    }

    #[test]
    fn duplicate_add_keeps_membership_exact() {
        let mut world = World::new();
        let mut selector = AuthoritySelector::new();
        let t = world.put(1, [0.0, 0.0, 1.0]);
        selector.add_target(t.clone());
        selector.add_target(t);
        assert_eq!(selector.working_set().len(), 1);
    }

    #[test]
    fn clear_forgets_everything() {
        let mut world = World::new();
        let mut selector = AuthoritySelector::new();
        selector.add_target(world.put(1, [0.0, 0.0, 1.0]));
        selector.set_content(crate::test_utils::content_handle(0));
        world.evaluate(&mut selector);
        selector.clear();
        assert!(selector.working_set().is_empty());
        assert_eq!(selector.authoritative(), None);
        assert_eq!(selector.content(), None);
    }

    proptest! {
        #[test]
        fn prop_selection_minimizes_distance(
            points in prop::collection::vec(
                (-10.0..10.0f64, -10.0..10.0f64, -10.0..10.0f64),
                2..8,
            )
        ) {
            let mut world = World::new();
            let mut selector = AuthoritySelector::new();
            for (i, (x, y, z)) in points.iter().enumerate() {
                selector.add_target(world.put(i as u64, [*x, *y, *z]));
            }
            let change = world.evaluate(&mut selector).expect("non-empty set selects");
            let selected = change.target.0 as usize;
            let dist = |i: usize| {
                let (x, y, z) = points[i];
                (x * x + y * y + z * z).sqrt()
            };
            for j in 0..points.len() {
                prop_assert!(dist(selected) <= dist(j));
                if j < selected {
                    prop_assert!(dist(j) > dist(selected));
                }
            }
        }
    }
}
