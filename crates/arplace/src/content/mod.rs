//! Placed content: instantiation, anchor placement, settle-then-detach and
//! vertical lock.
//!
//! A [`ContentInstance`] is a small subtree in the [`Scene`]:
//!
//! ```text
//! parent (tracked target or session origin)
//! └── root
//!     └── wrapper
//!         ├── anchor "poster_a"
//!         └── anchor "poster_b"
//! ```
//!
//! Placement rewrites the wrapper so that the selected anchor coincides with
//! the parent's origin, then parents the root under the authoritative target.

mod anchor;
mod settle;

pub use anchor::resolve_placement;
pub use settle::{SettleStatus, SettleWatch, DEFAULT_STABLE_FRAMES};

use nalgebra::{Isometry3, UnitQuaternion, Vector3};

use crate::config::ContentPrefab;
use crate::scene::{NodeId, Scene, SceneError};

/// Rotations within this angle of yaw-only are left untouched by the
/// vertical lock.
const VERTICAL_LOCK_TOLERANCE_RAD: f64 = 1e-6;

/// Handle to a content instance inside a [`ContentRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ContentHandle(pub(crate) usize);

impl ContentHandle {
    /// Index into the registry.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Which transform the content root currently hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentingMode {
    /// Parented to the live tracked target.
    Following,
    /// Parented to the fixed session origin.
    Detached,
}

/// Outcome of [`ContentInstance::place`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementOutcome {
    /// Wrapper rewritten and root parented to the target.
    Placed,
    /// No anchor with the requested name; nothing was touched.
    AnchorNotFound,
}

#[derive(Debug, Clone)]
struct Anchor {
    name: String,
    node: NodeId,
}

/// The single augmented-content object of a session.
#[derive(Debug, Clone)]
pub struct ContentInstance {
    name: String,
    root: NodeId,
    wrapper: NodeId,
    anchors: Vec<Anchor>,
    detach_on_settle: bool,
    vertical_lock: bool,
    mode: ParentingMode,
    watch: Option<SettleWatch>,
}

impl ContentInstance {
    /// Build the content subtree from `prefab` under `parent`.
    pub fn instantiate(
        scene: &mut Scene,
        prefab: &ContentPrefab,
        parent: NodeId,
    ) -> Result<Self, SceneError> {
        let root = scene.add_node(prefab.name.as_str(), Some(parent), Isometry3::identity())?;
        let wrapper = scene.add_node(prefab.wrapper.as_str(), Some(root), Isometry3::identity())?;
        let anchors = prefab
            .anchors
            .iter()
            .map(|spec| {
                scene
                    .add_node(spec.name.as_str(), Some(wrapper), spec.pose.to_isometry())
                    .map(|node| Anchor {
                        name: spec.name.clone(),
                        node,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: prefab.name.clone(),
            root,
            wrapper,
            anchors,
            detach_on_settle: prefab.detach_on_settle,
            vertical_lock: prefab.vertical_lock,
            mode: ParentingMode::Following,
            watch: None,
        })
    }

    /// Prefab name this instance was built from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root node of the content subtree.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Main wrapper node rewritten on placement.
    pub fn wrapper(&self) -> NodeId {
        self.wrapper
    }

    /// Node of the anchor named `name` (linear scan).
    pub fn anchor(&self, name: &str) -> Option<NodeId> {
        self.anchors.iter().find(|a| a.name == name).map(|a| a.node)
    }

    /// Anchor names in prefab order.
    pub fn anchor_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.anchors.iter().map(|a| a.name.as_str())
    }

    /// Current parenting mode.
    pub fn mode(&self) -> ParentingMode {
        self.mode
    }

    /// `true` while a settle watch is pending.
    pub fn is_watching(&self) -> bool {
        self.watch.is_some()
    }

    /// Pending settle watch, if any.
    pub fn settle_watch(&self) -> Option<&SettleWatch> {
        self.watch.as_ref()
    }

    /// Drop any pending settle watch. Returns `true` if one was pending.
    pub fn cancel_settle_watch(&mut self) -> bool {
        self.watch.take().is_some()
    }

    /// Align the anchor named `anchor_name` with `target` and follow it.
    ///
    /// A pending settle watch is cancelled and the root is first moved under
    /// `origin` with its world pose kept. Content hanging off `origin` is then
    /// snapped onto the target's world pose before being parented; content
    /// already following a target keeps its local pose across the swap.
    pub fn place(
        &mut self,
        scene: &mut Scene,
        origin: NodeId,
        target: NodeId,
        anchor_name: &str,
        stable_frames: u32,
    ) -> Result<PlacementOutcome, SceneError> {
        let Some(anchor) = self.anchor(anchor_name) else {
            return Ok(PlacementOutcome::AnchorNotFound);
        };
        let target_world = scene.world_pose(target)?;
        let anchor_local = scene.local_pose(anchor)?;

        if self.cancel_settle_watch() {
            tracing::debug!("{}: settle watch cancelled by new placement", self.name);
            scene.set_parent(self.root, Some(origin), true)?;
        }

        scene.set_local_pose(self.wrapper, resolve_placement(&anchor_local))?;

        if scene.parent(self.root)? == Some(origin) {
            scene.set_world_pose(self.root, target_world)?;
            scene.set_parent(self.root, Some(target), true)?;
        } else {
            scene.set_parent(self.root, Some(target), false)?;
        }
        self.mode = ParentingMode::Following;

        if self.detach_on_settle {
            let start = scene.world_position(self.root)?;
            self.watch = Some(SettleWatch::new(start, stable_frames));
        }
        Ok(PlacementOutcome::Placed)
    }

    /// End-of-frame settle sample. Returns `true` when the content detached
    /// onto `origin` during this call.
    pub fn poll_settle(&mut self, scene: &mut Scene, origin: NodeId) -> Result<bool, SceneError> {
        let Some(watch) = self.watch.as_mut() else {
            return Ok(false);
        };
        let position = scene.world_position(self.root)?;
        match watch.observe(position) {
            SettleStatus::Settled => {
                self.watch = None;
                scene.set_parent(self.root, Some(origin), true)?;
                self.mode = ParentingMode::Detached;
                Ok(true)
            }
            status => {
                tracing::trace!("{}: settle sample {:?}", self.name, status);
                Ok(false)
            }
        }
    }

    /// Strip pitch and roll from the root's world rotation when the prefab
    /// asks for it. World position and yaw are kept.
    pub fn apply_vertical_lock(&self, scene: &mut Scene) -> Result<(), SceneError> {
        if !self.vertical_lock {
            return Ok(());
        }
        let world = scene.world_pose(self.root)?;
        let upright = yaw_only(&world.rotation);
        if world.rotation.angle_to(&upright) <= VERTICAL_LOCK_TOLERANCE_RAD {
            return Ok(());
        }
        scene.set_world_pose(self.root, Isometry3::from_parts(world.translation, upright))
    }
}

/// Rotation about +Y that keeps the heading of `rotation`.
fn yaw_only(rotation: &UnitQuaternion<f64>) -> UnitQuaternion<f64> {
    let forward = rotation * Vector3::z();
    let yaw = if forward.x.hypot(forward.z) > 1e-9 {
        forward.x.atan2(forward.z)
    } else {
        // Facing straight up or down: take the heading from the right axis.
        let right = rotation * Vector3::x();
        (-right.z).atan2(right.x)
    };
    UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw)
}

/// Scene-side owner of content instances.
///
/// Instances are never removed; deactivating a session only drops the
/// selector's handle.
#[derive(Debug, Clone, Default)]
pub struct ContentRegistry {
    instances: Vec<ContentInstance>,
}

impl ContentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of an instance.
    pub fn insert(&mut self, instance: ContentInstance) -> ContentHandle {
        self.instances.push(instance);
        ContentHandle(self.instances.len() - 1)
    }

    /// Look up an instance.
    pub fn get(&self, handle: ContentHandle) -> Option<&ContentInstance> {
        self.instances.get(handle.0)
    }

    /// Look up an instance mutably.
    pub fn get_mut(&mut self, handle: ContentHandle) -> Option<&mut ContentInstance> {
        self.instances.get_mut(handle.0)
    }

    /// Number of instances ever created.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// `true` when nothing has been instantiated.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Iterate `(handle, instance)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (ContentHandle, &ContentInstance)> + '_ {
        self.instances
            .iter()
            .enumerate()
            .map(|(i, c)| (ContentHandle(i), c))
    }

    /// Iterate `(handle, instance)` pairs mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ContentHandle, &mut ContentInstance)> + '_ {
        self.instances
            .iter_mut()
            .enumerate()
            .map(|(i, c)| (ContentHandle(i), c))
    }
}
