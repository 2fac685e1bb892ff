//! Minimal transform hierarchy.
//!
//! Stands in for the host engine's scene graph: nodes with a parent link and
//! a local pose, world poses composed on demand. Nodes are addressed by
//! [`NodeId`] handles and never removed, so a handle stays valid for the
//! lifetime of the scene.

use nalgebra::{Isometry3, Point3};

/// Handle to a node in a [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Index into the scene's node table.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Errors raised by hierarchy operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// Handle does not belong to this scene.
    UnknownNode(NodeId),
    /// Re-parenting would make a node its own ancestor.
    Cycle {
        /// Node being moved.
        node: NodeId,
        /// Requested parent.
        parent: NodeId,
    },
}

impl std::fmt::Display for SceneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownNode(id) => write!(f, "unknown scene node #{}", id.0),
            Self::Cycle { node, parent } => write!(
                f,
                "cannot parent node #{} under #{}: would create a cycle",
                node.0, parent.0
            ),
        }
    }
}

impl std::error::Error for SceneError {}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    parent: Option<NodeId>,
    local: Isometry3<f64>,
}

/// Arena of transform nodes.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    nodes: Vec<Node>,
}

impl Scene {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` when the scene has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add a node under `parent` (or at the root) with the given local pose.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        parent: Option<NodeId>,
        local: Isometry3<f64>,
    ) -> Result<NodeId, SceneError> {
        if let Some(p) = parent {
            self.node(p)?;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.into(),
            parent,
            local,
        });
        Ok(id)
    }

    /// `true` if `id` belongs to this scene.
    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    /// Node name.
    pub fn name(&self, id: NodeId) -> Result<&str, SceneError> {
        Ok(&self.node(id)?.name)
    }

    /// Current parent, `None` for root nodes.
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, SceneError> {
        Ok(self.node(id)?.parent)
    }

    /// Pose relative to the parent.
    pub fn local_pose(&self, id: NodeId) -> Result<Isometry3<f64>, SceneError> {
        Ok(self.node(id)?.local)
    }

    /// Overwrite the pose relative to the parent.
    pub fn set_local_pose(&mut self, id: NodeId, local: Isometry3<f64>) -> Result<(), SceneError> {
        self.node_mut(id)?.local = local;
        Ok(())
    }

    /// Pose in world space, composed from the root down.
    pub fn world_pose(&self, id: NodeId) -> Result<Isometry3<f64>, SceneError> {
        let node = self.node(id)?;
        match node.parent {
            Some(parent) => Ok(self.world_pose(parent)? * node.local),
            None => Ok(node.local),
        }
    }

    /// World-space origin of the node.
    pub fn world_position(&self, id: NodeId) -> Result<Point3<f64>, SceneError> {
        Ok(Point3::from(self.world_pose(id)?.translation.vector))
    }

    /// Move the node so that its world pose equals `world`, keeping its parent.
    pub fn set_world_pose(&mut self, id: NodeId, world: Isometry3<f64>) -> Result<(), SceneError> {
        let parent_world = self.parent_world(self.node(id)?.parent)?;
        self.node_mut(id)?.local = parent_world.inverse() * world;
        Ok(())
    }

    /// Re-parent a node.
    ///
    /// With `keep_world` the local pose is rewritten so the world pose is
    /// unchanged; otherwise the local pose is kept and the node moves with
    /// its new parent.
    pub fn set_parent(
        &mut self,
        id: NodeId,
        parent: Option<NodeId>,
        keep_world: bool,
    ) -> Result<(), SceneError> {
        self.node(id)?;
        if let Some(p) = parent {
            let mut cursor = Some(p);
            while let Some(current) = cursor {
                if current == id {
                    return Err(SceneError::Cycle { node: id, parent: p });
                }
                cursor = self.node(current)?.parent;
            }
        }

        if keep_world {
            let world = self.world_pose(id)?;
            let parent_world = self.parent_world(parent)?;
            self.node_mut(id)?.local = parent_world.inverse() * world;
        }
        self.node_mut(id)?.parent = parent;
        Ok(())
    }

    fn parent_world(&self, parent: Option<NodeId>) -> Result<Isometry3<f64>, SceneError> {
        match parent {
            Some(p) => self.world_pose(p),
            None => Ok(Isometry3::identity()),
        }
    }

    fn node(&self, id: NodeId) -> Result<&Node, SceneError> {
        self.nodes.get(id.0).ok_or(SceneError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, SceneError> {
        self.nodes.get_mut(id.0).ok_or(SceneError::UnknownNode(id))
    }
}
