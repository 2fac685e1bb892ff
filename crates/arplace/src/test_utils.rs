//! Shared builders for unit tests.

use std::cell::RefCell;
use std::rc::Rc;

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

use crate::authority::{TargetId, TrackablesChanged, TrackedTarget};
use crate::config::{AnchorSpec, ContentPrefab, ReferenceLibrary, SessionConfig};
use crate::content::ContentHandle;
use crate::events::SessionEvent;
use crate::pose::Pose;
use crate::scene::NodeId;
use crate::session::Session;

/// Raw node handle, for tests that never touch a scene.
pub(crate) fn node(index: usize) -> NodeId {
    NodeId(index)
}

/// Raw content handle.
pub(crate) fn content_handle(index: usize) -> ContentHandle {
    ContentHandle(index)
}

/// Translation plus a heading about +Y.
pub(crate) fn upright_pose(x: f64, y: f64, z: f64, yaw: f64) -> Isometry3<f64> {
    Isometry3::from_parts(
        Translation3::new(x, y, z),
        UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw),
    )
}

/// Two anchors with distinct offsets and orientations.
pub(crate) fn sample_prefab() -> ContentPrefab {
    ContentPrefab::new(
        "augment",
        vec![
            AnchorSpec::new("poster_a", Pose::from_position_euler([0.3, 0.0, 0.1], 0.0, 0.0, 0.5)),
            AnchorSpec::new("poster_b", Pose::from_position_euler([-0.4, 0.2, 0.0], 0.2, -0.1, 1.3)),
        ],
    )
}

/// Valid config around [`sample_prefab`].
pub(crate) fn sample_config() -> SessionConfig {
    SessionConfig::new(
        sample_prefab(),
        ReferenceLibrary::new(
            "posters",
            vec!["poster_a".to_string(), "poster_b".to_string()],
        ),
    )
}

/// Create a target node under the session origin and return the batch that
/// reports it.
pub(crate) fn add_target(
    session: &mut Session,
    id: u64,
    reference_name: &str,
    position: [f64; 3],
) -> TrackablesChanged {
    let origin = session.origin();
    let node = session
        .scene_mut()
        .add_node(
            format!("trackable_{}", id),
            Some(origin),
            Isometry3::translation(position[0], position[1], position[2]),
        )
        .expect("origin exists");
    TrackablesChanged {
        added: vec![TrackedTarget::new(TargetId(id), node, reference_name)],
        removed: Vec::new(),
    }
}

/// Subscribe a listener that records every event.
pub(crate) fn recorder(session: &mut Session) -> Rc<RefCell<Vec<SessionEvent>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    session
        .events_mut()
        .subscribe(move |e| sink.borrow_mut().push(e.clone()));
    seen
}
