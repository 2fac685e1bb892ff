#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use arplace::{
    AnchorSpec, ContentPrefab, NodeId, Pose, ReferenceLibrary, Session, SessionConfig,
    SessionEvent, TargetId, TrackablesChanged, TrackedTarget,
};
use nalgebra::Isometry3;

pub fn prefab(detach_on_settle: bool) -> ContentPrefab {
    let mut prefab = ContentPrefab::new(
        "augment",
        vec![
            AnchorSpec::new("poster_a", Pose::from_position_euler([0.25, 0.0, -0.1], 0.0, 0.3, 0.8)),
            AnchorSpec::new("poster_b", Pose::from_position_euler([-0.5, 0.1, 0.2], 0.4, 0.0, -1.1)),
        ],
    );
    prefab.detach_on_settle = detach_on_settle;
    prefab
}

pub fn config(detach_on_settle: bool) -> SessionConfig {
    SessionConfig::new(
        prefab(detach_on_settle),
        ReferenceLibrary::new(
            "posters",
            vec!["poster_a".to_string(), "poster_b".to_string()],
        ),
    )
}

pub fn active_session(detach_on_settle: bool) -> Session {
    let mut session = Session::new(config(detach_on_settle)).expect("valid config");
    session.set_active(Some(true));
    session
}

pub fn record(session: &mut Session) -> Rc<RefCell<Vec<SessionEvent>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    session
        .events_mut()
        .subscribe(move |e| sink.borrow_mut().push(e.clone()));
    seen
}

/// Adds a target node under the session origin.
pub fn spawn(session: &mut Session, pose: Isometry3<f64>) -> NodeId {
    let origin = session.origin();
    session
        .scene_mut()
        .add_node("trackable", Some(origin), pose)
        .expect("origin exists")
}

pub fn detected(id: u64, node: NodeId, name: &str) -> TrackablesChanged {
    TrackablesChanged {
        added: vec![TrackedTarget::new(TargetId(id), node, name)],
        removed: Vec::new(),
    }
}

pub fn lost(id: u64) -> TrackablesChanged {
    TrackablesChanged {
        added: Vec::new(),
        removed: vec![TargetId(id)],
    }
}

/// One host frame: update then end-of-frame.
pub fn frame(session: &mut Session, now_s: f64) {
    session.update(now_s);
    session.end_of_frame();
}

pub fn authority_changes(events: &[SessionEvent]) -> Vec<TargetId> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::AuthorityChanged { target, .. } => Some(*target),
            _ => None,
        })
        .collect()
}
