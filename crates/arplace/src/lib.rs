//! Placement core for image-target augmented reality.
//!
//! A [`Session`] receives the tracking subsystem's per-frame add/remove
//! batches, keeps one piece of content aligned with the nearest tracked
//! reference image through a named anchor, and optionally lets that content
//! detach onto the session origin once it has stopped moving.
//!
//! # Quick start
//!
//! ```
//! use arplace::{AnchorSpec, ContentPrefab, Pose, ReferenceLibrary, Session, SessionConfig};
//! use arplace::{TargetId, TrackablesChanged, TrackedTarget};
//! use nalgebra::Isometry3;
//!
//! let prefab = ContentPrefab::new(
//!     "augment",
//!     vec![AnchorSpec::new("poster_a", Pose::from_position([0.2, 0.0, 0.0]))],
//! );
//! let library = ReferenceLibrary::new("posters", vec!["poster_a".to_string()]);
//! let mut session = Session::new(SessionConfig::new(prefab, library)).unwrap();
//! session.set_active(Some(true));
//!
//! let origin = session.origin();
//! let node = session
//!     .scene_mut()
//!     .add_node("poster", Some(origin), Isometry3::translation(0.0, 0.0, -1.0))
//!     .unwrap();
//! session.on_trackables_changed(&TrackablesChanged {
//!     added: vec![TrackedTarget::new(TargetId(1), node, "poster_a")],
//!     removed: vec![],
//! });
//! session.update(0.0);
//! session.end_of_frame();
//! assert_eq!(session.authoritative(), Some(TargetId(1)));
//! ```

mod authority;
mod config;
mod content;
mod diagnostics;
mod events;
mod pose;
mod replay;
mod scene;
mod session;

#[cfg(test)]
mod test_utils;

pub use authority::{AuthorityChange, AuthoritySelector, TargetId, TrackablesChanged, TrackedTarget};
pub use config::{
    AnchorSpec, ConfigError, ContentPrefab, DiagnosticsConfig, ReferenceLibrary, SessionConfig,
    SettleConfig, SESSION_SCHEMA_V1,
};
pub use content::{
    resolve_placement, ContentHandle, ContentInstance, ContentRegistry, ParentingMode,
    PlacementOutcome, SettleStatus, SettleWatch, DEFAULT_STABLE_FRAMES,
};
pub use diagnostics::{DebugOverlay, DiagnosticsSink, NullDiagnostics};
pub use events::{EventBus, SessionEvent, SubscriptionId};
pub use pose::Pose;
pub use replay::{
    replay, ActivationCommand, ContentState, FrameReport, ReplayFrame, ReplayReport, ReplayScript,
    ScriptTarget, TargetPose,
};
pub use scene::{NodeId, Scene, SceneError};
pub use session::Session;
