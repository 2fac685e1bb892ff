//! Scripted session replay.
//!
//! A [`ReplayScript`] plays the role of the host engine and the tracking
//! subsystem: each frame it may toggle the session, move the camera, move
//! tracked targets and report detections and losses. [`replay`] drives a
//! [`Session`] through the script and collects what happened in a
//! [`ReplayReport`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use nalgebra::Isometry3;

use crate::authority::{TargetId, TrackablesChanged, TrackedTarget};
use crate::config::{ConfigError, SessionConfig};
use crate::content::ParentingMode;
use crate::diagnostics::DebugOverlay;
use crate::events::SessionEvent;
use crate::pose::Pose;
use crate::scene::NodeId;
use crate::session::Session;

const DEFAULT_FRAME_DT_S: f64 = 1.0 / 30.0;

fn default_frame_dt_s() -> f64 {
    DEFAULT_FRAME_DT_S
}

/// Activation command issued at the start of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationCommand {
    /// Arm tracking.
    On,
    /// Disarm tracking and clear selection state.
    Off,
    /// Flip the current state.
    Toggle,
}

impl ActivationCommand {
    fn as_tri_state(self) -> Option<bool> {
        match self {
            Self::On => Some(true),
            Self::Off => Some(false),
            Self::Toggle => None,
        }
    }
}

/// A target detection in a script.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptTarget {
    /// Trackable id.
    pub id: u64,
    /// Recognized reference image.
    pub reference_name: String,
    /// Pose relative to the session origin.
    #[serde(default)]
    pub pose: Pose,
}

/// Pose update for an already known target.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetPose {
    /// Trackable id.
    pub id: u64,
    /// New pose relative to the session origin.
    pub pose: Pose,
}

/// One scripted frame. Steps run in field order.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplayFrame {
    /// Activation command, if any.
    #[serde(default)]
    pub set_active: Option<ActivationCommand>,
    /// New camera position relative to the session origin.
    #[serde(default)]
    pub camera: Option<[f64; 3]>,
    /// Target pose updates.
    #[serde(default)]
    pub poses: Vec<TargetPose>,
    /// Targets detected this frame.
    #[serde(default)]
    pub added: Vec<ScriptTarget>,
    /// Ids of targets lost this frame.
    #[serde(default)]
    pub removed: Vec<u64>,
}

/// A complete replay script.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplayScript {
    /// Seconds between frames.
    #[serde(default = "default_frame_dt_s")]
    pub frame_dt_s: f64,
    /// Frames in playback order.
    pub frames: Vec<ReplayFrame>,
}

impl ReplayScript {
    /// Script with the default frame interval.
    pub fn new(frames: Vec<ReplayFrame>) -> Self {
        Self {
            frame_dt_s: DEFAULT_FRAME_DT_S,
            frames,
        }
    }

    /// Load and validate a script file.
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        let script: Self = serde_json::from_str(&data)?;
        script.validate()?;
        Ok(script)
    }

    /// The frame interval must be finite and positive so the session clock
    /// only moves forward.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.frame_dt_s.is_finite() || self.frame_dt_s <= 0.0 {
            return Err(ConfigError::InvalidFrameInterval(self.frame_dt_s));
        }
        Ok(())
    }
}

/// Content state sampled after a frame.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ContentState {
    /// Registry index of the instance.
    pub handle: usize,
    /// Parenting mode.
    pub mode: ParentingMode,
    /// Name of the node the content root hangs off.
    pub parent: Option<String>,
    /// World pose of the content root.
    pub world_pose: Option<Pose>,
}

/// Session state after one frame.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FrameReport {
    /// Frame index.
    pub frame: usize,
    /// Session clock.
    pub time_s: f64,
    /// Activation state.
    pub active: bool,
    /// Authoritative target.
    pub authoritative: Option<TargetId>,
    /// Number of targets in the working set.
    pub tracked: usize,
    /// Current content, if instantiated in this activation.
    pub content: Option<ContentState>,
}

/// Outcome of a replay.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ReplayReport {
    /// Per-frame samples.
    pub frames: Vec<FrameReport>,
    /// Every published event, in order.
    pub events: Vec<SessionEvent>,
    /// Overlay text visible after the last frame.
    pub overlay: String,
}

/// Run `script` against a fresh session built from `config`.
pub fn replay(config: SessionConfig, script: &ReplayScript) -> Result<ReplayReport, ConfigError> {
    script.validate()?;
    let overlay = Rc::new(RefCell::new(DebugOverlay::new(
        config.diagnostics.message_lifetime_s,
    )));
    let mut session = Session::with_diagnostics(config, Box::new(Rc::clone(&overlay)))?;

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    session
        .events_mut()
        .subscribe(move |e| sink.borrow_mut().push(e.clone()));

    let mut nodes: HashMap<u64, NodeId> = HashMap::new();
    let mut frames = Vec::with_capacity(script.frames.len());

    for (index, frame) in script.frames.iter().enumerate() {
        let now_s = index as f64 * script.frame_dt_s;
        session.begin_frame(now_s);
        run_frame(&mut session, &mut nodes, frame);
        session.update(now_s);
        session.end_of_frame();
        frames.push(sample(&session, index, now_s));
    }

    tracing::info!(
        "replayed {} frames, {} events",
        frames.len(),
        events.borrow().len()
    );
    let events = events.borrow().clone();
    let overlay = overlay.borrow().render();
    Ok(ReplayReport {
        frames,
        events,
        overlay,
    })
}

fn run_frame(session: &mut Session, nodes: &mut HashMap<u64, NodeId>, frame: &ReplayFrame) {
    if let Some(command) = frame.set_active {
        session.set_active(command.as_tri_state());
    }

    if let Some([x, y, z]) = frame.camera {
        let camera = session.camera();
        if let Err(e) = session
            .scene_mut()
            .set_local_pose(camera, Isometry3::translation(x, y, z))
        {
            tracing::warn!("camera update failed: {}", e);
        }
    }

    for update in &frame.poses {
        match nodes.get(&update.id) {
            Some(&node) => {
                if let Err(e) = session
                    .scene_mut()
                    .set_local_pose(node, update.pose.to_isometry())
                {
                    tracing::warn!("pose update of target {} failed: {}", update.id, e);
                }
            }
            None => tracing::warn!("pose update for unknown target {} skipped", update.id),
        }
    }

    let mut batch = TrackablesChanged::default();
    for target in &frame.added {
        match target_node(session, nodes, target) {
            Some(node) => batch.added.push(TrackedTarget::new(
                TargetId(target.id),
                node,
                target.reference_name.as_str(),
            )),
            None => tracing::warn!("target {} could not be created", target.id),
        }
    }
    batch.removed = frame.removed.iter().map(|&id| TargetId(id)).collect();
    session.on_trackables_changed(&batch);
}

/// Scene node of a scripted target, created on first sight and moved to the
/// scripted pose on every detection.
fn target_node(
    session: &mut Session,
    nodes: &mut HashMap<u64, NodeId>,
    target: &ScriptTarget,
) -> Option<NodeId> {
    let pose = target.pose.to_isometry();
    if let Some(&node) = nodes.get(&target.id) {
        return session.scene_mut().set_local_pose(node, pose).ok().map(|_| node);
    }
    let origin = session.origin();
    let node = session
        .scene_mut()
        .add_node(format!("trackable_{}", target.id), Some(origin), pose)
        .ok()?;
    nodes.insert(target.id, node);
    Some(node)
}

fn sample(session: &Session, frame: usize, time_s: f64) -> FrameReport {
    let content = session.selector().content().and_then(|handle| {
        let instance = session.contents().get(handle)?;
        let scene = session.scene();
        let parent = scene
            .parent(instance.root())
            .ok()
            .flatten()
            .and_then(|p| scene.name(p).ok())
            .map(str::to_string);
        Some(ContentState {
            handle: handle.index(),
            mode: instance.mode(),
            parent,
            world_pose: scene.world_pose(instance.root()).ok().map(Pose::from),
        })
    });
    FrameReport {
        frame,
        time_s,
        active: session.is_active(),
        authoritative: session.authoritative(),
        tracked: session.selector().working_set().len(),
        content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_config;
    use approx::assert_relative_eq;

    fn detect(id: u64, name: &str, position: [f64; 3]) -> ScriptTarget {
        ScriptTarget {
            id,
            reference_name: name.to_string(),
            pose: Pose::from_position(position),
        }
    }

    #[test]
    fn empty_script_reports_nothing() {
        let report = replay(sample_config(), &ReplayScript::new(Vec::new())).unwrap();
        assert!(report.frames.is_empty());
        assert!(report.events.is_empty());
        assert_eq!(report.overlay, "");
    }

    #[test]
    fn invalid_config_fails_before_playback() {
        let mut config = sample_config();
        config.reference_library = None;
        let err = replay(config, &ReplayScript::new(vec![ReplayFrame::default()])).unwrap_err();
        assert_eq!(err, ConfigError::MissingReferenceLibrary);
    }

    #[test]
    fn nearest_target_wins_and_overlay_records_placement() {
        let script = ReplayScript {
            frame_dt_s: 1.0,
            frames: vec![
                ReplayFrame {
                    set_active: Some(ActivationCommand::On),
                    added: vec![detect(1, "poster_a", [0.0, 0.0, -2.0])],
                    ..Default::default()
                },
                ReplayFrame {
                    added: vec![detect(2, "poster_b", [0.0, 0.0, -1.5])],
                    ..Default::default()
                },
            ],
        };
        let report = replay(sample_config(), &script).unwrap();

        assert_eq!(report.frames[0].authoritative, Some(TargetId(1)));
        assert_eq!(report.frames[1].authoritative, Some(TargetId(2)));
        assert_eq!(report.frames[1].tracked, 2);
        let content = report.frames[1].content.as_ref().expect("content");
        assert_eq!(content.parent.as_deref(), Some("trackable_2"));
        assert_eq!(content.mode, ParentingMode::Following);

        assert_eq!(report.events.len(), 3);
        assert!(report.overlay.contains("[ 00:00:00 ] session active == true"));
        assert!(report.overlay.contains("[ 00:00:01 ] place(poster_b)"));
    }

    #[test]
    fn settled_content_detaches_in_report() {
        let mut config = sample_config();
        if let Some(prefab) = config.content.as_mut() {
            prefab.detach_on_settle = true;
        }
        let mut frames = vec![ReplayFrame {
            set_active: Some(ActivationCommand::On),
            added: vec![detect(1, "poster_a", [0.5, 0.0, -1.0])],
            ..Default::default()
        }];
        frames.extend(std::iter::repeat(ReplayFrame::default()).take(3));
        let report = replay(config, &ReplayScript::new(frames)).unwrap();

        let last = report.frames.last().and_then(|f| f.content.as_ref()).unwrap();
        assert_eq!(last.mode, ParentingMode::Detached);
        assert_eq!(last.parent.as_deref(), Some("session_origin"));
        assert!(matches!(
            report.events.last(),
            Some(SessionEvent::ContentDetached { .. })
        ));
    }

    #[test]
    fn toggle_off_clears_frame_state() {
        let frames = vec![
            ReplayFrame {
                set_active: Some(ActivationCommand::Toggle),
                added: vec![detect(4, "poster_a", [0.0, 0.0, -1.0])],
                ..Default::default()
            },
            ReplayFrame {
                set_active: Some(ActivationCommand::Toggle),
                ..Default::default()
            },
        ];
        let report = replay(sample_config(), &ReplayScript::new(frames)).unwrap();
        assert!(report.frames[0].active);
        assert!(!report.frames[1].active);
        assert_eq!(report.frames[1].authoritative, None);
        assert!(report.frames[1].content.is_none());
    }

    #[test]
    fn camera_and_pose_updates_move_the_scene() {
        let frames = vec![
            ReplayFrame {
                set_active: Some(ActivationCommand::On),
                added: vec![
                    detect(1, "poster_a", [0.0, 0.0, -1.0]),
                    detect(2, "poster_b", [4.0, 0.0, -1.0]),
                ],
                ..Default::default()
            },
            ReplayFrame {
                camera: Some([4.0, 0.0, 0.0]),
                poses: vec![TargetPose {
                    id: 1,
                    pose: Pose::from_position([0.0, 0.0, -3.0]),
                }],
                ..Default::default()
            },
        ];
        let report = replay(sample_config(), &ReplayScript::new(frames)).unwrap();
        assert_eq!(report.frames[0].authoritative, Some(TargetId(1)));
        assert_eq!(report.frames[1].authoritative, Some(TargetId(2)));
        assert_relative_eq!(report.frames[1].time_s, DEFAULT_FRAME_DT_S);
    }

    #[test]
    fn bad_frame_interval_is_rejected() {
        for dt in [0.0, -0.5, f64::NAN, f64::INFINITY] {
            let script = ReplayScript {
                frame_dt_s: dt,
                frames: vec![ReplayFrame::default()],
            };
            assert!(matches!(
                replay(sample_config(), &script),
                Err(ConfigError::InvalidFrameInterval(_))
            ));
        }
    }

    #[test]
    fn script_file_with_negative_interval_fails_to_load() {
        let path = std::env::temp_dir().join(format!(
            "arplace_negative_dt_{}.json",
            std::process::id()
        ));
        std::fs::write(&path, r#"{"frame_dt_s":-0.1,"frames":[{}]}"#).unwrap();
        let err = ReplayScript::from_json_file(&path).expect_err("negative interval");
        std::fs::remove_file(&path).ok();
        assert!(err.to_string().contains("frame_dt_s must be finite and > 0"));
    }

    #[test]
    fn script_json_uses_snake_case_commands() {
        let raw = r#"{"frames":[{"set_active":"toggle","added":[{"id":1,"reference_name":"poster_a"}]},{}]}"#;
        let script: ReplayScript = serde_json::from_str(raw).unwrap();
        assert_eq!(script.frames.len(), 2);
        assert_eq!(script.frames[0].set_active, Some(ActivationCommand::Toggle));
        assert_eq!(script.frames[0].added[0].pose, Pose::IDENTITY);
        assert_relative_eq!(script.frame_dt_s, DEFAULT_FRAME_DT_S);
    }
}
