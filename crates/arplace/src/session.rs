//! Frame-driven placement session.
//!
//! [`Session`] wires the pieces together. Per frame the host calls, in order:
//!
//! 0. optionally [`Session::begin_frame`] so diagnostics carry the frame time,
//! 1. [`Session::on_trackables_changed`] with the tracking subsystem's batch,
//! 2. [`Session::update`] to evaluate authority and apply the vertical lock,
//! 3. [`Session::end_of_frame`] once all transforms of the frame are final,
//!    which feeds the settle watch.
//!
//! Nothing here panics or returns errors in steady state; bad handles from
//! the host are logged and skipped.

use nalgebra::Isometry3;

use crate::authority::{AuthorityChange, AuthoritySelector, TargetId, TrackablesChanged, TrackedTarget};
use crate::config::{ConfigError, ContentPrefab, ReferenceLibrary, SessionConfig};
use crate::content::{ContentInstance, ContentRegistry, PlacementOutcome};
use crate::diagnostics::{DiagnosticsSink, NullDiagnostics};
use crate::events::{EventBus, SessionEvent};
use crate::scene::{NodeId, Scene};

const ORIGIN_NODE_NAME: &str = "session_origin";
const CAMERA_NODE_NAME: &str = "camera";

/// One AR placement session.
pub struct Session {
    prefab: ContentPrefab,
    library: ReferenceLibrary,
    stable_frames: u32,
    scene: Scene,
    origin: NodeId,
    camera: NodeId,
    selector: AuthoritySelector,
    contents: ContentRegistry,
    events: EventBus,
    diagnostics: Box<dyn DiagnosticsSink>,
    active: bool,
    clock_s: f64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("active", &self.active)
            .field("clock_s", &self.clock_s)
            .field("selector", &self.selector)
            .field("contents", &self.contents.len())
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Validate `config` and build a session without a diagnostics sink.
    pub fn new(config: SessionConfig) -> Result<Self, ConfigError> {
        Self::with_diagnostics(config, Box::new(NullDiagnostics))
    }

    /// Validate `config` and build a session reporting to `diagnostics`.
    pub fn with_diagnostics(
        config: SessionConfig,
        diagnostics: Box<dyn DiagnosticsSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let prefab = config.content.ok_or(ConfigError::MissingContentPrefab)?;
        let library = config
            .reference_library
            .ok_or(ConfigError::MissingReferenceLibrary)?;

        let mut scene = Scene::new();
        let origin = scene.add_node(ORIGIN_NODE_NAME, None, Isometry3::identity())?;
        let camera = scene.add_node(CAMERA_NODE_NAME, Some(origin), Isometry3::identity())?;

        let mut session = Self {
            prefab,
            library,
            stable_frames: config.settle.stable_frames,
            scene,
            origin,
            camera,
            selector: AuthoritySelector::new(),
            contents: ContentRegistry::new(),
            events: EventBus::new(),
            diagnostics,
            active: false,
            clock_s: 0.0,
        };
        if config.set_active_on_start {
            session.set_active(Some(true));
        }
        Ok(session)
    }

    /// `true` while tracking input is armed.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Session clock as of the last [`update`](Self::update).
    pub fn clock_s(&self) -> f64 {
        self.clock_s
    }

    /// Transform hierarchy owned by the session.
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Mutable hierarchy, for the tracking subsystem to add and move targets.
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    /// Fixed node that detached content hangs off. Targets and the camera
    /// live under it.
    pub fn origin(&self) -> NodeId {
        self.origin
    }

    /// Observer node; its world position drives nearest-target selection.
    pub fn camera(&self) -> NodeId {
        self.camera
    }

    /// Reference images armed on activation.
    pub fn reference_library(&self) -> &ReferenceLibrary {
        &self.library
    }

    /// Authority state.
    pub fn selector(&self) -> &AuthoritySelector {
        &self.selector
    }

    /// Every content instance ever created, including ones from previous
    /// activations.
    pub fn contents(&self) -> &ContentRegistry {
        &self.contents
    }

    /// The content instance of the current activation, if created.
    pub fn content(&self) -> Option<&ContentInstance> {
        self.selector.content().and_then(|h| self.contents.get(h))
    }

    /// Event bus for registering listeners.
    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// Apply a tri-state activation command: `Some(true)` activates,
    /// `Some(false)` deactivates, `None` toggles.
    ///
    /// Deactivating forgets every tracked target, the authority and the
    /// content back-reference and cancels pending settle watches. Content
    /// already in the scene is left there. No events are published.
    pub fn set_active(&mut self, command: Option<bool>) {
        let value = command.unwrap_or(!self.active);
        if value {
            if !self.active {
                tracing::info!(
                    "tracking armed with library '{}' ({} images)",
                    self.library.name,
                    self.library.images.len()
                );
            }
            self.active = true;
        } else {
            if self.active {
                tracing::info!("tracking disarmed");
            }
            self.active = false;
            self.clear();
        }
        self.log(&format!("session active == {}", self.active));
    }

    fn clear(&mut self) {
        self.selector.clear();
        for (handle, content) in self.contents.iter_mut() {
            if content.cancel_settle_watch() {
                tracing::debug!("settle watch of content #{} cancelled", handle.index());
            }
        }
    }

    /// Ingest one frame's tracking batch.
    ///
    /// Additions are processed first; the first one of an activation
    /// instantiates the content under that target. Removals are applied
    /// next, and authority is evaluated once over the resulting working set,
    /// so a target lost in the same batch never becomes authoritative.
    pub fn on_trackables_changed(&mut self, changes: &TrackablesChanged) {
        if !self.active {
            if !changes.is_empty() {
                tracing::debug!("tracking batch ignored: session inactive");
            }
            return;
        }
        if changes.is_empty() {
            return;
        }

        for target in &changes.added {
            self.add_target(target.clone());
        }
        for &id in &changes.removed {
            if !self.selector.remove_target(id) {
                tracing::debug!("removal of untracked {} ignored", id);
            }
        }
        self.evaluate_authority();
    }

    fn add_target(&mut self, target: TrackedTarget) {
        if !self.scene.contains(target.node) {
            tracing::warn!("{} reported with unknown scene node; ignored", target.id);
            return;
        }
        if !self.library.contains(&target.reference_name) {
            tracing::warn!(
                "{} tracks '{}' which is not in library '{}'",
                target.id,
                target.reference_name,
                self.library.name
            );
        }
        if self.selector.content().is_none() {
            self.instantiate_content(&target);
        }
        self.selector.add_target(target);
    }

    fn instantiate_content(&mut self, parent: &TrackedTarget) {
        match ContentInstance::instantiate(&mut self.scene, &self.prefab, parent.node) {
            Ok(instance) => {
                let handle = self.contents.insert(instance);
                self.selector.set_content(handle);
                tracing::info!("content '{}' instantiated under {}", self.prefab.name, parent.id);
                self.log(&format!("content {} instantiated", self.prefab.name));
                self.events.publish(&SessionEvent::ContentInstantiated {
                    content: handle,
                    parent: parent.id,
                });
            }
            Err(e) => tracing::warn!("content instantiation under {} failed: {}", parent.id, e),
        }
    }

    /// Advance the session clock and expire old diagnostics.
    pub fn begin_frame(&mut self, now_s: f64) {
        self.clock_s = now_s;
        self.diagnostics.tick(now_s);
    }

    /// Per-frame tick: evaluate authority and keep locked content upright.
    /// Does nothing but advance the clock while inactive.
    pub fn update(&mut self, now_s: f64) {
        self.begin_frame(now_s);
        if !self.active {
            return;
        }

        self.evaluate_authority();

        if let Some(content) = self.selector.content().and_then(|h| self.contents.get(h)) {
            if let Err(e) = content.apply_vertical_lock(&mut self.scene) {
                tracing::warn!("vertical lock skipped: {}", e);
            }
        }
    }

    /// End-of-frame hook: sample the settle watch and detach settled content.
    pub fn end_of_frame(&mut self) {
        if !self.active {
            return;
        }
        let Some(handle) = self.selector.content() else {
            return;
        };
        let Some(content) = self.contents.get_mut(handle) else {
            return;
        };
        match content.poll_settle(&mut self.scene, self.origin) {
            Ok(true) => {
                tracing::info!("content '{}' settled; detached onto session origin", content.name());
                self.events
                    .publish(&SessionEvent::ContentDetached { content: handle });
            }
            Ok(false) => {}
            Err(e) => {
                content.cancel_settle_watch();
                tracing::warn!("settle watch dropped: {}", e);
            }
        }
    }

    fn evaluate_authority(&mut self) {
        let observer = match self.scene.world_position(self.camera) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("observer position unavailable: {}", e);
                return;
            }
        };
        let scene = &self.scene;
        let change = self
            .selector
            .evaluate(&observer, |t| scene.world_position(t.node).ok());
        if let Some(change) = change {
            self.apply_authority_change(change);
        }
    }

    fn apply_authority_change(&mut self, change: AuthorityChange) {
        tracing::info!("authority -> {} ('{}')", change.target, change.reference_name);

        let outcome = self
            .selector
            .content()
            .and_then(|h| self.contents.get_mut(h))
            .map(|content| {
                content.place(
                    &mut self.scene,
                    self.origin,
                    change.node,
                    &change.reference_name,
                    self.stable_frames,
                )
            });
        match outcome {
            Some(Ok(PlacementOutcome::Placed)) => {
                self.log(&format!("place({})", change.reference_name));
            }
            Some(Ok(PlacementOutcome::AnchorNotFound)) => {
                tracing::debug!(
                    "no anchor named '{}'; placement skipped",
                    change.reference_name
                );
            }
            Some(Err(e)) => tracing::warn!("placement on {} failed: {}", change.target, e),
            None => tracing::debug!("authority changed before content exists"),
        }

        self.events.publish(&SessionEvent::AuthorityChanged {
            target: change.target,
            reference_name: change.reference_name,
        });
    }

    /// Current authority, if any.
    pub fn authoritative(&self) -> Option<TargetId> {
        self.selector.authoritative()
    }

    fn log(&mut self, message: &str) {
        tracing::debug!(target: "arplace::diagnostics", "{}", message);
        self.diagnostics.log(self.clock_s, message);
    }
}
