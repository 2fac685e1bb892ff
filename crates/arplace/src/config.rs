//! Session configuration.
//!
//! Config JSON carries a schema tag (`arplace.session.v1`) and is validated
//! before a [`Session`](crate::Session) can be built: a missing content
//! prefab or reference library is a configuration error, never a runtime
//! condition.

use std::collections::HashSet;
use std::path::Path;

use crate::content::DEFAULT_STABLE_FRAMES;
use crate::pose::Pose;
use crate::scene::SceneError;

/// Schema tag expected in session config files.
pub const SESSION_SCHEMA_V1: &str = "arplace.session.v1";

const DEFAULT_WRAPPER_NAME: &str = "wrapper_main";
const DEFAULT_MESSAGE_LIFETIME_S: f64 = 10.0;

// ── Error type ─────────────────────────────────────────────────────────────

/// Reasons a [`SessionConfig`] is rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Schema tag is not [`SESSION_SCHEMA_V1`].
    UnsupportedSchema {
        /// Tag found in the file.
        found: String,
    },
    /// No content prefab configured.
    MissingContentPrefab,
    /// No reference image library configured.
    MissingReferenceLibrary,
    /// Reference library lists no images.
    EmptyReferenceLibrary,
    /// Prefab or wrapper name is blank.
    EmptyName(&'static str),
    /// Prefab has no anchors.
    NoAnchors,
    /// Anchor name is blank.
    EmptyAnchorName,
    /// Two anchors share a name.
    DuplicateAnchor(String),
    /// Anchor pose contains non-finite values or a zero quaternion.
    InvalidAnchorPose(String),
    /// Settle threshold must be at least one frame.
    ZeroSettleFrames,
    /// Overlay message lifetime must be finite and > 0.
    InvalidMessageLifetime(f64),
    /// Replay frame interval must be finite and > 0.
    InvalidFrameInterval(f64),
    /// Session scaffolding could not be built.
    Scene(SceneError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedSchema { found } => write!(
                f,
                "unsupported session schema '{}' (expected '{}')",
                found, SESSION_SCHEMA_V1
            ),
            Self::MissingContentPrefab => write!(f, "content prefab is missing"),
            Self::MissingReferenceLibrary => write!(f, "reference image library is missing"),
            Self::EmptyReferenceLibrary => write!(f, "reference image library has no images"),
            Self::EmptyName(what) => write!(f, "{} name must not be empty", what),
            Self::NoAnchors => write!(f, "content prefab defines no anchors"),
            Self::EmptyAnchorName => write!(f, "anchor name must not be empty"),
            Self::DuplicateAnchor(name) => write!(f, "duplicate anchor name '{}'", name),
            Self::InvalidAnchorPose(name) => write!(f, "anchor '{}' has an invalid pose", name),
            Self::ZeroSettleFrames => write!(f, "settle.stable_frames must be >= 1"),
            Self::InvalidMessageLifetime(v) => {
                write!(f, "diagnostics.message_lifetime_s must be finite and > 0 (got {})", v)
            }
            Self::InvalidFrameInterval(v) => {
                write!(f, "frame_dt_s must be finite and > 0 (got {})", v)
            }
            Self::Scene(e) => write!(f, "session scene setup failed: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Scene(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SceneError> for ConfigError {
    fn from(e: SceneError) -> Self {
        Self::Scene(e)
    }
}

// ── Types ──────────────────────────────────────────────────────────────────

/// Named alignment point inside the content, relative to the wrapper.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnchorSpec {
    /// Matched against tracked reference-image names.
    pub name: String,
    /// Pose relative to the main wrapper.
    #[serde(default)]
    pub pose: Pose,
}

impl AnchorSpec {
    /// Create an anchor spec.
    pub fn new(name: impl Into<String>, pose: Pose) -> Self {
        Self {
            name: name.into(),
            pose,
        }
    }
}

/// Description of the content to instantiate on first detection.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentPrefab {
    /// Name of the content root node.
    pub name: String,
    /// Name of the main wrapper node.
    #[serde(default = "default_wrapper_name")]
    pub wrapper: String,
    /// Anchors, one per reference image the content can be placed on.
    pub anchors: Vec<AnchorSpec>,
    /// Re-parent onto the session origin once the content stops moving.
    #[serde(default)]
    pub detach_on_settle: bool,
    /// Keep the content upright (yaw only) every frame.
    #[serde(default)]
    pub vertical_lock: bool,
}

fn default_wrapper_name() -> String {
    DEFAULT_WRAPPER_NAME.to_string()
}

impl ContentPrefab {
    /// Prefab with the default wrapper name and both flags off.
    pub fn new(name: impl Into<String>, anchors: Vec<AnchorSpec>) -> Self {
        Self {
            name: name.into(),
            wrapper: default_wrapper_name(),
            anchors,
            detach_on_settle: false,
            vertical_lock: false,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName("content"));
        }
        if self.wrapper.trim().is_empty() {
            return Err(ConfigError::EmptyName("wrapper"));
        }
        if self.anchors.is_empty() {
            return Err(ConfigError::NoAnchors);
        }
        let mut seen = HashSet::new();
        for anchor in &self.anchors {
            if anchor.name.trim().is_empty() {
                return Err(ConfigError::EmptyAnchorName);
            }
            if !anchor.pose.is_valid() {
                return Err(ConfigError::InvalidAnchorPose(anchor.name.clone()));
            }
            if !seen.insert(anchor.name.as_str()) {
                return Err(ConfigError::DuplicateAnchor(anchor.name.clone()));
            }
        }
        Ok(())
    }
}

/// Reference images the tracking subsystem is armed with.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceLibrary {
    /// Library name, for diagnostics.
    pub name: String,
    /// Reference image names.
    pub images: Vec<String>,
}

impl ReferenceLibrary {
    /// Create a library.
    pub fn new(name: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            name: name.into(),
            images,
        }
    }

    /// `true` if `image` is part of the library.
    pub fn contains(&self, image: &str) -> bool {
        self.images.iter().any(|i| i == image)
    }
}

/// Settle-detection tuning.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettleConfig {
    /// Consecutive unchanged end-of-frame samples before detaching.
    pub stable_frames: u32,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            stable_frames: DEFAULT_STABLE_FRAMES,
        }
    }
}

/// Diagnostics overlay tuning.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiagnosticsConfig {
    /// Seconds a message stays on the overlay.
    pub message_lifetime_s: f64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            message_lifetime_s: DEFAULT_MESSAGE_LIFETIME_S,
        }
    }
}

/// Complete session configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Schema tag, must equal [`SESSION_SCHEMA_V1`].
    pub schema: String,
    /// Content instantiated on first detection.
    #[serde(default)]
    pub content: Option<ContentPrefab>,
    /// Reference images tracked while the session is active.
    #[serde(default)]
    pub reference_library: Option<ReferenceLibrary>,
    /// Activate the session as soon as it is constructed.
    #[serde(default)]
    pub set_active_on_start: bool,
    /// Settle detection.
    #[serde(default)]
    pub settle: SettleConfig,
    /// Diagnostics overlay.
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

impl SessionConfig {
    /// Config with the current schema and default tuning.
    pub fn new(content: ContentPrefab, reference_library: ReferenceLibrary) -> Self {
        Self {
            schema: SESSION_SCHEMA_V1.to_string(),
            content: Some(content),
            reference_library: Some(reference_library),
            set_active_on_start: false,
            settle: SettleConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
        }
    }

    /// Parse and validate config JSON.
    pub fn from_json_str(data: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: Self = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file.
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Check every fail-fast condition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schema != SESSION_SCHEMA_V1 {
            return Err(ConfigError::UnsupportedSchema {
                found: self.schema.clone(),
            });
        }

        let content = self.content.as_ref().ok_or(ConfigError::MissingContentPrefab)?;
        content.validate()?;

        let library = self
            .reference_library
            .as_ref()
            .ok_or(ConfigError::MissingReferenceLibrary)?;
        if library.name.trim().is_empty() {
            return Err(ConfigError::EmptyName("reference library"));
        }
        if library.images.is_empty() {
            return Err(ConfigError::EmptyReferenceLibrary);
        }

        if self.settle.stable_frames == 0 {
            return Err(ConfigError::ZeroSettleFrames);
        }

        let lifetime = self.diagnostics.message_lifetime_s;
        if !lifetime.is_finite() || lifetime <= 0.0 {
            return Err(ConfigError::InvalidMessageLifetime(lifetime));
        }

        for anchor in &content.anchors {
            if !library.contains(&anchor.name) {
                tracing::warn!(
                    "anchor '{}' has no matching image in library '{}'",
                    anchor.name,
                    library.name
                );
            }
        }
        Ok(())
    }
}
