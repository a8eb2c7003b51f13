//! Configuration system
//!
//! Scene and entity scene settings can be loaded from TOML or RON files.
//! Every configuration type provides sane defaults and a `validate` step so a
//! broken file is reported before a scene is built from it.

pub use serde::{Serialize, Deserialize};

use crate::spatial::SpatialIndexConfig;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(ConfigError::Io)?;

        Self::parse(path, &contents)
    }

    /// Parse configuration text, the format is picked from the file extension
    fn parse(path: &str, contents: &str) -> Result<Self, ConfigError> {
        if path.ends_with(".toml") {
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Values that parse but make no sense
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// # Scene Configuration
///
/// Settings of a classic scene graph: the extent of the world covered by the
/// scene's octree and the per-frame budget of the data update queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Human readable scene name
    pub name: String,
    /// Half edge length of the cube covered by the octree, centered at the origin
    pub world_half_extent: f32,
    /// Octree tuning
    pub octree: SpatialIndexConfig,
    /// Time box for processing queued node data updates each frame
    pub data_update_budget_ms: u64,
}

impl SceneConfig {
    /// Create a scene configuration with default values
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the world extent
    pub fn with_world_half_extent(mut self, half_extent: f32) -> Self {
        self.world_half_extent = half_extent;
        self
    }

    /// Set the octree tuning
    pub fn with_octree(mut self, octree: SpatialIndexConfig) -> Self {
        self.octree = octree;
        self
    }

    /// Set the data update budget
    pub fn with_data_update_budget_ms(mut self, budget_ms: u64) -> Self {
        self.data_update_budget_ms = budget_ms;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.world_half_extent.is_finite() && self.world_half_extent > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "world half extent must be positive, got {}",
                self.world_half_extent
            )));
        }

        self.octree.validate()
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            name: "Scene".to_string(),
            world_half_extent: 10_000_000.0,
            octree: SpatialIndexConfig::default(),
            data_update_budget_ms: 50,
        }
    }
}

impl Config for SceneConfig {}

/// # Entity Scene Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitySceneConfig {
    /// Human readable scene name
    pub name: String,
    /// Tuning shared by the quadtree and octree when they get initialized
    pub spatial: SpatialIndexConfig,
}

impl EntitySceneConfig {
    /// Create an entity scene configuration with default values
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.spatial.validate()
    }
}

impl Default for EntitySceneConfig {
    fn default() -> Self {
        Self {
            name: "EntityScene".to_string(),
            spatial: SpatialIndexConfig::default(),
        }
    }
}

impl Config for EntitySceneConfig {}
