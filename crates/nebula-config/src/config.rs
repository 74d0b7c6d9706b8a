//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Hierarchical LOD clustering and proxy build settings.
    pub hlod: HlodConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
    /// Synthetic scene used by the demo binary.
    pub scene: SceneConfig,
}

/// Most merge passes a level may run before extraction.
pub const MAX_MERGE_PASSES: u32 = 3;

/// Hierarchical LOD settings for one loaded level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HlodConfig {
    /// Master switch. When off, every build request is a logged no-op.
    pub enabled: bool,
    /// Per-level settings. `levels[0]` configures HLOD level 1.
    pub levels: Vec<LevelSettings>,
    /// Reference view used to turn screen sizes into draw distances.
    pub view: ViewConfig,
    /// Index buffer format supported by the target platform.
    pub index_format: IndexFormat,
    /// Actors with a bounding radius at or below this are never clustered.
    pub min_bound_radius_m: f32,
    /// Upper bound on merge passes per level, in `1..=MAX_MERGE_PASSES`.
    pub max_merge_passes: u32,
}

/// Clustering configuration for a single HLOD level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LevelSettings {
    /// Target bounding radius of a cluster, in meters.
    pub desired_bound_radius_m: f32,
    /// Target filling ratio (0.0 - 1.0]. Lower values accept sparser clusters.
    pub desired_filling_ratio: f32,
    /// Minimum number of members for a cluster to become a node.
    pub min_actors_to_build: usize,
    /// Fraction of screen height below which this level's proxy is shown.
    pub transition_screen_size: f32,
    /// Whether proxies for this level are simplified or plainly merged.
    pub simplify_mesh: bool,
    /// Settings handed to the mesh merge service.
    pub proxy: ProxySettings,
}

/// Settings forwarded verbatim to the mesh merge service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProxySettings {
    /// Target on-screen size of the proxy in pixels.
    pub screen_size_px: u32,
    /// Distance below which vertices are welded, in meters.
    pub merge_distance_m: f32,
    /// Recompute normals on the simplified mesh.
    pub recalculate_normals: bool,
    /// Angle above which edges are kept hard, in degrees.
    pub hard_angle_threshold_deg: f32,
    /// Place the proxy pivot at the world origin instead of the first component.
    pub pivot_at_zero: bool,
}

/// Reference view for screen-size computations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewConfig {
    /// Horizontal field of view in degrees.
    pub horizontal_fov_deg: f32,
    /// Viewport width in pixels.
    pub width: u32,
    /// Viewport height in pixels.
    pub height: u32,
}

/// Index buffer formats a platform may support.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum IndexFormat {
    /// 16-bit indices only.
    U16,
    /// 32-bit indices available.
    #[default]
    U32,
}

impl IndexFormat {
    /// Largest vertex count addressable by this format, if bounded.
    pub fn max_vertices(self) -> Option<u32> {
        match self {
            IndexFormat::U16 => Some(u16::MAX as u32),
            IndexFormat::U32 => None,
        }
    }
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Log every accepted cluster with its cost and filling factor.
    pub log_cluster_details: bool,
}

/// Synthetic scene parameters for the demo binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SceneConfig {
    /// Number of actors to scatter.
    pub actor_count: usize,
    /// RNG seed for deterministic scenes.
    pub seed: u64,
    /// Half-extent of the square scatter area, in meters.
    pub spread_m: f32,
    /// Smallest actor bounding radius, in meters.
    pub min_actor_radius_m: f32,
    /// Largest actor bounding radius, in meters.
    pub max_actor_radius_m: f32,
    /// Mesh merge worker threads (0 = derive from CPU count).
    pub worker_threads: usize,
}

// --- Default implementations ---

impl Default for HlodConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            levels: vec![
                LevelSettings::default(),
                LevelSettings {
                    desired_bound_radius_m: 60.0,
                    transition_screen_size: 0.1,
                    ..LevelSettings::default()
                },
            ],
            view: ViewConfig::default(),
            index_format: IndexFormat::default(),
            min_bound_radius_m: 0.0,
            max_merge_passes: 3,
        }
    }
}

impl Default for LevelSettings {
    fn default() -> Self {
        Self {
            desired_bound_radius_m: 20.0,
            desired_filling_ratio: 0.5,
            min_actors_to_build: 2,
            transition_screen_size: 0.315,
            simplify_mesh: true,
            proxy: ProxySettings::default(),
        }
    }
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            screen_size_px: 300,
            merge_distance_m: 0.04,
            recalculate_normals: true,
            hard_angle_threshold_deg: 80.0,
            pivot_at_zero: false,
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            horizontal_fov_deg: 90.0,
            width: 1920,
            height: 1080,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_cluster_details: false,
        }
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            actor_count: 400,
            seed: 0x4e45_4255,
            spread_m: 250.0,
            min_actor_radius_m: 0.5,
            max_actor_radius_m: 4.0,
            worker_threads: 0,
        }
    }
}

impl LevelSettings {
    /// Highest cluster cost accepted on this level:
    /// `desired_bound_radius_m³ / desired_filling_ratio`.
    pub fn highest_allowed_cost(&self) -> f32 {
        self.desired_bound_radius_m.powi(3) / self.desired_filling_ratio
    }

    /// Checks ranges; `index` is the zero-based position in [`HlodConfig::levels`].
    pub fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let field = |name: &str| format!("hlod.levels[{index}].{name}");
        if !(self.desired_bound_radius_m > 0.0 && self.desired_bound_radius_m.is_finite()) {
            return Err(ConfigError::Invalid {
                field: field("desired_bound_radius_m"),
                reason: format!("must be positive, got {}", self.desired_bound_radius_m),
            });
        }
        if !(self.desired_filling_ratio > 0.0 && self.desired_filling_ratio <= 1.0) {
            return Err(ConfigError::Invalid {
                field: field("desired_filling_ratio"),
                reason: format!("must be in (0, 1], got {}", self.desired_filling_ratio),
            });
        }
        if self.min_actors_to_build == 0 {
            return Err(ConfigError::Invalid {
                field: field("min_actors_to_build"),
                reason: "a node needs at least one member".to_string(),
            });
        }
        if !(self.transition_screen_size > 0.0 && self.transition_screen_size <= 1.0) {
            return Err(ConfigError::Invalid {
                field: field("transition_screen_size"),
                reason: format!("must be in (0, 1], got {}", self.transition_screen_size),
            });
        }
        Ok(())
    }
}

impl HlodConfig {
    /// Number of configured HLOD levels.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Settings for a one-based HLOD level.
    pub fn level(&self, level: u32) -> Option<&LevelSettings> {
        let index = (level as usize).checked_sub(1)?;
        self.levels.get(index)
    }

    /// Validate every level plus the global settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, level) in self.levels.iter().enumerate() {
            level.validate(index)?;
        }
        if !(1..=MAX_MERGE_PASSES).contains(&self.max_merge_passes) {
            return Err(ConfigError::Invalid {
                field: "hlod.max_merge_passes".to_string(),
                reason: format!(
                    "must be in 1..={MAX_MERGE_PASSES}, got {}",
                    self.max_merge_passes
                ),
            });
        }
        if self.view.width == 0 || self.view.height == 0 {
            return Err(ConfigError::Invalid {
                field: "hlod.view".to_string(),
                reason: "viewport must be non-empty".to_string(),
            });
        }
        if !(self.view.horizontal_fov_deg > 0.0 && self.view.horizontal_fov_deg < 180.0) {
            return Err(ConfigError::Invalid {
                field: "hlod.view.horizontal_fov_deg".to_string(),
                reason: format!("must be in (0, 180), got {}", self.view.horizontal_fov_deg),
            });
        }
        Ok(())
    }
}

// --- Persistence ---

/// File name of the settings file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.ron";

/// Platform config directory for the HLOD tools (`<config_dir>/nebula-hlod`).
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("nebula-hlod"))
}

/// Parse and validate the settings file at `path`.
fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = ron::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.hlod.validate()?;
    Ok(config)
}

impl Config {
    /// Read `config.ron` from `config_dir`. A missing file is replaced by the
    /// defaults, which are written out so they can be edited.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("wrote default HLOD settings to {}", path.display());
            return Ok(config);
        }

        let config = read_config(&path)?;
        log::info!(
            "loaded {} HLOD levels from {}",
            config.hlod.level_count(),
            path.display()
        );
        Ok(config)
    }

    /// Write these settings to `config_dir/config.ron`, creating the directory.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let path = config_dir.join(CONFIG_FILE_NAME);
        let write_err = |source| ConfigError::Write {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(config_dir).map_err(write_err)?;

        // Levels are a list of structs; keep each on its own indented block.
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(5)
            .struct_names(false)
            .enumerate_arrays(true);
        let text = ron::ser::to_string_pretty(self, pretty)?;
        std::fs::write(&path, text).map_err(write_err)
    }

    /// Re-read the file and return the new settings when they differ from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = read_config(&config_dir.join(CONFIG_FILE_NAME))?;
        if fresh == *self {
            return Ok(None);
        }
        log::info!("HLOD settings changed on disk");
        Ok(Some(fresh))
    }
}
