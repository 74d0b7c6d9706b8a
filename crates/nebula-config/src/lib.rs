//! Configuration system for the Nebula HLOD tools.
//!
//! Provides per-level clustering settings, proxy build settings, and the
//! reference view used for draw-distance math. Settings persist to disk as
//! RON files, support CLI overrides via clap, hot-reload detection, and
//! forward/backward compatible serialization.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    CONFIG_FILE_NAME, Config, DebugConfig, HlodConfig, IndexFormat, LevelSettings, MAX_MERGE_PASSES,
    ProxySettings, SceneConfig, ViewConfig, default_config_dir,
};
pub use error::ConfigError;
