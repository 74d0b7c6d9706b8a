//! Command-line argument parsing for the HLOD demo.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Nebula HLOD command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "nebula-hlod", about = "Nebula hierarchical LOD builder")]
pub struct CliArgs {
    /// Disable HLOD generation entirely.
    #[arg(long)]
    pub disable_hlod: bool,

    /// Keep only the first N configured HLOD levels.
    #[arg(long)]
    pub levels: Option<usize>,

    /// Number of actors in the synthetic scene.
    #[arg(long)]
    pub actors: Option<usize>,

    /// Scene RNG seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Half-extent of the scatter area in meters.
    #[arg(long)]
    pub spread: Option<f32>,

    /// Mesh merge worker threads.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if args.disable_hlod {
            self.hlod.enabled = false;
        }
        if let Some(levels) = args.levels {
            self.hlod.levels.truncate(levels);
        }
        if let Some(actors) = args.actors {
            self.scene.actor_count = actors;
        }
        if let Some(seed) = args.seed {
            self.scene.seed = seed;
        }
        if let Some(spread) = args.spread {
            self.scene.spread_m = spread;
        }
        if let Some(workers) = args.workers {
            self.scene.worker_threads = workers;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            actors: Some(32),
            seed: Some(7),
            log_level: Some("debug".to_string()),
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.scene.actor_count, 32);
        assert_eq!(config.scene.seed, 7);
        assert_eq!(config.debug.log_level, "debug");
        // Non-overridden fields retain defaults
        assert!(config.hlod.enabled);
        assert_eq!(config.hlod.levels.len(), 2);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_disable_and_truncate_levels() {
        let mut config = Config::default();
        let args = CliArgs {
            disable_hlod: true,
            levels: Some(1),
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert!(!config.hlod.enabled);
        assert_eq!(config.hlod.levels.len(), 1);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::parse_from(["nebula-hlod", "--actors", "10", "--disable-hlod"]);
        assert_eq!(args.actors, Some(10));
        assert!(args.disable_hlod);
        assert!(args.seed.is_none());
    }
}
