//! Tracing setup shared by the HLOD tools.
//!
//! Console output is always on. Debug builds can additionally write a JSON
//! event log next to the config directory, which is handy when a clustering
//! run over a large scene has to be inspected afterwards.

use nebula_config::Config;
use std::fs::File;
use std::path::Path;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Directives used when neither `RUST_LOG` nor the config provides any.
pub const DEFAULT_FILTER: &str = "info,nebula_hlod=info";

/// File name of the JSON event log.
pub const LOG_FILE_NAME: &str = "nebula-hlod.log";

/// Install the global subscriber.
///
/// Filter precedence is `RUST_LOG`, then `config.debug.log_level`, then
/// [`DEFAULT_FILTER`]. The JSON file layer is only attached when
/// `debug_build` is set and `log_dir` can be created. A second call leaves the
/// first subscriber in place.
///
/// ```no_run
/// use nebula_config::Config;
///
/// let config = Config::default();
/// nebula_log::init_logging(Some(std::path::Path::new("./logs")), true, Some(&config));
/// ```
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(configured_directives(config)));

    let console = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_timer(fmt::time::uptime());

    let registry = tracing_subscriber::registry().with(filter).with(console);

    let json_file = log_dir.filter(|_| debug_build).and_then(open_log_file);
    let installed = match json_file {
        Some(file) => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_timer(fmt::time::uptime()),
            )
            .try_init(),
        None => registry.try_init(),
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// The filter directives requested by `config`, if any.
fn configured_directives(config: Option<&Config>) -> &str {
    config
        .map(|c| c.debug.log_level.trim())
        .filter(|level| !level.is_empty())
        .unwrap_or(DEFAULT_FILTER)
}

fn open_log_file(dir: &Path) -> Option<File> {
    std::fs::create_dir_all(dir).ok()?;
    File::create(dir.join(LOG_FILE_NAME)).ok()
}

/// `EnvFilter` built from [`DEFAULT_FILTER`].
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}
