//! Builds an HLOD hierarchy for a synthetic scene and prints what it made.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p nebula-hlod-demo -- --actors 2000 --spread 400`.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use glam::Vec3;
use nebula_config::{CliArgs, Config, SceneConfig, default_config_dir};
use nebula_hlod::{
    ActorFlags, AssetRef, ClusterBuilder, LevelReport, MergeWorkerPool, MeshMergeService, Mobility,
    PrimitiveComponent, ProducedAssets, ProxyMesh, ProxyRequest, SceneActor, SceneGraph,
    SceneQuery, Severity,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{error, info, warn};

/// Longest the demo waits for outstanding proxy builds.
const PROXY_TIMEOUT: Duration = Duration::from_secs(30);

fn scatter_scene(settings: &SceneConfig) -> SceneGraph {
    let mut rng = ChaCha8Rng::seed_from_u64(settings.seed);
    let spread = settings.spread_m.max(1.0);
    let min_radius = settings.min_actor_radius_m.max(0.01);
    let max_radius = settings.max_actor_radius_m.max(min_radius + 0.01);

    let mut scene = SceneGraph::new();
    for index in 0..settings.actor_count {
        let center = Vec3::new(
            rng.random_range(-spread..spread),
            rng.random_range(0.0..4.0),
            rng.random_range(-spread..spread),
        );
        let radius = rng.random_range(min_radius..max_radius);

        let component_count = rng.random_range(1..=3);
        let components = (0..component_count)
            .map(|c| {
                let vertices = rng.random_range(200..4_000);
                let mut component =
                    PrimitiveComponent::static_mesh(format!("prop{index}_{c}"), vertices, vertices / 2);
                if rng.random_bool(0.03) {
                    component.mobility = Mobility::Movable;
                }
                component
            })
            .collect();
        let flags = ActorFlags {
            hidden: rng.random_bool(0.02),
            hlod_enabled: !rng.random_bool(0.02),
            excluded_levels: 0,
        };

        scene.spawn(
            SceneActor::sphere(center, radius)
                .with_components(components)
                .with_flags(flags),
        );
    }
    scene
}

/// Stand-in for a mesh simplifier: keeps a share of the input geometry that
/// grows with the requested on-screen size.
fn simulate_merge(request: &ProxyRequest) -> ProducedAssets {
    if request.components.is_empty() {
        return ProducedAssets::default();
    }
    let source_vertices: u32 = request
        .components
        .iter()
        .map(|c| c.component.vertex_count)
        .sum();
    let keep = if request.simplify {
        (request.settings.screen_size_px as f32 / 1_000.0).clamp(0.02, 1.0)
    } else {
        1.0
    };
    let vertex_count = ((source_vertices as f32 * keep) as u32).max(3);
    let origin = if request.settings.pivot_at_zero {
        Vec3::ZERO
    } else {
        request.bounds.center
    };

    ProducedAssets {
        mesh: Some(ProxyMesh {
            name: format!("{}/SM_{}", request.package.path, request.name_hint),
            vertex_count,
            triangle_count: vertex_count / 2,
        }),
        sub_assets: vec![
            AssetRef(format!("{}/M_{}", request.package.path, request.name_hint)),
            AssetRef(format!("{}/T_{}_D", request.package.path, request.name_hint)),
        ],
        origin,
    }
}

fn wait_for_proxies<S: SceneQuery, M: MeshMergeService>(builder: &mut ClusterBuilder<S, M>) {
    let start = Instant::now();
    let mut applied = 0;
    loop {
        applied += builder.tick().applied;
        if builder.coordinator().is_idle() {
            break;
        }
        if start.elapsed() > PROXY_TIMEOUT {
            warn!(
                pending = builder.coordinator().pending_count(),
                "gave up waiting for proxy builds"
            );
            break;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    info!(applied, elapsed_ms = start.elapsed().as_millis() as u64, "proxy builds applied");
}

fn print_summary<S: SceneQuery, M: MeshMergeService>(
    reports: &[LevelReport],
    builder: &ClusterBuilder<S, M>,
) {
    for report in reports {
        if let Some(reason) = report.skipped {
            println!("level {}: skipped ({reason:?})", report.level);
            continue;
        }
        println!(
            "level {}: {} clusters, {} unclustered, {} passes, {} proxy jobs",
            report.level,
            report.nodes_created,
            report.unclustered,
            report.merge_passes,
            report.jobs_submitted
        );
    }

    let stats = builder.tree().stats();
    for level in &stats.levels {
        println!(
            "  HLOD{}: {} nodes ({} built, {} dirty), {} direct actors, {} proxy triangles",
            level.level,
            level.nodes,
            level.built,
            level.dirty,
            level.leaf_members,
            level.proxy_triangles
        );
    }
    println!("{} nodes total", stats.total_nodes());

    let messages = builder.messages();
    if !messages.is_empty() {
        let errors = messages
            .entries()
            .iter()
            .filter(|m| m.severity == Severity::Error)
            .count();
        println!("{} messages ({errors} errors)", messages.len());
    }
}

fn main() {
    let args = CliArgs::parse();

    let config_dir = args
        .config
        .clone()
        .or_else(default_config_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    nebula_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(e) = config.hlod.validate() {
        error!(%e, "invalid HLOD settings after CLI overrides");
        std::process::exit(2);
    }

    let scene = scatter_scene(&config.scene);
    info!(
        actors = scene.len(),
        seed = config.scene.seed,
        spread_m = config.scene.spread_m,
        "scattered demo scene"
    );

    let pool = match config.scene.worker_threads {
        0 => MergeWorkerPool::with_defaults(simulate_merge),
        n => MergeWorkerPool::new(n, simulate_merge),
    };
    let pool = match pool {
        Ok(pool) => pool,
        Err(e) => {
            error!(%e, "failed to start merge workers");
            std::process::exit(1);
        }
    };
    info!(workers = pool.worker_count(), "merge workers ready");

    let mut builder = ClusterBuilder::new(scene, pool, config.hlod.clone())
        .with_cluster_details(config.debug.log_cluster_details);

    let started = Instant::now();
    let reports = match builder.build_all(true) {
        Ok(reports) => reports,
        Err(e) => {
            error!(%e, "HLOD build failed");
            std::process::exit(1);
        }
    };
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "clustering finished");

    wait_for_proxies(&mut builder);
    print_summary(&reports, &builder);
}
