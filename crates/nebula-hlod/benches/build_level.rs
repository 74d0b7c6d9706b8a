use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use glam::Vec3;
use nebula_config::{HlodConfig, LevelSettings};
use nebula_hlod::{ClusterBuilder, ProducedAssets, ProxyRequest, SceneActor, SceneGraph};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn scattered_scene(count: usize, spread: f32) -> SceneGraph {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut scene = SceneGraph::new();
    for _ in 0..count {
        let center = Vec3::new(
            rng.random_range(-spread..spread),
            0.0,
            rng.random_range(-spread..spread),
        );
        scene.spawn(SceneActor::sphere(center, rng.random_range(0.5..4.0)));
    }
    scene
}

fn no_mesh(_: &ProxyRequest) -> ProducedAssets {
    ProducedAssets::default()
}

fn config() -> HlodConfig {
    HlodConfig {
        levels: vec![
            LevelSettings::default(),
            LevelSettings {
                desired_bound_radius_m: 60.0,
                transition_screen_size: 0.1,
                ..LevelSettings::default()
            },
        ],
        ..HlodConfig::default()
    }
}

fn bench_preview_level(c: &mut Criterion) {
    let mut group = c.benchmark_group("preview_level");
    for count in [100usize, 400] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |bencher, &count| {
            bencher.iter_batched(
                || ClusterBuilder::new(scattered_scene(count, 150.0), no_mesh, config()),
                |mut builder| black_box(builder.preview_level(1).map(|r| r.nodes_created)),
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_build_all(c: &mut Criterion) {
    c.bench_function("build_all_structure_400", |bencher| {
        bencher.iter_batched(
            || ClusterBuilder::new(scattered_scene(400, 150.0), no_mesh, config()),
            |mut builder| black_box(builder.build_all(false).map(|r| r.len())),
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_preview_level, bench_build_all);
criterion_main!(benches);
