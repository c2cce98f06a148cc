//! Criterion benchmarks for the locomotion pipeline.
//!
//! Run with:
//!   cargo bench
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use hexgait::controller::{Action, Controller, ControllerConfig};
use hexgait::experiments::env_flat_walk::{FlatTerrain, FlatTerrainConfig, SineSteps};
use hexgait::oscillator::{CpgConfig, CpgNetwork};

/// The bare oscillator step, the innermost hot loop.
fn bench_cpg_step(c: &mut Criterion) {
    c.bench_function("cpg_step", |b| {
        let mut net = CpgNetwork::new(CpgConfig::default().with_seed(42));
        b.iter(|| {
            net.step();
            black_box(net.phases()[0])
        });
    });
}

/// One full control tick: corrections, oscillator, joint synthesis, body.
fn bench_control_tick(c: &mut Criterion) {
    c.bench_function("control_tick", |b| {
        let mut ctl = Controller::new(
            ControllerConfig::default().with_seed(42),
            SineSteps::default(),
        )
        .expect("default sensor placements cover all legs");
        let mut body = FlatTerrain::new(FlatTerrainConfig::default());
        let action = Action::Steering([1.0, 0.4]);
        b.iter(|| {
            let out = ctl.step(&mut body, &action).expect("hybrid step");
            black_box(out.observation.fly_position[0])
        });
    });
}

criterion_group!(benches, bench_cpg_step, bench_control_tick);
criterion_main!(benches);
