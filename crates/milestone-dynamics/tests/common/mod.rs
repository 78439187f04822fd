//! Shared fixtures: a few argon atoms with particle 0 caged between planes.

#![allow(dead_code)]

use milestone_core::{ForceGroup, KernelBackend, LangevinConfig};
use milestone_dynamics::reference::{LennardJones, PlanarBoundary, ReferenceContext};

pub const ARGON_MASS: f64 = 39.948;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn group(index: u8) -> ForceGroup {
    ForceGroup::new(index).unwrap()
}

pub fn langevin(seed: u64, backend: KernelBackend) -> LangevinConfig {
    let mut config = LangevinConfig::new(300.0, 1.0, 0.002);
    config.random_seed = seed;
    config.backend = backend;
    config
}

/// Four atoms on a loose line; LJ in group 0.
pub fn argon(first_x: f64) -> ReferenceContext {
    let positions = vec![
        [first_x, 0.0, 0.0],
        [0.0, 0.5, 0.0],
        [0.0, -0.5, 0.0],
        [0.0, 0.0, 0.5],
    ];
    let mut context = ReferenceContext::new(vec![ARGON_MASS; 4], positions).unwrap();
    context.add_force(Box::new(
        LennardJones::new(group(0), 0.3405, 0.996, 0.9).with_periodic_box(3.0),
    ));
    context
}

/// Walls for particle 0 at x = -half_width (group 1) and x = +half_width (group 2).
pub fn caged_argon(first_x: f64, half_width: f64) -> ReferenceContext {
    let mut context = argon(first_x);
    context.add_force(Box::new(PlanarBoundary::new(
        group(1),
        vec![0],
        [-1.0, 0.0, 0.0],
        half_width,
    )));
    context.add_force(Box::new(PlanarBoundary::new(
        group(2),
        vec![0],
        [1.0, 0.0, 0.0],
        half_width,
    )));
    context
}

/// Data rows of a crossing log as (id field, counter, time).
pub fn log_rows(path: &std::path::Path) -> Vec<(String, u64, f64)> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|line| !line.starts_with('#'))
        .map(|line| {
            let fields: Vec<&str> = line.split(',').collect();
            assert_eq!(fields.len(), 3, "malformed row {:?}", line);
            (
                fields[0].to_string(),
                fields[1].parse().unwrap(),
                fields[2].parse().unwrap(),
            )
        })
        .collect()
}
