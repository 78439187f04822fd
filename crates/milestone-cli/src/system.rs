//! Argon box construction on the reference host.

use anyhow::{bail, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use milestone_core::{ForceGroup, Vec3};
use milestone_dynamics::reference::{LennardJones, PlanarBoundary, ReferenceContext};

use crate::config::ArgonBoxConfig;

/// Random placement attempts per particle before giving up
const MAX_PLACEMENT_ATTEMPTS: usize = 10_000;

/// Places particle 0 at `start` and the rest uniformly in the box, keeping
/// every pair at least σ apart so the first force evaluation stays finite.
pub fn place_particles(config: &ArgonBoxConfig) -> Result<Vec<Vec3>> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let min_dist_sq = config.sigma * config.sigma;
    let edge = config.box_edge;

    let mut positions = Vec::with_capacity(config.particles);
    positions.push(config.start);
    while positions.len() < config.particles {
        let mut placed = false;
        for _ in 0..MAX_PLACEMENT_ATTEMPTS {
            let candidate = [
                rng.gen_range(0.0..edge),
                rng.gen_range(0.0..edge),
                rng.gen_range(0.0..edge),
            ];
            let clear = positions
                .iter()
                .all(|p| minimum_image_dist_sq(p, &candidate, edge) >= min_dist_sq);
            if clear {
                positions.push(candidate);
                placed = true;
                break;
            }
        }
        if !placed {
            bail!(
                "could not place particle {} of {} in a {} nm box",
                positions.len(),
                config.particles,
                edge
            );
        }
    }
    Ok(positions)
}

fn minimum_image_dist_sq(a: &Vec3, b: &Vec3, edge: f64) -> f64 {
    let mut dist_sq = 0.0;
    for d in 0..3 {
        let mut delta = b[d] - a[d];
        delta -= edge * (delta / edge).round();
        dist_sq += delta * delta;
    }
    dist_sq
}

/// Builds the context: LJ in group 0 plus one planar boundary per configured group.
pub fn build_argon_box(config: &ArgonBoxConfig, temperature: f64) -> Result<ReferenceContext> {
    config.validate()?;
    let positions = place_particles(config)?;
    let mut context = ReferenceContext::new(vec![config.mass; config.particles], positions)?;

    context.add_force(Box::new(
        LennardJones::new(ForceGroup::new(0)?, config.sigma, config.epsilon, config.cutoff())
            .with_periodic_box(config.box_edge),
    ));
    for boundary in &config.boundaries {
        context.add_force(Box::new(PlanarBoundary::new(
            ForceGroup::new(boundary.group)?,
            vec![0],
            boundary.normal,
            boundary.offset,
        )));
    }
    context.set_velocities_to_temperature(temperature, config.seed);

    log::info!(
        "Argon box: {} particles, {:.2} nm edge, {} boundaries on particle 0",
        config.particles,
        config.box_edge,
        config.boundaries.len()
    );
    Ok(context)
}
