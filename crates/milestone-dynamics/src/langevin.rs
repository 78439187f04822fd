//! Langevin "middle" integration step
//!
//! One step is split into three kernels around the host's constraint solver:
//!
//! ```text
//! kick       v += dt·f/m                       → velocity constraints
//! propagate  Δ  = ½dt·v
//!            v  = vscale·v + noise·sqrt(1/m)·ξ
//!            Δ += ½dt·v                        → position constraints on Δ
//! finalize   v += (Δ_constrained - Δ)/dt
//!            x += Δ                            → virtual sites
//! ```
//!
//! This is BAOAB with the trailing half-kick of one step fused into the
//! leading half-kick of the next, so forces are evaluated once per step and
//! velocities live on half steps.
//!
//! Units follow the host: nm, ps, amu, kJ/mol.
//!
//! # Backends
//!
//! [`ReferenceKernels`] runs the kernels serially, [`ParallelKernels`] splits
//! particles across the rayon pool. Both share the per-particle arithmetic and
//! consume the same pre-drawn noise buffer, so a fixed seed gives bit-identical
//! trajectories on either backend.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;

use milestone_core::{KernelBackend, LangevinConfig, Result, SimulationContext, Vec3};

/// Boltzmann constant in kJ/(mol·K)
pub const BOLTZ: f64 = 0.008_314_462_618;

/// Velocity damping and noise amplitude for one (T, γ, dt) triple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LangevinCoefficients {
    /// exp(-dt·γ)
    pub vscale: f64,
    /// sqrt(kT·(1 - vscale²)), multiplied by sqrt(1/m) per particle
    pub noise_scale: f64,
}

impl LangevinCoefficients {
    pub fn compute(temperature: f64, friction: f64, step_size: f64) -> Self {
        let kt = BOLTZ * temperature;
        let vscale = (-step_size * friction).exp();
        let noise_scale = (kt * (1.0 - vscale * vscale)).sqrt();
        Self { vscale, noise_scale }
    }
}

/// Caches coefficients until temperature, friction or step size change.
#[derive(Debug, Clone, Default)]
pub struct CoefficientCache {
    key: Option<(f64, f64, f64)>,
    coefficients: Option<LangevinCoefficients>,
    recomputations: u64,
}

impl CoefficientCache {
    pub fn get(&mut self, temperature: f64, friction: f64, step_size: f64) -> LangevinCoefficients {
        let key = (temperature, friction, step_size);
        match (self.key, self.coefficients) {
            (Some(cached), Some(coefficients)) if cached == key => coefficients,
            _ => {
                let coefficients = LangevinCoefficients::compute(temperature, friction, step_size);
                log::debug!(
                    "Langevin coefficients for T={} K, γ={} /ps, dt={} ps: vscale={:.6}, noise={:.6}",
                    temperature,
                    friction,
                    step_size,
                    coefficients.vscale,
                    coefficients.noise_scale
                );
                self.key = Some(key);
                self.coefficients = Some(coefficients);
                self.recomputations += 1;
                coefficients
            }
        }
    }

    /// How many times the coefficients have been (re)computed.
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }
}

/// Seeded Gaussian stream, one value per degree of freedom per step.
#[derive(Debug, Clone)]
pub struct NoiseStream {
    rng: ChaCha8Rng,
    buffer: Vec<Vec3>,
    draws: u64,
}

impl NoiseStream {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            buffer: Vec::new(),
            draws: 0,
        }
    }

    /// Draws fresh noise for `num_particles` particles in particle order.
    pub fn prepare(&mut self, num_particles: usize) -> &[Vec3] {
        self.buffer.clear();
        self.buffer.reserve(num_particles);
        for _ in 0..num_particles {
            let x: f64 = self.rng.sample(StandardNormal);
            let y: f64 = self.rng.sample(StandardNormal);
            let z: f64 = self.rng.sample(StandardNormal);
            self.buffer.push([x, y, z]);
        }
        self.draws += 3 * num_particles as u64;
        &self.buffer
    }

    /// Total scalar values drawn so far.
    pub fn draws(&self) -> u64 {
        self.draws
    }
}

#[inline]
fn kick_particle(velocity: &mut Vec3, force: &Vec3, inverse_mass: f64, step_size: f64) {
    if inverse_mass == 0.0 {
        return;
    }
    for d in 0..3 {
        velocity[d] += step_size * force[d] * inverse_mass;
    }
}

#[inline]
fn propagate_particle(
    velocity: &mut Vec3,
    delta: &mut Vec3,
    old_delta: &mut Vec3,
    inverse_mass: f64,
    noise: &Vec3,
    coefficients: LangevinCoefficients,
    step_size: f64,
) {
    if inverse_mass == 0.0 {
        *delta = [0.0; 3];
        *old_delta = [0.0; 3];
        return;
    }
    let sqrt_inv_mass = inverse_mass.sqrt();
    for d in 0..3 {
        delta[d] = 0.5 * step_size * velocity[d];
        velocity[d] = coefficients.vscale * velocity[d]
            + coefficients.noise_scale * sqrt_inv_mass * noise[d];
        delta[d] += 0.5 * step_size * velocity[d];
    }
    *old_delta = *delta;
}

#[inline]
fn finalize_particle(
    position: &mut Vec3,
    velocity: &mut Vec3,
    delta: &Vec3,
    old_delta: &Vec3,
    inverse_mass: f64,
    step_size: f64,
) {
    if inverse_mass == 0.0 {
        return;
    }
    let inv_step = 1.0 / step_size;
    for d in 0..3 {
        velocity[d] += (delta[d] - old_delta[d]) * inv_step;
        position[d] += delta[d];
    }
}

/// Numeric kernels of one Langevin step; one implementation per backend.
pub trait LangevinKernels: Send + Sync {
    fn name(&self) -> &'static str;

    fn kick(&self, velocities: &mut [Vec3], forces: &[Vec3], inverse_masses: &[f64], step_size: f64);

    #[allow(clippy::too_many_arguments)]
    fn propagate(
        &self,
        velocities: &mut [Vec3],
        deltas: &mut [Vec3],
        old_deltas: &mut [Vec3],
        inverse_masses: &[f64],
        noise: &[Vec3],
        coefficients: LangevinCoefficients,
        step_size: f64,
    );

    fn finalize(
        &self,
        positions: &mut [Vec3],
        velocities: &mut [Vec3],
        deltas: &[Vec3],
        old_deltas: &[Vec3],
        inverse_masses: &[f64],
        step_size: f64,
    );
}

/// Serial CPU kernels.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceKernels;

impl LangevinKernels for ReferenceKernels {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn kick(&self, velocities: &mut [Vec3], forces: &[Vec3], inverse_masses: &[f64], step_size: f64) {
        for ((v, f), &inv_m) in velocities.iter_mut().zip(forces).zip(inverse_masses) {
            kick_particle(v, f, inv_m, step_size);
        }
    }

    fn propagate(
        &self,
        velocities: &mut [Vec3],
        deltas: &mut [Vec3],
        old_deltas: &mut [Vec3],
        inverse_masses: &[f64],
        noise: &[Vec3],
        coefficients: LangevinCoefficients,
        step_size: f64,
    ) {
        for i in 0..velocities.len() {
            propagate_particle(
                &mut velocities[i],
                &mut deltas[i],
                &mut old_deltas[i],
                inverse_masses[i],
                &noise[i],
                coefficients,
                step_size,
            );
        }
    }

    fn finalize(
        &self,
        positions: &mut [Vec3],
        velocities: &mut [Vec3],
        deltas: &[Vec3],
        old_deltas: &[Vec3],
        inverse_masses: &[f64],
        step_size: f64,
    ) {
        for i in 0..positions.len() {
            finalize_particle(
                &mut positions[i],
                &mut velocities[i],
                &deltas[i],
                &old_deltas[i],
                inverse_masses[i],
                step_size,
            );
        }
    }
}

/// Particle-parallel CPU kernels on the global rayon pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParallelKernels;

impl LangevinKernels for ParallelKernels {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn kick(&self, velocities: &mut [Vec3], forces: &[Vec3], inverse_masses: &[f64], step_size: f64) {
        velocities
            .par_iter_mut()
            .zip(forces.par_iter())
            .zip(inverse_masses.par_iter())
            .for_each(|((v, f), &inv_m)| kick_particle(v, f, inv_m, step_size));
    }

    fn propagate(
        &self,
        velocities: &mut [Vec3],
        deltas: &mut [Vec3],
        old_deltas: &mut [Vec3],
        inverse_masses: &[f64],
        noise: &[Vec3],
        coefficients: LangevinCoefficients,
        step_size: f64,
    ) {
        velocities
            .par_iter_mut()
            .zip(deltas.par_iter_mut())
            .zip(old_deltas.par_iter_mut())
            .zip(inverse_masses.par_iter().zip(noise.par_iter()))
            .for_each(|(((v, delta), old_delta), (&inv_m, xi))| {
                propagate_particle(v, delta, old_delta, inv_m, xi, coefficients, step_size)
            });
    }

    fn finalize(
        &self,
        positions: &mut [Vec3],
        velocities: &mut [Vec3],
        deltas: &[Vec3],
        old_deltas: &[Vec3],
        inverse_masses: &[f64],
        step_size: f64,
    ) {
        positions
            .par_iter_mut()
            .zip(velocities.par_iter_mut())
            .zip(deltas.par_iter().zip(old_deltas.par_iter()))
            .zip(inverse_masses.par_iter())
            .for_each(|(((x, v), (delta, old_delta)), &inv_m)| {
                finalize_particle(x, v, delta, old_delta, inv_m, step_size)
            });
    }
}

pub fn kernels_for(backend: KernelBackend) -> Box<dyn LangevinKernels> {
    match backend {
        KernelBackend::Reference => Box::new(ReferenceKernels),
        KernelBackend::Parallel => Box::new(ParallelKernels),
    }
}

/// Drives the three kernels against a host context and keeps the pre-step
/// state needed to undo a step.
pub struct LangevinStepper {
    kernels: Box<dyn LangevinKernels>,
    cache: CoefficientCache,
    noise: NoiseStream,
    deltas: Vec<Vec3>,
    old_deltas: Vec<Vec3>,
    saved_positions: Vec<Vec3>,
    saved_velocities: Vec<Vec3>,
}

impl LangevinStepper {
    pub fn new(config: &LangevinConfig) -> Self {
        Self::with_kernels(kernels_for(config.backend), config.random_seed)
    }

    pub fn with_kernels(kernels: Box<dyn LangevinKernels>, seed: u64) -> Self {
        Self {
            kernels,
            cache: CoefficientCache::default(),
            noise: NoiseStream::new(seed),
            deltas: Vec::new(),
            old_deltas: Vec::new(),
            saved_positions: Vec::new(),
            saved_velocities: Vec::new(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.kernels.name()
    }

    /// Advances positions and velocities by one step.
    ///
    /// Forces must already be evaluated for the current positions. Time and
    /// step counter are left to the caller.
    pub fn integrate<C: SimulationContext + ?Sized>(
        &mut self,
        context: &mut C,
        config: &LangevinConfig,
    ) -> Result<()> {
        let dt = config.step_size;
        let coefficients = self.cache.get(config.temperature, config.friction, dt);
        let n = context.num_particles();
        self.deltas.resize(n, [0.0; 3]);
        self.old_deltas.resize(n, [0.0; 3]);
        let noise = self.noise.prepare(n);

        {
            let view = context.dynamics();
            self.saved_positions.clear();
            self.saved_positions.extend_from_slice(view.positions);
            self.kernels.kick(view.velocities, view.forces, view.inverse_masses, dt);
        }
        context.apply_velocity_constraints(config.constraint_tolerance)?;

        {
            let view = context.dynamics();
            self.saved_velocities.clear();
            self.saved_velocities.extend_from_slice(view.velocities);
            self.kernels.propagate(
                view.velocities,
                &mut self.deltas,
                &mut self.old_deltas,
                view.inverse_masses,
                noise,
                coefficients,
                dt,
            );
        }
        context.apply_position_constraints(&mut self.deltas, config.constraint_tolerance)?;

        {
            let view = context.dynamics();
            self.kernels.finalize(
                view.positions,
                view.velocities,
                &self.deltas,
                &self.old_deltas,
                view.inverse_masses,
                dt,
            );
        }
        context.compute_virtual_sites()
    }

    /// Takes the last step back and reverses the velocities.
    ///
    /// Positions return to their pre-step values and every velocity is set to
    /// the negated post-kick velocity of that step.
    pub fn reverse_last_step<C: SimulationContext + ?Sized>(&self, context: &mut C) {
        let view = context.dynamics();
        view.positions.copy_from_slice(&self.saved_positions);
        for (v, saved) in view.velocities.iter_mut().zip(&self.saved_velocities) {
            *v = [-saved[0], -saved[1], -saved[2]];
        }
    }
}

/// Kinetic energy with half-step velocities shifted to integer time.
pub fn kinetic_energy<C: SimulationContext + ?Sized>(context: &C, step_size: f64) -> f64 {
    let mut energy = 0.0;
    for ((v, f), &inv_m) in context
        .velocities()
        .iter()
        .zip(context.forces())
        .zip(context.inverse_masses())
    {
        if inv_m == 0.0 {
            continue;
        }
        let mut v_sq = 0.0;
        for d in 0..3 {
            let shifted = v[d] + 0.5 * step_size * f[d] * inv_m;
            v_sq += shifted * shifted;
        }
        energy += 0.5 * v_sq / inv_m;
    }
    energy
}
