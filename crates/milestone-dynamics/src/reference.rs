//! CPU reference host engine.
//!
//! [`ReferenceContext`] owns the particle arrays and a list of [`ForceTerm`]s,
//! each assigned to one force group. Group-restricted energy evaluation is
//! what boundary forces use to report their state, so a milestone surface is
//! just a force term with zero force whose energy is its indicator value.
//!
//! Units: nm, ps, amu, kJ/mol.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use milestone_core::{
    DynamicsView, ForceGroup, GroupMask, MilestoneError, Result, SimulationContext, Vec3,
};

use crate::boundary::pack_bitmask;
use crate::langevin::BOLTZ;

/// One contribution to the potential energy.
pub trait ForceTerm {
    fn name(&self) -> &str;

    fn group(&self) -> ForceGroup;

    /// Accumulates forces into `forces` and returns the energy.
    fn evaluate(&self, positions: &[Vec3], forces: &mut [Vec3]) -> f64;

    fn energy(&self, positions: &[Vec3]) -> f64 {
        let mut scratch = vec![[0.0; 3]; positions.len()];
        self.evaluate(positions, &mut scratch)
    }
}

/// Harmonic tether of one particle to a fixed point: E = ½k|x - x₀|².
#[derive(Debug, Clone)]
pub struct HarmonicRestraint {
    pub group: ForceGroup,
    pub particle: usize,
    pub anchor: Vec3,
    /// kJ/(mol·nm²)
    pub k: f64,
}

impl ForceTerm for HarmonicRestraint {
    fn name(&self) -> &str {
        "harmonic_restraint"
    }

    fn group(&self) -> ForceGroup {
        self.group
    }

    fn evaluate(&self, positions: &[Vec3], forces: &mut [Vec3]) -> f64 {
        let x = positions[self.particle];
        let mut energy = 0.0;
        for d in 0..3 {
            let dx = x[d] - self.anchor[d];
            energy += 0.5 * self.k * dx * dx;
            forces[self.particle][d] -= self.k * dx;
        }
        energy
    }
}

/// Truncated 12-6 Lennard-Jones between all particle pairs.
#[derive(Debug, Clone)]
pub struct LennardJones {
    pub group: ForceGroup,
    /// nm
    pub sigma: f64,
    /// kJ/mol
    pub epsilon: f64,
    /// nm
    pub cutoff: f64,
    /// Cubic periodic box edge (nm); minimum-image convention when set
    pub box_edge: Option<f64>,
}

impl LennardJones {
    pub fn new(group: ForceGroup, sigma: f64, epsilon: f64, cutoff: f64) -> Self {
        Self {
            group,
            sigma,
            epsilon,
            cutoff,
            box_edge: None,
        }
    }

    pub fn with_periodic_box(mut self, edge: f64) -> Self {
        self.box_edge = Some(edge);
        self
    }

    fn separation(&self, a: &Vec3, b: &Vec3) -> Vec3 {
        let mut r = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
        if let Some(edge) = self.box_edge {
            for component in &mut r {
                *component -= edge * (*component / edge).round();
            }
        }
        r
    }
}

impl ForceTerm for LennardJones {
    fn name(&self) -> &str {
        "lennard_jones"
    }

    fn group(&self) -> ForceGroup {
        self.group
    }

    fn evaluate(&self, positions: &[Vec3], forces: &mut [Vec3]) -> f64 {
        let cutoff_sq = self.cutoff * self.cutoff;
        let sig_sq = self.sigma * self.sigma;
        let n = positions.len();
        let mut energy = 0.0;

        for i in 0..n {
            for j in (i + 1)..n {
                let r_ij = self.separation(&positions[i], &positions[j]);
                let dist_sq = r_ij[0] * r_ij[0] + r_ij[1] * r_ij[1] + r_ij[2] * r_ij[2];
                if dist_sq > cutoff_sq || dist_sq == 0.0 {
                    continue;
                }

                let term6 = (sig_sq / dist_sq).powi(3);
                let term12 = term6 * term6;
                energy += 4.0 * self.epsilon * (term12 - term6);

                // F_j = 24ε(2σ¹²/r¹² - σ⁶/r⁶)/r² · r_ij
                let scale = 24.0 * self.epsilon * (2.0 * term12 - term6) / dist_sq;
                for d in 0..3 {
                    let f = scale * r_ij[d];
                    forces[j][d] += f;
                    forces[i][d] -= f;
                }
            }
        }
        energy
    }
}

/// Plane crossed by the unweighted centroid of a particle group.
///
/// Crossed when `normal · centroid > offset`; flipping `normal` and `offset`
/// selects the other side.
#[derive(Debug, Clone)]
pub struct PlanarSurface {
    pub particles: Vec<usize>,
    pub normal: Vec3,
    pub offset: f64,
}

impl PlanarSurface {
    pub fn new(particles: Vec<usize>, normal: Vec3, offset: f64) -> Self {
        Self {
            particles,
            normal,
            offset,
        }
    }

    pub fn centroid(&self, positions: &[Vec3]) -> Vec3 {
        let mut centroid = [0.0; 3];
        if self.particles.is_empty() {
            return centroid;
        }
        for &p in &self.particles {
            for d in 0..3 {
                centroid[d] += positions[p][d];
            }
        }
        let inv_n = 1.0 / self.particles.len() as f64;
        centroid.map(|c| c * inv_n)
    }

    pub fn is_crossed(&self, positions: &[Vec3]) -> bool {
        let c = self.centroid(positions);
        let projection = self.normal[0] * c[0] + self.normal[1] * c[1] + self.normal[2] * c[2];
        projection > self.offset
    }
}

/// Single milestone surface: indicator 1 when crossed, 0 otherwise. No force.
#[derive(Debug, Clone)]
pub struct PlanarBoundary {
    pub group: ForceGroup,
    pub surface: PlanarSurface,
}

impl PlanarBoundary {
    pub fn new(group: ForceGroup, particles: Vec<usize>, normal: Vec3, offset: f64) -> Self {
        Self {
            group,
            surface: PlanarSurface::new(particles, normal, offset),
        }
    }
}

impl ForceTerm for PlanarBoundary {
    fn name(&self) -> &str {
        "planar_boundary"
    }

    fn group(&self) -> ForceGroup {
        self.group
    }

    fn evaluate(&self, positions: &[Vec3], _forces: &mut [Vec3]) -> f64 {
        if self.surface.is_crossed(positions) {
            1.0
        } else {
            0.0
        }
    }
}

/// Several surfaces sharing one force group, reported as a packed bitmask.
#[derive(Debug, Clone)]
pub struct PackedBoundaries {
    pub group: ForceGroup,
    pub surfaces: Vec<PlanarSurface>,
}

impl PackedBoundaries {
    pub fn new(group: ForceGroup, surfaces: Vec<PlanarSurface>) -> Self {
        Self { group, surfaces }
    }
}

impl ForceTerm for PackedBoundaries {
    fn name(&self) -> &str {
        "packed_boundaries"
    }

    fn group(&self) -> ForceGroup {
        self.group
    }

    fn evaluate(&self, positions: &[Vec3], _forces: &mut [Vec3]) -> f64 {
        let flags: Vec<bool> = self
            .surfaces
            .iter()
            .map(|surface| surface.is_crossed(positions))
            .collect();
        pack_bitmask(&flags)
    }
}

/// In-memory CPU simulation context.
pub struct ReferenceContext {
    positions: Vec<Vec3>,
    velocities: Vec<Vec3>,
    forces: Vec<Vec3>,
    masses: Vec<f64>,
    inverse_masses: Vec<f64>,
    terms: Vec<Box<dyn ForceTerm>>,
    potential_energy: f64,
    time: f64,
    step: u64,
}

impl ReferenceContext {
    /// Particles at rest. A zero mass pins the particle in place.
    pub fn new(masses: Vec<f64>, positions: Vec<Vec3>) -> Result<Self> {
        if masses.len() != positions.len() {
            return Err(MilestoneError::config(format!(
                "{} masses for {} positions",
                masses.len(),
                positions.len()
            )));
        }
        if let Some(bad) = masses.iter().find(|m| !m.is_finite() || **m < 0.0) {
            return Err(MilestoneError::config(format!("invalid particle mass {}", bad)));
        }
        let inverse_masses = masses
            .iter()
            .map(|&m| if m == 0.0 { 0.0 } else { 1.0 / m })
            .collect();
        let n = positions.len();
        Ok(Self {
            positions,
            velocities: vec![[0.0; 3]; n],
            forces: vec![[0.0; 3]; n],
            masses,
            inverse_masses,
            terms: Vec::new(),
            potential_energy: 0.0,
            time: 0.0,
            step: 0,
        })
    }

    /// Registers a force term; returns its index.
    pub fn add_force(&mut self, term: Box<dyn ForceTerm>) -> usize {
        log::debug!("Added {} in force group {}", term.name(), term.group());
        self.terms.push(term);
        self.terms.len() - 1
    }

    pub fn num_forces(&self) -> usize {
        self.terms.len()
    }

    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    /// Potential energy from the last force evaluation.
    pub fn potential_energy(&self) -> f64 {
        self.potential_energy
    }

    pub fn set_positions(&mut self, positions: Vec<Vec3>) -> Result<()> {
        self.check_len("positions", positions.len())?;
        self.positions = positions;
        Ok(())
    }

    pub fn set_velocities(&mut self, velocities: Vec<Vec3>) -> Result<()> {
        self.check_len("velocities", velocities.len())?;
        self.velocities = velocities;
        Ok(())
    }

    /// Maxwell-Boltzmann velocities at `temperature` with zero net momentum.
    pub fn set_velocities_to_temperature(&mut self, temperature: f64, seed: u64) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        for (v, &m) in self.velocities.iter_mut().zip(&self.masses) {
            if m == 0.0 {
                *v = [0.0; 3];
                continue;
            }
            // σ = sqrt(kT/m) in nm/ps
            let sigma = (BOLTZ * temperature / m).sqrt();
            for component in v.iter_mut() {
                let xi: f64 = rng.sample(StandardNormal);
                *component = sigma * xi;
            }
        }

        let total_mass: f64 = self.masses.iter().sum();
        if total_mass == 0.0 {
            return;
        }
        let mut com_vel = [0.0; 3];
        for (v, &m) in self.velocities.iter().zip(&self.masses) {
            for d in 0..3 {
                com_vel[d] += m * v[d];
            }
        }
        for d in 0..3 {
            com_vel[d] /= total_mass;
        }
        for (v, &m) in self.velocities.iter_mut().zip(&self.masses) {
            if m == 0.0 {
                continue;
            }
            for d in 0..3 {
                v[d] -= com_vel[d];
            }
        }
    }

    fn check_len(&self, what: &str, len: usize) -> Result<()> {
        if len != self.positions.len() {
            return Err(MilestoneError::config(format!(
                "{} {} for {} particles",
                len,
                what,
                self.positions.len()
            )));
        }
        Ok(())
    }
}

impl SimulationContext for ReferenceContext {
    fn num_particles(&self) -> usize {
        self.positions.len()
    }

    fn compute_forces(&mut self) -> Result<()> {
        for f in &mut self.forces {
            *f = [0.0; 3];
        }
        let mut energy = 0.0;
        for term in &self.terms {
            energy += term.evaluate(&self.positions, &mut self.forces);
        }
        if !energy.is_finite() {
            return Err(MilestoneError::numerical(format!(
                "non-finite potential energy at step {}",
                self.step
            )));
        }
        self.potential_energy = energy;
        Ok(())
    }

    fn evaluate_boundary_indicator(&mut self, groups: GroupMask) -> Result<f64> {
        Ok(self
            .terms
            .iter()
            .filter(|term| groups.contains(term.group()))
            .map(|term| term.energy(&self.positions))
            .sum())
    }

    fn has_force_group(&self, group: ForceGroup) -> bool {
        self.terms.iter().any(|term| term.group() == group)
    }

    fn dynamics(&mut self) -> DynamicsView<'_> {
        DynamicsView {
            positions: &mut self.positions,
            velocities: &mut self.velocities,
            forces: &self.forces,
            inverse_masses: &self.inverse_masses,
        }
    }

    fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    fn velocities(&self) -> &[Vec3] {
        &self.velocities
    }

    fn forces(&self) -> &[Vec3] {
        &self.forces
    }

    fn inverse_masses(&self) -> &[f64] {
        &self.inverse_masses
    }

    fn time(&self) -> f64 {
        self.time
    }

    fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    fn step_count(&self) -> u64 {
        self.step
    }

    fn set_step_count(&mut self, step: u64) {
        self.step = step;
    }
}
