//! Host-engine contract consumed by the milestoning integrators.
//!
//! The integrators never evaluate forces or apply constraints themselves;
//! everything that depends on the force field goes through
//! [`SimulationContext`]. A CPU implementation lives in
//! `milestone_dynamics::reference`.

use crate::errors::Result;
use crate::types::{ForceGroup, GroupMask, StateSnapshot, Vec3};

/// Mutable split borrow of the per-particle arrays a step updates.
///
/// Forces and inverse masses are read-only during integration; a zero
/// inverse mass marks a particle that must not move.
pub struct DynamicsView<'a> {
    pub positions: &'a mut [Vec3],
    pub velocities: &'a mut [Vec3],
    pub forces: &'a [Vec3],
    pub inverse_masses: &'a [f64],
}

impl DynamicsView<'_> {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Simulation context an integrator is bound to.
pub trait SimulationContext {
    fn num_particles(&self) -> usize;

    /// Evaluates forces on all particles for the current positions.
    fn compute_forces(&mut self) -> Result<()>;

    /// Potential energy restricted to the force groups in `groups`.
    ///
    /// Boundary forces report their crossing state through this channel.
    fn evaluate_boundary_indicator(&mut self, groups: GroupMask) -> Result<f64>;

    /// Whether any force in the system is assigned to `group`.
    fn has_force_group(&self, group: ForceGroup) -> bool;

    fn dynamics(&mut self) -> DynamicsView<'_>;

    fn positions(&self) -> &[Vec3];
    fn velocities(&self) -> &[Vec3];
    fn forces(&self) -> &[Vec3];
    fn inverse_masses(&self) -> &[f64];

    fn apply_velocity_constraints(&mut self, _tolerance: f64) -> Result<()> {
        Ok(())
    }

    /// Projects a pending position update onto the constraint manifold.
    fn apply_position_constraints(&mut self, _deltas: &mut [Vec3], _tolerance: f64) -> Result<()> {
        Ok(())
    }

    fn compute_virtual_sites(&mut self) -> Result<()> {
        Ok(())
    }

    /// Simulation time in ps.
    fn time(&self) -> f64;
    fn set_time(&mut self, time: f64);

    fn step_count(&self) -> u64;
    fn set_step_count(&mut self, step: u64);

    fn capture_state(&self) -> StateSnapshot {
        StateSnapshot {
            time: self.time(),
            step: self.step_count(),
            positions: self.positions().to_vec(),
            velocities: self.velocities().to_vec(),
        }
    }
}
