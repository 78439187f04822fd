//! # milestone-dynamics
//!
//! MMVT and Elber milestoning on top of a Langevin "middle" integrator.
//!
//! ## Modules
//!
//! - [`langevin`]: integration kernels (reference and rayon backends)
//! - [`boundary`]: indicator decoding and crossing detection
//! - [`mmvt`] / [`elber`]: crossing monitors and their state machines
//! - [`statistics`]: MMVT transition counts and incubation times
//! - [`output`]: crossing log and state snapshots
//! - [`integrator`]: the driving facades
//! - [`reference`]: in-memory CPU host engine
//!
//! ## Example
//!
//! ```no_run
//! use milestone_core::{ForceGroup, LangevinConfig, MmvtConfig};
//! use milestone_dynamics::reference::{PlanarBoundary, ReferenceContext};
//! use milestone_dynamics::MmvtLangevinIntegrator;
//!
//! # fn main() -> milestone_core::Result<()> {
//! let mut context = ReferenceContext::new(vec![39.948], vec![[0.0; 3]])?;
//! context.add_force(Box::new(PlanarBoundary::new(
//!     ForceGroup::new(1)?,
//!     vec![0],
//!     [1.0, 0.0, 0.0],
//!     0.5,
//! )));
//!
//! let mut config = MmvtConfig::new(LangevinConfig::new(300.0, 1.0, 0.002), "bounces.txt");
//! config.add_milestone_group(1)?;
//!
//! let mut integrator = MmvtLangevinIntegrator::new(config)?;
//! integrator.bind(context)?;
//! integrator.step(1000)?;
//! # Ok(())
//! # }
//! ```

pub mod boundary;
pub mod elber;
pub mod integrator;
pub mod langevin;
pub mod mmvt;
pub mod output;
pub mod reference;
pub mod statistics;

pub use boundary::{BoundaryEncoding, CrossingDetector, CrossingSet};
pub use elber::{ElberMonitor, ElberPhase};
pub use integrator::{ElberLangevinIntegrator, MmvtLangevinIntegrator};
pub use langevin::{
    kernels_for, kinetic_energy, LangevinKernels, LangevinStepper, ParallelKernels,
    ReferenceKernels, BOLTZ,
};
pub use mmvt::{MmvtMonitor, MmvtState};
pub use output::{CrossingLog, CrossingRecord, LogFormat, StateWriter};
pub use reference::{ForceTerm, ReferenceContext};
pub use statistics::TransitionStatistics;
