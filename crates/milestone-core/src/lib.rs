//! # milestone-core
//!
//! Core types, traits, configuration and errors for the milestoning
//! Langevin integrators.
//!
//! - **Types**: force groups, milestones, state snapshots
//! - **Traits**: [`SimulationContext`], the host-engine contract
//! - **Config**: [`LangevinConfig`], [`MmvtConfig`], [`ElberConfig`]
//! - **Errors**: unified error handling with [`MilestoneError`]
//!
//! ## Architecture
//! ```text
//! ┌──────────────────┐
//! │  milestone-core  │  ← types / host contract / config
//! └──────────────────┘
//!          ▲
//! ┌────────┴───────────┐
//! │ milestone-dynamics │  ← kernels, monitors, integrators
//! └────────────────────┘
//!          ▲
//! ┌────────┴───────────┐
//! │  milestone-cli     │  ← milestone-run binary
//! └────────────────────┘
//! ```

pub mod config;
pub mod errors;
pub mod traits;
pub mod types;

pub use config::{ElberConfig, KernelBackend, LangevinConfig, MmvtConfig};
pub use errors::{MilestoneError, Result};
pub use traits::{DynamicsView, SimulationContext};
pub use types::{
    ForceGroup, GroupMask, Milestone, MilestoneSet, StateSnapshot, Vec3, MAX_FORCE_GROUPS,
};
