//! Integrator configuration.
//!
//! Serde-based structs for the Langevin parameters and the two milestoning
//! modes. Each loads from TOML and validates before an integrator accepts
//! it; the setters mirror the classic integrator API so configurations can
//! also be built in code.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{MilestoneError, Result};
use crate::types::{ForceGroup, Milestone, MilestoneSet};

/// Numeric kernel implementation used for the velocity/position updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelBackend {
    /// Serial CPU kernels
    #[default]
    Reference,
    /// Particle-parallel CPU kernels (rayon)
    Parallel,
}

/// Langevin thermostat and integration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LangevinConfig {
    /// Temperature in Kelvin
    pub temperature: f64,
    /// Friction coefficient in 1/ps
    pub friction: f64,
    /// Step size in ps
    pub step_size: f64,
    /// Seed for the Gaussian noise stream
    #[serde(default)]
    pub random_seed: u64,
    /// Relative tolerance handed to the host constraint solver
    #[serde(default = "default_constraint_tolerance")]
    pub constraint_tolerance: f64,
    #[serde(default)]
    pub backend: KernelBackend,
}

fn default_constraint_tolerance() -> f64 {
    1e-5
}

fn default_true() -> bool {
    true
}

impl LangevinConfig {
    pub fn new(temperature: f64, friction: f64, step_size: f64) -> Self {
        Self {
            temperature,
            friction,
            step_size,
            random_seed: 0,
            constraint_tolerance: default_constraint_tolerance(),
            backend: KernelBackend::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.step_size.is_finite() && self.step_size > 0.0) {
            return Err(MilestoneError::config(format!(
                "step_size must be positive, got {}",
                self.step_size
            )));
        }
        if !(self.temperature.is_finite() && self.temperature >= 0.0) {
            return Err(MilestoneError::config(format!(
                "temperature must be non-negative, got {}",
                self.temperature
            )));
        }
        if !(self.friction.is_finite() && self.friction >= 0.0) {
            return Err(MilestoneError::config(format!(
                "friction must be non-negative, got {}",
                self.friction
            )));
        }
        if !(self.constraint_tolerance > 0.0) {
            return Err(MilestoneError::config("constraint_tolerance must be positive"));
        }
        Ok(())
    }
}

impl Default for LangevinConfig {
    fn default() -> Self {
        // 300 K, 1/ps, 2 fs
        Self::new(300.0, 1.0, 0.002)
    }
}

/// MMVT integrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MmvtConfig {
    pub langevin: LangevinConfig,
    #[serde(default)]
    pub milestones: MilestoneSet,
    /// Crossing log, appended to
    pub output_file: PathBuf,
    /// Base name for per-crossing state snapshots
    #[serde(default)]
    pub save_state_file: Option<PathBuf>,
    /// Statistics snapshot, rewritten after every crossing step
    #[serde(default)]
    pub save_statistics_file: Option<PathBuf>,
    /// Initial bounce counter (for resuming a run)
    #[serde(default)]
    pub bounce_counter: u64,
}

impl MmvtConfig {
    pub fn new(langevin: LangevinConfig, output_file: impl Into<PathBuf>) -> Self {
        Self {
            langevin,
            milestones: MilestoneSet::default(),
            output_file: output_file.into(),
            save_state_file: None,
            save_statistics_file: None,
            bounce_counter: 0,
        }
    }

    /// Adds a milestone identified by its force group; returns its index.
    pub fn add_milestone_group(&mut self, group: u8) -> Result<usize> {
        let group = ForceGroup::new(group)?;
        Ok(self.milestones.push(Milestone::from_group(group)))
    }

    pub fn add_milestone(&mut self, milestone: Milestone) -> usize {
        self.milestones.push(milestone)
    }

    pub fn set_save_state_file_name(&mut self, path: impl Into<PathBuf>) {
        self.save_state_file = Some(path.into());
    }

    pub fn set_save_statistics_file_name(&mut self, path: impl Into<PathBuf>) {
        self.save_statistics_file = Some(path.into());
    }

    pub fn set_bounce_counter(&mut self, counter: u64) {
        self.bounce_counter = counter;
    }

    pub fn validate(&self) -> Result<()> {
        self.langevin.validate()?;
        if self.milestones.is_empty() {
            return Err(MilestoneError::config("MMVT integrator needs at least one milestone group"));
        }
        if self.output_file.as_os_str().is_empty() {
            return Err(MilestoneError::config("MMVT output_file must be set"));
        }
        Ok(())
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for MmvtConfig {
    /// Default thermostat, no milestones, log to `bounces.txt`.
    fn default() -> Self {
        Self::new(LangevinConfig::default(), "bounces.txt")
    }
}

/// Elber integrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElberConfig {
    pub langevin: LangevinConfig,
    #[serde(default)]
    pub src_milestones: MilestoneSet,
    #[serde(default)]
    pub dest_milestones: MilestoneSet,
    /// Whether a source crossing ends the segment
    #[serde(default = "default_true")]
    pub end_on_src_milestone: bool,
    pub output_file: PathBuf,
    #[serde(default)]
    pub save_state_file: Option<PathBuf>,
    /// Initial crossing counter (for resuming a run)
    #[serde(default)]
    pub crossing_counter: u64,
}

impl ElberConfig {
    pub fn new(langevin: LangevinConfig, output_file: impl Into<PathBuf>) -> Self {
        Self {
            langevin,
            src_milestones: MilestoneSet::default(),
            dest_milestones: MilestoneSet::default(),
            end_on_src_milestone: true,
            output_file: output_file.into(),
            save_state_file: None,
            crossing_counter: 0,
        }
    }

    pub fn add_src_milestone_group(&mut self, group: u8) -> Result<usize> {
        let group = ForceGroup::new(group)?;
        Ok(self.src_milestones.push(Milestone::from_group(group)))
    }

    pub fn add_dest_milestone_group(&mut self, group: u8) -> Result<usize> {
        let group = ForceGroup::new(group)?;
        Ok(self.dest_milestones.push(Milestone::from_group(group)))
    }

    pub fn set_end_on_src_milestone(&mut self, end: bool) {
        self.end_on_src_milestone = end;
    }

    pub fn set_save_state_file_name(&mut self, path: impl Into<PathBuf>) {
        self.save_state_file = Some(path.into());
    }

    pub fn set_crossing_counter(&mut self, counter: u64) {
        self.crossing_counter = counter;
    }

    pub fn validate(&self) -> Result<()> {
        self.langevin.validate()?;
        if self.src_milestones.is_empty() && self.dest_milestones.is_empty() {
            return Err(MilestoneError::config(
                "Elber integrator needs at least one source or destination milestone group",
            ));
        }
        if self.src_milestones.shares_group_with(&self.dest_milestones) {
            return Err(MilestoneError::config(
                "source and destination milestones must use distinct force groups",
            ));
        }
        if self.output_file.as_os_str().is_empty() {
            return Err(MilestoneError::config("Elber output_file must be set"));
        }
        Ok(())
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for ElberConfig {
    fn default() -> Self {
        Self::new(LangevinConfig::default(), "crossings.txt")
    }
}
