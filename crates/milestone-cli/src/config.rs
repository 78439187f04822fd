//! Run-file configuration for `milestone-run`.
//!
//! One TOML file describes the milestoning mode, the Langevin parameters,
//! output paths and the argon box to simulate.
//!
//! ```toml
//! mode = "mmvt"
//! steps = 10000
//! report_interval = 1000
//!
//! [langevin]
//! temperature = 300.0
//! friction = 1.0
//! step_size = 0.002
//!
//! [output]
//! crossing_log = "bounces.txt"
//!
//! [milestones]
//! groups = [1, 2]
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use milestone_core::{ElberConfig, LangevinConfig, MmvtConfig, Vec3};

/// Root configuration of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub mode: RunMode,

    #[serde(default = "default_steps")]
    pub steps: u64,

    /// Steps between progress reports and trajectory frames
    #[serde(default = "default_report_interval")]
    pub report_interval: u64,

    #[serde(default)]
    pub langevin: LangevinConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub milestones: MilestoneConfig,

    #[serde(default)]
    pub system: ArgonBoxConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Mmvt,
    Elber,
}

fn default_steps() -> u64 {
    10_000
}

fn default_report_interval() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

impl RunConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read run file {}", path.display()))?;
        Self::from_str(&content)
    }

    /// Parse configuration from TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.langevin.validate()?;
        if self.report_interval == 0 {
            bail!("report_interval must be at least 1");
        }
        self.system.validate()?;
        match self.mode {
            RunMode::Mmvt => self.mmvt_config()?.validate()?,
            RunMode::Elber => self.elber_config()?.validate()?,
        }
        Ok(())
    }

    pub fn mmvt_config(&self) -> Result<MmvtConfig> {
        let mut config = MmvtConfig::new(self.langevin.clone(), &self.output.crossing_log);
        for &group in &self.milestones.groups {
            config.add_milestone_group(group)?;
        }
        if let Some(path) = &self.output.save_state_file {
            config.set_save_state_file_name(path);
        }
        if let Some(path) = &self.output.save_statistics_file {
            config.set_save_statistics_file_name(path);
        }
        config.set_bounce_counter(self.output.counter);
        Ok(config)
    }

    pub fn elber_config(&self) -> Result<ElberConfig> {
        let mut config = ElberConfig::new(self.langevin.clone(), &self.output.crossing_log);
        for &group in &self.milestones.src_groups {
            config.add_src_milestone_group(group)?;
        }
        for &group in &self.milestones.dest_groups {
            config.add_dest_milestone_group(group)?;
        }
        config.set_end_on_src_milestone(self.milestones.end_on_src_milestone);
        if let Some(path) = &self.output.save_state_file {
            config.set_save_state_file_name(path);
        }
        config.set_crossing_counter(self.output.counter);
        Ok(config)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Mmvt,
            steps: default_steps(),
            report_interval: default_report_interval(),
            langevin: LangevinConfig::default(),
            output: OutputConfig::default(),
            milestones: MilestoneConfig::default(),
            system: ArgonBoxConfig::default(),
        }
    }
}

// =============================================================================
// Output Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_crossing_log")]
    pub crossing_log: PathBuf,

    #[serde(default)]
    pub save_state_file: Option<PathBuf>,

    /// MMVT only
    #[serde(default)]
    pub save_statistics_file: Option<PathBuf>,

    /// Starting bounce (MMVT) or crossing (Elber) counter
    #[serde(default)]
    pub counter: u64,

    /// Multi-model PDB of the particle positions, one frame per report
    #[serde(default)]
    pub trajectory: Option<PathBuf>,
}

fn default_crossing_log() -> PathBuf {
    PathBuf::from("crossings.txt")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            crossing_log: default_crossing_log(),
            save_state_file: None,
            save_statistics_file: None,
            counter: 0,
            trajectory: None,
        }
    }
}

// =============================================================================
// Milestone Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneConfig {
    /// MMVT milestone groups
    #[serde(default)]
    pub groups: Vec<u8>,

    /// Elber source milestone groups
    #[serde(default)]
    pub src_groups: Vec<u8>,

    /// Elber destination milestone groups
    #[serde(default)]
    pub dest_groups: Vec<u8>,

    #[serde(default = "default_true")]
    pub end_on_src_milestone: bool,
}

impl Default for MilestoneConfig {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            src_groups: Vec::new(),
            dest_groups: Vec::new(),
            end_on_src_milestone: true,
        }
    }
}

// =============================================================================
// System Configuration
// =============================================================================

/// Lennard-Jones argon in a cubic periodic box. Units: nm, amu, kJ/mol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgonBoxConfig {
    #[serde(default = "default_particles")]
    pub particles: usize,

    #[serde(default = "default_mass")]
    pub mass: f64,

    #[serde(default = "default_sigma")]
    pub sigma: f64,

    #[serde(default = "default_epsilon")]
    pub epsilon: f64,

    #[serde(default = "default_box_edge")]
    pub box_edge: f64,

    /// Seed for initial positions and velocities
    #[serde(default)]
    pub seed: u64,

    /// Starting position of the tracked particle 0
    #[serde(default = "default_start")]
    pub start: Vec3,

    /// Planes monitored for particle 0, each in its own force group
    #[serde(default)]
    pub boundaries: Vec<BoundaryConfig>,
}

/// Crossed when `normal · x₀ > offset`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundaryConfig {
    pub group: u8,
    pub normal: Vec3,
    pub offset: f64,
}

fn default_particles() -> usize {
    10
}

fn default_mass() -> f64 {
    39.9
}

fn default_sigma() -> f64 {
    0.34
}

fn default_epsilon() -> f64 {
    // 0.238 kcal/mol
    0.996
}

fn default_box_edge() -> f64 {
    2.5
}

fn default_start() -> Vec3 {
    [1.2, 1.2, 1.2]
}

impl ArgonBoxConfig {
    pub fn validate(&self) -> Result<()> {
        if self.particles == 0 {
            bail!("system needs at least one particle");
        }
        if !(self.mass > 0.0) {
            bail!("particle mass must be positive, got {}", self.mass);
        }
        if !(self.sigma > 0.0 && self.epsilon >= 0.0) {
            bail!("invalid Lennard-Jones parameters sigma={} epsilon={}", self.sigma, self.epsilon);
        }
        if !(self.box_edge > 2.0 * self.cutoff()) {
            bail!(
                "box edge {} nm must exceed twice the cutoff ({} nm)",
                self.box_edge,
                self.cutoff()
            );
        }
        let mut seen = std::collections::HashSet::new();
        for boundary in &self.boundaries {
            if boundary.group == 0 {
                bail!("force group 0 is reserved for the Lennard-Jones force");
            }
            if !seen.insert(boundary.group) {
                bail!("force group {} assigned to more than one boundary", boundary.group);
            }
        }
        Ok(())
    }

    /// 2.5 σ
    pub fn cutoff(&self) -> f64 {
        2.5 * self.sigma
    }
}

impl Default for ArgonBoxConfig {
    fn default() -> Self {
        // Particle 0 caged in a 1.6 nm cube: x, y, z between 0.4 and 2.0 nm
        let mut boundaries = Vec::new();
        for axis in 0..3u8 {
            let mut normal = [0.0; 3];
            normal[axis as usize] = 1.0;
            boundaries.push(BoundaryConfig {
                group: 2 * axis + 1,
                normal,
                offset: 2.0,
            });
            boundaries.push(BoundaryConfig {
                group: 2 * axis + 2,
                normal: normal.map(|n| -n),
                offset: -0.4,
            });
        }
        Self {
            particles: default_particles(),
            mass: default_mass(),
            sigma: default_sigma(),
            epsilon: default_epsilon(),
            box_edge: default_box_edge(),
            seed: 0,
            start: default_start(),
            boundaries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid_for_six_walls() {
        let mut config = RunConfig::default();
        config.milestones.groups = (1..=6).collect();
        config.validate().unwrap();
        assert_eq!(config.system.boundaries.len(), 6);
        assert_eq!(config.mmvt_config().unwrap().milestones.len(), 6);
    }

    #[test]
    fn test_parse_elber_run() {
        let toml = r#"
            mode = "elber"
            steps = 500

            [langevin]
            temperature = 310.0
            friction = 2.0
            step_size = 0.001
            random_seed = 9
            backend = "parallel"

            [output]
            crossing_log = "elber.txt"
            save_state_file = "state"
            counter = 4

            [milestones]
            src_groups = [1]
            dest_groups = [2]
            end_on_src_milestone = false

            [system]
            particles = 4
            boundaries = [
                { group = 1, normal = [1.0, 0.0, 0.0], offset = 1.0 },
                { group = 2, normal = [1.0, 0.0, 0.0], offset = 1.5 },
            ]
        "#;
        let config = RunConfig::from_str(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.mode, RunMode::Elber);
        assert_eq!(config.report_interval, 1000);

        let elber = config.elber_config().unwrap();
        assert!(!elber.end_on_src_milestone);
        assert_eq!(elber.crossing_counter, 4);
        assert_eq!(elber.langevin.random_seed, 9);
        assert_eq!(elber.save_state_file, Some(PathBuf::from("state")));
    }

    #[test]
    fn test_rejects_shared_boundary_group() {
        let mut config = RunConfig::default();
        config.milestones.groups = vec![1];
        config.system.boundaries[1].group = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_mmvt_set() {
        assert!(RunConfig::default().validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "steps = 42\n[milestones]\ngroups = [1, 2]\n").unwrap();
        let config = RunConfig::from_file(&path).unwrap();
        assert_eq!(config.steps, 42);
        assert!(RunConfig::from_file(dir.path().join("missing.toml")).is_err());
    }
}
