//! Milestoning Langevin integrators.
//!
//! Both integrators follow the same lifecycle:
//!
//! 1. Build from a config and adjust it with the setters.
//! 2. [`bind`](MmvtLangevinIntegrator::bind) a host context. This validates
//!    the config, opens the crossing log and seeds the noise stream.
//! 3. Call `step(n)` as often as needed.
//!
//! Settings that shape the run (milestones, file names, counters, seed,
//! backend) are frozen at bind. Temperature, friction, step size and
//! constraint tolerance may change between `step` calls.
//!
//! # Step order
//!
//! ```text
//! forces → [step 0: start check] → Langevin step → detect → react → time += dt
//! ```

use std::path::Path;

use milestone_core::{
    ElberConfig, LangevinConfig, MilestoneError, MilestoneSet, MmvtConfig, Result,
    SimulationContext,
};

use crate::elber::{ElberMonitor, ElberPhase};
use crate::langevin::{kinetic_energy, LangevinStepper};
use crate::mmvt::{MmvtMonitor, MmvtState};
use crate::statistics::TransitionStatistics;

fn frozen_after_bind(setting: &str) -> MilestoneError {
    MilestoneError::config(format!("{} cannot change after the integrator is bound", setting))
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if !(value > 0.0) || !value.is_finite() {
        return Err(MilestoneError::config(format!("{} must be positive, got {}", name, value)));
    }
    Ok(())
}

fn check_non_negative(name: &str, value: f64) -> Result<()> {
    if !(value >= 0.0) || !value.is_finite() {
        return Err(MilestoneError::config(format!("{} must be non-negative, got {}", name, value)));
    }
    Ok(())
}

/// Setters shared by both integrators, applied to the Langevin block.
macro_rules! langevin_accessors {
    () => {
        pub fn temperature(&self) -> f64 {
            self.config.langevin.temperature
        }

        pub fn set_temperature(&mut self, temperature: f64) -> Result<()> {
            check_non_negative("temperature", temperature)?;
            self.config.langevin.temperature = temperature;
            Ok(())
        }

        pub fn friction(&self) -> f64 {
            self.config.langevin.friction
        }

        pub fn set_friction(&mut self, friction: f64) -> Result<()> {
            check_non_negative("friction", friction)?;
            self.config.langevin.friction = friction;
            Ok(())
        }

        pub fn step_size(&self) -> f64 {
            self.config.langevin.step_size
        }

        pub fn set_step_size(&mut self, step_size: f64) -> Result<()> {
            check_positive("step size", step_size)?;
            self.config.langevin.step_size = step_size;
            Ok(())
        }

        pub fn constraint_tolerance(&self) -> f64 {
            self.config.langevin.constraint_tolerance
        }

        pub fn set_constraint_tolerance(&mut self, tolerance: f64) -> Result<()> {
            check_positive("constraint tolerance", tolerance)?;
            self.config.langevin.constraint_tolerance = tolerance;
            Ok(())
        }

        pub fn random_number_seed(&self) -> u64 {
            self.config.langevin.random_seed
        }

        pub fn set_random_number_seed(&mut self, seed: u64) -> Result<()> {
            if self.session.is_some() {
                return Err(frozen_after_bind("random seed"));
            }
            self.config.langevin.random_seed = seed;
            Ok(())
        }

        pub fn langevin(&self) -> &LangevinConfig {
            &self.config.langevin
        }

        pub fn output_file_name(&self) -> &Path {
            &self.config.output_file
        }

        pub fn save_state_file_name(&self) -> Option<&Path> {
            self.config.save_state_file.as_deref()
        }

        pub fn is_bound(&self) -> bool {
            self.session.is_some()
        }

        pub fn context(&self) -> Result<&C> {
            self.session
                .as_ref()
                .map(|session| &session.context)
                .ok_or(MilestoneError::Unbound)
        }

        pub fn context_mut(&mut self) -> Result<&mut C> {
            self.session
                .as_mut()
                .map(|session| &mut session.context)
                .ok_or(MilestoneError::Unbound)
        }

        /// Detaches and returns the bound context.
        pub fn unbind(&mut self) -> Option<C> {
            self.session.take().map(|session| session.context)
        }

        pub fn into_context(self) -> Option<C> {
            self.session.map(|session| session.context)
        }

        /// Kinetic energy at integer time, with forces evaluated for the
        /// current positions.
        pub fn compute_kinetic_energy(&mut self) -> Result<f64> {
            let step_size = self.config.langevin.step_size;
            let session = self.session.as_mut().ok_or(MilestoneError::Unbound)?;
            session.context.compute_forces()?;
            Ok(kinetic_energy(&session.context, step_size))
        }

        /// Name of the kernel backend in use once bound.
        pub fn backend_name(&self) -> Option<&'static str> {
            self.session.as_ref().map(|session| session.stepper.backend_name())
        }
    };
}

fn advance_clock<C: SimulationContext + ?Sized>(context: &mut C, step_size: f64) {
    let time = context.time();
    context.set_time(time + step_size);
    let step = context.step_count();
    context.set_step_count(step + 1);
}

struct MmvtSession<C> {
    context: C,
    stepper: LangevinStepper,
    monitor: MmvtMonitor,
}

/// Langevin integrator that bounces off the boundaries of one MMVT cell.
pub struct MmvtLangevinIntegrator<C: SimulationContext> {
    config: MmvtConfig,
    pending_statistics: Option<TransitionStatistics>,
    session: Option<MmvtSession<C>>,
}

impl<C: SimulationContext> MmvtLangevinIntegrator<C> {
    pub fn new(config: MmvtConfig) -> Result<Self> {
        config.langevin.validate()?;
        Ok(Self {
            config,
            pending_statistics: None,
            session: None,
        })
    }

    langevin_accessors!();

    pub fn config(&self) -> &MmvtConfig {
        &self.config
    }

    pub fn milestones(&self) -> &MilestoneSet {
        &self.config.milestones
    }

    pub fn add_milestone_group(&mut self, group: u8) -> Result<usize> {
        if self.session.is_some() {
            return Err(frozen_after_bind("milestone set"));
        }
        self.config.add_milestone_group(group)
    }

    pub fn set_save_state_file_name(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if self.session.is_some() {
            return Err(frozen_after_bind("state file name"));
        }
        self.config.set_save_state_file_name(path.as_ref());
        Ok(())
    }

    pub fn save_statistics_file_name(&self) -> Option<&Path> {
        self.config.save_statistics_file.as_deref()
    }

    pub fn set_save_statistics_file_name(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if self.session.is_some() {
            return Err(frozen_after_bind("statistics file name"));
        }
        self.config.set_save_statistics_file_name(path.as_ref());
        Ok(())
    }

    /// Current bounce counter; the configured start value until bound.
    pub fn bounce_counter(&self) -> u64 {
        match &self.session {
            Some(session) => session.monitor.bounce_counter(),
            None => self.config.bounce_counter,
        }
    }

    pub fn set_bounce_counter(&mut self, counter: u64) -> Result<()> {
        if self.session.is_some() {
            return Err(frozen_after_bind("bounce counter"));
        }
        self.config.set_bounce_counter(counter);
        Ok(())
    }

    /// Seeds the transition statistics, e.g. from a previous run.
    pub fn with_statistics(mut self, statistics: TransitionStatistics) -> Result<Self> {
        if self.session.is_some() {
            return Err(frozen_after_bind("statistics"));
        }
        self.pending_statistics = Some(statistics);
        Ok(self)
    }

    pub fn statistics(&self) -> Result<&TransitionStatistics> {
        self.session
            .as_ref()
            .map(|session| session.monitor.statistics())
            .ok_or(MilestoneError::Unbound)
    }

    pub fn reset_statistics(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or(MilestoneError::Unbound)?;
        session.monitor.reset_statistics();
        Ok(())
    }

    pub fn state(&self) -> Result<MmvtState> {
        self.session
            .as_ref()
            .map(|session| session.monitor.state())
            .ok_or(MilestoneError::Unbound)
    }

    /// Time since the last transition between distinct milestones.
    pub fn incubation_time(&self) -> Result<f64> {
        self.session
            .as_ref()
            .map(|session| session.monitor.incubation_time())
            .ok_or(MilestoneError::Unbound)
    }

    pub fn bind(&mut self, context: C) -> Result<()> {
        if self.session.is_some() {
            return Err(MilestoneError::config(
                "integrator is already bound; unbind() the current context first",
            ));
        }
        self.config.validate()?;
        for group in self.config.milestones.groups() {
            if !context.has_force_group(group) {
                log::warn!("No force in group {}; its milestones can never be crossed", group);
            }
        }

        let mut monitor = MmvtMonitor::new(&self.config)?;
        if let Some(statistics) = self.pending_statistics.take() {
            monitor = monitor.with_statistics(statistics)?;
        }
        let stepper = LangevinStepper::new(&self.config.langevin);
        log::info!(
            "MMVT integrator bound: {} particles, {} milestones, {} backend, log {}",
            context.num_particles(),
            self.config.milestones.len(),
            stepper.backend_name(),
            self.config.output_file.display()
        );
        self.session = Some(MmvtSession {
            context,
            stepper,
            monitor,
        });
        Ok(())
    }

    /// Advances the bound context by `steps` steps.
    ///
    /// Fails with [`MilestoneError::TrappedAtStart`] when the first step
    /// starts past a boundary.
    pub fn step(&mut self, steps: u64) -> Result<()> {
        let langevin = &self.config.langevin;
        let session = self.session.as_mut().ok_or(MilestoneError::Unbound)?;
        let MmvtSession {
            context,
            stepper,
            monitor,
        } = session;

        for _ in 0..steps {
            if context.step_count() == 0 {
                monitor.check_start(context)?;
            }
            context.compute_forces()?;
            stepper.integrate(context, langevin)?;

            let crossings = monitor.detect(context)?;
            let recorded = if crossings.is_empty() {
                Ok(())
            } else {
                let recorded = monitor.on_crossings(&*context, &crossings);
                stepper.reverse_last_step(context);
                recorded
            };

            // The step is complete even when persisting the crossing failed
            advance_clock(context, langevin.step_size);
            monitor.advance(langevin.step_size);
            recorded?;
        }
        Ok(())
    }
}

struct ElberSession<C> {
    context: C,
    stepper: LangevinStepper,
    monitor: ElberMonitor,
}

/// Langevin integrator that runs one Elber segment from source to destination.
pub struct ElberLangevinIntegrator<C: SimulationContext> {
    config: ElberConfig,
    session: Option<ElberSession<C>>,
}

impl<C: SimulationContext> ElberLangevinIntegrator<C> {
    pub fn new(config: ElberConfig) -> Result<Self> {
        config.langevin.validate()?;
        Ok(Self {
            config,
            session: None,
        })
    }

    langevin_accessors!();

    pub fn config(&self) -> &ElberConfig {
        &self.config
    }

    pub fn src_milestones(&self) -> &MilestoneSet {
        &self.config.src_milestones
    }

    pub fn dest_milestones(&self) -> &MilestoneSet {
        &self.config.dest_milestones
    }

    pub fn add_src_milestone_group(&mut self, group: u8) -> Result<usize> {
        if self.session.is_some() {
            return Err(frozen_after_bind("source milestones"));
        }
        self.config.add_src_milestone_group(group)
    }

    pub fn add_dest_milestone_group(&mut self, group: u8) -> Result<usize> {
        if self.session.is_some() {
            return Err(frozen_after_bind("destination milestones"));
        }
        self.config.add_dest_milestone_group(group)
    }

    pub fn end_on_src_milestone(&self) -> bool {
        self.config.end_on_src_milestone
    }

    pub fn set_end_on_src_milestone(&mut self, end: bool) -> Result<()> {
        if self.session.is_some() {
            return Err(frozen_after_bind("end-on-source flag"));
        }
        self.config.set_end_on_src_milestone(end);
        Ok(())
    }

    pub fn set_save_state_file_name(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if self.session.is_some() {
            return Err(frozen_after_bind("state file name"));
        }
        self.config.set_save_state_file_name(path.as_ref());
        Ok(())
    }

    pub fn crossing_counter(&self) -> u64 {
        match &self.session {
            Some(session) => session.monitor.crossing_counter(),
            None => self.config.crossing_counter,
        }
    }

    pub fn set_crossing_counter(&mut self, counter: u64) -> Result<()> {
        if self.session.is_some() {
            return Err(frozen_after_bind("crossing counter"));
        }
        self.config.set_crossing_counter(counter);
        Ok(())
    }

    pub fn phase(&self) -> Result<ElberPhase> {
        self.session
            .as_ref()
            .map(|session| session.monitor.phase())
            .ok_or(MilestoneError::Unbound)
    }

    /// Whether the current segment reached a terminating milestone.
    pub fn has_ended(&self) -> bool {
        self.session
            .as_ref()
            .map_or(false, |session| session.monitor.has_ended())
    }

    pub fn bind(&mut self, context: C) -> Result<()> {
        if self.session.is_some() {
            return Err(MilestoneError::config(
                "integrator is already bound; unbind() the current context first",
            ));
        }
        self.config.validate()?;
        let monitor = ElberMonitor::new(&self.config)?;
        monitor.validate_groups(&context)?;
        let stepper = LangevinStepper::new(&self.config.langevin);
        log::info!(
            "Elber integrator bound: {} particles, {} source / {} destination milestones, {} backend",
            context.num_particles(),
            self.config.src_milestones.len(),
            self.config.dest_milestones.len(),
            stepper.backend_name()
        );
        self.session = Some(ElberSession {
            context,
            stepper,
            monitor,
        });
        Ok(())
    }

    /// Advances the bound context by `steps` steps.
    ///
    /// Integration continues after the segment ends; only crossing
    /// detection stops.
    pub fn step(&mut self, steps: u64) -> Result<()> {
        let langevin = &self.config.langevin;
        let session = self.session.as_mut().ok_or(MilestoneError::Unbound)?;
        let ElberSession {
            context,
            stepper,
            monitor,
        } = session;

        for _ in 0..steps {
            context.compute_forces()?;
            stepper.integrate(context, langevin)?;
            monitor.monitor(context)?;
            advance_clock(context, langevin.step_size);
        }
        Ok(())
    }
}
