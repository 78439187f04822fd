//! MMVT crossing monitor.
//!
//! Tracks the last milestone touched by the trajectory and turns every
//! detected crossing into a log record and a transition-statistics update.
//! The integrator bounces the trajectory after [`MmvtMonitor::on_crossings`]
//! returns, so the run stays inside its milestone cell indefinitely.
//!
//! # State machine
//!
//! ```text
//! NoPriorCrossing ──cross i──▶ AtMilestone(i)   anchor first-crossing time
//! AtMilestone(j)  ──cross i──▶ AtMilestone(i)   Nij[j][i] += 1, Ri[j] += incubation
//! AtMilestone(i)  ──cross i──▶ AtMilestone(i)   tables unchanged
//! ```
//!
//! A corner crossing (several milestones in one step) is processed as a
//! chain in ascending milestone order.

use std::path::PathBuf;

use milestone_core::{MilestoneError, MilestoneSet, MmvtConfig, Result, SimulationContext};

use crate::boundary::{CrossingDetector, CrossingSet};
use crate::output::{CrossingLog, CrossingRecord, LogFormat, StateWriter};
use crate::statistics::TransitionStatistics;

/// Last milestone touched by the trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MmvtState {
    #[default]
    NoPriorCrossing,
    AtMilestone(usize),
}

pub struct MmvtMonitor {
    milestones: MilestoneSet,
    ids: Vec<i32>,
    detector: CrossingDetector,
    statistics: TransitionStatistics,
    state: MmvtState,
    first_crossing_time: f64,
    incubation_time: f64,
    bounce_counter: u64,
    log: CrossingLog,
    state_writer: Option<StateWriter>,
    statistics_file: Option<PathBuf>,
}

impl MmvtMonitor {
    /// Creates the monitor and its crossing log (header on first use).
    pub fn new(config: &MmvtConfig) -> Result<Self> {
        let milestones = config.milestones.clone();
        Ok(Self {
            ids: milestones.ids(),
            detector: CrossingDetector::new(&milestones),
            statistics: TransitionStatistics::new(milestones.len()),
            state: MmvtState::NoPriorCrossing,
            first_crossing_time: 0.0,
            incubation_time: 0.0,
            bounce_counter: config.bounce_counter,
            log: CrossingLog::open(&config.output_file, LogFormat::Mmvt)?,
            state_writer: config.save_state_file.clone().map(StateWriter::new),
            statistics_file: config.save_statistics_file.clone(),
            milestones,
        })
    }

    /// Replaces the statistics aggregate, e.g. to resume a run.
    pub fn with_statistics(mut self, statistics: TransitionStatistics) -> Result<Self> {
        if statistics.num_milestones() != self.milestones.len() {
            return Err(MilestoneError::config(format!(
                "statistics cover {} milestones, integrator has {}",
                statistics.num_milestones(),
                self.milestones.len()
            )));
        }
        self.statistics = statistics;
        Ok(self)
    }

    pub fn milestones(&self) -> &MilestoneSet {
        &self.milestones
    }

    pub fn statistics(&self) -> &TransitionStatistics {
        &self.statistics
    }

    pub fn reset_statistics(&mut self) {
        self.statistics.reset();
    }

    pub fn state(&self) -> MmvtState {
        self.state
    }

    pub fn bounce_counter(&self) -> u64 {
        self.bounce_counter
    }

    pub fn incubation_time(&self) -> f64 {
        self.incubation_time
    }

    pub fn first_crossing_time(&self) -> f64 {
        self.first_crossing_time
    }

    pub fn log(&self) -> &CrossingLog {
        &self.log
    }

    /// Fails if the starting configuration already sits past a boundary.
    pub fn check_start<C: SimulationContext + ?Sized>(&self, context: &mut C) -> Result<()> {
        match self.detector.first_positive_indicator(context)? {
            Some(value) => Err(MilestoneError::TrappedAtStart { value }),
            None => Ok(()),
        }
    }

    pub fn detect<C: SimulationContext + ?Sized>(&self, context: &mut C) -> Result<CrossingSet> {
        self.detector.detect(context)
    }

    /// Logs and accounts every milestone in `crossings`, in ascending order.
    ///
    /// The state machine and counters are updated before anything is
    /// written, so an I/O error leaves the statistics consistent with the
    /// crossings seen. Velocities are not touched here; the caller performs
    /// the bounce whatever this returns.
    pub fn on_crossings<C: SimulationContext + ?Sized>(
        &mut self,
        context: &C,
        crossings: &CrossingSet,
    ) -> Result<()> {
        if crossings.is_empty() {
            return Ok(());
        }
        if let Some(index) = crossings.iter().find(|&i| i >= self.ids.len()) {
            return Err(MilestoneError::config(format!(
                "crossing index {} out of range for {} milestones",
                index,
                self.ids.len()
            )));
        }
        let time = context.time();
        if crossings.is_corner() {
            log::info!(
                "Corner crossing at t={:.3} ps touching milestones {:?}",
                time,
                crossings.iter().map(|i| self.ids[i]).collect::<Vec<_>>()
            );
        }

        let mut records = Vec::with_capacity(crossings.len());
        for i in crossings.iter() {
            let id = self.ids[i];
            records.push(CrossingRecord::new(id, self.bounce_counter, time));
            self.record_crossing(i, time);
            log::debug!("Bounce {} off milestone {} at t={:.3} ps", self.bounce_counter, id, time);
            self.bounce_counter += 1;
        }
        self.log.append_all(&records)?;

        // Corner crossings never save state
        if let (Some(writer), [record]) = (&self.state_writer, records.as_slice()) {
            let path = writer.write(
                &[record.counter.to_string(), record.milestone_id.to_string()],
                &context.capture_state(),
            )?;
            log::debug!("Saved state at bounce {} to {}", record.counter, path.display());
        }

        if let Some(path) = &self.statistics_file {
            self.statistics.write_snapshot(path, &self.ids)?;
        }
        Ok(())
    }

    /// State-machine transition for one crossed milestone.
    fn record_crossing(&mut self, i: usize, time: f64) {
        match self.state {
            MmvtState::NoPriorCrossing => {
                self.first_crossing_time = time;
                self.incubation_time = 0.0;
            }
            MmvtState::AtMilestone(j) => {
                self.statistics.record_arrival(i);
                if j != i {
                    self.statistics.record_transition(j, i, self.incubation_time);
                    self.incubation_time = 0.0;
                }
            }
        }
        self.statistics.set_t_alpha(time - self.first_crossing_time);
        self.state = MmvtState::AtMilestone(i);
    }

    /// Accumulates incubation time after a completed step.
    pub fn advance(&mut self, step_size: f64) {
        self.incubation_time += step_size;
    }
}
