//! Elber crossing monitor.
//!
//! An Elber segment starts on or near a source milestone and runs until it
//! reaches a destination (or, with `end_on_src_milestone`, returns to the
//! source). A milestone counts as crossed when its group's indicator value
//! differs from the value remembered for it, at a nonzero simulation time.
//!
//! ```text
//! Running ──src crossed, end_on_src──────▶ Ended
//! Running ──src crossed──▶ Committed        host time reset to 0
//! Running | Committed ──dest crossed──▶ Ended
//! ```
//!
//! A destination reached from `Running` without `end_on_src_milestone` is
//! logged with a trailing `*`: the segment never left the source and its
//! statistics are invalid.

use milestone_core::{ElberConfig, MilestoneError, MilestoneSet, Result, SimulationContext};

use crate::boundary::IndicatorHistory;
use crate::output::{CrossingLog, CrossingRecord, LogFormat, StateWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElberPhase {
    #[default]
    Running,
    /// Source milestone crossed; the segment clock restarted.
    Committed,
    /// Terminal.
    Ended,
}

pub struct ElberMonitor {
    src_milestones: MilestoneSet,
    dest_milestones: MilestoneSet,
    src_history: IndicatorHistory,
    dest_history: IndicatorHistory,
    end_on_src_milestone: bool,
    phase: ElberPhase,
    crossing_counter: u64,
    log: CrossingLog,
    state_writer: Option<StateWriter>,
}

impl ElberMonitor {
    pub fn new(config: &ElberConfig) -> Result<Self> {
        Ok(Self {
            src_history: IndicatorHistory::new(config.src_milestones.len()),
            dest_history: IndicatorHistory::new(config.dest_milestones.len()),
            src_milestones: config.src_milestones.clone(),
            dest_milestones: config.dest_milestones.clone(),
            end_on_src_milestone: config.end_on_src_milestone,
            phase: ElberPhase::Running,
            crossing_counter: config.crossing_counter,
            log: CrossingLog::open(&config.output_file, LogFormat::Elber)?,
            state_writer: config.save_state_file.clone().map(StateWriter::new),
        })
    }

    /// Every source and destination group must carry a force in the host.
    pub fn validate_groups<C: SimulationContext + ?Sized>(&self, context: &C) -> Result<()> {
        let roles = [("source", &self.src_milestones), ("destination", &self.dest_milestones)];
        for (role, milestones) in roles {
            for milestone in milestones {
                if !context.has_force_group(milestone.group) {
                    return Err(MilestoneError::MissingForceGroup {
                        group: milestone.group,
                        role,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn phase(&self) -> ElberPhase {
        self.phase
    }

    pub fn has_ended(&self) -> bool {
        self.phase == ElberPhase::Ended
    }

    pub fn crossing_counter(&self) -> u64 {
        self.crossing_counter
    }

    pub fn src_milestones(&self) -> &MilestoneSet {
        &self.src_milestones
    }

    pub fn dest_milestones(&self) -> &MilestoneSet {
        &self.dest_milestones
    }

    pub fn end_on_src_milestone(&self) -> bool {
        self.end_on_src_milestone
    }

    pub fn log(&self) -> &CrossingLog {
        &self.log
    }

    /// Checks all milestones after a completed step, before time advances.
    ///
    /// May reset the host time to zero when the source is crossed.
    pub fn monitor<C: SimulationContext + ?Sized>(&mut self, context: &mut C) -> Result<()> {
        if self.has_ended() {
            return Ok(());
        }
        let mut records = Vec::new();
        let mut end_id = None;

        for (index, milestone) in self.src_milestones.iter().enumerate() {
            let value = context.evaluate_boundary_indicator(milestone.group.mask())?;
            if !self.src_history.observe(index, value, context.time()) {
                continue;
            }
            if self.end_on_src_milestone {
                self.phase = ElberPhase::Ended;
                records.push(CrossingRecord::new(milestone.id, self.crossing_counter, context.time()));
                end_id = Some(milestone.id);
            } else {
                log::debug!(
                    "Source milestone {} crossed at t={:.3} ps, segment clock restarted",
                    milestone.id,
                    context.time()
                );
                context.set_time(0.0);
                self.src_history.remember(index, value);
                self.phase = ElberPhase::Committed;
            }
        }

        for (index, milestone) in self.dest_milestones.iter().enumerate() {
            let value = context.evaluate_boundary_indicator(milestone.group.mask())?;
            if !self.dest_history.observe(index, value, context.time()) {
                continue;
            }
            let mut record = CrossingRecord::new(milestone.id, self.crossing_counter, context.time());
            if self.phase != ElberPhase::Committed && !self.end_on_src_milestone {
                record = record.uncommitted();
            }
            self.phase = ElberPhase::Ended;
            records.push(record);
            end_id = Some(milestone.id);
        }

        self.log.append_all(&records)?;

        if let Some(id) = end_id {
            if records.len() == 1 {
                if let Some(writer) = &self.state_writer {
                    let path = writer.write(&[id.to_string()], &context.capture_state())?;
                    log::debug!("Saved state to {}", path.display());
                }
            }
            log::info!(
                "Elber segment {} ended at milestone {} (t={:.3} ps)",
                self.crossing_counter,
                id,
                context.time()
            );
            self.crossing_counter += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{PlanarBoundary, ReferenceContext};
    use milestone_core::{ForceGroup, LangevinConfig};

    /// Boundaries on particle 0's x coordinate: source at 1.0, destination at 2.0.
    fn system() -> ReferenceContext {
        let mut context = ReferenceContext::new(vec![1.0], vec![[0.5, 0.0, 0.0]]).unwrap();
        context.add_force(Box::new(PlanarBoundary::new(
            ForceGroup::new(1).unwrap(),
            vec![0],
            [1.0, 0.0, 0.0],
            1.0,
        )));
        context.add_force(Box::new(PlanarBoundary::new(
            ForceGroup::new(2).unwrap(),
            vec![0],
            [1.0, 0.0, 0.0],
            2.0,
        )));
        context
    }

    fn config(dir: &std::path::Path, end_on_src: bool) -> ElberConfig {
        let mut config = ElberConfig::new(LangevinConfig::default(), dir.join("crossings.txt"));
        config.add_src_milestone_group(1).unwrap();
        config.add_dest_milestone_group(2).unwrap();
        config.set_end_on_src_milestone(end_on_src);
        config
    }

    fn move_to(context: &mut ReferenceContext, x: f64, time: f64) {
        context.dynamics().positions[0][0] = x;
        context.set_time(time);
    }

    fn rows(dir: &std::path::Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("crossings.txt"))
            .unwrap()
            .lines()
            .filter(|line| !line.starts_with('#'))
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_source_restart_hides_same_step_destination() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = ElberMonitor::new(&config(dir.path(), false)).unwrap();
        let mut context = system();

        move_to(&mut context, 0.5, 0.0);
        monitor.monitor(&mut context).unwrap();
        // Jumps over both planes: the source commit zeroes the clock first
        move_to(&mut context, 2.5, 0.004);
        monitor.monitor(&mut context).unwrap();
        assert_eq!(monitor.phase(), ElberPhase::Committed);
        assert!(rows(dir.path()).is_empty());

        move_to(&mut context, 2.5, 0.006);
        monitor.monitor(&mut context).unwrap();
        assert_eq!(monitor.phase(), ElberPhase::Ended);
        assert_eq!(rows(dir.path()), vec!["2,0,0.006"]);
    }

    #[test]
    fn test_destination_before_source_gets_asterisk() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), false);
        config.set_save_state_file_name(dir.path().join("state"));
        let mut monitor = ElberMonitor::new(&config).unwrap();
        // Start between the planes so only the destination flips
        let mut context = system();
        move_to(&mut context, 1.5, 0.0);
        monitor.monitor(&mut context).unwrap();
        move_to(&mut context, 2.5, 0.002);
        monitor.monitor(&mut context).unwrap();

        assert_eq!(monitor.phase(), ElberPhase::Ended);
        assert_eq!(rows(dir.path()), vec!["2*,0,0.002"]);
        assert_eq!(monitor.crossing_counter(), 1);
        assert!(dir.path().join("state_2").exists());

        // Absorbing: nothing more is evaluated or logged
        move_to(&mut context, 0.5, 0.004);
        monitor.monitor(&mut context).unwrap();
        assert_eq!(rows(dir.path()).len(), 1);
        assert_eq!(monitor.crossing_counter(), 1);
    }

    #[test]
    fn test_end_on_source_has_no_asterisk() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = ElberMonitor::new(&config(dir.path(), true)).unwrap();
        let mut context = system();

        move_to(&mut context, 1.5, 0.0);
        monitor.monitor(&mut context).unwrap();
        move_to(&mut context, 2.5, 0.002);
        monitor.monitor(&mut context).unwrap();
        assert_eq!(rows(dir.path()), vec!["2,0,0.002"]);

        let dir = tempfile::tempdir().unwrap();
        let mut monitor = ElberMonitor::new(&config(dir.path(), true)).unwrap();
        move_to(&mut context, 1.5, 0.0);
        monitor.monitor(&mut context).unwrap();
        move_to(&mut context, 0.5, 0.006);
        monitor.monitor(&mut context).unwrap();
        assert_eq!(monitor.phase(), ElberPhase::Ended);
        assert_eq!(rows(dir.path()), vec!["1,0,0.006"]);
    }

    #[test]
    fn test_source_crossing_commits_and_restarts_clock() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = ElberMonitor::new(&config(dir.path(), false)).unwrap();
        let mut context = system();

        move_to(&mut context, 1.5, 0.0);
        monitor.monitor(&mut context).unwrap();
        move_to(&mut context, 0.5, 0.01);
        monitor.monitor(&mut context).unwrap();
        assert_eq!(monitor.phase(), ElberPhase::Committed);
        assert_eq!(context.time(), 0.0);

        // Back over the source then on to the destination
        move_to(&mut context, 1.5, 0.02);
        monitor.monitor(&mut context).unwrap();
        assert_eq!(monitor.phase(), ElberPhase::Committed);
        move_to(&mut context, 2.5, 0.03);
        monitor.monitor(&mut context).unwrap();
        assert_eq!(monitor.phase(), ElberPhase::Ended);
        assert_eq!(rows(dir.path()), vec!["2,0,0.030"]);
    }

    #[test]
    fn test_missing_group_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), true);
        config.add_dest_milestone_group(7).unwrap();
        let monitor = ElberMonitor::new(&config).unwrap();

        let err = monitor.validate_groups(&system()).unwrap_err();
        assert!(matches!(
            err,
            MilestoneError::MissingForceGroup { role: "destination", .. }
        ));
    }
}
