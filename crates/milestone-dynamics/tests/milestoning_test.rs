//! End-to-end MMVT and Elber runs on the reference host.

mod common;

use std::collections::HashMap;

use common::{argon, caged_argon, group, init_logging, langevin, log_rows};
use milestone_core::{ElberConfig, KernelBackend, MilestoneError, MmvtConfig, SimulationContext};
use milestone_dynamics::reference::{PlanarBoundary, ReferenceContext};
use milestone_dynamics::{ElberLangevinIntegrator, ElberPhase, MmvtLangevinIntegrator, MmvtState};
use tempfile::TempDir;

#[test]
fn test_mmvt_statistics_match_log() -> anyhow::Result<()> {
    init_logging();
    let dir = TempDir::new()?;
    let mut config = MmvtConfig::new(
        langevin(7, KernelBackend::Reference),
        dir.path().join("bounces.txt"),
    );
    config.add_milestone_group(1)?;
    config.add_milestone_group(2)?;
    config.set_save_state_file_name(dir.path().join("state"));
    config.set_save_statistics_file_name(dir.path().join("statistics.txt"));

    let mut integrator = MmvtLangevinIntegrator::new(config)?;
    integrator.bind(caged_argon(0.0, 0.04))?;
    integrator.step(4000)?;

    let rows = log_rows(&dir.path().join("bounces.txt"));
    assert!(rows.len() > 2, "expected several bounces, got {}", rows.len());
    assert_eq!(integrator.bounce_counter(), rows.len() as u64);

    // Replay the log through the transition rules
    let index_of = |id: &str| -> usize { id.parse::<usize>().unwrap() - 1 };
    let mut arrivals = [0u64; 2];
    let mut transitions = [[0u64; 2]; 2];
    let mut last_transition_time = rows[0].2;
    for (counter, window) in rows.windows(2).enumerate() {
        let (from, to) = (index_of(&window[0].0), index_of(&window[1].0));
        arrivals[to] += 1;
        if from != to {
            transitions[from][to] += 1;
            last_transition_time = window[1].2;
        }
        assert_eq!(window[0].1, counter as u64);
    }

    let stats = integrator.statistics()?;
    assert_eq!(stats.n_alpha_beta(), &arrivals);
    for i in 0..2 {
        assert_eq!(stats.nij_alpha()[i], transitions[i]);
        assert_eq!(stats.nij_alpha()[i][i], 0);
    }
    // Log times are rounded to 3 decimals
    let total_incubation: f64 = stats.ri_alpha().iter().sum();
    assert!((total_incubation - (last_transition_time - rows[0].2)).abs() < 2e-3);
    assert!((stats.t_alpha() - (rows[rows.len() - 1].2 - rows[0].2)).abs() < 2e-3);

    // Every bounce here touches one wall, so every bounce saved state
    for (id, counter, _) in &rows {
        assert!(dir.path().join(format!("state_{}_{}", counter, id)).exists());
    }

    let snapshot: HashMap<String, String> = std::fs::read_to_string(dir.path().join("statistics.txt"))?
        .lines()
        .filter_map(|line| line.split_once(": "))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    assert_eq!(snapshot["N_alpha_1"], arrivals[0].to_string());
    assert_eq!(snapshot["N_1_2_alpha"], transitions[0][1].to_string());
    assert_eq!(snapshot["N_2_1_alpha"], transitions[1][0].to_string());

    let last = index_of(&rows[rows.len() - 1].0);
    assert_eq!(integrator.state()?, MmvtState::AtMilestone(last));
    let x = integrator.context()?.positions()[0][0];
    assert!(x.abs() <= 0.04);
    Ok(())
}

#[test]
fn test_mmvt_trapped_at_start() -> anyhow::Result<()> {
    init_logging();
    let dir = TempDir::new()?;
    let mut config = MmvtConfig::new(
        langevin(0, KernelBackend::Reference),
        dir.path().join("bounces.txt"),
    );
    config.add_milestone_group(1)?;
    config.add_milestone_group(2)?;

    let mut integrator = MmvtLangevinIntegrator::new(config)?;
    integrator.bind(caged_argon(0.1, 0.05))?;

    let err = integrator.step(10).unwrap_err();
    assert!(matches!(err, MilestoneError::TrappedAtStart { value } if value > 0.0));
    assert!(err.is_fatal());
    assert!(log_rows(&dir.path().join("bounces.txt")).is_empty());
    assert_eq!(integrator.context()?.step_count(), 0);
    Ok(())
}

#[test]
fn test_mmvt_log_appends_across_runs() -> anyhow::Result<()> {
    init_logging();
    let dir = TempDir::new()?;
    let build = |counter: u64| -> anyhow::Result<MmvtLangevinIntegrator<ReferenceContext>> {
        let mut config = MmvtConfig::new(
            langevin(counter, KernelBackend::Reference),
            dir.path().join("bounces.txt"),
        );
        config.add_milestone_group(1)?;
        config.add_milestone_group(2)?;
        config.set_bounce_counter(counter);
        let mut integrator = MmvtLangevinIntegrator::new(config)?;
        integrator.bind(caged_argon(0.0, 0.03))?;
        Ok(integrator)
    };

    let mut first = build(0)?;
    first.step(2000)?;
    let resume_at = first.bounce_counter();
    let mut second = build(resume_at)?;
    second.step(2000)?;

    let content = std::fs::read_to_string(dir.path().join("bounces.txt"))?;
    assert_eq!(content.lines().filter(|line| line.starts_with('#')).count(), 1);
    let counters: Vec<u64> = log_rows(&dir.path().join("bounces.txt"))
        .into_iter()
        .map(|(_, counter, _)| counter)
        .collect();
    assert_eq!(counters, (0..second.bounce_counter()).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn test_mmvt_transition_counts_bounded_every_step() -> anyhow::Result<()> {
    init_logging();
    let dir = TempDir::new()?;
    let mut config = MmvtConfig::new(
        langevin(11, KernelBackend::Reference),
        dir.path().join("bounces.txt"),
    );
    config.add_milestone_group(1)?;
    config.add_milestone_group(2)?;
    let mut integrator = MmvtLangevinIntegrator::new(config)?;
    integrator.bind(caged_argon(0.0, 0.03))?;

    let mut last_t_alpha = 0.0;
    for _ in 0..3000 {
        integrator.step(1)?;
        let stats = integrator.statistics()?;
        for i in 0..2 {
            assert!(
                stats.departures(i) <= stats.n_alpha_beta()[i] + 1,
                "milestone {} left {} times after {} arrivals",
                i,
                stats.departures(i),
                stats.n_alpha_beta()[i]
            );
        }
        assert!(stats.t_alpha() >= last_t_alpha);
        last_t_alpha = stats.t_alpha();
    }
    assert!(integrator.bounce_counter() >= 2);
    Ok(())
}

#[test]
fn test_mmvt_bounces_even_when_state_write_fails() -> anyhow::Result<()> {
    init_logging();
    let dir = TempDir::new()?;
    let mut config = MmvtConfig::new(
        langevin(5, KernelBackend::Reference),
        dir.path().join("bounces.txt"),
    );
    config.add_milestone_group(1)?;
    config.add_milestone_group(2)?;
    config.set_save_state_file_name(dir.path().join("no_such_dir").join("state"));
    let mut integrator = MmvtLangevinIntegrator::new(config)?;
    integrator.bind(caged_argon(0.0, 0.03))?;

    let mut failures = 0;
    for _ in 0..3000 {
        let bounces = integrator.bounce_counter();
        let steps = integrator.context()?.step_count();
        match integrator.step(1) {
            Ok(()) => assert_eq!(integrator.bounce_counter(), bounces),
            Err(err) => {
                assert!(matches!(err, MilestoneError::IoError(_)), "unexpected error {:?}", err);
                assert_eq!(integrator.bounce_counter(), bounces + 1);
                failures += 1;
            }
        }
        // The step completed and the particle is back inside its cell
        let context = integrator.context()?;
        assert_eq!(context.step_count(), steps + 1);
        assert!(context.positions()[0][0].abs() <= 0.03);
    }
    assert!(failures > 0, "particle never reached a wall");
    assert_eq!(
        log_rows(&dir.path().join("bounces.txt")).len() as u64,
        integrator.bounce_counter()
    );
    Ok(())
}

/// Source plane at x = -0.02 (particle starts on its positive side),
/// destination plane at x = +0.05.
fn elber_context(first_x: f64) -> ReferenceContext {
    let mut context = argon(first_x);
    context.add_force(Box::new(PlanarBoundary::new(group(1), vec![0], [1.0, 0.0, 0.0], -0.02)));
    context.add_force(Box::new(PlanarBoundary::new(group(2), vec![0], [1.0, 0.0, 0.0], 0.05)));
    context
}

fn elber_config(dir: &std::path::Path, end_on_src: bool) -> ElberConfig {
    let mut config = ElberConfig::new(
        langevin(3, KernelBackend::Reference),
        dir.join("crossings.txt"),
    );
    config.add_src_milestone_group(1).unwrap();
    config.add_dest_milestone_group(2).unwrap();
    config.set_end_on_src_milestone(end_on_src);
    config.set_save_state_file_name(dir.join("state"));
    config
}

#[test]
fn test_elber_segment_ends_once() -> anyhow::Result<()> {
    init_logging();
    let dir = TempDir::new()?;
    let mut integrator = ElberLangevinIntegrator::new(elber_config(dir.path(), true))?;
    integrator.bind(elber_context(0.0))?;

    let mut chunks = 0;
    while !integrator.has_ended() {
        integrator.step(100)?;
        chunks += 1;
        assert!(chunks < 1000, "segment never ended");
    }
    assert_eq!(integrator.phase()?, ElberPhase::Ended);
    assert_eq!(integrator.crossing_counter(), 1);

    // Keep integrating: nothing more is logged
    let steps_before = integrator.context()?.step_count();
    integrator.step(500)?;
    assert_eq!(integrator.context()?.step_count(), steps_before + 500);

    let rows = log_rows(&dir.path().join("crossings.txt"));
    assert_eq!(rows.len(), 1);
    let (id, counter, _) = &rows[0];
    assert!(id == "1" || id == "2", "unexpected row id {}", id);
    assert_eq!(*counter, 0);
    assert!(dir.path().join(format!("state_{}", id)).exists());
    Ok(())
}

#[test]
fn test_elber_destination_before_source_is_marked() -> anyhow::Result<()> {
    init_logging();
    let dir = TempDir::new()?;
    let mut integrator = ElberLangevinIntegrator::new(elber_config(dir.path(), false))?;
    // Drifting at 2 nm/ps from x = 0.04, the destination flips on the third step
    let mut context = elber_context(0.04);
    let mut velocities = vec![[0.0; 3]; context.num_particles()];
    velocities[0] = [2.0, 0.0, 0.0];
    context.set_velocities(velocities)?;
    integrator.bind(context)?;

    integrator.step(10)?;
    assert!(integrator.has_ended());

    let rows = log_rows(&dir.path().join("crossings.txt"));
    assert_eq!(rows.len(), 1);
    let (id, counter, time) = &rows[0];
    assert_eq!(id, "2*");
    assert_eq!(*counter, 0);
    // Without a source crossing the clock never restarted
    assert!((time - 0.004).abs() < 1e-9);
    assert!(dir.path().join("state_2").exists());
    Ok(())
}

#[test]
fn test_elber_missing_force_group() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let mut config = elber_config(dir.path(), true);
    config.add_dest_milestone_group(9).unwrap();
    let mut integrator = ElberLangevinIntegrator::new(config).unwrap();

    let err = integrator.bind(elber_context(0.0)).unwrap_err();
    match err {
        MilestoneError::MissingForceGroup { group, role } => {
            assert_eq!(group.index(), 9);
            assert_eq!(role, "destination");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(!integrator.is_bound());
}

#[test]
fn test_unbound_integrators_refuse_to_step() {
    let dir = TempDir::new().unwrap();
    let mut elber = ElberLangevinIntegrator::<ReferenceContext>::new(
        elber_config(dir.path(), true),
    )
    .unwrap();
    assert!(matches!(elber.step(1), Err(MilestoneError::Unbound)));
    assert!(matches!(elber.phase(), Err(MilestoneError::Unbound)));
    assert!(!elber.has_ended());
}
