//! MMVT transition statistics.
//!
//! Accumulates, per milestone cell, the counts and times needed for MMVT
//! rate estimation:
//!
//! - `N_alpha_beta[i]`: crossings of milestone i with a known predecessor
//! - `Nij_alpha[i][j]`: direct transitions i → j
//! - `Ri_alpha[i]`: incubation time spent after touching i before leaving it
//! - `T_alpha`: time since the first crossing of the run

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

use milestone_core::Result;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransitionStatistics {
    n_alpha_beta: Vec<u64>,
    nij_alpha: Vec<Vec<u64>>,
    ri_alpha: Vec<f64>,
    t_alpha: f64,
}

impl TransitionStatistics {
    pub fn new(num_milestones: usize) -> Self {
        Self {
            n_alpha_beta: vec![0; num_milestones],
            nij_alpha: vec![vec![0; num_milestones]; num_milestones],
            ri_alpha: vec![0.0; num_milestones],
            t_alpha: 0.0,
        }
    }

    pub fn num_milestones(&self) -> usize {
        self.n_alpha_beta.len()
    }

    pub fn n_alpha_beta(&self) -> &[u64] {
        &self.n_alpha_beta
    }

    pub fn nij_alpha(&self) -> &[Vec<u64>] {
        &self.nij_alpha
    }

    pub fn ri_alpha(&self) -> &[f64] {
        &self.ri_alpha
    }

    pub fn t_alpha(&self) -> f64 {
        self.t_alpha
    }

    /// Counts a crossing of `milestone` that has a known predecessor.
    pub fn record_arrival(&mut self, milestone: usize) {
        self.n_alpha_beta[milestone] += 1;
    }

    /// Counts a transition and credits the incubation time to its source.
    pub fn record_transition(&mut self, from: usize, to: usize, incubation_time: f64) {
        self.nij_alpha[from][to] += 1;
        self.ri_alpha[from] += incubation_time;
    }

    pub fn set_t_alpha(&mut self, elapsed: f64) {
        self.t_alpha = elapsed;
    }

    /// Total transitions out of milestone `i`.
    pub fn departures(&self, i: usize) -> u64 {
        self.nij_alpha[i].iter().sum()
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.num_milestones());
    }

    /// Text snapshot, one `key: value` line per quantity.
    ///
    /// `ids` labels the milestones in index order.
    pub fn render(&self, ids: &[i32]) -> String {
        let mut out = String::new();
        for (i, n) in self.n_alpha_beta.iter().enumerate() {
            let _ = writeln!(out, "N_alpha_{}: {}", ids[i], n);
        }
        for (i, row) in self.nij_alpha.iter().enumerate() {
            for (j, n) in row.iter().enumerate() {
                let _ = writeln!(out, "N_{}_{}_alpha: {}", ids[i], ids[j], n);
            }
        }
        for (i, r) in self.ri_alpha.iter().enumerate() {
            let _ = writeln!(out, "R_{}_alpha: {:.3}", ids[i], r);
        }
        let _ = writeln!(out, "T_alpha: {:.3}", self.t_alpha);
        out
    }

    /// Overwrites `path` with the current snapshot.
    pub fn write_snapshot(&self, path: &Path, ids: &[i32]) -> Result<()> {
        std::fs::write(path, self.render(ids))?;
        Ok(())
    }
}
