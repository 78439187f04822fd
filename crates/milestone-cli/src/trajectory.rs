//! Multi-model PDB trajectory of the argon box.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use milestone_core::Vec3;

/// Appends one MODEL block per frame. Coordinates are written in Å.
pub struct PdbTrajectory {
    path: PathBuf,
    frames: usize,
}

impl PdbTrajectory {
    /// Starts a fresh trajectory file, replacing any previous one.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut file = File::create(&path)
            .with_context(|| format!("Failed to create trajectory {}", path.display()))?;
        writeln!(file, "REMARK   Milestoning argon box trajectory")?;
        Ok(Self { path, frames: 0 })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn write_frame(&mut self, time_ps: f64, positions: &[Vec3]) -> Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut out = BufWriter::new(file);
        self.frames += 1;

        writeln!(out, "MODEL     {:>4}", self.frames)?;
        writeln!(out, "REMARK   Time: {:.3}ps", time_ps)?;
        for (i, p) in positions.iter().enumerate() {
            writeln!(
                out,
                "ATOM  {:>5}  AR   AR     1    {:>8.3}{:>8.3}{:>8.3}  1.00  0.00          AR",
                (i + 1) % 100000,
                p[0] * 10.0,
                p[1] * 10.0,
                p[2] * 10.0
            )?;
        }
        writeln!(out, "ENDMDL")?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let mut trajectory = PdbTrajectory::create(dir.path().join("traj.pdb")).unwrap();
        trajectory.write_frame(0.0, &[[0.1, 0.2, 0.3], [1.0, 1.0, 1.0]]).unwrap();
        trajectory.write_frame(0.002, &[[0.1, 0.2, 0.3], [1.0, 1.0, 1.0]]).unwrap();

        let content = std::fs::read_to_string(trajectory.path()).unwrap();
        assert_eq!(trajectory.frames(), 2);
        assert_eq!(content.matches("ENDMDL").count(), 2);
        assert!(content.contains("MODEL        2"));
        let atom = content.lines().find(|line| line.starts_with("ATOM")).unwrap();
        assert!(atom.contains("   1.000   2.000   3.000"));
    }
}
