//! Crossing log and state snapshot persistence.
//!
//! The crossing log is append-only text, one record per line:
//! `<milestone id>[*],<counter>,<time ps>`. Output is synchronous and
//! unbuffered across steps; a crash can leave a partial last line.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use milestone_core::{Result, StateSnapshot};

/// Header flavour of a crossing log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Mmvt,
    Elber,
}

impl LogFormat {
    pub fn header(self) -> &'static str {
        match self {
            LogFormat::Mmvt => "#\"Bounced boundary ID\",\"bounce index\",\"total time (ps)\"\n",
            LogFormat::Elber => concat!(
                "#\"Crossed boundary ID\",\"crossing counter\",\"total time (ps)\"\n",
                "# An asterisk(*) indicates that source milestone was never crossed - ",
                "asterisked statistics are invalid and should be excluded.\n"
            ),
        }
    }
}

/// One crossing event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossingRecord {
    pub milestone_id: i32,
    pub counter: u64,
    /// Simulation time in ps
    pub time: f64,
    /// Elber destination reached before the source was ever crossed
    pub uncommitted: bool,
}

impl CrossingRecord {
    pub fn new(milestone_id: i32, counter: u64, time: f64) -> Self {
        Self {
            milestone_id,
            counter,
            time,
            uncommitted: false,
        }
    }

    pub fn uncommitted(mut self) -> Self {
        self.uncommitted = true;
        self
    }
}

impl fmt::Display for CrossingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.uncommitted { "*" } else { "" };
        write!(f, "{}{},{},{:.3}", self.milestone_id, marker, self.counter, self.time)
    }
}

/// Append-only crossing log.
#[derive(Debug, Clone)]
pub struct CrossingLog {
    path: PathBuf,
}

impl CrossingLog {
    /// Opens the log, writing the header only when the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>, format: LogFormat) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            file.write_all(format.header().as_bytes())?;
            log::debug!("Created crossing log {}", path.display());
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &CrossingRecord) -> Result<()> {
        self.append_all(std::slice::from_ref(record))
    }

    pub fn append_all(&self, records: &[CrossingRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut lines = String::new();
        for record in records {
            lines.push_str(&record.to_string());
            lines.push('\n');
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(lines.as_bytes())?;
        Ok(())
    }
}

/// Writes full-state snapshots next to a base file name.
#[derive(Debug, Clone)]
pub struct StateWriter {
    base: PathBuf,
}

impl StateWriter {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// `<base>_<part>_<part>...`
    pub fn path_for(&self, parts: &[String]) -> PathBuf {
        let mut name = self.base.clone().into_os_string();
        for part in parts {
            name.push("_");
            name.push(part);
        }
        PathBuf::from(name)
    }

    /// Serializes `snapshot` as JSON, truncating a previous file of the same name.
    pub fn write(&self, parts: &[String], snapshot: &StateSnapshot) -> Result<PathBuf> {
        let path = self.path_for(parts);
        let file = std::fs::File::create(&path)?;
        serde_json::to_writer_pretty(file, snapshot)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_format() {
        assert_eq!(CrossingRecord::new(3, 12, 0.1234).to_string(), "3,12,0.123");
        assert_eq!(CrossingRecord::new(2, 0, 5.0).uncommitted().to_string(), "2*,0,5.000");
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bounces.txt");

        let log = CrossingLog::open(&path, LogFormat::Mmvt).unwrap();
        log.append(&CrossingRecord::new(1, 0, 0.002)).unwrap();
        // Reopening an existing log must not repeat the header
        let log = CrossingLog::open(&path, LogFormat::Mmvt).unwrap();
        log.append(&CrossingRecord::new(2, 1, 0.004)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "#\"Bounced boundary ID\",\"bounce index\",\"total time (ps)\"\n1,0,0.002\n2,1,0.004\n"
        );
    }

    #[test]
    fn test_elber_header_has_two_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crossings.txt");
        CrossingLog::open(&path, LogFormat::Elber).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.lines().all(|line| line.starts_with('#')));
        assert!(content.contains("asterisk(*)"));
    }

    #[test]
    fn test_state_writer_paths() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StateWriter::new(dir.path().join("state"));
        let snapshot = StateSnapshot {
            time: 1.0,
            step: 500,
            positions: vec![[0.1, 0.2, 0.3]],
            velocities: vec![[0.0, 0.0, -1.0]],
        };

        let first = writer.write(&["4".to_string(), "2".to_string()], &snapshot).unwrap();
        assert!(first.ends_with("state_4_2"));
        let second = writer.write(&["5".to_string(), "2".to_string()], &snapshot).unwrap();
        assert_ne!(first, second);
        assert!(first.exists() && second.exists());

        let restored: StateSnapshot =
            serde_json::from_str(&std::fs::read_to_string(&first).unwrap()).unwrap();
        assert_eq!(restored, snapshot);
    }
}
