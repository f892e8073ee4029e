//! Persisting the tally statistics
//!
//! The report is a two-line key/value text file:
//!
//! ```text
//! valid: 8
//! invalid: 2
//! ```

use crate::types::TallyStats;
use crate::{PipelineError, Result};
use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Destination for the statistics once the tally reports them
pub trait ReportSink: Send + Sync + Debug {
    /// Store `stats`, returning where they went if anywhere
    fn persist(&self, stats: &TallyStats) -> Result<Option<PathBuf>>;
}

/// Writes the report to a file, replacing any previous content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReportSink {
    path: PathBuf,
}

impl FileReportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileReportSink {
    fn default() -> Self {
        Self::new(default_report_path())
    }
}

impl ReportSink for FileReportSink {
    fn persist(&self, stats: &TallyStats) -> Result<Option<PathBuf>> {
        std::fs::write(&self.path, render(stats)).map_err(|source| PipelineError::Report {
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), "tally report written");
        Ok(Some(self.path.clone()))
    }
}

/// Discards the statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoReport;

impl ReportSink for NoReport {
    fn persist(&self, _stats: &TallyStats) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// Per-process report file in the system temp directory
pub fn default_report_path() -> PathBuf {
    std::env::temp_dir().join(format!("ballotbox_{}.txt", std::process::id()))
}

fn render(stats: &TallyStats) -> String {
    format!("valid: {}\ninvalid: {}\n", stats.valid, stats.invalid)
}

/// Read a report written by [`FileReportSink`]
pub fn read_report(path: &Path) -> Result<TallyStats> {
    let report_error = |source: io::Error| PipelineError::Report {
        path: path.to_path_buf(),
        source,
    };
    let text = std::fs::read_to_string(path).map_err(report_error)?;

    let mut valid = None;
    let mut invalid = None;
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| report_error(invalid_data(format!("missing ':' in '{}'", line))))?;
        let value: u32 = value
            .trim()
            .parse()
            .map_err(|e| report_error(invalid_data(format!("bad count in '{}': {}", line, e))))?;
        match key.trim() {
            "valid" => valid = Some(value),
            "invalid" => invalid = Some(value),
            other => {
                return Err(report_error(invalid_data(format!(
                    "unknown key '{}'",
                    other
                ))))
            }
        }
    }

    match (valid, invalid) {
        (Some(valid), Some(invalid)) => Ok(TallyStats { valid, invalid }),
        _ => Err(report_error(invalid_data(
            "report needs both 'valid' and 'invalid'".to_string(),
        ))),
    }
}

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_sink_writes_expected_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.txt");
        let sink = FileReportSink::new(&path);

        let written = sink
            .persist(&TallyStats {
                valid: 8,
                invalid: 2,
            })
            .unwrap();
        assert_eq!(written.as_deref(), Some(path.as_path()));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "valid: 8\ninvalid: 2\n"
        );
        assert_eq!(
            read_report(&path).unwrap(),
            TallyStats {
                valid: 8,
                invalid: 2
            }
        );
    }

    #[test]
    fn test_file_sink_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.txt");
        std::fs::write(&path, "stale content that is longer than the report\n").unwrap();

        FileReportSink::new(&path)
            .persist(&TallyStats {
                valid: 0,
                invalid: 1,
            })
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "valid: 0\ninvalid: 1\n"
        );
    }

    #[test]
    fn test_unwritable_path_is_a_file_error() {
        let dir = TempDir::new().unwrap();
        let sink = FileReportSink::new(dir.path().join("missing").join("report.txt"));
        let err = sink.persist(&TallyStats::default()).unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::File);
    }

    #[test]
    fn test_read_report_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.txt");
        std::fs::write(&path, "valid: 3\n").unwrap();
        assert!(read_report(&path).is_err());
        std::fs::write(&path, "valid: x\ninvalid: 1\n").unwrap();
        assert!(read_report(&path).is_err());
    }

    #[test]
    fn test_no_report_persists_nothing() {
        assert_eq!(NoReport.persist(&TallyStats::default()).unwrap(), None);
    }

    #[test]
    fn test_default_path_is_per_process() {
        let path = default_report_path();
        assert!(path.starts_with(std::env::temp_dir()));
        assert!(path
            .to_string_lossy()
            .contains(&std::process::id().to_string()));
    }
}
