//! Result persistence.
//!
//! One JSON file per operation, named `bridge-result-{task}-{timestamp}.json`,
//! plus PNG screenshots named `{checkpoint}-{task}.png`.

use crate::config::HarnessConfig;
use crate::har::Har;
use crate::operation::{BridgeOperationResult, TestProgress};
use crate::result::{ProbeError, ProbeResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix of result file names
pub const RESULT_FILE_PREFIX: &str = "bridge-result-";

/// Writes results and screenshots for one task
#[derive(Debug, Clone)]
pub struct ResultWriter {
    task_id: String,
    results_dir: PathBuf,
    screenshots_dir: PathBuf,
}

impl ResultWriter {
    /// Create a writer
    #[must_use]
    pub fn new(
        task_id: impl Into<String>,
        results_dir: impl Into<PathBuf>,
        screenshots_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            task_id: sanitize(&task_id.into()),
            results_dir: results_dir.into(),
            screenshots_dir: screenshots_dir.into(),
        }
    }

    /// Create a writer from harness settings
    #[must_use]
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(
            config.task_id.clone(),
            config.results_dir.clone(),
            config.screenshots_dir.clone(),
        )
    }

    /// Task id used in file names
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// File name for a result written at `at`
    #[must_use]
    pub fn result_file_name(&self, at: DateTime<Utc>) -> String {
        format!(
            "{RESULT_FILE_PREFIX}{}-{}.json",
            self.task_id,
            at.format("%Y%m%dT%H%M%S%3fZ")
        )
    }

    /// Path of a screenshot taken at `checkpoint`
    #[must_use]
    pub fn screenshot_path(&self, checkpoint: &str) -> PathBuf {
        self.screenshots_dir
            .join(format!("{}-{}.png", sanitize(checkpoint), self.task_id))
    }

    /// Write a result as pretty JSON and return its path
    pub fn write_result(&self, result: &BridgeOperationResult) -> ProbeResult<PathBuf> {
        let at = result.timing.end_time.unwrap_or_else(Utc::now);
        let path = self.results_dir.join(self.result_file_name(at));
        let json = serde_json::to_string_pretty(result)?;
        write_file(&path, json.as_bytes())?;
        tracing::info!(path = %path.display(), success = result.success, "result written");
        Ok(path)
    }

    /// Save PNG bytes for a checkpoint and return the path
    pub fn save_screenshot(&self, checkpoint: &str, png: &[u8]) -> ProbeResult<PathBuf> {
        let path = self.screenshot_path(checkpoint);
        write_file(&path, png)?;
        tracing::debug!(path = %path.display(), bytes = png.len(), "screenshot saved");
        Ok(path)
    }

    /// Write a HAR next to the results
    pub fn write_har(&self, har: &Har, at: DateTime<Utc>) -> ProbeResult<PathBuf> {
        let path = self.results_dir.join(format!(
            "bridge-traffic-{}-{}.har",
            self.task_id,
            at.format("%Y%m%dT%H%M%S%3fZ")
        ));
        let json = serde_json::to_string_pretty(har)?;
        write_file(&path, json.as_bytes())?;
        Ok(path)
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> ProbeResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ProbeError::Report {
            message: format!("cannot create {}: {e}", parent.display()),
        })?;
    }
    std::fs::write(path, bytes).map_err(|e| ProbeError::Report {
        message: format!("cannot write {}: {e}", path.display()),
    })
}

/// Keep names filesystem-safe
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

/// Read every result file in a directory, oldest name first.
///
/// Files that do not parse are skipped with a warning.
pub fn load_results(dir: &Path) -> ProbeResult<Vec<(PathBuf, BridgeOperationResult)>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().is_some_and(|ext| ext == "json")
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(RESULT_FILE_PREFIX))
        })
        .collect();
    paths.sort();

    let mut results = Vec::with_capacity(paths.len());
    for path in paths {
        let parsed = std::fs::read_to_string(&path)
            .map_err(ProbeError::from)
            .and_then(|text| Ok(serde_json::from_str::<BridgeOperationResult>(&text)?));
        match parsed {
            Ok(result) => results.push((path, result)),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable result"),
        }
    }
    Ok(results)
}

/// Totals across many results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Results read
    pub total: usize,
    /// Successful operations
    pub passed: usize,
    /// Failed operations
    pub failed: usize,
    /// Operations whose route passed
    pub route_passed: usize,
    /// Operations that reached the signing stage
    pub sign_tested: usize,
    /// Mean duration of finalized operations, in milliseconds
    pub mean_duration_ms: Option<u64>,
}

impl RunSummary {
    /// Aggregate a set of results
    #[must_use]
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a BridgeOperationResult>) -> Self {
        let mut summary = Self::default();
        let mut durations = Vec::new();
        for result in results {
            summary.total += 1;
            if result.success {
                summary.passed += 1;
            } else {
                summary.failed += 1;
            }
            if result.route_pass == Some(true) {
                summary.route_passed += 1;
            }
            if result.test_progress == TestProgress::SignTested {
                summary.sign_tested += 1;
            }
            if let Some(d) = result.timing.duration {
                durations.push(d);
            }
        }
        if !durations.is_empty() {
            summary.mean_duration_ms =
                Some(durations.iter().sum::<u64>() / durations.len() as u64);
        }
        summary
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::operation::BridgeRequest;
    use chrono::TimeZone;

    fn request() -> BridgeRequest {
        BridgeRequest::new("1", "osmosis-1", "uosmo", "cosmoshub-4", "uatom", "fastest")
    }

    #[test]
    fn test_result_file_name() {
        let writer = ResultWriter::new("task/7", "r", "s");
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(
            writer.result_file_name(at),
            "bridge-result-task_7-20260304T050607000Z.json"
        );
    }

    #[test]
    fn test_screenshot_path_has_task_suffix() {
        let writer = ResultWriter::new("w1", "r", "shots");
        assert_eq!(
            writer.screenshot_path("route validated"),
            PathBuf::from("shots/route_validated-w1.png")
        );
    }

    #[test]
    fn test_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new("w1", dir.path(), dir.path().join("shots"));

        let mut ok = BridgeOperationResult::new("w1", request());
        ok.route_pass = Some(true);
        ok.finalize(Some(true), Utc::now());
        let mut failed = BridgeOperationResult::new("w1", request());
        failed.fail("no routes found");
        failed.finalize(None, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());

        writer.write_result(&ok).unwrap();
        writer.write_result(&failed).unwrap();
        std::fs::write(dir.path().join("bridge-result-broken.json"), "{").unwrap();
        std::fs::write(dir.path().join("notes.json"), "{}").unwrap();

        let loaded = load_results(dir.path()).unwrap();
        assert_eq!(loaded.len(), 2);

        let summary = RunSummary::from_results(loaded.iter().map(|(_, r)| r));
        assert_eq!(summary.total, 2);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.route_passed, 1);
    }

    #[test]
    fn test_save_screenshot_creates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new("w2", dir.path(), dir.path().join("nested/shots"));
        let path = writer.save_screenshot("error", &[0x89, b'P', b'N', b'G']).unwrap();
        assert!(path.ends_with("error-w2.png"));
        assert_eq!(std::fs::read(path).unwrap().len(), 4);
    }
}
