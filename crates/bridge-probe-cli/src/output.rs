//! Terminal output: status lines, the run spinner and result tables

use bridge_probe::{BridgeOperationResult, RunSummary};
use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Status reporter writing to stderr
#[derive(Debug)]
pub struct Reporter {
    term: Term,
    spinner: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl Reporter {
    /// Create a new reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            spinner: None,
            use_color,
            quiet,
        }
    }

    /// Show a spinner while an operation runs
    pub fn start_spinner(&mut self, message: &str) {
        if self.quiet {
            return;
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {elapsed} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner.set_message(message.to_string());
        self.spinner = Some(spinner);
    }

    /// Clear the spinner, if any
    pub fn finish_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    fn prefixed(&self, symbol: &str, plain: &str, paint: Style, message: &str) {
        let prefix = if self.use_color {
            paint.apply_to(symbol).to_string()
        } else {
            plain.to_string()
        };
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if !self.quiet {
            self.prefixed("✓", "PASS", Style::new().green().bold(), message);
        }
    }

    /// Print a failure message (shown even in quiet mode)
    pub fn failure(&self, message: &str) {
        self.prefixed("✗", "FAIL", Style::new().red().bold(), message);
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if !self.quiet {
            self.prefixed("⚠", "WARN", Style::new().yellow().bold(), message);
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if !self.quiet {
            self.prefixed("ℹ", "INFO", Style::new().blue().bold(), message);
        }
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }

        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };

        let _ = self.term.write_line("");
        let _ = self.term.write_line(&styled);
    }

    /// Print the outcome of one bridge operation
    pub fn operation(&self, result: &BridgeOperationResult) {
        if result.success {
            self.success(&result.summary_line());
        } else {
            self.failure(&result.summary_line());
        }
    }

    /// Print the totals line of a summary
    pub fn totals(&self, summary: &RunSummary) {
        if self.quiet && summary.failed == 0 {
            return;
        }

        let mean = summary
            .mean_duration_ms
            .map_or_else(|| "-".to_string(), |ms| format!("{ms}ms"));
        let status = if summary.failed > 0 { "FAILED" } else { "PASSED" };
        let status = if self.use_color {
            let paint = if summary.failed > 0 {
                Style::new().red().bold()
            } else {
                Style::new().green().bold()
            };
            paint.apply_to(status).to_string()
        } else {
            status.to_string()
        };

        let _ = self.term.write_line("");
        let _ = self.term.write_line(&format!(
            "{status} {} runs ({} passed, {} failed, {} route passed, {} sign tested, mean {mean})",
            summary.total,
            summary.passed,
            summary.failed,
            summary.route_passed,
            summary.sign_tested,
        ));
    }
}

/// One row of the summary table
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRow {
    /// Result file name
    pub file: String,
    /// Task identifier
    pub task_id: String,
    /// Overall success
    pub success: bool,
    /// Furthest stage reached
    pub test_progress: String,
    /// Route verdict, if the route stage ran
    pub route_pass: Option<bool>,
    /// `"from_token@from_chain -> to_token@to_chain"`
    pub pair: String,
    /// Run duration in milliseconds
    pub duration_ms: Option<u64>,
    /// Broadcast hash, if any
    pub transaction_hash: Option<String>,
    /// Failure message, if any
    pub error: Option<String>,
}

impl RunRow {
    /// Build a row from a loaded result file
    #[must_use]
    pub fn new(path: &Path, result: &BridgeOperationResult) -> Self {
        let file = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let r = &result.request;
        Self {
            file,
            task_id: result.task_id.clone(),
            success: result.success,
            test_progress: result.test_progress.to_string(),
            route_pass: result.route_pass,
            pair: format!(
                "{}@{} -> {}@{}",
                r.from_token, r.from_chain, r.to_token, r.to_chain
            ),
            duration_ms: result.timing.duration,
            transaction_hash: result.transaction_hash.clone(),
            error: result.error.clone(),
        }
    }
}

/// Aggregate report printed by `summary --json`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    /// Totals
    pub summary: RunSummary,
    /// Per-run rows in file order
    pub runs: Vec<RunRow>,
}

impl SummaryReport {
    /// Build the report from loaded results
    #[must_use]
    pub fn new(results: &[(PathBuf, BridgeOperationResult)]) -> Self {
        Self {
            summary: RunSummary::from_results(results.iter().map(|(_, r)| r)),
            runs: results.iter().map(|(p, r)| RunRow::new(p, r)).collect(),
        }
    }

    /// Render the per-run table, header first
    #[must_use]
    pub fn table_lines(&self) -> Vec<String> {
        const ERROR_WIDTH: usize = 60;

        let task_width = column_width("TASK", self.runs.iter().map(|r| r.task_id.len()));
        let progress_width =
            column_width("PROGRESS", self.runs.iter().map(|r| r.test_progress.len()));
        let pair_width = column_width("PAIR", self.runs.iter().map(|r| r.pair.len()));

        let mut lines = vec![format!(
            "{:<task_width$} {:<6} {:<progress_width$} {:<5} {:<pair_width$} {:>10}  DETAIL",
            "TASK", "STATUS", "PROGRESS", "ROUTE", "PAIR", "DURATION"
        )];
        for run in &self.runs {
            let status = if run.success { "PASS" } else { "FAIL" };
            let route = match run.route_pass {
                Some(true) => "pass",
                Some(false) => "fail",
                None => "-",
            };
            let duration = run
                .duration_ms
                .map_or_else(|| "-".to_string(), |ms| format!("{ms}ms"));
            let detail = match (&run.transaction_hash, &run.error) {
                (_, Some(error)) => truncate(error, ERROR_WIDTH),
                (Some(hash), None) => format!("tx={hash}"),
                (None, None) => String::new(),
            };
            lines.push(
                format!(
                    "{:<task_width$} {status:<6} {:<progress_width$} {route:<5} {:<pair_width$} {duration:>10}  {detail}",
                    run.task_id, run.test_progress, run.pair
                )
                .trim_end()
                .to_string(),
            );
        }
        lines
    }
}

fn column_width(header: &str, cells: impl Iterator<Item = usize>) -> usize {
    cells.fold(header.len(), usize::max)
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}
