//! Parsing of the backend's textual reports.
//!
//! The backend speaks human-oriented text; the three facts we need — the
//! execution handle after a submit, the success/failure marker in a status
//! report, and "already gone" after a remove — are extracted here and
//! nowhere else, so a report-format change is a one-file fix.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

/// Line announcing a successful submission; the handle follows on a later
/// line that embeds the work directory.
const STARTED_MARKER: &str = "has been started";

/// Execution handle shape, e.g. `T20260807-120455` — a timestamp-like
/// token minted by the backend per run.
static HANDLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([T\d]+-\d+)").expect("valid regex"));

/// Extract the execution handle from a submit report.
///
/// Scans for the started marker, then for a following line that embeds
/// `work_dir` and captures the handle token from it. `None` means the
/// submission produced no recognisable handle — callers record the run
/// without one and let reconciliation heal it, rather than failing hard.
pub fn extract_handle(output: &str, work_dir: &Path) -> Option<String> {
    let work_dir = work_dir.to_string_lossy();
    let mut started = false;
    for line in output.lines() {
        if line.contains(STARTED_MARKER) {
            started = true;
            continue;
        }
        if started && line.contains(&*work_dir) {
            return HANDLE_PATTERN
                .captures(line)
                .map(|caps| caps[1].to_string());
        }
    }
    None
}

/// Outcome markers a status report may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    Success,
    Failure,
    /// Still running, or the report is unrecognisable; take no action.
    Indeterminate,
}

/// How many leading report lines carry the summary markers.
const SUMMARY_LINES: usize = 3;

/// Classify a status report by the markers in its summary lines.
pub fn status_outcome(output: &str) -> StatusOutcome {
    for line in output.lines().take(SUMMARY_LINES) {
        if line.contains("Failure") {
            return StatusOutcome::Failure;
        }
        if line.contains("Success") {
            return StatusOutcome::Success;
        }
    }
    StatusOutcome::Indeterminate
}

/// Whether a remove report means the workflow is gone — either the tool
/// succeeded or the backend never heard of the workflow.
pub fn remove_confirms_absence(exit_code: i32, output: &str) -> bool {
    exit_code == 0 || output.contains("not found")
}

/// Whether a status report shows the backend still tracking a workflow.
/// A non-zero exit or a "not found" report means teardown has finished
/// and the local directories are safe to delete.
pub fn workflow_tracked(exit_code: i32, output: &str) -> bool {
    exit_code == 0 && !output.contains("not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const SUBMIT_REPORT: &str = "\
2026.08.07 12:04:55.120 UTC: Submitting to condor scheduler
2026.08.07 12:04:56.310 UTC: Your workflow has been started and is running in the base directory:
2026.08.07 12:04:56.311 UTC:   /srv/recongrid/fred/workflows/T20260807-120455
2026.08.07 12:04:56.312 UTC: *** To monitor the workflow you can run ***
";

    #[test]
    fn handle_is_extracted_after_started_marker() {
        let work_dir = PathBuf::from("/srv/recongrid/fred/workflows");
        assert_eq!(
            extract_handle(SUBMIT_REPORT, &work_dir),
            Some("T20260807-120455".to_string())
        );
    }

    #[test]
    fn no_handle_without_started_marker() {
        let work_dir = PathBuf::from("/srv/recongrid/fred/workflows");
        let report = "/srv/recongrid/fred/workflows/T20260807-120455\n";
        assert_eq!(extract_handle(report, &work_dir), None);
    }

    #[test]
    fn no_handle_when_line_lacks_work_dir() {
        let work_dir = PathBuf::from("/srv/recongrid/alice/workflows");
        assert_eq!(extract_handle(SUBMIT_REPORT, &work_dir), None);
    }

    #[test]
    fn status_failure_marker_in_summary() {
        let report = "STAT  IN_STATE  JOB\nSummary: 1 DAG total (Failure:1)\n";
        assert_eq!(status_outcome(report), StatusOutcome::Failure);
    }

    #[test]
    fn status_success_marker_in_summary() {
        let report = "STAT  IN_STATE  JOB\nSummary: 1 DAG total (Success:1)\n";
        assert_eq!(status_outcome(report), StatusOutcome::Success);
    }

    #[test]
    fn marker_outside_summary_lines_is_ignored() {
        let report = "a\nb\nc\nd\nSuccess\n";
        assert_eq!(status_outcome(report), StatusOutcome::Indeterminate);
    }

    #[test]
    fn running_report_is_indeterminate() {
        let report = "STAT  IN_STATE  JOB\nSummary: 1 DAG total (Running:1)\n";
        assert_eq!(status_outcome(report), StatusOutcome::Indeterminate);
    }

    #[test]
    fn remove_absence_via_exit_or_message() {
        assert!(remove_confirms_absence(0, "Job 12.0 marked for removal"));
        assert!(remove_confirms_absence(1, "workflow not found in queue"));
        assert!(!remove_confirms_absence(1, "permission denied"));
    }

    #[test]
    fn tracking_ends_on_error_or_not_found() {
        assert!(workflow_tracked(0, "Summary: 1 DAG total (Running:1)"));
        assert!(!workflow_tracked(1, ""));
        assert!(!workflow_tracked(0, "workflow not found"));
    }
}
