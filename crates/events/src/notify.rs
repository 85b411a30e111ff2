//! Notification message bodies.
//!
//! Plain-text templates for the three user-facing mails: workflow
//! completed, workflow failed or removed, and the seven-day deletion
//! warning. Bodies are pure string builders so they can be tested without
//! a transport.

/// Hours of notice the deletion warning gives, per the retention policy
/// (results purge at 30 days, warning at 22–23 days).
const WARNING_NOTICE_DAYS: i64 = 7;

/// Inputs for a completion mail.
#[derive(Debug, Clone)]
pub struct CompletionNotice {
    pub job_id: i64,
    /// Submission time, already formatted for the user.
    pub submitted: String,
    pub success: bool,
    /// Walltime/cputime in seconds, when accounting was recoverable.
    pub walltime: Option<f64>,
    pub cputime: Option<f64>,
}

/// Subject line for a completion mail.
pub fn completion_subject(job_id: i64) -> String {
    format!("Reconstruction workflow {job_id} completed")
}

/// Body for a completion mail, success or failure wording.
pub fn completion_body(notice: &CompletionNotice) -> String {
    let stats = usage_msg(notice.walltime, notice.cputime);
    if notice.success {
        format!(
            "This email is being sent to inform you that your reconstruction \
             workflow {id}\nsubmitted on {date} has completed successfully. \
             You can download the\noutput by running `recon output --id {id}` \
             or download the log files by\nrunning `recon output --id {id} --log-only`.\n\
             {stats}\n\
             Please contact support if you have any questions.\n",
            id = notice.job_id,
            date = notice.submitted,
        )
    } else {
        format!(
            "This email is being sent to inform you that your reconstruction \
             workflow {id}\nsubmitted on {date} has been removed or has \
             completed with errors.\nYou may be able to download the output by \
             running `recon output --id {id}`.\n\n\
             Please note the output or the log files may not be available\n\
             depending on the type of error that was encountered.\n\
             {stats}\n\
             Please contact support if you have any questions.\n",
            id = notice.job_id,
            date = notice.submitted,
        )
    }
}

/// Subject line for the deletion warning.
pub fn warning_subject(job_id: i64) -> String {
    format!("Results for reconstruction workflow {job_id} will be deleted")
}

/// Body for the deletion warning.
pub fn warning_body(job_id: i64) -> String {
    format!(
        "The results from your reconstruction workflow {job_id} will be \
         deleted in {WARNING_NOTICE_DAYS} days.\n"
    )
}

/// Usage paragraph for completion mails; empty when accounting is missing.
pub fn usage_msg(walltime: Option<f64>, cputime: Option<f64>) -> String {
    match (walltime, cputime) {
        (Some(walltime), Some(cputime)) => format!(
            "\nThe workflow was active for {} and used a total CPU time of {} \
             on the grid.\nPlease note that the CPU time might be larger than \
             the active time due to\nmulti-threading.\n",
            format_seconds(walltime),
            format_seconds(cputime),
        ),
        _ => String::new(),
    }
}

/// Number of time components rendered by [`format_seconds`].
const MAX_COMPONENTS: usize = 2;

/// Render a duration in seconds as its two most significant components,
/// e.g. `3 hrs, 25 mins`.
pub fn format_seconds(duration: f64) -> String {
    let mut sec = duration as i64;
    let units: [(&str, &str, i64); 5] = [
        ("year", "years", 31_536_000),
        ("day", "days", 86_400),
        ("hr", "hrs", 3_600),
        ("min", "mins", 60),
        ("sec", "secs", 1),
    ];

    let mut parts = Vec::new();
    for (singular, plural, unit) in units {
        let count = sec / unit;
        sec -= count * unit;
        // Once the leading component is emitted, keep emitting even zeros
        // so "1 hr, 0 mins" reads as a duration and not a typo.
        if parts.len() < MAX_COMPONENTS && (count >= 1 || !parts.is_empty()) {
            let name = if count == 1 { singular } else { plural };
            parts.push(format!("{count} {name}"));
        }
        if parts.len() == MAX_COMPONENTS {
            break;
        }
    }

    if parts.is_empty() {
        "0 secs".to_string()
    } else {
        parts.join(", ")
    }
}
