//! Per-job reports printed after each phase.
//!
//! A report is the job name, the exact command line, and whatever the process
//! wrote to stdout and stderr. Failed jobs also get a hint when the output
//! matches a known failure.

use crate::build::{FeedbackAnalyzer, JobRecord};
use crate::config::ReportFilter;
use colored::*;
use std::sync::Arc;

pub const NAME_WIDTH: usize = 20;

/// Job name padded or truncated to the fixed report column.
pub fn name_column(name: &str) -> String {
    console::pad_str(name, NAME_WIDTH, console::Alignment::Left, Some("")).into_owned()
}

pub fn should_report(job: &JobRecord, filter: ReportFilter) -> bool {
    match filter {
        ReportFilter::ShowAll => true,
        ReportFilter::SkipEmpty => !job.stdout().is_empty() || !job.stderr().is_empty(),
        ReportFilter::SkipWarnings => job.failed(),
        ReportFilter::SkipAll => false,
    }
}

pub fn render_report(job: &JobRecord) -> String {
    let mut text = format!(
        " {} {}\n",
        name_column(job.name()),
        job.command_line().bright_black()
    );

    if !job.stdout().is_empty() {
        text.push_str(&format!("{}:\n{}", "    out".bright_blue(), job.stdout()));
        if !job.stdout().ends_with('\n') {
            text.push('\n');
        }
    }
    if !job.stderr().is_empty() {
        text.push_str(&format!("{}:\n{}", "    err".bright_red(), job.stderr()));
        if !job.stderr().ends_with('\n') {
            text.push('\n');
        }
    }

    if job.failed() {
        let combined = format!("{}\n{}", job.stderr(), job.stdout());
        if let Some(hint) = FeedbackAnalyzer::analyze(&combined) {
            text.push_str(&format!("\n{} {}\n", "💡 Hint:".yellow().bold(), hint));
        }
    }
    text
}

pub fn print_reports(jobs: &[Arc<JobRecord>], filter: ReportFilter) {
    for job in jobs.iter().filter(|job| should_report(job, filter)) {
        println!("{}", render_report(job));
    }
}
