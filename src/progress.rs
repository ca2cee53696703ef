//! Live console output for a build.
//!
//! [`ConsoleObserver`] draws one spinner line per job while a phase runs,
//! prints the phase banners and, once a phase is over, the job reports.

use crate::build::{BuildObserver, JobKind, JobRecord, JobState, Phase};
use crate::config::{PrintOptions, ProgressMode};
use crate::report::{name_column, print_reports, render_report, should_report};
use colored::*;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

const SPINNER: &[&str] = &["|", "/", "-", "\\", ""];

pub fn status_text(kind: JobKind, state: JobState) -> &'static str {
    match state {
        JobState::Pending => "Waiting",
        JobState::Running => match kind {
            JobKind::Compile => "Compiling",
            JobKind::Link => "Linking",
            JobKind::Script => "Running",
        },
        JobState::Succeeded => "Done",
        JobState::Failed => "Failed",
    }
}

/// Final line for a finished job: mark, fixed-width name, status.
pub fn finished_line(job: &JobRecord) -> String {
    let state = job.state();
    let mark = match state {
        JobState::Succeeded => "✓".green(),
        JobState::Failed => "x".red(),
        _ => " ".normal(),
    };
    let elapsed = job
        .output()
        .map(|o| format!(" ({:.2}s)", o.duration.as_secs_f64()))
        .unwrap_or_default();
    format!(
        " {} {} {}{}",
        mark,
        name_column(job.name()).bright_black(),
        status_text(job.kind(), state),
        elapsed.bright_black()
    )
}

pub struct ConsoleObserver {
    printing: PrintOptions,
    draw_hidden: bool,
    multi: MultiProgress,
    bars: Vec<Option<ProgressBar>>,
}

impl ConsoleObserver {
    pub fn new(printing: PrintOptions) -> Self {
        Self::with_hidden_output(printing, false)
    }

    /// Keeps all bookkeeping but never draws progress (tests, piping).
    pub fn with_hidden_output(printing: PrintOptions, draw_hidden: bool) -> Self {
        Self {
            printing,
            draw_hidden,
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            bars: Vec::new(),
        }
    }

    fn target(&self) -> ProgressDrawTarget {
        if self.draw_hidden {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stdout()
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template(" {spinner} {prefix} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER)
    }

    fn done_style() -> ProgressStyle {
        ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    /// Number of bars currently alive; used by tests.
    pub fn live_bars(&self) -> usize {
        self.bars.iter().filter(|bar| bar.is_some()).count()
    }

    fn banner(&self, text: &str) {
        if !self.draw_hidden {
            println!("\n{}", format!(" --- {} ---", text).green());
        }
    }
}

impl BuildObserver for ConsoleObserver {
    fn phase_started(&mut self, phase: Phase, jobs: &[Arc<JobRecord>]) {
        self.banner(match phase {
            Phase::Compile => "Compiling",
            Phase::Link => "Linking",
        });

        self.multi = MultiProgress::with_draw_target(self.target());
        self.bars = jobs
            .iter()
            .map(|job| {
                if self.printing.progress != ProgressMode::Full {
                    return None;
                }
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(Self::spinner_style());
                bar.set_prefix(name_column(job.name()).bright_black().to_string());
                bar.set_message(status_text(job.kind(), JobState::Pending));
                bar.enable_steady_tick(Duration::from_millis(150));
                Some(bar)
            })
            .collect();
    }

    fn job_started(&mut self, index: usize, job: &JobRecord) {
        if let Some(Some(bar)) = self.bars.get(index) {
            bar.set_message(status_text(job.kind(), JobState::Running));
        }
    }

    fn job_finished(&mut self, index: usize, job: &JobRecord) {
        match self.bars.get_mut(index).and_then(Option::take) {
            Some(bar) => {
                bar.set_style(Self::done_style());
                bar.finish_with_message(finished_line(job));
            }
            None if self.printing.progress == ProgressMode::FinishedOnly && !self.draw_hidden => {
                println!("{}", finished_line(job));
            }
            None => {}
        }
    }

    fn phase_finished(&mut self, phase: Phase, jobs: &[Arc<JobRecord>]) {
        for bar in self.bars.drain(..).flatten() {
            bar.finish();
        }
        if !self.draw_hidden {
            println!();
            print_reports(jobs, self.printing.reports);
        }

        if phase == Phase::Compile && jobs.iter().any(|job| job.failed()) && !self.draw_hidden {
            println!(
                "\n{}",
                " --- Linking skipped due to errors in compilation process! ---".red()
            );
        }
    }

    fn script_finished(&mut self, label: &str, job: &JobRecord) {
        if self.draw_hidden {
            return;
        }
        let title = if label == "pre" { "Pre Script" } else { "Post Script" };
        println!("\n{}", format!(" --- {} ---", title).green());
        if self.printing.progress != ProgressMode::Hidden {
            println!("{}", finished_line(job));
        }
        if should_report(job, self.printing.reports) {
            println!("\n{}", render_report(job));
        }
    }

    fn up_to_date(&mut self, candidates: usize) {
        if self.draw_hidden {
            return;
        }
        println!(
            "{}",
            format!(
                " --- Compilation and linking skipped due to no new or modified files ({} checked) ---",
                candidates
            )
            .yellow()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(name: &str) -> Arc<JobRecord> {
        Arc::new(JobRecord::new(JobKind::Compile, name, vec!["cc".into()]))
    }

    #[test]
    fn test_status_text() {
        assert_eq!(status_text(JobKind::Compile, JobState::Running), "Compiling");
        assert_eq!(status_text(JobKind::Link, JobState::Running), "Linking");
        assert_eq!(status_text(JobKind::Script, JobState::Running), "Running");
        assert_eq!(status_text(JobKind::Link, JobState::Failed), "Failed");
    }

    #[test]
    fn test_finished_line_layout() {
        colored::control::set_override(false);
        let j = job("util.cpp");
        j.complete(true, Default::default());
        let line = finished_line(&j);
        assert!(line.starts_with(" ✓ util.cpp"));
        assert!(line.contains("Done"));
    }

    #[test]
    fn test_bars_follow_progress_mode() {
        let jobs = vec![job("a.c"), job("b.c")];

        let mut full = ConsoleObserver::with_hidden_output(PrintOptions::default(), true);
        full.phase_started(Phase::Compile, &jobs);
        assert_eq!(full.live_bars(), 2);
        full.job_finished(0, &jobs[0]);
        assert_eq!(full.live_bars(), 1);
        full.phase_finished(Phase::Compile, &jobs);
        assert_eq!(full.live_bars(), 0);

        let hidden = PrintOptions {
            progress: ProgressMode::Hidden,
            ..Default::default()
        };
        let mut quiet = ConsoleObserver::with_hidden_output(hidden, true);
        quiet.phase_started(Phase::Compile, &jobs);
        assert_eq!(quiet.live_bars(), 0);
    }
}
