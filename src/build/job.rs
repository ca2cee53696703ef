//! Job records and their state machine.
//!
//! A job moves `Pending -> Running -> {Succeeded, Failed}`. The state is an
//! atomic and the captured output is written once, right before the terminal
//! state is published. Progress and report code can read a record at any
//! time without ever taking a lock the job itself needs.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JobState {
    /// Waiting for a limiter permit.
    Pending = 0,
    Running = 1,
    Succeeded = 2,
    Failed = 3,
}

impl JobState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => JobState::Pending,
            1 => JobState::Running,
            2 => JobState::Succeeded,
            _ => JobState::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Compile,
    Link,
    Script,
}

/// What a finished job left behind.
#[derive(Debug, Clone, Default)]
pub struct JobOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

#[derive(Debug)]
pub struct JobRecord {
    kind: JobKind,
    name: String,
    argv: Vec<String>,
    target: Option<PathBuf>,
    state: AtomicU8,
    output: OnceLock<JobOutput>,
}

impl JobRecord {
    pub fn new(kind: JobKind, name: impl Into<String>, argv: Vec<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            argv,
            target: None,
            state: AtomicU8::new(JobState::Pending as u8),
            output: OnceLock::new(),
        }
    }

    /// File the job produces (object or executable).
    pub fn with_target(mut self, target: PathBuf) -> Self {
        self.target = Some(target);
        self
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn target(&self) -> Option<&Path> {
        self.target.as_deref()
    }

    /// The literal command line, quoted where an argument has spaces.
    pub fn command_line(&self) -> String {
        self.argv
            .iter()
            .map(|arg| {
                if arg.is_empty() || arg.contains(char::is_whitespace) {
                    format!("\"{}\"", arg)
                } else {
                    arg.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn succeeded(&self) -> bool {
        self.state() == JobState::Succeeded
    }

    pub fn failed(&self) -> bool {
        self.state() == JobState::Failed
    }

    /// Present once the job is terminal.
    pub fn output(&self) -> Option<&JobOutput> {
        self.output.get()
    }

    pub fn stdout(&self) -> &str {
        self.output().map_or("", |o| o.stdout.as_str())
    }

    pub fn stderr(&self) -> &str {
        self.output().map_or("", |o| o.stderr.as_str())
    }

    pub(crate) fn start(&self) {
        self.state
            .store(JobState::Running as u8, Ordering::Release);
    }

    /// Publishes the output, then the terminal state. Later calls are ignored.
    pub(crate) fn complete(&self, success: bool, output: JobOutput) {
        if self.output.set(output).is_err() {
            return;
        }
        let state = if success {
            JobState::Succeeded
        } else {
            JobState::Failed
        };
        self.state.store(state as u8, Ordering::Release);
    }

    /// Runs the command in `cwd` and records the result. The caller holds
    /// the limiter permit for the whole call.
    pub fn execute(&self, cwd: &Path) -> JobState {
        self.start();
        let started = Instant::now();

        let Some((program, args)) = self.argv.split_first() else {
            self.complete(
                false,
                JobOutput {
                    stderr: "empty command line".to_string(),
                    ..Default::default()
                },
            );
            return self.state();
        };

        match Command::new(program).args(args).current_dir(cwd).output() {
            Ok(out) => {
                let mut stderr = String::from_utf8_lossy(&out.stderr).into_owned();
                if out.status.code().is_none() {
                    stderr.push_str("\nterminated by signal");
                }
                self.complete(
                    out.status.success(),
                    JobOutput {
                        stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
                        stderr,
                        exit_code: out.status.code(),
                        duration: started.elapsed(),
                    },
                );
            }
            Err(e) => {
                self.complete(
                    false,
                    JobOutput {
                        stderr: format!("failed to execute '{}': {}", program, e),
                        duration: started.elapsed(),
                        ..Default::default()
                    },
                );
            }
        }

        self.state()
    }
}
