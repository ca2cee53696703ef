//! Compile phase, barrier, link phase.
//!
//! Every job gets its own thread and blocks on the shared [`Limiter`] before
//! starting its process, so at most `limit` processes run at once. Threads
//! report `Started`/`Finished` over a channel; the scheduler thread drains it
//! and forwards to the [`BuildObserver`], so a job never waits on rendering.
//! The phase ends only after every job has reported a terminal state, and the
//! link phase is entered only if no compile job failed. In-flight compilers
//! are never cancelled when a sibling fails.

use super::command::{collect_objects, compile_argv, link_argv, object_path};
use super::job::{JobKind, JobOutput, JobRecord};
use super::limiter::Limiter;
use crate::config::Settings;
use crate::source::SourceFile;
use anyhow::{Context, Result};
use std::fs;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Compile,
    Link,
}

/// Outcome of one build invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    CompileFailed,
    LinkFailed,
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Success)
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Verdict::Success => 0,
            Verdict::CompileFailed => 2,
            Verdict::LinkFailed => 3,
        }
    }
}

/// Receives job lifecycle events on the scheduler thread.
pub trait BuildObserver {
    fn phase_started(&mut self, _phase: Phase, _jobs: &[Arc<JobRecord>]) {}
    /// `index` is the job's position in the slice passed to `phase_started`.
    fn job_started(&mut self, _index: usize, _job: &JobRecord) {}
    fn job_finished(&mut self, _index: usize, _job: &JobRecord) {}
    fn phase_finished(&mut self, _phase: Phase, _jobs: &[Arc<JobRecord>]) {}
    /// Pre/post scripts run outside the phases and report here once done.
    fn script_finished(&mut self, _label: &str, _job: &JobRecord) {}
    /// Every candidate was fresh; nothing gets compiled or linked.
    fn up_to_date(&mut self, _candidates: usize) {}
}

pub struct NoopObserver;

impl BuildObserver for NoopObserver {}

#[derive(Debug)]
pub struct BuildSession {
    pub stale: Vec<SourceFile>,
    pub compile_jobs: Vec<Arc<JobRecord>>,
    /// `None` when the compile phase failed and linking was skipped.
    pub link_job: Option<Arc<JobRecord>>,
    pub verdict: Verdict,
    pub elapsed: Duration,
}

impl BuildSession {
    pub fn failed_jobs(&self) -> impl Iterator<Item = &Arc<JobRecord>> {
        self.compile_jobs
            .iter()
            .chain(self.link_job.iter())
            .filter(|job| job.failed())
    }
}

enum JobEvent {
    Started(usize),
    Finished(usize),
}

pub struct BuildScheduler<'a> {
    settings: &'a Settings,
    limiter: &'a Limiter,
}

impl<'a> BuildScheduler<'a> {
    pub fn new(settings: &'a Settings, limiter: &'a Limiter) -> Self {
        Self { settings, limiter }
    }

    /// Compiles `stale`, waits for all of it, then links if nothing failed.
    pub fn run(
        &self,
        stale: Vec<SourceFile>,
        observer: &mut dyn BuildObserver,
    ) -> Result<BuildSession> {
        let compile_jobs = self.plan_compile(&stale);
        self.execute(stale, compile_jobs, observer)
    }

    pub fn plan_compile(&self, stale: &[SourceFile]) -> Vec<Arc<JobRecord>> {
        stale
            .iter()
            .map(|source| {
                let job = JobRecord::new(
                    JobKind::Compile,
                    source.file_name(),
                    compile_argv(self.settings, source),
                )
                .with_target(object_path(self.settings, source));
                Arc::new(job)
            })
            .collect()
    }

    /// Builds the link job from the objects present right now, so it must
    /// only be called after the compile barrier.
    pub fn plan_link(&self) -> Result<Arc<JobRecord>> {
        let objects = collect_objects(self.settings)?;
        let exe = &self.settings.exe_path;
        let job = JobRecord::new(
            JobKind::Link,
            exe.to_string_lossy(),
            link_argv(self.settings, &objects),
        )
        .with_target(exe.clone());
        Ok(Arc::new(job))
    }

    /// Runs already planned compile jobs, then the link phase.
    pub fn execute(
        &self,
        stale: Vec<SourceFile>,
        compile_jobs: Vec<Arc<JobRecord>>,
        observer: &mut dyn BuildObserver,
    ) -> Result<BuildSession> {
        let started = Instant::now();

        let obj_dir = self.settings.in_project(&self.settings.profile_dir());
        fs::create_dir_all(&obj_dir)
            .with_context(|| format!("Failed to create {}", obj_dir.display()))?;

        tracing::info!(jobs = compile_jobs.len(), limit = ?self.limiter.limit(), "compile phase");
        self.run_phase(Phase::Compile, &compile_jobs, observer);

        let failed = compile_jobs.iter().filter(|job| job.failed()).count();
        if failed > 0 {
            tracing::info!(failed, "compile phase failed, skipping link");
            return Ok(BuildSession {
                stale,
                compile_jobs,
                link_job: None,
                verdict: Verdict::CompileFailed,
                elapsed: started.elapsed(),
            });
        }

        if let Some(parent) = self.settings.exe_path.parent()
            && !parent.as_os_str().is_empty()
        {
            let dir = self.settings.in_project(parent);
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let link_job = self.plan_link()?;
        tracing::info!(command = %link_job.command_line(), "link phase");
        self.run_phase(Phase::Link, std::slice::from_ref(&link_job), observer);

        let verdict = if link_job.succeeded() {
            Verdict::Success
        } else {
            Verdict::LinkFailed
        };

        Ok(BuildSession {
            stale,
            compile_jobs,
            link_job: Some(link_job),
            verdict,
            elapsed: started.elapsed(),
        })
    }

    /// Fans `jobs` out one thread each and returns once all are terminal.
    pub fn run_phase(
        &self,
        phase: Phase,
        jobs: &[Arc<JobRecord>],
        observer: &mut dyn BuildObserver,
    ) {
        observer.phase_started(phase, jobs);

        let cwd = self.settings.project_dir.as_path();
        let limiter = self.limiter;
        let (tx, rx) = mpsc::channel::<JobEvent>();

        thread::scope(|scope| {
            for (idx, job) in jobs.iter().enumerate() {
                let worker_tx = tx.clone();
                let spawned = thread::Builder::new()
                    .name(format!("job-{}", job.name()))
                    .spawn_scoped(scope, move || {
                        let permit = limiter.acquire();
                        // The receiver outlives every worker inside the scope
                        let _ = worker_tx.send(JobEvent::Started(idx));
                        job.execute(cwd);
                        drop(permit);
                        let _ = worker_tx.send(JobEvent::Finished(idx));
                    });

                if let Err(e) = spawned {
                    job.complete(
                        false,
                        JobOutput {
                            stderr: format!("failed to spawn worker thread: {}", e),
                            ..Default::default()
                        },
                    );
                    let _ = tx.send(JobEvent::Finished(idx));
                }
            }
            drop(tx);

            let mut remaining = jobs.len();
            while remaining > 0 {
                match rx.recv() {
                    Ok(JobEvent::Started(idx)) => observer.job_started(idx, &jobs[idx]),
                    Ok(JobEvent::Finished(idx)) => {
                        remaining -= 1;
                        observer.job_finished(idx, &jobs[idx]);
                    }
                    // Every sender is gone: a worker panicked, the scope rethrows it
                    Err(_) => break,
                }
            }
        });

        observer.phase_finished(phase, jobs);
    }
}
