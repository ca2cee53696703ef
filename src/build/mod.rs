pub mod command;
mod clean;
mod core;
mod feedback;
pub mod job;
pub mod limiter;
pub mod scheduler;
mod scripts;

pub use clean::clean;
pub use core::{BuildOutcome, build_project, fingerprint_path};
pub use feedback::FeedbackAnalyzer;
pub use job::{JobKind, JobOutput, JobRecord, JobState};
pub use limiter::Limiter;
pub use scheduler::{BuildObserver, BuildScheduler, BuildSession, NoopObserver, Phase, Verdict};
pub use scripts::run_script;
