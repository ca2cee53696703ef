//! Pre/post build scripts.
//!
//! `*.rhai` scripts run in an embedded Rhai engine. A name that points at a
//! file in the project directory is executed directly (`./gen.sh`); anything
//! else is handed to the platform shell. Every run produces a regular
//! [`JobRecord`] so it shows up in reports like compile and link jobs.

use super::job::{JobKind, JobOutput, JobRecord};
use super::limiter::Limiter;
use crate::config::Settings;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

pub fn run_script(script: &str, settings: &Settings, limiter: &Limiter) -> Arc<JobRecord> {
    let project_dir = &settings.project_dir;
    let script_path = project_dir.join(script);

    if script.ends_with(".rhai") && script_path.is_file() {
        let _permit = limiter.acquire();
        return Arc::new(run_rhai(script, &script_path));
    }

    let argv = if script_path.is_file() {
        vec![local_command(script)]
    } else if cfg!(target_os = "windows") {
        vec!["cmd".to_string(), "/C".to_string(), script.to_string()]
    } else {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    };

    let job = JobRecord::new(JobKind::Script, script, argv);
    let _permit = limiter.acquire();
    job.execute(project_dir);
    Arc::new(job)
}

/// `gen.sh` -> `./gen.sh`, so the OS does not search `PATH` for it.
fn local_command(script: &str) -> String {
    let path = Path::new(script);
    if path.is_absolute() || script.starts_with("./") || script.starts_with(".\\") {
        script.to_string()
    } else {
        format!("./{}", script)
    }
}

fn run_rhai(name: &str, path: &Path) -> JobRecord {
    let job = JobRecord::new(JobKind::Script, name, vec![format!("rhai {}", name)]);
    job.start();
    let started = Instant::now();

    let printed = Arc::new(Mutex::new(String::new()));
    let mut engine = rhai::Engine::new();
    {
        let printed = Arc::clone(&printed);
        engine.on_print(move |line| {
            let mut buf = printed.lock().unwrap_or_else(PoisonError::into_inner);
            buf.push_str(line);
            buf.push('\n');
        });
    }

    let result = engine.run_file(path.to_path_buf());
    let stdout = printed
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();

    match result {
        Ok(()) => job.complete(
            true,
            JobOutput {
                stdout,
                exit_code: Some(0),
                duration: started.elapsed(),
                ..Default::default()
            },
        ),
        Err(e) => job.complete(
            false,
            JobOutput {
                stdout,
                stderr: format!("Rhai script failed: {}", e),
                exit_code: None,
                duration: started.elapsed(),
            },
        ),
    }
    job
}
