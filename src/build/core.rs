use super::job::JobRecord;
use super::limiter::Limiter;
use super::scheduler::{BuildObserver, BuildScheduler, BuildSession};
use super::scripts::run_script;
use crate::config::Settings;
use crate::detect::ChangeDetector;
use crate::fingerprint::{CurrentFingerprints, FINGERPRINT_FILENAME, FingerprintStore};
use crate::resolver::IncludeResolver;
use crate::source::{SourceFile, discover};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything one `build` invocation did.
#[derive(Debug)]
pub struct BuildOutcome {
    pub candidates: Vec<SourceFile>,
    pub pre_script: Option<Arc<JobRecord>>,
    /// `None` when the pre script failed or everything was up to date.
    pub session: Option<BuildSession>,
    pub post_script: Option<Arc<JobRecord>>,
    pub fingerprints_saved: bool,
}

impl BuildOutcome {
    fn aborted(pre_script: Arc<JobRecord>) -> Self {
        Self {
            candidates: Vec::new(),
            pre_script: Some(pre_script),
            session: None,
            post_script: None,
            fingerprints_saved: false,
        }
    }

    pub fn is_up_to_date(&self) -> bool {
        self.session.is_none() && self.pre_script.as_ref().is_none_or(|job| job.succeeded())
    }

    /// 0 ok, 1 pre script, 2 compile, 3 link, 4 post script.
    pub fn exit_code(&self) -> i32 {
        if self.pre_script.as_ref().is_some_and(|job| job.failed()) {
            return 1;
        }
        if let Some(session) = &self.session
            && !session.verdict.is_success()
        {
            return session.verdict.exit_code();
        }
        if self.post_script.as_ref().is_some_and(|job| job.failed()) {
            return 4;
        }
        0
    }
}

/// Fingerprint file of the selected profile.
pub fn fingerprint_path(settings: &Settings) -> PathBuf {
    settings
        .in_project(&settings.profile_dir())
        .join(FINGERPRINT_FILENAME)
}

/// pre script -> discover -> classify -> compile/link -> persist -> post script
pub fn build_project(
    settings: &Settings,
    resolver: &dyn IncludeResolver,
    observer: &mut dyn BuildObserver,
) -> Result<BuildOutcome> {
    let limiter = Limiter::new(settings.concurrency);

    // 1. Pre-build script
    let pre_script = match &settings.scripts.pre {
        Some(script) => {
            let job = run_script(script, settings, &limiter);
            observer.script_finished("pre", &job);
            if job.failed() {
                tracing::warn!(script = %script, "pre script failed, aborting build");
                return Ok(BuildOutcome::aborted(job));
            }
            Some(job)
        }
        None => None,
    };

    // 2. Candidates + prior digests
    let candidates = discover(settings);
    let store_path = fingerprint_path(settings);
    let prior = if settings.rebuild_all {
        FingerprintStore::new()
    } else {
        FingerprintStore::load(&store_path)?
    };
    tracing::debug!(
        candidates = candidates.len(),
        known = prior.len(),
        path = %store_path.display(),
        "loaded fingerprints"
    );

    // 3. Change detection
    let current = CurrentFingerprints::new(&settings.project_dir);
    let stale = ChangeDetector::new(resolver, &prior, &current, &limiter).classify_all(&candidates);
    tracing::info!(stale = stale.len(), total = candidates.len(), "change detection done");

    if stale.is_empty() {
        observer.up_to_date(candidates.len());
        return Ok(BuildOutcome {
            candidates,
            pre_script,
            session: None,
            post_script: None,
            fingerprints_saved: false,
        });
    }

    // 4. Compile, barrier, link
    let session = BuildScheduler::new(settings, &limiter).run(stale, observer)?;

    // 5. Persist only a fully successful build
    let fingerprints_saved = if session.verdict.is_success() {
        current.into_store().save(&store_path)?;
        true
    } else {
        false
    };

    // 6. Post-build script
    let post_script = if session.verdict.is_success()
        && let Some(script) = &settings.scripts.post
    {
        let job = run_script(script, settings, &limiter);
        observer.script_finished("post", &job);
        Some(job)
    } else {
        None
    };

    Ok(BuildOutcome {
        candidates,
        pre_script,
        session: Some(session),
        post_script,
        fingerprints_saved,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::build::scheduler::{NoopObserver, Verdict};
    use crate::config::{BuildOptions, ProjectConfig};
    use std::fs;
    use std::path::Path;

    /// Fake toolchain: `cc` copies the source to the `-o` target,
    /// failing when the source contains `#error`.
    const FAKE_CC: &str = r#"out=""; src=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    -c) shift ;;
    *) src="$1"; shift ;;
  esac
done
if grep -q '#error' "$src"; then echo "$src:1: error: boom" >&2; exit 1; fi
cp "$src" "$out"
"#;

    fn project(root: &Path) -> Settings {
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("cc.sh"), FAKE_CC).unwrap();
        let mut s = ProjectConfig::default()
            .resolve(root, &BuildOptions::default())
            .unwrap();
        s.project_dir = root.to_path_buf();
        s.printing.colors = false;
        s.compiler = "sh".into();
        s.compiler_args = vec!["cc.sh".into()];
        s.include_dirs = vec![];
        s.linker = "sh".into();
        s.linker_args = vec!["-c".into(), "touch app".into(), "link".into()];
        s.exe_path = "app".into();
        s
    }

    fn no_includes(_source: &Path) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    #[test]
    fn test_build_then_up_to_date() {
        let tmp = tempfile::tempdir().unwrap();
        let s = project(tmp.path());
        fs::write(tmp.path().join("src/main.c"), "int main;").unwrap();

        let first = build_project(&s, &no_includes, &mut NoopObserver).unwrap();
        assert_eq!(first.exit_code(), 0);
        assert!(first.fingerprints_saved);
        assert!(fingerprint_path(&s).exists());

        let second = build_project(&s, &no_includes, &mut NoopObserver).unwrap();
        assert!(second.is_up_to_date());
        assert_eq!(second.exit_code(), 0);
    }

    #[test]
    fn test_compile_failure_keeps_store() {
        let tmp = tempfile::tempdir().unwrap();
        let s = project(tmp.path());
        fs::write(tmp.path().join("src/bad.c"), "#error nope").unwrap();

        let outcome = build_project(&s, &no_includes, &mut NoopObserver).unwrap();
        assert_eq!(outcome.exit_code(), 2);
        assert!(!outcome.fingerprints_saved);
        assert!(!fingerprint_path(&s).exists());
        let session = outcome.session.unwrap();
        assert_eq!(session.verdict, Verdict::CompileFailed);
        assert!(session.link_job.is_none());
    }

    #[test]
    fn test_pre_script_failure_aborts() {
        let tmp = tempfile::tempdir().unwrap();
        let mut s = project(tmp.path());
        fs::write(tmp.path().join("src/main.c"), "int main;").unwrap();
        s.scripts.pre = Some("exit 3".into());

        let outcome = build_project(&s, &no_includes, &mut NoopObserver).unwrap();
        assert_eq!(outcome.exit_code(), 1);
        assert!(outcome.session.is_none());
        assert!(!outcome.is_up_to_date());
        assert!(!tmp.path().join("app").exists());
    }

    #[test]
    fn test_post_script_failure_exit_code() {
        let tmp = tempfile::tempdir().unwrap();
        let mut s = project(tmp.path());
        fs::write(tmp.path().join("src/main.c"), "int main;").unwrap();
        s.scripts.post = Some("exit 1".into());

        let outcome = build_project(&s, &no_includes, &mut NoopObserver).unwrap();
        assert_eq!(outcome.exit_code(), 4);
        // Digests are written before the post script runs
        assert!(outcome.fingerprints_saved);
    }

    #[test]
    fn test_rebuild_all_ignores_store() {
        let tmp = tempfile::tempdir().unwrap();
        let mut s = project(tmp.path());
        fs::write(tmp.path().join("src/main.c"), "int main;").unwrap();
        build_project(&s, &no_includes, &mut NoopObserver).unwrap();

        s.rebuild_all = true;
        let outcome = build_project(&s, &no_includes, &mut NoopObserver).unwrap();
        assert_eq!(outcome.session.unwrap().stale.len(), 1);
    }
}
