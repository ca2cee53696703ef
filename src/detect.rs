//! Stale/fresh classification of translation units.
//!
//! A unit is stale when any member of its dependency closure (the unit plus
//! everything it includes, transitively) is new or has a different digest
//! than in the prior store. The verdict is binary; the members that changed
//! are only logged.

use crate::build::limiter::Limiter;
use crate::fingerprint::{CurrentFingerprints, FingerprintStore, path_key};
use crate::resolver::IncludeResolver;
use crate::source::SourceFile;
use rayon::prelude::*;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    Stale,
    Fresh,
}

impl Staleness {
    pub fn is_stale(&self) -> bool {
        matches!(self, Staleness::Stale)
    }
}

pub struct ChangeDetector<'a> {
    resolver: &'a dyn IncludeResolver,
    prior: &'a FingerprintStore,
    current: &'a CurrentFingerprints,
    limiter: &'a Limiter,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(
        resolver: &'a dyn IncludeResolver,
        prior: &'a FingerprintStore,
        current: &'a CurrentFingerprints,
        limiter: &'a Limiter,
    ) -> Self {
        Self {
            resolver,
            prior,
            current,
            limiter,
        }
    }

    /// Store keys of `{source} ∪ includes(source)`, deduplicated.
    /// `None` when the resolver could not process the unit.
    pub fn closure(&self, source: &SourceFile) -> Option<Vec<String>> {
        dependency_closure(self.resolver, self.limiter, source)
    }

    pub fn classify(&self, source: &SourceFile) -> Staleness {
        let Some(members) = self.closure(source) else {
            self.current.get_or_compute(&source.key());
            return Staleness::Stale;
        };

        // Walk the whole closure even after a hit so every member gets a
        // current digest recorded for the next run
        let mut changed = Vec::new();
        for member in &members {
            let now = self.current.get_or_compute(member);
            let unchanged = self
                .prior
                .get(member)
                .is_some_and(|before| before.matches(&now));
            if !unchanged {
                changed.push(member.as_str());
            }
        }

        if changed.is_empty() {
            tracing::debug!(source = %source.key(), members = members.len(), "fresh");
            Staleness::Fresh
        } else {
            tracing::debug!(source = %source.key(), ?changed, "stale");
            Staleness::Stale
        }
    }

    /// Classifies all `sources` concurrently and returns the stale ones in
    /// their original order.
    pub fn classify_all(&self, sources: &[SourceFile]) -> Vec<SourceFile> {
        let verdicts: Vec<Staleness> = sources.par_iter().map(|s| self.classify(s)).collect();
        sources
            .iter()
            .zip(verdicts)
            .filter(|(_, verdict)| verdict.is_stale())
            .map(|(source, _)| source.clone())
            .collect()
    }
}

/// Resolves the dependency closure of `source` while holding a limiter
/// permit, since resolution launches a process.
pub fn dependency_closure(
    resolver: &dyn IncludeResolver,
    limiter: &Limiter,
    source: &SourceFile,
) -> Option<Vec<String>> {
    let includes = {
        let _permit = limiter.acquire();
        resolver.resolve(&source.path())
    };

    match includes {
        Ok(paths) => {
            let own = source.key();
            let mut seen = BTreeSet::new();
            seen.insert(own.clone());
            let mut members = vec![own];
            for path in paths {
                let key = path_key(&path);
                if !key.is_empty() && seen.insert(key.clone()) {
                    members.push(key);
                }
            }
            Some(members)
        }
        Err(e) => {
            tracing::warn!(
                source = %source.key(),
                error = %e,
                "cannot resolve includes, rebuilding"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Concurrency;
    use crate::fingerprint::Fingerprint;
    use anyhow::{Result, bail};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    struct MapResolver(HashMap<String, Vec<PathBuf>>);

    impl IncludeResolver for MapResolver {
        fn resolve(&self, source: &Path) -> Result<Vec<PathBuf>> {
            match self.0.get(&path_key(source)) {
                Some(deps) => Ok(deps.clone()),
                None => bail!("no such unit"),
            }
        }
    }

    fn resolver(entries: Vec<(&str, Vec<&str>)>) -> MapResolver {
        MapResolver(
            entries
                .into_iter()
                .map(|(src, deps)| {
                    (src.to_string(), deps.into_iter().map(PathBuf::from).collect())
                })
                .collect(),
        )
    }

    fn store(entries: &[(&str, &str)]) -> FingerprintStore {
        let mut s = FingerprintStore::new();
        for (k, v) in entries {
            s.insert(k.to_string(), Fingerprint::from_hex(v));
        }
        s
    }

    fn current(entries: &[(&str, &str)]) -> CurrentFingerprints {
        let c = CurrentFingerprints::new(Path::new("/nonexistent-project-root"));
        for (k, v) in entries {
            c.record(k.to_string(), Fingerprint::from_hex(v));
        }
        c
    }

    fn unit(path: &str) -> SourceFile {
        SourceFile::from_path(Path::new(path)).unwrap()
    }

    #[test]
    fn test_changed_header_marks_source_stale() {
        let r = resolver(vec![("a.c", vec!["a.h"])]);
        let prior = store(&[("a.c", "H1"), ("a.h", "H2")]);
        let now = current(&[("a.c", "H1"), ("a.h", "H3")]);
        let limiter = Limiter::new(Concurrency::Unbounded);
        let detector = ChangeDetector::new(&r, &prior, &now, &limiter);
        assert_eq!(detector.classify(&unit("a.c")), Staleness::Stale);
    }

    #[test]
    fn test_unchanged_closure_is_fresh() {
        let r = resolver(vec![("a.c", vec!["a.h", "./a.h"])]);
        let prior = store(&[("a.c", "H1"), ("a.h", "H2")]);
        let now = current(&[("a.c", "H1"), ("a.h", "H2")]);
        let limiter = Limiter::new(Concurrency::Unbounded);
        let detector = ChangeDetector::new(&r, &prior, &now, &limiter);
        assert_eq!(detector.classify(&unit("a.c")), Staleness::Fresh);
        assert_eq!(detector.closure(&unit("a.c")).unwrap(), vec!["a.c", "a.h"]);
    }

    #[test]
    fn test_transitive_header_change() {
        // a.c -> a.h -> base.h; only base.h changed
        let r = resolver(vec![("src/a.c", vec!["include/a.h", "include/base.h"])]);
        let prior = store(&[("src/a.c", "1"), ("include/a.h", "2"), ("include/base.h", "3")]);
        let now = current(&[("src/a.c", "1"), ("include/a.h", "2"), ("include/base.h", "4")]);
        let limiter = Limiter::new(Concurrency::Unbounded);
        let detector = ChangeDetector::new(&r, &prior, &now, &limiter);
        assert!(detector.classify(&unit("src/a.c")).is_stale());
    }

    #[test]
    fn test_new_member_is_stale_and_recorded() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("b.c"), "int b;").unwrap();
        std::fs::write(tmp.path().join("new.h"), "#define X").unwrap();

        let r = resolver(vec![("b.c", vec!["new.h"])]);
        let prior = FingerprintStore::new();
        let now = CurrentFingerprints::new(tmp.path());
        let limiter = Limiter::new(Concurrency::Unbounded);
        let detector = ChangeDetector::new(&r, &prior, &now, &limiter);

        assert!(detector.classify(&unit("b.c")).is_stale());
        assert!(!now.get("b.c").unwrap().is_empty());
        assert!(!now.get("new.h").unwrap().is_empty());
    }

    #[test]
    fn test_resolution_failure_is_stale() {
        let r = resolver(vec![]);
        let prior = store(&[("lost.c", "1")]);
        let now = current(&[("lost.c", "1")]);
        let limiter = Limiter::new(Concurrency::Unbounded);
        let detector = ChangeDetector::new(&r, &prior, &now, &limiter);
        assert!(detector.classify(&unit("lost.c")).is_stale());
    }

    #[test]
    fn test_resolution_failure_records_own_digest() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("lost.c"), "int lost;").unwrap();

        let r = resolver(vec![]);
        let prior = FingerprintStore::new();
        let now = CurrentFingerprints::new(tmp.path());
        let limiter = Limiter::new(Concurrency::Unbounded);
        let detector = ChangeDetector::new(&r, &prior, &now, &limiter);

        assert!(detector.classify(&unit("lost.c")).is_stale());
        assert_eq!(now.get("lost.c"), Some(Fingerprint::of_bytes(b"int lost;")));
        assert_eq!(now.len(), 1);
    }

    #[test]
    fn test_empty_include_list_is_tolerated() {
        let r = resolver(vec![("solo.c", vec![])]);
        let prior = store(&[("solo.c", "1")]);
        let now = current(&[("solo.c", "1")]);
        let limiter = Limiter::new(Concurrency::Unbounded);
        let detector = ChangeDetector::new(&r, &prior, &now, &limiter);
        assert_eq!(detector.classify(&unit("solo.c")), Staleness::Fresh);
    }

    #[test]
    fn test_unreadable_member_forces_rebuild() {
        let r = resolver(vec![("a.c", vec!["gone.h"])]);
        let prior = store(&[("a.c", "1"), ("gone.h", "")]);
        let now = current(&[("a.c", "1"), ("gone.h", "")]);
        let limiter = Limiter::new(Concurrency::Unbounded);
        let detector = ChangeDetector::new(&r, &prior, &now, &limiter);
        assert!(detector.classify(&unit("a.c")).is_stale());
    }

    #[test]
    fn test_full_rebuild_marks_everything_stale() {
        let r = resolver(vec![
            ("a.c", vec!["a.h"]),
            ("b.c", vec![]),
            ("c.c", vec!["a.h"]),
        ]);
        let empty_prior = FingerprintStore::new();
        let now = current(&[("a.c", "1"), ("a.h", "2"), ("b.c", "3"), ("c.c", "4")]);
        let limiter = Limiter::new(Concurrency::Unbounded);
        let detector = ChangeDetector::new(&r, &empty_prior, &now, &limiter);
        let sources = vec![unit("a.c"), unit("b.c"), unit("c.c")];
        assert_eq!(detector.classify_all(&sources), sources);
    }

    #[test]
    fn test_classify_all_keeps_order_and_filters() {
        let r = resolver(vec![
            ("a.c", vec!["shared.h"]),
            ("b.c", vec![]),
            ("c.c", vec!["shared.h"]),
        ]);
        let prior = store(&[("a.c", "1"), ("b.c", "2"), ("c.c", "3"), ("shared.h", "old")]);
        let now = current(&[("a.c", "1"), ("b.c", "2"), ("c.c", "3"), ("shared.h", "new")]);
        let limiter = Limiter::new(Concurrency::Bounded(std::num::NonZeroUsize::new(2).unwrap()));
        let detector = ChangeDetector::new(&r, &prior, &now, &limiter);

        let stale = detector.classify_all(&[unit("a.c"), unit("b.c"), unit("c.c")]);
        assert_eq!(stale, vec![unit("a.c"), unit("c.c")]);
        assert!(limiter.peak() <= 2);
        assert_eq!(limiter.acquired(), 3);
    }
}
