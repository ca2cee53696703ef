//! Content fingerprints and their persisted store.
//!
//! The store lives at `<temp_dir>/<profile>/files_hash`, one `path:digest`
//! line per file. It is only ever rewritten after a fully successful build,
//! so whatever is on disk describes sources that produced a working binary.

use anyhow::{Context, Result};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

pub const FINGERPRINT_FILENAME: &str = "files_hash";

/// Hex SHA-256 of a file's bytes.
///
/// The empty fingerprint stands for "unknown" (unreadable file, unresolved
/// unit). It never matches anything, including another empty fingerprint,
/// so unknown always means rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn from_hex(hex: &str) -> Self {
        Self(hex.trim().to_string())
    }

    pub fn of_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }

    /// Hashes the file at `path`; read failures degrade to [`Fingerprint::empty`].
    pub fn of_file(path: &Path) -> Self {
        match fs::read(path) {
            Ok(bytes) => Self::of_bytes(&bytes),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot hash file");
                Self::empty()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, other: &Fingerprint) -> bool {
        !self.is_empty() && self == other
    }
}

/// Canonical store key for a path: `.` components dropped, `/` separators.
pub fn path_key(path: &Path) -> String {
    let cleaned: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    cleaned.to_string_lossy().replace('\\', "/")
}

/// Path → fingerprint mapping, ordered so the rendered file is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerprintStore {
    entries: BTreeMap<String, Fingerprint>,
}

impl FingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the persisted store. A missing file is simply "no prior state".
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read fingerprints from {}", path.display()))?;
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Self {
        let mut store = Self::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            // Digests are hex, so the last ':' always separates key and digest
            match line.rsplit_once(':') {
                Some((key, digest)) if !key.is_empty() => {
                    store.insert(key.to_string(), Fingerprint::from_hex(digest));
                }
                _ => tracing::warn!(line, "skipping malformed fingerprint line"),
            }
        }
        store
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, fp) in &self.entries {
            out.push_str(key);
            out.push(':');
            out.push_str(fp.as_str());
            out.push('\n');
        }
        out
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, self.render())
            .with_context(|| format!("Failed to write fingerprints to {}", path.display()))
    }

    pub fn get(&self, key: &str) -> Option<&Fingerprint> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: String, fp: Fingerprint) {
        self.entries.insert(key, fp);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Fingerprint)> {
        self.entries.iter()
    }
}

/// Fingerprints computed during this run, shared by concurrent classifiers.
///
/// Each file is hashed at most once per run; concurrent lookups of the same
/// key may both hash, but the first insert wins and both see the same value.
#[derive(Debug)]
pub struct CurrentFingerprints {
    root: PathBuf,
    map: DashMap<String, Fingerprint>,
}

impl CurrentFingerprints {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            map: DashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Fingerprint> {
        self.map.get(key).map(|fp| fp.value().clone())
    }

    pub fn record(&self, key: String, fp: Fingerprint) {
        self.map.insert(key, fp);
    }

    /// Returns the fingerprint for `key`, hashing the file on first use.
    pub fn get_or_compute(&self, key: &str) -> Fingerprint {
        if let Some(fp) = self.get(key) {
            return fp;
        }
        // Hash outside the shard lock; racing writers agree on the first value
        let fp = Fingerprint::of_file(&self.root.join(key));
        self.map.entry(key.to_string()).or_insert(fp).value().clone()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Freezes into a store, dropping unknown (empty) fingerprints.
    pub fn into_store(self) -> FingerprintStore {
        let mut store = FingerprintStore::new();
        for (key, fp) in self.map {
            if !fp.is_empty() {
                store.insert(key, fp);
            }
        }
        store
    }
}
