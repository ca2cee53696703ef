//! Translation units: enumeration and object-file naming.

use crate::config::Settings;
use crate::fingerprint::path_key;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions handed to the compiler. Matching is case-sensitive (`.C` is C++).
pub const SOURCE_EXTENSIONS: [&str; 7] = ["c", "cpp", "cxx", "c++", "cc", "C", "s"];

/// One translation unit, relative to the project directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceFile {
    dir: PathBuf,
    stem: String,
    ext: String,
}

impl SourceFile {
    /// Splits `path` into directory, base name and extension. Returns `None`
    /// for files the compiler should not see.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if !SOURCE_EXTENSIONS.contains(&ext) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        if stem.is_empty() {
            return None;
        }
        Some(Self {
            dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            stem: stem.to_string(),
            ext: ext.to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn extension(&self) -> &str {
        &self.ext
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.stem, self.ext))
    }

    /// Base name with extension, used as the job display name.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.stem, self.ext)
    }

    /// Fingerprint-store key of the file itself.
    pub fn key(&self) -> String {
        path_key(&self.path())
    }

    /// Object file name for this unit.
    ///
    /// The base name is kept for readability and suffixed with a digest of
    /// the full relative path, so `a/b/x.c` and `a_b/x.c` (or `ab/x.c`) never
    /// share an object. The result depends on nothing but the path.
    pub fn object_name(&self, object_ext: &str) -> String {
        let digest = Sha256::digest(self.key().as_bytes());
        let tag: String = digest
            .iter()
            .take(8)
            .map(|b| format!("{:02x}", b))
            .collect();
        format!("{}-{}.{}", self.stem, tag, object_ext)
    }
}

/// Walks every configured source directory and collects compilable files,
/// sorted so repeated runs see the same order.
pub fn discover(settings: &Settings) -> Vec<SourceFile> {
    let mut found = Vec::new();

    for dir in &settings.source_dirs {
        let root = settings.in_project(Path::new(dir));
        if !root.exists() {
            tracing::warn!(dir = %root.display(), "source directory does not exist");
            continue;
        }

        for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&settings.project_dir)
                .unwrap_or(entry.path());
            if let Some(source) = SourceFile::from_path(rel) {
                found.push(source);
            }
        }
    }

    found.sort();
    found.dedup();
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path_splits_components() {
        let src = SourceFile::from_path(Path::new("src/net/socket.cpp")).unwrap();
        assert_eq!(src.dir(), Path::new("src/net"));
        assert_eq!(src.stem(), "socket");
        assert_eq!(src.extension(), "cpp");
        assert_eq!(src.file_name(), "socket.cpp");
        assert_eq!(src.key(), "src/net/socket.cpp");
    }

    #[test]
    fn test_ignores_unknown_extensions() {
        assert!(SourceFile::from_path(Path::new("src/readme.md")).is_none());
        assert!(SourceFile::from_path(Path::new("include/util.h")).is_none());
        assert!(SourceFile::from_path(Path::new("src/Makefile")).is_none());
        // Case-sensitive: `.C` is C++, `.CPP` is not recognized
        assert!(SourceFile::from_path(Path::new("src/old.C")).is_some());
        assert!(SourceFile::from_path(Path::new("src/old.CPP")).is_none());
    }

    #[test]
    fn test_object_name_is_deterministic() {
        let a = SourceFile::from_path(Path::new("src/a/b/util.c")).unwrap();
        let again = SourceFile::from_path(Path::new("src/a/b/util.c")).unwrap();
        assert_eq!(a.object_name("o"), again.object_name("o"));
        assert!(a.object_name("o").starts_with("util-"));
        assert!(a.object_name("obj").ends_with(".obj"));
    }

    #[test]
    fn test_object_name_avoids_flattening_collisions() {
        // Both flatten to "srcab" + "util" when separators are dropped
        let nested = SourceFile::from_path(Path::new("src/a/b/util.c")).unwrap();
        let flat = SourceFile::from_path(Path::new("src/ab/util.c")).unwrap();
        assert_ne!(nested.object_name("o"), flat.object_name("o"));

        let c = SourceFile::from_path(Path::new("src/util.c")).unwrap();
        let cpp = SourceFile::from_path(Path::new("src/util.cpp")).unwrap();
        assert_ne!(c.object_name("o"), cpp.object_name("o"));
    }

    #[test]
    fn test_discover_walks_source_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("src/sub")).unwrap();
        std::fs::write(root.join("src/main.c"), "int main(){}").unwrap();
        std::fs::write(root.join("src/sub/x.cpp"), "").unwrap();
        std::fs::write(root.join("src/sub/notes.txt"), "").unwrap();

        let opts = crate::config::BuildOptions::default();
        let mut settings = crate::config::ProjectConfig::default()
            .resolve(root, &opts)
            .unwrap();
        settings.project_dir = root.to_path_buf();

        let found = discover(&settings);
        let keys: Vec<String> = found.iter().map(SourceFile::key).collect();
        assert_eq!(keys, vec!["src/main.c", "src/sub/x.cpp"]);
    }
}
