//! Project configuration (`cbuild.toml`).
//!
//! The file is parsed into a [`ProjectConfig`], then the selected profile is
//! layered over the `default` profile to produce one flat [`Settings`] value.
//! Nothing past this module reads the raw file: the change detector and the
//! scheduler only ever receive an already-resolved `Settings`.
//!
//! ```toml
//! [compiler]
//! style = "gcc"
//! compiler = "gcc"
//!
//! [directories]
//! exe_path = "bin/app"
//! include_dirs = ["include"]
//! source_dirs = ["src"]
//! temp_dir = "obj"
//!
//! [profile.default]
//! compiler_args = "-g3"
//! library_names = ["m"]
//!
//! [profile.release]
//! compiler_args = "-O2"
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const CONFIG_FILENAME: &str = "cbuild.toml";
pub const DEFAULT_PROFILE: &str = "default";
pub const DEFAULT_THREADS: i64 = 12;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{} not found", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("unknown compiler style '{0}' (expected gcc, clang or msvc)")]
    UnknownStyle(String),

    #[error("invalid concurrency limit {0} (use a positive number, or -1 for unbounded)")]
    InvalidConcurrency(i64),

    #[error("'{field}' must not be empty")]
    Empty { field: &'static str },
}

/// Which family of command-line switches the toolchain understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerStyle {
    Gcc,
    Clang,
    Msvc,
}

impl CompilerStyle {
    pub fn uses_msvc_switches(&self) -> bool {
        matches!(self, CompilerStyle::Msvc)
    }
}

impl FromStr for CompilerStyle {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gcc" => Ok(CompilerStyle::Gcc),
            "clang" => Ok(CompilerStyle::Clang),
            "msvc" | "cl" => Ok(CompilerStyle::Msvc),
            _ => Err(ConfigError::UnknownStyle(s.to_string())),
        }
    }
}

impl fmt::Display for CompilerStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompilerStyle::Gcc => "gcc",
            CompilerStyle::Clang => "clang",
            CompilerStyle::Msvc => "msvc",
        };
        f.write_str(name)
    }
}

/// Upper bound on simultaneously running external processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    Bounded(NonZeroUsize),
    Unbounded,
}

impl Concurrency {
    /// `-1` selects unbounded; any other value must be positive.
    pub fn from_limit(n: i64) -> Result<Self, ConfigError> {
        if n == -1 {
            return Ok(Concurrency::Unbounded);
        }
        usize::try_from(n)
            .ok()
            .and_then(NonZeroUsize::new)
            .map(Concurrency::Bounded)
            .ok_or(ConfigError::InvalidConcurrency(n))
    }

    pub fn limit(&self) -> Option<usize> {
        match self {
            Concurrency::Bounded(n) => Some(n.get()),
            Concurrency::Unbounded => None,
        }
    }
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Concurrency::Bounded(n) => write!(f, "{}", n),
            Concurrency::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// Which job reports are printed after a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFilter {
    #[default]
    ShowAll,
    /// Hide reports with no captured output at all.
    SkipEmpty,
    /// Only show reports of failed jobs.
    SkipWarnings,
    SkipAll,
}

/// How much live progress is drawn while jobs run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressMode {
    #[default]
    Full,
    /// Only finished units are listed.
    FinishedOnly,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintOptions {
    pub reports: ReportFilter,
    pub progress: ProgressMode,
    pub colors: bool,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            reports: ReportFilter::default(),
            progress: ProgressMode::default(),
            colors: true,
        }
    }
}

/// Options supplied on the command line rather than in the project file.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub profile: String,
    pub threads: i64,
    pub rebuild_all: bool,
    pub printing: PrintOptions,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            profile: DEFAULT_PROFILE.to_string(),
            threads: DEFAULT_THREADS,
            rebuild_all: false,
            printing: PrintOptions::default(),
        }
    }
}

/// Compiler or linker arguments, written either as one string or as a list.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ArgList {
    Line(String),
    List(Vec<String>),
}

impl ArgList {
    pub fn to_args(&self) -> Vec<String> {
        match self {
            ArgList::Line(line) => line.split_whitespace().map(str::to_string).collect(),
            ArgList::List(items) => items
                .iter()
                .filter(|s| !s.trim().is_empty())
                .cloned()
                .collect(),
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct ScriptsConfig {
    pub pre: Option<String>,
    pub post: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct ProfileConfig {
    pub compiler_args: Option<ArgList>,
    pub linker_args: Option<ArgList>,
    pub library_dirs: Option<Vec<String>>,
    pub library_names: Option<Vec<String>>,
    pub scripts: Option<ScriptsConfig>,
}

impl ProfileConfig {
    /// Fields set in `self` win; anything left unset falls back to `base`.
    pub fn layered_over(&self, base: &ProfileConfig) -> ProfileConfig {
        let scripts = match (&self.scripts, &base.scripts) {
            (Some(own), Some(inherited)) => Some(ScriptsConfig {
                pre: own.pre.clone().or_else(|| inherited.pre.clone()),
                post: own.post.clone().or_else(|| inherited.post.clone()),
            }),
            (own, inherited) => own.clone().or_else(|| inherited.clone()),
        };

        ProfileConfig {
            compiler_args: self
                .compiler_args
                .clone()
                .or_else(|| base.compiler_args.clone()),
            linker_args: self.linker_args.clone().or_else(|| base.linker_args.clone()),
            library_dirs: self
                .library_dirs
                .clone()
                .or_else(|| base.library_dirs.clone()),
            library_names: self
                .library_names
                .clone()
                .or_else(|| base.library_names.clone()),
            scripts,
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct CompilerSection {
    pub style: Option<String>,
    pub compiler: Option<String>,
    pub linker: Option<String>,
    pub preprocessor: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct DirectoriesSection {
    pub project_dir: Option<String>,
    pub exe_path: Option<String>,
    pub include_dirs: Option<Vec<String>>,
    pub source_dirs: Option<Vec<String>>,
    pub temp_dir: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct ProjectConfig {
    #[serde(default)]
    pub compiler: CompilerSection,
    #[serde(default)]
    pub directories: DirectoriesSection,
    #[serde(default, rename = "profile")]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

impl ProjectConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Profile names declared in the file, `default` included.
    pub fn profile_names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    /// Merges the selected profile over `default` and fills every remaining
    /// gap with its built-in default. `config_dir` anchors `project_dir`.
    pub fn resolve(&self, config_dir: &Path, opts: &BuildOptions) -> Result<Settings, ConfigError> {
        if opts.profile.trim().is_empty() {
            return Err(ConfigError::Empty { field: "profile" });
        }

        let style = match &self.compiler.style {
            Some(s) => s.parse()?,
            None => CompilerStyle::Gcc,
        };
        let compiler = self
            .compiler
            .compiler
            .clone()
            .unwrap_or_else(|| "gcc".to_string());
        if compiler.trim().is_empty() {
            return Err(ConfigError::Empty { field: "compiler" });
        }
        let linker = self
            .compiler
            .linker
            .clone()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| compiler.clone());
        let preprocessor = self
            .compiler
            .preprocessor
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| {
                if style.uses_msvc_switches() {
                    compiler.clone()
                } else {
                    "cpp".to_string()
                }
            });

        let dirs = &self.directories;
        let project_dir = config_dir.join(dirs.project_dir.as_deref().unwrap_or("."));
        let exe_path = PathBuf::from(dirs.exe_path.as_deref().unwrap_or("a.out"));
        let temp_dir = PathBuf::from(dirs.temp_dir.as_deref().unwrap_or("obj"));
        if temp_dir.as_os_str().is_empty() {
            return Err(ConfigError::Empty { field: "temp_dir" });
        }

        let empty = ProfileConfig::default();
        let defaults = self.profiles.get(DEFAULT_PROFILE).unwrap_or(&empty);
        let selected = self.profiles.get(&opts.profile).unwrap_or(&empty);
        let profile = selected.layered_over(defaults);
        let scripts = profile.scripts.clone().unwrap_or_default();

        Ok(Settings {
            project_dir,
            style,
            compiler,
            linker,
            preprocessor,
            compiler_args: profile
                .compiler_args
                .as_ref()
                .map(ArgList::to_args)
                .unwrap_or_default(),
            linker_args: profile
                .linker_args
                .as_ref()
                .map(ArgList::to_args)
                .unwrap_or_default(),
            include_dirs: dirs
                .include_dirs
                .clone()
                .unwrap_or_else(|| vec!["include".to_string()]),
            source_dirs: dirs
                .source_dirs
                .clone()
                .unwrap_or_else(|| vec!["src".to_string()]),
            library_dirs: profile.library_dirs.unwrap_or_default(),
            library_names: profile.library_names.unwrap_or_default(),
            temp_dir,
            exe_path,
            profile: opts.profile.clone(),
            concurrency: Concurrency::from_limit(opts.threads)?,
            scripts: Scripts {
                pre: scripts.pre.filter(|s| !s.trim().is_empty()),
                post: scripts.post.filter(|s| !s.trim().is_empty()),
            },
            printing: opts.printing,
            rebuild_all: opts.rebuild_all,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scripts {
    pub pre: Option<String>,
    pub post: Option<String>,
}

/// Fully resolved, immutable build settings for one invocation.
///
/// Paths other than `project_dir` are relative to `project_dir`; commands are
/// run from there, so they also appear relative in job command lines.
#[derive(Debug, Clone)]
pub struct Settings {
    pub project_dir: PathBuf,
    pub style: CompilerStyle,
    pub compiler: String,
    pub linker: String,
    pub preprocessor: String,
    pub compiler_args: Vec<String>,
    pub linker_args: Vec<String>,
    pub include_dirs: Vec<String>,
    pub source_dirs: Vec<String>,
    pub library_dirs: Vec<String>,
    pub library_names: Vec<String>,
    pub temp_dir: PathBuf,
    pub exe_path: PathBuf,
    pub profile: String,
    pub concurrency: Concurrency,
    pub scripts: Scripts,
    pub printing: PrintOptions,
    pub rebuild_all: bool,
}

impl Settings {
    /// Per-profile intermediate directory, relative to the project.
    pub fn profile_dir(&self) -> PathBuf {
        self.temp_dir.join(&self.profile)
    }

    /// Resolves a project-relative path against the project directory.
    pub fn in_project(&self, rel: &Path) -> PathBuf {
        self.project_dir.join(rel)
    }
}
