//! Include-closure discovery.
//!
//! The change detector never parses C or C++ itself. It asks an
//! [`IncludeResolver`] for the files a unit pulls in and hashes those.
//! [`PreprocessorResolver`] shells out to the toolchain: `cpp -MM` for
//! gcc/clang style, `cl /Zs /showIncludes` for msvc style. The profile's
//! defines, include paths and forced includes are passed along so the
//! closure matches what the compiler will actually read.

use crate::build::command::Switches;
use crate::config::{CompilerStyle, Settings};
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::process::Command;

pub trait IncludeResolver: Sync {
    /// Every file `source` depends on through inclusion, directly or not.
    /// Order and duplicates do not matter; the caller deduplicates.
    fn resolve(&self, source: &Path) -> Result<Vec<PathBuf>>;
}

impl<F> IncludeResolver for F
where
    F: Fn(&Path) -> Result<Vec<PathBuf>> + Sync,
{
    fn resolve(&self, source: &Path) -> Result<Vec<PathBuf>> {
        self(source)
    }
}

/// Compiler switches that change which files the preprocessor reads.
/// Each entry is matched as a prefix; a bare entry takes the next argument.
const GCC_PREPROCESSOR_SWITCHES: &[&str] = &[
    "-D", "-U", "-I", "-include", "-imacros", "-isystem", "-iquote", "-idirafter",
    "-nostdinc", "-std=",
];
const MSVC_PREPROCESSOR_SWITCHES: &[&str] = &["/D", "/U", "/I", "/FI", "-D", "-U", "-I", "-FI"];

/// Keeps the switches of `compiler_args` that affect preprocessing, with
/// their separate value argument when they have one (`-D X`, `-include f`).
pub fn preprocessor_args(style: CompilerStyle, compiler_args: &[String]) -> Vec<String> {
    let switches = if style.uses_msvc_switches() {
        MSVC_PREPROCESSOR_SWITCHES
    } else {
        GCC_PREPROCESSOR_SWITCHES
    };
    let takes_value = |arg: &str| {
        !arg.ends_with('=') && arg != "-nostdinc" && switches.contains(&arg)
    };

    let mut kept = Vec::new();
    let mut args = compiler_args.iter();
    while let Some(arg) = args.next() {
        if !switches.iter().any(|sw| arg.starts_with(sw)) {
            continue;
        }
        kept.push(arg.clone());
        if takes_value(arg) {
            kept.extend(args.next().cloned());
        }
    }
    kept
}

pub struct PreprocessorResolver {
    program: String,
    style: CompilerStyle,
    args: Vec<String>,
    project_dir: PathBuf,
}

impl PreprocessorResolver {
    pub fn from_settings(settings: &Settings) -> Self {
        let switches = Switches::for_style(settings.style);
        let mut args = preprocessor_args(settings.style, &settings.compiler_args);
        args.extend(
            settings
                .include_dirs
                .iter()
                .map(|dir| format!("{}{}", switches.include_path, dir)),
        );
        Self {
            program: settings.preprocessor.clone(),
            style: settings.style,
            args,
            project_dir: settings.project_dir.clone(),
        }
    }

    /// `preprocessor [mode] [compiler_args subset] [includes] src`
    fn command(&self, source: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        if self.style.uses_msvc_switches() {
            cmd.args(["/nologo", "/Zs", "/showIncludes"]);
        } else {
            cmd.arg("-MM");
        }
        cmd.args(&self.args).arg(source).current_dir(&self.project_dir);
        cmd
    }

    /// Extracts the include list from the preprocessor's output. `cl` writes
    /// its `/showIncludes` notes to stderr, so both streams are scanned.
    fn parse_output(&self, stdout: &str, stderr: &str) -> Vec<PathBuf> {
        if self.style.uses_msvc_switches() {
            let mut deps = parse_show_includes(stdout);
            deps.extend(parse_show_includes(stderr));
            deps
        } else {
            parse_depfile(stdout)
        }
    }
}

impl IncludeResolver for PreprocessorResolver {
    fn resolve(&self, source: &Path) -> Result<Vec<PathBuf>> {
        let output = self
            .command(source)
            .output()
            .with_context(|| format!("Failed to execute '{}'", self.program))?;

        if !output.status.success() {
            bail!(
                "'{}' could not process {}: {}",
                self.program,
                source.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(self.parse_output(
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        ))
    }
}

/// Parses make-style dependency output (`obj.o: src.c a.h \` ...).
///
/// Line continuations are joined and `\ ` unescapes to a space. The target
/// separator is the first `:` followed by whitespace, so `C:\` drive
/// prefixes stay intact.
pub fn parse_depfile(text: &str) -> Vec<PathBuf> {
    let flat = text.replace("\\\r\n", " ").replace("\\\n", " ");
    let mut deps = Vec::new();

    for rule in flat.lines() {
        let Some(sep) = target_separator(rule) else {
            continue;
        };
        deps.extend(split_escaped(&rule[sep + 1..]).into_iter().map(PathBuf::from));
    }

    deps
}

fn target_separator(rule: &str) -> Option<usize> {
    let bytes = rule.as_bytes();
    bytes.iter().enumerate().find_map(|(i, &b)| {
        let next = bytes.get(i + 1);
        (b == b':' && next.is_none_or(|c| c.is_ascii_whitespace())).then_some(i)
    })
}

fn split_escaped(list: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = list.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&' ') => {
                current.push(' ');
                chars.next();
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    items.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        items.push(current);
    }
    items
}

/// Parses `cl /showIncludes` notes (`Note: including file:   C:\x\a.h`).
pub fn parse_show_includes(text: &str) -> Vec<PathBuf> {
    const MARKER: &str = "Note: including file:";
    text.lines()
        .filter_map(|line| {
            let idx = line.find(MARKER)?;
            let path = line[idx + MARKER.len()..].trim();
            (!path.is_empty()).then(|| PathBuf::from(path))
        })
        .collect()
}
