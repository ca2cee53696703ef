//! Compiler and linker command lines.

use crate::config::{CompilerStyle, Settings};
use crate::source::SourceFile;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Style-specific switch spellings.
#[derive(Debug, PartialEq, Eq)]
pub struct Switches {
    pub compile_only: &'static str,
    pub output_compiler: &'static str,
    pub output_linker: &'static str,
    pub object_extension: &'static str,
    pub include_path: &'static str,
    pub library_path: &'static str,
    pub library_name: &'static str,
    /// Empty when the toolchain has no such switch.
    pub force_colors: &'static str,
    /// msvc glues the output path onto the switch (`/Fofoo.obj`).
    pub joined_output: bool,
}

const GCC_SWITCHES: Switches = Switches {
    compile_only: "-c",
    output_compiler: "-o",
    output_linker: "-o",
    object_extension: "o",
    include_path: "-I",
    library_path: "-L",
    library_name: "-l",
    force_colors: "-fdiagnostics-color=always",
    joined_output: false,
};

const MSVC_SWITCHES: Switches = Switches {
    compile_only: "/c",
    output_compiler: "/Fo",
    output_linker: "/OUT:",
    object_extension: "obj",
    include_path: "/I",
    library_path: "/LIBPATH:",
    library_name: "",
    force_colors: "",
    joined_output: true,
};

impl Switches {
    pub fn for_style(style: CompilerStyle) -> &'static Switches {
        match style {
            CompilerStyle::Gcc | CompilerStyle::Clang => &GCC_SWITCHES,
            CompilerStyle::Msvc => &MSVC_SWITCHES,
        }
    }

    fn output(&self, switch: &str, path: &Path) -> Vec<String> {
        let path = path.to_string_lossy();
        if self.joined_output {
            vec![format!("{}{}", switch, path)]
        } else {
            vec![switch.to_string(), path.into_owned()]
        }
    }

    /// Output is captured through a pipe, so compilers default to plain
    /// text; colors are only ever forced on.
    pub fn color_switch(&self, colors: bool) -> Option<&'static str> {
        (colors && !self.force_colors.is_empty()).then_some(self.force_colors)
    }
}

/// Project-relative object path of `source` for the active profile.
pub fn object_path(settings: &Settings, source: &SourceFile) -> PathBuf {
    let switches = Switches::for_style(settings.style);
    settings
        .profile_dir()
        .join(source.object_name(switches.object_extension))
}

/// `compiler [colors] [compiler_args] [includes] -c -o obj src`
pub fn compile_argv(settings: &Settings, source: &SourceFile) -> Vec<String> {
    let switches = Switches::for_style(settings.style);
    let mut argv = vec![settings.compiler.clone()];

    if let Some(color) = switches.color_switch(settings.printing.colors) {
        argv.push(color.to_string());
    }
    argv.extend(settings.compiler_args.iter().cloned());
    argv.extend(
        settings
            .include_dirs
            .iter()
            .map(|dir| format!("{}{}", switches.include_path, dir)),
    );
    argv.push(switches.compile_only.to_string());
    argv.extend(switches.output(switches.output_compiler, &object_path(settings, source)));
    argv.push(source.path().to_string_lossy().into_owned());
    argv
}

/// `linker [linker_args] -o exe [library dirs] objects... [library names]`
pub fn link_argv(settings: &Settings, objects: &[PathBuf]) -> Vec<String> {
    let switches = Switches::for_style(settings.style);
    let mut argv = vec![settings.linker.clone()];

    argv.extend(settings.linker_args.iter().cloned());
    argv.extend(switches.output(switches.output_linker, &settings.exe_path));
    argv.extend(
        settings
            .library_dirs
            .iter()
            .map(|dir| format!("{}{}", switches.library_path, dir)),
    );
    argv.extend(objects.iter().map(|o| o.to_string_lossy().into_owned()));
    argv.extend(
        settings
            .library_names
            .iter()
            .map(|name| format!("{}{}", switches.library_name, name)),
    );
    argv
}

/// Every object currently present for the active profile, including those
/// left by earlier runs for units that were fresh this time.
pub fn collect_objects(settings: &Settings) -> Result<Vec<PathBuf>> {
    let switches = Switches::for_style(settings.style);
    let rel_dir = settings.profile_dir();
    let dir = settings.in_project(&rel_dir);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut objects = Vec::new();
    for entry in fs::read_dir(&dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        let is_object = path
            .extension()
            .is_some_and(|ext| ext == switches.object_extension);
        if is_object && entry.file_type()?.is_file() {
            objects.push(rel_dir.join(entry.file_name()));
        }
    }
    objects.sort();
    Ok(objects)
}
