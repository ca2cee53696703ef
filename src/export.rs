//! `cbuild export`: a standalone Makefile for the project.
//!
//! Every object gets its own rule whose prerequisites are the unit's include
//! closure, so `make` rebuilds on header edits just like `cbuild build`.
//! Objects go to `<temp_dir>/<profile>/` with the same names cbuild uses,
//! which means `make release` and `cbuild build -p release` share artifacts.

use crate::build::Limiter;
use crate::build::command::{Switches, object_path};
use crate::config::{BuildOptions, DEFAULT_PROFILE, ProjectConfig, Settings};
use crate::detect::dependency_closure;
use crate::resolver::IncludeResolver;
use crate::source::{SourceFile, discover};
use anyhow::{Context, Result, bail};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub const MAKEFILE_NAME: &str = "Makefile";

/// Include closure per source key, without the source itself.
pub type HeaderMap = BTreeMap<String, Vec<String>>;

fn escape(path: &str) -> String {
    path.replace('$', "$$").replace(' ', "\\ ")
}

fn var_prefix(profile: &str) -> String {
    profile.to_uppercase().replace(|c: char| !c.is_ascii_alphanumeric(), "_")
}

fn script_recipe(script: &str, project_dir: &Path) -> String {
    if script.ends_with(".rhai") {
        format!("@echo \"{} only runs under cbuild\"", script)
    } else if project_dir.join(script).is_file() {
        format!("./{}", script.trim_start_matches("./"))
    } else {
        script.to_string()
    }
}

/// Renders the Makefile. `profiles` must share everything but the
/// per-profile fields, which holds for settings resolved from one file.
pub fn render_makefile(
    profiles: &[Settings],
    sources: &[SourceFile],
    headers: &HeaderMap,
) -> String {
    let mut mk = String::new();
    let Some(base) = profiles.first() else {
        return mk;
    };
    let switches = Switches::for_style(base.style);
    let includes: Vec<String> = base
        .include_dirs
        .iter()
        .map(|dir| format!("{}{}", switches.include_path, dir))
        .collect();

    let _ = writeln!(mk, "# Generated by cbuild export\n");
    let _ = writeln!(mk, "CC       = {}", base.compiler);
    let _ = writeln!(mk, "LD       = {}", base.linker);
    let _ = writeln!(mk, "BINNAME  = {}", escape(&base.exe_path.to_string_lossy()));
    let _ = writeln!(mk, "OBJSDIR  = {}", escape(&base.temp_dir.to_string_lossy()));
    let _ = writeln!(mk, "INCLUDES = {}", includes.join(" "));
    let _ = writeln!(mk);
    let _ = writeln!(mk, "all: {}\n", base.profile);

    let output_flag = if switches.joined_output {
        format!("{}$@", switches.output_compiler)
    } else {
        format!("{} $@", switches.output_compiler)
    };
    let link_output = if switches.joined_output {
        format!("{}$(BINNAME)", switches.output_linker)
    } else {
        format!("{} $(BINNAME)", switches.output_linker)
    };

    let mut phony = vec!["all".to_string(), "clean".to_string()];

    for settings in profiles {
        let name = &settings.profile;
        let var = var_prefix(name);
        let _ = writeln!(mk, "# --- {} ---\n", name);
        let _ = writeln!(mk, "{}-CARGS    = {}", var, settings.compiler_args.join(" "));
        let _ = writeln!(mk, "{}-LARGS    = {}", var, settings.linker_args.join(" "));
        let lib_dirs: Vec<String> = settings
            .library_dirs
            .iter()
            .map(|d| format!("{}{}", switches.library_path, d))
            .collect();
        let lib_names: Vec<String> = settings
            .library_names
            .iter()
            .map(|n| format!("{}{}", switches.library_name, n))
            .collect();
        let _ = writeln!(mk, "{}-LIBPATH  = {}", var, lib_dirs.join(" "));
        let _ = writeln!(mk, "{}-LIBNAMES = {}", var, lib_names.join(" "));
        let _ = writeln!(mk);

        let objects: Vec<String> = sources
            .iter()
            .map(|s| escape(&object_path(settings, s).to_string_lossy()))
            .collect();
        let _ = write!(mk, "{}-OBJS =", var);
        for obj in &objects {
            let _ = write!(mk, " \\\n\t{}", obj);
        }
        let _ = writeln!(mk, "\n");

        let obj_dir = escape(&settings.profile_dir().to_string_lossy());
        for (source, obj) in sources.iter().zip(&objects) {
            let src = escape(&source.key());
            let mut prereqs = vec![src.clone()];
            if let Some(deps) = headers.get(&source.key()) {
                prereqs.extend(deps.iter().map(|d| escape(d)));
            }
            let _ = writeln!(mk, "{}: {}", obj, prereqs.join(" "));
            let _ = writeln!(mk, "\t@mkdir -p {}", obj_dir);
            let _ = writeln!(
                mk,
                "\t$(CC) $({}-CARGS) $(INCLUDES) {} {} {}\n",
                var, switches.compile_only, output_flag, src
            );
        }

        let _ = writeln!(mk, "{}-link: $({}-OBJS)", name, var);
        let _ = writeln!(
            mk,
            "\t$(LD) $({v}-LARGS) {} $({v}-LIBPATH) $({v}-OBJS) $({v}-LIBNAMES)\n",
            link_output,
            v = var
        );
        phony.push(format!("{}-link", name));

        let mut steps = Vec::new();
        if let Some(pre) = &settings.scripts.pre {
            let recipe = script_recipe(pre, &settings.project_dir);
            let _ = writeln!(mk, "{}-pre:\n\t{}\n", name, recipe);
            phony.push(format!("{}-pre", name));
            steps.push(format!("{}-pre", name));
        }
        steps.push(format!("{}-link", name));
        if let Some(post) = &settings.scripts.post {
            let recipe = script_recipe(post, &settings.project_dir);
            let _ = writeln!(mk, "{}-post:\n\t{}\n", name, recipe);
            phony.push(format!("{}-post", name));
            steps.push(format!("{}-post", name));
        }

        // Sequential sub-makes keep pre -> link -> post ordered under -j
        let _ = writeln!(mk, "{}:", name);
        for step in &steps {
            let _ = writeln!(mk, "\t$(MAKE) {}", step);
        }
        let _ = writeln!(mk);
        phony.push(name.clone());
    }

    let _ = writeln!(mk, "# --- clean ---\n");
    let _ = writeln!(mk, "clean:\n\trm -rf $(OBJSDIR)\n\trm -f $(BINNAME)\n");
    let _ = writeln!(mk, ".PHONY: {}", phony.join(" "));
    mk
}

/// Resolves every declared profile, computes include closures and writes
/// `Makefile` into the project directory.
pub fn export(
    config: &ProjectConfig,
    config_dir: &Path,
    resolver: &dyn IncludeResolver,
    opts: &BuildOptions,
) -> Result<PathBuf> {
    let mut names = config.profile_names();
    if names.is_empty() {
        names.push(DEFAULT_PROFILE.to_string());
    } else if let Some(pos) = names.iter().position(|n| n == DEFAULT_PROFILE) {
        // `default` is the first goal
        let default = names.remove(pos);
        names.insert(0, default);
    }

    let profiles = names
        .iter()
        .map(|name| {
            let opts = BuildOptions {
                profile: name.clone(),
                ..opts.clone()
            };
            config.resolve(config_dir, &opts)
        })
        .collect::<Result<Vec<_>, _>>()?;
    let Some(base) = profiles.first() else {
        bail!("no profiles to export");
    };

    let sources = discover(base);
    let limiter = Limiter::new(base.concurrency);
    let headers: HeaderMap = sources
        .par_iter()
        .map(|source| {
            let deps = dependency_closure(resolver, &limiter, source)
                .map(|members| members.into_iter().skip(1).collect())
                .unwrap_or_default();
            (source.key(), deps)
        })
        .collect();

    let path = base.project_dir.join(MAKEFILE_NAME);
    fs::write(&path, render_makefile(&profiles, &sources, &headers))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!(profiles = profiles.len(), sources = sources.len(), "exported Makefile");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerStyle;

    const CONFIG: &str = r#"
[directories]
exe_path = "bin/app"

[profile.default]
compiler_args = "-g"
library_names = ["m"]
scripts = { pre = "echo pre" }

[profile.release]
compiler_args = "-O2"
"#;

    fn profiles(root: &Path) -> Vec<Settings> {
        let config: ProjectConfig = toml::from_str(CONFIG).unwrap();
        ["default", "release"]
            .iter()
            .map(|p| {
                let opts = BuildOptions {
                    profile: p.to_string(),
                    ..Default::default()
                };
                config.resolve(root, &opts).unwrap()
            })
            .collect()
    }

    fn sources() -> Vec<SourceFile> {
        vec![
            SourceFile::from_path(Path::new("src/main.c")).unwrap(),
            SourceFile::from_path(Path::new("src/util.c")).unwrap(),
        ]
    }

    #[test]
    fn test_object_rules_list_headers() {
        let profiles = profiles(Path::new("."));
        let mut headers = HeaderMap::new();
        headers.insert("src/main.c".into(), vec!["include/util.h".into()]);
        let mk = render_makefile(&profiles, &sources(), &headers);

        let main_obj = object_path(&profiles[0], &sources()[0]);
        let rule = format!("{}: src/main.c include/util.h", main_obj.display());
        assert!(mk.contains(&rule), "{}", mk);
        assert!(mk.contains("\t$(CC) $(DEFAULT-CARGS) $(INCLUDES) -c -o $@ src/main.c"));
        assert!(mk.contains("RELEASE-CARGS    = -O2"));
        assert!(mk.contains("DEFAULT-LIBNAMES = -lm"));
    }

    #[test]
    fn test_profile_targets_and_scripts() {
        let mk = render_makefile(&profiles(Path::new(".")), &sources(), &HeaderMap::new());
        assert!(mk.starts_with("# Generated by cbuild export"));
        assert!(mk.contains("all: default\n"));
        assert!(mk.contains("default-pre:\n\techo pre\n"));
        assert!(mk.contains("default:\n\t$(MAKE) default-pre\n\t$(MAKE) default-link\n"));
        // Profiles inherit scripts from default
        assert!(mk.contains("release:\n\t$(MAKE) release-pre\n\t$(MAKE) release-link\n"));
        assert!(mk.contains("$(LD) $(DEFAULT-LARGS) -o $(BINNAME)"));
        assert!(mk.contains(".PHONY: all clean default-link default-pre default release-link release-pre release"));
    }

    #[test]
    fn test_msvc_switch_spelling() {
        let mut profiles = profiles(Path::new("."));
        for p in &mut profiles {
            p.style = CompilerStyle::Msvc;
        }
        let mk = render_makefile(&profiles, &sources(), &HeaderMap::new());
        assert!(mk.contains("/c /Fo$@ src/main.c"));
        assert!(mk.contains("/OUT:$(BINNAME)"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("my dir/a.c"), "my\\ dir/a.c");
        assert_eq!(var_prefix("rel-with.debug"), "REL_WITH_DEBUG");
    }

    #[test]
    fn test_export_writes_makefile() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("src")).unwrap();
        fs::write(tmp.path().join("src/main.c"), "int main(){}").unwrap();
        let config: ProjectConfig = toml::from_str(CONFIG).unwrap();
        let resolver =
            |_: &Path| -> Result<Vec<PathBuf>> { Ok(vec![PathBuf::from("include/a.h")]) };

        let path = export(&config, tmp.path(), &resolver, &BuildOptions::default()).unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains("src/main.c include/a.h"));
    }
}
