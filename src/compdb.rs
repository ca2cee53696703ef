//! `compile_commands.json` for editors and language servers.

use crate::build::command::{compile_argv, object_path};
use crate::config::Settings;
use crate::source::SourceFile;
use anyhow::{Context, Result};
use serde_json::json;
use std::fs;
use std::path::PathBuf;

pub const COMPDB_FILENAME: &str = "compile_commands.json";

pub fn entries(settings: &Settings, sources: &[SourceFile]) -> Vec<serde_json::Value> {
    let directory = fs::canonicalize(&settings.project_dir)
        .unwrap_or_else(|_| settings.project_dir.clone());
    let directory = directory.to_string_lossy();

    sources
        .iter()
        .map(|source| {
            json!({
                "directory": directory,
                "arguments": compile_argv(settings, source),
                "file": source.path().to_string_lossy(),
                "output": object_path(settings, source).to_string_lossy(),
            })
        })
        .collect()
}

/// Writes the database into the project directory and returns its path.
pub fn write(settings: &Settings, sources: &[SourceFile]) -> Result<PathBuf> {
    let path = settings.project_dir.join(COMPDB_FILENAME);
    let json_str = serde_json::to_string_pretty(&entries(settings, sources))?;
    fs::write(&path, json_str).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::debug!(entries = sources.len(), path = %path.display(), "wrote compilation database");
    Ok(path)
}
