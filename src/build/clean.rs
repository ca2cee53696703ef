//! Build artifact cleanup.
//!
//! - `cbuild clean` - Remove the selected profile's objects and fingerprints
//! - `cbuild clean --all` - Remove the whole temp dir and the executable

use crate::config::Settings;
use anyhow::{Context, Result};
use colored::*;
use std::fs;

/// Returns whether anything was removed.
pub fn clean(settings: &Settings, all: bool) -> Result<bool> {
    let mut cleaned = false;

    // 1. Profile intermediates (objects + files_hash)
    let profile_dir = settings.in_project(&settings.profile_dir());
    if profile_dir.exists() {
        fs::remove_dir_all(&profile_dir)
            .with_context(|| format!("Failed to remove {}", profile_dir.display()))?;
        println!("{} Removed {}", "🗑️".red(), settings.profile_dir().display());
        cleaned = true;
    }

    if all {
        // 2. Every profile
        let temp_dir = settings.in_project(&settings.temp_dir);
        if temp_dir.exists() {
            fs::remove_dir_all(&temp_dir)
                .with_context(|| format!("Failed to remove {}", temp_dir.display()))?;
            println!("{} Removed {}", "🗑️".red(), settings.temp_dir.display());
            cleaned = true;
        }

        // 3. Linked executable
        let exe = settings.in_project(&settings.exe_path);
        if exe.is_file() {
            fs::remove_file(&exe).with_context(|| format!("Failed to remove {}", exe.display()))?;
            println!("{} Removed {}", "🗑️".red(), settings.exe_path.display());
            cleaned = true;
        }
    }

    if cleaned {
        println!("{} Clean complete.", "✓".green());
    } else {
        println!("{} Nothing to clean", "!".yellow());
    }
    Ok(cleaned)
}
