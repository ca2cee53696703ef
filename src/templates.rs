//! Starter `cbuild.toml` for `cbuild init`.

use anyhow::{Result, bail};
use std::fs;
use std::path::Path;

pub const STARTER_CONFIG: &str = r#"# cbuild project file

[compiler]
# gcc, clang or msvc: selects the switch spelling
style = "gcc"
compiler = "gcc"
# linker = "gcc"
# preprocessor = "cpp"

[directories]
project_dir = "."
exe_path = "bin/app"
include_dirs = ["include"]
source_dirs = ["src"]
temp_dir = "obj"

[profile.default]
compiler_args = "-g3 -Wall -Wextra"
linker_args = ""
library_dirs = []
library_names = []
scripts = { pre = "", post = "" }

[profile.release]
compiler_args = "-O2 -DNDEBUG -Wall"
"#;

/// Writes the starter config unless the file exists and `force` is off.
pub fn write_template(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    fs::write(path, STARTER_CONFIG)?;
    Ok(())
}
