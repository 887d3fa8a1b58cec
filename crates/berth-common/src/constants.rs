//! Defaults of the provisioning contract and well-known file names.

use std::path::{Path, PathBuf};

/// Environment variable the launched program resolves internal imports from.
pub const MODULE_PATH_VAR: &str = "PYTHONPATH";

/// File name `berth` looks for when no recipe path is given.
pub const DEFAULT_RECIPE_FILE: &str = "Berthfile";

/// Exclusion list read from the build context.
pub const IGNORE_FILE: &str = ".berthignore";

/// Name of the per-project state directory created next to the recipe.
pub const STATE_DIR_NAME: &str = ".berth";

/// Journal file name inside the state directory.
pub const STATE_FILE_NAME: &str = "state.json";

/// Environment variable set for installers so no local package cache is used.
pub const NO_CACHE_VAR: &str = "PIP_NO_CACHE_DIR";

/// Seconds a stopped service gets between SIGTERM and SIGKILL.
pub const STOP_GRACE_SECS: u64 = 5;

/// Recipe written by `berth init`.
pub const DEFAULT_RECIPE: &str = r#"FROM python:3.10-slim
WORKDIR /app
ENV PYTHONPATH=/app
COPY . .
RUN pip install --no-cache-dir -r requirements.txt
EXPOSE 5000
CMD ["python", "api/app.py"]
"#;

/// Returns the state directory for a recipe: `.berth/` next to the file.
#[must_use]
pub fn project_dir(recipe_path: &Path) -> PathBuf {
    recipe_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join(STATE_DIR_NAME)
}
