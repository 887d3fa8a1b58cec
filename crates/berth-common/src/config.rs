//! Global configuration model for a Berth invocation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;

/// Root configuration shared by the provisioner and the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BerthConfig {
    /// Directory holding the journal and provisioning logs.
    pub data_dir: PathBuf,
    /// Host directory the recipe's absolute paths are mapped onto.
    ///
    /// `None` means paths are used as written (the in-container case).
    pub sysroot: Option<PathBuf>,
}

impl BerthConfig {
    /// Configuration whose state lives next to `recipe_path`.
    #[must_use]
    pub fn for_recipe(recipe_path: &Path) -> Self {
        Self {
            data_dir: constants::project_dir(recipe_path),
            sysroot: None,
        }
    }

    /// Path of the journal file.
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join(constants::STATE_FILE_NAME)
    }

    /// Maps a recipe path onto the host through the sysroot.
    ///
    /// Absolute paths are re-rooted under the sysroot; relative paths are
    /// returned unchanged.
    #[must_use]
    pub fn host_path(&self, declared: &Path) -> PathBuf {
        match &self.sysroot {
            Some(sysroot) if declared.is_absolute() => {
                let relative = declared.strip_prefix("/").unwrap_or(declared);
                sysroot.join(relative)
            }
            _ => declared.to_path_buf(),
        }
    }
}

impl Default for BerthConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(constants::STATE_DIR_NAME),
            sysroot: None,
        }
    }
}
