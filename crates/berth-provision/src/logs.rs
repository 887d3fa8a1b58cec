//! Per-attempt provisioning logs.
//!
//! Each attempt writes to `<data_dir>/logs/<id>.log`: one line per step
//! transition plus the captured output of every installer command.

use std::io::Write;
use std::path::{Path, PathBuf};

use berth_common::error::{BerthError, Result};
use berth_common::types::ProvisionId;

/// Returns the log file path for a provisioning attempt.
#[must_use]
pub fn log_path(data_dir: &Path, id: &ProvisionId) -> PathBuf {
    data_dir.join("logs").join(format!("{id}.log"))
}

/// Reads an attempt's log from disk.
///
/// Returns an empty string if nothing has been logged yet.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_logs(data_dir: &Path, id: &ProvisionId) -> Result<String> {
    let path = log_path(data_dir, id);
    if !path.exists() {
        return Ok(String::new());
    }
    std::fs::read_to_string(&path).map_err(|e| BerthError::io(path, e))
}

/// Appends one line to an attempt's log.
///
/// Creates the log directory and file if they do not exist.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be created or written.
pub fn append_log(data_dir: &Path, id: &ProvisionId, line: &str) -> Result<()> {
    append_bytes(data_dir, id, format!("{line}\n").as_bytes())
}

/// Appends captured command output under a `[label]` prefix.
///
/// # Errors
///
/// Returns an error if the log cannot be written.
pub fn append_output(data_dir: &Path, id: &ProvisionId, label: &str, output: &[u8]) -> Result<()> {
    if output.is_empty() {
        return Ok(());
    }
    let text = String::from_utf8_lossy(output);
    let mut block = String::with_capacity(text.len() + 16);
    for line in text.lines() {
        block.push('[');
        block.push_str(label);
        block.push_str("] ");
        block.push_str(line);
        block.push('\n');
    }
    append_bytes(data_dir, id, block.as_bytes())
}

fn append_bytes(data_dir: &Path, id: &ProvisionId, bytes: &[u8]) -> Result<()> {
    let path = log_path(data_dir, id);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| BerthError::io(parent, e))?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| BerthError::io(&path, e))?;
    file.write_all(bytes).map_err(|e| BerthError::io(path, e))
}
