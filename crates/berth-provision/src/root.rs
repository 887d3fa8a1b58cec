//! Establishing and populating the service root.
//!
//! The root is created once, then filled from the build context. Any error
//! while walking or copying the context aborts the step: there is no
//! partial-success mode.

use std::fs;
use std::path::{Component, Path, PathBuf};

use berth_common::config::BerthConfig;
use berth_common::constants::{IGNORE_FILE, STATE_DIR_NAME};
use berth_common::error::{BerthError, Result};
use berth_recipe::CopySpec;
use walkdir::WalkDir;

/// Totals from populating the root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    /// Regular files copied.
    pub files: u64,
    /// Bytes copied.
    pub bytes: u64,
}

/// Creates the root directory and returns its absolute host path.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the path exists
/// but is not a directory.
pub fn establish_root(config: &BerthConfig, workdir: &Path) -> Result<PathBuf> {
    let host = config.host_path(workdir);
    let root = std::path::absolute(&host).map_err(|e| BerthError::io(&host, e))?;
    fs::create_dir_all(&root).map_err(|e| BerthError::io(&root, e))?;
    if !root.is_dir() {
        return Err(BerthError::Config {
            message: format!("root {} is not a directory", root.display()),
        });
    }
    tracing::info!(root = %root.display(), "root established");
    Ok(root)
}

/// Exclusion rules read from the context's ignore file.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<String>,
}

impl IgnoreRules {
    /// Parses ignore-file text: one pattern per line, `#` comments.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let patterns = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| l.trim_start_matches("./").to_string())
            .collect();
        Self { patterns }
    }

    /// Loads the ignore file from `context`; a missing file means no rules.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load(context: &Path) -> Result<Self> {
        let path = context.join(IGNORE_FILE);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(BerthError::io(path, e)),
        }
    }

    /// Returns whether a context-relative path is excluded.
    ///
    /// Patterns match as `*.ext` file suffixes, `dir/` prefixes, exact
    /// relative paths, or, for bare names, any path component.
    #[must_use]
    pub fn is_ignored(&self, relative: &Path) -> bool {
        let rel = relative.to_string_lossy();
        if relative
            .components()
            .next()
            .is_some_and(|c| c.as_os_str() == STATE_DIR_NAME)
        {
            return true;
        }
        self.patterns.iter().any(|p| {
            if let Some(ext) = p.strip_prefix("*.") {
                relative.extension().is_some_and(|e| e == ext)
            } else if let Some(dir) = p.strip_suffix('/') {
                rel == dir || relative.starts_with(dir)
            } else if p.contains('/') {
                rel == p.as_str()
            } else {
                relative.components().any(|c| c.as_os_str() == p.as_str())
            }
        })
    }
}

/// Copies every `COPY` source from `context` into the root.
///
/// # Errors
///
/// Returns an error if a source is missing, escapes the context, or any
/// file cannot be read or written.
pub fn populate_root(
    config: &BerthConfig,
    context: &Path,
    root: &Path,
    copies: &[CopySpec],
    rules: &IgnoreRules,
) -> Result<CopyStats> {
    let mut stats = CopyStats::default();
    for spec in copies {
        let dest = if Path::new(&spec.dest).is_absolute() {
            config.host_path(Path::new(&spec.dest))
        } else {
            root.join(&spec.dest)
        };
        let into_dir = spec.sources.len() > 1 || spec.dest.ends_with('/') || dest.is_dir();

        for source in &spec.sources {
            let rel = normalize_source(source)?;
            let src = context.join(&rel);
            let meta = fs::metadata(&src).map_err(|e| BerthError::io(&src, e))?;
            if meta.is_dir() {
                copy_tree(context, &src, &dest, root, rules, &mut stats)?;
            } else {
                let target = match src.file_name() {
                    Some(name) if into_dir => dest.join(name),
                    _ => dest.clone(),
                };
                copy_file(&src, &target, &mut stats)?;
            }
        }
    }
    tracing::info!(files = stats.files, bytes = stats.bytes, "root populated");
    Ok(stats)
}

/// Rejects sources that climb out of the build context.
fn normalize_source(source: &str) -> Result<PathBuf> {
    let mut out = PathBuf::new();
    for comp in Path::new(source).components() {
        match comp {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return Err(BerthError::Config {
                        message: format!("COPY source escapes the build context: {source}"),
                    });
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(BerthError::Config {
                    message: format!("COPY source must be relative to the context: {source}"),
                });
            }
        }
    }
    Ok(out)
}

fn copy_tree(
    context: &Path,
    src: &Path,
    dest: &Path,
    root: &Path,
    rules: &IgnoreRules,
    stats: &mut CopyStats,
) -> Result<()> {
    fs::create_dir_all(dest).map_err(|e| BerthError::io(dest, e))?;

    let walker = WalkDir::new(src).min_depth(1).into_iter().filter_entry(|e| {
        let rel = e.path().strip_prefix(context).unwrap_or(e.path());
        !rules.is_ignored(rel) && !e.path().starts_with(root)
    });

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map_or_else(|| src.to_path_buf(), Path::to_path_buf);
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
            BerthError::io(path, source)
        })?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| BerthError::Config {
                message: format!("walk left the source tree: {e}"),
            })?;
        let target = dest.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| BerthError::io(&target, e))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            copy_file(entry.path(), &target, stats)?;
        }
    }
    Ok(())
}

fn copy_file(src: &Path, target: &Path, stats: &mut CopyStats) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| BerthError::io(parent, e))?;
    }
    let bytes = fs::copy(src, target).map_err(|e| BerthError::io(src, e))?;
    stats.files += 1;
    stats.bytes += bytes;
    tracing::trace!(src = %src.display(), dest = %target.display(), "copied");
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, target: &Path) -> Result<()> {
    let link = fs::read_link(src).map_err(|e| BerthError::io(src, e))?;
    if target.symlink_metadata().is_ok() {
        fs::remove_file(target).map_err(|e| BerthError::io(target, e))?;
    }
    std::os::unix::fs::symlink(&link, target).map_err(|e| BerthError::io(target, e))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, target: &Path) -> Result<()> {
    let mut ignored = CopyStats::default();
    copy_file(src, target, &mut ignored)
}
