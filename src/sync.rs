use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::discover::ModuleMap;
use crate::document::{ConfigDocument, SKELETON};
use crate::error::{SyncError, SyncResult};

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    /// Hold an exclusive advisory lock on the target while replacing it.
    pub lock_on_write: bool,
    /// Compute the outcome without touching the filesystem.
    pub dry_run: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            lock_on_write: true,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Changed,
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub target: String,
    pub status: SyncStatus,
    pub scaffolded: bool,
    pub added: Vec<String>,
    pub already_present: Vec<String>,
    pub content_hash: String,
}

/// Merges `modules` into the config at `target`.
///
/// A missing target is first scaffolded from [`SKELETON`]. The file is only
/// rewritten when at least one module was added, and the rewrite replaces it
/// atomically. A target that cannot be parsed is left untouched.
pub fn sync(target: &Path, modules: &ModuleMap, options: &SyncOptions) -> SyncResult<SyncOutcome> {
    let (text, scaffolded) = read_or_scaffold(target, options)?;

    let mut document = ConfigDocument::parse(&text).map_err(|source| SyncError::MalformedTarget {
        path: target.to_path_buf(),
        source,
    })?;
    let report = document.merge(modules);

    for fqn in &report.already_present {
        tracing::info!("module {fqn} already exists");
    }

    let (status, content) = if report.changed() {
        let rendered = document.render();
        if options.dry_run {
            tracing::info!(path = %target.display(), "dry run, {} module(s) would be added", report.added.len());
        } else {
            write_atomic(target, &rendered, options.lock_on_write)?;
            for fqn in &report.added {
                tracing::info!("module {fqn} registered");
            }
        }
        (SyncStatus::Changed, rendered)
    } else {
        tracing::info!(path = %target.display(), "config already up to date");
        (SyncStatus::Unchanged, text)
    };

    Ok(SyncOutcome {
        target: target.to_string_lossy().to_string(),
        status,
        scaffolded,
        added: report.added,
        already_present: report.already_present,
        content_hash: hash_content(&content),
    })
}

/// Writes the skeleton if `target` does not exist. Returns whether it did.
pub fn scaffold(target: &Path) -> SyncResult<bool> {
    if target.exists() {
        return Ok(false);
    }
    write_new(target, SKELETON)?;
    tracing::info!(path = %target.display(), "created config skeleton");
    Ok(true)
}

fn read_or_scaffold(target: &Path, options: &SyncOptions) -> SyncResult<(String, bool)> {
    match fs::read_to_string(target) {
        Ok(text) => Ok((text, false)),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            if options.dry_run {
                return Ok((SKELETON.to_string(), true));
            }
            let created = scaffold(target)?;
            let text = fs::read_to_string(target).map_err(|source| SyncError::ReadFailure {
                path: target.to_path_buf(),
                source,
            })?;
            Ok((text, created))
        }
        Err(source) => Err(SyncError::ReadFailure {
            path: target.to_path_buf(),
            source,
        }),
    }
}

/// Replaces `target` with `content` via a temp file in the same directory.
///
/// With `lock`, an exclusive advisory lock is held on the current target for
/// the duration of the swap. File permissions of the old target are kept.
pub fn write_atomic(target: &Path, content: &str, lock: bool) -> SyncResult<()> {
    let dir = parent_dir(target);
    fs::create_dir_all(&dir).map_err(|e| SyncError::write(&dir, e))?;

    let guard = if lock { Some(lock_exclusive(target)?) } else { None };

    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| SyncError::write(&dir, e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| SyncError::write(tmp.path(), e))?;
    if let Ok(meta) = fs::metadata(target) {
        tmp.as_file()
            .set_permissions(meta.permissions())
            .map_err(|e| SyncError::write(tmp.path(), e))?;
    } else {
        set_default_permissions(tmp.as_file()).map_err(|e| SyncError::write(tmp.path(), e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| SyncError::write(tmp.path(), e))?;
    tmp.persist(target)
        .map_err(|e| SyncError::write(target, e.error))?;

    if let Some(file) = guard {
        let _ = fs2::FileExt::unlock(&file);
    }
    Ok(())
}

/// Creates `target` atomically, leaving it alone if another writer got there
/// first.
fn write_new(target: &Path, content: &str) -> SyncResult<()> {
    let dir = parent_dir(target);
    fs::create_dir_all(&dir).map_err(|e| SyncError::write(&dir, e))?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| SyncError::write(&dir, e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| SyncError::write(tmp.path(), e))?;
    set_default_permissions(tmp.as_file()).map_err(|e| SyncError::write(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| SyncError::write(tmp.path(), e))?;

    match tmp.persist_noclobber(target) {
        Ok(_) => Ok(()),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(SyncError::write(target, e.error)),
    }
}

fn lock_exclusive(target: &Path) -> SyncResult<File> {
    let file = File::open(target).map_err(|source| SyncError::LockFailed {
        path: target.to_path_buf(),
        source,
    })?;
    fs2::FileExt::lock_exclusive(&file).map_err(|source| SyncError::LockFailed {
        path: target.to_path_buf(),
        source,
    })?;
    Ok(file)
}

fn parent_dir(target: &Path) -> PathBuf {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(unix)]
fn set_default_permissions(file: &File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_default_permissions(_file: &File) -> std::io::Result<()> {
    Ok(())
}

pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}
