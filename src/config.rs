use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

use crate::cli::{Cli, DetectorKind};
use crate::detect::{ClassDetector, PatternDetector};
use crate::discover::DiscoveryOptions;
use crate::sync::SyncOptions;
use crate::syntax::SyntaxDetector;

pub const TARGET_ENV: &str = "MODULE_SYNC_TARGET";
pub const NO_LOCK_ENV: &str = "MODULE_SYNC_NO_LOCK";
pub const DEFAULT_TARGET: &str = "src/Bootstrap/PgFramework.php";
pub const DEFAULT_VENDOR_DIR: &str = "vendor";

pub fn resolve_project_dir(cli: &Cli) -> Result<PathBuf> {
    if let Some(p) = cli.project.clone() {
        return Ok(p);
    }
    env::current_dir().context("Failed to resolve current directory")
}

/// `--vendor`, else `config.vendor-dir` from `composer.json`, else `vendor`.
pub fn resolve_vendor_dir(cli: &Cli, project_dir: &Path) -> Result<PathBuf> {
    if let Some(p) = cli.vendor.clone() {
        return Ok(absolutize(project_dir, p));
    }

    let manifest = project_dir.join("composer.json");
    if manifest.exists() {
        let raw = std::fs::read_to_string(&manifest)
            .with_context(|| format!("Failed to read {}", manifest.display()))?;
        if let Some(dir) = vendor_dir_from_manifest(&raw)
            .with_context(|| format!("Failed to parse {}", manifest.display()))?
        {
            return Ok(absolutize(project_dir, PathBuf::from(dir)));
        }
    }

    Ok(project_dir.join(DEFAULT_VENDOR_DIR))
}

pub fn resolve_installed_json(cli: &Cli, project_dir: &Path, vendor_dir: &Path) -> PathBuf {
    match cli.installed.clone() {
        Some(p) => absolutize(project_dir, p),
        None => vendor_dir.join("composer").join("installed.json"),
    }
}

pub fn resolve_target(cli: &Cli, project_dir: &Path) -> PathBuf {
    if let Some(p) = cli.target.clone() {
        return absolutize(project_dir, p);
    }
    if let Ok(p) = env::var(TARGET_ENV)
        && !p.is_empty()
    {
        return absolutize(project_dir, PathBuf::from(p));
    }
    project_dir.join(DEFAULT_TARGET)
}

pub fn resolve_discovery_options(cli: &Cli) -> DiscoveryOptions {
    DiscoveryOptions {
        package_kind: cli.kind.clone(),
        extension: cli.ext.trim_start_matches('.').to_string(),
        exclude: cli.exclude.clone(),
    }
}

pub fn resolve_sync_options(cli: &Cli, dry_run: bool) -> SyncOptions {
    let env_no_lock = env::var(NO_LOCK_ENV).is_ok_and(|v| is_truthy(&v));
    SyncOptions {
        lock_on_write: !(cli.no_lock || env_no_lock),
        dry_run,
    }
}

pub fn build_detector(cli: &Cli) -> Box<dyn ClassDetector> {
    match cli.detector {
        DetectorKind::Pattern => Box::new(PatternDetector::new(cli.marker.clone())),
        DetectorKind::Syntax => Box::new(SyntaxDetector::new(cli.marker.clone())),
    }
}

fn vendor_dir_from_manifest(raw: &str) -> Result<Option<String>> {
    let manifest: serde_json::Value = serde_json::from_str(raw)?;
    Ok(manifest
        .get("config")
        .and_then(|c| c.get("vendor-dir"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string))
}

fn absolutize(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

fn is_truthy(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "" | "0" | "false" | "no" | "off")
}
