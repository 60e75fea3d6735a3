use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Recursively lists files under `root` whose name ends with `.{extension}`.
///
/// Symlinks are followed. Hidden files are skipped, but hidden directories are
/// still descended; only the file name is checked. When `exclude` is set, any
/// file whose name contains it (ignoring case) is dropped.
///
/// Unreadable subtrees are logged and skipped. Entries are sorted by file name
/// at every level, so the result is stable for a fixed tree.
pub fn scan_sources(root: &Path, extension: &str, exclude: Option<&str>) -> Vec<PathBuf> {
    let suffix = format!(".{extension}");
    let exclude = exclude
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase());

    let walker = WalkBuilder::new(root)
        .follow_links(true)
        .hidden(false)
        .ignore(false)
        .parents(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(root = %root.display(), "skipping unreadable entry: {err}");
                continue;
            }
        };

        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if is_source_file(&name, &suffix, exclude.as_deref()) {
            files.push(entry.into_path());
        }
    }

    files
}

fn is_source_file(name: &str, suffix: &str, exclude: Option<&str>) -> bool {
    if name.starts_with('.') {
        return false;
    }
    if let Some(needle) = exclude
        && name.to_lowercase().contains(needle)
    {
        return false;
    }
    name.ends_with(suffix)
}
