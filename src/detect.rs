use rayon::prelude::*;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::autoload::NAMESPACE_SEPARATOR;

pub const DEFAULT_MARKER: &str = "Module";

static NAMESPACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[;{}\s])namespace\s+([A-Za-z_\\][A-Za-z0-9_\\]*)\s*[;{]").expect("valid regex")
});

static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|[;{}\s])(?:(?:abstract|final|readonly)\s+)*class\s+([A-Za-z_][A-Za-z0-9_]*)(?:\s+extends\s+(\\?[A-Za-z_][A-Za-z0-9_\\]*))?",
    )
    .expect("valid regex")
});

/// A class found to extend the module marker type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleClass {
    pub namespace: String,
    pub simple_name: String,
}

impl ModuleClass {
    pub fn new(namespace: impl Into<String>, simple_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            simple_name: simple_name.into(),
        }
    }

    pub fn fully_qualified_name(&self) -> String {
        format!("{}{NAMESPACE_SEPARATOR}{}", self.namespace, self.simple_name)
    }
}

/// Decides whether a source file declares a module class.
///
/// Implementations look only at the first class declared in the file: if it
/// extends the marker (compared by simple name) the file yields one module,
/// otherwise none, regardless of what follows.
pub trait ClassDetector: Send + Sync {
    fn detect(&self, source: &str) -> Option<ModuleClass>;
}

/// Regex-based detector. Keywords match on a token boundary anywhere in the
/// text once comments and quoted strings are blanked out. Heredocs are not
/// recognised.
#[derive(Debug, Clone)]
pub struct PatternDetector {
    marker: String,
}

impl PatternDetector {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER)
    }
}

impl ClassDetector for PatternDetector {
    fn detect(&self, source: &str) -> Option<ModuleClass> {
        let code = mask_non_code(source);
        let namespace = NAMESPACE_RE.captures(&code)?.get(1)?.as_str();
        let class = CLASS_RE.captures(&code)?;
        let base = class.get(2)?.as_str();
        if !base_matches_marker(base, &self.marker) {
            return None;
        }
        Some(ModuleClass::new(
            namespace.trim_matches(NAMESPACE_SEPARATOR),
            class.get(1)?.as_str(),
        ))
    }
}

/// Compares a declared base type with the marker by simple name, so
/// `Module`, `\Module` and `\Vendor\Module` all match a `Module` marker.
pub(crate) fn base_matches_marker(base: &str, marker: &str) -> bool {
    let simple = base
        .trim()
        .rsplit(NAMESPACE_SEPARATOR)
        .next()
        .unwrap_or_default();
    !simple.is_empty() && simple == marker
}

/// Replaces comments and quoted strings with spaces, keeping line breaks.
fn mask_non_code(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'/') => mask_line(&mut chars, &mut out),
            '#' if chars.peek() != Some(&'[') => mask_line(&mut chars, &mut out),
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str("  ");
                let mut prev = '\0';
                for c in chars.by_ref() {
                    out.push(blank(c));
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            '\'' | '"' => {
                out.push(' ');
                let mut escaped = false;
                for inner in chars.by_ref() {
                    out.push(blank(inner));
                    if escaped {
                        escaped = false;
                    } else if inner == '\\' {
                        escaped = true;
                    } else if inner == c {
                        break;
                    }
                }
            }
            _ => out.push(c),
        }
    }

    out
}

fn mask_line(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, out: &mut String) {
    out.push(' ');
    while let Some(&c) = chars.peek() {
        if c == '\n' {
            break;
        }
        out.push(' ');
        chars.next();
    }
}

fn blank(c: char) -> char {
    if c == '\n' { '\n' } else { ' ' }
}

/// Runs `detector` over every file and keeps the hits, in input order.
///
/// Files that cannot be read as UTF-8 text are skipped.
pub fn extract_modules(files: &[PathBuf], detector: &dyn ClassDetector) -> Vec<(PathBuf, ModuleClass)> {
    files
        .par_iter()
        .filter_map(|file| {
            let source = read_source(file)?;
            detector.detect(&source).map(|class| (file.clone(), class))
        })
        .collect()
}

fn read_source(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(source) => Some(source),
        Err(err) => {
            tracing::warn!(file = %path.display(), "skipping unreadable source: {err}");
            None
        }
    }
}
