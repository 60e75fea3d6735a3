//! Parser and renderer for the generated bootstrap config.
//!
//! The file is split into verbatim pieces plus two managed regions: the run of
//! `use` lines after the `declare(...)` statement and the body of the
//! `'modules' => [ ... ]` list. Merging only ever appends to those regions, so
//! everything else is rendered back byte for byte.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use crate::autoload::NAMESPACE_SEPARATOR;
use crate::discover::ModuleMap;

/// Written when the target does not exist yet.
pub const SKELETON: &str = "<?php

/*
 * This file is generated by module-sync.
 *
 * Modules found in installed packages are appended to the list below after
 * each dependency install. Entries added by hand are kept.
 */

declare(strict_types=1);

return [
    'modules' => [
    ],
];
";

static MODULE_LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"]modules['"]\s*=>\s*\["#).expect("valid regex"));

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^[ \t]*use\s+\\?([A-Za-z_][A-Za-z0-9_\\]*)(?:\s+as\s+([A-Za-z_][A-Za-z0-9_]*))?\s*;")
        .expect("valid regex")
});

static NAMESPACE_STMT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*namespace\s+([A-Za-z_][A-Za-z0-9_\\]*)\s*([;{])").expect("valid regex")
});

static CLASS_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\\?[A-Za-z_][A-Za-z0-9_\\]*)::class\b").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("missing `<?php` open tag")]
    MissingOpenTag,
    #[error("missing `declare(...)` statement")]
    MissingDeclare,
    #[error("missing `'modules' => [` list")]
    MissingModuleList,
    #[error("`'modules'` list opened at byte {0} is never closed")]
    UnterminatedModuleList(usize),
    #[error("braced `namespace {{ ... }}` blocks are not supported")]
    BracedNamespace,
}

/// Result of [`ConfigDocument::merge`], in module-map order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub added: Vec<String>,
    pub already_present: Vec<String>,
}

impl MergeReport {
    pub fn changed(&self) -> bool {
        !self.added.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Import {
    alias: String,
    fqn: String,
}

#[derive(Debug, Clone)]
pub struct ConfigDocument {
    eol: &'static str,
    prologue: String,
    imports: Vec<String>,
    /// No `use` run existed when parsed; new imports need a blank line above.
    detached_imports: bool,
    interlude: String,
    list_open: String,
    /// List written on one line (`[]`); the first append breaks it open.
    inline_list: bool,
    entries: Vec<String>,
    tail: String,
    key_indent: String,
    entry_indent: String,
    /// Lowercased alias → import, from every top-level `use` statement.
    aliases: BTreeMap<String, Import>,
    /// Lowercased fully-qualified names referenced by the module list.
    registered: BTreeSet<String>,
}

impl ConfigDocument {
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        if !text.trim_start().starts_with("<?php") {
            return Err(DocumentError::MissingOpenTag);
        }
        let eol = if text.contains("\r\n") { "\r\n" } else { "\n" };

        // (byte offset, line including its terminator)
        let mut lines: Vec<(usize, &str)> = Vec::new();
        let mut offset = 0;
        for line in text.split_inclusive('\n') {
            lines.push((offset, line));
            offset += line.len();
        }
        let line_at = |idx: usize| lines[idx].1;
        let line_end = |idx: usize| lines[idx].0 + lines[idx].1.len();

        let declare = (0..lines.len())
            .find(|&idx| is_declare_line(line_at(idx)))
            .ok_or(DocumentError::MissingDeclare)?;

        // Imports belong after a `namespace ...;` statement when there is one.
        let mut anchor = declare;
        let mut namespace = None;
        if let Some(caps) = NAMESPACE_STMT_RE.captures(&text[line_end(declare)..]) {
            if &caps[2] == "{" {
                return Err(DocumentError::BracedNamespace);
            }
            let at = line_end(declare) + caps.get(0).map_or(0, |m| m.start());
            anchor = lines.iter().rposition(|&(start, _)| start <= at).unwrap_or(declare);
            namespace = Some(caps[1].trim_end_matches(NAMESPACE_SEPARATOR).to_string());
        }

        let mut first_use = anchor + 1;
        while first_use < lines.len() && line_at(first_use).trim().is_empty() {
            first_use += 1;
        }
        let (prologue_end, imports, interlude_start) =
            if first_use < lines.len() && is_use_line(line_at(first_use)) {
                let mut end = first_use;
                while end < lines.len() && (is_use_line(line_at(end)) || line_at(end).trim().is_empty()) {
                    end += 1;
                }
                while line_at(end - 1).trim().is_empty() {
                    end -= 1;
                }
                let imports: Vec<String> = (first_use..end)
                    .map(|idx| strip_eol(line_at(idx)).to_string())
                    .collect();
                (lines[first_use].0, Some(imports), lines.get(end).map_or(text.len(), |l| l.0))
            } else {
                (line_end(anchor), None, line_end(anchor))
            };

        let found = MODULE_LIST_RE
            .find(&text[interlude_start..])
            .ok_or(DocumentError::MissingModuleList)?;
        let open = interlude_start + found.end();
        let close = find_closing_bracket(text, open).ok_or(DocumentError::UnterminatedModuleList(open - 1))?;

        let key_start = interlude_start + found.start();
        let key_line_start = text[..key_start].rfind('\n').map_or(0, |i| i + 1);
        let key_indent = leading_whitespace(&text[key_line_start..]).to_string();

        let inner = &text[open..close];
        let (list_open, entries, tail_start, inline_list) = match (inner.find('\n'), inner.rfind('\n')) {
            (Some(first), Some(last)) => {
                let entries = if first == last {
                    Vec::new()
                } else {
                    inner[first + 1..=last]
                        .split_inclusive('\n')
                        .map(|line| strip_eol(line).to_string())
                        .collect()
                };
                (inner[..=first].to_string(), entries, open + last + 1, false)
            }
            _ => (inner.to_string(), Vec::new(), close, true),
        };

        let entry_indent = entries
            .iter()
            .find(|line| !line.trim().is_empty())
            .map(|line| leading_whitespace(line).to_string())
            .unwrap_or_else(|| format!("{key_indent}{}", indent_unit(&key_indent)));

        let aliases = collect_aliases(&text[..open]);
        let registered = CLASS_REF_RE
            .captures_iter(inner)
            .filter_map(|c| c.get(1))
            .map(|m| resolve_reference(m.as_str(), &aliases, namespace.as_deref()).to_lowercase())
            .collect();

        Ok(Self {
            eol,
            prologue: text[..prologue_end].to_string(),
            detached_imports: imports.is_none(),
            imports: imports.unwrap_or_default(),
            interlude: text[interlude_start..open].to_string(),
            list_open,
            inline_list,
            entries,
            tail: text[tail_start..].to_string(),
            key_indent,
            entry_indent,
            aliases,
            registered,
        })
    }

    #[cfg(test)]
    fn imports(&self) -> &[String] {
        &self.imports
    }

    #[cfg(test)]
    fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Whether the module list already references `fqn`, through an import,
    /// an alias, or a fully-qualified reference. Comparison ignores case.
    pub fn is_registered(&self, fqn: &str) -> bool {
        self.registered
            .contains(&fqn.trim_start_matches(NAMESPACE_SEPARATOR).to_lowercase())
    }

    /// Appends every module not yet registered: one `use` line (unless the
    /// class is already imported) and one `Name::class,` entry each.
    pub fn merge(&mut self, modules: &ModuleMap) -> MergeReport {
        let mut report = MergeReport::default();

        for (fqn, simple_name) in modules {
            let fqn = fqn.trim_start_matches(NAMESPACE_SEPARATOR);
            if self.is_registered(fqn) {
                report.already_present.push(fqn.to_string());
                continue;
            }

            let reference = match self.alias_for(fqn) {
                Some(alias) => alias,
                None => {
                    let alias = self.free_alias(fqn, simple_name);
                    if alias.eq_ignore_ascii_case(simple_name) {
                        self.imports.push(format!("use {fqn};"));
                    } else {
                        self.imports.push(format!("use {fqn} as {alias};"));
                    }
                    self.aliases.insert(
                        alias.to_lowercase(),
                        Import {
                            alias: alias.clone(),
                            fqn: fqn.to_string(),
                        },
                    );
                    alias
                }
            };

            self.push_entry(format!("{}{reference}::class,", self.entry_indent));
            self.registered.insert(fqn.to_lowercase());
            report.added.push(fqn.to_string());
        }

        report
    }

    pub fn render(&self) -> String {
        let mut out = String::with_capacity(
            self.prologue.len() + self.interlude.len() + self.tail.len() + 64 * (self.entries.len() + self.imports.len()),
        );
        out.push_str(&self.prologue);
        if self.detached_imports && !self.imports.is_empty() {
            out.push_str(self.eol);
        }
        for line in &self.imports {
            out.push_str(line);
            out.push_str(self.eol);
        }
        out.push_str(&self.interlude);
        out.push_str(&self.list_open);
        for line in &self.entries {
            out.push_str(line);
            out.push_str(self.eol);
        }
        out.push_str(&self.tail);
        out
    }

    fn alias_for(&self, fqn: &str) -> Option<String> {
        self.aliases
            .values()
            .find(|import| import.fqn.eq_ignore_ascii_case(fqn))
            .map(|import| import.alias.clone())
    }

    /// Picks an alias that does not clash with an existing import: the simple
    /// name, then the simple name prefixed by namespace segments, then a
    /// numeric suffix.
    fn free_alias(&self, fqn: &str, simple_name: &str) -> String {
        let taken = |candidate: &str| self.aliases.contains_key(&candidate.to_lowercase());
        if !taken(simple_name) {
            return simple_name.to_string();
        }

        let segments: Vec<&str> = fqn.split(NAMESPACE_SEPARATOR).collect();
        for k in 2..=segments.len() {
            let candidate = segments[segments.len() - k..].concat();
            if !taken(&candidate) {
                return candidate;
            }
        }

        (2..)
            .map(|n| format!("{simple_name}{n}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| simple_name.to_string())
    }

    fn push_entry(&mut self, entry: String) {
        if self.inline_list {
            let existing = self.list_open.trim_end();
            self.list_open = if existing.trim().is_empty() {
                self.eol.to_string()
            } else if existing.ends_with(',') {
                format!("{existing}{}", self.eol)
            } else {
                format!("{existing},{}", self.eol)
            };
            self.tail = format!("{}{}", self.key_indent, self.tail);
            self.inline_list = false;
        } else if let Some(last) = self.entries.iter_mut().rev().find(|line| !line.trim().is_empty()) {
            if needs_separator(last) {
                last.push(',');
            }
        } else {
            // Only element written on the same line as the opening bracket.
            let first = strip_eol(&self.list_open);
            if !first.trim().is_empty() && needs_separator(first) {
                self.list_open = format!("{first},{}", &self.list_open[first.len()..]);
            }
        }
        self.entries.push(entry);
    }
}

fn is_use_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() > 4
        && trimmed.get(..4).is_some_and(|kw| kw.eq_ignore_ascii_case("use "))
        && trimmed.ends_with(';')
}

fn is_declare_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed
        .get(..7)
        .is_some_and(|kw| kw.eq_ignore_ascii_case("declare"))
        && trimmed[7..].trim_start().starts_with('(')
}

fn strip_eol(line: &str) -> &str {
    line.trim_end_matches('\n').trim_end_matches('\r')
}

fn leading_whitespace(text: &str) -> &str {
    let end = text
        .find(|c: char| c != ' ' && c != '\t')
        .unwrap_or(text.len());
    &text[..end]
}

fn indent_unit(sample: &str) -> &'static str {
    if sample.starts_with('\t') { "\t" } else { "    " }
}

fn needs_separator(line: &str) -> bool {
    let trimmed = line.trim();
    let is_comment = ["//", "#", "/*", "*"].iter().any(|p| trimmed.starts_with(p));
    !is_comment && !trimmed.ends_with(',') && !trimmed.ends_with('[')
}

fn collect_aliases(text: &str) -> BTreeMap<String, Import> {
    let mut aliases = BTreeMap::new();
    for caps in IMPORT_RE.captures_iter(text) {
        let Some(fqn) = caps.get(1).map(|m| m.as_str()) else {
            continue;
        };
        let alias = caps
            .get(2)
            .map(|m| m.as_str())
            .unwrap_or_else(|| fqn.rsplit(NAMESPACE_SEPARATOR).next().unwrap_or(fqn));
        aliases.insert(
            alias.to_lowercase(),
            Import {
                alias: alias.to_string(),
                fqn: fqn.to_string(),
            },
        );
    }
    aliases
}

/// Resolves a `Name::class` operand the way PHP would: imports first, then
/// the file's namespace for anything unqualified by an import.
fn resolve_reference(reference: &str, aliases: &BTreeMap<String, Import>, namespace: Option<&str>) -> String {
    if let Some(absolute) = reference.strip_prefix(NAMESPACE_SEPARATOR) {
        return absolute.to_string();
    }
    let (head, rest) = match reference.split_once(NAMESPACE_SEPARATOR) {
        Some((head, rest)) => (head, Some(rest)),
        None => (reference, None),
    };
    match (aliases.get(&head.to_lowercase()), rest) {
        (Some(import), Some(rest)) => format!("{}{NAMESPACE_SEPARATOR}{rest}", import.fqn),
        (Some(import), None) => import.fqn.clone(),
        (None, _) => match namespace {
            Some(ns) => format!("{ns}{NAMESPACE_SEPARATOR}{reference}"),
            None => reference.to_string(),
        },
    }
}

/// Finds the `]` matching the `[` just before `open`, skipping string
/// literals and comments.
fn find_closing_bracket(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 1usize;
    let mut i = open;

    while i < bytes.len() {
        match bytes[i] {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            quote @ (b'\'' | b'"') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = text[i + 2..].find("*/")?;
                i += 2 + end + 2;
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'#' if bytes.get(i + 1) != Some(&b'[') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}
