use std::path::{Path, PathBuf};

use crate::package::{AutoloadStyle, NamespaceMapping};

pub const NAMESPACE_SEPARATOR: char = '\\';

/// A namespace prefix resolved to a concrete source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRoot {
    pub namespace: String,
    pub dir: PathBuf,
}

/// Expands every `psr-4` mapping into one [`SourceRoot`] per declared path.
///
/// Other autoload styles carry no directory-prefix contract and are ignored.
pub fn resolve_source_roots(namespace_map: &[NamespaceMapping], install_path: &Path) -> Vec<SourceRoot> {
    namespace_map
        .iter()
        .filter(|m| m.style == AutoloadStyle::Psr4)
        .flat_map(|m| {
            let namespace = m.namespace.trim_end_matches(NAMESPACE_SEPARATOR).to_string();
            m.paths.iter().map(move |rel| SourceRoot {
                namespace: namespace.clone(),
                dir: install_path.join(rel),
            })
        })
        .collect()
}
