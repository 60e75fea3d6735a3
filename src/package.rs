use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_PACKAGE_TYPE: &str = "library";

/// How a package maps namespaces onto its source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AutoloadStyle {
    /// Hierarchical directory prefix (`psr-4`).
    Psr4,
    Psr0,
    Classmap,
    Files,
}

/// One namespace prefix and the directories it maps to, relative to the
/// package's install path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceMapping {
    pub style: AutoloadStyle,
    pub namespace: String,
    pub paths: Vec<String>,
}

/// An installed dependency as reported by the package manager.
#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub kind: String,
    pub install_path: PathBuf,
    pub namespace_map: Vec<NamespaceMapping>,
}

impl Package {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, install_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            install_path: install_path.into(),
            namespace_map: Vec::new(),
        }
    }

    pub fn with_psr4(mut self, namespace: impl Into<String>, paths: &[&str]) -> Self {
        self.namespace_map.push(NamespaceMapping {
            style: AutoloadStyle::Psr4,
            namespace: namespace.into(),
            paths: paths.iter().map(|p| p.to_string()).collect(),
        });
        self
    }
}

/// Keeps only the packages tagged with `kind`, in their original order.
pub fn filter_by_kind<'a>(packages: &'a [Package], kind: &str) -> Vec<&'a Package> {
    packages.iter().filter(|p| p.kind == kind).collect()
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InstalledFile {
    V2 { packages: Vec<InstalledPackage> },
    V1(Vec<InstalledPackage>),
}

#[derive(Debug, Deserialize)]
struct InstalledPackage {
    name: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(rename = "install-path", default)]
    install_path: Option<String>,
    #[serde(default)]
    autoload: InstalledAutoload,
}

#[derive(Debug, Default, Deserialize)]
struct InstalledAutoload {
    #[serde(rename = "psr-4", default)]
    psr4: BTreeMap<String, OneOrMany>,
    #[serde(rename = "psr-0", default)]
    psr0: BTreeMap<String, OneOrMany>,
    #[serde(default)]
    classmap: Vec<String>,
    #[serde(default)]
    files: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// Reads Composer's `installed.json` (2.x object form or 1.x array form).
///
/// `install-path` entries are relative to the directory holding the file;
/// packages without one are assumed to live at `<vendor>/<name>`.
pub fn load_installed_packages(installed_json: &Path, vendor_dir: &Path) -> Result<Vec<Package>> {
    let raw = std::fs::read_to_string(installed_json)
        .with_context(|| format!("Failed to read installed packages: {}", installed_json.display()))?;
    let base = installed_json.parent().unwrap_or_else(|| Path::new("."));
    parse_installed_packages(&raw, base, vendor_dir)
        .with_context(|| format!("Failed to parse installed packages: {}", installed_json.display()))
}

fn parse_installed_packages(raw: &str, base: &Path, vendor_dir: &Path) -> Result<Vec<Package>> {
    let file: InstalledFile = serde_json::from_str(raw)?;
    let entries = match file {
        InstalledFile::V2 { packages } => packages,
        InstalledFile::V1(packages) => packages,
    };

    Ok(entries
        .into_iter()
        .map(|entry| {
            let install_path = match entry.install_path.as_deref() {
                Some(rel) => base.join(rel),
                None => vendor_dir.join(&entry.name),
            };
            let namespace_map = to_namespace_map(entry.autoload);
            Package {
                name: entry.name,
                kind: entry.kind.unwrap_or_else(|| DEFAULT_PACKAGE_TYPE.to_string()),
                install_path,
                namespace_map,
            }
        })
        .collect())
}

fn to_namespace_map(autoload: InstalledAutoload) -> Vec<NamespaceMapping> {
    let mut map = Vec::new();
    for (style, entries) in [
        (AutoloadStyle::Psr4, autoload.psr4),
        (AutoloadStyle::Psr0, autoload.psr0),
    ] {
        for (namespace, paths) in entries {
            map.push(NamespaceMapping {
                style,
                namespace,
                paths: paths.into_vec(),
            });
        }
    }
    for (style, paths) in [
        (AutoloadStyle::Classmap, autoload.classmap),
        (AutoloadStyle::Files, autoload.files),
    ] {
        if !paths.is_empty() {
            map.push(NamespaceMapping {
                style,
                namespace: String::new(),
                paths,
            });
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_installed_packages_reads_v2_format() -> Result<()> {
        let raw = r#"{
            "packages": [
                {
                    "name": "willy68/fake-module",
                    "type": "pg-module",
                    "install-path": "../willy68/fake-module",
                    "autoload": { "psr-4": { "PgFramework\\FakeModule\\": "src/" } }
                },
                {
                    "name": "psr/container",
                    "install-path": "../psr/container",
                    "autoload": { "psr-4": { "Psr\\Container\\": ["src/", "lib/"] }, "files": ["helpers.php"] }
                }
            ],
            "dev": true
        }"#;

        let base = Path::new("/app/vendor/composer");
        let packages = parse_installed_packages(raw, base, Path::new("/app/vendor"))?;
        assert_eq!(packages.len(), 2);

        let module = &packages[0];
        assert_eq!(module.kind, "pg-module");
        assert_eq!(module.install_path, base.join("../willy68/fake-module"));
        assert_eq!(
            module.namespace_map,
            vec![NamespaceMapping {
                style: AutoloadStyle::Psr4,
                namespace: "PgFramework\\FakeModule\\".to_string(),
                paths: vec!["src/".to_string()],
            }]
        );

        let lib = &packages[1];
        assert_eq!(lib.kind, DEFAULT_PACKAGE_TYPE);
        assert_eq!(lib.namespace_map[0].paths, vec!["src/", "lib/"]);
        assert_eq!(lib.namespace_map[1].style, AutoloadStyle::Files);
        Ok(())
    }

    #[test]
    fn parse_installed_packages_reads_v1_array_without_install_path() -> Result<()> {
        let raw = r#"[{ "name": "acme/blog", "type": "pg-module", "autoload": {} }]"#;
        let packages = parse_installed_packages(raw, Path::new("/x/vendor/composer"), Path::new("/x/vendor"))?;
        assert_eq!(packages[0].install_path, PathBuf::from("/x/vendor/acme/blog"));
        assert!(packages[0].namespace_map.is_empty());
        Ok(())
    }

    #[test]
    fn parse_installed_packages_rejects_garbage() {
        assert!(parse_installed_packages("{\"nope\": 1}", Path::new("."), Path::new(".")).is_err());
    }

    #[test]
    fn filter_by_kind_keeps_matching_packages_in_order() {
        let packages = vec![
            Package::new("a/one", "pg-module", "/v/a/one"),
            Package::new("b/lib", "library", "/v/b/lib"),
            Package::new("c/two", "pg-module", "/v/c/two"),
        ];
        let names: Vec<&str> = filter_by_kind(&packages, "pg-module")
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["a/one", "c/two"]);
        assert!(filter_by_kind(&packages, "metapackage").is_empty());
    }
}
