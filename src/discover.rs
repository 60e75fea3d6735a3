use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::autoload::resolve_source_roots;
use crate::detect::{ClassDetector, ModuleClass, extract_modules};
use crate::package::{Package, filter_by_kind};
use crate::scan::scan_sources;

pub const DEFAULT_PACKAGE_KIND: &str = "pg-module";
pub const DEFAULT_EXTENSION: &str = "php";

/// Fully-qualified class name → simple name. Ordered, so iteration is stable.
pub type ModuleMap = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub package_kind: String,
    pub extension: String,
    pub exclude: Option<String>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            package_kind: DEFAULT_PACKAGE_KIND.to_string(),
            extension: DEFAULT_EXTENSION.to_string(),
            exclude: None,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct Discovery {
    /// Names of the packages that matched the module kind.
    pub packages: Vec<String>,
    pub modules: ModuleMap,
}

impl Discovery {
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Finds every module class declared by packages of the configured kind.
///
/// Packages are visited in the given order and the first package to declare
/// a fully-qualified name keeps it.
pub fn discover(packages: &[Package], options: &DiscoveryOptions, detector: &dyn ClassDetector) -> Discovery {
    let mut discovery = Discovery::default();

    for package in filter_by_kind(packages, &options.package_kind) {
        tracing::info!(package = %package.name, "found {} package", options.package_kind);
        discovery.packages.push(package.name.clone());

        for root in resolve_source_roots(&package.namespace_map, &package.install_path) {
            tracing::debug!(namespace = %root.namespace, dir = %root.dir.display(), "scanning source root");
            let files = scan_sources(&root.dir, &options.extension, options.exclude.as_deref());
            for (file, class) in extract_modules(&files, detector) {
                tracing::debug!(file = %file.display(), "module class {}", class.simple_name);
                insert_module(&mut discovery.modules, &package.name, class);
            }
        }
    }

    discovery
}

fn insert_module(modules: &mut ModuleMap, package: &str, class: ModuleClass) {
    match modules.entry(class.fully_qualified_name()) {
        Entry::Vacant(slot) => {
            tracing::info!(package, "found module: {}", slot.key());
            slot.insert(class.simple_name);
        }
        Entry::Occupied(slot) => {
            tracing::debug!(package, "module {} already discovered", slot.key());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::PatternDetector;
    use std::path::{Path, PathBuf};

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "module_sync_discover_{}_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos(),
            name
        ))
    }

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn options(kind: &str) -> DiscoveryOptions {
        DiscoveryOptions {
            package_kind: kind.to_string(),
            ..DiscoveryOptions::default()
        }
    }

    #[test]
    fn discover_collects_module_classes_from_matching_packages() {
        let base = temp_dir("single");
        let p1 = base.join("vendor/acme/mod-a");
        write(
            &p1.join("src/Widget.php"),
            "<?php\nnamespace Acme\\ModA;\nclass WidgetModule extends Module {}\n",
        );
        write(&p1.join("src/Helper.php"), "<?php\nnamespace Acme\\ModA;\nclass Helper {}\n");

        let packages = vec![Package::new("acme/mod-a", "module-kind", &p1).with_psr4("Acme\\ModA\\", &["src/"])];
        let found = discover(&packages, &options("module-kind"), &PatternDetector::default());

        assert_eq!(found.packages, vec!["acme/mod-a"]);
        assert_eq!(
            found.modules,
            ModuleMap::from([("Acme\\ModA\\WidgetModule".to_string(), "WidgetModule".to_string())])
        );

        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn discover_skips_packages_of_other_kinds() {
        let base = temp_dir("other_kind");
        let lib = base.join("vendor/acme/lib");
        write(
            &lib.join("src/Widget.php"),
            "<?php\nnamespace Acme\\Lib;\nclass WidgetModule extends Module {}\n",
        );

        let packages = vec![Package::new("acme/lib", "library", &lib).with_psr4("Acme\\Lib\\", &["src/"])];
        let found = discover(&packages, &options("module-kind"), &PatternDetector::default());
        assert!(found.packages.is_empty());
        assert!(found.is_empty());

        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn discover_aggregates_across_packages_without_leaking_between_calls() {
        let base = temp_dir("multi");
        let a = base.join("vendor/acme/blog");
        let b = base.join("vendor/acme/shop");
        write(&a.join("src/BlogModule.php"), "<?php\nnamespace Acme\\Blog;\nclass BlogModule extends Module {}\n");
        write(&b.join("src/ShopModule.php"), "<?php\nnamespace Acme\\Shop;\nclass ShopModule extends Module {}\n");
        // Same class shipped twice: the first package keeps it.
        write(&b.join("lib/BlogModule.php"), "<?php\nnamespace Acme\\Blog;\nclass BlogModule extends Module {}\n");

        let packages = vec![
            Package::new("acme/blog", "pg-module", &a).with_psr4("Acme\\Blog\\", &["src"]),
            Package::new("acme/shop", "pg-module", &b).with_psr4("Acme\\Shop\\", &["src", "lib"]),
        ];
        let detector = PatternDetector::default();

        let first = discover(&packages, &DiscoveryOptions::default(), &detector);
        assert_eq!(first.modules.len(), 2);
        assert_eq!(first.packages, vec!["acme/blog", "acme/shop"]);

        let second = discover(&packages[1..], &DiscoveryOptions::default(), &detector);
        assert_eq!(
            second.modules.keys().collect::<Vec<_>>(),
            vec!["Acme\\Blog\\BlogModule", "Acme\\Shop\\ShopModule"]
        );
        assert_eq!(second.packages, vec!["acme/shop"]);

        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn discover_honours_exclude_filter() {
        let base = temp_dir("exclude");
        let p = base.join("vendor/acme/mod");
        write(&p.join("src/FakeModule.php"), "<?php\nnamespace Acme;\nclass FakeModule extends Module {}\n");

        let packages = vec![Package::new("acme/mod", "pg-module", &p).with_psr4("Acme\\", &["src"])];
        let options = DiscoveryOptions {
            exclude: Some("fake".to_string()),
            ..DiscoveryOptions::default()
        };
        let found = discover(&packages, &options, &PatternDetector::default());
        assert_eq!(found.packages, vec!["acme/mod"]);
        assert!(found.is_empty());

        let _ = std::fs::remove_dir_all(base);
    }
}
