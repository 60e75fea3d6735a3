use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "module_sync_it_{}_{}_{}",
        std::process::id(),
        nanos,
        name
    ))
}

fn write_file(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Lays out `<base>/vendor` with one package of type `kind` shipping
/// `src/Widget.php`.
fn fake_project(base: &Path, kind: &str) -> anyhow::Result<()> {
    write_file(
        &base.join("vendor/composer/installed.json"),
        &format!(
            r#"{{
    "packages": [
        {{
            "name": "acme/mod-a",
            "type": "{kind}",
            "install-path": "../acme/mod-a",
            "autoload": {{ "psr-4": {{ "Acme\\ModA\\": "src/" }} }}
        }},
        {{
            "name": "psr/log",
            "type": "library",
            "install-path": "../psr/log",
            "autoload": {{ "psr-4": {{ "Psr\\Log\\": "src" }} }}
        }}
    ],
    "dev": true,
    "dev-package-names": []
}}"#
        ),
    )?;
    write_file(
        &base.join("vendor/acme/mod-a/src/Widget.php"),
        "<?php\n\ndeclare(strict_types=1);\n\nnamespace Acme\\ModA;\n\nuse PgFramework\\Module;\n\nclass WidgetModule extends Module {}\n",
    )?;
    write_file(
        &base.join("vendor/psr/log/src/LoggerModule.php"),
        "<?php\nnamespace Psr\\Log;\nclass LoggerModule extends Module {}\n",
    )?;
    Ok(())
}

fn run(base: &Path, args: &[&str]) -> anyhow::Result<Output> {
    let bin = env!("CARGO_BIN_EXE_module-sync");
    let mut cmd = Command::new(bin);
    cmd.arg("--project").arg(base).args(args);
    cmd.env_remove("MODULE_SYNC_TARGET");
    cmd.env_remove("MODULE_SYNC_NO_LOCK");
    cmd.env("RUST_LOG", "info");
    Ok(cmd.output()?)
}

fn run_json(base: &Path, args: &[&str]) -> anyhow::Result<Value> {
    let out = run(base, args)?;
    if !out.status.success() {
        return Err(anyhow::anyhow!(
            "command failed: status={:?}, stderr={}",
            out.status.code(),
            String::from_utf8_lossy(&out.stderr)
        ));
    }
    Ok(serde_json::from_slice(&out.stdout)?)
}

#[test]
fn sync_registers_module_and_is_idempotent() -> anyhow::Result<()> {
    let base = temp_dir("scenario_ab");
    fake_project(&base, "pg-module")?;
    let target = base.join("src/Bootstrap/PgFramework.php");

    let first = run_json(&base, &["sync"])?;
    assert_eq!(first["packages"], serde_json::json!(["acme/mod-a"]));
    assert_eq!(
        first["modules"],
        serde_json::json!({ "Acme\\ModA\\WidgetModule": "WidgetModule" })
    );
    assert_eq!(first["outcome"]["status"], Value::String("changed".to_string()));
    assert_eq!(first["outcome"]["scaffolded"], Value::Bool(true));

    let after_first = std::fs::read_to_string(&target)?;
    assert_eq!(after_first.matches("use Acme\\ModA\\WidgetModule;").count(), 1);
    assert_eq!(after_first.matches("WidgetModule::class,").count(), 1);
    assert!(!after_first.contains("LoggerModule"));

    let second = run_json(&base, &["sync"])?;
    assert_eq!(second["outcome"]["status"], Value::String("unchanged".to_string()));
    assert_eq!(
        second["outcome"]["already_present"],
        serde_json::json!(["Acme\\ModA\\WidgetModule"])
    );
    assert_eq!(std::fs::read_to_string(&target)?, after_first);
    assert_eq!(first["outcome"]["content_hash"], second["outcome"]["content_hash"]);

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn sync_without_module_packages_never_touches_target() -> anyhow::Result<()> {
    let base = temp_dir("scenario_c");
    fake_project(&base, "library")?;

    let report = run_json(&base, &["sync"])?;
    assert_eq!(report["skipped"], Value::String("no-module-packages".to_string()));
    assert!(report["modules"].as_object().is_some_and(|m| m.is_empty()));
    assert!(!base.join("src/Bootstrap/PgFramework.php").exists());

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn sync_reports_packages_without_module_classes() -> anyhow::Result<()> {
    let base = temp_dir("no_classes");
    fake_project(&base, "pg-module")?;
    let report = run_json(&base, &["--marker", "Plugin", "sync"])?;
    assert_eq!(report["skipped"], Value::String("no-module-classes".to_string()));
    assert!(!base.join("src/Bootstrap/PgFramework.php").exists());

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn sync_preserves_hand_written_content() -> anyhow::Result<()> {
    let base = temp_dir("lossless");
    fake_project(&base, "pg-module")?;
    let target = base.join("src/Bootstrap/PgFramework.php");
    let original = "<?php

declare(strict_types=1);

use PgFramework\\Home\\HomeModule;
use Middlewares\\Whoops;

return [
    /* Application modules. Place your own on the list. */
    'modules' => [
        HomeModule::class,
    ],

    'middlewares' => [
        Whoops::class,
    ],
];
";
    write_file(&target, original)?;

    run_json(&base, &["--no-lock", "sync"])?;
    let updated = std::fs::read_to_string(&target)?;
    let expected = original
        .replace(
            "use Middlewares\\Whoops;\n",
            "use Middlewares\\Whoops;\nuse Acme\\ModA\\WidgetModule;\n",
        )
        .replace(
            "        HomeModule::class,\n",
            "        HomeModule::class,\n        WidgetModule::class,\n",
        );
    assert_eq!(updated, expected);

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn sync_fails_on_malformed_target_and_keeps_it() -> anyhow::Result<()> {
    let base = temp_dir("malformed");
    fake_project(&base, "pg-module")?;
    let target = base.join("src/Bootstrap/PgFramework.php");
    let original = "<?php\nreturn ['modules' => []];\n";
    write_file(&target, original)?;

    let out = run(&base, &["sync"])?;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("malformed"));
    assert_eq!(std::fs::read_to_string(&target)?, original);

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn dry_run_and_discover_leave_filesystem_alone() -> anyhow::Result<()> {
    let base = temp_dir("dry_run");
    fake_project(&base, "pg-module")?;
    let target = base.join("src/Bootstrap/PgFramework.php");

    let dry = run_json(&base, &["sync", "--dry-run"])?;
    assert_eq!(dry["outcome"]["added"], serde_json::json!(["Acme\\ModA\\WidgetModule"]));
    assert!(!target.exists());

    let discovered = run_json(&base, &["--detector", "syntax", "discover"])?;
    assert_eq!(
        discovered["modules"],
        serde_json::json!({ "Acme\\ModA\\WidgetModule": "WidgetModule" })
    );
    assert!(!target.exists());

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn scaffold_creates_parseable_skeleton() -> anyhow::Result<()> {
    let base = temp_dir("scaffold");
    fake_project(&base, "pg-module")?;
    let target = base.join("config/modules.php");

    let created = run_json(&base, &["--target", "config/modules.php", "scaffold"])?;
    assert_eq!(created["created"], Value::Bool(true));
    let skeleton = std::fs::read_to_string(&target)?;
    assert!(skeleton.contains("declare(strict_types=1);"));

    let again = run_json(&base, &["--target", "config/modules.php", "scaffold"])?;
    assert_eq!(again["created"], Value::Bool(false));

    let synced = run_json(&base, &["--target", "config/modules.php", "sync"])?;
    assert_eq!(synced["outcome"]["scaffolded"], Value::Bool(false));
    assert_eq!(synced["outcome"]["status"], Value::String("changed".to_string()));

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}
