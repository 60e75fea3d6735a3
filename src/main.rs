use anyhow::{Context, Result};
use clap::Parser;
use module_sync::cli::{Cli, Commands, OutputFormat};
use module_sync::config::{
    build_detector, resolve_discovery_options, resolve_installed_json, resolve_project_dir,
    resolve_sync_options, resolve_target, resolve_vendor_dir,
};
use module_sync::discover::{Discovery, ModuleMap, discover};
use module_sync::package::load_installed_packages;
use module_sync::sync::{SyncOutcome, scaffold, sync};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Err(err) = module_sync::logging::init(cli.verbose) {
        eprintln!("[module-sync] logging unavailable: {err}");
    }

    match cli.command.clone() {
        Commands::Sync { dry_run, format } => {
            let report = run_sync(&cli, dry_run)?;
            write_sync_output(&report, format)?;
        }
        Commands::Discover { format } => {
            let (_, discovery) = run_discovery(&cli)?;
            write_discover_output(&discovery, format)?;
        }
        Commands::Scaffold => {
            let project_dir = resolve_project_dir(&cli)?;
            let target = resolve_target(&cli, &project_dir);
            let created = scaffold(&target)
                .with_context(|| format!("Failed to scaffold {}", target.display()))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "target": target.to_string_lossy(),
                    "created": created,
                }))?
            );
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "kebab-case")]
enum SkipReason {
    NoModulePackages,
    NoModuleClasses,
}

#[derive(Debug, Serialize)]
struct SyncReport {
    target: String,
    packages: Vec<String>,
    modules: ModuleMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    skipped: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<SyncOutcome>,
    duration_ms: u64,
}

fn run_discovery(cli: &Cli) -> Result<(PathBuf, Discovery)> {
    let project_dir = resolve_project_dir(cli)?;
    let vendor_dir = resolve_vendor_dir(cli, &project_dir)?;
    let installed = resolve_installed_json(cli, &project_dir, &vendor_dir);

    tracing::info!("searching {} packages", cli.kind);
    let packages = load_installed_packages(&installed, &vendor_dir)?;
    let detector = build_detector(cli);
    let discovery = discover(&packages, &resolve_discovery_options(cli), detector.as_ref());
    Ok((project_dir, discovery))
}

fn run_sync(cli: &Cli, dry_run: bool) -> Result<SyncReport> {
    let start = Instant::now();
    let (project_dir, discovery) = run_discovery(cli)?;
    let target = resolve_target(cli, &project_dir);

    let skipped = if discovery.packages.is_empty() {
        tracing::info!("no {} packages installed, nothing to do", cli.kind);
        Some(SkipReason::NoModulePackages)
    } else if discovery.is_empty() {
        tracing::info!("no module classes found in {} package(s)", discovery.packages.len());
        Some(SkipReason::NoModuleClasses)
    } else {
        None
    };

    let outcome = match skipped {
        Some(_) => None,
        None => {
            let options = resolve_sync_options(cli, dry_run);
            Some(
                sync(&target, &discovery.modules, &options)
                    .with_context(|| format!("Failed to update {}", target.display()))?,
            )
        }
    };

    Ok(SyncReport {
        target: target.to_string_lossy().to_string(),
        packages: discovery.packages,
        modules: discovery.modules,
        skipped,
        outcome,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

fn write_sync_output(report: &SyncReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            let mut out = String::new();
            out.push_str(&format!("target: {}\n", report.target));
            out.push_str(&format!("packages: {}\n", report.packages.len()));
            out.push_str(&format!("modules: {}\n", report.modules.len()));
            if let Some(reason) = report.skipped {
                out.push_str(&format!("status: skipped ({})\n", serde_json::to_value(reason)?.as_str().unwrap_or_default()));
            }
            if let Some(outcome) = &report.outcome {
                out.push_str(&format!("status: {}\n", serde_json::to_value(outcome.status)?.as_str().unwrap_or_default()));
                for fqn in &outcome.added {
                    out.push_str(&format!("+ {fqn}\n"));
                }
                for fqn in &outcome.already_present {
                    out.push_str(&format!("= {fqn}\n"));
                }
            }
            print!("{out}");
        }
    }
    Ok(())
}

fn write_discover_output(discovery: &Discovery, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(discovery)?),
        OutputFormat::Text => {
            for package in &discovery.packages {
                println!("package: {package}");
            }
            for (fqn, simple) in &discovery.modules {
                println!("- {fqn} ({simple})");
            }
        }
    }
    Ok(())
}
