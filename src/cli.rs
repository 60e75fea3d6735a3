use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::detect::DEFAULT_MARKER;
use crate::discover::{DEFAULT_EXTENSION, DEFAULT_PACKAGE_KIND};

#[derive(Debug, Clone, Parser)]
#[command(name = "module-sync")]
#[command(about = "Register module classes from installed Composer packages in the bootstrap config")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project root (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    pub project: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    pub vendor: Option<PathBuf>,

    /// Composer's installed.json (defaults to <vendor>/composer/installed.json)
    #[arg(long, value_name = "FILE")]
    pub installed: Option<PathBuf>,

    /// Config file to keep in sync
    #[arg(long, value_name = "FILE")]
    pub target: Option<PathBuf>,

    /// Package type that marks a module package
    #[arg(long, value_name = "TYPE", default_value = DEFAULT_PACKAGE_KIND)]
    pub kind: String,

    /// Base class a module class must extend
    #[arg(long, value_name = "CLASS", default_value = DEFAULT_MARKER)]
    pub marker: String,

    #[arg(long, value_name = "EXT", default_value = DEFAULT_EXTENSION)]
    pub ext: String,

    /// Skip source files whose name contains this text (case-insensitive)
    #[arg(long, value_name = "TEXT")]
    pub exclude: Option<String>,

    #[arg(long, value_enum, default_value_t = DetectorKind::Pattern)]
    pub detector: DetectorKind,

    /// Replace the config without taking an exclusive lock
    #[arg(long)]
    pub no_lock: bool,

    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Discover modules and merge them into the config
    Sync {
        #[arg(long)]
        dry_run: bool,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// List module classes without touching the config
    Discover {
        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Write the config skeleton if the target does not exist
    Scaffold,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum DetectorKind {
    /// Regex over the file text
    Pattern,
    /// tree-sitter PHP syntax tree
    Syntax,
}
