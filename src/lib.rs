//! # module-sync
//!
//! Keeps a PHP application's bootstrap config in step with the module
//! packages installed by Composer.
//!
//! ## Architecture
//!
//! - **package**: installed package records, kind filter and the `installed.json` reader
//! - **autoload**: psr-4 namespace map → concrete source directories
//! - **scan**: recursive source file listing
//! - **detect**: `ClassDetector` trait and the regex-based detector
//! - **syntax**: tree-sitter based detector
//! - **discover**: package → module class aggregation
//! - **document**: parser/renderer for the generated config file
//! - **sync**: scaffold, merge and atomic rewrite of the config
//! - **config**: CLI/env/project-default resolution
//! - **logging**: tracing subscriber setup

pub mod autoload;
pub mod cli;
pub mod config;
pub mod detect;
pub mod discover;
pub mod document;
pub mod error;
pub mod logging;
pub mod package;
pub mod scan;
pub mod sync;
pub mod syntax;
