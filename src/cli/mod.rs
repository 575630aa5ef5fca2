// src/cli/mod.rs
//! CLI definitions for kettle
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.
//!
//! - `cook` - Run a formula through every stage
//! - `validate` - Check a formula without building
//! - `resolve` - Show the resolved flags and toolchain command
//! - `fetch` - Download and unpack sources only
//! - `test` - Smoke-test an already installed binary
//! - `completions` - Shell completions for kettle itself

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "kettle")]
#[command(author = "Kettle Project")]
#[command(version)]
#[command(about = "Build, install and smoke-test a binary from a formula", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Options that change how templates resolve
#[derive(Args, Debug, Clone, Default)]
pub struct ResolveArgs {
    /// Build from the VCS head instead of the release archive
    #[arg(long)]
    pub head: bool,

    /// Commit identifier bound to %(commit)s
    #[arg(long)]
    pub commit: Option<String>,

    /// Tap user bound to %(tap_user)s (default: $KETTLE_TAP_USER, then $USER)
    #[arg(long)]
    pub tap_user: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build, install and verify a formula
    Cook {
        /// Path to the formula file
        formula: String,

        /// Installation prefix; the binary lands in <prefix>/bin
        #[arg(short, long)]
        prefix: String,

        #[command(flatten)]
        resolve: ResolveArgs,

        /// Source cache directory (default: <user cache dir>/kettle/sources)
        #[arg(long)]
        source_cache: Option<String>,

        /// Toolchain timeout in seconds
        #[arg(long, default_value = "3600")]
        timeout: u64,

        /// Timeout in seconds for each post-install step and assertion
        #[arg(long, default_value = "60")]
        test_timeout: u64,

        /// Accept a release archive whose checksum is a placeholder
        #[arg(long)]
        allow_unverified: bool,

        /// Keep the build directory after completion
        #[arg(long)]
        keep_builddir: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a formula without building
    Validate {
        /// Path to the formula file
        formula: String,
    },

    /// Resolve templates and print the flags and toolchain command
    Resolve {
        /// Path to the formula file
        formula: String,

        /// Installation prefix used for %(prefix)s and the output path
        #[arg(short, long, default_value = "/usr/local")]
        prefix: String,

        #[command(flatten)]
        resolve: ResolveArgs,

        /// Print the variable binding and flags as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch and unpack sources without building
    Fetch {
        /// Path to the formula file
        formula: String,

        /// Fetch the VCS head instead of the release archive
        #[arg(long)]
        head: bool,

        /// Directory to unpack into (default: a new temporary directory)
        #[arg(short, long)]
        dest: Option<String>,

        /// Source cache directory (default: <user cache dir>/kettle/sources)
        #[arg(long)]
        source_cache: Option<String>,

        /// Timeout in seconds for each download, extraction or clone
        #[arg(long, default_value = "3600")]
        timeout: u64,

        /// Accept a release archive whose checksum is a placeholder
        #[arg(long)]
        allow_unverified: bool,
    },

    /// Run the smoke tests against an installed binary
    Test {
        /// Path to the formula file
        formula: String,

        /// Installation prefix the binary was installed under
        #[arg(short, long)]
        prefix: String,

        #[command(flatten)]
        resolve: ResolveArgs,

        /// Timeout in seconds for each assertion
        #[arg(long, default_value = "60")]
        test_timeout: u64,

        /// Print the assertion results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts for kettle
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
