// src/recipe/mod.rs

//! Formula system for building a single binary from source
//!
//! A formula defines how to fetch, build, install and smoke-test one
//! command-line tool:
//! - Package identity, license and build-time dependencies
//! - A release archive with its checksum, or a VCS reference for head builds
//! - Toolchain invocation with templated linker flags
//! - Post-install steps such as shell completion generation
//! - Test assertions against the installed binary
//!
//! # Kitchen Terminology
//!
//! - **Formula**: The build specification
//! - **Descriptor**: The immutable per-mode view of a formula
//! - **Cook**: Run a formula through the pipeline
//! - **Kitchen**: Owns configuration, source fetching and cancellation
//!
//! # Example Formula
//!
//! ```toml
//! [package]
//! name = "kube-vap-test"
//! desc = "ValidatingAdmissionPolicy Test Tool for Kubernetes"
//! homepage = "https://github.com/yashirook/kube-vap-test"
//! license = "MIT"
//! depends_on = ["go"]
//!
//! [source]
//! url = "https://github.com/yashirook/kube-vap-test/archive/v1.31.0.tar.gz"
//! sha256 = "PLACEHOLDER_SHA256"
//!
//! [head]
//! vcs = "https://github.com/yashirook/kube-vap-test.git"
//! branch = "main"
//!
//! [build]
//! target = "./cmd/kube-vap-test"
//! flags = [
//!     "-s", "-w",
//!     { symbol = "github.com/yashirook/kube-vap-test/cmd/kube-vap-test/commands.Version", value = "%(version)s" },
//! ]
//!
//! [[post_install]]
//! completions = { subcommand = "completion" }
//!
//! [[test]]
//! args = ["version", "--short"]
//! expect = "%(version)s"
//! ```

pub mod format;
pub mod kitchen;
pub mod parser;
pub mod pipeline;
pub mod post_install;
pub mod resolve;
pub mod smoke;

pub use format::{
    BuildMode, BuildSection, CompletionsStep, FlagEntry, Formula, PackageDescriptor,
    PostInstallStep, Shell, ShellParameterFormat, SourceRef, TestAssertion,
};
pub use kitchen::{
    CancelToken, CurlFetcher, FetchLimits, Invocation, Kitchen, KitchenConfig, SourceFetcher,
};
pub use parser::{parse_formula, parse_formula_file, validate_formula};
pub use pipeline::{PipelineReport, PipelineState, Stage};
pub use resolve::{BuildContext, VariableBinding, resolve_build, resolve_flags, substitute};
pub use smoke::{AssertionResult, SmokeReport};
