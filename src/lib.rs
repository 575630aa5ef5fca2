// src/lib.rs

//! Kettle formula interpreter
//!
//! Builds, installs and smoke-tests a single command-line binary from a
//! declarative formula.
//!
//! # Architecture
//!
//! - Formulas: TOML descriptors with package identity, sources, templated
//!   build flags, post-install steps and test assertions
//! - Pipeline: Loaded -> Resolved -> Built -> PostInstalled -> Verified, with
//!   any stage able to end the run in Failed
//! - Kitchen: owns configuration, source fetching and cancellation
//! - Reports: every run yields a serializable report and an exit code

mod error;
pub mod hash;
pub mod recipe;

pub use error::{Error, Result};
pub use hash::{Checksum, HashAlgorithm};
pub use recipe::{
    BuildContext, BuildMode, Formula, Kitchen, KitchenConfig, PackageDescriptor, PipelineReport,
    PipelineState, Stage, parse_formula, parse_formula_file, validate_formula,
};
