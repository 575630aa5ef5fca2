// src/commands/mod.rs
//! Command implementations for kettle

mod completions;
mod cook;
mod fetch;
mod resolve;
mod validate;

pub use completions::cmd_completions;
pub use cook::cmd_cook;
pub use fetch::cmd_fetch;
pub use resolve::cmd_resolve;
pub use test::cmd_test;
pub use validate::cmd_validate;

use crate::cli::ResolveArgs;
use anyhow::Result;
use kettle::recipe::{BuildContext, BuildMode, Formula, PackageDescriptor, PipelineReport, PipelineState};
use kettle::{parse_formula_file, validate_formula};
use std::path::Path;

/// A formula that made it through the Load stage
pub(crate) struct Loaded {
    pub formula: Formula,
    pub descriptor: PackageDescriptor,
    pub warnings: Vec<String>,
}

/// Load stage: parse, validate and build the descriptor for `mode`
pub(crate) fn load(path: &Path, mode: BuildMode) -> kettle::Result<Loaded> {
    let formula = parse_formula_file(path)?;
    let warnings = validate_formula(&formula)?;
    let descriptor = formula.descriptor(mode)?;
    Ok(Loaded {
        formula,
        descriptor,
        warnings,
    })
}

/// Package name to report before a formula is loaded
pub(crate) fn package_hint(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub(crate) fn build_mode(args: &ResolveArgs) -> BuildMode {
    if args.head {
        BuildMode::Head
    } else {
        BuildMode::Release
    }
}

pub(crate) fn build_context(prefix: &str, args: &ResolveArgs) -> BuildContext {
    let mut context = BuildContext::new(prefix);
    if let Some(commit) = &args.commit {
        context = context.with_commit(commit.clone());
    }
    if let Some(user) = &args.tap_user {
        context = context.with_tap_user(user.clone());
    }
    context
}

/// Print a run report, as JSON or for humans
pub(crate) fn print_report(report: &PipelineReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!();
    for record in &report.stages {
        let status = if record.succeeded { "OK" } else { "FAILED" };
        println!("  [{}] {} ({} ms)", status, record.stage, record.duration_ms);
    }

    if !report.flags.is_empty() {
        println!("\nBuild flags: {}", report.flags.join(" "));
    }

    if !report.installed.is_empty() {
        println!("\nInstalled files:");
        for path in &report.installed {
            println!("  - {}", path.display());
        }
    }

    if let Some(smoke) = &report.smoke {
        println!("\nSmoke tests:");
        for result in &smoke.results {
            match &result.message {
                None => println!("  [PASS] {}", result.id),
                Some(message) => println!("  [FAIL] {}: {}", result.id, message),
            }
        }
    }

    match &report.state {
        PipelineState::Verified => {
            let artifact = report
                .artifact
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            println!(
                "\n[COMPLETE] {} {} verified: {}",
                report.package, report.version, artifact
            );
        }
        state => {
            eprintln!("\n[FAILED] {}", state);
            if let Some(output) = &report.output {
                eprintln!("\nCaptured output:\n{}", output.trim_end());
            }
        }
    }

    Ok(())
}
