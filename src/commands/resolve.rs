// src/commands/resolve.rs

//! Resolve command - show what a build would run

use super::{build_context, build_mode, load};
use crate::cli::ResolveArgs;
use anyhow::Result;
use kettle::recipe::pipeline::exit_code_for;
use kettle::recipe::{Invocation, Stage, resolve_build};
use std::path::Path;

/// Resolve every template of a formula and print the result
pub fn cmd_resolve(
    formula_path: &str,
    prefix: &str,
    resolve: &ResolveArgs,
    json: bool,
) -> Result<i32> {
    let loaded = match load(Path::new(formula_path), build_mode(resolve)) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("[FAILED] {}", err);
            return Ok(exit_code_for(Stage::Load, &err));
        }
    };

    let context = build_context(prefix, resolve);
    let resolved = match resolve_build(&loaded.formula, &loaded.descriptor, &context) {
        Ok(resolved) => resolved,
        Err(err) => {
            eprintln!("[FAILED] {}", err);
            return Ok(exit_code_for(Stage::Resolve, &err));
        }
    };
    let invocation = Invocation::toolchain(&loaded.formula.build, &resolved);

    if json {
        let value = serde_json::json!({
            "package": loaded.descriptor.name(),
            "version": loaded.descriptor.version(),
            "mode": loaded.descriptor.mode(),
            "variables": resolved.binding,
            "flags": resolved.flags,
            "command": invocation.to_string(),
            "artifact": resolved.artifact,
            "expectations": resolved.expectations,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(0);
    }

    println!(
        "{} version {} ({})",
        loaded.descriptor.name(),
        loaded.descriptor.version(),
        loaded.descriptor.mode().as_str()
    );

    println!("\nVariables:");
    for (key, value) in resolved.binding.iter() {
        println!("  {} = {}", key, value);
    }

    println!("\nFlags:");
    for flag in &resolved.flags {
        println!("  {}", flag);
    }

    println!("\nCommand:\n  {}", invocation);
    println!("\nArtifact: {}", resolved.artifact.display());
    Ok(0)
}
