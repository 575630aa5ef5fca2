// src/commands/cook.rs

//! Cook command - build, install and verify a formula

use super::{build_context, build_mode, load, package_hint, print_report};
use crate::cli::ResolveArgs;
use anyhow::Result;
use kettle::recipe::{CancelToken, Kitchen, KitchenConfig, PipelineReport};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Cook a formula through every stage
///
/// Returns the process exit code for the run.
#[allow(clippy::too_many_arguments)]
pub fn cmd_cook(
    formula_path: &str,
    prefix: &str,
    resolve: &ResolveArgs,
    source_cache: Option<&str>,
    timeout: u64,
    test_timeout: u64,
    allow_unverified: bool,
    keep_builddir: bool,
    json: bool,
    cancel: CancelToken,
) -> Result<i32> {
    let path = Path::new(formula_path);

    if !json {
        println!("Reading formula: {}", path.display());
    }
    let loaded = match load(path, build_mode(resolve)) {
        Ok(loaded) => loaded,
        Err(err) => {
            let report = PipelineReport::load_failure(package_hint(path), err);
            print_report(&report, json)?;
            return Ok(report.exit_code());
        }
    };

    if !json {
        for warning in &loaded.warnings {
            println!("Warning: {}", warning);
        }
    }

    let mut config = KitchenConfig {
        timeout: Duration::from_secs(timeout),
        test_timeout: Duration::from_secs(test_timeout),
        keep_builddir,
        allow_unverified,
        ..Default::default()
    };
    if let Some(cache) = source_cache {
        config.source_cache = PathBuf::from(cache);
    }

    if !json {
        if allow_unverified {
            println!("[WARNING] Unverified source checksums are accepted");
        }
        println!(
            "Cooking {} version {} ({})...",
            loaded.descriptor.name(),
            loaded.descriptor.version(),
            loaded.descriptor.mode().as_str()
        );
    }

    let kitchen = Kitchen::new(config).with_cancel(cancel);
    let context = build_context(prefix, resolve);
    let report = kitchen.cook(&loaded.formula, &loaded.descriptor, &context);

    print_report(&report, json)?;
    info!(
        "Cook of {} finished with exit code {}",
        report.package,
        report.exit_code()
    );
    Ok(report.exit_code())
}
