// src/commands/fetch.rs

//! Fetch command - download and unpack sources only

use super::load;
use anyhow::{Context, Result};
use kettle::recipe::pipeline::exit_code_for;
use kettle::recipe::{BuildMode, CancelToken, Kitchen, KitchenConfig, Stage};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fetch the sources of a formula, returning the exit code
pub fn cmd_fetch(
    formula_path: &str,
    head: bool,
    dest: Option<&str>,
    source_cache: Option<&str>,
    timeout: u64,
    allow_unverified: bool,
    cancel: CancelToken,
) -> Result<i32> {
    let mode = if head { BuildMode::Head } else { BuildMode::Release };
    let loaded = match load(Path::new(formula_path), mode) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("[FAILED] {}", err);
            return Ok(exit_code_for(Stage::Load, &err));
        }
    };

    let dest = match dest {
        Some(dest) => {
            let dest = PathBuf::from(dest);
            std::fs::create_dir_all(&dest)
                .with_context(|| format!("Failed to create directory: {}", dest.display()))?;
            dest
        }
        None => tempfile::Builder::new()
            .prefix("kettle-fetch-")
            .tempdir()
            .context("Failed to create fetch directory")?
            .keep(),
    };

    let mut config = KitchenConfig {
        timeout: Duration::from_secs(timeout),
        allow_unverified,
        ..Default::default()
    };
    if let Some(cache) = source_cache {
        config.source_cache = PathBuf::from(cache);
    }
    let kitchen = Kitchen::new(config).with_cancel(cancel);

    println!("Fetching sources for {}...", loaded.descriptor.source());
    match kitchen.fetch(&loaded.descriptor, &dest) {
        Ok(root) => {
            println!("\n[COMPLETE] Sources unpacked into {}", root.display());
            Ok(0)
        }
        Err(err) => {
            eprintln!("[FAILED] {}", err);
            Ok(exit_code_for(Stage::Build, &err))
        }
    }
}
