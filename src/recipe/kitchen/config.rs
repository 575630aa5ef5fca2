// src/recipe/kitchen/config.rs

//! Configuration types for the Kitchen

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the Kitchen
#[derive(Debug, Clone)]
pub struct KitchenConfig {
    /// Directory for downloaded source archives
    pub source_cache: PathBuf,
    /// Timeout for the toolchain invocation
    pub timeout: Duration,
    /// Timeout for each artifact invocation (completions, smoke tests)
    pub test_timeout: Duration,
    /// Keep build directory after completion (for debugging)
    pub keep_builddir: bool,
    /// Accept release archives whose checksum is a placeholder
    ///
    /// When false, a placeholder checksum stops the pipeline before the
    /// build stage with `UnverifiedChecksum`.
    pub allow_unverified: bool,
}

impl Default for KitchenConfig {
    fn default() -> Self {
        Self {
            source_cache: default_source_cache(),
            timeout: Duration::from_secs(3600), // 1 hour
            test_timeout: Duration::from_secs(60),
            keep_builddir: false,
            allow_unverified: false,
        }
    }
}

fn default_source_cache() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("kettle/sources")
}

impl KitchenConfig {
    /// Configuration that accepts placeholder checksums
    pub fn permissive() -> Self {
        Self {
            allow_unverified: true,
            ..Self::default()
        }
    }
}
