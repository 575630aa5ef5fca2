// src/recipe/kitchen/mod.rs

//! Kitchen: where formulas are cooked
//!
//! The Kitchen runs one formula through the pipeline:
//! - Resolve every template against the build context
//! - Check build dependencies and the checksum policy, fetch sources and run
//!   the toolchain
//! - Run post-install steps against the built binary
//! - Run the smoke tests
//!
//! Each stage is a hard gate. The outcome is always a [`PipelineReport`];
//! failures are recorded in it rather than returned as `Err`.

mod archive;
mod config;
mod cook;
pub mod process;

pub use archive::{
    CurlFetcher, FetchLimits, SourceFetcher, clone_repository, download_file, extract_archive,
};
pub use config::KitchenConfig;
pub use cook::{Invocation, check_build_dependencies};
pub use process::{CancelToken, cancel_token};

use crate::error::{Error, Result};
use crate::recipe::format::{Formula, PackageDescriptor, SourceRef};
use crate::recipe::pipeline::{Pipeline, PipelineReport, Stage};
use crate::recipe::resolve::BuildContext;
use cook::Cook;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// The Kitchen: where formulas are cooked
pub struct Kitchen {
    pub(crate) config: KitchenConfig,
    fetcher: Box<dyn SourceFetcher>,
    cancel: CancelToken,
}

impl Kitchen {
    /// Create a new Kitchen fetching with `curl`, `tar` and `git`
    pub fn new(config: KitchenConfig) -> Self {
        let fetcher = Box::new(CurlFetcher::new(config.source_cache.clone()));
        Self::with_fetcher(config, fetcher)
    }

    /// Create a Kitchen with a custom source fetcher
    pub fn with_fetcher(config: KitchenConfig, fetcher: Box<dyn SourceFetcher>) -> Self {
        Self {
            config,
            fetcher,
            cancel: cancel_token(),
        }
    }

    /// Create a Kitchen with default configuration
    pub fn with_defaults() -> Self {
        Self::new(KitchenConfig::default())
    }

    /// Use an externally owned cancellation token
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &KitchenConfig {
        &self.config
    }

    /// Token that stops the run when set
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Limits applied to source fetch helpers
    pub(crate) fn fetch_limits(&self) -> FetchLimits<'_> {
        FetchLimits {
            timeout: self.config.timeout,
            cancel: &self.cancel,
        }
    }

    /// Enforce the checksum policy for a descriptor's source
    ///
    /// A release archive with a placeholder checksum is refused unless
    /// `allow_unverified` is set, in which case it is accepted with a warning.
    pub fn check_source_policy(&self, descriptor: &PackageDescriptor) -> Result<()> {
        let SourceRef::Archive(archive) = descriptor.source() else {
            return Ok(());
        };
        if archive.checksum.is_pinned() {
            return Ok(());
        }

        if self.config.allow_unverified {
            warn!(
                "Accepting unverified checksum '{}' for {}",
                archive.checksum, archive.url
            );
            Ok(())
        } else {
            Err(Error::UnverifiedChecksum {
                url: archive.url.clone(),
                checksum: archive.checksum.to_string(),
            })
        }
    }

    /// Cook a formula through every stage
    ///
    /// The descriptor must come from `formula`; it is what the Load stage
    /// produced.
    pub fn cook(
        &self,
        formula: &Formula,
        descriptor: &PackageDescriptor,
        context: &BuildContext,
    ) -> PipelineReport {
        info!(
            "Cooking {} version {} ({})",
            descriptor.name(),
            descriptor.version(),
            descriptor.mode().as_str()
        );

        let mut pipeline = Pipeline::new(self.cancel.clone());
        let mut cook = Cook::new(self, formula, descriptor, context);

        let resolved = pipeline.run(Stage::Resolve, || cook.resolve());

        let artifact = resolved
            .as_ref()
            .and_then(|resolved| pipeline.run(Stage::Build, || cook.build(resolved)));

        let mut installed = Vec::new();
        let mut post_installed = None;
        if let (Some(resolved), Some(_)) = (&resolved, &artifact) {
            post_installed = pipeline.run(Stage::PostInstall, || {
                let (files, result) = cook.post_install(resolved);
                installed = files;
                result
            });
        }

        let mut smoke = None;
        if let (Some(resolved), Some(())) = (&resolved, post_installed) {
            pipeline.run(Stage::Verify, || {
                let report = cook.verify(resolved)?;
                let verdict = report.verdict();
                smoke = Some(report);
                verdict
            });
        }

        cook.finish();

        let (state, stages, error) = pipeline.finish();
        match &error {
            None => info!("{} {} verified", descriptor.name(), descriptor.version()),
            Some(err) => warn!("{} {}: {}", descriptor.name(), descriptor.version(), err),
        }

        PipelineReport {
            package: descriptor.name().to_string(),
            version: descriptor.version().to_string(),
            mode: Some(descriptor.mode()),
            state,
            stages,
            flags: resolved.map(|r| r.flags).unwrap_or_default(),
            artifact,
            installed,
            smoke,
            output: error
                .as_ref()
                .and_then(|e| e.captured_output())
                .map(str::to_string),
            error,
        }
    }

    /// Fetch sources for a descriptor without building
    ///
    /// Applies the same checksum policy as a build. Returns the source root
    /// below `dest`.
    pub fn fetch(&self, descriptor: &PackageDescriptor, dest: &Path) -> Result<PathBuf> {
        info!(
            "Fetching sources for {} version {}",
            descriptor.name(),
            descriptor.version()
        );
        self.check_source_policy(descriptor)?;
        let root = self
            .fetcher
            .fetch(descriptor.source(), dest, self.fetch_limits())?;
        info!("Fetched {} into {}", descriptor.name(), root.display());
        Ok(root)
    }
}
