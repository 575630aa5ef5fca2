// src/recipe/kitchen/archive.rs

//! Source fetching for the Kitchen
//!
//! The pipeline only depends on the [`SourceFetcher`] trait. [`CurlFetcher`]
//! is the default transport: `curl` for archives, `tar` for extraction and
//! `git` for VCS checkouts.

use crate::error::{Error, Result};
use crate::hash::{self, Checksum};
use crate::recipe::format::{ArchiveRef, SourceRef, VcsRef};
use crate::recipe::kitchen::process::{Outcome, ProcessOutput, run_with_timeout};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Time budget and stop flag for the helper processes of one fetch
#[derive(Debug, Clone, Copy)]
pub struct FetchLimits<'a> {
    /// Applies to each helper process separately
    pub timeout: Duration,
    pub cancel: &'a AtomicBool,
}

/// Capability that materializes a source tree
pub trait SourceFetcher {
    /// Fetch `source` below `dest` and return the source root directory
    ///
    /// Archive checksums are verified when pinned. Whether a placeholder
    /// checksum is acceptable is decided by the caller beforehand. Helper
    /// processes must honour `limits`; a cancelled fetch is
    /// [`Error::Cancelled`].
    fn fetch(&self, source: &SourceRef, dest: &Path, limits: FetchLimits<'_>) -> Result<PathBuf>;
}

/// Default fetcher backed by `curl`, `tar` and `git`
#[derive(Debug, Clone)]
pub struct CurlFetcher {
    cache_dir: PathBuf,
}

impl CurlFetcher {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Download an archive into the cache and verify it
    ///
    /// Pinned archives are cached under their checksum and reused when the
    /// cached copy still verifies. Unverified archives are always downloaded
    /// again.
    pub fn download(&self, archive: &ArchiveRef, limits: FetchLimits<'_>) -> Result<PathBuf> {
        fs::create_dir_all(&self.cache_dir)?;

        let cache_key = archive.checksum.cache_key().unwrap_or_else(|| {
            format!("unverified_{}", &hash::sha256(archive.url.as_bytes())[..16])
        });
        let cached_path = self.cache_dir.join(&cache_key);

        if archive.checksum.is_pinned() && cached_path.exists() {
            debug!("Using cached source: {}", cached_path.display());
            if verify(&cached_path, &archive.checksum)?.is_ok() {
                return Ok(cached_path);
            }
            warn!("Cached file checksum mismatch, re-downloading");
            fs::remove_file(&cached_path)?;
        }

        info!("Downloading: {}", archive.url);
        let temp_path = self.cache_dir.join(format!("{}.tmp", cache_key));
        if let Err(e) = download_file(&archive.url, &temp_path, limits) {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        if let Err(actual) = verify(&temp_path, &archive.checksum)? {
            fs::remove_file(&temp_path)?;
            return Err(Error::ChecksumMismatch {
                expected: archive.checksum.to_string(),
                actual,
            });
        }

        fs::rename(&temp_path, &cached_path)?;
        Ok(cached_path)
    }

    fn fetch_archive(
        &self,
        archive: &ArchiveRef,
        dest: &Path,
        limits: FetchLimits<'_>,
    ) -> Result<PathBuf> {
        let cached = self.download(archive, limits)?;
        let source_dir = dest.join("source");
        fs::create_dir_all(&source_dir)?;

        extract_archive(&cached, &archive.filename(), &source_dir, limits)?;
        Ok(single_top_level_dir(&source_dir)?.unwrap_or(source_dir))
    }
}

impl SourceFetcher for CurlFetcher {
    fn fetch(&self, source: &SourceRef, dest: &Path, limits: FetchLimits<'_>) -> Result<PathBuf> {
        match source {
            SourceRef::Archive(archive) => self.fetch_archive(archive, dest, limits),
            SourceRef::Vcs(vcs) => clone_repository(vcs, &dest.join("source"), limits),
        }
    }
}

/// Run one fetch helper to completion
///
/// Launch failures and timeouts are download errors. Only a clean exit
/// returns `Ok`; a non-zero exit is reported with `describe` and stderr.
fn run_helper(cmd: &mut Command, describe: &str, limits: FetchLimits<'_>) -> Result<ProcessOutput> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let output = run_with_timeout(cmd, limits.timeout, limits.cancel)
        .map_err(|e| Error::DownloadError(format!("{} failed: {}", program, e)))?;

    match output.outcome {
        Outcome::Cancelled => Err(Error::Cancelled(format!("fetch ({})", program))),
        Outcome::TimedOut => Err(Error::DownloadError(format!(
            "{}: {} timed out after {} seconds",
            describe,
            program,
            limits.timeout.as_secs()
        ))),
        Outcome::Exited(status) if !status.success() => Err(Error::DownloadError(format!(
            "{}: {}",
            describe,
            output.stderr.trim()
        ))),
        Outcome::Exited(_) => Ok(output),
    }
}

fn verify(path: &Path, checksum: &Checksum) -> Result<std::result::Result<(), String>> {
    let result = hash::verify_file(path, checksum)?;
    Ok(result.map_err(|actual| match checksum {
        Checksum::Pinned { algorithm, .. } => format!("{}:{}", algorithm, actual),
        Checksum::Placeholder(_) => actual,
    }))
}

/// Download a file from a URL
pub fn download_file(url: &str, dest: &Path, limits: FetchLimits<'_>) -> Result<()> {
    let mut cmd = Command::new("curl");
    cmd.args(["-fsSL", "-o"]).arg(dest).arg(url);
    run_helper(&mut cmd, &format!("Failed to download {}", url), limits)?;
    Ok(())
}

/// Extract an archive to a destination directory
///
/// The format is taken from `filename` since cached archives are stored
/// under their checksum. Supports: .tar.gz, .tgz, .tar.xz, .txz, .tar.bz2,
/// .tbz2, .tar.zst, .tar
pub fn extract_archive(
    archive: &Path,
    filename: &str,
    dest: &Path,
    limits: FetchLimits<'_>,
) -> Result<()> {
    let mode: &[&str] = if filename.ends_with(".tar.gz") || filename.ends_with(".tgz") {
        &["-xzf"]
    } else if filename.ends_with(".tar.xz") || filename.ends_with(".txz") {
        &["-xJf"]
    } else if filename.ends_with(".tar.bz2") || filename.ends_with(".tbz2") {
        &["-xjf"]
    } else if filename.ends_with(".tar.zst") {
        &["--zstd", "-xf"]
    } else if filename.ends_with(".tar") {
        &["-xf"]
    } else {
        return Err(Error::DownloadError(format!(
            "Unknown archive format: {}",
            filename
        )));
    };

    let mut cmd = Command::new("tar");
    cmd.args(mode).arg(archive).arg("-C").arg(dest);
    run_helper(&mut cmd, "Failed to extract archive", limits)?;
    Ok(())
}

/// Shallow-clone a VCS reference into `dest`
pub fn clone_repository(vcs: &VcsRef, dest: &Path, limits: FetchLimits<'_>) -> Result<PathBuf> {
    info!("Cloning: {}", vcs.url);

    let mut cmd = Command::new("git");
    cmd.args(["clone", "--depth", "1"]);
    if let Some(branch) = &vcs.branch {
        cmd.args(["--branch", branch.as_str()]);
    }
    cmd.arg(&vcs.url).arg(dest).env("GIT_TERMINAL_PROMPT", "0");
    run_helper(&mut cmd, &format!("Failed to clone {}", vcs.url), limits)?;
    Ok(dest.to_path_buf())
}

/// The only entry of `dir`, when it is a directory
///
/// Archives usually wrap their content in one `<name>-<version>/` folder.
fn single_top_level_dir(dir: &Path) -> Result<Option<PathBuf>> {
    let entries: Vec<_> = fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();

    if entries.len() == 1 && entries[0].file_type().map(|t| t.is_dir()).unwrap_or(false) {
        debug!("Source directory: {}", entries[0].path().display());
        return Ok(Some(entries[0].path()));
    }
    Ok(None)
}
