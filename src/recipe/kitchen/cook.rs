// src/recipe/kitchen/cook.rs

//! Cook: stage execution for a single formula build

use crate::error::{Error, Result};
use crate::recipe::format::{BuildSection, Formula, PackageDescriptor};
use crate::recipe::kitchen::process::{Outcome, run_with_timeout};
use crate::recipe::post_install::PostInstallRunner;
use crate::recipe::resolve::{BuildContext, ResolvedBuild, resolve_build};
use crate::recipe::smoke::{SmokeReport, run_assertions};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::Kitchen;

/// A fully assembled toolchain command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    /// Assemble `<toolchain> <verb> [args] [std args] [<flags_arg> <flags>] <target>`
    pub fn toolchain(build: &BuildSection, resolved: &ResolvedBuild) -> Self {
        let mut args = vec![build.verb.clone()];
        args.extend(resolved.args.iter().cloned());

        if build.std_args {
            args.push("-trimpath".to_string());
            args.push("-o".to_string());
            args.push(resolved.artifact.to_string_lossy().into_owned());
        }

        if !resolved.flags.is_empty() {
            args.push(build.flags_arg.clone());
            args.push(resolved.joined_flags());
        }

        args.push(build.target.clone());

        Self {
            program: build.toolchain.clone(),
            args,
            env: resolved.environment.clone(),
        }
    }

    fn command(&self, workdir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(workdir);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{}={} ", key, shell_quote(value))?;
        }
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

fn shell_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+%@".contains(c))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Check that every build dependency is on `PATH`
pub fn check_build_dependencies(dependencies: &[String]) -> Result<()> {
    for dep in dependencies {
        match which::which(dep) {
            Ok(path) => debug!("Build dependency {} found at {}", dep, path.display()),
            Err(_) => return Err(Error::MissingBuildDependency(dep.clone())),
        }
    }
    Ok(())
}

/// A single cook operation
pub struct Cook<'a> {
    pub(super) kitchen: &'a Kitchen,
    pub(super) formula: &'a Formula,
    pub(super) descriptor: &'a PackageDescriptor,
    pub(super) context: &'a BuildContext,
    /// Temporary build directory, created by the build stage
    pub(super) build_dir: Option<TempDir>,
    /// Build log accumulator
    pub(super) log: String,
}

impl<'a> Cook<'a> {
    pub(super) fn new(
        kitchen: &'a Kitchen,
        formula: &'a Formula,
        descriptor: &'a PackageDescriptor,
        context: &'a BuildContext,
    ) -> Self {
        Self {
            kitchen,
            formula,
            descriptor,
            context,
            build_dir: None,
            log: String::new(),
        }
    }

    /// Resolve stage: expand every template
    pub(super) fn resolve(&mut self) -> Result<ResolvedBuild> {
        let resolved = resolve_build(self.formula, self.descriptor, self.context)?;
        for flag in &resolved.flags {
            debug!("Resolved flag: {}", flag);
        }
        self.log_line(&format!("Resolved {} flag(s)", resolved.flags.len()));
        Ok(resolved)
    }

    /// Build stage: fetch sources and run the toolchain
    ///
    /// Returns the path of the produced binary.
    pub(super) fn build(&mut self, resolved: &ResolvedBuild) -> Result<PathBuf> {
        check_build_dependencies(self.descriptor.build_dependencies())?;
        self.kitchen.check_source_policy(self.descriptor)?;

        let build_dir = tempfile::Builder::new()
            .prefix("kettle-build-")
            .tempdir()
            .map_err(|e| Error::IoError(format!("Failed to create build directory: {}", e)))?;

        let build_path = build_dir.path().to_path_buf();
        self.build_dir = Some(build_dir);

        info!("Fetching {}", self.descriptor.source());
        let source_dir = self.kitchen.fetcher.fetch(
            self.descriptor.source(),
            &build_path,
            self.kitchen.fetch_limits(),
        )?;
        self.log_line(&format!("Fetched source: {}", self.descriptor.source().url()));

        if let Some(parent) = resolved.artifact.parent() {
            fs::create_dir_all(parent)?;
        }

        let invocation = Invocation::toolchain(&self.formula.build, resolved);
        info!("Running: {}", invocation);
        self.log_line(&format!("Running: {}", invocation));

        let output = run_with_timeout(
            &mut invocation.command(&source_dir),
            self.kitchen.config.timeout,
            &self.kitchen.cancel,
        )
        .map_err(|e| Error::BuildFailed {
            reason: format!("failed to launch {}: {}", invocation.program, e),
            exit_code: None,
            output: String::new(),
        })?;

        let combined = output.combined();
        for line in combined.lines() {
            debug!("[build] {}", line);
        }
        self.log.push_str(&combined);

        match output.outcome {
            Outcome::Cancelled => return Err(Error::Cancelled("build".to_string())),
            Outcome::TimedOut => {
                return Err(Error::BuildFailed {
                    reason: format!(
                        "{} timed out after {} seconds",
                        invocation.program,
                        self.kitchen.config.timeout.as_secs()
                    ),
                    exit_code: None,
                    output: combined,
                });
            }
            Outcome::Exited(status) if !status.success() => {
                return Err(Error::BuildFailed {
                    reason: format!("{} exited with {}", invocation.program, status),
                    exit_code: status.code(),
                    output: combined,
                });
            }
            Outcome::Exited(_) => {}
        }

        if !resolved.artifact.is_file() {
            return Err(Error::BuildFailed {
                reason: format!(
                    "{} reported success but {} does not exist",
                    invocation.program,
                    resolved.artifact.display()
                ),
                exit_code: Some(0),
                output: combined,
            });
        }

        self.log_line(&format!("Built {}", resolved.artifact.display()));
        Ok(resolved.artifact.clone())
    }

    /// Post-install stage
    ///
    /// Returns the files written, including those of steps that completed
    /// before a failing one.
    pub(super) fn post_install(&mut self, resolved: &ResolvedBuild) -> (Vec<PathBuf>, Result<()>) {
        let mut runner = PostInstallRunner::new(
            &resolved.prefix,
            self.formula.binary_name(),
            self.kitchen.config.test_timeout,
            &self.kitchen.cancel,
        );
        let result = runner.run(&self.formula.post_install);
        let installed = runner.into_installed();
        self.log_line(&format!("Post-install wrote {} file(s)", installed.len()));
        (installed, result)
    }

    /// Verify stage: run every smoke test assertion
    pub(super) fn verify(&mut self, resolved: &ResolvedBuild) -> Result<SmokeReport> {
        let report = run_assertions(
            &resolved.artifact,
            &self.formula.tests,
            &resolved.expectations,
            self.kitchen.config.test_timeout,
            &self.kitchen.cancel,
        )?;
        self.log_line(&format!(
            "{} of {} assertion(s) passed",
            report.results.len() - report.failed(),
            report.results.len()
        ));
        Ok(report)
    }

    /// Release the build directory, keeping it on disk when configured
    pub(super) fn finish(&mut self) {
        let Some(build_dir) = self.build_dir.take() else {
            return;
        };
        if self.kitchen.config.keep_builddir {
            let kept = build_dir.keep();
            info!("Keeping build directory: {}", kept.display());
        } else if let Err(e) = build_dir.close() {
            warn!("Failed to remove build directory: {}", e);
        }
    }

    fn log_line(&mut self, line: &str) {
        self.log.push_str(line);
        self.log.push('\n');
    }
}
