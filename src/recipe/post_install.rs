// src/recipe/post_install.rs

//! Post-install steps run against the freshly built artifact
//!
//! Steps run strictly in declared order. A completion step asks the
//! executable for one script per shell; all scripts of a step are generated
//! before any is written, so a step either lands completely or not at all.
//! Files written by earlier steps stay in place when a later step fails.

use crate::error::{Error, Result};
use crate::recipe::format::{CompletionsStep, PostInstallStep, Shell};
use crate::recipe::kitchen::process::{Outcome, run_with_timeout};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tracing::{debug, info};

/// Executes post-install steps and records what they wrote
pub struct PostInstallRunner<'a> {
    prefix: &'a Path,
    binary: &'a str,
    timeout: Duration,
    cancel: &'a AtomicBool,
    installed: Vec<PathBuf>,
}

impl<'a> PostInstallRunner<'a> {
    /// `binary` is the executable under `<prefix>/bin` steps act on by default
    pub fn new(prefix: &'a Path, binary: &'a str, timeout: Duration, cancel: &'a AtomicBool) -> Self {
        Self {
            prefix,
            binary,
            timeout,
            cancel,
            installed: Vec::new(),
        }
    }

    /// Run every step, stopping at the first failure
    pub fn run(&mut self, steps: &[PostInstallStep]) -> Result<()> {
        for (index, step) in steps.iter().enumerate() {
            info!(
                "Post-install step {}/{}: {}",
                index + 1,
                steps.len(),
                step.name()
            );
            match step {
                PostInstallStep::Completions(completions) => self.completions(step, completions)?,
            }
        }
        Ok(())
    }

    /// Files written so far, in order
    pub fn installed(&self) -> &[PathBuf] {
        &self.installed
    }

    pub fn into_installed(self) -> Vec<PathBuf> {
        self.installed
    }

    fn completions(&mut self, step: &PostInstallStep, completions: &CompletionsStep) -> Result<()> {
        let executable_name = completions.executable.as_deref().unwrap_or(self.binary);
        let executable = self.prefix.join("bin").join(executable_name);
        let base_name = completions.base_name.as_deref().unwrap_or(executable_name);

        let mut scripts = Vec::with_capacity(completions.shells.len());
        for shell in &completions.shells {
            let script = self.generate(step, completions, &executable, *shell)?;
            scripts.push((shell.completion_path(self.prefix, base_name), script));
        }

        for (path, script) in scripts {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, script)?;
            debug!("Installed completion: {}", path.display());
            self.installed.push(path);
        }
        Ok(())
    }

    fn generate(
        &self,
        step: &PostInstallStep,
        completions: &CompletionsStep,
        executable: &Path,
        shell: Shell,
    ) -> Result<String> {
        let shell_args = completions.shell_parameter_format.shell_args(shell);
        let invocation = std::iter::once(completions.subcommand.as_str())
            .chain(shell_args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        let unsupported = || Error::UnsupportedPostInstallStep {
            step: step.name(),
            capability: format!("`{}` emitting a {} completion script", invocation, shell.as_str()),
        };

        let mut cmd = Command::new(executable);
        cmd.arg(&completions.subcommand)
            .args(&shell_args)
            .env("SHELL", shell.as_str());

        let output = run_with_timeout(&mut cmd, self.timeout, self.cancel).map_err(|e| {
            Error::UnsupportedPostInstallStep {
                step: step.name(),
                capability: format!("a launchable executable {} ({})", executable.display(), e),
            }
        })?;

        match output.outcome {
            Outcome::Cancelled => Err(Error::Cancelled(format!("post-install {}", step.name()))),
            Outcome::TimedOut => Err(unsupported()),
            Outcome::Exited(status) if !status.success() => {
                debug!("{} exited with {}: {}", invocation, status, output.stderr.trim());
                Err(unsupported())
            }
            Outcome::Exited(_) if output.stdout.trim().is_empty() => Err(unsupported()),
            Outcome::Exited(_) => Ok(output.stdout),
        }
    }
}
