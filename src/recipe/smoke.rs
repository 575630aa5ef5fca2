// src/recipe/smoke.rs

//! Smoke tests against the installed artifact
//!
//! Every assertion is evaluated, even after one fails, so the report shows
//! the full picture. Each invocation runs in its own scratch directory which
//! also serves as `HOME`, keeping the artifact away from the user's files.

use crate::error::{Error, Result};
use crate::recipe::format::TestAssertion;
use crate::recipe::kitchen::process::{Outcome, run_with_timeout};
use serde::Serialize;
use std::path::Path;
use std::process::Command;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tracing::{info, warn};

/// Output kept in a failure report
pub const SNIPPET_LIMIT: usize = 512;

/// Outcome of one assertion
#[derive(Debug, Serialize)]
pub struct AssertionResult {
    pub id: String,
    pub args: Vec<String>,
    pub passed: bool,
    pub exit_code: Option<i32>,
    /// Leading part of the captured output, on failure
    pub snippet: Option<String>,
    /// Failure message
    pub message: Option<String>,
    #[serde(skip)]
    pub error: Option<Error>,
}

impl AssertionResult {
    fn pass(id: String, args: Vec<String>, exit_code: Option<i32>) -> Self {
        Self {
            id,
            args,
            passed: true,
            exit_code,
            snippet: None,
            message: None,
            error: None,
        }
    }

    fn fail(id: String, args: Vec<String>, exit_code: Option<i32>, error: Error) -> Self {
        Self {
            id,
            args,
            passed: false,
            exit_code,
            snippet: error.captured_output().map(str::to_string),
            message: Some(error.to_string()),
            error: Some(error),
        }
    }

    /// Whether the artifact could not be started at all
    pub fn is_launch_error(&self) -> bool {
        matches!(self.error, Some(Error::AssertionLaunchError { .. }))
    }
}

/// Per-assertion results for one run
#[derive(Debug, Default, Serialize)]
pub struct SmokeReport {
    pub results: Vec<AssertionResult>,
}

impl SmokeReport {
    /// Logical AND of all assertion results
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.passed).count()
    }

    /// Overall verdict as a stage result
    pub fn verdict(&self) -> Result<()> {
        if self.passed() {
            Ok(())
        } else {
            Err(Error::VerificationFailed {
                failed: self.failed(),
                total: self.results.len(),
            })
        }
    }
}

/// Run all assertions against `executable`
///
/// `expectations` holds the resolved expected substring of each assertion,
/// in the same order as `assertions`. Only cancellation aborts the run.
pub fn run_assertions(
    executable: &Path,
    assertions: &[TestAssertion],
    expectations: &[String],
    timeout: Duration,
    cancel: &AtomicBool,
) -> Result<SmokeReport> {
    let mut report = SmokeReport::default();

    for (index, (assertion, expected)) in assertions.iter().zip(expectations).enumerate() {
        let id = assertion
            .id
            .clone()
            .unwrap_or_else(|| format!("test-{}", index + 1));

        let result = run_one(executable, &id, assertion, expected, timeout, cancel)?;
        if result.passed {
            info!("[PASS] {}", id);
        } else {
            warn!(
                "[FAIL] {}: {}",
                id,
                result.message.as_deref().unwrap_or_default()
            );
        }
        report.results.push(result);
    }

    Ok(report)
}

fn run_one(
    executable: &Path,
    id: &str,
    assertion: &TestAssertion,
    expected: &str,
    timeout: Duration,
    cancel: &AtomicBool,
) -> Result<AssertionResult> {
    let args = assertion.args.clone();
    let program = executable.display().to_string();

    let scratch = tempfile::tempdir()?;
    let mut cmd = Command::new(executable);
    cmd.args(&assertion.args)
        .current_dir(scratch.path())
        .env("HOME", scratch.path());

    let output = match run_with_timeout(&mut cmd, timeout, cancel) {
        Ok(output) => output,
        Err(e) => {
            let error = Error::AssertionLaunchError {
                id: id.to_string(),
                program,
                message: e.to_string(),
            };
            return Ok(AssertionResult::fail(id.to_string(), args, None, error));
        }
    };

    let combined = output.combined();
    let mismatch = |message: String| Error::AssertionMismatch {
        id: id.to_string(),
        message,
        snippet: snippet(&combined),
    };

    let exit_code = output.exit_code();
    let error = match output.outcome {
        Outcome::Cancelled => return Err(Error::Cancelled(format!("verify {}", id))),
        Outcome::TimedOut => Some(mismatch(format!(
            "timed out after {} seconds",
            timeout.as_secs()
        ))),
        Outcome::Exited(_) if exit_code != Some(assertion.status) => Some(mismatch(format!(
            "expected exit status {}, got {}",
            assertion.status,
            exit_code.map_or_else(|| "a signal".to_string(), |c| c.to_string())
        ))),
        Outcome::Exited(_) if !combined.contains(expected) => {
            Some(mismatch(format!("output does not contain '{}'", expected)))
        }
        Outcome::Exited(_) => None,
    };

    Ok(match error {
        Some(error) => AssertionResult::fail(id.to_string(), args, exit_code, error),
        None => AssertionResult::pass(id.to_string(), args, exit_code),
    })
}

/// First `SNIPPET_LIMIT` bytes of `output`, cut on a char boundary
fn snippet(output: &str) -> String {
    if output.len() <= SNIPPET_LIMIT {
        return output.to_string();
    }
    let mut end = SNIPPET_LIMIT;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    output[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assertion(id: Option<&str>, args: &[&str], expect: &str) -> TestAssertion {
        TestAssertion {
            id: id.map(str::to_string),
            args: args.iter().map(|a| a.to_string()).collect(),
            expect: expect.to_string(),
            status: 0,
        }
    }

    #[test]
    fn test_snippet_limit() {
        assert_eq!(snippet("short"), "short");
        let long = "é".repeat(400);
        let cut = snippet(&long);
        assert!(cut.len() <= SNIPPET_LIMIT);
        assert!(cut.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_empty_report_passes() {
        let report = SmokeReport::default();
        assert!(report.passed());
        assert!(report.verdict().is_ok());
    }

    #[test]
    fn test_missing_artifact_is_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = AtomicBool::new(false);
        let tests = vec![assertion(None, &["version", "--short"], "1.31.0")];

        let report = run_assertions(
            &dir.path().join("bin/missing"),
            &tests,
            &["1.31.0".to_string()],
            Duration::from_secs(5),
            &cancel,
        )
        .unwrap();

        assert!(!report.passed());
        assert_eq!(report.results[0].id, "test-1");
        assert!(report.results[0].is_launch_error());
        assert!(matches!(
            report.verdict(),
            Err(Error::VerificationFailed { failed: 1, total: 1 })
        ));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        const FAKE_TOOL: &str = r#"#!/bin/sh
case "$1" in
    version) echo "1.31.0" ;;
    --help) echo "kube-vap-test - ValidatingAdmissionPolicy Test Tool for Kubernetes" ;;
    fail) echo "bad input" >&2; exit 3 ;;
    *) echo "unknown" ;;
esac
"#;

        fn fake_tool(dir: &Path) -> std::path::PathBuf {
            let path = dir.join("kube-vap-test");
            fs::write(&path, FAKE_TOOL).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn test_version_and_help_assertions_pass() {
            let dir = tempfile::tempdir().unwrap();
            let tool = fake_tool(dir.path());
            let cancel = AtomicBool::new(false);
            let tests = vec![
                assertion(Some("version"), &["version", "--short"], "%(version)s"),
                assertion(Some("help"), &["--help"], "ValidatingAdmissionPolicy Test Tool"),
            ];
            let expectations = vec![
                "1.31.0".to_string(),
                "ValidatingAdmissionPolicy Test Tool".to_string(),
            ];

            let report =
                run_assertions(&tool, &tests, &expectations, Duration::from_secs(10), &cancel)
                    .unwrap();
            assert!(report.passed(), "{report:?}");
            assert_eq!(report.results.len(), 2);
            assert_eq!(report.results[1].id, "help");
        }

        #[test]
        fn test_failures_do_not_stop_other_assertions() {
            let dir = tempfile::tempdir().unwrap();
            let tool = fake_tool(dir.path());
            let cancel = AtomicBool::new(false);
            let tests = vec![
                assertion(Some("wrong-version"), &["version"], "2.0.0"),
                assertion(Some("help"), &["--help"], "ValidatingAdmissionPolicy"),
                assertion(Some("status"), &["fail"], "bad input"),
            ];
            let expectations: Vec<String> = tests.iter().map(|t| t.expect.clone()).collect();

            let report =
                run_assertions(&tool, &tests, &expectations, Duration::from_secs(10), &cancel)
                    .unwrap();

            assert_eq!(report.results.len(), 3);
            assert!(!report.results[0].passed);
            assert!(!report.results[0].is_launch_error());
            assert_eq!(report.results[0].snippet.as_deref(), Some("1.31.0\n"));
            assert!(report.results[1].passed);
            // Output matches but the exit status does not
            assert!(!report.results[2].passed);
            assert_eq!(report.results[2].exit_code, Some(3));
            assert!(matches!(
                report.results[2].error,
                Some(Error::AssertionMismatch { .. })
            ));
            assert_eq!(report.failed(), 2);
        }

        #[test]
        fn test_expected_nonzero_status() {
            let dir = tempfile::tempdir().unwrap();
            let tool = fake_tool(dir.path());
            let cancel = AtomicBool::new(false);
            let mut test = assertion(None, &["fail"], "bad input");
            test.status = 3;

            let report = run_assertions(
                &tool,
                &[test],
                &["bad input".to_string()],
                Duration::from_secs(10),
                &cancel,
            )
            .unwrap();
            assert!(report.passed());
        }
    }
}
