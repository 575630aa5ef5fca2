// src/recipe/pipeline.rs

//! Pipeline state machine
//!
//! ```text
//! Loaded -> Resolved -> Built -> PostInstalled -> Verified
//!    \          \          \            \
//!     +----------+----------+------------+--> Failed(stage, reason)
//! ```
//!
//! Stages run strictly in order; `Verified` and `Failed` are terminal.
//!
//! ## Exit codes
//!
//! `0` means `Verified`. A failure exits with `stage * 10 + reason`:
//!
//! | stage | index |   | reason | code |
//! |-------|-------|---|--------|------|
//! | load | 1 | | cancelled | 0 |
//! | resolve | 2 | | malformed descriptor / parse | 1 |
//! | build | 3 | | unresolved variable | 2 |
//! | post-install | 4 | | unverified checksum | 3 |
//! | verify | 5 | | download / checksum mismatch | 4 |
//! | | | | missing build dependency | 5 |
//! | | | | build failed | 6 |
//! | | | | unsupported post-install step | 7 |
//! | | | | assertion failure | 8 |
//! | | | | I/O or internal | 9 |
//!
//! So a toolchain failure exits `36` and a failed smoke test exits `58`.

use crate::error::{Error, Result};
use crate::recipe::format::BuildMode;
use crate::recipe::kitchen::process::CancelToken;
use crate::recipe::smoke::SmokeReport;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One discrete step of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Load,
    Resolve,
    Build,
    PostInstall,
    Verify,
}

impl Stage {
    /// Stage index used in exit codes
    pub fn index(&self) -> u8 {
        match self {
            Stage::Load => 1,
            Stage::Resolve => 2,
            Stage::Build => 3,
            Stage::PostInstall => 4,
            Stage::Verify => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Resolve => "resolve",
            Stage::Build => "build",
            Stage::PostInstall => "post-install",
            Stage::Verify => "verify",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a pipeline run stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Loaded,
    Resolved,
    Built,
    PostInstalled,
    Verified,
    Failed {
        stage: Stage,
        reason: String,
        code: u8,
    },
}

impl PipelineState {
    /// The stage that leaves this state, `None` when terminal
    pub fn next_stage(&self) -> Option<Stage> {
        match self {
            PipelineState::Loaded => Some(Stage::Resolve),
            PipelineState::Resolved => Some(Stage::Build),
            PipelineState::Built => Some(Stage::PostInstall),
            PipelineState::PostInstalled => Some(Stage::Verify),
            PipelineState::Verified | PipelineState::Failed { .. } => None,
        }
    }

    /// State reached when `stage` succeeds
    fn after(stage: Stage) -> Self {
        match stage {
            Stage::Load => PipelineState::Loaded,
            Stage::Resolve => PipelineState::Resolved,
            Stage::Build => PipelineState::Built,
            Stage::PostInstall => PipelineState::PostInstalled,
            Stage::Verify => PipelineState::Verified,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next_stage().is_none()
    }

    /// Process exit code for this state
    ///
    /// Non-terminal states never reach the caller through [`Pipeline`];
    /// they map to the generic internal failure code.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineState::Verified => 0,
            PipelineState::Failed { stage, code, .. } => failure_code(*stage, *code),
            _ => 99,
        }
    }
}

/// Exit code for `err` raised in `stage`
pub fn exit_code_for(stage: Stage, err: &Error) -> i32 {
    failure_code(stage, err.reason_code())
}

fn failure_code(stage: Stage, reason: u8) -> i32 {
    i32::from(stage.index()) * 10 + i32::from(reason)
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Loaded => f.write_str("loaded"),
            PipelineState::Resolved => f.write_str("resolved"),
            PipelineState::Built => f.write_str("built"),
            PipelineState::PostInstalled => f.write_str("post-installed"),
            PipelineState::Verified => f.write_str("verified"),
            PipelineState::Failed { stage, reason, .. } => {
                write!(f, "failed at {}: {}", stage, reason)
            }
        }
    }
}

/// Timing and outcome of one stage
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub succeeded: bool,
    pub duration_ms: u128,
}

/// Drives the state machine for one run
///
/// Each call to [`Pipeline::run`] executes exactly the stage that leaves the
/// current state. The cancellation token is checked before every stage.
pub struct Pipeline {
    state: PipelineState,
    records: Vec<StageRecord>,
    error: Option<Error>,
    cancel: CancelToken,
}

impl Pipeline {
    /// Start a run for a descriptor that has been loaded
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            state: PipelineState::Loaded,
            records: Vec::new(),
            error: None,
            cancel,
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    /// Run `stage`, recording the transition
    ///
    /// On failure the pipeline moves to `Failed` and keeps the error; `None`
    /// tells the caller to stop.
    pub fn run<T>(&mut self, stage: Stage, f: impl FnOnce() -> Result<T>) -> Option<T> {
        if self.state.next_stage() != Some(stage) {
            let err = Error::InvalidTransition {
                from: self.state.to_string(),
                stage: stage.to_string(),
            };
            warn!("{}", err);
            if !self.state.is_terminal() {
                self.fail(stage, err);
            }
            return None;
        }

        if self.cancel.load(Ordering::SeqCst) {
            self.fail(stage, Error::Cancelled(stage.to_string()));
            return None;
        }

        debug!("Entering {} stage", stage);
        let started = Instant::now();
        let result = f();
        let duration_ms = started.elapsed().as_millis();

        match result {
            Ok(value) => {
                self.records.push(StageRecord {
                    stage,
                    succeeded: true,
                    duration_ms,
                });
                self.state = PipelineState::after(stage);
                info!("Stage {} complete ({} ms)", stage, duration_ms);
                Some(value)
            }
            Err(err) => {
                self.records.push(StageRecord {
                    stage,
                    succeeded: false,
                    duration_ms,
                });
                self.fail(stage, err);
                None
            }
        }
    }

    fn fail(&mut self, stage: Stage, err: Error) {
        warn!("Stage {} failed: {}", stage, err);
        self.state = PipelineState::Failed {
            stage,
            reason: err.to_string(),
            code: err.reason_code(),
        };
        self.error = Some(err);
    }

    /// Consume the pipeline, keeping its final state and error
    pub fn finish(self) -> (PipelineState, Vec<StageRecord>, Option<Error>) {
        (self.state, self.records, self.error)
    }
}

/// Everything a run produced, for printing or JSON output
#[derive(Debug, Serialize)]
pub struct PipelineReport {
    pub package: String,
    pub version: String,
    pub mode: Option<BuildMode>,
    pub state: PipelineState,
    pub stages: Vec<StageRecord>,
    /// Resolved build flags
    pub flags: Vec<String>,
    /// Installed binary
    pub artifact: Option<PathBuf>,
    /// Files written by post-install steps
    pub installed: Vec<PathBuf>,
    pub smoke: Option<SmokeReport>,
    /// Captured output of the failing stage, when it has any
    pub output: Option<String>,
    /// The error that stopped the run
    #[serde(skip)]
    pub error: Option<Error>,
}

impl PipelineReport {
    /// Report for a formula that never reached `Loaded`
    pub fn load_failure(package: impl Into<String>, err: Error) -> Self {
        let state = PipelineState::Failed {
            stage: Stage::Load,
            reason: err.to_string(),
            code: err.reason_code(),
        };
        Self {
            package: package.into(),
            version: String::new(),
            mode: None,
            state,
            stages: vec![StageRecord {
                stage: Stage::Load,
                succeeded: false,
                duration_ms: 0,
            }],
            flags: Vec::new(),
            artifact: None,
            installed: Vec::new(),
            smoke: None,
            output: None,
            error: Some(err),
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.state.exit_code()
    }

    pub fn verified(&self) -> bool {
        self.state == PipelineState::Verified
    }

    /// Stage the run failed in, if it failed
    pub fn failed_stage(&self) -> Option<Stage> {
        match &self.state {
            PipelineState::Failed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
