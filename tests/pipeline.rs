// tests/pipeline.rs

//! End-to-end pipeline tests against a fake Go toolchain.

#![cfg(unix)]

mod common;

use common::{Fixture, KUBE_TAIL};
use kettle::Error;
use kettle::recipe::{
    BuildMode, KitchenConfig, PipelineReport, PipelineState, Stage, parse_formula,
};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

const VERSION_SYMBOL: &str = "github.com/yashirook/kube-vap-test/cmd/kube-vap-test/commands.Version";

#[test]
fn test_cook_release_verifies() {
    let fixture = Fixture::new();
    let formula = fixture.formula("", KUBE_TAIL);
    let descriptor = formula.descriptor(BuildMode::Release).unwrap();

    let report = fixture
        .kitchen(fixture.config())
        .cook(&formula, &descriptor, &fixture.context());

    assert_eq!(report.state, PipelineState::Verified, "{:?}", report.error);
    assert_eq!(report.exit_code(), 0);
    assert!(report.verified());
    assert_eq!(report.version, "1.31.0");
    assert_eq!(report.artifact.as_deref(), Some(fixture.binary().as_path()));
    assert!(fixture.binary().is_file());

    let stages: Vec<Stage> = report.stages.iter().map(|r| r.stage).collect();
    assert_eq!(
        stages,
        [Stage::Resolve, Stage::Build, Stage::PostInstall, Stage::Verify]
    );
    assert!(report.stages.iter().all(|r| r.succeeded));

    assert_eq!(
        report.flags,
        vec![
            "-s".to_string(),
            "-w".to_string(),
            format!("-X {VERSION_SYMBOL}=1.31.0"),
            "-X github.com/yashirook/kube-vap-test/cmd/kube-vap-test/commands.Commit=yashirook"
                .to_string(),
            "-X github.com/yashirook/kube-vap-test/cmd/kube-vap-test/commands.BuildDate=2026-10-16T08:30:00Z"
                .to_string(),
        ]
    );

    assert_eq!(
        report.installed,
        vec![
            fixture.prefix.join("share/bash-completion/completions/kube-vap-test"),
            fixture.prefix.join("share/zsh/site-functions/_kube-vap-test"),
            fixture.prefix.join("share/fish/vendor_completions.d/kube-vap-test.fish"),
        ]
    );
    assert_eq!(
        std::fs::read_to_string(&report.installed[1]).unwrap(),
        "# zsh completion for kube-vap-test\n"
    );
}

#[test]
fn test_version_and_help_assertions_pass() {
    let fixture = Fixture::new();
    let formula = fixture.formula("", KUBE_TAIL);
    let descriptor = formula.descriptor(BuildMode::Release).unwrap();

    let report = fixture
        .kitchen(fixture.config())
        .cook(&formula, &descriptor, &fixture.context());

    let smoke = report.smoke.expect("smoke report");
    assert_eq!(smoke.results.len(), 2);

    let version = &smoke.results[0];
    assert_eq!(version.id, "version");
    assert_eq!(version.args, ["version", "--short"]);
    assert!(version.passed);
    assert_eq!(version.exit_code, Some(0));

    let help = &smoke.results[1];
    assert_eq!(help.id, "help");
    assert!(help.passed);
}

#[test]
fn test_head_build_reports_head_version() {
    let fixture = Fixture::new();
    let formula = fixture.formula("", KUBE_TAIL);
    let descriptor = formula.descriptor(BuildMode::Head).unwrap();

    // Head sources skip the checksum policy entirely
    let report = fixture
        .kitchen(KitchenConfig {
            allow_unverified: false,
            ..fixture.config()
        })
        .cook(&formula, &descriptor, &fixture.context().with_commit("0a1b2c3"));

    assert_eq!(report.state, PipelineState::Verified, "{:?}", report.error);
    assert_eq!(report.version, "HEAD");
    assert_eq!(report.mode, Some(BuildMode::Head));
    assert!(report.flags.contains(&format!("-X {VERSION_SYMBOL}=HEAD")));
}

#[test]
fn test_archive_and_vcs_together_fail_at_load() {
    let fixture = Fixture::new();
    let toml = fixture
        .formula_toml("", KUBE_TAIL)
        .replace(
            "sha256 = \"PLACEHOLDER_SHA256\"",
            "sha256 = \"PLACEHOLDER_SHA256\"\nvcs = \"https://github.com/yashirook/kube-vap-test.git\"",
        );
    let formula = parse_formula(&toml).unwrap();

    let err = formula.descriptor(BuildMode::Release).unwrap_err();
    assert!(matches!(err, Error::MalformedDescriptor(_)), "{err:?}");

    let report = PipelineReport::load_failure("kube-vap-test", err);
    assert_eq!(report.failed_stage(), Some(Stage::Load));
    assert_eq!(report.exit_code(), 11);
    assert!(report.stages.iter().all(|r| r.stage == Stage::Load));
    assert!(fixture.binary().metadata().is_err());
}

#[test]
fn test_unbound_symbol_fails_resolution() {
    let fixture = Fixture::new();
    let toml = fixture.formula_toml("", KUBE_TAIL).replace(
        "commands.Commit\", value = \"%(tap_user)s\" }",
        "commands.Commit\" }",
    );
    let formula = parse_formula(&toml).unwrap();
    let descriptor = formula.descriptor(BuildMode::Release).unwrap();

    let report = fixture
        .kitchen(fixture.config())
        .cook(&formula, &descriptor, &fixture.context());

    assert_eq!(report.failed_stage(), Some(Stage::Resolve));
    assert_eq!(report.exit_code(), 22);
    match report.error {
        Some(Error::UnresolvedVariable { ref key, .. }) => assert_eq!(key, "commands.Commit"),
        ref other => panic!("expected UnresolvedVariable, got {other:?}"),
    }
    assert!(report.flags.is_empty());
    assert!(report.artifact.is_none());
    assert!(!fixture.binary().exists());
}

#[test]
fn test_bound_symbol_uses_custom_variable() {
    let fixture = Fixture::new();
    let toml = fixture
        .formula_toml("", KUBE_TAIL)
        .replace(
            "commands.Commit\", value = \"%(tap_user)s\" }",
            "commands.Commit\" }",
        )
        + "\n[variables]\n\"commands.Commit\" = \"deadbeef\"\n";
    let formula = parse_formula(&toml).unwrap();
    let descriptor = formula.descriptor(BuildMode::Release).unwrap();

    let report = fixture
        .kitchen(fixture.config())
        .cook(&formula, &descriptor, &fixture.context());

    assert_eq!(report.state, PipelineState::Verified, "{:?}", report.error);
    assert!(report.flags.contains(
        &"-X github.com/yashirook/kube-vap-test/cmd/kube-vap-test/commands.Commit=deadbeef"
            .to_string()
    ));
}

#[test]
fn test_build_failure_stops_pipeline() {
    let fixture = Fixture::new();
    let formula = fixture.formula(
        "environment = { FAKE_GO_FAIL = \"undefined: commands.Execute\" }",
        KUBE_TAIL,
    );
    let descriptor = formula.descriptor(BuildMode::Release).unwrap();

    let report = fixture
        .kitchen(fixture.config())
        .cook(&formula, &descriptor, &fixture.context());

    assert_eq!(report.failed_stage(), Some(Stage::Build));
    assert_eq!(report.exit_code(), 36);
    match &report.error {
        Some(Error::BuildFailed {
            exit_code, output, ..
        }) => {
            assert_eq!(*exit_code, Some(2));
            assert!(output.contains("undefined: commands.Execute"));
        }
        other => panic!("expected BuildFailed, got {other:?}"),
    }
    assert!(
        report
            .output
            .as_deref()
            .unwrap_or_default()
            .contains("undefined: commands.Execute")
    );

    // Nothing after the build ran
    assert_eq!(report.stages.len(), 2);
    assert!(report.installed.is_empty());
    assert!(report.smoke.is_none());
    assert!(!fixture.prefix.join("share").exists());
}

#[test]
fn test_missing_artifact_is_build_failure() {
    let fixture = Fixture::new();
    let formula = fixture.formula("environment = { FAKE_GO_NO_OUTPUT = \"1\" }", KUBE_TAIL);
    let descriptor = formula.descriptor(BuildMode::Release).unwrap();

    let report = fixture
        .kitchen(fixture.config())
        .cook(&formula, &descriptor, &fixture.context());

    assert_eq!(report.exit_code(), 36);
    assert!(matches!(
        report.error,
        Some(Error::BuildFailed {
            exit_code: Some(0),
            ..
        })
    ));
}

#[test]
fn test_build_timeout() {
    let fixture = Fixture::new();
    let formula = fixture.formula("environment = { FAKE_GO_SLEEP = \"30\" }", KUBE_TAIL);
    let descriptor = formula.descriptor(BuildMode::Release).unwrap();
    let config = KitchenConfig {
        timeout: Duration::from_millis(500),
        ..fixture.config()
    };

    let started = Instant::now();
    let report = fixture
        .kitchen(config)
        .cook(&formula, &descriptor, &fixture.context());

    assert!(started.elapsed() < Duration::from_secs(20));
    assert_eq!(report.exit_code(), 36);
    assert!(matches!(
        report.error,
        Some(Error::BuildFailed {
            exit_code: None,
            ..
        })
    ));
}

#[test]
fn test_build_timeout_kills_toolchain_children() {
    let fixture = Fixture::new();
    let formula = fixture.formula("environment = { FAKE_GO_STALL = \"30\" }", KUBE_TAIL);
    let descriptor = formula.descriptor(BuildMode::Release).unwrap();
    let config = KitchenConfig {
        timeout: Duration::from_millis(300),
        ..fixture.config()
    };

    let started = Instant::now();
    let report = fixture
        .kitchen(config)
        .cook(&formula, &descriptor, &fixture.context());

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(report.exit_code(), 36);
    assert!(!fixture.binary().exists());
}

#[test]
fn test_cancel_kills_toolchain_children() {
    let fixture = Fixture::new();
    let formula = fixture.formula("environment = { FAKE_GO_STALL = \"30\" }", KUBE_TAIL);
    let descriptor = formula.descriptor(BuildMode::Release).unwrap();
    let kitchen = fixture.kitchen(fixture.config());
    let cancel = kitchen.cancel_token();
    let setter = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        cancel.store(true, Ordering::SeqCst);
    });

    let started = Instant::now();
    let report = kitchen.cook(&formula, &descriptor, &fixture.context());
    setter.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(report.failed_stage(), Some(Stage::Build));
    assert_eq!(report.exit_code(), 30);
}

#[test]
fn test_placeholder_checksum_refused_without_opt_in() {
    let fixture = Fixture::new();
    let formula = fixture.formula("", KUBE_TAIL);
    let descriptor = formula.descriptor(BuildMode::Release).unwrap();
    let config = KitchenConfig {
        allow_unverified: false,
        ..fixture.config()
    };

    let report = fixture
        .kitchen(config)
        .cook(&formula, &descriptor, &fixture.context());

    assert_eq!(report.failed_stage(), Some(Stage::Build));
    assert_eq!(report.exit_code(), 33);
    assert!(matches!(report.error, Some(Error::UnverifiedChecksum { .. })));
    assert!(!fixture.binary().exists());
}

#[test]
fn test_missing_build_dependency() {
    let fixture = Fixture::new();
    let mut formula = fixture.formula("", KUBE_TAIL);
    formula.package.depends_on = vec!["kettle-no-such-toolchain".to_string()];
    let descriptor = formula.descriptor(BuildMode::Release).unwrap();

    let report = fixture
        .kitchen(fixture.config())
        .cook(&formula, &descriptor, &fixture.context());

    assert_eq!(report.exit_code(), 35);
    assert!(matches!(
        report.error,
        Some(Error::MissingBuildDependency(ref dep)) if dep == "kettle-no-such-toolchain"
    ));
}

#[test]
fn test_partial_completion_support_fails_post_install() {
    let fixture = Fixture::new();
    let formula = fixture.formula("environment = { FAKE_COMPLETION_SHELLS = \"bash\" }", KUBE_TAIL);
    let descriptor = formula.descriptor(BuildMode::Release).unwrap();

    let report = fixture
        .kitchen(fixture.config())
        .cook(&formula, &descriptor, &fixture.context());

    assert_eq!(report.failed_stage(), Some(Stage::PostInstall));
    assert_eq!(report.exit_code(), 47);
    match &report.error {
        Some(Error::UnsupportedPostInstallStep { step, capability }) => {
            assert_eq!(step, "completions (completion)");
            assert!(capability.contains("zsh"), "{capability}");
        }
        other => panic!("expected UnsupportedPostInstallStep, got {other:?}"),
    }

    // The step is all or nothing, and verification never ran
    assert!(report.installed.is_empty());
    assert!(!fixture.prefix.join("share/bash-completion").exists());
    assert!(report.smoke.is_none());
    assert!(fixture.binary().is_file());
}

#[test]
fn test_missing_step_executable_fails_post_install() {
    let fixture = Fixture::new();
    let tail = r#"
[[post_install]]
completions = { executable = "missing", subcommand = "completion" }
"#;
    let formula = fixture.formula("", tail);
    let descriptor = formula.descriptor(BuildMode::Release).unwrap();

    let report = fixture
        .kitchen(fixture.config())
        .cook(&formula, &descriptor, &fixture.context());

    assert_eq!(report.failed_stage(), Some(Stage::PostInstall));
    assert_eq!(report.exit_code(), 47);
    match &report.error {
        Some(Error::UnsupportedPostInstallStep { step, capability }) => {
            assert!(step.starts_with("completions"), "{step}");
            assert!(capability.contains("bin/missing"), "{capability}");
        }
        other => panic!("expected UnsupportedPostInstallStep, got {other:?}"),
    }
    assert!(report.installed.is_empty());
    assert!(report.smoke.is_none());
}

#[test]
fn test_completed_steps_survive_later_failure() {
    let fixture = Fixture::new();
    let tail = r#"
[[post_install]]
completions = { subcommand = "completion", shells = ["bash"] }

[[post_install]]
completions = { subcommand = "completion", shells = ["fish"] }
"#;
    let formula = fixture.formula("environment = { FAKE_COMPLETION_SHELLS = \"bash\" }", tail);
    let descriptor = formula.descriptor(BuildMode::Release).unwrap();

    let report = fixture
        .kitchen(fixture.config())
        .cook(&formula, &descriptor, &fixture.context());

    assert_eq!(report.exit_code(), 47);
    let bash = fixture
        .prefix
        .join("share/bash-completion/completions/kube-vap-test");
    assert_eq!(report.installed, vec![bash.clone()]);
    assert!(bash.is_file());
}

#[test]
fn test_failed_assertion_is_reported_with_snippet() {
    let fixture = Fixture::new();
    let tail = r#"
[[test]]
id = "version"
args = ["version", "--short"]
expect = "9.9.9"

[[test]]
id = "help"
args = ["--help"]
expect = "ValidatingAdmissionPolicy Test Tool"

[[test]]
id = "bogus"
args = ["frobnicate"]
expect = "unknown command"
status = 1
"#;
    let formula = fixture.formula("", tail);
    let descriptor = formula.descriptor(BuildMode::Release).unwrap();

    let report = fixture
        .kitchen(fixture.config())
        .cook(&formula, &descriptor, &fixture.context());

    assert_eq!(report.failed_stage(), Some(Stage::Verify));
    assert_eq!(report.exit_code(), 58);
    assert!(matches!(
        report.error,
        Some(Error::VerificationFailed {
            failed: 1,
            total: 3
        })
    ));

    let smoke = report.smoke.expect("smoke report");
    let version = &smoke.results[0];
    assert!(!version.passed);
    assert!(!version.is_launch_error());
    assert_eq!(version.snippet.as_deref(), Some("1.31.0\n"));
    assert!(smoke.results[1].passed);
    assert!(smoke.results[2].passed);
}

#[test]
fn test_cancel_before_start() {
    let fixture = Fixture::new();
    let formula = fixture.formula("", KUBE_TAIL);
    let descriptor = formula.descriptor(BuildMode::Release).unwrap();
    let kitchen = fixture.kitchen(fixture.config());
    kitchen.cancel_token().store(true, Ordering::SeqCst);

    let report = kitchen.cook(&formula, &descriptor, &fixture.context());

    assert_eq!(report.failed_stage(), Some(Stage::Resolve));
    assert_eq!(report.exit_code(), 20);
    assert!(matches!(report.error, Some(Error::Cancelled(_))));
}

#[test]
fn test_cancel_during_build() {
    let fixture = Fixture::new();
    let formula = fixture.formula("environment = { FAKE_GO_SLEEP = \"30\" }", KUBE_TAIL);
    let descriptor = formula.descriptor(BuildMode::Release).unwrap();
    let kitchen = fixture.kitchen(fixture.config());

    let token = kitchen.cancel_token();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        token.store(true, Ordering::SeqCst);
    });

    let started = Instant::now();
    let report = kitchen.cook(&formula, &descriptor, &fixture.context());
    canceller.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(20));
    assert_eq!(report.failed_stage(), Some(Stage::Build));
    assert_eq!(report.exit_code(), 30);
    assert!(!fixture.binary().exists());
}

#[test]
fn test_report_serializes_to_json() {
    let fixture = Fixture::new();
    let formula = fixture.formula(
        "environment = { FAKE_GO_FAIL = \"undefined: commands.Execute\" }",
        KUBE_TAIL,
    );
    let descriptor = formula.descriptor(BuildMode::Release).unwrap();

    let report = fixture
        .kitchen(fixture.config())
        .cook(&formula, &descriptor, &fixture.context());
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["package"], "kube-vap-test");
    assert_eq!(json["version"], "1.31.0");
    assert_eq!(json["mode"], "release");
    assert_eq!(json["state"]["state"], "failed");
    assert_eq!(json["state"]["stage"], "build");
    assert_eq!(json["state"]["code"], 6);
    assert_eq!(json["stages"][0]["stage"], "resolve");
    assert_eq!(json["stages"][0]["succeeded"], true);
    assert_eq!(json["stages"][1]["succeeded"], false);
    assert!(
        json["output"]
            .as_str()
            .unwrap()
            .contains("undefined: commands.Execute")
    );
    assert!(json["smoke"].is_null());
}
