// tests/common/mod.rs

//! Shared test utilities and helpers for pipeline integration tests.
//!
//! The fake toolchain mimics `go build`: it reads `-o` and `-ldflags`, then
//! writes a shell-script binary whose `version` output comes from the
//! `commands.Version` symbol it was linked with. Resolution results are
//! therefore observable through the smoke tests.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use kettle::recipe::{
    BuildContext, FetchLimits, Formula, Kitchen, KitchenConfig, SourceFetcher, SourceRef,
    parse_formula,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Fake `go build`
///
/// Behaviour is steered through the formula's build environment:
/// `FAKE_GO_FAIL` fails the compile, `FAKE_GO_SLEEP` hangs,
/// `FAKE_GO_STALL` hangs in a forked `sleep` that holds the output pipes,
/// `FAKE_GO_NO_OUTPUT` exits 0 without writing the binary and
/// `FAKE_COMPLETION_SHELLS` limits the shells the binary can complete.
pub const FAKE_GO: &str = r##"#!/bin/sh
out=""
ldflags=""
while [ $# -gt 0 ]; do
    case "$1" in
        -o) out="$2"; shift 2 ;;
        -ldflags) ldflags="$2"; shift 2 ;;
        *) shift ;;
    esac
done

if [ -n "$FAKE_GO_SLEEP" ]; then
    exec sleep "$FAKE_GO_SLEEP"
fi
if [ -n "$FAKE_GO_STALL" ]; then
    sleep "$FAKE_GO_STALL"
    exit 0
fi
if [ -n "$FAKE_GO_FAIL" ]; then
    echo "./cmd/kube-vap-test/main.go:12:2: $FAKE_GO_FAIL" >&2
    exit 2
fi
if [ ! -f go.mod ]; then
    echo "go: cannot find main module" >&2
    exit 1
fi
if [ -z "$out" ]; then
    echo "go: missing -o" >&2
    exit 1
fi
if [ -n "$FAKE_GO_NO_OUTPUT" ]; then
    exit 0
fi

version=$(printf '%s\n' $ldflags | sed -n 's/.*commands\.Version=//p')
shells="${FAKE_COMPLETION_SHELLS:-bash zsh fish}"

cat > "$out" <<EOF
#!/bin/sh
case "\$1" in
    version) echo "$version" ;;
    --help) echo "kube-vap-test: ValidatingAdmissionPolicy Test Tool for Kubernetes" ;;
    completion)
        case " $shells " in
            *" \$2 "*) echo "# \$2 completion for kube-vap-test" ;;
            *) echo "unsupported shell: \$2" >&2; exit 1 ;;
        esac ;;
    *) echo "unknown command: \$1" >&2; exit 1 ;;
esac
EOF
chmod +x "$out"
echo "built $out"
"##;

/// Build flags used by every fixture formula
pub const KUBE_FLAGS: &str = r#"flags = [
    "-s",
    "-w",
    { symbol = "github.com/yashirook/kube-vap-test/cmd/kube-vap-test/commands.Version", value = "%(version)s" },
    { symbol = "github.com/yashirook/kube-vap-test/cmd/kube-vap-test/commands.Commit", value = "%(tap_user)s" },
    { symbol = "github.com/yashirook/kube-vap-test/cmd/kube-vap-test/commands.BuildDate", value = "%(build_date)s" },
]"#;

/// Post-install steps and assertions of the kube-vap-test formula
pub const KUBE_TAIL: &str = r#"
[[post_install]]
completions = { subcommand = "completion" }

[[test]]
id = "version"
args = ["version", "--short"]
expect = "%(version)s"

[[test]]
id = "help"
args = ["--help"]
expect = "ValidatingAdmissionPolicy Test Tool"
"#;

/// Source fetcher that fabricates a module directory instead of downloading
pub struct StubFetcher;

impl SourceFetcher for StubFetcher {
    fn fetch(
        &self,
        source: &SourceRef,
        dest: &Path,
        _limits: FetchLimits<'_>,
    ) -> kettle::Result<PathBuf> {
        let root = dest.join("source");
        fs::create_dir_all(&root)?;
        fs::write(root.join("go.mod"), format!("module {}\n", source.url()))?;
        Ok(root)
    }
}

/// Scratch prefix, cache and fake toolchain for one test
pub struct Fixture {
    pub dir: TempDir,
    pub toolchain: PathBuf,
    pub prefix: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let tools = dir.path().join("tools");
        fs::create_dir_all(&tools).unwrap();

        let toolchain = tools.join("go");
        fs::write(&toolchain, FAKE_GO).unwrap();
        fs::set_permissions(&toolchain, fs::Permissions::from_mode(0o755)).unwrap();

        let prefix = dir.path().join("prefix");
        Self {
            dir,
            toolchain,
            prefix,
        }
    }

    /// kube-vap-test formula using the fake toolchain
    ///
    /// `build_extra` lands inside `[build]`; `tail` is appended verbatim.
    pub fn formula_toml(&self, build_extra: &str, tail: &str) -> String {
        format!(
            r#"
[package]
name = "kube-vap-test"
desc = "ValidatingAdmissionPolicy Test Tool for Kubernetes"
homepage = "https://github.com/yashirook/kube-vap-test"
license = "MIT"
depends_on = ["sh"]

[source]
url = "https://github.com/yashirook/kube-vap-test/archive/v1.31.0.tar.gz"
sha256 = "PLACEHOLDER_SHA256"

[head]
vcs = "https://github.com/yashirook/kube-vap-test.git"
branch = "main"

[build]
toolchain = "{toolchain}"
target = "./cmd/kube-vap-test"
{KUBE_FLAGS}
{build_extra}
{tail}
"#,
            toolchain = self.toolchain.display(),
        )
    }

    pub fn formula(&self, build_extra: &str, tail: &str) -> Formula {
        parse_formula(&self.formula_toml(build_extra, tail)).unwrap()
    }

    /// Write a formula file into the fixture directory
    pub fn write_formula(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    pub fn context(&self) -> BuildContext {
        BuildContext::new(&self.prefix)
            .with_tap_user("yashirook")
            .with_build_date(Utc.with_ymd_and_hms(2026, 10, 16, 8, 30, 0).unwrap())
    }

    /// Configuration that accepts placeholder checksums and fails fast
    pub fn config(&self) -> KitchenConfig {
        KitchenConfig {
            source_cache: self.dir.path().join("cache"),
            timeout: Duration::from_secs(60),
            test_timeout: Duration::from_secs(10),
            ..KitchenConfig::permissive()
        }
    }

    pub fn kitchen(&self, config: KitchenConfig) -> Kitchen {
        Kitchen::with_fetcher(config, Box::new(StubFetcher))
    }

    pub fn binary(&self) -> PathBuf {
        self.prefix.join("bin/kube-vap-test")
    }
}
