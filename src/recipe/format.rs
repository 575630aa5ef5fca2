// src/recipe/format.rs

//! Formula file format definitions
//!
//! Formulas are TOML files that describe how to fetch, build, install and
//! smoke-test a single command-line binary. A formula can carry both a
//! release reference (`[source]`) and a head reference (`[head]`); each build
//! mode produces its own immutable [`PackageDescriptor`].

use crate::error::{Error, Result};
use crate::hash::Checksum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Version string used for descriptors built from a VCS reference
pub const HEAD_VERSION: &str = "HEAD";

/// A complete formula
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Formula {
    /// Package metadata
    pub package: PackageSection,

    /// Release source reference
    pub source: SourceSection,

    /// Head (development) source reference
    #[serde(default)]
    pub head: Option<HeadSection>,

    /// Build instructions
    pub build: BuildSection,

    /// Ordered post-install actions
    #[serde(default)]
    pub post_install: Vec<PostInstallStep>,

    /// Smoke test assertions
    #[serde(default, rename = "test")]
    pub tests: Vec<TestAssertion>,

    /// Custom variables for substitution
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl Formula {
    /// Name of the binary the build produces
    pub fn binary_name(&self) -> &str {
        self.build.binary.as_deref().unwrap_or(&self.package.name)
    }

    /// Build the immutable descriptor for one build mode
    ///
    /// Release mode uses `[source]`. Head mode uses `[head]`, or `[source]`
    /// when it only declares a VCS reference.
    pub fn descriptor(&self, mode: BuildMode) -> Result<PackageDescriptor> {
        match mode {
            BuildMode::Release => {
                let archive = self.source.archive_ref(&self.package)?;
                let vcs = self.source.vcs_ref();
                if archive.is_none() && vcs.is_some() {
                    return Err(Error::MalformedDescriptor(format!(
                        "{} declares only a VCS source; build it in head mode",
                        self.package.name
                    )));
                }
                PackageDescriptor::new(&self.package, archive, vcs)
            }
            BuildMode::Head => {
                if let Some(head) = &self.head {
                    let vcs = VcsRef {
                        url: head.vcs.clone(),
                        branch: head.branch.clone(),
                    };
                    PackageDescriptor::new(&self.package, None, Some(vcs))
                } else if self.source.vcs.is_some() && self.source.url.is_none() {
                    PackageDescriptor::new(&self.package, None, self.source.vcs_ref())
                } else {
                    Err(Error::MalformedDescriptor(format!(
                        "{} has no head reference",
                        self.package.name
                    )))
                }
            }
        }
    }
}

/// Package metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSection {
    /// Package name
    pub name: String,

    /// One-line description
    #[serde(default)]
    pub desc: Option<String>,

    /// Homepage URL
    #[serde(default)]
    pub homepage: Option<String>,

    /// License identifier (SPDX)
    #[serde(default)]
    pub license: Option<String>,

    /// Release version; inferred from the archive URL when absent
    #[serde(default)]
    pub version: Option<String>,

    /// Build-time toolchain requirements (not runtime-linked)
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Release source section
///
/// Exactly one of `url` (+ `sha256`) or `vcs` (+ `branch`) may be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceSection {
    /// Archive URL, supports `%(name)s` and `%(version)s`
    #[serde(default)]
    pub url: Option<String>,

    /// Archive checksum (`sha256:<hex>`, `sha512:<hex>` or bare sha256)
    #[serde(default, alias = "checksum")]
    pub sha256: Option<String>,

    /// VCS repository URL
    #[serde(default)]
    pub vcs: Option<String>,

    /// VCS branch
    #[serde(default)]
    pub branch: Option<String>,
}

impl SourceSection {
    fn archive_ref(&self, package: &PackageSection) -> Result<Option<ArchiveRef>> {
        let Some(url) = &self.url else {
            return Ok(None);
        };

        let url = match &package.version {
            Some(version) => url
                .replace("%(version)s", version)
                .replace("%(name)s", &package.name),
            None => url.replace("%(name)s", &package.name),
        };
        if url.contains("%(") {
            return Err(Error::MalformedDescriptor(format!(
                "archive URL needs an explicit version: {}",
                url
            )));
        }

        let checksum = Checksum::parse(self.sha256.as_deref().unwrap_or_default());
        Ok(Some(ArchiveRef { url, checksum }))
    }

    fn vcs_ref(&self) -> Option<VcsRef> {
        self.vcs.as_ref().map(|url| VcsRef {
            url: url.clone(),
            branch: self.branch.clone(),
        })
    }
}

/// Head (development) source section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadSection {
    /// VCS repository URL
    pub vcs: String,

    /// Branch to check out (repository default when absent)
    #[serde(default)]
    pub branch: Option<String>,
}

/// Which source reference a build uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Versioned archive with checksum
    #[default]
    Release,
    /// VCS checkout
    Head,
}

impl BuildMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildMode::Release => "release",
            BuildMode::Head => "head",
        }
    }
}

/// Archive source reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRef {
    pub url: String,
    pub checksum: Checksum,
}

impl ArchiveRef {
    /// File name of the archive from its URL
    pub fn filename(&self) -> String {
        self.url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("source.tar.gz")
            .to_string()
    }
}

/// VCS source reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcsRef {
    pub url: String,
    pub branch: Option<String>,
}

/// The single active source of a descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    Archive(ArchiveRef),
    Vcs(VcsRef),
}

impl SourceRef {
    pub fn url(&self) -> &str {
        match self {
            SourceRef::Archive(a) => &a.url,
            SourceRef::Vcs(v) => &v.url,
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Archive(a) => write!(f, "{} ({})", a.url, a.checksum),
            SourceRef::Vcs(VcsRef { url, branch: Some(b) }) => write!(f, "{} (branch {})", url, b),
            SourceRef::Vcs(VcsRef { url, branch: None }) => write!(f, "{}", url),
        }
    }
}

/// Immutable description of one package build
///
/// Constructed once per build mode; switching between head and release
/// means constructing another descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    name: String,
    desc: Option<String>,
    homepage: Option<String>,
    license: Option<String>,
    version: String,
    source: SourceRef,
    build_dependencies: Vec<String>,
}

impl PackageDescriptor {
    /// Construct a descriptor with exactly one active source reference
    pub fn new(
        package: &PackageSection,
        archive: Option<ArchiveRef>,
        vcs: Option<VcsRef>,
    ) -> Result<Self> {
        if package.name.trim().is_empty() {
            return Err(Error::MalformedDescriptor(
                "package name cannot be empty".to_string(),
            ));
        }

        let (source, version) = match (archive, vcs) {
            (Some(_), Some(_)) => {
                return Err(Error::MalformedDescriptor(format!(
                    "{} sets both an archive and a VCS reference",
                    package.name
                )));
            }
            (None, None) => {
                return Err(Error::MalformedDescriptor(format!(
                    "{} sets neither an archive nor a VCS reference",
                    package.name
                )));
            }
            (Some(archive), None) => {
                let version = match &package.version {
                    Some(v) => v.clone(),
                    None => infer_version_from_url(&archive.url).ok_or_else(|| {
                        Error::MalformedDescriptor(format!(
                            "cannot infer version from {}; set package.version",
                            archive.url
                        ))
                    })?,
                };
                (SourceRef::Archive(archive), version)
            }
            (None, Some(vcs)) => (SourceRef::Vcs(vcs), HEAD_VERSION.to_string()),
        };

        if version.trim().is_empty() {
            return Err(Error::MalformedDescriptor(
                "package version cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            name: package.name.clone(),
            desc: package.desc.clone(),
            homepage: package.homepage.clone(),
            license: package.license.clone(),
            version,
            source,
            build_dependencies: package.depends_on.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> Option<&str> {
        self.desc.as_deref()
    }

    pub fn homepage(&self) -> Option<&str> {
        self.homepage.as_deref()
    }

    pub fn license(&self) -> Option<&str> {
        self.license.as_deref()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn source(&self) -> &SourceRef {
        &self.source
    }

    pub fn build_dependencies(&self) -> &[String] {
        &self.build_dependencies
    }

    /// Build mode implied by the active source
    pub fn mode(&self) -> BuildMode {
        match self.source {
            SourceRef::Archive(_) => BuildMode::Release,
            SourceRef::Vcs(_) => BuildMode::Head,
        }
    }
}

/// Infer a version from an archive URL
///
/// Handles the common `<name>-1.2.3.tar.gz` and `v1.2.3.tar.gz` layouts.
pub fn infer_version_from_url(url: &str) -> Option<String> {
    const EXTENSIONS: &[&str] = &[
        ".tar.gz", ".tgz", ".tar.xz", ".txz", ".tar.bz2", ".tbz2", ".tar.zst", ".tar", ".zip",
    ];

    let filename = url.rsplit('/').next()?;
    let stem = EXTENSIONS
        .iter()
        .find_map(|ext| filename.strip_suffix(ext))
        .unwrap_or(filename);

    // Take the suffix starting at the first digit that follows a separator
    let candidate = stem
        .char_indices()
        .find(|(i, c)| {
            c.is_ascii_digit()
                && (*i == 0 || matches!(stem.as_bytes()[i - 1], b'-' | b'_' | b'v' | b'V'))
        })
        .map(|(i, _)| &stem[i..])?;

    if candidate.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+')) {
        Some(candidate.to_string())
    } else {
        None
    }
}

/// Build instructions section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSection {
    /// Toolchain program
    #[serde(default = "default_toolchain")]
    pub toolchain: String,

    /// Fixed build verb passed first
    #[serde(default = "default_verb")]
    pub verb: String,

    /// Buildable path or module
    pub target: String,

    /// Binary name (defaults to the package name)
    #[serde(default)]
    pub binary: Option<String>,

    /// Pass the standard arguments (`-trimpath -o <prefix>/bin/<binary>`)
    #[serde(default = "default_true")]
    pub std_args: bool,

    /// Argument that carries the joined flag list
    #[serde(default = "default_flags_arg")]
    pub flags_arg: String,

    /// Linker/compiler flags, possibly templated
    #[serde(default)]
    pub flags: Vec<FlagEntry>,

    /// Additional build arguments placed before the flags
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables for the toolchain (values are templated)
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

fn default_toolchain() -> String {
    "go".to_string()
}

fn default_verb() -> String {
    "build".to_string()
}

fn default_flags_arg() -> String {
    "-ldflags".to_string()
}

fn default_true() -> bool {
    true
}

/// One entry of the build flag list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagEntry {
    /// Flag text, may contain `%(name)s` placeholders
    Literal(String),
    /// Symbol binding rendered as `-X <symbol>=<value>`
    ///
    /// Without a value the binding is looked up by the symbol's short name
    /// (the last path component, e.g. `commands.Version`).
    Symbol {
        symbol: String,
        #[serde(default)]
        value: Option<String>,
    },
}

impl FlagEntry {
    /// Short name of a symbol (`a/b/commands.Version` -> `commands.Version`)
    pub fn symbol_short_name(symbol: &str) -> &str {
        symbol.rsplit('/').next().unwrap_or(symbol)
    }
}

/// An ordered post-install action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostInstallStep {
    /// Generate shell completions from the built executable
    Completions(CompletionsStep),
}

impl PostInstallStep {
    /// Human-readable step name used in reports and errors
    pub fn name(&self) -> String {
        match self {
            PostInstallStep::Completions(step) => format!("completions ({})", step.subcommand),
        }
    }
}

/// Completion generation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionsStep {
    /// Executable under `<prefix>/bin` (defaults to the built binary)
    #[serde(default)]
    pub executable: Option<String>,

    /// Subcommand (or flag) that emits completion scripts
    #[serde(default = "default_completion_subcommand")]
    pub subcommand: String,

    /// Shells to generate completions for
    #[serde(default = "default_shells")]
    pub shells: Vec<Shell>,

    /// How the shell name is passed to the executable
    #[serde(default)]
    pub shell_parameter_format: ShellParameterFormat,

    /// File base name for installed scripts (defaults to the executable)
    #[serde(default)]
    pub base_name: Option<String>,
}

fn default_completion_subcommand() -> String {
    "completion".to_string()
}

fn default_shells() -> Vec<Shell> {
    vec![Shell::Bash, Shell::Zsh, Shell::Fish]
}

/// Shells with a known completion layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
}

impl Shell {
    pub fn as_str(&self) -> &'static str {
        match self {
            Shell::Bash => "bash",
            Shell::Zsh => "zsh",
            Shell::Fish => "fish",
        }
    }

    /// Install location of a completion script under `prefix`
    pub fn completion_path(&self, prefix: &Path, base_name: &str) -> PathBuf {
        match self {
            Shell::Bash => prefix
                .join("share/bash-completion/completions")
                .join(base_name),
            Shell::Zsh => prefix
                .join("share/zsh/site-functions")
                .join(format!("_{}", base_name)),
            Shell::Fish => prefix
                .join("share/fish/vendor_completions.d")
                .join(format!("{}.fish", base_name)),
        }
    }
}

/// How a completion generator receives the shell name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShellParameterFormat {
    /// `completion bash`
    #[default]
    Plain,
    /// `completion --bash`
    Flag,
    /// `completion --shell=bash`
    Arg,
    /// `completion`
    None,
}

impl ShellParameterFormat {
    pub fn shell_args(&self, shell: Shell) -> Vec<String> {
        match self {
            ShellParameterFormat::Plain => vec![shell.as_str().to_string()],
            ShellParameterFormat::Flag => vec![format!("--{}", shell.as_str())],
            ShellParameterFormat::Arg => vec![format!("--shell={}", shell.as_str())],
            ShellParameterFormat::None => Vec::new(),
        }
    }
}

/// A single smoke test assertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestAssertion {
    /// Identifier used in reports (defaults to `test-<n>`)
    #[serde(default)]
    pub id: Option<String>,

    /// Arguments passed to the installed binary
    #[serde(default)]
    pub args: Vec<String>,

    /// Substring the combined output must contain (templated)
    pub expect: String,

    /// Expected exit status
    #[serde(default)]
    pub status: i32,
}
