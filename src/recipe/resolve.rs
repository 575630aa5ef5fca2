// src/recipe/resolve.rs

//! Variable resolution for build flags
//!
//! Placeholders use the `%(name)s` syntax. Resolution is an explicit scan
//! over each flag entry: text outside placeholders is copied verbatim and
//! substituted values are never re-scanned. A symbol entry without a value
//! (`{ symbol = "pkg/commands.Commit" }`) is bound by the symbol's short name.
//!
//! Built-in variables:
//! - `name`, `version`, `desc`: from the descriptor
//! - `build_date`: captured once per context, `YYYY-MM-DDTHH:MM:SSZ` (UTC)
//! - `tap_user`: acting user identity
//! - `commit`: build provenance, only when supplied
//! - `prefix`, `bin`: install layout

use crate::error::{Error, Result};
use crate::recipe::format::{FlagEntry, Formula, PackageDescriptor};
use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Timestamp format for `build_date`
pub const BUILD_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Environment variable overriding the acting user identity
pub const TAP_USER_ENV: &str = "KETTLE_TAP_USER";

/// Runtime context for one build invocation
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Install root for this run
    pub prefix: PathBuf,
    /// Build timestamp, captured once
    pub build_date: DateTime<Utc>,
    /// Acting user / tap maintainer identity
    pub tap_user: String,
    /// Commit reference, when known
    pub commit: Option<String>,
}

impl BuildContext {
    /// Create a context for `prefix` with the current time and user
    ///
    /// A relative prefix is made absolute; the toolchain runs in the source
    /// directory, not the caller's.
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: std::path::absolute(&prefix).unwrap_or(prefix),
            build_date: Utc::now().trunc_subsecs(0),
            tap_user: default_tap_user(),
            commit: None,
        }
    }

    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    pub fn with_tap_user(mut self, user: impl Into<String>) -> Self {
        self.tap_user = user.into();
        self
    }

    pub fn with_build_date(mut self, date: DateTime<Utc>) -> Self {
        self.build_date = date;
        self
    }

    /// Directory binaries are installed into
    pub fn bin_dir(&self) -> PathBuf {
        self.prefix.join("bin")
    }
}

fn default_tap_user() -> String {
    std::env::var(TAP_USER_ENV)
        .or_else(|_| std::env::var("USER"))
        .ok()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "kettle".to_string())
}

/// Placeholder name to value mapping for one build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct VariableBinding {
    values: BTreeMap<String, String>,
}

impl VariableBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind built-in and custom variables for a descriptor
    ///
    /// Built-ins take precedence over custom variables of the same name.
    pub fn from_context(
        descriptor: &PackageDescriptor,
        custom: &BTreeMap<String, String>,
        context: &BuildContext,
    ) -> Self {
        let mut binding = Self::new();
        for (key, value) in custom {
            binding.insert(key, value);
        }

        binding.insert("name", descriptor.name());
        binding.insert("version", descriptor.version());
        if let Some(desc) = descriptor.desc() {
            binding.insert("desc", desc);
        }
        binding.insert(
            "build_date",
            context.build_date.format(BUILD_DATE_FORMAT).to_string(),
        );
        binding.insert("tap_user", &context.tap_user);
        if let Some(commit) = &context.commit {
            binding.insert("commit", commit);
        }
        binding.insert("prefix", context.prefix.to_string_lossy());
        binding.insert("bin", context.bin_dir().to_string_lossy());

        binding
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Replace every `%(key)s` placeholder in `template`
pub fn substitute(template: &str, binding: &VariableBinding) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("%(") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find(")s") else {
            return Err(Error::UnresolvedVariable {
                key: after.to_string(),
                template: template.to_string(),
            });
        };

        let key = &after[..end];
        let value = binding.get(key).ok_or_else(|| Error::UnresolvedVariable {
            key: key.to_string(),
            template: template.to_string(),
        })?;
        out.push_str(value);
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Resolve a flag list
///
/// The output has the same length and order as `flags`.
pub fn resolve_flags(flags: &[FlagEntry], binding: &VariableBinding) -> Result<Vec<String>> {
    flags
        .iter()
        .map(|entry| match entry {
            FlagEntry::Literal(text) => substitute(text, binding),
            FlagEntry::Symbol {
                symbol,
                value: Some(template),
            } => Ok(symbol_flag(symbol, &substitute(template, binding)?)),
            FlagEntry::Symbol {
                symbol,
                value: None,
            } => {
                let key = FlagEntry::symbol_short_name(symbol);
                let value = binding.get(key).ok_or_else(|| Error::UnresolvedVariable {
                    key: key.to_string(),
                    template: format!("-X {}", symbol),
                })?;
                Ok(symbol_flag(symbol, value))
            }
        })
        .collect()
}

fn symbol_flag(symbol: &str, value: &str) -> String {
    if value.contains(char::is_whitespace) {
        format!("-X '{}={}'", symbol, value)
    } else {
        format!("-X {}={}", symbol, value)
    }
}

/// Everything the later stages need, fully resolved
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedBuild {
    /// Bound variables
    pub binding: VariableBinding,
    /// Resolved build flags, one per formula flag entry
    pub flags: Vec<String>,
    /// Extra toolchain arguments
    pub args: Vec<String>,
    /// Toolchain environment
    pub environment: Vec<(String, String)>,
    /// Expected substrings for each test assertion, in declaration order
    pub expectations: Vec<String>,
    /// Install root
    pub prefix: PathBuf,
    /// Path the toolchain writes the binary to
    pub artifact: PathBuf,
}

impl ResolvedBuild {
    /// Flags joined into the single argument passed after `flags_arg`
    pub fn joined_flags(&self) -> String {
        self.flags.join(" ")
    }
}

/// Resolve all templates of a formula against a build context
pub fn resolve_build(
    formula: &Formula,
    descriptor: &PackageDescriptor,
    context: &BuildContext,
) -> Result<ResolvedBuild> {
    let binding = VariableBinding::from_context(descriptor, &formula.variables, context);

    let flags = resolve_flags(&formula.build.flags, &binding)?;

    let args = formula
        .build
        .args
        .iter()
        .map(|arg| substitute(arg, &binding))
        .collect::<Result<Vec<_>>>()?;

    let environment = formula
        .build
        .environment
        .iter()
        .map(|(key, value)| substitute(value, &binding).map(|v| (key.clone(), v)))
        .collect::<Result<Vec<_>>>()?;

    let expectations = formula
        .tests
        .iter()
        .map(|test| substitute(&test.expect, &binding))
        .collect::<Result<Vec<_>>>()?;

    Ok(ResolvedBuild {
        binding,
        flags,
        args,
        environment,
        expectations,
        prefix: context.prefix.clone(),
        artifact: context.bin_dir().join(formula.binary_name()),
    })
}
