// src/recipe/parser.rs

//! Formula file parsing

use crate::error::{Error, Result};
use crate::hash::Checksum;
use crate::recipe::format::{BuildMode, FlagEntry, Formula};
use std::path::Path;

/// Parse a formula from a TOML string
pub fn parse_formula(content: &str) -> Result<Formula> {
    toml::from_str(content).map_err(|e| Error::ParseError(format!("Invalid formula: {}", e)))
}

/// Parse a formula from a file
pub fn parse_formula_file(path: &Path) -> Result<Formula> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("Failed to read formula file: {}", e)))?;

    parse_formula(&content)
}

/// Validate a formula for completeness and correctness
///
/// Hard problems are errors; everything else is returned as warnings.
pub fn validate_formula(formula: &Formula) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    if formula.package.name.is_empty() {
        return Err(Error::MalformedDescriptor(
            "Formula package name cannot be empty".to_string(),
        ));
    }
    if formula.build.target.is_empty() {
        return Err(Error::MalformedDescriptor(
            "Formula build target cannot be empty".to_string(),
        ));
    }
    if formula.build.toolchain.is_empty() {
        return Err(Error::MalformedDescriptor(
            "Formula build toolchain cannot be empty".to_string(),
        ));
    }

    for entry in &formula.build.flags {
        if let FlagEntry::Symbol { symbol, .. } = entry
            && (symbol.is_empty() || symbol.contains(char::is_whitespace))
        {
            return Err(Error::MalformedDescriptor(format!(
                "Invalid symbol in build flags: '{}'",
                symbol
            )));
        }
    }

    // Release descriptor must be constructible whenever an archive is declared
    if formula.source.url.is_some() {
        let descriptor = formula.descriptor(BuildMode::Release)?;
        if semver::Version::parse(descriptor.version()).is_err() {
            warnings.push(format!(
                "Version '{}' is not a semantic version",
                descriptor.version()
            ));
        }
    }
    if formula.head.is_some() {
        formula.descriptor(BuildMode::Head)?;
    }
    if formula.source.url.is_none() && formula.source.vcs.is_none() {
        return Err(Error::MalformedDescriptor(format!(
            "{} sets neither an archive nor a VCS reference",
            formula.package.name
        )));
    }

    if let Some(raw) = &formula.source.sha256 {
        if !Checksum::parse(raw).is_pinned() {
            warnings.push(format!("Source checksum '{}' is a placeholder", raw));
        }
    } else if formula.source.url.is_some() {
        warnings.push("Source archive has no checksum".to_string());
    }

    if formula.package.desc.is_none() {
        warnings.push("Missing package description".to_string());
    }
    if formula.package.license.is_none() {
        warnings.push("Missing package license".to_string());
    }
    if formula.package.homepage.is_none() {
        warnings.push("Missing package homepage".to_string());
    }
    if formula.tests.is_empty() {
        warnings.push("No test assertions declared".to_string());
    }

    Ok(warnings)
}
