// src/commands/validate.rs

//! Validate command - check a formula without building

use anyhow::Result;
use kettle::recipe::pipeline::exit_code_for;
use kettle::recipe::{BuildMode, Stage};
use kettle::{parse_formula_file, validate_formula};
use std::path::Path;

/// Validate a formula, returning the exit code
pub fn cmd_validate(formula_path: &str) -> Result<i32> {
    let path = Path::new(formula_path);
    println!("Reading formula: {}", path.display());

    let checked = parse_formula_file(path).and_then(|formula| {
        let warnings = validate_formula(&formula)?;
        Ok((formula, warnings))
    });
    let (formula, warnings) = match checked {
        Ok(checked) => checked,
        Err(err) => {
            eprintln!("[FAILED] {}", err);
            return Ok(exit_code_for(Stage::Load, &err));
        }
    };

    for mode in [BuildMode::Release, BuildMode::Head] {
        if let Ok(descriptor) = formula.descriptor(mode) {
            println!(
                "Formula: {} version {} ({} from {})",
                descriptor.name(),
                descriptor.version(),
                mode.as_str(),
                descriptor.source()
            );
        }
    }

    for warning in &warnings {
        println!("Warning: {}", warning);
    }

    println!("Formula validation passed");
    if warnings.is_empty() {
        println!("[OK] No issues found");
    } else {
        println!("[OK] {} warning(s)", warnings.len());
    }
    Ok(0)
}
