//! Batch protocol: an ordered list of compilation units in, `(index, path)` pairs out.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::transform::Transformer;

/// Units handed to the compiler untouched.
pub const PASSTHROUGH_UNITS: &[&str] = &["AssemblyAttributes.cs", "AssemblyInfo.cs"];

/// One entry of the output list. `index` points back into the input list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitMapping {
    pub index: usize,
    pub path: PathBuf,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub mappings: Vec<UnitMapping>,
    pub transformed: usize,
    pub passthrough: usize,
}

fn is_passthrough(unit: &Path) -> bool {
    unit.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| PASSTHROUGH_UNITS.iter().any(|p| name.ends_with(p)))
}

/// One path per line; blank lines ignored.
pub fn read_units(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read units list {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}

/// Writes `index,path` lines.
pub fn write_units(path: &Path, mappings: &[UnitMapping]) -> anyhow::Result<()> {
    let mut text = String::new();
    for mapping in mappings {
        text.push_str(&format!("{},{}\n", mapping.index, mapping.path.display()));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, text).with_context(|| format!("Failed to write units list {}", path.display()))
}

/// Transforms every unit, relative paths resolved against the project root.
///
/// Unchanged and passthrough units map to themselves; a transformed unit maps to
/// its mirror and companion, both relative to the project root.
pub fn run_batch(transformer: &Transformer, units: &[PathBuf]) -> anyhow::Result<BatchReport> {
    let mut report = BatchReport::default();
    let root = transformer.project_root();

    if transformer.table().is_empty() {
        warn!("No attribute names are configured for wrapping; every unit is passed through");
        report.mappings = units
            .iter()
            .enumerate()
            .map(|(index, unit)| UnitMapping {
                index,
                path: unit.clone(),
            })
            .collect();
        return Ok(report);
    }

    for (index, unit) in units.iter().enumerate() {
        if is_passthrough(unit) {
            debug!(unit = %unit.display(), "Passthrough compilation unit");
            report.passthrough += 1;
            report.mappings.push(UnitMapping {
                index,
                path: unit.clone(),
            });
            continue;
        }

        let outcome = transformer
            .wrap(&root.join(unit))
            .with_context(|| format!("Failed to transform {}", unit.display()))?;
        if !outcome.changed {
            report.mappings.push(UnitMapping {
                index,
                path: unit.clone(),
            });
            continue;
        }

        report.transformed += 1;
        for output in [&outcome.mirror, &outcome.companion] {
            let relative = output.strip_prefix(root).unwrap_or(output);
            report.mappings.push(UnitMapping {
                index,
                path: relative.to_path_buf(),
            });
        }
    }

    if report.transformed == 0 {
        warn!("No code was transformed; the configured attributes are not used in these units");
    }
    info!(
        units = units.len(),
        transformed = report.transformed,
        passthrough = report.passthrough,
        "Batch complete"
    );
    Ok(report)
}
