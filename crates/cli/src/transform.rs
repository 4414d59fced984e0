//! Per-file pipeline: read, scan, rewrite, build, write.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anatomist::{scan, SourceTree};
use anyhow::{bail, Context};
use common::runtime::COMPANION_MARKER;
use common::{load_index, AttributeTable};
use forge::CompositionConfig;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Everything a run needs, resolved once.
#[derive(Debug)]
pub struct Transformer {
    project_root: PathBuf,
    output_root: PathBuf,
    table: AttributeTable,
    config: CompositionConfig,
}

/// Where a file's outputs go, and whether they were written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutcome {
    pub changed: bool,
    pub mirror: PathBuf,
    pub companion: PathBuf,
}

/// `dir/Foo.cs` → `dir/Foo.Companion.cs`.
pub fn companion_path(mirror: &Path) -> PathBuf {
    let stem = mirror
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match mirror.extension() {
        Some(ext) => format!("{stem}.{COMPANION_MARKER}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{COMPANION_MARKER}"),
    };
    mirror.with_file_name(name)
}

/// Writes `contents` to a temporary file in `path`'s directory.
fn stage(path: &Path, contents: &str) -> anyhow::Result<NamedTempFile> {
    let dir = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to stage {}", path.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("Failed to stage {}", path.display()))?;
    Ok(file)
}

impl Transformer {
    /// Loads the attribute index found above `project_root` and clears the output
    /// root `<project_root>/obj/<output_dir_name>`.
    pub fn new(project_root: &Path, output_dir_name: &str) -> anyhow::Result<Self> {
        let project_root = dunce::canonicalize(project_root)
            .with_context(|| format!("{} is not a directory", project_root.display()))?;
        if !project_root.is_dir() {
            bail!("{} is not a directory", project_root.display());
        }

        let (index_path, table) = load_index(&project_root)?;
        let config = CompositionConfig::from_table(&table)
            .with_context(|| format!("Invalid attribute index {}", index_path.display()))?;
        info!(index = %index_path.display(), attributes = table.len(), "Loaded attribute index");

        let output_root = project_root.join("obj").join(output_dir_name);
        if output_root.exists() {
            fs::remove_dir_all(&output_root)
                .with_context(|| format!("Failed to clear {}", output_root.display()))?;
        }

        Ok(Self {
            project_root,
            output_root,
            table,
            config,
        })
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn table(&self) -> &AttributeTable {
        &self.table
    }

    fn outputs_for(&self, file: &Path) -> anyhow::Result<(PathBuf, PathBuf)> {
        let relative = file.strip_prefix(&self.project_root).with_context(|| {
            format!(
                "{} is outside the project root {}",
                file.display(),
                self.project_root.display()
            )
        })?;
        let mirror = self.output_root.join(relative);
        let companion = companion_path(&mirror);
        Ok((mirror, companion))
    }

    /// Runs the pipeline over one source file.
    ///
    /// Both outputs are generated and staged next to their destinations before
    /// either is moved into place. A failure at any point leaves nothing behind
    /// for this file.
    pub fn wrap(&self, file: &Path) -> anyhow::Result<TransformOutcome> {
        let file = dunce::canonicalize(file)
            .with_context(|| format!("Failed to resolve {}", file.display()))?;
        let (mirror, companion) = self.outputs_for(&file)?;
        let unchanged = TransformOutcome {
            changed: false,
            mirror: mirror.clone(),
            companion: companion.clone(),
        };

        let tree = SourceTree::read(&file).with_context(|| format!("Failed to parse {}", file.display()))?;
        let envelope = scan(&tree, &self.table).with_context(|| format!("Failed to scan {}", file.display()))?;
        if envelope.is_empty() {
            debug!(file = %file.display(), "No configured attribute found");
            return Ok(unchanged);
        }

        let rewritten = tailor::rewrite(&tree, &self.table, &envelope)
            .with_context(|| format!("Failed to rewrite {}", file.display()))?;
        if !rewritten.changed {
            return Ok(unchanged);
        }
        let companion_text = forge::build(&envelope, &self.config)?;

        let staged_mirror = stage(&mirror, &rewritten.source)?;
        let staged_companion = stage(&companion, &companion_text)?;
        staged_mirror
            .persist(&mirror)
            .map_err(|err| err.error)
            .with_context(|| format!("Failed to write {}", mirror.display()))?;
        if let Err(err) = staged_companion.persist(&companion) {
            if let Err(cleanup) = fs::remove_file(&mirror) {
                warn!(mirror = %mirror.display(), error = %cleanup, "Failed to remove orphaned mirror");
            }
            return Err(err.error).with_context(|| format!("Failed to write {}", companion.display()));
        }

        for (from, to) in &rewritten.renamed {
            debug!(file = %file.display(), from = %from, to = %to, "Renamed method");
        }
        info!(file = %file.display(), mirror = %mirror.display(), "Rewrote file");

        Ok(TransformOutcome {
            changed: true,
            mirror,
            companion,
        })
    }
}
