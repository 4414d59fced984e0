use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod batch;
mod transform;

use batch::{read_units, run_batch, write_units};
use transform::Transformer;

/// Output directory (under `<project>/obj`) used when none is given.
const DEFAULT_OUTPUT_DIR: &str = "Loom";

/// Directories never searched for sources by `weave`.
const SKIPPED_DIRS: &[&str] = &["bin", "obj", ".git"];

#[derive(Parser)]
#[command(name = "loom")]
#[command(about = "Attribute-driven method interception for C# sources", long_about = None)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite a list of compilation units, as handed over by a build tool.
    Batch {
        /// Project root; the attribute index is searched from here upwards.
        #[arg(short, long)]
        project: PathBuf,
        /// Directory name under `<project>/obj` receiving the rewritten files.
        #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
        output: String,
        /// File listing the input units, one path per line, relative to the project.
        #[arg(short = 'u', long)]
        units: PathBuf,
        /// File receiving `index,path` lines for the units to compile instead.
        #[arg(short = 'U', long)]
        units_out: PathBuf,
    },
    /// Rewrite every `.cs` file below a directory.
    Weave {
        /// Project root to walk.
        dir: PathBuf,
        /// Directory name under `<dir>/obj` receiving the rewritten files.
        #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
        output: String,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Batch {
            project,
            output,
            units,
            units_out,
        } => cmd_batch(project, output, units, units_out)?,
        Commands::Weave { dir, output } => cmd_weave(dir, output)?,
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// batch
// ---------------------------------------------------------------------------

fn cmd_batch(project: &Path, output: &str, units: &Path, units_out: &Path) -> anyhow::Result<()> {
    let transformer = Transformer::new(project, output)?;
    let units = read_units(units)?;
    let report = run_batch(&transformer, &units)?;
    write_units(units_out, &report.mappings)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// weave
// ---------------------------------------------------------------------------

fn cmd_weave(dir: &Path, output: &str) -> anyhow::Result<()> {
    let transformer = Transformer::new(dir, output)?;
    let units = collect_cs_files(transformer.project_root());
    if units.is_empty() {
        println!("No C# files found at: {}", dir.display());
        return Ok(());
    }

    let report = run_batch(&transformer, &units)?;

    println!("+------------------------------------------+");
    println!("| LOOM WEAVE                               |");
    println!("+------------------------------------------+");
    println!("| Units          : {:>22} |", units.len());
    println!("| Transformed    : {:>22} |", report.transformed);
    println!("| Passthrough    : {:>22} |", report.passthrough);
    println!("+------------------------------------------+");
    for mapping in report.mappings.iter().filter(|m| m.path.starts_with("obj")) {
        println!("  {} <- {}", mapping.path.display(), units[mapping.index].display());
    }

    Ok(())
}

/// `.cs` files below `root`, relative to it, in a stable order.
fn collect_cs_files(root: &Path) -> Vec<PathBuf> {
    use walkdir::WalkDir;
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || !e.file_name().to_str().is_some_and(|n| SKIPPED_DIRS.contains(&n))
        })
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file() && e.path().extension().and_then(|x| x.to_str()) == Some("cs")
        })
        .filter_map(|e| e.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_collect_skips_build_directories() {
        let dir = tempfile::tempdir().unwrap();
        for path in ["A.cs", "Sub/B.cs", "bin/C.cs", "obj/Loom/D.cs", ".git/E.cs", "notes.txt"] {
            let path = dir.path().join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }
        assert_eq!(
            collect_cs_files(dir.path()),
            vec![PathBuf::from("A.cs"), Path::new("Sub").join("B.cs")]
        );
    }

    #[test]
    fn test_cli_parses_batch_arguments() {
        let cli = Cli::try_parse_from([
            "loom", "-vv", "batch", "-p", "proj", "-u", "in.txt", "-U", "out.txt",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Batch { project, output, units, units_out } => {
                assert_eq!(project, PathBuf::from("proj"));
                assert_eq!(output, DEFAULT_OUTPUT_DIR);
                assert_eq!(units, PathBuf::from("in.txt"));
                assert_eq!(units_out, PathBuf::from("out.txt"));
            }
            Commands::Weave { .. } => panic!("expected batch"),
        }
    }
}
