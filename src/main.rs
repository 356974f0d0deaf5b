use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glob::glob;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use mq5_riskpatch::{
    apply_recipe, print_diff, read_strategy, survey, write_archive, DiffStats, FileReport,
    FileStatus, Methodology, RunSummary, TransformOutcome,
};

#[derive(Parser)]
#[command(name = "mq5-riskpatch")]
#[command(about = "Anchor-based MQL5 strategy patcher for StrategyQuant exports", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format
    #[arg(
        long,
        default_value = "default",
        global = true,
        value_parser = ["default", "diff", "summary", "json"]
    )]
    format: String,

    /// Exclude paths matching these patterns (can be used multiple times)
    #[arg(long, global = true, num_args = 0..)]
    exclude: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform strategy files, writing {basename}{suffix}.mq5 per input
    Transform {
        /// Path to the .mq5 file or directory (supports multiple paths and glob patterns)
        #[arg(short, long, num_args = 1..)]
        paths: Vec<PathBuf>,

        /// Risk methodology: 'gerard' (level scaling) or 'benjamin' (funded accounts)
        #[arg(short, long)]
        methodology: String,

        /// Directory for transformed files (defaults to each input's directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Apply changes (default is dry-run showing a diff)
        #[arg(long)]
        apply: bool,
    },

    /// Transform strategy files and package the results into a .tar.gz archive
    Pack {
        /// Path to the .mq5 file or directory (supports multiple paths and glob patterns)
        #[arg(short, long, num_args = 1..)]
        paths: Vec<PathBuf>,

        /// Risk methodology: 'gerard' (level scaling) or 'benjamin' (funded accounts)
        #[arg(short, long)]
        methodology: String,

        /// Archive path (defaults to strategies{suffix}.tar.gz)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report which anchors and markers each file contains, without transforming
    Anchors {
        /// Path to the .mq5 file or directory (supports multiple paths and glob patterns)
        #[arg(short, long, num_args = 1..)]
        paths: Vec<PathBuf>,

        /// Restrict the report to one methodology (default: both)
        #[arg(short, long)]
        methodology: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Transform {
            paths,
            methodology,
            output_dir,
            apply,
        } => {
            let methodology: Methodology = methodology
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            let files = collect_strategy_files(&paths, &cli.exclude)?;
            if files.is_empty() {
                println!("No .mq5 files found");
                return Ok(());
            }
            run_transform(&files, methodology, output_dir.as_deref(), apply, &cli.format)?;
        }

        Commands::Pack {
            paths,
            methodology,
            output,
        } => {
            let methodology: Methodology = methodology
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            let files = collect_strategy_files(&paths, &cli.exclude)?;
            if files.is_empty() {
                println!("No .mq5 files found");
                return Ok(());
            }
            let archive_path = output.unwrap_or_else(|| {
                PathBuf::from(format!("strategies{}.tar.gz", methodology.suffix()))
            });
            run_pack(&files, methodology, &archive_path, &cli.format)?;
        }

        Commands::Anchors { paths, methodology } => {
            let methodologies = match methodology {
                Some(m) => vec![m.parse().map_err(|e: String| anyhow::anyhow!(e))?],
                None => vec![Methodology::Gerard, Methodology::Benjamin],
            };
            let files = collect_strategy_files(&paths, &cli.exclude)?;
            if files.is_empty() {
                println!("No .mq5 files found");
                return Ok(());
            }
            run_anchors(&files, &methodologies, &cli.format)?;
        }
    }

    Ok(())
}

fn run_transform(
    files: &[PathBuf],
    methodology: Methodology,
    output_dir: Option<&Path>,
    apply: bool,
    format: &str,
) -> Result<()> {
    let recipe = methodology.recipe();
    let mut summary = RunSummary::new(methodology);
    let mut total_stats = DiffStats::default();

    for file_path in files {
        let display_name = display_name(file_path);

        let content = match read_strategy(file_path) {
            Ok(content) => content,
            Err(e) => {
                summary.push(errored(file_path, format!("'{}': {:#}", display_name, e)));
                continue;
            }
        };

        match apply_recipe(&content, &display_name, &recipe) {
            Ok(TransformOutcome::Modified {
                content: new_content,
                message,
                anchor_misses,
            }) => {
                let output_name = methodology.output_name(&display_name);

                if format == "diff" || (!apply && format == "default") {
                    let stats = print_diff(file_path, &content, &new_content);
                    total_stats.add(&stats);
                }

                if apply {
                    let dir = match output_dir {
                        Some(dir) => dir.to_path_buf(),
                        None => file_path
                            .parent()
                            .map(|p| p.to_path_buf())
                            .unwrap_or_else(|| PathBuf::from(".")),
                    };
                    std::fs::create_dir_all(&dir).with_context(|| {
                        format!("Failed to create output directory {}", dir.display())
                    })?;
                    let write_path = dir.join(&output_name);
                    std::fs::write(&write_path, &new_content)
                        .with_context(|| format!("Failed to write {}", write_path.display()))?;
                }

                summary.push(FileReport {
                    path: file_path.clone(),
                    status: FileStatus::Processed,
                    message,
                    output_name: Some(output_name),
                    anchor_misses: anchor_misses.iter().map(|m| m.step.to_string()).collect(),
                });
            }
            Ok(TransformOutcome::AlreadyProcessed { message }) => {
                summary.push(FileReport {
                    path: file_path.clone(),
                    status: FileStatus::Skipped,
                    message,
                    output_name: None,
                    anchor_misses: Vec::new(),
                });
            }
            Err(e) => {
                summary.push(errored(file_path, format!("'{}': {:#}", display_name, e)));
            }
        }
    }

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        "summary" => summary.print_counts(),
        _ => {
            summary.print();
            if format == "diff" {
                total_stats.print_summary();
            }
        }
    }
    if !apply && format != "json" {
        println!("\nDry run - pass --apply to write output files");
    }

    Ok(())
}

fn run_pack(
    files: &[PathBuf],
    methodology: Methodology,
    archive_path: &Path,
    format: &str,
) -> Result<()> {
    let recipe = methodology.recipe();
    let mut summary = RunSummary::new(methodology);
    let mut entries: Vec<(String, String)> = Vec::new();

    for file_path in files {
        let display_name = display_name(file_path);

        let content = match read_strategy(file_path) {
            Ok(content) => content,
            Err(e) => {
                summary.push(errored(file_path, format!("'{}': {:#}", display_name, e)));
                continue;
            }
        };

        match apply_recipe(&content, &display_name, &recipe) {
            Ok(TransformOutcome::Modified {
                content: new_content,
                message,
                anchor_misses,
            }) => {
                let output_name = methodology.output_name(&display_name);
                entries.push((output_name.clone(), new_content));
                summary.push(FileReport {
                    path: file_path.clone(),
                    status: FileStatus::Processed,
                    message,
                    output_name: Some(output_name),
                    anchor_misses: anchor_misses.iter().map(|m| m.step.to_string()).collect(),
                });
            }
            Ok(TransformOutcome::AlreadyProcessed { message }) => {
                summary.push(FileReport {
                    path: file_path.clone(),
                    status: FileStatus::Skipped,
                    message,
                    output_name: None,
                    anchor_misses: Vec::new(),
                });
            }
            Err(e) => {
                summary.push(errored(file_path, format!("'{}': {:#}", display_name, e)));
            }
        }
    }

    // The archive is only produced when at least one file made it through.
    let written = write_archive(archive_path, &entries)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        if format == "summary" {
            summary.print_counts();
        } else {
            summary.print();
        }
        if written == 0 {
            println!("\nNo files processed - no archive produced");
        } else {
            println!(
                "\nWrote {} ({} entries)",
                archive_path.display(),
                written
            );
        }
    }

    Ok(())
}

fn run_anchors(files: &[PathBuf], methodologies: &[Methodology], format: &str) -> Result<()> {
    let mut all_surveys = Vec::new();

    for file_path in files {
        // Unreadable files are reported and skipped, like in the other runs.
        let content = match read_strategy(file_path) {
            Ok(content) => content,
            Err(e) => {
                if format == "json" {
                    all_surveys.push(serde_json::json!({
                        "path": file_path,
                        "error": format!("{:#}", e),
                    }));
                } else {
                    println!("{}: ❌ {:#}", file_path.display(), e);
                }
                continue;
            }
        };

        for methodology in methodologies {
            let recipe = methodology.recipe();
            let report = survey(&content, &recipe)?;

            if format == "json" {
                all_surveys.push(serde_json::json!({
                    "path": file_path,
                    "survey": report,
                }));
            } else {
                println!("{} [{}]", file_path.display(), methodology);
                println!(
                    "  marker: {}",
                    if report.marker_present {
                        "present (already processed)"
                    } else {
                        "absent"
                    }
                );
                for anchor in &report.anchors {
                    println!(
                        "  {} {}",
                        if anchor.present { "✓" } else { "✗" },
                        anchor.step
                    );
                }
            }
        }
    }

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&all_surveys)?);
    }

    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn errored(path: &Path, message: String) -> FileReport {
    FileReport {
        path: path.to_path_buf(),
        status: FileStatus::Errored,
        message,
        output_name: None,
        anchor_misses: Vec::new(),
    }
}

fn collect_strategy_files(paths: &[PathBuf], exclude_patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        let path_str = path.to_string_lossy();

        // Check if path contains glob pattern characters
        if path_str.contains('*') || path_str.contains('?') || path_str.contains('[') {
            for entry in glob(&path_str).context("Failed to parse glob pattern")? {
                match entry {
                    Ok(file_path) => {
                        if file_path.is_file() && is_strategy_file(&file_path) {
                            files.push(file_path);
                        }
                    }
                    Err(e) => eprintln!("Warning: Error reading glob entry: {}", e),
                }
            }
        } else if path.is_file() {
            if is_strategy_file(path) {
                files.push(path.clone());
            }
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_file() && is_strategy_file(e.path()))
            {
                files.push(entry.path().to_path_buf());
            }
        }
    }

    if !exclude_patterns.is_empty() {
        files.retain(|file| {
            let file_str = file.to_string_lossy();
            !exclude_patterns.iter().any(|pattern| {
                if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
                    glob::Pattern::new(pattern)
                        .map(|p| p.matches(&file_str))
                        .unwrap_or(false)
                } else {
                    file_str.contains(pattern.as_str())
                }
            })
        });
    }

    Ok(files)
}

fn is_strategy_file(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("mq5")
}
