use anchor_patch::config::LoadedPatchSet;
use anchor_patch::edit::EditOutcome;
use anchor_patch::patcher::{self, PatchOptions, PatchRun};
use anchor_patch::report::ExitStatus;
use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;

#[derive(Parser)]
#[command(name = "anchor-patch")]
#[command(about = "Splice fixed text into a file at anchor points", long_about = None)]
#[command(version)]
struct Cli {
    /// More diagnostics on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patch sets to a file
    Apply {
        /// File to patch
        input: PathBuf,

        /// Patch set file or directory (default: patches/ next to INPUT, then ./patches)
        #[arg(short, long)]
        patches: Option<PathBuf>,

        /// Write the result here instead of overwriting INPUT
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Save INPUT.backup before overwriting INPUT
        #[arg(long)]
        backup: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show which edits are applied, pending, or unresolved without writing
    Status {
        /// File to inspect
        input: PathBuf,

        /// Patch set file or directory
        #[arg(short, long)]
        patches: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List patch sets and their edits
    List {
        /// Patch set file or directory (default: ./patches)
        #[arg(short, long)]
        patches: Option<PathBuf>,

        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Apply {
            input,
            patches,
            output,
            dry_run,
            diff,
            backup,
            json,
        } => {
            let options = PatchOptions {
                output,
                dry_run,
                backup,
            };
            cmd_apply(&input, patches.as_deref(), &options, diff, json)
        }

        Commands::Status {
            input,
            patches,
            json,
        } => cmd_status(&input, patches.as_deref(), json),

        Commands::List { patches, json } => cmd_list(patches.as_deref(), json),
    };

    match result {
        Ok(status) => status.into(),
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            ExitStatus::Fatal.into()
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Locate and load patch sets, announcing each unless `quiet`.
fn load_patch_sets(
    patches: Option<&Path>,
    input: Option<&Path>,
    quiet: bool,
) -> Result<Vec<LoadedPatchSet>> {
    let sets = patcher::load_patch_sets(patches, input)?;

    if !quiet {
        for set in &sets {
            if let Some(source) = &set.source {
                println!(
                    "Loaded {} edits from {}",
                    set.edits.len(),
                    source.display()
                );
            }
        }
    }

    Ok(sets)
}

/// Helper: Show changed hunks (3 lines of context) between original and patched content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for (idx, group) in diff.grouped_ops(3).iter().enumerate() {
        if idx > 0 {
            println!("{}", "@@".dimmed());
        }
        for op in group {
            for change in diff.iter_changes(op) {
                let sign = match change.tag() {
                    ChangeTag::Delete => format!("-{}", change).red(),
                    ChangeTag::Insert => format!("+{}", change).green(),
                    ChangeTag::Equal => format!(" {}", change).normal(),
                };
                print!("{}", sign);
            }
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serializing report")?;
    println!("{text}");
    Ok(())
}

fn cmd_apply(
    input: &Path,
    patches: Option<&Path>,
    options: &PatchOptions,
    show_diff: bool,
    json: bool,
) -> Result<ExitStatus> {
    let sets = load_patch_sets(patches, Some(input), json)?;

    if !json {
        println!("Input: {}", input.display());
        if options.dry_run {
            println!("{}", "  [DRY RUN - showing what would be applied]".cyan());
        }
        println!();
    }

    let PatchRun {
        report,
        before,
        after,
    } = patcher::patch_with_sets(input, &sets, options)?;

    if json {
        print_json(&report)?;
    } else {
        print!("{}", report.render());
        if show_diff && before != after {
            display_diff(&report.output, before.as_str(), after.as_str());
        }
    }

    Ok(report.status())
}

fn cmd_status(input: &Path, patches: Option<&Path>, json: bool) -> Result<ExitStatus> {
    let sets = load_patch_sets(patches, Some(input), true)?;

    // Read-only: a dry run never touches the filesystem.
    let options = PatchOptions {
        dry_run: true,
        ..Default::default()
    };
    let run = patcher::patch_with_sets(input, &sets, &options)?;
    let report = &run.report;

    if json {
        print_json(report)?;
        return Ok(report.status());
    }

    println!("{}", "Patch Status Report".bold());
    println!("Input: {}", input.display());
    println!();

    let mut applied = Vec::new();
    let mut pending = Vec::new();
    let mut unresolved = Vec::new();

    for record in &report.edits {
        match &record.outcome {
            EditOutcome::AlreadyApplied { .. } => applied.push(record.id.as_str()),
            EditOutcome::Applied { .. } => pending.push(record.id.as_str()),
            EditOutcome::Skipped { error, .. } => {
                unresolved.push((record.id.as_str(), error.to_string()))
            }
        }
    }

    if !applied.is_empty() {
        println!(
            "{} {} ({} edits)",
            "✓".green(),
            "APPLIED".green().bold(),
            applied.len()
        );
        for id in &applied {
            println!("  - {}", id);
        }
        println!();
    }

    if !pending.is_empty() {
        println!(
            "{} {} ({} edits)",
            "⊙".yellow(),
            "PENDING".yellow().bold(),
            pending.len()
        );
        for id in &pending {
            println!("  - {}", id);
        }
        println!();
    }

    if !unresolved.is_empty() {
        println!(
            "{} {} ({} edits)",
            "✗".red(),
            "UNRESOLVED".red().bold(),
            unresolved.len()
        );
        for (id, reason) in &unresolved {
            println!("  - {} ({})", id, reason.dimmed());
        }
        println!();
    }

    Ok(report.status())
}

fn cmd_list(patches: Option<&Path>, json: bool) -> Result<ExitStatus> {
    let sets = load_patch_sets(patches, None, true)?;

    if json {
        let listing: Vec<_> = sets
            .iter()
            .map(|set| {
                serde_json::json!({
                    "name": set.name,
                    "source": set.source,
                    "description": set.description,
                    "edits": set.edits.iter().map(|edit| serde_json::json!({
                        "id": edit.id,
                        "placement": edit.placement,
                        "anchor": edit.anchor.to_string(),
                        "fallbacks": edit.fallbacks.len(),
                        "bytes": edit.text.len(),
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();
        print_json(&listing)?;
        return Ok(ExitStatus::Clean);
    }

    for set in &sets {
        let origin = set
            .source
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let name = if set.name.is_empty() {
            "(unnamed)"
        } else {
            set.name.as_str()
        };
        println!("{} {}", name.bold(), origin.dimmed());
        if let Some(description) = &set.description {
            println!("  {}", description);
        }
        for edit in &set.edits {
            println!(
                "  - {} [{}] {}{}",
                edit.id,
                edit.placement,
                edit.anchor,
                if edit.fallbacks.is_empty() {
                    String::new()
                } else {
                    format!(" (+{} fallback)", edit.fallbacks.len())
                }
            );
        }
        println!();
    }

    Ok(ExitStatus::Clean)
}
