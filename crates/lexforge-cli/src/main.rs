//! Lexforge CLI
//!
//! Drives the amendment pipeline against a JSON state file:
//! - import documents and inspect their unit trees
//! - submit amendment text and resolve it into edit targets
//! - review, confirm and apply targets
//! - commit fragments as snapshots and browse version history
//!
//! Resolution and application run as background jobs and are polled here;
//! with the `openai` feature and `OPENAI_API_KEY` set, the remote oracle is
//! used, otherwise the offline substitution oracle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use lexforge_model::{
    AddressingMode, DocumentId, SourceFormat, SubmissionId, TargetId, TargetStatus, UnitId,
};
use lexforge_oracle::mock::{SubstitutionOracle, SubstringAddressOracle};
use lexforge_oracle::{AddressOracle, TransformOracle};
use lexforge_pipeline::{
    import_document, EditApplier, JobManager, JobReport, JobStatus, SnapshotManager,
    TargetOutcome, TargetResolver,
};
use lexforge_store::Store;

#[derive(Parser)]
#[command(name = "lexforge")]
#[command(author, version, about = "Versioned application of amendments to legal documents")]
struct Cli {
    /// State file holding all documents, targets and history.
    #[arg(long, global = true, env = "LEXFORGE_STATE", default_value = "lexforge.json")]
    state: PathBuf,

    /// Bound on a single transform-oracle call, in seconds.
    #[arg(long, global = true, default_value_t = 60)]
    oracle_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a document from a text file.
    Import {
        /// Display name of the document.
        name: String,
        /// Path to the document text.
        file: PathBuf,
        /// Source was a rich-text export (already reduced to plain text).
        #[arg(long)]
        rich_text: bool,
        /// Match amendment addresses against breadcrumb paths instead of
        /// keying articles by number; exact hits then require confirmation.
        #[arg(long)]
        hierarchical: bool,
    },

    /// List imported documents.
    Documents,

    /// Print a document's unit tree with current content.
    Show {
        document: u64,
        /// Also print each unit's current text.
        #[arg(long)]
        content: bool,
    },

    /// Register an amendment submission against a document.
    Submit {
        document: u64,
        /// Path to the amendment text; reads stdin when omitted.
        file: Option<PathBuf>,
    },

    /// Resolve a submission's instructions into edit targets.
    Resolve { submission: u64 },

    /// List a submission's targets and their statuses.
    Targets { submission: u64 },

    /// Bind a target to a unit by hand, clearing review.
    Confirm { target: u64, unit: u64 },

    /// Apply confirmed targets, producing before/after fragments.
    Apply {
        submission: u64,
        /// Discard existing fragments and re-run the oracle.
        #[arg(long)]
        force: bool,
        /// Print the full per-target report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Commit a submission's fragments as a new document version.
    Commit {
        submission: u64,
        #[arg(long, default_value = "")]
        comment: String,
    },

    /// Show a unit's version history.
    Versions { unit: u64 },

    /// Delete a target (and its fragment) after review.
    DeleteTarget { target: u64 },

    /// Delete a document and everything that hangs off it.
    DeleteDocument { document: u64 },
}

fn load_store(path: &PathBuf) -> Result<Arc<Store>> {
    let store = if path.exists() {
        Store::load(path).with_context(|| format!("loading state from {}", path.display()))?
    } else {
        Store::new()
    };
    Ok(Arc::new(store))
}

fn save_store(store: &Store, path: &PathBuf) -> Result<()> {
    store
        .save(path)
        .with_context(|| format!("saving state to {}", path.display()))
}

#[cfg(feature = "openai")]
fn oracles() -> (Arc<dyn TransformOracle>, Arc<dyn AddressOracle>) {
    match lexforge_oracle::remote::RemoteOracle::from_env() {
        Ok(remote) => {
            let remote = Arc::new(remote);
            (remote.clone(), remote)
        }
        Err(e) => {
            tracing::warn!(error = %e, "remote oracle unavailable, using offline oracles");
            (
                Arc::new(SubstitutionOracle::new()),
                Arc::new(SubstringAddressOracle),
            )
        }
    }
}

#[cfg(not(feature = "openai"))]
fn oracles() -> (Arc<dyn TransformOracle>, Arc<dyn AddressOracle>) {
    (
        Arc::new(SubstitutionOracle::new()),
        Arc::new(SubstringAddressOracle),
    )
}

fn jobs(store: &Arc<Store>, oracle_timeout: u64) -> JobManager {
    let (transform, address) = oracles();
    JobManager::new(
        Arc::new(TargetResolver::new(store.clone(), address)),
        Arc::new(EditApplier::new(
            store.clone(),
            transform,
            Duration::from_secs(oracle_timeout),
        )),
    )
}

async fn wait_for(manager: &JobManager, id: lexforge_model::JobId) -> Result<JobReport> {
    loop {
        match manager.status(id) {
            Some(JobStatus::Running) | None => tokio::time::sleep(Duration::from_millis(50)).await,
            Some(JobStatus::Completed { report }) => return Ok(report),
            Some(JobStatus::Failed { error }) => return Err(anyhow!(error)),
        }
    }
}

fn status_label(status: TargetStatus) -> colored::ColoredString {
    match status {
        TargetStatus::Pending => "pending".yellow(),
        TargetStatus::NeedsReview => "needs_review".red(),
        TargetStatus::Completed => "completed".green(),
        TargetStatus::Failed => "failed".red().bold(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = load_store(&cli.state)?;

    match cli.command {
        Commands::Import {
            name,
            file,
            rich_text,
            hierarchical,
        } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let source_format = if rich_text {
                SourceFormat::RichText
            } else {
                SourceFormat::PlainText
            };
            let addressing = if hierarchical {
                AddressingMode::Hierarchical
            } else {
                AddressingMode::Flat
            };
            let (doc, units) = import_document(&store, &name, &text, source_format, addressing)?;
            save_store(&store, &cli.state)?;
            println!(
                "{} document {} ({} units)",
                "imported".green(),
                doc.id.to_string().bold(),
                units.len()
            );
        }

        Commands::Documents => {
            for doc in store.documents() {
                println!(
                    "{}  {}  [{:?}] imported {}",
                    doc.id.to_string().bold(),
                    doc.name,
                    doc.addressing,
                    doc.imported_at.format("%Y-%m-%d %H:%M")
                );
            }
        }

        Commands::Show { document, content } => {
            let doc = store.document(DocumentId(document))?;
            println!("{} {}", doc.id.to_string().bold(), doc.name.bold());
            for unit in store.units_for_document(doc.id) {
                let depth = unit.unit_type.depth();
                println!(
                    "{}{}  {}",
                    "  ".repeat(depth),
                    unit.id.to_string().dimmed(),
                    unit.breadcrumb_path
                );
                if content {
                    let text = store.current_text(unit.id)?;
                    for line in text.lines() {
                        println!("{}{}", "  ".repeat(depth + 1), line.dimmed());
                    }
                }
            }
        }

        Commands::Submit { document, file } => {
            let text = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                None => {
                    use std::io::Read;
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            let submission = store.create_submission(DocumentId(document), &text)?;
            save_store(&store, &cli.state)?;
            println!(
                "{} submission {}",
                "registered".green(),
                submission.id.to_string().bold()
            );
        }

        Commands::Resolve { submission } => {
            let manager = jobs(&store, cli.oracle_timeout);
            let job = manager.submit_resolve(SubmissionId(submission));
            match wait_for(&manager, job).await? {
                JobReport::Resolve(report) => {
                    save_store(&store, &cli.state)?;
                    println!(
                        "{} {} targets ({} need review, {} duplicates skipped)",
                        "resolved".green(),
                        report.created.len(),
                        report.needs_review,
                        report.skipped_duplicates
                    );
                }
                JobReport::Apply(_) => unreachable!("resolve job returned an apply report"),
            }
        }

        Commands::Targets { submission } => {
            for target in store.targets_for_submission(SubmissionId(submission)) {
                let unit = match target.resolved_unit_id {
                    Some(id) => store.unit(id)?.breadcrumb_path,
                    None => "—".to_string(),
                };
                println!(
                    "{}  {}  {}  {}",
                    target.id.to_string().bold(),
                    status_label(target.status),
                    unit,
                    target.instruction_text.replace('\n', " ")
                );
                if let Some(reason) = &target.resolution.reason {
                    println!("    {}", reason.dimmed());
                }
            }
        }

        Commands::Confirm { target, unit } => {
            let confirmed = store.confirm_target(TargetId(target), UnitId(unit))?;
            save_store(&store, &cli.state)?;
            println!(
                "{} target {} -> {}",
                "confirmed".green(),
                confirmed.id,
                store.unit(UnitId(unit))?.breadcrumb_path
            );
        }

        Commands::Apply {
            submission,
            force,
            json,
        } => {
            let manager = jobs(&store, cli.oracle_timeout);
            let job = manager.submit_apply(SubmissionId(submission), force);
            match wait_for(&manager, job).await? {
                JobReport::Apply(report) => {
                    save_store(&store, &cli.state)?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                        return Ok(());
                    }
                    println!(
                        "{} applied, {} skipped, {} errored",
                        report.applied.to_string().green(),
                        report.skipped,
                        report.errored.to_string().red()
                    );
                    for (target_id, outcome) in &report.outcomes {
                        match outcome {
                            TargetOutcome::Applied { oracle_failed: true } => println!(
                                "  {} {}",
                                target_id,
                                "oracle reported a failure marker".yellow()
                            ),
                            TargetOutcome::Errored { error } => {
                                println!("  {} {}", target_id, error.red())
                            }
                            _ => {}
                        }
                    }
                }
                JobReport::Resolve(_) => unreachable!("apply job returned a resolve report"),
            }
        }

        Commands::Commit {
            submission,
            comment,
        } => {
            let manager = SnapshotManager::new(store.clone());
            let snapshot = manager.commit(SubmissionId(submission), &comment)?;
            save_store(&store, &cli.state)?;
            println!(
                "{} snapshot {} for document {}",
                "committed".green(),
                snapshot.id.to_string().bold(),
                snapshot.document_id
            );
        }

        Commands::Versions { unit } => {
            let row = store.unit(UnitId(unit))?;
            println!("{}", row.breadcrumb_path.bold());
            println!("  {}  {}", "imported".dimmed(), preview(&row.initial_content));
            for version in store.versions_for_unit(UnitId(unit)) {
                println!(
                    "  {} {}  {}",
                    format!("v{}", version.id).dimmed(),
                    version.created_at.format("%Y-%m-%d %H:%M"),
                    preview(&version.content)
                );
            }
        }

        Commands::DeleteTarget { target } => {
            store.delete_target(TargetId(target))?;
            save_store(&store, &cli.state)?;
            println!("{} target {}", "deleted".red(), target);
        }

        Commands::DeleteDocument { document } => {
            store.delete_document(DocumentId(document))?;
            save_store(&store, &cli.state)?;
            println!("{} document {}", "deleted".red(), document);
        }
    }

    Ok(())
}

fn preview(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let mut out: String = flat.chars().take(80).collect();
    if flat.chars().count() > 80 {
        out.push('…');
    }
    out
}
