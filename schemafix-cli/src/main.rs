use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use colored::Colorize;

use schemafix_core::EngineError;
use schemafix_core::check::{CountStatus, compare_counts};
use schemafix_core::cleanup::{list_orphans, remove_orphans};
use schemafix_core::config::Config;
use schemafix_core::executor::{
    Action, BatchRun, Confirmation, Executor, Mode, SkipReason,
};
use schemafix_core::inventory::{Inventory, ScanSummary, Scope};
use schemafix_core::journal::Journal;
use schemafix_core::metadata::{MetadataError, PgMetadataStore};
use schemafix_core::naming::DatasetId;
use schemafix_core::report::{NameLookup, ReconciliationReport};
use schemafix_core::schema::SchemaForm;
use schemafix_core::vector::{HttpVectorStore, StoreError};

mod prompt;

const EXIT_OK: i32 = 0;
const EXIT_CONFIG: i32 = 3;
const EXIT_CONNECTIVITY: i32 = 4;
const EXIT_TARGET_FAILED: i32 = 5;
const EXIT_RECREATION_FAILED: i32 = 6;
const EXIT_NOT_FOUND: i32 = 7;
const EXIT_JOURNAL: i32 = 8;
const EXIT_REJECTED: i32 = 9;

const RULE: &str = "======================================================================";
const THIN_RULE: &str = "----------------------------------------------------------------------";

#[derive(Parser, Debug)]
#[command(
    name = "schemafix",
    version,
    about = "Repair vector-store collections left in the legacy schema format after a host application upgrade"
)]
struct Cli {
    /// Path to the config file. Optional; environment variables override it.
    #[arg(long, default_value = "schemafix.toml", global = true)]
    config: PathBuf,

    /// Log at debug level (unless RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan and list collections needing a fix
    Scan,
    /// Simulate the batch fix; nothing is changed
    DryRun,
    /// Fix every legacy collection
    Fix {
        /// Do not prompt; the batch is confirmed up front
        #[arg(long, conflicts_with = "confirm_each")]
        yes: bool,
        /// Ask before each collection instead of once for the batch
        #[arg(long)]
        confirm_each: bool,
    },
    /// Fix a single collection by name, without prompting
    FixOne {
        /// Collection name, e.g. Vector_index_<uuid>_Node
        name: String,
    },
    /// Find orphaned collections and optionally delete them
    Cleanup {
        /// Delete without prompting
        #[arg(long)]
        yes: bool,
    },
    /// List knowledge bases that need re-embedding
    ListNames,
    /// Compare vector object counts with metadata segment counts
    CountCheck {
        /// Only check this collection
        name: Option<String>,
    },
    /// Inspect the migration journal
    Journal {
        #[command(subcommand)]
        action: JournalAction,
    },
    /// View the effective configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum JournalAction {
    /// List attempts whose collection may be missing from the store
    List {
        /// Include every recorded attempt
        #[arg(long)]
        all: bool,
    },
    /// Mark an attempt as handled after manual recovery
    Resolve {
        /// Entry id, as shown by `journal list`
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML, credentials masked
    Show,
    /// Validate the configuration
    Validate,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e}", "Error:".red().bold());
            exit_code(&e)
        }
    };
    process::exit(code);
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

async fn run(cli: Cli) -> Result<i32, EngineError> {
    let config = Config::load(&cli.config)?;
    match cli.command {
        Command::Scan => scan(&config).await,
        Command::DryRun => dry_run(&config).await,
        Command::Fix { yes, confirm_each } => {
            let confirmation = if yes {
                Confirmation::Preconfirmed
            } else if confirm_each {
                Confirmation::PerCollection
            } else {
                Confirmation::Batch
            };
            fix(&config, confirmation).await
        }
        Command::FixOne { name } => fix_one(&config, &name).await,
        Command::Cleanup { yes } => cleanup(&config, yes).await,
        Command::ListNames => list_names(&config).await,
        Command::CountCheck { name } => count_check(&config, name).await,
        Command::Journal { action } => journal_command(&config, action),
        Command::Config { action } => config_command(&config, action),
    }
}

/// Exit status for an error that ended a command.
fn exit_code(error: &EngineError) -> i32 {
    match error {
        EngineError::Config(_) => EXIT_CONFIG,
        EngineError::VectorStore(StoreError::Malformed(_)) => EXIT_TARGET_FAILED,
        EngineError::VectorStore(StoreError::Rejected { .. })
        | EngineError::Metadata(MetadataError::Query(_)) => EXIT_REJECTED,
        EngineError::VectorStore(StoreError::Connectivity(_))
        | EngineError::Metadata(MetadataError::Connectivity(_)) => EXIT_CONNECTIVITY,
        EngineError::Journal(_) => EXIT_JOURNAL,
        EngineError::NotFound(_) => EXIT_NOT_FOUND,
    }
}

/// Exit status after a batch: a collection left missing outranks everything.
fn batch_exit_code(run: &BatchRun, report: &ReconciliationReport) -> i32 {
    if report.requires_manual_recreation() {
        EXIT_RECREATION_FAILED
    } else if let Some(e) = &run.aborted {
        exit_code(e)
    } else {
        EXIT_OK
    }
}

/// Exit status after `fix-one`: any failure on the named target is non-zero.
fn single_exit_code(run: &BatchRun, report: &ReconciliationReport) -> i32 {
    if report.requires_manual_recreation() {
        return EXIT_RECREATION_FAILED;
    }
    if let Some(e) = &run.aborted {
        return exit_code(e);
    }
    match run.outcomes.first().map(|o| &o.action) {
        Some(Action::Skipped {
            reason: SkipReason::NotFound,
        }) => EXIT_NOT_FOUND,
        Some(Action::Skipped {
            reason: SkipReason::Unclassifiable,
        })
        | Some(Action::Failed { .. }) => EXIT_TARGET_FAILED,
        _ => EXIT_OK,
    }
}

fn stores(config: &Config) -> Result<(HttpVectorStore, PgMetadataStore), EngineError> {
    let vector = HttpVectorStore::new(&config.vector_store)?;
    let metadata = PgMetadataStore::new(&config.metadata_store);
    Ok((vector, metadata))
}

fn open_journal(config: &Config) -> Result<Journal, EngineError> {
    Ok(Journal::open(Path::new(&config.journal.path))?)
}

fn heading(title: &str) {
    println!("{RULE}");
    println!("{}", title.bold().blue());
    println!("{RULE}");
}

// ── Commands ────────────────────────────────────────────────────────────

async fn scan(config: &Config) -> Result<i32, EngineError> {
    let (vector, metadata) = stores(config)?;
    let scope = Scope::from_config(&config.scope);

    heading("Scanning vector store collections");
    println!("Endpoint: {}", config.vector_store.endpoint);
    println!(
        "Auth: {}",
        if config.auth_enabled() { "enabled" } else { "disabled" }
    );
    println!(
        "Scope: {}",
        match scope {
            Scope::Managed => "host application collections only",
            Scope::All => "every collection",
        }
    );
    println!();

    let summary = Inventory::new(&vector, &metadata, scope).scan().await?;
    print_scan(&summary, &metadata).await;
    Ok(EXIT_OK)
}

async fn print_scan(summary: &ScanSummary, metadata: &PgMetadataStore) {
    println!("Total collections: {}", summary.total_in_store);
    println!("In scope: {}", summary.collections.len());
    println!(
        "{}",
        format!("Current format (OK): {}", summary.count(SchemaForm::Current)).green()
    );
    println!(
        "{}",
        format!("Legacy format (need fix): {}", summary.count(SchemaForm::Legacy)).yellow()
    );
    let unknown = summary.count(SchemaForm::Unknown);
    if unknown > 0 {
        println!(
            "{}",
            format!("Unrecognised (left untouched): {unknown}").red()
        );
    }
    if summary.unnamed > 0 {
        println!("Definitions without a class name: {}", summary.unnamed);
    }
    println!();

    let legacy: Vec<_> = summary.with_form(SchemaForm::Legacy).collect();
    if legacy.is_empty() {
        println!("{}", "No collections need fixing!".green());
    } else {
        let ids: Vec<DatasetId> = legacy.iter().filter_map(|c| c.dataset_id.clone()).collect();
        let names = NameLookup::resolve(metadata, &ids).await;

        println!("Collections needing fix:");
        println!("{THIN_RULE}");
        for (i, collection) in legacy.iter().enumerate() {
            println!("{:2}. {}", i + 1, collection.name.bold());
            if let Some(id) = &collection.dataset_id {
                println!("    Dataset ID: {id}");
                println!(
                    "    Name: {}",
                    names.name(id).unwrap_or("(name unavailable)")
                );
            }
            if let Some(created) = &collection.created_hint {
                println!("    Created: {created}");
            }
            println!("    Properties: {}", collection.property_count);
            println!();
        }
        if let Some(error) = names.error() {
            println!("(dataset names unavailable: {error})");
        }
    }

    if unknown > 0 {
        println!("Unrecognised collections (inspect manually):");
        for collection in summary.with_form(SchemaForm::Unknown) {
            println!("  - {}", collection.name);
        }
    }
}

async fn dry_run(config: &Config) -> Result<i32, EngineError> {
    let (vector, metadata) = stores(config)?;
    let summary = Inventory::new(&vector, &metadata, Scope::from_config(&config.scope))
        .scan()
        .await?;
    if summary.count(SchemaForm::Legacy) == 0 {
        println!("{}", "No collections need fixing!".green());
        return Ok(EXIT_OK);
    }

    heading("[DRY RUN] Simulating batch fix");
    let run = Executor::new(&vector, Mode::DryRun)
        .run_batch(&summary.collections)
        .await;
    finish_batch(&run, &metadata).await
}

async fn fix(config: &Config, confirmation: Confirmation) -> Result<i32, EngineError> {
    let (vector, metadata) = stores(config)?;
    let journal = open_journal(config)?;
    warn_pending_journal(&journal)?;

    let summary = Inventory::new(&vector, &metadata, Scope::from_config(&config.scope))
        .scan()
        .await?;
    let legacy = summary.count(SchemaForm::Legacy);
    if legacy == 0 {
        println!("{}", "No collections need fixing!".green());
        return Ok(EXIT_OK);
    }

    heading("Starting batch fix");
    if confirmation != Confirmation::Batch {
        prompt::print_destructive_warning(legacy);
    }
    let gate = prompt::TerminalGate;
    let run = Executor::new(
        &vector,
        Mode::Live {
            gate: &gate,
            journal: &journal,
            confirmation,
        },
    )
    .with_pause(config.executor.pause_between())
    .run_batch(&summary.collections)
    .await;

    if run.cancelled {
        println!("{}", "Cancelled. Nothing was changed.".yellow());
        return Ok(EXIT_OK);
    }
    finish_batch(&run, &metadata).await
}

async fn finish_batch(run: &BatchRun, metadata: &PgMetadataStore) -> Result<i32, EngineError> {
    let report = ReconciliationReport::build(&run.outcomes, metadata).await;
    println!();
    print!("{}", report.render());
    if let Some(e) = &run.aborted {
        eprintln!("{} run stopped early: {e}", "Error:".red().bold());
    }
    if report.requires_manual_recreation() {
        eprintln!(
            "{}",
            "Collections are missing from the store. See MANUAL RECREATION REQUIRED above."
                .red()
                .bold()
        );
    }
    Ok(batch_exit_code(run, &report))
}

async fn fix_one(config: &Config, name: &str) -> Result<i32, EngineError> {
    let (vector, metadata) = stores(config)?;
    let journal = open_journal(config)?;

    heading(&format!("Fixing: {name}"));
    prompt::print_destructive_warning(1);
    let gate = prompt::TerminalGate;
    let run = Executor::new(
        &vector,
        Mode::Live {
            gate: &gate,
            journal: &journal,
            confirmation: Confirmation::Preconfirmed,
        },
    )
    .run_one(name)
    .await;

    match run.outcomes.first().map(|o| &o.action) {
        Some(Action::Skipped {
            reason: SkipReason::NotLegacy,
        }) => println!("{}", "Already in the current format; nothing to do.".green()),
        Some(Action::Skipped {
            reason: SkipReason::NotFound,
        }) => eprintln!("{} collection '{name}' not found", "Error:".red().bold()),
        Some(Action::Recreated) => println!(
            "{}",
            format!("{name} fixed. Remember to re-embed its dataset.").green()
        ),
        _ => {}
    }

    let report = ReconciliationReport::build(&run.outcomes, &metadata).await;
    println!();
    print!("{}", report.render());
    if let Some(e) = &run.aborted {
        eprintln!("{} {e}", "Error:".red().bold());
    }
    Ok(single_exit_code(&run, &report))
}

async fn cleanup(config: &Config, yes: bool) -> Result<i32, EngineError> {
    let (vector, metadata) = stores(config)?;
    heading("Scanning for orphaned collections");

    let orphans = list_orphans(&vector, &metadata, Scope::from_config(&config.scope)).await?;
    println!("Orphaned collections: {}", orphans.len());
    println!();
    if orphans.is_empty() {
        println!("{}", "No orphaned collections found!".green());
        return Ok(EXIT_OK);
    }

    println!("Orphaned collections (in the vector store but not in the metadata store):");
    println!("{THIN_RULE}");
    for orphan in &orphans {
        println!("  - {}", orphan.name.bold());
        println!("    Dataset ID: {}", orphan.dataset_id);
        match orphan.object_count {
            Some(count) => println!("    Objects: {count}"),
            None => println!("    Objects: unknown"),
        }
        println!();
    }

    if !yes && !prompt::confirm(&format!("Delete {} orphaned collections?", orphans.len())) {
        println!("{}", "Cancelled.".yellow());
        return Ok(EXIT_OK);
    }

    let run = remove_orphans(&vector, &orphans).await;
    for name in &run.removed {
        println!("Deleted {name} {}", "ok".green());
    }
    for (name, e) in &run.failed {
        println!("Deleting {name} {} {e}", "failed:".red());
    }
    if let Some(e) = run.aborted {
        return Err(e);
    }
    if run.failed.is_empty() {
        println!("\n{}", "Cleanup complete!".green());
        Ok(EXIT_OK)
    } else {
        Ok(EXIT_TARGET_FAILED)
    }
}

async fn list_names(config: &Config) -> Result<i32, EngineError> {
    let (vector, metadata) = stores(config)?;
    let summary = Inventory::new(&vector, &metadata, Scope::from_config(&config.scope))
        .scan()
        .await?;
    let legacy: Vec<(&str, DatasetId)> = summary
        .with_form(SchemaForm::Legacy)
        .filter_map(|c| c.dataset_id.clone().map(|id| (c.name.as_str(), id)))
        .collect();
    if legacy.is_empty() {
        println!("{}", "No collections need fixing!".green());
        return Ok(EXIT_OK);
    }

    let ids: Vec<DatasetId> = legacy.iter().map(|(_, id)| id.clone()).collect();
    let names = NameLookup::resolve(&metadata, &ids).await;

    heading("Knowledge bases needing re-embedding");
    for (collection, id) in &legacy {
        println!();
        println!("- {}", names.name(id).unwrap_or("(name unavailable)").bold());
        println!("  ID: {id}");
        println!("  Collection: {collection}");
    }
    if let Some(error) = names.error() {
        println!("\n(dataset names unavailable: {error})");
    }
    Ok(EXIT_OK)
}

async fn count_check(config: &Config, name: Option<String>) -> Result<i32, EngineError> {
    let (vector, metadata) = stores(config)?;
    let inventory = Inventory::new(&vector, &metadata, Scope::from_config(&config.scope));
    let collections = match name {
        Some(name) => {
            let fetched = inventory.fetch(&name).await?;
            let Some(descriptor) = fetched else {
                return Err(EngineError::NotFound(name));
            };
            vec![descriptor]
        }
        None => inventory.list_collections().await?,
    };

    let rows = compare_counts(&vector, &metadata, &collections).await?;
    heading("Vector objects vs. document segments");
    if rows.is_empty() {
        println!("No dataset collections to check.");
        return Ok(EXIT_OK);
    }
    for row in &rows {
        let status = match row.status() {
            CountStatus::Complete => row.status().as_str().green(),
            CountStatus::Pending => row.status().as_str().yellow(),
            CountStatus::Excess => row.status().as_str().red(),
        };
        println!(
            "{}  objects {:>8}  segments {:>8}  {status}",
            row.dataset_name.as_deref().unwrap_or(row.dataset_id.as_str()),
            row.objects,
            row.segments
        );
        println!("    {}", row.collection_name);
    }
    Ok(EXIT_OK)
}

fn warn_pending_journal(journal: &Journal) -> Result<(), EngineError> {
    let pending = journal.needs_attention()?;
    if !pending.is_empty() {
        println!(
            "{}",
            format!(
                "{} earlier migration attempts still need attention; see `schemafix journal list`.",
                pending.len()
            )
            .yellow()
        );
    }
    Ok(())
}

fn journal_command(config: &Config, action: JournalAction) -> Result<i32, EngineError> {
    let journal = open_journal(config)?;
    match action {
        JournalAction::List { all } => {
            let entries = if all {
                journal.entries()?
            } else {
                journal.needs_attention()?
            };
            if entries.is_empty() {
                println!("{}", "No journal entries need attention.".green());
                return Ok(EXIT_OK);
            }
            for entry in &entries {
                let state = if entry.state.needs_attention() {
                    entry.state.as_str().red().bold()
                } else {
                    entry.state.as_str().normal()
                };
                println!(
                    "#{} {} [{state}] started {} (run {})",
                    entry.id,
                    entry.collection.bold(),
                    entry.started_at.to_rfc3339(),
                    entry.run_id
                );
                if let Some(detail) = &entry.detail {
                    println!("    {detail}");
                }
                if entry.state.needs_attention() {
                    println!("    Saved definition:");
                    let pretty = serde_json::to_string_pretty(&entry.legacy_definition)
                        .unwrap_or_else(|_| entry.legacy_definition.to_string());
                    for line in pretty.lines() {
                        println!("      {line}");
                    }
                }
            }
            Ok(EXIT_OK)
        }
        JournalAction::Resolve { id } => {
            if journal.resolve(id)? {
                println!("Marked journal entry #{id} as resolved.");
                Ok(EXIT_OK)
            } else {
                eprintln!("{} no journal entry #{id}", "Error:".red().bold());
                Ok(EXIT_JOURNAL)
            }
        }
    }
}

fn config_command(config: &Config, action: ConfigAction) -> Result<i32, EngineError> {
    match action {
        ConfigAction::Show => print!("{}", config.to_redacted_toml()?),
        ConfigAction::Validate => println!("Configuration is valid."),
    }
    Ok(EXIT_OK)
}
