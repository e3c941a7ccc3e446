use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use gamesync_core::config::{ResolvedConfig, load_config, resolve_config_path, write_default_config};
use gamesync_core::reconcile::{
    SyncOptions, SyncReport, TransitionReport, sync_games, transition_games,
};
use gamesync_core::status::Status;
use gamesync_core::workspace::{
    NotionClient, NotionClientConfig, RecordFilter, WorkspaceApi, WorkspaceRecord,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, prelude::*};

#[derive(Debug, Parser)]
#[command(
    name = "gamesync",
    version,
    about = "Sync a storefront game library and wishlist into a workspace database"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Compute changes without writing to the workspace")]
    dry_run: bool,
    #[arg(long, global = true, help = "Print reports as JSON")]
    json: bool,
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    config: Option<PathBuf>,
    dry_run: bool,
    json: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            config: cli.config.clone(),
            dry_run: cli.dry_run,
            json: cli.json,
        }
    }

    fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            dry_run: self.dry_run,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create missing records, then transition released games")]
    Sync,
    #[command(name = "sync-games", about = "Create records for games missing from the workspace")]
    SyncGames,
    #[command(about = "Move Unreleased records whose release date has passed to Unowned")]
    Transition,
    #[command(about = "Print workspace game records")]
    List(ListArgs),
    #[command(about = "Write a starter config file")]
    Init(InitArgs),
}

#[derive(Debug, Args)]
struct ListArgs {
    #[arg(long, value_name = "STATUS", help = "Only list records with this status")]
    status: Option<Status>,
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    init_logging(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Sync) => run_sync(&runtime),
        Some(Commands::SyncGames) => run_sync_games(&runtime),
        Some(Commands::Transition) => run_transition(&runtime),
        Some(Commands::List(args)) => run_list(&runtime, args),
        Some(Commands::Init(args)) => run_init(&runtime, args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
}

fn run_sync(runtime: &RuntimeOptions) -> Result<()> {
    let config = resolve_runtime_config(runtime)?;
    let options = runtime.sync_options();
    let sync_report = sync_games(&config, &options).context("game sync failed")?;
    let transition_report =
        transition_games(&config, &options).context("status transition failed")?;

    if runtime.json {
        let combined = serde_json::json!({
            "sync": sync_report,
            "transition": transition_report,
        });
        println!("{}", serde_json::to_string_pretty(&combined)?);
        return Ok(());
    }
    print_sync_report(&config, &sync_report);
    println!();
    print_transition_report(&config, &transition_report);
    Ok(())
}

fn run_sync_games(runtime: &RuntimeOptions) -> Result<()> {
    let config = resolve_runtime_config(runtime)?;
    let report = sync_games(&config, &runtime.sync_options()).context("game sync failed")?;
    if runtime.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_sync_report(&config, &report);
    }
    Ok(())
}

fn run_transition(runtime: &RuntimeOptions) -> Result<()> {
    let config = resolve_runtime_config(runtime)?;
    let report = transition_games(&config, &runtime.sync_options())
        .context("status transition failed")?;
    if runtime.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_transition_report(&config, &report);
    }
    Ok(())
}

fn run_list(runtime: &RuntimeOptions, args: ListArgs) -> Result<()> {
    let config = resolve_runtime_config(runtime)?;
    let mut client = NotionClient::new(NotionClientConfig::from_settings(
        &config.workspace,
        &config.http,
    ))?;
    let filter = args.status.map(RecordFilter::Status);
    let query = client
        .query_records(&config.workspace.database_id, filter.as_ref())
        .context("failed to query workspace records")?;
    info!(records = query.records.len(), "queried workspace");

    if runtime.json {
        println!("{}", serde_json::to_string_pretty(&query)?);
        return Ok(());
    }
    println!("database_id: {}", config.workspace.database_id);
    println!("test_database: {}", format_flag(config.workspace.using_test_database));
    println!(
        "status_filter: {}",
        args.status.map(Status::as_str).unwrap_or("<none>")
    );
    println!("records: {}", query.records.len());
    println!("invalid_records: {}", query.rejected.len());
    for rejected in &query.rejected {
        println!(
            "invalid: {} ({}) {}",
            rejected.title.as_deref().unwrap_or("<untitled>"),
            rejected.id,
            rejected.reason
        );
    }
    for record in &query.records {
        println!();
        print_record(record);
    }
    Ok(())
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let cwd = env::current_dir().context("failed to resolve current directory")?;
    let (config_path, source) = resolve_config_path(runtime.config.as_deref(), &cwd);
    let wrote_config = write_default_config(&config_path, args.force)?;

    println!("config_path: {}", normalize_path(&config_path));
    println!("config_source: {}", source.as_str());
    println!("wrote_config: {}", format_flag(wrote_config));
    if !wrote_config {
        println!("hint: pass --force to overwrite the existing file");
    }
    Ok(())
}

fn resolve_runtime_config(runtime: &RuntimeOptions) -> Result<ResolvedConfig> {
    let cwd = env::current_dir().context("failed to resolve current directory")?;
    let (config_path, source) = resolve_config_path(runtime.config.as_deref(), &cwd);
    let config = load_config(&config_path)?;
    let resolved = config.resolve().with_context(|| {
        format!(
            "invalid configuration ({} from {})",
            normalize_path(&config_path),
            source.as_str()
        )
    })?;
    if resolved.workspace.using_test_database {
        info!("ENVIRONMENT selects the test game database");
    }
    Ok(resolved)
}

fn print_sync_report(config: &ResolvedConfig, report: &SyncReport) {
    println!("sync_games");
    println!("database_id: {}", config.workspace.database_id);
    println!("dry_run: {}", format_flag(report.dry_run));
    println!("curated_ids: {}", config.store.collections.len());
    println!("library_games: {}", report.library_games);
    println!("wishlist_games: {}", report.wishlist_games);
    println!("existing_records: {}", report.existing_records);
    println!("invalid_records: {}", report.invalid_records);
    println!("created: {}", report.created);
    println!("unchanged: {}", report.unchanged);
    println!("unresolved: {}", format_list(&report.unresolved));
    println!("store_requests: {}", report.store_request_count);
    println!("workspace_requests: {}", report.workspace_request_count);
    for game in &report.games {
        println!(
            "game: {} [{}] {} ({})",
            game.action.as_str(),
            game.status,
            game.title,
            game.external_id
        );
    }
}

fn print_transition_report(config: &ResolvedConfig, report: &TransitionReport) {
    println!("transition_games");
    println!("database_id: {}", config.workspace.database_id);
    println!("dry_run: {}", format_flag(report.dry_run));
    println!("examined: {}", report.examined);
    println!("transitioned: {}", report.transitioned);
    println!("still_unreleased: {}", report.still_unreleased);
    println!("skipped: {}", report.skipped);
    println!("invalid_records: {}", report.invalid_records);
    println!("workspace_requests: {}", report.request_count);
    for record in &report.records {
        println!(
            "record: {} {} ({})",
            record.action.as_str(),
            record.title,
            record.release_date.as_deref().unwrap_or("<empty>")
        );
    }
}

fn print_record(record: &WorkspaceRecord) {
    println!("title: {}", record.title);
    println!("id: {}", record.id);
    println!(
        "status: {}",
        record.status.map(Status::as_str).unwrap_or("<empty>")
    );
    println!("platform: {}", format_list(&record.platforms));
    println!("tags: {}", format_list(&record.genres));
    println!("store_page: {}", format_optional(&record.store_url));
    println!("cover_art: {}", format_optional(&record.cover_art));
    println!("release_date: {}", format_optional(&record.release_date));
    println!("completed_date: {}", format_optional(&record.completed_date));
    println!("rating: {}", format_optional(&record.rating));
    println!("notes: {}", format_optional(&record.notes));
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn format_optional(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("<empty>")
}

fn format_list(values: &[String]) -> String {
    if values.is_empty() {
        "<empty>".to_string()
    } else {
        values.join(", ")
    }
}
