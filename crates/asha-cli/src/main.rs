//! ASHA Collect CLI - offline-first field data capture from the terminal
//!
//! Submissions always land in the local queue first; syncing to the backend
//! happens opportunistically when it is reachable.

use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use asha_core::config::RemoteConfig;
use asha_core::connectivity::{ConnectivityMonitor, ConnectivityProbe, ConnectivityStatus};
use asha_core::db::{SqliteSubmissionStore, SubmissionStore};
use asha_core::intake::SubmissionIntake;
use asha_core::sync::{RemoteClient, SyncEngine};
use asha_core::{Category, Payload, Submission};
use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::aot::Generator;
use clap_complete::{generate, shells};
use serde::Serialize;
use thiserror::Error;

const DEFAULT_PROBE_INTERVAL_SECS: u64 = 30;

#[derive(Parser)]
#[command(name = "asha")]
#[command(about = "Capture health and water data that syncs when a connection exists")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to local queue database file
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a submission; syncs immediately when the backend is reachable
    Submit {
        /// Submission category
        #[arg(value_enum)]
        category: CategoryArg,
        /// Form fields as KEY=VALUE pairs
        #[arg(required = true, value_name = "KEY=VALUE")]
        fields: Vec<String>,
        /// Output the stored record as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recent submissions
    List {
        /// Number of submissions to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Filter by category
        #[arg(long, value_enum)]
        category: Option<CategoryArg>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List submissions still waiting for a remote acknowledgment
    Pending {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push unsynced submissions to the backend now
    Sync,
    /// Keep watching connectivity and sync whenever the backend comes back
    Watch {
        /// Seconds between reachability probes
        #[arg(short, long, default_value_t = DEFAULT_PROBE_INTERVAL_SECS)]
        interval: u64,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] asha_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid field '{0}': expected KEY=VALUE")]
    InvalidField(String),
    #[error("Duplicate field key: {0}")]
    DuplicateField(String),
    #[error("Remote is not configured. Set ASHA_REMOTE_URL to enable `asha sync` and `asha watch`.")]
    RemoteNotConfigured,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CategoryArg {
    Health,
    Water,
}

impl From<CategoryArg> for Category {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Health => Self::Health,
            CategoryArg::Water => Self::Water,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("asha=warn".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Submit {
            category,
            fields,
            json,
        } => {
            run_submit(category.into(), &fields, json, &db_path, |name| {
                env::var(name).ok()
            })
            .await?;
        }
        Commands::List {
            limit,
            category,
            json,
        } => run_list(limit, category.map(Category::from), json, &db_path)?,
        Commands::Pending { json } => run_pending(json, &db_path)?,
        Commands::Sync => run_sync(&db_path).await?,
        Commands::Watch { interval } => run_watch(interval, &db_path).await?,
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}

async fn run_submit(
    category: Category,
    fields: &[String],
    as_json: bool,
    db_path: &Path,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), CliError> {
    let payload = parse_fields(fields)?;
    let store = open_store(db_path)?;

    let submission = if let Some(config) = remote_config_from_lookup(env_lookup)? {
        let probe = ConnectivityProbe::new(
            config.probe_url(),
            Duration::from_secs(DEFAULT_PROBE_INTERVAL_SECS),
        )?;
        let monitor = ConnectivityMonitor::new(probe.check().await);
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&store) as Arc<dyn SubmissionStore>,
            RemoteClient::new(config)?,
        ));
        let intake = SubmissionIntake::new(
            Arc::clone(&store) as Arc<dyn SubmissionStore>,
            monitor,
            Arc::clone(&engine),
        );

        let submission = intake.submit(payload, category)?;
        engine.wait_idle().await;
        // Re-read to show the post-sync state.
        store.get(&submission.id)?.unwrap_or(submission)
    } else {
        store.append(&payload, category)?
    };

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&submission_to_list_item(&submission))?
        );
    } else {
        println!("{} [{}]", submission.id, submission.sync_state);
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct SubmissionListItem {
    id: String,
    category: String,
    sync_state: String,
    payload: Payload,
    created_at: i64,
    relative_time: String,
    attempt_count: u32,
}

fn run_list(
    limit: usize,
    category: Option<Category>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let submissions = store.list_recent(category, limit, 0)?;
    print_submissions(&submissions, as_json)
}

fn run_pending(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let submissions = store.list_pending()?;

    if !as_json && submissions.is_empty() {
        println!("Nothing pending");
        return Ok(());
    }
    print_submissions(&submissions, as_json)
}

async fn run_sync(db_path: &Path) -> Result<(), CliError> {
    let config = remote_config_from_env()?.ok_or(CliError::RemoteNotConfigured)?;
    let store = open_store(db_path)?;
    let engine = SyncEngine::new(
        store as Arc<dyn SubmissionStore>,
        RemoteClient::new(config)?,
    );

    let summary = engine.sync_now().await?;
    if summary.attempted == 0 && summary.skipped == 0 {
        println!("Nothing to sync");
    } else {
        println!(
            "Synced {}, failed {}, skipped {}",
            summary.synced, summary.failed, summary.skipped
        );
    }
    Ok(())
}

async fn run_watch(interval_secs: u64, db_path: &Path) -> Result<(), CliError> {
    let config = remote_config_from_env()?.ok_or(CliError::RemoteNotConfigured)?;
    let store = open_store(db_path)?;
    let probe = ConnectivityProbe::new(
        config.probe_url(),
        Duration::from_secs(interval_secs.max(1)),
    )?;

    let monitor = ConnectivityMonitor::new(ConnectivityStatus::Disconnected);
    let engine = Arc::new(SyncEngine::new(
        store as Arc<dyn SubmissionStore>,
        RemoteClient::new(config)?,
    ));
    let subscription = engine.watch_connectivity(&monitor);

    println!("Watching connectivity; press Ctrl-C to stop");
    tokio::select! {
        () = probe.run(&monitor) => {}
        _ = tokio::signal::ctrl_c() => {}
    }

    subscription.unsubscribe();
    engine.wait_idle().await;
    Ok(())
}

fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let mut command = Cli::command();
    let mut buffer = Vec::new();

    match shell {
        CompletionShell::Bash => generate_for_shell(shells::Bash, &mut command, &mut buffer),
        CompletionShell::Zsh => generate_for_shell(shells::Zsh, &mut command, &mut buffer),
        CompletionShell::Fish => generate_for_shell(shells::Fish, &mut command, &mut buffer),
    }

    if let Some(path) = output_path {
        std::fs::write(path, &buffer)?;
        println!("{}", path.display());
    } else {
        io::stdout().write_all(&buffer)?;
    }

    Ok(())
}

fn generate_for_shell<G: Generator>(
    generator: G,
    command: &mut clap::Command,
    buffer: &mut Vec<u8>,
) {
    generate(generator, command, "asha", buffer);
}

fn print_submissions(submissions: &[Submission], as_json: bool) -> Result<(), CliError> {
    if as_json {
        let items = submissions
            .iter()
            .map(submission_to_list_item)
            .collect::<Vec<SubmissionListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for line in format_submission_lines(submissions) {
            println!("{line}");
        }
    }
    Ok(())
}

fn format_submission_lines(submissions: &[Submission]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    submissions
        .iter()
        .map(|submission| {
            let id = submission.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let preview = payload_preview(&submission.payload, 40);
            let relative_time = format_relative_time(submission.created_at, now_ms);
            format!(
                "{short_id:<13}  {:<6}  {:<7}  {preview:<40}  {relative_time}",
                submission.category.to_string(),
                submission.sync_state.to_string(),
            )
        })
        .collect()
}

fn submission_to_list_item(submission: &Submission) -> SubmissionListItem {
    let now_ms = Utc::now().timestamp_millis();
    SubmissionListItem {
        id: submission.id.to_string(),
        category: submission.category.to_string(),
        sync_state: submission.sync_state.to_string(),
        payload: submission.payload.clone(),
        created_at: submission.created_at,
        relative_time: format_relative_time(submission.created_at, now_ms),
        attempt_count: submission.attempt_count,
    }
}

fn payload_preview(payload: &Payload, max_chars: usize) -> String {
    let joined = payload
        .iter()
        .map(|(key, value)| match value.as_str() {
            Some(text) => format!("{key}={text}"),
            None => format!("{key}={value}"),
        })
        .collect::<Vec<_>>()
        .join(" ");

    if joined.chars().count() <= max_chars {
        joined
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = joined.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

fn parse_fields(fields: &[String]) -> Result<Payload, CliError> {
    let mut payload = Payload::new();
    for field in fields {
        let Some((key, value)) = field.split_once('=') else {
            return Err(CliError::InvalidField(field.clone()));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(CliError::InvalidField(field.clone()));
        }
        if payload
            .insert(key.to_string(), value.trim().into())
            .is_some()
        {
            return Err(CliError::DuplicateField(key.to_string()));
        }
    }
    Ok(payload)
}

fn remote_config_from_env() -> Result<Option<RemoteConfig>, CliError> {
    remote_config_from_lookup(|name| env::var(name).ok())
}

fn remote_config_from_lookup(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Option<RemoteConfig>, CliError> {
    match lookup("ASHA_REMOTE_URL") {
        Some(url) if !url.trim().is_empty() => Ok(Some(RemoteConfig::from_lookup(lookup)?)),
        _ => Ok(None),
    }
}

fn open_store(path: &Path) -> Result<Arc<SqliteSubmissionStore>, CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Arc::new(SqliteSubmissionStore::open(path)?))
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("ASHA_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("asha")
        .join("asha.db")
}
