use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use opsmind_cli::chat::{run_chat, run_triage};
use opsmind_cli::cli::{Cli, Commands, MemoryCommands, SessionCommands};
use opsmind_cli::config::{RuntimeConfig, load_profiles, resolve_runtime_config};
use opsmind_cli::error::{categorize_error, format_cli_error};
use opsmind_cli::memory::{MemoryLoader, MemoryState};
use opsmind_cli::session::build_session_store;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let show_sensitive_config = cli.show_sensitive_config;
    if let Err(err) = run_cli(cli).await {
        eprintln!("{}", format_cli_error(&err, show_sensitive_config));
        tracing::error!(category = %categorize_error(&err).code(), error = %err, "command failed");
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(filter: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(filter))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialize tracing: {err}"))
}

async fn run_cli(cli: Cli) -> Result<()> {
    init_tracing(&cli.log_filter)?;
    let profiles = load_profiles(&cli.config_path)?;
    let cfg = resolve_runtime_config(&cli, &profiles)?;

    match cli.command {
        Commands::Chat => run_chat(cfg).await,
        Commands::Triage { goal, yes } => {
            let goal = goal.join(" ");
            if goal.trim().is_empty() {
                anyhow::bail!("triage goal cannot be empty. Pass it as an argument.");
            }
            run_triage(cfg, &goal, yes).await
        }
        Commands::Sessions(command) => run_sessions(command, &cfg).await,
        Commands::Memory(MemoryCommands::Show) => show_memory(&cfg),
    }
}

async fn run_sessions(command: SessionCommands, cfg: &RuntimeConfig) -> Result<()> {
    let store = build_session_store(cfg).await?;

    match command {
        SessionCommands::List => {
            let summaries = store.list_sessions().await?;
            if summaries.is_empty() {
                println!("No sessions stored yet.");
                return Ok(());
            }
            for summary in summaries {
                println!("{} ({} events)", summary.session_id, summary.event_count);
            }
        }
        SessionCommands::Show { session_id, recent } => {
            let session_id = session_id.unwrap_or_else(|| cfg.session_id.clone());
            let events = store.events(&session_id, Some(recent)).await?;
            if events.is_empty() {
                println!("No events for session '{session_id}'.");
                return Ok(());
            }
            for event in events {
                println!(
                    "[{}] {}/{}: {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    event.author,
                    event.kind,
                    event.payload
                );
            }
        }
        SessionCommands::Delete { session_id, force } => {
            let session_id = session_id.unwrap_or_else(|| cfg.session_id.clone());
            if !force {
                anyhow::bail!(
                    "deleting session '{session_id}' is destructive. Re-run with --force."
                );
            }
            store.delete_session(&session_id).await?;
            println!("Deleted session '{session_id}'.");
        }
    }
    Ok(())
}

fn show_memory(cfg: &RuntimeConfig) -> Result<()> {
    let loader = MemoryLoader::from_environment(&cfg.assistant_id);
    let update = loader.load(&MemoryState::default());

    match loader.user_doc_path() {
        Some(path) => println!("User memory path: {}", path.display()),
        None => println!("User memory path: unavailable (no home directory)"),
    }
    match update.user_memory {
        Some(text) => println!("{text}\n"),
        None => println!("  (not present)\n"),
    }

    match loader.project_doc_path() {
        Some(path) => println!("Project memory path: {}", path.display()),
        None => println!("Project memory path: no project root detected"),
    }
    match update.project_memory {
        Some(text) => println!("{text}"),
        None => println!("  (not present)"),
    }
    Ok(())
}
