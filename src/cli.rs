use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Auto,
    Scripted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Subcommand)]
pub enum SessionCommands {
    #[command(about = "List all sessions in the configured store")]
    List,
    #[command(about = "Show events for a specific session")]
    Show {
        #[arg(long)]
        session_id: Option<String>,
        #[arg(long, default_value_t = 20)]
        recent: usize,
    },
    #[command(about = "Delete a session (requires --force)")]
    Delete {
        #[arg(long)]
        session_id: Option<String>,
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum MemoryCommands {
    #[command(about = "Show the resolved user/project memory documents")]
    Show,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Interactive triage chat with plan confirmation and approval prompts")]
    Chat,
    #[command(about = "One-shot triage run; --yes confirms the drafted plan automatically")]
    Triage {
        goal: Vec<String>,
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    #[command(subcommand, about = "Inspect or prune stored sessions")]
    Sessions(SessionCommands),
    #[command(subcommand, about = "Inspect agent memory documents")]
    Memory(MemoryCommands),
}

const CLI_EXAMPLES: &str = "Examples:\n\
  opsmind-cli chat\n\
  opsmind-cli triage \"investigate checkout latency spike in prod\" --yes\n\
  opsmind-cli --auto-approve chat\n\
  opsmind-cli --session-backend sqlite --session-db-url sqlite://.opsmind/sessions.db sessions list\n\
  opsmind-cli --gated-tool 'collect_*' triage \"investigate payment errors in staging\"\n\
  opsmind-cli memory show\n\
\n\
Approval behavior:\n\
  - Gated tools (default: execute_shell, fs_write, collect_logs) suspend the run\n\
    until you approve or reject the proposed actions.\n\
  - Use --auto-approve (or /auto in chat) to resolve gated actions automatically.\n\
  - Pending approvals survive restarts when the sqlite session backend is active.";

#[derive(Debug, Parser)]
#[command(name = "opsmind-cli")]
#[command(about = "DevOps triage agent with plan/confirm/dispatch orchestration")]
#[command(after_long_help = CLI_EXAMPLES)]
pub struct Cli {
    #[arg(long, env = "OPSMIND_PROVIDER", value_enum, default_value_t = Provider::Auto)]
    pub provider: Provider,

    #[arg(long, env = "OPSMIND_PROFILE", default_value = "default")]
    pub profile: String,

    #[arg(long, env = "OPSMIND_CONFIG", default_value = ".opsmind/config.toml")]
    pub config_path: String,

    #[arg(long, env = "OPSMIND_ASSISTANT_ID")]
    pub assistant_id: Option<String>,

    #[arg(long, env = "OPSMIND_SESSION_ID")]
    pub session_id: Option<String>,

    #[arg(long, env = "OPSMIND_SESSION_BACKEND", value_enum)]
    pub session_backend: Option<SessionBackend>,

    #[arg(long, env = "OPSMIND_SESSION_DB_URL")]
    pub session_db_url: Option<String>,

    /// Resolve gated tool actions as approved without prompting.
    #[arg(long, env = "OPSMIND_AUTO_APPROVE", default_value_t = false)]
    pub auto_approve: bool,

    /// Tool name pattern requiring approval before execution (repeatable, `*` wildcards).
    #[arg(long = "gated-tool")]
    pub gated_tool: Vec<String>,

    /// Tool name trusted for the whole run; skips the approval gate (repeatable).
    #[arg(long = "trust-tool")]
    pub trust_tool: Vec<String>,

    #[arg(long, env = "OPSMIND_SANDBOX_ROOT")]
    pub sandbox_root: Option<String>,

    /// Known service names used when extracting triage hints (repeatable).
    #[arg(long = "service")]
    pub service: Vec<String>,

    #[arg(long, default_value_t = false)]
    pub show_sensitive_config: bool,

    #[arg(long)]
    pub telemetry_enabled: Option<bool>,

    #[arg(long)]
    pub telemetry_path: Option<String>,

    #[arg(long, env = "OPSMIND_LOG", default_value = "warn")]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Commands,
}
