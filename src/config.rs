use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::{Cli, Provider, SessionBackend};
use std::collections::HashMap;

/// Default tool name patterns that require approval before execution.
/// `collect_logs` is gated because log payloads may leave the environment.
pub fn default_gated_tools() -> Vec<String> {
    vec![
        "execute_shell".to_string(),
        "fs_write".to_string(),
        "collect_logs".to_string(),
    ]
}

/// Default service catalog used by the triage hint extractor.
pub fn default_services() -> Vec<String> {
    ["checkout", "payment", "api-gateway", "search", "auth"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub profile: String,
    pub config_path: String,
    pub assistant_id: String,
    pub provider: Provider,
    pub session_id: String,
    pub session_backend: SessionBackend,
    pub session_db_url: String,
    pub show_sensitive_config: bool,
    pub auto_approve: bool,
    pub gated_tools: Vec<String>,
    pub trusted_tools: Vec<String>,
    pub sandbox_root: PathBuf,
    pub services: Vec<String>,
    pub step_retry_attempts: u32,
    pub step_retry_delay_ms: u64,
    pub shell_timeout_secs: u64,
    pub shell_max_output_chars: usize,
    pub telemetry_enabled: bool,
    pub telemetry_path: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfilesFile {
    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub provider: Option<Provider>,
    pub assistant_id: Option<String>,
    pub session_id: Option<String>,
    pub session_backend: Option<SessionBackend>,
    pub session_db_url: Option<String>,
    pub auto_approve: Option<bool>,
    #[serde(default)]
    pub gated_tools: Vec<String>,
    #[serde(default)]
    pub trusted_tools: Vec<String>,
    pub sandbox_root: Option<String>,
    #[serde(default)]
    pub services: Vec<String>,
    pub step_retry_attempts: Option<u32>,
    pub step_retry_delay_ms: Option<u64>,
    pub shell_timeout_secs: Option<u64>,
    pub shell_max_output_chars: Option<usize>,
    pub telemetry_enabled: Option<bool>,
    pub telemetry_path: Option<String>,
}

pub fn load_profiles(config_path: &str) -> Result<ProfilesFile> {
    let path = Path::new(config_path);
    if !path.exists() {
        return Ok(ProfilesFile::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read profile config file at '{}'", path.display()))?;
    toml::from_str::<ProfilesFile>(&content).with_context(|| {
        format!(
            "invalid profile configuration in '{}'. Check provider/session values and field names.",
            path.display()
        )
    })
}

pub fn merge_unique_names(base: &[String], extra: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::<String>::new();
    base.iter()
        .chain(extra.iter())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

pub fn resolve_runtime_config(cli: &Cli, profiles: &ProfilesFile) -> Result<RuntimeConfig> {
    let selected = cli.profile.trim();
    if selected.is_empty() {
        return Err(anyhow::anyhow!(
            "profile name cannot be empty. Set --profile <name>."
        ));
    }

    let profile = if selected == "default" && !profiles.profiles.contains_key("default") {
        ProfileConfig::default()
    } else {
        profiles.profiles.get(selected).cloned().ok_or_else(|| {
            let mut names = profiles.profiles.keys().cloned().collect::<Vec<String>>();
            names.sort();
            if names.is_empty() {
                anyhow::anyhow!(
                    "profile '{}' not found in '{}'. No profiles are defined yet.",
                    selected,
                    cli.config_path
                )
            } else {
                anyhow::anyhow!(
                    "profile '{}' not found in '{}'. Available profiles: {}",
                    selected,
                    cli.config_path,
                    names.join(", ")
                )
            }
        })?
    };

    let provider = if cli.provider != Provider::Auto {
        cli.provider
    } else {
        profile.provider.unwrap_or(Provider::Auto)
    };

    let gated_tools = {
        let merged = merge_unique_names(&profile.gated_tools, &cli.gated_tool);
        if merged.is_empty() {
            default_gated_tools()
        } else {
            merged
        }
    };
    let trusted_tools = merge_unique_names(&profile.trusted_tools, &cli.trust_tool);
    let services = {
        let merged = merge_unique_names(&profile.services, &cli.service);
        if merged.is_empty() {
            default_services()
        } else {
            merged
        }
    };

    let sandbox_root = cli
        .sandbox_root
        .clone()
        .or(profile.sandbox_root)
        .map(PathBuf::from)
        .map_or_else(
            || std::env::current_dir().context("failed to resolve current directory"),
            Ok,
        )?;

    Ok(RuntimeConfig {
        profile: selected.to_string(),
        config_path: cli.config_path.clone(),
        assistant_id: cli
            .assistant_id
            .clone()
            .or(profile.assistant_id)
            .unwrap_or_else(|| "opsmind".to_string()),
        provider,
        session_id: cli
            .session_id
            .clone()
            .or(profile.session_id)
            .unwrap_or_else(|| "triage-session".to_string()),
        session_backend: cli
            .session_backend
            .or(profile.session_backend)
            .unwrap_or(SessionBackend::Memory),
        session_db_url: cli
            .session_db_url
            .clone()
            .or(profile.session_db_url)
            .unwrap_or_else(|| "sqlite://.opsmind/sessions.db".to_string()),
        show_sensitive_config: cli.show_sensitive_config,
        auto_approve: cli.auto_approve || profile.auto_approve.unwrap_or(false),
        gated_tools,
        trusted_tools,
        sandbox_root,
        services,
        step_retry_attempts: profile.step_retry_attempts.unwrap_or(2),
        step_retry_delay_ms: profile.step_retry_delay_ms.unwrap_or(250),
        shell_timeout_secs: profile.shell_timeout_secs.unwrap_or(20),
        shell_max_output_chars: profile.shell_max_output_chars.unwrap_or(8000),
        telemetry_enabled: cli
            .telemetry_enabled
            .or(profile.telemetry_enabled)
            .unwrap_or(false),
        telemetry_path: cli
            .telemetry_path
            .clone()
            .or(profile.telemetry_path)
            .unwrap_or_else(|| ".opsmind/telemetry.jsonl".to_string()),
    })
}

pub fn display_session_db_url(cfg: &RuntimeConfig) -> String {
    if cfg.show_sensitive_config {
        cfg.session_db_url.clone()
    } else {
        format!(
            "{} (set --show-sensitive-config to reveal)",
            crate::error::redact_sqlite_url_value(&cfg.session_db_url)
        )
    }
}
