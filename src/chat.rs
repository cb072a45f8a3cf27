use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use crate::config::RuntimeConfig;
use crate::gate::{ActionRequest, ApprovalGate, Interrupt, RequestDecision};
use crate::memory::{MemoryLoader, MemoryState, load_session_memory};
use crate::orchestrator::{Orchestrator, TurnOutcome};
use crate::provider::resolve_model;
use crate::session::{
    PROJECT_MEMORY_KEY, SessionEvent, SessionStore, USER_MEMORY_KEY, build_session_store,
};
use crate::streaming::{AgentEvent, AuthorTextTracker, EventReceiver, event_channel};
use crate::subagent::builtin_subagents;
use crate::telemetry::TelemetrySink;
use crate::theme::{self, BOLD, CYAN, DIM, GREEN, RED, RESET, YELLOW};
use crate::tools::{EXECUTE_SHELL_TOOL_NAME, FS_WRITE_TOOL_NAME, ToolRegistry, build_builtin_tools};

// ---------------------------------------------------------------------------
// Command parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Exit,
    Help,
    Status,
    Tools,
    Agents,
    Plan,
    Confirm,
    Revise(String),
    Approve,
    Reject(String),
    Auto,
    Memory,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedChatCommand {
    NotACommand,
    Command(ChatCommand),
    MissingArgument { usage: &'static str },
    UnknownCommand(String),
}

pub fn parse_chat_command(input: &str) -> ParsedChatCommand {
    let trimmed = input.trim();

    if trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("/exit") {
        return ParsedChatCommand::Command(ChatCommand::Exit);
    }

    if !trimmed.starts_with('/') {
        return ParsedChatCommand::NotACommand;
    }

    let slashless = trimmed.trim_start_matches('/');
    if slashless.is_empty() {
        return ParsedChatCommand::UnknownCommand("/".to_string());
    }

    let mut parts = slashless.splitn(2, char::is_whitespace);
    let command = parts
        .next()
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    let arg = parts.next().map(str::trim).unwrap_or_default();

    match command.as_str() {
        "exit" => ParsedChatCommand::Command(ChatCommand::Exit),
        "help" => ParsedChatCommand::Command(ChatCommand::Help),
        "status" => ParsedChatCommand::Command(ChatCommand::Status),
        "tools" => ParsedChatCommand::Command(ChatCommand::Tools),
        "agents" => ParsedChatCommand::Command(ChatCommand::Agents),
        "plan" => ParsedChatCommand::Command(ChatCommand::Plan),
        "confirm" => ParsedChatCommand::Command(ChatCommand::Confirm),
        "revise" => {
            if arg.is_empty() {
                ParsedChatCommand::MissingArgument {
                    usage: "/revise <extra hints, e.g. 'service checkout in prod, last 30 minutes'>",
                }
            } else {
                ParsedChatCommand::Command(ChatCommand::Revise(arg.to_string()))
            }
        }
        "approve" => ParsedChatCommand::Command(ChatCommand::Approve),
        "reject" => ParsedChatCommand::Command(ChatCommand::Reject(arg.to_string())),
        "auto" => ParsedChatCommand::Command(ChatCommand::Auto),
        "memory" => ParsedChatCommand::Command(ChatCommand::Memory),
        "cancel" => ParsedChatCommand::Command(ChatCommand::Cancel),
        other => ParsedChatCommand::UnknownCommand(format!("/{other}")),
    }
}

pub fn print_chat_help() {
    print!("{}", theme::format_command_palette());
    println!();
    println!("Flow: describe an incident to draft a plan, {CYAN}/confirm{RESET} to dispatch,");
    println!("then {CYAN}/approve{RESET} or {CYAN}/reject{RESET} when gated actions come up.");
    println!("Direct commands like {CYAN}run make format{RESET} skip planning and go straight to the gate.");
}

// ---------------------------------------------------------------------------
// Runtime assembly
// ---------------------------------------------------------------------------

/// Build the orchestrator with its injected collaborators for one session.
pub async fn build_runtime(
    cfg: &RuntimeConfig,
    command: &str,
) -> Result<(Orchestrator, Arc<dyn SessionStore>, EventReceiver, String)> {
    let store = build_session_store(cfg).await?;
    store.ensure_session(&cfg.session_id).await?;

    let telemetry = TelemetrySink::new(cfg, command.to_string());
    let registry = Arc::new(ToolRegistry::new(build_builtin_tools(cfg)));
    let gate = ApprovalGate::new(
        cfg.gated_tools.clone(),
        cfg.trusted_tools.clone(),
        cfg.auto_approve,
    );
    let (model, model_name) = resolve_model(cfg)?;
    tracing::info!(provider = %model_name, "using model backend");
    let (events, receiver) = event_channel();

    let orchestrator = Orchestrator::new(
        cfg.clone(),
        model,
        registry,
        builtin_subagents(),
        gate,
        store.clone(),
        events,
        telemetry,
    );
    Ok((orchestrator, store, receiver, model_name))
}

/// Load user/project memory into the session and hand it to the orchestrator.
pub async fn attach_session_memory(
    orchestrator: &mut Orchestrator,
    store: &Arc<dyn SessionStore>,
    cfg: &RuntimeConfig,
) -> Result<()> {
    let loader = MemoryLoader::from_environment(&cfg.assistant_id);
    load_session_memory(&loader, store, &cfg.session_id).await?;

    let memory = MemoryState {
        user_memory: store
            .get_state(&cfg.session_id, USER_MEMORY_KEY)
            .await?
            .and_then(|v| v.as_str().map(String::from)),
        project_memory: store
            .get_state(&cfg.session_id, PROJECT_MEMORY_KEY)
            .await?
            .and_then(|v| v.as_str().map(String::from)),
    };
    orchestrator.set_memory(memory);
    Ok(())
}

// ---------------------------------------------------------------------------
// Event printing
// ---------------------------------------------------------------------------

/// Render streamed agent events: progress notices to stderr, token deltas to
/// stdout as they arrive.
pub fn spawn_event_printer(mut receiver: EventReceiver) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tracker = AuthorTextTracker::default();
        let mut current_author: Option<String> = None;
        while let Some(event) = receiver.recv().await {
            match event {
                AgentEvent::Progress { phase, detail } => {
                    eprintln!("{DIM}· {phase}: {detail}{RESET}");
                }
                AgentEvent::Token {
                    author,
                    text,
                    partial,
                    is_final,
                } => {
                    let delta = tracker.ingest(&author, &text, partial, is_final);
                    if !delta.is_empty() {
                        if current_author.as_deref() != Some(author.as_str()) {
                            println!("\n{CYAN}[{author}]{RESET}");
                            current_author = Some(author.clone());
                        }
                        print!("{delta}");
                        let _ = std::io::stdout().flush();
                    }
                    if is_final && current_author.as_deref() == Some(author.as_str()) {
                        println!();
                        current_author = None;
                    }
                }
                AgentEvent::ToolRequested { author, tool } => {
                    eprintln!("{DIM}→ {author} calls {tool}{RESET}");
                }
                AgentEvent::ToolCompleted { author, tool, ok } => {
                    if !ok {
                        eprintln!("{YELLOW}⚠ {author}: {tool} reported an error{RESET}");
                    }
                }
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Interactive loop
// ---------------------------------------------------------------------------

async fn read_input_line(prompt: String) -> Option<String> {
    tokio::task::spawn_blocking(move || {
        eprint!("{prompt}");
        let _ = std::io::stderr().flush();
        let mut buf = String::new();
        match std::io::stdin().read_line(&mut buf) {
            Ok(0) => None,
            Ok(_) => Some(buf.trim_end().to_string()),
            Err(_) => None,
        }
    })
    .await
    .unwrap_or(None)
}

fn render_action_request(request: &ActionRequest, cfg: &RuntimeConfig) -> String {
    match request.tool.as_str() {
        EXECUTE_SHELL_TOOL_NAME => {
            let command = request
                .args
                .get("command")
                .and_then(Value::as_str)
                .unwrap_or("?");
            format!("{BOLD}{CYAN}${RESET} {command}")
        }
        FS_WRITE_TOOL_NAME => {
            crate::tools::fs_write::render_write_preview(&cfg.sandbox_root, &request.args)
        }
        _ => {
            let pretty = serde_json::to_string_pretty(&request.args)
                .unwrap_or_else(|_| request.args.to_string());
            format!("{BOLD}{CYAN}{}{RESET} {DIM}{pretty}{RESET}", request.tool)
        }
    }
}

fn print_interrupt(interrupt: &Interrupt, cfg: &RuntimeConfig) {
    eprintln!();
    eprintln!("{BOLD}{YELLOW}Approval required{RESET} {DIM}({}){RESET}", interrupt.id);
    for (index, request) in interrupt.action_requests.iter().enumerate() {
        let origin = match request.step_id {
            Some(step) => format!("step {}", step + 1),
            None => "direct action".to_string(),
        };
        eprintln!("  {DIM}{}. [{origin}]{RESET}", index + 1);
        for line in render_action_request(request, cfg).lines() {
            eprintln!("  {line}");
        }
    }
    eprintln!("{DIM}Use {GREEN}/approve{DIM} to run or {GREEN}/reject [reason]{DIM} to decline.{RESET}");
}

fn print_action_result(tool: &str, result: &Value) {
    if tool == EXECUTE_SHELL_TOOL_NAME {
        if let Some(stdout) = result.get("stdout").and_then(Value::as_str)
            && !stdout.is_empty()
        {
            print!("{stdout}");
            if !stdout.ends_with('\n') {
                println!();
            }
        }
        if let Some(stderr) = result.get("stderr").and_then(Value::as_str)
            && !stderr.is_empty()
        {
            eprint!("{RED}{stderr}{RESET}");
            if !stderr.ends_with('\n') {
                eprintln!();
            }
        }
    }
    if result.get("status").and_then(Value::as_str) == Some("error") {
        if let Some(error) = result.get("error").and_then(Value::as_str) {
            eprintln!("{RED}{error}{RESET}");
        }
    } else if tool == FS_WRITE_TOOL_NAME
        && let Some(path) = result.get("path").and_then(Value::as_str)
    {
        eprintln!("{DIM}  ✓ wrote {path}{RESET}");
    }
}

fn print_status(cfg: &RuntimeConfig, orchestrator: &Orchestrator, model_name: &str) {
    println!("Profile: {}", cfg.profile);
    println!("Provider: {model_name}");
    println!("Session: {} ({:?} backend)", cfg.session_id, cfg.session_backend);
    println!("Session db: {}", crate::config::display_session_db_url(cfg));
    println!(
        "Auto-approve: {}",
        if orchestrator.gate.auto_approve() {
            "on"
        } else {
            "off"
        }
    );
    println!("Gated tools: {}", orchestrator.gate.gated_patterns().join(", "));
    match orchestrator.current_plan() {
        Some(plan) if plan.is_confirmed() => println!("Plan: confirmed, {} step(s)", plan.steps.len()),
        Some(plan) => println!("Plan: drafted, {} step(s), awaiting /confirm", plan.steps.len()),
        None => println!("Plan: none"),
    }
}

fn print_tools(orchestrator: &Orchestrator) {
    println!("Registered tools:");
    for name in orchestrator.registry().names() {
        let gated = if orchestrator.gate.requires_approval(&name) {
            format!(" {YELLOW}(gated){RESET}")
        } else {
            String::new()
        };
        println!("  {name}{gated}");
    }
}

fn print_agents(orchestrator: &Orchestrator) {
    println!("Sub-agents:");
    for spec in orchestrator.subagents() {
        println!("  {BOLD}{}{RESET}: {}", spec.name, spec.description);
        println!("    tools: {}", spec.tools.join(", "));
    }
}

async fn print_memory(orchestrator: &Orchestrator, store: &Arc<dyn SessionStore>, cfg: &RuntimeConfig) -> Result<()> {
    let user = store.get_state(&cfg.session_id, USER_MEMORY_KEY).await?;
    let project = store.get_state(&cfg.session_id, PROJECT_MEMORY_KEY).await?;
    match user.as_ref().and_then(Value::as_str) {
        Some(text) => println!("User memory:\n{text}\n"),
        None => println!("User memory: none loaded\n"),
    }
    match project.as_ref().and_then(Value::as_str) {
        Some(text) => println!("Project memory:\n{text}\n"),
        None => println!("Project memory: none loaded\n"),
    }
    println!("{DIM}Effective system context:{RESET}\n{}", orchestrator.system_context());
    Ok(())
}

/// Render an orchestrator outcome for the terminal.
fn handle_outcome(outcome: &TurnOutcome, cfg: &RuntimeConfig) {
    match outcome {
        TurnOutcome::AwaitingConfirmation(plan) => {
            println!();
            print!("{}", plan.render());
            println!(
                "{DIM}Confirm with {GREEN}/confirm{DIM} (or 'yes'), adjust with {GREEN}/revise <hints>{DIM}.{RESET}"
            );
        }
        TurnOutcome::AwaitingApproval(interrupt) => {
            print_interrupt(interrupt, cfg);
        }
        TurnOutcome::Completed(_) => {
            // The report already streamed through the event printer.
        }
        TurnOutcome::ActionResult { tool, result } => {
            print_action_result(tool, result);
        }
    }
}

pub async fn run_chat(cfg: RuntimeConfig) -> Result<()> {
    let (mut orchestrator, store, receiver, model_name) = build_runtime(&cfg, "chat").await?;
    let printer = spawn_event_printer(receiver);

    attach_session_memory(&mut orchestrator, &store, &cfg).await?;
    theme::print_startup_banner(&model_name, &cfg.session_id, cfg.auto_approve);

    // A run suspended at the gate in a previous process resumes here.
    if let Some(interrupt) = orchestrator.restore().await? {
        eprintln!("{YELLOW}A pending approval survived the last session.{RESET}");
        print_interrupt(&interrupt, &cfg);
    }

    let mut awaiting_confirmation = orchestrator
        .current_plan()
        .map(|plan| !plan.is_confirmed())
        .unwrap_or(false);

    loop {
        let prompt = theme::build_prompt(&orchestrator.gate, awaiting_confirmation);
        let Some(line) = read_input_line(prompt).await else {
            // Clean exit on end-of-input.
            println!();
            break;
        };
        let input = line.trim().to_string();
        if input.is_empty() {
            continue;
        }

        match parse_chat_command(&input) {
            ParsedChatCommand::Command(ChatCommand::Exit) => break,
            ParsedChatCommand::Command(ChatCommand::Help) => print_chat_help(),
            ParsedChatCommand::Command(ChatCommand::Status) => {
                print_status(&cfg, &orchestrator, &model_name)
            }
            ParsedChatCommand::Command(ChatCommand::Tools) => print_tools(&orchestrator),
            ParsedChatCommand::Command(ChatCommand::Agents) => print_agents(&orchestrator),
            ParsedChatCommand::Command(ChatCommand::Plan) => match orchestrator.current_plan() {
                Some(plan) => print!("{}", plan.render()),
                None => println!("No plan drafted yet. Describe an incident to start."),
            },
            ParsedChatCommand::Command(ChatCommand::Memory) => {
                print_memory(&orchestrator, &store, &cfg).await?;
            }
            ParsedChatCommand::Command(ChatCommand::Auto) => {
                let enabled = !orchestrator.gate.auto_approve();
                orchestrator.gate.set_auto_approve(enabled);
                println!(
                    "Auto-approve {}",
                    if enabled { "enabled ⚡" } else { "disabled" }
                );
            }
            ParsedChatCommand::Command(ChatCommand::Cancel) => {
                orchestrator.cancel().await?;
                awaiting_confirmation = false;
                println!("Run cancelled; pending approvals were rejected.");
            }
            ParsedChatCommand::Command(ChatCommand::Confirm) => {
                match run_turn(&mut orchestrator, Turn::Confirm, &cfg, &store).await? {
                    Some(still_awaiting) => awaiting_confirmation = still_awaiting,
                    None => {}
                }
            }
            ParsedChatCommand::Command(ChatCommand::Revise(extra)) => {
                match run_turn(&mut orchestrator, Turn::Revise(extra), &cfg, &store).await? {
                    Some(still_awaiting) => awaiting_confirmation = still_awaiting,
                    None => {}
                }
            }
            ParsedChatCommand::Command(ChatCommand::Approve) => {
                match run_turn(&mut orchestrator, Turn::Resolve { approve: true, reason: None }, &cfg, &store)
                    .await?
                {
                    Some(still_awaiting) => awaiting_confirmation = still_awaiting,
                    None => {}
                }
            }
            ParsedChatCommand::Command(ChatCommand::Reject(reason)) => {
                let reason = if reason.is_empty() { None } else { Some(reason) };
                match run_turn(&mut orchestrator, Turn::Resolve { approve: false, reason }, &cfg, &store)
                    .await?
                {
                    Some(still_awaiting) => awaiting_confirmation = still_awaiting,
                    None => {}
                }
            }
            ParsedChatCommand::MissingArgument { usage } => {
                println!("Usage: {usage}");
            }
            ParsedChatCommand::UnknownCommand(command) => {
                match theme::suggest_command(command.trim_start_matches('/')) {
                    Some(suggestion) => println!("Unknown command {command}. {suggestion}"),
                    None => println!("Unknown command {command}. Try /help."),
                }
            }
            ParsedChatCommand::NotACommand => {
                // Bare "yes" while a plan is drafted counts as confirmation.
                let lowered = input.to_ascii_lowercase();
                let turn = if awaiting_confirmation && matches!(lowered.as_str(), "yes" | "y" | "confirm") {
                    Turn::Confirm
                } else if orchestrator.gate.has_pending() {
                    println!("An approval is pending. Use /approve or /reject first.");
                    continue;
                } else {
                    store
                        .append_event(
                            &cfg.session_id,
                            SessionEvent::now(
                                "user",
                                "message",
                                serde_json::json!({"text": input.clone()}),
                            ),
                        )
                        .await?;
                    Turn::Submit(input)
                };
                match run_turn(&mut orchestrator, turn, &cfg, &store).await? {
                    Some(still_awaiting) => awaiting_confirmation = still_awaiting,
                    None => {}
                }
            }
        }
    }

    printer.abort();
    Ok(())
}

enum Turn {
    Submit(String),
    Confirm,
    Revise(String),
    Resolve { approve: bool, reason: Option<String> },
}

/// Drive one orchestrator transition and render the outcome. Returns the new
/// "awaiting confirmation" flag, or None when the turn errored politely.
async fn run_turn(
    orchestrator: &mut Orchestrator,
    turn: Turn,
    cfg: &RuntimeConfig,
    store: &Arc<dyn SessionStore>,
) -> Result<Option<bool>> {
    let result = match turn {
        Turn::Submit(goal) => orchestrator.submit(&goal).await,
        Turn::Confirm => orchestrator.confirm().await,
        Turn::Revise(extra) => orchestrator.revise(&extra).await,
        Turn::Resolve { approve, reason } => {
            let count = orchestrator
                .gate
                .pending()
                .map(|interrupt| interrupt.action_requests.len())
                .unwrap_or(0);
            if count == 0 {
                println!("No approval is pending.");
                return Ok(None);
            }
            let decision = if approve {
                RequestDecision::approve()
            } else {
                RequestDecision::reject(reason)
            };
            orchestrator.resolve_interrupt(vec![decision; count]).await
        }
    };

    match result {
        Ok(outcome) => {
            handle_outcome(&outcome, cfg);
            if let TurnOutcome::Completed(report) = &outcome {
                store
                    .append_event(
                        &cfg.session_id,
                        SessionEvent::now(
                            "orchestrator",
                            "message",
                            serde_json::json!({"text": report.render()}),
                        ),
                    )
                    .await?;
            }
            Ok(Some(matches!(outcome, TurnOutcome::AwaitingConfirmation(_))))
        }
        Err(err) => {
            // Errors render as descriptive text in the conversation, never
            // as raw stack traces.
            eprintln!("{RED}{}{RESET}", crate::error::render_error_message(&err, cfg.show_sensitive_config));
            Ok(None)
        }
    }
}

// ---------------------------------------------------------------------------
// One-shot triage
// ---------------------------------------------------------------------------

/// Non-interactive run: draft the plan, require --yes (or interactive
/// confirmation), dispatch, and print the report.
pub async fn run_triage(cfg: RuntimeConfig, goal: &str, yes: bool) -> Result<()> {
    let (mut orchestrator, store, receiver, _model_name) = build_runtime(&cfg, "triage").await?;
    let printer = spawn_event_printer(receiver);
    attach_session_memory(&mut orchestrator, &store, &cfg).await?;

    let outcome = orchestrator.submit(goal).await?;
    match outcome {
        TurnOutcome::AwaitingConfirmation(plan) => {
            print!("{}", plan.render());
            if !yes {
                let Some(line) = read_input_line(format!(
                    "{BOLD}Confirm plan? [y/N]:{RESET} "
                ))
                .await
                else {
                    println!("No confirmation received; nothing was dispatched.");
                    printer.abort();
                    return Ok(());
                };
                if !matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
                    println!("Plan not confirmed; nothing was dispatched.");
                    printer.abort();
                    return Ok(());
                }
            }
            let outcome = orchestrator.confirm().await?;
            finish_triage(&mut orchestrator, outcome, &cfg).await?;
        }
        other => finish_triage(&mut orchestrator, other, &cfg).await?,
    }

    // Give the printer a moment to drain buffered report tokens.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    printer.abort();
    Ok(())
}

async fn finish_triage(
    orchestrator: &mut Orchestrator,
    mut outcome: TurnOutcome,
    cfg: &RuntimeConfig,
) -> Result<()> {
    loop {
        match outcome {
            TurnOutcome::AwaitingApproval(interrupt) => {
                print_interrupt(&interrupt, cfg);
                let approve = match read_input_line(format!(
                    "{BOLD}Approve {} action(s)? [y/N]:{RESET} ",
                    interrupt.action_requests.len()
                ))
                .await
                {
                    Some(line) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
                    None => false,
                };
                let decision = if approve {
                    RequestDecision::approve()
                } else {
                    RequestDecision::reject(Some("declined at the prompt".to_string()))
                };
                outcome = orchestrator
                    .resolve_interrupt(vec![decision; interrupt.action_requests.len()])
                    .await?;
            }
            TurnOutcome::Completed(_) => return Ok(()),
            TurnOutcome::ActionResult { tool, result } => {
                print_action_result(&tool, &result);
                return Ok(());
            }
            TurnOutcome::AwaitingConfirmation(_) => {
                anyhow::bail!("unexpected plan draft while dispatching")
            }
        }
    }
}
