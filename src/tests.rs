use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use clap::Parser;
use serde_json::{Value, json};
use tempfile::tempdir;

use crate::chat::*;
use crate::cli::*;
use crate::config::*;
use crate::error::*;
use crate::gate::*;
use crate::memory::*;
use crate::orchestrator::*;
use crate::plan::*;
use crate::provider::*;
use crate::report::*;
use crate::session::*;
use crate::streaming::*;
use crate::subagent::*;
use crate::telemetry::*;
use crate::tools::*;

fn base_cfg(sandbox_root: std::path::PathBuf) -> RuntimeConfig {
    RuntimeConfig {
        profile: "default".to_string(),
        config_path: ".opsmind/config.toml".to_string(),
        assistant_id: "test_agent".to_string(),
        provider: Provider::Scripted,
        session_id: "test-session".to_string(),
        session_backend: SessionBackend::Memory,
        session_db_url: "sqlite://.opsmind/test.db".to_string(),
        show_sensitive_config: false,
        auto_approve: false,
        gated_tools: default_gated_tools(),
        trusted_tools: Vec::new(),
        sandbox_root,
        services: default_services(),
        step_retry_attempts: 2,
        step_retry_delay_ms: 0,
        shell_timeout_secs: 10,
        shell_max_output_chars: 8000,
        telemetry_enabled: false,
        telemetry_path: ".opsmind/test-telemetry.jsonl".to_string(),
    }
}

async fn test_runtime(cfg: &RuntimeConfig) -> (Orchestrator, Arc<dyn SessionStore>, EventReceiver) {
    let (orchestrator, store, receiver, _model) = build_runtime(cfg, "test")
        .await
        .expect("runtime should build");
    (orchestrator, store, receiver)
}

fn drain_progress_phases(receiver: &mut EventReceiver) -> Vec<String> {
    let mut phases = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        if let AgentEvent::Progress { phase, .. } = event {
            phases.push(phase);
        }
    }
    phases
}

// ---------------------------------------------------------------------------
// Confirmation invariant
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dispatch_before_confirmation_is_refused() {
    let dir = tempdir().unwrap();
    let cfg = base_cfg(dir.path().to_path_buf());
    let (mut orchestrator, _store, _events) = test_runtime(&cfg).await;

    let outcome = orchestrator
        .submit("investigate checkout latency spike in prod")
        .await
        .unwrap();
    assert!(matches!(outcome, TurnOutcome::AwaitingConfirmation(_)));

    let err = orchestrator.dispatch().await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains(PROTOCOL_VIOLATION));
    assert!(message.contains("not been confirmed"));
}

#[tokio::test]
async fn confirming_twice_is_a_protocol_error() {
    let dir = tempdir().unwrap();
    let mut cfg = base_cfg(dir.path().to_path_buf());
    cfg.auto_approve = true;
    let (mut orchestrator, _store, _events) = test_runtime(&cfg).await;

    orchestrator
        .submit("investigate checkout latency spike in prod")
        .await
        .unwrap();
    let outcome = orchestrator.confirm().await.unwrap();
    assert!(matches!(outcome, TurnOutcome::Completed(_)));

    let err = orchestrator.confirm().await.unwrap_err();
    assert!(err.to_string().contains(PROTOCOL_VIOLATION));
}

// ---------------------------------------------------------------------------
// Plan drafting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn checkout_latency_plan_names_both_collectors_with_hints() {
    let dir = tempdir().unwrap();
    let cfg = base_cfg(dir.path().to_path_buf());
    let (mut orchestrator, _store, _events) = test_runtime(&cfg).await;

    let outcome = orchestrator
        .submit("investigate checkout latency spike in prod")
        .await
        .unwrap();
    let TurnOutcome::AwaitingConfirmation(plan) = outcome else {
        panic!("expected a drafted plan");
    };

    for agent in [LOG_COLLECTOR_AGENT, METRIC_COLLECTOR_AGENT] {
        let step = plan
            .steps
            .iter()
            .find(|step| step.agent == agent)
            .unwrap_or_else(|| panic!("plan should include {agent}"));
        assert_eq!(
            step.params.get("service"),
            Some(&ParamValue::Given {
                value: json!("checkout")
            })
        );
        assert_eq!(
            step.params.get("environment"),
            Some(&ParamValue::Given {
                value: json!("prod")
            })
        );
    }

    // The log tool declares a default window; the metrics tool does not, so
    // its window stays an explicit gap instead of a fabricated value.
    let logs = plan
        .steps
        .iter()
        .find(|step| step.agent == LOG_COLLECTOR_AGENT)
        .unwrap();
    assert_eq!(
        logs.params.get("window_minutes"),
        Some(&ParamValue::Given { value: json!(30) })
    );
    let metrics = plan
        .steps
        .iter()
        .find(|step| step.agent == METRIC_COLLECTOR_AGENT)
        .unwrap();
    assert_eq!(metrics.params.get("window_minutes"), Some(&ParamValue::Missing));
    assert!(
        plan.gaps()
            .iter()
            .any(|(_, agent, param)| agent == METRIC_COLLECTOR_AGENT && param == "window_minutes")
    );
}

#[tokio::test]
async fn revise_merges_additional_hints_into_the_redraft() {
    let dir = tempdir().unwrap();
    let cfg = base_cfg(dir.path().to_path_buf());
    let (mut orchestrator, _store, _events) = test_runtime(&cfg).await;

    orchestrator
        .submit("investigate checkout latency spike")
        .await
        .unwrap();
    let outcome = orchestrator.revise("in prod over the last 15 minutes").await.unwrap();
    let TurnOutcome::AwaitingConfirmation(plan) = outcome else {
        panic!("expected a redrafted plan");
    };

    let metrics = plan
        .steps
        .iter()
        .find(|step| step.agent == METRIC_COLLECTOR_AGENT)
        .unwrap();
    assert_eq!(
        metrics.params.get("environment"),
        Some(&ParamValue::Given {
            value: json!("prod")
        })
    );
    assert_eq!(
        metrics.params.get("window_minutes"),
        Some(&ParamValue::Given { value: json!(15) })
    );
}

// ---------------------------------------------------------------------------
// Full run and report provenance
// ---------------------------------------------------------------------------

#[tokio::test]
async fn auto_approved_run_produces_a_provenance_tagged_report() {
    let dir = tempdir().unwrap();
    let mut cfg = base_cfg(dir.path().to_path_buf());
    cfg.auto_approve = true;
    let (mut orchestrator, _store, mut events) = test_runtime(&cfg).await;

    orchestrator
        .submit("investigate checkout latency spike in prod")
        .await
        .unwrap();
    let outcome = orchestrator.confirm().await.unwrap();
    let TurnOutcome::Completed(report) = outcome else {
        panic!("expected a completed report");
    };

    assert!(!report.evidence.is_empty());
    assert!(
        report
            .evidence
            .iter()
            .any(|item| item.agent == LOG_COLLECTOR_AGENT && item.tool == COLLECT_LOGS_TOOL_NAME)
    );
    assert!(
        report
            .evidence
            .iter()
            .any(|item| item.agent == CODE_COLLECTOR_AGENT)
    );

    // The metrics step ran without a window; the gap must surface as a
    // next step, never as an invented value.
    assert!(
        report
            .next_steps
            .iter()
            .any(|step| step.contains("window_minutes"))
    );

    // High-risk change plus the matching log pattern correlate into the
    // hypothesis.
    assert!(report.hypothesis.contains("a1b2c3d"));

    let phases = drain_progress_phases(&mut events);
    for expected in ["planning", "awaiting confirmation", "dispatching", "aggregating"] {
        assert!(
            phases.iter().any(|phase| phase == expected),
            "missing progress phase '{expected}' in {phases:?}"
        );
    }
}

#[tokio::test]
async fn backend_failures_fold_into_the_report_instead_of_aborting() {
    struct FailingModel {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl LanguageModel for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }

        async fn generate(&self, _request: ModelRequest) -> anyhow::Result<ModelReply> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("backend unavailable")
        }
    }

    let dir = tempdir().unwrap();
    let cfg = base_cfg(dir.path().to_path_buf());
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let registry = Arc::new(ToolRegistry::new(build_builtin_tools(&cfg)));
    let gate = ApprovalGate::new(cfg.gated_tools.clone(), Vec::new(), false);
    let (events, _receiver) = event_channel();
    let model = Arc::new(FailingModel {
        attempts: AtomicU32::new(0),
    });
    let attempts_handle = model.clone();

    let mut orchestrator = Orchestrator::new(
        cfg.clone(),
        model,
        registry,
        builtin_subagents(),
        gate,
        store,
        events,
        TelemetrySink::new(&cfg, "test".to_string()),
    );

    orchestrator
        .submit("investigate checkout latency spike in prod")
        .await
        .unwrap();
    let outcome = orchestrator.confirm().await.unwrap();
    let TurnOutcome::Completed(report) = outcome else {
        panic!("expected a report even when every step fails");
    };

    assert!(report.summary.iter().all(|line| line.contains("failed")));
    assert!(report.evidence.is_empty());
    // Three steps, each retried twice.
    assert_eq!(attempts_handle.attempts.load(Ordering::SeqCst), 6);
}

#[test]
fn blocked_steps_are_flagged_in_the_report() {
    let outcomes = vec![
        StepOutcome {
            step_id: 0,
            agent: LOG_COLLECTOR_AGENT.to_string(),
            status: StepStatus::Failed,
            output: None,
            tool_results: Vec::new(),
            error: Some("backend unavailable".to_string()),
        },
        StepOutcome {
            step_id: 1,
            agent: CODE_COLLECTOR_AGENT.to_string(),
            status: StepStatus::Blocked,
            output: None,
            tool_results: Vec::new(),
            error: Some("depends on step 1 which did not complete".to_string()),
        },
    ];

    let report = build_report("investigate", &outcomes);
    assert!(report.summary.iter().any(|line| line.contains("blocked")));
    assert!(report.next_steps.iter().any(|step| step.contains("Unblock")));
}

// ---------------------------------------------------------------------------
// Approval gate end to end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_make_format_raises_an_interrupt_with_the_exact_command() {
    let dir = tempdir().unwrap();
    let cfg = base_cfg(dir.path().to_path_buf());
    let (mut orchestrator, _store, _events) = test_runtime(&cfg).await;

    let outcome = orchestrator.submit("run make format").await.unwrap();
    let TurnOutcome::AwaitingApproval(interrupt) = outcome else {
        panic!("expected a gated shell action");
    };

    assert_eq!(interrupt.action_requests.len(), 1);
    let request = &interrupt.action_requests[0];
    assert_eq!(request.tool, EXECUTE_SHELL_TOOL_NAME);
    assert_eq!(request.args.get("command"), Some(&json!("make format")));
}

#[tokio::test]
async fn rejecting_an_interrupt_leaves_the_sandbox_untouched() {
    let dir = tempdir().unwrap();
    let cfg = base_cfg(dir.path().to_path_buf());
    let (mut orchestrator, _store, _events) = test_runtime(&cfg).await;

    let outcome = orchestrator.submit("run touch marker.txt").await.unwrap();
    assert!(matches!(outcome, TurnOutcome::AwaitingApproval(_)));

    let outcome = orchestrator
        .resolve_interrupt(vec![RequestDecision::reject(Some("not now".to_string()))])
        .await
        .unwrap();
    let TurnOutcome::ActionResult { result, .. } = outcome else {
        panic!("expected an informational rejection result");
    };

    assert_eq!(
        result.get("code"),
        Some(&json!(CODE_INTERRUPT_REJECTED))
    );
    assert!(!dir.path().join("marker.txt").exists());

    // The rejection is terminal: there is nothing left to resolve.
    let err = orchestrator
        .resolve_interrupt(vec![RequestDecision::approve()])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no pending interrupt"));
}

#[tokio::test]
async fn approving_an_interrupt_executes_inside_the_sandbox() {
    let dir = tempdir().unwrap();
    let cfg = base_cfg(dir.path().to_path_buf());
    let (mut orchestrator, _store, _events) = test_runtime(&cfg).await;

    orchestrator.submit("run touch created.txt").await.unwrap();
    let outcome = orchestrator
        .resolve_interrupt(vec![RequestDecision::approve()])
        .await
        .unwrap();

    let TurnOutcome::ActionResult { result, .. } = outcome else {
        panic!("expected the approved action result");
    };
    assert_eq!(result.get("status"), Some(&json!("ok")));
    assert!(dir.path().join("created.txt").exists());
}

#[tokio::test]
async fn read_only_direct_commands_skip_the_gate() {
    let dir = tempdir().unwrap();
    let cfg = base_cfg(dir.path().to_path_buf());
    let (mut orchestrator, _store, _events) = test_runtime(&cfg).await;

    let outcome = orchestrator.submit("run echo hello").await.unwrap();
    let TurnOutcome::ActionResult { result, .. } = outcome else {
        panic!("read-only commands should execute directly");
    };
    assert_eq!(result.get("status"), Some(&json!("ok")));
    assert!(
        result
            .get("stdout")
            .and_then(Value::as_str)
            .unwrap_or("")
            .contains("hello")
    );
}

#[tokio::test]
async fn submitting_while_an_interrupt_is_pending_is_refused() {
    let dir = tempdir().unwrap();
    let cfg = base_cfg(dir.path().to_path_buf());
    let (mut orchestrator, _store, _events) = test_runtime(&cfg).await;

    orchestrator.submit("run make format").await.unwrap();
    let err = orchestrator.submit("run make test").await.unwrap_err();
    assert!(err.to_string().contains(PROTOCOL_VIOLATION));
}

// ---------------------------------------------------------------------------
// Suspension survives restarts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pending_interrupt_survives_a_restart_with_the_sqlite_store() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("sessions.db");
    let mut cfg = base_cfg(dir.path().to_path_buf());
    cfg.session_backend = SessionBackend::Sqlite;
    cfg.session_db_url = format!("sqlite://{}", db_path.to_string_lossy());

    let raised_id = {
        let (mut orchestrator, _store, _events) = test_runtime(&cfg).await;
        let outcome = orchestrator.submit("run make format").await.unwrap();
        let TurnOutcome::AwaitingApproval(interrupt) = outcome else {
            panic!("expected a gated action");
        };
        interrupt.id
    };

    // A fresh process: new store connection, new orchestrator.
    let (mut orchestrator, _store, _events) = test_runtime(&cfg).await;
    let restored = orchestrator
        .restore()
        .await
        .unwrap()
        .expect("the pending interrupt should have been persisted");
    assert_eq!(restored.id, raised_id);
    assert_eq!(
        restored.action_requests[0].args.get("command"),
        Some(&json!("make format"))
    );

    let outcome = orchestrator
        .resolve_interrupt(vec![RequestDecision::reject(None)])
        .await
        .unwrap();
    assert!(matches!(outcome, TurnOutcome::ActionResult { .. }));
    assert!(!dir.path().join("make").exists());
}

#[tokio::test]
async fn sqlite_store_round_trips_state_and_events() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("sessions.db");
    let db_url = format!("sqlite://{}", db_path.to_string_lossy());

    let store = SqliteSessionStore::open(&db_url).await.unwrap();
    store.ensure_session("s1").await.unwrap();
    store
        .put_state("s1", "key", &json!({"value": 1}))
        .await
        .unwrap();
    store
        .append_event("s1", SessionEvent::now("user", "message", json!({"text": "hi"})))
        .await
        .unwrap();

    assert_eq!(
        store.get_state("s1", "key").await.unwrap(),
        Some(json!({"value": 1}))
    );
    let events = store.events("s1", None).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].author, "user");

    let summaries = store.list_sessions().await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].event_count, 1);

    store.clear_state("s1", "key").await.unwrap();
    assert_eq!(store.get_state("s1", "key").await.unwrap(), None);
}

// ---------------------------------------------------------------------------
// Memory loading through the session store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn session_memory_loading_is_idempotent() {
    let home = tempdir().unwrap();
    let agent_dir = home.path().join(MEMORY_DIR).join("test_agent");
    std::fs::create_dir_all(&agent_dir).unwrap();
    std::fs::write(agent_dir.join(MEMORY_FILE), "User instructions").unwrap();

    let loader = MemoryLoader::new("test_agent", Some(home.path().to_path_buf()), None);
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    store.ensure_session("s1").await.unwrap();

    let first = load_session_memory(&loader, &store, "s1").await.unwrap();
    assert_eq!(first.user_memory.as_deref(), Some("User instructions"));

    let second = load_session_memory(&loader, &store, "s1").await.unwrap();
    assert!(second.is_empty());
}

// ---------------------------------------------------------------------------
// Registry behavior
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_tool_dispatch_fails_without_side_effects() {
    let dir = tempdir().unwrap();
    let cfg = base_cfg(dir.path().to_path_buf());
    let registry = ToolRegistry::new(build_builtin_tools(&cfg));

    let result = registry.dispatch("does_not_exist", json!({})).await;
    assert_eq!(result.get("code"), Some(&json!(CODE_UNKNOWN_TOOL)));
}

// ---------------------------------------------------------------------------
// Streaming tracker
// ---------------------------------------------------------------------------

#[test]
fn final_snapshot_after_partial_chunks_prints_nothing_new() {
    let mut tracker = AuthorTextTracker::default();
    assert_eq!(tracker.ingest("log-collector", "Log ", true, false), "Log ");
    assert_eq!(tracker.ingest("log-collector", "collection done", true, false), "collection done");
    assert_eq!(
        tracker.ingest("log-collector", "Log collection done", false, true),
        ""
    );
    assert_eq!(
        tracker.resolve_text().as_deref(),
        Some("Log collection done")
    );
}

#[test]
fn overlapping_non_partial_chunks_merge_without_duplication() {
    let mut buffer = String::new();
    assert_eq!(ingest_author_text(&mut buffer, "abc", false, false), "abc");
    assert_eq!(ingest_author_text(&mut buffer, "abcdef", false, false), "def");
    assert_eq!(ingest_author_text(&mut buffer, "cdefgh", false, false), "gh");
    assert_eq!(buffer, "abcdefgh");
}

#[test]
fn suffix_prefix_overlap_respects_char_boundaries() {
    assert_eq!(suffix_prefix_overlap("hello wor", "world"), 3);
    assert_eq!(suffix_prefix_overlap("abc", "xyz"), 0);
}

// ---------------------------------------------------------------------------
// Chat command parsing
// ---------------------------------------------------------------------------

#[test]
fn chat_commands_parse_like_the_palette_says() {
    assert_eq!(
        parse_chat_command("/confirm"),
        ParsedChatCommand::Command(ChatCommand::Confirm)
    );
    assert_eq!(
        parse_chat_command("exit"),
        ParsedChatCommand::Command(ChatCommand::Exit)
    );
    assert_eq!(
        parse_chat_command("/reject too risky"),
        ParsedChatCommand::Command(ChatCommand::Reject("too risky".to_string()))
    );
    assert!(matches!(
        parse_chat_command("/revise"),
        ParsedChatCommand::MissingArgument { .. }
    ));
    assert_eq!(
        parse_chat_command("investigate checkout"),
        ParsedChatCommand::NotACommand
    );
    assert!(matches!(
        parse_chat_command("/bogus"),
        ParsedChatCommand::UnknownCommand(_)
    ));
}

// ---------------------------------------------------------------------------
// Config resolution
// ---------------------------------------------------------------------------

#[test]
fn cli_flags_override_profile_values() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        r#"
[profiles.default]
session_id = "from-profile"
auto_approve = true
services = ["inventory"]
"#,
    )
    .unwrap();

    let cli = Cli::try_parse_from([
        "opsmind-cli",
        "--config-path",
        config_path.to_str().unwrap(),
        "--session-id",
        "from-cli",
        "--service",
        "billing",
        "chat",
    ])
    .unwrap();

    let profiles = load_profiles(&cli.config_path).unwrap();
    let cfg = resolve_runtime_config(&cli, &profiles).unwrap();

    assert_eq!(cfg.session_id, "from-cli");
    assert!(cfg.auto_approve, "profile auto_approve should apply");
    assert_eq!(cfg.services, vec!["inventory".to_string(), "billing".to_string()]);
}

#[test]
fn unknown_profile_is_reported_with_candidates() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, "[profiles.staging]\nsession_id = \"s\"\n").unwrap();

    let cli = Cli::try_parse_from([
        "opsmind-cli",
        "--config-path",
        config_path.to_str().unwrap(),
        "--profile",
        "missing",
        "chat",
    ])
    .unwrap();

    let profiles = load_profiles(&cli.config_path).unwrap();
    let err = resolve_runtime_config(&cli, &profiles).unwrap_err();
    assert!(err.to_string().contains("staging"));
}

// ---------------------------------------------------------------------------
// Error rendering
// ---------------------------------------------------------------------------

#[test]
fn sqlite_urls_are_redacted_in_error_output() {
    let text = "failed to open sqlite://home/user/.opsmind/sessions.db quickly";
    assert_eq!(
        redact_sqlite_urls(text),
        "failed to open sqlite://[REDACTED] quickly"
    );
}

#[test]
fn protocol_violations_categorize_as_protocol_errors() {
    let err = anyhow::anyhow!("{PROTOCOL_VIOLATION}: dispatch refused");
    assert_eq!(categorize_error(&err), ErrorCategory::Protocol);
}
