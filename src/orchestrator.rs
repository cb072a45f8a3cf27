/// Top-level triage orchestrator: plan, confirm, dispatch, aggregate.
///
/// The run is an explicit resumable state machine instead of a suspended
/// call stack: after every transition the snapshot is persisted to the
/// session store, so a run suspended at the approval gate survives process
/// restarts. Dispatch before confirmation is a hard protocol error.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::task::JoinSet;

use crate::config::RuntimeConfig;
use crate::error::{CODE_INTERRUPT_REJECTED, PROTOCOL_VIOLATION};
use crate::gate::{ActionRequest, ApprovalGate, Interrupt, RequestDecision, ResolvedAction};
use crate::memory::{MemoryState, memory_context_section};
use crate::plan::{Plan, StepStatus, Task, draft_plan, extract_hints};
use crate::provider::LanguageModel;
use crate::report::{Report, StepOutcome, build_report};
use crate::session::{PENDING_INTERRUPT_KEY, SessionEvent, SessionStore, TRIAGE_RUN_KEY};
use crate::streaming::{AgentEvent, EventSender, emit, emit_progress};
use crate::subagent::{StepAdvance, StepExecution, SubAgentSpec, advance_step};
use crate::telemetry::TelemetrySink;
use crate::tools::{EXECUTE_SHELL_TOOL_NAME, ToolCall, ToolRegistry};

pub const ORCHESTRATOR_PROMPT: &str = "\
You are the DevOps orchestrator agent, responsible for plan -> confirm -> \
dispatch sub-agents -> aggregate report.
Sub-agents:
- log-collector: fetches and summarizes anomalous logs for a service/environment/window.
- prometheus-collector: queries metrics and reports anomalous trends.
- code-collector: extracts recent changes, touched modules, and potential risks.
Workflow:
1) Collect basic service information (service, environment, time window; optional branch/commit).
2) Produce the analysis plan first (each step names the sub-agent, input parameters, \
expected output, and gaps) and wait for user confirmation.
3) After confirmation, dispatch sub-agents per step, in parallel or in order; clarify \
missing information instead of guessing.
4) Aggregate the report: summary; evidence (metrics/logs/code, with sources); preliminary \
cause; next-step suggestions.
Rules:
- Never dispatch a sub-agent before the plan is confirmed.
- Conclude only from what sub-agents returned; never fabricate; label every data source.
- Emit short progress notices so the user can follow the active phase.";

/// What a caller gets back after driving the orchestrator one transition.
#[derive(Debug)]
pub enum TurnOutcome {
    /// Plan drafted; dispatch is refused until the caller confirms.
    AwaitingConfirmation(Plan),
    /// Gated actions proposed; the run is suspended until resolution.
    AwaitingApproval(Interrupt),
    /// All steps terminal; the aggregated report.
    Completed(Report),
    /// A direct (plan-less) action finished with this tool result.
    ActionResult { tool: String, result: Value },
}

/// Serializable run state written to the session store after transitions.
#[derive(Debug, Serialize, Deserialize)]
struct RunSnapshot {
    task: Task,
    plan: Option<Plan>,
    execs: BTreeMap<usize, StepExecution>,
    outcomes: BTreeMap<usize, StepOutcome>,
    direct: bool,
}

pub struct Orchestrator {
    cfg: RuntimeConfig,
    model: Arc<dyn LanguageModel>,
    registry: Arc<ToolRegistry>,
    subagents: Vec<SubAgentSpec>,
    pub gate: ApprovalGate,
    store: Arc<dyn SessionStore>,
    events: EventSender,
    telemetry: TelemetrySink,
    memory: MemoryState,

    task: Option<Task>,
    plan: Option<Plan>,
    execs: BTreeMap<usize, StepExecution>,
    outcomes: BTreeMap<usize, StepOutcome>,
    direct: bool,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: RuntimeConfig,
        model: Arc<dyn LanguageModel>,
        registry: Arc<ToolRegistry>,
        subagents: Vec<SubAgentSpec>,
        gate: ApprovalGate,
        store: Arc<dyn SessionStore>,
        events: EventSender,
        telemetry: TelemetrySink,
    ) -> Self {
        Self {
            cfg,
            model,
            registry,
            subagents,
            gate,
            store,
            events,
            telemetry,
            memory: MemoryState::default(),
            task: None,
            plan: None,
            execs: BTreeMap::new(),
            outcomes: BTreeMap::new(),
            direct: false,
        }
    }

    pub fn set_memory(&mut self, memory: MemoryState) {
        self.memory = memory;
    }

    pub fn subagents(&self) -> &[SubAgentSpec] {
        &self.subagents
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn current_plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    /// The orchestrator's effective system context: base prompt plus any
    /// loaded memory documents.
    pub fn system_context(&self) -> String {
        match memory_context_section(&self.memory) {
            Some(memory) => format!("{ORCHESTRATOR_PROMPT}\n\n{memory}"),
            None => ORCHESTRATOR_PROMPT.to_string(),
        }
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Accept a new task. Direct shell requests short-circuit planning into
    /// a single gated action; everything else drafts a plan and waits for
    /// confirmation.
    pub async fn submit(&mut self, goal: &str) -> Result<TurnOutcome> {
        if self.gate.has_pending() {
            bail!("{PROTOCOL_VIOLATION}: resolve the pending interrupt before submitting a new task");
        }

        let task = Task::from_goal(goal, &self.cfg.services);
        self.reset_run();
        self.task = Some(task.clone());

        if let Some(command) = task.direct_command() {
            self.direct = true;
            return self.submit_direct_action(command).await;
        }

        emit_progress(&self.events, "planning", "drafting the triage plan");
        let plan = draft_plan(&task, &self.subagents, &self.registry);
        self.telemetry.emit(
            "plan.drafted",
            json!({"steps": plan.steps.len(), "gaps": plan.gaps().len()}),
        );
        self.plan = Some(plan.clone());
        self.save_snapshot().await?;

        emit_progress(
            &self.events,
            "awaiting confirmation",
            "confirm the plan to start dispatch",
        );
        Ok(TurnOutcome::AwaitingConfirmation(plan))
    }

    async fn submit_direct_action(&mut self, command: String) -> Result<TurnOutcome> {
        let read_only = crate::tools::shell::is_read_only_command(&command);
        let call = ToolCall {
            tool: EXECUTE_SHELL_TOOL_NAME.to_string(),
            args: json!({ "command": command }),
        };
        if self.gate.requires_approval(&call.tool) && !read_only {
            let interrupt = self
                .gate
                .raise(vec![ActionRequest::from_call(call, None)])?;
            self.persist_pending_interrupt().await?;
            self.save_snapshot().await?;
            self.telemetry.emit(
                "interrupt.raised",
                json!({"id": interrupt.id, "requests": interrupt.action_requests.len()}),
            );

            if self.gate.auto_approve() {
                let decisions = vec![RequestDecision::approve()];
                return self.resolve_interrupt(decisions).await;
            }
            emit_progress(
                &self.events,
                "awaiting approval",
                "a gated action needs your decision",
            );
            return Ok(TurnOutcome::AwaitingApproval(interrupt));
        }

        let result = self.execute_action(&call.tool, call.args).await;
        self.finish_direct_run().await?;
        Ok(TurnOutcome::ActionResult {
            tool: call.tool,
            result,
        })
    }

    /// Redraft the plan with additional hint text from the caller.
    pub async fn revise(&mut self, extra: &str) -> Result<TurnOutcome> {
        let Some(task) = self.task.as_mut() else {
            bail!("{PROTOCOL_VIOLATION}: no task submitted, nothing to revise");
        };
        let Some(plan) = self.plan.as_ref() else {
            bail!("{PROTOCOL_VIOLATION}: no drafted plan to revise");
        };
        if plan.is_confirmed() {
            bail!("{PROTOCOL_VIOLATION}: the plan is confirmed and frozen");
        }

        let extra_hints = extract_hints(extra, &self.cfg.services);
        if extra_hints.service.is_some() {
            task.hints.service = extra_hints.service;
        }
        if extra_hints.environment.is_some() {
            task.hints.environment = extra_hints.environment;
        }
        if extra_hints.window_minutes.is_some() {
            task.hints.window_minutes = extra_hints.window_minutes;
        }
        if extra_hints.branch.is_some() {
            task.hints.branch = extra_hints.branch;
        }

        emit_progress(&self.events, "planning", "redrafting the triage plan");
        let task = task.clone();
        let plan = draft_plan(&task, &self.subagents, &self.registry);
        self.telemetry.emit(
            "plan.drafted",
            json!({"steps": plan.steps.len(), "gaps": plan.gaps().len(), "revised": true}),
        );
        self.plan = Some(plan.clone());
        self.save_snapshot().await?;
        Ok(TurnOutcome::AwaitingConfirmation(plan))
    }

    // -----------------------------------------------------------------------
    // Confirmation and dispatch
    // -----------------------------------------------------------------------

    /// Explicit confirmation signal: freeze the plan and start dispatch.
    pub async fn confirm(&mut self) -> Result<TurnOutcome> {
        let Some(plan) = self.plan.as_mut() else {
            bail!("{PROTOCOL_VIOLATION}: no drafted plan to confirm");
        };
        if plan.is_confirmed() {
            bail!("{PROTOCOL_VIOLATION}: the plan is already confirmed");
        }
        plan.confirm();
        self.telemetry.emit("plan.confirmed", json!({}));
        self.save_snapshot().await?;
        self.dispatch().await
    }

    /// Dispatch the confirmed plan. Refused as a protocol violation when the
    /// plan has not been confirmed; this is the invariant the gate between
    /// planning and execution rests on.
    pub async fn dispatch(&mut self) -> Result<TurnOutcome> {
        let confirmed = self.plan.as_ref().map(Plan::is_confirmed).unwrap_or(false);
        if !confirmed {
            bail!(
                "{PROTOCOL_VIOLATION}: sub-agent dispatch refused, the plan has not been confirmed"
            );
        }
        if self.gate.has_pending() {
            bail!("{PROTOCOL_VIOLATION}: resolve the pending interrupt before dispatching");
        }
        self.dispatch_loop().await
    }

    async fn dispatch_loop(&mut self) -> Result<TurnOutcome> {
        let total = self.plan.as_ref().map(|plan| plan.steps.len()).unwrap_or(0);

        loop {
            let runnable = self.collect_runnable();
            if runnable.is_empty() {
                if self.outcomes.len() < total {
                    // Nothing runnable but steps remain: a dependency cycle
                    // or unknown dependency. Mark the stragglers blocked.
                    let remaining: Vec<usize> = self
                        .plan
                        .as_ref()
                        .map(|plan| {
                            plan.steps
                                .iter()
                                .map(|step| step.id)
                                .filter(|id| !self.outcomes.contains_key(id))
                                .collect()
                        })
                        .unwrap_or_default();
                    for id in remaining {
                        self.mark_blocked(id, "unresolvable dependency");
                    }
                }
                break;
            }

            let mut join_set: JoinSet<(usize, StepAdvance, StepExecution)> = JoinSet::new();
            let gated = self.gated_tool_names();

            for id in runnable {
                let (spec, params) = self.step_binding(id)?;
                emit_progress(
                    &self.events,
                    "dispatching",
                    format!("step {}/{} ({})", id + 1, total, spec.name),
                );
                self.telemetry
                    .emit("step.dispatched", json!({"step": id, "agent": spec.name}));

                let mut exec = self
                    .execs
                    .remove(&id)
                    .unwrap_or_else(|| StepExecution::new(id, &spec.name, &params));
                let model = self.model.clone();
                let registry = self.registry.clone();
                let gated = gated.clone();
                let events = self.events.clone();
                let retry_attempts = self.cfg.step_retry_attempts;
                let retry_delay_ms = self.cfg.step_retry_delay_ms;

                join_set.spawn(async move {
                    let advance = advance_step(
                        &spec,
                        &mut exec,
                        &model,
                        &registry,
                        &gated,
                        &events,
                        retry_attempts,
                        retry_delay_ms,
                    )
                    .await;
                    (exec.step_id, advance, exec)
                });
            }

            let mut pending_requests: Vec<ActionRequest> = Vec::new();
            while let Some(joined) = join_set.join_next().await {
                let (id, advance, exec) = match joined {
                    Ok(result) => result,
                    Err(err) => {
                        tracing::error!(error = %err, "step task panicked");
                        continue;
                    }
                };
                match advance {
                    StepAdvance::Completed { output } => {
                        self.record_outcome(id, StepStatus::Completed, Some(output), None, &exec);
                    }
                    StepAdvance::Failed { error } => {
                        self.record_outcome(id, StepStatus::Failed, None, Some(error), &exec);
                    }
                    StepAdvance::NeedsApproval { calls } => {
                        pending_requests.extend(
                            calls
                                .into_iter()
                                .map(|call| ActionRequest::from_call(call, Some(id))),
                        );
                        self.execs.insert(id, exec);
                    }
                }
            }

            if !pending_requests.is_empty() {
                let interrupt = self.gate.raise(pending_requests)?;
                self.persist_pending_interrupt().await?;
                self.save_snapshot().await?;
                self.telemetry.emit(
                    "interrupt.raised",
                    json!({"id": interrupt.id, "requests": interrupt.action_requests.len()}),
                );

                if self.gate.auto_approve() {
                    let count = interrupt.action_requests.len();
                    let resolved = self
                        .gate
                        .resolve(&interrupt.id, vec![RequestDecision::approve(); count])?;
                    self.clear_pending_interrupt().await?;
                    self.apply_resolutions(resolved).await?;
                    continue;
                }

                emit_progress(
                    &self.events,
                    "awaiting approval",
                    format!(
                        "{} gated action(s) need your decision",
                        interrupt.action_requests.len()
                    ),
                );
                return Ok(TurnOutcome::AwaitingApproval(interrupt));
            }
        }

        self.aggregate().await
    }

    /// Steps whose dependencies are satisfied and which have no terminal
    /// outcome yet. Steps behind failed or blocked dependencies are marked
    /// blocked here.
    fn collect_runnable(&mut self) -> Vec<usize> {
        let Some(plan) = self.plan.as_ref() else {
            return Vec::new();
        };

        let mut runnable = Vec::new();
        let mut to_block: Vec<(usize, String)> = Vec::new();

        for step in &plan.steps {
            if self.outcomes.contains_key(&step.id) {
                continue;
            }
            let mut deps_done = true;
            for dep in &step.depends_on {
                match self.outcomes.get(dep).map(|outcome| outcome.status) {
                    Some(StepStatus::Completed) => {}
                    Some(StepStatus::Failed) | Some(StepStatus::Blocked) => {
                        to_block.push((step.id, format!("depends on step {} which did not complete", dep + 1)));
                        deps_done = false;
                        break;
                    }
                    _ => {
                        deps_done = false;
                        break;
                    }
                }
            }
            if deps_done {
                runnable.push(step.id);
            }
        }

        for (id, reason) in to_block {
            self.mark_blocked(id, &reason);
        }
        runnable
    }

    fn mark_blocked(&mut self, id: usize, reason: &str) {
        let agent = self
            .plan
            .as_ref()
            .and_then(|plan| plan.step(id))
            .map(|step| step.agent.clone())
            .unwrap_or_default();
        self.telemetry
            .emit("step.blocked", json!({"step": id, "reason": reason}));
        self.outcomes.insert(
            id,
            StepOutcome {
                step_id: id,
                agent,
                status: StepStatus::Blocked,
                output: None,
                tool_results: Vec::new(),
                error: Some(reason.to_string()),
            },
        );
    }

    fn record_outcome(
        &mut self,
        id: usize,
        status: StepStatus,
        output: Option<String>,
        error: Option<String>,
        exec: &StepExecution,
    ) {
        let tool_results = exec
            .tool_results()
            .into_iter()
            .map(|(tool, result)| (tool.to_string(), result.clone()))
            .collect();
        self.telemetry
            .emit("step.finished", json!({"step": id, "status": format!("{status:?}")}));
        self.outcomes.insert(
            id,
            StepOutcome {
                step_id: id,
                agent: exec.agent.clone(),
                status,
                output,
                tool_results,
                error,
            },
        );
    }

    fn step_binding(&self, id: usize) -> Result<(SubAgentSpec, Value)> {
        let plan = self
            .plan
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no active plan"))?;
        let step = plan
            .step(id)
            .ok_or_else(|| anyhow::anyhow!("step {id} not found in plan"))?;
        let spec = self
            .subagents
            .iter()
            .find(|spec| spec.name == step.agent)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown sub-agent '{}' in plan", step.agent))?;
        Ok((spec, step.given_params()))
    }

    fn gated_tool_names(&self) -> BTreeSet<String> {
        self.registry
            .names()
            .into_iter()
            .filter(|name| self.gate.requires_approval(name))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Interrupt resolution
    // -----------------------------------------------------------------------

    /// Resolve the pending interrupt with per-request decisions, execute the
    /// approved actions, and continue the run.
    pub async fn resolve_interrupt(
        &mut self,
        decisions: Vec<RequestDecision>,
    ) -> Result<TurnOutcome> {
        let Some(interrupt_id) = self.gate.pending().map(|interrupt| interrupt.id.clone()) else {
            bail!("{PROTOCOL_VIOLATION}: no pending interrupt to resolve");
        };

        let resolved = self.gate.resolve(&interrupt_id, decisions)?;
        self.clear_pending_interrupt().await?;
        self.telemetry.emit(
            "interrupt.resolved",
            json!({
                "id": interrupt_id,
                "approved": resolved.iter().filter(|action| action.approved).count(),
                "rejected": resolved.iter().filter(|action| !action.approved).count(),
            }),
        );

        if self.direct {
            // Direct runs carry exactly one action request.
            let action = resolved
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("resolved interrupt carried no actions"))?;
            let tool = action.request.tool.clone();
            let result = self.finish_resolved_action(action).await;
            self.finish_direct_run().await?;
            return Ok(TurnOutcome::ActionResult { tool, result });
        }

        self.apply_resolutions(resolved).await?;
        self.save_snapshot().await?;
        self.dispatch_loop().await
    }

    /// Record each resolution into its owning step: approved actions execute
    /// and append their result, rejections append an informational notice.
    async fn apply_resolutions(&mut self, resolved: Vec<ResolvedAction>) -> Result<()> {
        for action in resolved {
            let step_id = action.request.step_id;
            let tool = action.request.tool.clone();
            let result = self.finish_resolved_action(action).await;
            if let Some(id) = step_id
                && let Some(exec) = self.execs.get_mut(&id)
            {
                exec.record_tool_result(&tool, result);
            }
        }
        Ok(())
    }

    async fn finish_resolved_action(&mut self, action: ResolvedAction) -> Value {
        if action.approved {
            self.execute_action(&action.request.tool, action.request.args)
                .await
        } else {
            let reason = action
                .reason
                .unwrap_or_else(|| "rejected by user".to_string());
            json!({
                "status": "error",
                "code": CODE_INTERRUPT_REJECTED,
                "tool": action.request.tool,
                "error": format!("action was not approved: {reason}"),
            })
        }
    }

    async fn execute_action(&mut self, tool: &str, args: Value) -> Value {
        emit(
            &self.events,
            AgentEvent::ToolRequested {
                author: "orchestrator".to_string(),
                tool: tool.to_string(),
            },
        );
        self.telemetry.emit("tool.requested", json!({"tool": tool}));
        let result = self.registry.dispatch(tool, args).await;
        let ok = result
            .get("status")
            .and_then(Value::as_str)
            .map(|status| status != "error")
            .unwrap_or(true);
        self.telemetry.emit(
            if ok { "tool.succeeded" } else { "tool.failed" },
            json!({"tool": tool}),
        );
        emit(
            &self.events,
            AgentEvent::ToolCompleted {
                author: "orchestrator".to_string(),
                tool: tool.to_string(),
                ok,
            },
        );
        result
    }

    // -----------------------------------------------------------------------
    // Aggregation, cancellation, persistence
    // -----------------------------------------------------------------------

    async fn aggregate(&mut self) -> Result<TurnOutcome> {
        emit_progress(&self.events, "aggregating", "assembling the triage report");

        let goal = self
            .task
            .as_ref()
            .map(|task| task.goal.clone())
            .unwrap_or_default();
        let outcomes: Vec<StepOutcome> = self.outcomes.values().cloned().collect();
        let report = build_report(&goal, &outcomes);

        // Stream the rendered report as token chunks.
        for line in report.render().lines() {
            emit(
                &self.events,
                AgentEvent::Token {
                    author: "orchestrator".to_string(),
                    text: format!("{line}\n"),
                    partial: true,
                    is_final: false,
                },
            );
        }
        emit(
            &self.events,
            AgentEvent::Token {
                author: "orchestrator".to_string(),
                text: report.render(),
                partial: false,
                is_final: true,
            },
        );

        self.telemetry.emit(
            "report.emitted",
            json!({
                "evidence": report.evidence.len(),
                "steps": report.summary.len(),
            }),
        );
        self.store
            .append_event(
                &self.cfg.session_id,
                SessionEvent::now("orchestrator", "report", serde_json::to_value(&report)?),
            )
            .await?;

        self.clear_run_state().await?;
        Ok(TurnOutcome::Completed(report))
    }

    /// Abandon the current run: a pending interrupt resolves as
    /// rejected-by-cancellation and in-flight step results are discarded.
    pub async fn cancel(&mut self) -> Result<()> {
        if let Some(interrupt) = self.gate.cancel() {
            self.telemetry.emit(
                "interrupt.cancelled",
                json!({"id": interrupt.id}),
            );
        }
        self.telemetry.emit("run.cancelled", json!({}));
        self.clear_run_state().await?;
        self.reset_run();
        self.task = None;
        Ok(())
    }

    fn reset_run(&mut self) {
        self.plan = None;
        self.execs.clear();
        self.outcomes.clear();
        self.direct = false;
    }

    async fn finish_direct_run(&mut self) -> Result<()> {
        self.clear_run_state().await?;
        self.reset_run();
        self.task = None;
        Ok(())
    }

    async fn save_snapshot(&self) -> Result<()> {
        let Some(task) = self.task.as_ref() else {
            return Ok(());
        };
        let snapshot = RunSnapshot {
            task: task.clone(),
            plan: self.plan.clone(),
            execs: self.execs.clone(),
            outcomes: self.outcomes.clone(),
            direct: self.direct,
        };
        self.store
            .put_state(
                &self.cfg.session_id,
                TRIAGE_RUN_KEY,
                &serde_json::to_value(&snapshot)?,
            )
            .await
    }

    async fn persist_pending_interrupt(&self) -> Result<()> {
        if let Some(interrupt) = self.gate.pending() {
            self.store
                .put_state(
                    &self.cfg.session_id,
                    PENDING_INTERRUPT_KEY,
                    &serde_json::to_value(interrupt)?,
                )
                .await?;
        }
        Ok(())
    }

    async fn clear_pending_interrupt(&self) -> Result<()> {
        self.store
            .clear_state(&self.cfg.session_id, PENDING_INTERRUPT_KEY)
            .await
    }

    async fn clear_run_state(&self) -> Result<()> {
        self.store
            .clear_state(&self.cfg.session_id, TRIAGE_RUN_KEY)
            .await?;
        self.clear_pending_interrupt().await
    }

    /// Reload a run suspended by a previous process. Returns the pending
    /// interrupt when one is waiting for a decision.
    pub async fn restore(&mut self) -> Result<Option<Interrupt>> {
        let Some(raw) = self
            .store
            .get_state(&self.cfg.session_id, TRIAGE_RUN_KEY)
            .await?
        else {
            return Ok(None);
        };
        let snapshot: RunSnapshot = serde_json::from_value(raw)?;
        self.task = Some(snapshot.task);
        self.plan = snapshot.plan;
        self.execs = snapshot.execs;
        self.outcomes = snapshot.outcomes;
        self.direct = snapshot.direct;

        let pending = self
            .store
            .get_state(&self.cfg.session_id, PENDING_INTERRUPT_KEY)
            .await?;
        if let Some(raw_interrupt) = pending {
            let interrupt: Interrupt = serde_json::from_value(raw_interrupt)?;
            self.gate.restore(interrupt.clone())?;
            return Ok(Some(interrupt));
        }
        Ok(None)
    }
}
