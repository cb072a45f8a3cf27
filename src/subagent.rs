/// Named specialist agents and the per-step agent loop.
///
/// A sub-agent binds a system prompt, a bounded tool set, and the injected
/// model handle. Dispatch advances the step's transcript until the model
/// produces final text or emits gated calls that need external approval.
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::{LanguageModel, ModelMessage, ModelReply, ModelRequest};
use crate::streaming::{AgentEvent, EventSender, emit};
use crate::tools::{ToolCall, ToolRegistry};

pub const LOG_COLLECTOR_AGENT: &str = "log-collector";
pub const METRIC_COLLECTOR_AGENT: &str = "prometheus-collector";
pub const CODE_COLLECTOR_AGENT: &str = "code-collector";

const LOG_AGENT_PROMPT: &str = "\
You are the log collection agent. Goal: return anomalous log patterns and \
sample lines for the given service, environment, and time window.
Inputs include at least: service, environment, window_minutes, limit.
Output includes: key patterns with counts, representative samples, and the \
suspicious time range.
When a required parameter is missing, report the gap directly; never guess \
values.
IMPORTANT: Return only the essential summary. Do NOT include raw data, \
intermediate search results, or detailed tool outputs. Keep the response \
under 500 words.";

const METRIC_AGENT_PROMPT: &str = "\
You are the Prometheus collection agent. Goal: return core metric trends for \
the given service, environment, and time window.
Focus on: error_rate, latency_p99_ms, cpu_percent, qps.
Output includes: peak versus baseline, onset time, anomaly description, and \
suggested watch items.
When service/environment/window_minutes is missing, state the gap directly.
IMPORTANT: Return only the essential summary. Do NOT include raw data, \
intermediate search results, or detailed tool outputs. Keep the response \
under 500 words.";

const CODE_AGENT_PROMPT: &str = "\
You are the code collection agent. Goal: return a summary of recent code \
changes and potential risk points.
Inputs include at least service; branch and recent_commits are optional.
Output includes: commit hashes, titles, touched modules, and risk notes.
When service is missing, state the gap directly.
IMPORTANT: Return only the essential summary. Do NOT include raw data, \
intermediate search results, or detailed tool outputs. Keep the response \
under 500 words.";

/// Immutable sub-agent registration: looked up by name during dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentSpec {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub tools: Vec<String>,
}

pub fn builtin_subagents() -> Vec<SubAgentSpec> {
    vec![
        SubAgentSpec {
            name: LOG_COLLECTOR_AGENT.to_string(),
            description: "Collects and summarizes anomalous log patterns and samples \
                          for a service/environment/time window."
                .to_string(),
            system_prompt: LOG_AGENT_PROMPT.to_string(),
            tools: vec![crate::tools::COLLECT_LOGS_TOOL_NAME.to_string()],
        },
        SubAgentSpec {
            name: METRIC_COLLECTOR_AGENT.to_string(),
            description: "Queries Prometheus metrics and reports anomalous trends."
                .to_string(),
            system_prompt: METRIC_AGENT_PROMPT.to_string(),
            tools: vec![crate::tools::COLLECT_METRICS_TOOL_NAME.to_string()],
        },
        SubAgentSpec {
            name: CODE_COLLECTOR_AGENT.to_string(),
            description: "Extracts recent code changes, touched modules, and potential risks."
                .to_string(),
            system_prompt: CODE_AGENT_PROMPT.to_string(),
            tools: vec![crate::tools::COLLECT_CODE_TOOL_NAME.to_string()],
        },
    ]
}

// ---------------------------------------------------------------------------
// Step execution
// ---------------------------------------------------------------------------

/// Serializable per-step transcript, so a run suspended at an approval gate
/// can resume after a process restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub step_id: usize,
    pub agent: String,
    pub messages: Vec<ModelMessage>,
    /// Model turns taken so far; bounds the agent loop.
    pub turns: u32,
}

impl StepExecution {
    pub fn new(step_id: usize, agent: &str, params: &Value) -> Self {
        Self {
            step_id,
            agent: agent.to_string(),
            messages: vec![ModelMessage::User {
                text: params.to_string(),
            }],
            turns: 0,
        }
    }

    /// Tool results recorded so far, in call order.
    pub fn tool_results(&self) -> Vec<(&str, &Value)> {
        self.messages
            .iter()
            .filter_map(|message| match message {
                ModelMessage::ToolResult { tool, result } => Some((tool.as_str(), result)),
                _ => None,
            })
            .collect()
    }

    pub fn record_tool_result(&mut self, tool: &str, result: Value) {
        self.messages.push(ModelMessage::ToolResult {
            tool: tool.to_string(),
            result,
        });
    }
}

/// Result of advancing a step as far as it can go without external input.
#[derive(Debug)]
pub enum StepAdvance {
    Completed { output: String },
    NeedsApproval { calls: Vec<ToolCall> },
    Failed { error: String },
}

const MAX_MODEL_TURNS: u32 = 4;

/// Advance one step: run model turns, executing ungated tool calls inline,
/// until the model streams final text or a gated call suspends the step.
#[allow(clippy::too_many_arguments)]
pub async fn advance_step(
    spec: &SubAgentSpec,
    exec: &mut StepExecution,
    model: &Arc<dyn LanguageModel>,
    registry: &Arc<ToolRegistry>,
    gated_tools: &BTreeSet<String>,
    events: &EventSender,
    retry_attempts: u32,
    retry_delay_ms: u64,
) -> StepAdvance {
    loop {
        if exec.turns >= MAX_MODEL_TURNS {
            return StepAdvance::Failed {
                error: format!(
                    "sub-agent '{}' did not converge after {MAX_MODEL_TURNS} model turns",
                    spec.name
                ),
            };
        }
        exec.turns += 1;

        let request = ModelRequest {
            system_prompt: spec.system_prompt.clone(),
            messages: exec.messages.clone(),
            tools: registry.schemas_for(&spec.tools),
        };

        let reply = match generate_with_retry(model, request, retry_attempts, retry_delay_ms).await
        {
            Ok(reply) => reply,
            Err(error) => return StepAdvance::Failed { error },
        };

        match reply {
            ModelReply::ToolCalls(calls) => {
                let mut gated_calls = Vec::new();
                for call in calls {
                    if gated_tools.contains(&call.tool) {
                        gated_calls.push(call);
                        continue;
                    }
                    emit(
                        events,
                        AgentEvent::ToolRequested {
                            author: spec.name.clone(),
                            tool: call.tool.clone(),
                        },
                    );
                    let result = registry.dispatch(&call.tool, call.args).await;
                    let ok = result
                        .get("status")
                        .and_then(Value::as_str)
                        .map(|status| status != "error")
                        .unwrap_or(true);
                    emit(
                        events,
                        AgentEvent::ToolCompleted {
                            author: spec.name.clone(),
                            tool: call.tool.clone(),
                            ok,
                        },
                    );
                    exec.record_tool_result(&call.tool, result);
                }
                if !gated_calls.is_empty() {
                    return StepAdvance::NeedsApproval { calls: gated_calls };
                }
            }
            ModelReply::Stream(mut rx) => {
                let mut output = String::new();
                while let Some(chunk) = rx.recv().await {
                    emit(
                        events,
                        AgentEvent::Token {
                            author: spec.name.clone(),
                            text: chunk.clone(),
                            partial: true,
                            is_final: false,
                        },
                    );
                    output.push_str(&chunk);
                }
                let output = output.trim_end().to_string();
                emit(
                    events,
                    AgentEvent::Token {
                        author: spec.name.clone(),
                        text: output.clone(),
                        partial: false,
                        is_final: true,
                    },
                );
                exec.messages.push(ModelMessage::Assistant {
                    text: output.clone(),
                });
                return StepAdvance::Completed { output };
            }
        }
    }
}

/// Call the model backend with a small bounded retry budget.
async fn generate_with_retry(
    model: &Arc<dyn LanguageModel>,
    request: ModelRequest,
    retry_attempts: u32,
    retry_delay_ms: u64,
) -> Result<ModelReply, String> {
    let attempts = retry_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match model.generate(clone_request(&request)).await {
            Ok(reply) => return Ok(reply),
            Err(err) => {
                last_error = format!("{err:#}");
                tracing::warn!(
                    attempt,
                    attempts,
                    error = %last_error,
                    "model backend call failed"
                );
                if attempt < attempts && retry_delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(retry_delay_ms)).await;
                }
            }
        }
    }

    Err(format!(
        "{}: model backend failed after {attempts} attempt(s): {last_error}",
        crate::error::CODE_BACKEND_ERROR
    ))
}

fn clone_request(request: &ModelRequest) -> ModelRequest {
    ModelRequest {
        system_prompt: request.system_prompt.clone(),
        messages: request.messages.clone(),
        tools: request.tools.clone(),
    }
}
