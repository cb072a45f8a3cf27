/// Inference backend seam.
///
/// The orchestrator and sub-agents talk to a [`LanguageModel`] trait object
/// injected at construction time. Real providers are external collaborators;
/// the bundled [`ScriptedModel`] is a deterministic stand-in that drives the
/// same loop: request tool calls first, then summarize the collected results
/// as a chunked stream.
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::cli::Provider;
use crate::config::RuntimeConfig;
use crate::tools::{ToolCall, ToolSchema};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ModelMessage {
    User { text: String },
    Assistant { text: String },
    ToolResult { tool: String, result: Value },
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub messages: Vec<ModelMessage>,
    pub tools: Vec<ToolSchema>,
}

/// A model turn either requests tool calls or streams text chunks.
pub enum ModelReply {
    ToolCalls(Vec<ToolCall>),
    Stream(mpsc::Receiver<String>),
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, request: ModelRequest) -> Result<ModelReply>;
}

pub fn resolve_model(cfg: &RuntimeConfig) -> Result<(Arc<dyn LanguageModel>, String)> {
    let model: Arc<dyn LanguageModel> = match cfg.provider {
        Provider::Auto | Provider::Scripted => Arc::new(ScriptedModel::default()),
    };
    let name = model.name().to_string();
    Ok((model, name))
}

// ---------------------------------------------------------------------------
// Scripted model
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ScriptedModel;

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: ModelRequest) -> Result<ModelReply> {
        let results: Vec<(&str, &Value)> = request
            .messages
            .iter()
            .filter_map(|message| match message {
                ModelMessage::ToolResult { tool, result } => Some((tool.as_str(), result)),
                _ => None,
            })
            .collect();

        // First turn with tools offered: call each of them with the step
        // parameters carried in the latest user message.
        if results.is_empty() && !request.tools.is_empty() {
            let params = latest_user_params(&request.messages);
            let calls = request
                .tools
                .iter()
                .map(|schema| ToolCall {
                    tool: schema.name.clone(),
                    args: filter_args_to_schema(&params, schema),
                })
                .collect();
            return Ok(ModelReply::ToolCalls(calls));
        }

        let text = if results.is_empty() {
            "No collection tools were offered for this step, so there is nothing to report."
                .to_string()
        } else {
            results
                .iter()
                .map(|(tool, result)| summarize_tool_result(tool, result))
                .collect::<Vec<_>>()
                .join(" ")
        };

        Ok(ModelReply::Stream(stream_text_chunks(text)))
    }
}

/// Parse the latest user message as a JSON parameter object.
fn latest_user_params(messages: &[ModelMessage]) -> Value {
    messages
        .iter()
        .rev()
        .find_map(|message| match message {
            ModelMessage::User { text } => serde_json::from_str::<Value>(text).ok(),
            _ => None,
        })
        .unwrap_or_else(|| Value::Object(Default::default()))
}

/// Keep only the parameters the tool schema declares.
fn filter_args_to_schema(params: &Value, schema: &ToolSchema) -> Value {
    let mut args = serde_json::Map::new();
    if let (Some(source), Some(properties)) = (
        params.as_object(),
        schema.parameters.get("properties").and_then(Value::as_object),
    ) {
        for key in properties.keys() {
            if let Some(value) = source.get(key)
                && !value.is_null()
            {
                args.insert(key.clone(), value.clone());
            }
        }
    }
    Value::Object(args)
}

/// Render one recorded tool result into summary prose. Only facts present in
/// the result payload appear here.
pub fn summarize_tool_result(tool: &str, result: &Value) -> String {
    let status = result.get("status").and_then(Value::as_str).unwrap_or("ok");
    if status == "error" {
        let code = result.get("code").and_then(Value::as_str).unwrap_or("");
        if code == crate::error::CODE_MISSING_PARAMETER {
            let missing = result
                .get("missing")
                .and_then(Value::as_array)
                .map(|names| {
                    names
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            return format!(
                "Cannot complete {tool}: missing required parameter(s): {missing}."
            );
        }
        if code == crate::error::CODE_INTERRUPT_REJECTED {
            return format!("The requested {tool} action was declined; no execution occurred.");
        }
        let error = result
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return format!("The {tool} call failed: {error}.");
    }

    match tool {
        crate::tools::COLLECT_LOGS_TOOL_NAME => {
            let service = result.get("service").and_then(Value::as_str).unwrap_or("?");
            let environment = result
                .get("environment")
                .and_then(Value::as_str)
                .unwrap_or("?");
            let window = result
                .get("window_minutes")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            let insights = result
                .get("insights")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let samples = result
                .get("samples")
                .and_then(Value::as_array)
                .map(|s| s.len())
                .unwrap_or(0);
            let lead = insights
                .first()
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default();
            format!(
                "Log collection for {service}/{environment} over the last {window} minutes \
                 found {} anomaly insight(s) and {samples} sample line(s). Leading pattern: {lead}",
                insights.len()
            )
        }
        crate::tools::COLLECT_METRICS_TOOL_NAME => {
            let service = result.get("service").and_then(Value::as_str).unwrap_or("?");
            let environment = result
                .get("environment")
                .and_then(Value::as_str)
                .unwrap_or("?");
            let error_rate = result.pointer("/trends/error_rate");
            let peak = error_rate
                .and_then(|t| t.get("peak"))
                .and_then(Value::as_str)
                .unwrap_or("?");
            let baseline = error_rate
                .and_then(|t| t.get("baseline"))
                .and_then(Value::as_str)
                .unwrap_or("?");
            let since = error_rate
                .and_then(|t| t.get("since"))
                .and_then(Value::as_str)
                .unwrap_or("?");
            let latency_peak = result
                .pointer("/trends/latency_p99_ms/peak")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            format!(
                "Metric trends for {service}/{environment}: error_rate peaked at {peak} \
                 (baseline {baseline}) since {since}; latency_p99_ms peaked at {latency_peak}."
            )
        }
        crate::tools::COLLECT_CODE_TOOL_NAME => {
            let branch = result.get("branch").and_then(Value::as_str).unwrap_or("?");
            let changes = result
                .get("changes")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let rendered = changes
                .iter()
                .map(|change| {
                    format!(
                        "{} {} ({})",
                        change.get("commit").and_then(Value::as_str).unwrap_or("?"),
                        change.get("title").and_then(Value::as_str).unwrap_or("?"),
                        change.get("risk").and_then(Value::as_str).unwrap_or("?"),
                    )
                })
                .collect::<Vec<_>>()
                .join("; ");
            format!(
                "{} recent change(s) on {branch}: {rendered}.",
                changes.len()
            )
        }
        crate::tools::EXECUTE_SHELL_TOOL_NAME => {
            let command = result.get("command").and_then(Value::as_str).unwrap_or("?");
            let exit_code = result.get("exit_code").and_then(Value::as_i64).unwrap_or(0);
            format!("Command `{command}` exited with status {exit_code}.")
        }
        _ => {
            let fields = result.as_object().map(|map| map.len()).unwrap_or(0);
            format!("{tool} returned {fields} field(s).")
        }
    }
}

/// Deliver text as an incremental chunk stream, a few words at a time.
pub fn stream_text_chunks(text: String) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let words: Vec<&str> = text.split(' ').collect();
        for chunk in words.chunks(6) {
            let mut piece = chunk.join(" ");
            piece.push(' ');
            if tx.send(piece).await.is_err() {
                return;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn logs_schema() -> ToolSchema {
        ToolSchema {
            name: crate::tools::COLLECT_LOGS_TOOL_NAME.to_string(),
            description: String::new(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "service": {"type": "string"},
                    "environment": {"type": "string"},
                    "window_minutes": {"type": "integer"},
                },
                "required": ["service", "environment"],
            }),
        }
    }

    #[tokio::test]
    async fn first_turn_requests_tool_calls_with_step_params() {
        let model = ScriptedModel::default();
        let request = ModelRequest {
            system_prompt: String::new(),
            messages: vec![ModelMessage::User {
                text: json!({"service": "checkout", "environment": "prod", "extra": 1})
                    .to_string(),
            }],
            tools: vec![logs_schema()],
        };

        match model.generate(request).await.unwrap() {
            ModelReply::ToolCalls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].tool, crate::tools::COLLECT_LOGS_TOOL_NAME);
                assert_eq!(calls[0].args["service"], json!("checkout"));
                assert!(calls[0].args.get("extra").is_none());
            }
            ModelReply::Stream(_) => panic!("expected tool calls on the first turn"),
        }
    }

    #[tokio::test]
    async fn second_turn_streams_a_summary_of_results() {
        let model = ScriptedModel::default();
        let request = ModelRequest {
            system_prompt: String::new(),
            messages: vec![
                ModelMessage::User {
                    text: json!({"service": "checkout"}).to_string(),
                },
                ModelMessage::ToolResult {
                    tool: crate::tools::COLLECT_LOGS_TOOL_NAME.to_string(),
                    result: json!({
                        "service": "checkout",
                        "environment": "prod",
                        "window_minutes": 30,
                        "insights": ["timeouts calling api-gateway"],
                        "samples": ["line"],
                    }),
                },
            ],
            tools: vec![logs_schema()],
        };

        match model.generate(request).await.unwrap() {
            ModelReply::Stream(mut rx) => {
                let mut text = String::new();
                while let Some(chunk) = rx.recv().await {
                    text.push_str(&chunk);
                }
                assert!(text.contains("checkout/prod"));
                assert!(text.contains("1 anomaly insight(s)"));
            }
            ModelReply::ToolCalls(_) => panic!("expected a summary stream"),
        }
    }

    #[test]
    fn missing_parameter_results_summarize_the_gap() {
        let summary = summarize_tool_result(
            crate::tools::COLLECT_METRICS_TOOL_NAME,
            &json!({
                "status": "error",
                "code": crate::error::CODE_MISSING_PARAMETER,
                "missing": ["window_minutes"],
            }),
        );
        assert!(summary.contains("window_minutes"));
        assert!(summary.contains("missing required parameter"));
    }
}
