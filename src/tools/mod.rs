pub mod collectors;
pub mod fs_write;
pub mod shell;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::RuntimeConfig;
use crate::error::{CODE_MISSING_PARAMETER, CODE_UNKNOWN_TOOL};

pub const COLLECT_LOGS_TOOL_NAME: &str = "collect_logs";
pub const COLLECT_METRICS_TOOL_NAME: &str = "collect_prom_metrics";
pub const COLLECT_CODE_TOOL_NAME: &str = "collect_code_changes";
pub const EXECUTE_SHELL_TOOL_NAME: &str = "execute_shell";
pub const FS_WRITE_TOOL_NAME: &str = "fs_write";

// ---------------------------------------------------------------------------
// Tool contract
// ---------------------------------------------------------------------------

/// Declared parameter of a tool: name, JSON type, and whether the registry
/// may fill a default or must report the parameter as missing.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: &'static str,
    pub required: bool,
    pub default: Option<Value>,
    pub description: &'static str,
}

impl ParamSpec {
    pub fn required(name: &'static str, kind: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            default: None,
            description,
        }
    }

    pub fn with_default(
        name: &'static str,
        kind: &'static str,
        default: Value,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: Some(default),
            description,
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn params(&self) -> &[ParamSpec];

    /// JSON schema for the declared parameters, offered to model backends.
    fn parameters_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for spec in self.params() {
            let mut prop = serde_json::Map::new();
            prop.insert("type".to_string(), json!(spec.kind));
            prop.insert("description".to_string(), json!(spec.description));
            if let Some(default) = &spec.default {
                prop.insert("default".to_string(), default.clone());
            }
            properties.insert(spec.name.to_string(), Value::Object(prop));
            if spec.required {
                required.push(json!(spec.name));
            }
        }
        json!({
            "type": "object",
            "properties": Value::Object(properties),
            "required": Value::Array(required),
        })
    }

    async fn execute(&self, args: Value) -> Result<Value>;
}

/// Schema handed to a model backend so it can emit tool calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A tool invocation requested by a model turn or the orchestrator itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    pub args: Value,
}

type ToolFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// Adapter turning an async closure into a [`Tool`].
pub struct FunctionTool {
    name: &'static str,
    description: &'static str,
    params: Vec<ParamSpec>,
    handler: Box<dyn Fn(Value) -> ToolFuture + Send + Sync>,
}

impl FunctionTool {
    pub fn new<F, Fut>(
        name: &'static str,
        description: &'static str,
        params: Vec<ParamSpec>,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name,
            description,
            params,
            handler: Box::new(move |args| Box::pin(handler(args))),
        }
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        (self.handler)(args).await
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Name-keyed tool table populated at startup and looked up at dispatch time.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        let mut registry = Self::default();
        for tool in tools {
            registry.register(tool);
        }
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn schemas_for(&self, names: &[String]) -> Vec<ToolSchema> {
        names
            .iter()
            .filter_map(|name| self.get(name))
            .map(|tool| ToolSchema {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }

    /// Execute a tool by name. Failures come back as structured payloads so
    /// callers can fold them into step results instead of crashing the run.
    pub async fn dispatch(&self, name: &str, args: Value) -> Value {
        let Some(tool) = self.get(name) else {
            tracing::warn!(tool = name, "dispatch to unregistered tool");
            return json!({
                "status": "error",
                "code": CODE_UNKNOWN_TOOL,
                "tool": name,
                "error": format!("unknown tool '{name}'"),
            });
        };

        let missing = missing_required_params(tool.params(), &args);
        if !missing.is_empty() {
            return json!({
                "status": "error",
                "code": CODE_MISSING_PARAMETER,
                "tool": name,
                "missing": missing,
                "error": format!(
                    "tool '{name}' is missing required parameter(s): {}",
                    missing.join(", ")
                ),
            });
        }

        let args = apply_param_defaults(tool.params(), args);
        match tool.execute(args).await {
            Ok(result) => result,
            Err(err) => json!({
                "status": "error",
                "code": "tool_error",
                "tool": name,
                "error": format!("{err:#}"),
            }),
        }
    }
}

/// Required parameter names absent from `args` (null counts as absent).
pub fn missing_required_params(params: &[ParamSpec], args: &Value) -> Vec<String> {
    params
        .iter()
        .filter(|spec| spec.required)
        .filter(|spec| args.get(spec.name).map_or(true, Value::is_null))
        .map(|spec| spec.name.to_string())
        .collect()
}

/// Fill declared defaults for parameters the caller left out.
pub fn apply_param_defaults(params: &[ParamSpec], args: Value) -> Value {
    let mut map = match args {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    for spec in params {
        if let Some(default) = &spec.default
            && map.get(spec.name).map_or(true, Value::is_null)
        {
            map.insert(spec.name.to_string(), default.clone());
        }
    }
    Value::Object(map)
}

/// Assemble the full builtin toolset: the three read-only collectors plus
/// the sandboxed side-effecting tools.
pub fn build_builtin_tools(cfg: &RuntimeConfig) -> Vec<Arc<dyn Tool>> {
    let mut tools = collectors::build_collector_tools();
    tools.push(shell::build_execute_shell_tool(
        cfg.sandbox_root.clone(),
        cfg.shell_timeout_secs,
        cfg.shell_max_output_chars,
    ));
    tools.push(fs_write::build_fs_write_tool(cfg.sandbox_root.clone()));
    tools
}
