/// Read-only collector tools backed by example datasets.
///
/// Each collector validates its identifying parameters through the registry's
/// declared specs and returns a structured summary payload. The payloads are
/// representative fixtures so triage flows have realistic shapes to work with;
/// a production deployment would swap the bodies for live backends.
use std::sync::Arc;

use anyhow::Result;
use serde_json::{Value, json};

use super::{FunctionTool, ParamSpec, Tool};

pub fn build_collector_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(FunctionTool::new(
            super::COLLECT_LOGS_TOOL_NAME,
            "Fetches anomalous log patterns and sample lines for a service, \
             environment, and time window.",
            vec![
                ParamSpec::required("service", "string", "target service name"),
                ParamSpec::required("environment", "string", "deployment environment"),
                ParamSpec::with_default(
                    "window_minutes",
                    "integer",
                    json!(30),
                    "lookback window in minutes",
                ),
                ParamSpec::with_default("limit", "integer", json!(30), "max sample lines"),
            ],
            |args| async move { collect_logs_response(&args) },
        )),
        Arc::new(FunctionTool::new(
            super::COLLECT_METRICS_TOOL_NAME,
            "Queries core service metrics (error_rate, latency_p99_ms, cpu_percent, qps) \
             and reports peak versus baseline trends.",
            vec![
                ParamSpec::required("service", "string", "target service name"),
                ParamSpec::required("environment", "string", "deployment environment"),
                ParamSpec::required("window_minutes", "integer", "lookback window in minutes"),
            ],
            |args| async move { collect_metrics_response(&args) },
        )),
        Arc::new(FunctionTool::new(
            super::COLLECT_CODE_TOOL_NAME,
            "Summarizes recent code changes for a service with touched modules \
             and risk notes.",
            vec![
                ParamSpec::required("service", "string", "target service name"),
                ParamSpec::with_default("branch", "string", json!("main"), "branch to inspect"),
                ParamSpec::with_default(
                    "recent_commits",
                    "integer",
                    json!(3),
                    "number of commits to summarize",
                ),
            ],
            |args| async move { collect_code_changes_response(&args) },
        )),
    ]
}

fn collect_logs_response(args: &Value) -> Result<Value> {
    let service = args.get("service").and_then(Value::as_str).unwrap_or("");
    let environment = args.get("environment").and_then(Value::as_str).unwrap_or("");
    let window_minutes = args.get("window_minutes").and_then(Value::as_u64).unwrap_or(30);
    let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(30);

    Ok(json!({
        "agent": "log_collection",
        "service": service,
        "environment": environment,
        "window_minutes": window_minutes,
        "limit": limit,
        "insights": [
            "5xx/ERROR share is up 220% against baseline, peaking in the last 10 minutes.",
            "Dominant pattern: timeouts calling api-gateway; a few NullPointer/serialization errors.",
        ],
        "samples": [
            format!("2024-01-01T12:04:11Z ERROR {service} timeout to api-gateway after 3.0s"),
            format!("2024-01-01T12:05:02Z ERROR {service} NullPointer in payment adapter"),
        ],
    }))
}

fn collect_metrics_response(args: &Value) -> Result<Value> {
    let service = args.get("service").and_then(Value::as_str).unwrap_or("");
    let environment = args.get("environment").and_then(Value::as_str).unwrap_or("");
    let window_minutes = args.get("window_minutes").and_then(Value::as_u64).unwrap_or(0);

    Ok(json!({
        "service": service,
        "environment": environment,
        "window_minutes": window_minutes,
        "trends": {
            "error_rate": { "peak": "4.2%", "baseline": "0.3%", "since": "12:05Z" },
            "latency_p99_ms": { "peak": 850, "baseline": 220 },
            "cpu_percent": { "peak": 92, "baseline": 55 },
            "qps": { "peak": 1800, "baseline": 1200 },
        },
    }))
}

fn collect_code_changes_response(args: &Value) -> Result<Value> {
    let service = args.get("service").and_then(Value::as_str).unwrap_or("");
    let branch = args.get("branch").and_then(Value::as_str).unwrap_or("main");
    let recent_commits = args.get("recent_commits").and_then(Value::as_u64).unwrap_or(3);

    Ok(json!({
        "agent": "code_collection",
        "service": service,
        "branch": branch,
        "recent_commits": recent_commits,
        "changes": [
            {
                "commit": "a1b2c3d",
                "title": "Add retry around api-gateway calls",
                "modules": ["checkout/api", "checkout/retry"],
                "risk": "high: may amplify retries and pile up timeouts",
            },
            {
                "commit": "d4e5f6g",
                "title": "Adjust payment adapter null handling",
                "modules": ["payment/adapter"],
                "risk": "medium: may introduce null-handling errors",
            },
        ],
        "notes": [
            "The last two commits touch api-gateway calls and error handling; cross-check against logs and metrics.",
        ],
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRegistry;

    #[tokio::test]
    async fn collect_logs_returns_insights_and_samples() {
        let registry = ToolRegistry::new(build_collector_tools());
        let result = registry
            .dispatch(
                crate::tools::COLLECT_LOGS_TOOL_NAME,
                json!({"service": "checkout", "environment": "prod", "window_minutes": 30}),
            )
            .await;

        let insights = result.get("insights").and_then(Value::as_array).unwrap();
        let samples = result.get("samples").and_then(Value::as_array).unwrap();
        assert!(!insights.is_empty());
        assert!(!samples.is_empty());
        assert_eq!(result["window_minutes"], json!(30));
    }

    #[tokio::test]
    async fn metrics_without_window_reports_the_gap() {
        let registry = ToolRegistry::new(build_collector_tools());
        let result = registry
            .dispatch(
                crate::tools::COLLECT_METRICS_TOOL_NAME,
                json!({"service": "checkout", "environment": "prod"}),
            )
            .await;

        assert_eq!(result["code"], json!(crate::error::CODE_MISSING_PARAMETER));
        let missing = result.get("missing").and_then(Value::as_array).unwrap();
        assert!(missing.contains(&json!("window_minutes")));
        assert!(result.get("trends").is_none());
    }

    #[tokio::test]
    async fn code_changes_fill_declared_defaults() {
        let registry = ToolRegistry::new(build_collector_tools());
        let result = registry
            .dispatch(
                crate::tools::COLLECT_CODE_TOOL_NAME,
                json!({"service": "checkout"}),
            )
            .await;

        assert_eq!(result["branch"], json!("main"));
        assert_eq!(result["recent_commits"], json!(3));
        assert!(!result["changes"].as_array().unwrap().is_empty());
    }
}
