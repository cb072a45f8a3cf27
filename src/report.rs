/// Final triage report assembly.
///
/// Every fact in the report traces back to a recorded sub-agent tool result;
/// the aggregator only restates and correlates what the collectors returned.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CODE_MISSING_PARAMETER;
use crate::plan::StepStatus;

/// Terminal result of one plan step, carried into aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_id: usize,
    pub agent: String,
    pub status: StepStatus,
    pub output: Option<String>,
    /// Tool results recorded during the step, in call order.
    pub tool_results: Vec<(String, Value)>,
    pub error: Option<String>,
}

/// A provenance-tagged fact contributed by a sub-agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub agent: String,
    pub tool: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub task: String,
    pub summary: Vec<String>,
    pub evidence: Vec<Evidence>,
    pub hypothesis: String,
    pub next_steps: Vec<String>,
}

impl Report {
    pub fn render(&self) -> String {
        let mut out = String::from("## Triage Report\n\n");
        out.push_str(&format!("**Task:** {}\n\n", self.task));

        out.push_str("### Summary\n");
        for line in &self.summary {
            out.push_str(&format!("- {line}\n"));
        }

        out.push_str("\n### Evidence\n");
        if self.evidence.is_empty() {
            out.push_str("- none collected\n");
        }
        for item in &self.evidence {
            out.push_str(&format!("- [{}/{}] {}\n", item.agent, item.tool, item.detail));
        }

        out.push_str(&format!("\n### Root-cause hypothesis\n{}\n", self.hypothesis));

        out.push_str("\n### Next steps\n");
        for step in &self.next_steps {
            out.push_str(&format!("- {step}\n"));
        }
        out
    }
}

/// Build the report from terminal step outcomes. Failed and blocked steps
/// appear as annotated gaps rather than aborting aggregation.
pub fn build_report(task_goal: &str, outcomes: &[StepOutcome]) -> Report {
    let mut summary = Vec::new();
    let mut evidence = Vec::new();
    let mut gaps = Vec::new();

    for outcome in outcomes {
        summary.push(summarize_outcome(outcome));
        for (tool, result) in &outcome.tool_results {
            if is_error_payload(result) {
                gaps.push(gap_from_result(outcome, tool, result));
            } else {
                evidence.extend(evidence_from_result(outcome, tool, result));
            }
        }
        match outcome.status {
            StepStatus::Failed => {
                if let Some(error) = &outcome.error {
                    gaps.push(format!("{}: {error}", outcome.agent));
                }
            }
            StepStatus::Blocked => {
                gaps.push(format!(
                    "{}: blocked, its dependency did not complete",
                    outcome.agent
                ));
            }
            _ => {}
        }
    }

    let hypothesis = derive_hypothesis(outcomes);
    let next_steps = derive_next_steps(outcomes, &gaps);

    Report {
        task: task_goal.to_string(),
        summary,
        evidence,
        hypothesis,
        next_steps,
    }
}

fn is_error_payload(result: &Value) -> bool {
    result.get("status").and_then(Value::as_str) == Some("error")
}

fn summarize_outcome(outcome: &StepOutcome) -> String {
    match outcome.status {
        StepStatus::Completed => {
            let collected = outcome
                .tool_results
                .iter()
                .filter(|(_, result)| !is_error_payload(result))
                .count();
            format!(
                "{}: completed with {collected} tool result(s)",
                outcome.agent
            )
        }
        StepStatus::Failed => format!(
            "{}: failed ({})",
            outcome.agent,
            outcome.error.as_deref().unwrap_or("unknown error")
        ),
        StepStatus::Blocked => format!("{}: blocked", outcome.agent),
        StepStatus::Pending | StepStatus::Running => {
            format!("{}: did not reach a terminal state", outcome.agent)
        }
    }
}

fn gap_from_result(outcome: &StepOutcome, tool: &str, result: &Value) -> String {
    if result.get("code").and_then(Value::as_str) == Some(CODE_MISSING_PARAMETER) {
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
        return format!("{}/{tool}: missing parameter(s) {missing}", outcome.agent);
    }
    let error = result
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    format!("{}/{tool}: {error}", outcome.agent)
}

fn evidence_from_result(outcome: &StepOutcome, tool: &str, result: &Value) -> Vec<Evidence> {
    let tag = |detail: String| Evidence {
        agent: outcome.agent.clone(),
        tool: tool.to_string(),
        detail,
    };
    let mut items = Vec::new();

    if let Some(insights) = result.get("insights").and_then(Value::as_array) {
        for insight in insights.iter().filter_map(Value::as_str) {
            items.push(tag(insight.to_string()));
        }
    }
    if let Some(samples) = result.get("samples").and_then(Value::as_array) {
        for sample in samples.iter().filter_map(Value::as_str) {
            items.push(tag(format!("sample: {sample}")));
        }
    }
    if let Some(trends) = result.get("trends").and_then(Value::as_object) {
        for (metric, trend) in trends {
            items.push(tag(render_trend(metric, trend)));
        }
    }
    if let Some(changes) = result.get("changes").and_then(Value::as_array) {
        for change in changes {
            items.push(tag(render_change(change)));
        }
    }
    if let Some(notes) = result.get("notes").and_then(Value::as_array) {
        for note in notes.iter().filter_map(Value::as_str) {
            items.push(tag(note.to_string()));
        }
    }
    if let Some(command) = result.get("command").and_then(Value::as_str) {
        let exit_code = result.get("exit_code").and_then(Value::as_i64).unwrap_or(0);
        items.push(tag(format!("command `{command}` exited with {exit_code}")));
    }

    if items.is_empty() {
        items.push(tag(format!(
            "{tool} returned {} field(s)",
            result.as_object().map(|map| map.len()).unwrap_or(0)
        )));
    }
    items
}

fn render_trend(metric: &str, trend: &Value) -> String {
    let peak = render_scalar(trend.get("peak"));
    let baseline = render_scalar(trend.get("baseline"));
    match trend.get("since").and_then(Value::as_str) {
        Some(since) => format!("{metric} peaked at {peak} vs baseline {baseline}, since {since}"),
        None => format!("{metric} peaked at {peak} vs baseline {baseline}"),
    }
}

fn render_scalar(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => "?".to_string(),
    }
}

fn render_change(change: &Value) -> String {
    format!(
        "commit {} \"{}\" touches [{}], risk {}",
        change.get("commit").and_then(Value::as_str).unwrap_or("?"),
        change.get("title").and_then(Value::as_str).unwrap_or("?"),
        change
            .get("modules")
            .and_then(Value::as_array)
            .map(|modules| {
                modules
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default(),
        change.get("risk").and_then(Value::as_str).unwrap_or("?"),
    )
}

/// Correlate collected evidence into a root-cause candidate. Rules only fire
/// on facts present in the tool results.
fn derive_hypothesis(outcomes: &[StepOutcome]) -> String {
    let mut high_risk_change: Option<(String, String)> = None;
    let mut log_pattern: Option<String> = None;
    let mut error_rate: Option<(String, String, String)> = None;

    for outcome in outcomes {
        for (_, result) in &outcome.tool_results {
            if is_error_payload(result) {
                continue;
            }
            if high_risk_change.is_none()
                && let Some(changes) = result.get("changes").and_then(Value::as_array)
            {
                for change in changes {
                    let risk = change.get("risk").and_then(Value::as_str).unwrap_or("");
                    if risk.starts_with("high") {
                        high_risk_change = Some((
                            change
                                .get("commit")
                                .and_then(Value::as_str)
                                .unwrap_or("?")
                                .to_string(),
                            change
                                .get("title")
                                .and_then(Value::as_str)
                                .unwrap_or("?")
                                .to_string(),
                        ));
                        break;
                    }
                }
            }
            if log_pattern.is_none()
                && let Some(insights) = result.get("insights").and_then(Value::as_array)
            {
                log_pattern = insights
                    .iter()
                    .filter_map(Value::as_str)
                    .find(|insight| insight.contains("timeout") || insight.contains("api-gateway"))
                    .map(String::from);
            }
            if error_rate.is_none()
                && let Some(trend) = result.pointer("/trends/error_rate")
            {
                error_rate = Some((
                    render_scalar(trend.get("peak")),
                    render_scalar(trend.get("baseline")),
                    trend
                        .get("since")
                        .and_then(Value::as_str)
                        .unwrap_or("?")
                        .to_string(),
                ));
            }
        }
    }

    match (high_risk_change, log_pattern) {
        (Some((commit, title)), Some(pattern)) => format!(
            "Recent change {commit} (\"{title}\") correlates with the dominant log pattern \
             (\"{pattern}\"); it is the leading root-cause candidate."
        ),
        _ => match error_rate {
            Some((peak, baseline, since)) => format!(
                "Error rate is elevated at {peak} against a {baseline} baseline since {since}; \
                 no correlated code change was identified from the collected evidence."
            ),
            None => {
                "Insufficient evidence was collected to form a root-cause hypothesis.".to_string()
            }
        },
    }
}

fn derive_next_steps(outcomes: &[StepOutcome], gaps: &[String]) -> Vec<String> {
    let mut steps = Vec::new();

    for outcome in outcomes {
        for (tool, result) in &outcome.tool_results {
            if result.get("code").and_then(Value::as_str) == Some(CODE_MISSING_PARAMETER) {
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
                steps.push(format!(
                    "Provide {missing} and re-dispatch {} ({tool}).",
                    outcome.agent
                ));
            }
        }
        for (_, result) in &outcome.tool_results {
            if let Some(changes) = result.get("changes").and_then(Value::as_array) {
                for change in changes {
                    if change
                        .get("risk")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .starts_with("high")
                    {
                        steps.push(format!(
                            "Validate or roll back commit {} (\"{}\").",
                            change.get("commit").and_then(Value::as_str).unwrap_or("?"),
                            change.get("title").and_then(Value::as_str).unwrap_or("?"),
                        ));
                    }
                }
            }
        }
    }

    for gap in gaps {
        if gap.contains("blocked") {
            steps.push(format!("Unblock and re-run: {gap}."));
        }
    }

    if steps.is_empty() {
        steps.push(
            "Cross-check the suspicious window across logs, metrics, and recent changes."
                .to_string(),
        );
    }
    steps
}
