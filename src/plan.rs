/// Task intake and rule-based plan drafting.
///
/// A plan is drafted from the task hints and the sub-agent catalog, shown to
/// the caller, and only becomes executable once explicitly confirmed.
/// Parameter gaps are listed as gaps; the planner never invents values.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::subagent::SubAgentSpec;
use crate::tools::ToolRegistry;

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskHints {
    pub service: Option<String>,
    pub environment: Option<String>,
    pub window_minutes: Option<u64>,
    pub branch: Option<String>,
}

/// Immutable once submitted; originates the conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub goal: String,
    pub hints: TaskHints,
}

impl Task {
    /// Build a task from free text, extracting structured hints against the
    /// configured service catalog.
    pub fn from_goal(goal: &str, services: &[String]) -> Self {
        Self {
            goal: goal.trim().to_string(),
            hints: extract_hints(goal, services),
        }
    }

    pub fn with_hints(goal: &str, hints: TaskHints) -> Self {
        Self {
            goal: goal.trim().to_string(),
            hints,
        }
    }

    /// Detect a direct shell request ("run make format" -> "make format").
    pub fn direct_command(&self) -> Option<String> {
        let trimmed = self.goal.trim();
        let lower = trimmed.to_ascii_lowercase();
        for verb in ["run ", "execute ", "exec "] {
            if lower.starts_with(verb) {
                let command = trimmed[verb.len()..].trim();
                if !command.is_empty() {
                    return Some(command.to_string());
                }
            }
        }
        None
    }
}

const ENVIRONMENT_TOKENS: &[(&str, &str)] = &[
    ("prod", "prod"),
    ("production", "prod"),
    ("staging", "staging"),
    ("dev", "dev"),
    ("development", "dev"),
    ("test", "test"),
];

const SYMPTOM_TOKENS: &[&str] = &[
    "latency", "error", "errors", "spike", "outage", "incident", "crash", "timeout",
    "timeouts", "5xx",
];

const STOPWORDS: &[&str] = &["the", "a", "an", "in", "of", "on", "for", "with", "into"];

fn tokenize(goal: &str) -> Vec<String> {
    goal.split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '-' && c != '_')
                .to_ascii_lowercase()
        })
        .filter(|word| !word.is_empty())
        .collect()
}

/// Extract structured triage hints from free-text goals. Only catalogued
/// services and a small token grammar are recognized; anything else stays a
/// gap for the user to fill in.
pub fn extract_hints(goal: &str, services: &[String]) -> TaskHints {
    let tokens = tokenize(goal);
    let mut hints = TaskHints::default();

    for token in &tokens {
        if hints.environment.is_none()
            && let Some((_, canonical)) = ENVIRONMENT_TOKENS
                .iter()
                .find(|(alias, _)| *alias == token.as_str())
        {
            hints.environment = Some((*canonical).to_string());
        }
        if hints.service.is_none() && services.iter().any(|service| service == token) {
            hints.service = Some(token.clone());
        }
    }

    // Fallback: the token right before a symptom word often names the service.
    if hints.service.is_none() {
        for window in tokens.windows(2) {
            if SYMPTOM_TOKENS.contains(&window[1].as_str())
                && !STOPWORDS.contains(&window[0].as_str())
                && !ENVIRONMENT_TOKENS
                    .iter()
                    .any(|(alias, _)| *alias == window[0])
            {
                hints.service = Some(window[0].clone());
                break;
            }
        }
    }

    for window in tokens.windows(2) {
        if hints.window_minutes.is_none()
            && window[1].starts_with("min")
            && let Ok(minutes) = window[0].parse::<u64>()
        {
            hints.window_minutes = Some(minutes);
        }
        if hints.branch.is_none()
            && window[0] == "branch"
            && window[1].parse::<u64>().is_err()
        {
            hints.branch = Some(window[1].clone());
        }
    }

    hints
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// A step parameter is either a concrete value or an explicitly flagged gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParamValue {
    Given { value: Value },
    Missing,
}

impl ParamValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, ParamValue::Missing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: usize,
    pub agent: String,
    pub params: BTreeMap<String, ParamValue>,
    pub expected: String,
    pub depends_on: Vec<usize>,
    pub status: StepStatus,
}

impl Step {
    pub fn missing_params(&self) -> Vec<String> {
        self.params
            .iter()
            .filter(|(_, value)| value.is_missing())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// The concrete parameters to dispatch with; gaps are left out so tools
    /// can report them instead of receiving fabricated values.
    pub fn given_params(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (name, value) in &self.params {
            if let ParamValue::Given { value } = value {
                map.insert(name.clone(), value.clone());
            }
        }
        Value::Object(map)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanState {
    Drafted,
    Confirmed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Step>,
    pub state: PlanState,
}

impl Plan {
    pub fn is_confirmed(&self) -> bool {
        self.state == PlanState::Confirmed
    }

    /// Freeze the plan; after this it becomes executable.
    pub fn confirm(&mut self) {
        self.state = PlanState::Confirmed;
    }

    pub fn step(&self, id: usize) -> Option<&Step> {
        self.steps.iter().find(|step| step.id == id)
    }

    /// All parameter gaps across steps, `(step id, agent, parameter)`.
    pub fn gaps(&self) -> Vec<(usize, String, String)> {
        self.steps
            .iter()
            .flat_map(|step| {
                step.missing_params()
                    .into_iter()
                    .map(|param| (step.id, step.agent.clone(), param))
            })
            .collect()
    }

    /// Human-readable rendering for the confirmation prompt.
    pub fn render(&self) -> String {
        let mut out = String::from("Triage plan:\n");
        for step in &self.steps {
            let params = step
                .params
                .iter()
                .map(|(name, value)| match value {
                    ParamValue::Given { value } => format!("{name}={value}"),
                    ParamValue::Missing => format!("{name}=<missing>"),
                })
                .collect::<Vec<_>>()
                .join(", ");
            let deps = if step.depends_on.is_empty() {
                String::new()
            } else {
                format!(
                    " (after step {})",
                    step.depends_on
                        .iter()
                        .map(usize::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            };
            out.push_str(&format!(
                "  {}. {} [{params}]{deps}\n     expects: {}\n",
                step.id + 1,
                step.agent,
                step.expected
            ));
        }
        let gaps = self.gaps();
        if gaps.is_empty() {
            out.push_str("No parameter gaps.\n");
        } else {
            out.push_str("Parameter gaps (provide before or during dispatch):\n");
            for (step_id, agent, param) in gaps {
                out.push_str(&format!("  step {} ({agent}): {param}\n", step_id + 1));
            }
        }
        out
    }
}

/// Draft a plan from the task hints and the sub-agent catalog. Each step's
/// parameters come from hints first, then the owning tool's declared
/// defaults; everything else is flagged as missing.
pub fn draft_plan(task: &Task, subagents: &[SubAgentSpec], registry: &ToolRegistry) -> Plan {
    let mut steps = Vec::new();

    for (id, spec) in subagents.iter().enumerate() {
        let mut params = BTreeMap::new();
        for tool_name in &spec.tools {
            let Some(tool) = registry.get(tool_name) else {
                continue;
            };
            for param in tool.params() {
                let value = hint_value(&task.hints, param.name)
                    .or_else(|| param.default.clone())
                    .map(|value| ParamValue::Given { value })
                    .unwrap_or(ParamValue::Missing);
                params.insert(param.name.to_string(), value);
            }
        }

        steps.push(Step {
            id,
            agent: spec.name.clone(),
            params,
            expected: spec.description.clone(),
            depends_on: Vec::new(),
            status: StepStatus::Pending,
        });
    }

    Plan {
        steps,
        state: PlanState::Drafted,
    }
}

fn hint_value(hints: &TaskHints, param: &str) -> Option<Value> {
    match param {
        "service" => hints.service.as_ref().map(|v| json!(v)),
        "environment" => hints.environment.as_ref().map(|v| json!(v)),
        "window_minutes" => hints.window_minutes.map(|v| json!(v)),
        "branch" => hints.branch.as_ref().map(|v| json!(v)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_services;

    #[test]
    fn extracts_service_and_environment_from_goal_text() {
        let hints = extract_hints(
            "investigate checkout latency spike in prod",
            &default_services(),
        );
        assert_eq!(hints.service.as_deref(), Some("checkout"));
        assert_eq!(hints.environment.as_deref(), Some("prod"));
        assert_eq!(hints.window_minutes, None);
    }

    #[test]
    fn extracts_window_and_branch_tokens() {
        let hints = extract_hints(
            "payment errors in staging over the last 45 minutes on branch release-2",
            &default_services(),
        );
        assert_eq!(hints.service.as_deref(), Some("payment"));
        assert_eq!(hints.environment.as_deref(), Some("staging"));
        assert_eq!(hints.window_minutes, Some(45));
        assert_eq!(hints.branch.as_deref(), Some("release-2"));
    }

    #[test]
    fn uncatalogued_service_falls_back_to_symptom_position() {
        let hints = extract_hints("billing errors in prod", &default_services());
        assert_eq!(hints.service.as_deref(), Some("billing"));
    }

    #[test]
    fn direct_commands_strip_the_leading_verb() {
        let task = Task::from_goal("run make format", &default_services());
        assert_eq!(task.direct_command().as_deref(), Some("make format"));

        let task = Task::from_goal("execute make test", &default_services());
        assert_eq!(task.direct_command().as_deref(), Some("make test"));

        let task = Task::from_goal("investigate checkout latency", &default_services());
        assert_eq!(task.direct_command(), None);
    }
}
