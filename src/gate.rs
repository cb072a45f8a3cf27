/// Approval gate for side-effecting tool calls.
///
/// Gated calls never execute directly: they become an [`Interrupt`] holding
/// the proposed action requests, and the run suspends until an external
/// decision arrives. The state machine is `proposed -> approved | rejected`,
/// terminal either way; a pending interrupt never auto-resolves.
use std::collections::BTreeSet;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PROTOCOL_VIOLATION;
use crate::telemetry::unix_ms_now;
use crate::tools::ToolCall;

// ---------------------------------------------------------------------------
// Wildcard pattern matching (simple glob: `*` matches any char sequence)
// ---------------------------------------------------------------------------

/// Match a tool name against a pattern that may contain `*` wildcards.
/// Examples: `collect_*` matches `collect_logs`.
pub fn matches_wildcard(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == name;
    }
    let mut remaining = name;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !remaining.starts_with(part) {
                return false;
            }
            remaining = &remaining[part.len()..];
        } else if i == parts.len() - 1 {
            if !remaining.ends_with(part) {
                return false;
            }
            return true;
        } else {
            match remaining.find(part) {
                Some(pos) => remaining = &remaining[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

/// Check if any pattern in the list matches the given tool name.
pub fn any_pattern_matches(patterns: &[String], name: &str) -> bool {
    patterns.iter().any(|p| matches_wildcard(p, name))
}

// ---------------------------------------------------------------------------
// Interrupt records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptStatus {
    Pending,
    Approved,
    Rejected,
}

/// One proposed tool invocation inside an interrupt batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub tool: String,
    pub args: Value,
    /// Plan step that proposed the action; `None` for direct actions.
    pub step_id: Option<usize>,
}

impl ActionRequest {
    pub fn from_call(call: ToolCall, step_id: Option<usize>) -> Self {
        Self {
            tool: call.tool,
            args: call.args,
            step_id,
        }
    }
}

/// A suspended approval decision. Owned by the gate until resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interrupt {
    pub id: String,
    pub action_requests: Vec<ActionRequest>,
    pub status: InterruptStatus,
    pub raised_at: DateTime<Utc>,
}

/// External decision for a single action request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDecision {
    pub approve: bool,
    /// Replacement arguments to execute with, when the approver edited them.
    pub edited_args: Option<Value>,
    pub reason: Option<String>,
}

impl RequestDecision {
    pub fn approve() -> Self {
        Self {
            approve: true,
            edited_args: None,
            reason: None,
        }
    }

    pub fn approve_with_args(args: Value) -> Self {
        Self {
            approve: true,
            edited_args: Some(args),
            reason: None,
        }
    }

    pub fn reject(reason: Option<String>) -> Self {
        Self {
            approve: false,
            edited_args: None,
            reason,
        }
    }
}

/// Outcome of a resolved action request: for approvals `request.args` already
/// carries any edits; rejections carry the optional reason.
#[derive(Debug, Clone)]
pub struct ResolvedAction {
    pub request: ActionRequest,
    pub approved: bool,
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

pub struct ApprovalGate {
    gated_patterns: Vec<String>,
    trusted: BTreeSet<String>,
    auto_approve: bool,
    pending: Option<Interrupt>,
    raised_count: u64,
}

impl ApprovalGate {
    pub fn new(gated_patterns: Vec<String>, trusted: Vec<String>, auto_approve: bool) -> Self {
        Self {
            gated_patterns,
            trusted: trusted.into_iter().collect(),
            auto_approve,
            pending: None,
            raised_count: 0,
        }
    }

    pub fn auto_approve(&self) -> bool {
        self.auto_approve
    }

    pub fn set_auto_approve(&mut self, enabled: bool) {
        self.auto_approve = enabled;
    }

    /// Trust a tool for the remainder of the session (skip future gating).
    pub fn trust_tool(&mut self, name: &str) {
        self.trusted.insert(name.to_string());
    }

    pub fn gated_patterns(&self) -> &[String] {
        &self.gated_patterns
    }

    /// Whether a call to this tool must pass through the gate.
    pub fn requires_approval(&self, tool_name: &str) -> bool {
        !self.trusted.contains(tool_name) && any_pattern_matches(&self.gated_patterns, tool_name)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&Interrupt> {
        self.pending.as_ref()
    }

    /// Reload a pending interrupt persisted by a previous process.
    pub fn restore(&mut self, interrupt: Interrupt) -> Result<()> {
        if self.pending.is_some() {
            bail!("{PROTOCOL_VIOLATION}: an interrupt is already pending");
        }
        if interrupt.status != InterruptStatus::Pending {
            bail!("{PROTOCOL_VIOLATION}: cannot restore a resolved interrupt");
        }
        self.pending = Some(interrupt);
        Ok(())
    }

    /// Raise an interrupt for a batch of gated calls. The run owning this
    /// gate must suspend until [`ApprovalGate::resolve`] is called.
    pub fn raise(&mut self, action_requests: Vec<ActionRequest>) -> Result<Interrupt> {
        if action_requests.is_empty() {
            bail!("{PROTOCOL_VIOLATION}: cannot raise an interrupt with no action requests");
        }
        if self.pending.is_some() {
            bail!("{PROTOCOL_VIOLATION}: an interrupt is already pending");
        }

        self.raised_count += 1;
        let interrupt = Interrupt {
            id: format!("int-{}-{}", unix_ms_now(), self.raised_count),
            action_requests,
            status: InterruptStatus::Pending,
            raised_at: Utc::now(),
        };
        self.pending = Some(interrupt.clone());
        Ok(interrupt)
    }

    /// Resolve the pending interrupt exactly once. A second resolution
    /// attempt, an unknown id, or a decision-count mismatch is refused.
    pub fn resolve(
        &mut self,
        interrupt_id: &str,
        decisions: Vec<RequestDecision>,
    ) -> Result<Vec<ResolvedAction>> {
        let Some(pending) = self.pending.as_ref() else {
            bail!("{PROTOCOL_VIOLATION}: no pending interrupt to resolve");
        };
        if pending.id != interrupt_id {
            bail!(
                "{PROTOCOL_VIOLATION}: interrupt '{interrupt_id}' is not pending (current: '{}')",
                pending.id
            );
        }
        if decisions.len() != pending.action_requests.len() {
            bail!(
                "{PROTOCOL_VIOLATION}: expected {} decision(s), got {}",
                pending.action_requests.len(),
                decisions.len()
            );
        }

        let mut interrupt = self.pending.take().expect("pending checked above");
        let mut resolved = Vec::with_capacity(decisions.len());
        let mut any_approved = false;

        for (mut request, decision) in interrupt.action_requests.drain(..).zip(decisions) {
            if decision.approve {
                any_approved = true;
                if let Some(edited) = decision.edited_args {
                    request.args = edited;
                }
            }
            resolved.push(ResolvedAction {
                request,
                approved: decision.approve,
                reason: decision.reason,
            });
        }

        interrupt.status = if any_approved {
            InterruptStatus::Approved
        } else {
            InterruptStatus::Rejected
        };
        tracing::info!(
            interrupt = %interrupt_id,
            status = ?interrupt.status,
            "interrupt resolved"
        );
        Ok(resolved)
    }

    /// Resolve every pending request with the same verdict.
    pub fn resolve_all(&mut self, interrupt_id: &str, approve: bool) -> Result<Vec<ResolvedAction>> {
        let count = self
            .pending
            .as_ref()
            .map(|interrupt| interrupt.action_requests.len())
            .unwrap_or(0);
        let decision = if approve {
            RequestDecision::approve()
        } else {
            RequestDecision::reject(None)
        };
        self.resolve(interrupt_id, vec![decision; count.max(1)])
    }

    /// Abandon the pending interrupt as rejected-by-cancellation.
    pub fn cancel(&mut self) -> Option<Interrupt> {
        let mut interrupt = self.pending.take()?;
        interrupt.status = InterruptStatus::Rejected;
        tracing::info!(interrupt = %interrupt.id, "interrupt abandoned by cancellation");
        Some(interrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shell_request(command: &str) -> ActionRequest {
        ActionRequest {
            tool: "execute_shell".to_string(),
            args: json!({"command": command}),
            step_id: None,
        }
    }

    #[test]
    fn gated_patterns_support_wildcards() {
        let gate = ApprovalGate::new(
            vec!["collect_*".to_string(), "execute_shell".to_string()],
            Vec::new(),
            false,
        );
        assert!(gate.requires_approval("collect_logs"));
        assert!(gate.requires_approval("execute_shell"));
        assert!(!gate.requires_approval("fs_read"));
    }

    #[test]
    fn trusted_tools_skip_the_gate() {
        let mut gate = ApprovalGate::new(vec!["execute_shell".to_string()], Vec::new(), false);
        assert!(gate.requires_approval("execute_shell"));
        gate.trust_tool("execute_shell");
        assert!(!gate.requires_approval("execute_shell"));
    }

    #[test]
    fn resolution_is_single_shot() {
        let mut gate = ApprovalGate::new(vec!["execute_shell".to_string()], Vec::new(), false);
        let interrupt = gate.raise(vec![shell_request("make format")]).unwrap();

        let resolved = gate
            .resolve(&interrupt.id, vec![RequestDecision::approve()])
            .unwrap();
        assert!(resolved[0].approved);

        let second = gate.resolve(&interrupt.id, vec![RequestDecision::approve()]);
        assert!(second.is_err());
        assert!(second.unwrap_err().to_string().contains("no pending interrupt"));
    }

    #[test]
    fn edited_args_replace_the_originals() {
        let mut gate = ApprovalGate::new(vec!["execute_shell".to_string()], Vec::new(), false);
        let interrupt = gate.raise(vec![shell_request("make format")]).unwrap();

        let resolved = gate
            .resolve(
                &interrupt.id,
                vec![RequestDecision::approve_with_args(
                    json!({"command": "make fmt"}),
                )],
            )
            .unwrap();
        assert_eq!(resolved[0].request.args["command"], json!("make fmt"));
    }

    #[test]
    fn cancel_rejects_the_pending_batch() {
        let mut gate = ApprovalGate::new(vec!["execute_shell".to_string()], Vec::new(), false);
        let raised = gate.raise(vec![shell_request("make format")]).unwrap();

        let cancelled = gate.cancel().unwrap();
        assert_eq!(cancelled.id, raised.id);
        assert_eq!(cancelled.status, InterruptStatus::Rejected);
        assert!(!gate.has_pending());
    }

    #[test]
    fn restore_refuses_resolved_interrupts() {
        let mut gate = ApprovalGate::new(vec!["execute_shell".to_string()], Vec::new(), false);
        let mut interrupt = gate.raise(vec![shell_request("ls")]).unwrap();
        gate.cancel();

        interrupt.status = InterruptStatus::Approved;
        assert!(gate.restore(interrupt).is_err());
    }
}
