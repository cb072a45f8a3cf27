use std::collections::HashMap;

use tokio::sync::mpsc;

pub const NO_TEXTUAL_RESPONSE: &str = "No textual response produced by the agent.";

/// Events emitted while a triage run progresses. Token chunks stream as they
/// arrive; progress notices mark phase transitions between steps.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    Progress {
        phase: String,
        detail: String,
    },
    Token {
        author: String,
        text: String,
        partial: bool,
        is_final: bool,
    },
    ToolRequested {
        author: String,
        tool: String,
    },
    ToolCompleted {
        author: String,
        tool: String,
        ok: bool,
    },
}

pub type EventSender = mpsc::UnboundedSender<AgentEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<AgentEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Send helper that tolerates a dropped receiver (headless runs).
pub fn emit(events: &EventSender, event: AgentEvent) {
    let _ = events.send(event);
}

pub fn emit_progress(events: &EventSender, phase: &str, detail: impl Into<String>) {
    emit(
        events,
        AgentEvent::Progress {
            phase: phase.to_string(),
            detail: detail.into(),
        },
    );
}

// ---------------------------------------------------------------------------
// Author-keyed text merging
// ---------------------------------------------------------------------------

/// Tracks streamed text per author and computes printable deltas, so partial
/// chunks followed by a final snapshot of the same text print only once.
#[derive(Default, Debug)]
pub struct AuthorTextTracker {
    pub latest_final_text: Option<String>,
    pub latest_final_author: Option<String>,
    pub last_textful_author: Option<String>,
    pub by_author: HashMap<String, String>,
}

impl AuthorTextTracker {
    pub fn ingest(&mut self, author: &str, text: &str, partial: bool, is_final: bool) -> String {
        if text.is_empty() {
            return String::new();
        }

        self.last_textful_author = Some(author.to_string());
        let buffer = self.by_author.entry(author.to_string()).or_default();
        let delta = ingest_author_text(buffer, text, partial, is_final);

        if is_final && !text.trim().is_empty() {
            self.latest_final_text = Some(text.to_string());
            self.latest_final_author = Some(author.to_string());
        }

        delta
    }

    pub fn resolve_text(&self) -> Option<String> {
        if let Some(final_text) = &self.latest_final_text {
            return Some(final_text.clone());
        }

        let author = self.last_textful_author.as_ref()?;
        let text = self.by_author.get(author)?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }

        Some(trimmed.to_string())
    }
}

pub fn ingest_author_text(buffer: &mut String, text: &str, partial: bool, is_final: bool) -> String {
    if text.is_empty() {
        return String::new();
    }

    if partial {
        buffer.push_str(text);
        return text.to_string();
    }

    if buffer.is_empty() {
        buffer.push_str(text);
        return text.to_string();
    }

    if text == buffer.as_str() {
        return String::new();
    }

    if text.starts_with(buffer.as_str()) {
        let delta = text[buffer.len()..].to_string();
        *buffer = text.to_string();
        return delta;
    }

    // Final snapshots are authoritative. Keep them as state but do not
    // re-print after partial streaming has already emitted the text.
    if is_final {
        *buffer = text.to_string();
        return String::new();
    }

    let overlap = suffix_prefix_overlap(buffer, text);
    if overlap >= text.len() {
        return String::new();
    }

    let delta = text[overlap..].to_string();
    buffer.push_str(&delta);
    delta
}

pub fn suffix_prefix_overlap(existing: &str, incoming: &str) -> usize {
    let max_len = existing.len().min(incoming.len());
    let mut boundaries = incoming
        .char_indices()
        .map(|(idx, _)| idx)
        .collect::<Vec<usize>>();
    boundaries.push(incoming.len());

    for boundary in boundaries.into_iter().rev() {
        if boundary == 0 || boundary > max_len {
            continue;
        }
        if existing.ends_with(&incoming[..boundary]) {
            return boundary;
        }
    }

    0
}
