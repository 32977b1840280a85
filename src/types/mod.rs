use crate::controller::Phase;
use serde::{Deserialize, Serialize};

// ===================================================================
// Input events (one JSON object per stdin line)
// ===================================================================

/// A UI action, discriminated by the `event` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionInput {
    /// "Resolve now" with the issue text.
    Submit { issue: String },
    /// "Yes, resolved" (`true`) or "No, not helpful" (`false`).
    Feedback { helpful: bool },
    /// Abandon the current issue.
    Reset,
}

// ===================================================================
// Output events (one JSON object per stdout line)
// ===================================================================

/// What the UI should show, discriminated by the `status` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    Answer { summary: String },
    NoResponse { message: String },
    Rejected { reason: String },
    Resolved { message: String },
    Escalated {
        ticket_id: String,
        notice: String,
        reply: String,
    },
    Ignored { reason: String },
    Reset,
    Error { message: String },
}

/// A reply plus the session phase after handling the event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionOutput {
    #[serde(flatten)]
    pub reply: Reply,
    pub phase: Phase,
}
