use crate::extract::extract_solutions;
use minijinja::{context, Environment};
use serde::Serialize;
use std::fmt;

/// Separator placed between captured messages before extraction.
pub const TRANSCRIPT_SEPARATOR: &str = "\n\n---\n\n";

// ===================================================================
// Session state
// ===================================================================

/// Where the current issue sits in the answer/feedback flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    AwaitingAnswer,
    AwaitingFeedback,
    Resolved,
    Escalated,
}

/// The user's answer to "was this solution helpful?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Helpful,
    NotHelpful,
}

impl From<bool> for Verdict {
    fn from(helpful: bool) -> Self {
        if helpful { Verdict::Helpful } else { Verdict::NotHelpful }
    }
}

/// Per-session record. Reset on every new issue.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    issue: String,
    summary: Option<String>,
    awaiting_feedback: bool,
    feedback_given: bool,
    phase: Phase,
}

impl SessionState {
    pub fn issue(&self) -> &str {
        &self.issue
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn awaiting_feedback(&self) -> bool {
        self.awaiting_feedback
    }

    pub fn feedback_given(&self) -> bool {
        self.feedback_given
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }
}

// ===================================================================
// Outcomes
// ===================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// A summary was produced and the session now waits for feedback.
    Answered { summary: String },
    /// The round delivered nothing to the user.
    NoResponse,
}

/// Ticket and rendered message to hand to the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escalation {
    pub ticket_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoredFeedback {
    /// No summary has been shown for the current issue.
    NoAnswer,
    /// Feedback was already recorded for the current issue.
    AlreadyGiven,
}

impl fmt::Display for IgnoredFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoredFeedback::NoAnswer => write!(f, "no answer is awaiting feedback"),
            IgnoredFeedback::AlreadyGiven => write!(f, "feedback already recorded for this issue"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackOutcome {
    Resolved,
    Escalate(Escalation),
    Ignored(IgnoredFeedback),
}

// ===================================================================
// Errors
// ===================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    EmptyIssue,
    /// An answer arrived while no issue was waiting for one.
    NotAwaitingAnswer(Phase),
    TemplateRender(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::EmptyIssue => write!(f, "issue text is empty"),
            ControllerError::NotAwaitingAnswer(phase) => {
                write!(f, "no issue is awaiting an answer (phase: {phase:?})")
            }
            ControllerError::TemplateRender(msg) => write!(f, "template render error: {msg}"),
        }
    }
}

impl std::error::Error for ControllerError {}

// ===================================================================
// Controller
// ===================================================================

/// Sequences one issue through answer, feedback and escalation.
///
/// Pure bookkeeping: running the conversation round and calling the
/// notifier are left to the caller.
pub struct Controller {
    state: SessionState,
    escalation_template: String,
}

impl Controller {
    pub fn new(escalation_template: impl Into<String>) -> Self {
        Self {
            state: SessionState::default(),
            escalation_template: escalation_template.into(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Start a new issue. Clears any previous summary and feedback.
    pub fn submit(&mut self, issue: &str) -> Result<(), ControllerError> {
        let issue = issue.trim();
        if issue.is_empty() {
            return Err(ControllerError::EmptyIssue);
        }
        self.state = SessionState {
            issue: issue.to_string(),
            phase: Phase::AwaitingAnswer,
            ..SessionState::default()
        };
        Ok(())
    }

    /// Record what the round delivered to the user for the current issue.
    pub fn record_answer(&mut self, captured: &[String]) -> Result<AnswerOutcome, ControllerError> {
        if self.state.phase != Phase::AwaitingAnswer {
            return Err(ControllerError::NotAwaitingAnswer(self.state.phase));
        }
        if captured.is_empty() {
            return Ok(AnswerOutcome::NoResponse);
        }

        let combined = captured.join(TRANSCRIPT_SEPARATOR);
        let mut summary = extract_solutions(Some(&combined));
        if summary.is_empty() {
            summary = combined;
        }

        self.state.summary = Some(summary.clone());
        self.state.awaiting_feedback = true;
        self.state.feedback_given = false;
        self.state.phase = Phase::AwaitingFeedback;
        Ok(AnswerOutcome::Answered { summary })
    }

    /// Apply the user's verdict. Fires at most once per issue; later calls
    /// are reported as ignored. `mint_ticket` is only called on escalation.
    pub fn feedback(
        &mut self,
        verdict: Verdict,
        mint_ticket: impl FnOnce() -> String,
    ) -> Result<FeedbackOutcome, ControllerError> {
        if self.state.feedback_given {
            return Ok(FeedbackOutcome::Ignored(IgnoredFeedback::AlreadyGiven));
        }
        if !self.state.awaiting_feedback || self.state.summary.is_none() {
            return Ok(FeedbackOutcome::Ignored(IgnoredFeedback::NoAnswer));
        }

        let (phase, outcome) = match verdict {
            Verdict::Helpful => (Phase::Resolved, FeedbackOutcome::Resolved),
            Verdict::NotHelpful => {
                let ticket_id = mint_ticket();
                let message = render_escalation_message(
                    &self.escalation_template,
                    &self.state.issue,
                    &ticket_id,
                )?;
                (
                    Phase::Escalated,
                    FeedbackOutcome::Escalate(Escalation { ticket_id, message }),
                )
            }
        };

        self.state.feedback_given = true;
        self.state.awaiting_feedback = false;
        self.state.phase = phase;
        Ok(outcome)
    }

    /// Drop the current issue and return to `Idle`.
    pub fn reset(&mut self) {
        self.state = SessionState::default();
    }
}

// ===================================================================
// Template rendering (pure computation)
// ===================================================================

pub fn render_escalation_message(
    template: &str,
    issue: &str,
    ticket_id: &str,
) -> Result<String, ControllerError> {
    let env = Environment::new();
    let tmpl = env
        .template_from_str(template)
        .map_err(|e| ControllerError::TemplateRender(format!("parsing template: {e}")))?;
    tmpl.render(context! { issue, ticket_id })
        .map_err(|e| ControllerError::TemplateRender(format!("rendering template: {e}")))
}
