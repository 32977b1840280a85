use crate::capture::{run_and_capture, UserInbox};
use crate::controller::{AnswerOutcome, Controller, ControllerError, FeedbackOutcome, Verdict};
use crate::conversation::{ConversationRound, KnowledgeBaseRound, ScriptedRound};
use crate::knowledge_base::LocalKnowledgeBase;
use crate::notify::{reply_text, CommandNotifier, EscalationRequest, Notifier, OutboxNotifier};
use crate::preferences::{resolve_path, ConversationSource, NotifierConfig, Preferences};
use crate::ticket::new_ticket_id;
use crate::types::{Reply, SessionInput, SessionOutput};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, error, info};

const NO_RESPONSE: &str =
    "No response received from the agents. Please check logs or agent config.";
const RESOLVED: &str = "Great! Happy to help. Thank you for your feedback.";

/// Build the conversation round named by the preferences.
fn build_round(dir: &Path, prefs: &Preferences) -> Result<Box<dyn ConversationRound>> {
    Ok(match &prefs.conversation {
        ConversationSource::KnowledgeBase(file) => {
            let kb = LocalKnowledgeBase::load(&resolve_path(dir, file))?;
            if kb.is_empty() {
                debug!("knowledge base is empty, every issue gets the fallback answer");
            } else {
                debug!(entries = kb.len(), "knowledge base loaded");
            }
            Box::new(KnowledgeBaseRound::new(
                Box::new(kb),
                prefs.max_results,
                prefs.max_rounds,
            ))
        }
        ConversationSource::Script(file) => {
            Box::new(ScriptedRound::load(&resolve_path(dir, file), prefs.max_rounds)?)
        }
    })
}

fn build_notifier(dir: &Path, prefs: &Preferences) -> Result<Box<dyn Notifier>> {
    Ok(match &prefs.notifier {
        NotifierConfig::Outbox(file) => Box::new(OutboxNotifier::new(resolve_path(dir, file))),
        NotifierConfig::Command(argv) => Box::new(CommandNotifier::new(argv)?),
    })
}

/// One user's support session: state, settings and collaborators.
pub struct Session {
    pub prefs: Preferences,
    controller: Controller,
    inbox: UserInbox,
    round: Box<dyn ConversationRound>,
    notifier: Box<dyn Notifier>,
}

impl Session {
    /// Ensure `dir` exists, load preferences, and wire up the configured
    /// conversation round and notifier.
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.exists() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let prefs = Preferences::load(dir)?;
        let template = prefs.load_escalation_template(dir)?;
        let round = build_round(dir, &prefs)?;
        let notifier = build_notifier(dir, &prefs)?;
        Ok(Self::with_collaborators(prefs, &template, round, notifier))
    }

    pub fn with_collaborators(
        prefs: Preferences,
        escalation_template: &str,
        round: Box<dyn ConversationRound>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            prefs,
            controller: Controller::new(escalation_template),
            inbox: UserInbox::new(),
            round,
            notifier,
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Handle one UI event. Failures become `error` replies; the session
    /// stays usable.
    pub fn handle(&mut self, input: &SessionInput) -> SessionOutput {
        let reply = match input {
            SessionInput::Submit { issue } => self.handle_submit(issue),
            SessionInput::Feedback { helpful } => self.handle_feedback(Verdict::from(*helpful)),
            SessionInput::Reset => {
                self.controller.reset();
                Ok(Reply::Reset)
            }
        };
        let reply = reply.unwrap_or_else(|err| {
            error!(error = %format!("{err:#}"), "session event failed");
            Reply::Error {
                message: format!("{err:#}"),
            }
        });
        let state = self.controller.state();
        debug!(
            phase = ?state.phase(),
            has_summary = state.summary().is_some(),
            awaiting_feedback = state.awaiting_feedback(),
            feedback_given = state.feedback_given(),
            "session event handled"
        );
        SessionOutput {
            reply,
            phase: state.phase(),
        }
    }

    // ---------------------------------------------------------------
    // Event handlers
    // ---------------------------------------------------------------

    fn handle_submit(&mut self, issue: &str) -> Result<Reply> {
        match self.controller.submit(issue) {
            Ok(()) => {}
            Err(ControllerError::EmptyIssue) => {
                return Ok(Reply::Rejected {
                    reason: "please describe the issue before submitting".into(),
                });
            }
            Err(err) => return Err(err.into()),
        }

        let issue = self.controller.state().issue().to_string();
        let round = &mut self.round;
        let captured = run_and_capture(&self.inbox, |inbox| round.run(&issue, inbox))
            .context("running conversation round")?;
        debug!(
            captured = captured.len(),
            delivered_total = self.inbox.delivered_count(),
            "conversation round finished"
        );

        Ok(match self.controller.record_answer(&captured)? {
            AnswerOutcome::Answered { summary } => Reply::Answer { summary },
            AnswerOutcome::NoResponse => Reply::NoResponse {
                message: NO_RESPONSE.into(),
            },
        })
    }

    fn handle_feedback(&mut self, verdict: Verdict) -> Result<Reply> {
        let prefix = self.prefs.ticket_prefix.clone();
        let length = self.prefs.ticket_length;
        let outcome = self
            .controller
            .feedback(verdict, || new_ticket_id(&prefix, length))?;

        match outcome {
            FeedbackOutcome::Resolved => Ok(Reply::Resolved {
                message: RESOLVED.into(),
            }),
            FeedbackOutcome::Ignored(reason) => Ok(Reply::Ignored {
                reason: reason.to_string(),
            }),
            FeedbackOutcome::Escalate(escalation) => {
                info!(ticket_id = %escalation.ticket_id, "escalating unresolved issue");
                let request = EscalationRequest {
                    issue: escalation.message,
                };
                let reply = self
                    .notifier
                    .notify(&request)
                    .with_context(|| format!("notifying IT support for {}", escalation.ticket_id))?;
                Ok(Reply::Escalated {
                    notice: format!(
                        "We've escalated the issue to IT support. Ticket ID: {}",
                        escalation.ticket_id
                    ),
                    ticket_id: escalation.ticket_id,
                    reply: reply_text(&reply),
                })
            }
        }
    }
}
