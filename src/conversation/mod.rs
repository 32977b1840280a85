use crate::capture::UserInbox;
use crate::knowledge_base::KnowledgeBase;
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Content that ends a conversation round.
pub const TERMINATION_TOKEN: &str = "TERMINATE";

/// Name the knowledge-base participant speaks under.
pub const KNOWLEDGE_BASE_AGENT: &str = "KnowledgeBaseAgent";

/// A bounded multi-party exchange that answers one issue by delivering
/// messages to the user participant.
pub trait ConversationRound {
    fn run(&mut self, issue: &str, inbox: &UserInbox) -> Result<()>;
}

/// A structured message whose `content` is `TERMINATE` (ignoring case and
/// surrounding whitespace) ends the round.
pub fn is_termination_msg(message: &Value) -> bool {
    message
        .get("content")
        .and_then(Value::as_str)
        .is_some_and(|c| c.trim().eq_ignore_ascii_case(TERMINATION_TOKEN))
}

/// Deliver `messages` to the user until one satisfies the termination
/// predicate or `max_rounds` messages have been delivered. Returns the
/// number delivered.
///
/// The terminating message itself is never delivered, so `TERMINATE` does
/// not reach capture and cannot leak into a marker-less summary. A user
/// proxy that receives before checking termination would show it.
pub fn play(messages: impl IntoIterator<Item = Value>, max_rounds: usize, inbox: &UserInbox) -> usize {
    let mut delivered = 0;
    for message in messages {
        if is_termination_msg(&message) {
            debug!(delivered, "round terminated by participant");
            break;
        }
        if delivered == max_rounds {
            debug!(max_rounds, "round stopped at turn limit");
            break;
        }
        inbox.deliver(message);
        delivered += 1;
    }
    delivered
}

// ===================================================================
// ScriptedRound: replays a JSONL file of messages
// ===================================================================

/// Replays a fixed list of messages for every issue.
pub struct ScriptedRound {
    messages: Vec<Value>,
    max_rounds: usize,
}

impl ScriptedRound {
    pub fn new(messages: Vec<Value>, max_rounds: usize) -> Self {
        Self { messages, max_rounds }
    }

    /// Parse a JSONL script. Returns the messages and any lines that failed
    /// to parse (with 1-based line number and error).
    pub fn parse(contents: &str) -> (Vec<Value>, Vec<(usize, String)>) {
        let mut messages = Vec::new();
        let mut errors = Vec::new();
        for (i, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(val) => messages.push(val),
                Err(e) => errors.push((i + 1, format!("{e}"))),
            }
        }
        (messages, errors)
    }

    pub fn load(path: &Path, max_rounds: usize) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading conversation script {}", path.display()))?;
        let (messages, errors) = Self::parse(&contents);
        for (line, err) in &errors {
            warn!(path = %path.display(), line, %err, "skipping unparseable script line");
        }
        Ok(Self::new(messages, max_rounds))
    }
}

impl ConversationRound for ScriptedRound {
    fn run(&mut self, _issue: &str, inbox: &UserInbox) -> Result<()> {
        play(self.messages.iter().cloned(), self.max_rounds, inbox);
        Ok(())
    }
}

// ===================================================================
// KnowledgeBaseRound: a single participant answering from the KB
// ===================================================================

/// Looks the issue up in a knowledge base and replies with one
/// `Solution:` line per hit, then terminates.
pub struct KnowledgeBaseRound {
    kb: Box<dyn KnowledgeBase>,
    max_results: usize,
    max_rounds: usize,
}

impl KnowledgeBaseRound {
    pub fn new(kb: Box<dyn KnowledgeBase>, max_results: usize, max_rounds: usize) -> Self {
        Self {
            kb,
            max_results,
            max_rounds,
        }
    }

    fn messages(&self, issue: &str) -> Vec<Value> {
        let hits = self.kb.search(issue, self.max_results);
        let answer = if hits.is_empty() {
            "I could not find a similar solution in the knowledge base. \
             Please add more detail about the problem."
                .to_string()
        } else {
            hits.iter()
                .map(|hit| format!("{}: Solution: {}", hit.title, hit.solution))
                .collect::<Vec<_>>()
                .join("\n")
        };
        vec![
            json!({
                "name": KNOWLEDGE_BASE_AGENT,
                "content": format!("Searching the knowledge base for: {issue}"),
            }),
            json!({ "name": KNOWLEDGE_BASE_AGENT, "content": answer }),
            json!({ "name": KNOWLEDGE_BASE_AGENT, "content": TERMINATION_TOKEN }),
        ]
    }
}

impl ConversationRound for KnowledgeBaseRound {
    fn run(&mut self, issue: &str, inbox: &UserInbox) -> Result<()> {
        play(self.messages(issue), self.max_rounds, inbox);
        Ok(())
    }
}
