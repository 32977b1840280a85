use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Request handed to the notifier when an issue is escalated. `issue`
/// carries the full rendered escalation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRequest {
    pub issue: String,
}

/// Delivers escalations to IT support.
pub trait Notifier {
    /// Send the request; the reply is usually `{"content": "..."}` but any
    /// JSON value is accepted.
    fn notify(&mut self, request: &EscalationRequest) -> Result<Value>;
}

/// Render a notifier reply for display. Structured replies contribute
/// their `content`; anything else is shown as its string rendering.
pub fn reply_text(reply: &Value) -> String {
    match reply {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("content") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => reply.to_string(),
        },
        other => other.to_string(),
    }
}

// ===================================================================
// OutboxNotifier: append requests to a JSONL file
// ===================================================================

pub struct OutboxNotifier {
    path: PathBuf,
}

impl OutboxNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Notifier for OutboxNotifier {
    fn notify(&mut self, request: &EscalationRequest) -> Result<Value> {
        let line = serde_json::to_string(request).context("serializing escalation request")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening outbox {}", self.path.display()))?;
        writeln!(file, "{line}").with_context(|| format!("writing {}", self.path.display()))?;
        Ok(json!({
            "content": format!("Escalation queued in {}", self.path.display()),
        }))
    }
}

// ===================================================================
// CommandNotifier: pipe requests to an external program
// ===================================================================

/// Runs `program args...` per escalation with the request JSON on stdin.
/// Stdout is parsed as JSON when possible and taken as plain text otherwise.
pub struct CommandNotifier {
    program: String,
    args: Vec<String>,
}

impl CommandNotifier {
    pub fn new(argv: &[String]) -> Result<Self> {
        let Some((program, args)) = argv.split_first() else {
            bail!("notifier command is empty");
        };
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl Notifier for CommandNotifier {
    fn notify(&mut self, request: &EscalationRequest) -> Result<Value> {
        let payload = serde_json::to_vec(request).context("serializing escalation request")?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawning notifier {}", self.program))?;

        child
            .stdin
            .take()
            .context("notifier stdin unavailable")?
            .write_all(&payload)
            .with_context(|| format!("writing request to {}", self.program))?;

        let output = child
            .wait_with_output()
            .with_context(|| format!("waiting for notifier {}", self.program))?;
        if !output.status.success() {
            bail!(
                "notifier {} failed ({}): {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        Ok(serde_json::from_str(stdout).unwrap_or_else(|_| Value::String(stdout.to_string())))
    }
}
