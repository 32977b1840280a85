use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, warn};

// ===================================================================
// Payload extraction: messages arrive in heterogeneous shapes
// ===================================================================

/// A delivered message whose payload could not be read as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// The selected payload field holds something other than text or a record.
    NotText { field: &'static str, kind: &'static str },
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::NotText { field, kind } => {
                write!(f, "`{field}` holds a {kind}, expected text")
            }
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "record",
    }
}

/// Empty strings, empty containers, `false`, zero and null all count as
/// "not present" when choosing between fallback fields.
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// First field of `record` (in `fields` order) holding a truthy value.
fn first_present<'a>(
    record: &'a Map<String, Value>,
    fields: &[&'static str],
) -> Option<(&'static str, &'a Value)> {
    fields
        .iter()
        .find_map(|&f| record.get(f).filter(|v| !is_falsy(v)).map(|v| (f, v)))
}

fn as_text(field: &'static str, value: &Value) -> Result<String, PayloadError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(PayloadError::NotText {
            field,
            kind: kind_of(other),
        }),
    }
}

/// Pull the displayable text out of a delivered message.
///
/// Records are read through `content`, then `output`; a nested record is
/// read through `text`, then `message`, then rendered whole. Anything that
/// is not a record is rendered as a string. Returns `Ok(None)` when the
/// payload is missing or blank after trimming.
pub fn message_payload(message: &Value) -> Result<Option<String>, PayloadError> {
    let text = match message {
        Value::Null => return Ok(None),
        Value::Object(record) => {
            let Some((field, content)) = first_present(record, &["content", "output"]) else {
                return Ok(None);
            };
            match content {
                Value::Object(nested) => match first_present(nested, &["text", "message"]) {
                    Some((inner_field, inner)) => as_text(inner_field, inner)?,
                    None => content.to_string(),
                },
                other => as_text(field, other)?,
            }
        }
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let trimmed = text.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

// ===================================================================
// UserInbox: the user participant's delivery path
// ===================================================================

type Tap = Box<dyn FnMut(&Value)>;

/// Delivery endpoint for messages addressed to the user participant.
///
/// The inbox keeps no messages, only a count of deliveries. Taps observe
/// deliveries without changing them; each tap lives exactly as long as the
/// [`TapGuard`] returned when it was installed.
#[derive(Default)]
pub struct UserInbox {
    delivered: Cell<usize>,
    taps: RefCell<Vec<(u64, Tap)>>,
    next_tap: Cell<u64>,
}

impl UserInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message: every tap observes it unchanged, then it is counted.
    ///
    /// Taps run while the tap list is borrowed, so a tap must not call back
    /// into the same inbox (`deliver` or `install_tap` would panic).
    pub fn deliver(&self, message: Value) {
        debug!(taps = self.tap_count(), "delivering message to user");
        for (_, tap) in self.taps.borrow_mut().iter_mut() {
            tap(&message);
        }
        self.delivered.set(self.delivered.get() + 1);
    }

    /// Messages delivered since the inbox was created.
    pub fn delivered_count(&self) -> usize {
        self.delivered.get()
    }

    pub fn tap_count(&self) -> usize {
        self.taps.borrow().len()
    }

    /// Register an observer on deliveries. Dropping the guard unregisters it.
    pub fn install_tap(&self, tap: impl FnMut(&Value) + 'static) -> TapGuard<'_> {
        let id = self.next_tap.get();
        self.next_tap.set(id + 1);
        self.taps.borrow_mut().push((id, Box::new(tap)));
        TapGuard { inbox: self, id }
    }
}

/// Keeps a tap installed; removes it on drop, including during unwinding.
pub struct TapGuard<'a> {
    inbox: &'a UserInbox,
    id: u64,
}

impl Drop for TapGuard<'_> {
    fn drop(&mut self) {
        self.inbox.taps.borrow_mut().retain(|(id, _)| *id != self.id);
    }
}

// ===================================================================
// run_and_capture
// ===================================================================

/// Run one conversation round and collect the text of every message the
/// user participant receives during it.
///
/// Messages whose payload cannot be read are logged and skipped. The tap is
/// removed before this returns, whether the round succeeds, fails or panics.
pub fn run_and_capture<F>(inbox: &UserInbox, round: F) -> anyhow::Result<Vec<String>>
where
    F: FnOnce(&UserInbox) -> anyhow::Result<()>,
{
    let captured: Rc<RefCell<Vec<String>>> = Rc::default();
    let sink = Rc::clone(&captured);
    let guard = inbox.install_tap(move |message| match message_payload(message) {
        Ok(Some(text)) => sink.borrow_mut().push(text),
        Ok(None) => {}
        Err(err) => warn!(%err, "skipping message with unreadable payload"),
    });

    let outcome = round(inbox);
    drop(guard);
    outcome?;

    Ok(captured.take())
}

#[cfg(test)]
mod tests;
