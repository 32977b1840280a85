use crate::ticket;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const FILENAME: &str = "helpx.toml";

pub const DEFAULT_ESCALATION_TEMPLATE: &str =
    "Escalation: 🚨Unresolved IT issue\n\nUser reported: '{{ issue }}'\n📄 Ticket ID: {{ ticket_id }}";

/// Escalation message template: either an inline Jinja2 string or a path to
/// a template file (relative to the data directory).
///
/// In TOML this looks like one of:
///
/// ```toml
/// [escalation_template]
/// inline = "Ticket {{ ticket_id }}: {{ issue }}"
///
/// # or
///
/// [escalation_template]
/// file = "escalation.tmpl"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTemplate {
    Inline(String),
    File(String),
}

impl Default for EscalationTemplate {
    fn default() -> Self {
        EscalationTemplate::Inline(DEFAULT_ESCALATION_TEMPLATE.into())
    }
}

/// Which conversation round answers submitted issues.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationSource {
    /// Query a local knowledge base file.
    KnowledgeBase(String),
    /// Replay a JSONL file of messages.
    Script(String),
}

impl Default for ConversationSource {
    fn default() -> Self {
        ConversationSource::KnowledgeBase("knowledge_base.toml".into())
    }
}

/// Where escalations are sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum NotifierConfig {
    /// Append to a JSONL outbox file.
    Outbox(String),
    /// Pipe the request to an external program: `[program, args...]`.
    Command(Vec<String>),
}

impl Default for NotifierConfig {
    fn default() -> Self {
        NotifierConfig::Outbox("escalations.jsonl".into())
    }
}

/// Settings stored in `<data-dir>/helpx.toml`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_ticket_prefix")]
    pub ticket_prefix: String,

    #[serde(default = "default_ticket_length")]
    pub ticket_length: usize,

    /// Upper bound on messages exchanged in one conversation round.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// Knowledge-base hits offered per issue.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    #[serde(default)]
    pub escalation_template: EscalationTemplate,

    #[serde(default)]
    pub conversation: ConversationSource,

    #[serde(default)]
    pub notifier: NotifierConfig,
}

fn default_ticket_prefix() -> String {
    ticket::DEFAULT_PREFIX.into()
}

fn default_ticket_length() -> usize {
    ticket::DEFAULT_LENGTH
}

fn default_max_rounds() -> usize {
    6
}

fn default_max_results() -> usize {
    3
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            ticket_prefix: default_ticket_prefix(),
            ticket_length: default_ticket_length(),
            max_rounds: default_max_rounds(),
            max_results: default_max_results(),
            escalation_template: EscalationTemplate::default(),
            conversation: ConversationSource::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

impl Preferences {
    /// Load preferences from `<dir>/helpx.toml`.
    ///
    /// If the file doesn't exist it is created with defaults. Missing keys
    /// in an existing file are filled in with defaults via serde.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(FILENAME);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let prefs: Preferences = toml::from_str(&contents)
                    .with_context(|| format!("parsing {}", path.display()))?;
                Ok(prefs)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let prefs = Preferences::default();
                prefs.save(dir)?;
                Ok(prefs)
            }
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    /// Write these preferences to `<dir>/helpx.toml`, replacing any existing file.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(FILENAME);
        let toml_str = toml::to_string_pretty(self).context("serializing preferences")?;
        fs::write(&path, toml_str).with_context(|| format!("writing {}", path.display()))
    }

    /// Resolve the escalation template to a string.
    pub fn load_escalation_template(&self, dir: &Path) -> Result<String> {
        match &self.escalation_template {
            EscalationTemplate::Inline(s) => Ok(s.clone()),
            EscalationTemplate::File(filename) => {
                let path = dir.join(filename);
                fs::read_to_string(&path)
                    .with_context(|| format!("reading template {}", path.display()))
            }
        }
    }
}

/// Resolve a configured path against the data directory.
pub fn resolve_path(dir: &Path, configured: &str) -> PathBuf {
    dir.join(configured)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences::load(dir.path()).unwrap();
        assert_eq!(prefs.ticket_prefix, "TKT");
        assert_eq!(prefs.ticket_length, 6);
        assert_eq!(prefs.max_rounds, 6);
        assert!(dir.path().join(FILENAME).exists());

        // Reloading the written file yields the same settings.
        let again = Preferences::load(dir.path()).unwrap();
        assert_eq!(again.escalation_template, EscalationTemplate::default());
        assert_eq!(again.conversation, ConversationSource::default());
        assert_eq!(again.notifier, NotifierConfig::default());
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(FILENAME),
            "ticket_prefix = \"INC\"\n\n[notifier]\ncommand = [\"mailer\", \"--to\", \"it@example.com\"]\n",
        )
        .unwrap();
        let prefs = Preferences::load(dir.path()).unwrap();
        assert_eq!(prefs.ticket_prefix, "INC");
        assert_eq!(prefs.ticket_length, 6);
        assert_eq!(
            prefs.notifier,
            NotifierConfig::Command(vec!["mailer".into(), "--to".into(), "it@example.com".into()])
        );
        assert_eq!(prefs.conversation, ConversationSource::default());
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(FILENAME), "ticket_length = \"six\"").unwrap();
        let err = Preferences::load(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("parsing"));
    }

    #[test]
    fn template_from_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("esc.tmpl"), "{{ ticket_id }}").unwrap();
        let prefs = Preferences {
            escalation_template: EscalationTemplate::File("esc.tmpl".into()),
            ..Preferences::default()
        };
        assert_eq!(prefs.load_escalation_template(dir.path()).unwrap(), "{{ ticket_id }}");
    }

    #[test]
    fn missing_template_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences {
            escalation_template: EscalationTemplate::File("nope.tmpl".into()),
            ..Preferences::default()
        };
        assert!(prefs.load_escalation_template(dir.path()).is_err());
    }
}
