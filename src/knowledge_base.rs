use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use tracing::warn;

/// One known problem and its fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub title: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub solution: String,
}

/// Search over known solutions, used by the knowledge-base participant.
pub trait KnowledgeBase {
    /// Entries relevant to `query`, best first, at most `limit`.
    fn search(&self, query: &str, limit: usize) -> Vec<KnowledgeEntry>;
}

/// On-disk layout: a list of `[[entry]]` tables.
#[derive(Debug, Default, Serialize, Deserialize)]
struct KnowledgeBaseFile {
    #[serde(default, rename = "entry")]
    entries: Vec<KnowledgeEntry>,
}

/// Keyword-scored knowledge base loaded from a TOML file.
#[derive(Debug, Default)]
pub struct LocalKnowledgeBase {
    entries: Vec<KnowledgeEntry>,
}

impl LocalKnowledgeBase {
    pub fn new(entries: Vec<KnowledgeEntry>) -> Self {
        Self { entries }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let file: KnowledgeBaseFile = toml::from_str(contents)?;
        Ok(Self::new(file.entries))
    }

    /// Load from `path`. A missing file yields an empty knowledge base.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                Self::parse(&contents).with_context(|| format!("parsing {}", path.display()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "knowledge base not found, continuing without one");
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        let file = KnowledgeBaseFile {
            entries: self.entries.clone(),
        };
        toml::to_string_pretty(&file).context("serializing knowledge base")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A starter set of common desk-side issues, written by `helpx init`.
    pub fn sample() -> Self {
        let entry = |title: &str, keywords: &[&str], solution: &str| KnowledgeEntry {
            title: title.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            solution: solution.into(),
        };
        Self::new(vec![
            entry(
                "Outlook crashes on startup",
                &["outlook", "crash"],
                "Start Outlook in safe mode (outlook.exe /safe) and disable recently added add-ins.",
            ),
            entry(
                "Outlook profile corrupted",
                &["outlook", "profile"],
                "Create a new mail profile from Control Panel > Mail and set it as default.",
            ),
            entry(
                "Print jobs stuck in queue",
                &["printer", "print", "queue", "spooler"],
                "Restart the Print Spooler service and clear the print queue.",
            ),
            entry(
                "VPN disconnects",
                &["vpn", "disconnect"],
                "Update the VPN client and switch the connection protocol to TCP.",
            ),
            entry(
                "Forgotten password",
                &["password", "locked", "login"],
                "Reset your password from the self-service portal; accounts unlock after 15 minutes.",
            ),
            entry(
                "Slow laptop",
                &["slow", "laptop", "performance"],
                "Restart the machine, install pending updates and close unused startup apps.",
            ),
        ])
    }
}

impl KnowledgeBase for LocalKnowledgeBase {
    fn search(&self, query: &str, limit: usize) -> Vec<KnowledgeEntry> {
        let query = query.to_lowercase();
        let mut scored: Vec<(usize, &KnowledgeEntry)> = self
            .entries
            .iter()
            .map(|entry| {
                let score = entry
                    .keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty() && query.contains(k.as_str()))
                    .count();
                (score, entry)
            })
            .filter(|(score, _)| *score > 0)
            .collect();
        // Stable sort keeps file order among equal scores.
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(limit)
            .map(|(_, entry)| entry.clone())
            .collect()
    }
}
