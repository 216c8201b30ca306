//! Static trigger → fact table lookup.
//!
//! The table is a JSON array of `{ "triggers": [..], "content": ".." }` read
//! from disk on every call so operators can edit it without a restart. A
//! missing or malformed file degrades to "no facts".

use super::normalize::{normalize, tokens};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One row of the knowledge table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnowledgeEntry {
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub content: String,
}

pub struct KnowledgeMatcher {
    path: PathBuf,
}

impl KnowledgeMatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Concatenated content of every matching entry, in table order.
    /// Returns an empty string when nothing matches or the table is unusable.
    pub async fn lookup(&self, query: &str) -> String {
        let Some(entries) = self.load().await else {
            return String::new();
        };
        match_entries(&entries, query).join("\n")
    }

    async fn load(&self) -> Option<Vec<KnowledgeEntry>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Knowledge table not found at {}", self.path.display());
                return None;
            }
            Err(e) => {
                tracing::error!("Failed to read knowledge table {}: {e}", self.path.display());
                return None;
            }
        };

        match serde_json::from_str::<Vec<KnowledgeEntry>>(&raw) {
            Ok(entries) => Some(entries),
            Err(e) => {
                tracing::error!("Malformed knowledge table {}: {e}", self.path.display());
                None
            }
        }
    }
}

/// Content of every entry with at least one matching trigger.
///
/// A trigger matches when its normalized form is a substring of the
/// normalized query, or when it is a single token present in the query's
/// token set. Triggers that normalize to nothing never match.
pub fn match_entries<'a>(entries: &'a [KnowledgeEntry], query: &str) -> Vec<&'a str> {
    let norm_query = normalize(query);
    let query_tokens: HashSet<&str> = tokens(&norm_query).collect();

    entries
        .iter()
        .filter(|entry| {
            entry.triggers.iter().any(|raw| {
                let trigger = normalize(raw);
                if trigger.is_empty() {
                    return false;
                }
                if norm_query.contains(&trigger) {
                    tracing::info!(trigger = %trigger, "Knowledge hit (substring)");
                    return true;
                }
                if !trigger.contains(' ') && query_tokens.contains(trigger.as_str()) {
                    tracing::info!(trigger = %trigger, "Knowledge hit (token)");
                    return true;
                }
                false
            })
        })
        .map(|entry| entry.content.as_str())
        .collect()
}
