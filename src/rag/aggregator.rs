//! Merges knowledge-table facts with the web-search digest.

use super::knowledge::KnowledgeMatcher;
use super::web_search::{WebDigest, WebSearchClient};
use crate::config::Config;
use async_trait::async_trait;

const FACTS_HEADER: &str = "!!! OFFICIAL TECHNICAL FACTS (HIGHEST PRIORITY) !!!:";
const WEB_HEADER: &str = "--- WEB RESULTS (use only if needed) ---";
const OUTAGE_HEADER: &str = "--- INFRASTRUCTURE STATUS (HIGHEST PRIORITY) ---";

/// Retrieved context for one request. Either part may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextBundle {
    pub facts: String,
    pub web: WebDigest,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty() && self.web.is_empty()
    }

    /// Prompt-ready text: facts first, then the labeled web section.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.facts.is_empty() {
            out.push_str(FACTS_HEADER);
            out.push('\n');
            out.push_str(&self.facts);
            out.push_str("\n\n");
        }
        match &self.web {
            WebDigest::Empty => {}
            WebDigest::Results(text) => {
                out.push_str(WEB_HEADER);
                out.push('\n');
                out.push_str(text);
            }
            WebDigest::Outage(block) => {
                out.push_str(OUTAGE_HEADER);
                out.push('\n');
                out.push_str(block);
            }
        }
        out
    }
}

/// Source of retrieved context for a query.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn gather(&self, query: &str) -> ContextBundle;
}

pub struct ContextAggregator {
    knowledge: KnowledgeMatcher,
    search: WebSearchClient,
}

impl ContextAggregator {
    pub fn new(knowledge: KnowledgeMatcher, search: WebSearchClient) -> Self {
        Self { knowledge, search }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            KnowledgeMatcher::new(&config.knowledge.path),
            WebSearchClient::new(&config.search),
        )
    }
}

#[async_trait]
impl ContextSource for ContextAggregator {
    async fn gather(&self, query: &str) -> ContextBundle {
        let facts = self.knowledge.lookup(query).await;
        let web = self.search.digest(query).await;
        tracing::debug!(
            facts_chars = facts.len(),
            web = web.kind(),
            "Context gathered"
        );
        ContextBundle { facts, web }
    }
}
