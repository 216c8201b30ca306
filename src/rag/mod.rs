//! Retrieval-augmented context: normalization, knowledge table, web search.

pub mod aggregator;
pub mod knowledge;
pub mod normalize;
pub mod web_search;

pub use aggregator::{ContextAggregator, ContextBundle, ContextSource};
pub use knowledge::{KnowledgeEntry, KnowledgeMatcher};
pub use normalize::normalize;
pub use web_search::{WebDigest, WebSearchClient};
