//! Generation backends.
//!
//! Two variants share one shape: compose a prompt (persona, injection
//! defenses, retrieved context, delimited user query), open a streaming
//! request, and fold the event stream into the full answer text.
//!
//! - `external`: remote hosted service, multipart request, `x-api-key` header
//! - `local`: the resource-constrained local service, JSON request, bearer token

pub mod external;
pub mod local;
pub mod prompt;
pub mod stream;

use async_trait::async_trait;

pub use external::ExternalBackend;
pub use local::LocalBackend;
pub use prompt::PromptBuilder;

/// Why a generation attempt produced no usable text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend answered with a non-2xx status.
    #[error("backend returned HTTP {0}")]
    Status(u16),
    /// The stream finished without any content.
    #[error("backend returned no content")]
    EmptyResponse,
    /// Connection, timeout or mid-stream transport failure.
    #[error("backend communication failed: {0}")]
    Network(String),
    /// The backend has no credentials configured.
    #[error("backend credentials are not configured")]
    MissingCredentials,
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        // Drop the URL: it may carry tokens in query strings.
        Self::Network(e.without_url().to_string())
    }
}

/// A generation backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Generate an answer for `query` grounded on `context`.
    /// Blocks for the full duration of the stream (bounded by the backend's
    /// own timeout).
    async fn generate(&self, query: &str, context: &str) -> Result<String, BackendError>;
}

/// `abcdef...wxyz` form of a secret, safe for logs.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    if chars.len() <= 10 {
        return "***".into();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
