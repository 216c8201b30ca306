//! Per-request pipeline.
//!
//! ```text
//! CacheCheck → ContextBuild → RouteDecide ─┬─ ExternalAttempt ─┬─ Respond
//!                                          │                   └─ (fallback) ─┐
//!                                          └──────────────── LocalAttempt ←───┘
//!                                                                 └─ Respond
//! ```
//!
//! The external path falls back to the local path exactly once; the local
//! path never falls back. Each request reads load and backlog afresh.

use crate::cache::{ResponseCache, StoreOutcome};
use crate::config::Config;
use crate::gatekeeper::{AdmissionController, LoadProbe, QueueState, RoutingTarget, SystemLoad};
use crate::providers::{Backend, BackendError, ExternalBackend, LocalBackend, PromptBuilder};
use crate::rag::{normalize, ContextAggregator, ContextSource};
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

/// An external answer must be longer than this (in chars) to be used.
pub const MIN_EXTERNAL_CHARS: usize = 10;

/// A local answer shorter than this (in chars) is treated as empty.
pub const MIN_LOCAL_CHARS: usize = 5;

/// Where an answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerSource {
    Cache,
    External,
    Local,
}

/// Terminal result of one chat request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    Answer { text: String, source: AnswerSource },
    /// The request carried no query.
    ClientError,
    /// The gateway is missing required configuration.
    ConfigError(String),
    /// Local generation failed; carries the diagnostic.
    ServerError(String),
}

/// Snapshot served by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub worker_state: &'static str,
    pub queue_depth: usize,
    pub mode: RoutingTarget,
    pub cache_items: usize,
}

enum Stage {
    CacheCheck,
    ContextBuild,
    RouteDecide { context: String },
    ExternalAttempt { context: String },
    LocalAttempt { context: String },
    Respond(ChatOutcome),
}

pub struct Orchestrator {
    cache: Arc<ResponseCache>,
    context: Arc<dyn ContextSource>,
    admission: AdmissionController,
    external: Arc<dyn Backend>,
    local: Arc<dyn Backend>,
    config_error: Option<String>,
}

impl Orchestrator {
    pub fn new(
        cache: Arc<ResponseCache>,
        context: Arc<dyn ContextSource>,
        admission: AdmissionController,
        external: Arc<dyn Backend>,
        local: Arc<dyn Backend>,
    ) -> Self {
        Self {
            cache,
            context,
            admission,
            external,
            local,
            config_error: None,
        }
    }

    /// Every chat request fails with this message until the gateway is
    /// restarted with a fixed configuration.
    pub fn with_config_error(mut self, error: Option<String>) -> Self {
        self.config_error = error;
        self
    }

    /// Wire the production collaborators from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::from_config_with_probe(config, Arc::new(SystemLoad))
    }

    pub fn from_config_with_probe(config: &Config, probe: Arc<dyn LoadProbe>) -> Result<Self> {
        let cache = ResponseCache::open(
            &config.cache.dir,
            config.cache.ttl(),
            &config.cache.no_cache_keywords,
        )?;
        let prompt = PromptBuilder::new(config.prompt.persona.as_deref());
        let admission =
            AdmissionController::from_config(&config.admission, probe, Arc::new(QueueState::new()));

        let missing = config.missing_secrets();
        let config_error = (!missing.is_empty())
            .then(|| format!("Server configuration error: missing {}", missing.join(", ")));

        Ok(Self::new(
            Arc::new(cache),
            Arc::new(ContextAggregator::from_config(config)),
            admission,
            Arc::new(ExternalBackend::new(&config.external, prompt.clone())),
            Arc::new(LocalBackend::new(&config.local, prompt)),
        )
        .with_config_error(config_error))
    }

    pub fn queue(&self) -> &Arc<QueueState> {
        self.admission.queue()
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Run one chat request to completion.
    pub async fn handle(&self, query: &str) -> ChatOutcome {
        if let Some(error) = &self.config_error {
            tracing::error!("{error}");
            return ChatOutcome::ConfigError(error.clone());
        }
        let query = query.trim();
        if query.is_empty() {
            return ChatOutcome::ClientError;
        }

        let key = normalize(query);
        let mut stage = Stage::CacheCheck;
        loop {
            stage = match stage {
                Stage::CacheCheck => self.check_cache(&key),
                Stage::ContextBuild => {
                    let bundle = self.context.gather(query).await;
                    Stage::RouteDecide {
                        context: bundle.render(),
                    }
                }
                Stage::RouteDecide { context } => {
                    let decision = self.admission.decide();
                    tracing::info!(
                        target_backend = ?decision.target,
                        reason = ?decision.reason,
                        load = decision.load_one,
                        queue_depth = decision.queue_depth,
                        "Route decided"
                    );
                    match decision.target {
                        RoutingTarget::External => Stage::ExternalAttempt { context },
                        RoutingTarget::Local => Stage::LocalAttempt { context },
                    }
                }
                Stage::ExternalAttempt { context } => {
                    self.attempt_external(query, &key, context).await
                }
                Stage::LocalAttempt { context } => {
                    Stage::Respond(self.attempt_local(query, &key, &context).await)
                }
                Stage::Respond(outcome) => return outcome,
            };
        }
    }

    fn check_cache(&self, key: &str) -> Stage {
        if key.is_empty() {
            return Stage::ContextBuild;
        }
        match self.cache.lookup(key) {
            Some(text) => {
                tracing::info!(key, "Cache hit");
                Stage::Respond(ChatOutcome::Answer {
                    text,
                    source: AnswerSource::Cache,
                })
            }
            None => Stage::ContextBuild,
        }
    }

    async fn attempt_external(&self, query: &str, key: &str, context: String) -> Stage {
        let failure = match self.external.generate(query, &context).await {
            Ok(text) if text.trim().chars().count() > MIN_EXTERNAL_CHARS => {
                self.admit(key, &text);
                return Stage::Respond(ChatOutcome::Answer {
                    text,
                    source: AnswerSource::External,
                });
            }
            Ok(_) => BackendError::EmptyResponse,
            Err(e) => e,
        };
        tracing::warn!(
            backend = self.external.name(),
            "External generation failed ({failure}); falling back to local"
        );
        Stage::LocalAttempt { context }
    }

    async fn attempt_local(&self, query: &str, key: &str, context: &str) -> ChatOutcome {
        let queue = self.admission.queue();
        let _ticket = queue.enter();
        let _slot = queue.acquire_slot().await;

        match self.local.generate(query, context).await {
            Ok(text) if text.trim().chars().count() >= MIN_LOCAL_CHARS => {
                self.admit(key, &text);
                ChatOutcome::Answer {
                    text,
                    source: AnswerSource::Local,
                }
            }
            Ok(_) => {
                tracing::error!(backend = self.local.name(), "Local generation returned no usable text");
                ChatOutcome::ServerError("Local generation failed: empty response".into())
            }
            Err(e) => {
                tracing::error!(backend = self.local.name(), "Local generation failed: {e}");
                ChatOutcome::ServerError(format!("Local generation failed: {e}"))
            }
        }
    }

    fn admit(&self, key: &str, text: &str) {
        if key.is_empty() {
            return;
        }
        match self.cache.store(key, text) {
            Ok(StoreOutcome::Stored) => tracing::debug!(key, "Answer cached"),
            Ok(StoreOutcome::Filtered { keyword }) => {
                tracing::warn!(key, keyword = %keyword, "Answer not cached (no-cache keyword)");
            }
            Err(e) => tracing::warn!("Failed to cache answer: {e:#}"),
        }
    }

    pub fn health(&self) -> HealthSnapshot {
        let queue = self.admission.queue();
        HealthSnapshot {
            status: "available",
            worker_state: if queue.is_generating() { "busy" } else { "idle" },
            queue_depth: queue.depth(),
            mode: self.admission.decide().target,
            cache_items: self.cache.len(),
        }
    }
}
