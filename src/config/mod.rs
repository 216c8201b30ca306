//! Gateway configuration.
//!
//! Loaded from a TOML file (every field optional), then overridden by
//! `HELPDESK_*` environment variables. Secrets default to empty; a missing
//! local API key is surfaced per request by the orchestrator rather than
//! refusing to start, so `/health` keeps answering while the operator fixes it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for all overrides.
pub const ENV_PREFIX: &str = "HELPDESK_";

/// Vocabulary that marks an answer as describing a transient outage.
/// Answers containing any of these are returned but never cached.
pub const DEFAULT_NO_CACHE_KEYWORDS: &[&str] = &[
    "manutenção",
    "indisponível",
    "falha geral",
    "falha crítica",
    "interrupção",
    "degradado",
    "offline",
    "down",
    "outage",
    "maintenance",
    "não está a funcionar",
    "sem serviço",
    "avaria",
    "erro no serviço externo",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub local: LocalBackendConfig,
    pub external: ExternalBackendConfig,
    pub search: SearchConfig,
    pub knowledge: KnowledgeConfig,
    pub admission: AdmissionConfig,
    pub cache: CacheConfig,
    pub prompt: PromptConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5001,
        }
    }
}

/// The resource-constrained local inference service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalBackendConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Context window requested from the local model.
    pub num_ctx: u32,
    pub temperature: f64,
}

impl Default for LocalBackendConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:3000/api/chat/completions".into(),
            api_key: String::new(),
            model: "ministral-3:8b".into(),
            timeout_secs: 600,
            num_ctx: 8192,
            temperature: 0.3,
        }
    }
}

/// The remote hosted generation service (multipart + streaming).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalBackendConfig {
    pub api_url: String,
    pub api_key: String,
    pub channel_id: String,
    pub timeout_secs: u64,
}

impl Default for ExternalBackendConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.iaedu.pt/agent-chat/api/v1/agent/stream".into(),
            api_key: String::new(),
            channel_id: String::new(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub url: String,
    pub language: String,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080/search".into(),
            language: "pt-PT".into(),
            timeout_secs: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// JSON array of `{triggers: [..], content: ".."}`; reread on every request.
    pub path: PathBuf,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("knowledge_base.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// 1-minute load average above which requests go external.
    pub load_threshold: f64,
    /// Local backlog at which requests go external.
    pub max_local_queue: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            load_threshold: 5.0,
            max_local_queue: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
    pub ttl_secs: u64,
    pub no_cache_keywords: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("cache_store"),
            ttl_secs: 86_400,
            no_cache_keywords: DEFAULT_NO_CACHE_KEYWORDS
                .iter()
                .map(|k| (*k).to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Replaces the built-in assistant persona when set.
    pub persona: Option<String>,
}

impl LocalBackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ExternalBackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Config {
    /// Load configuration: explicit path, else the platform config file if it
    /// exists, else defaults. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.expand_paths();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply `HELPDESK_*` overrides. `lookup` is injected so tests don't have
    /// to mutate the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| {
            lookup(&format!("{ENV_PREFIX}{suffix}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("LOCAL_API_KEY") {
            self.local.api_key = v;
        }
        if let Some(v) = get("LOCAL_API_URL") {
            self.local.api_url = v;
        }
        if let Some(v) = get("MODEL") {
            self.local.model = v;
        }
        if let Some(v) = get("EXTERNAL_API_KEY") {
            self.external.api_key = v;
        }
        if let Some(v) = get("EXTERNAL_API_URL") {
            self.external.api_url = v;
        }
        if let Some(v) = get("EXTERNAL_CHANNEL_ID") {
            self.external.channel_id = v;
        }
        if let Some(v) = get("SEARCH_URL") {
            self.search.url = v;
        }
        if let Some(v) = get("KNOWLEDGE_PATH") {
            self.knowledge.path = PathBuf::from(v);
        }
        if let Some(v) = get("CACHE_DIR") {
            self.cache.dir = PathBuf::from(v);
        }
        if let Some(v) = get("LOAD_THRESHOLD") {
            match v.parse::<f64>() {
                Ok(parsed) if parsed.is_finite() => self.admission.load_threshold = parsed,
                _ => tracing::warn!("Ignoring invalid {ENV_PREFIX}LOAD_THRESHOLD={v}"),
            }
        }
        if let Some(v) = get("MAX_LOCAL_QUEUE") {
            match v.parse::<usize>() {
                Ok(parsed) => self.admission.max_local_queue = parsed,
                Err(_) => tracing::warn!("Ignoring invalid {ENV_PREFIX}MAX_LOCAL_QUEUE={v}"),
            }
        }
        if let Some(v) = get("CACHE_TTL") {
            match v.parse::<u64>() {
                Ok(parsed) => self.cache.ttl_secs = parsed,
                Err(_) => tracing::warn!("Ignoring invalid {ENV_PREFIX}CACHE_TTL={v}"),
            }
        }
        if let Some(v) = get("NO_CACHE_KEYWORDS") {
            self.cache.no_cache_keywords = v
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(ToOwned::to_owned)
                .collect();
        }
    }

    fn expand_paths(&mut self) {
        self.cache.dir = expand_tilde(&self.cache.dir);
        self.knowledge.path = expand_tilde(&self.knowledge.path);
    }

    /// Problems that make the gateway unable to answer chats.
    pub fn missing_secrets(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.local.api_key.trim().is_empty() {
            missing.push("local.api_key");
        }
        missing
    }

    /// Effective configuration as TOML with secrets masked.
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut redacted = self.clone();
        redacted.local.api_key = crate::providers::mask_secret(&redacted.local.api_key);
        redacted.external.api_key = crate::providers::mask_secret(&redacted.external.api_key);
        toml::to_string_pretty(&redacted).context("Failed to serialize config")
    }
}

fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "helpdesk-gateway")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn expand_tilde(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(raw) => PathBuf::from(shellexpand::tilde(raw).into_owned()),
        None => path.to_path_buf(),
    }
}
