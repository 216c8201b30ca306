//! On-disk response cache keyed by normalized query.
//!
//! Entries expire lazily: an expired row is deleted when a lookup touches it.
//! Writes go through a no-cache filter so that answers describing a transient
//! outage are never replayed after the outage ends.

use aho_corasick::AhoCorasick;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

const DB_FILE: &str = "responses.db";

/// Result of offering an answer to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored,
    /// The answer contained a no-cache keyword and was discarded.
    Filtered { keyword: String },
}

/// Case-insensitive scan for outage/maintenance vocabulary.
pub struct NoCacheFilter {
    keywords: Vec<String>,
    matcher: Option<AhoCorasick>,
}

impl NoCacheFilter {
    pub fn new(keywords: &[String]) -> Self {
        let keywords: Vec<String> = keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        let matcher = if keywords.is_empty() {
            None
        } else {
            match AhoCorasick::new(&keywords) {
                Ok(matcher) => Some(matcher),
                Err(e) => {
                    tracing::error!("Failed to build no-cache keyword matcher: {e}");
                    None
                }
            }
        };
        Self { keywords, matcher }
    }

    /// First configured keyword found in `text`, if any.
    pub fn blocking_keyword(&self, text: &str) -> Option<&str> {
        let matcher = self.matcher.as_ref()?;
        let lowered = text.to_lowercase();
        matcher
            .find(&lowered)
            .map(|m| self.keywords[m.pattern().as_usize()].as_str())
    }
}

pub struct ResponseCache {
    conn: Mutex<Connection>,
    ttl: Duration,
    filter: NoCacheFilter,
}

impl ResponseCache {
    pub fn open(dir: &Path, ttl: Duration, no_cache_keywords: &[String]) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create cache dir: {}", dir.display()))?;
        let db_path = dir.join(DB_FILE);
        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open cache DB: {}", db_path.display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Self::with_connection(conn, ttl, no_cache_keywords)
    }

    /// Non-persistent cache, used by tests and ad-hoc tooling.
    pub fn open_in_memory(ttl: Duration, no_cache_keywords: &[String]) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, ttl, no_cache_keywords)
    }

    fn with_connection(conn: Connection, ttl: Duration, no_cache_keywords: &[String]) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS response_cache (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                expires_at INTEGER NOT NULL
             );",
        )
        .context("Failed to create response_cache table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            ttl,
            filter: NoCacheFilter::new(no_cache_keywords),
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value for `key`, or `None` when absent or expired.
    /// Storage errors are logged and reported as a miss.
    pub fn lookup(&self, key: &str) -> Option<String> {
        match self.try_lookup(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Cache lookup failed: {e}");
                None
            }
        }
    }

    fn try_lookup(&self, key: &str) -> Result<Option<String>> {
        let now = now_millis();
        let conn = self.conn.lock();
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT value, expires_at FROM response_cache WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((value, expires_at)) if expires_at > now => Ok(Some(value)),
            Some(_) => {
                conn.execute(
                    "DELETE FROM response_cache WHERE key = ?1 AND expires_at <= ?2",
                    params![key, now],
                )?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Offer an answer with the configured TTL.
    pub fn store(&self, key: &str, value: &str) -> Result<StoreOutcome> {
        self.store_with_ttl(key, value, self.ttl)
    }

    /// Offer an answer. Filtered answers are dropped; otherwise the entry
    /// replaces any previous value for `key` wholesale.
    pub fn store_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<StoreOutcome> {
        if let Some(keyword) = self.filter.blocking_keyword(value) {
            return Ok(StoreOutcome::Filtered {
                keyword: keyword.to_string(),
            });
        }

        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now_millis().saturating_add(ttl_ms);
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO response_cache (key, value, expires_at) VALUES (?1, ?2, ?3)",
                params![key, value, expires_at],
            )
            .context("Failed to write cache entry")?;
        Ok(StoreOutcome::Stored)
    }

    /// Number of live (non-expired) entries.
    pub fn len(&self) -> usize {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM response_cache WHERE expires_at > ?1",
            params![now_millis()],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| usize::try_from(n).unwrap_or(0))
        .unwrap_or_else(|e| {
            tracing::warn!("Cache count failed: {e}");
            0
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn keywords() -> Vec<String> {
        ["manutenção", "offline", "Falha Geral"]
            .iter()
            .map(|k| (*k).to_string())
            .collect()
    }

    fn test_cache() -> ResponseCache {
        ResponseCache::open_in_memory(Duration::from_secs(3600), &keywords()).unwrap()
    }

    #[test]
    fn store_then_lookup_returns_exact_value() {
        let cache = test_cache();
        let answer = "Deverá reiniciar o **router**.\nSe necessitar, contacte o suporte.";
        assert_eq!(cache.store("wifi nao funciona", answer).unwrap(), StoreOutcome::Stored);
        assert_eq!(cache.lookup("wifi nao funciona").as_deref(), Some(answer));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn expired_entry_is_absent_and_removed() {
        let cache = test_cache();
        cache
            .store_with_ttl("k", "short lived answer", Duration::ZERO)
            .unwrap();
        assert_eq!(cache.lookup("k"), None);
        assert_eq!(cache.len(), 0);

        let rows: i64 = cache
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM response_cache", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 0, "lazy eviction should delete the expired row");
    }

    #[test]
    fn filtered_answer_is_never_retrievable() {
        let cache = test_cache();
        let outcome = cache
            .store("email", "O serviço está em MANUTENÇÃO até às 18h.")
            .unwrap();
        assert_eq!(
            outcome,
            StoreOutcome::Filtered {
                keyword: "manutenção".into()
            }
        );
        assert_eq!(cache.lookup("email"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn restore_overwrites_wholesale() {
        let cache = test_cache();
        cache.store("k", "first answer").unwrap();
        cache.store("k", "second answer").unwrap();
        assert_eq!(cache.lookup("k").as_deref(), Some("second answer"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn filter_matches_case_insensitively() {
        let filter = NoCacheFilter::new(&keywords());
        assert_eq!(filter.blocking_keyword("Há uma FALHA GERAL"), Some("falha geral"));
        assert_eq!(filter.blocking_keyword("Service is Offline"), Some("offline"));
        assert_eq!(filter.blocking_keyword("Tudo operacional"), None);
    }

    #[test]
    fn empty_keyword_list_admits_everything() {
        let filter = NoCacheFilter::new(&["".to_string(), "  ".to_string()]);
        assert_eq!(filter.blocking_keyword("offline"), None);
    }

    #[test]
    fn on_disk_cache_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("cache");
        {
            let cache = ResponseCache::open(&dir, Duration::from_secs(60), &keywords()).unwrap();
            cache.store("vpn", "Use o FortiClient.").unwrap();
        }
        let cache = ResponseCache::open(&dir, Duration::from_secs(60), &keywords()).unwrap();
        assert_eq!(cache.lookup("vpn").as_deref(), Some("Use o FortiClient."));
    }

    #[test]
    fn cache_is_shareable_across_threads() {
        let cache = std::sync::Arc::new(test_cache());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    cache.store(&format!("k{i}"), &format!("answer {i}")).unwrap();
                    cache.lookup(&format!("k{i}"))
                })
            })
            .collect();
        for (i, h) in handles.into_iter().enumerate() {
            assert_eq!(h.join().unwrap(), Some(format!("answer {i}")));
        }
        assert_eq!(cache.len(), 8);
    }
}
