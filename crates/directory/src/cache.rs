//! Cache collaborators: the fast KV tier in front of the source-of-truth.
//!
//! Values are opaque serialized payloads; interpretation (and corruption
//! handling) belongs to the directory service. An expired entry is
//! indistinguishable from a miss.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache transport error: {0}")]
    Transport(String),
}

/// Key-value cache tier with per-entry TTL.
///
/// All three operations are idempotent and independently retryable.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

struct MemoryEntry {
    value: String,
    inserted_at: Instant,
    ttl: Duration,
}

impl MemoryEntry {
    fn expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }
}

/// In-process cache tier for tests and `--mock` runs.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries past their TTL.
    pub fn purge_expired(&self) {
        self.entries
            .write()
            .expect("cache lock poisoned")
            .retain(|_, entry| !entry.expired());
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.read().expect("cache lock poisoned");
        Ok(entries
            .get(key)
            .filter(|entry| !entry.expired())
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                inserted_at: Instant::now(),
                ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries
            .write()
            .expect("cache lock poisoned")
            .remove(key);
        Ok(())
    }
}

/// HTTP KV cache tier speaking the Upstash-style REST protocol: each
/// command is POSTed as a JSON array and answered with `{"result": ...}`.
pub struct RestCache {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl RestCache {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("failed to create HTTP client");
        Self {
            base_url: base_url.into(),
            token: token.into(),
            http,
        }
    }

    async fn command(&self, cmd: Value) -> Result<Value, CacheError> {
        let response = self
            .http
            .post(&self.base_url)
            .bearer_auth(&self.token)
            .json(&cmd)
            .send()
            .await
            .map_err(|e| CacheError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CacheError::Transport(format!(
                "cache endpoint returned {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CacheError::Transport(e.to_string()))?;
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl CacheStore for RestCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self.command(json!(["GET", key])).await? {
            Value::String(payload) => Ok(Some(payload)),
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.command(json!(["SET", key, value, "EX", ttl.as_secs()]))
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.command(json!(["DEL", key])).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get() {
        let cache = MemoryCache::new();
        cache
            .set("k", "payload", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("payload".to_string()));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entry_reads_as_miss() {
        let cache = MemoryCache::new();
        cache
            .set("k", "payload", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = MemoryCache::new();
        cache.set("k", "v", Duration::from_secs(60)).await.unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_overwrites_existing_entry() {
        let cache = MemoryCache::new();
        cache.set("k", "old", Duration::from_secs(60)).await.unwrap();
        cache.set("k", "new", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("new".to_string()));
    }

    #[tokio::test]
    async fn purge_drops_only_expired() {
        let cache = MemoryCache::new();
        cache.set("a", "1", Duration::from_millis(10)).await.unwrap();
        cache.set("b", "2", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.purge_expired();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("b").await.unwrap(), Some("2".to_string()));
    }
}
