//! Cache-aside directory over the scored user dataset.
//!
//! Serves paginated, sortable, searchable pages of `UserRecord`s. Reads go
//! to the fast cache tier first and fall back to the source-of-truth on a
//! miss, with the result back-filled into the cache under a fixed TTL.
//! Concurrent misses for the same key are collapsed into a single source
//! fetch; a corrupt cache payload is treated as a miss, never surfaced.

pub mod cache;
pub mod source;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use meritdrop_core::{SortField, SortOrder, UserRecord};

pub use cache::{CacheError, CacheStore, MemoryCache, RestCache};
pub use source::{
    HttpSource, InMemorySource, RawPage, RawProfile, RawUserRecord, RecordSource, SourceError,
};

/// Fixed page size served by the directory.
pub const PAGE_SIZE: u32 = 50;

/// How long a cached page stays valid.
pub const PAGE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("page number must be >= 1")]
    InvalidPage,

    #[error("no data tier available: {0}")]
    SourceUnavailable(String),
}

/// Query parameters identifying one page slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub page: u32,
    pub sort_field: SortField,
    pub sort_order: SortOrder,
    pub search: Option<String>,
}

impl PageQuery {
    pub fn new(page: u32) -> Self {
        Self {
            page,
            sort_field: SortField::default(),
            sort_order: SortOrder::default(),
            search: None,
        }
    }

    /// Cache key for this slice. Sort and search participate: they change
    /// both the rows and the total.
    pub fn cache_key(&self) -> String {
        let search = self
            .search
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_default();
        format!(
            "directory:v1:p{}:{}:{}:{}",
            self.page,
            self.sort_field.as_str(),
            self.sort_order.as_str(),
            search,
        )
    }
}

/// One served page: canonical records plus the exact total count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryPage {
    pub records: Vec<UserRecord>,
    pub total: u64,
}

impl DirectoryPage {
    /// `ceil(total / page_size)`.
    pub fn last_page(&self, page_size: u32) -> u64 {
        self.total.div_ceil(page_size as u64)
    }
}

/// The cache-aside data service.
pub struct DirectoryService {
    cache: Arc<dyn CacheStore>,
    source: Arc<dyn RecordSource>,
    page_size: u32,
    ttl: Duration,
    /// Per-key gates collapsing concurrent source fetches.
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DirectoryService {
    pub fn new(cache: Arc<dyn CacheStore>, source: Arc<dyn RecordSource>) -> Self {
        Self::with_limits(cache, source, PAGE_SIZE, PAGE_TTL)
    }

    pub fn with_limits(
        cache: Arc<dyn CacheStore>,
        source: Arc<dyn RecordSource>,
        page_size: u32,
        ttl: Duration,
    ) -> Self {
        Self {
            cache,
            source,
            page_size,
            ttl,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Serve one page, cache-aside.
    pub async fn page(&self, query: &PageQuery) -> Result<DirectoryPage, DirectoryError> {
        if query.page == 0 {
            return Err(DirectoryError::InvalidPage);
        }
        let key = query.cache_key();

        if let Some(page) = self.cache_lookup(&key).await {
            return Ok(page);
        }

        // Miss: collapse concurrent callers for this key into one fetch.
        let gate = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let held = gate.lock().await;

        // A peer may have populated the cache while we waited on the gate.
        let result = match self.cache_lookup(&key).await {
            Some(page) => Ok(page),
            None => self.fetch_and_store(query, &key).await,
        };
        drop(held);

        // Last caller out removes the gate so the registry stays bounded.
        let mut inflight = self.inflight.lock().await;
        if let Some(existing) = inflight.get(&key) {
            if Arc::ptr_eq(existing, &gate) && Arc::strong_count(&gate) <= 2 {
                inflight.remove(&key);
            }
        }

        result
    }

    /// Drop the cached slice for one query.
    pub async fn invalidate(&self, query: &PageQuery) -> Result<(), CacheError> {
        self.cache.delete(&query.cache_key()).await
    }

    async fn cache_lookup(&self, key: &str) -> Option<DirectoryPage> {
        match self.cache.get(key).await {
            Ok(Some(payload)) => match serde_json::from_str(&payload) {
                Ok(page) => {
                    debug!(key, "cache hit");
                    Some(page)
                }
                Err(err) => {
                    debug!(key, %err, "undeserializable cache entry, treating as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(key, %err, "cache tier unavailable, falling through to source");
                None
            }
        }
    }

    async fn fetch_and_store(
        &self,
        query: &PageQuery,
        key: &str,
    ) -> Result<DirectoryPage, DirectoryError> {
        let offset = (query.page as u64 - 1) * self.page_size as u64;
        let raw = self
            .source
            .fetch_range(
                offset,
                self.page_size,
                Some((query.sort_field, query.sort_order)),
                query.search.as_deref(),
            )
            .await
            .map_err(|err| {
                warn!(key, %err, "source fetch failed");
                DirectoryError::SourceUnavailable(err.to_string())
            })?;

        let total = raw.total;
        let mut records = Vec::with_capacity(raw.rows.len());
        for row in raw.rows {
            match row.canonicalize() {
                Ok(record) => records.push(record),
                Err(err) => warn!(%err, "skipping row that failed normalization"),
            }
        }
        let page = DirectoryPage { records, total };

        match serde_json::to_string(&page) {
            Ok(payload) => {
                if let Err(err) = self.cache.set(key, &payload, self.ttl).await {
                    warn!(key, %err, "cache write failed, serving uncached");
                }
            }
            Err(err) => warn!(key, %err, "page failed to serialize for caching"),
        }

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meritdrop_core::{Address, Profile, ScoreSet};

    fn record(id: u64) -> UserRecord {
        let mut wallet = [0u8; 20];
        wallet[12..20].copy_from_slice(&id.to_be_bytes());
        UserRecord {
            id,
            wallet: Address::new(wallet),
            scores: ScoreSet::default(),
            profile: Profile {
                display_name: format!("user-{id}"),
                ..Profile::default()
            },
        }
    }

    fn service_over(records: Vec<UserRecord>) -> DirectoryService {
        DirectoryService::new(
            Arc::new(MemoryCache::new()),
            Arc::new(InMemorySource::new(records)),
        )
    }

    #[tokio::test]
    async fn page_two_of_fifty_slices_51_to_100() {
        let service = service_over((1..=120).map(record).collect());
        let page = service.page(&PageQuery::new(2)).await.unwrap();

        assert_eq!(page.total, 120);
        assert_eq!(page.records.len(), 50);
        assert_eq!(page.records.first().unwrap().id, 51);
        assert_eq!(page.records.last().unwrap().id, 100);
        assert_eq!(page.last_page(PAGE_SIZE), 3);
    }

    #[tokio::test]
    async fn page_zero_is_rejected() {
        let service = service_over(vec![record(1)]);
        assert!(matches!(
            service.page(&PageQuery::new(0)).await,
            Err(DirectoryError::InvalidPage)
        ));
    }

    #[tokio::test]
    async fn corrupt_cache_entry_is_served_from_source() {
        let cache = Arc::new(MemoryCache::new());
        let service = DirectoryService::new(
            cache.clone(),
            Arc::new(InMemorySource::new(vec![record(1)])),
        );
        let query = PageQuery::new(1);
        cache
            .set(&query.cache_key(), "{definitely not json", PAGE_TTL)
            .await
            .unwrap();

        let page = service.page(&query).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].id, 1);
    }

    #[tokio::test]
    async fn cached_page_equals_fresh_page() {
        let service = service_over((1..=5).map(record).collect());
        let query = PageQuery::new(1);

        let first = service.page(&query).await.unwrap();
        let second = service.page(&query).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn sort_participates_in_cache_key() {
        let a = PageQuery::new(1);
        let mut b = PageQuery::new(1);
        b.sort_field = SortField::SkillsScore;
        b.sort_order = SortOrder::Desc;
        let mut c = PageQuery::new(1);
        c.search = Some("Alice".to_string());

        assert_ne!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), c.cache_key());
    }

    #[tokio::test]
    async fn rows_failing_normalization_are_skipped() {
        let mut bad = RawUserRecord::from(&record(2));
        bad.wallet = "garbage".to_string();
        let source = InMemorySource::with_rows(vec![RawUserRecord::from(&record(1)), bad]);
        let service =
            DirectoryService::new(Arc::new(MemoryCache::new()), Arc::new(source));

        let page = service.page(&PageQuery::new(1)).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].id, 1);
        // The total still reflects the source's count.
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn empty_dataset_has_zero_pages() {
        let service = service_over(Vec::new());
        let page = service.page(&PageQuery::new(1)).await.unwrap();
        assert_eq!(page.total, 0);
        assert_eq!(page.last_page(PAGE_SIZE), 0);
    }
}
