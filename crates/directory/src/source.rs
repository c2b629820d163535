//! Source-of-truth collaborators.
//!
//! The source serves range reads over the user dataset and reports an exact
//! total count for the (possibly filtered) set. Rows arrive in a
//! heterogeneous raw shape — the persistent store keeps some profiles as
//! serialized text — and are normalized into canonical `UserRecord`s before
//! they leave the directory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use meritdrop_core::{Profile, ScoreSet, SortField, SortOrder, UserRecord};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source transport error: {0}")]
    Transport(String),

    #[error("malformed source row: {0}")]
    Malformed(String),
}

/// One page of raw rows plus the exact total count for the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPage {
    pub rows: Vec<RawUserRecord>,
    pub total: u64,
}

/// Row shape as stored by the persistent tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawUserRecord {
    pub id: u64,
    pub wallet: String,
    #[serde(default)]
    pub skills_score: u32,
    #[serde(default)]
    pub activity_score: u32,
    #[serde(default)]
    pub identity_score: u32,
    #[serde(default)]
    pub score: u32,
    pub profile: RawProfile,
}

/// Profiles are stored either structured or as serialized JSON text,
/// depending on which writer produced the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawProfile {
    Structured(Profile),
    Serialized(String),
}

impl RawUserRecord {
    /// Normalize into the canonical record shape.
    pub fn canonicalize(self) -> Result<UserRecord, SourceError> {
        let wallet = self
            .wallet
            .parse()
            .map_err(|e| SourceError::Malformed(format!("row {}: wallet: {e}", self.id)))?;
        let profile = match self.profile {
            RawProfile::Structured(profile) => profile,
            RawProfile::Serialized(text) => serde_json::from_str(&text)
                .map_err(|e| SourceError::Malformed(format!("row {}: profile: {e}", self.id)))?,
        };
        Ok(UserRecord {
            id: self.id,
            wallet,
            scores: ScoreSet {
                skills: self.skills_score,
                activity: self.activity_score,
                identity: self.identity_score,
                composite: self.score,
            },
            profile,
        })
    }

    fn sort_key(&self, field: SortField) -> u64 {
        match field {
            SortField::Id => self.id,
            SortField::SkillsScore => self.skills_score as u64,
            SortField::ActivityScore => self.activity_score as u64,
            SortField::IdentityScore => self.identity_score as u64,
            SortField::Score => self.score as u64,
        }
    }
}

impl From<&UserRecord> for RawUserRecord {
    fn from(record: &UserRecord) -> Self {
        Self {
            id: record.id,
            wallet: record.wallet.to_string(),
            skills_score: record.scores.skills,
            activity_score: record.scores.activity,
            identity_score: record.scores.identity,
            score: record.scores.composite,
            profile: RawProfile::Structured(record.profile.clone()),
        }
    }
}

/// Range-based read over the user dataset.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch `limit` rows starting at `offset`, ordered by `order` (the
    /// identity field when unspecified), optionally filtered by a search
    /// term. Returns the rows plus the exact total for the filtered set.
    async fn fetch_range(
        &self,
        offset: u64,
        limit: u32,
        order: Option<(SortField, SortOrder)>,
        search: Option<&str>,
    ) -> Result<RawPage, SourceError>;
}

/// In-memory source for tests and `--mock` runs.
///
/// Search matches against the serialized form of a row, case-insensitively,
/// the same way the persistent tier's search does.
pub struct InMemorySource {
    rows: Vec<RawUserRecord>,
}

impl InMemorySource {
    pub fn new(records: Vec<UserRecord>) -> Self {
        Self {
            rows: records.iter().map(RawUserRecord::from).collect(),
        }
    }

    /// Seed with raw rows directly; used to exercise normalization.
    pub fn with_rows(rows: Vec<RawUserRecord>) -> Self {
        Self { rows }
    }
}

#[async_trait]
impl RecordSource for InMemorySource {
    async fn fetch_range(
        &self,
        offset: u64,
        limit: u32,
        order: Option<(SortField, SortOrder)>,
        search: Option<&str>,
    ) -> Result<RawPage, SourceError> {
        let needle = search.map(|s| s.to_lowercase());
        let mut rows: Vec<RawUserRecord> = self
            .rows
            .iter()
            .filter(|row| match &needle {
                Some(needle) => serde_json::to_string(row)
                    .map(|s| s.to_lowercase().contains(needle))
                    .unwrap_or(false),
                None => true,
            })
            .cloned()
            .collect();

        let (field, direction) = order.unwrap_or_default();
        rows.sort_by_key(|row| row.sort_key(field));
        if direction == SortOrder::Desc {
            rows.reverse();
        }

        let total = rows.len() as u64;
        let rows = rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok(RawPage { rows, total })
    }
}

/// Upstream scoring-provider API: page-based, authenticated with an API key
/// header, answering rows plus exact pagination totals.
pub struct HttpSource {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct HttpPageResponse {
    records: Vec<RawUserRecord>,
    pagination: HttpPagination,
}

#[derive(Debug, Deserialize)]
struct HttpPagination {
    total: u64,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to create HTTP client");
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            http,
        }
    }
}

#[async_trait]
impl RecordSource for HttpSource {
    async fn fetch_range(
        &self,
        offset: u64,
        limit: u32,
        order: Option<(SortField, SortOrder)>,
        search: Option<&str>,
    ) -> Result<RawPage, SourceError> {
        // The upstream is page-based; the directory always requests
        // page-aligned ranges, so the translation is exact.
        let page = offset / limit.max(1) as u64 + 1;
        let mut request = self
            .http
            .get(format!("{}/records", self.base_url))
            .header("X-API-KEY", &self.api_key)
            .query(&[("page", page.to_string()), ("per_page", limit.to_string())]);
        if let Some((field, direction)) = order {
            request = request.query(&[
                ("sort_field", field.as_str()),
                ("sort_order", direction.as_str()),
            ]);
        }
        if let Some(term) = search {
            request = request.query(&[("search", term)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SourceError::Transport(format!(
                "source returned {}",
                response.status()
            )));
        }

        let body: HttpPageResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        Ok(RawPage {
            rows: body.records,
            total: body.pagination.total,
        })
    }
}
