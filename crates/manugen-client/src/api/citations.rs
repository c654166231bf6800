//! Citation lookup with a write-once cache.
//!
//! A [`CitationSource`] resolves manuscript citation ids (`doi:...`,
//! `pmid:...`, URLs) to CSL-JSON records; [`ManubotClient`] does so over
//! HTTP. [`CitationCache`] sits in front of a source: each id is fetched at
//! most once per cache (barring a concurrent first lookup of the same id),
//! and a cached record is never overwritten.

use crate::error::ClientError;
use crate::identity::{Clock, SystemClock};
use crate::{AdkClient, RequestOptions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use url::Url;

// ── CSL-JSON ───────────────────────────────────────────────────────

/// A bibliographic record in CSL-JSON form.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Citation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub author: Vec<Author>,
    #[serde(default, rename = "container-title", skip_serializing_if = "Option::is_none")]
    pub container_title: Option<String>,
    #[serde(
        default,
        rename = "container-title-short",
        skip_serializing_if = "Option::is_none"
    )]
    pub container_title_short: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, rename = "publisher-place", skip_serializing_if = "Option::is_none")]
    pub publisher_place: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued: Option<DateParts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessed: Option<DateParts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(default, rename = "DOI", skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, rename = "URL", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, rename = "PMID", skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    #[serde(default, rename = "PMCID", skip_serializing_if = "Option::is_none")]
    pub pmcid: Option<String>,
    #[serde(default, rename = "ISSN", skip_serializing_if = "Option::is_none")]
    pub issn: Option<String>,
    #[serde(default, rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct Author {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
}

/// `{"date-parts": [[year, month, day]]}`; month and day may be absent.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct DateParts {
    #[serde(default, rename = "date-parts")]
    pub date_parts: Vec<Vec<i32>>,
}

impl DateParts {
    pub fn year(&self) -> Option<i32> {
        self.date_parts.first()?.first().copied()
    }
}

// ── Sources ────────────────────────────────────────────────────────

pub type CitationFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<Citation>, ClientError>> + Send + 'a>>;

/// Resolves citation ids to records, one record per id, in request order.
pub trait CitationSource: Send + Sync {
    fn fetch<'a>(&'a self, ids: &'a [String]) -> CitationFuture<'a>;
}

/// A Manubot-style citation service: `POST {url}` with `{"ids": [...]}`
/// answers with a JSON array of CSL records.
#[derive(Clone, Debug)]
pub struct ManubotClient {
    client: AdkClient,
    url: Url,
}

#[derive(Serialize)]
struct CitationRequest<'a> {
    ids: &'a [String],
}

impl ManubotClient {
    pub fn new(client: AdkClient, url: Url) -> Self {
        Self { client, url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl CitationSource for ManubotClient {
    fn fetch<'a>(&'a self, ids: &'a [String]) -> CitationFuture<'a> {
        Box::pin(async move {
            let body = serde_json::to_value(CitationRequest { ids })?;
            self.client
                .request(self.url.clone(), &RequestOptions::post_json(body))
                .await
        })
    }
}

impl AdkClient {
    /// A citation client for the configured citation service, sharing this
    /// client's connection pool.
    pub fn citation_source(&self) -> Option<ManubotClient> {
        let url = self.config.citation_url.clone()?;
        Some(ManubotClient::new(self.clone(), url))
    }
}

// ── Cache ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct CacheEntry {
    citation: Citation,
    fetched_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

pub struct CitationCache<S> {
    source: S,
    clock: Arc<dyn Clock>,
    state: Mutex<CacheState>,
}

impl<S: CitationSource> CitationCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            clock: Arc::new(SystemClock),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Stamp entries with `clock` instead of wall-clock time.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Citations for `ids`, in the same order, duplicates included.
    ///
    /// Uncached ids are fetched together in one upstream call. The lock is
    /// released while fetching, so two concurrent first lookups of one id
    /// may both fetch it; the first write wins.
    pub async fn get_or_fetch(&self, ids: &[String]) -> Result<Vec<Citation>, ClientError> {
        let missing = {
            let mut state = self.lock();
            let mut seen = HashSet::new();
            let mut missing = Vec::new();
            for id in ids {
                if !seen.insert(id.as_str()) {
                    continue;
                }
                if state.entries.contains_key(id) {
                    state.hits += 1;
                } else {
                    state.misses += 1;
                    missing.push(id.clone());
                }
            }
            missing
        };

        if !missing.is_empty() {
            debug!("Fetching {} uncached citation(s)", missing.len());
            let fetched = self.source.fetch(&missing).await?;
            if fetched.len() != missing.len() {
                return Err(ClientError::CitationMismatch {
                    requested: missing.len(),
                    received: fetched.len(),
                });
            }
            let fetched_at = self.clock.now();
            let mut state = self.lock();
            for (id, citation) in missing.into_iter().zip(fetched) {
                state.entries.entry(id).or_insert(CacheEntry {
                    citation,
                    fetched_at,
                });
            }
        }

        let state = self.lock();
        ids.iter()
            .map(|id| {
                state
                    .entries
                    .get(id)
                    .map(|entry| entry.citation.clone())
                    .ok_or(ClientError::CitationMismatch {
                        requested: ids.len(),
                        received: state.entries.len(),
                    })
            })
            .collect()
    }

    /// A cached citation, without fetching.
    pub fn get(&self, id: &str) -> Option<Citation> {
        self.lock().entries.get(id).map(|e| e.citation.clone())
    }

    /// When `id` was first cached.
    pub fn fetched_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.lock().entries.get(id).map(|e| e.fetched_at)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(hits, misses)` counted per distinct id per lookup.
    pub fn stats(&self) -> (u64, u64) {
        let state = self.lock();
        (state.hits, state.misses)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // Entries are only ever inserted whole, so a poisoned map is intact.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
