//! Torrent search client
//!
//! Queries the backend's torrent search endpoint and converts its results
//! into [`CandidateSource`]s.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::error::CatalogError;
use crate::models::{CandidateSource, FileEntry};
use crate::stream::catalog::{CatalogProvider, SearchOptions};

const SEARCH_PATH: &str = "/api/v1/torrent/search";

/// Search endpoint response
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    torrents: Vec<AnimeTorrent>,
}

/// Torrent as returned by the backend
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnimeTorrent {
    name: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    seeders: i64,
    #[serde(default)]
    link: String,
    #[serde(default)]
    info_hash: Option<String>,
    #[serde(default)]
    resolution: Option<String>,
    #[serde(default)]
    is_batch: bool,
    #[serde(default)]
    release_group: Option<String>,
    #[serde(default)]
    files: Vec<FileEntry>,
}

impl AnimeTorrent {
    /// Convert API response to our CandidateSource model
    fn into_candidate(self) -> CandidateSource {
        let info_hash = self.info_hash.filter(|h| !h.is_empty());
        let id = info_hash.clone().unwrap_or_else(|| self.link.clone());
        let published_at = self
            .date
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .map(|d| d.with_timezone(&Utc));

        CandidateSource {
            id,
            link: self.link,
            info_hash,
            title: self.name,
            release_group: self.release_group.filter(|g| !g.is_empty()),
            resolution: self.resolution.filter(|r| !r.is_empty()),
            // providers report -1 when unknown
            seeders: self.seeders.max(0) as u32,
            size_bytes: self.size,
            is_batch: self.is_batch,
            published_at,
            files: self.files,
        }
    }
}

/// Catalog provider backed by the server's search endpoint
#[derive(Debug, Clone)]
pub struct HttpCatalogProvider {
    base_url: String,
    client: reqwest::Client,
}

impl HttpCatalogProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl CatalogProvider for HttpCatalogProvider {
    async fn search(&self, options: &SearchOptions) -> Result<Vec<CandidateSource>, CatalogError> {
        let url = format!("{}{}", self.base_url, SEARCH_PATH);
        debug!(%url, "catalog request");

        let response = self.client.post(&url).json(options).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Http(status.as_u16()));
        }

        let text = response.text().await?;
        let data: SearchResponse = serde_json::from_str(&text)
            .map_err(|e| CatalogError::InvalidResponse(e.to_string()))?;

        Ok(data
            .torrents
            .into_iter()
            .map(AnimeTorrent::into_candidate)
            .collect())
    }
}
