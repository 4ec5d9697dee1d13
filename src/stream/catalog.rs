//! Source catalog resolver
//!
//! Validates search options, routes them to the regular or adult provider and
//! offers client-side sorting/filtering over whatever the provider returned.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CatalogError, Result, StreamError};
use crate::models::{CandidateSource, MediaRef};

/// Search request sent to a catalog provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_number: Option<u32>,
    #[serde(default)]
    pub batch: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default)]
    pub smart_search: bool,
    #[serde(default)]
    pub best: bool,
    #[serde(default)]
    pub adult: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRef>,
}

impl SearchOptions {
    pub fn query(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Smart search for an episode of a known media
    pub fn smart(media: MediaRef, episode_number: u32) -> Self {
        Self {
            query: media.title.clone(),
            episode_number: Some(episode_number),
            smart_search: true,
            media: Some(media),
            ..Default::default()
        }
    }

    /// Reject combinations no provider supports
    pub fn validate(&self) -> Result<()> {
        if self.adult && self.smart_search {
            return Err(StreamError::UnsupportedCombination(
                "smart search is not available for adult catalogs",
            ));
        }
        if self.best && !self.smart_search {
            return Err(StreamError::UnsupportedCombination(
                "best match requires smart search",
            ));
        }
        if self.smart_search && self.media.is_none() {
            return Err(StreamError::UnsupportedCombination(
                "smart search requires a media",
            ));
        }
        Ok(())
    }
}

/// Torrent/debrid search backend
#[async_trait]
pub trait CatalogProvider: Send + Sync + fmt::Debug {
    async fn search(
        &self,
        options: &SearchOptions,
    ) -> std::result::Result<Vec<CandidateSource>, CatalogError>;
}

/// Routes searches to the configured providers
#[derive(Debug, Clone)]
pub struct CatalogResolver {
    regular: Arc<dyn CatalogProvider>,
    adult: Option<Arc<dyn CatalogProvider>>,
}

impl CatalogResolver {
    pub fn new(regular: Arc<dyn CatalogProvider>) -> Self {
        Self {
            regular,
            adult: None,
        }
    }

    pub fn with_adult(mut self, adult: Arc<dyn CatalogProvider>) -> Self {
        self.adult = Some(adult);
        self
    }

    /// Search the matching catalog
    ///
    /// Provider failures are surfaced once, no retries. An empty result is a
    /// valid answer.
    pub async fn search(&self, options: &SearchOptions) -> Result<Vec<CandidateSource>> {
        options.validate()?;

        let provider = if options.adult {
            self.adult
                .as_ref()
                .ok_or(CatalogError::NotConfigured("adult"))?
        } else {
            &self.regular
        };

        debug!(query = %options.query, smart = options.smart_search, adult = options.adult, "searching catalog");

        let mut results = provider.search(options).await.map_err(|e| {
            warn!(error = %e, "catalog search failed");
            StreamError::CatalogUnavailable(e)
        })?;

        if options.best {
            results.truncate(1);
        }
        Ok(results)
    }
}

// =============================================================================
// Sorting & Filtering
// =============================================================================

/// Column the result list can be sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    Seeders,
    Size,
    Date,
    Resolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Active sort, at most one field at a time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortState {
    pub field: Option<SortField>,
    pub direction: Option<SortDirection>,
}

impl SortState {
    pub fn by(field: SortField, direction: SortDirection) -> Self {
        Self {
            field: Some(field),
            direction: Some(direction),
        }
    }

    /// Click on a column header: desc → asc → unset, other field → desc
    pub fn toggle(self, field: SortField) -> Self {
        if self.field != Some(field) {
            return Self::by(field, SortDirection::Desc);
        }

        match self.direction {
            Some(SortDirection::Desc) => Self::by(field, SortDirection::Asc),
            Some(SortDirection::Asc) => Self::default(),
            None => Self::by(field, SortDirection::Desc),
        }
    }

    pub fn is_unset(&self) -> bool {
        self.field.is_none() || self.direction.is_none()
    }
}

fn compare(a: &CandidateSource, b: &CandidateSource, field: SortField) -> Ordering {
    match field {
        SortField::Seeders => a.seeders.cmp(&b.seeders),
        SortField::Size => a.size_bytes.cmp(&b.size_bytes),
        SortField::Date => a.published_timestamp().cmp(&b.published_timestamp()),
        SortField::Resolution => a.resolution_value().cmp(&b.resolution_value()),
    }
}

/// Sorted copy of `candidates`; ties and the unset state keep server order
pub fn sort_candidates(candidates: &[CandidateSource], sort: &SortState) -> Vec<CandidateSource> {
    let mut sorted = candidates.to_vec();
    let (Some(field), Some(direction)) = (sort.field, sort.direction) else {
        return sorted;
    };

    sorted.sort_by(|a, b| match direction {
        SortDirection::Asc => compare(a, b, field),
        SortDirection::Desc => compare(b, a, field),
    });
    sorted
}

/// Client-side resolution filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResolutionFilter {
    #[default]
    Any,
    Only(String),
}

impl ResolutionFilter {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("any") {
            ResolutionFilter::Any
        } else {
            ResolutionFilter::Only(value.to_lowercase())
        }
    }

    pub fn matches(&self, candidate: &CandidateSource) -> bool {
        match self {
            ResolutionFilter::Any => true,
            ResolutionFilter::Only(wanted) => candidate
                .resolution
                .as_deref()
                .is_some_and(|r| r.to_lowercase().contains(wanted.as_str())),
        }
    }

    pub fn apply(&self, candidates: &[CandidateSource]) -> Vec<CandidateSource> {
        candidates.iter().filter(|c| self.matches(c)).cloned().collect()
    }
}
