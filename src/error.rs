//! Error taxonomy for catalog searches, file resolution and streaming sessions
//!
//! Every [`StreamError`] variant maps to a distinct [`ErrorClass`], which is what
//! the UI layer switches on to pick a message ("nothing found" vs "pick a file"
//! vs "the engine died").

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stream::session::SessionState;

/// Convenience alias used across the library
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// Errors reported by a catalog provider
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("Request failed: {0}")]
    Network(String),

    #[error("Catalog returned HTTP {0}")]
    Http(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No {0} catalog configured")]
    NotConfigured(&'static str),
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CatalogError::InvalidResponse(err.to_string())
        } else {
            CatalogError::Network(err.to_string())
        }
    }
}

/// Errors reported by the torrent/debrid engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Engine unreachable: {0}")]
    Unreachable(String),

    #[error("Engine rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Engine did not acknowledge the file within {0:?}")]
    Timeout(Duration),

    #[error("Invalid engine response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            EngineError::InvalidResponse(err.to_string())
        } else {
            EngineError::Unreachable(err.to_string())
        }
    }
}

/// Errors surfaced by the streaming core
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(#[from] CatalogError),

    #[error("Unsupported search combination: {0}")]
    UnsupportedCombination(&'static str),

    #[error("Batch source requires an episode-to-file mapping")]
    MissingBatchMapping,

    #[error("Episode {episode} is not part of the selected batch")]
    EpisodeNotFoundInBatch { episode: u32 },

    #[error("Auto-select cannot be combined with a manually selected source or file")]
    ConflictingSelection,

    #[error("Could not pick a single file for episode {episode} ({candidates} candidates)")]
    AmbiguousFile { episode: u32, candidates: usize },

    #[error("No source was selected")]
    MissingSource,

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("No active session for client {0}")]
    NoActiveSession(String),
}

impl StreamError {
    /// Message class the UI switches on
    pub fn class(&self) -> ErrorClass {
        match self {
            StreamError::CatalogUnavailable(_) => ErrorClass::CatalogUnavailable,
            StreamError::UnsupportedCombination(_) => ErrorClass::UnsupportedSearch,
            StreamError::MissingBatchMapping => ErrorClass::BatchMappingRequired,
            StreamError::EpisodeNotFoundInBatch { .. } => ErrorClass::EpisodeNotInBatch,
            StreamError::ConflictingSelection => ErrorClass::ConflictingSelection,
            StreamError::AmbiguousFile { .. } => ErrorClass::FileSelectionRequired,
            StreamError::MissingSource => ErrorClass::SourceRequired,
            StreamError::Engine(_) => ErrorClass::EngineFailure,
            StreamError::Configuration(_) => ErrorClass::Configuration,
            StreamError::InvalidTransition { .. } => ErrorClass::InvalidState,
            StreamError::NoActiveSession(_) => ErrorClass::NoActiveSession,
        }
    }

    /// True for errors rejected before a session exists
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            StreamError::UnsupportedCombination(_)
                | StreamError::MissingBatchMapping
                | StreamError::EpisodeNotFoundInBatch { .. }
                | StreamError::ConflictingSelection
                | StreamError::AmbiguousFile { .. }
                | StreamError::MissingSource
        )
    }

    /// Serializable form sent to subscribers
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            class: self.class(),
            message: self.to_string(),
        }
    }
}

/// User-visible message class, one per error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorClass {
    CatalogUnavailable,
    UnsupportedSearch,
    BatchMappingRequired,
    EpisodeNotInBatch,
    ConflictingSelection,
    FileSelectionRequired,
    SourceRequired,
    EngineFailure,
    Configuration,
    InvalidState,
    NoActiveSession,
}

impl ErrorClass {
    /// Short message suitable for a toast
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorClass::CatalogUnavailable => "Torrent search is unavailable, try again later",
            ErrorClass::UnsupportedSearch => "This search combination is not supported",
            ErrorClass::BatchMappingRequired => "Select the episode file inside this batch",
            ErrorClass::EpisodeNotInBatch => "This batch does not contain the episode",
            ErrorClass::ConflictingSelection => "Choose either auto-select or a torrent, not both",
            ErrorClass::FileSelectionRequired => "Pick a file manually",
            ErrorClass::SourceRequired => "Pick a torrent first",
            ErrorClass::EngineFailure => "The streaming engine failed",
            ErrorClass::Configuration => "Check your external player link settings",
            ErrorClass::InvalidState => "The stream is not in a state that allows this",
            ErrorClass::NoActiveSession => "Nothing is streaming right now",
        }
    }
}

/// Error as delivered to the UI layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub class: ErrorClass,
    pub message: String,
}
