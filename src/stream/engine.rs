//! Streaming engine contract
//!
//! The torrent client and the debrid service both sit behind [`StreamEngine`]:
//! the manager asks for a file, gets back a handle plus a channel of progress
//! events, and later releases the handle.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::EngineError;
use crate::models::{CandidateSource, ResolvedFile};

/// Which backend serves the download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Local torrent client streaming over HTTP
    #[default]
    Torrent,
    /// Debrid service caching the torrent remotely
    Debrid,
}

impl EngineKind {
    /// API path segment for the backend
    pub fn path_segment(&self) -> &'static str {
        match self {
            EngineKind::Torrent => "torrentstream",
            EngineKind::Debrid => "debrid",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Torrent => write!(f, "torrent"),
            EngineKind::Debrid => write!(f, "debrid"),
        }
    }
}

/// Opaque reference to a running engine download
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineHandle(String);

impl EngineHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the engine is asked to download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FileRef {
    /// A file the user picked (or that was resolved from a batch)
    Manual {
        source: CandidateSource,
        file: ResolvedFile,
    },
    /// Let the engine search and pick
    #[serde(rename_all = "camelCase")]
    Auto {
        media_id: u32,
        episode_number: u32,
        ani_db_episode: String,
    },
}

impl FileRef {
    pub fn episode_number(&self) -> u32 {
        match self {
            FileRef::Manual { file, .. } => file.episode_number,
            FileRef::Auto { episode_number, .. } => *episode_number,
        }
    }

    /// Path of the chosen file, when known up front
    pub fn path(&self) -> Option<&str> {
        match self {
            FileRef::Manual { file, .. } => Some(&file.path),
            FileRef::Auto { .. } => None,
        }
    }
}

/// Event emitted by an engine download
///
/// Delivery is at-least-once: consumers must tolerate duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Progress {
        percent: u8,
        message: Option<String>,
    },
    Ready {
        stream_url: String,
    },
    Failed {
        reason: String,
    },
}

/// Acknowledged download
#[derive(Debug)]
pub struct Download {
    pub handle: EngineHandle,
    pub events: mpsc::Receiver<EngineEvent>,
}

/// Torrent or debrid backend able to stream a file over HTTP
#[async_trait]
pub trait StreamEngine: Send + Sync + fmt::Debug {
    /// Start downloading a file; returns once the engine acknowledged it
    async fn start_download(&self, file: &FileRef) -> Result<Download, EngineError>;

    /// Release a download; releasing an unknown handle is not an error
    async fn cancel_download(&self, handle: &EngineHandle) -> Result<(), EngineError>;

    fn kind(&self) -> EngineKind;
}
