//! Data structures and types for anistream
//!
//! Contains the shared models used across the library organized by domain:
//! - **Clients**: who is streaming and on what kind of device
//! - **Catalog**: torrent/debrid search results and their file listings
//! - **Requests**: stream requests and their wire form
//! - **Playback**: how a ready stream is handed to the player

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Client Models
// =============================================================================

/// Identifier of a UI client (one browser tab, one desktop window)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capability class of the client requesting playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Desktop app that can launch a native player
    Desktop,
    /// Plain browser
    #[default]
    Web,
    /// Phone or tablet browser
    Mobile,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Desktop => write!(f, "desktop"),
            DeviceKind::Web => write!(f, "web"),
            DeviceKind::Mobile => write!(f, "mobile"),
        }
    }
}

/// The client a request belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub id: ClientId,
    pub device: DeviceKind,
    /// Hostname the client reaches the server through (browser location)
    pub hostname: Option<String>,
}

impl ClientInfo {
    pub fn new(id: impl Into<ClientId>, device: DeviceKind) -> Self {
        Self {
            id: id.into(),
            device,
            hostname: None,
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }
}

/// Media the stream is for, used by smart search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub id: u32,
    pub title: String,
}

// =============================================================================
// Catalog Models
// =============================================================================

/// One file inside a torrent or debrid item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub index: u32,
    /// Provider file id (debrid services address files by id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub path: String,
    #[serde(default)]
    pub size_bytes: u64,
}

impl FileEntry {
    pub fn new(index: u32, path: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            index,
            id: None,
            path: path.into(),
            size_bytes,
        }
    }

    /// File name without directories
    pub fn name(&self) -> &str {
        self.path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.path)
    }
}

/// Torrent or debrid search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSource {
    pub id: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_hash: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default)]
    pub seeders: u32,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub is_batch: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// File listing, when the provider knows it
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileEntry>,
}

impl CandidateSource {
    /// Numeric resolution extracted from strings like "1080p" (0 when unknown)
    pub fn resolution_value(&self) -> u32 {
        self.resolution
            .as_deref()
            .map(|r| r.chars().filter(char::is_ascii_digit).collect::<String>())
            .and_then(|digits| digits.parse().ok())
            .unwrap_or(0)
    }

    /// Publication time as a unix timestamp (0 when unknown)
    pub fn published_timestamp(&self) -> i64 {
        self.published_at.map(|d| d.timestamp()).unwrap_or(0)
    }

    /// Generate a magnet URL when the info hash is known
    pub fn to_magnet(&self) -> Option<String> {
        self.info_hash.as_ref().map(|hash| {
            format!(
                "magnet:?xt=urn:btih:{}&dn={}",
                hash,
                urlencoding::encode(&self.title)
            )
        })
    }

    /// Format size for display
    pub fn format_size(&self) -> String {
        let bytes = self.size_bytes;
        if bytes >= 1024 * 1024 * 1024 {
            format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
        } else if bytes >= 1024 * 1024 {
            format!("{:.0} MB", bytes as f64 / (1024.0 * 1024.0))
        } else if bytes > 0 {
            format!("{} KB", bytes / 1024)
        } else {
            "? GB".to_string()
        }
    }
}

impl fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resolution = self.resolution.as_deref().unwrap_or("???");
        let batch = if self.is_batch { " [batch]" } else { "" };
        write!(
            f,
            "[{}] {} 👤{} {}{}",
            resolution,
            self.format_size(),
            self.seeders,
            self.title,
            batch
        )
    }
}

/// Episode-to-file mapping inside a batch, produced by the provider's matcher
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEpisodeFiles {
    pub files: Vec<BatchFile>,
}

/// One matched file of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFile {
    pub episode_number: u32,
    pub file: FileEntry,
}

impl BatchEpisodeFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, episode_number: u32, file: FileEntry) -> Self {
        self.insert(episode_number, file);
        self
    }

    pub fn insert(&mut self, episode_number: u32, file: FileEntry) {
        self.files.push(BatchFile {
            episode_number,
            file,
        });
    }

    /// Distinct files mapped to an episode
    pub fn files_for(&self, episode_number: u32) -> Vec<&FileEntry> {
        let mut found: Vec<&FileEntry> = Vec::new();
        for entry in self.files.iter().filter(|f| f.episode_number == episode_number) {
            if !found.iter().any(|f| f.index == entry.file.index) {
                found.push(&entry.file);
            }
        }
        found
    }

    pub fn contains(&self, episode_number: u32) -> bool {
        self.files.iter().any(|f| f.episode_number == episode_number)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// The file chosen for the requested episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedFile {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    pub path: String,
    pub size_bytes: u64,
    pub episode_number: u32,
}

impl ResolvedFile {
    pub fn from_entry(entry: &FileEntry, episode_number: u32) -> Self {
        Self {
            index: entry.index,
            file_id: entry.id.clone(),
            path: entry.path.clone(),
            size_bytes: entry.size_bytes,
            episode_number,
        }
    }
}

// =============================================================================
// Request Models
// =============================================================================

/// How the user wants the stream delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlaybackType {
    /// Play in the embedded player
    #[default]
    #[serde(rename = "default")]
    Default,
    /// Play in the desktop app's native player
    #[serde(rename = "nativeplayer")]
    NativePlayer,
    /// Hand the stream to an external player through a link
    #[serde(rename = "externalPlayerLink")]
    ExternalPlayerLink,
    /// Prepare the stream, do not start playback
    #[serde(rename = "none")]
    None,
    /// Like `None`, but the start call returns only once the stream settled
    #[serde(rename = "noneAndAwait")]
    NoneAndAwait,
}

impl PlaybackType {
    pub fn awaits_ready(&self) -> bool {
        matches!(self, PlaybackType::NoneAndAwait)
    }
}

impl fmt::Display for PlaybackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackType::Default => write!(f, "default"),
            PlaybackType::NativePlayer => write!(f, "nativeplayer"),
            PlaybackType::ExternalPlayerLink => write!(f, "externalPlayerLink"),
            PlaybackType::None => write!(f, "none"),
            PlaybackType::NoneAndAwait => write!(f, "noneAndAwait"),
        }
    }
}

/// Which source to stream from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceSelection {
    /// The user picked a torrent (and maybe a file)
    Manual {
        source: CandidateSource,
        file_index: Option<u32>,
    },
    /// The engine searches and selects on its own
    Auto,
}

/// One validated attempt to stream an episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub media_id: u32,
    pub media_title: Option<String>,
    pub episode_number: u32,
    pub ani_db_episode: String,
    pub selection: SourceSelection,
    pub batch_episode_files: Option<BatchEpisodeFiles>,
    pub playback_type: PlaybackType,
    pub client: ClientInfo,
}

impl StreamRequest {
    /// Auto-select request for an episode
    pub fn auto(media_id: u32, episode_number: u32, client: ClientInfo) -> Self {
        Self {
            media_id,
            media_title: None,
            episode_number,
            ani_db_episode: episode_number.to_string(),
            selection: SourceSelection::Auto,
            batch_episode_files: None,
            playback_type: PlaybackType::Default,
            client,
        }
    }

    /// Manual request for a chosen source
    pub fn manual(
        media_id: u32,
        episode_number: u32,
        source: CandidateSource,
        client: ClientInfo,
    ) -> Self {
        Self {
            selection: SourceSelection::Manual {
                source,
                file_index: None,
            },
            ..Self::auto(media_id, episode_number, client)
        }
    }

    pub fn with_batch_files(mut self, files: BatchEpisodeFiles) -> Self {
        self.batch_episode_files = Some(files);
        self
    }

    pub fn with_file_index(mut self, index: u32) -> Self {
        if let SourceSelection::Manual { file_index, .. } = &mut self.selection {
            *file_index = Some(index);
        }
        self
    }

    pub fn with_media_title(mut self, title: impl Into<String>) -> Self {
        self.media_title = Some(title.into());
        self
    }

    pub fn with_playback(mut self, playback_type: PlaybackType) -> Self {
        self.playback_type = playback_type;
        self
    }

    pub fn is_auto(&self) -> bool {
        matches!(self.selection, SourceSelection::Auto)
    }

    /// Media title, falling back to the source title
    pub fn display_title(&self) -> String {
        self.media_title
            .clone()
            .or_else(|| self.source().map(|s| s.title.clone()))
            .unwrap_or_else(|| format!("Media {}", self.media_id))
    }

    pub fn source(&self) -> Option<&CandidateSource> {
        match &self.selection {
            SourceSelection::Manual { source, .. } => Some(source),
            SourceSelection::Auto => None,
        }
    }

    /// Request for the following episode (autoplay)
    ///
    /// Keeps the same batch when its mapping covers the next episode, otherwise
    /// falls back to auto-select.
    pub fn next_episode(&self) -> StreamRequest {
        let next = self.episode_number.saturating_add(1);
        let batch = self
            .batch_episode_files
            .as_ref()
            .filter(|files| files.contains(next));

        let (selection, batch_episode_files) = match (&self.selection, batch) {
            (SourceSelection::Manual { source, .. }, Some(files)) if source.is_batch => (
                SourceSelection::Manual {
                    source: source.clone(),
                    file_index: None,
                },
                Some(files.clone()),
            ),
            _ => (SourceSelection::Auto, None),
        };

        StreamRequest {
            episode_number: next,
            ani_db_episode: next.to_string(),
            selection,
            batch_episode_files,
            ..self.clone()
        }
    }
}

/// Wire form of a start request as sent by the UI
///
/// Auto-select and manual selection arrive as independent fields here;
/// `StreamRequest::try_from` folds them into a single [`SourceSelection`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartStreamOptions {
    pub media_id: u32,
    #[serde(default)]
    pub media_title: Option<String>,
    pub episode_number: u32,
    #[serde(default, rename = "aniDBEpisode")]
    pub ani_db_episode: Option<String>,
    #[serde(default)]
    pub auto_select: bool,
    #[serde(default)]
    pub torrent: Option<CandidateSource>,
    #[serde(default)]
    pub file_index: Option<u32>,
    #[serde(default)]
    pub batch_episode_files: Option<BatchEpisodeFiles>,
    #[serde(default)]
    pub playback_type: PlaybackType,
    pub client_id: String,
    #[serde(default)]
    pub device_kind: DeviceKind,
    #[serde(default)]
    pub client_hostname: Option<String>,
}

// =============================================================================
// Playback Models
// =============================================================================

/// Delivery mode decided by negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaybackMode {
    Embedded,
    Native,
    ExternalLink,
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackMode::Embedded => write!(f, "embedded"),
            PlaybackMode::Native => write!(f, "native"),
            PlaybackMode::ExternalLink => write!(f, "external-link"),
        }
    }
}

/// What the client needs to start playing a ready stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackDescriptor {
    pub url: String,
    pub mode: PlaybackMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_hint: Option<String>,
    /// Window title for the player
    pub title: String,
}

/// Download progress reported by the engine, passed through to the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamProgress {
    pub percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl fmt::Display for StreamProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{}% {}", self.percent, msg),
            None => write!(f, "{}%", self.percent),
        }
    }
}
