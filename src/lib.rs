//! anistream - torrent and debrid streaming for an anime library
//!
//! Picks the file for an episode inside a torrent or debrid item, starts a
//! stream on the engine, tracks its state and works out how the client should
//! play it. At most one engine download is active per client.
//!
//! # Modules
//!
//! - `models` - Requests, sources, files, playback descriptors
//! - `stream` - Catalog, file resolution, sessions, negotiation, registry
//! - `api` - HTTP clients for the backend's search and engine endpoints
//! - `error` - Error taxonomy and user-facing classes
//! - `config`, `cli`, `commands` - The command line front end

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod stream;

// Re-export commonly used types
pub use error::{CatalogError, EngineError, ErrorClass, ErrorReport, StreamError};
pub use models::{
    BatchEpisodeFiles, CandidateSource, ClientId, ClientInfo, DeviceKind, FileEntry,
    PlaybackDescriptor, PlaybackMode, PlaybackType, ResolvedFile, SourceSelection,
    StartStreamOptions, StreamRequest,
};

pub use api::{HttpCatalogProvider, HttpEngine};
pub use stream::{SessionState, StreamManager};
