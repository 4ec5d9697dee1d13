//! Streaming core
//!
//! - Catalog: search options, provider routing, result sorting
//! - Resolve: which file inside a torrent holds the episode
//! - Session: per-attempt state machine
//! - Negotiate: embedded / native / external-link delivery
//! - Registry: one active session per client, cancellation
//! - Manager: facade tying the above to an engine

pub mod catalog;
pub mod engine;
pub mod events;
pub mod manager;
pub mod negotiate;
pub mod registry;
pub mod resolve;
pub mod session;

pub use catalog::{CatalogProvider, CatalogResolver, SearchOptions, SortDirection, SortField, SortState};
pub use engine::{Download, EngineEvent, EngineHandle, EngineKind, FileRef, StreamEngine};
pub use events::{EventBus, SessionEvent, SessionEventKind, SessionEvents};
pub use manager::StreamManager;
pub use negotiate::{NegotiationInput, Negotiator};
pub use registry::SessionRegistry;
pub use session::{SessionState, StreamSession};
