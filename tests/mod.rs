//! Integration tests for anistream
//!
//! Tests are organized by component:
//! - catalog_test: Torrent search client, search validation, sorting
//! - resolve_test: Episode file resolution for single and batch torrents
//! - negotiate_test: Playback mode decision and external player links
//! - engine_test: HTTP torrent/debrid engine client
//! - session_test: Session lifecycle, replacement and cancellation ordering
//! - cli_test: Argument parsing, JSON output and command handlers

// Note: Each test file is a separate integration test crate
// Tests are run individually by cargo, not via mod.rs
