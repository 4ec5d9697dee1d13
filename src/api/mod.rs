//! HTTP clients for the streaming backend
//!
//! - Catalog: torrent search
//! - Engine: torrent stream / debrid downloads

pub mod catalog;
pub mod engine;

pub use catalog::HttpCatalogProvider;
pub use engine::HttpEngine;
