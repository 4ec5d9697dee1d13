//! CLI Command Handlers
//!
//! Implements all CLI commands on top of the streaming core.
//! Each handler takes CLI args, the loaded config and Output, returns ExitCode.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::api::{HttpCatalogProvider, HttpEngine};
use crate::cli::{ExitCode, LinkCmd, Output, SearchCmd, StreamCmd};
use crate::config::Config;
use crate::models::{
    CandidateSource, ClientId, MediaRef, PlaybackDescriptor, PlaybackType, StartStreamOptions,
};
use crate::stream::catalog::{sort_candidates, CatalogResolver, ResolutionFilter, SearchOptions};
use crate::stream::events::SessionEventKind;
use crate::stream::negotiate::{NegotiationInput, Negotiator};
use crate::stream::session::SessionState;
use crate::stream::StreamManager;

/// Catalog resolver for the configured backends
pub fn build_catalog(config: &Config) -> CatalogResolver {
    let resolver = CatalogResolver::new(Arc::new(HttpCatalogProvider::new(&config.server_url)));
    match &config.adult_catalog_url {
        Some(url) => resolver.with_adult(Arc::new(HttpCatalogProvider::new(url))),
        None => resolver,
    }
}

/// Stream manager wired to the configured backend
pub fn build_manager(config: &Config) -> StreamManager {
    let engine = HttpEngine::new(&config.server_url, config.engine)
        .with_poll_interval(config.poll_interval());

    StreamManager::new(Arc::new(engine), build_catalog(config))
        .with_negotiator(Negotiator::new(config.external_player_link.clone()))
        .with_resolve_timeout(config.resolve_timeout())
}

// =============================================================================
// Search Command
// =============================================================================

/// Search result with its position for `stream --pick`
#[derive(Debug, Serialize)]
struct IndexedCandidate {
    index: usize,
    #[serde(flatten)]
    source: CandidateSource,
}

pub async fn search_cmd(cmd: SearchCmd, config: &Config, output: &Output) -> ExitCode {
    let catalog = build_catalog(config);
    let resolution = cmd
        .resolution
        .clone()
        .or_else(|| config.preferred_resolution.clone());

    let options = SearchOptions {
        query: cmd.query.clone(),
        episode_number: cmd.episode,
        batch: cmd.batch,
        resolution: resolution.clone(),
        smart_search: cmd.smart,
        best: cmd.best,
        adult: cmd.adult,
        media: cmd.media_id.map(|id| MediaRef {
            id,
            title: cmd.query.clone(),
        }),
    };

    output.info(format!("Searching for: {}", cmd.query));

    let results = match catalog.search(&options).await {
        Ok(results) => results,
        Err(e) => return output.stream_error(&e),
    };

    let filter = resolution
        .as_deref()
        .map(ResolutionFilter::parse)
        .unwrap_or_default();
    let mut results = sort_candidates(&filter.apply(&results), &cmd.sort_state());
    results.truncate(cmd.limit);

    if results.is_empty() {
        return output.error("No torrents found", ExitCode::NoSources);
    }

    if output.json {
        let indexed: Vec<IndexedCandidate> = results
            .into_iter()
            .enumerate()
            .map(|(i, source)| IndexedCandidate {
                index: i + 1,
                source,
            })
            .collect();
        if let Err(e) = output.print(&indexed) {
            return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
        }
    } else {
        for (i, source) in results.iter().enumerate() {
            output.line(format!("{:>3}. {}", i + 1, source));
        }
    }
    ExitCode::Success
}

// =============================================================================
// Stream Command
// =============================================================================

/// Candidate built from a bare magnet link
pub fn candidate_from_magnet(magnet: &str) -> Option<CandidateSource> {
    let parsed = url::Url::parse(magnet).ok().filter(|u| u.scheme() == "magnet")?;

    let mut info_hash = None;
    let mut title = None;
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "xt" => {
                info_hash = value
                    .strip_prefix("urn:btih:")
                    .map(|h| h.to_lowercase());
            }
            "dn" => title = Some(value.into_owned()),
            _ => {}
        }
    }

    let info_hash = info_hash?;
    Some(CandidateSource {
        id: info_hash.clone(),
        link: magnet.to_string(),
        title: title.unwrap_or_else(|| info_hash.clone()),
        info_hash: Some(info_hash),
        release_group: None,
        resolution: None,
        seeders: 0,
        size_bytes: 0,
        is_batch: false,
        published_at: None,
        files: Vec::new(),
    })
}

async fn pick_candidate(cmd: &StreamCmd, config: &Config, n: usize) -> Result<CandidateSource, String> {
    let title = cmd
        .title
        .clone()
        .ok_or_else(|| "--pick needs --title to search".to_string())?;

    let options = SearchOptions {
        episode_number: Some(cmd.episode),
        resolution: config.preferred_resolution.clone(),
        ..SearchOptions::query(title)
    };
    let results = build_catalog(config)
        .search(&options)
        .await
        .map_err(|e| e.to_string())?;

    results
        .into_iter()
        .nth(n.saturating_sub(1))
        .ok_or_else(|| format!("No result #{}", n))
}

pub async fn stream_cmd(cmd: StreamCmd, config: &Config, output: &Output) -> ExitCode {
    let torrent = match (&cmd.magnet, cmd.pick) {
        (Some(magnet), _) => match candidate_from_magnet(magnet) {
            Some(source) => Some(source),
            None => return output.error("Invalid magnet link", ExitCode::InvalidArgs),
        },
        (None, Some(n)) => match pick_candidate(&cmd, config, n).await {
            Ok(source) => Some(source),
            Err(e) => return output.error(e, ExitCode::NoSources),
        },
        (None, None) => None,
    };

    let playback_type = cmd.playback.map(PlaybackType::from).unwrap_or(config.playback);
    let options = StartStreamOptions {
        media_id: cmd.media_id,
        media_title: cmd.title.clone(),
        episode_number: cmd.episode,
        ani_db_episode: cmd.anidb_episode.clone(),
        auto_select: cmd.auto,
        torrent,
        file_index: cmd.file_index,
        batch_episode_files: None,
        playback_type,
        client_id: cmd.client_id.clone(),
        device_kind: config.device,
        client_hostname: cmd.hostname.clone(),
    };

    let manager = build_manager(config);
    let client: ClientId = options.client_id.clone().into();
    let mut events = manager.subscribe(&client);

    output.info(format!(
        "Starting episode {} on the {} engine...",
        cmd.episode,
        manager.engine().kind()
    ));

    let session_id = match manager.start_stream(options).await {
        Ok(id) => id,
        Err(e) => return output.stream_error(&e),
    };
    debug!(session = %session_id, "stream started");

    loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else {
                    return output.error("Event stream closed", ExitCode::Error);
                };
                if event.session_id != session_id {
                    continue;
                }
                match event.kind {
                    SessionEventKind::Progress { percent, message } => {
                        output.info(format!("  {}% {}", percent, message.unwrap_or_default()));
                    }
                    SessionEventKind::Ready { descriptor } => {
                        return print_descriptor(&descriptor, output);
                    }
                    SessionEventKind::Failed { report } => {
                        let code = ExitCode::from(report.class);
                        return output.error(report.message, code);
                    }
                    SessionEventKind::StateChanged { to: SessionState::Cancelled, .. } => {
                        return output.error("Stream was cancelled", ExitCode::Cancelled);
                    }
                    SessionEventKind::CleanupFailed { report } => {
                        output.info(format!("Download not released: {}", report.message));
                    }
                    SessionEventKind::StateChanged { .. } => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                output.info("Cancelling...");
                if let Err(e) = manager.cancel_stream(&client).await {
                    return output.stream_error(&e);
                }
                return ExitCode::Cancelled;
            }
        }
    }
}

fn print_descriptor(descriptor: &PlaybackDescriptor, output: &Output) -> ExitCode {
    if output.json {
        if let Err(e) = output.print(descriptor) {
            return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
        }
    } else {
        output.info(format!("▶ {} ({})", descriptor.title, descriptor.mode));
        output.line(&descriptor.url);
    }
    ExitCode::Success
}

// =============================================================================
// Link Command
// =============================================================================

pub async fn link_cmd(cmd: LinkCmd, config: &Config, output: &Output) -> ExitCode {
    let template = cmd
        .template
        .clone()
        .or_else(|| config.external_player_link.clone());
    let hostname = cmd
        .hostname
        .clone()
        .or_else(|| local_ip_address::local_ip().ok().map(|ip| ip.to_string()));
    let device = cmd.device.map(Into::into).unwrap_or(config.device);

    let mut input = NegotiationInput::new(&cmd.url, &cmd.title, cmd.episode);
    if let Some(hostname) = hostname {
        input = input.with_client_hostname(hostname);
    }

    match Negotiator::new(template).negotiate(&input, device, cmd.playback.into()) {
        Ok(descriptor) => print_descriptor(&descriptor, output),
        Err(e) => output.stream_error(&e),
    }
}
