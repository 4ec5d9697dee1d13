//! File resolution
//!
//! Picks the file inside a torrent/debrid item that holds the requested
//! episode, or rejects the request before any session is created.

use crate::error::{Result, StreamError};
use crate::models::{
    BatchEpisodeFiles, CandidateSource, ClientInfo, ResolvedFile, SourceSelection,
    StartStreamOptions, StreamRequest,
};
use crate::stream::engine::FileRef;

/// Check that auto-select and manual selection are not mixed
pub fn validate_selection(options: &StartStreamOptions) -> Result<()> {
    if options.auto_select {
        if options.torrent.is_some() || options.file_index.is_some() {
            return Err(StreamError::ConflictingSelection);
        }
        return Ok(());
    }

    if options.torrent.is_none() {
        return Err(StreamError::MissingSource);
    }
    Ok(())
}

impl TryFrom<StartStreamOptions> for StreamRequest {
    type Error = StreamError;

    fn try_from(options: StartStreamOptions) -> Result<Self> {
        validate_selection(&options)?;

        let selection = match options.torrent {
            Some(source) if !options.auto_select => SourceSelection::Manual {
                source,
                file_index: options.file_index,
            },
            _ => SourceSelection::Auto,
        };

        let ani_db_episode = options
            .ani_db_episode
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| options.episode_number.to_string());

        Ok(StreamRequest {
            media_id: options.media_id,
            media_title: options.media_title,
            episode_number: options.episode_number,
            ani_db_episode,
            selection,
            batch_episode_files: options.batch_episode_files,
            playback_type: options.playback_type,
            client: ClientInfo {
                id: options.client_id.into(),
                device: options.device_kind,
                hostname: options.client_hostname,
            },
        })
    }
}

/// Find the file for `episode_number` inside `source`
pub fn resolve(
    source: &CandidateSource,
    episode_number: u32,
    batch_episode_files: Option<&BatchEpisodeFiles>,
    file_index: Option<u32>,
) -> Result<ResolvedFile> {
    if source.is_batch {
        return resolve_batch(episode_number, batch_episode_files);
    }

    match source.files.as_slice() {
        [] => Ok(ResolvedFile {
            index: file_index.unwrap_or(0),
            file_id: None,
            path: source.title.clone(),
            size_bytes: source.size_bytes,
            episode_number,
        }),
        [only] if file_index.map_or(true, |i| i == only.index) => {
            Ok(ResolvedFile::from_entry(only, episode_number))
        }
        files => file_index
            .and_then(|i| files.iter().find(|f| f.index == i))
            .map(|f| ResolvedFile::from_entry(f, episode_number))
            .ok_or(StreamError::AmbiguousFile {
                episode: episode_number,
                candidates: files.len(),
            }),
    }
}

fn resolve_batch(
    episode_number: u32,
    batch_episode_files: Option<&BatchEpisodeFiles>,
) -> Result<ResolvedFile> {
    let batch = batch_episode_files.ok_or(StreamError::MissingBatchMapping)?;

    match batch.files_for(episode_number).as_slice() {
        [] => Err(StreamError::EpisodeNotFoundInBatch {
            episode: episode_number,
        }),
        [file] => Ok(ResolvedFile::from_entry(file, episode_number)),
        files => Err(StreamError::AmbiguousFile {
            episode: episode_number,
            candidates: files.len(),
        }),
    }
}

/// Turn a validated request into what the engine should download
pub fn file_ref_for(request: &StreamRequest) -> Result<FileRef> {
    match &request.selection {
        SourceSelection::Auto => Ok(FileRef::Auto {
            media_id: request.media_id,
            episode_number: request.episode_number,
            ani_db_episode: request.ani_db_episode.clone(),
        }),
        SourceSelection::Manual { source, file_index } => {
            let file = resolve(
                source,
                request.episode_number,
                request.batch_episode_files.as_ref(),
                *file_index,
            )?;
            Ok(FileRef::Manual {
                source: source.clone(),
                file,
            })
        }
    }
}
