//! File Resolution Tests
//!
//! Tests for turning a start request into the file the engine downloads.

use anistream::error::{ErrorClass, StreamError};
use anistream::models::{
    BatchEpisodeFiles, CandidateSource, ClientInfo, DeviceKind, FileEntry, PlaybackType,
    SourceSelection, StartStreamOptions, StreamRequest,
};
use anistream::stream::engine::FileRef;
use anistream::stream::resolve::{file_ref_for, resolve};

fn source(is_batch: bool, files: Vec<FileEntry>) -> CandidateSource {
    CandidateSource {
        id: "hash".into(),
        link: "magnet:?xt=urn:btih:hash".into(),
        info_hash: Some("hash".into()),
        title: "[Judas] Mushishi (Season 1) [1080p]".into(),
        release_group: Some("Judas".into()),
        resolution: Some("1080p".into()),
        seeders: 42,
        size_bytes: 30_000_000_000,
        is_batch,
        published_at: None,
        files,
    }
}

fn client() -> ClientInfo {
    ClientInfo::new("web-1", DeviceKind::Web)
}

// =============================================================================
// Batches
// =============================================================================

/// Test: Batch mapping resolves the episode's file
#[test]
fn test_batch_resolves_mapped_file() {
    let batch = BatchEpisodeFiles::new()
        .with(1, FileEntry::new(0, "Mushishi/01.mkv", 900))
        .with(2, FileEntry::new(1, "Mushishi/02.mkv", 910));

    let file = resolve(&source(true, vec![]), 2, Some(&batch), None).unwrap();
    assert_eq!(file.index, 1);
    assert_eq!(file.path, "Mushishi/02.mkv");
    assert_eq!(file.episode_number, 2);
}

/// Test: Batch without a mapping is rejected
#[test]
fn test_batch_requires_mapping() {
    let err = resolve(&source(true, vec![]), 1, None, None).unwrap_err();
    assert!(matches!(err, StreamError::MissingBatchMapping));
}

/// Test: Episode missing from the mapping
#[test]
fn test_batch_episode_missing() {
    let batch = BatchEpisodeFiles::new().with(1, FileEntry::new(0, "01.mkv", 1));
    let err = resolve(&source(true, vec![]), 7, Some(&batch), None).unwrap_err();

    assert!(matches!(err, StreamError::EpisodeNotFoundInBatch { episode: 7 }));
    assert_eq!(err.class(), ErrorClass::EpisodeNotInBatch);
}

/// Test: Two files mapped to one episode need a manual pick
#[test]
fn test_batch_two_files_for_episode() {
    let batch = BatchEpisodeFiles::new()
        .with(5, FileEntry::new(4, "05.mkv", 1))
        .with(5, FileEntry::new(9, "05v2.mkv", 1));

    let err = resolve(&source(true, vec![]), 5, Some(&batch), None).unwrap_err();
    assert!(matches!(
        err,
        StreamError::AmbiguousFile {
            episode: 5,
            candidates: 2
        }
    ));
    assert_eq!(err.class(), ErrorClass::FileSelectionRequired);
}

// =============================================================================
// Single Sources
// =============================================================================

/// Test: A multi-file torrent needs a file index
#[test]
fn test_multi_file_needs_index() {
    let files = vec![
        FileEntry::new(0, "ep.mkv", 1_000),
        FileEntry::new(1, "ep.ass", 10),
    ];

    let err = resolve(&source(false, files.clone()), 1, None, None).unwrap_err();
    assert_eq!(err.class(), ErrorClass::FileSelectionRequired);

    let file = resolve(&source(false, files.clone()), 1, None, Some(0)).unwrap();
    assert_eq!(file.path, "ep.mkv");

    // index not present in the listing
    assert!(resolve(&source(false, files), 1, None, Some(8)).is_err());
}

/// Test: A torrent without a listing streams its first file
#[test]
fn test_unlisted_torrent_uses_title() {
    let file = resolve(&source(false, vec![]), 1, None, None).unwrap();
    assert_eq!(file.index, 0);
    assert_eq!(file.path, "[Judas] Mushishi (Season 1) [1080p]");
}

// =============================================================================
// Requests
// =============================================================================

/// Test: Wire options become a manual request with the picked file
#[test]
fn test_options_into_manual_request() {
    let options = StartStreamOptions {
        media_id: 457,
        media_title: Some("Mushishi".into()),
        episode_number: 2,
        torrent: Some(source(false, vec![FileEntry::new(3, "02.mkv", 1)])),
        file_index: Some(3),
        playback_type: PlaybackType::NativePlayer,
        client_id: "desktop".into(),
        device_kind: DeviceKind::Desktop,
        ..Default::default()
    };

    let request = StreamRequest::try_from(options).unwrap();
    assert!(!request.is_auto());
    assert_eq!(request.ani_db_episode, "2");
    assert_eq!(request.client.id.as_str(), "desktop");
    assert!(matches!(
        request.selection,
        SourceSelection::Manual {
            file_index: Some(3),
            ..
        }
    ));

    let FileRef::Manual { file, .. } = file_ref_for(&request).unwrap() else {
        panic!("expected manual file ref");
    };
    assert_eq!(file.index, 3);
}

/// Test: Selection must be either auto or a source
#[test]
fn test_selection_validation() {
    let conflicting = StartStreamOptions {
        auto_select: true,
        file_index: Some(0),
        ..Default::default()
    };
    assert!(matches!(
        StreamRequest::try_from(conflicting),
        Err(StreamError::ConflictingSelection)
    ));

    let missing = StartStreamOptions::default();
    assert!(matches!(
        StreamRequest::try_from(missing),
        Err(StreamError::MissingSource)
    ));
}

/// Test: Wire options parse from the UI's camelCase JSON
#[test]
fn test_options_from_json() {
    let options: StartStreamOptions = serde_json::from_str(
        r#"{
            "mediaId": 21,
            "episodeNumber": 1100,
            "aniDBEpisode": "S1",
            "autoSelect": true,
            "playbackType": "noneAndAwait",
            "clientId": "tv"
        }"#,
    )
    .unwrap();

    let request = StreamRequest::try_from(options).unwrap();
    assert!(request.is_auto());
    assert_eq!(request.ani_db_episode, "S1");
    assert_eq!(request.playback_type, PlaybackType::NoneAndAwait);
    assert_eq!(
        file_ref_for(&request).unwrap(),
        FileRef::Auto {
            media_id: 21,
            episode_number: 1100,
            ani_db_episode: "S1".into()
        }
    );
}

/// Test: Next episode stays in the batch while it covers the episode
#[test]
fn test_next_episode() {
    let batch = BatchEpisodeFiles::new()
        .with(1, FileEntry::new(0, "01.mkv", 1))
        .with(2, FileEntry::new(1, "02.mkv", 1));
    let request = StreamRequest::manual(457, 1, source(true, vec![]), client()).with_batch_files(batch);

    let second = request.next_episode();
    assert_eq!(second.episode_number, 2);
    assert!(!second.is_auto());
    assert!(file_ref_for(&second).is_ok());

    let third = second.next_episode();
    assert_eq!(third.episode_number, 3);
    assert!(third.is_auto());
    assert_eq!(third.batch_episode_files, None);
}
