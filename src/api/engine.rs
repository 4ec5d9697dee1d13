//! HTTP streaming engine client
//!
//! Drives the backend's torrent stream or debrid download endpoints. Status
//! is polled and forwarded as [`EngineEvent`]s until the stream is ready or
//! the download failed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::stream::engine::{Download, EngineEvent, EngineHandle, EngineKind, FileRef, StreamEngine};

/// Default delay between status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

const EVENT_BUFFER: usize = 32;

#[derive(Debug, Deserialize)]
struct StartResponse {
    handle: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum DownloadStatus {
    Downloading,
    Ready,
    Failed,
}

/// Status endpoint response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    status: DownloadStatus,
    #[serde(default)]
    progress: f64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    stream_url: Option<String>,
}

impl StatusResponse {
    fn into_event(self) -> EngineEvent {
        match (self.status, self.stream_url) {
            (DownloadStatus::Ready, Some(stream_url)) => EngineEvent::Ready { stream_url },
            (DownloadStatus::Ready, None) => EngineEvent::Failed {
                reason: "engine reported ready without a stream URL".to_string(),
            },
            (DownloadStatus::Failed, _) => EngineEvent::Failed {
                reason: self.message.unwrap_or_else(|| "download failed".to_string()),
            },
            (DownloadStatus::Downloading, _) => EngineEvent::Progress {
                percent: self.progress.clamp(0.0, 100.0).round() as u8,
                message: self.message,
            },
        }
    }
}

/// Torrent/debrid engine reached over the backend's HTTP API
#[derive(Debug, Clone)]
pub struct HttpEngine {
    base_url: String,
    kind: EngineKind,
    poll_interval: Duration,
    client: reqwest::Client,
}

impl HttpEngine {
    pub fn new(base_url: impl Into<String>, kind: EngineKind) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            kind,
            poll_interval: DEFAULT_POLL_INTERVAL,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn downloads_url(&self) -> String {
        format!("{}/api/v1/{}/downloads", self.base_url, self.kind.path_segment())
    }

    fn download_url(&self, handle: &EngineHandle) -> String {
        format!(
            "{}/{}",
            self.downloads_url(),
            urlencoding::encode(handle.as_str())
        )
    }
}

async fn rejected(response: reqwest::Response) -> EngineError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    EngineError::Rejected { status, message }
}

/// Poll the status endpoint until the download settles or nobody listens
async fn poll_status(
    client: reqwest::Client,
    url: String,
    interval: Duration,
    tx: mpsc::Sender<EngineEvent>,
) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tx.closed() => return,
        }

        let event = match fetch_status(&client, &url).await {
            Ok(status) => status.into_event(),
            Err(err) => {
                warn!(%url, error = %err, "status poll failed");
                EngineEvent::Failed {
                    reason: err.to_string(),
                }
            }
        };

        let done = !matches!(event, EngineEvent::Progress { .. });
        if tx.send(event).await.is_err() || done {
            return;
        }
    }
}

async fn fetch_status(client: &reqwest::Client, url: &str) -> Result<StatusResponse, EngineError> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(rejected(response).await);
    }
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| EngineError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl StreamEngine for HttpEngine {
    async fn start_download(&self, file: &FileRef) -> Result<Download, EngineError> {
        let url = self.downloads_url();
        debug!(%url, kind = %self.kind, "starting download");

        let response = self.client.post(&url).json(file).send().await?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        let text = response.text().await?;
        let started: StartResponse =
            serde_json::from_str(&text).map_err(|e| EngineError::InvalidResponse(e.to_string()))?;
        let handle = EngineHandle::new(started.handle);

        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(poll_status(
            self.client.clone(),
            self.download_url(&handle),
            self.poll_interval,
            tx,
        ));

        Ok(Download { handle, events })
    }

    async fn cancel_download(&self, handle: &EngineHandle) -> Result<(), EngineError> {
        let url = self.download_url(handle);
        debug!(%url, "releasing download");

        let response = self.client.delete(&url).send().await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            // already gone
            StatusCode::NOT_FOUND => Ok(()),
            _ => Err(rejected(response).await),
        }
    }

    fn kind(&self) -> EngineKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_into_event() {
        let status: StatusResponse =
            serde_json::from_str(r#"{"status":"downloading","progress":42.4,"message":"Checking torrent"}"#)
                .unwrap();
        assert_eq!(
            status.into_event(),
            EngineEvent::Progress {
                percent: 42,
                message: Some("Checking torrent".into())
            }
        );

        let status: StatusResponse = serde_json::from_str(r#"{"status":"ready"}"#).unwrap();
        assert!(matches!(status.into_event(), EngineEvent::Failed { .. }));
    }

    #[test]
    fn test_urls_follow_engine_kind() {
        let engine = HttpEngine::new("http://localhost:43211/", EngineKind::Debrid);
        assert_eq!(
            engine.download_url(&EngineHandle::new("a b")),
            "http://localhost:43211/api/v1/debrid/downloads/a%20b"
        );
    }
}
