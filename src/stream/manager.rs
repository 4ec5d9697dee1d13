//! Stream manager
//!
//! The facade the UI layer talks to: search for sources, start and cancel
//! streams, and observe sessions through events.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result, StreamError};
use crate::models::{CandidateSource, ClientId, StartStreamOptions, StreamProgress, StreamRequest};
use crate::stream::catalog::{CatalogResolver, SearchOptions};
use crate::stream::engine::{EngineEvent, FileRef, StreamEngine};
use crate::stream::events::{EventBus, SessionEvent, SessionEvents};
use crate::stream::negotiate::{NegotiationInput, Negotiator};
use crate::stream::registry::{release_or_record, SessionRegistry};
use crate::stream::resolve;
use crate::stream::session::{SessionCell, SessionState, StreamSession};

/// Default bound on the engine acknowledging a download
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Coordinates catalog, engine, sessions and negotiation
#[derive(Debug)]
pub struct StreamManager {
    engine: Arc<dyn StreamEngine>,
    catalog: CatalogResolver,
    registry: SessionRegistry,
    bus: EventBus,
    negotiator: Negotiator,
    resolve_timeout: Duration,
}

impl StreamManager {
    pub fn new(engine: Arc<dyn StreamEngine>, catalog: CatalogResolver) -> Self {
        Self {
            registry: SessionRegistry::new(Arc::clone(&engine)),
            engine,
            catalog,
            bus: EventBus::new(),
            negotiator: Negotiator::default(),
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }

    pub fn with_negotiator(mut self, negotiator: Negotiator) -> Self {
        self.negotiator = negotiator;
        self
    }

    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    pub fn engine(&self) -> &Arc<dyn StreamEngine> {
        &self.engine
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    pub async fn search_sources(&self, options: &SearchOptions) -> Result<Vec<CandidateSource>> {
        self.catalog.search(options).await
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Start streaming from the UI's wire request
    pub async fn start_stream(&self, options: StartStreamOptions) -> Result<Uuid> {
        let request = StreamRequest::try_from(options)?;
        self.start(request).await
    }

    /// Start streaming a validated request
    ///
    /// Selection and file resolution errors are returned before any session
    /// exists. Otherwise the client's previous session is cancelled and a new
    /// one runs until the engine acknowledges the download; readiness is then
    /// reported through events. A cancel arriving before the acknowledgement
    /// ends the session at once and the late download is released in the
    /// background. With `noneAndAwait` this only returns once the session
    /// settled.
    pub async fn start(&self, request: StreamRequest) -> Result<Uuid> {
        let file = resolve::file_ref_for(&request)?;
        let client = request.client.id.clone();
        let awaits_ready = request.playback_type.awaits_ready();

        let session = SessionCell::new(request, self.bus.clone());
        let session_id = session.id();
        let guard = self.registry.replace(&client, Arc::clone(&session)).await;

        info!(client = %client, session = %session_id, engine = %self.engine.kind(), episode = file.episode_number(), "starting stream");
        if session.transition(SessionState::Resolving).is_err() {
            debug!(session = %session_id, "session cancelled before resolving");
            return Ok(session_id);
        }

        let mut starting = {
            let engine = Arc::clone(&self.engine);
            let file = file.clone();
            let timeout = self.resolve_timeout;
            tokio::spawn(async move {
                tokio::time::timeout(timeout, engine.start_download(&file))
                    .await
                    .unwrap_or(Err(EngineError::Timeout(timeout)))
            })
        };

        let started = tokio::select! {
            joined = &mut starting => joined.unwrap_or_else(|err| {
                Err(EngineError::Unreachable(format!("download start aborted: {}", err)))
            }),
            _ = session.wait_terminal() => {
                info!(client = %client, session = %session_id, "session cancelled while resolving");
                let engine = Arc::clone(&self.engine);
                // the slot stays locked until the late download is gone
                tokio::spawn(async move {
                    if let Ok(Ok(download)) = starting.await {
                        let session = guard.session();
                        session.set_engine_handle(download.handle);
                        release_or_record(engine.as_ref(), session).await;
                    }
                });
                return Ok(session_id);
            }
        };

        let download = match started {
            Ok(download) => download,
            Err(err) => {
                warn!(client = %client, session = %session_id, error = %err, "engine did not start the download");
                let err = StreamError::Engine(err);
                session.fail(&err);
                return Err(err);
            }
        };

        debug!(session = %session_id, handle = %download.handle, "download acknowledged");
        session.set_engine_handle(download.handle);
        if session.transition(SessionState::Fetching).is_err() {
            debug!(session = %session_id, "session cancelled as the download was acknowledged");
            release_or_record(self.engine.as_ref(), &session).await;
            return Ok(session_id);
        }

        let pump = tokio::spawn(pump_events(
            Arc::clone(&session),
            download.events,
            file,
            self.negotiator.clone(),
            Arc::clone(&self.engine),
        ));
        self.registry.attach_pump(&client, session_id, pump);
        drop(guard);

        if awaits_ready {
            let state = session.wait_settled().await;
            debug!(session = %session_id, %state, "session settled");
        }
        Ok(session_id)
    }

    /// Start the episode after the client's current one
    pub async fn play_next_episode(&self, client: &ClientId) -> Result<Uuid> {
        let current = self
            .registry
            .current_cell(client)
            .ok_or_else(|| StreamError::NoActiveSession(client.to_string()))?;
        let next = current.snapshot().request.next_episode();
        self.start(next).await
    }

    pub async fn cancel_stream(&self, client: &ClientId) -> Result<()> {
        self.registry.cancel_active(client).await
    }

    /// The player started playing the ready stream
    pub fn mark_playing(&self, client: &ClientId) -> Result<()> {
        self.registry.mark_playing(client)
    }

    /// Playback finished
    pub async fn complete(&self, client: &ClientId) -> Result<()> {
        self.registry.complete_active(client).await
    }

    pub fn get_active(&self, client: &ClientId) -> Option<StreamSession> {
        self.registry.get_active(client)
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub fn subscribe(&self, client: &ClientId) -> SessionEvents {
        self.bus.subscribe(client.clone())
    }

    /// Push every event of `client` to `callback` until the manager goes away
    pub fn on_session_state_changed<F>(&self, client: &ClientId, callback: F) -> JoinHandle<()>
    where
        F: Fn(SessionEvent) + Send + 'static,
    {
        let mut events = self.subscribe(client);
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                callback(event);
            }
        })
    }
}

/// Feed engine events into the session until it finishes
///
/// A session that ends in `Error` here has its download released; other
/// endings are released by whoever finished the session.
async fn pump_events(
    session: Arc<SessionCell>,
    mut events: mpsc::Receiver<EngineEvent>,
    file: FileRef,
    negotiator: Negotiator,
    engine: Arc<dyn StreamEngine>,
) {
    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = session.wait_terminal() => break,
        };
        let Some(event) = event else {
            break;
        };
        if session.state().is_terminal() {
            break;
        }

        match event {
            EngineEvent::Progress { percent, message } => {
                session.update_progress(StreamProgress {
                    percent: percent.min(100),
                    message,
                });
            }
            EngineEvent::Ready { stream_url } => {
                // duplicate ready
                if session.state() != SessionState::Fetching {
                    continue;
                }

                let snapshot = session.snapshot();
                let request = &snapshot.request;
                let input = NegotiationInput::for_request(request, &file, stream_url);
                match negotiator.negotiate(&input, request.client.device, request.playback_type) {
                    Ok(descriptor) => {
                        info!(session = %snapshot.id, mode = %descriptor.mode, "stream ready");
                        let _ = session.mark_ready(descriptor);
                    }
                    Err(err) => {
                        warn!(session = %snapshot.id, error = %err, "playback negotiation failed");
                        session.fail(&err);
                    }
                }
            }
            EngineEvent::Failed { reason } => {
                warn!(session = %session.id(), %reason, "download failed");
                session.fail(&StreamError::Engine(EngineError::DownloadFailed(reason)));
            }
        }
    }

    if session.state().is_loading() {
        session.fail(&StreamError::Engine(EngineError::Unreachable(
            "engine event stream closed".to_string(),
        )));
    }
    if session.state() == SessionState::Error {
        release_or_record(engine.as_ref(), &session).await;
    }
}
