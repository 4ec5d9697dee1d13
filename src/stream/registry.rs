//! Session registry
//!
//! Keeps at most one active session per client. Starting a new session for a
//! client first releases the previous one's engine download, and the client
//! stays locked until the new download has been acknowledged, so two downloads
//! never run concurrently for the same client. A cancel or a newer start that
//! arrives while a session is still resolving cancels it right away; the
//! starting task keeps the slot until it has released whatever the engine
//! hands back late.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result, StreamError};
use crate::models::ClientId;
use crate::stream::engine::StreamEngine;
use crate::stream::session::{SessionCell, SessionState, StreamSession};

#[derive(Debug, Default)]
struct ClientSlot {
    serial: Arc<AsyncMutex<()>>,
    current: Option<Arc<SessionCell>>,
    pump: Option<JoinHandle<()>>,
}

/// Keeps the client's slot locked while its new session is being started
#[derive(Debug)]
pub struct SlotGuard {
    _serial: OwnedMutexGuard<()>,
    session: Arc<SessionCell>,
}

impl SlotGuard {
    pub fn session(&self) -> &Arc<SessionCell> {
        &self.session
    }
}

/// One active session per client
#[derive(Debug)]
pub struct SessionRegistry {
    slots: Mutex<HashMap<ClientId, ClientSlot>>,
    engine: Arc<dyn StreamEngine>,
}

impl SessionRegistry {
    pub fn new(engine: Arc<dyn StreamEngine>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            engine,
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<ClientId, ClientSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn serial(&self, client: &ClientId) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots();
        Arc::clone(&slots.entry(client.clone()).or_default().serial)
    }

    /// Snapshot of the client's session, if it has not finished yet
    pub fn get_active(&self, client: &ClientId) -> Option<StreamSession> {
        self.active_cell(client).map(|cell| cell.snapshot())
    }

    /// The client's session, if it has not finished yet
    pub fn active_cell(&self, client: &ClientId) -> Option<Arc<SessionCell>> {
        self.current_cell(client)
            .filter(|cell| !cell.state().is_terminal())
    }

    /// The client's most recent session, finished or not
    pub fn current_cell(&self, client: &ClientId) -> Option<Arc<SessionCell>> {
        self.slots()
            .get(client)
            .and_then(|slot| slot.current.clone())
    }

    /// Install `session` as the client's active session
    ///
    /// The previous session is cancelled and its engine download released
    /// first. A failed release is recorded on the old session, published, and
    /// does not block the replacement.
    pub async fn replace(&self, client: &ClientId, session: Arc<SessionCell>) -> SlotGuard {
        self.interrupt_start(client);
        let serial = self.serial(client).lock_owned().await;

        let (previous, pump) = {
            let mut slots = self.slots();
            let slot = slots.entry(client.clone()).or_default();
            (slot.current.take(), slot.pump.take())
        };

        if let Some(previous) = previous {
            info!(client = %client, session = %previous.id(), "replacing active session");
            let _ = previous.transition(SessionState::Cancelled);
            stop_pump(pump).await;
            release_or_record(self.engine.as_ref(), &previous).await;
        }

        {
            let mut slots = self.slots();
            slots.entry(client.clone()).or_default().current = Some(Arc::clone(&session));
        }

        SlotGuard {
            _serial: serial,
            session,
        }
    }

    /// Attach the event pump of the client's current session
    ///
    /// The task is aborted right away if the session was replaced meanwhile.
    pub fn attach_pump(&self, client: &ClientId, session_id: Uuid, pump: JoinHandle<()>) {
        let mut slots = self.slots();
        match slots.get_mut(client) {
            Some(slot) if slot.current.as_ref().is_some_and(|c| c.id() == session_id) => {
                if let Some(old) = slot.pump.replace(pump) {
                    old.abort();
                }
            }
            _ => pump.abort(),
        }
    }

    /// Cancel the client's active session
    ///
    /// Cancelling when nothing is active is a no-op. A session still waiting
    /// on the engine is cancelled at once and its start releases the download
    /// if one shows up. Otherwise the session ends up `Cancelled` even if the
    /// engine fails to release the download; that failure is recorded on the
    /// session and returned. A failed session still holding its download gets
    /// it released without changing state.
    pub async fn cancel_active(&self, client: &ClientId) -> Result<()> {
        if self.interrupt_start(client) {
            return Ok(());
        }
        let serial = self.serial(client).lock_owned().await;

        let target = {
            let mut slots = self.slots();
            slots.get_mut(client).and_then(|slot| match &slot.current {
                Some(cell) if !cell.state().is_terminal() || cell.engine_handle().is_some() => {
                    Some((Arc::clone(cell), slot.pump.take()))
                }
                _ => None,
            })
        };
        let Some((session, pump)) = target else {
            debug!(client = %client, "no active session to cancel");
            drop(serial);
            self.prune(client);
            return Ok(());
        };

        info!(client = %client, session = %session.id(), state = %session.state(), "cancelling session");
        let _ = session.transition(SessionState::Cancelled);
        stop_pump(pump).await;
        let released = release_download(self.engine.as_ref(), &session).await;
        drop(serial);
        self.prune(client);

        released.map_err(|err| {
            warn!(client = %client, session = %session.id(), error = %err, "failed to release download");
            let err = StreamError::Engine(err);
            session.record_cleanup_error(err.report());
            err
        })
    }

    /// `Ready → Playing` for the client's session
    pub fn mark_playing(&self, client: &ClientId) -> Result<()> {
        let session = self
            .active_cell(client)
            .ok_or_else(|| StreamError::NoActiveSession(client.to_string()))?;
        session.transition(SessionState::Playing)?;
        Ok(())
    }

    /// Finish the client's session and release its download
    pub async fn complete_active(&self, client: &ClientId) -> Result<()> {
        let serial = self.serial(client).lock_owned().await;

        let Some(session) = self.active_cell(client) else {
            drop(serial);
            self.prune(client);
            return Err(StreamError::NoActiveSession(client.to_string()));
        };
        session.transition(SessionState::Completed)?;

        let pump = self.slots().get_mut(client).and_then(|slot| slot.pump.take());
        stop_pump(pump).await;
        release_or_record(self.engine.as_ref(), &session).await;
        drop(serial);
        Ok(())
    }

    /// Cancel the client's session if it is still waiting on the engine
    ///
    /// Returns true when a starting session was cancelled. Its start notices
    /// right away and keeps the slot locked until any late download is
    /// released.
    fn interrupt_start(&self, client: &ClientId) -> bool {
        let Some(cell) = self.current_cell(client) else {
            return false;
        };
        let starting = matches!(cell.state(), SessionState::Idle | SessionState::Resolving);
        if starting && cell.transition(SessionState::Cancelled).is_ok() {
            info!(client = %client, session = %cell.id(), "interrupted session start");
            return true;
        }
        false
    }

    /// Forget the client once nothing is left to track
    ///
    /// A slot whose session completed or failed is kept so the next episode
    /// can be started from it.
    fn prune(&self, client: &ClientId) {
        let mut slots = self.slots();
        let idle = slots.get(client).is_some_and(|slot| {
            Arc::strong_count(&slot.serial) == 1
                && slot.pump.is_none()
                && slot.current.as_ref().map_or(true, |cell| {
                    cell.state() == SessionState::Cancelled && cell.engine_handle().is_none()
                })
        });
        if idle {
            debug!(client = %client, "dropping client slot");
            slots.remove(client);
        }
    }
}

/// Wait for a pump to notice its session finished
async fn stop_pump(pump: Option<JoinHandle<()>>) {
    if let Some(pump) = pump {
        let _ = pump.await;
    }
}

/// Release the session's engine download, at most once
pub(crate) async fn release_download(
    engine: &dyn StreamEngine,
    session: &SessionCell,
) -> std::result::Result<(), EngineError> {
    match session.take_engine_handle() {
        Some(handle) => {
            debug!(%handle, "releasing engine download");
            engine.cancel_download(&handle).await
        }
        None => Ok(()),
    }
}

/// Release the download, recording a failure on the session
pub(crate) async fn release_or_record(engine: &dyn StreamEngine, session: &SessionCell) {
    if let Err(err) = release_download(engine, session).await {
        warn!(session = %session.id(), error = %err, "failed to release download");
        session.record_cleanup_error(StreamError::Engine(err).report());
    }
}

#[cfg(test)]
impl SessionRegistry {
    fn tracked_clients(&self) -> usize {
        self.slots().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use crate::models::{ClientInfo, DeviceKind, StreamRequest};
    use crate::stream::engine::{Download, EngineHandle, EngineKind, FileRef};
    use crate::stream::events::EventBus;

    #[derive(Debug, Default)]
    struct CountingEngine {
        released: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StreamEngine for CountingEngine {
        async fn start_download(&self, _file: &FileRef) -> std::result::Result<Download, EngineError> {
            let (_tx, events) = mpsc::channel(1);
            Ok(Download {
                handle: EngineHandle::new("h1"),
                events,
            })
        }

        async fn cancel_download(&self, handle: &EngineHandle) -> std::result::Result<(), EngineError> {
            self.released.lock().unwrap().push(handle.as_str().to_string());
            Ok(())
        }

        fn kind(&self) -> EngineKind {
            EngineKind::Torrent
        }
    }

    fn session(client: &str) -> Arc<SessionCell> {
        let request = StreamRequest::auto(1, 1, ClientInfo::new(client, DeviceKind::Web));
        SessionCell::new(request, EventBus::new())
    }

    async fn fetching(registry: &SessionRegistry, client: &ClientId) -> Arc<SessionCell> {
        let cell = session(client.as_str());
        let guard = registry.replace(client, Arc::clone(&cell)).await;
        cell.transition(SessionState::Resolving).unwrap();
        cell.set_engine_handle(EngineHandle::new("h1"));
        cell.transition(SessionState::Fetching).unwrap();
        drop(guard);
        cell
    }

    #[tokio::test]
    async fn test_cancelled_clients_are_forgotten() {
        let engine = Arc::new(CountingEngine::default());
        let registry = SessionRegistry::new(engine.clone());

        for i in 0..16 {
            let client: ClientId = format!("client-{}", i).into();
            fetching(&registry, &client).await;
            registry.cancel_active(&client).await.unwrap();
        }

        assert_eq!(registry.tracked_clients(), 0);
        assert_eq!(engine.released.lock().unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_cancel_without_session_leaves_no_slot() {
        let registry = SessionRegistry::new(Arc::new(CountingEngine::default()));
        registry.cancel_active(&"nobody".into()).await.unwrap();
        assert_eq!(registry.tracked_clients(), 0);
    }

    #[tokio::test]
    async fn test_complete_without_session_leaves_no_slot() {
        let registry = SessionRegistry::new(Arc::new(CountingEngine::default()));
        let err = registry.complete_active(&"nobody".into()).await.unwrap_err();
        assert!(matches!(err, StreamError::NoActiveSession(_)));
        assert_eq!(registry.tracked_clients(), 0);
    }

    #[tokio::test]
    async fn test_completed_client_is_kept_for_next_episode() {
        let registry = SessionRegistry::new(Arc::new(CountingEngine::default()));
        let client: ClientId = "c1".into();

        let cell = fetching(&registry, &client).await;
        cell.transition(SessionState::Ready).unwrap();
        registry.complete_active(&client).await.unwrap();

        assert_eq!(registry.tracked_clients(), 1);
        assert!(registry.current_cell(&client).is_some());
        assert!(registry.get_active(&client).is_none());
    }

    #[tokio::test]
    async fn test_failed_session_download_is_released_on_cancel() {
        let engine = Arc::new(CountingEngine::default());
        let registry = SessionRegistry::new(engine.clone());
        let client: ClientId = "c1".into();

        let cell = fetching(&registry, &client).await;
        cell.fail(&StreamError::Engine(EngineError::DownloadFailed("no peers".into())));

        registry.cancel_active(&client).await.unwrap();
        assert_eq!(*engine.released.lock().unwrap(), vec!["h1".to_string()]);
        assert_eq!(cell.state(), SessionState::Error);
    }
}
