//! Stream session state machine
//!
//! A session walks `Idle → Resolving → Fetching → Ready → Playing → Completed`.
//! `Error` and `Cancelled` can be reached from any non-terminal state. No state
//! is ever revisited; recovering from an error means starting a new session.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ErrorReport, Result, StreamError};
use crate::models::{ClientId, PlaybackDescriptor, StreamProgress, StreamRequest};
use crate::stream::engine::EngineHandle;
use crate::stream::events::{EventBus, SessionEvent, SessionEventKind};

/// Lifecycle state of a stream session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Resolving,
    Fetching,
    Ready,
    Playing,
    Completed,
    Error,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Error | SessionState::Cancelled
        )
    }

    /// Ready to play or finished one way or another
    pub fn is_settled(&self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Playing) || self.is_terminal()
    }

    /// Still waiting on the engine
    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            SessionState::Idle | SessionState::Resolving | SessionState::Fetching
        )
    }

    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        if self.is_terminal() {
            return false;
        }

        matches!(
            (self, next),
            (Idle, Resolving)
                | (Resolving, Fetching)
                | (Fetching, Ready)
                | (Ready, Playing)
                | (Ready, Completed)
                | (Playing, Completed)
                | (_, Error)
                | (_, Cancelled)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Resolving => "resolving",
            SessionState::Fetching => "fetching",
            SessionState::Ready => "ready",
            SessionState::Playing => "playing",
            SessionState::Completed => "completed",
            SessionState::Error => "error",
            SessionState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Snapshot of one streaming attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSession {
    pub id: Uuid,
    pub client_id: ClientId,
    pub request: StreamRequest,
    pub state: SessionState,
    pub engine_handle: Option<EngineHandle>,
    pub created_at: DateTime<Utc>,
    pub last_error: Option<ErrorReport>,
    pub progress: Option<StreamProgress>,
    pub descriptor: Option<PlaybackDescriptor>,
}

impl StreamSession {
    pub fn new(request: StreamRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id: request.client.id.clone(),
            request,
            state: SessionState::Idle,
            engine_handle: None,
            created_at: Utc::now(),
            last_error: None,
            progress: None,
            descriptor: None,
        }
    }
}

/// Shared, mutable home of a session
///
/// All transitions go through here so they are totally ordered and each one
/// is published on the event bus exactly once.
#[derive(Debug)]
pub struct SessionCell {
    inner: Mutex<StreamSession>,
    state_tx: watch::Sender<SessionState>,
    bus: EventBus,
}

impl SessionCell {
    pub fn new(request: StreamRequest, bus: EventBus) -> Arc<Self> {
        let session = StreamSession::new(request);
        let (state_tx, _) = watch::channel(session.state);
        Arc::new(Self {
            inner: Mutex::new(session),
            state_tx,
            bus,
        })
    }

    fn lock(&self) -> MutexGuard<'_, StreamSession> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> Uuid {
        self.lock().id
    }

    pub fn client_id(&self) -> ClientId {
        self.lock().client_id.clone()
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn snapshot(&self) -> StreamSession {
        self.lock().clone()
    }

    pub fn engine_handle(&self) -> Option<EngineHandle> {
        self.lock().engine_handle.clone()
    }

    pub fn set_engine_handle(&self, handle: EngineHandle) {
        self.lock().engine_handle = Some(handle);
    }

    /// Take the handle so it is released at most once
    pub fn take_engine_handle(&self) -> Option<EngineHandle> {
        self.lock().engine_handle.take()
    }

    /// Record a failed download release and tell subscribers about it
    ///
    /// An error the session already failed with is kept as `last_error`.
    pub fn record_cleanup_error(&self, report: ErrorReport) {
        let mut session = self.lock();
        session.last_error.get_or_insert_with(|| report.clone());
        self.publish(&session, SessionEventKind::CleanupFailed { report });
    }

    /// Move to `next`, rejecting transitions the state machine does not allow
    pub fn transition(&self, next: SessionState) -> Result<SessionState> {
        let mut session = self.lock();
        self.apply(&mut session, next)
    }

    fn apply(&self, session: &mut StreamSession, next: SessionState) -> Result<SessionState> {
        let from = session.state;
        if !from.can_transition_to(next) {
            return Err(StreamError::InvalidTransition { from, to: next });
        }

        session.state = next;
        debug!(session = %session.id, client = %session.client_id, %from, to = %next, "session transition");
        self.state_tx.send_replace(next);
        self.publish(session, SessionEventKind::StateChanged { from, to: next });
        Ok(from)
    }

    /// Record a progress update while the engine is still working
    ///
    /// Returns false when the session is past the loading phase.
    pub fn update_progress(&self, progress: StreamProgress) -> bool {
        let mut session = self.lock();
        if !session.state.is_loading() {
            return false;
        }

        session.progress = Some(progress.clone());
        self.publish(
            &session,
            SessionEventKind::Progress {
                percent: progress.percent,
                message: progress.message,
            },
        );
        true
    }

    /// `Fetching → Ready` with the negotiated descriptor
    pub fn mark_ready(&self, descriptor: PlaybackDescriptor) -> Result<()> {
        let mut session = self.lock();
        self.apply(&mut session, SessionState::Ready)?;
        session.descriptor = Some(descriptor.clone());
        self.publish(&session, SessionEventKind::Ready { descriptor });
        Ok(())
    }

    /// Move to `Error`, keeping the report on the session
    ///
    /// Returns false when the session had already finished.
    pub fn fail(&self, err: &StreamError) -> bool {
        let report = err.report();
        let mut session = self.lock();
        if self.apply(&mut session, SessionState::Error).is_err() {
            return false;
        }

        session.last_error = Some(report.clone());
        self.publish(&session, SessionEventKind::Failed { report });
        true
    }

    /// Wait until the session is ready to play or has finished
    pub async fn wait_settled(&self) -> SessionState {
        let mut rx = self.state_tx.subscribe();
        let settled = rx.wait_for(|state| state.is_settled()).await;
        match settled {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    /// Wait until the session is completed, failed or cancelled
    pub async fn wait_terminal(&self) -> SessionState {
        let mut rx = self.state_tx.subscribe();
        let terminal = rx.wait_for(|state| state.is_terminal()).await;
        match terminal {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    fn publish(&self, session: &StreamSession, kind: SessionEventKind) {
        self.bus.publish(SessionEvent {
            client_id: session.client_id.clone(),
            session_id: session.id,
            kind,
        });
    }
}
