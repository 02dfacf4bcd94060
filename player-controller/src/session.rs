use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::classifier::{classify, escalate_media_error, recovery_action, RecoveryAction};
use crate::controller::SharedSurface;
use crate::engine::{EngineEvent, EngineEventReceiver, EngineFactory, RawEngineError, StreamingEngine};
use crate::errors::{SessionError, StreamFailure};
use crate::types::{LevelSelection, PlaybackError, QualityLevel, SessionStatus};

/// What a live session reports to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LevelsReady {
        session_id: Uuid,
        levels: Vec<QualityLevel>,
    },
    LevelSwitched {
        session_id: Uuid,
        level: usize,
    },
    StatusChanged {
        session_id: Uuid,
        status: SessionStatus,
    },
    /// A fatal media error is being recovered in place
    Recovering {
        session_id: Uuid,
        error: PlaybackError,
    },
    /// A non-fatal error the engine retries on its own
    Warning {
        session_id: Uuid,
        error: PlaybackError,
    },
    /// The session has been destroyed; nothing more will be reported for it
    Terminated {
        session_id: Uuid,
        error: PlaybackError,
        failure: StreamFailure,
    },
}

struct LiveSession {
    id: Uuid,
    manifest_url: Url,
    engine: Box<dyn StreamingEngine>,
    events: EngineEventReceiver,
    surface: SharedSurface,
    levels: Vec<QualityLevel>,
    selection: LevelSelection,
    media_recovery_attempted: bool,
}

/// Owns the binding between one playback surface and one streaming engine
/// instance. At most one engine instance is alive at any time.
pub struct StreamSession {
    factory: Arc<dyn EngineFactory>,
    live: Option<LiveSession>,
    status: SessionStatus,
}

impl StreamSession {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            live: None,
            status: SessionStatus::Idle,
        }
    }

    /// Bind the surface to a fresh engine instance loading `manifest_url`.
    ///
    /// Any previous attachment is destroyed first, so its events can never
    /// reach the new session.
    pub async fn attach(&mut self, manifest_url: Url, surface: SharedSurface) -> Uuid {
        if self.live.is_some() {
            self.destroy().await;
        }

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let mut engine = self.factory.create(tx);

        surface.lock().await.set_source(Some(manifest_url.clone()));
        engine.attach_media(surface.clone());
        engine.load_source(&manifest_url);

        let id = Uuid::new_v4();
        info!("Session {} attached to {}", id, manifest_url);

        self.live = Some(LiveSession {
            id,
            manifest_url,
            engine,
            events: rx,
            surface,
            levels: Vec::new(),
            selection: LevelSelection::Auto,
            media_recovery_attempted: false,
        });
        self.status = SessionStatus::Loading;
        id
    }

    /// Wait for the next reportable event of the live session.
    ///
    /// Returns `None` when no session is live or its engine went away.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            let event = self.live.as_mut()?.events.recv().await?;
            if let Some(reported) = self.handle_engine_event(event).await {
                return Some(reported);
            }
        }
    }

    async fn handle_engine_event(&mut self, event: EngineEvent) -> Option<SessionEvent> {
        let live = self.live.as_mut()?;
        let session_id = live.id;

        match event {
            EngineEvent::ManifestParsed { levels } => {
                debug!("Session {} parsed {} levels", session_id, levels.len());
                live.levels = levels.clone();
                live.surface.lock().await.play();
                self.status = SessionStatus::Playing;
                Some(SessionEvent::LevelsReady { session_id, levels })
            }
            EngineEvent::LevelSwitched { level } => {
                Some(SessionEvent::LevelSwitched { session_id, level })
            }
            EngineEvent::BufferStalled => {
                if self.status == SessionStatus::Buffering {
                    return None;
                }
                self.status = SessionStatus::Buffering;
                Some(SessionEvent::StatusChanged {
                    session_id,
                    status: self.status,
                })
            }
            EngineEvent::FragmentBuffered => {
                if self.status != SessionStatus::Buffering {
                    return None;
                }
                self.status = if live.surface.lock().await.is_paused() {
                    SessionStatus::Paused
                } else {
                    SessionStatus::Playing
                };
                Some(SessionEvent::StatusChanged {
                    session_id,
                    status: self.status,
                })
            }
            EngineEvent::Error(raw) => self.handle_error(session_id, raw).await,
        }
    }

    async fn handle_error(&mut self, session_id: Uuid, raw: RawEngineError) -> Option<SessionEvent> {
        let error = classify(&raw);

        match recovery_action(&error, raw.fatal) {
            RecoveryAction::None => {
                warn!("Session {} non-fatal error: {}", session_id, error.detail);
                Some(SessionEvent::Warning { session_id, error })
            }
            RecoveryAction::RecoverMediaError => {
                let live = self.live.as_mut()?;
                if live.media_recovery_attempted {
                    let (error, failure) = escalate_media_error(&error);
                    return Some(self.terminate(session_id, error, failure).await);
                }
                live.media_recovery_attempted = true;
                warn!("Session {} recovering from media error: {}", session_id, error.detail);
                live.engine.recover_media_error();
                Some(SessionEvent::Recovering { session_id, error })
            }
            RecoveryAction::Destroy(failure) => {
                Some(self.terminate(session_id, error, failure).await)
            }
        }
    }

    async fn terminate(
        &mut self,
        session_id: Uuid,
        error: PlaybackError,
        failure: StreamFailure,
    ) -> SessionEvent {
        warn!("Session {} terminated: {}", session_id, failure);
        self.destroy().await;
        self.status = SessionStatus::Error;
        SessionEvent::Terminated {
            session_id,
            error,
            failure,
        }
    }

    /// Pin a level or return to adaptive selection.
    pub fn set_quality(&mut self, selection: LevelSelection) -> Result<(), SessionError> {
        let live = self.live.as_mut().ok_or(SessionError::NoActiveSession)?;

        if let LevelSelection::Pinned(index) = selection {
            if live.levels.is_empty() {
                return Err(SessionError::LevelsNotReady);
            }
            if index >= live.levels.len() {
                return Err(SessionError::UnknownLevel {
                    index,
                    available: live.levels.len(),
                });
            }
        }

        debug!("Session {} quality -> {}", live.id, selection);
        live.engine.set_current_level(selection.as_engine_level());
        live.selection = selection;
        Ok(())
    }

    /// Record a user play/pause on the surface. Loading and buffering are
    /// engine-driven and left alone.
    pub fn note_playback(&mut self, paused: bool) -> Option<SessionStatus> {
        if self.live.is_none() {
            return None;
        }
        match self.status {
            SessionStatus::Playing | SessionStatus::Paused => {
                self.status = if paused {
                    SessionStatus::Paused
                } else {
                    SessionStatus::Playing
                };
                Some(self.status)
            }
            _ => None,
        }
    }

    /// Stop the engine and release every reference to the surface.
    /// Safe to call when nothing is attached.
    pub async fn destroy(&mut self) {
        if let Some(mut live) = self.live.take() {
            live.engine.destroy();
            live.events.close();
            live.surface.lock().await.set_source(None);
            info!("Session {} destroyed", live.id);
        }
        self.status = SessionStatus::Destroyed;
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.live.as_ref().map(|live| live.id)
    }

    pub fn manifest_url(&self) -> Option<&Url> {
        self.live.as_ref().map(|live| &live.manifest_url)
    }

    /// Empty until the manifest has been parsed
    pub fn levels(&self) -> &[QualityLevel] {
        self.live
            .as_ref()
            .map(|live| live.levels.as_slice())
            .unwrap_or(&[])
    }

    pub fn selection(&self) -> Option<LevelSelection> {
        self.live.as_ref().map(|live| live.selection)
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if let Some(live) = self.live.as_mut() {
            live.engine.destroy();
            live.events.close();
        }
    }
}
