#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use url::Url;

    use crate::controller::{shared_surface, DefaultPlaybackSurface, SharedSurface};
    use crate::engine::{EngineErrorType, EngineEvent, ErrorDetails, RawEngineError};
    use crate::errors::{SessionError, StreamFailure};
    use crate::session::{SessionEvent, StreamSession};
    use crate::testing::ScriptedEngineFactory;
    use crate::types::{LevelSelection, PlaybackErrorKind, QualityLevel, SessionStatus};

    fn manifest(resource: &str) -> Url {
        Url::parse(&format!("http://media.test/hls/{}/master.m3u8?t=1", resource)).unwrap()
    }

    fn setup() -> (ScriptedEngineFactory, StreamSession, SharedSurface) {
        let factory = ScriptedEngineFactory::new();
        let session = StreamSession::new(Arc::new(factory.clone()));
        let surface = shared_surface(DefaultPlaybackSurface::new());
        (factory, session, surface)
    }

    fn levels() -> Vec<QualityLevel> {
        vec![
            QualityLevel { index: 0, height: 720, bitrate: 2_800_000 },
            QualityLevel { index: 1, height: 1080, bitrate: 5_000_000 },
            QualityLevel { index: 2, height: 720, bitrate: 2_800_000 },
        ]
    }

    fn fatal(error_type: EngineErrorType, details: ErrorDetails) -> EngineEvent {
        EngineEvent::Error(RawEngineError::new(error_type, details, true))
    }

    #[tokio::test]
    async fn test_attach_binds_surface_and_loads_source() {
        let (factory, mut session, surface) = setup();

        session.attach(manifest("a"), surface.clone()).await;

        assert!(session.is_live());
        assert_eq!(session.status(), SessionStatus::Loading);
        assert_eq!(factory.probe().load_calls, vec![manifest("a")]);
        assert!(factory.engine_holds_surface(0));
        assert_eq!(surface.lock().await.source(), Some(&manifest("a")));
    }

    #[tokio::test]
    async fn test_manifest_parsed_starts_playback_with_levels_in_order() {
        let (factory, mut session, surface) = setup();
        let id = session.attach(manifest("a"), surface.clone()).await;

        factory.emit_latest(EngineEvent::ManifestParsed { levels: levels() });
        let event = session.next_event().await.unwrap();

        assert_eq!(
            event,
            SessionEvent::LevelsReady {
                session_id: id,
                levels: levels()
            }
        );
        assert_eq!(session.levels(), levels().as_slice());
        assert_eq!(session.status(), SessionStatus::Playing);
        assert!(!surface.lock().await.is_paused());
    }

    #[tokio::test]
    async fn test_destroy_releases_surface_and_engine() {
        let (factory, mut session, surface) = setup();
        session.attach(manifest("a"), surface.clone()).await;
        assert!(Arc::strong_count(&surface) > 1);

        session.destroy().await;

        assert!(!session.is_live());
        assert_eq!(session.status(), SessionStatus::Destroyed);
        assert_eq!(factory.probe().destroy_calls, 1);
        assert!(!factory.engine_holds_surface(0));
        assert_eq!(Arc::strong_count(&surface), 1);
        assert!(surface.lock().await.source().is_none());

        // Late engine events are discarded
        assert!(!factory.emit(0, EngineEvent::BufferStalled));
        assert!(session.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_destroy_without_session_is_harmless() {
        let (factory, mut session, _surface) = setup();
        session.destroy().await;
        session.destroy().await;
        assert_eq!(factory.probe().destroy_calls, 0);
    }

    #[tokio::test]
    async fn test_second_attach_replaces_first() {
        let (factory, mut session, surface) = setup();
        session.attach(manifest("a"), surface.clone()).await;
        let second = session.attach(manifest("b"), surface.clone()).await;

        {
            let probe = factory.probe();
            assert_eq!(probe.created, 2);
            assert_eq!(probe.destroy_calls, 1);
        }
        assert_eq!(session.session_id(), Some(second));
        assert_eq!(session.manifest_url(), Some(&manifest("b")));

        // The first engine can no longer report anything
        assert!(!factory.emit(0, EngineEvent::ManifestParsed { levels: levels() }));
        assert!(factory.emit(1, EngineEvent::ManifestParsed { levels: levels() }));

        let event = session.next_event().await.unwrap();
        assert!(matches!(event, SessionEvent::LevelsReady { session_id, .. } if session_id == second));
    }

    #[tokio::test]
    async fn test_manifest_empty_destroys_without_reload() {
        let (factory, mut session, surface) = setup();
        session.attach(manifest("a"), surface.clone()).await;

        factory.emit_latest(fatal(EngineErrorType::Network, ErrorDetails::LevelEmptyError));
        let event = session.next_event().await.unwrap();

        match event {
            SessionEvent::Terminated { error, failure, .. } => {
                assert_eq!(error.kind, PlaybackErrorKind::ManifestEmpty);
                assert!(matches!(failure, StreamFailure::ManifestNotReady { .. }));
                assert!(failure.offers_retry());
            }
            other => panic!("expected termination, got {:?}", other),
        }
        assert!(!session.is_live());
        assert_eq!(session.status(), SessionStatus::Error);
        assert_eq!(factory.probe().load_calls.len(), 1);
        assert_eq!(Arc::strong_count(&surface), 1);
    }

    #[tokio::test]
    async fn test_fatal_network_error_terminates() {
        let (factory, mut session, surface) = setup();
        session.attach(manifest("a"), surface).await;

        factory.emit_latest(fatal(EngineErrorType::Network, ErrorDetails::ManifestLoadError));
        let event = session.next_event().await.unwrap();

        assert!(matches!(
            event,
            SessionEvent::Terminated {
                failure: StreamFailure::Network { .. },
                ..
            }
        ));
        assert_eq!(factory.probe().destroy_calls, 1);
    }

    #[tokio::test]
    async fn test_media_error_recovers_once_then_escalates() {
        let (factory, mut session, surface) = setup();
        session.attach(manifest("a"), surface).await;

        factory.emit_latest(fatal(EngineErrorType::Media, ErrorDetails::MediaDecodeError));
        let first = session.next_event().await.unwrap();
        assert!(matches!(first, SessionEvent::Recovering { .. }));
        assert_eq!(factory.probe().recover_calls, 1);
        assert!(session.is_live());

        factory.emit_latest(fatal(EngineErrorType::Media, ErrorDetails::MediaDecodeError));
        let second = session.next_event().await.unwrap();
        match second {
            SessionEvent::Terminated { error, failure, .. } => {
                assert_eq!(error.kind, PlaybackErrorKind::FatalOther);
                assert!(matches!(failure, StreamFailure::Media { .. }));
            }
            other => panic!("expected termination, got {:?}", other),
        }
        assert_eq!(factory.probe().recover_calls, 1);
        assert!(!session.is_live());
    }

    #[tokio::test]
    async fn test_non_fatal_error_is_reported_and_session_survives() {
        let (factory, mut session, surface) = setup();
        session.attach(manifest("a"), surface).await;

        factory.emit_latest(EngineEvent::Error(RawEngineError::new(
            EngineErrorType::Network,
            ErrorDetails::FragLoadError,
            false,
        )));
        let event = session.next_event().await.unwrap();

        assert!(matches!(event, SessionEvent::Warning { ref error, .. } if error.recoverable));
        assert!(session.is_live());
        assert_eq!(factory.probe().destroy_calls, 0);
    }

    #[tokio::test]
    async fn test_buffering_transitions() {
        let (factory, mut session, surface) = setup();
        session.attach(manifest("a"), surface).await;
        factory.emit_latest(EngineEvent::ManifestParsed { levels: levels() });
        session.next_event().await.unwrap();

        factory.emit_latest(EngineEvent::BufferStalled);
        factory.emit_latest(EngineEvent::BufferStalled);
        factory.emit_latest(EngineEvent::FragmentBuffered);

        let stalled = session.next_event().await.unwrap();
        assert!(matches!(
            stalled,
            SessionEvent::StatusChanged { status: SessionStatus::Buffering, .. }
        ));
        // The repeated stall is folded into the first one
        let resumed = session.next_event().await.unwrap();
        assert!(matches!(
            resumed,
            SessionEvent::StatusChanged { status: SessionStatus::Playing, .. }
        ));
    }

    #[tokio::test]
    async fn test_set_quality_rules() {
        let (factory, mut session, surface) = setup();

        assert_eq!(
            session.set_quality(LevelSelection::Auto),
            Err(SessionError::NoActiveSession)
        );

        session.attach(manifest("a"), surface).await;
        assert_eq!(
            session.set_quality(LevelSelection::Pinned(0)),
            Err(SessionError::LevelsNotReady)
        );

        factory.emit_latest(EngineEvent::ManifestParsed { levels: levels() });
        session.next_event().await.unwrap();

        assert_eq!(
            session.set_quality(LevelSelection::Pinned(3)),
            Err(SessionError::UnknownLevel { index: 3, available: 3 })
        );
        session.set_quality(LevelSelection::Pinned(2)).unwrap();
        assert_eq!(session.selection(), Some(LevelSelection::Pinned(2)));
        session.set_quality(LevelSelection::Auto).unwrap();

        assert_eq!(factory.probe().level_calls, vec![Some(2), None]);
    }

    #[tokio::test]
    async fn test_reattach_clears_levels() {
        let (factory, mut session, surface) = setup();
        session.attach(manifest("a"), surface.clone()).await;
        factory.emit_latest(EngineEvent::ManifestParsed { levels: levels() });
        session.next_event().await.unwrap();

        session.attach(manifest("b"), surface).await;
        assert!(session.levels().is_empty());
        assert_eq!(session.selection(), Some(LevelSelection::Auto));
    }

    #[tokio::test]
    async fn test_drop_stops_engine() {
        let (factory, mut session, surface) = setup();
        session.attach(manifest("a"), surface).await;
        drop(session);
        assert_eq!(factory.probe().destroy_calls, 1);
        assert!(!factory.emit(0, EngineEvent::BufferStalled));
    }
}
