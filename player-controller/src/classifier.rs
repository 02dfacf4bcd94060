//! Protocol error classification and the recovery table.
//!
//! [`classify`] maps raw engine error fields onto a [`PlaybackError`];
//! [`recovery_action`] decides what the session does about it. The two are
//! kept separate so each branch can be tested on its own.

use crate::engine::{EngineErrorType, ErrorDetails, RawEngineError};
use crate::errors::StreamFailure;
use crate::types::{PlaybackError, PlaybackErrorKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Let the engine's own retry logic proceed
    None,
    /// Invoke the engine's media-error recovery primitive
    RecoverMediaError,
    /// Tear the session down and surface a terminal failure
    Destroy(StreamFailure),
}

fn describe(raw: &RawEngineError) -> String {
    match &raw.reason {
        Some(reason) => format!("{}: {}", raw.details, reason),
        None => raw.details.to_string(),
    }
}

pub fn classify(raw: &RawEngineError) -> PlaybackError {
    let detail = describe(raw);

    if !raw.fatal {
        // Non-fatal errors are retried inside the engine.
        let kind = match raw.error_type {
            EngineErrorType::Media => PlaybackErrorKind::Media,
            _ => PlaybackErrorKind::Network,
        };
        return PlaybackError {
            kind,
            recoverable: true,
            detail,
        };
    }

    let (kind, recoverable) = match (&raw.details, raw.error_type) {
        (ErrorDetails::LevelEmptyError, _) => (PlaybackErrorKind::ManifestEmpty, false),
        (details, _) if details.is_manifest_or_level_load() => (PlaybackErrorKind::Network, false),
        (_, EngineErrorType::Media) => (PlaybackErrorKind::Media, true),
        _ => (PlaybackErrorKind::FatalOther, false),
    };

    PlaybackError {
        kind,
        recoverable,
        detail,
    }
}

pub fn recovery_action(error: &PlaybackError, fatal: bool) -> RecoveryAction {
    if !fatal {
        return RecoveryAction::None;
    }

    let detail = error.detail.clone();
    match error.kind {
        PlaybackErrorKind::ManifestEmpty => {
            RecoveryAction::Destroy(StreamFailure::ManifestNotReady { detail })
        }
        PlaybackErrorKind::Network => RecoveryAction::Destroy(StreamFailure::Network { detail }),
        PlaybackErrorKind::Media if error.recoverable => RecoveryAction::RecoverMediaError,
        PlaybackErrorKind::Media => RecoveryAction::Destroy(StreamFailure::Media { detail }),
        PlaybackErrorKind::FatalOther => RecoveryAction::Destroy(StreamFailure::Fatal { detail }),
    }
}

/// A media error that recurs after the one recovery attempt becomes terminal.
pub fn escalate_media_error(error: &PlaybackError) -> (PlaybackError, StreamFailure) {
    let detail = format!("media error persisted after recovery: {}", error.detail);
    (
        PlaybackError {
            kind: PlaybackErrorKind::FatalOther,
            recoverable: false,
            detail: detail.clone(),
        },
        StreamFailure::Media { detail },
    )
}
