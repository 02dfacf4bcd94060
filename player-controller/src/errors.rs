use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("HTTP {status} for URL: {url}")]
    Http { status: u16, url: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Request timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Deserialization error: {message}")]
    Deserialization { message: String },

    #[error("Invalid URL: {reason}")]
    InvalidUrl { reason: String },
}

impl TransportError {
    pub fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            TransportError::Timeout { duration: timeout }
        } else if error.is_decode() {
            TransportError::Deserialization {
                message: error.to_string(),
            }
        } else if let Some(status) = error.status() {
            TransportError::Http {
                status: status.as_u16(),
                url: error.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            TransportError::Network {
                message: error.to_string(),
            }
        }
    }
}

impl From<url::ParseError> for TransportError {
    fn from(error: url::ParseError) -> Self {
        TransportError::InvalidUrl {
            reason: error.to_string(),
        }
    }
}

// Conversion status polling failures; always terminal, never retried
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PollingFailure {
    #[error("Status endpoint unreachable: {0}")]
    Unreachable(#[from] TransportError),

    #[error("Malformed status response: {reason}")]
    Malformed { reason: String },

    #[error("Transcoding failed on the backend")]
    BackendReportedFailure,
}

// Terminal outcome of one stream attachment
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamFailure {
    #[error("Manifest not ready: {detail}")]
    ManifestNotReady { detail: String },

    #[error("Stream network failure: {detail}")]
    Network { detail: String },

    #[error("Stream media failure: {detail}")]
    Media { detail: String },

    #[error("Fatal playback error: {detail}")]
    Fatal { detail: String },
}

impl StreamFailure {
    /// Text shown to the viewer.
    pub fn user_message(&self) -> &'static str {
        match self {
            StreamFailure::ManifestNotReady { .. } => {
                "The video is still converting. Please try again shortly."
            }
            StreamFailure::Network { .. } => "Could not load the stream.",
            StreamFailure::Media { .. } | StreamFailure::Fatal { .. } => {
                "A playback error occurred."
            }
        }
    }

    /// Whether the UI should offer a retry affordance.
    pub fn offers_retry(&self) -> bool {
        matches!(
            self,
            StreamFailure::ManifestNotReady { .. } | StreamFailure::Network { .. }
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderResolutionFailure {
    #[error("No embed found for title: {title}")]
    EmbedNotFound { title: String },

    #[error("No episodes available for title: {title_key}")]
    NoEpisodes { title_key: String },

    #[error("Episode index {index} out of range (0..{len})")]
    EpisodeOutOfRange { index: usize, len: usize },

    #[error("Episode {ordinal} has no playable source")]
    EpisodeUnplayable { ordinal: u32 },

    #[error("Episode navigation requires the direct HLS provider with a loaded list")]
    EpisodesNotLoaded,

    #[error("No title opened")]
    NoTitle,

    #[error("Provider lookup failed: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("No live session")]
    NoActiveSession,

    #[error("Quality levels not parsed yet")]
    LevelsNotReady,

    #[error("Unknown quality level {index}, {available} available")]
    UnknownLevel { index: usize, available: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurfaceError {
    #[error("Invalid playback rate: {rate}")]
    InvalidPlaybackRate { rate: f64 },

    #[error("Invalid volume: {volume}")]
    InvalidVolume { volume: f64 },

    #[error("Invalid seek position: {position}")]
    InvalidSeekPosition { position: f64 },
}

// Main application error type
#[derive(Error, Debug)]
pub enum PlayerAppError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Polling failure: {0}")]
    Polling(#[from] PollingFailure),

    #[error("Stream failure: {0}")]
    Stream(#[from] StreamFailure),

    #[error("Provider resolution failure: {0}")]
    Provider(#[from] ProviderResolutionFailure),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("No resource is being played")]
    NoResource,
}
