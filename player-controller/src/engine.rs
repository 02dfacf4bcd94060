use std::fmt;
use std::time::Duration;

use m3u8_rs::Playlist;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::controller::SharedSurface;
use crate::errors::PlayerAppError;
use crate::types::QualityLevel;

// ============================================================================
// Engine events
// ============================================================================

/// Error category reported by the streaming engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorType {
    Network,
    Media,
    Mux,
    Other,
}

/// Error subtype reported by the streaming engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDetails {
    ManifestLoadError,
    ManifestLoadTimeout,
    ManifestParsingError,
    LevelEmptyError,
    LevelLoadError,
    LevelLoadTimeout,
    FragLoadError,
    BufferStalledError,
    MediaDecodeError,
    Other(String),
}

impl ErrorDetails {
    /// Failures while fetching or parsing the manifest or a level playlist
    pub fn is_manifest_or_level_load(&self) -> bool {
        matches!(
            self,
            ErrorDetails::ManifestLoadError
                | ErrorDetails::ManifestLoadTimeout
                | ErrorDetails::ManifestParsingError
                | ErrorDetails::LevelEmptyError
                | ErrorDetails::LevelLoadError
                | ErrorDetails::LevelLoadTimeout
        )
    }
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorDetails::ManifestLoadError => "manifestLoadError",
            ErrorDetails::ManifestLoadTimeout => "manifestLoadTimeOut",
            ErrorDetails::ManifestParsingError => "manifestParsingError",
            ErrorDetails::LevelEmptyError => "levelEmptyError",
            ErrorDetails::LevelLoadError => "levelLoadError",
            ErrorDetails::LevelLoadTimeout => "levelLoadTimeOut",
            ErrorDetails::FragLoadError => "fragLoadError",
            ErrorDetails::BufferStalledError => "bufferStalledError",
            ErrorDetails::MediaDecodeError => "mediaDecodeError",
            ErrorDetails::Other(other) => other.as_str(),
        };
        f.write_str(name)
    }
}

/// Protocol error exactly as the engine raised it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEngineError {
    pub error_type: EngineErrorType,
    pub details: ErrorDetails,
    pub fatal: bool,
    pub reason: Option<String>,
}

impl RawEngineError {
    pub fn new(error_type: EngineErrorType, details: ErrorDetails, fatal: bool) -> Self {
        Self {
            error_type,
            details,
            fatal,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Levels in manifest order
    ManifestParsed { levels: Vec<QualityLevel> },
    LevelSwitched { level: usize },
    BufferStalled,
    FragmentBuffered,
    Error(RawEngineError),
}

pub type EngineEventSender = mpsc::UnboundedSender<EngineEvent>;
pub type EngineEventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

// ============================================================================
// Engine seam
// ============================================================================

/// The adaptive-streaming library a session drives.
///
/// Implementations report progress through the sender handed to
/// [`EngineFactory::create`]; once the session drops its receiver every
/// later report is discarded.
pub trait StreamingEngine: Send {
    fn attach_media(&mut self, surface: SharedSurface);

    fn load_source(&mut self, url: &Url);

    /// `None` hands level choice back to the adaptive algorithm
    fn set_current_level(&mut self, level: Option<usize>);

    fn recover_media_error(&mut self);

    /// Stop all loading and release the media element
    fn destroy(&mut self);
}

pub trait EngineFactory: Send + Sync {
    fn create(&self, events: EngineEventSender) -> Box<dyn StreamingEngine>;
}

// ============================================================================
// HLS master-playlist engine
// ============================================================================

/// Parse a playlist body into quality levels.
///
/// Variants keep playlist order; I-frame-only variants are skipped. A media
/// playlist counts as a single level. No levels at all is reported as
/// `LevelEmptyError`.
pub fn parse_levels(body: &[u8]) -> Result<Vec<QualityLevel>, RawEngineError> {
    let empty = || {
        RawEngineError::new(EngineErrorType::Network, ErrorDetails::LevelEmptyError, true)
            .with_reason("playlist contains no playable levels")
    };

    match m3u8_rs::parse_playlist_res(body) {
        Ok(Playlist::MasterPlaylist(master)) => {
            let levels: Vec<QualityLevel> = master
                .variants
                .iter()
                .filter(|variant| !variant.is_i_frame)
                .enumerate()
                .map(|(index, variant)| QualityLevel {
                    index,
                    height: variant
                        .resolution
                        .map(|r| r.height as u32)
                        .unwrap_or(0),
                    bitrate: variant.bandwidth,
                })
                .collect();
            if levels.is_empty() {
                return Err(empty());
            }
            Ok(levels)
        }
        Ok(Playlist::MediaPlaylist(media)) => {
            if media.segments.is_empty() {
                return Err(empty());
            }
            Ok(vec![QualityLevel {
                index: 0,
                height: 0,
                bitrate: 0,
            }])
        }
        Err(e) => Err(RawEngineError::new(
            EngineErrorType::Network,
            ErrorDetails::ManifestParsingError,
            true,
        )
        .with_reason(format!("{:?}", e))),
    }
}

/// Engine that loads the master playlist and reports its levels.
/// Segment fetching and decoding stay with the host media element.
pub struct HlsManifestEngine {
    client: Client,
    request_timeout: Duration,
    events: EngineEventSender,
    surface: Option<SharedSurface>,
    load_task: Option<JoinHandle<()>>,
    current_level: Option<usize>,
}

impl HlsManifestEngine {
    pub fn new(client: Client, request_timeout: Duration, events: EngineEventSender) -> Self {
        Self {
            client,
            request_timeout,
            events,
            surface: None,
            load_task: None,
            current_level: None,
        }
    }

    pub fn current_level(&self) -> Option<usize> {
        self.current_level
    }

    fn abort_load(&mut self) {
        if let Some(task) = self.load_task.take() {
            task.abort();
        }
    }
}

async fn load_manifest(client: Client, url: Url, timeout: Duration, events: EngineEventSender) {
    let failure = |details: ErrorDetails, reason: String| {
        EngineEvent::Error(
            RawEngineError::new(EngineErrorType::Network, details, true).with_reason(reason),
        )
    };

    let response = match client.get(url.clone()).timeout(timeout).send().await {
        Ok(response) => response,
        Err(e) if e.is_timeout() => {
            let _ = events.send(failure(ErrorDetails::ManifestLoadTimeout, e.to_string()));
            return;
        }
        Err(e) => {
            let _ = events.send(failure(ErrorDetails::ManifestLoadError, e.to_string()));
            return;
        }
    };

    if !response.status().is_success() {
        let reason = format!("HTTP {} for {}", response.status().as_u16(), url);
        let _ = events.send(failure(ErrorDetails::ManifestLoadError, reason));
        return;
    }

    let body = match response.bytes().await {
        Ok(body) => body,
        Err(e) => {
            let _ = events.send(failure(ErrorDetails::ManifestLoadError, e.to_string()));
            return;
        }
    };

    let event = match parse_levels(&body) {
        Ok(levels) => {
            debug!("Parsed {} levels from {}", levels.len(), url);
            EngineEvent::ManifestParsed { levels }
        }
        Err(error) => EngineEvent::Error(error),
    };
    let _ = events.send(event);
}

impl StreamingEngine for HlsManifestEngine {
    fn attach_media(&mut self, surface: SharedSurface) {
        self.surface = Some(surface);
    }

    fn load_source(&mut self, url: &Url) {
        self.abort_load();
        info!("Loading manifest {}", url);
        self.load_task = Some(tokio::spawn(load_manifest(
            self.client.clone(),
            url.clone(),
            self.request_timeout,
            self.events.clone(),
        )));
    }

    fn set_current_level(&mut self, level: Option<usize>) {
        self.current_level = level;
        if let Some(level) = level {
            let _ = self.events.send(EngineEvent::LevelSwitched { level });
        }
    }

    fn recover_media_error(&mut self) {
        warn!("Media error recovery requested; manifest engine has no decoder state to reset");
    }

    fn destroy(&mut self) {
        self.abort_load();
        self.surface = None;
        self.current_level = None;
    }
}

impl Drop for HlsManifestEngine {
    fn drop(&mut self) {
        self.abort_load();
    }
}

/// Creates one [`HlsManifestEngine`] per attachment, sharing a connection pool
#[derive(Clone, Debug)]
pub struct HlsEngineFactory {
    client: Client,
    request_timeout: Duration,
}

impl HlsEngineFactory {
    pub fn new(request_timeout: Duration) -> Result<Self, PlayerAppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| PlayerAppError::Configuration {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            request_timeout,
        })
    }
}

impl EngineFactory for HlsEngineFactory {
    fn create(&self, events: EngineEventSender) -> Box<dyn StreamingEngine> {
        Box::new(HlsManifestEngine::new(
            self.client.clone(),
            self.request_timeout,
            events,
        ))
    }
}
