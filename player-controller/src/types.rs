use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use url::Url;
use common::{EpisodeEntry, ProgressMarkers, StatusNames, StatusResponse};

use crate::errors::PollingFailure;

// Transcoding phase as shown to the viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionPhase {
    NotStarted,
    Starting,
    Converting,
    Ready,
    Error,
}

impl ConversionPhase {
    /// No further polling happens after a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConversionPhase::Ready | ConversionPhase::Error)
    }
}

// Derived from the status endpoint, never persisted client-side.
// progress == 100 <=> Ready, progress == -1 <=> Error.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionStatus {
    pub progress: i32,
    pub phase: ConversionPhase,
    pub failure: Option<PollingFailure>,
}

impl ConversionStatus {
    pub fn ready() -> Self {
        Self {
            progress: ProgressMarkers::READY,
            phase: ConversionPhase::Ready,
            failure: None,
        }
    }

    pub fn failed(failure: PollingFailure) -> Self {
        Self {
            progress: ProgressMarkers::FAILED,
            phase: ConversionPhase::Error,
            failure: Some(failure),
        }
    }

    fn in_progress(progress: i32, phase: ConversionPhase) -> Self {
        Self {
            progress,
            phase,
            failure: None,
        }
    }

    /// Map a raw status response onto a phase.
    ///
    /// Progress is authoritative for the terminal phases; the `status`
    /// string only distinguishes `not_started` and `starting`.
    pub fn from_response(response: &StatusResponse) -> Result<Self, PollingFailure> {
        let status = response
            .status
            .as_deref()
            .map(|s| s.trim().to_ascii_lowercase());
        let status = status.as_deref();

        match response.progress {
            ProgressMarkers::FAILED => Ok(Self::failed(PollingFailure::BackendReportedFailure)),
            p if !(0..=100).contains(&p) => Err(PollingFailure::Malformed {
                reason: format!("progress {} outside 0..=100", p),
            }),
            ProgressMarkers::READY => Ok(Self::ready()),
            ProgressMarkers::NOT_STARTED => {
                Ok(Self::in_progress(0, ConversionPhase::NotStarted))
            }
            p if status == Some(StatusNames::STARTING) || p == ProgressMarkers::STARTING => {
                Ok(Self::in_progress(p, ConversionPhase::Starting))
            }
            p if status == Some(StatusNames::NOT_STARTED) => {
                Ok(Self::in_progress(p, ConversionPhase::NotStarted))
            }
            p => Ok(Self::in_progress(p, ConversionPhase::Converting)),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

// One rendition discovered after manifest parse. Immutable per attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityLevel {
    pub index: usize,
    pub height: u32,
    pub bitrate: u64,
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}p @ {} kbps", self.index, self.height, self.bitrate / 1000)
    }
}

// Rendition choice: let the adaptive algorithm decide, or pin one level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelSelection {
    #[default]
    Auto,
    Pinned(usize),
}

impl LevelSelection {
    /// Engine-facing form: `None` delegates to the adaptive algorithm.
    pub fn as_engine_level(self) -> Option<usize> {
        match self {
            LevelSelection::Auto => None,
            LevelSelection::Pinned(index) => Some(index),
        }
    }
}

impl fmt::Display for LevelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelSelection::Auto => write!(f, "auto"),
            LevelSelection::Pinned(index) => write!(f, "{}", index),
        }
    }
}

impl FromStr for LevelSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(LevelSelection::Auto);
        }
        s.parse::<usize>()
            .map(LevelSelection::Pinned)
            .map_err(|_| format!("expected \"auto\" or a level index, got {:?}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackErrorKind {
    Network,
    Media,
    ManifestEmpty,
    FatalOther,
}

// Classified protocol error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackError {
    pub kind: PlaybackErrorKind,
    pub recoverable: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Loading,
    Playing,
    Paused,
    Buffering,
    Error,
    Destroyed,
}

// Episode source qualities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    P1080,
    P720,
    P480,
}

impl Quality {
    /// Fixed preference order for episode source resolution.
    pub const PREFERENCE: [Quality; 3] = [Quality::P1080, Quality::P720, Quality::P480];

    pub fn height(self) -> u32 {
        match self {
            Quality::P1080 => 1080,
            Quality::P720 => 720,
            Quality::P480 => 480,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}p", self.height())
    }
}

// Typed episode. Unparseable or blank source URLs are dropped on conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Episode {
    pub ordinal: u32,
    pub sources: Vec<(Quality, Url)>,
}

impl Episode {
    pub fn from_entry(entry: &EpisodeEntry) -> Self {
        let raw = [
            (Quality::P1080, entry.sources.p1080.as_deref()),
            (Quality::P720, entry.sources.p720.as_deref()),
            (Quality::P480, entry.sources.p480.as_deref()),
        ];
        let sources = raw
            .into_iter()
            .filter_map(|(quality, url)| {
                let url = url.map(str::trim).filter(|u| !u.is_empty())?;
                Url::parse(url).ok().map(|url| (quality, url))
            })
            .collect();

        Self {
            ordinal: entry.ordinal,
            sources,
        }
    }

    /// Best available source by the 1080 > 720 > 480 preference.
    pub fn best_source(&self) -> Option<(Quality, &Url)> {
        Quality::PREFERENCE.iter().find_map(|wanted| {
            self.sources
                .iter()
                .find(|(quality, _)| quality == wanted)
                .map(|(quality, url)| (*quality, url))
        })
    }

    pub fn is_playable(&self) -> bool {
        self.best_source().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    Embedded,
    DirectHls,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "embedded" => Ok(ProviderKind::Embedded),
            "direct-hls" | "directhls" | "hls" => Ok(ProviderKind::DirectHls),
            other => Err(format!("unknown provider kind: {}", other)),
        }
    }
}

// Layout-independent key identity after normalisation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalKey {
    Space,
    K,
    F,
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    Comma,
    Period,
}

// Where keyboard focus was when the event fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FocusTarget {
    #[default]
    Document,
    PlaybackSurface,
    TextField,
}

// Raw keyboard event as delivered by the document-level listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInput {
    /// Produced character or named key (`" "`, `"f"`, `"ArrowLeft"`, ...)
    pub key: String,
    /// Physical key code (`"KeyF"`, `"Space"`), if the host reports it
    pub code: Option<String>,
    pub repeat: bool,
    pub focus: FocusTarget,
}

impl KeyInput {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            code: None,
            repeat: false,
            focus: FocusTarget::Document,
        }
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.code = Some(code.to_string());
        self
    }

    pub fn repeated(mut self) -> Self {
        self.repeat = true;
        self
    }

    pub fn focused_on(mut self, focus: FocusTarget) -> Self {
        self.focus = focus;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    KeyDown(KeyInput),
    KeyUp(KeyInput),
    /// Double-click on the playback element
    DoubleClick,
}

// Tap-vs-hold tracking for one pressed key. Cleared on key-up or teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputHoldState {
    pub key: PhysicalKey,
    pub pressed_at: Instant,
    /// Set once the hold threshold elapsed and the fast rate was engaged
    pub engaged: bool,
}

// Commands issued against the live session
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerCommand {
    PlayPause,
    SeekBy(f64),
    SetVolumeBy(f64),
    SetPlaybackRate(f64),
    ToggleFullscreen,
    PrevEpisode,
    NextEpisode,
}

impl PlayerCommand {
    /// Episode navigation is routed to the continuity manager, everything
    /// else to the playback surface.
    pub fn is_episode_navigation(&self) -> bool {
        matches!(self, PlayerCommand::PrevEpisode | PlayerCommand::NextEpisode)
    }
}
