use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::errors::SurfaceError;

/// The one playback element a view owns; mutated by the stream session,
/// read and commanded by the input controller.
pub type SharedSurface = Arc<Mutex<dyn PlaybackSurface>>;

pub const MIN_PLAYBACK_RATE: f64 = 0.0625;
pub const MAX_PLAYBACK_RATE: f64 = 16.0;

// ============================================================================
// Playback Surface Trait
// ============================================================================

/// Model of the playback element: position, volume, rate, pause and the
/// player's own fullscreen primitive.
pub trait PlaybackSurface: Send {
    fn current_time(&self) -> f64;

    /// Media duration in seconds; not finite while unknown
    fn duration(&self) -> f64;

    fn seek(&mut self, position: f64) -> Result<(), SurfaceError>;

    fn volume(&self) -> f64;

    fn set_volume(&mut self, volume: f64) -> Result<(), SurfaceError>;

    fn playback_rate(&self) -> f64;

    fn set_playback_rate(&mut self, rate: f64) -> Result<(), SurfaceError>;

    fn is_paused(&self) -> bool;

    fn play(&mut self);

    fn pause(&mut self);

    fn is_fullscreen(&self) -> bool;

    /// Toggle fullscreen on the player container so overlay controls stay
    /// visible. Returns the new fullscreen state.
    fn toggle_fullscreen(&mut self) -> bool;

    /// Bind (or with `None`, release) the media source the engine feeds.
    fn set_source(&mut self, source: Option<Url>);

    fn source(&self) -> Option<&Url>;

    /// Seek relative to the current position, clamped to `[0, duration]`.
    fn seek_by(&mut self, delta: f64) -> Result<f64, SurfaceError> {
        let target = clamp_position(self.current_time() + delta, self.duration());
        self.seek(target)?;
        Ok(target)
    }

    /// Change volume relative to the current level, clamped to `[0, 1]`.
    fn adjust_volume(&mut self, delta: f64) -> Result<f64, SurfaceError> {
        let target = clamp_volume(self.volume() + delta);
        self.set_volume(target)?;
        Ok(target)
    }

    /// Returns `true` if the surface is now playing.
    fn toggle_play_pause(&mut self) -> bool {
        if self.is_paused() {
            self.play();
            true
        } else {
            self.pause();
            false
        }
    }
}

/// Clamp a seek target to `[0, duration]`; with an unknown duration only
/// the lower bound applies.
pub fn clamp_position(position: f64, duration: f64) -> f64 {
    let position = if position.is_nan() { 0.0 } else { position };
    if duration.is_finite() && duration >= 0.0 {
        position.clamp(0.0, duration)
    } else {
        position.max(0.0)
    }
}

pub fn clamp_volume(volume: f64) -> f64 {
    if volume.is_nan() {
        return 0.0;
    }
    volume.clamp(0.0, 1.0)
}

pub fn shared_surface<S: PlaybackSurface + 'static>(surface: S) -> SharedSurface {
    Arc::new(Mutex::new(surface))
}

// ============================================================================
// Default Playback Surface Implementation
// ============================================================================

/// In-memory playback element used by the headless player and tests
#[derive(Debug, Clone)]
pub struct DefaultPlaybackSurface {
    current_time: f64,
    duration: f64,
    volume: f64,
    playback_rate: f64,
    paused: bool,
    fullscreen: bool,
    source: Option<Url>,
}

impl DefaultPlaybackSurface {
    pub fn new() -> Self {
        Self {
            current_time: 0.0,
            duration: f64::NAN,
            volume: 1.0,
            playback_rate: 1.0,
            paused: true,
            fullscreen: false,
            source: None,
        }
    }

    /// Host-side update once media metadata is known
    pub fn set_duration(&mut self, duration: f64) {
        self.duration = duration;
    }

    /// Host-side position update (timeupdate)
    pub fn set_current_time(&mut self, time: f64) {
        self.current_time = time;
    }
}

impl Default for DefaultPlaybackSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackSurface for DefaultPlaybackSurface {
    fn current_time(&self) -> f64 {
        self.current_time
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn seek(&mut self, position: f64) -> Result<(), SurfaceError> {
        if position.is_nan() || position < 0.0 {
            return Err(SurfaceError::InvalidSeekPosition { position });
        }
        if self.duration.is_finite() && position > self.duration {
            return Err(SurfaceError::InvalidSeekPosition { position });
        }

        debug!("Seek {:.3}s -> {:.3}s", self.current_time, position);
        self.current_time = position;
        Ok(())
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn set_volume(&mut self, volume: f64) -> Result<(), SurfaceError> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(SurfaceError::InvalidVolume { volume });
        }
        self.volume = volume;
        Ok(())
    }

    fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    fn set_playback_rate(&mut self, rate: f64) -> Result<(), SurfaceError> {
        if !(MIN_PLAYBACK_RATE..=MAX_PLAYBACK_RATE).contains(&rate) {
            return Err(SurfaceError::InvalidPlaybackRate { rate });
        }
        self.playback_rate = rate;
        Ok(())
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn play(&mut self) {
        self.paused = false;
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    fn toggle_fullscreen(&mut self) -> bool {
        self.fullscreen = !self.fullscreen;
        self.fullscreen
    }

    fn set_source(&mut self, source: Option<Url>) {
        if source.is_none() {
            self.paused = true;
            self.playback_rate = 1.0;
        }
        self.source = source;
    }

    fn source(&self) -> Option<&Url> {
        self.source.as_ref()
    }
}
