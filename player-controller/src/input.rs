use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::InputConfig;
use crate::types::{FocusTarget, InputEvent, InputHoldState, KeyInput, PhysicalKey, PlayerCommand};

/// Receiver of the commands the input controller produces
#[async_trait]
pub trait CommandSink: Send {
    async fn execute(&mut self, command: PlayerCommand);
}

/// Map a key event to a layout-independent key.
///
/// The produced character is matched case-insensitively first, including
/// the keys a Russian ЙЦУКЕН layout produces at the same positions; the
/// physical key code is the fallback.
pub fn normalize_key(input: &KeyInput) -> Option<PhysicalKey> {
    let key = input.key.to_lowercase();
    let by_key = match key.as_str() {
        " " | "spacebar" => Some(PhysicalKey::Space),
        // 'л' sits on the K position, 'к' is its look-alike
        "k" | "л" | "к" => Some(PhysicalKey::K),
        "f" | "а" => Some(PhysicalKey::F),
        "arrowleft" | "left" => Some(PhysicalKey::ArrowLeft),
        "arrowright" | "right" => Some(PhysicalKey::ArrowRight),
        "arrowup" | "up" => Some(PhysicalKey::ArrowUp),
        "arrowdown" | "down" => Some(PhysicalKey::ArrowDown),
        "," | "б" => Some(PhysicalKey::Comma),
        "." | "ю" => Some(PhysicalKey::Period),
        _ => None,
    };

    by_key.or_else(|| match input.code.as_deref()? {
        "Space" => Some(PhysicalKey::Space),
        "KeyK" => Some(PhysicalKey::K),
        "KeyF" => Some(PhysicalKey::F),
        "ArrowLeft" => Some(PhysicalKey::ArrowLeft),
        "ArrowRight" => Some(PhysicalKey::ArrowRight),
        "ArrowUp" => Some(PhysicalKey::ArrowUp),
        "ArrowDown" => Some(PhysicalKey::ArrowDown),
        "Comma" => Some(PhysicalKey::Comma),
        "Period" => Some(PhysicalKey::Period),
        _ => None,
    })
}

/// Translates keyboard and pointer events into player commands.
///
/// Space distinguishes a tap (toggle play/pause) from a hold (fast playback
/// while pressed). At most one hold is tracked; auto-repeat never starts a
/// second one. The host drives the hold timer through
/// [`hold_deadline`](Self::hold_deadline) and
/// [`on_hold_elapsed`](Self::on_hold_elapsed).
pub struct InputController {
    config: InputConfig,
    hold: Option<InputHoldState>,
}

impl InputController {
    pub fn new(config: InputConfig) -> Self {
        Self { config, hold: None }
    }

    pub fn handle(&mut self, event: &InputEvent, now: Instant) -> Vec<PlayerCommand> {
        match event {
            InputEvent::KeyDown(input) => self.key_down(input, now),
            InputEvent::KeyUp(input) => self.key_up(input),
            InputEvent::DoubleClick => vec![PlayerCommand::ToggleFullscreen],
        }
    }

    /// Only space has tap/hold semantics. `k` toggles play/pause as soon as
    /// it goes down and never engages the hold rate, so holding it is the
    /// same as tapping it.
    fn key_down(&mut self, input: &KeyInput, now: Instant) -> Vec<PlayerCommand> {
        if input.focus == FocusTarget::TextField {
            trace!("Ignoring {:?} typed into a text field", input.key);
            return Vec::new();
        }
        let Some(key) = normalize_key(input) else {
            return Vec::new();
        };

        let step = self.config.seek_step_secs;
        let volume = self.config.volume_step;
        match key {
            PhysicalKey::Space => {
                if input.repeat || self.hold.is_some() {
                    return Vec::new();
                }
                self.hold = Some(InputHoldState {
                    key,
                    pressed_at: now,
                    engaged: false,
                });
                Vec::new()
            }
            // Arrow keys keep acting while auto-repeating
            PhysicalKey::ArrowLeft => vec![PlayerCommand::SeekBy(-step)],
            PhysicalKey::ArrowRight => vec![PlayerCommand::SeekBy(step)],
            PhysicalKey::ArrowUp => vec![PlayerCommand::SetVolumeBy(volume)],
            PhysicalKey::ArrowDown => vec![PlayerCommand::SetVolumeBy(-volume)],
            _ if input.repeat => Vec::new(),
            PhysicalKey::K => vec![PlayerCommand::PlayPause],
            PhysicalKey::F => vec![PlayerCommand::ToggleFullscreen],
            PhysicalKey::Comma => vec![PlayerCommand::PrevEpisode],
            PhysicalKey::Period => vec![PlayerCommand::NextEpisode],
        }
    }

    // Key-up is honoured regardless of focus so a hold never outlives its key.
    fn key_up(&mut self, input: &KeyInput) -> Vec<PlayerCommand> {
        let Some(key) = normalize_key(input) else {
            return Vec::new();
        };
        match self.hold {
            Some(hold) if hold.key == key => {
                self.hold = None;
                if hold.engaged {
                    debug!("Hold released, restoring normal rate");
                    vec![PlayerCommand::SetPlaybackRate(1.0)]
                } else {
                    vec![PlayerCommand::PlayPause]
                }
            }
            _ => Vec::new(),
        }
    }

    /// When the pending hold should engage, if one is pending
    pub fn hold_deadline(&self) -> Option<Instant> {
        self.hold
            .filter(|hold| !hold.engaged)
            .map(|hold| hold.pressed_at + self.config.hold_threshold)
    }

    pub fn on_hold_elapsed(&mut self, now: Instant) -> Vec<PlayerCommand> {
        let threshold = self.config.hold_threshold;
        match self.hold.as_mut() {
            Some(hold) if !hold.engaged && now >= hold.pressed_at + threshold => {
                hold.engaged = true;
                debug!("Hold engaged after {:?}", now - hold.pressed_at);
                vec![PlayerCommand::SetPlaybackRate(self.config.hold_rate)]
            }
            _ => Vec::new(),
        }
    }

    pub fn hold_state(&self) -> Option<&InputHoldState> {
        self.hold.as_ref()
    }

    /// Drop any pending hold. Returns the rate reset if fast playback was
    /// engaged.
    pub fn teardown(&mut self) -> Vec<PlayerCommand> {
        match self.hold.take() {
            Some(hold) if hold.engaged => vec![PlayerCommand::SetPlaybackRate(1.0)],
            _ => Vec::new(),
        }
    }

    /// Drive the controller from an event channel until cancelled or the
    /// channel closes, forwarding commands to `sink`.
    pub async fn run<S: CommandSink>(
        &mut self,
        mut events: mpsc::Receiver<InputEvent>,
        sink: &mut S,
        cancel: CancellationToken,
    ) {
        loop {
            let deadline = self.hold_deadline();
            let commands = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep_until_some(deadline), if deadline.is_some() => {
                    self.on_hold_elapsed(Instant::now())
                }
                event = events.recv() => match event {
                    Some(event) => self.handle(&event, Instant::now()),
                    None => break,
                },
            };
            for command in commands {
                sink.execute(command).await;
            }
        }

        for command in self.teardown() {
            sink.execute(command).await;
        }
    }
}

pub(crate) async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
