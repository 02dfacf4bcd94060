use std::path::PathBuf;
use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;
use uuid::Uuid;

use crate::config::{AppConfig, ConfigManager, EnvConfigOverride, LoggingConfig};
use crate::continuity::{EpisodeSelection, ProviderSelection, SourceContinuityManager};
use crate::controller::{shared_surface, DefaultPlaybackSurface, PlaybackSurface, SharedSurface};
use crate::engine::{EngineFactory, HlsEngineFactory};
use crate::errors::{
    PlayerAppError, PollingFailure, ProviderResolutionFailure, StreamFailure, SurfaceError,
};
use crate::input::{sleep_until_some, CommandSink, InputController};
use crate::poller::{ConversionStatusPoller, PollerEvent};
use crate::session::{SessionEvent, StreamSession};
use crate::transport::{BackendClient, HttpBackendClient};
use crate::types::{
    ConversionPhase, ConversionStatus, InputEvent, LevelSelection, PlaybackError, PlayerCommand,
    ProviderKind, Quality, QualityLevel, SessionStatus,
};

// ============================================================================
// Player events
// ============================================================================

/// UI-facing notifications emitted by a [`PlayerView`]
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    ConversionProgress { status: ConversionStatus },
    ConversionFailed { failure: PollingFailure },
    SessionAttached { session_id: Uuid, manifest_url: Url },
    QualityLevelsAvailable { levels: Vec<QualityLevel> },
    QualityChanged { selection: LevelSelection },
    LevelSwitched { level: usize },
    PlaybackStatusChanged { status: SessionStatus },
    RecoveringFromError { error: PlaybackError },
    PlaybackWarning { error: PlaybackError },
    SessionTerminated { failure: StreamFailure },
    EmbedReady { embed_url: String },
    EpisodesLoaded { count: usize },
    EpisodeChanged { ordinal: u32, quality: Quality },
    ProviderFailed { failure: ProviderResolutionFailure },
    Unmounted,
}

/// Event handler trait for player notifications
pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: PlayerEvent);
}

/// Console event handler implementation
pub struct ConsoleEventHandler;

impl EventHandler for ConsoleEventHandler {
    fn handle_event(&self, event: PlayerEvent) {
        match event {
            PlayerEvent::ConversionProgress { status } => match status.phase {
                ConversionPhase::NotStarted => println!("Conversion not started"),
                ConversionPhase::Starting => println!("Conversion starting..."),
                ConversionPhase::Converting => println!("Converting: {}%", status.progress),
                ConversionPhase::Ready => println!("Conversion complete"),
                ConversionPhase::Error => println!("Conversion failed"),
            },
            PlayerEvent::ConversionFailed { failure } => {
                println!("Conversion error: {}", failure);
            }
            PlayerEvent::SessionAttached { session_id, manifest_url } => {
                println!("Session {} playing {}", session_id, manifest_url);
            }
            PlayerEvent::QualityLevelsAvailable { levels } => {
                println!("Quality levels: auto");
                for level in levels {
                    println!("  {}", level);
                }
            }
            PlayerEvent::QualityChanged { selection } => {
                println!("Quality set to {}", selection);
            }
            PlayerEvent::LevelSwitched { level } => {
                println!("Switched to level {}", level);
            }
            PlayerEvent::PlaybackStatusChanged { status } => {
                println!("Playback: {:?}", status);
            }
            PlayerEvent::RecoveringFromError { error } => {
                println!("Recovering from {:?} error: {}", error.kind, error.detail);
            }
            PlayerEvent::PlaybackWarning { error } => {
                println!("Warning ({:?}): {}", error.kind, error.detail);
            }
            PlayerEvent::SessionTerminated { failure } => {
                let retry = if failure.offers_retry() { " [retry available]" } else { "" };
                println!("{}{}", failure.user_message(), retry);
            }
            PlayerEvent::EmbedReady { embed_url } => {
                println!("Embedded player: {}", embed_url);
            }
            PlayerEvent::EpisodesLoaded { count } => {
                println!("{} episodes available", count);
            }
            PlayerEvent::EpisodeChanged { ordinal, quality } => {
                println!("Episode {} ({})", ordinal, quality);
            }
            PlayerEvent::ProviderFailed { failure } => {
                println!("Source unavailable: {}", failure);
            }
            PlayerEvent::Unmounted => {
                println!("Player closed");
            }
        }
    }
}

// ============================================================================
// Player view
// ============================================================================

enum LoopStep {
    Cancelled,
    HoldElapsed,
    Input(Option<InputEvent>),
    Poll(Option<PollerEvent>),
    Session(Option<SessionEvent>),
}

async fn next_poll_update(updates: &mut Option<ReceiverStream<PollerEvent>>) -> Option<PollerEvent> {
    match updates {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

/// The hosting view: one playback surface with its session, poller,
/// continuity manager and input controller.
pub struct PlayerView {
    config: AppConfig,
    client: Arc<dyn BackendClient>,
    surface: SharedSurface,
    session: StreamSession,
    poller: ConversionStatusPoller,
    poll_updates: Option<ReceiverStream<PollerEvent>>,
    continuity: SourceContinuityManager,
    input: InputController,
    event_handlers: Vec<Arc<dyn EventHandler>>,
    current_resource: Option<String>,
    mounted: bool,
}

impl PlayerView {
    pub fn new(
        config: AppConfig,
        client: Arc<dyn BackendClient>,
        engine_factory: Arc<dyn EngineFactory>,
        surface: SharedSurface,
    ) -> Self {
        Self {
            session: StreamSession::new(engine_factory),
            poller: ConversionStatusPoller::new(client.clone(), config.polling.clone()),
            poll_updates: None,
            continuity: SourceContinuityManager::new(client.clone()),
            input: InputController::new(config.input.clone()),
            event_handlers: Vec::new(),
            current_resource: None,
            mounted: true,
            config,
            client,
            surface,
        }
    }

    pub fn add_event_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.event_handlers.push(handler);
    }

    fn emit(&self, event: PlayerEvent) {
        for handler in &self.event_handlers {
            handler.handle_event(event.clone());
        }
    }

    /// Poll `resource_key` until it is ready, then attach a cache-busted
    /// manifest. Any live session is torn down first.
    pub async fn play_resource(&mut self, resource_key: &str) {
        self.mounted = true;
        if self.session.is_live() {
            self.session.destroy().await;
        }
        self.continuity.release_active_episode();
        info!("Playing resource {}", resource_key);
        self.current_resource = Some(resource_key.to_string());
        self.poll_updates = Some(self.poller.start(resource_key));
    }

    /// Poll the current resource again, e.g. after it was still converting.
    pub async fn retry(&mut self) -> Result<(), PlayerAppError> {
        let resource = self.current_resource.clone().ok_or(PlayerAppError::NoResource)?;
        self.play_resource(&resource).await;
        Ok(())
    }

    pub async fn open_title(&mut self, title_key: &str, title: &str) {
        self.mounted = true;
        self.stop_polling();
        self.current_resource = None;
        if self.session.is_live() {
            self.session.destroy().await;
        }
        self.continuity.open_title(title_key, title);
    }

    pub async fn select_provider(
        &mut self,
        kind: ProviderKind,
    ) -> Result<ProviderSelection, PlayerAppError> {
        self.stop_polling();
        match self.continuity.select_provider(kind, &mut self.session).await {
            Ok(selection) => {
                match &selection {
                    ProviderSelection::Embedded { embed_url } => self.emit(PlayerEvent::EmbedReady {
                        embed_url: embed_url.clone(),
                    }),
                    ProviderSelection::DirectHls { episode_count } => {
                        self.emit(PlayerEvent::EpisodesLoaded {
                            count: *episode_count,
                        })
                    }
                }
                Ok(selection)
            }
            Err(failure) => {
                warn!("Provider {:?} failed: {}", kind, failure);
                self.emit(PlayerEvent::ProviderFailed {
                    failure: failure.clone(),
                });
                Err(failure.into())
            }
        }
    }

    pub async fn select_episode(&mut self, index: usize) -> Result<EpisodeSelection, PlayerAppError> {
        let playable = self
            .continuity
            .episodes()
            .get(index)
            .is_some_and(|episode| episode.is_playable());
        if playable {
            self.hand_surface_to_episodes();
        }
        let result = self
            .continuity
            .select_episode(index, &mut self.session, self.surface.clone())
            .await;
        self.report_episode(result.clone());
        result.map_err(Into::into)
    }

    /// A pending conversion poll must not attach over an episode the
    /// viewer picked afterwards.
    fn hand_surface_to_episodes(&mut self) {
        if self.current_resource.take().is_some() || self.poll_updates.is_some() {
            debug!("Episode playback replaces the pending resource");
        }
        self.stop_polling();
    }

    fn report_episode(&self, result: Result<EpisodeSelection, ProviderResolutionFailure>) {
        match result {
            Ok(selection) => {
                self.emit(PlayerEvent::EpisodeChanged {
                    ordinal: selection.ordinal,
                    quality: selection.quality,
                });
                if let Some(session_id) = self.session.session_id() {
                    self.emit(PlayerEvent::SessionAttached {
                        session_id,
                        manifest_url: selection.url,
                    });
                }
            }
            Err(failure) => {
                warn!("Episode selection failed: {}", failure);
                self.emit(PlayerEvent::ProviderFailed { failure });
            }
        }
    }

    pub fn set_quality(&mut self, selection: LevelSelection) -> Result<(), PlayerAppError> {
        self.session.set_quality(selection)?;
        self.emit(PlayerEvent::QualityChanged { selection });
        Ok(())
    }

    /// Single cooperative loop over input, the hold timer, poll updates and
    /// session events. Always unmounts on exit.
    pub async fn run(&mut self, mut inputs: mpsc::Receiver<InputEvent>, cancel: CancellationToken) {
        let mut inputs_open = true;

        loop {
            let hold_deadline = self.input.hold_deadline();
            let polling = self.poll_updates.is_some();
            let live = self.session.is_live();

            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => LoopStep::Cancelled,
                _ = sleep_until_some(hold_deadline), if hold_deadline.is_some() => LoopStep::HoldElapsed,
                event = inputs.recv(), if inputs_open => LoopStep::Input(event),
                update = next_poll_update(&mut self.poll_updates), if polling => LoopStep::Poll(update),
                event = self.session.next_event(), if live => LoopStep::Session(event),
            };

            match step {
                LoopStep::Cancelled => break,
                LoopStep::HoldElapsed => {
                    let commands = self.input.on_hold_elapsed(Instant::now());
                    self.apply_commands(commands).await;
                }
                LoopStep::Input(Some(event)) => self.handle_input(event).await,
                LoopStep::Input(None) => {
                    debug!("Input channel closed");
                    inputs_open = false;
                }
                LoopStep::Poll(Some(update)) => self.handle_poll_update(update).await,
                LoopStep::Poll(None) => self.poll_updates = None,
                LoopStep::Session(Some(event)) => self.handle_session_event(event),
                LoopStep::Session(None) => {}
            }
        }

        self.unmount().await;
    }

    pub async fn handle_input(&mut self, event: InputEvent) {
        let commands = self.input.handle(&event, Instant::now());
        self.apply_commands(commands).await;
    }

    async fn apply_commands(&mut self, commands: Vec<PlayerCommand>) {
        for command in commands {
            self.execute(command).await;
        }
    }

    pub async fn handle_poll_update(&mut self, update: PollerEvent) {
        match update {
            PollerEvent::Status(status) => {
                let failure = status.failure.clone();
                self.emit(PlayerEvent::ConversionProgress { status });
                if let Some(failure) = failure {
                    error!("Conversion failed: {}", failure);
                    self.emit(PlayerEvent::ConversionFailed { failure });
                }
            }
            PollerEvent::AttachReady { resource, cache_bust } => {
                if self.current_resource.as_deref() != Some(resource.as_str()) {
                    debug!("Ignoring stale ready signal for {}", resource);
                    return;
                }
                match self.client.manifest_url(&resource, Some(cache_bust)) {
                    Ok(url) => {
                        let session_id = self.session.attach(url.clone(), self.surface.clone()).await;
                        self.emit(PlayerEvent::SessionAttached {
                            session_id,
                            manifest_url: url,
                        });
                    }
                    Err(e) => {
                        error!("Cannot build manifest URL for {}: {}", resource, e);
                        self.emit(PlayerEvent::SessionTerminated {
                            failure: StreamFailure::Network {
                                detail: e.to_string(),
                            },
                        });
                    }
                }
            }
        }
    }

    pub fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::LevelsReady { levels, .. } => {
                self.emit(PlayerEvent::QualityLevelsAvailable { levels });
                self.emit(PlayerEvent::PlaybackStatusChanged {
                    status: self.session.status(),
                });
            }
            SessionEvent::LevelSwitched { level, .. } => {
                self.emit(PlayerEvent::LevelSwitched { level });
            }
            SessionEvent::StatusChanged { status, .. } => {
                self.emit(PlayerEvent::PlaybackStatusChanged { status });
            }
            SessionEvent::Recovering { error, .. } => {
                self.emit(PlayerEvent::RecoveringFromError { error });
            }
            SessionEvent::Warning { error, .. } => {
                self.emit(PlayerEvent::PlaybackWarning { error });
            }
            SessionEvent::Terminated { failure, .. } => {
                self.emit(PlayerEvent::SessionTerminated { failure });
            }
        }
    }

    async fn apply_to_surface(&mut self, command: PlayerCommand) -> Result<(), SurfaceError> {
        let mut surface = self.surface.lock().await;
        match command {
            PlayerCommand::PlayPause => {
                let playing = surface.toggle_play_pause();
                drop(surface);
                if let Some(status) = self.session.note_playback(!playing) {
                    self.emit(PlayerEvent::PlaybackStatusChanged { status });
                }
            }
            PlayerCommand::SeekBy(delta) => {
                let position = surface.seek_by(delta)?;
                debug!("Seeked to {:.1}s", position);
            }
            PlayerCommand::SetVolumeBy(delta) => {
                let volume = surface.adjust_volume(delta)?;
                debug!("Volume {:.2}", volume);
            }
            PlayerCommand::SetPlaybackRate(rate) => surface.set_playback_rate(rate)?,
            PlayerCommand::ToggleFullscreen => {
                let fullscreen = surface.toggle_fullscreen();
                debug!("Fullscreen {}", fullscreen);
            }
            PlayerCommand::PrevEpisode | PlayerCommand::NextEpisode => {}
        }
        Ok(())
    }

    /// Tear everything down: the hold timer, the session and the poller.
    /// Each release runs regardless of the others; calling twice is a no-op.
    pub async fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;

        let restore = self.input.teardown();
        for command in restore {
            if let Err(e) = self.apply_to_surface(command).await {
                warn!("{:?} rejected during unmount: {}", command, e);
            }
        }
        self.session.destroy().await;
        self.stop_polling();

        info!("Player view unmounted");
        self.emit(PlayerEvent::Unmounted);
    }

    fn stop_polling(&mut self) {
        self.poller.stop();
        self.poll_updates = None;
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn surface(&self) -> SharedSurface {
        self.surface.clone()
    }

    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    pub fn continuity(&self) -> &SourceContinuityManager {
        &self.continuity
    }

    pub fn input(&self) -> &InputController {
        &self.input
    }

    pub fn is_polling(&self) -> bool {
        self.poll_updates.is_some() && self.poller.is_active()
    }
}

#[async_trait]
impl CommandSink for PlayerView {
    async fn execute(&mut self, command: PlayerCommand) {
        if command.is_episode_navigation() {
            if self.continuity.can_navigate() {
                self.hand_surface_to_episodes();
            }
            let result = match command {
                PlayerCommand::PrevEpisode => {
                    self.continuity.prev(&mut self.session, self.surface.clone()).await
                }
                _ => self.continuity.next(&mut self.session, self.surface.clone()).await,
            };
            match result {
                Ok(Some(selection)) => self.report_episode(Ok(selection)),
                Ok(None) => debug!("{:?} ignored", command),
                Err(failure) => self.report_episode(Err(failure)),
            }
            return;
        }

        if !self.session.is_live() {
            debug!("{:?} ignored without a live session", command);
            return;
        }
        if let Err(e) = self.apply_to_surface(command).await {
            warn!("{:?} rejected: {}", command, e);
        }
    }
}

impl Drop for PlayerView {
    fn drop(&mut self) {
        // The session's own Drop stops its engine.
        let restore = self.input.teardown();
        if !restore.is_empty() {
            if let Ok(mut surface) = self.surface.try_lock() {
                for command in restore {
                    if let PlayerCommand::SetPlaybackRate(rate) = command {
                        let _ = surface.set_playback_rate(rate);
                    }
                }
            }
        }
        self.poller.stop();
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Initialise tracing once per process; later calls are ignored.
pub fn init_logging(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.level.as_str().into());

    let result = if config.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    };

    if result.is_err() {
        debug!("Logging already initialised");
    }
}

/// Application builder for dependency injection and initialization
pub struct AppBuilder {
    config_path: Option<PathBuf>,
    custom_config: Option<AppConfig>,
    custom_backend: Option<Arc<dyn BackendClient>>,
    custom_engine_factory: Option<Arc<dyn EngineFactory>>,
    custom_surface: Option<SharedSurface>,
    event_handlers: Vec<Arc<dyn EventHandler>>,
    enable_env_overrides: bool,
    enable_logging: bool,
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            config_path: None,
            custom_config: None,
            custom_backend: None,
            custom_engine_factory: None,
            custom_surface: None,
            event_handlers: Vec::new(),
            enable_env_overrides: true,
            enable_logging: true,
        }
    }

    /// Set configuration file path
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    /// Set custom configuration
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.custom_config = Some(config);
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn BackendClient>) -> Self {
        self.custom_backend = Some(backend);
        self
    }

    pub fn with_engine_factory(mut self, factory: Arc<dyn EngineFactory>) -> Self {
        self.custom_engine_factory = Some(factory);
        self
    }

    pub fn with_surface(mut self, surface: SharedSurface) -> Self {
        self.custom_surface = Some(surface);
        self
    }

    /// Add an event handler
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handlers.push(handler);
        self
    }

    /// Enable or disable environment variable overrides
    pub fn with_env_overrides(mut self, enable: bool) -> Self {
        self.enable_env_overrides = enable;
        self
    }

    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }

    pub async fn build(self) -> Result<PlayerView, PlayerAppError> {
        let config = self.load_configuration().await?;
        if self.enable_logging {
            init_logging(&config.logging);
        }
        info!("Initializing player view");

        let client: Arc<dyn BackendClient> = match self.custom_backend {
            Some(client) => client,
            None => Arc::new(HttpBackendClient::new(&config.backend)?),
        };
        let engine_factory: Arc<dyn EngineFactory> = match self.custom_engine_factory {
            Some(factory) => factory,
            None => Arc::new(HlsEngineFactory::new(config.backend.request_timeout)?),
        };
        let surface = self
            .custom_surface
            .unwrap_or_else(|| shared_surface(DefaultPlaybackSurface::new()));

        let mut view = PlayerView::new(config, client, engine_factory, surface);

        if self.event_handlers.is_empty() {
            view.add_event_handler(Arc::new(ConsoleEventHandler));
        }
        for handler in self.event_handlers {
            view.add_event_handler(handler);
        }

        Ok(view)
    }

    async fn load_configuration(&self) -> Result<AppConfig, PlayerAppError> {
        let mut config = if let Some(custom_config) = &self.custom_config {
            custom_config.clone()
        } else {
            let config_path = self
                .config_path
                .clone()
                .unwrap_or_else(|| PathBuf::from("player.toml"));

            let mut config_manager = ConfigManager::new(config_path);
            config_manager.load().await?;
            config_manager.get_config().clone()
        };

        if self.enable_env_overrides {
            EnvConfigOverride::apply_overrides(&mut config);
        }

        crate::config::validate_config(&config)?;
        Ok(config)
    }
}

/// Application factory for creating pre-configured views
pub struct AppFactory;

impl AppFactory {
    /// Verbose logging against a local backend
    pub async fn create_development_view(backend_url: &str) -> Result<PlayerView, PlayerAppError> {
        let mut config = AppConfig::default();
        config.logging.level = "debug".to_string();
        config.backend.base_url = backend_url.to_string();

        AppBuilder::new().with_config(config).build().await
    }

    pub async fn create_production_view(config_path: PathBuf) -> Result<PlayerView, PlayerAppError> {
        AppBuilder::new()
            .with_config_path(config_path)
            .with_env_overrides(true)
            .build()
            .await
    }
}
