//! Scripted collaborators shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use url::Url;

use common::{EpisodeEntry, EpisodeSources, StatusResponse};

use crate::app::{EventHandler, PlayerEvent};
use crate::controller::SharedSurface;
use crate::engine::{EngineEvent, EngineEventSender, EngineFactory, StreamingEngine};
use crate::errors::TransportError;
use crate::input::CommandSink;
use crate::transport::BackendClient;
use crate::types::PlayerCommand;

pub const TEST_BASE: &str = "http://media.test";

// ============================================================================
// Backend
// ============================================================================

#[derive(Default)]
struct BackendScript {
    statuses: HashMap<String, VecDeque<Result<StatusResponse, TransportError>>>,
    last_status: HashMap<String, Result<StatusResponse, TransportError>>,
    status_calls: HashMap<String, usize>,
    episodes: HashMap<String, Vec<EpisodeEntry>>,
    episode_calls: usize,
    embeds: HashMap<String, String>,
    search_calls: usize,
}

/// Backend whose responses are queued up front. The last queued status
/// repeats once the queue runs dry.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Mutex<BackendScript>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_status(&self, resource: &str, progress: i32, status: Option<&str>) {
        let response = StatusResponse {
            progress,
            status: status.map(str::to_string),
        };
        self.push_status_result(resource, Ok(response));
    }

    pub fn push_status_result(
        &self,
        resource: &str,
        result: Result<StatusResponse, TransportError>,
    ) {
        self.script
            .lock()
            .unwrap()
            .statuses
            .entry(resource.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn set_episodes(&self, title_key: &str, episodes: Vec<EpisodeEntry>) {
        self.script
            .lock()
            .unwrap()
            .episodes
            .insert(title_key.to_string(), episodes);
    }

    pub fn set_embed(&self, title: &str, embed_url: &str) {
        self.script
            .lock()
            .unwrap()
            .embeds
            .insert(title.to_string(), embed_url.to_string());
    }

    pub fn status_calls(&self, resource: &str) -> usize {
        self.script
            .lock()
            .unwrap()
            .status_calls
            .get(resource)
            .copied()
            .unwrap_or(0)
    }

    pub fn episode_calls(&self) -> usize {
        self.script.lock().unwrap().episode_calls
    }

    pub fn search_calls(&self) -> usize {
        self.script.lock().unwrap().search_calls
    }
}

#[async_trait]
impl BackendClient for ScriptedBackend {
    async fn fetch_status(&self, resource: &str) -> Result<StatusResponse, TransportError> {
        let mut script = self.script.lock().unwrap();
        *script.status_calls.entry(resource.to_string()).or_default() += 1;

        let next = script
            .statuses
            .get_mut(resource)
            .and_then(|queue| queue.pop_front());
        match next {
            Some(result) => {
                script.last_status.insert(resource.to_string(), result.clone());
                result
            }
            None => script
                .last_status
                .get(resource)
                .cloned()
                .unwrap_or(Err(TransportError::Http {
                    status: 404,
                    url: format!("{}/status/{}", TEST_BASE, resource),
                })),
        }
    }

    async fn fetch_episodes(&self, title_key: &str) -> Result<Vec<EpisodeEntry>, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.episode_calls += 1;
        script
            .episodes
            .get(title_key)
            .cloned()
            .ok_or_else(|| TransportError::Http {
                status: 404,
                url: format!("{}/episodes/{}", TEST_BASE, title_key),
            })
    }

    async fn search_embed(&self, title: &str) -> Result<Option<String>, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.search_calls += 1;
        Ok(script.embeds.get(title).cloned())
    }

    fn manifest_url(&self, resource: &str, cache_bust: Option<i64>) -> Result<Url, TransportError> {
        let mut url = Url::parse(&format!("{}/hls/{}/master.m3u8", TEST_BASE, resource))?;
        if let Some(t) = cache_bust {
            url.query_pairs_mut().append_pair("t", &t.to_string());
        }
        Ok(url)
    }
}

pub fn episode(ordinal: u32, p1080: Option<&str>, p720: Option<&str>, p480: Option<&str>) -> EpisodeEntry {
    EpisodeEntry {
        ordinal,
        sources: EpisodeSources {
            p1080: p1080.map(str::to_string),
            p720: p720.map(str::to_string),
            p480: p480.map(str::to_string),
        },
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Everything the scripted engines were asked to do, in creation order
#[derive(Default)]
pub struct EngineProbe {
    pub created: usize,
    pub load_calls: Vec<Url>,
    pub destroy_calls: usize,
    pub recover_calls: usize,
    pub level_calls: Vec<Option<usize>>,
    senders: Vec<EngineEventSender>,
    surfaces: Vec<Option<SharedSurface>>,
}

#[derive(Clone, Default)]
pub struct ScriptedEngineFactory {
    probe: Arc<Mutex<EngineProbe>>,
}

impl ScriptedEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> std::sync::MutexGuard<'_, EngineProbe> {
        self.probe.lock().unwrap()
    }

    /// Deliver an event as engine number `engine` would. Returns `false`
    /// when the owning session has already dropped its receiver.
    pub fn emit(&self, engine: usize, event: EngineEvent) -> bool {
        let probe = self.probe.lock().unwrap();
        probe
            .senders
            .get(engine)
            .map(|tx| tx.send(event).is_ok())
            .unwrap_or(false)
    }

    /// Emit on the most recently created engine
    pub fn emit_latest(&self, event: EngineEvent) -> bool {
        let latest = self.probe().created.saturating_sub(1);
        self.emit(latest, event)
    }

    pub fn engine_holds_surface(&self, engine: usize) -> bool {
        self.probe
            .lock()
            .unwrap()
            .surfaces
            .get(engine)
            .map(Option::is_some)
            .unwrap_or(false)
    }
}

struct ScriptedEngine {
    index: usize,
    probe: Arc<Mutex<EngineProbe>>,
}

impl StreamingEngine for ScriptedEngine {
    fn attach_media(&mut self, surface: SharedSurface) {
        self.probe.lock().unwrap().surfaces[self.index] = Some(surface);
    }

    fn load_source(&mut self, url: &Url) {
        self.probe.lock().unwrap().load_calls.push(url.clone());
    }

    fn set_current_level(&mut self, level: Option<usize>) {
        self.probe.lock().unwrap().level_calls.push(level);
    }

    fn recover_media_error(&mut self) {
        self.probe.lock().unwrap().recover_calls += 1;
    }

    fn destroy(&mut self) {
        let mut probe = self.probe.lock().unwrap();
        probe.destroy_calls += 1;
        probe.surfaces[self.index] = None;
    }
}

impl EngineFactory for ScriptedEngineFactory {
    fn create(&self, events: EngineEventSender) -> Box<dyn StreamingEngine> {
        let mut probe = self.probe.lock().unwrap();
        let index = probe.created;
        probe.created += 1;
        probe.senders.push(events);
        probe.surfaces.push(None);
        Box::new(ScriptedEngine {
            index,
            probe: self.probe.clone(),
        })
    }
}

// ============================================================================
// Observers
// ============================================================================

#[derive(Clone, Default)]
pub struct RecordingEventHandler {
    events: Arc<Mutex<Vec<PlayerEvent>>>,
}

impl RecordingEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PlayerEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventHandler for RecordingEventHandler {
    fn handle_event(&self, event: PlayerEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub commands: Vec<PlayerCommand>,
}

#[async_trait]
impl CommandSink for RecordingSink {
    async fn execute(&mut self, command: PlayerCommand) {
        self.commands.push(command);
    }
}
