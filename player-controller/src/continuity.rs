use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::controller::SharedSurface;
use crate::errors::ProviderResolutionFailure;
use crate::session::StreamSession;
use crate::transport::BackendClient;
use crate::types::{Episode, ProviderKind, Quality};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleRef {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContinuityState {
    NoProvider,
    ProviderChosen(ProviderKind),
    EmbeddedReady { embed_url: String },
    EpisodesLoading,
    EpisodesReady,
}

/// Result of a successful provider switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderSelection {
    Embedded { embed_url: String },
    DirectHls { episode_count: usize },
}

/// The episode a session was attached to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeSelection {
    pub index: usize,
    pub ordinal: u32,
    pub quality: Quality,
    pub url: Url,
}

/// Tracks the chosen provider and episode list for one title, and keeps
/// the stream session consistent when either changes.
pub struct SourceContinuityManager {
    client: Arc<dyn BackendClient>,
    title: Option<TitleRef>,
    provider: Option<ProviderKind>,
    state: ContinuityState,
    episodes: Vec<Episode>,
    active_index: Option<usize>,
}

impl SourceContinuityManager {
    pub fn new(client: Arc<dyn BackendClient>) -> Self {
        Self {
            client,
            title: None,
            provider: None,
            state: ContinuityState::NoProvider,
            episodes: Vec::new(),
            active_index: None,
        }
    }

    /// Switch to another title, forgetting the provider and episode list.
    pub fn open_title(&mut self, key: &str, name: &str) {
        self.title = Some(TitleRef {
            key: key.to_string(),
            name: name.to_string(),
        });
        self.reset_sources();
        self.provider = None;
        self.state = ContinuityState::NoProvider;
    }

    fn reset_sources(&mut self) {
        self.episodes.clear();
        self.active_index = None;
    }

    /// Switch provider for the open title.
    ///
    /// A live session is destroyed first and every trace of the previous
    /// provider is cleared before the new one resolves. On failure nothing
    /// from the failed attempt is kept.
    pub async fn select_provider(
        &mut self,
        kind: ProviderKind,
        session: &mut StreamSession,
    ) -> Result<ProviderSelection, ProviderResolutionFailure> {
        let title = self.title.clone().ok_or(ProviderResolutionFailure::NoTitle)?;

        if session.is_live() {
            session.destroy().await;
        }
        self.reset_sources();
        self.provider = Some(kind);
        self.state = ContinuityState::ProviderChosen(kind);
        info!("Provider {:?} selected for {}", kind, title.key);

        match kind {
            ProviderKind::Embedded => {
                let embed_url = self
                    .client
                    .search_embed(&title.name)
                    .await?
                    .ok_or_else(|| ProviderResolutionFailure::EmbedNotFound {
                        title: title.name.clone(),
                    })?;
                self.state = ContinuityState::EmbeddedReady {
                    embed_url: embed_url.clone(),
                };
                Ok(ProviderSelection::Embedded { embed_url })
            }
            ProviderKind::DirectHls => {
                let episode_count = self.load_episode_list(&title.key).await?.len();
                Ok(ProviderSelection::DirectHls { episode_count })
            }
        }
    }

    /// Fetch and order the episode list. An empty list is a failure and
    /// leaves no partial state behind.
    pub async fn load_episode_list(
        &mut self,
        title_key: &str,
    ) -> Result<&[Episode], ProviderResolutionFailure> {
        self.reset_sources();
        self.state = ContinuityState::EpisodesLoading;

        let entries = match self.client.fetch_episodes(title_key).await {
            Ok(entries) => entries,
            Err(e) => {
                self.state = ContinuityState::ProviderChosen(ProviderKind::DirectHls);
                return Err(e.into());
            }
        };

        let mut episodes: Vec<Episode> = entries.iter().map(Episode::from_entry).collect();
        episodes.sort_by_key(|episode| episode.ordinal);
        episodes.dedup_by_key(|episode| episode.ordinal);

        if episodes.is_empty() {
            warn!("No episodes for {}", title_key);
            self.state = ContinuityState::ProviderChosen(ProviderKind::DirectHls);
            return Err(ProviderResolutionFailure::NoEpisodes {
                title_key: title_key.to_string(),
            });
        }

        debug!("Loaded {} episodes for {}", episodes.len(), title_key);
        self.episodes = episodes;
        self.state = ContinuityState::EpisodesReady;
        Ok(&self.episodes)
    }

    /// Attach the session to episode `index` at its best quality. An
    /// unplayable episode leaves the session untouched.
    pub async fn select_episode(
        &mut self,
        index: usize,
        session: &mut StreamSession,
        surface: SharedSurface,
    ) -> Result<EpisodeSelection, ProviderResolutionFailure> {
        if self.state != ContinuityState::EpisodesReady {
            return Err(ProviderResolutionFailure::EpisodesNotLoaded);
        }
        let episode = self.episodes.get(index).ok_or(
            ProviderResolutionFailure::EpisodeOutOfRange {
                index,
                len: self.episodes.len(),
            },
        )?;
        let (quality, url) = episode
            .best_source()
            .map(|(quality, url)| (quality, url.clone()))
            .ok_or(ProviderResolutionFailure::EpisodeUnplayable {
                ordinal: episode.ordinal,
            })?;
        let ordinal = episode.ordinal;

        info!("Episode {} at {}", ordinal, quality);
        session.attach(url.clone(), surface).await;
        self.active_index = Some(index);

        Ok(EpisodeSelection {
            index,
            ordinal,
            quality,
            url,
        })
    }

    /// Advance to the next playable episode. `Ok(None)` at the end of the
    /// list, with nothing active, or for the embedded provider.
    pub async fn next(
        &mut self,
        session: &mut StreamSession,
        surface: SharedSurface,
    ) -> Result<Option<EpisodeSelection>, ProviderResolutionFailure> {
        let Some(current) = self.navigable_index() else {
            return Ok(None);
        };
        let target = (current + 1..self.episodes.len()).find(|&i| self.episodes[i].is_playable());
        self.navigate(target, session, surface).await
    }

    /// Step back to the previous playable episode. `Ok(None)` at the start
    /// of the list, with nothing active, or for the embedded provider.
    pub async fn prev(
        &mut self,
        session: &mut StreamSession,
        surface: SharedSurface,
    ) -> Result<Option<EpisodeSelection>, ProviderResolutionFailure> {
        let Some(current) = self.navigable_index() else {
            return Ok(None);
        };
        let target = (0..current).rev().find(|&i| self.episodes[i].is_playable());
        self.navigate(target, session, surface).await
    }

    /// Forget the playing episode when something else takes over the
    /// surface. The loaded list stays, so `select_episode` still works.
    pub fn release_active_episode(&mut self) {
        if let Some(index) = self.active_index.take() {
            debug!("Episode at index {} no longer owns the surface", index);
        }
    }

    /// Whether next/prev would attach anything from the current position.
    pub fn can_navigate(&self) -> bool {
        self.navigable_index().is_some()
    }

    fn navigable_index(&self) -> Option<usize> {
        if self.provider != Some(ProviderKind::DirectHls) || self.state != ContinuityState::EpisodesReady {
            return None;
        }
        self.active_index
    }

    async fn navigate(
        &mut self,
        target: Option<usize>,
        session: &mut StreamSession,
        surface: SharedSurface,
    ) -> Result<Option<EpisodeSelection>, ProviderResolutionFailure> {
        match target {
            Some(index) => self.select_episode(index, session, surface).await.map(Some),
            None => {
                debug!("No playable episode in that direction");
                Ok(None)
            }
        }
    }

    pub fn title(&self) -> Option<&TitleRef> {
        self.title.as_ref()
    }

    pub fn provider(&self) -> Option<ProviderKind> {
        self.provider
    }

    pub fn state(&self) -> &ContinuityState {
        &self.state
    }

    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }

    pub fn active_episode(&self) -> Option<&Episode> {
        self.active_index.and_then(|i| self.episodes.get(i))
    }

    pub fn embed_url(&self) -> Option<&str> {
        match &self.state {
            ContinuityState::EmbeddedReady { embed_url } => Some(embed_url),
            _ => None,
        }
    }
}
