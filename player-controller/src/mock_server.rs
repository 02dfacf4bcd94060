use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use dashmap::DashMap;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use common::{
    EpisodeEntry, EpisodeSources, ProgressMarkers, SearchResponse, SearchResult, StatusNames,
    StatusResponse, VideoStreamError, EPISODES_ROUTE, MANIFEST_ROUTE, SEARCH_ROUTE, STATUS_ROUTE,
};

/// 单个码率档位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockVariant {
    pub width: u32,
    pub height: u32,
    pub bandwidth: u64,
}

impl MockVariant {
    pub fn new(width: u32, height: u32, bandwidth: u64) -> Self {
        Self {
            width,
            height,
            bandwidth,
        }
    }
}

/// 模拟转码中的资源
#[derive(Debug, Clone)]
pub struct MockResource {
    /// 当前进度，-1 表示失败
    pub progress: i32,
    /// 首次查询状态时才开始转码
    pub started: bool,
    /// 进度达到该值时转码失败
    pub fail_at: Option<i32>,
    /// 主播放列表中的档位，按此顺序输出
    pub variants: Vec<MockVariant>,
}

impl MockResource {
    pub fn new(variants: Vec<MockVariant>) -> Self {
        Self {
            progress: ProgressMarkers::NOT_STARTED,
            started: false,
            fail_at: None,
            variants,
        }
    }

    pub fn ready(variants: Vec<MockVariant>) -> Self {
        Self {
            progress: ProgressMarkers::READY,
            started: true,
            fail_at: None,
            variants,
        }
    }

    pub fn failing_at(mut self, progress: i32) -> Self {
        self.fail_at = Some(progress);
        self
    }

    pub fn is_ready(&self) -> bool {
        self.progress == ProgressMarkers::READY
    }
}

pub fn default_variants() -> Vec<MockVariant> {
    vec![
        MockVariant::new(854, 480, 1_200_000),
        MockVariant::new(1280, 720, 2_800_000),
        MockVariant::new(1920, 1080, 5_000_000),
    ]
}

/// 模拟后端：转码状态、HLS 主播放列表、剧集列表和嵌入源搜索
#[derive(Clone)]
pub struct MockBackend {
    resources: Arc<DashMap<String, MockResource>>,
    titles: Arc<DashMap<String, Vec<EpisodeEntry>>>,
    embeds: Arc<DashMap<String, String>>,
    search_token: String,
    progress_step: i32,
}

impl MockBackend {
    pub fn new(search_token: &str, progress_step: i32) -> Self {
        Self {
            resources: Arc::new(DashMap::new()),
            titles: Arc::new(DashMap::new()),
            embeds: Arc::new(DashMap::new()),
            search_token: search_token.to_string(),
            progress_step: progress_step.max(1),
        }
    }

    /// 预置演示数据
    pub fn demo(search_token: &str, progress_step: i32) -> Self {
        let backend = Self::new(search_token, progress_step);
        backend.register_resource("demo", MockResource::new(default_variants()));
        backend.register_resource("demo-ready", MockResource::ready(default_variants()));
        backend.register_resource(
            "demo-broken",
            MockResource::new(default_variants()).failing_at(50),
        );

        let source = |episode: u32, quality: &str| {
            Some(format!("https://cdn.example.com/demo-show/{}/{}.m3u8", episode, quality))
        };
        backend.register_title(
            "demo-show",
            vec![
                EpisodeEntry {
                    ordinal: 1,
                    sources: EpisodeSources {
                        p1080: source(1, "1080"),
                        p720: source(1, "720"),
                        p480: None,
                    },
                },
                EpisodeEntry {
                    ordinal: 2,
                    sources: EpisodeSources {
                        p1080: None,
                        p720: source(2, "720"),
                        p480: source(2, "480"),
                    },
                },
                EpisodeEntry {
                    ordinal: 3,
                    sources: EpisodeSources::default(),
                },
                EpisodeEntry {
                    ordinal: 4,
                    sources: EpisodeSources {
                        p1080: None,
                        p720: None,
                        p480: source(4, "480"),
                    },
                },
            ],
        );
        backend.register_embed("Demo Show", "https://embed.example.com/v/demo-show");
        backend
    }

    pub fn register_resource(&self, key: &str, resource: MockResource) {
        info!("Registering mock resource: {}", key);
        self.resources.insert(key.to_string(), resource);
    }

    pub fn register_title(&self, key: &str, episodes: Vec<EpisodeEntry>) {
        self.titles.insert(key.to_string(), episodes);
    }

    pub fn register_embed(&self, title: &str, embed_url: &str) {
        self.embeds.insert(title.to_lowercase(), embed_url.to_string());
    }

    pub fn resource(&self, key: &str) -> Option<MockResource> {
        self.resources.get(key).map(|r| r.value().clone())
    }

    /// 查询并推进转码进度。未知资源按失败处理。
    pub fn probe(&self, key: &str) -> StatusResponse {
        let Some(mut entry) = self.resources.get_mut(key) else {
            warn!("Status requested for unknown resource: {}", key);
            return StatusResponse::failed();
        };
        let resource = entry.value_mut();

        if !resource.started {
            // 首次查询触发转码
            resource.started = true;
            debug!("Transcoding of {} started by status probe", key);
            return StatusResponse::with_status(ProgressMarkers::NOT_STARTED, StatusNames::NOT_STARTED);
        }

        match resource.progress {
            ProgressMarkers::FAILED => return StatusResponse::failed(),
            ProgressMarkers::READY => return StatusResponse::ready(),
            _ => {}
        }

        let next = if resource.progress < ProgressMarkers::STARTING {
            ProgressMarkers::STARTING
        } else {
            (resource.progress + self.progress_step).min(ProgressMarkers::READY)
        };

        if resource.fail_at.is_some_and(|fail_at| next >= fail_at) {
            resource.progress = ProgressMarkers::FAILED;
            return StatusResponse::failed();
        }

        resource.progress = next;
        let status = match next {
            ProgressMarkers::STARTING => StatusNames::STARTING,
            ProgressMarkers::READY => StatusNames::READY,
            _ => StatusNames::CONVERTING,
        };
        StatusResponse::with_status(next, status)
    }

    /// 就绪前返回不含任何档位的空播放列表
    pub fn master_playlist(&self, key: &str) -> common::Result<String> {
        let resource = self
            .resources
            .get(key)
            .ok_or_else(|| VideoStreamError::ResourceNotFound(key.to_string()))?;

        let mut playlist = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
        if !resource.is_ready() {
            playlist.push_str("#EXT-X-TARGETDURATION:6\n");
            return Ok(playlist);
        }

        for variant in &resource.variants {
            playlist.push_str(&format!(
                "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{}\n{}p/index.m3u8\n",
                variant.bandwidth, variant.width, variant.height, variant.height
            ));
        }
        Ok(playlist)
    }

    pub fn episodes(&self, title_key: &str) -> common::Result<Vec<EpisodeEntry>> {
        self.titles
            .get(title_key)
            .map(|episodes| episodes.value().clone())
            .ok_or_else(|| VideoStreamError::TitleNotFound(title_key.to_string()))
    }

    pub fn search(&self, title: &str) -> SearchResponse {
        let results = self
            .embeds
            .get(&title.to_lowercase())
            .map(|link| {
                vec![SearchResult {
                    title: Some(title.to_string()),
                    link: link.value().clone(),
                }]
            })
            .unwrap_or_default();
        SearchResponse { results }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(STATUS_ROUTE, get(get_status))
            .route(MANIFEST_ROUTE, get(get_master_playlist))
            .route(EPISODES_ROUTE, get(get_episodes))
            .route(SEARCH_ROUTE, get(search_embed))
            .with_state(self.clone())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        info!("Mock backend listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router()).await
    }

    /// 在随机端口上后台运行
    pub async fn spawn(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let backend = self.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = backend.serve(listener).await {
                error!("Mock backend stopped: {}", e);
            }
        });
        Ok((addr, handle))
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    token: Option<String>,
    title: Option<String>,
}

async fn get_status(
    Path(resource): Path<String>,
    State(backend): State<MockBackend>,
) -> Json<StatusResponse> {
    Json(backend.probe(&resource))
}

async fn get_master_playlist(
    Path(resource): Path<String>,
    State(backend): State<MockBackend>,
) -> Result<impl IntoResponse, StatusCode> {
    match backend.master_playlist(&resource) {
        Ok(playlist) => Ok((
            [(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")],
            playlist,
        )),
        Err(e) => {
            debug!("{}", e);
            Err(StatusCode::NOT_FOUND)
        }
    }
}

async fn get_episodes(
    Path(title_key): Path<String>,
    State(backend): State<MockBackend>,
) -> Result<Json<Vec<EpisodeEntry>>, StatusCode> {
    backend.episodes(&title_key).map(Json).map_err(|e| {
        debug!("{}", e);
        StatusCode::NOT_FOUND
    })
}

async fn search_embed(
    Query(params): Query<SearchParams>,
    State(backend): State<MockBackend>,
) -> Result<Json<SearchResponse>, StatusCode> {
    if params.token.as_deref() != Some(backend.search_token.as_str()) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let title = params.title.unwrap_or_default();
    Ok(Json(backend.search(&title)))
}
