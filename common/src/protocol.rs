//! 后端协作接口的路径约定
//!
//! 播放控制器与模拟后端共用同一组路径常量，避免两端拼接规则不一致。

/// 转码状态查询: GET /status/{resource}
pub const STATUS_SEGMENT: &str = "status";
pub const STATUS_ROUTE: &str = "/status/:resource";

/// 主播放列表: GET /hls/{resource}/master.m3u8[?t=cacheBust]
pub const HLS_SEGMENT: &str = "hls";
pub const MASTER_PLAYLIST: &str = "master.m3u8";
pub const MANIFEST_ROUTE: &str = "/hls/:resource/master.m3u8";

/// 仅在收到新的 ready 信号后附加，防止缓存未就绪时的旧清单
pub const CACHE_BUST_PARAM: &str = "t";

/// 剧集列表: GET /episodes/{titleKey}
pub const EPISODES_SEGMENT: &str = "episodes";
pub const EPISODES_ROUTE: &str = "/episodes/:title_key";

/// 嵌入式播放源搜索: GET /search?token=…&title=…
pub const SEARCH_SEGMENT: &str = "search";
pub const SEARCH_ROUTE: &str = "/search";
pub const SEARCH_TOKEN_PARAM: &str = "token";
pub const SEARCH_TITLE_PARAM: &str = "title";

/// 转码状态字符串
#[allow(non_snake_case)]
pub mod StatusNames {
    pub const NOT_STARTED: &str = "not_started";
    pub const STARTING: &str = "starting";
    pub const CONVERTING: &str = "converting";
    pub const READY: &str = "ready";
    pub const ERROR: &str = "error";
}

/// 转码进度特殊值
#[allow(non_snake_case)]
pub mod ProgressMarkers {
    pub const FAILED: i32 = -1;
    pub const NOT_STARTED: i32 = 0;
    pub const STARTING: i32 = 5;
    pub const READY: i32 = 100;
}
