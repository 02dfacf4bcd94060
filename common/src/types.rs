use serde::{Deserialize, Serialize};

use crate::error::{Result, VideoStreamError};
use crate::protocol::{ProgressMarkers, StatusNames};

/// 转码状态响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub progress: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl StatusResponse {
    pub fn new(progress: i32) -> Self {
        Self {
            progress,
            status: None,
        }
    }

    pub fn with_status(progress: i32, status: &str) -> Self {
        Self {
            progress,
            status: Some(status.to_string()),
        }
    }

    pub fn ready() -> Self {
        Self::with_status(ProgressMarkers::READY, StatusNames::READY)
    }

    pub fn failed() -> Self {
        Self::with_status(ProgressMarkers::FAILED, StatusNames::ERROR)
    }
}

/// 各清晰度的剧集播放地址（键为 "1080" / "720" / "480"）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeSources {
    #[serde(rename = "1080", default, skip_serializing_if = "Option::is_none")]
    pub p1080: Option<String>,
    #[serde(rename = "720", default, skip_serializing_if = "Option::is_none")]
    pub p720: Option<String>,
    #[serde(rename = "480", default, skip_serializing_if = "Option::is_none")]
    pub p480: Option<String>,
}

impl EpisodeSources {
    pub fn is_empty(&self) -> bool {
        [&self.p1080, &self.p720, &self.p480]
            .iter()
            .all(|url| url.as_deref().map_or(true, |u| u.trim().is_empty()))
    }
}

/// 剧集列表条目，ordinal 是连续播放的主键而不是数组下标
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeEntry {
    pub ordinal: u32,
    #[serde(default)]
    pub sources: EpisodeSources,
}

impl EpisodeEntry {
    pub fn validate(&self) -> Result<()> {
        if self.ordinal == 0 {
            return Err(VideoStreamError::InvalidParameter(
                "episode ordinal must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// 搜索结果条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// 嵌入播放器地址，原样用作 iframe 源
    pub link: String,
}

/// 搜索响应
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchResult>,
}

impl SearchResponse {
    pub fn first_link(&self) -> Option<&str> {
        self.results
            .first()
            .map(|r| r.link.as_str())
            .filter(|link| !link.trim().is_empty())
    }
}
