use std::time::Duration;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use common::{
    EpisodeEntry, SearchResponse, StatusResponse, CACHE_BUST_PARAM, EPISODES_SEGMENT,
    HLS_SEGMENT, MASTER_PLAYLIST, SEARCH_SEGMENT, SEARCH_TITLE_PARAM, SEARCH_TOKEN_PARAM,
    STATUS_SEGMENT,
};

use crate::config::BackendConfig;
use crate::errors::{PlayerAppError, TransportError};

/// Narrow interface to the backend collaborators the controller talks to
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// GET /status/{resource}
    async fn fetch_status(&self, resource: &str) -> Result<StatusResponse, TransportError>;

    /// GET /episodes/{titleKey}
    async fn fetch_episodes(&self, title_key: &str) -> Result<Vec<EpisodeEntry>, TransportError>;

    /// GET /search?token=…&title=…, returning the first result's embed URL verbatim
    async fn search_embed(&self, title: &str) -> Result<Option<String>, TransportError>;

    /// /hls/{resource}/master.m3u8, with `?t=` only when a cache-bust value is given
    fn manifest_url(&self, resource: &str, cache_bust: Option<i64>) -> Result<Url, TransportError>;
}

/// reqwest-backed client for the collaborator endpoints
#[derive(Clone, Debug)]
pub struct HttpBackendClient {
    inner: Client,
    base_url: Url,
    search_token: String,
    request_timeout: Duration,
}

impl HttpBackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, PlayerAppError> {
        let base_url = config.parsed_base_url()?;
        let inner = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PlayerAppError::Configuration {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            inner,
            base_url,
            search_token: config.search_token.clone(),
            request_timeout: config.request_timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl {
                reason: format!("{} cannot be a base URL", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, TransportError> {
        debug!("GET {}", url);
        let response = self
            .inner
            .get(url.clone())
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, self.request_timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| TransportError::Deserialization {
                message: format!("{}: {}", url, e),
            })
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn fetch_status(&self, resource: &str) -> Result<StatusResponse, TransportError> {
        let url = self.endpoint(&[STATUS_SEGMENT, resource])?;
        self.get_json(url).await
    }

    async fn fetch_episodes(&self, title_key: &str) -> Result<Vec<EpisodeEntry>, TransportError> {
        let url = self.endpoint(&[EPISODES_SEGMENT, title_key])?;
        let entries: Vec<EpisodeEntry> = self.get_json(url).await?;

        Ok(entries
            .into_iter()
            .filter(|entry| match entry.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!("Dropping episode entry for {}: {}", title_key, e);
                    false
                }
            })
            .collect())
    }

    async fn search_embed(&self, title: &str) -> Result<Option<String>, TransportError> {
        let mut url = self.endpoint(&[SEARCH_SEGMENT])?;
        url.query_pairs_mut()
            .append_pair(SEARCH_TOKEN_PARAM, &self.search_token)
            .append_pair(SEARCH_TITLE_PARAM, title);

        let response: SearchResponse = self.get_json(url).await?;
        Ok(response.first_link().map(str::to_string))
    }

    fn manifest_url(&self, resource: &str, cache_bust: Option<i64>) -> Result<Url, TransportError> {
        let mut url = self.endpoint(&[HLS_SEGMENT, resource, MASTER_PLAYLIST])?;
        if let Some(t) = cache_bust {
            url.query_pairs_mut()
                .append_pair(CACHE_BUST_PARAM, &t.to_string());
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> HttpBackendClient {
        let config = BackendConfig {
            base_url: base.to_string(),
            search_token: "secret".to_string(),
            request_timeout: Duration::from_secs(1),
        };
        HttpBackendClient::new(&config).unwrap()
    }

    #[test]
    fn test_manifest_url_without_cache_bust() {
        let url = client("http://media.local/").manifest_url("abc", None).unwrap();
        assert_eq!(url.as_str(), "http://media.local/hls/abc/master.m3u8");
    }

    #[test]
    fn test_manifest_url_with_cache_bust() {
        let url = client("http://media.local/api")
            .manifest_url("abc", Some(1700000000000))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://media.local/api/hls/abc/master.m3u8?t=1700000000000"
        );
    }

    #[test]
    fn test_resource_keys_are_escaped() {
        let url = client("http://media.local").manifest_url("a b/c", None).unwrap();
        assert_eq!(url.as_str(), "http://media.local/hls/a%20b%2Fc/master.m3u8");
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        let config = BackendConfig {
            base_url: "::::".to_string(),
            ..BackendConfig::default()
        };
        assert!(HttpBackendClient::new(&config).is_err());
    }
}
