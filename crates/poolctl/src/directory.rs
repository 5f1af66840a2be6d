// Stream directory: lists currently broadcasting source streams.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::DirectoryFilter;
use crate::error::{PoolError, Result};

pub const PICARTO_API_BASE: &str = "https://api.picarto.tv/api/v1/";

/// A source stream offered by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamCandidate {
    pub name: String,
    #[serde(default = "default_online")]
    pub online: bool,
}

fn default_online() -> bool {
    true
}

impl StreamCandidate {
    pub fn online(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            online: true,
        }
    }
}

#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Online candidates in listing order.
    async fn list_online(&self, filter: &DirectoryFilter) -> Result<Vec<StreamCandidate>>;
}

/// Picarto public API directory.
pub struct PicartoDirectory {
    client: Client,
    base_url: Url,
}

impl PicartoDirectory {
    pub fn new(client: Client, base_url: &str) -> Result<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| PoolError::invalid_url(base_url, e))?;
        Ok(Self { client, base_url })
    }

    fn online_url(&self, filter: &DirectoryFilter) -> Result<Url> {
        let mut url = self
            .base_url
            .join("online")
            .map_err(|e| PoolError::invalid_url(self.base_url.as_str(), e))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("adult", &filter.adult.to_string())
                .append_pair("gaming", &filter.gaming.to_string());
            if let Some(region) = &filter.region {
                query.append_pair("region", region);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl CandidateSource for PicartoDirectory {
    async fn list_online(&self, filter: &DirectoryFilter) -> Result<Vec<StreamCandidate>> {
        let url = self.online_url(filter)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| PoolError::directory(format!("request to {url} failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PoolError::directory(format!(
                "{url} returned HTTP {status}: {body}"
            )));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| PoolError::directory(format!("failed to read {url}: {e}")))?;
        let candidates: Vec<StreamCandidate> = serde_json::from_slice(&body)?;
        let online: Vec<StreamCandidate> =
            candidates.into_iter().filter(|c| c.online).collect();
        debug!(count = online.len(), "Listed online streams");
        Ok(online)
    }
}
