// Playlist Fetcher: one GET per call, decoded into master variants or a media playlist.

use async_trait::async_trait;
use bytes::Bytes;
use m3u8_rs::{MediaPlaylist, parse_master_playlist_res, parse_media_playlist_res};
use reqwest::Client;
use tracing::{debug, trace};
use url::Url;

use super::{FetchedPlaylist, PlaylistVariant};
use crate::error::{PoolError, Result};

/// Source of decoded playlists. Implementations never retry.
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    /// Variants of a master playlist, resolved against `url`, in playlist order.
    async fn fetch_master(&self, url: &Url) -> Result<Vec<PlaylistVariant>>;

    /// A media playlist with at least one segment.
    async fn fetch_media(&self, url: &Url) -> Result<MediaPlaylist>;
}

pub struct HttpPlaylistFetcher {
    client: Client,
}

impl HttpPlaylistFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetches `url` and decodes whichever kind of playlist it holds.
    pub async fn fetch(&self, url: &Url) -> Result<FetchedPlaylist> {
        let body = self.get(url).await?;
        decode_playlist(url, &body)
    }

    async fn get(&self, url: &Url) -> Result<Bytes> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PoolError::http_status(status, url.as_str(), body));
        }
        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl PlaylistSource for HttpPlaylistFetcher {
    async fn fetch_master(&self, url: &Url) -> Result<Vec<PlaylistVariant>> {
        let body = self.get(url).await?;
        let variants = decode_master(url, &body)?;
        debug!(url = %url, variants = variants.len(), "Fetched master playlist");
        Ok(variants)
    }

    async fn fetch_media(&self, url: &Url) -> Result<MediaPlaylist> {
        let body = self.get(url).await?;
        let playlist = decode_media(url, &body)?;
        debug!(url = %url, segments = playlist.segments.len(), "Fetched media playlist");
        Ok(playlist)
    }
}

pub fn decode_master(url: &Url, body: &[u8]) -> Result<Vec<PlaylistVariant>> {
    let playlist = parse_master_playlist_res(body).map_err(|e| {
        PoolError::playlist(format!("Failed to parse master playlist {url}: {e}"))
    })?;
    if playlist.variants.is_empty() {
        debug!(url = %url, "Master playlist has zero variants");
        return Err(PoolError::no_streams(url.as_str()));
    }

    playlist
        .variants
        .iter()
        .map(|variant| {
            let resolved = url.join(&variant.uri).map_err(|e| {
                PoolError::invalid_url(variant.uri.clone(), format!("cannot resolve against {url}: {e}"))
            })?;
            trace!(variant = %resolved, "Resolved variant");
            Ok(PlaylistVariant {
                url: resolved,
                resolution: variant
                    .resolution
                    .map(|r| format!("{}x{}", r.width, r.height)),
                bandwidth: variant.bandwidth,
            })
        })
        .collect()
}

pub fn decode_media(url: &Url, body: &[u8]) -> Result<MediaPlaylist> {
    let playlist = parse_media_playlist_res(body).map_err(|e| {
        PoolError::playlist(format!("Failed to parse media playlist {url}: {e}"))
    })?;
    if playlist.segments.is_empty() {
        debug!(url = %url, "Media playlist has zero segments");
        return Err(PoolError::no_streams(url.as_str()));
    }
    Ok(playlist)
}

pub fn decode_playlist(url: &Url, body: &[u8]) -> Result<FetchedPlaylist> {
    match m3u8_rs::parse_playlist_res(body) {
        Ok(m3u8_rs::Playlist::MasterPlaylist(_)) => {
            decode_master(url, body).map(FetchedPlaylist::Master)
        }
        Ok(m3u8_rs::Playlist::MediaPlaylist(_)) => {
            decode_media(url, body).map(FetchedPlaylist::Media)
        }
        Err(e) => Err(PoolError::playlist(format!(
            "Failed to parse playlist {url}: {e}"
        ))),
    }
}
