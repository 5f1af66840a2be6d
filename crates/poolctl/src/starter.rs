// Session Starter: brings one stream from "requested" to "pulling".

use std::sync::Arc;

use futures::future::join_all;
use m3u8_rs::MediaPlaylist;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::align::{AlignmentOutcome, align_playlists};
use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::playlist::{PlaylistSource, PlaylistVariant};
use crate::retry::{RetryAction, RetryFailure, retry_linear};

/// Everything the pool needs to begin downloading a freshly started stream.
#[derive(Debug, Clone)]
pub struct StartedStream {
    pub name: String,
    pub master_url: Url,
    pub variants: Vec<PlaylistVariant>,
    /// One list per variant, in variant order.
    pub skip_lists: Vec<Vec<String>>,
    pub alignment: AlignmentOutcome,
}

pub struct SessionStarter {
    source: Arc<dyn PlaylistSource>,
    config: Arc<PoolConfig>,
}

impl SessionStarter {
    pub fn new(source: Arc<dyn PlaylistSource>, config: Arc<PoolConfig>) -> Self {
        Self { source, config }
    }

    pub async fn start(&self, name: &str, token: &CancellationToken) -> Result<StartedStream> {
        let master_url = self.config.master_playlist_url(name)?;
        info!(stream = name, url = %master_url, "Starting to pull stream");

        let variants = self.wait_for_renditions(&master_url, token).await?;
        let playlists = self.fetch_media_playlists(&variants, token).await?;

        let alignment = match (playlists.first(), playlists.get(1)) {
            (Some(source), Some(transcoded)) => {
                align_playlists(source, transcoded, &self.config.alignment)
            }
            _ => AlignmentOutcome::Unaligned,
        };
        if alignment == AlignmentOutcome::Unaligned {
            info!(stream = name, "Could not align source and transcoded segments");
        }
        let skip_lists = alignment.clone().into_skip_lists(variants.len());

        Ok(StartedStream {
            name: name.to_owned(),
            master_url,
            variants,
            skip_lists,
            alignment,
        })
    }

    /// Polls the master playlist until the source and every transcoded
    /// rendition are listed.
    async fn wait_for_renditions(
        &self,
        master_url: &Url,
        token: &CancellationToken,
    ) -> Result<Vec<PlaylistVariant>> {
        let expected = self.config.expected_renditions();
        let outcome = retry_linear(&self.config.start_retry, token, |attempt| {
            let source = Arc::clone(&self.source);
            let url = master_url.clone();
            async move {
                match source.fetch_master(&url).await {
                    Ok(variants) if variants.len() >= expected => RetryAction::Success(variants),
                    Ok(variants) => {
                        debug!(
                            url = %url,
                            attempt,
                            found = variants.len(),
                            expected,
                            "Transcoded renditions not ready yet"
                        );
                        RetryAction::Retry(PoolError::playlist(format!(
                            "master playlist lists {} of {expected} renditions",
                            variants.len()
                        )))
                    }
                    // NoStreams: the stream has no output at all.
                    Err(e) if !e.is_retryable() => RetryAction::Fail(e),
                    Err(e) => RetryAction::Retry(e),
                }
            }
        })
        .await;

        outcome.map_err(|failure| match failure {
            RetryFailure::Exhausted {
                attempts,
                last_error,
            } => PoolError::NotTranscoding {
                url: master_url.to_string(),
                attempts,
                last_error: last_error.to_string(),
            },
            RetryFailure::Aborted(e) => e,
        })
    }

    /// Fetches every variant's media playlist concurrently, returned in
    /// variant order. The first failure in variant order wins.
    async fn fetch_media_playlists(
        &self,
        variants: &[PlaylistVariant],
        token: &CancellationToken,
    ) -> Result<Vec<MediaPlaylist>> {
        let handles: Vec<_> = variants
            .iter()
            .map(|variant| {
                let source = Arc::clone(&self.source);
                let url = variant.url.clone();
                let token = token.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => Err(PoolError::Cancelled),
                        result = source.fetch_media(&url) => result,
                    }
                })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .map(|joined| {
                joined.map_err(|e| PoolError::Internal {
                    reason: format!("media playlist task failed: {e}"),
                })?
            })
            .collect()
    }
}
