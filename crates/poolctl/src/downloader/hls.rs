// HLS session downloader: polls every rendition of a stream and counts the
// segments it manages to download.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, trace, warn};
use url::Url;

use super::{DownloaderFactory, SegmentDownloader};
use crate::error::{PoolError, Result};
use crate::playlist::PlaylistSource;
use crate::playlist::segment::segment_id;
use crate::starter::StartedStream;
use crate::stats::{RenditionStats, SessionSnapshot};

const SEEN_SEGMENTS_CAPACITY: usize = 256;
const DOWNLOADED_HISTORY: usize = 1024;
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Remembers the most recent segment identifiers so a sliding playlist window
/// does not count a segment twice.
#[derive(Debug, Default)]
struct SeenSegments {
    order: VecDeque<String>,
    set: HashSet<String>,
}

impl SeenSegments {
    /// Returns `false` when `id` was already seen.
    fn insert(&mut self, id: &str) -> bool {
        if self.set.contains(id) {
            return false;
        }
        self.set.insert(id.to_owned());
        self.order.push_back(id.to_owned());
        while self.order.len() > SEEN_SEGMENTS_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        true
    }
}

#[derive(Debug, Default)]
struct RenditionCounters {
    attempted: u64,
    succeeded: u64,
    downloaded: VecDeque<String>,
}

struct Rendition {
    url: Url,
    resolution: String,
    source: bool,
    skip: HashSet<String>,
    counters: Mutex<RenditionCounters>,
}

impl Rendition {
    fn stats(&self) -> RenditionStats {
        let counters = self.counters.lock();
        RenditionStats {
            resolution: self.resolution.clone(),
            source: self.source,
            attempted: counters.attempted,
            succeeded: counters.succeeded,
        }
    }
}

pub struct HlsDownloaderFactory {
    playlists: Arc<dyn PlaylistSource>,
    client: Client,
}

impl HlsDownloaderFactory {
    pub fn new(playlists: Arc<dyn PlaylistSource>, client: Client) -> Self {
        Self { playlists, client }
    }
}

impl DownloaderFactory for HlsDownloaderFactory {
    fn start(
        &self,
        stream: &StartedStream,
        token: CancellationToken,
    ) -> Box<dyn SegmentDownloader> {
        let renditions: Vec<Arc<Rendition>> = stream
            .variants
            .iter()
            .enumerate()
            .map(|(index, variant)| {
                Arc::new(Rendition {
                    url: variant.url.clone(),
                    resolution: variant
                        .resolution
                        .clone()
                        .unwrap_or_else(|| format!("rendition-{index}")),
                    source: index == 0,
                    skip: stream
                        .skip_lists
                        .get(index)
                        .map(|list| list.iter().cloned().collect())
                        .unwrap_or_default(),
                    counters: Mutex::new(RenditionCounters::default()),
                })
            })
            .collect();

        for rendition in &renditions {
            let span = info_span!(
                "rendition",
                stream = %stream.name,
                resolution = %rendition.resolution
            );
            tokio::spawn(
                monitor_rendition(
                    Arc::clone(rendition),
                    Arc::clone(&self.playlists),
                    self.client.clone(),
                    token.clone(),
                )
                .instrument(span),
            );
        }
        info!(
            stream = %stream.name,
            url = %stream.master_url,
            renditions = renditions.len(),
            "Downloader started"
        );

        Box::new(HlsSessionDownloader {
            stream: stream.name.clone(),
            renditions,
            token,
        })
    }
}

async fn monitor_rendition(
    rendition: Arc<Rendition>,
    playlists: Arc<dyn PlaylistSource>,
    client: Client,
    token: CancellationToken,
) {
    let mut seen = SeenSegments::default();

    loop {
        let fetched = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            fetched = playlists.fetch_media(&rendition.url) => fetched,
        };

        let refresh = match fetched {
            Ok(playlist) => {
                for segment in &playlist.segments {
                    let id = segment_id(&segment.uri);
                    if !seen.insert(&id) {
                        continue;
                    }
                    if rendition.skip.contains(&id) {
                        trace!(segment = %id, "Skipping segment before alignment point");
                        continue;
                    }
                    let segment_url = match rendition.url.join(&segment.uri) {
                        Ok(url) => url,
                        Err(e) => {
                            warn!(segment = %segment.uri, error = %e, "Invalid segment URI");
                            continue;
                        }
                    };

                    rendition.counters.lock().attempted += 1;
                    let downloaded = tokio::select! {
                        biased;
                        _ = token.cancelled() => return,
                        result = download_segment(&client, &segment_url) => result,
                    };
                    match downloaded {
                        Ok(bytes) => {
                            trace!(segment = %id, bytes, "Downloaded segment");
                            let mut counters = rendition.counters.lock();
                            counters.succeeded += 1;
                            counters.downloaded.push_back(id);
                            if counters.downloaded.len() > DOWNLOADED_HISTORY {
                                counters.downloaded.pop_front();
                            }
                        }
                        Err(e) => warn!(segment = %id, error = %e, "Segment download failed"),
                    }
                }
                Duration::from_secs_f64(playlist.target_duration as f64 * 0.5)
                    .max(MIN_REFRESH_INTERVAL)
            }
            Err(e) => {
                warn!(url = %rendition.url, error = %e, "Error refreshing media playlist");
                MIN_REFRESH_INTERVAL * 2
            }
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(refresh) => {}
        }
    }
    debug!(url = %rendition.url, "Rendition monitor stopped");
}

async fn download_segment(client: &Client, url: &Url) -> Result<usize> {
    let response = client.get(url.clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PoolError::http_status(status, url.as_str(), body));
    }
    Ok(response.bytes().await?.len())
}

struct HlsSessionDownloader {
    stream: String,
    renditions: Vec<Arc<Rendition>>,
    token: CancellationToken,
}

impl SegmentDownloader for HlsSessionDownloader {
    fn stop(&self) {
        if !self.token.is_cancelled() {
            info!(stream = %self.stream, "Stopping downloader");
            self.token.cancel();
        }
    }

    fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    fn snapshot(&self) -> Result<SessionSnapshot> {
        if !self.is_running() {
            return Err(PoolError::DownloaderStopped {
                stream: self.stream.clone(),
            });
        }
        Ok(SessionSnapshot {
            stream: self.stream.clone(),
            renditions: self.renditions.iter().map(|r| r.stats()).collect(),
        })
    }

    fn downloaded_segments(&self) -> Vec<(String, Vec<String>)> {
        self.renditions
            .iter()
            .map(|r| {
                let counters = r.counters.lock();
                (
                    r.resolution.clone(),
                    counters.downloaded.iter().cloned().collect(),
                )
            })
            .collect()
    }
}
