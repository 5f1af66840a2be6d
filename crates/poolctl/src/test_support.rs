// Shared test fixtures: a mock HTTP server and in-memory collaborators.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::Client;
use url::Url;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::client::build_client;
use crate::config::HttpClientConfig;

/// Client built like the engine builds its own, rustls provider included.
pub(crate) fn test_client() -> Client {
    build_client(&HttpClientConfig::default()).unwrap()
}

/// Answers every request for `route` with `status` and `body`. Paths
/// without a mock answer 404.
pub(crate) async fn respond(server: &MockServer, route: &str, status: u16, body: impl Into<String>) {
    Mock::given(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_string(body.into()))
        .mount(server)
        .await;
}

/// Root URL of `server`, ending in a slash so relative joins stay below it.
pub(crate) fn base_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}/", server.uri())).unwrap()
}

/// Request targets (path and query) in arrival order.
pub(crate) async fn request_targets(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| match request.url.query() {
            Some(query) => format!("{}?{query}", request.url.path()),
            None => request.url.path().to_owned(),
        })
        .collect()
}

/// Reply of [`FakePlaylists`] to one master playlist fetch.
#[derive(Debug, Clone, Copy)]
pub(crate) enum MasterReply {
    Variants(usize),
    NoStreams,
    Http(u16),
}

/// In-memory playlist source keyed by stream name.
///
/// Streams without a script always list two variants. Rendition 0 carries
/// segments `[100, 200, 300, 400]`, every other rendition `[300, 400, 500]`.
#[derive(Default)]
pub(crate) struct FakePlaylists {
    scripts: Mutex<HashMap<String, Vec<MasterReply>>>,
    master_calls: Mutex<HashMap<String, usize>>,
    failing_media: Mutex<HashMap<String, usize>>,
    media_delays: Mutex<HashMap<usize, std::time::Duration>>,
}

impl FakePlaylists {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Replies for successive master fetches; the last one repeats.
    pub(crate) fn script_master(&self, name: &str, replies: Vec<MasterReply>) {
        self.scripts.lock().insert(name.to_owned(), replies);
    }

    pub(crate) fn fail_media(&self, name: &str, rendition: usize) {
        self.failing_media.lock().insert(name.to_owned(), rendition);
    }

    /// Makes every media fetch of `rendition` take `delay`.
    pub(crate) fn delay_media(&self, rendition: usize, delay: std::time::Duration) {
        self.media_delays.lock().insert(rendition, delay);
    }

    pub(crate) fn master_calls(&self, name: &str) -> usize {
        self.master_calls.lock().get(name).copied().unwrap_or(0)
    }

    fn stream_name(url: &Url) -> String {
        url.path_segments()
            .and_then(|mut segments| segments.nth(1))
            .and_then(|segment| segment.split_once('+'))
            .map(|(_, name)| name.to_owned())
            .unwrap_or_default()
    }

    pub(crate) fn media_body(timestamps: &[i64]) -> String {
        let mut body = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:1\n");
        for ts in timestamps {
            body.push_str(&format!("#EXTINF:2.0,\n{ts}_{}.ts?sessId=9\n", ts + 100));
        }
        body
    }
}

#[async_trait::async_trait]
impl crate::playlist::PlaylistSource for FakePlaylists {
    async fn fetch_master(&self, url: &Url) -> crate::Result<Vec<crate::playlist::PlaylistVariant>> {
        let name = Self::stream_name(url);
        let call = {
            let mut calls = self.master_calls.lock();
            let count = calls.entry(name.clone()).or_default();
            *count += 1;
            *count
        };
        let reply = self
            .scripts
            .lock()
            .get(&name)
            .and_then(|script| script.get(call - 1).or_else(|| script.last()).copied())
            .unwrap_or(MasterReply::Variants(2));

        match reply {
            MasterReply::Variants(n) => Ok((0..n)
                .map(|i| crate::playlist::PlaylistVariant {
                    url: url.join(&format!("{i}/index.m3u8")).unwrap(),
                    resolution: Some(if i == 0 { "1920x1080" } else { "640x360" }.to_owned()),
                    bandwidth: 1_000_000,
                })
                .collect()),
            MasterReply::NoStreams => Err(crate::PoolError::no_streams(url.as_str())),
            MasterReply::Http(code) => Err(crate::PoolError::http_status(
                reqwest::StatusCode::from_u16(code).unwrap(),
                url.as_str(),
                "",
            )),
        }
    }

    async fn fetch_media(&self, url: &Url) -> crate::Result<m3u8_rs::MediaPlaylist> {
        let name = Self::stream_name(url);
        let rendition: usize = url
            .path_segments()
            .and_then(|mut segments| segments.nth(2))
            .and_then(|segment| segment.parse().ok())
            .unwrap_or(0);
        let delay = self.media_delays.lock().get(&rendition).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_media.lock().get(&name) == Some(&rendition) {
            return Err(crate::PoolError::no_streams(url.as_str()));
        }
        let timestamps: &[i64] = if rendition == 0 {
            &[100, 200, 300, 400]
        } else {
            &[300, 400, 500]
        };
        crate::playlist::decode_media(url, Self::media_body(timestamps).as_bytes())
    }
}

/// Downloader factory whose downloaders only count stop calls.
#[derive(Default, Clone)]
pub(crate) struct FakeDownloaders {
    stops: Arc<Mutex<HashMap<String, usize>>>,
    started: Arc<Mutex<Vec<crate::starter::StartedStream>>>,
    counts: Arc<Mutex<HashMap<String, crate::stats::SessionSnapshot>>>,
    failing: Arc<Mutex<std::collections::HashSet<String>>>,
}

impl FakeDownloaders {
    pub(crate) fn stop_calls(&self, name: &str) -> usize {
        self.stops.lock().get(name).copied().unwrap_or(0)
    }

    pub(crate) fn started(&self) -> Vec<crate::starter::StartedStream> {
        self.started.lock().clone()
    }

    /// Counters reported by `name`'s downloader: (source, transcoded) successes.
    pub(crate) fn set_counts(&self, name: &str, source: u64, transcoded: u64) {
        let rendition = |source_side: bool, succeeded: u64| crate::stats::RenditionStats {
            resolution: if source_side { "1920x1080" } else { "640x360" }.to_owned(),
            source: source_side,
            attempted: succeeded,
            succeeded,
        };
        self.counts.lock().insert(
            name.to_owned(),
            crate::stats::SessionSnapshot {
                stream: name.to_owned(),
                renditions: vec![rendition(true, source), rendition(false, transcoded)],
            },
        );
    }

    /// Makes `name`'s snapshot fail.
    pub(crate) fn fail_snapshot(&self, name: &str) {
        self.failing.lock().insert(name.to_owned());
    }
}

struct FakeDownloader {
    name: String,
    owner: FakeDownloaders,
    running: std::sync::atomic::AtomicBool,
}

impl crate::downloader::SegmentDownloader for FakeDownloader {
    fn stop(&self) {
        self.running
            .store(false, std::sync::atomic::Ordering::SeqCst);
        *self.owner.stops.lock().entry(self.name.clone()).or_default() += 1;
    }

    fn is_running(&self) -> bool {
        self.running.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn snapshot(&self) -> crate::Result<crate::stats::SessionSnapshot> {
        if self.owner.failing.lock().contains(&self.name) {
            return Err(crate::PoolError::DownloaderStopped {
                stream: self.name.clone(),
            });
        }
        Ok(self
            .owner
            .counts
            .lock()
            .get(&self.name)
            .cloned()
            .unwrap_or_else(|| crate::stats::SessionSnapshot {
                stream: self.name.clone(),
                renditions: Vec::new(),
            }))
    }
}

impl crate::downloader::DownloaderFactory for FakeDownloaders {
    fn start(
        &self,
        stream: &crate::starter::StartedStream,
        _token: tokio_util::sync::CancellationToken,
    ) -> Box<dyn crate::downloader::SegmentDownloader> {
        self.started.lock().push(stream.clone());
        Box::new(FakeDownloader {
            name: stream.name.clone(),
            owner: self.clone(),
            running: std::sync::atomic::AtomicBool::new(true),
        })
    }
}

/// Directory returning a fixed listing, or an error when `fail` is set.
#[derive(Default)]
pub(crate) struct FakeDirectory {
    pub(crate) names: Mutex<Vec<String>>,
    pub(crate) fail: std::sync::atomic::AtomicBool,
    /// Listing never completes.
    pub(crate) stall: std::sync::atomic::AtomicBool,
}

impl FakeDirectory {
    pub(crate) fn with(names: &[&str]) -> Self {
        Self {
            names: Mutex::new(names.iter().map(|n| n.to_string()).collect()),
            fail: Default::default(),
            stall: Default::default(),
        }
    }
}

#[async_trait::async_trait]
impl crate::directory::CandidateSource for FakeDirectory {
    async fn list_online(
        &self,
        _filter: &crate::config::DirectoryFilter,
    ) -> crate::Result<Vec<crate::directory::StreamCandidate>> {
        if self.stall.load(std::sync::atomic::Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(crate::PoolError::directory("listing unavailable"));
        }
        Ok(self
            .names
            .lock()
            .iter()
            .map(crate::directory::StreamCandidate::online)
            .collect())
    }
}

/// Transcoder API replaying scripted answers; the last answer repeats.
#[derive(Default)]
pub(crate) struct FakeTranscoder {
    replies: Mutex<VecDeque<Option<Vec<String>>>>,
    last: Mutex<Option<Vec<String>>>,
    pub(crate) calls: std::sync::atomic::AtomicUsize,
}

impl FakeTranscoder {
    pub(crate) fn reply(&self, names: &[&str]) {
        self.replies
            .lock()
            .push_back(Some(names.iter().map(|n| n.to_string()).collect()));
    }

    pub(crate) fn fail(&self) {
        self.replies.lock().push_back(None);
    }
}

#[async_trait::async_trait]
impl crate::mist::TranscoderApi for FakeTranscoder {
    async fn list_active_stream_names(&self) -> crate::Result<Vec<String>> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let reply = {
            let mut replies = self.replies.lock();
            match replies.pop_front() {
                Some(reply) => {
                    *self.last.lock() = reply.clone();
                    reply
                }
                None => self.last.lock().clone(),
            }
        };
        reply.ok_or_else(|| crate::PoolError::transcoder("API unavailable"))
    }
}

/// Notifier that keeps every message.
#[derive(Default, Clone)]
pub(crate) struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub(crate) fn count_containing(&self, needle: &str) -> usize {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.contains(needle))
            .count()
    }
}

impl crate::notification::Notifier for RecordingNotifier {
    fn notify(&self, message: String) {
        self.messages.lock().push(message);
    }
}
