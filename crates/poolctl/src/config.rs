use std::time::Duration;

use url::Url;

use crate::error::{PoolError, Result};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// Prefix the transcoding server puts in front of every pulled stream name.
pub const DEFAULT_STREAM_PREFIX: &str = "golive";

pub const DEFAULT_HLS_PORT: u16 = 8080;

/// Settings shared by every HTTP client the engine builds.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Overall timeout for a single request. Zero disables it.
    pub timeout: Duration,
    /// Time allowed to establish a connection.
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

/// Tolerance used when matching source and transcoded segment timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentConfig {
    /// Two timestamps match when they differ by strictly less than this.
    pub tolerance: i64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self { tolerance: 200 }
    }
}

/// Retry policy used while waiting for the transcoding server to publish
/// every expected rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartRetryPolicy {
    /// Total number of master playlist fetches before giving up.
    pub max_attempts: u32,
    /// Delay after attempt `n` is `base_delay * n`.
    pub base_delay: Duration,
}

impl Default for StartRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 11,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Fixed cadences of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerTiming {
    /// Sleep between the initial fill and the first monitor pass.
    pub settle: Duration,
    /// Sleep between two monitor passes.
    pub report_interval: Duration,
    /// Sleep after a failed active-stream query.
    pub poll_retry_delay: Duration,
    /// Gap between two session starts inside one fill pass.
    pub start_spacing: Duration,
    /// Gap between two per-session report messages.
    pub notify_spacing: Duration,
}

impl Default for ControllerTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(120),
            report_interval: Duration::from_secs(120),
            poll_retry_delay: Duration::from_secs(5),
            start_spacing: Duration::from_millis(50),
            notify_spacing: Duration::from_millis(50),
        }
    }
}

/// Filters forwarded to the stream directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryFilter {
    pub region: Option<String>,
    pub adult: bool,
    pub gaming: bool,
}

/// Top level configuration of the pool manager.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Host of the transcoding server.
    pub host: String,
    pub hls_port: u16,
    pub stream_prefix: String,
    /// Number of sessions to keep running.
    pub target_size: usize,
    /// Number of transcoding profiles configured on the server.
    pub profiles: usize,
    pub filter: DirectoryFilter,
    pub alignment: AlignmentConfig,
    pub start_retry: StartRetryPolicy,
    pub timing: ControllerTiming,
    pub http: HttpClientConfig,
    /// Dump every downloaded segment identifier on each report.
    pub debug_segments: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            hls_port: DEFAULT_HLS_PORT,
            stream_prefix: DEFAULT_STREAM_PREFIX.to_owned(),
            target_size: 1,
            profiles: 1,
            filter: DirectoryFilter {
                region: Some("us-east1".to_owned()),
                ..Default::default()
            },
            alignment: AlignmentConfig::default(),
            start_retry: StartRetryPolicy::default(),
            timing: ControllerTiming::default(),
            http: HttpClientConfig::default(),
            debug_segments: false,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(PoolError::configuration("transcoder host must not be empty"));
        }
        if self.target_size == 0 {
            return Err(PoolError::configuration("target pool size must be at least 1"));
        }
        if self.profiles == 0 {
            return Err(PoolError::configuration(
                "at least one transcoding profile is required",
            ));
        }
        if self.start_retry.max_attempts == 0 {
            return Err(PoolError::configuration(
                "session start needs at least one attempt",
            ));
        }
        if self.stream_prefix.contains('+') {
            return Err(PoolError::configuration(
                "stream prefix must not contain '+'",
            ));
        }
        Ok(())
    }

    /// Number of renditions a fully transcoding stream exposes: the source
    /// plus one per profile.
    pub fn expected_renditions(&self) -> usize {
        self.profiles + 1
    }

    /// Master playlist of `name` on the transcoding server.
    pub fn master_playlist_url(&self, name: &str) -> Result<Url> {
        let raw = format!(
            "http://{}:{}/hls/{}+{}/index.m3u8",
            self.host, self.hls_port, self.stream_prefix, name
        );
        Url::parse(&raw).map_err(|e| PoolError::invalid_url(raw, e))
    }
}
