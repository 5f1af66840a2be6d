use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request for {url} failed with HTTP {status}: {body}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        body: String,
    },

    #[error("playlist {url} has no streams")]
    NoStreams { url: String },

    #[error("playlist error: {reason}")]
    Playlist { reason: String },

    #[error("stream {url} did not start transcoding after {attempts} attempts (last error: {last_error})")]
    NotTranscoding {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("directory error: {reason}")]
    Directory { reason: String },

    #[error("transcoder API error: {reason}")]
    Transcoder { reason: String },

    #[error("unable to start any of {attempted} candidate streams")]
    PoolFillFailed { attempted: usize },

    #[error("no online candidates available")]
    NoCandidates,

    #[error("downloader for stream {stream} is stopped")]
    DownloaderStopped { stream: String },

    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl PoolError {
    pub fn invalid_url(input: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.to_string(),
        }
    }

    pub fn http_status(status: StatusCode, url: impl Into<String>, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            body: body.into(),
        }
    }

    pub fn no_streams(url: impl Into<String>) -> Self {
        Self::NoStreams { url: url.into() }
    }

    pub fn playlist(reason: impl Into<String>) -> Self {
        Self::Playlist {
            reason: reason.into(),
        }
    }

    pub fn directory(reason: impl Into<String>) -> Self {
        Self::Directory {
            reason: reason.into(),
        }
    }

    pub fn transcoder(reason: impl Into<String>) -> Self {
        Self::Transcoder {
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Whether a caller with its own bounded retry policy may try again.
    ///
    /// `NoStreams` is final at the fetch layer; the session starter decides
    /// whether the absence is worth waiting out.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::HttpStatus { .. } | Self::Playlist { .. } => true,
            Self::Directory { .. } | Self::Transcoder { .. } => true,
            Self::Cancelled
            | Self::InvalidUrl { .. }
            | Self::NoStreams { .. }
            | Self::NotTranscoding { .. }
            | Self::PoolFillFailed { .. }
            | Self::NoCandidates
            | Self::DownloaderStopped { .. }
            | Self::Json { .. }
            | Self::Configuration { .. }
            | Self::Internal { .. } => false,
        }
    }

    pub fn is_no_streams(&self) -> bool {
        matches!(self, Self::NoStreams { .. })
    }
}

pub type Result<T> = std::result::Result<T, PoolError>;
