use std::fmt;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::downloader::{DownloaderFactory, SegmentDownloader};
use crate::error::{PoolError, Result};
use crate::starter::StartedStream;
use crate::stats::SessionSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Active,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Stopped => "stopped",
        })
    }
}

/// One managed pull of a single stream.
///
/// Dropping a session stops its downloader.
pub struct Session {
    stream: StartedStream,
    downloader: Option<Box<dyn SegmentDownloader>>,
    state: SessionState,
}

impl Session {
    pub fn new(stream: StartedStream) -> Self {
        Self {
            stream,
            downloader: None,
            state: SessionState::Starting,
        }
    }

    /// Starts the downstream downloader. Only a `Starting` session can begin.
    pub fn begin(&mut self, factory: &dyn DownloaderFactory, token: CancellationToken) {
        if self.state != SessionState::Starting {
            return;
        }
        self.downloader = Some(factory.start(&self.stream, token));
        self.state = SessionState::Active;
    }

    /// Stops the downloader. Returns `false` when the session was already
    /// stopped.
    pub fn stop(&mut self) -> bool {
        if self.state == SessionState::Stopped {
            return false;
        }
        if let Some(downloader) = &self.downloader {
            downloader.stop();
        }
        self.state = SessionState::Stopped;
        true
    }

    pub fn snapshot(&self) -> Result<SessionSnapshot> {
        match &self.downloader {
            Some(downloader) if self.state == SessionState::Active => downloader.snapshot(),
            _ => Err(PoolError::DownloaderStopped {
                stream: self.stream.name.clone(),
            }),
        }
    }

    pub fn downloaded_segments(&self) -> Vec<(String, Vec<String>)> {
        self.downloader
            .as_ref()
            .map(|d| d.downloaded_segments())
            .unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        &self.stream.name
    }

    pub fn master_url(&self) -> &Url {
        &self.stream.master_url
    }

    pub fn skip_lists(&self) -> &[Vec<String>] {
        &self.stream.skip_lists
    }

    pub fn state(&self) -> SessionState {
        self.state
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.stream.name)
            .field("master_url", &self.stream.master_url.as_str())
            .field("state", &self.state)
            .finish()
    }
}
