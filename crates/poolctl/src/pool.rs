//! Stream pool: the owned set of running sessions.
//!
//! The pool is mutated only by the control task, so it needs no lock. Each
//! session's downloader runs on a child token of the pool's token.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{DirectoryFilter, PoolConfig};
use crate::directory::CandidateSource;
use crate::downloader::DownloaderFactory;
use crate::error::{PoolError, Result};
use crate::notification::Notifier;
use crate::playlist::PlaylistSource;
use crate::session::Session;
use crate::starter::SessionStarter;

/// Outcome of one fill pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FillReport {
    /// Number of session starts tried.
    pub attempted: usize,
    /// Names of the streams that joined the pool, in start order.
    pub started: Vec<String>,
    /// Failed starts with their error message.
    pub failed: Vec<(String, String)>,
}

pub struct StreamPool {
    sessions: BTreeMap<String, Session>,
    target: usize,
    starter: SessionStarter,
    directory: Arc<dyn CandidateSource>,
    downloaders: Arc<dyn DownloaderFactory>,
    notifier: Arc<dyn Notifier>,
    filter: DirectoryFilter,
    start_spacing: Duration,
    token: CancellationToken,
}

impl StreamPool {
    pub fn new(
        config: Arc<PoolConfig>,
        playlists: Arc<dyn PlaylistSource>,
        directory: Arc<dyn CandidateSource>,
        downloaders: Arc<dyn DownloaderFactory>,
        notifier: Arc<dyn Notifier>,
        token: CancellationToken,
    ) -> Self {
        Self {
            sessions: BTreeMap::new(),
            target: config.target_size,
            filter: config.filter.clone(),
            start_spacing: config.timing.start_spacing,
            starter: SessionStarter::new(playlists, config),
            directory,
            downloaders,
            notifier,
            token,
        }
    }

    /// Starts candidates in listing order until the pool reaches its target.
    ///
    /// Failed starts are notified and skipped. The pass fails only when it
    /// tried at least one candidate and none started.
    pub async fn fill(&mut self) -> Result<FillReport> {
        let mut report = FillReport::default();
        let capacity = self.target.saturating_sub(self.sessions.len());
        if capacity == 0 {
            debug!(size = self.sessions.len(), "Pool already at target");
            return Ok(report);
        }

        let candidates = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Err(PoolError::Cancelled),
            listed = self.directory.list_online(&self.filter) => listed?,
        };
        debug!(
            candidates = candidates.len(),
            capacity, "Filling stream pool"
        );

        let mut tried = HashSet::new();
        for candidate in candidates {
            if report.started.len() >= capacity {
                break;
            }
            if !candidate.online
                || self.sessions.contains_key(&candidate.name)
                || !tried.insert(candidate.name.clone())
            {
                continue;
            }

            if report.attempted > 0 && !self.pause(self.start_spacing).await {
                return Err(PoolError::Cancelled);
            }
            report.attempted += 1;

            let name = candidate.name;
            match self.starter.start(&name, &self.token).await {
                Ok(stream) => {
                    let mut session = Session::new(stream);
                    session.begin(self.downloaders.as_ref(), self.token.child_token());
                    info!(stream = %name, url = %session.master_url(), "Stream joined the pool");
                    self.notifier
                        .notify(format!("Started stream {}", session.master_url()));
                    self.sessions.insert(name.clone(), session);
                    report.started.push(name);
                }
                Err(PoolError::Cancelled) => return Err(PoolError::Cancelled),
                Err(e) => {
                    warn!(stream = %name, error = %e, "Failed to start stream");
                    self.notifier.notify(format!(
                        "Error starting stream pull name={name} err={e} started so far {}",
                        report.started.len()
                    ));
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        if report.attempted > 0 && report.started.is_empty() {
            return Err(PoolError::PoolFillFailed {
                attempted: report.attempted,
            });
        }
        Ok(report)
    }

    /// Stops and removes every session missing from `active`. Returns the
    /// removed names.
    pub fn reconcile(&mut self, active: &[String]) -> Vec<String> {
        let active: HashSet<&str> = active.iter().map(String::as_str).collect();
        let gone: Vec<String> = self
            .sessions
            .keys()
            .filter(|name| !active.contains(name.as_str()))
            .cloned()
            .collect();

        for name in &gone {
            if let Some(mut session) = self.sessions.remove(name) {
                session.stop();
                info!(stream = %name, "Stream is no longer active, removed from pool");
                self.notifier.notify(format!(
                    "Stopped stream name={name} because not in active streams anymore"
                ));
            }
        }
        gone
    }

    /// Stops every session and empties the pool.
    pub fn shutdown(&mut self) {
        for (name, mut session) in std::mem::take(&mut self.sessions) {
            if session.stop() {
                debug!(stream = %name, "Session stopped");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Sleeps unless cancelled first. Returns `false` on cancellation.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

impl Drop for StreamPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
