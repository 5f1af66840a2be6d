//! Control loop driving the pool on a fixed cadence.
//!
//! `FILL -> SETTLE -> MONITOR -> sleep -> MONITOR -> ...` until the process
//! token is cancelled. Only the initial fill can fail the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ControllerTiming;
use crate::error::{PoolError, Result};
use crate::mist::TranscoderApi;
use crate::notification::Notifier;
use crate::playlist::segment::ordered_by_timestamp;
use crate::pool::StreamPool;
use crate::stats::StatsRollup;

/// What a single monitor pass did.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorStep {
    /// Stats were reported; the pool-wide rollup is attached.
    Reported(StatsRollup),
    /// The active-stream query failed.
    PollFailed,
    Cancelled,
}

pub struct PoolController {
    pool: StreamPool,
    transcoder: Arc<dyn TranscoderApi>,
    notifier: Arc<dyn Notifier>,
    timing: ControllerTiming,
    debug_segments: bool,
    token: CancellationToken,
}

impl PoolController {
    pub fn new(
        pool: StreamPool,
        transcoder: Arc<dyn TranscoderApi>,
        notifier: Arc<dyn Notifier>,
        timing: ControllerTiming,
        debug_segments: bool,
        token: CancellationToken,
    ) -> Self {
        Self {
            pool,
            transcoder,
            notifier,
            timing,
            debug_segments,
            token,
        }
    }

    pub fn pool(&self) -> &StreamPool {
        &self.pool
    }

    /// Runs until cancellation. Fails only when the initial fill starts no
    /// stream at all.
    pub async fn run(mut self) -> Result<()> {
        match self.pool.fill().await {
            Ok(report) if self.pool.is_empty() => {
                debug!(?report, "Initial fill found nothing to start");
                return Err(PoolError::NoCandidates);
            }
            Ok(_) => {}
            Err(PoolError::Cancelled) => {
                self.pool.shutdown();
                return Ok(());
            }
            Err(e) => {
                error!(error = %e, "Initial pool fill failed");
                return Err(e);
            }
        }

        info!(streams = self.pool.len(), "Initial pool fill complete");
        self.notifier
            .notify(format!("Started **{}** streams", self.pool.len()));

        let mut delay = self.timing.settle;
        while self.pause(delay).await {
            delay = match self.monitor_once().await {
                MonitorStep::Reported(_) => self.timing.report_interval,
                MonitorStep::PollFailed => self.timing.poll_retry_delay,
                MonitorStep::Cancelled => break,
            };
        }

        info!("Control loop cancelled, stopping sessions");
        self.pool.shutdown();
        Ok(())
    }

    /// One monitor pass: query, prune and refill when short, then report.
    pub async fn monitor_once(&mut self) -> MonitorStep {
        let listed = tokio::select! {
            _ = self.token.cancelled() => return MonitorStep::Cancelled,
            listed = self.transcoder.list_active_stream_names() => listed,
        };
        let active = match listed {
            Ok(active) => active,
            Err(e) => {
                warn!(error = %e, "Error getting active streams");
                return MonitorStep::PollFailed;
            }
        };
        debug!(active = active.len(), pooled = self.pool.len(), "Polled active streams");

        if active.len() < self.pool.target() {
            self.pool.reconcile(&active);
            match self.pool.fill().await {
                Ok(report) => {
                    if !report.started.is_empty() {
                        info!(started = ?report.started, "Refilled stream pool");
                    }
                }
                Err(PoolError::Cancelled) => return MonitorStep::Cancelled,
                Err(e) => warn!(error = %e, "Refilling the pool failed"),
            }
        }

        match self.report().await {
            Some(rollup) => MonitorStep::Reported(rollup),
            None => MonitorStep::Cancelled,
        }
    }

    /// Sends one line per session and one pool-wide line. Returns `None`
    /// when cancelled midway.
    async fn report(&self) -> Option<StatsRollup> {
        let mut total = StatsRollup::default();

        for session in self.pool.iter() {
            let snapshot = match session.snapshot() {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(stream = session.name(), error = %e, "Skipping stats of session");
                    continue;
                }
            };
            let rollup = snapshot.rollup();
            for ((source, resolution), counts) in &rollup.by_resolution {
                debug!(
                    stream = session.name(),
                    resolution = %resolution,
                    source,
                    attempted = counts.attempted,
                    succeeded = counts.succeeded,
                    "Rendition stats"
                );
            }
            self.notifier.notify(format!(
                "Stream {} success rate: **{}** ({}/{})",
                session.name(),
                rollup.rate(),
                rollup.transcoded.succeeded,
                rollup.source.succeeded
            ));
            if self.debug_segments {
                dump_segments(session.name(), session.downloaded_segments());
            }
            total.combine(&rollup);

            if !self.pause(self.timing.notify_spacing).await {
                return None;
            }
        }

        for ((source, resolution), counts) in &total.by_resolution {
            debug!(
                resolution = %resolution,
                source,
                attempted = counts.attempted,
                succeeded = counts.succeeded,
                "Pool rendition stats"
            );
        }
        self.notifier.notify(format!(
            "Number of streams: **{}** success rate: **{}** ({}/{})",
            self.pool.len(),
            total.rate(),
            total.transcoded.succeeded,
            total.source.succeeded
        ));
        Some(total)
    }

    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

fn dump_segments(stream: &str, renditions: Vec<(String, Vec<String>)>) {
    for (resolution, ids) in &renditions {
        for (index, id) in ordered_by_timestamp(ids.iter().map(String::as_str)).enumerate() {
            debug!(stream, resolution = %resolution, index, segment = id, "Downloaded segment");
        }
    }
}
