// Downstream segment downloaders owned by pool sessions.

mod hls;

pub use hls::HlsDownloaderFactory;

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::starter::StartedStream;
use crate::stats::SessionSnapshot;

/// A running downloader for one session.
///
/// Counters are written by the downloader's own tasks and read through
/// [`SegmentDownloader::snapshot`] while it keeps running.
pub trait SegmentDownloader: Send + Sync {
    /// Asks every task of this downloader to stop. Idempotent.
    fn stop(&self);

    fn is_running(&self) -> bool;

    fn snapshot(&self) -> Result<SessionSnapshot>;

    /// Downloaded segment identifiers per rendition, keyed by resolution.
    fn downloaded_segments(&self) -> Vec<(String, Vec<String>)> {
        Vec::new()
    }
}

/// Creates a downloader for a freshly started stream.
///
/// The downloader starts from `stream.master_url`, ignores the segments in
/// `stream.skip_lists` and stops when `token` is cancelled.
pub trait DownloaderFactory: Send + Sync {
    fn start(&self, stream: &StartedStream, token: CancellationToken)
    -> Box<dyn SegmentDownloader>;
}
