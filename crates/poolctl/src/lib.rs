//! Live-stream pool manager for transcoding servers.
//!
//! Keeps a target number of live streams pulled through a transcoding server,
//! aligns each stream's source and transcoded renditions, downloads their
//! segments and periodically reports how many transcoded segments arrived
//! per source segment.

pub mod align;
pub mod client;
pub mod config;
pub mod controller;
pub mod directory;
pub mod downloader;
pub mod error;
pub mod mist;
pub mod notification;
pub mod playlist;
pub mod pool;
pub mod retry;
pub mod session;
pub mod starter;
pub mod stats;

#[cfg(test)]
mod test_support;

pub use align::{AlignmentOutcome, Side, align, align_playlists};
pub use client::{build_client, install_rustls_provider};
pub use config::{
    AlignmentConfig, ControllerTiming, DirectoryFilter, HttpClientConfig, PoolConfig,
    StartRetryPolicy,
};
pub use controller::{MonitorStep, PoolController};
pub use directory::{CandidateSource, PicartoDirectory, StreamCandidate};
pub use downloader::{DownloaderFactory, HlsDownloaderFactory, SegmentDownloader};
pub use error::{PoolError, Result};
pub use mist::{MistApi, MistConfig, TranscoderApi};
pub use notification::{DiscordConfig, DiscordNotifier, LogNotifier, Notifier};
pub use playlist::{HttpPlaylistFetcher, PlaylistSource, PlaylistVariant};
pub use pool::{FillReport, StreamPool};
pub use session::{Session, SessionState};
pub use starter::{SessionStarter, StartedStream};
pub use stats::{SessionSnapshot, StatsRollup, SuccessRate};
