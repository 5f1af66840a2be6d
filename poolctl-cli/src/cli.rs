use std::time::Duration;

use clap::Parser;
use poolctl_engine::config::{DEFAULT_HLS_PORT, DEFAULT_STREAM_PREFIX};
use poolctl_engine::directory::PICARTO_API_BASE;
use poolctl_engine::mist::DEFAULT_API_PORT;
use poolctl_engine::{
    ControllerTiming, DirectoryFilter, DiscordConfig, MistConfig, PoolConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Transcoding server host
    #[arg(long, env = "POOLCTL_HOST")]
    pub host: String,

    /// Number of streams to keep pulling
    #[arg(short = 'n', long, env = "POOLCTL_STREAMS", default_value_t = 1)]
    pub streams: usize,

    /// Number of transcoding profiles configured on the server
    #[arg(long, env = "POOLCTL_PROFILES", default_value_t = 1)]
    pub profiles: usize,

    /// Stream name prefix used by the transcoding server
    #[arg(long, env = "POOLCTL_PREFIX", default_value = DEFAULT_STREAM_PREFIX)]
    pub prefix: String,

    /// HLS port of the transcoding server
    #[arg(long, env = "POOLCTL_HLS_PORT", default_value_t = DEFAULT_HLS_PORT)]
    pub hls_port: u16,

    /// Directory region filter, empty for every region
    #[arg(long, env = "POOLCTL_REGION", default_value = "us-east1")]
    pub region: String,

    /// Include adult streams
    #[arg(long, env = "POOLCTL_ADULT")]
    pub adult: bool,

    /// Include gaming streams
    #[arg(long, env = "POOLCTL_GAMING")]
    pub gaming: bool,

    /// Base URL of the stream directory API
    #[arg(long, env = "POOLCTL_DIRECTORY_URL", default_value = PICARTO_API_BASE)]
    pub directory_url: String,

    /// Port of the transcoding server API
    #[arg(long, env = "POOLCTL_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Transcoding server API user
    #[arg(long, env = "POOLCTL_MIST_USER")]
    pub mist_user: Option<String>,

    /// Transcoding server API password
    #[arg(long, env = "POOLCTL_MIST_PASSWORD", hide_env_values = true)]
    pub mist_password: Option<String>,

    /// Discord webhook receiving the reports
    #[arg(long, env = "POOLCTL_DISCORD_WEBHOOK", hide_env_values = true)]
    pub discord_webhook: Option<String>,

    /// Seconds to wait after the initial fill before the first report
    #[arg(long, env = "POOLCTL_SETTLE_SECS", default_value_t = 120)]
    pub settle_secs: u64,

    /// Seconds between two reports
    #[arg(long, env = "POOLCTL_REPORT_INTERVAL_SECS", default_value_t = 120)]
    pub report_interval_secs: u64,

    /// Log every downloaded segment on each report
    #[arg(long)]
    pub debug_segments: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    pub fn pool_config(&self) -> PoolConfig {
        let region = Some(self.region.trim())
            .filter(|region| !region.is_empty())
            .map(str::to_owned);
        PoolConfig {
            host: self.host.clone(),
            hls_port: self.hls_port,
            stream_prefix: self.prefix.clone(),
            target_size: self.streams,
            profiles: self.profiles,
            filter: DirectoryFilter {
                region,
                adult: self.adult,
                gaming: self.gaming,
            },
            timing: ControllerTiming {
                settle: Duration::from_secs(self.settle_secs),
                report_interval: Duration::from_secs(self.report_interval_secs),
                ..Default::default()
            },
            debug_segments: self.debug_segments,
            ..Default::default()
        }
    }

    pub fn mist_config(&self) -> MistConfig {
        MistConfig {
            host: self.host.clone(),
            port: self.api_port,
            username: self.mist_user.clone(),
            password: self.mist_password.clone(),
            stream_prefix: self.prefix.clone(),
        }
    }

    pub fn discord_config(&self) -> Option<DiscordConfig> {
        self.discord_webhook.as_ref().map(|webhook_url| DiscordConfig {
            webhook_url: webhook_url.clone(),
            username: Some("poolctl".to_owned()),
        })
    }
}
