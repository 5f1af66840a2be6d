use std::sync::OnceLock;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::config::HttpClientConfig;
use crate::error::Result;

/// Installs the process-wide rustls crypto provider exactly once.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate got there first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

pub fn build_client(config: &HttpClientConfig) -> Result<Client> {
    install_rustls_provider();

    let mut builder = Client::builder()
        .user_agent(config.user_agent.clone())
        .connect_timeout(config.connect_timeout);
    if config.timeout > Duration::ZERO {
        builder = builder.timeout(config.timeout);
    }
    Ok(builder.build()?)
}
