//! Transcoding server session API.
//!
//! The Mist HTTP API takes a JSON command in the `command` query parameter
//! and answers with a JSON object. Authorization is a challenge/response:
//! the server hands out a `challenge` and expects
//! `md5(md5(password) + challenge)` as the password on the next call.

use async_trait::async_trait;
use md5::{Digest, Md5};
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use crate::error::{PoolError, Result};

pub const DEFAULT_API_PORT: u16 = 4242;

#[async_trait]
pub trait TranscoderApi: Send + Sync {
    /// Bare names of the streams the server is currently pulling.
    async fn list_active_stream_names(&self) -> Result<Vec<String>>;
}

/// Extracts bare stream names from `<prefix>+<name>` entries, ignoring every
/// entry that does not carry `prefix`.
pub fn strip_stream_prefix<'a, I>(prefix: &str, names: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .filter_map(|full| {
            let (head, name) = full.split_once('+')?;
            let name = name.split('+').next().unwrap_or(name);
            (head == prefix && !name.is_empty()).then(|| name.to_owned())
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct MistConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Stream name prefix used for pulled streams.
    pub stream_prefix: String,
}

#[derive(Debug, Default, Deserialize)]
struct MistResponse {
    #[serde(default)]
    authorize: Option<Authorize>,
    #[serde(default)]
    active_streams: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct Authorize {
    status: String,
    #[serde(default)]
    challenge: Option<String>,
}

pub struct MistApi {
    client: Client,
    config: MistConfig,
    api_url: Url,
    challenge: Mutex<Option<String>>,
}

impl MistApi {
    pub fn new(client: Client, config: MistConfig) -> Result<Self> {
        let raw = format!("http://{}:{}/api2", config.host, config.port);
        let api_url = Url::parse(&raw).map_err(|e| PoolError::invalid_url(raw, e))?;
        Ok(Self {
            client,
            config,
            api_url,
            challenge: Mutex::new(None),
        })
    }

    fn authorization(&self) -> Option<Value> {
        let username = self.config.username.as_ref()?;
        let password = self.config.password.as_deref().unwrap_or_default();
        let password = match self.challenge.lock().as_deref() {
            Some(challenge) => challenge_response(password, challenge),
            None => String::new(),
        };
        Some(json!({ "username": username, "password": password }))
    }

    async fn call(&self, mut command: Value) -> Result<MistResponse> {
        // A fresh challenge costs one extra round trip.
        for _ in 0..2 {
            if let Some(authorize) = self.authorization() {
                command["authorize"] = authorize;
            }
            let response = self.send(&command).await?;

            match response.authorize.as_ref() {
                Some(auth) if auth.status == "CHALL" => {
                    if self.config.username.is_none() {
                        return Err(PoolError::transcoder(
                            "server requires authorization but no credentials are configured",
                        ));
                    }
                    let challenge = auth.challenge.clone().ok_or_else(|| {
                        PoolError::transcoder("authorization challenge without a challenge string")
                    })?;
                    debug!("Received Mist authorization challenge");
                    *self.challenge.lock() = Some(challenge);
                }
                Some(auth) if auth.status != "OK" => {
                    return Err(PoolError::transcoder(format!(
                        "authorization failed with status {}",
                        auth.status
                    )));
                }
                _ => return Ok(response),
            }
        }
        warn!("Mist authorization challenge was not accepted");
        Err(PoolError::transcoder("authorization challenge not accepted"))
    }

    async fn send(&self, command: &Value) -> Result<MistResponse> {
        let mut url = self.api_url.clone();
        url.set_query(Some(&format!(
            "command={}",
            urlencoding::encode(&command.to_string())
        )));
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PoolError::transcoder(format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PoolError::transcoder(format!("HTTP {status}: {body}")));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| PoolError::transcoder(format!("failed to read response: {e}")))?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl TranscoderApi for MistApi {
    async fn list_active_stream_names(&self) -> Result<Vec<String>> {
        let response = self.call(json!({ "active_streams": true })).await?;
        let active = response.active_streams.unwrap_or_default();
        let names = strip_stream_prefix(
            &self.config.stream_prefix,
            active.iter().map(String::as_str),
        );
        debug!(total = active.len(), pulled = names.len(), "Listed active streams");
        Ok(names)
    }
}

fn challenge_response(password: &str, challenge: &str) -> String {
    let hashed = hex::encode(Md5::digest(password.as_bytes()));
    hex::encode(Md5::digest(format!("{hashed}{challenge}").as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{base_url, request_targets, respond, test_client};
    use wiremock::MockServer;

    #[test]
    fn prefix_is_removed() {
        let names = strip_stream_prefix(
            "golive",
            ["golive+alice", "other+bob", "golive+", "plain", "golive+carol"],
        );
        assert_eq!(names, vec!["alice", "carol"]);
    }

    #[test]
    fn challenge_response_matches_md5_scheme() {
        // md5("secret") = 5ebe2294ecd0e0f08eab7690d2a6ee69
        let expected = hex::encode(Md5::digest(b"5ebe2294ecd0e0f08eab7690d2a6ee69abc"));
        assert_eq!(challenge_response("secret", "abc"), expected);
    }

    fn api(server: &MockServer, username: Option<&str>) -> MistApi {
        let base = base_url(server);
        MistApi::new(
            test_client(),
            MistConfig {
                host: base.host_str().unwrap().to_owned(),
                port: base.port().unwrap(),
                username: username.map(str::to_owned),
                password: Some("secret".to_owned()),
                stream_prefix: "golive".to_owned(),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn lists_prefixed_active_streams() {
        let server = MockServer::start().await;
        respond(
            &server,
            "/api2",
            200,
            r#"{"authorize":{"status":"OK"},"active_streams":["golive+alice","live+x","golive+bob"]}"#,
        )
        .await;

        let names = api(&server, None).list_active_stream_names().await.unwrap();
        assert_eq!(names, vec!["alice", "bob"]);
        assert!(request_targets(&server).await[0].starts_with("/api2?command="));
    }

    #[tokio::test]
    async fn challenge_without_credentials_fails() {
        let server = MockServer::start().await;
        respond(
            &server,
            "/api2",
            200,
            r#"{"authorize":{"status":"CHALL","challenge":"abc"}}"#,
        )
        .await;

        let err = api(&server, None).list_active_stream_names().await.unwrap_err();
        assert!(matches!(err, PoolError::Transcoder { .. }));
    }

    #[tokio::test]
    async fn rejected_challenge_stops_after_one_retry() {
        let server = MockServer::start().await;
        respond(
            &server,
            "/api2",
            200,
            r#"{"authorize":{"status":"CHALL","challenge":"abc"}}"#,
        )
        .await;

        let err = api(&server, Some("admin"))
            .list_active_stream_names()
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::Transcoder { .. }));
        let targets = request_targets(&server).await;
        assert_eq!(targets.len(), 2);
        let expected = urlencoding::encode(&challenge_response("secret", "abc")).into_owned();
        assert!(targets[1].contains(&expected));
    }
}
