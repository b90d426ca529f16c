//! reqwest-backed channel client.
//!
//! Issues `GET <base>/channelPing?channel_key=<key>` with `Accept: */*` and
//! no body. Any 2xx response with a UTF-8 body is a success; everything else
//! maps onto [`PingError`].

use crate::ping::{ChannelClient, PingError, PingReceipt};
use std::future::Future;
use std::pin::Pin;

/// Default channel endpoint, overridable via `BEACON_BASE_URL`.
pub const DEFAULT_BASE_URL: &str = "https://api.svitlobot.in.ua";

/// HTTP channel client. One client instance per process is enough; the
/// underlying reqwest client pools connections internally.
pub struct HttpChannelClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChannelClient {
    /// Build from an optional base URL override.
    pub fn new(base_url: Option<String>) -> Self {
        let base = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        Self {
            client: reqwest::Client::new(),
            base_url: base.trim_end_matches('/').to_owned(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/channelPing", self.base_url)
    }

    fn build_request(&self, channel_key: &str) -> Result<reqwest::Request, PingError> {
        self.client
            .get(self.endpoint())
            .query(&[("channel_key", channel_key)])
            .header("Accept", "*/*")
            .build()
            .map_err(|e| PingError::Transport(e.to_string()))
    }

    async fn execute(&self, channel_key: &str) -> Result<PingReceipt, PingError> {
        let request = self.build_request(channel_key)?;
        tracing::debug!(url = %request.url(), "sending channel ping");

        let resp = self
            .client
            .execute(request)
            .await
            .map_err(|e| PingError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PingError::Status(status.as_u16()));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| PingError::Transport(e.to_string()))?;
        let body = String::from_utf8(bytes.to_vec()).map_err(|_| PingError::NonTextBody)?;

        Ok(PingReceipt {
            status_code: status.as_u16(),
            body,
        })
    }
}

impl ChannelClient for HttpChannelClient {
    fn name(&self) -> &str {
        "http"
    }

    fn channel_ping(
        &self,
        channel_key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<PingReceipt, PingError>> + Send + '_>> {
        let key = channel_key.to_owned();
        Box::pin(async move { self.execute(&key).await })
    }
}

/// Build a client from the environment.
/// Reads `BEACON_BASE_URL`, falling back to [`DEFAULT_BASE_URL`].
pub fn from_env() -> HttpChannelClient {
    HttpChannelClient::new(std::env::var("BEACON_BASE_URL").ok())
}
