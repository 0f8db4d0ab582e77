use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use tracing::{debug, info};

use crate::agent::{normalize_response, AgentClient, AgentError, AgentReply};
use crate::config::GatewayConfig;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageRequest<'a> {
    session_id: &'a str,
    client_id: &'a str,
    message: &'a str,
}

/// HTTP client for the channel gateway
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    channel: String,
    token: String,
    client_id: String,
    session_id: String,
    timeout: Duration,
}

impl GatewayClient {
    /// Build a client from the gateway settings and the agent session id
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be constructed (TLS backend init)
    pub fn new(config: &GatewayConfig, session_id: &str) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim().trim_end_matches('/').to_owned(),
            channel: config.channel.clone(),
            token: config.token.trim().to_owned(),
            client_id: config.client_id.clone(),
            session_id: session_id.to_owned(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn endpoint(&self, leaf: &str) -> Result<Url, AgentError> {
        let raw = format!("{}/api/channels/{}/{leaf}", self.base_url, self.channel);
        let url = Url::parse(&raw).map_err(|e| AgentError::InvalidUrl(format!("{raw}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AgentError::InvalidUrl(raw));
        }
        Ok(url)
    }
}

#[async_trait]
impl AgentClient for GatewayClient {
    async fn send(&self, message: &str) -> Result<AgentReply, AgentError> {
        if self.token.is_empty() {
            return Err(AgentError::MissingToken);
        }
        let url = self.endpoint("message")?;
        info!(
            url = %url,
            session = %self.session_id,
            msg_len = message.len(),
            "channel request"
        );

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .timeout(self.timeout)
            .json(&MessageRequest {
                session_id: &self.session_id,
                client_id: &self.client_id,
                message,
            })
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?;
        info!(status, bytes = body.len(), "channel response");

        normalize_response(status, &body)
    }

    async fn check_health(&self) -> Result<(), AgentError> {
        let url = self.endpoint("health")?;
        debug!(url = %url, "health check");

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AgentError::Gateway {
                status: status.as_u16(),
                message: format!("Health endpoint returned {}", status.as_u16()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str, token: &str) -> GatewayConfig {
        GatewayConfig {
            base_url: base_url.to_owned(),
            token: token.to_owned(),
            ..GatewayConfig::default()
        }
    }

    #[tokio::test]
    async fn test_empty_token_short_circuits() {
        // Unroutable base: a network attempt would fail differently
        let client = GatewayClient::new(&config("http://192.0.2.1:9", "   "), "s").unwrap();
        let err = client.send("hello").await.unwrap_err();
        assert!(matches!(err, AgentError::MissingToken));
        assert_eq!(err.to_string(), "Gateway token is empty");
    }

    #[tokio::test]
    async fn test_empty_base_url_is_invalid() {
        let client = GatewayClient::new(&config("", "secret"), "s").unwrap();
        assert!(matches!(
            client.send("hello").await,
            Err(AgentError::InvalidUrl(_))
        ));
        assert!(matches!(
            client.check_health().await,
            Err(AgentError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_endpoint_joins_channel_path() {
        let client =
            GatewayClient::new(&config("https://gw.example.com/", "secret"), "s").unwrap();
        assert_eq!(
            client.endpoint("message").unwrap().as_str(),
            "https://gw.example.com/api/channels/openclaw-vox/message"
        );
        assert_eq!(
            client.endpoint("health").unwrap().as_str(),
            "https://gw.example.com/api/channels/openclaw-vox/health"
        );
    }

    #[test]
    fn test_non_http_scheme_rejected() {
        let client = GatewayClient::new(&config("ftp://gw.example.com", "secret"), "s").unwrap();
        assert!(matches!(
            client.endpoint("message"),
            Err(AgentError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_request_body_is_camel_case() {
        let body = serde_json::to_value(MessageRequest {
            session_id: "agent:main:main",
            client_id: "macbook",
            message: "hi",
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "sessionId": "agent:main:main",
                "clientId": "macbook",
                "message": "hi"
            })
        );
    }
}
