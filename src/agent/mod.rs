//! Agent gateway round-trip: request, response normalization, health check.

use async_trait::async_trait;
use thiserror::Error;

pub mod gateway;
pub mod normalize;

pub use gateway::GatewayClient;
pub use normalize::{normalize_response, NO_REPLY};

/// Reply split into what is shown and what is spoken
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
    /// Full text revealed in the chat
    pub display_text: String,
    /// Shorter form queued for speech output
    pub spoken_summary: String,
}

impl AgentReply {
    /// Build a reply from its two parts
    pub fn new(display_text: impl Into<String>, spoken_summary: impl Into<String>) -> Self {
        Self {
            display_text: display_text.into(),
            spoken_summary: spoken_summary.into(),
        }
    }
}

/// Gateway round-trip errors
#[derive(Debug, Error)]
pub enum AgentError {
    /// Token empty or whitespace; no request was made
    #[error("Gateway token is empty")]
    MissingToken,

    /// Base URL does not form a valid endpoint
    #[error("Invalid gateway URL: {0}")]
    InvalidUrl(String),

    /// No HTTP response (connect failure, timeout, TLS)
    #[error("gateway unreachable: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx response
    #[error("{message} (HTTP {status})")]
    Gateway {
        /// HTTP status code
        status: u16,
        /// Error text from the gateway
        message: String,
    },
}

/// Sends one user utterance to the agent
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Send `message` and wait for the normalized reply
    ///
    /// # Errors
    /// Returns error on configuration, transport or gateway failure
    async fn send(&self, message: &str) -> Result<AgentReply, AgentError>;

    /// Check gateway connectivity
    ///
    /// # Errors
    /// Returns error if the health endpoint is unreachable or not 2xx
    async fn check_health(&self) -> Result<(), AgentError>;
}
