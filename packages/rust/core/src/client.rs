//! HTTP client for the chat streaming endpoint.

use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Client;
use reqwest::header::ACCEPT;
use tracing::{debug, instrument};
use url::Url;

use citeflow_shared::{CiteflowError, Result, StreamConfig, api_token};

/// User-Agent string for chat requests.
const USER_AGENT: &str = concat!("citeflow/", env!("CARGO_PKG_VERSION"));

/// Body byte stream of one chat response.
pub type ByteStream = BoxStream<'static, reqwest::Result<Bytes>>;

/// Issues chat requests and hands back the raw response body.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: Client,
    endpoint: Url,
    token: Option<String>,
}

impl ChatClient {
    /// Build a client from config, reading the bearer token from the
    /// configured environment variable.
    pub fn new(config: &StreamConfig) -> Result<Self> {
        Self::with_token(config, api_token(config))
    }

    /// Build a client with an explicit bearer token.
    pub fn with_token(config: &StreamConfig, token: Option<String>) -> Result<Self> {
        let endpoint = config.endpoint_url()?;
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CiteflowError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint,
            token,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// POST `question` and return the streaming response body.
    ///
    /// Fails with [`CiteflowError::Validation`] for a blank question, and with
    /// [`CiteflowError::Network`] if the request cannot be sent or the server
    /// answers with a non-success status.
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    pub async fn stream(&self, question: &str) -> Result<ByteStream> {
        if question.trim().is_empty() {
            return Err(CiteflowError::validation("question must not be empty"));
        }

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header(ACCEPT, "text/event-stream")
            .json(&serde_json::json!({ "message": question }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CiteflowError::Network(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CiteflowError::Network(format!(
                "{}: HTTP {status}",
                self.endpoint
            )));
        }

        debug!(%status, "chat stream opened");
        Ok(response.bytes_stream().boxed())
    }
}
