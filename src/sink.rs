use crate::config::SinkConfig;
use crate::error::SinkError;
use crate::render::Message;
use async_trait::async_trait;
use std::time::Duration;

const SINK_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY: usize = 500;

/// Hand-off point to the notification host. Called once per rendered message;
/// retries and queueing, if any, belong to the implementation.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn submit(&self, message: &Message) -> Result<(), SinkError>;
}

/// Submits messages to a Gotify-compatible `POST /message` endpoint.
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HttpSink {
    pub fn new(config: &SinkConfig) -> Result<Self, SinkError> {
        let base = config.url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(SinkError::NotConfigured);
        }
        let client = reqwest::Client::builder().timeout(SINK_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: format!("{base}/message"),
            token: config.token.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MessageSink for HttpSink {
    async fn submit(&self, message: &Message) -> Result<(), SinkError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header("X-Gotify-Key", &self.token)
            .json(message)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = match resp.text().await {
            Ok(text) => text.chars().take(MAX_ERROR_BODY).collect(),
            Err(e) => format!("[failed to read response body: {e}]"),
        };
        Err(SinkError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
