use async_trait::async_trait;
use chatline_protocol::ChatRequest;
use chatline_protocol::HealthStatus;
use chatline_protocol::StopAck;
use chatline_protocol::StreamFrame;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::header::ACCEPT;
use tracing::debug;

use crate::config::ServerUrl;
use crate::error::Result;
use crate::error::TransportError;
use crate::frame_stream::FrameStream;
use crate::session::SessionId;

pub type FrameResultStream = BoxStream<'static, Result<StreamFrame>>;

/// Connection to the chat backend.
///
/// One attempt per call; nothing here retries or times out on its own.
/// Dropping a returned stream abandons the response.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn post_chat_stream(
        &self,
        session: &SessionId,
        request: &ChatRequest,
    ) -> Result<FrameResultStream>;

    async fn post_stop(&self, session: &SessionId) -> Result<StopAck>;

    async fn health(&self) -> Result<HealthStatus>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: ServerUrl,
}

impl HttpTransport {
    pub fn new(base_url: ServerUrl) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &ServerUrl {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/chat/{path}", self.base_url.as_str())
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status { status, body })
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn post_chat_stream(
        &self,
        session: &SessionId,
        request: &ChatRequest,
    ) -> Result<FrameResultStream> {
        let url = self.endpoint("stream");
        debug!(%url, session = %session, turns = request.history.len(), "opening chat stream");
        let response = self
            .client
            .post(&url)
            .query(&[("sessionIdParam", session.as_str())])
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(FrameStream::new(Box::pin(response.bytes_stream())).boxed())
    }

    async fn post_stop(&self, session: &SessionId) -> Result<StopAck> {
        let url = self.endpoint(&format!("stop/{}", session.as_str()));
        let response = self.client.post(&url).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json::<StopAck>().await?)
    }

    async fn health(&self) -> Result<HealthStatus> {
        let response = self.client.get(self.endpoint("health")).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json::<HealthStatus>().await?)
    }
}
