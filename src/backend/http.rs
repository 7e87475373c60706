//! REST + SSE backend over `reqwest`
//!
//! Endpoints, relative to the configured base URL:
//!
//! | Operation            | Request                                   |
//! |----------------------|-------------------------------------------|
//! | create conversation  | `POST /conversations`                     |
//! | get conversation     | `GET /conversations/{id}`                 |
//! | list conversations   | `GET /conversations?limit=&offset=`       |
//! | delete conversation  | `DELETE /conversations/{id}`              |
//! | send message         | `POST /chat`                              |
//! | open stream          | `POST /chat/stream` (`text/event-stream`) |
//!
//! Non-success statuses become [`DocuchatError::Backend`], except `404`
//! which becomes [`DocuchatError::NotFound`]. Streaming responses are parsed
//! by a background task running [`forward_sse_events`].

use std::time::Duration;

use anyhow::Context;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::backend::{
    ChatBackend, ChatReply, ChatRequest, ConversationPage, CreateConversation,
    CreatedConversation, ListQuery,
};
use crate::config::BackendConfig;
use crate::error::{DocuchatError, Result};
use crate::stream::sse::forward_sse_events;
use crate::stream::EventStream;
use crate::types::Conversation;

/// Longest response body excerpt quoted in an error message
const ERROR_BODY_LIMIT: usize = 200;

/// HTTP implementation of [`ChatBackend`]
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use url::Url;
/// use docuchat::backend::HttpBackend;
///
/// let backend = HttpBackend::new(
///     Url::parse("http://localhost:8000/api").unwrap(),
///     Duration::from_secs(120),
/// )
/// .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http_client: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    /// Creates a backend rooted at `base_url`
    ///
    /// `timeout` applies to each request, including the time spent reading
    /// a streamed answer.
    ///
    /// # Errors
    ///
    /// Returns [`DocuchatError::Config`] if the HTTP client cannot be built.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DocuchatError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// Creates a backend from the `backend` configuration section
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            DocuchatError::Config(format!("invalid backend.base_url '{}': {}", config.base_url, e))
        })?;
        Self::new(base_url, Duration::from_secs(config.timeout_seconds))
    }

    /// Base URL every endpoint is resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends percent-encoded path segments to the base URL
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                DocuchatError::Config(format!("base URL '{}' cannot have a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn execute(&self, request: reqwest::RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(DocuchatError::from)
            .with_context(|| format!("{} request failed", what))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DocuchatError::NotFound(what.to_string()).into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(DocuchatError::Backend(format!(
                "{} returned HTTP {}: {}",
                what,
                status,
                excerpt.trim()
            ))
            .into());
        }
        Ok(response)
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T> {
        let body = response
            .text()
            .await
            .map_err(DocuchatError::from)
            .with_context(|| format!("failed to read {} response", what))?;
        let parsed = serde_json::from_str(&body)
            .map_err(DocuchatError::from)
            .with_context(|| format!("malformed {} response", what))?;
        Ok(parsed)
    }
}

#[async_trait::async_trait]
impl ChatBackend for HttpBackend {
    async fn create_conversation(&self, request: &CreateConversation) -> Result<String> {
        let url = self.endpoint(&["conversations"])?;
        tracing::debug!(url = %url, title = %request.title, "Creating conversation");
        let response = self
            .execute(self.http_client.post(url).json(request), "create conversation")
            .await?;
        let created: CreatedConversation = Self::read_json(response, "create conversation").await?;
        Ok(created.conversation_id)
    }

    async fn get_conversation(&self, id: &str) -> Result<Conversation> {
        let url = self.endpoint(&["conversations", id])?;
        let response = self
            .execute(self.http_client.get(url), &format!("conversation {}", id))
            .await?;
        Self::read_json(response, "get conversation").await
    }

    async fn list_conversations(&self, query: &ListQuery) -> Result<ConversationPage> {
        let url = self.endpoint(&["conversations"])?;
        let mut params = vec![
            ("limit", query.limit.to_string()),
            ("offset", query.offset.to_string()),
        ];
        if let Some(user_id) = &query.user_id {
            params.push(("user_id", user_id.clone()));
        }
        let response = self
            .execute(self.http_client.get(url).query(&params), "list conversations")
            .await?;
        Self::read_json(response, "list conversations").await
    }

    async fn delete_conversation(&self, id: &str) -> Result<()> {
        let url = self.endpoint(&["conversations", id])?;
        self.execute(self.http_client.delete(url), &format!("conversation {}", id))
            .await?;
        Ok(())
    }

    async fn send_message(&self, request: &ChatRequest) -> Result<ChatReply> {
        let url = self.endpoint(&["chat"])?;
        tracing::debug!(url = %url, conversation_id = %request.conversation_id, "Sending message");
        let response = self
            .execute(self.http_client.post(url).json(request), "chat")
            .await?;
        Self::read_json(response, "chat").await
    }

    async fn open_stream(
        &self,
        request: &ChatRequest,
        abort: CancellationToken,
    ) -> Result<EventStream> {
        let url = self.endpoint(&["chat", "stream"])?;
        tracing::debug!(url = %url, conversation_id = %request.conversation_id, "Opening response stream");
        let response = self
            .execute(
                self.http_client
                    .post(url)
                    .header("Accept", "text/event-stream")
                    .json(request),
                "chat stream",
            )
            .await?;

        let content_type = response
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !content_type.contains("text/event-stream") {
            // Servers without streaming support answer with the full reply.
            tracing::debug!(content_type = %content_type, "Stream endpoint returned a plain reply");
            let reply: ChatReply = Self::read_json(response, "chat stream").await?;
            let events = reply.into_events().into_iter().map(Ok);
            return Ok(futures::stream::iter(events).boxed());
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let byte_stream = response.bytes_stream();
        tokio::spawn(async move {
            forward_sse_events(byte_stream, events_tx, abort).await;
        });

        Ok(UnboundedReceiverStream::new(events_rx).boxed())
    }
}
