//! HTTP client for the hosted assistant API
//!
//! Three independent surfaces: the streaming chat endpoint (consumed as a
//! server-sent-event stream), the model catalog, and per-message feedback.
//! Feedback and model-list calls have no ordering dependency on any open
//! chat stream.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::{Stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::stream::{parse_record, FrameDecoder, StreamEvent};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    BadStatus { status: StatusCode, body: String },

    #[error("Stream produced nothing for {0:?}; giving up on this request")]
    IdleTimeout(Duration),
}

/// Body of the chat POST. Field names are the wire contract.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub query: String,
    pub model_id: String,
    pub conversation_id: String,
    pub user_id: String,
    pub table_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Good,
    Bad,
}

#[derive(Debug, Serialize)]
struct FeedbackBody<'a> {
    rating: Rating,
    comments: &'a str,
}

/// One entry of the model catalog.
#[derive(Debug, Clone)]
pub struct Model {
    pub id: String,
    pub name: String,
    pub input_cost: Option<f64>,
    pub output_cost: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
    #[serde(default)]
    input_cost: Option<f64>,
    #[serde(default)]
    output_cost: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: BTreeMap<String, ModelInfo>,
}

pub struct AssistantClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    request_timeout: Duration,
    stream_idle: Duration,
}

impl AssistantClient {
    /// Build a client from resolved configuration.
    ///
    /// The reqwest client carries no global timeout: a chat stream may
    /// legitimately stay open far longer than any single request should.
    /// Non-streaming calls get `request_timeout` per request; streaming
    /// reads are guarded by the per-read idle timeout instead.
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            stream_idle: Duration::from_secs(config.stream_idle_secs),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("X-API-Key", key),
            None => builder,
        }
    }

    /// Open a chat stream.
    ///
    /// The returned stream yields interpreted events until the server closes
    /// the response or a terminal condition is hit. Each read is bounded by
    /// the configured idle timeout; a stalled server surfaces as
    /// [`ClientError::IdleTimeout`] instead of hanging forever.
    pub async fn chat(
        &self,
        request: &ChatRequest,
    ) -> Result<impl Stream<Item = Result<StreamEvent, ClientError>>, ClientError> {
        let response = self
            .authorized(self.client.post(format!("{}/chat", self.base_url)))
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(event_stream(response.bytes_stream(), self.stream_idle))
    }

    /// Fetch the model catalog, sorted by model id.
    pub async fn list_models(&self) -> Result<Vec<Model>, ClientError> {
        let response = self
            .authorized(self.client.get(format!("{}/models", self.base_url)))
            .header("Accept", "application/json")
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = check_status(response).await?;

        let catalog: ModelsResponse = response.json().await?;
        Ok(catalog
            .models
            .into_iter()
            .map(|(id, info)| Model {
                id,
                name: info.name,
                input_cost: info.input_cost,
                output_cost: info.output_cost,
            })
            .collect())
    }

    /// Submit a rating for one bot message. Fire-and-forget from the
    /// console's point of view; failures are reported but change nothing.
    pub async fn submit_feedback(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        rating: Rating,
        comments: &str,
    ) -> Result<(), ClientError> {
        let url = format!(
            "{}/feedback/{}/{}",
            self.base_url, conversation_id, message_id
        );
        let response = self
            .authorized(self.client.post(url))
            .timeout(self.request_timeout)
            .json(&FeedbackBody { rating, comments })
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

/// Turn a raw chunk stream into interpreted events.
///
/// Chunks are reassembled across UTF-8 and record boundaries by the frame
/// decoder; every read is bounded by the idle timeout. Kept generic over the
/// chunk stream so the loop is testable without a live response.
fn event_stream<B, E, S>(
    bytes: S,
    idle: Duration,
) -> impl Stream<Item = Result<StreamEvent, ClientError>>
where
    B: AsRef<[u8]>,
    E: Into<ClientError>,
    S: Stream<Item = Result<B, E>>,
{
    async_stream::try_stream! {
        futures::pin_mut!(bytes);
        let mut decoder = FrameDecoder::new();
        // Carry for a multi-byte UTF-8 sequence split across chunks.
        let mut carry: Vec<u8> = Vec::new();

        loop {
            let next = tokio::time::timeout(idle, bytes.next())
                .await
                .map_err(|_| ClientError::IdleTimeout(idle))?;
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(Into::into)?;

            carry.extend_from_slice(chunk.as_ref());
            let valid_len = match std::str::from_utf8(&carry) {
                Ok(_) => carry.len(),
                Err(err) => err.valid_up_to(),
            };
            let text = String::from_utf8_lossy(&carry[..valid_len]).into_owned();
            carry.drain(..valid_len);

            for record in decoder.feed(&text) {
                if let Some(event) = parse_record(&record) {
                    yield event;
                }
            }
        }

        let leftover = decoder.into_remainder();
        if !leftover.is_empty() {
            tracing::debug!(len = leftover.len(), "dropping unfinished stream remainder");
        }
    }
}

async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::BadStatus { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_serializes_to_wire_contract() {
        let request = ChatRequest {
            query: "security check timings".into(),
            model_id: "openai/gpt-4o-mini".into(),
            conversation_id: "c-1".into(),
            user_id: "console".into(),
            table_id: "digiyatra".into(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["query"], "security check timings");
        assert_eq!(value["model_id"], "openai/gpt-4o-mini");
        assert_eq!(value["table_id"], "digiyatra");
    }

    #[test]
    fn rating_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Rating::Good).unwrap(), r#""good""#);
        assert_eq!(serde_json::to_string(&Rating::Bad).unwrap(), r#""bad""#);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_terminates_a_silent_stream() {
        let silent = futures::stream::pending::<Result<Vec<u8>, ClientError>>();
        let events = event_stream(silent, Duration::from_secs(1));
        tokio::pin!(events);

        match events.next().await {
            Some(Err(ClientError::IdleTimeout(idle))) => {
                assert_eq!(idle, Duration::from_secs(1));
            }
            other => panic!("expected idle timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn event_stream_reassembles_utf8_split_across_chunks() {
        let payload = "data: {\"type\":\"token\",\"content\":\"नमस्ते\"}\n\n";
        let bytes = payload.as_bytes();
        let split = (0..payload.len())
            .find(|&i| !payload.is_char_boundary(i))
            .expect("payload contains a multi-byte character");

        let chunks: Vec<Result<Vec<u8>, ClientError>> =
            vec![Ok(bytes[..split].to_vec()), Ok(bytes[split..].to_vec())];
        let events = event_stream(futures::stream::iter(chunks), Duration::from_secs(5));
        tokio::pin!(events);

        match events.next().await {
            Some(Ok(StreamEvent::Token { content })) => assert_eq!(content, "नमस्ते"),
            other => panic!("expected token, got {other:?}"),
        }
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn malformed_records_are_skipped_not_fatal() {
        let payload = "data: {oops}\n\ndata: {\"type\":\"token\",\"content\":\"ok\"}\n\n";
        let chunks: Vec<Result<Vec<u8>, ClientError>> = vec![Ok(payload.as_bytes().to_vec())];
        let events = event_stream(futures::stream::iter(chunks), Duration::from_secs(5));
        tokio::pin!(events);

        match events.next().await {
            Some(Ok(StreamEvent::Token { content })) => assert_eq!(content, "ok"),
            other => panic!("expected the surviving token, got {other:?}"),
        }
        assert!(events.next().await.is_none());
    }

    #[test]
    fn model_catalog_parses_and_ignores_extra_fields() {
        let body = r#"{
            "models": {
                "openai/gpt-4o-mini": {"name": "GPT-4o Mini", "input_cost": 0.15, "output_cost": 0.6, "context": 128000},
                "meta-llama/llama-3.1-8b-instruct": {"name": "Llama 3.1 8B"}
            }
        }"#;
        let parsed: ModelsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.models.len(), 2);
        let mini = &parsed.models["openai/gpt-4o-mini"];
        assert_eq!(mini.name, "GPT-4o Mini");
        assert_eq!(mini.input_cost, Some(0.15));
        assert!(parsed.models["meta-llama/llama-3.1-8b-instruct"]
            .input_cost
            .is_none());
    }
}
