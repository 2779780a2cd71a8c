use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::markdown::strip_emphasis;
use crate::rate_limit::{MAX_REQUESTS, minutes_ceil};
use crate::types::{Message, Notification, next_message_id};

pub const FALLBACK_ANSWER: &str = "I'm sorry, I couldn't process that request.";
pub const PROBE_QUERY: &str = "Test connection";

// ============================================
// Error Types
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("Rate limit exceeded, resets in {0:?}")]
    RateLimited(Duration),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport rejected the request: {0}")]
    TransportRejected(String),

    #[error("HTTP error! status: {0}")]
    Http(u16),

    #[error("Unexpected response body: {0}")]
    MalformedResponse(String),

    #[error("{0}")]
    Connection(String),
}

impl QueryError {
    /// Text shown in the transcript in place of an answer
    pub fn user_message(&self) -> String {
        match self {
            QueryError::RateLimited(wait) => rate_limit_description(*wait),
            QueryError::Timeout(_) => "⏰ Request timeout: The API is taking too long to respond. Please try again or check if the server is running.".to_string(),
            QueryError::TransportRejected(_) => "🔒 Connection Error: The API server needs to allow requests from this client. Please check the CORS configuration on your backend server.".to_string(),
            QueryError::Http(_) => format!(
                "Server Error: {self}. Please check if the API endpoint is working correctly."
            ),
            QueryError::MalformedResponse(_) => FALLBACK_ANSWER.to_string(),
            QueryError::Connection(detail) => format!(
                "I'm sorry, I'm having trouble connecting right now ({detail}). Please try again later."
            ),
        }
    }
}

pub fn rate_limit_description(wait: Duration) -> String {
    format!(
        "You've reached the limit of {MAX_REQUESTS} questions. Please wait {} minutes before asking again.",
        minutes_ceil(wait)
    )
}

pub fn failure_notification() -> Notification {
    Notification::destructive(
        "Connection Error",
        "Failed to get response from the API server. Check the logs for details.",
    )
}

// ============================================
// Transport
// ============================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One POST of `{"query": ...}` to the placement endpoint.
#[async_trait]
pub trait QueryTransport: Send + Sync {
    async fn post_query(&self, query: &str) -> Result<RawResponse, QueryError>;
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
}

pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(Client::new(), endpoint)
    }

    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

}

fn classify(err: reqwest::Error) -> QueryError {
    if err.is_connect() {
        QueryError::TransportRejected(err.to_string())
    } else {
        QueryError::Connection(err.to_string())
    }
}

#[async_trait]
impl QueryTransport for HttpTransport {
    async fn post_query(&self, query: &str) -> Result<RawResponse, QueryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&QueryRequest { query })
            .send()
            .await
            .map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify)?;
        Ok(RawResponse { status, body })
    }
}

/// Pull the answer out of a success body: `result`, then `response`, else the fallback.
///
/// Only a JSON object can carry an answer; any other JSON value gets the fallback.
pub fn extract_answer(body: &str) -> Result<String, QueryError> {
    let parsed: Value =
        serde_json::from_str(body).map_err(|err| QueryError::MalformedResponse(err.to_string()))?;

    let Some(fields) = parsed.as_object() else {
        warn!("response body is not a JSON object");
        return Ok(FALLBACK_ANSWER.to_string());
    };

    let answer = ["result", "response"].iter().find_map(|name| {
        fields
            .get(*name)
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
    });

    Ok(match answer {
        Some(answer) => answer.to_string(),
        None => {
            warn!("response carried neither `result` nor `response`");
            FALLBACK_ANSWER.to_string()
        }
    })
}

// ============================================
// Query Client
// ============================================

/// Outcome of one question: always exactly one bot message.
#[derive(Debug, Clone)]
pub struct Reply {
    pub message: Message,
    pub notification: Option<Notification>,
    pub error: Option<QueryError>,
}

pub struct QueryClient {
    transport: Arc<dyn QueryTransport>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl QueryClient {
    pub fn new(transport: Arc<dyn QueryTransport>, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self {
            transport,
            clock,
            timeout,
        }
    }

    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            Arc::new(HttpTransport::new(config.endpoint.clone())),
            clock,
            config.request_timeout,
        )
    }

    async fn send(&self, query: &str) -> Result<RawResponse, QueryError> {
        let raw = tokio::time::timeout(self.timeout, self.transport.post_query(query))
            .await
            .map_err(|_| QueryError::Timeout(self.timeout))??;

        if !raw.is_success() {
            return Err(QueryError::Http(raw.status));
        }
        Ok(raw)
    }

    /// Send one question and return the cleaned answer text.
    pub async fn fetch(&self, query: &str) -> Result<String, QueryError> {
        let raw = self.send(query).await?;
        let answer = extract_answer(&raw.body)?;
        Ok(strip_emphasis(&answer))
    }

    pub async fn ask(&self, query: &str) -> Reply {
        debug!(chars = query.chars().count(), "sending query");
        let result = self.fetch(query).await;
        let id = next_message_id(self.clock.now_millis());
        let now = self.clock.now();

        match result {
            Ok(text) => Reply {
                message: Message::bot(id, text, now),
                notification: None,
                error: None,
            },
            Err(err) => {
                warn!("query failed: {err}");
                Reply {
                    message: Message::bot(id, err.user_message(), now),
                    notification: Some(failure_notification()),
                    error: Some(err),
                }
            }
        }
    }

    /// Connectivity check that bypasses the question quota.
    pub async fn probe(&self) -> Notification {
        let outcome = match self.send(PROBE_QUERY).await {
            Ok(raw) => serde_json::from_str::<Value>(&raw.body)
                .map(|body| debug!(%body, "probe response"))
                .map_err(|err| QueryError::MalformedResponse(err.to_string())),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => Notification::info(
                "✅ API Connection Successful",
                "Your backend is working correctly!",
            ),
            Err(QueryError::TransportRejected(detail)) => {
                warn!("probe rejected by transport: {detail}");
                Notification::destructive(
                    "❌ CORS Error Detected",
                    "Backend needs CORS configuration. Check the logs for details.",
                )
            }
            Err(err) => {
                warn!("probe failed: {err}");
                Notification::destructive("❌ API Test Failed", err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::Severity;
    use std::sync::Mutex;

    enum Scripted {
        Reply(u16, &'static str),
        Fail(QueryError),
        Stall(Duration),
    }

    struct FakeTransport {
        script: Scripted,
        seen: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        fn new(script: Scripted) -> Arc<Self> {
            Arc::new(Self {
                script,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl QueryTransport for FakeTransport {
        async fn post_query(&self, query: &str) -> Result<RawResponse, QueryError> {
            self.seen.lock().unwrap().push(query.to_string());
            match &self.script {
                Scripted::Reply(status, body) => Ok(RawResponse {
                    status: *status,
                    body: body.to_string(),
                }),
                Scripted::Fail(err) => Err(err.clone()),
                Scripted::Stall(delay) => {
                    tokio::time::sleep(*delay).await;
                    Ok(RawResponse {
                        status: 200,
                        body: r#"{"result":"late"}"#.to_string(),
                    })
                }
            }
        }
    }

    fn client(script: Scripted) -> (QueryClient, Arc<FakeTransport>) {
        let transport = FakeTransport::new(script);
        let client = QueryClient::new(
            transport.clone(),
            Arc::new(ManualClock::new(1_700_000_000_000)),
            Duration::from_secs(15),
        );
        (client, transport)
    }

    #[test]
    fn extracts_result_then_response_then_fallback() {
        assert_eq!(extract_answer(r#"{"result":"a","response":"b"}"#).unwrap(), "a");
        assert_eq!(extract_answer(r#"{"result":"","response":"b"}"#).unwrap(), "b");
        assert_eq!(extract_answer(r#"{"response":"b"}"#).unwrap(), "b");
        assert_eq!(extract_answer(r#"{"answer":"c"}"#).unwrap(), FALLBACK_ANSWER);
        assert_eq!(extract_answer(r#"{"result":42,"response":"b"}"#).unwrap(), "b");
        // Arrays must not be read positionally as `result` / `response`.
        assert_eq!(extract_answer(r#"["**Secret** answer"]"#).unwrap(), FALLBACK_ANSWER);
        assert_eq!(extract_answer(r#"[null, "from response slot"]"#).unwrap(), FALLBACK_ANSWER);
        assert_eq!(extract_answer(r#""bare string""#).unwrap(), FALLBACK_ANSWER);
        assert!(matches!(
            extract_answer("<html>oops</html>"),
            Err(QueryError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn success_strips_markdown_and_sends_query() {
        let (client, transport) = client(Scripted::Reply(200, r#"{"result":"**8-12 LPA**"}"#));
        let reply = client.ask("What is the CTC range?").await;

        assert!(reply.message.is_bot);
        assert_eq!(reply.message.text, "8-12 LPA");
        assert!(reply.notification.is_none());
        assert!(reply.error.is_none());
        assert_eq!(*transport.seen.lock().unwrap(), vec!["What is the CTC range?"]);
    }

    #[tokio::test]
    async fn http_failure_reports_status() {
        let (client, _) = client(Scripted::Reply(500, "Internal Server Error"));
        let reply = client.ask("hi").await;

        assert_eq!(reply.error, Some(QueryError::Http(500)));
        assert!(reply.message.text.starts_with("Server Error"));
        assert!(reply.message.text.contains("500"));
        assert_eq!(
            reply.notification.map(|n| n.severity),
            Some(Severity::Destructive)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_request_times_out() {
        let (client, _) = client(Scripted::Stall(Duration::from_secs(16)));
        let reply = client.ask("hi").await;

        assert_eq!(reply.error, Some(QueryError::Timeout(Duration::from_secs(15))));
        assert!(reply.message.text.contains("Request timeout"));
        assert!(reply.notification.is_some());
    }

    #[tokio::test]
    async fn transport_rejection_gets_cors_explanation() {
        let (client, _) = client(Scripted::Fail(QueryError::TransportRejected(
            "connection refused".into(),
        )));
        let reply = client.ask("hi").await;
        assert!(reply.message.text.contains("CORS"));
        assert!(reply.notification.is_some());
    }

    #[tokio::test]
    async fn other_failures_embed_error_text() {
        let (client, _) = client(Scripted::Fail(QueryError::Connection("body closed early".into())));
        let reply = client.ask("hi").await;
        assert!(reply.message.text.contains("trouble connecting"));
        assert!(reply.message.text.contains("body closed early"));
    }

    #[tokio::test]
    async fn malformed_body_degrades_to_apology() {
        let (client, _) = client(Scripted::Reply(200, "not json"));
        let reply = client.ask("hi").await;
        assert_eq!(reply.message.text, FALLBACK_ANSWER);
        assert!(matches!(reply.error, Some(QueryError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn probe_reports_each_outcome() {
        let (ok, transport) = client(Scripted::Reply(200, r#"{"result":"pong"}"#));
        let note = ok.probe().await;
        assert_eq!(note.severity, Severity::Info);
        assert_eq!(*transport.seen.lock().unwrap(), vec![PROBE_QUERY]);

        let (cors, _) = client(Scripted::Fail(QueryError::TransportRejected("refused".into())));
        assert!(cors.probe().await.title.contains("CORS"));

        let (down, _) = client(Scripted::Reply(503, ""));
        let note = down.probe().await;
        assert_eq!(note.severity, Severity::Destructive);
        assert!(note.description.contains("503"));
    }
}
