//! Client for the chat backend. One POST per completion attempt and
//! every failure is turned into text that can be shown as a reply.
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Prefix for replies that are really transport or backend failures.
pub const FAILURE_MARKER: &str = "⚠️";

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("server responded with HTTP {0}")]
    Status(StatusCode),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("response was not valid JSON: {0}")]
    Malformed(String),

    #[error("response did not contain a text reply")]
    MissingReply,
}

/// Formats a failure the same way for every caller so it can be
/// appended to the conversation like any other reply.
pub fn failure_text(err: &GatewayError) -> String {
    format!("{} Error: {}", FAILURE_MARKER, err)
}

pub fn is_failure_text(text: &str) -> bool {
    text.starts_with(FAILURE_MARKER)
}

/// Anything that can turn a user message and a system prompt into a
/// reply. Implementations never fail; errors come back as reply text.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn complete(&self, message: &str, system_prompt: &str) -> String;
}

#[derive(Serialize)]
struct ChatPayload<'a> {
    message: &'a str,
    #[serde(rename = "systemPrompt")]
    system_prompt: &'a str,
}

#[derive(Clone, Debug)]
pub struct HttpGateway {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Same as `new` but with a client side timeout. Without one the
    /// request takes as long as the transport lets it.
    pub fn with_timeout(endpoint: &str, timeout: Option<Duration>) -> Result<Self> {
        let client = match timeout {
            Some(t) => reqwest::Client::builder().timeout(t).build()?,
            None => reqwest::Client::new(),
        };
        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn request_reply(
        &self,
        message: &str,
        system_prompt: &str,
    ) -> Result<String, GatewayError> {
        let payload = ChatPayload {
            message,
            system_prompt,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status));
        }

        let body = response.text().await?;
        let json: Value =
            serde_json::from_str(&body).map_err(|e| GatewayError::Malformed(e.to_string()))?;

        json["reply"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or(GatewayError::MissingReply)
    }
}

#[async_trait]
impl CompletionGateway for HttpGateway {
    async fn complete(&self, message: &str, system_prompt: &str) -> String {
        tracing::debug!("POST {} ({} chars)", self.endpoint, message.chars().count());
        match self.request_reply(message, system_prompt).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!("Completion request failed: {}", err);
                failure_text(&err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_complete_returns_reply_verbatim() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({
                "message": "hello",
                "systemPrompt": "You are a cat."
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"reply": "  Meow.\n", "model": "x"}"#)
            .create_async()
            .await;

        let gateway = HttpGateway::new(&format!("{}/api/chat", server.url()));
        let reply = gateway.complete("hello", "You are a cat.").await;

        mock.assert_async().await;
        assert_eq!(reply, "  Meow.\n");
    }

    #[tokio::test]
    async fn test_complete_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/chat")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let gateway = HttpGateway::new(&format!("{}/api/chat", server.url()));
        let reply = gateway.complete("hi", "").await;

        assert!(is_failure_text(&reply));
        assert!(reply.contains("500"), "{}", reply);
    }

    #[tokio::test]
    async fn test_complete_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let gateway = HttpGateway::new(&format!("{}/api/chat", server.url()));
        let err = gateway.request_reply("hi", "").await.unwrap_err();
        assert!(matches!(err, GatewayError::Malformed(_)));

        let reply = gateway.complete("hi", "").await;
        assert!(reply.starts_with(FAILURE_MARKER));
        assert!(reply.contains("not valid JSON"));
    }

    #[tokio::test]
    async fn test_complete_missing_or_non_string_reply() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server
            .mock("POST", "/missing")
            .with_status(200)
            .with_body(r#"{"answer": "nope"}"#)
            .create_async()
            .await;
        let _number = server
            .mock("POST", "/number")
            .with_status(200)
            .with_body(r#"{"reply": 42}"#)
            .create_async()
            .await;

        for path in ["/missing", "/number"] {
            let gateway = HttpGateway::new(&format!("{}{}", server.url(), path));
            let err = gateway.request_reply("hi", "").await.unwrap_err();
            assert!(matches!(err, GatewayError::MissingReply), "{}", path);
        }
    }

    #[tokio::test]
    async fn test_complete_connection_refused() {
        // Grab a free port and release it so nothing is listening
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let gateway = HttpGateway::new(&format!("http://127.0.0.1:{}/api/chat", port));
        let err = gateway.request_reply("hi", "").await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));

        let reply = gateway.complete("hi", "").await;
        assert!(is_failure_text(&reply));
        assert!(reply.contains("request failed"));
    }

    #[test]
    fn test_with_timeout_builds_client() {
        let gateway =
            HttpGateway::with_timeout("http://localhost/api/chat", Some(Duration::from_secs(5)))
                .unwrap();
        assert_eq!(gateway.endpoint(), "http://localhost/api/chat");
    }
}
