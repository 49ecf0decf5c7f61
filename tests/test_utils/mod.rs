//! Test utilities for integration tests
#![allow(dead_code)]
use std::sync::Arc;

use tempfile::TempDir;

use persona_chat::chat::ChatSession;
use persona_chat::cli::Workspace;
use persona_chat::core::AppConfig;
use persona_chat::gateway::HttpGateway;

/// A workspace backed by a sqlite database in a fresh temporary
/// directory. Keep the `TempDir` alive for as long as the workspace is
/// used; dropping it deletes the database.
pub async fn test_workspace() -> (TempDir, AppConfig, Workspace) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = AppConfig::new(
        dir.path().to_str().expect("Temp dir is not utf-8"),
        "http://127.0.0.1:1/api/chat",
    );
    let workspace = Workspace::open(&config)
        .await
        .expect("Failed to open workspace");
    (dir, config, workspace)
}

/// Opens the same database again, as a new process would.
pub async fn reopen(config: &AppConfig) -> Workspace {
    Workspace::open(config)
        .await
        .expect("Failed to reopen workspace")
}

/// A session talking to `server` with the workspace's preferences as
/// the system prompt source.
pub fn test_session(server: &mockito::ServerGuard, workspace: &Workspace) -> ChatSession {
    let gateway = HttpGateway::new(&format!("{}/api/chat", server.url()));
    ChatSession::new(Arc::new(gateway), workspace.prefs.clone())
}

/// Mocks the chat endpoint to always answer with `reply`.
pub async fn mock_reply(server: &mut mockito::ServerGuard, reply: &str) -> mockito::Mock {
    server
        .mock("POST", "/api/chat")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(serde_json::json!({ "reply": reply }).to_string())
        .create_async()
        .await
}
