use std::env;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8787/api/chat";
const DB_FILE_NAME: &str = "persona-chat.db";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub storage_path: String,
    pub db_path: String,
    pub endpoint: String,
    /// No timeout unless one is configured
    pub request_timeout: Option<Duration>,
}

impl AppConfig {
    pub fn new(storage_path: &str, endpoint: &str) -> Self {
        let storage_path = storage_path.trim_end_matches('/').to_string();
        let db_path = format!("{}/{}", storage_path, DB_FILE_NAME);
        Self {
            storage_path,
            db_path,
            endpoint: endpoint.to_string(),
            request_timeout: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        if let Some(endpoint) = endpoint {
            self.endpoint = endpoint;
        }
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let storage_path = env::var("PERSONA_CHAT_STORAGE_PATH").unwrap_or(".".to_string());
        let endpoint =
            env::var("PERSONA_CHAT_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        let request_timeout = env::var("PERSONA_CHAT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| match s.trim().parse::<u64>() {
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(err) => {
                    tracing::warn!("Ignoring invalid PERSONA_CHAT_TIMEOUT_SECS {:?}: {}", s, err);
                    None
                }
            });

        let mut config = Self::new(&storage_path, &endpoint);
        config.request_timeout = request_timeout;
        config
    }
}
