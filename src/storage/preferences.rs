use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::{Error, anyhow};
use async_trait::async_trait;

use super::kv::KeyValueStore;
use crate::chat::SystemPromptSource;

pub const THEME_KEY: &str = "theme";
pub const CHARACTER_ID_KEY: &str = "characterId";
pub const SYSTEM_PROMPT_KEY: &str = "systemPrompt";
pub const DEFAULT_CHARACTER_ID: &str = "default";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(anyhow!("Unknown theme: {}", other)),
        }
    }
}

/// The three persisted values the UI cares about: theme, active
/// character id and the active character's system prompt.
///
/// Never fails. Values written this session are kept in memory too,
/// so a broken or missing store degrades to an in-memory session
/// instead of losing the selection.
pub struct Preferences {
    store: Option<Arc<dyn KeyValueStore>>,
    overlay: Mutex<HashMap<String, String>>,
}

impl Preferences {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store: Some(store),
            overlay: Mutex::new(HashMap::new()),
        }
    }

    /// Preferences with nothing behind them.
    pub fn in_memory() -> Self {
        Self {
            store: None,
            overlay: Mutex::new(HashMap::new()),
        }
    }

    fn overlay(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.overlay.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn get(&self, key: &str) -> Option<String> {
        let cached = self.overlay().get(key).cloned();
        if cached.is_some() {
            return cached;
        }
        let store = self.store.as_ref()?;
        match store.get(key).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("Failed to read {} from storage: {}", key, err);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str) {
        self.overlay().insert(key.to_string(), value.to_string());
        if let Some(store) = &self.store {
            if let Err(err) = store.set(key, value).await {
                tracing::warn!(
                    "Failed to persist {}, keeping it for this session only: {}",
                    key,
                    err
                );
            }
        }
    }

    pub async fn theme(&self) -> Theme {
        self.get(THEME_KEY)
            .await
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    pub async fn set_theme(&self, theme: Theme) {
        self.set(THEME_KEY, theme.as_str()).await
    }

    /// Flips the theme and returns the new one.
    pub async fn toggle_theme(&self) -> Theme {
        let theme = self.theme().await.toggled();
        self.set_theme(theme).await;
        theme
    }

    pub async fn character_id(&self) -> String {
        self.get(CHARACTER_ID_KEY)
            .await
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CHARACTER_ID.to_string())
    }

    pub async fn system_prompt(&self) -> String {
        self.get(SYSTEM_PROMPT_KEY).await.unwrap_or_default()
    }

    /// Persists the active character and its prompt together.
    pub async fn set_selection(&self, character_id: &str, system_prompt: &str) {
        self.set(CHARACTER_ID_KEY, character_id).await;
        self.set(SYSTEM_PROMPT_KEY, system_prompt).await;
    }
}

#[async_trait]
impl SystemPromptSource for Preferences {
    async fn current_system_prompt(&self) -> String {
        self.system_prompt().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKv;

    struct BrokenKv;

    #[async_trait]
    impl KeyValueStore for BrokenKv {
        async fn get(&self, _key: &str) -> Result<Option<String>, Error> {
            Err(anyhow!("storage unavailable"))
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<(), Error> {
            Err(anyhow!("storage unavailable"))
        }
    }

    #[test]
    fn test_theme_parse() {
        assert_eq!("dark".parse::<Theme>().unwrap(), Theme::Dark);
        assert_eq!(" light ".parse::<Theme>().unwrap(), Theme::Light);
        assert!("blue".parse::<Theme>().is_err());
        assert_eq!(Theme::Dark.toggled(), Theme::Light);
    }

    #[tokio::test]
    async fn test_defaults_when_empty() {
        let prefs = Preferences::new(Arc::new(MemoryKv::new()));
        assert_eq!(prefs.theme().await, Theme::Light);
        assert_eq!(prefs.character_id().await, DEFAULT_CHARACTER_ID);
        assert_eq!(prefs.system_prompt().await, "");
    }

    #[tokio::test]
    async fn test_unknown_stored_theme_falls_back() {
        let kv = Arc::new(MemoryKv::new());
        kv.set(THEME_KEY, "sepia").await.unwrap();
        let prefs = Preferences::new(kv);
        assert_eq!(prefs.theme().await, Theme::Light);
    }

    #[tokio::test]
    async fn test_values_persist_to_store() {
        let kv = Arc::new(MemoryKv::new());
        let prefs = Preferences::new(kv.clone());
        prefs.set_selection("abc", "You are a pirate.").await;
        assert_eq!(prefs.toggle_theme().await, Theme::Dark);

        // A fresh facade over the same store sees everything
        let reloaded = Preferences::new(kv);
        assert_eq!(reloaded.character_id().await, "abc");
        assert_eq!(reloaded.system_prompt().await, "You are a pirate.");
        assert_eq!(reloaded.theme().await, Theme::Dark);
        assert_eq!(reloaded.current_system_prompt().await, "You are a pirate.");
    }

    #[tokio::test]
    async fn test_broken_store_keeps_session_values() {
        let prefs = Preferences::new(Arc::new(BrokenKv));
        assert_eq!(prefs.character_id().await, DEFAULT_CHARACTER_ID);

        prefs.set_selection("abc", "prompt").await;
        prefs.set_theme(Theme::Dark).await;

        assert_eq!(prefs.character_id().await, "abc");
        assert_eq!(prefs.system_prompt().await, "prompt");
        assert_eq!(prefs.theme().await, Theme::Dark);
    }

    #[tokio::test]
    async fn test_in_memory_preferences() {
        let prefs = Preferences::in_memory();
        assert_eq!(prefs.toggle_theme().await, Theme::Dark);
        assert_eq!(prefs.toggle_theme().await, Theme::Light);
    }
}
