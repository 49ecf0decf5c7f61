use std::sync::Arc;

use anyhow::{Error, Result, anyhow};

use super::db::DocumentStore;
use super::models::{Character, NewCharacter};
use crate::storage::{DEFAULT_CHARACTER_ID, Preferences};

/// The characters available to chat with and which one is active.
///
/// The built-in default is always first and always present, so the UI
/// keeps working with no document store or an unreachable one.
pub struct CharacterDirectory {
    store: Option<Arc<dyn DocumentStore>>,
    prefs: Arc<Preferences>,
    characters: Vec<Character>,
    active_id: String,
}

impl CharacterDirectory {
    pub fn new(store: Option<Arc<dyn DocumentStore>>, prefs: Arc<Preferences>) -> Self {
        Self {
            store,
            prefs,
            characters: vec![Character::builtin_default()],
            active_id: DEFAULT_CHARACTER_ID.to_string(),
        }
    }

    /// Refreshes the list from the document store. Any failure leaves
    /// only the built-in character.
    pub async fn load(&mut self) -> &[Character] {
        let mut characters = vec![Character::builtin_default()];

        match &self.store {
            Some(store) => match store.list().await {
                Ok(records) => {
                    for record in records {
                        match Character::try_from(record) {
                            Ok(character) => characters.push(character),
                            Err(err) => tracing::warn!("Skipping character record: {}", err),
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!("Failed to load characters, using the default only: {}", err)
                }
            },
            None => tracing::debug!("No document store configured"),
        }

        tracing::debug!("Loaded {} characters", characters.len());
        self.characters = characters;
        &self.characters
    }

    pub fn list(&self) -> &[Character] {
        &self.characters
    }

    pub fn get(&self, id: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    pub fn active(&self) -> &Character {
        self.get(&self.active_id)
            .unwrap_or_else(|| &self.characters[0])
    }

    pub fn title(&self) -> &str {
        &self.active().name
    }

    pub fn subtitle(&self) -> &str {
        &self.active().subtitle
    }

    /// Makes `id` the active character and persists its prompt. Unknown
    /// ids fall back to the default. Returns the now active character
    /// so the caller can refresh the header.
    pub async fn select(&mut self, id: &str) -> &Character {
        let resolved = match self.get(id) {
            Some(character) => character.id.clone(),
            None => {
                tracing::warn!("Unknown character {}, selecting the default", id);
                DEFAULT_CHARACTER_ID.to_string()
            }
        };
        self.active_id = resolved;

        let active = self.active();
        self.prefs.set_selection(&active.id, &active.prompt).await;
        tracing::info!("Selected character {} ({})", active.name, active.id);
        self.active()
    }

    /// Loads the list and reapplies the selection from the last
    /// session. The prompt is persisted again so a character that
    /// changed or vanished since does not leave a stale prompt behind.
    pub async fn restore(&mut self) -> &Character {
        self.load().await;
        let id = self.prefs.character_id().await;
        self.select(&id).await
    }

    fn store(&self) -> Result<&Arc<dyn DocumentStore>, Error> {
        self.store
            .as_ref()
            .ok_or_else(|| anyhow!("No character store is configured"))
    }

    pub async fn create(&mut self, character: &NewCharacter) -> Result<Character, Error> {
        let created = self.store()?.create(character).await?;
        self.load().await;
        Ok(created)
    }

    pub async fn update(&mut self, id: &str, character: &NewCharacter) -> Result<Character, Error> {
        if id == DEFAULT_CHARACTER_ID {
            return Err(anyhow!("The default character can't be changed"));
        }
        let updated = self.store()?.update(id, character).await?;
        self.load().await;
        if self.active_id == id {
            // Keep the persisted prompt in step with the edit
            self.select(id).await;
        }
        Ok(updated)
    }

    pub async fn delete(&mut self, id: &str) -> Result<(), Error> {
        if id == DEFAULT_CHARACTER_ID {
            return Err(anyhow!("The default character can't be deleted"));
        }
        self.store()?.delete(id).await?;
        self.load().await;
        if self.active_id == id {
            self.select(DEFAULT_CHARACTER_ID).await;
        }
        Ok(())
    }
}
