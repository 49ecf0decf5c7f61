use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::DEFAULT_CHARACTER_ID;

pub const DEFAULT_CHARACTER_NAME: &str = "Default Bot";
pub const DEFAULT_CHARACTER_SUBTITLE: &str = "General-purpose assistant";

/// A persona the user can chat with. The prompt is sent as the system
/// prompt with every message while the character is active.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub subtitle: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Character {
    /// The built-in character that is always available, even with no
    /// document store.
    pub fn builtin_default() -> Self {
        Self {
            id: DEFAULT_CHARACTER_ID.to_string(),
            name: DEFAULT_CHARACTER_NAME.to_string(),
            subtitle: DEFAULT_CHARACTER_SUBTITLE.to_string(),
            prompt: String::new(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.id == DEFAULT_CHARACTER_ID
    }
}

/// A character exactly as the document store returned it. Nothing is
/// trusted until it goes through `Character::try_from`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct CharacterRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub subtitle: Option<String>,
    pub prompt: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum InvalidCharacter {
    #[error("character record has no id")]
    MissingId,

    #[error("character {0} has no name")]
    MissingName(String),

    #[error("character id {0} is reserved")]
    ReservedId(String),
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

impl TryFrom<CharacterRecord> for Character {
    type Error = InvalidCharacter;

    fn try_from(record: CharacterRecord) -> Result<Self, Self::Error> {
        let id = record
            .id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(InvalidCharacter::MissingId)?;
        if id == DEFAULT_CHARACTER_ID {
            return Err(InvalidCharacter::ReservedId(id));
        }
        let name = record
            .name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| InvalidCharacter::MissingName(id.clone()))?;

        Ok(Character {
            id,
            name,
            subtitle: record.subtitle.unwrap_or_default(),
            prompt: record.prompt.unwrap_or_default(),
            created_at: parse_timestamp(record.created_at),
            updated_at: parse_timestamp(record.updated_at),
        })
    }
}

/// Fields for creating or replacing a character.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewCharacter {
    pub name: String,
    pub subtitle: String,
    pub prompt: String,
}

impl NewCharacter {
    pub fn new(name: &str, subtitle: &str, prompt: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            subtitle: subtitle.trim().to_string(),
            prompt: prompt.to_string(),
        }
    }
}
