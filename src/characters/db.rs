use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use tokio_rusqlite::{Connection, params};
use uuid::Uuid;

use super::models::{Character, CharacterRecord, NewCharacter};

/// The "characters" collection. Listing returns raw records so
/// validation happens in one place, at the directory.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list(&self) -> Result<Vec<CharacterRecord>, Error>;
    async fn create(&self, character: &NewCharacter) -> Result<Character, Error>;
    async fn update(&self, id: &str, character: &NewCharacter) -> Result<Character, Error>;
    async fn delete(&self, id: &str) -> Result<(), Error>;
}

/// Document store backed by the `characters` table.
#[derive(Clone)]
pub struct SqliteCharacterStore {
    db: Connection,
}

impl SqliteCharacterStore {
    pub fn new(db: &Connection) -> Self {
        Self { db: db.clone() }
    }

    async fn find(&self, id: &str) -> Result<Option<CharacterRecord>, Error> {
        let id = id.to_owned();
        let record = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, subtitle, prompt, created_at, updated_at
                     FROM characters WHERE id = ?",
                )?;
                let record = stmt
                    .query_map([id], record_from_row)?
                    .filter_map(Result::ok)
                    .next();
                Ok(record)
            })
            .await?;
        Ok(record)
    }
}

fn record_from_row(row: &rusqlite::Row) -> rusqlite::Result<CharacterRecord> {
    Ok(CharacterRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        subtitle: row.get(2)?,
        prompt: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn validate(character: &NewCharacter) -> Result<(), Error> {
    if character.name.trim().is_empty() {
        return Err(anyhow!("Character name is required"));
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for SqliteCharacterStore {
    async fn list(&self) -> Result<Vec<CharacterRecord>, Error> {
        let records = self
            .db
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, subtitle, prompt, created_at, updated_at
                     FROM characters ORDER BY created_at ASC, rowid ASC",
                )?;
                let rows = stmt
                    .query_map([], record_from_row)?
                    .filter_map(Result::ok)
                    .collect::<Vec<CharacterRecord>>();
                Ok(rows)
            })
            .await?;
        Ok(records)
    }

    async fn create(&self, character: &NewCharacter) -> Result<Character, Error> {
        validate(character)?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let NewCharacter {
            name,
            subtitle,
            prompt,
        } = character.clone();
        let row_id = id.clone();
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO characters (id, name, subtitle, prompt, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                    params![row_id, name, subtitle, prompt, now],
                )?;
                Ok(())
            })
            .await?;
        tracing::info!("Created character {}", id);

        let record = self
            .find(&id)
            .await?
            .ok_or_else(|| anyhow!("Character {} missing after insert", id))?;
        Ok(Character::try_from(record)?)
    }

    async fn update(&self, id: &str, character: &NewCharacter) -> Result<Character, Error> {
        validate(character)?;
        let now = Utc::now().to_rfc3339();
        let NewCharacter {
            name,
            subtitle,
            prompt,
        } = character.clone();
        let row_id = id.to_owned();
        let updated = self
            .db
            .call(move |conn| {
                let count = conn.execute(
                    "UPDATE characters SET name = ?2, subtitle = ?3, prompt = ?4, updated_at = ?5
                     WHERE id = ?1",
                    params![row_id, name, subtitle, prompt, now],
                )?;
                Ok(count)
            })
            .await?;
        if updated == 0 {
            return Err(anyhow!("Character {} not found", id));
        }
        tracing::info!("Updated character {}", id);

        let record = self
            .find(id)
            .await?
            .ok_or_else(|| anyhow!("Character {} not found", id))?;
        Ok(Character::try_from(record)?)
    }

    async fn delete(&self, id: &str) -> Result<(), Error> {
        let row_id = id.to_owned();
        let deleted = self
            .db
            .call(move |conn| {
                let count = conn.execute("DELETE FROM characters WHERE id = ?", [row_id])?;
                Ok(count)
            })
            .await?;
        if deleted == 0 {
            return Err(anyhow!("Character {} not found", id));
        }
        tracing::info!("Deleted character {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::initialize_db;

    async fn store() -> SqliteCharacterStore {
        let db = Connection::open_in_memory().await.unwrap();
        db.call(|conn| {
            initialize_db(conn)?;
            Ok(())
        })
        .await
        .unwrap();
        SqliteCharacterStore::new(&db)
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let store = store().await;
        let first = store
            .create(&NewCharacter::new("Captain", "A pirate", "Talk like a pirate."))
            .await
            .unwrap();
        let second = store
            .create(&NewCharacter::new("Robot", "", "Beep."))
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert!(first.created_at.is_some());
        assert_eq!(first.created_at, first.updated_at);

        let records = store.list().await.unwrap();
        let names: Vec<Option<String>> = records.into_iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec![Some("Captain".to_string()), Some("Robot".to_string())]
        );
    }

    #[tokio::test]
    async fn test_create_requires_name() {
        let store = store().await;
        assert!(store.create(&NewCharacter::new("  ", "", "")).await.is_err());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update() {
        let store = store().await;
        let created = store
            .create(&NewCharacter::new("Captain", "", "Old prompt"))
            .await
            .unwrap();

        let updated = store
            .update(&created.id, &NewCharacter::new("Captain", "Retired", "New prompt"))
            .await
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.subtitle, "Retired");
        assert_eq!(updated.prompt, "New prompt");
        assert_eq!(updated.created_at, created.created_at);

        assert!(
            store
                .update("missing", &NewCharacter::new("x", "", ""))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_delete() {
        let store = store().await;
        let created = store
            .create(&NewCharacter::new("Captain", "", ""))
            .await
            .unwrap();

        store.delete(&created.id).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
        assert!(store.delete(&created.id).await.is_err());
    }
}
