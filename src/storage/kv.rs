use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use tokio_rusqlite::{Connection, params};

/// String keyed persistent store. No atomicity across keys.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;
    async fn set(&self, key: &str, value: &str) -> Result<(), Error>;
}

/// Store backed by the `kv` table.
#[derive(Clone)]
pub struct SqliteKv {
    db: Connection,
}

impl SqliteKv {
    pub fn new(db: &Connection) -> Self {
        Self { db: db.clone() }
    }
}

#[async_trait]
impl KeyValueStore for SqliteKv {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let key = key.to_owned();
        let value = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?")?;
                let value = stmt
                    .query_map([key], |row| row.get::<_, String>(0))?
                    .filter_map(Result::ok)
                    .next();
                Ok(value)
            })
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let key = key.to_owned();
        let value = value.to_owned();
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO kv (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![key, value],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

/// Store that lives only as long as the process.
#[derive(Default)]
pub struct MemoryKv {
    inner: Mutex<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let map = self.inner.lock().map_err(|_| anyhow!("kv lock poisoned"))?;
        Ok(map.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut map = self.inner.lock().map_err(|_| anyhow!("kv lock poisoned"))?;
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
