use std::path::Path;

use anyhow::{Error, Result};
use tokio_rusqlite::Connection;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS characters (
    id TEXT PRIMARY KEY,
    name TEXT,
    subtitle TEXT,
    prompt TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// Opens the database at `path`, creating parent directories as
/// needed.
pub async fn async_db(path: &str) -> Result<Connection, Error> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let db = Connection::open(path).await?;
    Ok(db)
}

/// Creates all tables. Safe to run more than once.
pub fn initialize_db(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)
}

/// Opens the database and makes sure the schema exists.
pub async fn open_initialized(path: &str) -> Result<Connection, Error> {
    let db = async_db(path).await?;
    db.call(|conn| {
        initialize_db(conn)?;
        Ok(())
    })
    .await?;
    Ok(db)
}
