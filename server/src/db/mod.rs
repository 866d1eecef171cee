pub mod migrations;
pub mod models;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Type alias for the shared database connection.
/// rusqlite is synchronous - we wrap in Arc<Mutex> for thread safety
/// with tokio::task::spawn_blocking for DB operations.
pub type DbPool = Arc<Mutex<Connection>>;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("DB lock error: {0}")]
    Lock(String),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Initialize the SQLite database: create data directory if needed,
/// open (or create) the database file, enable WAL mode, and run migrations.
pub fn init_db(data_dir: &str) -> Result<DbPool, DbError> {
    // Ensure data directory exists
    std::fs::create_dir_all(data_dir)?;

    let db_path = Path::new(data_dir).join("vault.db");
    let mut conn = Connection::open(&db_path)?;

    // Enable WAL mode for better concurrent read performance
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    migrations::migrations().to_latest(&mut conn)?;

    tracing::info!("Database initialized at {}", db_path.display());

    Ok(Arc::new(Mutex::new(conn)))
}

/// Acquire the connection, mapping lock poisoning into a [`DbError`].
pub fn lock(db: &DbPool) -> Result<MutexGuard<'_, Connection>, DbError> {
    db.lock().map_err(|e| DbError::Lock(e.to_string()))
}

/// Run a synchronous DB closure on the blocking pool.
pub async fn blocking<T, E, F>(f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: From<DbError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| E::from(DbError::from(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_db_creates_schema() {
        let tmp = tempfile::tempdir().unwrap();
        let db = init_db(tmp.path().to_str().unwrap()).unwrap();
        let conn = lock(&db).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"blobs".to_string()));
    }

    #[test]
    fn test_init_db_is_reopenable() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_str().unwrap();
        drop(init_db(dir).unwrap());
        // Second open must not re-run migrations destructively
        init_db(dir).unwrap();
    }
}
