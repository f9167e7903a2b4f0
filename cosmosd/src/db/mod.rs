//! Database module - SQLite storage for encounter snapshots

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

#[cfg(test)]
pub mod test_utils;

/// A persisted encounter row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredEncounter {
    pub id: String,
    pub name: String,
    /// JSON-encoded `EncounterSnapshot`
    pub snapshot: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Database handle wrapping SQLite connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    /// If path is None, uses in-memory database (for testing)
    pub async fn new(path: Option<&str>) -> Result<Self> {
        let conn_str = match path {
            Some(p) => format!("sqlite:{}?mode=rwc", p),
            None => "sqlite::memory:".to_string(),
        };

        let options = SqliteConnectOptions::from_str(&conn_str)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        // every in-memory connection is its own database
        let max_connections = if path.is_some() { 10 } else { 1 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS encounters (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                snapshot TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_encounters_created ON encounters(created_at)")
            .execute(&self.pool)
            .await?;

        info!("Database migrations complete");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check if database is healthy
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Insert or replace an encounter's snapshot
    pub async fn save_encounter(&self, id: Uuid, name: &str, snapshot: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO encounters (id, name, snapshot)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                snapshot = excluded.snapshot,
                updated_at = datetime('now')
            "#,
        )
        .bind(id.to_string())
        .bind(name)
        .bind(snapshot)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load one encounter
    pub async fn load_encounter(&self, id: Uuid) -> Result<Option<StoredEncounter>> {
        let row: Option<StoredEncounter> = sqlx::query_as(
            "SELECT id, name, snapshot, created_at, updated_at FROM encounters WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Load every encounter, oldest first
    pub async fn load_encounters(&self) -> Result<Vec<StoredEncounter>> {
        let rows: Vec<StoredEncounter> = sqlx::query_as(
            "SELECT id, name, snapshot, created_at, updated_at FROM encounters ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Delete an encounter. Returns true if a row was removed.
    pub async fn delete_encounter(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM encounters WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
