use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use sqlx::{
    Row, Sqlite,
    migrate::MigrateDatabase,
    sqlite::{SqlitePool, SqlitePoolOptions},
};

use crate::models::VoteCounter;
use crate::votes::{FALLBACK_COUNT, VoteError, VoteStore};

/// SQLite-backed counter. Increments run as one `UPDATE ... RETURNING`,
/// so concurrent votes are never lost.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self, VoteError> {
        // Create database if it doesn't exist
        if !db_url.contains(":memory:")
            && !Sqlite::database_exists(db_url).await.unwrap_or(false)
        {
            Sqlite::create_database(db_url).await?;
        }

        // Each in-memory connection is its own database
        let max_connections = if db_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await?;

        Self::init_schema(&pool).await?;
        info!("Vote counter database ready at {}", db_url);

        Ok(Self { pool })
    }

    async fn init_schema(pool: &SqlitePool) -> Result<(), VoteError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vote_counter (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                count INTEGER NOT NULL CHECK (count >= 0),
                last_updated TEXT
            );
            "#,
        )
        .execute(pool)
        .await?;

        // Seed once; an existing row is left alone
        sqlx::query(
            r#"
            INSERT INTO vote_counter (id, count, last_updated)
            VALUES (1, ?, NULL)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(FALLBACK_COUNT as i64)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn counter(&self) -> Result<VoteCounter, VoteError> {
        let row = sqlx::query("SELECT count, last_updated FROM vote_counter WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;

        let last_updated = row
            .get::<Option<String>, _>("last_updated")
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(VoteCounter {
            count: row.get::<i64, _>("count").max(0) as u64,
            last_updated,
        })
    }

    // Overwrite the stored count, e.g. when migrating from the spreadsheet
    pub async fn seed(&self, count: u64) -> Result<(), VoteError> {
        sqlx::query("UPDATE vote_counter SET count = ?, last_updated = ? WHERE id = 1")
            .bind(count as i64)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VoteStore for Database {
    async fn get_count(&self) -> Result<u64, VoteError> {
        Ok(self.counter().await?.count)
    }

    async fn increment_and_store(&self) -> Result<u64, VoteError> {
        let row = sqlx::query(
            r#"
            UPDATE vote_counter
            SET count = count + 1, last_updated = ?
            WHERE id = 1
            RETURNING count
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("count") as u64)
    }
}
