use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use super::traits::HistoryStore;
use crate::error::Result;
use crate::types::{ConflictHistoryEntry, HistoryFilter};

pub struct PostgresHistoryStore {
    pool: PgPool,
}

impl PostgresHistoryStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../../migrations/V001__conflict_history.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for PostgresHistoryStore {
    async fn append(&self, entry: &ConflictHistoryEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO conflict_history
                (id, conflict_id, file_path, strategy, resolved_by, resolved_at, entry)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.conflict.id)
        .bind(&entry.conflict.file_path)
        .bind(entry.resolution.strategy.as_str())
        .bind(&entry.resolution.resolved_by)
        .bind(entry.resolution.resolved_at)
        .bind(serde_json::to_value(entry)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, filter: &HistoryFilter) -> Result<Vec<ConflictHistoryEntry>> {
        // the time window narrows the scan; the remaining criteria run in memory
        let rows = sqlx::query(
            r#"
            SELECT entry
            FROM conflict_history
            WHERE ($1::timestamptz IS NULL OR resolved_at >= $1)
              AND ($2::timestamptz IS NULL OR resolved_at <= $2)
            ORDER BY seq ASC
            "#,
        )
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let entry: ConflictHistoryEntry = serde_json::from_value(row.get("entry"))?;
            if filter.matches(&entry) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}
