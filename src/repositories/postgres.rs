use async_trait::async_trait;
use deadpool_postgres::Pool;

use crate::error::Result;
use crate::repositories::store::Database;

/// PostgreSQL-backed document store (`broker_models` table, see `db::ensure_schema`).
#[derive(Clone)]
pub struct PostgresDatabase {
    pool: Pool,
}

impl PostgresDatabase {
    /// Creates a store over an existing pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    async fn get(&self, kind: &str, id: &str) -> Result<Option<String>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT payload
                FROM broker_models
                WHERE kind = $1 AND id = $2
                "#,
                &[&kind, &id],
            )
            .await?;
        Ok(row.map(|r| r.get("payload")))
    }

    async fn save(&self, kind: &str, id: &str, payload: String) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                INSERT INTO broker_models (kind, id, payload)
                VALUES ($1, $2, $3)
                ON CONFLICT (kind, id) DO UPDATE SET payload = EXCLUDED.payload
                "#,
                &[&kind, &id, &payload],
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, kind: &str, id: &str) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "DELETE FROM broker_models WHERE kind = $1 AND id = $2",
                &[&kind, &id],
            )
            .await?;
        Ok(())
    }

    async fn delete_expired(
        &self,
        kind: &str,
        field: &str,
        cutoff: i64,
        limit: Option<i64>,
    ) -> Result<u64> {
        let client = self.pool.get().await?;
        // LIMIT NULL means no limit in PostgreSQL.
        let removed = client
            .execute(
                r#"
                DELETE FROM broker_models
                WHERE ctid IN (
                    SELECT ctid
                    FROM broker_models
                    WHERE kind = $1 AND (payload::jsonb ->> $2)::bigint <= $3
                    LIMIT $4
                )
                "#,
                &[&kind, &field, &cutoff, &limit],
            )
            .await?;

        tracing::debug!("🧹 Deleted {} expired {} documents", removed, kind);
        Ok(removed)
    }
}
