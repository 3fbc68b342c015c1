//! Postgres-backed [`Checkpointer`] implementation.

use async_trait::async_trait;
use orc_core::checkpoint::{CheckpointError, Checkpointer};
use sqlx::PgPool;

/// Stores one row per thread in the `checkpoints` table, upserting on every
/// `put`. The Gateway owns serialization; this type only persists bytes.
pub struct PgCheckpointer {
    pool: PgPool,
}

impl PgCheckpointer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Checkpointer for PgCheckpointer {
    async fn get(&self, thread_id: &str) -> Result<Option<Vec<u8>>, CheckpointError> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT snapshot FROM checkpoints WHERE thread_id = $1")
                .bind(thread_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CheckpointError::Unavailable(e.to_string()))?;
        Ok(row.map(|(snapshot,)| snapshot))
    }

    async fn put(&self, thread_id: &str, snapshot: Vec<u8>) -> Result<(), CheckpointError> {
        sqlx::query(
            "INSERT INTO checkpoints (thread_id, snapshot, updated_at) VALUES ($1, $2, now()) \
             ON CONFLICT (thread_id) DO UPDATE SET snapshot = EXCLUDED.snapshot, updated_at = now()",
        )
        .bind(thread_id)
        .bind(snapshot)
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_test_utils::{create_test_db, drop_test_db};

    #[tokio::test]
    async fn put_then_get_round_trips_through_postgres() {
        let (pool, db_name) = create_test_db().await;
        let checkpointer = PgCheckpointer::new(pool.clone());

        checkpointer.put("thread-1", vec![1, 2, 3]).await.unwrap();
        let loaded = checkpointer.get("thread-1").await.unwrap();
        assert_eq!(loaded, Some(vec![1, 2, 3]));

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn put_overwrites_previous_snapshot_for_same_thread() {
        let (pool, db_name) = create_test_db().await;
        let checkpointer = PgCheckpointer::new(pool.clone());

        checkpointer.put("thread-1", vec![1]).await.unwrap();
        checkpointer.put("thread-1", vec![2]).await.unwrap();
        assert_eq!(checkpointer.get("thread-1").await.unwrap(), Some(vec![2]));

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn get_on_unknown_thread_is_none() {
        let (pool, db_name) = create_test_db().await;
        let checkpointer = PgCheckpointer::new(pool.clone());

        assert_eq!(checkpointer.get("missing").await.unwrap(), None);

        pool.close().await;
        drop_test_db(&db_name).await;
    }
}
