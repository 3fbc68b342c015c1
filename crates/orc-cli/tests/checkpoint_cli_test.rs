//! Integration tests for the persistence path `orc serve` and `orc db-init`
//! rely on: a real PostgreSQL-backed [`PgCheckpointer`] sitting behind the
//! [`Checkpointer`] trait `orc-core` depends on.

use orc_core::checkpoint::Checkpointer;
use orc_db::PgCheckpointer;
use orc_test_utils::{create_test_db, drop_test_db};

#[tokio::test]
async fn checkpointer_persists_a_snapshot_across_instances() {
    let (pool, db_name) = create_test_db().await;

    {
        let checkpointer = PgCheckpointer::new(pool.clone());
        checkpointer.put("thread-1", vec![9, 9, 9]).await.unwrap();
    }

    // A second `PgCheckpointer` built from the same pool sees what the
    // first one wrote -- the state lives in the database, not the struct.
    let checkpointer = PgCheckpointer::new(pool.clone());
    assert_eq!(checkpointer.get("thread-1").await.unwrap(), Some(vec![9, 9, 9]));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn distinct_threads_do_not_share_snapshots() {
    let (pool, db_name) = create_test_db().await;
    let checkpointer = PgCheckpointer::new(pool.clone());

    checkpointer.put("thread-a", vec![1]).await.unwrap();
    checkpointer.put("thread-b", vec![2]).await.unwrap();

    assert_eq!(checkpointer.get("thread-a").await.unwrap(), Some(vec![1]));
    assert_eq!(checkpointer.get("thread-b").await.unwrap(), Some(vec![2]));

    pool.close().await;
    drop_test_db(&db_name).await;
}
