//! JobRepository の統合テスト
//!
//! 予約の排他性、可視性タイムアウト、再スケジュール、デッドレター移動を検証する。
//!
//! 実行方法:
//! ```bash
//! DATABASE_URL=postgres://localhost/hikyaku_test \
//!     cargo test -p hikyaku-infra --test job_repository_test -- --ignored
//! ```

mod common;

use std::time::Duration;

use chrono::TimeDelta;
use common::{enqueue, test_now};
use hikyaku_domain::job::DELIVERY_QUEUE;
use hikyaku_infra::{
    db::PgTransactionManager,
    repository::{JobRepository, PostgresJobRepository},
};
use pretty_assertions::assert_eq;
use sqlx::PgPool;

const VISIBILITY: Duration = Duration::from_secs(300);

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "PostgreSQL が必要"]
async fn test_予約済みのジョブは他のワーカーに予約されない(pool: PgPool) {
    let tx_manager = PgTransactionManager::new(pool.clone());
    let repo = PostgresJobRepository::new(pool);
    let id = enqueue(&tx_manager, &repo, "{}").await;

    let first = repo.claim(DELIVERY_QUEUE, test_now(), VISIBILITY).await.unwrap();
    let second = repo.claim(DELIVERY_QUEUE, test_now(), VISIBILITY).await.unwrap();

    assert_eq!(first.map(|job| job.id), Some(id));
    assert!(second.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "PostgreSQL が必要"]
async fn test_可視性タイムアウト後は再予約でき古いトークンは無効になる(pool: PgPool) {
    let tx_manager = PgTransactionManager::new(pool.clone());
    let repo = PostgresJobRepository::new(pool);
    enqueue(&tx_manager, &repo, "{}").await;

    let stale = repo
        .claim(DELIVERY_QUEUE, test_now(), VISIBILITY)
        .await
        .unwrap()
        .unwrap();
    let later = test_now() + TimeDelta::seconds(301);
    let fresh = repo
        .claim(DELIVERY_QUEUE, later, VISIBILITY)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(stale.id, fresh.id);
    assert!(!repo.delete(stale.id, &stale.claim_token).await.unwrap());
    assert!(repo.delete(fresh.id, &fresh.claim_token).await.unwrap());
    assert_eq!(repo.count(DELIVERY_QUEUE).await.unwrap(), 0);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "PostgreSQL が必要"]
async fn test_再スケジュールでretry_countが増え予約が解放される(pool: PgPool) {
    let tx_manager = PgTransactionManager::new(pool.clone());
    let repo = PostgresJobRepository::new(pool);
    enqueue(&tx_manager, &repo, "{}").await;
    let job = repo
        .claim(DELIVERY_QUEUE, test_now(), VISIBILITY)
        .await
        .unwrap()
        .unwrap();
    let active_at = test_now() + TimeDelta::seconds(30);

    let rescheduled = repo
        .reschedule(job.id, &job.claim_token, active_at, test_now())
        .await
        .unwrap();

    assert!(rescheduled);
    // active_at 前には予約できない
    assert!(repo
        .claim(DELIVERY_QUEUE, test_now(), VISIBILITY)
        .await
        .unwrap()
        .is_none());
    let retried = repo
        .claim(DELIVERY_QUEUE, active_at, VISIBILITY)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(retried.retry_count, 1);
    assert_eq!(retried.active_at, active_at);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "PostgreSQL が必要"]
async fn test_buryでジョブがデッドレターテーブルへ移動する(pool: PgPool) {
    let tx_manager = PgTransactionManager::new(pool.clone());
    let repo = PostgresJobRepository::new(pool.clone());
    enqueue(&tx_manager, &repo, "not json").await;
    let job = repo
        .claim(DELIVERY_QUEUE, test_now(), VISIBILITY)
        .await
        .unwrap()
        .unwrap();

    let buried = repo
        .bury(job.id, &job.claim_token, "ペイロードを復号できません", test_now())
        .await
        .unwrap();

    assert!(buried);
    assert_eq!(repo.count(DELIVERY_QUEUE).await.unwrap(), 0);
    let (payload, reason): (String, String) =
        sqlx::query_as("SELECT payload, reason FROM dead_jobs WHERE id = $1")
            .bind(job.id.as_i64())
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(payload, "not json");
    assert_eq!(reason, "ペイロードを復号できません");
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "PostgreSQL が必要"]
async fn test_コミットしなかったジョブは残らない(pool: PgPool) {
    use hikyaku_domain::job::NewJob;
    use hikyaku_infra::db::TransactionManager;

    let tx_manager = PgTransactionManager::new(pool.clone());
    let repo = PostgresJobRepository::new(pool);
    {
        let mut tx = tx_manager.begin().await.unwrap();
        repo.insert(
            &mut tx,
            &NewJob::immediate(DELIVERY_QUEUE, "{}".to_string(), test_now()),
        )
        .await
        .unwrap();
    }

    assert_eq!(repo.count(DELIVERY_QUEUE).await.unwrap(), 0);
}
