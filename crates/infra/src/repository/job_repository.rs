//! # JobRepository
//!
//! 配信ジョブの永続化と予約（claim）プリミティブ。ビジネスロジックは持たない。
//!
//! ## 予約の排他制御
//!
//! 予約は 1 文の `UPDATE ... WHERE id = (SELECT ... FOR UPDATE SKIP LOCKED LIMIT 1)` で行う。
//! 同時に予約しようとしたワーカーはロック済みの行を読み飛ばすため、
//! 同じジョブが 2 つのワーカーに渡ることはない。
//!
//! 予約済みの行には `claimed_until` を書き込み、その時刻を過ぎるまで
//! 予約対象から除外する。ワーカーがクラッシュしても、可視性タイムアウト経過後に
//! 別のワーカーが再予約できる（ジョブが孤立しない）。
//!
//! 削除・再スケジュール・デッドレター移動は予約トークンが一致する場合のみ行う。
//! タイムアウト後に別ワーカーが再予約したジョブを、元のワーカーが消すことはない。

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use hikyaku_domain::job::{ClaimToken, Job, JobId, NewJob};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{db::TxContext, error::InfraError};

/// ジョブリポジトリトレイト
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// ジョブを挿入する（呼び出し元のトランザクションに参加する）
    async fn insert(&self, tx: &mut TxContext, job: &NewJob) -> Result<JobId, InfraError>;

    /// 予約可能なジョブを 1 件予約する
    ///
    /// `active_at <= now` かつ未予約（または可視性タイムアウト切れ）のジョブのうち、
    /// `active_at` が最も古いものを予約する。該当なしなら `None`。
    async fn claim(
        &self,
        queue: &str,
        now: DateTime<Utc>,
        visibility: Duration,
    ) -> Result<Option<Job>, InfraError>;

    /// 予約中のジョブを削除する
    ///
    /// 予約トークンが一致しない場合は何もせず `false` を返す。
    async fn delete(&self, id: JobId, token: &ClaimToken) -> Result<bool, InfraError>;

    /// 予約を解放し、`active_at` を再設定して `retry_count` を 1 増やす
    async fn reschedule(
        &self,
        id: JobId,
        token: &ClaimToken,
        active_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, InfraError>;

    /// ジョブをデッドレターテーブルへ移動する
    async fn bury(
        &self,
        id: JobId,
        token: &ClaimToken,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, InfraError>;

    /// キュー内のジョブ件数（予約中を含む）
    async fn count(&self, queue: &str) -> Result<i64, InfraError>;
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id:            i64,
    queue:         String,
    payload:       String,
    retry_count:   i32,
    active_at:     DateTime<Utc>,
    created_at:    DateTime<Utc>,
    updated_at:    DateTime<Utc>,
    claim_token:   Option<Uuid>,
    claimed_until: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for Job {
    type Error = InfraError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let (Some(claim_token), Some(claimed_until)) = (row.claim_token, row.claimed_until) else {
            return Err(InfraError::invalid_data(format!(
                "予約情報のないジョブが返されました: id={}",
                row.id
            )));
        };
        let retry_count = u32::try_from(row.retry_count).map_err(|_| {
            InfraError::invalid_data(format!("retry_count が負数です: {}", row.retry_count))
        })?;
        Ok(Self {
            id: JobId::from(row.id),
            queue: row.queue,
            payload: row.payload,
            retry_count,
            active_at: row.active_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            claim_token: ClaimToken::from_uuid(claim_token),
            claimed_until,
        })
    }
}

/// PostgreSQL 実装の JobRepository
#[derive(Debug, Clone)]
pub struct PostgresJobRepository {
    pool: PgPool,
}

impl PostgresJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PostgresJobRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(queue = %job.queue))]
    async fn insert(&self, tx: &mut TxContext, job: &NewJob) -> Result<JobId, InfraError> {
        let id = sqlx::query_scalar::<_, i64>(
            r"
            INSERT INTO jobs (queue, payload, active_at, created_at, updated_at)
            VALUES ($1, $2, $3, $3, $3)
            RETURNING id
            ",
        )
        .bind(&job.queue)
        .bind(&job.payload)
        .bind(job.active_at)
        .fetch_one(tx.conn())
        .await?;

        Ok(JobId::from(id))
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%queue))]
    async fn claim(
        &self,
        queue: &str,
        now: DateTime<Utc>,
        visibility: Duration,
    ) -> Result<Option<Job>, InfraError> {
        let lease = TimeDelta::from_std(visibility)
            .map_err(|e| InfraError::unexpected(format!("可視性タイムアウトが大きすぎます: {e}")))?;
        let row = sqlx::query_as::<_, JobRow>(
            r"
            UPDATE jobs
            SET claim_token = $3, claimed_until = $4, updated_at = $2
            WHERE id = (
                SELECT id FROM jobs
                WHERE queue = $1
                  AND active_at <= $2
                  AND (claimed_until IS NULL OR claimed_until <= $2)
                ORDER BY active_at ASC, id ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, queue, payload, retry_count, active_at, created_at, updated_at,
                      claim_token, claimed_until
            ",
        )
        .bind(queue)
        .bind(now)
        .bind(*ClaimToken::new().as_uuid())
        .bind(now + lease)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(job.id = %id))]
    async fn delete(&self, id: JobId, token: &ClaimToken) -> Result<bool, InfraError> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1 AND claim_token = $2")
            .bind(id.as_i64())
            .bind(token.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(job.id = %id))]
    async fn reschedule(
        &self,
        id: JobId,
        token: &ClaimToken,
        active_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, InfraError> {
        let result = sqlx::query(
            r"
            UPDATE jobs
            SET active_at = $3,
                retry_count = retry_count + 1,
                claim_token = NULL,
                claimed_until = NULL,
                updated_at = $4
            WHERE id = $1 AND claim_token = $2
            ",
        )
        .bind(id.as_i64())
        .bind(token.as_uuid())
        .bind(active_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(job.id = %id))]
    async fn bury(
        &self,
        id: JobId,
        token: &ClaimToken,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, InfraError> {
        let result = sqlx::query(
            r"
            WITH moved AS (
                DELETE FROM jobs
                WHERE id = $1 AND claim_token = $2
                RETURNING id, queue, payload, retry_count, created_at
            )
            INSERT INTO dead_jobs (id, queue, payload, retry_count, reason, created_at, buried_at)
            SELECT id, queue, payload, retry_count, $3, created_at, $4 FROM moved
            ",
        )
        .bind(id.as_i64())
        .bind(token.as_uuid())
        .bind(reason)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn count(&self, queue: &str) -> Result<i64, InfraError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM jobs WHERE queue = $1")
            .bind(queue)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn トレイトはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PostgresJobRepository>();
    }

    #[test]
    fn 予約情報のない行はjobに変換できない() {
        let now = Utc::now();
        let row = JobRow {
            id:            1,
            queue:         "deliveries".into(),
            payload:       "{}".into(),
            retry_count:   0,
            active_at:     now,
            created_at:    now,
            updated_at:    now,
            claim_token:   None,
            claimed_until: None,
        };

        assert!(Job::try_from(row).is_err());
    }

    #[test]
    fn 予約済みの行はjobに変換できる() {
        let now = Utc::now();
        let token = Uuid::now_v7();
        let row = JobRow {
            id:            7,
            queue:         "deliveries".into(),
            payload:       "{}".into(),
            retry_count:   3,
            active_at:     now,
            created_at:    now,
            updated_at:    now,
            claim_token:   Some(token),
            claimed_until: Some(now),
        };

        let job = Job::try_from(row).unwrap();

        assert_eq!(job.id, JobId::from(7));
        assert_eq!(job.retry_count, 3);
        assert_eq!(job.claim_token, ClaimToken::from_uuid(token));
    }
}
