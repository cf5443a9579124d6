//! # ジョブキュー
//!
//! ジョブストア（`jobs` テーブル）を包み、ワーカーが使うキュー操作を提供する。
//!
//! | 操作 | 内容 |
//! |------|------|
//! | [`JobQueue::enqueue`] | 呼び出し元のトランザクション内でジョブを挿入 |
//! | [`JobQueue::reserve`] | 予約できるまで待機（間隔つきポーリング） |
//! | [`JobQueue::dequeue`] | 処理成功後にジョブを削除 |
//! | [`JobQueue::requeue`] | バックオフつきで再スケジュール |
//! | [`JobQueue::bury`] | デッドレターへ移動 |
//!
//! ## 排他性
//!
//! 予約は 1 文の `UPDATE ... FOR UPDATE SKIP LOCKED` で行うため、同じジョブを
//! 2 つのワーカーが同時に保持することはない。予約には可視性タイムアウトがあり、
//! ワーカーがクラッシュしてもタイムアウト後に再予約できる。
//! `dequeue` / `requeue` / `bury` は予約トークンが一致する場合のみ作用する。

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use hikyaku_domain::{
    clock::Clock,
    job::{Job, JobId, NewJob, RetryPolicy},
};
use hikyaku_infra::{InfraError, db::TxContext, repository::JobRepository};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// キュー操作のエラー
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("ジョブストアの操作に失敗: {0}")]
    Store(#[from] InfraError),

    /// 予約トークンが失効している（可視性タイムアウト後に別ワーカーが再予約した）
    #[error("ジョブ {0} の予約は失効しています")]
    LeaseLost(JobId),
}

/// キューの動作設定
#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    /// ジョブが空のときの待機間隔
    pub poll_interval: Duration,
    /// 予約の可視性タイムアウト
    pub visibility:    Duration,
    pub retry_policy:  RetryPolicy,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            visibility:    Duration::from_secs(300),
            retry_policy:  RetryPolicy::default(),
        }
    }
}

/// ジョブキュー
pub struct JobQueue {
    jobs:     Arc<dyn JobRepository>,
    clock:    Arc<dyn Clock>,
    settings: QueueSettings,
}

impl JobQueue {
    pub fn new(jobs: Arc<dyn JobRepository>, clock: Arc<dyn Clock>, settings: QueueSettings) -> Self {
        Self {
            jobs,
            clock,
            settings,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.settings.retry_policy
    }

    pub fn poll_interval(&self) -> Duration {
        self.settings.poll_interval
    }

    /// ジョブを挿入する
    ///
    /// 呼び出し元のトランザクションに参加するため、同じトランザクションで
    /// 書いたメッセージ行と一緒にコミット・ロールバックされる。
    pub async fn enqueue(
        &self,
        tx: &mut TxContext,
        queue: &str,
        payload: String,
    ) -> Result<JobId, QueueError> {
        let job = NewJob::immediate(queue, payload, self.clock.now());
        Ok(self.jobs.insert(tx, &job).await?)
    }

    /// 予約可能なジョブがあれば 1 件予約する（待機しない）
    pub async fn try_reserve(&self, queue: &str) -> Result<Option<Job>, QueueError> {
        Ok(self
            .jobs
            .claim(queue, self.clock.now(), self.settings.visibility)
            .await?)
    }

    /// ジョブを予約できるまで待機する
    ///
    /// 空振りのたびにジッターつきのポーリング間隔だけ待つ。
    /// `cancel` が発火したら `Ok(None)` を返す。
    pub async fn reserve(
        &self,
        queue: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Job>, QueueError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            if let Some(job) = self.try_reserve(queue).await? {
                return Ok(Some(job));
            }
            tokio::select! {
                () = cancel.cancelled() => return Ok(None),
                () = tokio::time::sleep(jittered(self.settings.poll_interval)) => {}
            }
        }
    }

    /// 処理に成功したジョブを削除する
    pub async fn dequeue(&self, job: &Job) -> Result<(), QueueError> {
        if self.jobs.delete(job.id, &job.claim_token).await? {
            Ok(())
        } else {
            Err(QueueError::LeaseLost(job.id))
        }
    }

    /// バックオフつきでジョブを戻す
    ///
    /// `active_at = now + backoff(retry_count)` とし、`retry_count` を 1 増やす。
    /// 戻り値は次に予約可能になる時刻。
    pub async fn requeue(&self, job: &Job) -> Result<DateTime<Utc>, QueueError> {
        let now = self.clock.now();
        let active_at = self.settings.retry_policy.next_active_at(now, job.retry_count);
        if self
            .jobs
            .reschedule(job.id, &job.claim_token, active_at, now)
            .await?
        {
            Ok(active_at)
        } else {
            Err(QueueError::LeaseLost(job.id))
        }
    }

    /// ジョブをデッドレターへ移動する
    pub async fn bury(&self, job: &Job, reason: &str) -> Result<(), QueueError> {
        if self
            .jobs
            .bury(job.id, &job.claim_token, reason, self.clock.now())
            .await?
        {
            Ok(())
        } else {
            Err(QueueError::LeaseLost(job.id))
        }
    }
}

/// ポーリング間隔に ±25% のジッターを加える
///
/// 同時に起動したワーカーが同じタイミングで空振りし続けないようにする。
fn jittered(interval: Duration) -> Duration {
    let factor = 0.75 + rand::random::<f64>() * 0.5;
    interval.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use hikyaku_domain::{
        clock::{FixedClock, ManualClock},
        job::DELIVERY_QUEUE,
    };
    use hikyaku_infra::mock::MockJobRepository;
    use pretty_assertions::assert_eq;

    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn settings() -> QueueSettings {
        QueueSettings {
            poll_interval: Duration::from_millis(5),
            visibility:    Duration::from_secs(60),
            retry_policy:  RetryPolicy::new(Duration::from_secs(30), Duration::from_secs(600), 5),
        }
    }

    async fn enqueue_committed(queue: &JobQueue, payload: &str) -> JobId {
        let mut tx = TxContext::mock();
        let id = queue
            .enqueue(&mut tx, DELIVERY_QUEUE, payload.to_string())
            .await
            .unwrap();
        tx.commit().await.unwrap();
        id
    }

    #[tokio::test]
    async fn 並行してreserveしても同じジョブは1回しか返らない() {
        let repo = MockJobRepository::new();
        let queue = Arc::new(JobQueue::new(
            Arc::new(repo.clone()),
            Arc::new(FixedClock::new(t0())),
            settings(),
        ));
        enqueue_committed(&queue, "{}").await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.try_reserve(DELIVERY_QUEUE).await.unwrap() })
            })
            .collect();
        let results = futures::future::join_all(handles).await;
        let claimed = results
            .into_iter()
            .map(Result::unwrap)
            .filter(Option::is_some)
            .count();

        assert_eq!(claimed, 1);
    }

    #[tokio::test]
    async fn reserveはジョブが入るまで待機する() {
        let repo = MockJobRepository::new();
        let queue = Arc::new(JobQueue::new(
            Arc::new(repo.clone()),
            Arc::new(FixedClock::new(t0())),
            settings(),
        ));
        let cancel = CancellationToken::new();

        let waiter = {
            let queue = queue.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.reserve(DELIVERY_QUEUE, &cancel).await.unwrap() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let id = enqueue_committed(&queue, "{}").await;

        let job = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.map(|j| j.id), Some(id));
    }

    #[tokio::test]
    async fn reserveはキャンセルされるとnoneを返す() {
        let queue = JobQueue::new(
            Arc::new(MockJobRepository::new()),
            Arc::new(FixedClock::new(t0())),
            settings(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = queue.reserve(DELIVERY_QUEUE, &cancel).await.unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn requeueはバックオフ後まで予約できない() {
        let repo = MockJobRepository::new();
        let clock = Arc::new(ManualClock::new(t0()));
        let queue = JobQueue::new(Arc::new(repo.clone()), clock.clone(), settings());
        let id = enqueue_committed(&queue, "{}").await;
        let job = queue.try_reserve(DELIVERY_QUEUE).await.unwrap().unwrap();

        let active_at = queue.requeue(&job).await.unwrap();

        assert_eq!(active_at, t0() + TimeDelta::seconds(30));
        assert_eq!(repo.schedule_of(id), Some((1, active_at)));
        assert!(queue.try_reserve(DELIVERY_QUEUE).await.unwrap().is_none());

        clock.advance(TimeDelta::seconds(30));
        let retried = queue.try_reserve(DELIVERY_QUEUE).await.unwrap().unwrap();
        assert_eq!(retried.retry_count, 1);

        // 2 回目のバックオフは倍になる
        let second = queue.requeue(&retried).await.unwrap();
        assert_eq!(second, t0() + TimeDelta::seconds(30 + 60));
    }

    #[tokio::test]
    async fn 失効した予約ではdequeueできない() {
        let repo = MockJobRepository::new();
        let clock = Arc::new(ManualClock::new(t0()));
        let queue = JobQueue::new(Arc::new(repo.clone()), clock.clone(), settings());
        enqueue_committed(&queue, "{}").await;
        let stale = queue.try_reserve(DELIVERY_QUEUE).await.unwrap().unwrap();

        clock.advance(TimeDelta::seconds(61));
        let fresh = queue.try_reserve(DELIVERY_QUEUE).await.unwrap().unwrap();

        assert!(matches!(
            queue.dequeue(&stale).await,
            Err(QueueError::LeaseLost(id)) if id == stale.id
        ));
        assert!(queue.dequeue(&fresh).await.is_ok());
        assert!(repo.jobs().is_empty());
    }

    #[tokio::test]
    async fn buryでデッドレターへ移動する() {
        let repo = MockJobRepository::new();
        let queue = JobQueue::new(
            Arc::new(repo.clone()),
            Arc::new(FixedClock::new(t0())),
            settings(),
        );
        enqueue_committed(&queue, "not json").await;
        let job = queue.try_reserve(DELIVERY_QUEUE).await.unwrap().unwrap();

        queue.bury(&job, "ペイロードを復号できません").await.unwrap();

        let dead = repo.dead_jobs();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].payload, "not json");
        assert!(repo.jobs().is_empty());
    }

    #[test]
    fn ジッターは間隔の75から125パーセントに収まる() {
        let interval = Duration::from_millis(1000);
        for _ in 0..100 {
            let waited = jittered(interval);
            assert!(waited >= Duration::from_millis(750));
            assert!(waited <= Duration::from_millis(1250));
        }
    }
}
