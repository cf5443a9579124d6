//! # ワーカー
//!
//! ジョブキューから配信ジョブを予約し、配信プロセスで処理する。
//!
//! 1 ワーカー = 1 つの tokio タスク。ワーカー同士はメモリ上の状態を共有せず、
//! 排他はすべてジョブストアの予約で行う。停止シグナル（[`CancellationToken`]）は
//! ジョブとジョブの間と、予約待ちの間に確認する。処理中のジョブは最後まで処理する。

use std::sync::Arc;

use hikyaku_domain::{
    delivery::Delivery,
    job::{DELIVERY_QUEUE, Job},
    worker::{WorkerGenerator, WorkerId},
};
use hikyaku_shared::{
    event_log::{error, event},
    log_business_event,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    delivery::{DeliveryProcess, Disposition},
    queue::{JobQueue, QueueError},
};

/// ワーカー
pub struct Worker {
    id:      WorkerId,
    queue:   Arc<JobQueue>,
    process: Arc<DeliveryProcess>,
}

impl Worker {
    pub fn new(id: WorkerId, queue: Arc<JobQueue>, process: Arc<DeliveryProcess>) -> Self {
        Self { id, queue, process }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// 停止シグナルまでジョブを処理し続ける
    pub async fn run(self, cancel: CancellationToken) {
        let span = tracing::info_span!("worker", worker.id = %self.id);
        async move {
            tracing::info!("ワーカーを起動しました");
            loop {
                match self.queue.reserve(DELIVERY_QUEUE, &cancel).await {
                    Ok(Some(job)) => self.handle(job).await,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(
                            error.category = error::category::INFRASTRUCTURE,
                            error.kind = error::kind::DATABASE,
                            "ジョブの予約に失敗: {e}"
                        );
                        tokio::select! {
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(self.queue.poll_interval()) => {}
                        }
                    }
                }
            }
            tracing::info!("ワーカーを停止しました");
        }
        .instrument(span)
        .await;
    }

    /// 予約したジョブを 1 件処理する
    pub async fn handle(&self, job: Job) {
        let span = tracing::info_span!("job", job.id = %job.id, job.retry_count = job.retry_count);
        async {
            let result = match Delivery::decode(&job.payload) {
                Ok(delivery) => {
                    let exhausted = self.queue.retry_policy().is_exhausted(job.retry_count);
                    match self.process.run(&delivery, &job.lease(), exhausted).await {
                        Disposition::Complete => self.queue.dequeue(&job).await,
                        Disposition::Retry => self.requeue(&job).await,
                        Disposition::DeadLetter(reason) => self.bury(&job, &reason).await,
                    }
                }
                Err(e) => {
                    tracing::error!(
                        error.category = error::category::CONTENT,
                        error.kind = error::kind::PAYLOAD,
                        "ペイロードを復号できません: {e}"
                    );
                    self.bury(&job, &format!("ペイロードを復号できません: {e}"))
                        .await
                }
            };

            match result {
                Ok(()) => {}
                Err(QueueError::LeaseLost(id)) => tracing::warn!(
                    job.id = %id,
                    "予約が失効していたため結果を反映できませんでした"
                ),
                Err(e) => tracing::error!(
                    error.category = error::category::INFRASTRUCTURE,
                    error.kind = error::kind::DATABASE,
                    "ジョブの後処理に失敗: {e}"
                ),
            }
        }
        .instrument(span)
        .await;
    }

    async fn requeue(&self, job: &Job) -> Result<(), QueueError> {
        let active_at = self.queue.requeue(job).await?;
        tracing::debug!(active_at = %active_at, "ジョブを再スケジュールしました");
        Ok(())
    }

    async fn bury(&self, job: &Job, reason: &str) -> Result<(), QueueError> {
        self.queue.bury(job, reason).await?;
        log_business_event!(
            event.category = event::category::QUEUE,
            event.action = event::action::JOB_DEAD_LETTERED,
            event.entity_type = event::entity_type::JOB,
            event.entity_id = %job.id,
            event.result = event::result::FAILURE,
            reason = %reason,
            "ジョブをデッドレターへ移動しました"
        );
        Ok(())
    }
}

/// ワーカープール
///
/// [`WorkerGenerator`] が採番した ID ごとにワーカーを起動し、
/// [`WorkerPool::halt`] で全ワーカーを停止させる。
pub struct WorkerPool {
    cancel:  CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start(
        generator: WorkerGenerator,
        queue: Arc<JobQueue>,
        process: Arc<DeliveryProcess>,
        cancel: CancellationToken,
    ) -> Self {
        let handles = generator
            .ids()
            .into_iter()
            .map(|id| {
                let worker = Worker::new(id, queue.clone(), process.clone());
                tokio::spawn(worker.run(cancel.clone()).in_current_span())
            })
            .collect();
        Self { cancel, handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// 停止シグナルを送り、全ワーカーの終了を待つ
    pub async fn halt(self) {
        self.cancel.cancel();
        for result in futures::future::join_all(self.handles).await {
            if let Err(e) = result {
                tracing::error!("ワーカーが異常終了しました: {e}");
            }
        }
    }
}
