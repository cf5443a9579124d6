//! # キャンペーンステータス集計
//!
//! 一定間隔で `sending` のキャンペーンを列挙し、メッセージのステータス別件数から
//! 集計値を計算して `completed` に遷移させる。同じ間隔で保持期間を過ぎた
//! メッセージを削除する。
//!
//! ディスパッチャが `dispatched_at` を書き込むまでは、メッセージの書き込みが
//! 続いている可能性があるため完了させない。
//!
//! 各回の集計は独立しており、ポーリング間で持ち越す状態はない。

use std::{sync::Arc, time::Duration};

use chrono::TimeDelta;
use hikyaku_domain::{
    campaign::{Campaign, completion},
    clock::Clock,
};
use hikyaku_infra::{
    InfraError,
    repository::{CampaignRepository, MessageRepository},
};
use hikyaku_shared::{
    event_log::{error, event},
    log_business_event,
};
use tokio_util::sync::CancellationToken;

/// メッセージが 0 件のキャンペーンを完了させるまでの猶予の既定値（秒）
pub const DEFAULT_EMPTY_CAMPAIGN_GRACE_SECS: i64 = 60;

/// 集計の設定
#[derive(Debug, Clone, Copy)]
pub struct AggregatorSettings {
    pub interval:  Duration,
    /// メッセージが 0 件のキャンペーンを完了させるまでの猶予
    pub grace:     TimeDelta,
    /// メッセージの保持期間
    pub retention: TimeDelta,
}

/// 1 回の集計結果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub completed:        usize,
    pub messages_deleted: u64,
}

/// キャンペーンステータス集計
pub struct CampaignStatusAggregator {
    campaigns: Arc<dyn CampaignRepository>,
    messages:  Arc<dyn MessageRepository>,
    clock:     Arc<dyn Clock>,
    settings:  AggregatorSettings,
}

impl CampaignStatusAggregator {
    pub fn new(
        campaigns: Arc<dyn CampaignRepository>,
        messages: Arc<dyn MessageRepository>,
        clock: Arc<dyn Clock>,
        settings: AggregatorSettings,
    ) -> Self {
        Self {
            campaigns,
            messages,
            clock,
            settings,
        }
    }

    /// 停止シグナルまで集計を繰り返す
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(interval = ?self.settings.interval, "キャンペーン集計を開始しました");
        loop {
            if let Err(e) = self.run_once().await {
                tracing::error!(
                    error.category = error::category::INFRASTRUCTURE,
                    error.kind = error::kind::DATABASE,
                    "キャンペーン集計に失敗: {e}"
                );
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.settings.interval) => {}
            }
        }
        tracing::info!("キャンペーン集計を停止しました");
    }

    /// 1 回分の集計とメッセージ削除を行う
    ///
    /// 個々のキャンペーンの失敗はログに残して次のキャンペーンへ進む。
    pub async fn run_once(&self) -> Result<TickReport, InfraError> {
        let mut report = TickReport::default();

        for campaign in self.campaigns.list_sending().await? {
            match self.update_campaign(&campaign).await {
                Ok(true) => report.completed += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(
                    error.category = error::category::INFRASTRUCTURE,
                    error.kind = error::kind::DATABASE,
                    campaign.id = %campaign.id,
                    "キャンペーンの集計に失敗: {e}"
                ),
            }
        }

        let cutoff = self.clock.now() - self.settings.retention;
        report.messages_deleted = self.messages.delete_older_than(cutoff).await?;
        if report.messages_deleted > 0 {
            tracing::info!(
                deleted = report.messages_deleted,
                cutoff = %cutoff,
                "保持期間を過ぎたメッセージを削除しました"
            );
        }

        Ok(report)
    }

    async fn update_campaign(&self, campaign: &Campaign) -> Result<bool, InfraError> {
        let counts = self.messages.count_by_status(&campaign.id).await?;
        let Some(aggregate) = completion(
            &counts,
            campaign.start_time,
            campaign.dispatched_at,
            self.clock.now(),
            self.settings.grace,
        ) else {
            return Ok(false);
        };

        let completed = self.campaigns.complete(&campaign.id, &aggregate).await?;
        if completed {
            log_business_event!(
                event.category = event::category::CAMPAIGN,
                event.action = event::action::CAMPAIGN_COMPLETED,
                event.entity_type = event::entity_type::CAMPAIGN,
                event.entity_id = %campaign.id,
                event.result = event::result::SUCCESS,
                sent_messages = aggregate.sent_messages,
                failed_messages = aggregate.failed_messages,
                total_messages = aggregate.total_messages,
                "キャンペーンが完了しました"
            );
        }
        Ok(completed)
    }
}
