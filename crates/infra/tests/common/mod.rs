//! テスト共通フィクスチャ
//!
//! DB を使用する統合テストで共通利用するエンティティ生成ヘルパー。
//! Rust の統合テスト規約に従い `tests/common/mod.rs` に配置。

// 各テストファイルが独立したクレートとしてコンパイルされるため、
// 使用しない関数に dead_code 警告が出る。モジュール全体で抑制する。
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use hikyaku_domain::{
    campaign::{Campaign, CampaignId, CampaignStatus, SendTo},
    job::{DELIVERY_QUEUE, NewJob},
    message::{Message, MessageId},
};
use hikyaku_infra::{
    db::{PgTransactionManager, TransactionManager},
    repository::{JobRepository, MessageRepository},
};

/// テスト用の固定日時
pub fn test_now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

/// 送信中のキャンペーンを作成
pub fn create_test_campaign(send_to: SendTo) -> Campaign {
    Campaign {
        id: CampaignId::new(),
        send_to,
        campaign_type_id: "announcement".to_string(),
        client_id: "client-1".to_string(),
        text: "本文".to_string(),
        html: String::new(),
        subject: "件名".to_string(),
        template_id: String::new(),
        reply_to: String::new(),
        sender_id: "sender-1".to_string(),
        status: CampaignStatus::Sending,
        sent_messages: 0,
        failed_messages: 0,
        total_messages: 0,
        start_time: test_now(),
        dispatched_at: None,
    }
}

/// 配信キューにジョブを 1 件コミットする
pub async fn enqueue(
    tx_manager: &PgTransactionManager,
    jobs: &dyn JobRepository,
    payload: &str,
) -> hikyaku_domain::job::JobId {
    let mut tx = tx_manager.begin().await.unwrap();
    let id = jobs
        .insert(
            &mut tx,
            &NewJob::immediate(DELIVERY_QUEUE, payload.to_string(), test_now()),
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();
    id
}

/// キャンペーンに `queued` のメッセージを 1 件コミットする
pub async fn insert_message(
    tx_manager: &PgTransactionManager,
    messages: &dyn MessageRepository,
    campaign_id: Option<CampaignId>,
) -> MessageId {
    let message = Message::queued(MessageId::new(), campaign_id, test_now());
    let mut tx = tx_manager.begin().await.unwrap();
    messages.insert(&mut tx, &message).await.unwrap();
    tx.commit().await.unwrap();
    message.id
}
