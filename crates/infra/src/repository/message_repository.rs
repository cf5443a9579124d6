//! # MessageRepository
//!
//! 宛先ごとの配信ステータス（messages テーブル）の永続化。
//!
//! 行の作成はディスパッチャがジョブ挿入と同じトランザクションで行う。
//! ステータス更新は配信プロセスのみが行い、同じステータスを繰り返し適用しても
//! `updated_at` 以外は変わらない。
//!
//! 配信プロセスからの書き込みは [`MessageRepository::settle_status`] を使う。
//! ジョブの予約を失ったワーカーや、終端ステータスに達したメッセージへの
//! 書き込みは反映されない。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hikyaku_domain::{
    campaign::{CampaignId, MessageStatusCounts},
    job::Lease,
    message::{Message, MessageId, MessageStatus},
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{db::TxContext, error::InfraError};

/// メッセージリポジトリトレイト
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// メッセージを挿入する（呼び出し元のトランザクションに参加する）
    async fn insert(&self, tx: &mut TxContext, message: &Message) -> Result<(), InfraError>;

    /// ステータスを更新する
    ///
    /// 対象行が存在しなければ `false` を返す。
    async fn update_status(
        &self,
        id: &MessageId,
        status: MessageStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, InfraError>;

    /// 予約中のジョブの結果としてステータスを書き込む
    ///
    /// `lease` のジョブがまだ同じトークンで予約されていて、かつメッセージが
    /// 終端ステータスでない場合だけ更新する。更新しなかった場合は `false`。
    async fn settle_status(
        &self,
        id: &MessageId,
        status: MessageStatus,
        now: DateTime<Utc>,
        lease: &Lease,
    ) -> Result<bool, InfraError>;

    async fn find_by_id(&self, id: &MessageId) -> Result<Option<Message>, InfraError>;

    /// キャンペーンのメッセージをステータス別に数える
    async fn count_by_status(
        &self,
        campaign_id: &CampaignId,
    ) -> Result<MessageStatusCounts, InfraError>;

    /// `cutoff` より前に更新されたメッセージを削除し、削除件数を返す
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, InfraError>;
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id:          Uuid,
    campaign_id: Option<Uuid>,
    status:      String,
    updated_at:  DateTime<Utc>,
}

fn parse_status(raw: &str) -> Result<MessageStatus, InfraError> {
    raw.parse()
        .map_err(|_| InfraError::invalid_data(format!("未知のメッセージステータス: {raw}")))
}

impl TryFrom<MessageRow> for Message {
    type Error = InfraError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id:          MessageId::from_uuid(row.id),
            campaign_id: row.campaign_id.map(CampaignId::from_uuid),
            status:      parse_status(&row.status)?,
            updated_at:  row.updated_at,
        })
    }
}

/// PostgreSQL 実装の MessageRepository
#[derive(Debug, Clone)]
pub struct PostgresMessageRepository {
    pool: PgPool,
}

impl PostgresMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(message.id = %message.id))]
    async fn insert(&self, tx: &mut TxContext, message: &Message) -> Result<(), InfraError> {
        let status: &'static str = message.status.into();
        sqlx::query(
            r"
            INSERT INTO messages (id, campaign_id, status, updated_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(message.id.as_uuid())
        .bind(message.campaign_id.as_ref().map(|id| *id.as_uuid()))
        .bind(status)
        .bind(message.updated_at)
        .execute(tx.conn())
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(message.id = %id, %status))]
    async fn update_status(
        &self,
        id: &MessageId,
        status: MessageStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, InfraError> {
        let status: &'static str = status.into();
        let result = sqlx::query("UPDATE messages SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(status)
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(message.id = %id, %status, job.id = %lease.job_id)
    )]
    async fn settle_status(
        &self,
        id: &MessageId,
        status: MessageStatus,
        now: DateTime<Utc>,
        lease: &Lease,
    ) -> Result<bool, InfraError> {
        let status: &'static str = status.into();
        let result = sqlx::query(
            r"
            UPDATE messages
            SET status = $2, updated_at = $3
            WHERE id = $1
              AND status IN ('queued', 'retry')
              AND EXISTS (
                  SELECT 1 FROM jobs WHERE id = $4 AND claim_token = $5
              )
            ",
        )
        .bind(id.as_uuid())
        .bind(status)
        .bind(now)
        .bind(lease.job_id.as_i64())
        .bind(lease.token.as_uuid())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(message.id = %id))]
    async fn find_by_id(&self, id: &MessageId) -> Result<Option<Message>, InfraError> {
        let row = sqlx::query_as::<_, MessageRow>(
            "SELECT id, campaign_id, status, updated_at FROM messages WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Message::try_from).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(campaign.id = %campaign_id))]
    async fn count_by_status(
        &self,
        campaign_id: &CampaignId,
    ) -> Result<MessageStatusCounts, InfraError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r"
            SELECT status, COUNT(*)
            FROM messages
            WHERE campaign_id = $1
            GROUP BY status
            ",
        )
        .bind(campaign_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let pairs = rows
            .into_iter()
            .map(|(status, count)| parse_status(&status).map(|status| (status, count)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MessageStatusCounts::from_pairs(pairs))
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, InfraError> {
        let result = sqlx::query("DELETE FROM messages WHERE updated_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
