//! # CampaignRepository
//!
//! キャンペーンの読み出しと、ステータス集計ループによる完了書き込み。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hikyaku_domain::campaign::{
    AudienceTarget,
    Campaign,
    CampaignAggregate,
    CampaignId,
    CampaignStatus,
    SendTo,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{db::TxContext, error::InfraError};

/// キャンペーンリポジトリトレイト
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    /// キャンペーンを挿入する
    async fn insert(&self, tx: &mut TxContext, campaign: &Campaign) -> Result<(), InfraError>;

    async fn find_by_id(&self, id: &CampaignId) -> Result<Option<Campaign>, InfraError>;

    /// `sending` 状態のキャンペーンを開始時刻順に列挙する
    async fn list_sending(&self) -> Result<Vec<Campaign>, InfraError>;

    /// ディスパッチ完了時刻を書き込む
    ///
    /// 既に書き込まれていれば何もせず `false` を返す。
    async fn mark_dispatched(
        &self,
        id: &CampaignId,
        at: DateTime<Utc>,
    ) -> Result<bool, InfraError>;

    /// 集計値を書き込み、`completed` に遷移させる
    ///
    /// `sending` 状態のときのみ更新する。既に完了していれば `false`。
    async fn complete(
        &self,
        id: &CampaignId,
        aggregate: &CampaignAggregate,
    ) -> Result<bool, InfraError>;
}

#[derive(sqlx::FromRow)]
struct CampaignRow {
    id:               Uuid,
    send_to_tag:      String,
    send_to_target:   String,
    campaign_type_id: String,
    client_id:        String,
    text:             String,
    html:             String,
    subject:          String,
    template_id:      String,
    reply_to:         String,
    sender_id:        String,
    status:           String,
    sent_messages:    i64,
    failed_messages:  i64,
    total_messages:   i64,
    start_time:       DateTime<Utc>,
    dispatched_at:    Option<DateTime<Utc>>,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = InfraError;

    fn try_from(row: CampaignRow) -> Result<Self, Self::Error> {
        let target: AudienceTarget = serde_json::from_str(&row.send_to_target)?;
        let status: CampaignStatus = row.status.parse().map_err(|_| {
            InfraError::invalid_data(format!("未知のキャンペーンステータス: {}", row.status))
        })?;
        Ok(Self {
            id: CampaignId::from_uuid(row.id),
            send_to: SendTo {
                tag: row.send_to_tag,
                target,
            },
            campaign_type_id: row.campaign_type_id,
            client_id: row.client_id,
            text: row.text,
            html: row.html,
            subject: row.subject,
            template_id: row.template_id,
            reply_to: row.reply_to,
            sender_id: row.sender_id,
            status,
            sent_messages: row.sent_messages,
            failed_messages: row.failed_messages,
            total_messages: row.total_messages,
            start_time: row.start_time,
            dispatched_at: row.dispatched_at,
        })
    }
}

const SELECT_CAMPAIGN: &str = r"
    SELECT id, send_to_tag, send_to_target, campaign_type_id, client_id, text, html,
           subject, template_id, reply_to, sender_id, status,
           sent_messages, failed_messages, total_messages, start_time, dispatched_at
    FROM campaigns
";

/// PostgreSQL 実装の CampaignRepository
#[derive(Debug, Clone)]
pub struct PostgresCampaignRepository {
    pool: PgPool,
}

impl PostgresCampaignRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignRepository for PostgresCampaignRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(campaign.id = %campaign.id))]
    async fn insert(&self, tx: &mut TxContext, campaign: &Campaign) -> Result<(), InfraError> {
        let target = serde_json::to_string(&campaign.send_to.target)?;
        let status: &'static str = campaign.status.into();
        sqlx::query(
            r"
            INSERT INTO campaigns (
                id, send_to_tag, send_to_target, campaign_type_id, client_id, text, html,
                subject, template_id, reply_to, sender_id, status,
                sent_messages, failed_messages, total_messages, start_time, dispatched_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17
            )
            ",
        )
        .bind(campaign.id.as_uuid())
        .bind(&campaign.send_to.tag)
        .bind(target)
        .bind(&campaign.campaign_type_id)
        .bind(&campaign.client_id)
        .bind(&campaign.text)
        .bind(&campaign.html)
        .bind(&campaign.subject)
        .bind(&campaign.template_id)
        .bind(&campaign.reply_to)
        .bind(&campaign.sender_id)
        .bind(status)
        .bind(campaign.sent_messages)
        .bind(campaign.failed_messages)
        .bind(campaign.total_messages)
        .bind(campaign.start_time)
        .bind(campaign.dispatched_at)
        .execute(tx.conn())
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(campaign.id = %id))]
    async fn find_by_id(&self, id: &CampaignId) -> Result<Option<Campaign>, InfraError> {
        let row = sqlx::query_as::<_, CampaignRow>(&format!("{SELECT_CAMPAIGN} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Campaign::try_from).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn list_sending(&self) -> Result<Vec<Campaign>, InfraError> {
        let rows = sqlx::query_as::<_, CampaignRow>(&format!(
            "{SELECT_CAMPAIGN} WHERE status = 'sending' ORDER BY start_time ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Campaign::try_from).collect()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(campaign.id = %id))]
    async fn mark_dispatched(
        &self,
        id: &CampaignId,
        at: DateTime<Utc>,
    ) -> Result<bool, InfraError> {
        let result = sqlx::query(
            "UPDATE campaigns SET dispatched_at = $2 WHERE id = $1 AND dispatched_at IS NULL",
        )
        .bind(id.as_uuid())
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(campaign.id = %id))]
    async fn complete(
        &self,
        id: &CampaignId,
        aggregate: &CampaignAggregate,
    ) -> Result<bool, InfraError> {
        let result = sqlx::query(
            r"
            UPDATE campaigns
            SET status = 'completed',
                sent_messages = $2,
                failed_messages = $3,
                total_messages = $4
            WHERE id = $1 AND status = 'sending'
            ",
        )
        .bind(id.as_uuid())
        .bind(aggregate.sent_messages)
        .bind(aggregate.failed_messages)
        .bind(aggregate.total_messages)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn row(target: &str) -> CampaignRow {
        CampaignRow {
            id:               Uuid::now_v7(),
            send_to_tag:      "emails".into(),
            send_to_target:   target.into(),
            campaign_type_id: "type-1".into(),
            client_id:        "client-1".into(),
            text:             "本文".into(),
            html:             String::new(),
            subject:          "件名".into(),
            template_id:      String::new(),
            reply_to:         String::new(),
            sender_id:        "sender-1".into(),
            status:           "sending".into(),
            sent_messages:    0,
            failed_messages:  0,
            total_messages:   0,
            start_time:       Utc::now(),
            dispatched_at:    None,
        }
    }

    #[test]
    fn トレイトはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PostgresCampaignRepository>();
    }

    #[test]
    fn send_to_targetのjsonを復元できる() {
        let campaign = Campaign::try_from(row(r#"["a@x.com","b@x.com"]"#)).unwrap();

        assert_eq!(
            campaign.send_to.target,
            AudienceTarget::Emails(vec!["a@x.com".into(), "b@x.com".into()])
        );
        assert_eq!(campaign.status, CampaignStatus::Sending);
    }

    #[test]
    fn nullのsend_to_targetはallになる() {
        let campaign = Campaign::try_from(row("null")).unwrap();

        assert_eq!(campaign.send_to.target, AudienceTarget::All);
    }
}
