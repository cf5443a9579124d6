//! # ReceiptRepository
//!
//! 「この宛先がこの通知を受け取った」記録の冪等 upsert。
//! 同じキーで何度呼んでも行は 1 つで、`updated_at` だけが進む。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hikyaku_domain::unsubscribe::ReceiptKey;
use sqlx::PgPool;

use crate::error::InfraError;

/// 受信記録リポジトリトレイト
#[async_trait]
pub trait ReceiptRepository: Send + Sync {
    async fn upsert(&self, key: &ReceiptKey, now: DateTime<Utc>) -> Result<(), InfraError>;
}

/// PostgreSQL 実装の ReceiptRepository
#[derive(Debug, Clone)]
pub struct PostgresReceiptRepository {
    pool: PgPool,
}

impl PostgresReceiptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReceiptRepository for PostgresReceiptRepository {
    #[tracing::instrument(skip_all, level = "debug")]
    async fn upsert(&self, key: &ReceiptKey, now: DateTime<Utc>) -> Result<(), InfraError> {
        match key {
            ReceiptKey::Kind {
                user_guid,
                client_id,
                kind_id,
            } => {
                sqlx::query(
                    r"
                    INSERT INTO receipts (user_guid, client_id, kind_id, count, created_at, updated_at)
                    VALUES ($1, $2, $3, 1, $4, $4)
                    ON CONFLICT (user_guid, client_id, kind_id)
                    DO UPDATE SET count = receipts.count + 1, updated_at = EXCLUDED.updated_at
                    ",
                )
                .bind(user_guid)
                .bind(client_id)
                .bind(kind_id)
                .bind(now)
                .execute(&self.pool)
                .await?;
            }
            ReceiptKey::Campaign {
                campaign_id,
                user_guid,
            } => {
                sqlx::query(
                    r"
                    INSERT INTO campaign_receipts (campaign_id, user_guid, created_at, updated_at)
                    VALUES ($1, $2, $3, $3)
                    ON CONFLICT (campaign_id, user_guid)
                    DO UPDATE SET updated_at = EXCLUDED.updated_at
                    ",
                )
                .bind(campaign_id.as_uuid())
                .bind(user_guid)
                .bind(now)
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }
}
