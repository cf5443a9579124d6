//! # UnsubscribeRepository
//!
//! 配信停止レコードの読み出し。書き込みは設定 API の責務で、このクレートは行わない。

use async_trait::async_trait;
use hikyaku_domain::unsubscribe::Unsubscriber;
use sqlx::PgPool;

use crate::error::InfraError;

/// 配信停止リポジトリトレイト
#[async_trait]
pub trait UnsubscribeRepository: Send + Sync {
    /// 全種別の配信を停止しているか
    async fn is_globally_unsubscribed(&self, user_guid: &str) -> Result<bool, InfraError>;

    /// 種別単位の配信停止レコードを取得する
    async fn find(
        &self,
        user_guid: &str,
        campaign_type_id: &str,
    ) -> Result<Option<Unsubscriber>, InfraError>;
}

/// PostgreSQL 実装の UnsubscribeRepository
#[derive(Debug, Clone)]
pub struct PostgresUnsubscribeRepository {
    pool: PgPool,
}

impl PostgresUnsubscribeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UnsubscribeRepository for PostgresUnsubscribeRepository {
    #[tracing::instrument(skip_all, level = "debug")]
    async fn is_globally_unsubscribed(&self, user_guid: &str) -> Result<bool, InfraError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM global_unsubscribes WHERE user_guid = $1)",
        )
        .bind(user_guid)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%campaign_type_id))]
    async fn find(
        &self,
        user_guid: &str,
        campaign_type_id: &str,
    ) -> Result<Option<Unsubscriber>, InfraError> {
        let row = sqlx::query_as::<_, (String, String)>(
            r"
            SELECT user_guid, campaign_type_id
            FROM unsubscribes
            WHERE user_guid = $1 AND campaign_type_id = $2
            ",
        )
        .bind(user_guid)
        .bind(campaign_type_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(user_guid, campaign_type_id)| Unsubscriber {
            user_guid,
            campaign_type_id,
        }))
    }
}
