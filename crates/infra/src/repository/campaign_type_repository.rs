//! # CampaignTypeRepository
//!
//! キャンペーン種別（通知の種類）の読み出し。配信プロセスは `critical` フラグの
//! 判定にのみ使用する。

use async_trait::async_trait;
use hikyaku_domain::campaign_type::CampaignType;
use sqlx::PgPool;

use crate::error::InfraError;

/// キャンペーン種別リポジトリトレイト
#[async_trait]
pub trait CampaignTypeRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<CampaignType>, InfraError>;
}

#[derive(sqlx::FromRow)]
struct CampaignTypeRow {
    id:          String,
    name:        String,
    description: String,
    critical:    bool,
}

impl From<CampaignTypeRow> for CampaignType {
    fn from(row: CampaignTypeRow) -> Self {
        Self {
            id:          row.id,
            name:        row.name,
            description: row.description,
            critical:    row.critical,
        }
    }
}

/// PostgreSQL 実装の CampaignTypeRepository
#[derive(Debug, Clone)]
pub struct PostgresCampaignTypeRepository {
    pool: PgPool,
}

impl PostgresCampaignTypeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignTypeRepository for PostgresCampaignTypeRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(campaign_type.id = %id))]
    async fn find_by_id(&self, id: &str) -> Result<Option<CampaignType>, InfraError> {
        let row = sqlx::query_as::<_, CampaignTypeRow>(
            "SELECT id, name, description, critical FROM campaign_types WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CampaignType::from))
    }
}
