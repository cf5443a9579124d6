//! # TemplateRepository
//!
//! テンプレート本体と、クライアント / 種別へのテンプレート割り当ての読み出し。
//! どのテンプレートを使うかの解決順序は配信サービス側が決める。

use async_trait::async_trait;
use hikyaku_domain::template::Templates;
use sqlx::PgPool;

use crate::error::InfraError;

/// テンプレートリポジトリトレイト
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Templates>, InfraError>;

    /// 割り当てられたテンプレート ID を取得する
    ///
    /// `kind_id` が `None` の場合はクライアント全体への割り当てを引く。
    async fn find_assigned_id(
        &self,
        client_id: &str,
        kind_id: Option<&str>,
    ) -> Result<Option<String>, InfraError>;
}

/// PostgreSQL 実装の TemplateRepository
#[derive(Debug, Clone)]
pub struct PostgresTemplateRepository {
    pool: PgPool,
}

impl PostgresTemplateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateRepository for PostgresTemplateRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(template.id = %id))]
    async fn find_by_id(&self, id: &str) -> Result<Option<Templates>, InfraError> {
        let row = sqlx::query_as::<_, (String, String, String)>(
            "SELECT subject, text, html FROM templates WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(subject, text, html)| Templates {
            subject,
            text,
            html,
        }))
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%client_id))]
    async fn find_assigned_id(
        &self,
        client_id: &str,
        kind_id: Option<&str>,
    ) -> Result<Option<String>, InfraError> {
        let id = sqlx::query_scalar::<_, String>(
            r"
            SELECT template_id
            FROM template_assignments
            WHERE client_id = $1 AND kind_id = $2
            ",
        )
        .bind(client_id)
        .bind(kind_id.unwrap_or_default())
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }
}
