//! # テンプレートローダー
//!
//! (クライアント, 種別, テンプレート ID) からテンプレートを解決する。
//!
//! 解決順:
//!
//! 1. 明示されたテンプレート ID
//! 2. (クライアント, 種別) への割り当て
//! 3. クライアント全体への割り当て
//! 4. 保存済みの `default` テンプレート
//! 5. 組み込みの既定テンプレート
//!
//! 明示・割り当てされた ID のテンプレートが存在しない場合は
//! [`TemplateError::NotFound`]（リトライしない）。テンプレートソースの
//! 読み取り失敗は [`TemplateError::Unavailable`]（リトライする）。

use std::sync::Arc;

use hikyaku_domain::template::{DEFAULT_TEMPLATE_ID, TemplateError, Templates};
use hikyaku_infra::{InfraError, repository::TemplateRepository};

pub struct TemplateLoader {
    repo: Arc<dyn TemplateRepository>,
}

fn unavailable(e: InfraError) -> TemplateError {
    TemplateError::Unavailable(e.to_string())
}

impl TemplateLoader {
    pub fn new(repo: Arc<dyn TemplateRepository>) -> Self {
        Self { repo }
    }

    pub async fn load(
        &self,
        client_id: &str,
        kind_id: &str,
        template_id: &str,
    ) -> Result<Templates, TemplateError> {
        if !template_id.is_empty() {
            return self.require(template_id).await;
        }

        if !kind_id.is_empty()
            && let Some(assigned) = self
                .repo
                .find_assigned_id(client_id, Some(kind_id))
                .await
                .map_err(unavailable)?
        {
            return self.require(&assigned).await;
        }

        if let Some(assigned) = self
            .repo
            .find_assigned_id(client_id, None)
            .await
            .map_err(unavailable)?
        {
            return self.require(&assigned).await;
        }

        Ok(self
            .repo
            .find_by_id(DEFAULT_TEMPLATE_ID)
            .await
            .map_err(unavailable)?
            .unwrap_or_else(Templates::builtin))
    }

    async fn require(&self, id: &str) -> Result<Templates, TemplateError> {
        self.repo
            .find_by_id(id)
            .await
            .map_err(unavailable)?
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))
    }
}
