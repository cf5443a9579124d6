//! # リソースディレクトリクライアント
//!
//! スペース・組織に所属するユーザーの GUID を列挙する（Cloud Controller v3 API）。
//! ページングは `pagination.next.href` をたどる。

use std::{collections::HashSet, time::Duration};

use async_trait::async_trait;
use hikyaku_domain::{directory::DirectoryError, identity::AccessToken};
use serde::Deserialize;
use url::Url;

use crate::identity::endpoint;

/// リソースディレクトリトレイト
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// スペースに所属するユーザーの GUID
    async fn space_user_guids(
        &self,
        token: &AccessToken,
        space_guid: &str,
    ) -> Result<Vec<String>, DirectoryError>;

    /// 組織に所属するユーザーの GUID
    async fn org_user_guids(
        &self,
        token: &AccessToken,
        org_guid: &str,
    ) -> Result<Vec<String>, DirectoryError>;
}

#[derive(Deserialize)]
struct RolesPage {
    #[serde(default)]
    pagination: Pagination,
    #[serde(default)]
    resources:  Vec<Role>,
}

#[derive(Default, Deserialize)]
struct Pagination {
    next: Option<Link>,
}

#[derive(Deserialize)]
struct Link {
    href: String,
}

#[derive(Deserialize)]
struct Role {
    relationships: RoleRelationships,
}

#[derive(Deserialize)]
struct RoleRelationships {
    user: Relationship,
}

#[derive(Deserialize)]
struct Relationship {
    data: RelationshipData,
}

#[derive(Deserialize)]
struct RelationshipData {
    guid: String,
}

/// 重複を除き、出現順を保ってユーザー GUID を集める
fn collect_user_guids(pages: impl IntoIterator<Item = RolesPage>) -> Vec<String> {
    let mut seen = HashSet::new();
    pages
        .into_iter()
        .flat_map(|page| page.resources)
        .map(|role| role.relationships.user.data.guid)
        .filter(|guid| seen.insert(guid.clone()))
        .collect()
}

fn classify_status(status: reqwest::StatusCode, body: String) -> DirectoryError {
    if status == reqwest::StatusCode::NOT_FOUND {
        DirectoryError::NotFound(body)
    } else if status.is_server_error() {
        DirectoryError::Unavailable(format!("ステータス {status}: {body}"))
    } else {
        DirectoryError::Failure(format!("ステータス {status}: {body}"))
    }
}

fn classify_transport(err: reqwest::Error) -> DirectoryError {
    if err.is_decode() {
        DirectoryError::Failure(format!("レスポンスの形式が不正: {err}"))
    } else {
        DirectoryError::Unavailable(err.to_string())
    }
}

/// Cloud Controller 実装の DirectoryClient
pub struct CloudControllerDirectory {
    client: reqwest::Client,
    host:   String,
}

impl CloudControllerDirectory {
    pub fn new(host: impl Into<String>) -> Result<Self, DirectoryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DirectoryError::Failure(format!("HTTP クライアント構築失敗: {e}")))?;
        Ok(Self {
            client,
            host: host.into(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, DirectoryError> {
        endpoint(&self.host, path)
            .map_err(|e| DirectoryError::Failure(format!("不正なディレクトリホスト: {e}")))
    }

    async fn get(&self, token: &AccessToken, url: Url) -> Result<reqwest::Response, DirectoryError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&token.value)
            .send()
            .await
            .map_err(classify_transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, body))
    }

    /// リソースの存在を確認してから、ロール一覧をページングしてユーザーを集める
    async fn members(
        &self,
        token: &AccessToken,
        resource_path: &str,
        filter: (&str, &str),
    ) -> Result<Vec<String>, DirectoryError> {
        self.get(token, self.url(resource_path)?).await?;

        let mut url = self.url("/v3/roles")?;
        url.query_pairs_mut()
            .append_pair(filter.0, filter.1)
            .append_pair("per_page", "5000");

        let mut pages = Vec::new();
        let mut next = Some(url);
        while let Some(url) = next.take() {
            let page: RolesPage = self
                .get(token, url)
                .await?
                .json()
                .await
                .map_err(classify_transport)?;
            next = page
                .pagination
                .next
                .as_ref()
                .map(|link| Url::parse(&link.href))
                .transpose()
                .map_err(|e| DirectoryError::Failure(format!("不正なページング URL: {e}")))?;
            pages.push(page);
        }

        Ok(collect_user_guids(pages))
    }
}

#[async_trait]
impl DirectoryClient for CloudControllerDirectory {
    #[tracing::instrument(skip_all, level = "debug", fields(%space_guid))]
    async fn space_user_guids(
        &self,
        token: &AccessToken,
        space_guid: &str,
    ) -> Result<Vec<String>, DirectoryError> {
        self.members(
            token,
            &format!("/v3/spaces/{space_guid}"),
            ("space_guids", space_guid),
        )
        .await
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%org_guid))]
    async fn org_user_guids(
        &self,
        token: &AccessToken,
        org_guid: &str,
    ) -> Result<Vec<String>, DirectoryError> {
        self.members(
            token,
            &format!("/v3/organizations/{org_guid}"),
            ("organization_guids", org_guid),
        )
        .await
    }
}
