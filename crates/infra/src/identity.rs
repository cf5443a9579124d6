//! # ID プロバイダクライアント（UAA）
//!
//! クライアントクレデンシャルでアクセストークンを取得し、ユーザー GUID から
//! メールアドレスを解決する。`everyone` オーディエンスの展開（全ユーザー GUID の
//! 列挙）もここで行う。
//!
//! ## エラーの分類
//!
//! | 状況 | エラー | 配信プロセスでの扱い |
//! |------|--------|----------------------|
//! | 接続失敗・タイムアウト・5xx | `Unavailable` | リトライ |
//! | 404 | `NotFound` | 配信不能 |
//! | その他（401, 不正なレスポンス等） | `Failure` | リトライ |

use std::time::Duration;

use async_trait::async_trait;
use hikyaku_domain::identity::{AccessToken, IdentityError, UserEmails};
use serde::Deserialize;
use url::Url;

/// 全ユーザー列挙時の 1 ページあたり件数
const PAGE_SIZE: usize = 500;

/// ID プロバイダトレイト
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// アクセストークンを取得する
    ///
    /// `uaa_host` が空の場合は既定のホストを使う。
    async fn access_token(&self, uaa_host: &str) -> Result<AccessToken, IdentityError>;

    /// ユーザー GUID からメールアドレスを解決する
    ///
    /// 存在しないユーザーは結果のマップに含まれない。
    async fn user_emails(
        &self,
        token: &AccessToken,
        guids: &[String],
    ) -> Result<UserEmails, IdentityError>;

    /// 全ユーザーの GUID を列挙する
    async fn all_user_guids(&self, token: &AccessToken) -> Result<Vec<String>, IdentityError>;
}

/// `host` と `path` を連結して URL を作る
///
/// `host` にパスが含まれていても保持する（`Url::join` と異なり置き換えない）。
pub(crate) fn endpoint(host: &str, path: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!(
        "{}/{}",
        host.trim_end_matches('/'),
        path.trim_start_matches('/')
    ))
}

/// HTTP ステータスを ID プロバイダエラーに分類する
fn classify_status(status: reqwest::StatusCode, body: String) -> IdentityError {
    if status == reqwest::StatusCode::NOT_FOUND {
        IdentityError::NotFound(body)
    } else if status.is_server_error() {
        IdentityError::Unavailable(format!("ステータス {status}: {body}"))
    } else {
        IdentityError::Failure(format!("ステータス {status}: {body}"))
    }
}

fn classify_transport(err: reqwest::Error) -> IdentityError {
    if err.is_decode() {
        IdentityError::Failure(format!("レスポンスの形式が不正: {err}"))
    } else {
        IdentityError::Unavailable(err.to_string())
    }
}

async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, IdentityError> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(classify_transport);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, body))
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct ScimUsers {
    #[serde(default, rename = "totalResults")]
    total_results: usize,
    #[serde(default)]
    resources: Vec<ScimUser>,
}

#[derive(Deserialize)]
struct ScimUser {
    id:     String,
    #[serde(default)]
    emails: Vec<ScimEmail>,
}

#[derive(Deserialize)]
struct ScimEmail {
    value:   String,
    #[serde(default)]
    primary: bool,
}

impl ScimUser {
    /// プライマリのアドレスを先頭にしたアドレス一覧
    fn into_addresses(self) -> (String, Vec<String>) {
        let mut emails = self.emails;
        emails.sort_by_key(|email| !email.primary);
        (self.id, emails.into_iter().map(|email| email.value).collect())
    }
}

/// UAA 実装の IdentityProvider
pub struct UaaIdentityProvider {
    client:        reqwest::Client,
    default_host:  String,
    client_id:     String,
    client_secret: String,
}

impl UaaIdentityProvider {
    pub fn new(
        default_host: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| IdentityError::Failure(format!("HTTP クライアント構築失敗: {e}")))?;
        Ok(Self {
            client,
            default_host: default_host.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        })
    }

    fn url(host: &str, path: &str) -> Result<Url, IdentityError> {
        endpoint(host, path)
            .map_err(|e| IdentityError::Failure(format!("不正な UAA ホスト {host}: {e}")))
    }
}

#[async_trait]
impl IdentityProvider for UaaIdentityProvider {
    #[tracing::instrument(skip_all, level = "debug")]
    async fn access_token(&self, uaa_host: &str) -> Result<AccessToken, IdentityError> {
        let host = if uaa_host.is_empty() {
            self.default_host.as_str()
        } else {
            uaa_host
        };

        let response = self
            .client
            .post(Self::url(host, "/oauth/token")?)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(classify_transport)?;
        let token: TokenResponse = handle_response(response).await?;

        Ok(AccessToken {
            host:  host.to_string(),
            value: token.access_token,
        })
    }

    #[tracing::instrument(skip_all, level = "debug", fields(count = guids.len()))]
    async fn user_emails(
        &self,
        token: &AccessToken,
        guids: &[String],
    ) -> Result<UserEmails, IdentityError> {
        if guids.is_empty() {
            return Ok(UserEmails::new());
        }
        let filter = guids
            .iter()
            .map(|guid| format!(r#"id eq "{guid}""#))
            .collect::<Vec<_>>()
            .join(" or ");

        let response = self
            .client
            .get(Self::url(&token.host, "/Users")?)
            .bearer_auth(&token.value)
            .query(&[("filter", filter.as_str()), ("attributes", "id,emails")])
            .send()
            .await
            .map_err(classify_transport)?;
        let users: ScimUsers = handle_response(response).await?;

        Ok(users
            .resources
            .into_iter()
            .map(ScimUser::into_addresses)
            .collect())
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn all_user_guids(&self, token: &AccessToken) -> Result<Vec<String>, IdentityError> {
        let url = Self::url(&token.host, "/Users")?;
        let mut guids = Vec::new();
        loop {
            // SCIM の startIndex は 1 始まり
            let start_index = (guids.len() + 1).to_string();
            let count = PAGE_SIZE.to_string();
            let response = self
                .client
                .get(url.clone())
                .bearer_auth(&token.value)
                .query(&[
                    ("attributes", "id"),
                    ("startIndex", start_index.as_str()),
                    ("count", count.as_str()),
                ])
                .send()
                .await
                .map_err(classify_transport)?;
            let page: ScimUsers = handle_response(response).await?;

            let fetched = page.resources.len();
            guids.extend(page.resources.into_iter().map(|user| user.id));
            if fetched == 0 || guids.len() >= page.total_results {
                break;
            }
        }

        Ok(guids)
    }
}
