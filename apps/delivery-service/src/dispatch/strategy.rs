//! # オーディエンス戦略
//!
//! オーディエンス種別ごとに宛先を展開するハンドラ。ディスパッチャは
//! [`StrategyTable`] で種別からハンドラを引く。
//!
//! | 種別 | 宛先 | 解決に使う協調者 |
//! |------|------|------------------|
//! | `users` | GUID 1 件 | なし |
//! | `spaces` | スペースのメンバーの GUID | リソースディレクトリ |
//! | `orgs` | 組織のメンバーの GUID | リソースディレクトリ |
//! | `emails` | 整形済みアドレス（GUID なし） | なし |
//! | `everyone` | 全ユーザーの GUID | ID プロバイダ |

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use hikyaku_domain::{
    campaign::{AudienceKind, AudienceTarget},
    recipient::Recipient,
};
use hikyaku_infra::{directory::DirectoryClient, identity::IdentityProvider};

use super::DispatchError;

/// 展開済みのオーディエンス
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Audience {
    pub recipients:        Vec<Recipient>,
    /// 「なぜこのメールが届いたか」の説明文
    pub endorsement:       String,
    pub space_guid:        Option<String>,
    pub organization_guid: Option<String>,
}

/// オーディエンス戦略
#[async_trait]
pub trait AudienceStrategy: Send + Sync {
    /// 対象を宛先の一覧に展開する
    async fn expand(
        &self,
        target: &AudienceTarget,
        uaa_host: &str,
    ) -> Result<Audience, DispatchError>;
}

/// 種別 → 戦略の対応表
pub struct StrategyTable {
    strategies: HashMap<AudienceKind, Arc<dyn AudienceStrategy>>,
}

impl StrategyTable {
    /// 全種別の戦略を登録した表を作る
    pub fn new(identity: Arc<dyn IdentityProvider>, directory: Arc<dyn DirectoryClient>) -> Self {
        let mut strategies: HashMap<AudienceKind, Arc<dyn AudienceStrategy>> = HashMap::new();
        strategies.insert(AudienceKind::Users, Arc::new(UserStrategy));
        strategies.insert(
            AudienceKind::Spaces,
            Arc::new(SpaceStrategy {
                identity:  identity.clone(),
                directory: directory.clone(),
            }),
        );
        strategies.insert(
            AudienceKind::Orgs,
            Arc::new(OrgStrategy {
                identity: identity.clone(),
                directory,
            }),
        );
        strategies.insert(AudienceKind::Emails, Arc::new(EmailStrategy));
        strategies.insert(AudienceKind::Everyone, Arc::new(EveryoneStrategy { identity }));
        Self { strategies }
    }

    /// 戦略を差し替える
    pub fn with(mut self, kind: AudienceKind, strategy: Arc<dyn AudienceStrategy>) -> Self {
        self.strategies.insert(kind, strategy);
        self
    }

    /// タグ文字列から戦略を引く
    ///
    /// 未知のタグ、または戦略が登録されていない種別は [`DispatchError::NoStrategy`]。
    pub fn lookup(&self, tag: &str) -> Result<Arc<dyn AudienceStrategy>, DispatchError> {
        tag.parse::<AudienceKind>()
            .ok()
            .and_then(|kind| self.strategies.get(&kind).cloned())
            .ok_or_else(|| DispatchError::NoStrategy(tag.to_string()))
    }
}

fn single_guid<'a>(kind: &str, target: &'a AudienceTarget) -> Result<&'a str, DispatchError> {
    match target {
        AudienceTarget::Guid(guid) if !guid.trim().is_empty() => Ok(guid.as_str()),
        _ => Err(DispatchError::InvalidAudience(format!(
            "{kind} には GUID を 1 件指定してください"
        ))),
    }
}

fn users(guids: Vec<String>) -> Vec<Recipient> {
    guids.into_iter().map(Recipient::user).collect()
}

/// 単一ユーザー
pub struct UserStrategy;

#[async_trait]
impl AudienceStrategy for UserStrategy {
    async fn expand(
        &self,
        target: &AudienceTarget,
        _uaa_host: &str,
    ) -> Result<Audience, DispatchError> {
        let guid = single_guid("users", target)?;
        Ok(Audience {
            recipients:        vec![Recipient::user(guid)],
            endorsement:       "このメールはあなたのアカウント宛てに送信されました。".to_string(),
            space_guid:        None,
            organization_guid: None,
        })
    }
}

/// スペースのメンバー全員
pub struct SpaceStrategy {
    identity:  Arc<dyn IdentityProvider>,
    directory: Arc<dyn DirectoryClient>,
}

#[async_trait]
impl AudienceStrategy for SpaceStrategy {
    async fn expand(
        &self,
        target: &AudienceTarget,
        uaa_host: &str,
    ) -> Result<Audience, DispatchError> {
        let space_guid = single_guid("spaces", target)?;
        let token = self.identity.access_token(uaa_host).await?;
        let guids = self.directory.space_user_guids(&token, space_guid).await?;
        Ok(Audience {
            recipients:        users(guids),
            endorsement:       format!(
                "このメールはスペース {space_guid} のメンバーであるため送信されました。"
            ),
            space_guid:        Some(space_guid.to_string()),
            organization_guid: None,
        })
    }
}

/// 組織のメンバー全員
pub struct OrgStrategy {
    identity:  Arc<dyn IdentityProvider>,
    directory: Arc<dyn DirectoryClient>,
}

#[async_trait]
impl AudienceStrategy for OrgStrategy {
    async fn expand(
        &self,
        target: &AudienceTarget,
        uaa_host: &str,
    ) -> Result<Audience, DispatchError> {
        let org_guid = single_guid("orgs", target)?;
        let token = self.identity.access_token(uaa_host).await?;
        let guids = self.directory.org_user_guids(&token, org_guid).await?;
        Ok(Audience {
            recipients:        users(guids),
            endorsement:       format!(
                "このメールは組織 {org_guid} のメンバーであるため送信されました。"
            ),
            space_guid:        None,
            organization_guid: Some(org_guid.to_string()),
        })
    }
}

/// メールアドレスのリスト
///
/// アドレスは個別に整形するが、妥当性はここでは判定しない。
/// 不正なアドレスも配信ジョブにし、配信時に配信不能として記録する。
pub struct EmailStrategy;

#[async_trait]
impl AudienceStrategy for EmailStrategy {
    async fn expand(
        &self,
        target: &AudienceTarget,
        _uaa_host: &str,
    ) -> Result<Audience, DispatchError> {
        let AudienceTarget::Emails(addresses) = target else {
            return Err(DispatchError::InvalidAudience(
                "emails にはメールアドレスのリストを指定してください".to_string(),
            ));
        };
        Ok(Audience {
            recipients:        addresses.iter().map(|raw| Recipient::email(raw)).collect(),
            endorsement:       "このメールはあなたのメールアドレス宛てに送信されました。"
                .to_string(),
            space_guid:        None,
            organization_guid: None,
        })
    }
}

/// 全ユーザー
pub struct EveryoneStrategy {
    identity: Arc<dyn IdentityProvider>,
}

#[async_trait]
impl AudienceStrategy for EveryoneStrategy {
    async fn expand(
        &self,
        _target: &AudienceTarget,
        uaa_host: &str,
    ) -> Result<Audience, DispatchError> {
        let token = self.identity.access_token(uaa_host).await?;
        let guids = self.identity.all_user_guids(&token).await?;
        Ok(Audience {
            recipients:        users(guids),
            endorsement:       "このメールはすべてのユーザーに送信されました。".to_string(),
            space_guid:        None,
            organization_guid: None,
        })
    }
}
