//! # ID プロバイダ（UAA）
//!
//! ユーザー GUID からメールアドレスを解決する外部協調者の契約上の型。
//!
//! エラーは「サービス利用不可」「見つからない」「その他」を区別する。
//! 配信プロセスはこれをリトライ（利用不可・その他）と
//! 配信不能（見つからない）に振り分ける。

use std::collections::HashMap;

use thiserror::Error;

/// ユーザー GUID → メールアドレス一覧
pub type UserEmails = HashMap<String, Vec<String>>;

/// ID プロバイダが発行したアクセストークン
///
/// 発行元ホストを保持し、後続のユーザー検索を同じホストに向ける。
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub host:  String,
    pub value: String,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("host", &self.host)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// ID プロバイダ呼び出しのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// サービスに到達できない、または 5xx
    #[error("ID プロバイダに接続できません: {0}")]
    Unavailable(String),

    /// ユーザーが存在しない
    #[error("ユーザーが見つかりません: {0}")]
    NotFound(String),

    /// その他の失敗（認証失敗、レスポンス不正など）
    #[error("ID プロバイダの呼び出しに失敗: {0}")]
    Failure(String),
}

impl IdentityError {
    /// リトライで回復し得るエラーかどうか
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_tokenのdebug出力はトークン値を伏せる() {
        let token = AccessToken {
            host:  "https://uaa.example.com".into(),
            value: "secret-token".into(),
        };

        let debug = format!("{token:?}");

        assert!(debug.contains("uaa.example.com"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn not_found以外は一時的なエラーとして扱う() {
        assert!(IdentityError::Unavailable("timeout".into()).is_transient());
        assert!(IdentityError::Failure("401".into()).is_transient());
        assert!(!IdentityError::NotFound("user-1".into()).is_transient());
    }
}
