//! # メールメッセージ
//!
//! テンプレートレンダリングの出力で、メール転送（SMTP / SES / Noop）に渡される。
//!
//! ## 設計方針
//!
//! - **本文は片方だけでもよい**: プレーンテキスト部・HTML 部はそれぞれ任意だが、
//!   少なくとも一方は必須（[`MailBody::new`] で強制）
//! - **トレーシングヘッダー**: クライアント ID・通知 ID・タイムスタンプ・
//!   元リクエスト受信時刻をヘッダーに載せる

use thiserror::Error;

use crate::DomainError;

/// トレーシングヘッダー名
pub mod header {
    pub const CLIENT_ID: &str = "X-Hikyaku-Client-Id";
    pub const NOTIFICATION_ID: &str = "X-Hikyaku-Notification-Id";
    pub const TIMESTAMP: &str = "X-Hikyaku-Notification-Timestamp";
    pub const REQUEST_RECEIVED: &str = "X-Hikyaku-Notification-Request-Received";
    pub const REQUEST_ID: &str = "X-Vcap-Request-Id";
}

/// メール本文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailBody {
    text: Option<String>,
    html: Option<String>,
}

impl MailBody {
    /// 本文を作成する
    ///
    /// 空文字列のパートは存在しないものとして扱う。両方とも空ならエラー。
    pub fn new(text: Option<String>, html: Option<String>) -> Result<Self, DomainError> {
        let text = text.filter(|t| !t.trim().is_empty());
        let html = html.filter(|h| !h.trim().is_empty());
        if text.is_none() && html.is_none() {
            return Err(DomainError::Validation(
                "テキスト本文と HTML 本文の少なくとも一方が必要です".to_string(),
            ));
        }
        Ok(Self { text, html })
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn html(&self) -> Option<&str> {
        self.html.as_deref()
    }
}

/// 送信用メールメッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from:       String,
    pub reply_to:   Option<String>,
    pub to:         String,
    pub subject:    String,
    pub body:       MailBody,
    /// `Message-ID` ヘッダー値（山括弧を含む）
    pub message_id: String,
    /// 追加ヘッダー（名前, 値）
    pub headers:    Vec<(&'static str, String)>,
}

impl MailMessage {
    /// 追加ヘッダーの値を取得する
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// メール送信エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailError {
    /// メールゲートウェイに接続できない
    #[error("メールゲートウェイに接続できません: {0}")]
    Unavailable(String),

    /// 送信に失敗
    #[error("メール送信に失敗: {0}")]
    SendFailed(String),

    /// ゲートウェイが恒久的に拒否した（SMTP の 5xx 応答）
    ///
    /// 同じメッセージを再送しても結果は変わらない。
    #[error("メールゲートウェイが拒否しました: {0}")]
    Rejected(String),

    /// アドレスがメールゲートウェイで受理されない形式
    #[error("メールアドレスが不正です: {0}")]
    InvalidAddress(String),

    /// MIME メッセージの組み立てに失敗
    #[error("メッセージ構築に失敗: {0}")]
    Build(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn 本文は少なくとも一方が必要() {
        assert!(MailBody::new(None, None).is_err());
        assert!(MailBody::new(Some("  ".into()), Some(String::new())).is_err());
    }

    #[test]
    fn 空のパートは存在しないものとして扱う() {
        let body = MailBody::new(Some("本文".into()), Some(String::new())).unwrap();

        assert_eq!(body.text(), Some("本文"));
        assert_eq!(body.html(), None);
    }

    #[test]
    fn headerは大文字小文字を区別せずに引ける() {
        let message = MailMessage {
            from:       "from@example.com".into(),
            reply_to:   None,
            to:         "to@example.com".into(),
            subject:    "件名".into(),
            body:       MailBody::new(Some("本文".into()), None).unwrap(),
            message_id: "<id@example.com>".into(),
            headers:    vec![(header::CLIENT_ID, "client-1".into())],
        };

        assert_eq!(message.header("x-hikyaku-client-id"), Some("client-1"));
        assert_eq!(message.header("X-Unknown"), None);
    }
}
