//! SMTP メール転送実装
//!
//! lettre の `AsyncSmtpTransport` を使用する。
//! 開発環境ではローカルの SMTP サーバー（Mailpit 等）に接続する。
//!
//! 送信エラーは応答コードで分類する。5xx（恒久的な拒否）は [`MailError::Rejected`]、
//! それ以外（4xx・接続断・タイムアウト）は [`MailError::SendFailed`] として再送に回す。

use async_trait::async_trait;
use hikyaku_domain::mail::{MailError, MailMessage};
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor, transport::smtp};

use super::{MailTransport, build_mime};

/// SMTP メール転送
pub struct SmtpMailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailTransport {
    /// 新しい SMTP 転送インスタンスを作成する
    ///
    /// TLS なしで接続する（ローカル SMTP やサイドカーのリレー向け）。
    pub fn new(host: &str, port: u16) -> Self {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(port)
            .build();

        Self { transport }
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn connect(&self) -> Result<(), MailError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(MailError::Unavailable(
                "SMTP サーバーが応答しません".to_string(),
            )),
            Err(e) => Err(MailError::Unavailable(format!("SMTP 接続失敗: {e}"))),
        }
    }

    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        let mime = build_mime(message)?;

        self.transport.send(mime).await.map_err(classify)?;

        Ok(())
    }
}

fn classify(err: smtp::Error) -> MailError {
    if err.is_permanent() {
        MailError::Rejected(format!("SMTP 送信拒否: {err}"))
    } else {
        MailError::SendFailed(format!("SMTP 送信失敗: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use hikyaku_domain::mail::MailBody;

    use super::*;

    #[test]
    fn トレイトはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SmtpMailTransport>();
    }

    #[tokio::test]
    async fn 接続できないサーバーへの送信は再送対象のsend_failedになる() {
        let transport = SmtpMailTransport::new("127.0.0.1", 1);
        let message = MailMessage {
            from:       "no-reply@example.com".into(),
            reply_to:   None,
            to:         "user@example.com".into(),
            subject:    "お知らせ".into(),
            body:       MailBody::new(Some("本文".into()), None).unwrap(),
            message_id: "<abc@hikyaku.example.com>".into(),
            headers:    vec![],
        };

        let result = transport.send(&message).await;

        assert!(matches!(result, Err(MailError::SendFailed(_))));
    }
}
