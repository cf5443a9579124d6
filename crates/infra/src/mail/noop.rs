//! Noop メール転送実装
//!
//! メールを実際に送信せず、ログ出力のみ行う。

use async_trait::async_trait;
use hikyaku_domain::mail::{MailError, MailMessage};

use super::MailTransport;

/// Noop メール転送（ログ出力のみ）
#[derive(Debug, Clone)]
pub struct NoopMailTransport;

#[async_trait]
impl MailTransport for NoopMailTransport {
    async fn connect(&self) -> Result<(), MailError> {
        Ok(())
    }

    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            message_id = %message.message_id,
            "Noop: メール送信をスキップ"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hikyaku_domain::mail::MailBody;

    use super::*;

    #[tokio::test]
    async fn sendがエラーを返さない() {
        let transport = NoopMailTransport;
        let message = MailMessage {
            from:       "no-reply@example.com".into(),
            reply_to:   None,
            to:         "test@example.com".into(),
            subject:    "テスト件名".into(),
            body:       MailBody::new(Some("テスト".into()), None).unwrap(),
            message_id: "<1@example.com>".into(),
            headers:    Vec::new(),
        };

        assert!(transport.connect().await.is_ok());
        assert!(transport.send(&message).await.is_ok());
    }
}
