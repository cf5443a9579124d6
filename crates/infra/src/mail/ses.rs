//! SES メール転送実装
//!
//! AWS SES v2 API の raw 送信を使う。SMTP と同じ MIME メッセージを送るため、
//! トレーシングヘッダーがそのまま届く。

use async_trait::async_trait;
use aws_sdk_sesv2::{
    Client,
    primitives::Blob,
    types::{Destination, EmailContent, RawMessage},
};
use hikyaku_domain::mail::{MailError, MailMessage};

use super::{MailTransport, build_mime};

/// SES メール転送
pub struct SesMailTransport {
    client: Client,
}

impl SesMailTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MailTransport for SesMailTransport {
    /// SES は HTTP API のため、送信前に張っておく接続はない
    async fn connect(&self) -> Result<(), MailError> {
        Ok(())
    }

    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        let mime = build_mime(message)?;
        let raw = RawMessage::builder()
            .data(Blob::new(mime.formatted()))
            .build()
            .map_err(|e| MailError::Build(format!("raw メッセージ構築失敗: {e}")))?;

        self.client
            .send_email()
            .from_email_address(&message.from)
            .destination(Destination::builder().to_addresses(&message.to).build())
            .content(EmailContent::builder().raw(raw).build())
            .send()
            .await
            .map_err(|e| MailError::SendFailed(format!("SES 送信失敗: {e}")))?;

        Ok(())
    }
}
