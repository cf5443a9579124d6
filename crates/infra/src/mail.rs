//! # メール転送
//!
//! 配信プロセスからメールゲートウェイへの送信を担当する。
//!
//! - **trait による抽象化**: [`MailTransport`] で接続確認と送信を分離する。
//!   接続失敗（ゲートウェイ利用不可）と送信失敗を配信プロセスが区別できる
//! - **3 つの実装**: SMTP（lettre）、SES（v2 API の raw 送信）、Noop（ログのみ）
//! - **環境変数切替**: `MAIL_BACKEND` でランタイム選択
//!
//! SMTP と SES は同じ MIME メッセージ（[`build_mime`]）を送るため、
//! トレーシングヘッダーはどちらのバックエンドでも同一になる。

mod noop;
mod ses;
mod smtp;

use async_trait::async_trait;
use hikyaku_domain::mail::{MailError, MailMessage};
use lettre::message::{
    Mailbox,
    Message,
    MultiPart,
    SinglePart,
    header::{HeaderName, HeaderValue},
};
pub use noop::NoopMailTransport;
pub use ses::SesMailTransport;
pub use smtp::SmtpMailTransport;

/// メール転送トレイト
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// ゲートウェイへの接続を確認する
    ///
    /// 失敗は [`MailError::Unavailable`]。
    async fn connect(&self) -> Result<(), MailError>;

    /// メールを送信する
    async fn send(&self, message: &MailMessage) -> Result<(), MailError>;
}

/// 宛先アドレスをパースする
///
/// 失敗はこの宛先に固有の問題なので [`MailError::InvalidAddress`]。
fn parse_recipient(raw: &str) -> Result<Mailbox, MailError> {
    raw.parse()
        .map_err(|e| MailError::InvalidAddress(format!("{raw}: {e}")))
}

/// 送信元・返信先アドレスをパースする
///
/// 送信元は設定、返信先はキャンペーンが決めるため、失敗は宛先に関係なく
/// 同じキャンペーンの全メッセージで起きる。[`MailError::Build`] として扱う。
fn parse_originator(field: &str, raw: &str) -> Result<Mailbox, MailError> {
    raw.parse()
        .map_err(|e| MailError::Build(format!("{field} のアドレスが不正です: {raw}: {e}")))
}

/// MIME メッセージを組み立てる
///
/// テキスト・HTML の両方があれば `multipart/alternative`、片方だけなら単一パート。
pub(crate) fn build_mime(message: &MailMessage) -> Result<Message, MailError> {
    let mut builder = Message::builder()
        .from(parse_originator("From", &message.from)?)
        .to(parse_recipient(&message.to)?)
        .subject(message.subject.as_str())
        .message_id(Some(message.message_id.clone()));

    if let Some(reply_to) = &message.reply_to {
        builder = builder.reply_to(parse_originator("Reply-To", reply_to)?);
    }
    for (name, value) in &message.headers {
        builder = builder.raw_header(HeaderValue::new(
            HeaderName::new_from_ascii_str(*name),
            value.clone(),
        ));
    }

    let built = match (message.body.text(), message.body.html()) {
        (Some(text), Some(html)) => builder.multipart(MultiPart::alternative_plain_html(
            text.to_string(),
            html.to_string(),
        )),
        (Some(text), None) => builder.singlepart(SinglePart::plain(text.to_string())),
        (None, Some(html)) => builder.singlepart(SinglePart::html(html.to_string())),
        (None, None) => {
            return Err(MailError::Build("本文がありません".to_string()));
        }
    };

    built.map_err(|e| MailError::Build(e.to_string()))
}
