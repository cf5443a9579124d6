//! # パッケージャー
//!
//! テンプレートを配信コンテキストでレンダリングし、送信用の [`MailMessage`] を組み立てる。
//!
//! - 件名・テキストパートは変数をそのまま埋め込む
//! - HTML パートはテキスト由来の変数（件名、本文、説明文など）を HTML エスケープし、
//!   HTML 本文の構成要素（`html`、`html_head` など）はそのまま埋め込む
//! - テキストパートはテキスト本文があるとき、HTML パートは HTML 本文があるときだけ作る。
//!   どちらも作れなければレンダリング失敗として扱う

use chrono::{DateTime, Utc};
use hikyaku_domain::{
    delivery::Delivery,
    mail::{MailBody, MailMessage, header},
    template::{TemplateError, Templates},
};
use tera::{Context, Tera};

pub struct Packager {
    sender:          String,
    delivery_domain: String,
}

impl Packager {
    pub fn new(sender: impl Into<String>, delivery_domain: impl Into<String>) -> Self {
        Self {
            sender:          sender.into(),
            delivery_domain: delivery_domain.into(),
        }
    }

    /// 配信 1 件分のメールを組み立てる
    pub fn pack(
        &self,
        delivery: &Delivery,
        to: &str,
        templates: &Templates,
        now: DateTime<Utc>,
    ) -> Result<MailMessage, TemplateError> {
        let options = &delivery.options;
        let plain = context(delivery, to, false);

        let subject = render(&templates.subject, &plain)?;
        let text = if options.text.trim().is_empty() {
            None
        } else {
            Some(render(&templates.text, &plain)?)
        };
        let html = if options.html.is_empty() {
            None
        } else {
            Some(render(&templates.html, &context(delivery, to, true))?)
        };
        let body = MailBody::new(text, html).map_err(|e| TemplateError::Render(e.to_string()))?;

        Ok(MailMessage {
            from: self.sender.clone(),
            reply_to: Some(options.reply_to.trim())
                .filter(|reply_to| !reply_to.is_empty())
                .map(str::to_string),
            to: to.to_string(),
            subject: subject.trim().to_string(),
            body,
            message_id: format!("<{}@{}>", delivery.message_id, self.delivery_domain),
            headers: tracing_headers(delivery, now),
        })
    }
}

fn tracing_headers(delivery: &Delivery, now: DateTime<Utc>) -> Vec<(&'static str, String)> {
    let mut headers = vec![
        (header::CLIENT_ID, delivery.client_id.clone()),
        (header::NOTIFICATION_ID, delivery.message_id.to_string()),
        (header::TIMESTAMP, now.to_rfc3339()),
    ];
    if let Some(received) = delivery.request_received {
        headers.push((header::REQUEST_RECEIVED, received.to_rfc3339()));
    }
    if !delivery.vcap_request_id.is_empty() {
        headers.push((header::REQUEST_ID, delivery.vcap_request_id.clone()));
    }
    headers
}

fn context(delivery: &Delivery, to: &str, for_html: bool) -> Context {
    let escape = |value: &str| {
        if for_html {
            tera::escape_html(value)
        } else {
            value.to_string()
        }
    };
    let options = &delivery.options;

    let mut context = Context::new();
    context.insert("subject", &escape(&options.subject));
    context.insert("text", &escape(&options.text));
    context.insert("endorsement", &escape(&options.endorsement));
    context.insert("kind_id", &escape(&options.kind_id));
    context.insert("kind_description", &escape(&options.kind_description));
    context.insert("source_description", &escape(&options.source_description));
    context.insert("client_id", &escape(&delivery.client_id));
    context.insert("message_id", &delivery.message_id.to_string());
    context.insert("user_guid", &escape(delivery.user_guid().unwrap_or_default()));
    context.insert("to", &escape(to));
    context.insert("html", &options.html.body_content);
    context.insert("html_doctype", &options.html.doctype);
    context.insert("html_head", &options.html.head);
    context.insert("html_body_attributes", &options.html.body_attributes);
    context
}

fn render(template: &str, context: &Context) -> Result<String, TemplateError> {
    Tera::one_off(template, context, false).map_err(|e| TemplateError::Render(e.to_string()))
}

#[cfg(test)]
mod tests {
    use hikyaku_domain::{
        delivery::{DeliveryOptions, HtmlParts},
        message::MessageId,
    };
    use pretty_assertions::assert_eq;

    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn delivery(text: &str, body_content: &str) -> Delivery {
        Delivery {
            message_id:        MessageId::new(),
            campaign_id:       None,
            client_id:         "client-1".into(),
            user_guid:         Some("user-1".into()),
            email:             None,
            space_guid:        None,
            organization_guid: None,
            options:           DeliveryOptions {
                reply_to: "support@x.com".into(),
                subject: "メンテナンス <予告>".into(),
                text: text.into(),
                html: HtmlParts {
                    body_content: body_content.into(),
                    ..Default::default()
                },
                kind_id: "maintenance".into(),
                endorsement: "A & B の利用者へ".into(),
                ..Default::default()
            },
            uaa_host:          String::new(),
            scope:             String::new(),
            vcap_request_id:   "req-1".into(),
            request_received:  Some(t0()),
        }
    }

    fn packager() -> Packager {
        Packager::new("no-reply@example.com", "hikyaku.example.com")
    }

    #[test]
    fn テキストとhtmlの両方をレンダリングする() {
        let delivery = delivery("明日停止します", "<h1>Hi</h1>");

        let message = packager()
            .pack(&delivery, "a@x.com", &Templates::builtin(), t0())
            .unwrap();

        assert_eq!(message.subject, "メンテナンス <予告>");
        assert_eq!(
            message.body.text(),
            Some("明日停止します\n\nA & B の利用者へ")
        );
        let html = message.body.html().unwrap();
        assert!(html.contains("<h1>Hi</h1>"), "{html}");
        assert!(html.contains("A &amp; B の利用者へ"), "{html}");
    }

    #[test]
    fn html本文がなければテキストパートのみになる() {
        let message = packager()
            .pack(&delivery("本文", ""), "a@x.com", &Templates::builtin(), t0())
            .unwrap();

        assert!(message.body.text().is_some());
        assert_eq!(message.body.html(), None);
    }

    #[test]
    fn テキストもhtmlもなければrenderエラーになる() {
        let result = packager().pack(&delivery("", ""), "a@x.com", &Templates::builtin(), t0());

        assert!(matches!(result, Err(TemplateError::Render(_))));
    }

    #[test]
    fn 構文エラーのテンプレートはrenderエラーになる() {
        let broken = Templates {
            subject: "{{ subject".into(),
            ..Templates::builtin()
        };

        let result = packager().pack(&delivery("本文", ""), "a@x.com", &broken, t0());

        assert!(matches!(result, Err(TemplateError::Render(_))));
    }

    #[test]
    fn トレーシングヘッダーとmessage_idを付与する() {
        let delivery = delivery("本文", "");

        let message = packager()
            .pack(&delivery, "a@x.com", &Templates::builtin(), t0())
            .unwrap();

        let id = delivery.message_id.to_string();
        assert_eq!(message.message_id, format!("<{id}@hikyaku.example.com>"));
        assert_eq!(message.header(header::CLIENT_ID), Some("client-1"));
        assert_eq!(message.header(header::NOTIFICATION_ID), Some(id.as_str()));
        assert_eq!(
            message.header(header::TIMESTAMP),
            Some(t0().to_rfc3339().as_str())
        );
        assert_eq!(
            message.header(header::REQUEST_RECEIVED),
            Some(t0().to_rfc3339().as_str())
        );
        assert_eq!(message.header(header::REQUEST_ID), Some("req-1"));
        assert_eq!(message.reply_to.as_deref(), Some("support@x.com"));
        assert_eq!(message.from, "no-reply@example.com");
    }
}
