//! # 配信プロセス
//!
//! ワーカーが予約した配信 1 件を処理し、メッセージのステータスと
//! ジョブの扱い（[`Disposition`]）を決める。
//!
//! ## 状態遷移
//!
//! ```text
//! received → 受信記録 → 配信可否 → 宛先解決 → テンプレート → パッケージ → 送信
//!               │           │          │           │            │          │
//!               └ retry     └ undeliverable        └ failed      └ failed   └ delivered / retry
//! ```
//!
//! | 結果 | メッセージ | ジョブ |
//! |------|------------|--------|
//! | 送信成功 | `delivered` | 削除 |
//! | ポリシー（配信停止、アドレスなし・不正） | `undeliverable` | 削除 |
//! | 一時的な失敗 | `retry`（上限到達時は `failed`） | 再スケジュール（上限到達時はデッドレター） |
//! | 回復しない失敗（テンプレート） | `failed` | デッドレター |
//!
//! ステータスの書き込み失敗はログに残すだけで、配信結果には影響させない。
//! 書き込み失敗を理由に再配信すると重複送信になるため。
//!
//! ステータスはジョブの予約（[`Lease`]）を保持している間だけ書き込む。
//! 可視性タイムアウトで別のワーカーに再予約されたジョブの古い結果や、
//! 既に終端ステータスに達したメッセージへの書き込みは反映されない。

pub mod packager;
pub mod templates;

use std::sync::Arc;

use hikyaku_domain::{
    clock::Clock,
    delivery::Delivery,
    identity::IdentityError,
    job::Lease,
    mail::MailError,
    message::MessageStatus,
    recipient::{first_deliverable, is_deliverable_address},
    template::TemplateError,
    unsubscribe::ReceiptKey,
};
use hikyaku_infra::{
    InfraError,
    identity::IdentityProvider,
    mail::MailTransport,
    repository::{
        CampaignTypeRepository,
        MessageRepository,
        ReceiptRepository,
        UnsubscribeRepository,
    },
};
use hikyaku_shared::{
    event_log::{error, event},
    log_business_event,
};
pub use packager::Packager;
pub use templates::TemplateLoader;

/// ジョブの扱い
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// 処理完了。ジョブを削除する
    Complete,
    /// バックオフつきで再スケジュールする
    Retry,
    /// デッドレターへ移動する
    DeadLetter(String),
}

/// 配信 1 件の処理結果
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Delivered,
    /// ポリシーによる配信不能（エラーではない）
    Undeliverable(String),
    /// リトライで回復し得る失敗
    Transient(Failure),
    /// リトライしても回復しない失敗
    Fatal(Failure),
}

/// 失敗の発生源と理由
#[derive(Debug, Clone, PartialEq, Eq)]
struct Failure {
    kind:   &'static str,
    reason: String,
}

impl Failure {
    fn new(kind: &'static str, reason: impl std::fmt::Display) -> Self {
        Self {
            kind,
            reason: reason.to_string(),
        }
    }

    fn category(&self) -> &'static str {
        match self.kind {
            error::kind::DATABASE => error::category::INFRASTRUCTURE,
            error::kind::TEMPLATE => error::category::CONTENT,
            _ => error::category::EXTERNAL_SERVICE,
        }
    }
}

impl From<InfraError> for Outcome {
    fn from(e: InfraError) -> Self {
        Self::Transient(Failure::new(error::kind::DATABASE, e))
    }
}

impl From<TemplateError> for Outcome {
    fn from(e: TemplateError) -> Self {
        let failure = Failure::new(error::kind::TEMPLATE, &e);
        if e.is_transient() {
            Self::Transient(failure)
        } else {
            Self::Fatal(failure)
        }
    }
}

impl From<IdentityError> for Outcome {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::NotFound(_) => Self::Undeliverable(e.to_string()),
            IdentityError::Unavailable(_) | IdentityError::Failure(_) => {
                Self::Transient(Failure::new(error::kind::IDENTITY_PROVIDER, e))
            }
        }
    }
}

impl From<MailError> for Outcome {
    fn from(e: MailError) -> Self {
        match e {
            MailError::InvalidAddress(_) => Self::Undeliverable(e.to_string()),
            MailError::Build(_) | MailError::Rejected(_) => {
                Self::Fatal(Failure::new(error::kind::MAIL_TRANSPORT, e))
            }
            MailError::Unavailable(_) | MailError::SendFailed(_) => {
                Self::Transient(Failure::new(error::kind::MAIL_TRANSPORT, e))
            }
        }
    }
}

/// 配信プロセスの依存コンポーネント
pub struct DeliveryDeps {
    pub messages:       Arc<dyn MessageRepository>,
    pub receipts:       Arc<dyn ReceiptRepository>,
    pub unsubscribes:   Arc<dyn UnsubscribeRepository>,
    pub campaign_types: Arc<dyn CampaignTypeRepository>,
    pub identity:       Arc<dyn IdentityProvider>,
    pub templates:      TemplateLoader,
    pub packager:       Packager,
    pub mail:           Arc<dyn MailTransport>,
    pub clock:          Arc<dyn Clock>,
}

/// 配信プロセス
pub struct DeliveryProcess {
    messages:       Arc<dyn MessageRepository>,
    receipts:       Arc<dyn ReceiptRepository>,
    unsubscribes:   Arc<dyn UnsubscribeRepository>,
    campaign_types: Arc<dyn CampaignTypeRepository>,
    identity:       Arc<dyn IdentityProvider>,
    templates:      TemplateLoader,
    packager:       Packager,
    mail:           Arc<dyn MailTransport>,
    clock:          Arc<dyn Clock>,
}

impl DeliveryProcess {
    pub fn new(deps: DeliveryDeps) -> Self {
        Self {
            messages:       deps.messages,
            receipts:       deps.receipts,
            unsubscribes:   deps.unsubscribes,
            campaign_types: deps.campaign_types,
            identity:       deps.identity,
            templates:      deps.templates,
            packager:       deps.packager,
            mail:           deps.mail,
            clock:          deps.clock,
        }
    }

    /// 配信を 1 件処理する
    ///
    /// `lease` は処理中のジョブの予約。`exhausted` はこの試行がリトライ上限に
    /// 達しているかどうか。上限到達時の一時的な失敗は `failed` + デッドレターになる。
    #[tracing::instrument(skip_all, fields(message.id = %delivery.message_id))]
    pub async fn run(&self, delivery: &Delivery, lease: &Lease, exhausted: bool) -> Disposition {
        let outcome = match self.deliver(delivery).await {
            Ok(()) => Outcome::Delivered,
            Err(outcome) => outcome,
        };

        let (status, disposition) = match &outcome {
            Outcome::Delivered => (MessageStatus::Delivered, Disposition::Complete),
            Outcome::Undeliverable(_) => (MessageStatus::Undeliverable, Disposition::Complete),
            Outcome::Transient(failure) if exhausted => (
                MessageStatus::Failed,
                Disposition::DeadLetter(format!("リトライ上限に到達: {}", failure.reason)),
            ),
            Outcome::Transient(_) => (MessageStatus::Retry, Disposition::Retry),
            Outcome::Fatal(failure) => (
                MessageStatus::Failed,
                Disposition::DeadLetter(failure.reason.clone()),
            ),
        };

        self.log_outcome(delivery, &outcome, status);
        self.persist_status(delivery, status, lease).await;
        disposition
    }

    async fn deliver(&self, delivery: &Delivery) -> Result<(), Outcome> {
        self.record_receipt(delivery).await?;
        self.check_eligibility(delivery).await?;
        let to = self.resolve_address(delivery).await?;

        let templates = self
            .templates
            .load(
                &delivery.client_id,
                &delivery.options.kind_id,
                &delivery.options.template_id,
            )
            .await?;
        let message = self
            .packager
            .pack(delivery, &to, &templates, self.clock.now())?;

        self.mail.connect().await?;
        self.mail.send(&message).await?;
        Ok(())
    }

    async fn record_receipt(&self, delivery: &Delivery) -> Result<(), Outcome> {
        let Some(user_guid) = delivery.user_guid() else {
            return Ok(());
        };
        let key = match &delivery.campaign_id {
            Some(campaign_id) => ReceiptKey::Campaign {
                campaign_id: campaign_id.clone(),
                user_guid:   user_guid.to_string(),
            },
            None => ReceiptKey::Kind {
                user_guid: user_guid.to_string(),
                client_id: delivery.client_id.clone(),
                kind_id:   delivery.options.kind_id.clone(),
            },
        };
        self.receipts.upsert(&key, self.clock.now()).await?;
        Ok(())
    }

    /// 配信停止の確認（critical な種別は確認しない）
    async fn check_eligibility(&self, delivery: &Delivery) -> Result<(), Outcome> {
        let kind_id = &delivery.options.kind_id;
        let critical = if kind_id.is_empty() {
            false
        } else {
            self.campaign_types
                .find_by_id(kind_id)
                .await?
                .is_some_and(|campaign_type| campaign_type.critical)
        };
        if critical {
            return Ok(());
        }
        let Some(user_guid) = delivery.user_guid() else {
            return Ok(());
        };

        if self.unsubscribes.is_globally_unsubscribed(user_guid).await? {
            return Err(Outcome::Undeliverable(
                "全種別の配信を停止しています".to_string(),
            ));
        }
        if !kind_id.is_empty() && self.unsubscribes.find(user_guid, kind_id).await?.is_some() {
            return Err(Outcome::Undeliverable(format!(
                "種別 {kind_id} の配信を停止しています"
            )));
        }
        Ok(())
    }

    async fn resolve_address(&self, delivery: &Delivery) -> Result<String, Outcome> {
        if let Some(email) = delivery.email() {
            return if is_deliverable_address(email) {
                Ok(email.to_string())
            } else {
                Err(Outcome::Undeliverable(format!(
                    "メールアドレスが不正です: {email}"
                )))
            };
        }
        let Some(user_guid) = delivery.user_guid() else {
            return Err(Outcome::Undeliverable("宛先がありません".to_string()));
        };

        let token = self.identity.access_token(&delivery.uaa_host).await?;
        let emails = self
            .identity
            .user_emails(&token, &[user_guid.to_string()])
            .await?;
        emails
            .get(user_guid)
            .and_then(|addresses| first_deliverable(addresses))
            .map(str::to_string)
            .ok_or_else(|| {
                Outcome::Undeliverable(format!(
                    "ユーザー {user_guid} に配信可能なメールアドレスがありません"
                ))
            })
    }

    async fn persist_status(&self, delivery: &Delivery, status: MessageStatus, lease: &Lease) {
        match self
            .messages
            .settle_status(&delivery.message_id, status, self.clock.now(), lease)
            .await
        {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                status = %status,
                job.id = %lease.job_id,
                "予約の失効または終端ステータスのため、ステータスを書き込みませんでした"
            ),
            Err(e) => tracing::error!(
                error.category = error::category::INFRASTRUCTURE,
                error.kind = error::kind::STATUS_UPDATE,
                status = %status,
                "メッセージステータスの更新に失敗: {e}"
            ),
        }
    }

    fn log_outcome(&self, delivery: &Delivery, outcome: &Outcome, status: MessageStatus) {
        let message_id = &delivery.message_id;
        match outcome {
            Outcome::Delivered => log_business_event!(
                event.category = event::category::DELIVERY,
                event.action = event::action::MESSAGE_DELIVERED,
                event.entity_type = event::entity_type::MESSAGE,
                event.entity_id = %message_id,
                event.result = event::result::SUCCESS,
                client.id = %delivery.client_id,
                "メッセージを配信しました"
            ),
            Outcome::Undeliverable(reason) => log_business_event!(
                event.category = event::category::DELIVERY,
                event.action = event::action::MESSAGE_UNDELIVERABLE,
                event.entity_type = event::entity_type::MESSAGE,
                event.entity_id = %message_id,
                event.result = event::result::SKIPPED,
                reason = %reason,
                "メッセージは配信不能です"
            ),
            Outcome::Transient(failure) if status == MessageStatus::Retry => log_business_event!(
                event.category = event::category::DELIVERY,
                event.action = event::action::MESSAGE_RETRY_SCHEDULED,
                event.entity_type = event::entity_type::MESSAGE,
                event.entity_id = %message_id,
                event.result = event::result::FAILURE,
                error.category = failure.category(),
                error.kind = failure.kind,
                reason = %failure.reason,
                "配信に失敗したためリトライします"
            ),
            Outcome::Transient(failure) | Outcome::Fatal(failure) => log_business_event!(
                event.category = event::category::DELIVERY,
                event.action = event::action::MESSAGE_FAILED,
                event.entity_type = event::entity_type::MESSAGE,
                event.entity_id = %message_id,
                event.result = event::result::FAILURE,
                error.category = failure.category(),
                error.kind = failure.kind,
                reason = %failure.reason,
                "メッセージの配信に失敗しました"
            ),
        }
    }
}
