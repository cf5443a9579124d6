//! # オーディエンスディスパッチャ
//!
//! キャンペーンをオーディエンスの宛先ごとの配信ジョブに展開する。
//!
//! ## 処理の流れ
//!
//! 1. HTML 本文を一度だけ分解する（失敗したらディスパッチ全体を中断）
//! 2. `send_to` のタグから戦略を引き、宛先に展開する（未知のタグは [`DispatchError::NoStrategy`]）
//! 3. 宛先ごとに 1 トランザクションで `queued` のメッセージ行と配信ジョブを書き込む
//!
//! 4. 宛先の処理が終わったら、成否にかかわらずキャンペーンにディスパッチ完了を記録する
//!
//! ステータス集計はディスパッチ完了が記録されたキャンペーンだけを完了させる。
//! 途中で中断したディスパッチも完了を記録するので、キューに入った宛先の分だけで
//! 集計が閉じる。
//!
//! 宛先ごとのトランザクションは互いに独立している。ある宛先の書き込みが
//! 失敗してもロールバックされるのはその宛先だけで、他の宛先の処理は続く。
//! 呼び出し元はレスポンスの一覧で、どの宛先がキューに入ったかを突き合わせる。

pub mod strategy;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hikyaku_domain::{
    campaign::Campaign,
    clock::Clock,
    delivery::{Delivery, DeliveryOptions, HtmlExtractError},
    directory::DirectoryError,
    identity::IdentityError,
    job::DELIVERY_QUEUE,
    message::{Message, MessageId},
    recipient::Recipient,
};
use hikyaku_infra::{
    InfraError,
    db::TransactionManager,
    html::HtmlExtractor,
    repository::{CampaignRepository, CampaignTypeRepository, MessageRepository},
};
use hikyaku_shared::{
    event_log::{error, event},
    log_business_event,
};
use serde::Serialize;
use strategy::{Audience, StrategyTable};
use thiserror::Error;

use crate::queue::{JobQueue, QueueError};

/// ディスパッチのエラー
///
/// いずれもディスパッチ全体の失敗。宛先単位の書き込み失敗はここに含めず、
/// レスポンスから除外してログに残す。
#[derive(Debug, Error)]
pub enum DispatchError {
    /// オーディエンスのタグに対応する戦略がない
    #[error("オーディエンス {0} に対応する戦略がありません")]
    NoStrategy(String),

    /// タグと対象の組み合わせが不正
    #[error("オーディエンスの指定が不正です: {0}")]
    InvalidAudience(String),

    #[error(transparent)]
    HtmlExtraction(#[from] HtmlExtractError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("データベースの操作に失敗: {0}")]
    Infra(#[from] InfraError),
}

/// 宛先ごとのディスパッチ結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    pub status:          &'static str,
    pub recipient:       String,
    pub notification_id: MessageId,
}

/// ディスパッチ要求に付随するリクエスト情報
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    /// 宛先解決に使う ID プロバイダのホスト（空なら既定）
    pub uaa_host:         String,
    pub scope:            String,
    /// トレーシング相関 ID
    pub vcap_request_id:  String,
    pub request_received: Option<DateTime<Utc>>,
}

/// オーディエンスディスパッチャ
pub struct Dispatcher {
    strategies:     StrategyTable,
    html:           Arc<dyn HtmlExtractor>,
    tx_manager:     Arc<dyn TransactionManager>,
    messages:       Arc<dyn MessageRepository>,
    campaigns:      Arc<dyn CampaignRepository>,
    campaign_types: Arc<dyn CampaignTypeRepository>,
    queue:          Arc<JobQueue>,
    clock:          Arc<dyn Clock>,
}

/// ディスパッチャの依存コンポーネント
pub struct DispatcherDeps {
    pub strategies:     StrategyTable,
    pub html:           Arc<dyn HtmlExtractor>,
    pub tx_manager:     Arc<dyn TransactionManager>,
    pub messages:       Arc<dyn MessageRepository>,
    pub campaigns:      Arc<dyn CampaignRepository>,
    pub campaign_types: Arc<dyn CampaignTypeRepository>,
    pub queue:          Arc<JobQueue>,
    pub clock:          Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(deps: DispatcherDeps) -> Self {
        Self {
            strategies:     deps.strategies,
            html:           deps.html,
            tx_manager:     deps.tx_manager,
            messages:       deps.messages,
            campaigns:      deps.campaigns,
            campaign_types: deps.campaign_types,
            queue:          deps.queue,
            clock:          deps.clock,
        }
    }

    /// キャンペーンをディスパッチする
    #[tracing::instrument(skip_all, fields(campaign.id = %campaign.id, audience = %campaign.send_to.tag))]
    pub async fn dispatch(
        &self,
        campaign: &Campaign,
        meta: &RequestMeta,
    ) -> Result<Vec<Response>, DispatchError> {
        let result = self.queue_audience(campaign, meta).await;
        self.mark_dispatched(campaign).await;
        result
    }

    /// オーディエンスを展開し、宛先ごとにキューへ投入する
    async fn queue_audience(
        &self,
        campaign: &Campaign,
        meta: &RequestMeta,
    ) -> Result<Vec<Response>, DispatchError> {
        let html = self.html.extract(&campaign.html)?;
        let strategy = self.strategies.lookup(&campaign.send_to.tag)?;
        let audience = strategy.expand(&campaign.send_to.target, &meta.uaa_host).await?;
        let kind_description = self
            .campaign_types
            .find_by_id(&campaign.campaign_type_id)
            .await?
            .map(|campaign_type| campaign_type.description)
            .unwrap_or_default();

        let options = DeliveryOptions {
            reply_to: campaign.reply_to.clone(),
            subject: campaign.subject.clone(),
            text: campaign.text.clone(),
            html,
            kind_id: campaign.campaign_type_id.clone(),
            kind_description,
            source_description: campaign.sender_id.clone(),
            template_id: campaign.template_id.clone(),
            endorsement: audience.endorsement.clone(),
        };

        let mut responses = Vec::with_capacity(audience.recipients.len());
        for recipient in &audience.recipients {
            match self
                .queue_recipient(campaign, meta, &audience, &options, recipient)
                .await
            {
                Ok(response) => responses.push(response),
                Err(e) => {
                    log_business_event!(
                        event.category = event::category::DISPATCH,
                        event.action = event::action::RECIPIENT_QUEUE_FAILED,
                        event.entity_type = event::entity_type::CAMPAIGN,
                        event.entity_id = %campaign.id,
                        event.result = event::result::FAILURE,
                        recipient = %recipient.label(),
                        error = %e,
                        "宛先のキュー投入に失敗"
                    );
                }
            }
        }

        tracing::info!(
            queued = responses.len(),
            total = audience.recipients.len(),
            "キャンペーンをディスパッチしました"
        );
        Ok(responses)
    }

    /// ディスパッチ完了を記録する
    ///
    /// 記録に失敗してもディスパッチはやり直さない（宛先に二重に送ることになるため）。
    /// その場合キャンペーンは `sending` のまま残る。
    async fn mark_dispatched(&self, campaign: &Campaign) {
        match self
            .campaigns
            .mark_dispatched(&campaign.id, self.clock.now())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("ディスパッチ完了は記録済みか、キャンペーンが存在しません");
            }
            Err(e) => {
                tracing::error!(
                    error.category = error::category::INFRASTRUCTURE,
                    error.kind = error::kind::DATABASE,
                    "ディスパッチ完了の記録に失敗: {e}"
                );
            }
        }
    }

    /// 1 宛先分のメッセージ行とジョブを 1 トランザクションで書き込む
    async fn queue_recipient(
        &self,
        campaign: &Campaign,
        meta: &RequestMeta,
        audience: &Audience,
        options: &DeliveryOptions,
        recipient: &Recipient,
    ) -> Result<Response, QueueError> {
        let message_id = MessageId::new();
        let (user_guid, email) = match recipient {
            Recipient::User { guid } => (Some(guid.clone()), None),
            Recipient::Email { address } => (None, Some(address.clone())),
        };
        let delivery = Delivery {
            message_id: message_id.clone(),
            campaign_id: Some(campaign.id.clone()),
            client_id: campaign.client_id.clone(),
            user_guid,
            email,
            space_guid: audience.space_guid.clone(),
            organization_guid: audience.organization_guid.clone(),
            options: options.clone(),
            uaa_host: meta.uaa_host.clone(),
            scope: meta.scope.clone(),
            vcap_request_id: meta.vcap_request_id.clone(),
            request_received: meta.request_received,
        };
        let payload = delivery.encode().map_err(InfraError::from)?;

        let mut tx = self.tx_manager.begin().await?;
        self.messages
            .insert(
                &mut tx,
                &Message::queued(
                    message_id.clone(),
                    Some(campaign.id.clone()),
                    self.clock.now(),
                ),
            )
            .await?;
        self.queue.enqueue(&mut tx, DELIVERY_QUEUE, payload).await?;
        tx.commit().await?;

        log_business_event!(
            event.category = event::category::DISPATCH,
            event.action = event::action::RECIPIENT_QUEUED,
            event.entity_type = event::entity_type::MESSAGE,
            event.entity_id = %message_id,
            event.result = event::result::SUCCESS,
            campaign.id = %campaign.id,
            "宛先をキューに投入"
        );

        Ok(Response {
            status:          "queued",
            recipient:       recipient.label().to_string(),
            notification_id: message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use hikyaku_domain::{
        campaign::{CampaignId, CampaignStatus, SendTo},
        clock::FixedClock,
        message::MessageStatus,
    };
    use hikyaku_infra::{
        html::ScraperHtmlExtractor,
        mock::{
            MockCampaignRepository,
            MockCampaignTypeRepository,
            MockDirectoryClient,
            MockIdentityProvider,
            MockJobRepository,
            MockMessageRepository,
            MockTransactionManager,
        },
    };
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::queue::QueueSettings;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    struct Fixture {
        dispatcher: Dispatcher,
        jobs:       MockJobRepository,
        messages:   MockMessageRepository,
        campaigns:  MockCampaignRepository,
        directory:  MockDirectoryClient,
    }

    fn fixture() -> Fixture {
        let jobs = MockJobRepository::new();
        let messages = MockMessageRepository::new();
        let campaigns = MockCampaignRepository::new();
        let directory = MockDirectoryClient::new();
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(t0()));
        let queue = Arc::new(JobQueue::new(
            Arc::new(jobs.clone()),
            clock.clone(),
            QueueSettings::default(),
        ));
        let dispatcher = Dispatcher::new(DispatcherDeps {
            strategies: StrategyTable::new(
                Arc::new(MockIdentityProvider::new()),
                Arc::new(directory.clone()),
            ),
            html: Arc::new(ScraperHtmlExtractor::new().unwrap()),
            tx_manager: Arc::new(MockTransactionManager),
            messages: Arc::new(messages.clone()),
            campaigns: Arc::new(campaigns.clone()),
            campaign_types: Arc::new(MockCampaignTypeRepository::new()),
            queue,
            clock,
        });
        Fixture {
            dispatcher,
            jobs,
            messages,
            campaigns,
            directory,
        }
    }

    fn campaign(send_to: SendTo, html: &str) -> Campaign {
        Campaign {
            id: CampaignId::new(),
            send_to,
            campaign_type_id: "announcement".into(),
            client_id: "client-1".into(),
            text: "本文".into(),
            html: html.into(),
            subject: "件名".into(),
            template_id: String::new(),
            reply_to: "support@x.com".into(),
            sender_id: "sender-1".into(),
            status: CampaignStatus::Sending,
            sent_messages: 0,
            failed_messages: 0,
            total_messages: 0,
            start_time: t0(),
            dispatched_at: None,
        }
    }

    /// キャンペーンを登録してからディスパッチする
    async fn dispatch_stored(
        f: &Fixture,
        campaign: &Campaign,
    ) -> Result<Vec<Response>, DispatchError> {
        f.campaigns.add_campaign(campaign.clone());
        f.dispatcher.dispatch(campaign, &RequestMeta::default()).await
    }

    fn decoded_jobs(jobs: &MockJobRepository) -> Vec<Delivery> {
        jobs.jobs()
            .iter()
            .map(|job| Delivery::decode(&job.payload).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn emailsオーディエンスで宛先ごとにメッセージとジョブを作る() {
        let f = fixture();
        let html = r#"<!DOCTYPE html><html><head><title>t</title></head><body class="x">Hi</body></html>"#;
        let campaign = campaign(SendTo::emails(["a@x.com", "b@x.com"]), html);

        let responses = f
            .dispatcher
            .dispatch(&campaign, &RequestMeta::default())
            .await
            .unwrap();

        assert_eq!(responses.len(), 2);
        assert!(responses.iter().all(|r| r.status == "queued"));
        let messages = f.messages.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.status == MessageStatus::Queued));
        assert!(messages.iter().all(|m| m.campaign_id == Some(campaign.id.clone())));

        let deliveries = decoded_jobs(&f.jobs);
        assert_eq!(deliveries.len(), 2);
        for delivery in &deliveries {
            assert_eq!(delivery.options.html.body_content, "Hi");
            assert_eq!(delivery.options.html.body_attributes, r#"class="x""#);
            assert_eq!(delivery.user_guid, None);
            assert!(messages.iter().any(|m| m.id == delivery.message_id));
        }
        let mut emails: Vec<_> = deliveries.iter().filter_map(|d| d.email.clone()).collect();
        emails.sort();
        assert_eq!(emails, vec!["a@x.com", "b@x.com"]);
    }

    #[tokio::test]
    async fn 一つの宛先の書き込み失敗は他の宛先に影響しない() {
        let f = fixture();
        f.jobs.fail_insert_containing("b@x.com");
        let campaign = campaign(SendTo::emails(["a@x.com", "b@x.com", "c@x.com"]), "");

        let responses = f
            .dispatcher
            .dispatch(&campaign, &RequestMeta::default())
            .await
            .unwrap();

        let recipients: Vec<_> = responses.iter().map(|r| r.recipient.as_str()).collect();
        assert_eq!(recipients, vec!["a@x.com", "c@x.com"]);
        // 失敗した宛先はメッセージ行もロールバックされる
        let messages = f.messages.messages();
        assert_eq!(messages.len(), 2);
        let deliveries = decoded_jobs(&f.jobs);
        assert_eq!(deliveries.len(), 2);
        for response in &responses {
            assert!(messages.iter().any(|m| m.id == response.notification_id));
            assert!(deliveries
                .iter()
                .any(|d| d.message_id == response.notification_id));
        }
    }

    #[test]
    fn レスポンスはjsonでstatusと宛先とidを返す() {
        let id = MessageId::new();
        let response = Response {
            status:          "queued",
            recipient:       "a@x.com".into(),
            notification_id: id.clone(),
        };

        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "status": "queued",
                "recipient": "a@x.com",
                "notification_id": id.to_string(),
            })
        );
    }

    #[tokio::test]
    async fn 未知のタグはno_strategyで何も書き込まない() {
        let f = fixture();
        let mut campaign = campaign(SendTo::user("user-1"), "");
        campaign.send_to.tag = "pigeons".into();

        let result = f
            .dispatcher
            .dispatch(&campaign, &RequestMeta::default())
            .await;

        assert!(matches!(result, Err(DispatchError::NoStrategy(tag)) if tag == "pigeons"));
        assert!(f.messages.messages().is_empty());
        assert!(f.jobs.jobs().is_empty());
    }

    #[tokio::test]
    async fn spacesオーディエンスはguidだけを持つ配信を作る() {
        let f = fixture();
        f.directory
            .add_space("space-1", vec!["user-1".into(), "user-2".into()]);
        let campaign = campaign(SendTo::space("space-1"), "");
        let meta = RequestMeta {
            uaa_host: "https://uaa.example.com".into(),
            vcap_request_id: "req-1".into(),
            ..Default::default()
        };

        let responses = f.dispatcher.dispatch(&campaign, &meta).await.unwrap();

        assert_eq!(responses.len(), 2);
        for delivery in decoded_jobs(&f.jobs) {
            assert!(delivery.user_guid.is_some());
            assert_eq!(delivery.email, None);
            assert_eq!(delivery.space_guid.as_deref(), Some("space-1"));
            assert_eq!(delivery.uaa_host, "https://uaa.example.com");
            assert_eq!(delivery.vcap_request_id, "req-1");
            assert!(delivery.options.endorsement.contains("space-1"));
            assert_eq!(delivery.options.kind_id, "announcement");
        }
    }

    #[tokio::test]
    async fn 存在しない組織はディスパッチ全体を中断する() {
        let f = fixture();
        let campaign = campaign(SendTo::org("missing-org"), "");

        let result = f
            .dispatcher
            .dispatch(&campaign, &RequestMeta::default())
            .await;

        assert!(matches!(result, Err(DispatchError::Directory(_))));
        assert!(f.messages.messages().is_empty());
        assert!(f.jobs.jobs().is_empty());
    }

    #[tokio::test]
    async fn 宛先の投入が終わるとディスパッチ完了を記録する() {
        let f = fixture();
        let campaign = campaign(SendTo::emails(["a@x.com"]), "");

        let responses = dispatch_stored(&f, &campaign).await.unwrap();

        assert_eq!(responses.len(), 1);
        let stored = f.campaigns.campaign(&campaign.id).unwrap();
        assert_eq!(stored.dispatched_at, Some(t0()));
    }

    #[tokio::test]
    async fn 中断したディスパッチもディスパッチ完了を記録する() {
        let f = fixture();
        let mut campaign = campaign(SendTo::user("user-1"), "");
        campaign.send_to.tag = "pigeons".into();

        let result = dispatch_stored(&f, &campaign).await;

        assert!(matches!(result, Err(DispatchError::NoStrategy(_))));
        let stored = f.campaigns.campaign(&campaign.id).unwrap();
        assert_eq!(stored.dispatched_at, Some(t0()));
    }

    #[tokio::test]
    async fn 断片のhtmlは本文要素の内側をそのまま本文にする() {
        let f = fixture();
        let campaign = campaign(SendTo::emails(["a@x.com"]), "<h1>Hi</h1>");

        dispatch_stored(&f, &campaign).await.unwrap();

        let deliveries = decoded_jobs(&f.jobs);
        assert_eq!(deliveries.len(), 1);
        let html = &deliveries[0].options.html;
        assert_eq!(html.body_content, "<h1>Hi</h1>");
        assert_eq!(html.body_attributes, "");
        assert_eq!(html.doctype, "");
    }
}
