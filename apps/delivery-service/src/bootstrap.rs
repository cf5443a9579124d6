//! # コンポーネントの組み立て
//!
//! 接続プールと設定から、配信パイプラインの実行時コンポーネントを組み立てる。
//! 常駐プロセス（`main`）とホストサービスの両方がこの関数を使う。
//!
//! | コンポーネント | 使う側 |
//! |----------------|--------|
//! | [`Dispatcher`] | ホストサービスのリクエスト処理 |
//! | [`WorkerPool`](crate::worker::WorkerPool) に渡す `queue` / `process` | ブートシーケンス |
//! | [`CampaignStatusAggregator`] | ブートシーケンス |

use std::sync::Arc;

use anyhow::Context as _;
use aws_config::BehaviorVersion;
use chrono::TimeDelta;
use hikyaku_domain::{clock::Clock, job::RetryPolicy};
use hikyaku_infra::{
    db::PgTransactionManager,
    directory::CloudControllerDirectory,
    html::ScraperHtmlExtractor,
    identity::{IdentityProvider, UaaIdentityProvider},
    mail::{MailTransport, NoopMailTransport, SesMailTransport, SmtpMailTransport},
    repository::{
        PostgresCampaignRepository,
        PostgresCampaignTypeRepository,
        PostgresJobRepository,
        PostgresMessageRepository,
        PostgresReceiptRepository,
        PostgresTemplateRepository,
        PostgresUnsubscribeRepository,
    },
};
use sqlx::PgPool;

use crate::{
    config::{DeliveryServiceConfig, MailBackend, MailConfig},
    delivery::{DeliveryDeps, DeliveryProcess, Packager, TemplateLoader},
    dispatch::{Dispatcher, DispatcherDeps, strategy::StrategyTable},
    queue::{JobQueue, QueueSettings},
    status::{AggregatorSettings, CampaignStatusAggregator, DEFAULT_EMPTY_CAMPAIGN_GRACE_SECS},
};

/// 組み立て済みのコンポーネント
pub struct Services {
    pub queue:      Arc<JobQueue>,
    pub process:    Arc<DeliveryProcess>,
    pub dispatcher: Arc<Dispatcher>,
    pub aggregator: CampaignStatusAggregator,
}

/// 接続プールと設定からコンポーネントを組み立てる
///
/// 外部サービスへの接続はここでは行わない。HTTP クライアントや HTML パーサーの
/// 初期化に失敗した場合はエラーを返す。
pub async fn build(
    config: &DeliveryServiceConfig,
    pool: PgPool,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Services> {
    let messages = Arc::new(PostgresMessageRepository::new(pool.clone()));
    let campaigns = Arc::new(PostgresCampaignRepository::new(pool.clone()));
    let campaign_types = Arc::new(PostgresCampaignTypeRepository::new(pool.clone()));

    let queue = Arc::new(JobQueue::new(
        Arc::new(PostgresJobRepository::new(pool.clone())),
        clock.clone(),
        QueueSettings {
            poll_interval: config.queue_poll_interval,
            visibility:    config.job_visibility_timeout,
            retry_policy:  RetryPolicy::new(
                RetryPolicy::DEFAULT_BASE,
                RetryPolicy::DEFAULT_CEILING,
                config.max_delivery_attempts,
            ),
        },
    ));

    let identity: Arc<dyn IdentityProvider> = Arc::new(
        UaaIdentityProvider::new(
            config.uaa.host.clone(),
            config.uaa.client_id.clone(),
            config.uaa.client_secret.clone(),
        )
        .context("ID プロバイダクライアントの初期化に失敗しました")?,
    );
    let directory = CloudControllerDirectory::new(config.directory_host.clone())
        .context("リソースディレクトリクライアントの初期化に失敗しました")?;
    let html = ScraperHtmlExtractor::new().context("HTML 抽出器の初期化に失敗しました")?;

    let dispatcher = Arc::new(Dispatcher::new(DispatcherDeps {
        strategies:     StrategyTable::new(identity.clone(), Arc::new(directory)),
        html:           Arc::new(html),
        tx_manager:     Arc::new(PgTransactionManager::new(pool.clone())),
        messages:       messages.clone(),
        campaigns:      campaigns.clone(),
        campaign_types: campaign_types.clone(),
        queue:          queue.clone(),
        clock:          clock.clone(),
    }));

    let process = Arc::new(DeliveryProcess::new(DeliveryDeps {
        messages:       messages.clone(),
        receipts:       Arc::new(PostgresReceiptRepository::new(pool.clone())),
        unsubscribes:   Arc::new(PostgresUnsubscribeRepository::new(pool.clone())),
        campaign_types,
        identity,
        templates:      TemplateLoader::new(Arc::new(PostgresTemplateRepository::new(pool))),
        packager:       Packager::new(
            config.mail.sender_address.clone(),
            config.mail.delivery_domain.clone(),
        ),
        mail:           mail_transport(&config.mail).await,
        clock:          clock.clone(),
    }));

    let aggregator = CampaignStatusAggregator::new(
        campaigns,
        messages,
        clock,
        AggregatorSettings {
            interval:  config.status_poll_interval,
            grace:     TimeDelta::seconds(DEFAULT_EMPTY_CAMPAIGN_GRACE_SECS),
            retention: config.message_retention,
        },
    );

    Ok(Services {
        queue,
        process,
        dispatcher,
        aggregator,
    })
}

/// `MAIL_BACKEND` に応じたメール転送を組み立てる
async fn mail_transport(config: &MailConfig) -> Arc<dyn MailTransport> {
    match config.backend {
        MailBackend::Smtp => {
            tracing::info!(
                host = %config.smtp_host,
                port = config.smtp_port,
                "SMTP でメールを送信します"
            );
            Arc::new(SmtpMailTransport::new(&config.smtp_host, config.smtp_port))
        }
        MailBackend::Ses => {
            let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
            tracing::info!("SES でメールを送信します");
            Arc::new(SesMailTransport::new(aws_sdk_sesv2::Client::new(
                &aws_config,
            )))
        }
        MailBackend::Noop => {
            tracing::warn!("メール送信は無効です（noop）");
            Arc::new(NoopMailTransport)
        }
    }
}
