//! # Delivery Service サーバー
//!
//! 配信ワーカープールとキャンペーンステータス集計ループを起動する常駐プロセス。
//!
//! ## 起動順
//!
//! 1. `.env` と環境変数から設定を読み込む
//! 2. トレーシングを初期化し、インスタンス番号付きのルートスパンに入る
//! 3. データベースに接続し、マイグレーションを実行する
//! 4. [`bootstrap::build`] でディスパッチャ・配信プロセス・集計ループを組み立てる
//! 5. ワーカープールと集計ループを起動する
//! 6. SIGINT / SIGTERM で停止シグナルを送り、処理中のジョブの完了を待つ

use std::sync::Arc;

use anyhow::Context as _;
use hikyaku_delivery_service::{bootstrap, config::DeliveryServiceConfig, worker::WorkerPool};
use hikyaku_domain::{
    clock::{Clock, SystemClock},
    worker::WorkerGenerator,
};
use hikyaku_infra::db;
use hikyaku_shared::observability::{TracingConfig, init_tracing};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// ワーカー以外に確保する接続数（集計ループ + ディスパッチ）
const EXTRA_CONNECTIONS: u32 = 4;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let tracing_config = TracingConfig::from_env("delivery-service");
    init_tracing(&tracing_config).context("トレーシングの初期化に失敗しました")?;

    let config = DeliveryServiceConfig::from_env().context("設定の読み込みに失敗しました")?;
    let root_span = tracing_config
        .with_instance(config.instance_index, config.worker_count)
        .root_span();
    run(config).instrument(root_span).await
}

/// ワーカープールと集計ループを起動し、停止シグナルまで待つ
async fn run(config: DeliveryServiceConfig) -> anyhow::Result<()> {
    tracing::info!(mail_backend = %config.mail.backend, "Delivery Service を起動します");

    let pool = db::create_pool(
        &config.database_url,
        config.worker_count + EXTRA_CONNECTIONS,
    )
    .await
    .context("データベース接続に失敗しました")?;
    db::run_migrations(&pool)
        .await
        .context("マイグレーションに失敗しました")?;
    tracing::info!("データベースに接続しました");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    // ディスパッチャはホストサービスのリクエスト処理が使う。このプロセスでは組み立てのみ
    let services = bootstrap::build(&config, pool.clone(), clock)
        .await
        .context("コンポーネントの組み立てに失敗しました")?;
    let aggregator = services.aggregator;

    let cancel = CancellationToken::new();
    let pool_handle = WorkerPool::start(
        WorkerGenerator::new(config.instance_index, config.worker_count),
        services.queue,
        services.process,
        cancel.clone(),
    );
    tracing::info!(workers = pool_handle.len(), "ワーカープールを起動しました");

    let aggregator_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { aggregator.run(cancel).await }.in_current_span())
    };

    shutdown_signal().await;
    tracing::info!("停止シグナルを受信しました。処理中のジョブの完了を待ちます");

    pool_handle.halt().await;
    if let Err(e) = aggregator_handle.await {
        tracing::error!("集計ループが異常終了しました: {e}");
    }
    pool.close().await;

    tracing::info!("Delivery Service を停止しました");
    Ok(())
}

/// SIGINT / SIGTERM を待つ
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("SIGINT ハンドラの登録に失敗: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("SIGTERM ハンドラの登録に失敗: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
