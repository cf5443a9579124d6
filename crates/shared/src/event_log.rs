//! # ビジネスイベントログとエラーコンテキストの構造化ヘルパー
//!
//! 配信結果を `jq` で追跡できるよう、ログフィールドの命名規約と
//! ヘルパーマクロを提供する。
//!
//! ## ビジネスイベント
//!
//! [`log_business_event!`] マクロで出力する。`event.kind = "business_event"` マーカーが
//! 自動付与され、`jq 'select(.["event.kind"] == "business_event")'` でフィルタできる。
//!
//! ## フィールド命名規約
//!
//! ドット記法（`event.category`、`error.kind`）を使用。tracing の
//! `$($field:ident).+` パターンでサポートされ、JSON 出力でフラットなキーになる。

/// ビジネスイベントを構造化ログとして出力する。
///
/// `event.kind = "business_event"` マーカーを自動付与し、
/// `tracing::info!` レベルで出力する。
///
/// ## 必須フィールド（慣例）
///
/// - `event.category`: イベントカテゴリ（[`event::category`] の定数を使用）
/// - `event.action`: アクション名（[`event::action`] の定数を使用）
/// - `event.result`: 結果（[`event::result`] の定数を使用）
///
/// ## 推奨フィールド
///
/// - `event.entity_type`: エンティティ種別（[`event::entity_type`] の定数を使用）
/// - `event.entity_id`: エンティティ ID
#[macro_export]
macro_rules! log_business_event {
    ($($args:tt)*) => {
        ::tracing::info!(
            event.kind = "business_event",
            $($args)*
        )
    };
}

/// イベントフィールドの定数
pub mod event {
    /// イベントカテゴリ
    pub mod category {
        pub const DELIVERY: &str = "delivery";
        pub const DISPATCH: &str = "dispatch";
        pub const CAMPAIGN: &str = "campaign";
        pub const QUEUE: &str = "queue";
    }

    /// イベントアクション
    pub mod action {
        // 配信
        pub const MESSAGE_DELIVERED: &str = "message.delivered";
        pub const MESSAGE_UNDELIVERABLE: &str = "message.undeliverable";
        pub const MESSAGE_RETRY_SCHEDULED: &str = "message.retry_scheduled";
        pub const MESSAGE_FAILED: &str = "message.failed";

        // ディスパッチ
        pub const RECIPIENT_QUEUED: &str = "recipient.queued";
        pub const RECIPIENT_QUEUE_FAILED: &str = "recipient.queue_failed";

        // キャンペーン
        pub const CAMPAIGN_COMPLETED: &str = "campaign.completed";

        // キュー
        pub const JOB_DEAD_LETTERED: &str = "job.dead_lettered";
    }

    /// エンティティ種別
    pub mod entity_type {
        pub const MESSAGE: &str = "message";
        pub const CAMPAIGN: &str = "campaign";
        pub const JOB: &str = "job";
    }

    /// イベント結果
    pub mod result {
        pub const SUCCESS: &str = "success";
        pub const FAILURE: &str = "failure";
        pub const SKIPPED: &str = "skipped";
    }
}

/// エラーコンテキストフィールドの定数
pub mod error {
    /// エラーカテゴリ
    pub mod category {
        /// インフラストラクチャ（DB）
        pub const INFRASTRUCTURE: &str = "infrastructure";
        /// 外部サービス呼び出し（UAA、リソースディレクトリ、SMTP）
        pub const EXTERNAL_SERVICE: &str = "external_service";
        /// コンテンツ（テンプレート、ペイロード）
        pub const CONTENT: &str = "content";
    }

    /// エラー種別
    pub mod kind {
        pub const DATABASE: &str = "database";
        pub const MAIL_TRANSPORT: &str = "mail_transport";
        pub const IDENTITY_PROVIDER: &str = "identity_provider";
        pub const TEMPLATE: &str = "template";
        pub const PAYLOAD: &str = "payload";
        pub const STATUS_UPDATE: &str = "status_update";
    }
}
