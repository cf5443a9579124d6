//! # リポジトリ実装
//!
//! 配信パイプラインが使う永続化の境界。トレイトごとに PostgreSQL 実装と
//! （`test-utils` feature で）インメモリのモック実装を持つ。

pub mod campaign_repository;
pub mod campaign_type_repository;
pub mod job_repository;
pub mod message_repository;
pub mod receipt_repository;
pub mod template_repository;
pub mod unsubscribe_repository;

pub use campaign_repository::{CampaignRepository, PostgresCampaignRepository};
pub use campaign_type_repository::{CampaignTypeRepository, PostgresCampaignTypeRepository};
pub use job_repository::{JobRepository, PostgresJobRepository};
pub use message_repository::{MessageRepository, PostgresMessageRepository};
pub use receipt_repository::{PostgresReceiptRepository, ReceiptRepository};
pub use template_repository::{PostgresTemplateRepository, TemplateRepository};
pub use unsubscribe_repository::{PostgresUnsubscribeRepository, UnsubscribeRepository};
