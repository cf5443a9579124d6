//! # Hikyaku ドメイン層
//!
//! 通知配信パイプラインの中核となるドメインモデルを定義する。
//!
//! ## 設計方針
//!
//! - **純粋性**: DB、SMTP、HTTP には一切依存しない
//! - **値オブジェクト**: ID 型は Newtype で区別する（`MessageId` と `CampaignId` を取り違えない）
//! - **協調者エラー**: 外部協調者（メール転送、ID プロバイダ、テンプレートソース）の
//!   エラー種別をここで定義し、配信プロセスがリトライ可否を型で判断できるようにする
//!
//! ## 依存関係の方向
//!
//! ```text
//! delivery-service → infra → domain
//!         ↘                    ↓
//!           shared ←───────────┘
//! ```
//!
//! ## モジュール構成
//!
//! - [`job`] - 永続ジョブとリトライポリシー
//! - [`message`] - 宛先ごとの配信ステータス
//! - [`campaign`] - キャンペーン、オーディエンス、集計
//! - [`delivery`] - ジョブペイロード（ワイヤフォーマット）
//! - [`recipient`] - 宛先とメールアドレス整形
//! - [`mail`] - 送信用メールメッセージ
//! - [`worker`] - ワーカー ID の採番

#[macro_use]
mod macros;

pub mod campaign;
pub mod campaign_type;
pub mod clock;
pub mod delivery;
pub mod directory;
pub mod error;
pub mod identity;
pub mod job;
pub mod mail;
pub mod message;
pub mod recipient;
pub mod template;
pub mod unsubscribe;
pub mod worker;

pub use error::DomainError;
