//! # Hikyaku インフラ層
//!
//! 外部システムとの接続・通信を担当するインフラストラクチャ層。
//!
//! ## 設計方針
//!
//! このクレートはリポジトリトレイトと外部協調者トレイトの具体的な実装を提供する。
//! 配信サービスはトレイト越しにのみ依存し、テストでは [`mock`] の
//! インメモリ実装に差し替える。
//!
//! ## 責務
//!
//! - **データベース接続**: PostgreSQL の接続プール、マイグレーション、トランザクション
//! - **リポジトリ実装**: ジョブ、メッセージ、キャンペーン、配信停止、受信記録、テンプレート
//! - **メール転送**: SMTP / SES / Noop
//! - **外部 API クライアント**: ID プロバイダ（UAA）、リソースディレクトリ
//! - **HTML 抽出**: キャンペーン本文の分解
//!
//! ## 依存関係
//!
//! ```text
//! delivery-service → infra → domain
//! ```
//!
//! ## モジュール構成
//!
//! - [`db`] - PostgreSQL データベース接続管理
//! - [`error`] - インフラ層エラー定義
//! - [`repository`] - リポジトリ実装
//! - [`mail`] - メール転送
//! - [`identity`] - ID プロバイダクライアント
//! - [`directory`] - リソースディレクトリクライアント
//! - [`html`] - HTML 抽出
//!
//! ## 使用例
//!
//! ```rust,ignore
//! use hikyaku_infra::{db, repository::PostgresJobRepository};
//!
//! async fn setup() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = db::create_pool("postgres://localhost/hikyaku", 20).await?;
//!     db::run_migrations(&pool).await?;
//!
//!     let jobs = PostgresJobRepository::new(pool.clone());
//!     Ok(())
//! }
//! ```

pub mod db;
pub mod directory;
pub mod error;
pub mod html;
pub mod identity;
pub mod mail;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod repository;

pub use error::InfraError;
