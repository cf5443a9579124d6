//! # Hikyaku 共有ユーティリティ
//!
//! 配信パイプライン全体（domain / infra / delivery-service）で使用する
//! 共通ユーティリティを提供する。
//!
//! ## 設計方針
//!
//! - 他のすべてのクレートから依存される
//! - ビジネスロジックを含まない純粋なユーティリティのみを配置
//! - 外部クレートへの依存は最小限に抑える

pub mod event_log;
pub mod observability;
