//! # ドメイン層エラー定義
//!
//! ビジネスルール違反やドメイン固有の例外状態を表現するエラー型。
//!
//! ## 設計方針
//!
//! - **型による分類**: エラーの種類を列挙型で明示し、パターンマッチで処理可能に
//! - **thiserror 活用**: `#[error(...)]` マクロでエラーメッセージを自動生成
//!
//! 外部協調者のエラー（メール送信、ID プロバイダ等）はリトライ判定に使うため
//! それぞれのモジュールで個別に定義する。ここには純粋なドメイン違反のみを置く。

use thiserror::Error;

/// ドメイン層で発生するエラー
#[derive(Debug, Error)]
pub enum DomainError {
    /// バリデーションエラー
    ///
    /// 入力値がビジネスルールに違反している場合に使用する。
    ///
    /// # 例
    ///
    /// - GUID の形式不正
    /// - 本文（テキスト / HTML）が両方とも空
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// エンティティが見つからない
    #[error("{entity_type} が見つかりません: {id}")]
    NotFound {
        /// エンティティの種類（"Message", "Campaign" など）
        entity_type: &'static str,
        /// 検索に使用した識別子
        id:          String,
    },
}
