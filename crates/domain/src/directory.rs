//! # リソースディレクトリ
//!
//! スペース・組織のメンバーシップを解決する外部協調者のエラー種別。

use thiserror::Error;

/// リソースディレクトリ呼び出しのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// サービスに到達できない
    #[error("リソースディレクトリに接続できません: {0}")]
    Unavailable(String),

    /// 指定したスペース / 組織が存在しない
    #[error("リソースが見つかりません: {0}")]
    NotFound(String),

    /// その他の失敗
    #[error("リソースディレクトリの呼び出しに失敗: {0}")]
    Failure(String),
}
