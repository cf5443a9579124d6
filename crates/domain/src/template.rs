//! # テンプレート
//!
//! テンプレートソースから取得する件名・テキスト・HTML テンプレートと、
//! その取得・レンダリングのエラー種別。
//!
//! テンプレートは tera 構文で記述し、配信時に以下の変数を参照できる:
//!
//! | 変数 | 内容 |
//! |------|------|
//! | `subject` / `text` | キャンペーンの件名・テキスト本文 |
//! | `html` | HTML 本文（body の中身） |
//! | `html_doctype` / `html_head` / `html_body_attributes` | 元 HTML の構成要素 |
//! | `endorsement` | 配信理由の説明文 |
//! | `kind_id` / `kind_description` / `source_description` | 種別情報 |
//! | `client_id` / `message_id` / `user_guid` / `to` | 配信メタデータ |

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 既定テンプレートの ID
pub const DEFAULT_TEMPLATE_ID: &str = "default";

/// 件名・テキスト・HTML テンプレートの組
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Templates {
    pub subject: String,
    pub text:    String,
    pub html:    String,
}

impl Templates {
    /// 組み込みの既定テンプレート
    ///
    /// DB に `default` テンプレートがない場合に使用する。
    pub fn builtin() -> Self {
        Self {
            subject: "{{ subject }}".to_string(),
            text:    "{{ text }}\n\n{{ endorsement }}".to_string(),
            html:    concat!(
                "{{ html_doctype }}<html><head>{{ html_head }}</head>",
                "<body {{ html_body_attributes }}>",
                "<p>{{ endorsement }}</p>{{ html }}",
                "</body></html>"
            )
            .to_string(),
        }
    }
}

/// テンプレートの取得・レンダリングエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// 指定されたテンプレートが存在しない（リトライしても回復しない）
    #[error("テンプレートが見つかりません: {0}")]
    NotFound(String),

    /// テンプレートソースに一時的にアクセスできない
    #[error("テンプレートを読み込めません: {0}")]
    Unavailable(String),

    /// テンプレートのコンパイル・レンダリングに失敗（リトライしても回復しない）
    #[error("テンプレートのレンダリングに失敗: {0}")]
    Render(String),
}

impl TemplateError {
    /// リトライで回復し得るエラーかどうか
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
