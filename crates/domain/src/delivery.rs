//! # 配信ペイロード
//!
//! ジョブのペイロードとして JSON でシリアライズされる配信レコード。
//!
//! ## ワイヤフォーマットの互換性
//!
//! 処理中のジョブは再起動やデプロイをまたいで残るため、フォーマットは
//! 後方互換でなければならない:
//!
//! - 未知のフィールドは無視する
//! - 欠けているフィールドはゼロ値（空文字列 / `None`）としてデコードする
//! - `message_id` だけは必須（ステータスを書き戻す先がないため）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{campaign::CampaignId, message::MessageId};

/// HTML 本文から抽出した構成要素
///
/// キャンペーン単位で一度だけ抽出し、全宛先の配信で共有する。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HtmlParts {
    pub body_content:    String,
    pub body_attributes: String,
    pub head:            String,
    pub doctype:         String,
}

impl HtmlParts {
    pub fn is_empty(&self) -> bool {
        self.body_content.trim().is_empty()
    }
}

/// HTML 本文の抽出エラー
///
/// キャンペーン全体のディスパッチを中断する（部分的なレンダリングはできないため）。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("HTML の解析に失敗: {0}")]
pub struct HtmlExtractError(pub String);

/// 配信オプション（件名・本文・返信先・種別・テンプレート）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryOptions {
    pub reply_to:           String,
    pub subject:            String,
    pub text:               String,
    pub html:               HtmlParts,
    /// 種別 ID（キャンペーンの場合はキャンペーン種別 ID）
    pub kind_id:            String,
    pub kind_description:   String,
    pub source_description: String,
    pub template_id:        String,
    /// 「なぜこのメールが届いたか」の説明文
    pub endorsement:        String,
}

/// 配信レコード
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub message_id:        MessageId,
    #[serde(default)]
    pub campaign_id:       Option<CampaignId>,
    #[serde(default)]
    pub client_id:         String,
    #[serde(default)]
    pub user_guid:         Option<String>,
    #[serde(default)]
    pub email:             Option<String>,
    #[serde(default)]
    pub space_guid:        Option<String>,
    #[serde(default)]
    pub organization_guid: Option<String>,
    #[serde(default)]
    pub options:           DeliveryOptions,
    #[serde(default)]
    pub uaa_host:          String,
    #[serde(default)]
    pub scope:             String,
    /// トレーシング相関 ID
    #[serde(default)]
    pub vcap_request_id:   String,
    /// 元リクエストの受信時刻
    #[serde(default)]
    pub request_received:  Option<DateTime<Utc>>,
}

impl Delivery {
    /// ジョブペイロードにエンコードする
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// ジョブペイロードからデコードする
    pub fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// 宛先のユーザー GUID（空文字列は未指定として扱う）
    pub fn user_guid(&self) -> Option<&str> {
        self.user_guid.as_deref().filter(|guid| !guid.is_empty())
    }

    /// 宛先のメールアドレス（空文字列は未指定として扱う）
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref().filter(|email| !email.is_empty())
    }
}
