//! # 配信停止と受信記録
//!
//! 配信停止レコードは別の設定 API が書き込み、配信プロセスからは読み取り専用。
//! 受信記録（receipt）は配信プロセスが冪等に upsert する。

use serde::{Deserialize, Serialize};

use crate::campaign::CampaignId;

/// 種別単位の配信停止レコード
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unsubscriber {
    pub user_guid:        String,
    pub campaign_type_id: String,
}

/// 受信記録のキー
///
/// 単発送信は (ユーザー, クライアント, 種別)、キャンペーンは (キャンペーン, ユーザー) で一意。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReceiptKey {
    Kind {
        user_guid: String,
        client_id: String,
        kind_id:   String,
    },
    Campaign {
        campaign_id: CampaignId,
        user_guid:   String,
    },
}
