//! # メッセージ
//!
//! 宛先ひとりぶんの配信結果を表す、ユーザーから参照可能な永続レコード。
//!
//! ## 不変条件
//!
//! - (キャンペーン, 宛先) の組ごとにちょうど 1 行存在する
//! - ディスパッチャがジョブより先に `queued` で作成する（ジョブ実行前でも参照可能）
//! - ステータスを変更するのは配信プロセスとリトライハンドラのみ

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::campaign::CampaignId;

define_uuid_id! {
    /// メッセージ ID（通知 ID）
    ///
    /// messages テーブルの主キー。ディスパッチ時に生成し、
    /// ジョブペイロードとメールヘッダーの両方に載せる。
    pub struct MessageId;
}

/// メッセージステータス
///
/// `delivered` / `failed` / `undeliverable` が終端。
/// `queued` / `retry` は配信待ちで、キャンペーン集計では未完了として扱う。
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    IntoStaticStr,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Queued,
    Retry,
    Delivered,
    Failed,
    Undeliverable,
}

impl MessageStatus {
    /// 終端ステータスかどうか
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed | Self::Undeliverable)
    }
}

/// メッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id:          MessageId,
    pub campaign_id: Option<CampaignId>,
    pub status:      MessageStatus,
    pub updated_at:  DateTime<Utc>,
}

impl Message {
    /// ディスパッチ時の初期状態（`queued`）で作成する
    pub fn queued(id: MessageId, campaign_id: Option<CampaignId>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            campaign_id,
            status: MessageStatus::Queued,
            updated_at: now,
        }
    }

    /// ステータスを遷移させる
    ///
    /// 同じステータスを再適用しても `updated_at` 以外は変わらない。
    pub fn with_status(self, status: MessageStatus, now: DateTime<Utc>) -> Self {
        Self {
            status,
            updated_at: now,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::TimeDelta;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(MessageStatus::Queued, "queued")]
    #[case(MessageStatus::Retry, "retry")]
    #[case(MessageStatus::Delivered, "delivered")]
    #[case(MessageStatus::Failed, "failed")]
    #[case(MessageStatus::Undeliverable, "undeliverable")]
    fn message_statusの文字列変換が往復する(#[case] status: MessageStatus, #[case] s: &str) {
        assert_eq!(status.to_string(), s);
        assert_eq!(MessageStatus::from_str(s).unwrap(), status);
    }

    #[rstest]
    #[case(MessageStatus::Queued, false)]
    #[case(MessageStatus::Retry, false)]
    #[case(MessageStatus::Delivered, true)]
    #[case(MessageStatus::Failed, true)]
    #[case(MessageStatus::Undeliverable, true)]
    fn is_terminalは終端ステータスで真(#[case] status: MessageStatus, #[case] expected: bool) {
        assert_eq!(status.is_terminal(), expected);
    }

    #[test]
    fn 同じステータスの再適用はupdated_at以外を変えない() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let later = now + TimeDelta::seconds(5);
        let message = Message::queued(MessageId::new(), None, now);

        let first = message.with_status(MessageStatus::Delivered, now);
        let second = first.clone().with_status(MessageStatus::Delivered, later);

        assert_eq!(second.id, first.id);
        assert_eq!(second.status, first.status);
        assert_eq!(second.campaign_id, first.campaign_id);
        assert_eq!(second.updated_at, later);
    }
}
