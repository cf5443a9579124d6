//! # キャンペーン
//!
//! クライアントが発行する「オーディエンスへの一斉配信」要求と、
//! ステータス集計ループが書き込む集計値を定義する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 説明 |
//! |---|------------|------|
//! | [`Campaign`] | キャンペーン | 配信内容とオーディエンス記述子 |
//! | [`SendTo`] | オーディエンス記述子 | タグ + 単一 GUID またはメールアドレスのリスト |
//! | [`AudienceKind`] | オーディエンス種別 | `users` / `spaces` / `orgs` / `emails` / `everyone` |
//! | [`CampaignAggregate`] | 集計値 | 送信済み・失敗・合計 |
//!
//! ## 不変条件
//!
//! 集計フィールドは完了時に一度だけ書き込まれる。`sending` → `completed` の遷移を
//! 行うのはステータス集計ループのみ。

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::message::MessageStatus;

define_uuid_id! {
    /// キャンペーン ID
    pub struct CampaignId;
}

/// キャンペーンステータス
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    IntoStaticStr,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Sending,
    Completed,
}

/// オーディエンス種別
///
/// `send_to` のタグ文字列に対応する。ディスパッチャはこの値をキーに
/// 戦略テーブルを引く。
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
pub enum AudienceKind {
    Users,
    Spaces,
    Orgs,
    Emails,
    Everyone,
}

/// オーディエンスの対象
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AudienceTarget {
    /// 単一 GUID（ユーザー / スペース / 組織）
    Guid(String),
    /// メールアドレスのリスト
    Emails(Vec<String>),
    /// 対象指定なし（`everyone`）
    All,
}

/// オーディエンス記述子
///
/// タグは未知の値も保持する（未知のタグはディスパッチ時に
/// `NoStrategy` エラーとして扱う）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendTo {
    pub tag:    String,
    pub target: AudienceTarget,
}

impl SendTo {
    pub fn user(guid: impl Into<String>) -> Self {
        Self {
            tag:    AudienceKind::Users.to_string(),
            target: AudienceTarget::Guid(guid.into()),
        }
    }

    pub fn space(guid: impl Into<String>) -> Self {
        Self {
            tag:    AudienceKind::Spaces.to_string(),
            target: AudienceTarget::Guid(guid.into()),
        }
    }

    pub fn org(guid: impl Into<String>) -> Self {
        Self {
            tag:    AudienceKind::Orgs.to_string(),
            target: AudienceTarget::Guid(guid.into()),
        }
    }

    pub fn emails<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tag:    AudienceKind::Emails.to_string(),
            target: AudienceTarget::Emails(emails.into_iter().map(Into::into).collect()),
        }
    }

    pub fn everyone() -> Self {
        Self {
            tag:    AudienceKind::Everyone.to_string(),
            target: AudienceTarget::All,
        }
    }
}

/// キャンペーン
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Campaign {
    pub id:               CampaignId,
    pub send_to:          SendTo,
    pub campaign_type_id: String,
    pub client_id:        String,
    pub text:             String,
    pub html:             String,
    pub subject:          String,
    pub template_id:      String,
    pub reply_to:         String,
    pub sender_id:        String,
    pub status:           CampaignStatus,
    pub sent_messages:    i64,
    pub failed_messages:  i64,
    pub total_messages:   i64,
    pub start_time:       DateTime<Utc>,
    /// ディスパッチャが全宛先の書き込みを終えた時刻
    ///
    /// 未設定の間はメッセージがまだ増える可能性があるため、集計ループは完了させない。
    pub dispatched_at:    Option<DateTime<Utc>>,
}

/// メッセージのステータス別件数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageStatusCounts {
    pub queued:        i64,
    pub retry:         i64,
    pub delivered:     i64,
    pub failed:        i64,
    pub undeliverable: i64,
}

impl MessageStatusCounts {
    /// `(ステータス, 件数)` の列から組み立てる
    pub fn from_pairs(pairs: impl IntoIterator<Item = (MessageStatus, i64)>) -> Self {
        pairs
            .into_iter()
            .fold(Self::default(), |mut counts, (status, count)| {
                match status {
                    MessageStatus::Queued => counts.queued += count,
                    MessageStatus::Retry => counts.retry += count,
                    MessageStatus::Delivered => counts.delivered += count,
                    MessageStatus::Failed => counts.failed += count,
                    MessageStatus::Undeliverable => counts.undeliverable += count,
                }
                counts
            })
    }

    /// 配信待ち（`queued` + `retry`）の件数
    pub fn pending(&self) -> i64 {
        self.queued + self.retry
    }

    /// 全メッセージ数
    pub fn all(&self) -> i64 {
        self.pending() + self.delivered + self.failed + self.undeliverable
    }
}

/// キャンペーン集計値
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CampaignAggregate {
    pub sent_messages:   i64,
    pub failed_messages: i64,
    pub total_messages:  i64,
}

impl CampaignAggregate {
    /// ステータス別件数から集計値を計算する
    ///
    /// `total = sent + failed`。`undeliverable` はポリシーによる除外であり合計に含めない。
    pub fn from_counts(counts: &MessageStatusCounts) -> Self {
        Self {
            sent_messages:   counts.delivered,
            failed_messages: counts.failed,
            total_messages:  counts.delivered + counts.failed,
        }
    }
}

/// キャンペーンを完了させるべきかを判定し、完了させる場合は集計値を返す
///
/// - ディスパッチが終わっていなければ（`dispatched_at` が未設定なら）未完了
/// - 配信待ちメッセージが 1 件でもあれば未完了
/// - メッセージが 0 件の場合、`start_time` から `grace` 経過するまでは未完了
pub fn completion(
    counts: &MessageStatusCounts,
    start_time: DateTime<Utc>,
    dispatched_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    grace: TimeDelta,
) -> Option<CampaignAggregate> {
    if dispatched_at.is_none() || counts.pending() > 0 {
        return None;
    }
    if counts.all() == 0 && now - start_time < grace {
        return None;
    }
    Some(CampaignAggregate::from_counts(counts))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[rstest]
    #[case("users", AudienceKind::Users)]
    #[case("spaces", AudienceKind::Spaces)]
    #[case("orgs", AudienceKind::Orgs)]
    #[case("emails", AudienceKind::Emails)]
    #[case("everyone", AudienceKind::Everyone)]
    fn audience_kindはタグ文字列から復元できる(#[case] tag: &str, #[case] kind: AudienceKind) {
        assert_eq!(AudienceKind::from_str(tag).unwrap(), kind);
        assert_eq!(kind.to_string(), tag);
    }

    #[test]
    fn 未知のタグはaudience_kindに変換できない() {
        assert!(AudienceKind::from_str("teams").is_err());
    }

    #[test]
    fn 配信済み2件と失敗1件でcompletedの集計値になる() {
        let counts = MessageStatusCounts::from_pairs([
            (MessageStatus::Delivered, 2),
            (MessageStatus::Failed, 1),
        ]);

        let aggregate = completion(&counts, t0(), Some(t0()), t0(), TimeDelta::seconds(60));

        assert_eq!(
            aggregate,
            Some(CampaignAggregate {
                sent_messages:   2,
                failed_messages: 1,
                total_messages:  3,
            })
        );
    }

    #[rstest]
    #[case(MessageStatus::Queued)]
    #[case(MessageStatus::Retry)]
    fn 配信待ちが残っている間は完了しない(#[case] pending: MessageStatus) {
        let counts =
            MessageStatusCounts::from_pairs([(MessageStatus::Delivered, 5), (pending, 1)]);

        assert_eq!(
            completion(
                &counts,
                t0(),
                Some(t0()),
                t0() + TimeDelta::hours(1),
                TimeDelta::seconds(60)
            ),
            None
        );
    }

    #[test]
    fn undeliverableは合計に含めない() {
        let counts = MessageStatusCounts::from_pairs([
            (MessageStatus::Delivered, 1),
            (MessageStatus::Undeliverable, 4),
        ]);

        let aggregate = completion(&counts, t0(), Some(t0()), t0(), TimeDelta::zero()).unwrap();

        assert_eq!(aggregate.total_messages, 1);
        assert_eq!(aggregate.sent_messages, 1);
        assert_eq!(aggregate.failed_messages, 0);
    }

    #[test]
    fn メッセージ0件のキャンペーンは猶予期間経過後に完了する() {
        let counts = MessageStatusCounts::default();
        let grace = TimeDelta::seconds(60);

        let dispatched = Some(t0());

        assert_eq!(
            completion(&counts, t0(), dispatched, t0() + TimeDelta::seconds(10), grace),
            None
        );
        assert_eq!(
            completion(&counts, t0(), dispatched, t0() + TimeDelta::seconds(61), grace),
            Some(CampaignAggregate {
                sent_messages:   0,
                failed_messages: 0,
                total_messages:  0,
            })
        );
    }

    #[test]
    fn ディスパッチが終わるまでは完了しない() {
        let counts = MessageStatusCounts::from_pairs([(MessageStatus::Delivered, 3)]);
        let later = t0() + TimeDelta::hours(1);
        let grace = TimeDelta::seconds(60);

        assert_eq!(completion(&counts, t0(), None, later, grace), None);
        assert_eq!(
            completion(&counts, t0(), Some(t0()), later, grace).map(|a| a.sent_messages),
            Some(3)
        );
    }

    #[test]
    fn send_toのコンストラクタがタグと対象を設定する() {
        assert_eq!(
            SendTo::emails(["a@example.com", "b@example.com"]),
            SendTo {
                tag:    "emails".to_string(),
                target: AudienceTarget::Emails(vec![
                    "a@example.com".to_string(),
                    "b@example.com".to_string(),
                ]),
            }
        );
        assert_eq!(SendTo::everyone().target, AudienceTarget::All);
        assert_eq!(SendTo::space("space-1").tag, "spaces");
    }
}
