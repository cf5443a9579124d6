//! # ジョブ
//!
//! ジョブストアに永続化される作業単位と、再キュー時のバックオフ計算を定義する。
//!
//! ## ライフサイクル
//!
//! ```text
//! [enqueue] → 待機中 ──reserve──→ 予約中 ──dequeue──→ (削除)
//!                ↑                  │
//!                └─────requeue──────┤ (active_at = now + backoff, retry_count += 1)
//!                                   └──bury──→ dead_jobs
//! ```
//!
//! 予約（claim）には可視性タイムアウトがあり、`claimed_until` を過ぎた予約は
//! 別のワーカーが再取得できる。予約のたびに新しい [`ClaimToken`] が払い出され、
//! 古いトークンでの `dequeue` / `requeue` は無視される。

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// 配信ジョブのキュー名
pub const DELIVERY_QUEUE: &str = "deliveries";

/// ジョブ ID（ストアが採番する連番）
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[display("{_0}")]
pub struct JobId(i64);

impl JobId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

define_uuid_id! {
    /// 予約トークン
    ///
    /// 予約のたびに払い出される。可視性タイムアウト経過後に別ワーカーが
    /// 再予約した場合、元のワーカーのトークンは無効になる。
    pub struct ClaimToken;
}

/// 予約済みのジョブ
///
/// `reserve` の戻り値。ペイロードは不透明なバイト列（JSON 文字列）として保持し、
/// デコードはワーカー側で行う（デコード不能なペイロードもジョブとして扱えるようにするため）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id:            JobId,
    pub queue:         String,
    pub payload:       String,
    pub retry_count:   u32,
    pub active_at:     DateTime<Utc>,
    pub created_at:    DateTime<Utc>,
    pub updated_at:    DateTime<Utc>,
    pub claim_token:   ClaimToken,
    pub claimed_until: DateTime<Utc>,
}

impl Job {
    /// このジョブの予約
    pub fn lease(&self) -> Lease {
        Lease {
            job_id: self.id,
            token:  self.claim_token.clone(),
        }
    }
}

/// ジョブの予約（ジョブ ID と予約トークンの組）
///
/// 予約中のワーカーだけが結果を書き込めるよう、メッセージのステータス更新に渡す。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub job_id: JobId,
    pub token:  ClaimToken,
}

/// 新規ジョブ（INSERT 用データ型）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub queue:     String,
    pub payload:   String,
    pub active_at: DateTime<Utc>,
}

impl NewJob {
    /// 即時実行可能なジョブを作成する
    pub fn immediate(queue: impl Into<String>, payload: String, now: DateTime<Utc>) -> Self {
        Self {
            queue: queue.into(),
            payload,
            active_at: now,
        }
    }
}

/// リトライポリシー
///
/// バックオフは `min(base × 2^retry_count, ceiling)`。
/// `retry_count` に対して単調非減少であり、恒久的に壊れたジョブが
/// ホットループしないことを保証する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base:         Duration,
    ceiling:      Duration,
    max_attempts: u32,
}

impl RetryPolicy {
    /// バックオフの初期値の既定
    pub const DEFAULT_BASE: Duration = Duration::from_secs(30);
    /// バックオフの上限の既定
    pub const DEFAULT_CEILING: Duration = Duration::from_secs(60 * 60);

    /// 新しいポリシーを作成する
    ///
    /// `ceiling` が `base` より小さい場合は `base` に切り上げる。
    /// `max_attempts` は最低 1（初回試行のみ）。
    pub fn new(base: Duration, ceiling: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            ceiling: ceiling.max(base),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// `retry_count` 回目の再キュー時のバックオフ
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry_count);
        self.base.saturating_mul(factor).min(self.ceiling)
    }

    /// 再キュー後の `active_at` を計算する
    pub fn next_active_at(&self, now: DateTime<Utc>, retry_count: u32) -> DateTime<Utc> {
        let delta = TimeDelta::from_std(self.backoff(retry_count)).unwrap_or(TimeDelta::MAX);
        now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// 現在の試行（`retry_count` 回目のリトライ）が最後の試行かどうか
    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count.saturating_add(1) >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE, Self::DEFAULT_CEILING, 10)
    }
}
