//! # 配信サービス設定
//!
//! 環境変数から配信サービスの設定を読み込む。
//! 不正な値はパニックせず [`ConfigError`] として返す。

use std::{env, str::FromStr, time::Duration};

use chrono::TimeDelta;
use thiserror::Error;

/// 設定読み込みエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} が設定されていません")]
    Missing(&'static str),

    #[error("{key} の値が不正です（{value}）: {reason}")]
    Invalid {
        key:    &'static str,
        value:  String,
        reason: String,
    },
}

/// メール送信バックエンド
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum MailBackend {
    Smtp,
    Ses,
    Noop,
}

/// メール送信の設定
///
/// `MAIL_BACKEND` 環境変数で送信バックエンドを切り替える:
/// - `smtp`: SMTP ゲートウェイ経由で送信
/// - `ses`: Amazon SES v2 経由で送信
/// - `noop`: 送信しない（ログ出力のみ）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailConfig {
    pub backend:         MailBackend,
    pub smtp_host:       String,
    pub smtp_port:       u16,
    /// 送信元メールアドレス
    pub sender_address:  String,
    /// `Message-ID` の右辺に使うドメイン
    pub delivery_domain: String,
}

/// ID プロバイダ（UAA）の設定
#[derive(Clone, PartialEq, Eq)]
pub struct UaaConfig {
    pub host:          String,
    pub client_id:     String,
    pub client_secret: String,
}

impl std::fmt::Debug for UaaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UaaConfig")
            .field("host", &self.host)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// 配信サービスの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryServiceConfig {
    /// データベース接続 URL
    pub database_url:           String,
    /// 水平スケール時のインスタンス番号
    pub instance_index:         u32,
    /// インスタンスあたりのワーカー数
    pub worker_count:           u32,
    pub mail:                   MailConfig,
    pub uaa:                    UaaConfig,
    /// リソースディレクトリ（スペース / 組織）のベース URL
    pub directory_host:         String,
    /// キャンペーン集計の間隔
    pub status_poll_interval:   Duration,
    /// ジョブが空のときの待機間隔
    pub queue_poll_interval:    Duration,
    /// 予約の可視性タイムアウト
    pub job_visibility_timeout: Duration,
    pub max_delivery_attempts:  u32,
    /// メッセージの保持期間
    pub message_retention:      TimeDelta,
}

impl DeliveryServiceConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 任意の参照関数から設定を読み込む
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(&lookup);

        Ok(Self {
            database_url:           vars.required("DATABASE_URL")?,
            instance_index:         vars.parsed("INSTANCE_INDEX", 0)?,
            worker_count:           vars.parsed("WORKER_COUNT", 10)?,
            mail:                   MailConfig {
                backend:         vars.parsed("MAIL_BACKEND", MailBackend::Smtp)?,
                smtp_host:       vars.or("SMTP_HOST", "localhost"),
                smtp_port:       vars.parsed("SMTP_PORT", 1025)?,
                sender_address:  vars.required("SENDER_ADDRESS")?,
                delivery_domain: vars.or("DELIVERY_DOMAIN", "localhost"),
            },
            uaa:                    UaaConfig {
                host:          vars.required("UAA_HOST")?,
                client_id:     vars.required("UAA_CLIENT_ID")?,
                client_secret: vars.required("UAA_CLIENT_SECRET")?,
            },
            directory_host:         vars.required("DIRECTORY_HOST")?,
            status_poll_interval:   Duration::from_secs(
                vars.parsed("STATUS_POLL_INTERVAL_SECS", 60)?,
            ),
            queue_poll_interval:    Duration::from_millis(vars.parsed("QUEUE_POLL_INTERVAL_MS", 500)?),
            job_visibility_timeout: Duration::from_secs(
                vars.parsed("JOB_VISIBILITY_TIMEOUT_SECS", 300)?,
            ),
            max_delivery_attempts:  vars.parsed("MAX_DELIVERY_ATTEMPTS", 10)?,
            message_retention:      TimeDelta::days(vars.parsed("MESSAGE_RETENTION_DAYS", 30)?),
        })
    }
}

struct Vars<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use maplit::hashmap;
    use pretty_assertions::assert_eq;

    use super::*;

    fn required_vars() -> HashMap<&'static str, &'static str> {
        hashmap! {
            "DATABASE_URL" => "postgres://localhost/hikyaku",
            "SENDER_ADDRESS" => "no-reply@example.com",
            "UAA_HOST" => "https://uaa.example.com",
            "UAA_CLIENT_ID" => "hikyaku",
            "UAA_CLIENT_SECRET" => "secret",
            "DIRECTORY_HOST" => "https://api.example.com",
        }
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<DeliveryServiceConfig, ConfigError> {
        DeliveryServiceConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn 必須項目だけで既定値が入る() {
        let config = load(&required_vars()).unwrap();

        assert_eq!(config.instance_index, 0);
        assert_eq!(config.worker_count, 10);
        assert_eq!(config.mail.backend, MailBackend::Smtp);
        assert_eq!(config.mail.smtp_port, 1025);
        assert_eq!(config.mail.delivery_domain, "localhost");
        assert_eq!(config.status_poll_interval, Duration::from_secs(60));
        assert_eq!(config.queue_poll_interval, Duration::from_millis(500));
        assert_eq!(config.job_visibility_timeout, Duration::from_secs(300));
        assert_eq!(config.max_delivery_attempts, 10);
        assert_eq!(config.message_retention, TimeDelta::days(30));
    }

    #[test]
    fn 必須項目がなければmissingになる() {
        let mut vars = required_vars();
        vars.remove("UAA_HOST");

        assert_eq!(load(&vars), Err(ConfigError::Missing("UAA_HOST")));
    }

    #[test]
    fn 数値でない値はinvalidになる() {
        let mut vars = required_vars();
        vars.insert("WORKER_COUNT", "many");

        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { key: "WORKER_COUNT", .. })
        ));
    }

    #[test]
    fn mail_backendを切り替えられる() {
        let mut vars = required_vars();
        vars.insert("MAIL_BACKEND", "ses");
        vars.insert("INSTANCE_INDEX", "2");

        let config = load(&vars).unwrap();

        assert_eq!(config.mail.backend, MailBackend::Ses);
        assert_eq!(config.instance_index, 2);
    }

    #[test]
    fn 未知のmail_backendはinvalidになる() {
        let mut vars = required_vars();
        vars.insert("MAIL_BACKEND", "carrier-pigeon");

        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { key: "MAIL_BACKEND", .. })
        ));
    }

    #[test]
    fn debug出力にシークレットを含めない() {
        let config = load(&required_vars()).unwrap();

        assert!(!format!("{config:?}").contains("secret\""));
        assert!(format!("{:?}", config.uaa).contains("[REDACTED]"));
    }
}
