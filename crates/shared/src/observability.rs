//! # Observability 基盤
//!
//! 配信プロセスのトレーシングを初期化する。
//!
//! ## スパン構成
//!
//! ```text
//! service (service, instance.index, instance.workers)
//! ├── worker (worker.id)
//! │   └── job (job.id, job.retry_count)
//! └── （集計ループ）
//! ```
//!
//! ルートスパン [`TracingConfig::root_span`] の下でワーカーと集計ループを起動すると、
//! 複数インスタンスのログを `instance.index` で絞り込める。JSON 出力ではスパンの一覧を
//! 出すので、ジョブのログにもインスタンス番号とワーカー ID が付く。

/// `RUST_LOG` が未設定のときのフィルタ
pub const DEFAULT_FILTER: &str = "info,hikyaku=debug";

/// ログ出力形式（`LOG_FORMAT`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// 1 行 1 JSON（本番向け）
    Json,
    #[default]
    Pretty,
}

impl LogFormat {
    /// `LOG_FORMAT` の値を解釈する
    ///
    /// 大文字小文字は区別しない。未設定なら [`Pretty`](LogFormat::Pretty)。
    /// 不明な値も Pretty にし、stderr に警告を出す（subscriber 初期化前のため）。
    pub fn from_value(value: Option<&str>) -> Self {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return Self::default();
        };
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else if value.eq_ignore_ascii_case("pretty") {
            Self::Pretty
        } else {
            eprintln!("警告: 不明な LOG_FORMAT={value:?} のため pretty で出力します");
            Self::Pretty
        }
    }
}

/// トレーシング設定とプロセスの識別情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    pub service_name:   String,
    pub log_format:     LogFormat,
    /// 水平スケール時のインスタンス番号
    pub instance_index: Option<u32>,
    /// インスタンスあたりのワーカー数
    pub worker_count:   Option<u32>,
}

impl TracingConfig {
    pub fn new(service_name: impl Into<String>, log_format: LogFormat) -> Self {
        Self {
            service_name: service_name.into(),
            log_format,
            instance_index: None,
            worker_count: None,
        }
    }

    /// `LOG_FORMAT` から出力形式を決める
    pub fn from_env(service_name: impl Into<String>) -> Self {
        let log_format = LogFormat::from_value(std::env::var("LOG_FORMAT").ok().as_deref());
        Self::new(service_name, log_format)
    }

    /// インスタンス番号とワーカー数をルートスパンに載せる
    ///
    /// 設定の読み込みはトレーシング初期化の後なので、初期化後に付け足す。
    pub fn with_instance(mut self, instance_index: u32, worker_count: u32) -> Self {
        self.instance_index = Some(instance_index);
        self.worker_count = Some(worker_count);
        self
    }

    /// プロセスのルートスパン
    ///
    /// インスタンス情報が未設定ならそのフィールドは記録されない。
    pub fn root_span(&self) -> tracing::Span {
        tracing::info_span!(
            "service",
            service = %self.service_name,
            instance.index = self.instance_index,
            instance.workers = self.worker_count
        )
    }
}

/// グローバル subscriber を登録する
///
/// フィルタは `RUST_LOG`、未設定なら [`DEFAULT_FILTER`]。
/// `tracing_error::ErrorLayer` も登録するので、`InfraError` が捕捉する
/// `SpanTrace` にワーカー ID やジョブ ID が含まれる。
/// 二重に初期化した場合はエラーを返す。
#[cfg(feature = "observability")]
pub fn init_tracing(
    config: &TracingConfig,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer(config.log_format, std::io::stdout))
        .with(tracing_error::ErrorLayer::default())
        .try_init()
}

/// 出力形式に応じた fmt レイヤー
///
/// JSON ではイベントのフィールドをトップレベルに展開し、親スパンの一覧を `spans` に出す。
#[cfg(feature = "observability")]
fn fmt_layer<S, W>(
    format: LogFormat,
    writer: W,
) -> Box<dyn tracing_subscriber::Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a> + 'static,
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    use tracing_subscriber::Layer as _;

    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(true)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().with_writer(writer).boxed(),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use tracing_subscriber::fmt::MakeWriter;

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn log_formatは大文字小文字を区別しない() {
        assert_eq!(LogFormat::from_value(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::from_value(Some(" JSON ")), LogFormat::Json);
        assert_eq!(LogFormat::from_value(Some("Pretty")), LogFormat::Pretty);
    }

    #[test]
    fn 未設定や不明なlog_formatはprettyになる() {
        assert_eq!(LogFormat::from_value(None), LogFormat::Pretty);
        assert_eq!(LogFormat::from_value(Some("")), LogFormat::Pretty);
        assert_eq!(LogFormat::from_value(Some("yaml")), LogFormat::Pretty);
    }

    #[test]
    fn with_instanceでインスタンス情報を付け足す() {
        let config =
            TracingConfig::new("delivery-service", LogFormat::Json).with_instance(2, 10);

        assert_eq!(config.service_name, "delivery-service");
        assert_eq!(config.instance_index, Some(2));
        assert_eq!(config.worker_count, Some(10));
    }

    #[cfg(feature = "observability")]
    #[test]
    fn json出力のログにルートスパンのインスタンス番号が付く() {
        use tracing_subscriber::layer::SubscriberExt;

        let captured = Captured::default();
        let config =
            TracingConfig::new("delivery-service", LogFormat::Json).with_instance(2, 10);
        let subscriber =
            tracing_subscriber::registry().with(fmt_layer(LogFormat::Json, captured.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let _root = config.root_span().entered();
            let _worker = tracing::info_span!("worker", worker.id = "2-3").entered();
            tracing::info!("ジョブを処理します");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains(r#""instance.index":2"#), "{output}");
        assert!(output.contains(r#""service":"delivery-service""#), "{output}");
        assert!(output.contains(r#""worker.id":"2-3""#), "{output}");
    }

    #[test]
    fn インスタンス情報がなければルートスパンに記録しない() {
        let captured = Captured::default();
        let config = TracingConfig::new("delivery-service", LogFormat::Json);
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_span_list(true)
            .with_writer(captured.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let _root = config.root_span().entered();
            tracing::info!("起動します");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains(r#""service":"delivery-service""#), "{output}");
        assert!(!output.contains("instance.index"), "{output}");
    }
}
