//! # PostgreSQL データベース接続管理
//!
//! 接続プールの作成、マイグレーション、トランザクションコンテキストを提供する。
//!
//! ## 書き込みの原則
//!
//! - 複数の行をまたいで原子的でなければならない書き込み（ディスパッチ時の
//!   メッセージ行 + ジョブ行）は [`TxContext`] を必須引数に取る
//! - 1 文で完結する書き込み（ジョブの予約・削除・再スケジュール、ステータス更新）は
//!   プールに直接発行する。文単位の原子性で十分なため

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, Transaction, postgres::PgPoolOptions};

use crate::error::InfraError;

/// データベースマイグレーションを実行する
///
/// sqlx が PostgreSQL の advisory lock を使用するため、
/// 複数インスタンスから同時に呼び出しても安全。
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}

/// PostgreSQL 接続プールを作成する
///
/// 最大接続数はワーカー数 + 集計ループ + ディスパッチ用の余裕分を見込んで決める。
///
/// # 例
///
/// ```rust,ignore
/// use hikyaku_infra::db;
///
/// let pool = db::create_pool("postgres://localhost/hikyaku", 12).await?;
/// ```
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

// =============================================================================
// TxContext
// =============================================================================

#[cfg(any(test, feature = "test-utils"))]
type StagedWrite = Box<dyn FnOnce() + Send>;

/// トランザクションコンテキスト
///
/// 原子的な書き込みを要求するリポジトリメソッドの必須引数。
///
/// # ライフサイクル
///
/// 1. `TransactionManager::begin()` で作成
/// 2. 書き込みメソッドに `&mut TxContext` として渡す
/// 3. `commit()` でコミット、またはドロップでロールバック
pub struct TxContext(TxContextInner);

enum TxContextInner {
    Pg(Transaction<'static, Postgres>),
    /// インメモリモック用。書き込みは `commit()` まで保留され、
    /// ドロップ時には破棄される（ロールバック相当）
    #[cfg(any(test, feature = "test-utils"))]
    Mock(Vec<StagedWrite>),
}

impl TxContext {
    pub(crate) async fn begin_pg(pool: &PgPool) -> Result<Self, InfraError> {
        Ok(Self(TxContextInner::Pg(pool.begin().await?)))
    }

    /// テスト用のモック TxContext を作成する
    #[cfg(any(test, feature = "test-utils"))]
    pub fn mock() -> Self {
        Self(TxContextInner::Mock(Vec::new()))
    }

    /// モックリポジトリの書き込みをコミット時まで保留する
    ///
    /// Postgres の TxContext に対して呼ぶのはバグ。
    #[cfg(any(test, feature = "test-utils"))]
    pub(crate) fn stage(&mut self, write: impl FnOnce() + Send + 'static) {
        match &mut self.0 {
            TxContextInner::Mock(writes) => writes.push(Box::new(write)),
            TxContextInner::Pg(_) => {
                panic!("BUG: stage() called on Pg TxContext. Pg repos must use conn().")
            }
        }
    }

    /// トランザクションをコミットする
    ///
    /// 呼ばずにドロップすると、sqlx が自動的にロールバックする。
    pub async fn commit(self) -> Result<(), InfraError> {
        match self.0 {
            TxContextInner::Pg(tx) => {
                tx.commit().await?;
                Ok(())
            }
            #[cfg(any(test, feature = "test-utils"))]
            TxContextInner::Mock(writes) => {
                for write in writes {
                    write();
                }
                Ok(())
            }
        }
    }

    /// トランザクション内の DB コネクションを取得する
    pub(crate) fn conn(&mut self) -> &mut PgConnection {
        match &mut self.0 {
            TxContextInner::Pg(tx) => tx,
            #[cfg(any(test, feature = "test-utils"))]
            TxContextInner::Mock(_) => {
                panic!("BUG: conn() called on Mock TxContext. Mock repos should not call conn().")
            }
        }
    }
}

// =============================================================================
// TransactionManager
// =============================================================================

/// トランザクション管理 trait
///
/// ディスパッチャが宛先ごとのトランザクションを開始するための抽象化。
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// トランザクションを開始し、TxContext を返す
    async fn begin(&self) -> Result<TxContext, InfraError>;
}

/// Postgres 用 TransactionManager 実装
pub struct PgTransactionManager {
    pool: PgPool,
}

impl PgTransactionManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionManager for PgTransactionManager {
    async fn begin(&self) -> Result<TxContext, InfraError> {
        TxContext::begin_pg(&self.pool).await
    }
}
