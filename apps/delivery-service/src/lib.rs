//! # Delivery Service ライブラリ
//!
//! 通知配信パイプラインの実行時コンポーネントを公開する。
//!
//! - [`dispatch`] - キャンペーンを宛先ごとの配信ジョブに展開する
//! - [`queue`] - ジョブストア上のキュー操作
//! - [`delivery`] - 配信 1 件の処理（状態遷移）
//! - [`worker`] - ワーカーとワーカープール
//! - [`status`] - キャンペーンステータス集計とメッセージ削除
//! - [`config`] - 環境変数からの設定読み込み
//! - [`bootstrap`] - 接続プールと設定からのコンポーネント組み立て
//!
//! ホストサービスはディスパッチャをリクエスト処理に組み込み、
//! ワーカープールと集計ループをブートシーケンスで起動する。

pub mod bootstrap;
pub mod config;
pub mod delivery;
pub mod dispatch;
pub mod queue;
pub mod status;
pub mod worker;
