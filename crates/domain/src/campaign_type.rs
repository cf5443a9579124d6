//! # キャンペーン種別
//!
//! 通知の種類（kind）。`critical` フラグが立った種別は配信停止設定を無視して
//! 必ず配信される。

use serde::{Deserialize, Serialize};

/// キャンペーン種別
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignType {
    pub id:          String,
    pub name:        String,
    pub description: String,
    pub critical:    bool,
}
