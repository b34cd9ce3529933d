//! 历史评估记录
//!
//! 每次成功的流水线运行恰好追加一条记录，记录创建后不再修改，供
//! 同一用户后续的对比阶段按时间升序读取。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::stage::AggregateSummary;

/// 一条已持久化的历史总评
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub summary: AggregateSummary,
}

impl HistoryRecord {
    pub fn new(user_id: impl Into<String>, summary: AggregateSummary) -> Self {
        Self {
            user_id: user_id.into(),
            timestamp: Utc::now(),
            summary,
        }
    }
}
