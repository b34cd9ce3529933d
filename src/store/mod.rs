//! 历史记录存储
//!
//! 流水线消费的 History Store 接口及其 SQLite 实现。流水线稳态只
//! 需要两个操作：按用户读取历史（时间升序）、追加一条记录（单行
//! 原子插入）。不提供更新或删除；开发用的清空操作是独立的管理
//! 辅助函数，不属于核心契约。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{AggregateSummary, HistoryRecord};

/// 存储层错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 数据库连接或查询错误
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    /// 持久化的总评无法反序列化
    #[error("历史记录损坏: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// History Store 接口
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// 按时间升序返回该用户的全部历史记录
    async fn fetch_history(&self, user_id: &str) -> Result<Vec<HistoryRecord>, StoreError>;

    /// 追加一条历史记录（单行原子插入）
    async fn append_history(
        &self,
        user_id: &str,
        summary: &AggregateSummary,
    ) -> Result<HistoryRecord, StoreError>;
}

/// SQLite 实现
pub struct SqliteHistoryStore {
    pool: Pool<Sqlite>,
}

impl SqliteHistoryStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// 连接数据库并初始化表结构
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let store = Self::new(pool);
        store.init().await?;
        Ok(store)
    }

    /// 初始化表结构
    pub async fn init(&self) -> Result<(), StoreError> {
        info!("初始化历史记录表");
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analysis_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                summary_json TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_analysis_history_user
             ON analysis_history (user_id, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 开发用：清空全部历史记录
    ///
    /// 不要在生产环境使用。
    pub async fn delete_all_for_development(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM analysis_history")
            .execute(&self.pool)
            .await?;
        warn!("⚠️ 已清空全部历史记录 ({} 条)", result.rows_affected());
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn fetch_history(&self, user_id: &str) -> Result<Vec<HistoryRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT user_id, timestamp, summary_json
             FROM analysis_history
             WHERE user_id = ?
             ORDER BY timestamp ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let user_id: String = row.try_get("user_id")?;
            let timestamp: DateTime<Utc> = row.try_get("timestamp")?;
            let summary_json: String = row.try_get("summary_json")?;
            let summary: AggregateSummary = serde_json::from_str(&summary_json)?;
            records.push(HistoryRecord {
                user_id,
                timestamp,
                summary,
            });
        }
        Ok(records)
    }

    async fn append_history(
        &self,
        user_id: &str,
        summary: &AggregateSummary,
    ) -> Result<HistoryRecord, StoreError> {
        let record = HistoryRecord::new(user_id, summary.clone());
        let summary_json = serde_json::to_string(&record.summary)?;

        sqlx::query(
            "INSERT INTO analysis_history (user_id, timestamp, summary_json)
             VALUES (?, ?, ?)",
        )
        .bind(&record.user_id)
        .bind(record.timestamp)
        .bind(&summary_json)
        .execute(&self.pool)
        .await?;

        info!("✓ 历史记录已写入 (用户: {})", user_id);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_summary(structure: u8) -> AggregateSummary {
        AggregateSummary {
            narrative: "整体表现稳定".to_string(),
            structure_score: structure,
            speech_score: 4,
            knowledge_score: 3,
            personas_score: 4,
            comparison_score: 3,
        }
    }

    async fn memory_store() -> SqliteHistoryStore {
        // 内存库对每条连接各自独立，测试池必须收敛到单连接
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("内存数据库应能连接");
        let store = SqliteHistoryStore::new(pool);
        store.init().await.expect("表结构应能初始化");
        store
    }

    #[tokio::test]
    async fn test_append_then_fetch_roundtrip() {
        let store = memory_store().await;
        store.append_history("user-1", &sample_summary(4)).await.unwrap();

        let records = store.fetch_history("user-1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].summary.structure_score, 4);
    }

    #[tokio::test]
    async fn test_fetch_is_scoped_to_user() {
        let store = memory_store().await;
        store.append_history("user-1", &sample_summary(2)).await.unwrap();
        store.append_history("user-2", &sample_summary(5)).await.unwrap();

        let records = store.fetch_history("user-1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_id, "user-1");
    }

    #[tokio::test]
    async fn test_fetch_orders_by_ascending_timestamp() {
        let store = memory_store().await;
        for i in 1..=3 {
            store.append_history("user-1", &sample_summary(i)).await.unwrap();
        }

        let records = store.fetch_history("user-1").await.unwrap();
        assert_eq!(records.len(), 3);
        for pair in records.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn test_delete_all_for_development() {
        let store = memory_store().await;
        store.append_history("user-1", &sample_summary(3)).await.unwrap();
        let deleted = store.delete_all_for_development().await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.fetch_history("user-1").await.unwrap().is_empty());
    }
}
