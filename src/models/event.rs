//! 结果流事件
//!
//! StageEvent 是推送给调用方的唯一单位：每个完成（成功或失败）的阶段
//! 产生一条事件，流以一条 terminal 事件收尾。序号在推送时分配，严格
//! 递增，并发完成的阶段按真实完成顺序排列。

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::EvalError;
use crate::models::stage::{StageKind, StageResult};

/// 写入事件的错误记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageError {
    /// 错误分类标签（transient / schema_mismatch / persistence / fatal）
    pub tag: String,
    pub message: String,
}

impl From<&EvalError> for StageError {
    fn from(err: &EvalError) -> Self {
        Self {
            tag: err.tag().to_string(),
            message: err.to_string(),
        }
    }
}

/// 结果流事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEvent {
    /// 序号：推送时分配，每个提交内严格递增
    pub sequence_number: u64,
    /// 显示标签
    pub label: String,
    /// 阶段种类标识（终止标记使用 "pipeline"）
    pub stage_kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<StageResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StageError>,
    /// 是否为流的终止事件
    pub terminal: bool,
}

impl StageEvent {
    /// 阶段成功完成事件
    pub fn completed(kind: StageKind, label: impl Into<String>, result: StageResult) -> Self {
        Self {
            sequence_number: 0,
            label: label.into(),
            stage_kind: kind.as_str().to_string(),
            result: Some(result),
            error: None,
            terminal: false,
        }
    }

    /// 阶段失败事件（非终止，隔离在本阶段内）
    pub fn failed(kind: StageKind, label: impl Into<String>, error: &EvalError) -> Self {
        Self {
            sequence_number: 0,
            label: label.into(),
            stage_kind: kind.as_str().to_string(),
            result: None,
            error: Some(StageError::from(error)),
            terminal: false,
        }
    }

    /// 正常的流结束标记
    pub fn stream_end() -> Self {
        Self {
            sequence_number: 0,
            label: "评估完成".to_string(),
            stage_kind: "pipeline".to_string(),
            result: None,
            error: None,
            terminal: true,
        }
    }

    /// 终止性错误标记（聚合失败 / 持久化失败）
    pub fn terminal_error(error: &EvalError) -> Self {
        Self {
            sequence_number: 0,
            label: "评估中止".to_string(),
            stage_kind: "pipeline".to_string(),
            result: None,
            error: Some(StageError::from(error)),
            terminal: true,
        }
    }

    /// 编码为一行 NDJSON
    ///
    /// 对外契约要求每条记录至少包含 {label, stage_kind, result_json}，
    /// 其中 result_json 是阶段结果的 JSON 字符串（失败事件为空串）。
    pub fn to_ndjson_line(&self) -> String {
        let result_json = self
            .result
            .as_ref()
            .and_then(|r| serde_json::to_string(r).ok())
            .unwrap_or_default();

        let mut record = json!({
            "sequence_number": self.sequence_number,
            "label": self.label,
            "stage_kind": self.stage_kind,
            "result_json": result_json,
            "terminal": self.terminal,
        });
        if let Some(error) = &self.error {
            record["error"] = json!({
                "tag": error.tag,
                "message": error.message,
            });
        }

        let mut line = record.to_string();
        line.push('\n');
        line
    }
}
