//! HTTP 接口层
//!
//! 对外暴露提交端点：接收幻灯片 + 录音 + 用户标识，以 NDJSON 流式
//! 返回各阶段事件。提交的接收与流水线的执行通过任务派发解耦，
//! 接收新提交的进程永远不会被某次评估阻塞。

pub mod evaluate;
pub mod server;

pub use server::{App, AppContext};
