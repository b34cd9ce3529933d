//! # Presentation Evaluator
//!
//! 一个对发表（幻灯片 + 录音）做多视角 AI 评估的服务
//!
//! ## 架构设计
//!
//! 本系统采用严格的分层架构：
//!
//! ### ① 协作方层（Clients）
//! - `clients/` - 外部协作方的窄接口与默认实现
//! - 判断（LLM）/ 转写 / 语音合成 / 光栅化 / 通知，全部 trait 注入
//!
//! ### ② 能力层（Services）
//! - `services/` - 描述"我能做什么"，每个模块一种评估能力
//! - 构成 / 语速 / 前提知识 / 人设 / 历史对比 / 聚合 / 补救
//!
//! ### ③ 编排层（Orchestrator）
//! - `orchestrator/scheduler` - 依赖图调度：独立阶段并发、聚合屏障、
//!   恰好一次持久化、条件补救
//! - `orchestrator/dispatcher` - 按分数阈值决定补救阶段
//!
//! ### ④ 接口层（Api）
//! - `api/` - 提交端点与 NDJSON 事件流响应
//!
//! ## 模块结构

pub mod api;
pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod store;
pub mod stream;
pub mod utils;

// 重新导出常用类型
pub use api::App;
pub use clients::Collaborators;
pub use config::Config;
pub use error::{EvalError, EvalResult};
pub use models::{AggregateSummary, StageEvent, StageKind, StageResult, Submission};
pub use orchestrator::{RemediationDispatcher, Scheduler};
pub use store::{HistoryStore, SqliteHistoryStore};
pub use stream::ResultStream;
