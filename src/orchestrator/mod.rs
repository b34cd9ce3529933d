//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层驱动一次提交的完整评估流水线，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `scheduler` - 阶段调度器
//! - 按依赖图执行阶段：独立阶段并发，聚合阶段作为同步屏障
//! - 并发控制（跨提交共享的 Semaphore 工作池）
//! - 每个阶段独立超时，失败隔离在阶段内
//! - 恰好一次持久化、完成通知、结果流收尾
//!
//! ### `dispatcher` - 补救分发器
//! - 纯决策函数：按总评分数与阈值决定要追加哪些补救阶段
//!
//! ## 依赖图
//!
//! ```text
//! Submission
//!     ├── 构成评估 ──────┐
//!     ├── 语速评估 ──────┤
//!     ├── 前提知识评估 ──┼── 聚合总评（屏障）── 持久化 ── 补救阶段 ── 通知
//!     ├── 人设评估 × N ──┤
//!     └── 历史对比评估 ──┘
//! ```
//!
//! ## 设计原则
//!
//! 1. **向下委托**：编排层只做调度和收拢，评估逻辑在 services 层
//! 2. **失败隔离**：独立阶段失败不波及兄弟阶段，降级进聚合
//! 3. **显式依赖**：协作方与存储在构造时注入，没有全局可变状态

pub mod dispatcher;
pub mod scheduler;

pub use dispatcher::RemediationDispatcher;
pub use scheduler::Scheduler;
