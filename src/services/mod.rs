//! 评估能力层
//!
//! 每个模块对应一种阶段能力，只处理单次评估，不关心调度顺序、
//! 并发和事件流。调度顺序由 orchestrator 层负责。
//!
//! - `structure` - 发表构成评估
//! - `speech_rate` - 语速与讲话方式评估
//! - `prior_knowledge` - 前提知识评估
//! - `persona` - 人设视角评估
//! - `comparison` - 历史对比评估
//! - `aggregate` - 聚合总评（同步屏障的产出方）
//! - `remediation` - 补救产物（示范音频 / 幻灯片修改建议）

pub mod aggregate;
pub mod comparison;
pub mod persona;
pub mod prior_knowledge;
pub mod remediation;
pub mod speech_rate;
pub mod structure;

pub use aggregate::{AggregateInputs, Aggregator};
pub use comparison::ComparisonEvaluator;
pub use persona::PersonaEvaluator;
pub use prior_knowledge::PriorKnowledgeEvaluator;
pub use remediation::{AudioExemplarService, SlideRevisionService};
pub use speech_rate::SpeechRateEvaluator;
pub use structure::StructureEvaluator;
