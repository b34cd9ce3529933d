//! 阶段与阶段结果的类型定义
//!
//! 一次评估由若干阶段组成：独立评估阶段（构成 / 语速 / 前提知识 / 人设 /
//! 对比）并发执行，聚合阶段作为同步屏障收拢全部结果，补救阶段按聚合
//! 分数条件触发。

use serde::{Deserialize, Serialize};

/// 评分的合法区间
pub const SCORE_MIN: u8 = 1;
pub const SCORE_MAX: u8 = 5;

/// 阶段种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// 发表构成评估
    Structure,
    /// 语速与讲话方式评估
    SpeechRate,
    /// 前提知识评估
    PriorKnowledge,
    /// 人设视角评估（每个配置的人设一个实例）
    Persona,
    /// 与历史发表的对比评估
    Comparison,
    /// 聚合总评（同步屏障）
    Aggregate,
    /// 补救：示范音频
    RemediationAudio,
    /// 补救：幻灯片修改建议
    RemediationSlide,
    /// 完成通知
    Notify,
}

impl StageKind {
    /// 写入事件流的阶段种类标识
    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Structure => "structure",
            StageKind::SpeechRate => "speech_rate",
            StageKind::PriorKnowledge => "prior_knowledge",
            StageKind::Persona => "persona",
            StageKind::Comparison => "comparison",
            StageKind::Aggregate => "aggregate",
            StageKind::RemediationAudio => "remediation_audio",
            StageKind::RemediationSlide => "remediation_slide",
            StageKind::Notify => "notify",
        }
    }

    /// 默认显示标签（人设阶段会用具体人设名覆盖）
    pub fn label(self) -> &'static str {
        match self {
            StageKind::Structure => "发表构成评估",
            StageKind::SpeechRate => "语速评估",
            StageKind::PriorKnowledge => "前提知识评估",
            StageKind::Persona => "人设评估",
            StageKind::Comparison => "历史对比评估",
            StageKind::Aggregate => "总评",
            StageKind::RemediationAudio => "示范音频生成",
            StageKind::RemediationSlide => "幻灯片修改建议",
            StageKind::Notify => "完成通知",
        }
    }
}

/// 阶段状态
///
/// Completed / Failed 为终态，阶段一旦进入终态不再变更。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// 前提知识评估中识别出的术语
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeTerm {
    /// 术语本身
    pub term: String,
    /// 术语含义
    pub description: String,
    /// 理解该术语所需的知识水平
    pub level: String,
    /// 发表中对该术语的讲解程度
    pub explained_level: String,
}

/// 聚合总评
///
/// 五个维度分数恒在 [1,5] 区间内，即使上游阶段失败也必须全部给出
/// （失败维度由调度器钉为中性分，不允许缺省）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSummary {
    /// 总评叙述
    pub narrative: String,
    pub structure_score: u8,
    pub speech_score: u8,
    pub knowledge_score: u8,
    pub personas_score: u8,
    pub comparison_score: u8,
}

impl AggregateSummary {
    /// 将五个分数全部收拢到 [1,5] 区间
    pub fn clamped(mut self) -> Self {
        self.structure_score = self.structure_score.clamp(SCORE_MIN, SCORE_MAX);
        self.speech_score = self.speech_score.clamp(SCORE_MIN, SCORE_MAX);
        self.knowledge_score = self.knowledge_score.clamp(SCORE_MIN, SCORE_MAX);
        self.personas_score = self.personas_score.clamp(SCORE_MIN, SCORE_MAX);
        self.comparison_score = self.comparison_score.clamp(SCORE_MIN, SCORE_MAX);
        self
    }

    /// 五个分数是否全部在合法区间内
    pub fn scores_in_range(&self) -> bool {
        [
            self.structure_score,
            self.speech_score,
            self.knowledge_score,
            self.personas_score,
            self.comparison_score,
        ]
        .iter()
        .all(|s| (SCORE_MIN..=SCORE_MAX).contains(s))
    }
}

/// 阶段结果（按阶段种类区分的联合类型）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageResult {
    Structure {
        narrative: String,
    },
    SpeechRate {
        rate_review: String,
        style_review: String,
    },
    PriorKnowledge {
        summary: String,
        terms: Vec<KnowledgeTerm>,
    },
    Persona {
        persona_label: String,
        feedback: String,
    },
    Comparison {
        narrative: String,
    },
    Aggregate(AggregateSummary),
    /// 示范音频（wav 字节以 base64 编码推送，不持久化）
    RemediationAudio {
        audio_base64: String,
        media_type: String,
    },
    /// 幻灯片修改建议（针对问题最严重的一页）
    RemediationSlide {
        page: u32,
        issue: String,
        suggestion: String,
    },
    Notify {
        recipient: String,
    },
}

/// 单个阶段的运行记录
///
/// 由调度器在依赖满足时创建，仅由执行它的 worker 修改。
#[derive(Debug, Clone)]
pub struct Stage {
    pub kind: StageKind,
    pub label: String,
    pub status: StageStatus,
    pub result: Option<StageResult>,
    pub error: Option<String>,
}

impl Stage {
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            label: kind.label().to_string(),
            status: StageStatus::Pending,
            result: None,
            error: None,
        }
    }

    /// 创建带自定义标签的阶段（人设阶段使用人设名）
    pub fn with_label(kind: StageKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            status: StageStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn start(&mut self) {
        debug_assert_eq!(self.status, StageStatus::Pending);
        self.status = StageStatus::Running;
    }

    pub fn complete(&mut self, result: StageResult) {
        self.status = StageStatus::Completed;
        self.result = Some(result);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = StageStatus::Failed;
        self.error = Some(error.into());
    }

    /// 是否已进入终态
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, StageStatus::Completed | StageStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary_with(scores: [u8; 5]) -> AggregateSummary {
        AggregateSummary {
            narrative: "总体表现良好".to_string(),
            structure_score: scores[0],
            speech_score: scores[1],
            knowledge_score: scores[2],
            personas_score: scores[3],
            comparison_score: scores[4],
        }
    }

    #[test]
    fn test_clamped_pulls_scores_into_range() {
        let summary = summary_with([0, 9, 3, 255, 1]).clamped();
        assert_eq!(summary.structure_score, 1);
        assert_eq!(summary.speech_score, 5);
        assert_eq!(summary.knowledge_score, 3);
        assert_eq!(summary.personas_score, 5);
        assert_eq!(summary.comparison_score, 1);
        assert!(summary.scores_in_range());
    }

    #[test]
    fn test_scores_in_range_rejects_zero() {
        assert!(!summary_with([0, 3, 3, 3, 3]).scores_in_range());
        assert!(summary_with([1, 2, 3, 4, 5]).scores_in_range());
    }

    #[test]
    fn test_stage_lifecycle() {
        let mut stage = Stage::new(StageKind::Structure);
        assert_eq!(stage.status, StageStatus::Pending);
        stage.start();
        assert_eq!(stage.status, StageStatus::Running);
        assert!(!stage.is_terminal());
        stage.complete(StageResult::Structure {
            narrative: "构成清晰".to_string(),
        });
        assert!(stage.is_terminal());
    }

    #[test]
    fn test_stage_result_serializes_with_kind_tag() {
        let result = StageResult::Persona {
            persona_label: "大学教授".to_string(),
            feedback: "论证严密".to_string(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["kind"], "persona");
        assert_eq!(json["persona_label"], "大学教授");
    }
}
