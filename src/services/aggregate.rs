//! 聚合总评 - 能力层
//!
//! 聚合是整条流水线唯一的同步屏障产出方：收拢全部上游阶段的输出，
//! 产出一段总评叙述和五个维度分数。
//!
//! ## 降级约定
//!
//! 任何上游阶段失败时，它的输入被替换为占位文本，对应维度的分数在
//! 判断调用之后被钉为配置的中性分。无论输入degradation到什么程度，
//! 输出契约（五个分数全部存在且在 [1,5] 区间内）无条件成立。

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::clients::{structured_judgment, Judgment, JudgmentRequest, RetryPolicy};
use crate::error::EvalResult;
use crate::models::AggregateSummary;

/// 上游阶段失败时拼入提示词的占位文本
const DEGRADED_PLACEHOLDER: &str = "（该维度评估失败，无可用反馈，总评时按中性处理）";

/// 聚合输入
///
/// `None` 表示对应上游阶段失败（降级）；人设列表中单个 `None` 表示
/// 该人设实例失败。
#[derive(Debug, Default)]
pub struct AggregateInputs {
    pub structure: Option<String>,
    pub speech: Option<String>,
    pub knowledge: Option<String>,
    /// (人设名, 反馈)
    pub personas: Vec<(String, Option<String>)>,
    pub comparison: Option<String>,
}

impl AggregateInputs {
    /// 人设维度是否整体降级（全部实例失败或一个实例都没有）
    fn personas_degraded(&self) -> bool {
        self.personas.iter().all(|(_, feedback)| feedback.is_none())
    }
}

/// 协作方返回的结构
#[derive(Debug, Deserialize)]
struct SummaryJudgment {
    summary: String,
    structure_score: u8,
    speech_score: u8,
    knowledge_score: u8,
    personas_score: u8,
    comparison_score: u8,
}

/// 聚合器
pub struct Aggregator {
    judgment: Arc<dyn Judgment>,
    policy: RetryPolicy,
    neutral_score: u8,
}

impl Aggregator {
    pub fn new(judgment: Arc<dyn Judgment>, policy: RetryPolicy, neutral_score: u8) -> Self {
        Self {
            judgment,
            policy,
            neutral_score,
        }
    }

    /// 聚合全部上游输出为一份总评
    ///
    /// 协作方输出不合法时由重试策略兜底（结构化解析失败重试一次、
    /// 瞬时错误按退避重试）；重试耗尽则返回错误，由调度器按致命
    /// 错误中止整次运行。
    pub async fn aggregate(&self, inputs: &AggregateInputs) -> EvalResult<AggregateSummary> {
        let prompt = self.build_prompt(inputs);
        debug!("聚合提示词长度: {} 字符", prompt.len());

        let judged: SummaryJudgment = structured_judgment(
            self.judgment.as_ref(),
            JudgmentRequest::new(prompt),
            &self.policy,
        )
        .await?;

        let mut summary = AggregateSummary {
            narrative: judged.summary,
            structure_score: judged.structure_score,
            speech_score: judged.speech_score,
            knowledge_score: judged.knowledge_score,
            personas_score: judged.personas_score,
            comparison_score: judged.comparison_score,
        }
        .clamped();

        // 失败维度钉为中性分，不采信协作方对占位文本给出的分数
        if inputs.structure.is_none() {
            summary.structure_score = self.neutral_score;
        }
        if inputs.speech.is_none() {
            summary.speech_score = self.neutral_score;
        }
        if inputs.knowledge.is_none() {
            summary.knowledge_score = self.neutral_score;
        }
        if inputs.personas_degraded() {
            summary.personas_score = self.neutral_score;
        }
        if inputs.comparison.is_none() {
            summary.comparison_score = self.neutral_score;
        }

        info!(
            "✓ 总评完成: 构成 {} / 语速 {} / 前提知识 {} / 人设 {} / 对比 {}",
            summary.structure_score,
            summary.speech_score,
            summary.knowledge_score,
            summary.personas_score,
            summary.comparison_score,
        );
        Ok(summary)
    }

    fn build_prompt(&self, inputs: &AggregateInputs) -> String {
        let text_or_placeholder =
            |value: &Option<String>| value.clone().unwrap_or_else(|| DEGRADED_PLACEHOLDER.to_string());

        let personas_text = if inputs.personas.is_empty() {
            DEGRADED_PLACEHOLDER.to_string()
        } else {
            inputs
                .personas
                .iter()
                .map(|(label, feedback)| {
                    format!(
                        "{}：{}",
                        label,
                        feedback.as_deref().unwrap_or(DEGRADED_PLACEHOLDER)
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            r#"以下是各评估助手对同一次发表的反馈。
- 构成: {}
- 语速: {}
- 前提知识: {}
- 人设视角:
{}
- 历史对比: {}

请根据以上反馈写一段 300 字以内的总评（summary），并对五个维度分别给出
1〜5 的整数分（5 为最好）。标注为"按中性处理"的维度给 3 分即可。
输出必须是 JSON，形如
{{"summary": "...", "structure_score": 3, "speech_score": 3, "knowledge_score": 3, "personas_score": 3, "comparison_score": 3}}，
不要输出其他内容。"#,
            text_or_placeholder(&inputs.structure),
            text_or_placeholder(&inputs.speech),
            text_or_placeholder(&inputs.knowledge),
            personas_text,
            text_or_placeholder(&inputs.comparison),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedJudgment {
        response: String,
    }

    #[async_trait]
    impl Judgment for FixedJudgment {
        async fn generate(
            &self,
            _request: JudgmentRequest,
        ) -> crate::error::EvalResult<String> {
            Ok(self.response.clone())
        }
    }

    fn aggregator(response: &str) -> Aggregator {
        Aggregator::new(
            Arc::new(FixedJudgment {
                response: response.to_string(),
            }),
            RetryPolicy {
                max_transient_retries: 0,
                backoff_ms: 1,
            },
            3,
        )
    }

    fn healthy_inputs() -> AggregateInputs {
        AggregateInputs {
            structure: Some("构成清晰".to_string()),
            speech: Some("语速适中".to_string()),
            knowledge: Some("前提知识适量".to_string()),
            personas: vec![("大学教授".to_string(), Some("论证严密".to_string()))],
            comparison: Some("比上次更流畅".to_string()),
        }
    }

    const GOOD_RESPONSE: &str = r#"{"summary": "整体完成度高", "structure_score": 5, "speech_score": 4, "knowledge_score": 4, "personas_score": 5, "comparison_score": 4}"#;

    #[tokio::test]
    async fn test_aggregate_healthy_inputs() {
        let summary = aggregator(GOOD_RESPONSE)
            .aggregate(&healthy_inputs())
            .await
            .unwrap();
        assert_eq!(summary.structure_score, 5);
        assert_eq!(summary.narrative, "整体完成度高");
        assert!(summary.scores_in_range());
    }

    #[tokio::test]
    async fn test_degraded_dimension_pinned_to_neutral() {
        let mut inputs = healthy_inputs();
        inputs.knowledge = None;
        let summary = aggregator(GOOD_RESPONSE).aggregate(&inputs).await.unwrap();
        // 协作方给了 4 分，但失败维度必须钉为中性分
        assert_eq!(summary.knowledge_score, 3);
        assert_eq!(summary.structure_score, 5);
    }

    #[tokio::test]
    async fn test_personas_pinned_only_when_all_fail() {
        let mut inputs = healthy_inputs();
        inputs.personas = vec![
            ("大学教授".to_string(), Some("论证严密".to_string())),
            ("普通大学生".to_string(), None),
        ];
        let summary = aggregator(GOOD_RESPONSE).aggregate(&inputs).await.unwrap();
        assert_eq!(summary.personas_score, 5);

        inputs.personas = vec![
            ("大学教授".to_string(), None),
            ("普通大学生".to_string(), None),
        ];
        let summary = aggregator(GOOD_RESPONSE).aggregate(&inputs).await.unwrap();
        assert_eq!(summary.personas_score, 3);
    }

    #[tokio::test]
    async fn test_out_of_range_scores_clamped() {
        let response = r#"{"summary": "分数越界", "structure_score": 9, "speech_score": 0, "knowledge_score": 3, "personas_score": 3, "comparison_score": 3}"#;
        let summary = aggregator(response)
            .aggregate(&healthy_inputs())
            .await
            .unwrap();
        assert_eq!(summary.structure_score, 5);
        assert_eq!(summary.speech_score, 1);
        assert!(summary.scores_in_range());
    }

    #[tokio::test]
    async fn test_unparsable_response_is_schema_error() {
        let err = aggregator("这不是 JSON")
            .aggregate(&healthy_inputs())
            .await
            .unwrap_err();
        assert_eq!(err.tag(), "schema_mismatch");
    }

    #[test]
    fn test_prompt_carries_placeholder_for_degraded() {
        let aggregator = aggregator(GOOD_RESPONSE);
        let mut inputs = healthy_inputs();
        inputs.speech = None;
        let prompt = aggregator.build_prompt(&inputs);
        assert!(prompt.contains(DEGRADED_PLACEHOLDER));
        assert!(prompt.contains("构成清晰"));
    }
}
