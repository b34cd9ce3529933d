//! 历史对比评估 - 能力层
//!
//! 输入：本次文字稿 + 该用户流水线启动时刻的历史总评快照
//! 输出：与过往发表相比的进步 / 退步叙述
//!
//! 历史快照由调度器在流水线启动时读取并传入，本模块不直接访问
//! 存储，因此天然读不到本次运行自己的写入。

use std::sync::Arc;

use tracing::debug;

use crate::clients::{text_judgment, Judgment, JudgmentRequest, RetryPolicy};
use crate::error::EvalResult;
use crate::models::{HistoryRecord, StageResult};

/// 历史对比评估器
pub struct ComparisonEvaluator {
    judgment: Arc<dyn Judgment>,
    policy: RetryPolicy,
}

impl ComparisonEvaluator {
    pub fn new(judgment: Arc<dyn Judgment>, policy: RetryPolicy) -> Self {
        Self { judgment, policy }
    }

    /// 与历史发表对比
    ///
    /// 没有历史记录时直接返回固定叙述，不调用判断协作方。
    pub async fn evaluate(
        &self,
        transcript: &str,
        history: &[HistoryRecord],
    ) -> EvalResult<StageResult> {
        if history.is_empty() {
            debug!("无历史记录，跳过对比判断调用");
            return Ok(StageResult::Comparison {
                narrative: "这是该用户的第一次发表评估，暂无可对比的历史记录。".to_string(),
            });
        }

        let narrative = text_judgment(
            self.judgment.as_ref(),
            JudgmentRequest::new(self.build_prompt(transcript, history)),
            &self.policy,
        )
        .await?;

        Ok(StageResult::Comparison { narrative })
    }

    fn build_prompt(&self, transcript: &str, history: &[HistoryRecord]) -> String {
        let mut prompt = format!(
            r#"你是负责评估发表的 AI。请阅读本次发表的文字稿，再对照之后附上的
历次评估记录，从进步与退步两方面给出 300 字以内的对比评价。

本次文字稿：
{}

以下是该用户过往的评估记录（按时间先后排列）：
"#,
            transcript
        );

        for record in history {
            prompt.push_str(&format!(
                "\n日期：{}\n总评：{}\n各维度分数：构成 {} / 语速 {} / 前提知识 {} / 人设 {} / 对比 {}\n",
                record.timestamp.format("%Y-%m-%d"),
                record.summary.narrative,
                record.summary.structure_score,
                record.summary.speech_score,
                record.summary.knowledge_score,
                record.summary.personas_score,
                record.summary.comparison_score,
            ));
        }

        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalError;
    use crate::models::AggregateSummary;
    use async_trait::async_trait;

    struct NeverCalledJudgment;

    #[async_trait]
    impl Judgment for NeverCalledJudgment {
        async fn generate(
            &self,
            _request: crate::clients::JudgmentRequest,
        ) -> crate::error::EvalResult<String> {
            Err(EvalError::Other("对比阶段不应在无历史时调用协作方".to_string()))
        }
    }

    #[tokio::test]
    async fn test_empty_history_short_circuits() {
        let evaluator = ComparisonEvaluator::new(
            Arc::new(NeverCalledJudgment),
            RetryPolicy {
                max_transient_retries: 0,
                backoff_ms: 1,
            },
        );
        let result = evaluator.evaluate("本次发表内容", &[]).await.unwrap();
        match result {
            StageResult::Comparison { narrative } => {
                assert!(narrative.contains("第一次"));
            }
            other => panic!("意外的结果类型: {:?}", other),
        }
    }

    #[test]
    fn test_prompt_includes_each_record() {
        let evaluator = ComparisonEvaluator::new(
            Arc::new(NeverCalledJudgment),
            RetryPolicy {
                max_transient_retries: 0,
                backoff_ms: 1,
            },
        );
        let history = vec![HistoryRecord::new(
            "user-1",
            AggregateSummary {
                narrative: "上次的发表结构松散".to_string(),
                structure_score: 2,
                speech_score: 3,
                knowledge_score: 3,
                personas_score: 3,
                comparison_score: 3,
            },
        )];
        let prompt = evaluator.build_prompt("本次文字稿", &history);
        assert!(prompt.contains("上次的发表结构松散"));
        assert!(prompt.contains("构成 2"));
    }
}
