//! 前提知识评估 - 能力层
//!
//! 输入：文字稿
//! 输出：对"是否要求听众具备过多前提知识"的总结，以及逐条术语清单
//! （术语 / 含义 / 所需知识水平 / 发表中的讲解程度）

use std::sync::Arc;

use serde::Deserialize;

use crate::clients::{structured_judgment, Judgment, JudgmentRequest, RetryPolicy};
use crate::error::EvalResult;
use crate::models::{KnowledgeTerm, StageResult};

/// 前提知识评估器
pub struct PriorKnowledgeEvaluator {
    judgment: Arc<dyn Judgment>,
    policy: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct PriorKnowledgeJudgment {
    summary: String,
    terms: Vec<TermJudgment>,
}

#[derive(Debug, Deserialize)]
struct TermJudgment {
    term: String,
    description: String,
    level: String,
    explained_level: String,
}

impl PriorKnowledgeEvaluator {
    pub fn new(judgment: Arc<dyn Judgment>, policy: RetryPolicy) -> Self {
        Self { judgment, policy }
    }

    /// 评估前提知识要求
    pub async fn evaluate(&self, transcript: &str) -> EvalResult<StageResult> {
        let prompt = format!(
            r#"你是负责评估发表的 AI 助手之一，专门评估"前提知识"。
请阅读下面的文字稿，判断是否存在要求听众具备过多前提知识的部分，
给出 300 字以内的总结（summary），并把识别出的专业术语逐条列出：
- term: 术语
- description: 术语含义（一句话）
- level: 理解该术语所需的知识水平（如"高中" / "本科" / "专业人士"）
- explained_level: 发表中对该术语的讲解程度（如"未讲解" / "简单提及" / "充分讲解"）

输出必须是 JSON，形如
{{"summary": "...", "terms": [{{"term": "...", "description": "...", "level": "...", "explained_level": "..."}}]}}，
没有术语时 terms 为空数组。不要输出其他内容。

文字稿：
{}"#,
            transcript
        );

        let judged: PriorKnowledgeJudgment = structured_judgment(
            self.judgment.as_ref(),
            JudgmentRequest::new(prompt),
            &self.policy,
        )
        .await?;

        Ok(StageResult::PriorKnowledge {
            summary: judged.summary,
            terms: judged
                .terms
                .into_iter()
                .map(|t| KnowledgeTerm {
                    term: t.term,
                    description: t.description,
                    level: t.level,
                    explained_level: t.explained_level,
                })
                .collect(),
        })
    }
}
