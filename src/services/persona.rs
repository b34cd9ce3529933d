//! 人设视角评估 - 能力层
//!
//! 每个配置的人设对应一个独立阶段实例：以该人设的立场阅读文字稿，
//! 给出该视角下的反馈。

use std::sync::Arc;

use serde::Deserialize;

use crate::clients::{structured_judgment, Judgment, JudgmentRequest, RetryPolicy};
use crate::error::EvalResult;
use crate::models::{Persona, StageResult};

/// 人设评估器
pub struct PersonaEvaluator {
    judgment: Arc<dyn Judgment>,
    policy: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct PersonaJudgment {
    feedback: String,
}

impl PersonaEvaluator {
    pub fn new(judgment: Arc<dyn Judgment>, policy: RetryPolicy) -> Self {
        Self { judgment, policy }
    }

    /// 以指定人设的立场评估发表
    pub async fn evaluate(&self, persona: &Persona, transcript: &str) -> EvalResult<StageResult> {
        let prompt = format!(
            r#"你现在是「{}」：{}。
请以这个立场阅读下面的发表文字稿，给出 300 字以内的反馈，
说清楚从你的视角看哪里打动了你、哪里没有说服你。
输出必须是 JSON，形如 {{"feedback": "..."}}，不要输出其他内容。

文字稿：
{}"#,
            persona.label, persona.description, transcript
        );

        let judged: PersonaJudgment = structured_judgment(
            self.judgment.as_ref(),
            JudgmentRequest::new(prompt),
            &self.policy,
        )
        .await?;

        Ok(StageResult::Persona {
            persona_label: persona.label.clone(),
            feedback: judged.feedback,
        })
    }
}
